use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use tokio::signal;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{info, warn};

use cutover_api::{
    Alert, ChannelSink, Described, EngineConfig, HookCluster, HookSpec, OperationError, OperationEvent,
    OperationKind, OperationRequest, Orchestrator, Outcome, PlanValues, ResourceKind, ResourceRef, Status,
};
use cutover_core::ClientError;
use cutover_kubehub::KubeClient;
use cutover_ops::{LoopOutcome, PollEvent, PollLoop, PollSpec};

#[derive(Parser, Debug)]
#[command(name = "cutoverctl", version, about = "Drive migration plans, migrations and hooks")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// Namespace of the migration resources (default: openshift-migration)
    #[arg(long = "ns", global = true)]
    namespace: Option<String>,

    /// Engine config file (YAML)
    #[arg(long = "config", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output {
    Human,
    Json,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Cluster {
    Source,
    Destination,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a stage migration for a plan
    Stage { plan: String },
    /// Run the final migration for a plan
    Migrate {
        plan: String,
        /// Scale source workloads down before migrating
        #[arg(long = "quiesce", action = ArgAction::SetTrue)]
        quiesce: bool,
    },
    /// Roll back the last migration of a plan
    Rollback { plan: String },
    /// Apply plan values and wait for the controller to accept them
    Validate {
        plan: String,
        /// YAML file with plan values (camelCase keys)
        #[arg(long = "values")]
        values: PathBuf,
    },
    /// Set namespaces on a plan and wait for persistent volume discovery
    DiscoverPvs {
        plan: String,
        #[arg(long = "namespaces", value_delimiter = ',', required = true)]
        namespaces: Vec<String>,
    },
    /// Wait for a plan to report readiness
    PlanStatus { plan: String },
    /// Close a plan and delete it once closed
    Close { plan: String },
    /// Recreate a plan's analytics and wait for completion
    Analytics { plan: String },
    /// Request cancellation of a running migration
    Cancel { migration: String },
    /// Manage migration hooks
    Hook {
        #[command(subcommand)]
        command: HookCommands,
    },
    /// Fetch one resource and print its summarized status
    Describe {
        #[arg(value_parser = parse_kind)]
        kind: ResourceKind,
        name: String,
    },
    /// Re-describe a resource until its status is terminal or settled
    Watch {
        #[arg(value_parser = parse_kind)]
        kind: ResourceKind,
        name: String,
        /// Poll interval in milliseconds
        #[arg(long = "interval-ms", default_value_t = 5_000)]
        interval_ms: u64,
    },
    /// List a kind repeatedly
    Refresh {
        #[arg(value_parser = parse_kind)]
        kind: ResourceKind,
        /// Stop after this many lists
        #[arg(long = "ticks")]
        ticks: Option<u32>,
    },
}

#[derive(clap::Args, Debug)]
struct HookArgs {
    name: String,
    #[arg(long = "image", default_value = "quay.io/konveyor/hook-runner:latest")]
    image: String,
    /// Ansible playbook file
    #[arg(long = "playbook")]
    playbook: Option<PathBuf>,
    /// Image runs its own entrypoint instead of a playbook
    #[arg(long = "custom", action = ArgAction::SetTrue)]
    custom: bool,
    #[arg(long = "cluster", value_enum, default_value_t = Cluster::Source)]
    cluster: Cluster,
    /// PreBackup, PostBackup, PreRestore or PostRestore
    #[arg(long = "phase", default_value = "PreBackup")]
    phase: String,
    #[arg(long = "service-account")]
    service_account: Option<String>,
    #[arg(long = "execution-namespace")]
    execution_namespace: Option<String>,
    #[arg(long = "deadline-secs")]
    active_deadline_seconds: Option<u64>,
    /// Attach to (or update the entry on) this plan
    #[arg(long = "plan")]
    plan: Option<String>,
}

#[derive(Subcommand, Debug)]
enum HookCommands {
    Create(HookArgs),
    Update(HookArgs),
    Remove {
        name: String,
        #[arg(long = "plan")]
        plan: Option<String>,
    },
}

fn parse_kind(s: &str) -> Result<ResourceKind, String> {
    ResourceKind::from_str(s)
}

fn init_tracing() {
    let env = std::env::var("CUTOVER_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("CUTOVER_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => tracing::info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => tracing::warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            tracing::warn!(addr = %addr, "invalid CUTOVER_METRICS_ADDR; expected host:port");
        }
    }
}

fn load_config(cli: &Cli) -> Result<EngineConfig> {
    let mut cfg = match &cli.config {
        Some(path) => EngineConfig::from_yaml_file(path)?,
        None => EngineConfig::from_env(),
    };
    if let Some(ns) = &cli.namespace {
        cfg.namespace = ns.clone();
    }
    if let Commands::Refresh { ticks: Some(ticks), .. } = &cli.command {
        cfg.polls.refresh.max_ticks = Some(*ticks);
    }
    Ok(cfg)
}

fn hook_spec(args: HookArgs) -> Result<(HookSpec, Option<String>)> {
    let playbook = match &args.playbook {
        Some(path) => Some(std::fs::read_to_string(path).with_context(|| format!("reading playbook {}", path.display()))?),
        None => None,
    };
    let target_cluster = match args.cluster {
        Cluster::Source => HookCluster::Source,
        Cluster::Destination => HookCluster::Destination,
    };
    let spec = HookSpec {
        name: args.name,
        image: args.image,
        playbook,
        custom: args.custom,
        target_cluster,
        phase: args.phase,
        service_account: args.service_account,
        execution_namespace: args.execution_namespace,
        active_deadline_seconds: args.active_deadline_seconds,
    };
    Ok((spec, args.plan))
}

fn print_alert(alert: &Alert, output: Output) -> Result<()> {
    match output {
        Output::Human => match alert {
            Alert::Notice(n) => println!("[{:?}] {}", n.severity, n.message),
            Alert::CertificateTrustError { url } => {
                eprintln!("certificate for {} is not trusted; accept it and rerun", url)
            }
        },
        Output::Json => println!("{}", serde_json::to_string(alert)?),
    }
    Ok(())
}

fn print_event(ev: &OperationEvent, output: Output) -> Result<()> {
    if output == Output::Json {
        println!("{}", serde_json::to_string(ev)?);
        return Ok(());
    }
    match ev {
        OperationEvent::Started { kind, resource, .. } => println!("{} started: {}", kind, resource),
        OperationEvent::Progress { kind, result, .. } => match &result.message {
            Some(m) => println!("{} {}: {}", kind, result.status, m),
            None => println!("{} {}", kind, result.status),
        },
        OperationEvent::Listed { items, .. } => {
            println!("NAMESPACE            NAME");
            for item in items {
                println!("{:<20} {}", item.namespace().unwrap_or("-"), item.name());
            }
        }
        OperationEvent::ReadFailed { kind, error, .. } => eprintln!("{} read failed: {}", kind, error),
        OperationEvent::Finished { kind, outcome, .. } => match outcome {
            Outcome::Completed(r) => match &r.message {
                Some(m) => println!("{} finished: {} ({})", kind, r.status, m),
                None => println!("{} finished: {}", kind, r.status),
            },
            other => println!("{} finished: {}", kind, other.label()),
        },
    }
    Ok(())
}

fn print_described(d: &Described, output: Output) -> Result<()> {
    match output {
        Output::Human => {
            let ns = d.reference.namespace.as_deref().or_else(|| d.resource.as_ref().and_then(|r| r.namespace())).unwrap_or("-");
            let msg = d.result.message.as_deref().unwrap_or("");
            println!("KIND                 NAMESPACE/NAME                 STATUS       MESSAGE");
            println!("{:<20} {:<30} {:<12} {}", d.reference.kind, format!("{}/{}", ns, d.reference.name), d.result.status, msg);
        }
        Output::Json => println!("{}", serde_json::to_string_pretty(d)?),
    }
    Ok(())
}

/// Start `request`, print its events and notifications, and return its outcome.
/// Ctrl-C stops the run.
async fn run_operation(
    orch: &Orchestrator,
    alerts: &mut UnboundedReceiver<Alert>,
    request: OperationRequest,
    output: Output,
) -> Result<Outcome> {
    let kind = request.kind();
    let mut handle = orch.start(orch.operation(request)).await;
    loop {
        tokio::select! {
            ev = handle.next() => match ev {
                Some(ev) => {
                    while let Ok(alert) = alerts.try_recv() {
                        print_alert(&alert, output)?;
                    }
                    print_event(&ev, output)?;
                    if let OperationEvent::Finished { outcome, .. } = ev {
                        return Ok(outcome);
                    }
                }
                None => return Ok(Outcome::Stopped),
            },
            Some(alert) = alerts.recv() => print_alert(&alert, output)?,
            _ = signal::ctrl_c() => {
                info!(kind = %kind, "Ctrl-C received; stopping");
                orch.stop(kind).await;
            }
        }
    }
}

/// A refresh only ends on its tick budget, so running out of ticks is its success.
fn exit_status(kind: OperationKind, outcome: &Outcome) -> Result<()> {
    match outcome {
        Outcome::Completed(r) if matches!(kind, OperationKind::Refresh(_)) && r.status == Status::TimedOut => Ok(()),
        Outcome::Completed(r) if !matches!(r.status, Status::Failed | Status::TimedOut) => Ok(()),
        Outcome::Stopped => Ok(()),
        other => anyhow::bail!("operation did not succeed: {}", other.label()),
    }
}

fn read_error(e: OperationError) -> ClientError {
    match e {
        OperationError::Read(e) | OperationError::Write { source: e, .. } => e,
        OperationError::Canceled => ClientError::Transport("canceled".into()),
    }
}

/// Tree statuses that stay put once reached, though a poll loop does not end on them.
fn is_settled(status: Status) -> bool {
    matches!(status, Status::Completed | Status::Bound | Status::Admitted)
}

async fn watch(orch: Orchestrator, reference: ResourceRef, interval_ms: u64, output: Output) -> Result<()> {
    let probe = move || {
        let orch = orch.clone();
        let reference = reference.clone();
        async move { orch.describe(reference).await.map_err(read_error) }
    };
    let mut stream = PollLoop::new("watch", PollSpec::every(interval_ms)).spawn(16, probe, |d: &Described| d.result.clone());
    let mut last = None;
    loop {
        tokio::select! {
            ev = stream.rx.recv() => match ev {
                Some(PollEvent::Tick { observed, result, .. }) => {
                    let settled = is_settled(result.status);
                    if last.as_ref() != Some(&result) {
                        print_described(&observed, output)?;
                        last = Some(result);
                    }
                    if settled {
                        info!(status = %observed.result.status, "watch: settled");
                        stream.cancel.cancel();
                        break;
                    }
                }
                Some(PollEvent::ReadFailed { error, .. }) => eprintln!("read failed: {}", error),
                Some(PollEvent::Finished(LoopOutcome::Terminal(r))) => {
                    info!(status = %r.status, "watch: terminal");
                    break;
                }
                Some(PollEvent::Finished(other)) => {
                    info!(outcome = ?other, "watch: ended");
                    break;
                }
                None => break,
            },
            _ = signal::ctrl_c() => {
                info!("Ctrl-C received; stopping watch");
                stream.cancel.cancel();
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();
    let cfg = load_config(&cli)?;
    let output = cli.output;
    info!(ns = %cfg.namespace, "cutoverctl starting");

    let client = KubeClient::try_default().await?;
    let (sink, mut alerts) = ChannelSink::new();
    let orch = Orchestrator::new(Arc::new(client), Arc::new(sink), cfg);

    let request = match cli.command {
        Commands::Stage { plan } => OperationRequest::Stage { plan },
        Commands::Migrate { plan, quiesce } => OperationRequest::Migrate { plan, quiesce },
        Commands::Rollback { plan } => OperationRequest::Rollback { plan },
        Commands::Validate { plan, values } => {
            let text = std::fs::read_to_string(&values).with_context(|| format!("reading {}", values.display()))?;
            let mut values: PlanValues = serde_yaml::from_str(&text).with_context(|| format!("parsing {}", values.display()))?;
            values.plan_name = plan;
            OperationRequest::PlanValidate { values }
        }
        Commands::DiscoverPvs { plan, namespaces } => {
            OperationRequest::PvDiscovery { values: PlanValues { namespaces, ..PlanValues::for_plan(plan) } }
        }
        Commands::PlanStatus { plan } => OperationRequest::PlanStatus { plan },
        Commands::Close { plan } => OperationRequest::PlanClose { plan },
        Commands::Analytics { plan } => OperationRequest::AnalyticRefresh { plan },
        Commands::Hook { command } => match command {
            HookCommands::Create(args) => {
                let (hook, plan) = hook_spec(args)?;
                OperationRequest::HookCreate { hook, plan }
            }
            HookCommands::Update(args) => {
                let (hook, plan) = hook_spec(args)?;
                OperationRequest::HookUpdate { hook, plan }
            }
            HookCommands::Remove { name, plan } => OperationRequest::HookRemove { name, plan },
        },
        Commands::Refresh { kind, .. } => OperationRequest::Refresh { kind },
        Commands::Cancel { migration } => {
            let patched = orch.cancel_migration(&migration).await;
            while let Ok(alert) = alerts.try_recv() {
                print_alert(&alert, output)?;
            }
            match patched {
                Ok(true) => info!(migration = %migration, "cancel requested"),
                Ok(false) => println!("{} is already canceled", migration),
                Err(e) => anyhow::bail!("cancel failed: {}", e),
            }
            return Ok(());
        }
        Commands::Describe { kind, name } => {
            let d = orch.describe(ResourceRef::new(kind, name)).await.map_err(|e| anyhow::anyhow!("describe failed: {}", e))?;
            while let Ok(alert) = alerts.try_recv() {
                print_alert(&alert, output)?;
            }
            return print_described(&d, output);
        }
        Commands::Watch { kind, name, interval_ms } => {
            return watch(orch.clone(), ResourceRef::new(kind, name), interval_ms, output).await;
        }
    };

    let kind = request.kind();
    metrics::counter!("cli_operations_total", 1u64, "kind" => kind.label());
    let outcome = run_operation(&orch, &mut alerts, request, output).await?;
    let leftover = orch.stop_all().await;
    if leftover > 0 {
        warn!(stopped = leftover, "stopped follow-up loops on exit");
    }
    exit_status(kind, &outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cutover_api::ClassificationResult;

    #[test]
    fn parses_migrate_with_quiesce_and_globals() {
        let cli = Cli::try_parse_from(["cutoverctl", "-o", "json", "--ns", "mig", "migrate", "plan-a", "--quiesce"]).unwrap();
        assert_eq!(cli.output, Output::Json);
        assert_eq!(cli.namespace.as_deref(), Some("mig"));
        match cli.command {
            Commands::Migrate { plan, quiesce } => {
                assert_eq!(plan, "plan-a");
                assert!(quiesce);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn refresh_ticks_override_poll_budget() {
        let cli = Cli::try_parse_from(["cutoverctl", "refresh", "MigPlan", "--ticks", "3"]).unwrap();
        let cfg = load_config(&cli).unwrap();
        assert_eq!(cfg.polls.refresh.max_ticks, Some(3));
    }

    #[test]
    fn discover_pvs_splits_namespaces() {
        let cli = Cli::try_parse_from(["cutoverctl", "discover-pvs", "p", "--namespaces", "a,b"]).unwrap();
        match cli.command {
            Commands::DiscoverPvs { namespaces, .. } => assert_eq!(namespaces, vec!["a", "b"]),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn rejects_unknown_kind() {
        assert!(Cli::try_parse_from(["cutoverctl", "describe", "Widget", "x"]).is_err());
    }

    #[test]
    fn failed_outcomes_are_errors() {
        let stage = OperationKind::Stage;
        assert!(exit_status(stage, &Outcome::Stopped).is_ok());
        assert!(exit_status(stage, &Outcome::Completed(ClassificationResult::succeeded())).is_ok());
        assert!(exit_status(stage, &Outcome::Completed(ClassificationResult::failed(Some("x".into())))).is_err());
        assert!(exit_status(stage, &Outcome::Completed(ClassificationResult::timed_out(3))).is_err());
    }

    #[test]
    fn refresh_running_out_of_ticks_is_success() {
        let refresh = OperationKind::Refresh(ResourceKind::MigPlan);
        assert!(exit_status(refresh, &Outcome::Completed(ClassificationResult::timed_out(3))).is_ok());
        assert!(exit_status(refresh, &Outcome::Completed(ClassificationResult::failed(None))).is_err());
        let err = ClientError::Transport("reset".into());
        assert!(exit_status(refresh, &Outcome::RetryExhausted { attempts: 6, error: err }).is_err());
    }

    #[test]
    fn watch_stops_on_settled_tree_statuses() {
        for status in [Status::Completed, Status::Bound, Status::Admitted] {
            assert!(is_settled(status));
        }
        for status in [Status::Pending, Status::Running, Status::Terminating] {
            assert!(!is_settled(status));
        }
    }
}
