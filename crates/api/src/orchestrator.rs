//! Operation start/stop with one active loop per operation kind.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use arc_swap::ArcSwapOption;
use metrics::{counter, histogram};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use cutover_classify::{
    AnalyticClassifier, Classifier, ClassifierTable, HookReadyClassifier, HookRemovedClassifier, MigrationClassifier,
    PlanClosedClassifier, PlanStatusClassifier, PlanValidateClassifier, PvDiscoveryClassifier,
};
use cutover_core::{
    diff_summary, is_materially_changed, ClassificationResult, ClientError, ClientResult, OperationKind, Resource, ResourceKind,
};
use cutover_kubehub::ResourceClient;
use cutover_ops::{LoopOutcome, PollLoop, PollSpec, RetryError, TickReport};

use crate::config::EngineConfig;
use crate::conversions::{self, MigrationFlavor};
use crate::messages;
use crate::notify::{Notification, NotificationSink, Notifier};
use crate::operation::{HookSpec, Operation, OperationEvent, OperationHandle, OperationRequest, Outcome, PlanValues};

/// Errors of the one-shot calls that run outside any loop.
#[derive(Debug, thiserror::Error)]
pub enum OperationError {
    #[error("write failed after {attempts} attempts: {source}")]
    Write { attempts: u32, source: ClientError },
    #[error("read failed: {0}")]
    Read(#[from] ClientError),
    #[error("canceled")]
    Canceled,
}

impl From<RetryError<ClientError>> for OperationError {
    fn from(e: RetryError<ClientError>) -> Self {
        match e {
            RetryError::Exhausted { attempts_made, last_error } => {
                OperationError::Write { attempts: attempts_made, source: last_error }
            }
            RetryError::Aborted { attempts_made, error } => OperationError::Write { attempts: attempts_made, source: error },
            RetryError::Canceled { .. } => OperationError::Canceled,
        }
    }
}

/// Object reference for one-shot reads; `None` namespace means the engine's.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRef {
    pub kind: ResourceKind,
    pub namespace: Option<String>,
    pub name: String,
}

impl ResourceRef {
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self { kind, namespace: None, name: name.into() }
    }

    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }
}

/// One resource summarized by the resource-tree classifiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Described {
    pub reference: ResourceRef,
    pub resource: Option<Resource>,
    pub result: ClassificationResult,
}

struct ActiveLoop {
    id: u64,
    token: CancellationToken,
    task: JoinHandle<()>,
}

struct Inner {
    client: Arc<dyn ResourceClient>,
    notifier: Notifier,
    config: EngineConfig,
    tree: ClassifierTable,
    active: Mutex<FxHashMap<OperationKind, ActiveLoop>>,
    current_plan: ArcSwapOption<Resource>,
    next_id: AtomicU64,
    bus: broadcast::Sender<OperationEvent>,
}

/// Starts and stops operations against one resource client.
///
/// At most one run per [`OperationKind`] is active. Starting a kind that is
/// already running cancels the old run and waits for it to wind down before
/// the new run issues anything, so two runs never write the same object.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    pub fn new(client: Arc<dyn ResourceClient>, sink: Arc<dyn NotificationSink>, config: EngineConfig) -> Self {
        let (bus, _) = broadcast::channel(config.event_buffer.max(1));
        let tree = ClassifierTable::resource_tree(config.route_admission);
        Self {
            inner: Arc::new(Inner {
                client,
                notifier: Notifier::new(sink),
                config,
                tree,
                active: Mutex::new(FxHashMap::default()),
                current_plan: ArcSwapOption::empty(),
                next_id: AtomicU64::new(0),
                bus,
            }),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Bind a request to the configured namespace.
    pub fn operation(&self, request: OperationRequest) -> Operation {
        Operation::new(self.inner.config.namespace.clone(), request)
    }

    /// Start `op`, superseding any active run of the same kind.
    pub async fn start(&self, op: Operation) -> OperationHandle {
        let kind = op.kind();
        if let Some(prev) = self.inner.take_active(kind) {
            info!(kind = %kind, superseded = prev.id, "orchestrator: superseding active run");
            prev.token.cancel();
            let _ = prev.task.await;
        }
        self.inner.launch(op)
    }

    /// Stop the active run of `kind`. Returns whether one was running.
    pub async fn stop(&self, kind: OperationKind) -> bool {
        let Some(prev) = self.inner.take_active(kind) else {
            debug!(kind = %kind, "orchestrator: stop with nothing active");
            return false;
        };
        info!(kind = %kind, id = prev.id, "orchestrator: stop");
        prev.token.cancel();
        let _ = prev.task.await;
        true
    }

    /// Stop every active run.
    pub async fn stop_all(&self) -> usize {
        let drained: Vec<(OperationKind, ActiveLoop)> = self.inner.lock_active().drain().collect();
        let n = drained.len();
        for (_, l) in &drained {
            l.token.cancel();
        }
        for (kind, l) in drained {
            let _ = l.task.await;
            debug!(kind = %kind, id = l.id, "orchestrator: stopped");
        }
        info!(stopped = n, "orchestrator: stop all");
        n
    }

    pub fn is_active(&self, kind: OperationKind) -> bool {
        self.inner.lock_active().contains_key(&kind)
    }

    pub fn active_kinds(&self) -> Vec<OperationKind> {
        self.inner.lock_active().keys().copied().collect()
    }

    /// Every event of every run, including chained follow-ups.
    pub fn subscribe(&self) -> broadcast::Receiver<OperationEvent> {
        self.inner.bus.subscribe()
    }

    /// Last plan snapshot observed by any run.
    pub fn current_plan(&self) -> Option<Arc<Resource>> {
        self.inner.current_plan.load_full()
    }

    pub fn set_current_plan(&self, plan: Resource) {
        self.inner.current_plan.store(Some(Arc::new(plan)));
    }

    /// Re-arm certificate-trust reporting after the user dealt with the last one.
    pub fn acknowledge_certificate_error(&self) {
        self.inner.notifier.acknowledge();
    }

    /// Ask the controller to cancel a running migration. No loop is started;
    /// progress shows up on the migration's own loop.
    pub async fn cancel_migration(&self, name: &str) -> Result<bool, OperationError> {
        let t0 = Instant::now();
        let inner = &self.inner;
        let ns = inner.config.namespace.as_str();
        let never = CancellationToken::new();
        let res = inner
            .config
            .retry
            .run(&never, |e: &ClientError| inner.retryable(e), |_| async {
                let m = inner.client.get(ResourceKind::MigMigration, ns, name).await?;
                if m.spec_flag("canceled") {
                    return Ok::<_, ClientError>(false);
                }
                inner.client.patch(ResourceKind::MigMigration, ns, name, &conversions::canceled_patch()).await?;
                Ok(true)
            })
            .await;
        match res {
            Ok(done) => {
                if done.value {
                    inner.notifier.notify(Notification::success(format!("Cancel requested for \"{}\"!", name)));
                }
                info!(migration = %name, patched = done.value, took_ms = %t0.elapsed().as_millis(), "api: cancel_migration ok");
                Ok(done.value)
            }
            Err(e) => {
                warn!(migration = %name, error = %e, "api: cancel_migration failed");
                inner.notifier.notify(Notification::error(format!("Failed to cancel \"{}\"", name)));
                Err(e.into())
            }
        }
    }

    /// Fetch one resource and classify it with the resource-tree table.
    pub async fn describe(&self, reference: ResourceRef) -> Result<Described, OperationError> {
        let t0 = Instant::now();
        let ns = reference.namespace.clone().unwrap_or_else(|| self.inner.config.namespace.clone());
        let resource = match self.inner.client.get_opt(reference.kind, &ns, &reference.name).await {
            Ok(r) => r,
            Err(e) => {
                self.inner.flag_certificate(&e);
                return Err(e.into());
            }
        };
        let result = self.inner.tree.classify(reference.kind, resource.as_ref());
        debug!(kind = %reference.kind, name = %reference.name, status = %result.status, took_ms = %t0.elapsed().as_millis(), "api: describe ok");
        Ok(Described { reference, resource, result })
    }

    /// `describe` for many references, fetched concurrently, in input order.
    pub async fn describe_many(&self, refs: Vec<ResourceRef>) -> Vec<Result<Described, OperationError>> {
        futures::future::join_all(refs.into_iter().map(|r| self.describe(r))).await
    }
}

impl Inner {
    fn lock_active(&self) -> MutexGuard<'_, FxHashMap<OperationKind, ActiveLoop>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn take_active(&self, kind: OperationKind) -> Option<ActiveLoop> {
        self.lock_active().remove(&kind)
    }

    /// Drop the registry entry of run `id` and register its follow-ups in
    /// the same critical section. A run whose entry was already taken by a
    /// stop or a supersession chains nothing.
    fn release(self: &Arc<Self>, run: &OpRun, follow_ups: Vec<OperationRequest>) -> usize {
        let mut active = self.lock_active();
        if active.get(&run.kind).map(|l| l.id) != Some(run.id) {
            return 0;
        }
        active.remove(&run.kind);
        if run.token.is_cancelled() {
            return 0;
        }
        let n = follow_ups.len();
        for follow_up in follow_ups {
            let op = Operation::new(run.namespace.clone(), follow_up);
            debug!(kind = %run.kind, next = %op.kind(), "orchestrator: chaining");
            self.launch_locked(&mut active, op);
        }
        n
    }

    fn flag_certificate(&self, e: &ClientError) {
        if let Some(url) = e.certificate_url() {
            if self.notifier.certificate(url) {
                warn!(url = %url, "certificate not trusted; reported");
            }
        }
    }

    /// Retry predicate shared by every write; reports certificate failures on the way.
    fn retryable(&self, e: &ClientError) -> bool {
        self.flag_certificate(e);
        e.is_transient()
    }

    /// Replace the plan snapshot unless `fresh` is the same plan with only
    /// volatile fields changed.
    fn refresh_plan(&self, fresh: &Resource) -> bool {
        let prev = self.current_plan.load_full().filter(|cur| cur.name() == fresh.name());
        if let Some(cur) = &prev {
            if !is_materially_changed(cur.raw(), fresh.raw()) {
                return false;
            }
        }
        let changes = prev.map(|cur| diff_summary(fresh.raw(), cur.raw()));
        debug!(plan = %fresh.name(), version = ?fresh.resource_version(), changes = ?changes, "orchestrator: plan snapshot updated");
        self.current_plan.store(Some(Arc::new(fresh.clone())));
        true
    }

    fn forget_plan(&self, name: &str) {
        if self.current_plan.load_full().map(|p| p.name() == name).unwrap_or(false) {
            self.current_plan.store(None);
        }
    }

    /// Spawn a run and register it. The registry lock is held across the
    /// spawn so the run cannot release its entry before it exists.
    fn launch(self: &Arc<Self>, op: Operation) -> OperationHandle {
        let mut active = self.lock_active();
        self.launch_locked(&mut active, op)
    }

    fn launch_locked(self: &Arc<Self>, active: &mut FxHashMap<OperationKind, ActiveLoop>, op: Operation) -> OperationHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let kind = op.kind();
        let token = CancellationToken::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let run = OpRun {
            inner: self.clone(),
            id,
            kind,
            namespace: op.namespace,
            target: op.request.target(),
            token: token.clone(),
            events: tx,
        };
        let task = tokio::spawn(run.drive(op.request));
        if let Some(prev) = active.insert(kind, ActiveLoop { id, token, task }) {
            prev.token.cancel();
        }
        debug!(kind = %kind, id, "orchestrator: launched");
        OperationHandle { id, kind, events: rx }
    }
}

/// State of one run: identity, namespace and the channel back to its handle.
struct OpRun {
    inner: Arc<Inner>,
    id: u64,
    kind: OperationKind,
    namespace: String,
    target: String,
    token: CancellationToken,
    events: mpsc::UnboundedSender<OperationEvent>,
}

impl OpRun {
    async fn drive(self, request: OperationRequest) {
        let t0 = Instant::now();
        info!(kind = %self.kind, id = self.id, target = %self.target, ns = %self.namespace, "orchestrator: start");
        let polls = self.inner.config.polls;
        let mut then = Vec::new();
        let outcome = match &request {
            OperationRequest::Stage { plan } => self.migration(plan, MigrationFlavor::Stage).await,
            OperationRequest::Migrate { plan, quiesce } => {
                self.migration(plan, MigrationFlavor::Migrate { quiesce: *quiesce }).await
            }
            OperationRequest::Rollback { plan } => self.migration(plan, MigrationFlavor::Rollback).await,
            OperationRequest::PlanValidate { values } => {
                let out = self.plan_validate(values).await;
                if out.is_success() {
                    then.push(OperationRequest::PlanStatus { plan: values.plan_name.clone() });
                }
                out
            }
            OperationRequest::PvDiscovery { values } => {
                let (out, had_status) = self.pv_discovery(values).await;
                if out.is_success() {
                    then.push(OperationRequest::PlanStatus { plan: values.plan_name.clone() });
                    if had_status {
                        then.push(OperationRequest::AnalyticRefresh { plan: values.plan_name.clone() });
                    }
                }
                out
            }
            OperationRequest::PlanStatus { plan } => {
                self.announce(plan);
                self.poll(polls.plan_status, ResourceKind::MigPlan, plan, PlanStatusClassifier).await
            }
            OperationRequest::PlanClose { plan } => self.plan_close(plan).await,
            OperationRequest::AnalyticRefresh { plan } => self.analytic_refresh(plan).await,
            OperationRequest::HookCreate { hook, plan } => self.hook_create(hook, plan.as_deref()).await,
            OperationRequest::HookUpdate { hook, plan } => self.hook_update(hook, plan.as_deref()).await,
            OperationRequest::HookRemove { name, plan } => self.hook_remove(name, plan.as_deref()).await,
            OperationRequest::Refresh { kind } => self.refresh(*kind).await,
        };
        self.finish(&outcome, t0, then);
    }

    fn finish(&self, outcome: &Outcome, t0: Instant, follow_ups: Vec<OperationRequest>) {
        let took_ms = t0.elapsed().as_millis();
        counter!("operation_outcomes_total", 1u64, "kind" => self.kind.label(), "outcome" => outcome.label());
        histogram!("operation_ms", took_ms as f64, "kind" => self.kind.label());
        let chained = self.inner.release(self, follow_ups);
        if let Some(n) = messages::finished(self.kind, &self.target, outcome) {
            self.inner.notifier.notify(n);
        }
        info!(kind = %self.kind, id = self.id, target = %self.target, outcome = outcome.label(), chained, took_ms = %took_ms, "orchestrator: finished");
        self.emit(OperationEvent::Finished { id: self.id, kind: self.kind, outcome: outcome.clone() });
    }

    fn emit(&self, ev: OperationEvent) {
        let _ = self.inner.bus.send(ev.clone());
        let _ = self.events.send(ev);
    }

    fn client(&self) -> &dyn ResourceClient {
        self.inner.client.as_ref()
    }

    fn ns(&self) -> &str {
        &self.namespace
    }

    /// Write landed: tell the handle and the user.
    fn announce(&self, resource: &str) {
        self.emit(OperationEvent::Started {
            id: self.id,
            kind: self.kind,
            target: self.target.clone(),
            resource: resource.to_string(),
        });
        if let Some(n) = messages::started(self.kind, &self.target) {
            self.inner.notifier.notify(n);
        }
    }

    /// Run `attempt` under the retry policy and map failures to an outcome.
    /// A stop that lands while the write is in flight wins over its result.
    async fn write<T, F, Fut>(&self, what: &'static str, attempt: F) -> Result<T, Outcome>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = ClientResult<T>>,
    {
        let t0 = Instant::now();
        let inner = &self.inner;
        let res = inner.config.retry.run(&self.token, |e: &ClientError| inner.retryable(e), attempt).await;
        match res {
            Ok(_) if self.token.is_cancelled() => Err(Outcome::Stopped),
            Ok(done) => {
                debug!(kind = %self.kind, what, attempts = done.attempts_made, took_ms = %t0.elapsed().as_millis(), "orchestrator: write ok");
                Ok(done.value)
            }
            Err(RetryError::Exhausted { attempts_made, last_error }) => {
                Err(Outcome::RetryExhausted { attempts: attempts_made, error: last_error })
            }
            Err(RetryError::Aborted { attempts_made, error }) => {
                Err(Outcome::WriteRejected { attempts: attempts_made, error })
            }
            Err(RetryError::Canceled { .. }) => Err(Outcome::Stopped),
        }
    }

    /// Create, treating "already exists" as success by reading the object
    /// back. Names are unique per run so a conflict means an earlier attempt
    /// of this same write landed.
    async fn create_or_adopt(&self, kind: ResourceKind, body: &Json) -> ClientResult<Resource> {
        match self.client().create(kind, self.ns(), body).await {
            Err(e) if e.is_conflict() => {
                let name = body.pointer("/metadata/name").and_then(|v| v.as_str()).unwrap_or_default();
                debug!(kind = %kind, name = %name, "orchestrator: create conflicted; reading back");
                self.client().get(kind, self.ns(), name).await
            }
            other => other,
        }
    }

    async fn delete_if_present(&self, kind: ResourceKind, name: &str) -> ClientResult<()> {
        match self.client().delete(kind, self.ns(), name).await {
            Err(e) if e.is_not_found() => Ok(()),
            other => other,
        }
    }

    /// Poll `get(kind, name)` until `classifier` reports a terminal status.
    async fn poll<C: Classifier>(&self, spec: PollSpec, kind: ResourceKind, name: &str, classifier: C) -> Outcome {
        let probe = {
            let client = self.inner.client.clone();
            let ns = self.namespace.clone();
            let name = name.to_string();
            move || {
                let (client, ns, name) = (client.clone(), ns.clone(), name.clone());
                async move { client.get_opt(kind, &ns, &name).await }
            }
        };
        let lp = PollLoop::new(self.kind.label(), spec);
        let outcome = lp
            .run(
                &self.token,
                probe,
                |observed: &Option<Resource>| classifier.classify(observed.as_ref()),
                |report| self.observe(kind, report),
            )
            .await;
        match outcome {
            LoopOutcome::Terminal(result) => Outcome::Completed(result),
            LoopOutcome::TimedOut { ticks } => Outcome::Completed(ClassificationResult::timed_out(ticks).with_subject(Some(name))),
            LoopOutcome::Canceled { .. } => Outcome::Stopped,
        }
    }

    fn observe(&self, kind: ResourceKind, report: TickReport<'_, Option<Resource>>) {
        match report {
            TickReport::Observed { observed, result, .. } => {
                if let (ResourceKind::MigPlan, Some(plan)) = (kind, observed) {
                    self.inner.refresh_plan(plan);
                }
                if !result.is_terminal() {
                    self.emit(OperationEvent::Progress { id: self.id, kind: self.kind, result: result.clone() });
                }
            }
            TickReport::ReadFailed { error, .. } => {
                self.inner.flag_certificate(error);
                self.emit(OperationEvent::ReadFailed { id: self.id, kind: self.kind, error: error.clone() });
            }
        }
    }

    async fn migration(&self, plan: &str, flavor: MigrationFlavor) -> Outcome {
        let name = conversions::generated_name(flavor.prefix());
        let body = conversions::mig_migration_body(&name, plan, self.ns(), flavor);
        if let Err(out) = self.write("create migration", |_| self.create_or_adopt(ResourceKind::MigMigration, &body)).await {
            return out;
        }
        self.announce(&name);
        let classifier = match flavor {
            MigrationFlavor::Stage => MigrationClassifier::stage(),
            MigrationFlavor::Migrate { .. } => MigrationClassifier::migrate(),
            MigrationFlavor::Rollback => MigrationClassifier::rollback(),
        };
        self.poll(self.inner.config.polls.migration, ResourceKind::MigMigration, &name, classifier).await
    }

    async fn plan_validate(&self, values: &PlanValues) -> Outcome {
        let known = self.inner.current_plan.load_full().filter(|p| p.name() == values.plan_name);
        let fetched = self
            .write("patch plan", |_| async {
                let plan = self.client().get(ResourceKind::MigPlan, self.ns(), &values.plan_name).await?;
                let patch = conversions::plan_patch_from_values(&plan, values, false);
                self.client().patch(ResourceKind::MigPlan, self.ns(), plan.name(), &patch).await?;
                Ok::<_, ClientError>(plan)
            })
            .await;
        let fetched = match fetched {
            Ok(p) => p,
            Err(out) => return out,
        };
        self.announce(&values.plan_name);
        let baseline: &Resource = known.as_deref().unwrap_or(&fetched);
        let classifier = if conversions::storage_class_reassigned(baseline, values) {
            PlanValidateClassifier::awaiting_digest_change(baseline.observed_digest())
        } else {
            PlanValidateClassifier::immediate()
        };
        self.poll(self.inner.config.polls.plan_validate, ResourceKind::MigPlan, &values.plan_name, classifier).await
    }

    /// Returns the outcome and whether the plan already had a status.
    async fn pv_discovery(&self, values: &PlanValues) -> (Outcome, bool) {
        let fetched = self
            .write("patch plan", |_| async {
                let plan = self.client().get(ResourceKind::MigPlan, self.ns(), &values.plan_name).await?;
                let patch = conversions::plan_patch_from_values(&plan, values, plan.has_status());
                self.client().patch(ResourceKind::MigPlan, self.ns(), plan.name(), &patch).await?;
                Ok::<_, ClientError>(plan.has_status())
            })
            .await;
        let had_status = match fetched {
            Ok(h) => h,
            Err(out) => return (out, false),
        };
        self.announce(&values.plan_name);
        let spec = self.inner.config.polls.pv_discovery;
        let out = self.poll(spec, ResourceKind::MigPlan, &values.plan_name, PvDiscoveryClassifier::new(had_status)).await;
        (out, had_status)
    }

    async fn plan_close(&self, plan: &str) -> Outcome {
        let closed = self
            .write("close plan", |_| async {
                let current = self.client().get(ResourceKind::MigPlan, self.ns(), plan).await?;
                if !current.spec_flag("closed") {
                    self.client().patch(ResourceKind::MigPlan, self.ns(), plan, &conversions::closed_patch()).await?;
                }
                Ok::<_, ClientError>(())
            })
            .await;
        if let Err(out) = closed {
            return out;
        }
        self.announce(plan);
        let out = self.poll(self.inner.config.polls.plan_close, ResourceKind::MigPlan, plan, PlanClosedClassifier).await;
        if !out.is_success() {
            return out;
        }
        if let Err(out) = self.write("delete plan", |_| self.delete_if_present(ResourceKind::MigPlan, plan)).await {
            return out;
        }
        self.inner.forget_plan(plan);
        if let Err(e) = self.delete_if_present(ResourceKind::MigAnalytic, plan).await {
            warn!(plan = %plan, error = %e, "orchestrator: analytic cleanup failed");
        }
        out
    }

    async fn analytic_refresh(&self, plan: &str) -> Outcome {
        let body = conversions::mig_analytic_body(plan, self.ns());
        let recreated = self
            .write("recreate analytic", |_| async {
                self.delete_if_present(ResourceKind::MigAnalytic, plan).await?;
                self.create_or_adopt(ResourceKind::MigAnalytic, &body).await
            })
            .await;
        if let Err(out) = recreated {
            return out;
        }
        self.announce(plan);
        self.poll(self.inner.config.polls.analytic, ResourceKind::MigAnalytic, plan, AnalyticClassifier).await
    }

    /// Apply `edit` to the plan if it produces a patch.
    async fn patch_plan_hooks<E>(&self, plan: &str, edit: E) -> Result<(), Outcome>
    where
        E: Fn(&Resource) -> Option<Json>,
    {
        self.write("patch plan hooks", |_| async {
            let current = self.client().get(ResourceKind::MigPlan, self.ns(), plan).await?;
            match edit(&current) {
                Some(patch) => {
                    let updated = self.client().patch(ResourceKind::MigPlan, self.ns(), plan, &patch).await?;
                    self.inner.refresh_plan(&updated);
                }
                None => debug!(plan = %plan, "orchestrator: plan hooks unchanged"),
            }
            Ok::<_, ClientError>(())
        })
        .await
    }

    async fn hook_create(&self, hook: &HookSpec, plan: Option<&str>) -> Outcome {
        let body = conversions::mig_hook_body(hook, self.ns());
        if let Err(out) = self.write("create hook", |_| self.create_or_adopt(ResourceKind::MigHook, &body)).await {
            return out;
        }
        if let Some(plan) = plan {
            let entry = conversions::plan_hook_entry(hook, self.ns());
            if let Err(out) = self.patch_plan_hooks(plan, |p| conversions::plan_hooks_with(p, entry.clone())).await {
                return out;
            }
        }
        self.announce(&hook.name);
        self.poll(self.inner.config.polls.hook, ResourceKind::MigHook, &hook.name, HookReadyClassifier).await
    }

    async fn hook_update(&self, hook: &HookSpec, plan: Option<&str>) -> Outcome {
        let patch = conversions::hook_patch(hook);
        let patched = self
            .write("patch hook", |_| async {
                self.client().patch(ResourceKind::MigHook, self.ns(), &hook.name, &patch).await.map(|_| ())
            })
            .await;
        if let Err(out) = patched {
            return out;
        }
        if let Some(plan) = plan {
            let ns = self.ns();
            if let Err(out) = self.patch_plan_hooks(plan, |p| conversions::plan_hooks_updated(p, hook, ns)).await {
                return out;
            }
        }
        self.announce(&hook.name);
        self.poll(self.inner.config.polls.hook, ResourceKind::MigHook, &hook.name, HookReadyClassifier).await
    }

    async fn hook_remove(&self, name: &str, plan: Option<&str>) -> Outcome {
        if let Some(plan) = plan {
            if let Err(out) = self.patch_plan_hooks(plan, |p| conversions::plan_hooks_without(p, name)).await {
                return out;
            }
        }
        if let Err(out) = self.write("delete hook", |_| self.delete_if_present(ResourceKind::MigHook, name)).await {
            return out;
        }
        self.announce(name);
        self.poll(self.inner.config.polls.hook, ResourceKind::MigHook, name, HookRemovedClassifier).await
    }

    /// Pure-read list loop; runs until stopped or out of ticks.
    async fn refresh(&self, kind: ResourceKind) -> Outcome {
        self.announce(&kind.plural());
        let probe = {
            let client = self.inner.client.clone();
            let ns = self.namespace.clone();
            move || {
                let (client, ns) = (client.clone(), ns.clone());
                async move { client.list(kind, &ns).await }
            }
        };
        let lp = PollLoop::new(self.kind.label(), self.inner.config.polls.refresh);
        let outcome = lp
            .run(
                &self.token,
                probe,
                |_: &Vec<Resource>| ClassificationResult::running(),
                |report| match report {
                    TickReport::Observed { observed, .. } => {
                        if kind == ResourceKind::MigPlan {
                            if let Some(cur) = self.inner.current_plan.load_full() {
                                if let Some(fresh) = observed.iter().find(|p| p.name() == cur.name()) {
                                    self.inner.refresh_plan(fresh);
                                }
                            }
                        }
                        self.emit(OperationEvent::Listed { id: self.id, kind: self.kind, items: observed.clone() });
                    }
                    TickReport::ReadFailed { error, .. } => {
                        self.inner.flag_certificate(error);
                        self.emit(OperationEvent::ReadFailed { id: self.id, kind: self.kind, error: error.clone() });
                    }
                },
            )
            .await;
        match outcome {
            LoopOutcome::Terminal(result) => Outcome::Completed(result),
            LoopOutcome::TimedOut { ticks } => Outcome::Completed(ClassificationResult::timed_out(ticks)),
            LoopOutcome::Canceled { .. } => Outcome::Stopped,
        }
    }
}
