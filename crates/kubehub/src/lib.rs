//! Cutover kubehub: the resource client seam and its kube-rs implementation.

#![forbid(unsafe_code)]

use std::time::Instant;

use anyhow::{Context, Result};
use kube::{
    api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams},
    core::{ApiResource, DynamicObject, GroupVersionKind},
    Client,
};
use metrics::counter;
use serde_json::Value as Json;
use tracing::{debug, info};

use cutover_core::{ClientError, ClientResult, Resource, ResourceKind};

pub mod errors;
pub mod mock;

pub use errors::{classify_transport, from_kube, from_status};

/// CRUD over namespaced resources identified by (kind, namespace, name).
///
/// Implementations are shared by every running loop and must tolerate
/// concurrent calls.
#[async_trait::async_trait]
pub trait ResourceClient: Send + Sync {
    async fn list(&self, kind: ResourceKind, namespace: &str) -> ClientResult<Vec<Resource>>;
    async fn get(&self, kind: ResourceKind, namespace: &str, name: &str) -> ClientResult<Resource>;
    async fn create(&self, kind: ResourceKind, namespace: &str, body: &Json) -> ClientResult<Resource>;
    async fn patch(&self, kind: ResourceKind, namespace: &str, name: &str, patch: &Json) -> ClientResult<Resource>;
    async fn delete(&self, kind: ResourceKind, namespace: &str, name: &str) -> ClientResult<()>;

    /// `get` with not-found folded into `None`.
    async fn get_opt(&self, kind: ResourceKind, namespace: &str, name: &str) -> ClientResult<Option<Resource>> {
        match self.get(kind, namespace, name).await {
            Ok(r) => Ok(Some(r)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Resource client backed by kube-rs dynamic objects.
#[derive(Clone)]
pub struct KubeClient {
    client: Client,
    api_root: String,
}

impl KubeClient {
    /// Build from the inferred kubeconfig / in-cluster environment.
    pub async fn try_default() -> Result<Self> {
        let config = kube::Config::infer().await.context("inferring kube config")?;
        let api_root = config.cluster_url.to_string();
        let client = Client::try_from(config).context("building kube client")?;
        info!(api_root = %api_root, "kube client ready");
        Ok(Self { client, api_root })
    }

    pub fn new(client: Client, api_root: impl Into<String>) -> Self {
        Self { client, api_root: api_root.into() }
    }

    fn api(&self, kind: ResourceKind, namespace: &str) -> Api<DynamicObject> {
        let gvk = GroupVersionKind::gvk(kind.group(), kind.version(), kind.kind());
        let ar = ApiResource::from_gvk_with_plural(&gvk, &kind.plural());
        if kind.namespaced() {
            Api::namespaced_with(self.client.clone(), namespace, &ar)
        } else {
            Api::all_with(self.client.clone(), &ar)
        }
    }

    fn url(&self, kind: ResourceKind, namespace: &str, name: Option<&str>) -> String {
        let prefix = match kind.group() {
            "" => format!("{}/api/{}", self.api_root.trim_end_matches('/'), kind.version()),
            g => format!("{}/apis/{}/{}", self.api_root.trim_end_matches('/'), g, kind.version()),
        };
        let scoped = if kind.namespaced() { format!("{}/namespaces/{}", prefix, namespace) } else { prefix };
        match name {
            Some(n) => format!("{}/{}/{}", scoped, kind.plural(), n),
            None => format!("{}/{}", scoped, kind.plural()),
        }
    }

    fn finish<T>(&self, verb: &'static str, url: &str, t0: Instant, res: Result<T, kube::Error>) -> ClientResult<T> {
        counter!("client_requests_total", 1u64, "verb" => verb);
        match res {
            Ok(v) => {
                debug!(verb, url = %url, took_ms = %t0.elapsed().as_millis(), "kube: request ok");
                Ok(v)
            }
            Err(e) => {
                counter!("client_errors_total", 1u64, "verb" => verb);
                let mapped = from_kube(&self.api_root, e);
                debug!(verb, url = %url, error = %mapped, took_ms = %t0.elapsed().as_millis(), "kube: request failed");
                Err(mapped)
            }
        }
    }
}

fn to_resource(obj: &DynamicObject) -> ClientResult<Resource> {
    serde_json::to_value(obj).map(Resource::from_value).map_err(|e| ClientError::Invalid(e.to_string()))
}

#[async_trait::async_trait]
impl ResourceClient for KubeClient {
    async fn list(&self, kind: ResourceKind, namespace: &str) -> ClientResult<Vec<Resource>> {
        let t0 = Instant::now();
        let url = self.url(kind, namespace, None);
        let list = self.finish("list", &url, t0, self.api(kind, namespace).list(&ListParams::default()).await)?;
        list.items.iter().map(to_resource).collect()
    }

    async fn get(&self, kind: ResourceKind, namespace: &str, name: &str) -> ClientResult<Resource> {
        let t0 = Instant::now();
        let url = self.url(kind, namespace, Some(name));
        let obj = self.finish("get", &url, t0, self.api(kind, namespace).get(name).await)?;
        to_resource(&obj)
    }

    async fn create(&self, kind: ResourceKind, namespace: &str, body: &Json) -> ClientResult<Resource> {
        let t0 = Instant::now();
        let url = self.url(kind, namespace, None);
        let obj: DynamicObject =
            serde_json::from_value(body.clone()).map_err(|e| ClientError::Invalid(format!("{} body: {}", kind, e)))?;
        let created = self.finish("create", &url, t0, self.api(kind, namespace).create(&PostParams::default(), &obj).await)?;
        to_resource(&created)
    }

    async fn patch(&self, kind: ResourceKind, namespace: &str, name: &str, patch: &Json) -> ClientResult<Resource> {
        let t0 = Instant::now();
        let url = self.url(kind, namespace, Some(name));
        let res = self.api(kind, namespace).patch(name, &PatchParams::default(), &Patch::Merge(patch)).await;
        let obj = self.finish("patch", &url, t0, res)?;
        to_resource(&obj)
    }

    async fn delete(&self, kind: ResourceKind, namespace: &str, name: &str) -> ClientResult<()> {
        let t0 = Instant::now();
        let url = self.url(kind, namespace, Some(name));
        let res = self.api(kind, namespace).delete(name, &DeleteParams::default()).await;
        self.finish("delete", &url, t0, res).map(|_| ())
    }
}
