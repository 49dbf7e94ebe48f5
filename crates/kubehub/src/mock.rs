//! In-memory [`ResourceClient`] with scripted reads and injected write failures.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use serde_json::{json, Value as Json};

use cutover_core::{ClientError, ClientResult, Resource, ResourceKind};

use crate::ResourceClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    List,
    Get,
    Create,
    Patch,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub verb: Verb,
    pub kind: ResourceKind,
    pub namespace: String,
    pub name: String,
}

/// What a scripted `get` does to the stored object before answering.
#[derive(Debug, Clone)]
pub enum ReadStep {
    /// Merge the fragment into the stored object and return it.
    Merge(Json),
    /// Fail the read.
    Fail(ClientError),
    /// Remove the object; the read answers not-found.
    Gone,
}

impl ReadStep {
    pub fn status(status: Json) -> Self {
        ReadStep::Merge(json!({ "status": status }))
    }

    pub fn conditions(conditions: Json) -> Self {
        ReadStep::status(json!({ "conditions": conditions }))
    }
}

type Key = (ResourceKind, String, String);

#[derive(Default)]
struct State {
    objects: HashMap<Key, Json>,
    reads: HashMap<ResourceKind, VecDeque<ReadStep>>,
    write_failures: HashMap<(Verb, ResourceKind), VecDeque<ClientError>>,
    lost_replies: HashMap<(Verb, ResourceKind), VecDeque<ClientError>>,
    calls: Vec<Call>,
    version: u64,
}

/// Scripted stand-in for the remote API.
///
/// Read scripts are per kind: each `get` consumes one step, the last step
/// repeats forever.
pub struct ScriptedClient {
    state: Mutex<State>,
}

impl Default for ScriptedClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self { state: Mutex::new(State::default()) }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Store an object as if it already existed remotely.
    pub fn insert(&self, kind: ResourceKind, body: Json) {
        let mut st = self.lock();
        let ns = body.pointer("/metadata/namespace").and_then(|v| v.as_str()).unwrap_or("").to_string();
        let name = body.pointer("/metadata/name").and_then(|v| v.as_str()).unwrap_or("").to_string();
        st.objects.insert((kind, ns, name), body);
    }

    pub fn object(&self, kind: ResourceKind, namespace: &str, name: &str) -> Option<Json> {
        self.lock().objects.get(&(kind, namespace.to_string(), name.to_string())).cloned()
    }

    pub fn script_reads(&self, kind: ResourceKind, steps: Vec<ReadStep>) {
        self.lock().reads.insert(kind, steps.into());
    }

    /// Fail the next `errors.len()` writes of this verb and kind.
    pub fn fail_writes(&self, verb: Verb, kind: ResourceKind, errors: Vec<ClientError>) {
        self.lock().write_failures.insert((verb, kind), errors.into());
    }

    /// Apply the next `errors.len()` writes of this verb and kind, but answer
    /// each with an error as if the reply was lost.
    pub fn lose_replies(&self, verb: Verb, kind: ResourceKind, errors: Vec<ClientError>) {
        self.lock().lost_replies.insert((verb, kind), errors.into());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn count(&self, verb: Verb, kind: ResourceKind) -> usize {
        self.lock().calls.iter().filter(|c| c.verb == verb && c.kind == kind).count()
    }

    /// Number of `get` calls against one object.
    pub fn reads_of(&self, kind: ResourceKind, name: &str) -> usize {
        self.lock().calls.iter().filter(|c| c.verb == Verb::Get && c.kind == kind && c.name == name).count()
    }

    fn record(st: &mut State, verb: Verb, kind: ResourceKind, namespace: &str, name: &str) {
        st.calls.push(Call { verb, kind, namespace: namespace.to_string(), name: name.to_string() });
    }

    fn injected(st: &mut State, verb: Verb, kind: ResourceKind) -> Option<ClientError> {
        st.write_failures.get_mut(&(verb, kind)).and_then(|q| q.pop_front())
    }

    fn lost(st: &mut State, verb: Verb, kind: ResourceKind) -> Option<ClientError> {
        st.lost_replies.get_mut(&(verb, kind)).and_then(|q| q.pop_front())
    }

    fn bump(st: &mut State, obj: &mut Json) {
        st.version += 1;
        if let Some(meta) = obj.get_mut("metadata").and_then(|m| m.as_object_mut()) {
            meta.insert("resourceVersion".into(), Json::String(st.version.to_string()));
        }
    }
}

fn key(kind: ResourceKind, namespace: &str, name: &str) -> Key {
    let ns = if kind.namespaced() { namespace } else { "" };
    (kind, ns.to_string(), name.to_string())
}

/// JSON merge patch: objects merge recursively, `null` removes, everything else replaces.
pub fn merge(target: &mut Json, patch: &Json) {
    match patch {
        Json::Object(po) => {
            if !target.is_object() {
                *target = Json::Object(serde_json::Map::new());
            }
            if let Some(to) = target.as_object_mut() {
                for (k, v) in po {
                    if v.is_null() {
                        to.remove(k);
                    } else {
                        merge(to.entry(k.clone()).or_insert(Json::Null), v);
                    }
                }
            }
        }
        other => *target = other.clone(),
    }
}

#[async_trait::async_trait]
impl ResourceClient for ScriptedClient {
    async fn list(&self, kind: ResourceKind, namespace: &str) -> ClientResult<Vec<Resource>> {
        let mut st = self.lock();
        Self::record(&mut st, Verb::List, kind, namespace, "");
        let mut items: Vec<(&String, &Json)> = st
            .objects
            .iter()
            .filter(|((k, ns, _), _)| *k == kind && (!kind.namespaced() || ns == namespace))
            .map(|((_, _, name), v)| (name, v))
            .collect();
        items.sort_by(|a, b| a.0.cmp(b.0));
        Ok(items.into_iter().map(|(_, v)| Resource::from_value(v.clone())).collect())
    }

    async fn get(&self, kind: ResourceKind, namespace: &str, name: &str) -> ClientResult<Resource> {
        let mut st = self.lock();
        Self::record(&mut st, Verb::Get, kind, namespace, name);
        let step = st.reads.get_mut(&kind).and_then(|q| if q.len() > 1 { q.pop_front() } else { q.front().cloned() });
        let k = key(kind, namespace, name);
        match step {
            Some(ReadStep::Fail(e)) => return Err(e),
            Some(ReadStep::Gone) => {
                st.objects.remove(&k);
            }
            Some(ReadStep::Merge(fragment)) => {
                if let Some(obj) = st.objects.get_mut(&k) {
                    merge(obj, &fragment);
                }
            }
            None => {}
        }
        st.objects
            .get(&k)
            .cloned()
            .map(Resource::from_value)
            .ok_or_else(|| ClientError::NotFound(format!("{} {}/{}", kind, namespace, name)))
    }

    async fn create(&self, kind: ResourceKind, namespace: &str, body: &Json) -> ClientResult<Resource> {
        let mut st = self.lock();
        let name = body.pointer("/metadata/name").and_then(|v| v.as_str()).unwrap_or("").to_string();
        Self::record(&mut st, Verb::Create, kind, namespace, &name);
        if let Some(e) = Self::injected(&mut st, Verb::Create, kind) {
            return Err(e);
        }
        if name.is_empty() {
            return Err(ClientError::Invalid(format!("{}: metadata.name required", kind)));
        }
        let k = key(kind, namespace, &name);
        if st.objects.contains_key(&k) {
            return Err(ClientError::Conflict(format!("{} {} already exists", kind, name)));
        }
        let mut obj = body.clone();
        if kind.namespaced() {
            merge(&mut obj, &json!({ "metadata": { "namespace": namespace } }));
        }
        Self::bump(&mut st, &mut obj);
        st.objects.insert(k, obj.clone());
        if let Some(e) = Self::lost(&mut st, Verb::Create, kind) {
            return Err(e);
        }
        Ok(Resource::from_value(obj))
    }

    async fn patch(&self, kind: ResourceKind, namespace: &str, name: &str, patch: &Json) -> ClientResult<Resource> {
        let mut st = self.lock();
        Self::record(&mut st, Verb::Patch, kind, namespace, name);
        if let Some(e) = Self::injected(&mut st, Verb::Patch, kind) {
            return Err(e);
        }
        let k = key(kind, namespace, name);
        let mut obj = st
            .objects
            .get(&k)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("{} {}/{}", kind, namespace, name)))?;
        merge(&mut obj, patch);
        Self::bump(&mut st, &mut obj);
        st.objects.insert(k, obj.clone());
        if let Some(e) = Self::lost(&mut st, Verb::Patch, kind) {
            return Err(e);
        }
        Ok(Resource::from_value(obj))
    }

    async fn delete(&self, kind: ResourceKind, namespace: &str, name: &str) -> ClientResult<()> {
        let mut st = self.lock();
        Self::record(&mut st, Verb::Delete, kind, namespace, name);
        if let Some(e) = Self::injected(&mut st, Verb::Delete, kind) {
            return Err(e);
        }
        st.objects
            .remove(&key(kind, namespace, name))
            .map(|_| ())
            .ok_or_else(|| ClientError::NotFound(format!("{} {}/{}", kind, namespace, name)))
    }
}
