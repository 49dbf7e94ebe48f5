//! Structural comparison of resource snapshots.

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiffSummary {
    pub adds: usize,
    pub updates: usize,
    pub removes: usize,
}

impl DiffSummary {
    pub fn is_empty(&self) -> bool {
        self.adds == 0 && self.updates == 0 && self.removes == 0
    }
}

/// Drop metadata the server rewrites on every read.
pub fn strip_volatile(mut v: Json) -> Json {
    if let Some(meta) = v.get_mut("metadata").and_then(|m| m.as_object_mut()) {
        meta.remove("managedFields");
        meta.remove("resourceVersion");
        meta.remove("generation");
        meta.remove("creationTimestamp");
        meta.remove("annotations");
    }
    v
}

/// True when `a` and `b` differ outside volatile metadata.
pub fn is_materially_changed(a: &Json, b: &Json) -> bool {
    strip_volatile(a.clone()) != strip_volatile(b.clone())
}

pub fn diff_summary(target: &Json, base: &Json) -> DiffSummary {
    fn walk(a: &Json, b: &Json, out: &mut DiffSummary) {
        match (a, b) {
            (Json::Object(ao), Json::Object(bo)) => {
                for (k, av) in ao.iter() {
                    match bo.get(k) {
                        Some(bv) if av == bv => {}
                        Some(bv) => walk(av, bv, out),
                        None => out.adds += 1,
                    }
                }
                out.removes += bo.keys().filter(|k| !ao.contains_key(*k)).count();
            }
            (Json::Array(aa), Json::Array(bb)) => {
                let min_len = aa.len().min(bb.len());
                out.updates += (0..min_len).filter(|&i| aa[i] != bb[i]).count();
                out.adds += aa.len().saturating_sub(bb.len());
                out.removes += bb.len().saturating_sub(aa.len());
            }
            (av, bv) => {
                if av != bv {
                    out.updates += 1;
                }
            }
        }
    }
    let mut out = DiffSummary::default();
    walk(&strip_volatile(target.clone()), &strip_volatile(base.clone()), &mut out);
    out
}
