use std::ops::Deref;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use smallvec::SmallVec;

/// Condition severity as reported by the remote controller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Category {
    Critical,
    Error,
    Warn,
    Other(String),
}

impl From<String> for Category {
    fn from(s: String) -> Self {
        match s.as_str() {
            "Critical" => Category::Critical,
            "Error" => Category::Error,
            "Warn" => Category::Warn,
            _ => Category::Other(s),
        }
    }
}

impl From<Category> for String {
    fn from(c: Category) -> Self {
        match c {
            Category::Critical => "Critical".into(),
            Category::Error => "Error".into(),
            Category::Warn => "Warn".into(),
            Category::Other(s) => s,
        }
    }
}

/// One status fact copied from `status.conditions[]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Condition {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl Condition {
    pub fn new(kind: impl Into<String>) -> Self {
        Self { kind: kind.into(), category: None, message: None, status: None }
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Lenient parse: entries without a string `type` are skipped by the caller.
    pub fn from_json(v: &Json) -> Option<Self> {
        let obj = v.as_object()?;
        let kind = obj.get("type")?.as_str()?.to_string();
        let text = |k: &str| obj.get(k).and_then(|x| x.as_str()).map(|s| s.to_string());
        Some(Self {
            kind,
            category: text("category").map(Category::from),
            message: text("message"),
            status: text("status"),
        })
    }

    pub fn is_failure(&self) -> bool {
        self.kind == "Failed" || self.category == Some(Category::Critical)
    }
}

/// Ordered condition list of one resource; duplicates are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Conditions(SmallVec<[Condition; 4]>);

impl Conditions {
    pub fn from_json(v: Option<&Json>) -> Self {
        let items = v
            .and_then(|x| x.as_array())
            .map(|arr| arr.iter().filter_map(Condition::from_json).collect())
            .unwrap_or_default();
        Self(items)
    }

    pub fn find_type(&self, kind: &str) -> Option<&Condition> {
        self.0.iter().find(|c| c.kind == kind)
    }

    pub fn any_type(&self, kinds: &[&str]) -> bool {
        self.0.iter().any(|c| kinds.contains(&c.kind.as_str()))
    }

    pub fn find_category(&self, category: &Category) -> Option<&Condition> {
        self.0.iter().find(|c| c.category.as_ref() == Some(category))
    }

    /// First `Failed`-typed or `Critical`-category condition.
    pub fn failure(&self) -> Option<&Condition> {
        self.0.iter().find(|c| c.is_failure())
    }
}

impl Deref for Conditions {
    type Target = [Condition];
    fn deref(&self) -> &[Condition] {
        &self.0
    }
}

impl FromIterator<Condition> for Conditions {
    fn from_iter<I: IntoIterator<Item = Condition>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Raw object as returned by the API with read-only accessors.
///
/// Accessors never fail: a missing or mistyped field reads as absent so
/// classifiers can treat shape drift as "not there yet".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Resource {
    raw: Json,
}

impl Resource {
    pub fn from_value(mut raw: Json) -> Self {
        if cfg!(feature = "strip-managed-fields") {
            if let Some(meta) = raw.get_mut("metadata").and_then(|m| m.as_object_mut()) {
                meta.remove("managedFields");
            }
        }
        Self { raw }
    }

    pub fn raw(&self) -> &Json {
        &self.raw
    }

    pub fn into_raw(self) -> Json {
        self.raw
    }

    pub fn pointer(&self, path: &str) -> Option<&Json> {
        self.raw.pointer(path)
    }

    fn str_at(&self, path: &str) -> Option<&str> {
        self.raw.pointer(path).and_then(|v| v.as_str())
    }

    pub fn name(&self) -> &str {
        self.str_at("/metadata/name").unwrap_or("")
    }

    pub fn namespace(&self) -> Option<&str> {
        self.str_at("/metadata/namespace")
    }

    pub fn resource_version(&self) -> Option<&str> {
        self.str_at("/metadata/resourceVersion")
    }

    pub fn deletion_timestamp(&self) -> Option<&str> {
        self.str_at("/metadata/deletionTimestamp")
    }

    /// `spec.<key> == true`; anything else reads as false.
    pub fn spec_flag(&self, key: &str) -> bool {
        self.raw.get("spec").and_then(|s| s.get(key)).and_then(|v| v.as_bool()).unwrap_or(false)
    }

    pub fn mig_plan_ref(&self) -> Option<&str> {
        self.str_at("/spec/migPlanRef/name")
    }

    pub fn status(&self) -> Option<&Json> {
        self.raw.get("status").filter(|s| s.is_object())
    }

    pub fn has_status(&self) -> bool {
        self.status().is_some()
    }

    pub fn phase(&self) -> Option<&str> {
        self.str_at("/status/phase")
    }

    pub fn observed_digest(&self) -> Option<&str> {
        self.str_at("/status/observedDigest")
    }

    pub fn conditions(&self) -> Conditions {
        Conditions::from_json(self.raw.pointer("/status/conditions"))
    }

    /// Size of `status.<key>`: array length, or the value itself when reported as a count.
    pub fn status_count(&self, key: &str) -> u64 {
        match self.status().and_then(|s| s.get(key)) {
            Some(Json::Array(a)) => a.len() as u64,
            Some(v) => v.as_u64().unwrap_or(0),
            None => 0,
        }
    }
}

impl From<Json> for Resource {
    fn from(v: Json) -> Self {
        Resource::from_value(v)
    }
}
