//! Per-call options for endpoint methods.
//!
//! Every struct carries an optional `namespace` that overrides the client's
//! default for that call only.

use serde_json::{Map, Value};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct AddMemoryParams {
    pub namespace: Option<String>,
    pub metadata: Option<Map<String, Value>>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct UpdateMemoryParams {
    pub namespace: Option<String>,
    /// New text content; left unchanged when `None`.
    pub content: Option<String>,
    pub metadata: Option<Map<String, Value>>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListMemoriesParams {
    pub namespace: Option<String>,
    pub node_type: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SearchParams {
    pub namespace: Option<String>,
    pub limit: Option<u32>,
    pub node_type: Option<String>,
    /// Inclusive `(start, end)` timestamps.
    pub time_range: Option<(i64, i64)>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListEntitiesParams {
    pub namespace: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AugmentParams {
    pub namespace: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct LearnParams {
    pub namespace: Option<String>,
    pub metadata: Option<Map<String, Value>>,
}
