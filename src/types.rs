use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ModelStatus {
    pub embedder_loaded: bool,
    pub embedding_model: String,
    pub ner_loaded: bool,
    pub relation_extractor_loaded: bool,
    pub transcriber_loaded: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub instance_id: String,
    #[serde(default)]
    pub instance_role: String,
    #[serde(default)]
    pub storage_mode: String,
    #[serde(default)]
    pub vector_backend: String,
    #[serde(default)]
    pub graph_backend: String,
    #[serde(default)]
    pub models: ModelStatus,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MetricsResponse {
    pub instance_id: String,
    pub total_requests: u64,
    pub total_ingestions: u64,
    pub total_searches: u64,
    pub uptime_secs: u64,
}

/// Timing and counts reported for one ingestion.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct IngestionMetrics {
    pub chunks_processed: u64,
    pub entities_extracted: u64,
    pub relations_extracted: u64,
    pub contradictions_detected: u64,
    pub total_us: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CreateMemoryResponse {
    pub chunk_node_ids: Vec<i64>,
    pub entity_node_ids: Vec<i64>,
    pub edges_created: u64,
    pub metrics: IngestionMetrics,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct MemoryResponse {
    pub id: i64,
    pub content: String,
    pub node_type: String,
    pub timestamp: i64,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// One search hit with its scoring breakdown.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct SearchResultItem {
    pub id: i64,
    pub content: String,
    pub node_type: String,
    pub score: f64,
    #[serde(default)]
    pub vector_sim: f64,
    #[serde(default)]
    pub graph_centrality: f64,
    #[serde(default)]
    pub recency: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SearchResponse {
    pub results: Vec<SearchResultItem>,
    pub total: u64,
    pub query: String,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct NeighborResponse {
    pub node_id: i64,
    pub content: String,
    pub edge_type: String,
    pub weight: f64,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct EntityResponse {
    pub id: i64,
    pub content: String,
    pub node_type: String,
    pub timestamp: i64,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Present only when the server expanded the entity's graph neighborhood.
    #[serde(default)]
    pub neighbors: Option<Vec<NeighborResponse>>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AugmentResponse {
    pub memories: Vec<SearchResultItem>,
    pub entities: Vec<EntityResponse>,
    pub context_text: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LearnResponse {
    pub memories_created: u64,
    pub entities_found: u64,
    pub conflicts_found: u64,
}
