//! `ucotron-http` is an async HTTP client for the Ucotron cognitive memory server.
//!
//! [`UcotronClient`] wraps the server's REST API:
//! - health and metrics: [`UcotronClient::health`], [`UcotronClient::metrics`]
//! - memory CRUD: [`UcotronClient::add_memory`], [`UcotronClient::get_memory`],
//!   [`UcotronClient::list_memories`], [`UcotronClient::update_memory`],
//!   [`UcotronClient::delete_memory`]
//! - retrieval: [`UcotronClient::search`], [`UcotronClient::get_entity`],
//!   [`UcotronClient::list_entities`], [`UcotronClient::augment`]
//! - ingestion from agent output: [`UcotronClient::learn`]
//!
//! Every call goes through a [`RetryExecutor`]: 4xx responses fail immediately
//! with [`UcotronError::Server`], while 5xx responses and transport failures are
//! retried with exponential backoff per [`RetryPolicy`] before ending in
//! [`UcotronError::RetriesExhausted`].

mod cancel;
mod client;
mod error;
mod executor;
mod options;
mod params;
mod retry;
mod transport;
mod types;
mod wire;

pub use cancel::CancelToken;
pub use client::{RequestDescriptor, UcotronClient, NAMESPACE_HEADER};
pub use error::{is_retryable_status, AttemptError, ServerError, TransportError, UcotronError};
pub use executor::RetryExecutor;
pub use options::ClientOptions;
pub use params::{
    AddMemoryParams, AugmentParams, LearnParams, ListEntitiesParams, ListMemoriesParams,
    SearchParams, UpdateMemoryParams,
};
pub use retry::RetryPolicy;
pub use transport::{ReqwestTransport, Transport, TransportRequest, TransportResponse};
pub use types::{
    AugmentResponse, CreateMemoryResponse, EntityResponse, HealthResponse, IngestionMetrics,
    LearnResponse, MemoryResponse, MetricsResponse, ModelStatus, NeighborResponse,
    SearchResponse, SearchResultItem,
};

pub use async_trait::async_trait;
pub use reqwest::Method;

pub type Result<T> = std::result::Result<T, UcotronError>;
