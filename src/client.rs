use std::{fmt, sync::Arc};

use reqwest::{
    header::{self, HeaderMap, HeaderName, HeaderValue},
    Method, Url,
};
use serde::{de::DeserializeOwned, Serialize};

use crate::{
    executor::RetryExecutor,
    params::{
        AddMemoryParams, AugmentParams, LearnParams, ListEntitiesParams, ListMemoriesParams,
        SearchParams, UpdateMemoryParams,
    },
    transport::{ReqwestTransport, Transport, TransportRequest},
    types::{
        AugmentResponse, CreateMemoryResponse, EntityResponse, HealthResponse, LearnResponse,
        MemoryResponse, MetricsResponse, SearchResponse,
    },
    wire, CancelToken, ClientOptions, Result, UcotronError,
};

/// Header carrying the tenant namespace of a request (`X-Ucotron-Namespace`),
/// in the lowercase form sent on the wire.
pub const NAMESPACE_HEADER: &str = "x-ucotron-namespace";

/// One API call before header resolution: method, path, query, JSON body and
/// an optional namespace override.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestDescriptor {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
    pub namespace: Option<String>,
}

impl RequestDescriptor {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            namespace: None,
        }
    }

    /// Serializes `body` as the JSON payload.
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self> {
        let bytes = serde_json::to_vec(body).map_err(|err| {
            UcotronError::InvalidRequest(format!("request body is not serializable: {err}"))
        })?;
        self.body = Some(bytes);
        Ok(self)
    }

    /// Appends a query pair when `value` is present.
    pub fn query_opt(mut self, key: &str, value: Option<impl ToString>) -> Self {
        if let Some(value) = value {
            self.query.push((key.to_owned(), value.to_string()));
        }
        self
    }

    pub fn namespace(mut self, namespace: Option<&str>) -> Self {
        self.namespace = namespace.map(str::to_owned);
        self
    }
}

#[derive(Clone)]
/// HTTP client for the Ucotron cognitive memory server.
///
/// Cloning is cheap; clones share the connection pool and retry policy.
pub struct UcotronClient {
    base_url: String,
    options: ClientOptions,
    executor: RetryExecutor,
    cancel: Option<CancelToken>,
}

impl fmt::Debug for UcotronClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UcotronClient")
            .field("base_url", &self.base_url)
            .field("options", &self.options)
            .field("cancellable", &self.cancel.is_some())
            .finish()
    }
}

impl UcotronClient {
    /// Creates a client for `server_url` (e.g. `http://localhost:8420`) with default options.
    pub fn new(server_url: impl AsRef<str>) -> Self {
        let options = ClientOptions::default();
        Self {
            base_url: server_url.as_ref().trim_end_matches('/').to_owned(),
            executor: RetryExecutor::new(Arc::new(ReqwestTransport::new()), options.retry.clone()),
            options,
            cancel: None,
        }
    }

    /// Creates a client from environment variables.
    ///
    /// Reads `UCOTRON_SERVER_URL` (required) plus everything
    /// [`ClientOptions::from_env`] understands.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use ucotron_http::UcotronClient;
    ///
    /// let client = UcotronClient::from_env().expect("missing UCOTRON_SERVER_URL");
    /// ```
    pub fn from_env() -> Result<Self> {
        let url = std::env::var("UCOTRON_SERVER_URL").map_err(|_| {
            UcotronError::Config("missing UCOTRON_SERVER_URL environment variable".to_owned())
        })?;
        if url.trim().is_empty() {
            return Err(UcotronError::Config(
                "UCOTRON_SERVER_URL is set but empty".to_owned(),
            ));
        }
        Ok(Self::new(url.trim()).with_options(ClientOptions::from_env()?))
    }

    /// Applies client options such as timeout, retry policy, namespace and API key.
    pub fn with_options(mut self, opts: ClientOptions) -> Self {
        self.executor = self.executor.with_policy(opts.retry.clone());
        self.options = opts;
        self
    }

    /// Replaces the HTTP transport, keeping the current retry policy.
    pub fn with_transport(mut self, transport: impl Transport + 'static) -> Self {
        self.executor = RetryExecutor::new(Arc::new(transport), self.options.retry.clone());
        self
    }

    /// Returns a clone whose calls fail with [`UcotronError::Cancelled`] once `token` fires.
    ///
    /// ```no_run
    /// # async fn run() -> ucotron_http::Result<()> {
    /// use ucotron_http::{CancelToken, UcotronClient};
    ///
    /// let client = UcotronClient::new("http://localhost:8420");
    /// let token = CancelToken::new();
    /// let scoped = client.with_cancellation(token.clone());
    /// let health = tokio::spawn(async move { scoped.health().await });
    /// token.cancel();
    /// # let _ = health.await;
    /// # Ok(())
    /// # }
    /// ```
    pub fn with_cancellation(&self, token: CancelToken) -> Self {
        Self {
            cancel: Some(token),
            ..self.clone()
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Checks server health.
    pub async fn health(&self) -> Result<HealthResponse> {
        let descriptor = RequestDescriptor::new(Method::GET, "/api/v1/health");
        self.request_json(descriptor, "health").await
    }

    /// Fetches server request counters and uptime.
    pub async fn metrics(&self) -> Result<MetricsResponse> {
        let descriptor = RequestDescriptor::new(Method::GET, "/api/v1/metrics");
        self.request_json(descriptor, "metrics").await
    }

    /// Ingests `text` as a new memory.
    pub async fn add_memory(
        &self,
        text: &str,
        params: AddMemoryParams,
    ) -> Result<CreateMemoryResponse> {
        let body = wire::CreateMemoryRequest {
            text,
            metadata: params.metadata.as_ref(),
        };
        let descriptor = RequestDescriptor::new(Method::POST, "/api/v1/memories")
            .json(&body)?
            .namespace(params.namespace.as_deref());
        self.request_json(descriptor, "create memory").await
    }

    pub async fn get_memory(&self, id: i64, namespace: Option<&str>) -> Result<MemoryResponse> {
        let descriptor = RequestDescriptor::new(Method::GET, format!("/api/v1/memories/{id}"))
            .namespace(namespace);
        self.request_json(descriptor, "memory").await
    }

    /// Lists memories, optionally filtered by node type and paginated.
    pub async fn list_memories(&self, params: ListMemoriesParams) -> Result<Vec<MemoryResponse>> {
        let descriptor = RequestDescriptor::new(Method::GET, "/api/v1/memories")
            .query_opt("limit", params.limit)
            .query_opt("offset", params.offset)
            .query_opt("node_type", params.node_type.as_deref())
            .namespace(params.namespace.as_deref());
        self.request_json(descriptor, "list memories").await
    }

    /// Updates a memory's content and/or metadata.
    pub async fn update_memory(
        &self,
        id: i64,
        params: UpdateMemoryParams,
    ) -> Result<MemoryResponse> {
        let body = wire::UpdateMemoryRequest {
            content: params.content.as_deref(),
            metadata: params.metadata.as_ref(),
        };
        let descriptor = RequestDescriptor::new(Method::PUT, format!("/api/v1/memories/{id}"))
            .json(&body)?
            .namespace(params.namespace.as_deref());
        self.request_json(descriptor, "update memory").await
    }

    /// Soft-deletes a memory.
    pub async fn delete_memory(&self, id: i64, namespace: Option<&str>) -> Result<()> {
        let descriptor = RequestDescriptor::new(Method::DELETE, format!("/api/v1/memories/{id}"))
            .namespace(namespace);
        self.send(descriptor).await.map(|_| ())
    }

    /// Semantic search over stored memories.
    pub async fn search(&self, query: &str, params: SearchParams) -> Result<SearchResponse> {
        let body = wire::SearchRequest {
            query,
            limit: params.limit,
            node_type: params.node_type.as_deref(),
            time_range: params.time_range,
        };
        let descriptor = RequestDescriptor::new(Method::POST, "/api/v1/memories/search")
            .json(&body)?
            .namespace(params.namespace.as_deref());
        self.request_json(descriptor, "search").await
    }

    /// Fetches an entity together with its graph neighbors.
    pub async fn get_entity(&self, id: i64, namespace: Option<&str>) -> Result<EntityResponse> {
        let descriptor = RequestDescriptor::new(Method::GET, format!("/api/v1/entities/{id}"))
            .namespace(namespace);
        self.request_json(descriptor, "entity").await
    }

    pub async fn list_entities(&self, params: ListEntitiesParams) -> Result<Vec<EntityResponse>> {
        let descriptor = RequestDescriptor::new(Method::GET, "/api/v1/entities")
            .query_opt("limit", params.limit)
            .query_opt("offset", params.offset)
            .namespace(params.namespace.as_deref());
        self.request_json(descriptor, "list entities").await
    }

    /// Retrieves memories and entities relevant to `context`, plus a
    /// ready-to-prompt context text.
    pub async fn augment(&self, context: &str, params: AugmentParams) -> Result<AugmentResponse> {
        let body = wire::AugmentRequest {
            context,
            limit: params.limit,
        };
        let descriptor = RequestDescriptor::new(Method::POST, "/api/v1/augment")
            .json(&body)?
            .namespace(params.namespace.as_deref());
        self.request_json(descriptor, "augment").await
    }

    /// Extracts and stores memories from agent output.
    pub async fn learn(&self, output: &str, params: LearnParams) -> Result<LearnResponse> {
        let body = wire::LearnRequest {
            output,
            metadata: params.metadata.as_ref(),
        };
        let descriptor = RequestDescriptor::new(Method::POST, "/api/v1/learn")
            .json(&body)?
            .namespace(params.namespace.as_deref());
        self.request_json(descriptor, "learn").await
    }

    /// Sends a raw request through the retry executor and returns the success body.
    pub async fn send(&self, descriptor: RequestDescriptor) -> Result<Vec<u8>> {
        let request = self.prepare(descriptor)?;
        self.executor.execute(&request, self.cancel.as_ref()).await
    }

    async fn request_json<T: DeserializeOwned>(
        &self,
        descriptor: RequestDescriptor,
        what: &str,
    ) -> Result<T> {
        let body = self.send(descriptor).await?;
        serde_json::from_slice::<T>(&body).map_err(|err| {
            UcotronError::Decode(format!(
                "invalid {what} response JSON: {err}; body: {}",
                String::from_utf8_lossy(&body)
            ))
        })
    }

    /// Resolves URL and headers once per call; every attempt reuses the result.
    fn prepare(&self, descriptor: RequestDescriptor) -> Result<TransportRequest> {
        let mut url = Url::parse(&format!("{}{}", self.base_url, descriptor.path))
            .map_err(|err| UcotronError::Config(format!("invalid server url: {err}")))?;
        if !descriptor.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&descriptor.query);
        }

        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        if descriptor.body.is_some() {
            headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            );
        }
        if let Some(namespace) = self.resolve_namespace(descriptor.namespace.as_deref()) {
            let value = HeaderValue::from_str(namespace).map_err(|_| {
                UcotronError::InvalidRequest(format!("invalid namespace {namespace:?}"))
            })?;
            headers.insert(HeaderName::from_static(NAMESPACE_HEADER), value);
        }
        if let Some(api_key) = self.api_key() {
            let mut value = HeaderValue::from_str(&normalize_bearer_authorization(api_key))
                .map_err(|_| {
                    UcotronError::Config("API key is not a valid header value".to_owned())
                })?;
            value.set_sensitive(true);
            headers.insert(header::AUTHORIZATION, value);
        }

        Ok(TransportRequest {
            method: descriptor.method,
            url: url.into(),
            headers,
            body: descriptor.body,
            timeout: Some(self.options.timeout()),
        })
    }

    /// Configured API key, unless empty or whitespace.
    fn api_key(&self) -> Option<&str> {
        self.options
            .api_key
            .as_deref()
            .filter(|api_key| !api_key.trim().is_empty())
    }

    /// Per-call override, then the configured default. Empty strings count as absent.
    fn resolve_namespace<'a>(&'a self, override_ns: Option<&'a str>) -> Option<&'a str> {
        override_ns
            .filter(|namespace| !namespace.is_empty())
            .or(self.options.default_namespace.as_deref())
            .filter(|namespace| !namespace.is_empty())
    }
}

fn normalize_bearer_authorization(token: &str) -> String {
    let trimmed = token.trim();
    let prefix = trimmed.get(..7);
    if prefix.is_some_and(|value| value.eq_ignore_ascii_case("bearer ")) {
        trimmed.to_owned()
    } else {
        format!("Bearer {trimmed}")
    }
}
