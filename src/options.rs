use std::{fmt, str::FromStr, time::Duration};

use crate::{Result, RetryPolicy, UcotronError};

const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Configures timeout, retry behavior, namespace and authentication.
#[derive(Clone, Eq, PartialEq)]
pub struct ClientOptions {
    /// Per-request timeout in milliseconds. Expiry counts as a retryable transport failure.
    pub timeout_ms: u64,
    /// Retry budget and backoff schedule.
    pub retry: RetryPolicy,
    /// Namespace sent when a call does not override it.
    pub default_namespace: Option<String>,
    /// Sent as `Authorization: Bearer <key>` when set.
    pub api_key: Option<String>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            retry: RetryPolicy::default(),
            default_namespace: None,
            api_key: None,
        }
    }
}

impl fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientOptions")
            .field("timeout_ms", &self.timeout_ms)
            .field("retry", &self.retry)
            .field("default_namespace", &self.default_namespace)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl ClientOptions {
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_default_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.default_namespace = Some(namespace.into());
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Reads options from `UCOTRON_*` environment variables.
    ///
    /// Recognized variables:
    /// - `UCOTRON_TIMEOUT_MS`
    /// - `UCOTRON_MAX_RETRIES`
    /// - `UCOTRON_BASE_DELAY_MS`, `UCOTRON_MAX_DELAY_MS` (zero keeps the default)
    /// - `UCOTRON_RETRY_JITTER` (`true`/`false`)
    /// - `UCOTRON_NAMESPACE`
    /// - `UCOTRON_API_KEY`
    ///
    /// Unset or empty variables keep their defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };

        let mut options = Self::default();
        if let Some(timeout_ms) =
            parse_var::<u64>("UCOTRON_TIMEOUT_MS", get("UCOTRON_TIMEOUT_MS"))?
        {
            if timeout_ms > 0 {
                options.timeout_ms = timeout_ms;
            }
        }
        if let Some(max_retries) =
            parse_var::<usize>("UCOTRON_MAX_RETRIES", get("UCOTRON_MAX_RETRIES"))?
        {
            options.retry.max_retries = max_retries;
        }
        if let Some(base_ms) =
            parse_var::<u64>("UCOTRON_BASE_DELAY_MS", get("UCOTRON_BASE_DELAY_MS"))?
        {
            if base_ms > 0 {
                options.retry.base_delay = Duration::from_millis(base_ms);
            }
        }
        if let Some(max_ms) =
            parse_var::<u64>("UCOTRON_MAX_DELAY_MS", get("UCOTRON_MAX_DELAY_MS"))?
        {
            if max_ms > 0 {
                options.retry.max_delay = Duration::from_millis(max_ms);
            }
        }
        if let Some(jitter) =
            parse_var::<bool>("UCOTRON_RETRY_JITTER", get("UCOTRON_RETRY_JITTER"))?
        {
            options.retry.jitter = jitter;
        }
        options.default_namespace = get("UCOTRON_NAMESPACE");
        options.api_key = get("UCOTRON_API_KEY");
        Ok(options)
    }
}

fn parse_var<T>(key: &str, value: Option<String>) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|err| UcotronError::Config(format!("{key}={raw:?} is invalid: {err}")))
        })
        .transpose()
}
