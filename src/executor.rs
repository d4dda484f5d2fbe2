use std::{future::Future, sync::Arc};

use reqwest::StatusCode;

// tokio::time::sleep yields the worker while waiting between attempts.
use tokio::time::sleep;

use crate::{
    error::{is_retryable_status, AttemptError, ServerError},
    transport::{Transport, TransportRequest, TransportResponse},
    wire, CancelToken, Result, RetryPolicy, UcotronError,
};

/// Classification of one HTTP response.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Outcome {
    /// 2xx: return the body to the caller.
    Success(Vec<u8>),
    /// 4xx: fail immediately.
    ClientError(ServerError),
    /// Any other status: record and retry while budget remains.
    Retryable(ServerError),
}

pub(crate) fn classify(response: TransportResponse) -> Outcome {
    match response.status {
        200..=299 => Outcome::Success(response.body),
        status if is_retryable_status(status) => {
            Outcome::Retryable(parse_server_error(status, &response.body))
        }
        status => Outcome::ClientError(parse_server_error(status, &response.body)),
    }
}

/// Parses `{"code", "message"}`; falls back to the reason phrase and raw body text.
pub(crate) fn parse_server_error(status: u16, body: &[u8]) -> ServerError {
    if let Ok(parsed) = serde_json::from_slice::<wire::ErrorBody>(body) {
        if let Some(message) = parsed.message.filter(|message| !message.is_empty()) {
            return ServerError {
                status,
                code: parsed.code.unwrap_or_default(),
                message,
            };
        }
    }

    let reason = StatusCode::from_u16(status)
        .ok()
        .and_then(|status| status.canonical_reason())
        .unwrap_or_default();
    ServerError {
        status,
        code: reason.to_owned(),
        message: String::from_utf8_lossy(body).into_owned(),
    }
}

/// Runs requests against a [`Transport`] under a [`RetryPolicy`].
///
/// 2xx returns the body, 4xx fails at once with [`UcotronError::Server`],
/// and 5xx or transport failures are retried with exponential backoff until
/// the budget is spent, ending in [`UcotronError::RetriesExhausted`].
/// The executor keeps no per-call state and can be shared freely.
#[derive(Clone)]
pub struct RetryExecutor {
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
}

impl std::fmt::Debug for RetryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("transport", &"<transport>")
            .field("policy", &self.policy)
            .finish()
    }
}

impl RetryExecutor {
    pub fn new(transport: Arc<dyn Transport>, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Same transport, different policy.
    pub fn with_policy(&self, policy: RetryPolicy) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            policy,
        }
    }

    /// Executes one logical call and returns the success body.
    ///
    /// When `cancel` fires during a request or a backoff sleep, the pending
    /// work is dropped and the call fails with [`UcotronError::Cancelled`].
    pub async fn execute(
        &self,
        request: &TransportRequest,
        cancel: Option<&CancelToken>,
    ) -> Result<Vec<u8>> {
        let mut attempt = 0usize;
        loop {
            let sent = until_cancelled(cancel, self.transport.send(request))
                .await
                .ok_or_else(|| cancelled(request))?;

            let failure = match sent {
                Ok(response) => match classify(response) {
                    Outcome::Success(body) => return Ok(body),
                    Outcome::ClientError(err) => return Err(UcotronError::Server(err)),
                    Outcome::Retryable(err) => AttemptError::Server(err),
                },
                Err(err) => AttemptError::Transport(err),
            };

            if attempt >= self.policy.max_retries {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    method = %request.method,
                    url = %request.url,
                    attempts = attempt + 1,
                    "retries exhausted: {failure}"
                );
                return Err(UcotronError::RetriesExhausted {
                    attempts: attempt + 1,
                    last_error: failure,
                });
            }

            let delay = self.policy.backoff(attempt);

            #[cfg(feature = "tracing")]
            tracing::debug!(
                method = %request.method,
                url = %request.url,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "retrying after failure: {failure}"
            );

            until_cancelled(cancel, sleep(delay))
                .await
                .ok_or_else(|| cancelled(request))?;
            attempt += 1;
        }
    }
}

/// Races `future` against the cancel signal. `None` means cancelled.
async fn until_cancelled<F: Future>(cancel: Option<&CancelToken>, future: F) -> Option<F::Output> {
    match cancel {
        Some(token) => tokio::select! {
            biased;
            _ = token.cancelled() => None,
            output = future => Some(output),
        },
        None => Some(future.await),
    }
}

fn cancelled(_request: &TransportRequest) -> UcotronError {
    #[cfg(feature = "tracing")]
    tracing::debug!(method = %_request.method, url = %_request.url, "request cancelled");
    UcotronError::Cancelled
}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        io,
        sync::{Arc, Mutex},
        time::Duration,
    };

    use async_trait::async_trait;
    use reqwest::{header::HeaderMap, Method};
    use tokio::time::Instant;

    use super::{classify, parse_server_error, Outcome, RetryExecutor};
    use crate::{
        error::{AttemptError, TransportError},
        transport::{Transport, TransportRequest, TransportResponse},
        CancelToken, RetryPolicy, UcotronError,
    };

    type Step = std::result::Result<TransportResponse, TransportError>;

    #[derive(Default)]
    struct ScriptedTransport {
        script: Mutex<VecDeque<Step>>,
        sent_at: Mutex<Vec<Instant>>,
        hang: bool,
    }

    impl ScriptedTransport {
        fn new(steps: Vec<Step>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(steps.into()),
                ..Self::default()
            })
        }

        fn hanging() -> Arc<Self> {
            Arc::new(Self {
                hang: true,
                ..Self::default()
            })
        }

        fn calls(&self) -> usize {
            self.sent_at.lock().expect("mutex must not be poisoned").len()
        }

        fn gaps(&self) -> Vec<Duration> {
            let sent_at = self.sent_at.lock().expect("mutex must not be poisoned");
            sent_at.windows(2).map(|pair| pair[1] - pair[0]).collect()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&self, _request: &TransportRequest) -> Step {
            self.sent_at
                .lock()
                .expect("mutex must not be poisoned")
                .push(Instant::now());
            if self.hang {
                std::future::pending::<()>().await;
            }
            let next = self
                .script
                .lock()
                .expect("mutex must not be poisoned")
                .pop_front();
            next.unwrap_or_else(|| Ok(status(500, "unscripted")))
        }
    }

    fn status(code: u16, body: &str) -> TransportResponse {
        TransportResponse {
            status: code,
            body: body.as_bytes().to_vec(),
        }
    }

    fn refused() -> TransportError {
        TransportError::new(
            "request to GET /api/v1/health failed",
            io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused"),
        )
    }

    fn request() -> TransportRequest {
        TransportRequest {
            method: Method::GET,
            url: "http://localhost:8420/api/v1/health".to_owned(),
            headers: HeaderMap::new(),
            body: None,
            timeout: None,
        }
    }

    fn policy(max_retries: usize) -> RetryPolicy {
        RetryPolicy::new(
            max_retries,
            Duration::from_millis(100),
            Duration::from_millis(1_000),
        )
    }

    fn executor(transport: Arc<ScriptedTransport>, policy: RetryPolicy) -> RetryExecutor {
        RetryExecutor::new(transport, policy)
    }

    #[test]
    fn classify_maps_status_ranges() {
        assert_eq!(
            classify(status(204, "")),
            Outcome::Success(Vec::new())
        );
        assert!(matches!(
            classify(status(404, "missing")),
            Outcome::ClientError(err) if err.status == 404
        ));
        assert!(matches!(
            classify(status(503, "busy")),
            Outcome::Retryable(err) if err.status == 503
        ));
        assert!(matches!(
            classify(status(302, "")),
            Outcome::Retryable(err) if err.status == 302
        ));
        for code in [400u16, 499] {
            assert!(matches!(classify(status(code, "")), Outcome::ClientError(_)));
        }
        for code in [399u16, 500] {
            assert!(matches!(classify(status(code, "")), Outcome::Retryable(_)));
        }
    }

    #[test]
    fn parse_server_error_reads_json_body() {
        let err = parse_server_error(
            404,
            br#"{"code":"NOT_FOUND","message":"memory 42 not found"}"#,
        );
        assert_eq!(err.status, 404);
        assert_eq!(err.code, "NOT_FOUND");
        assert_eq!(err.message, "memory 42 not found");
    }

    #[test]
    fn parse_server_error_falls_back_for_malformed_body() {
        let err = parse_server_error(500, b"<html>upstream crashed</html>");
        assert_eq!(err.code, "Internal Server Error");
        assert_eq!(err.message, "<html>upstream crashed</html>");
    }

    #[test]
    fn parse_server_error_falls_back_without_message_field() {
        let err = parse_server_error(502, br#"{"code":"BAD"}"#);
        assert_eq!(err.code, "Bad Gateway");
        assert_eq!(err.message, r#"{"code":"BAD"}"#);
    }

    #[test]
    fn executor_is_shareable_across_tasks() {
        fn assert_send_sync<T: Send + Sync + Clone>() {}
        assert_send_sync::<RetryExecutor>();
        assert_send_sync::<RetryPolicy>();
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_5xx_makes_max_retries_plus_one_attempts() {
        for max_retries in 0..=4 {
            let transport = ScriptedTransport::new(Vec::new());
            let err = executor(transport.clone(), policy(max_retries))
                .execute(&request(), None)
                .await
                .expect_err("call must fail");

            match err {
                UcotronError::RetriesExhausted {
                    attempts,
                    last_error: AttemptError::Server(last),
                } => {
                    assert_eq!(attempts, max_retries + 1);
                    assert_eq!(last.status, 500);
                }
                other => panic!("expected exhausted server error, got {other:?}"),
            }
            assert_eq!(transport.calls(), max_retries + 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn client_errors_fail_after_one_attempt() {
        for code in [400u16, 401, 403, 404, 409, 422, 429, 499] {
            let transport = ScriptedTransport::new(vec![Ok(status(
                code,
                r#"{"code":"REJECTED","message":"nope"}"#,
            ))]);
            let started = Instant::now();
            let err = executor(transport.clone(), policy(5))
                .execute(&request(), None)
                .await
                .expect_err("4xx must fail");
            assert_eq!(started.elapsed(), Duration::ZERO, "4xx must not back off");

            match err {
                UcotronError::Server(server) => {
                    assert_eq!(server.status, code);
                    assert_eq!(server.code, "REJECTED");
                    assert_eq!(server.message, "nope");
                }
                other => panic!("expected server error for {code}, got {other:?}"),
            }
            assert_eq!(transport.calls(), 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_5xx_then_returns_success_body() {
        let transport = ScriptedTransport::new(vec![
            Ok(status(503, "busy")),
            Ok(status(200, r#"{"status":"ok"}"#)),
        ]);
        let body = executor(transport.clone(), policy(3))
            .execute(&request(), None)
            .await
            .expect("second attempt must succeed");

        assert_eq!(body, br#"{"status":"ok"}"#.to_vec());
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transport_error_then_returns_success_body() {
        let transport = ScriptedTransport::new(vec![Err(refused()), Ok(status(200, "{}"))]);
        let body = executor(transport.clone(), policy(3))
            .execute(&request(), None)
            .await
            .expect("second attempt must succeed");

        assert_eq!(body, b"{}".to_vec());
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_transport_errors_end_in_exhausted_transport_error() {
        let transport = ScriptedTransport::new(vec![Err(refused()), Err(refused())]);
        let err = executor(transport.clone(), policy(1))
            .execute(&request(), None)
            .await
            .expect_err("call must fail");

        match &err {
            UcotronError::RetriesExhausted {
                attempts: 2,
                last_error: AttemptError::Transport(inner),
            } => assert!(inner.message().contains("/api/v1/health")),
            other => panic!("expected exhausted transport error, got {other:?}"),
        }
        assert!(err.to_string().contains("after 2 attempts"));
        assert!(err.to_string().contains("connection refused"));
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_doubles_between_attempts_up_to_cap() {
        let transport = ScriptedTransport::new(Vec::new());
        let _ = executor(transport.clone(), policy(5))
            .execute(&request(), None)
            .await;

        let expected = [100u64, 200, 400, 800, 1_000];
        let gaps = transport.gaps();
        assert_eq!(gaps.len(), expected.len());
        for (gap, expected_ms) in gaps.into_iter().zip(expected) {
            let expected = Duration::from_millis(expected_ms);
            assert!(
                gap >= expected && gap < expected + Duration::from_millis(5),
                "gap {gap:?} does not match {expected:?}"
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_500_body_is_reported_without_parse_failure() {
        let transport = ScriptedTransport::new(vec![Ok(status(500, "not json at all"))]);
        let err = executor(transport, policy(0))
            .execute(&request(), None)
            .await
            .expect_err("call must fail");

        let server = err.server_error().expect("server error must be kept");
        assert_eq!(server.code, "Internal Server Error");
        assert_eq!(server.message, "not json at all");
        assert!(err.to_string().contains("not json at all"));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_backoff_stops_further_attempts() {
        let transport = ScriptedTransport::new(Vec::new());
        let exec = executor(
            transport.clone(),
            RetryPolicy::new(3, Duration::from_secs(10), Duration::from_secs(10)),
        );
        let token = CancelToken::new();

        let call = {
            let token = token.clone();
            tokio::spawn(async move { exec.execute(&request(), Some(&token)).await })
        };

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(transport.calls(), 1);
        token.cancel();

        let result = call.await.expect("call task must not panic");
        assert!(matches!(result, Err(UcotronError::Cancelled)));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_request_aborts_without_retry() {
        let transport = ScriptedTransport::hanging();
        let exec = executor(transport.clone(), policy(3));
        let token = CancelToken::new();

        let call = {
            let token = token.clone();
            tokio::spawn(async move { exec.execute(&request(), Some(&token)).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();

        let result = call.await.expect("call task must not panic");
        assert!(matches!(result, Err(UcotronError::Cancelled)));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn already_cancelled_token_makes_no_attempt() {
        let transport = ScriptedTransport::new(vec![Ok(status(200, "{}"))]);
        let token = CancelToken::new();
        token.cancel();

        let err = executor(transport.clone(), policy(3))
            .execute(&request(), Some(&token))
            .await
            .expect_err("cancelled call must fail");

        assert!(err.is_cancelled());
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_calls_do_not_share_attempt_state() {
        let failing = ScriptedTransport::new(Vec::new());
        let healthy = ScriptedTransport::new(vec![Ok(status(200, "{}"))]);
        let failing_exec = executor(failing.clone(), policy(2));
        let healthy_exec = executor(healthy.clone(), policy(2));

        let (failing_request, healthy_request) = (request(), request());
        let (failed, succeeded) = tokio::join!(
            failing_exec.execute(&failing_request, None),
            healthy_exec.execute(&healthy_request, None)
        );

        assert!(matches!(
            failed,
            Err(UcotronError::RetriesExhausted { attempts: 3, .. })
        ));
        assert!(succeeded.is_ok());
        assert_eq!(failing.calls(), 3);
        assert_eq!(healthy.calls(), 1);
    }
}
