//! The reasoning oracle seam: whatever picks tool calls or a final answer.
//!
//! The loop only sees [`ReasoningOracle`]. Production implementations live in
//! [`crate::llm`]; [`ScriptedOracle`] replays fixed decisions for tests and
//! offline runs.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

use partsage_core::config::LlmConfig;
use partsage_core::domain::conversation::Query;

use crate::schema::ToolSchema;
use crate::tools::{ToolInvocation, ToolObservation};

/// Everything the oracle may use for one decision. Observations are in the
/// order they were produced; `invocations` holds the matching requests.
#[derive(Clone, Copy, Debug)]
pub struct OracleRequest<'a> {
    pub query: &'a Query,
    pub invocations: &'a [ToolInvocation],
    pub observations: &'a [ToolObservation],
    pub tools: &'a [ToolSchema],
    pub iteration: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub enum OracleDecision {
    /// One or more tool calls, dispatched sequentially within one cycle.
    UseTools(Vec<ToolInvocation>),
    FinalAnswer(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum OracleError {
    #[error("oracle unavailable: {0}")]
    Unavailable(String),
    #[error("oracle timed out after {0}s")]
    Timeout(u64),
    #[error("oracle returned an invalid response: {0}")]
    InvalidResponse(String),
    #[error("oracle rejected the request: {0}")]
    Rejected(String),
}

impl OracleError {
    /// Credential and request-shape errors will not fix themselves.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Rejected(_))
    }
}

#[async_trait]
pub trait ReasoningOracle: Send + Sync {
    async fn decide(&self, request: &OracleRequest<'_>) -> Result<OracleDecision, OracleError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Upper bound for a single oracle call.
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_millis(4000),
            call_timeout: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(llm: &LlmConfig) -> Self {
        Self {
            max_retries: llm.max_retries,
            call_timeout: Duration::from_secs(llm.timeout_secs),
            ..Self::default()
        }
    }

    pub fn no_delay(max_retries: u32) -> Self {
        Self { max_retries, base_delay: Duration::ZERO, max_delay: Duration::ZERO, ..Self::default() }
    }

    /// Backoff before retry number `attempt` (0-based): `base * 2^attempt`,
    /// capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1_u32 << attempt.min(16);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Calls the oracle with a per-call timeout, retrying retryable failures with
/// exponential backoff. Returns the last error once retries are exhausted.
pub async fn decide_with_retry(
    oracle: &dyn ReasoningOracle,
    request: &OracleRequest<'_>,
    policy: &RetryPolicy,
) -> Result<OracleDecision, OracleError> {
    let mut attempt = 0_u32;
    loop {
        let result = match tokio::time::timeout(policy.call_timeout, oracle.decide(request)).await {
            Ok(result) => result,
            Err(_) => Err(OracleError::Timeout(policy.call_timeout.as_secs())),
        };

        match result {
            Ok(decision) => return Ok(decision),
            Err(error) if error.is_retryable() && attempt < policy.max_retries => {
                let delay = policy.delay_for(attempt);
                warn!(
                    event_name = "agent.oracle.retry",
                    attempt = attempt + 1,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "oracle call failed, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(error) => return Err(error),
        }
    }
}

type DecideFn =
    dyn Fn(&OracleRequest<'_>) -> Result<OracleDecision, OracleError> + Send + Sync;

enum Script {
    Sequence(Mutex<VecDeque<Result<OracleDecision, OracleError>>>),
    Function(Box<DecideFn>),
}

/// Deterministic oracle driven by a fixed list of decisions or a pure function
/// of the request.
pub struct ScriptedOracle {
    script: Script,
    calls: Mutex<u32>,
}

impl ScriptedOracle {
    /// Replays `steps` in order. Once exhausted every call is `Unavailable`.
    pub fn sequence(steps: impl IntoIterator<Item = Result<OracleDecision, OracleError>>) -> Self {
        Self {
            script: Script::Sequence(Mutex::new(steps.into_iter().collect())),
            calls: Mutex::new(0),
        }
    }

    pub fn from_fn<F>(decide: F) -> Self
    where
        F: Fn(&OracleRequest<'_>) -> Result<OracleDecision, OracleError> + Send + Sync + 'static,
    {
        Self { script: Script::Function(Box::new(decide)), calls: Mutex::new(0) }
    }

    pub fn calls(&self) -> u32 {
        self.calls.lock().map(|calls| *calls).unwrap_or_default()
    }
}

#[async_trait]
impl ReasoningOracle for ScriptedOracle {
    async fn decide(&self, request: &OracleRequest<'_>) -> Result<OracleDecision, OracleError> {
        if let Ok(mut calls) = self.calls.lock() {
            *calls += 1;
        }
        match &self.script {
            Script::Sequence(steps) => steps
                .lock()
                .map_err(|_| OracleError::Unavailable("script lock poisoned".to_string()))?
                .pop_front()
                .unwrap_or_else(|| Err(OracleError::Unavailable("script exhausted".to_string()))),
            Script::Function(decide) => decide(request),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use partsage_core::domain::conversation::Query;

    use super::{
        decide_with_retry, OracleDecision, OracleError, OracleRequest, ReasoningOracle,
        RetryPolicy, ScriptedOracle,
    };

    fn request(query: &Query) -> OracleRequest<'_> {
        OracleRequest { query, invocations: &[], observations: &[], tools: &[], iteration: 0 }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_millis(250));
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(3), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(5), Duration::from_millis(4000));
        assert_eq!(policy.delay_for(40), Duration::from_millis(4000));
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let oracle = ScriptedOracle::sequence([
            Err(OracleError::Unavailable("503".to_string())),
            Err(OracleError::Timeout(1)),
            Ok(OracleDecision::FinalAnswer("done".to_string())),
        ]);
        let query = Query::new("ice maker");

        let decision = decide_with_retry(&oracle, &request(&query), &RetryPolicy::no_delay(2))
            .await
            .expect("third attempt succeeds");
        assert_eq!(decision, OracleDecision::FinalAnswer("done".to_string()));
        assert_eq!(oracle.calls(), 3);
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let oracle = ScriptedOracle::from_fn(|_| Err(OracleError::Unavailable("down".to_string())));
        let query = Query::new("ice maker");

        let error = decide_with_retry(&oracle, &request(&query), &RetryPolicy::no_delay(2))
            .await
            .expect_err("oracle stays down");
        assert_eq!(error, OracleError::Unavailable("down".to_string()));
        assert_eq!(oracle.calls(), 3);
    }

    #[tokio::test]
    async fn rejected_requests_are_not_retried() {
        let oracle = ScriptedOracle::from_fn(|_| Err(OracleError::Rejected("401".to_string())));
        let query = Query::new("ice maker");

        let error = decide_with_retry(&oracle, &request(&query), &RetryPolicy::no_delay(2))
            .await
            .expect_err("bad credentials");
        assert!(!error.is_retryable());
        assert_eq!(oracle.calls(), 1);
    }

    struct SlowOracle;

    #[async_trait]
    impl ReasoningOracle for SlowOracle {
        async fn decide(&self, _request: &OracleRequest<'_>) -> Result<OracleDecision, OracleError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(OracleDecision::FinalAnswer("late".to_string()))
        }
    }

    #[tokio::test]
    async fn slow_calls_time_out_and_count_as_failures() {
        let policy =
            RetryPolicy { call_timeout: Duration::from_millis(20), ..RetryPolicy::no_delay(1) };
        let query = Query::new("ice maker");

        let error = decide_with_retry(&SlowOracle, &request(&query), &policy)
            .await
            .expect_err("every call times out");
        assert!(matches!(error, OracleError::Timeout(_)));
    }
}
