//! Bounded reasoning loop.
//!
//! Each cycle moves through `Reasoning -> Dispatching -> Observing` and back,
//! until the oracle gives a final answer, the iteration budget runs out, the
//! oracle stays unavailable after retries, or the request is cancelled.
//! Tool calls run strictly one after another; every decision sees every
//! earlier observation.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use uuid::Uuid;

use partsage_core::audit::{AuditCategory, AuditContext, AuditOutcome, AuditSink};
use partsage_core::config::AppConfig;
use partsage_core::domain::conversation::Query;

use crate::cancel::CancellationToken;
use crate::oracle::{decide_with_retry, OracleDecision, OracleRequest, ReasoningOracle, RetryPolicy};
use crate::tools::{
    ObservationOutcome, ToolErrorKind, ToolFailure, ToolInvocation, ToolObservation, ToolPayload,
    ToolRegistry,
};

pub const DEFAULT_MAX_ITERATIONS: u32 = 10;
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopPhase {
    Reasoning,
    Dispatching,
    Observing,
    Terminated,
}

impl LoopPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reasoning => "reasoning",
            Self::Dispatching => "dispatching",
            Self::Observing => "observing",
            Self::Terminated => "terminated",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Termination {
    FinalAnswer(String),
    IterationBudgetExceeded,
    OracleUnavailable,
    Cancelled,
}

impl Termination {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FinalAnswer(_) => "final_answer",
            Self::IterationBudgetExceeded => "iteration_budget_exceeded",
            Self::OracleUnavailable => "oracle_unavailable",
            Self::Cancelled => "cancelled",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct LoopOutcome {
    pub termination: Termination,
    pub iterations: u32,
    pub invocations: Vec<ToolInvocation>,
    pub observations: Vec<ToolObservation>,
}

impl LoopOutcome {
    /// True when the reply has to be marked best-effort.
    pub fn is_partial(&self) -> bool {
        !matches!(self.termination, Termination::FinalAnswer(_))
    }

    pub fn tool_calls_for(&self, tool_name: &str) -> Vec<&ToolInvocation> {
        self.invocations.iter().filter(|invocation| invocation.tool_name == tool_name).collect()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoopSettings {
    pub max_iterations: u32,
    pub tool_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }
}

impl LoopSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_iterations: config.agent.max_iterations,
            tool_timeout: Duration::from_secs(config.agent.tool_timeout_secs),
            retry: RetryPolicy::from_config(&config.llm),
        }
    }
}

pub struct Orchestrator {
    oracle: Arc<dyn ReasoningOracle>,
    registry: Arc<ToolRegistry>,
    audit: Arc<dyn AuditSink>,
    settings: LoopSettings,
}

impl Orchestrator {
    pub fn new(
        oracle: Arc<dyn ReasoningOracle>,
        registry: Arc<ToolRegistry>,
        audit: Arc<dyn AuditSink>,
        settings: LoopSettings,
    ) -> Self {
        Self { oracle, registry, audit, settings }
    }

    pub fn settings(&self) -> &LoopSettings {
        &self.settings
    }

    pub async fn run(&self, query: &Query, cancel: &CancellationToken) -> LoopOutcome {
        let context = AuditContext::new(
            query.conversation_id.clone(),
            Uuid::new_v4().to_string(),
            "orchestrator",
        );
        self.run_with_context(query, cancel, &context).await
    }

    pub async fn run_with_context(
        &self,
        query: &Query,
        cancel: &CancellationToken,
        context: &AuditContext,
    ) -> LoopOutcome {
        let schemas = self.registry.schemas();
        let mut iterations = 0_u32;
        let mut invocations: Vec<ToolInvocation> = Vec::new();
        let mut observations: Vec<ToolObservation> = Vec::new();

        let termination = loop {
            if cancel.is_cancelled() {
                break Termination::Cancelled;
            }
            if iterations >= self.settings.max_iterations {
                break Termination::IterationBudgetExceeded;
            }

            self.trace_phase(context, LoopPhase::Reasoning, iterations);
            let request = OracleRequest {
                query,
                invocations: &invocations,
                observations: &observations,
                tools: &schemas,
                iteration: iterations,
            };
            let calls = match decide_with_retry(self.oracle.as_ref(), &request, &self.settings.retry)
                .await
            {
                Ok(OracleDecision::FinalAnswer(text)) => break Termination::FinalAnswer(text),
                Ok(OracleDecision::UseTools(calls)) => calls,
                Err(error) => {
                    warn!(
                        event_name = "agent.oracle.unavailable",
                        correlation_id = %context.correlation_id,
                        iteration = iterations,
                        error = %error,
                        "oracle unavailable after retries"
                    );
                    self.audit.emit(
                        context
                            .event("agent.oracle.unavailable", AuditCategory::Oracle, AuditOutcome::Failed)
                            .with_metadata("iteration", iterations.to_string())
                            .with_metadata("error", error.to_string()),
                    );
                    break Termination::OracleUnavailable;
                }
            };

            self.trace_phase(context, LoopPhase::Dispatching, iterations);
            let mut seen_ids =
                invocations.iter().map(|invocation| invocation.call_id.clone()).collect::<HashSet<_>>();
            for (index, mut invocation) in calls.into_iter().enumerate() {
                if invocation.call_id.trim().is_empty() || seen_ids.contains(&invocation.call_id) {
                    invocation.call_id = format!("call-{iterations}-{index}");
                }
                seen_ids.insert(invocation.call_id.clone());

                let observation = self.dispatch(&invocation, iterations, context).await;
                invocations.push(invocation);
                observations.push(observation);
            }

            self.trace_phase(context, LoopPhase::Observing, iterations);
            iterations += 1;
        };

        info!(
            event_name = "agent.loop.terminated",
            correlation_id = %context.correlation_id,
            conversation_id = context.conversation_id.as_deref().unwrap_or("-"),
            termination = termination.as_str(),
            iterations,
            tool_calls = invocations.len(),
            "reasoning loop terminated"
        );
        let outcome = match termination {
            Termination::FinalAnswer(_) => AuditOutcome::Success,
            Termination::Cancelled => AuditOutcome::Rejected,
            Termination::IterationBudgetExceeded | Termination::OracleUnavailable => {
                AuditOutcome::Failed
            }
        };
        self.audit.emit(
            context
                .event("agent.loop.terminated", AuditCategory::Loop, outcome)
                .with_metadata("termination", termination.as_str())
                .with_metadata("iterations", iterations.to_string())
                .with_metadata("tool_calls", invocations.len().to_string()),
        );

        LoopOutcome { termination, iterations, invocations, observations }
    }

    async fn dispatch(
        &self,
        invocation: &ToolInvocation,
        iteration: u32,
        context: &AuditContext,
    ) -> ToolObservation {
        let (tool, arguments) = match self.registry.prepare(invocation) {
            Ok(prepared) => prepared,
            Err(error) => {
                warn!(
                    event_name = "agent.tool.rejected",
                    correlation_id = %context.correlation_id,
                    tool = %invocation.tool_name,
                    call_id = %invocation.call_id,
                    iteration,
                    error = %error,
                    "tool invocation failed validation"
                );
                self.audit.emit(
                    context
                        .event("agent.tool.rejected", AuditCategory::Tool, AuditOutcome::Rejected)
                        .with_metadata("tool", invocation.tool_name.clone())
                        .with_metadata("call_id", invocation.call_id.clone())
                        .with_metadata("error", error.to_string()),
                );
                return ToolObservation::failure(invocation, iteration, ToolFailure::from(error));
            }
        };

        let result = match tokio::time::timeout(self.settings.tool_timeout, tool.invoke(&arguments)).await
        {
            Ok(result) => result,
            Err(_) => Err(ToolFailure::new(
                ToolErrorKind::Timeout,
                format!("tool did not respond within {}s", self.settings.tool_timeout.as_secs()),
            )),
        };
        let observation = match result {
            Ok(payload) => ToolObservation::success(invocation, iteration, payload),
            Err(failure) => ToolObservation::failure(invocation, iteration, failure),
        };

        let (outcome, detail) = match &observation.outcome {
            ObservationOutcome::Success { payload } => {
                let count = match payload {
                    ToolPayload::Catalog(result) => result.len(),
                    ToolPayload::Content(chunks) => chunks.len(),
                };
                (AuditOutcome::Success, format!("results={count}"))
            }
            ObservationOutcome::Error { kind, .. } => (AuditOutcome::Failed, format!("error={kind}")),
        };
        info!(
            event_name = "agent.tool.dispatched",
            correlation_id = %context.correlation_id,
            tool = %invocation.tool_name,
            call_id = %invocation.call_id,
            iteration,
            arguments = %arguments,
            detail = %detail,
            "tool call completed"
        );
        self.audit.emit(
            context
                .event("agent.tool.dispatched", AuditCategory::Tool, outcome)
                .with_metadata("tool", invocation.tool_name.clone())
                .with_metadata("call_id", invocation.call_id.clone())
                .with_metadata("arguments", arguments.to_string())
                .with_metadata("detail", detail),
        );

        observation
    }

    fn trace_phase(&self, context: &AuditContext, phase: LoopPhase, iteration: u32) {
        debug!(
            event_name = "agent.loop.phase",
            correlation_id = %context.correlation_id,
            phase = phase.as_str(),
            iteration,
            "loop phase"
        );
    }
}
