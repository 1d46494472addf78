use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use partsage_core::audit::{AuditCategory, AuditContext, AuditOutcome, AuditSink};
use partsage_core::config::AppConfig;
use partsage_core::domain::conversation::{ConversationHistory, Query, Turn};
use partsage_core::errors::ApplicationError;
use partsage_db::{CatalogRepository, ContentIndex};

use crate::cancel::CancellationToken;
use crate::oracle::ReasoningOracle;
use crate::orchestrator::{LoopSettings, Orchestrator};
use crate::scope::{ScopeDecision, ScopeGuard, OUT_OF_SCOPE_REPLY};
use crate::synthesizer::{ChatReply, ResponseSynthesizer};
use crate::tools::{SemanticSearchTool, StructuredQueryTool, ToolRegistry};

pub const MAX_MESSAGE_CHARS: usize = 2000;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub history: Vec<Turn>,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), ..Self::default() }
    }
}

/// One chat request end to end: validation, scope check, reasoning loop and
/// reply synthesis. Holds no per-request state.
pub struct AgentRuntime {
    guard: ScopeGuard,
    orchestrator: Orchestrator,
    synthesizer: ResponseSynthesizer,
    history_window: usize,
    audit: Arc<dyn AuditSink>,
}

impl AgentRuntime {
    pub fn new(
        orchestrator: Orchestrator,
        synthesizer: ResponseSynthesizer,
        history_window: usize,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self { guard: ScopeGuard::new(), orchestrator, synthesizer, history_window, audit }
    }

    /// Wires both tools and the loop from configuration.
    pub fn from_config(
        config: &AppConfig,
        catalog: Arc<dyn CatalogRepository>,
        index: Arc<dyn ContentIndex>,
        oracle: Arc<dyn ReasoningOracle>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        let mut registry = ToolRegistry::default();
        registry.register(StructuredQueryTool::with_result_caps(
            catalog,
            config.agent.default_result_cap,
            config.agent.max_result_cap,
        ));
        registry.register(SemanticSearchTool::with_top_k(
            index,
            config.agent.default_top_k,
            config.agent.max_top_k,
        ));

        let orchestrator = Orchestrator::new(
            oracle,
            Arc::new(registry),
            Arc::clone(&audit),
            LoopSettings::from_config(config),
        );
        Self::new(
            orchestrator,
            ResponseSynthesizer::new(config.agent.display_cap),
            config.agent.history_window,
            audit,
        )
    }

    pub async fn handle_message(
        &self,
        request: ChatRequest,
        cancel: &CancellationToken,
    ) -> Result<ChatReply, ApplicationError> {
        let message = request.message.trim();
        if message.is_empty() {
            return Err(ApplicationError::InvalidRequest("message must not be empty".to_string()));
        }
        if message.chars().count() > MAX_MESSAGE_CHARS {
            return Err(ApplicationError::InvalidRequest(format!(
                "message must be at most {MAX_MESSAGE_CHARS} characters"
            )));
        }

        let context = AuditContext::new(
            request.conversation_id.clone(),
            Uuid::new_v4().to_string(),
            "chat",
        );
        let history = ConversationHistory::from_turns(self.history_window, request.history);
        let mut query = Query::new(message).with_history(history);
        if let Some(conversation_id) = request.conversation_id {
            query = query.with_conversation(conversation_id);
        }

        info!(
            event_name = "chat.request.received",
            correlation_id = %context.correlation_id,
            conversation_id = query.conversation_id.as_deref().unwrap_or("-"),
            history_turns = query.history.len(),
            "chat request received"
        );
        self.audit.emit(context.event(
            "chat.request.received",
            AuditCategory::Ingress,
            AuditOutcome::Success,
        ));

        if let ScopeDecision::OutOfScope { reason_code, reason } = self.guard.classify(&query) {
            info!(
                event_name = "agent.scope.rejected",
                correlation_id = %context.correlation_id,
                reason_code,
                reason = %reason,
                "request outside supported domain"
            );
            self.audit.emit(
                context
                    .event("agent.scope.rejected", AuditCategory::Scope, AuditOutcome::Rejected)
                    .with_metadata("reason_code", reason_code),
            );
            return Ok(ChatReply::text_only(OUT_OF_SCOPE_REPLY));
        }

        let outcome = self.orchestrator.run_with_context(&query, cancel, &context).await;
        let reply = self.synthesizer.synthesize(&outcome);

        info!(
            event_name = "chat.completed",
            correlation_id = %context.correlation_id,
            conversation_id = query.conversation_id.as_deref().unwrap_or("-"),
            termination = outcome.termination.as_str(),
            iterations = outcome.iterations,
            tool_calls = outcome.invocations.len(),
            products = reply.metadata.count,
            "chat request completed"
        );
        self.audit.emit(
            context
                .event("chat.completed", AuditCategory::Response, AuditOutcome::Success)
                .with_metadata("termination", outcome.termination.as_str())
                .with_metadata("iterations", outcome.iterations.to_string())
                .with_metadata("tool_calls", outcome.invocations.len().to_string()),
        );

        Ok(reply)
    }
}
