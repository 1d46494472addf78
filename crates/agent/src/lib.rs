//! Agent runtime for the PartSage parts assistant.
//!
//! A chat request flows through:
//! 1. **Scope check** (`scope`) - deterministic keyword classifier; out-of-domain
//!    requests get a fixed reply and never reach the oracle.
//! 2. **Reasoning loop** (`orchestrator`) - bounded state machine that asks the
//!    oracle for tool calls, validates them against closed schemas (`schema`),
//!    dispatches them one at a time (`tools`) and folds results back.
//! 3. **Reply synthesis** (`synthesizer`) - reply text plus deduplicated product
//!    cards, marked partial when the loop did not finish.
//!
//! The oracle (`oracle`, `llm`) only chooses tool calls and writes prose. It
//! never touches the catalog or the content index directly.

pub mod audit;
pub mod cancel;
pub mod embedding;
pub mod llm;
pub mod oracle;
pub mod orchestrator;
pub mod runtime;
pub mod schema;
pub mod scope;
pub mod synthesizer;
pub mod tools;

pub use audit::TracingAuditSink;
pub use cancel::{CancelOnDrop, CancellationToken};
pub use embedding::HttpQueryEmbedder;
pub use llm::oracle_from_config;
pub use oracle::{
    OracleDecision, OracleError, OracleRequest, ReasoningOracle, RetryPolicy, ScriptedOracle,
};
pub use orchestrator::{LoopOutcome, LoopSettings, Orchestrator, Termination};
pub use runtime::{AgentRuntime, ChatRequest};
pub use scope::{ScopeDecision, ScopeGuard, OUT_OF_SCOPE_REPLY};
pub use synthesizer::{ChatReply, ReplyMetadata, ResponseSynthesizer};
pub use tools::{
    ObservationOutcome, Tool, ToolErrorKind, ToolFailure, ToolInvocation, ToolObservation,
    ToolPayload, ToolRegistry,
};
