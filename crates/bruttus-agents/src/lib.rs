pub mod conversation;
pub mod dispatcher;
pub mod fusion;
pub mod probe;
pub mod prompts;
pub mod providers;

pub use conversation::{Conversation, ConversationPhase, IgnoreReason, SubmitOutcome};
pub use dispatcher::Dispatcher;
pub use fusion::{FusionRules, fuse, fuse_with};
pub use probe::{ProviderStatus, probe, probe_all};
pub use providers::{GeminiProvider, LlmProvider, LlmRequest, OpenAiProvider};
