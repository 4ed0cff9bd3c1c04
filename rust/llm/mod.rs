//! LLM providers and the gateway that fans out over them.

pub mod gateway;
pub mod gemini;
pub mod local;
pub mod openai;
pub mod provider;

pub use gateway::{AiGateway, ProviderUsage, RetryPolicy, UsageStats};
pub use gemini::GeminiClient;
pub use local::LocalStub;
pub use openai::ChatCompletionsClient;
pub use provider::{Completion, GenerateRequest, LlmProvider, ProviderKind};
