//! Agent trait and its object-safe wrapper.

use std::future::Future;
use std::pin::Pin;

use flowrun_types::llm::{AgentError, AgentReply, ChatMessage};

/// An LLM-backed agent that answers a conversation with a single reply.
///
/// Implementations live in `flowrun-infra` (scripted agents) or in the
/// embedding application (real providers).
pub trait Agent: Send + Sync {
    /// Name the agent is registered under.
    fn name(&self) -> &str;

    /// Produce a reply for the given conversation.
    fn generate(
        &self,
        messages: &[ChatMessage],
    ) -> impl Future<Output = Result<AgentReply, AgentError>> + Send;
}

/// Object-safe version of [`Agent`] with boxed futures.
pub trait AgentDyn: Send + Sync {
    fn name(&self) -> &str;

    fn generate_boxed<'a>(
        &'a self,
        messages: &'a [ChatMessage],
    ) -> Pin<Box<dyn Future<Output = Result<AgentReply, AgentError>> + Send + 'a>>;
}

impl<T: Agent> AgentDyn for T {
    fn name(&self) -> &str {
        Agent::name(self)
    }

    fn generate_boxed<'a>(
        &'a self,
        messages: &'a [ChatMessage],
    ) -> Pin<Box<dyn Future<Output = Result<AgentReply, AgentError>> + Send + 'a>> {
        Box::pin(self.generate(messages))
    }
}

/// Type-erased agent stored in the runtime handle.
pub struct BoxAgent {
    inner: Box<dyn AgentDyn>,
}

impl BoxAgent {
    pub fn new<T: Agent + 'static>(agent: T) -> Self {
        Self {
            inner: Box::new(agent),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub async fn generate(&self, messages: &[ChatMessage]) -> Result<AgentReply, AgentError> {
        self.inner.generate_boxed(messages).await
    }

    /// Convenience for the common system-prompt plus single user turn.
    pub async fn ask(&self, system: &str, prompt: &str) -> Result<String, AgentError> {
        let messages = [ChatMessage::system(system), ChatMessage::user(prompt)];
        Ok(self.generate(&messages).await?.content)
    }
}

impl std::fmt::Debug for BoxAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxAgent").field("name", &self.name()).finish()
    }
}
