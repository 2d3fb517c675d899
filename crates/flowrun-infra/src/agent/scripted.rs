//! Deterministic, rule-driven agent.
//!
//! `ScriptedAgent` answers from a list of keyword rules instead of calling an
//! LLM provider. The demo service uses it so workflows run offline, and tests
//! use it to get stable replies.
//!
//! Rules are matched case-insensitively against the last user message, first
//! match wins. Reply templates may contain `{input}`, replaced by that
//! message, and `{agent}`, replaced by the agent's name.

use std::time::Duration;

use flowrun_core::collab::Agent;
use flowrun_types::llm::{AgentError, AgentReply, ChatMessage, MessageRole};

#[derive(Debug, Clone)]
struct Rule {
    keyword: String,
    reply: String,
}

#[derive(Debug, Clone)]
pub struct ScriptedAgent {
    name: String,
    rules: Vec<Rule>,
    fallback: Option<String>,
    latency: Duration,
}

impl ScriptedAgent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rules: Vec::new(),
            fallback: None,
            latency: Duration::ZERO,
        }
    }

    /// Reply with `reply` when the user message mentions `keyword`.
    pub fn on(mut self, keyword: impl Into<String>, reply: impl Into<String>) -> Self {
        self.rules.push(Rule {
            keyword: keyword.into().to_lowercase(),
            reply: reply.into(),
        });
        self
    }

    /// Reply used when no rule matches.
    pub fn otherwise(mut self, reply: impl Into<String>) -> Self {
        self.fallback = Some(reply.into());
        self
    }

    /// Simulated provider latency per reply.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn reply_for(&self, input: &str) -> String {
        let lowered = input.to_lowercase();
        let template = self
            .rules
            .iter()
            .find(|rule| lowered.contains(&rule.keyword))
            .map(|rule| rule.reply.as_str())
            .or(self.fallback.as_deref());

        match template {
            Some(template) => template
                .replace("{input}", input.trim())
                .replace("{agent}", &self.name),
            None => format!("[{}] {}", self.name, first_line(input)),
        }
    }
}

impl Agent for ScriptedAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, messages: &[ChatMessage]) -> Result<AgentReply, AgentError> {
        let input = messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::User)
            .map(|m| m.content.as_str())
            .ok_or_else(|| {
                AgentError::InvalidRequest("conversation has no user message".to_string())
            })?;

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let content = self.reply_for(input);
        tracing::debug!(agent = %self.name, reply_len = content.len(), "scripted reply");
        Ok(AgentReply { content })
    }
}

fn first_line(text: &str) -> &str {
    text.trim().lines().next().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ask(text: &str) -> Vec<ChatMessage> {
        vec![ChatMessage::system("be helpful"), ChatMessage::user(text)]
    }

    #[tokio::test]
    async fn first_matching_rule_wins() {
        let agent = ScriptedAgent::new("analyst")
            .on("login", "Auth requirement: {input}")
            .on("login page", "never reached");

        let reply = agent.generate(&ask("Add a LOGIN page")).await.unwrap();
        assert_eq!(reply.content, "Auth requirement: Add a LOGIN page");
    }

    #[tokio::test]
    async fn fallback_and_default_reply() {
        let with_fallback = ScriptedAgent::new("writer").otherwise("{agent} says: {input}");
        let reply = with_fallback.generate(&ask("hello")).await.unwrap();
        assert_eq!(reply.content, "writer says: hello");

        let bare = ScriptedAgent::new("bare");
        let reply = bare.generate(&ask("  first\nsecond")).await.unwrap();
        assert_eq!(reply.content, "[bare] first");
    }

    #[tokio::test]
    async fn uses_last_user_message() {
        let agent = ScriptedAgent::new("echo").otherwise("{input}");
        let messages = vec![
            ChatMessage::user("old"),
            ChatMessage::assistant("reply"),
            ChatMessage::user("new"),
        ];
        assert_eq!(agent.generate(&messages).await.unwrap().content, "new");
    }

    #[tokio::test]
    async fn rejects_conversation_without_user_turn() {
        let agent = ScriptedAgent::new("echo");
        let err = agent
            .generate(&[ChatMessage::system("only system")])
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::InvalidRequest(_)));
    }
}
