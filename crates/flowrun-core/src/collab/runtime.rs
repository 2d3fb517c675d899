//! Runtime handle passed to every step body.
//!
//! The handle is an immutable, cheaply cloneable registry of the agents and
//! tools the application wired up at startup.

use std::collections::HashMap;
use std::sync::Arc;

use crate::workflow::step::StepError;

use super::agent::{Agent, BoxAgent};
use super::tool::{BoxTool, Tool};

/// Collaborators available to step bodies, looked up by name.
#[derive(Clone, Default)]
pub struct RuntimeHandle {
    inner: Arc<RuntimeInner>,
}

#[derive(Default)]
struct RuntimeInner {
    agents: HashMap<String, BoxAgent>,
    tools: HashMap<String, BoxTool>,
}

impl RuntimeHandle {
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::default()
    }

    /// Look up an agent by name.
    pub fn agent(&self, name: &str) -> Result<&BoxAgent, StepError> {
        self.inner
            .agents
            .get(name)
            .ok_or_else(|| StepError::Failed(format!("agent '{name}' is not registered")))
    }

    /// Look up a tool by id.
    pub fn tool(&self, id: &str) -> Result<&BoxTool, StepError> {
        self.inner
            .tools
            .get(id)
            .ok_or_else(|| StepError::Failed(format!("tool '{id}' is not registered")))
    }

    /// Registered agent names, sorted.
    pub fn agent_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.inner.agents.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Registered tool ids, sorted.
    pub fn tool_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.inner.tools.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

impl std::fmt::Debug for RuntimeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeHandle")
            .field("agents", &self.agent_names())
            .field("tools", &self.tool_ids())
            .finish()
    }
}

/// Builder for [`RuntimeHandle`]. Registering a name twice keeps the last one.
#[derive(Default)]
pub struct RuntimeBuilder {
    agents: HashMap<String, BoxAgent>,
    tools: HashMap<String, BoxTool>,
}

impl RuntimeBuilder {
    pub fn agent<A: Agent + 'static>(mut self, agent: A) -> Self {
        let agent = BoxAgent::new(agent);
        self.agents.insert(agent.name().to_string(), agent);
        self
    }

    pub fn tool<T: Tool + 'static>(mut self, tool: T) -> Self {
        let tool = BoxTool::new(tool);
        self.tools.insert(tool.id().to_string(), tool);
        self
    }

    pub fn build(self) -> RuntimeHandle {
        RuntimeHandle {
            inner: Arc::new(RuntimeInner {
                agents: self.agents,
                tools: self.tools,
            }),
        }
    }
}
