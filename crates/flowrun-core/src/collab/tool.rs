//! Tool trait and its object-safe wrapper.
//!
//! [`BoxTool`] validates every input against the tool's declared input
//! shape before delegating, so implementations can assume well-formed
//! input.

use std::future::Future;
use std::pin::Pin;

use flowrun_types::shape::Shape;
use flowrun_types::tool::ToolError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// A side-effecting capability callable from step bodies.
pub trait Tool: Send + Sync {
    /// Identifier the tool is registered under.
    fn id(&self) -> &str;

    /// One-line description.
    fn description(&self) -> &str;

    /// Shape of the JSON input the tool accepts.
    fn input_shape(&self) -> Shape {
        Shape::any()
    }

    /// Perform the side effect and return a JSON result.
    fn execute(&self, input: Value) -> impl Future<Output = Result<Value, ToolError>> + Send;
}

/// Object-safe version of [`Tool`] with boxed futures.
pub trait ToolDyn: Send + Sync {
    fn id(&self) -> &str;

    fn description(&self) -> &str;

    fn input_shape(&self) -> Shape;

    fn execute_boxed(
        &self,
        input: Value,
    ) -> Pin<Box<dyn Future<Output = Result<Value, ToolError>> + Send + '_>>;
}

impl<T: Tool> ToolDyn for T {
    fn id(&self) -> &str {
        Tool::id(self)
    }

    fn description(&self) -> &str {
        Tool::description(self)
    }

    fn input_shape(&self) -> Shape {
        Tool::input_shape(self)
    }

    fn execute_boxed(
        &self,
        input: Value,
    ) -> Pin<Box<dyn Future<Output = Result<Value, ToolError>> + Send + '_>> {
        Box::pin(self.execute(input))
    }
}

/// Type-erased tool stored in the runtime handle.
pub struct BoxTool {
    inner: Box<dyn ToolDyn>,
    input_shape: Shape,
}

impl BoxTool {
    pub fn new<T: Tool + 'static>(tool: T) -> Self {
        let input_shape = Tool::input_shape(&tool);
        Self {
            inner: Box::new(tool),
            input_shape,
        }
    }

    pub fn id(&self) -> &str {
        self.inner.id()
    }

    pub fn description(&self) -> &str {
        self.inner.description()
    }

    pub fn input_shape(&self) -> &Shape {
        &self.input_shape
    }

    /// Validate `input` against the tool's shape, then execute.
    pub async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        self.input_shape.validate(&input)?;
        self.inner.execute_boxed(input).await
    }

    /// Typed convenience over [`BoxTool::execute`].
    pub async fn call<I, O>(&self, input: &I) -> Result<O, ToolError>
    where
        I: Serialize + ?Sized,
        O: DeserializeOwned,
    {
        let input = serde_json::to_value(input)
            .map_err(|e| ToolError::Failed(format!("tool input is not serializable: {e}")))?;
        let output = self.execute(input).await?;
        serde_json::from_value(output).map_err(|e| {
            ToolError::Failed(format!("unexpected output from tool '{}': {e}", self.id()))
        })
    }
}

impl std::fmt::Debug for BoxTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxTool").field("id", &self.id()).finish()
    }
}
