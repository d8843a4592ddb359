//! Tool definitions for function calling.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use crate::types::{FuncCall, ToolCall};

/// A boxed `Send` future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A tool exposed to a generator.
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema of the argument payload; `None` for native tool
    /// descriptors without a schema.
    fn schema(&self) -> Option<&JsonValue> {
        None
    }

    fn is_func_tool(&self) -> bool {
        self.schema().is_some()
    }
}

type InvokeFn = dyn Fn(String) -> BoxFuture<'static, anyhow::Result<String>> + Send + Sync;

/// A function tool: a JSON-schema argument spec plus an optional async
/// invocation closure.
pub struct FuncTool {
    pub name: String,
    pub description: String,
    /// JSON Schema for the arguments.
    pub argument: JsonValue,
    invoke_fn: Option<Arc<InvokeFn>>,
}

impl std::fmt::Debug for FuncTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FuncTool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("has_invoke", &self.invoke_fn.is_some())
            .finish()
    }
}

impl Clone for FuncTool {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            description: self.description.clone(),
            argument: self.argument.clone(),
            invoke_fn: self.invoke_fn.clone(),
        }
    }
}

impl Tool for FuncTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn schema(&self) -> Option<&JsonValue> {
        Some(&self.argument)
    }
}

impl FuncTool {
    /// Declares a tool whose argument schema is derived from `T`.
    pub fn new<T: JsonSchema>(name: impl Into<String>, description: impl Into<String>) -> Self {
        let schema = schemars::schema_for!(T);
        Self {
            name: name.into(),
            description: description.into(),
            argument: serde_json::to_value(&schema).unwrap_or_default(),
            invoke_fn: None,
        }
    }

    /// Declares a tool with an async handler invoked with parsed arguments.
    pub fn with_handler<T, F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        handler: F,
    ) -> Self
    where
        T: JsonSchema + DeserializeOwned + Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<String>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let schema = schemars::schema_for!(T);
        Self {
            name: name.into(),
            description: description.into(),
            argument: serde_json::to_value(&schema).unwrap_or_default(),
            invoke_fn: Some(Arc::new(move |args_json: String| {
                let handler = Arc::clone(&handler);
                Box::pin(async move {
                    let args: T = serde_json::from_str(&args_json)
                        .map_err(|e| anyhow::anyhow!("parse arguments: {e}"))?;
                    handler(args).await
                })
            })),
        }
    }

    /// Builds a [`FuncCall`] against this tool.
    pub fn new_func_call(&self, arguments: impl Into<String>) -> FuncCall {
        FuncCall::new(self.name.clone(), arguments)
    }

    /// Builds a [`ToolCall`] against this tool.
    pub fn new_tool_call(&self, id: impl Into<String>, arguments: impl Into<String>) -> ToolCall {
        ToolCall::new(id, self.new_func_call(arguments))
    }

    pub fn has_invoke(&self) -> bool {
        self.invoke_fn.is_some()
    }

    /// Invokes the handler with raw JSON arguments.
    pub async fn invoke(&self, args_json: &str) -> anyhow::Result<String> {
        match &self.invoke_fn {
            Some(f) => f(args_json.to_string()).await,
            None => Err(anyhow::anyhow!("no invoke handler for tool {}", self.name)),
        }
    }

    /// Invokes the handler for a matching [`FuncCall`].
    pub async fn invoke_call(&self, call: &FuncCall) -> anyhow::Result<String> {
        if call.name != self.name {
            return Err(anyhow::anyhow!(
                "call name mismatch: expected {}, got {}",
                self.name,
                call.name
            ));
        }
        self.invoke(&call.arguments).await
    }
}

/// Wrapper over the tool kinds a context can carry.
#[derive(Debug, Clone)]
pub enum AnyTool {
    Func(FuncTool),
    /// A provider-native tool referenced only by name.
    Native { name: String, description: String },
}

impl Tool for AnyTool {
    fn name(&self) -> &str {
        match self {
            AnyTool::Func(t) => t.name(),
            AnyTool::Native { name, .. } => name,
        }
    }

    fn description(&self) -> &str {
        match self {
            AnyTool::Func(t) => t.description(),
            AnyTool::Native { description, .. } => description,
        }
    }

    fn schema(&self) -> Option<&JsonValue> {
        match self {
            AnyTool::Func(t) => t.schema(),
            AnyTool::Native { .. } => None,
        }
    }
}

impl From<FuncTool> for AnyTool {
    fn from(t: FuncTool) -> Self {
        AnyTool::Func(t)
    }
}
