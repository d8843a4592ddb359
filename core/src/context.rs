//! Model context: the merged prompts, messages, and tools handed to a
//! generator.

use serde::{Deserialize, Serialize};

use crate::tool::{AnyTool, FuncTool, Tool};
use crate::types::{FuncCall, Message, Part, Payload, Role, ToolCall, ToolResult};

/// A named prompt fragment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prompt {
    pub name: String,
    pub text: String,
}

impl Prompt {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }
}

/// Generation parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
}

impl ModelParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_tokens(mut self, v: i32) -> Self {
        self.max_tokens = Some(v);
        self
    }

    pub fn with_temperature(mut self, v: f32) -> Self {
        self.temperature = Some(v);
        self
    }

    pub fn with_top_p(mut self, v: f32) -> Self {
        self.top_p = Some(v);
        self
    }
}

/// Read access to a built context.
pub trait ModelContext: Send + Sync {
    fn prompts(&self) -> Box<dyn Iterator<Item = &Prompt> + '_>;

    fn messages(&self) -> Box<dyn Iterator<Item = &Message> + '_>;

    /// Chain-of-thought entries.
    fn cots(&self) -> Box<dyn Iterator<Item = &str> + '_>;

    fn tools(&self) -> Box<dyn Iterator<Item = &dyn Tool> + '_>;

    fn params(&self) -> Option<&ModelParams>;

    /// Looks up a function tool by name.
    fn find_func_tool(&self, name: &str) -> Option<&FuncTool>;
}

/// Mutation-ordered builder for a [`ModelContext`].
#[derive(Debug, Default)]
pub struct ModelContextBuilder {
    prompts: Vec<Prompt>,
    messages: Vec<Message>,
    cots: Vec<String>,
    tools: Vec<AnyTool>,
    params: Option<ModelParams>,
}

impl ModelContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a prompt, merging contiguous prompts with the same name by
    /// joining their text with a newline.
    pub fn add_prompt(&mut self, prompt: Prompt) -> &mut Self {
        if let Some(last) = self.prompts.last_mut()
            && last.name == prompt.name
        {
            if !last.text.is_empty() && !prompt.text.is_empty() {
                last.text.push('\n');
            }
            last.text.push_str(&prompt.text);
            return self;
        }
        self.prompts.push(prompt);
        self
    }

    pub fn prompt_text(&mut self, name: impl Into<String>, text: impl Into<String>) -> &mut Self {
        self.add_prompt(Prompt::new(name, text))
    }

    /// Appends a `key: value` line to the named prompt, with the value
    /// rendered as a YAML scalar.
    pub fn prompt_kv<V: Serialize>(
        &mut self,
        name: impl Into<String>,
        key: &str,
        value: &V,
    ) -> &mut Self {
        let rendered = serde_yaml::to_string(value)
            .unwrap_or_default()
            .trim_end()
            .to_string();
        self.add_prompt(Prompt::new(name, format!("{key}: {rendered}")))
    }

    /// Appends a message, merging it into the previous one when both are
    /// plain contents with the same role and name.
    pub fn add_message(&mut self, msg: Message) -> &mut Self {
        if let Some(last) = self.messages.last_mut()
            && last.role == msg.role
            && last.name == msg.name
            && let (Payload::Contents(have), Payload::Contents(new)) =
                (&mut last.payload, &msg.payload)
        {
            have.extend(new.clone());
            return self;
        }
        self.messages.push(msg);
        self
    }

    pub fn user_text(&mut self, name: impl Into<String>, text: impl Into<String>) -> &mut Self {
        self.add_message(Message::with_name(Role::User, name, Payload::text(text)))
    }

    pub fn user_blob(
        &mut self,
        name: impl Into<String>,
        mime_type: impl Into<String>,
        data: impl Into<Vec<u8>>,
    ) -> &mut Self {
        self.add_message(Message::with_name(
            Role::User,
            name,
            Payload::Contents(vec![Part::blob(mime_type, data)]),
        ))
    }

    pub fn model_text(&mut self, name: impl Into<String>, text: impl Into<String>) -> &mut Self {
        self.add_message(Message::with_name(Role::Model, name, Payload::text(text)))
    }

    pub fn model_blob(
        &mut self,
        name: impl Into<String>,
        mime_type: impl Into<String>,
        data: impl Into<Vec<u8>>,
    ) -> &mut Self {
        self.add_message(Message::with_name(
            Role::Model,
            name,
            Payload::Contents(vec![Part::blob(mime_type, data)]),
        ))
    }

    /// Appends a model-role tool call message.
    pub fn tool_call(
        &mut self,
        name: impl Into<String>,
        id: impl Into<String>,
        fn_name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> &mut Self {
        self.messages.push(Message::with_name(
            Role::Model,
            name,
            Payload::ToolCall(ToolCall::new(id, FuncCall::new(fn_name, arguments))),
        ));
        self
    }

    /// Appends a tool-role result message.
    pub fn tool_result(
        &mut self,
        name: impl Into<String>,
        id: impl Into<String>,
        result: impl Into<String>,
    ) -> &mut Self {
        self.messages.push(Message::with_name(
            Role::Tool,
            name,
            Payload::ToolResult(ToolResult::new(id, result)),
        ));
        self
    }

    /// Appends a completed call/result pair under a fresh `call_<hex16>`
    /// id.
    pub fn add_tool_call_result(
        &mut self,
        tool_name: impl Into<String>,
        arguments: impl Into<String>,
        result: impl Into<String>,
    ) -> &mut Self {
        let id = new_call_id();
        let tool_name = tool_name.into();
        self.tool_call("", &id, &tool_name, arguments);
        self.tool_result("", &id, result);
        self
    }

    /// Same as [`add_tool_call_result`](Self::add_tool_call_result) with
    /// the arguments and result JSON-marshalled.
    pub fn add_tool_call_result_json<A: Serialize, R: Serialize>(
        &mut self,
        tool_name: impl Into<String>,
        arguments: &A,
        result: &R,
    ) -> &mut Self {
        let args = serde_json::to_string(arguments).unwrap_or_default();
        let res = serde_json::to_string(result).unwrap_or_default();
        self.add_tool_call_result(tool_name, args, res)
    }

    /// Replaces the chain-of-thought entries.
    pub fn set_cot(&mut self, cots: Vec<String>) -> &mut Self {
        self.cots = cots;
        self
    }

    /// Replaces the chain-of-thought entries with values rendered as YAML.
    pub fn set_cot_values<V: Serialize>(&mut self, values: &[V]) -> &mut Self {
        self.cots = values
            .iter()
            .map(|v| {
                serde_yaml::to_string(v)
                    .unwrap_or_default()
                    .trim_end()
                    .to_string()
            })
            .collect();
        self
    }

    pub fn add_tool(&mut self, tool: FuncTool) -> &mut Self {
        self.tools.push(AnyTool::Func(tool));
        self
    }

    pub fn add_any_tool(&mut self, tool: impl Into<AnyTool>) -> &mut Self {
        self.tools.push(tool.into());
        self
    }

    pub fn set_params(&mut self, params: ModelParams) -> &mut Self {
        self.params = Some(params);
        self
    }

    pub fn find_func_tool(&self, name: &str) -> Option<&FuncTool> {
        self.tools.iter().find_map(|t| match t {
            AnyTool::Func(f) if f.name == name => Some(f),
            _ => None,
        })
    }

    /// All function tools currently registered.
    pub fn func_tools(&self) -> Vec<FuncTool> {
        self.tools
            .iter()
            .filter_map(|t| match t {
                AnyTool::Func(f) => Some(f.clone()),
                _ => None,
            })
            .collect()
    }

    /// Freezes the builder into an immutable context.
    pub fn build(self) -> BuiltContext {
        BuiltContext {
            prompts: self.prompts,
            messages: self.messages,
            cots: self.cots,
            tools: self.tools,
            params: self.params,
        }
    }
}

/// An immutable built context.
pub struct BuiltContext {
    prompts: Vec<Prompt>,
    messages: Vec<Message>,
    cots: Vec<String>,
    tools: Vec<AnyTool>,
    params: Option<ModelParams>,
}

impl ModelContext for BuiltContext {
    fn prompts(&self) -> Box<dyn Iterator<Item = &Prompt> + '_> {
        Box::new(self.prompts.iter())
    }

    fn messages(&self) -> Box<dyn Iterator<Item = &Message> + '_> {
        Box::new(self.messages.iter())
    }

    fn cots(&self) -> Box<dyn Iterator<Item = &str> + '_> {
        Box::new(self.cots.iter().map(String::as_str))
    }

    fn tools(&self) -> Box<dyn Iterator<Item = &dyn Tool> + '_> {
        Box::new(self.tools.iter().map(|t| t as &dyn Tool))
    }

    fn params(&self) -> Option<&ModelParams> {
        self.params.as_ref()
    }

    fn find_func_tool(&self, name: &str) -> Option<&FuncTool> {
        self.tools.iter().find_map(|t| match t {
            AnyTool::Func(f) if f.name == name => Some(f),
            _ => None,
        })
    }
}

/// Several contexts exposed as one; iteration follows construction order.
pub struct MultiModelContext {
    contexts: Vec<Box<dyn ModelContext>>,
}

impl MultiModelContext {
    pub fn new(contexts: Vec<Box<dyn ModelContext>>) -> Self {
        Self { contexts }
    }
}

impl ModelContext for MultiModelContext {
    fn prompts(&self) -> Box<dyn Iterator<Item = &Prompt> + '_> {
        Box::new(self.contexts.iter().flat_map(|c| c.prompts()))
    }

    fn messages(&self) -> Box<dyn Iterator<Item = &Message> + '_> {
        Box::new(self.contexts.iter().flat_map(|c| c.messages()))
    }

    fn cots(&self) -> Box<dyn Iterator<Item = &str> + '_> {
        Box::new(self.contexts.iter().flat_map(|c| c.cots()))
    }

    fn tools(&self) -> Box<dyn Iterator<Item = &dyn Tool> + '_> {
        Box::new(self.contexts.iter().flat_map(|c| c.tools()))
    }

    fn params(&self) -> Option<&ModelParams> {
        self.contexts.iter().find_map(|c| c.params())
    }

    fn find_func_tool(&self, name: &str) -> Option<&FuncTool> {
        self.contexts.iter().find_map(|c| c.find_func_tool(name))
    }
}

fn new_call_id() -> String {
    let mut bytes = [0u8; 8];
    getrandom::fill(&mut bytes).expect("getrandom failed");
    let mut id = String::with_capacity(5 + 16);
    id.push_str("call_");
    for b in bytes {
        id.push(char::from_digit((b >> 4) as u32, 16).unwrap());
        id.push(char::from_digit((b & 0x0f) as u32, 16).unwrap());
    }
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemars::JsonSchema;
    use serde::Deserialize;

    #[derive(Debug, JsonSchema, Deserialize)]
    struct TestArgs {
        #[allow(dead_code)]
        query: String,
    }

    #[test]
    fn contiguous_prompts_merge() {
        let mut b = ModelContextBuilder::new();
        b.prompt_text("system", "Line 1");
        b.prompt_text("system", "Line 2");
        b.prompt_text("persona", "Other");
        b.prompt_text("system", "Line 3");

        let ctx = b.build();
        let prompts: Vec<_> = ctx.prompts().collect();
        assert_eq!(prompts.len(), 3);
        assert_eq!(prompts[0].text, "Line 1\nLine 2");
        assert_eq!(prompts[1].name, "persona");
        // Non-contiguous same-name prompts stay separate.
        assert_eq!(prompts[2].text, "Line 3");
    }

    #[test]
    fn prompt_kv_renders_yaml_scalars() {
        let mut b = ModelContextBuilder::new();
        b.prompt_kv("persona", "age", &7);
        b.prompt_kv("persona", "nickname", &"beep");

        let ctx = b.build();
        let prompts: Vec<_> = ctx.prompts().collect();
        assert_eq!(prompts.len(), 1);
        assert_eq!(prompts[0].text, "age: 7\nnickname: beep");
    }

    #[test]
    fn consecutive_contents_messages_merge() {
        let mut b = ModelContextBuilder::new();
        b.user_text("u1", "Hello");
        b.user_text("u1", "World");
        b.model_text("bot", "Hi!");
        b.user_text("u2", "Bye");

        let ctx = b.build();
        let messages: Vec<_> = ctx.messages().collect();
        assert_eq!(messages.len(), 3);
        match &messages[0].payload {
            Payload::Contents(parts) => assert_eq!(parts.len(), 2),
            other => panic!("expected contents, got {other:?}"),
        }
    }

    #[test]
    fn tool_calls_never_merge() {
        let mut b = ModelContextBuilder::new();
        b.user_text("u", "Hello");
        b.tool_call("bot", "call_1", "search", "{}");
        b.user_text("u", "More");

        let ctx = b.build();
        assert_eq!(ctx.messages().count(), 3);
    }

    #[test]
    fn tool_call_result_pairs() {
        let mut b = ModelContextBuilder::new();
        b.add_tool_call_result("search", r#"{"q":"x"}"#, "found");

        let ctx = b.build();
        let messages: Vec<_> = ctx.messages().collect();
        assert_eq!(messages.len(), 2);

        let (call_id, result_id) = match (&messages[0].payload, &messages[1].payload) {
            (Payload::ToolCall(c), Payload::ToolResult(r)) => (c.id.clone(), r.id.clone()),
            other => panic!("expected call then result, got {other:?}"),
        };
        assert_eq!(call_id, result_id);
        assert!(call_id.starts_with("call_"));
        assert_eq!(call_id.len(), 5 + 16);
        assert!(call_id[5..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn json_variant_marshals_values() {
        #[derive(Serialize)]
        struct Args {
            q: String,
        }
        let mut b = ModelContextBuilder::new();
        b.add_tool_call_result_json("search", &Args { q: "x".into() }, &vec![1, 2]);

        let ctx = b.build();
        let messages: Vec<_> = ctx.messages().collect();
        match &messages[0].payload {
            Payload::ToolCall(c) => assert_eq!(c.func_call.arguments, r#"{"q":"x"}"#),
            other => panic!("unexpected {other:?}"),
        }
        match &messages[1].payload {
            Payload::ToolResult(r) => assert_eq!(r.result, "[1,2]"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn cot_yaml_rendering() {
        #[derive(Serialize)]
        struct Step {
            idea: String,
        }
        let mut b = ModelContextBuilder::new();
        b.set_cot_values(&[Step { idea: "probe".into() }]);

        let ctx = b.build();
        let cots: Vec<_> = ctx.cots().collect();
        assert_eq!(cots, vec!["idea: probe"]);
    }

    #[test]
    fn find_func_tool_by_name() {
        let mut b = ModelContextBuilder::new();
        b.add_tool(FuncTool::new::<TestArgs>("search", "Search"));
        assert!(b.find_func_tool("search").is_some());
        assert!(b.find_func_tool("none").is_none());

        let ctx = b.build();
        assert!(ctx.find_func_tool("search").is_some());
    }

    #[test]
    fn multi_context_concatenates() {
        let mut a = ModelContextBuilder::new();
        a.prompt_text("system", "A");
        let mut b = ModelContextBuilder::new();
        b.prompt_text("system", "B");
        b.set_params(ModelParams::new().with_max_tokens(64));

        let multi = MultiModelContext::new(vec![Box::new(a.build()), Box::new(b.build())]);
        assert_eq!(multi.prompts().count(), 2);
        assert_eq!(multi.params().unwrap().max_tokens, Some(64));
    }

    #[test]
    fn empty_builder_is_empty_context() {
        let ctx = ModelContextBuilder::new().build();
        assert_eq!(ctx.prompts().count(), 0);
        assert_eq!(ctx.messages().count(), 0);
        assert_eq!(ctx.tools().count(), 0);
        assert!(ctx.params().is_none());
    }
}
