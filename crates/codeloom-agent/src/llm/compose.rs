//! Request composition for the Chat Completions API.
//!
//! Turns the caller's conversation and tool catalog into the JSON payload a
//! provider expects.  A payload is built fresh for every attempt and never
//! mutated afterwards.

use std::collections::HashSet;

use serde_json::{Map, Value, json};

use crate::config::ProviderConfig;
use crate::llm::types::{ContentPart, Message, Role, ToolCall, ToolDefinition};

/// A composed request payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderRequest {
    body: Value,
}

impl ProviderRequest {
    /// The JSON body.
    pub fn body(&self) -> &Value {
        &self.body
    }

    /// Target model id.
    pub fn model(&self) -> &str {
        self.body["model"].as_str().unwrap_or_default()
    }

    /// Copy of the body without the leading system message and the tool
    /// catalog, for debug logging.
    pub fn redacted(&self) -> Value {
        let mut body = self.body.clone();
        if let Some(messages) = body.get_mut("messages").and_then(Value::as_array_mut) {
            if messages.first().is_some_and(|m| m["role"] == "system") {
                messages.remove(0);
            }
        }
        if let Some(obj) = body.as_object_mut() {
            obj.remove("tools");
        }
        body
    }

    pub fn into_body(self) -> Value {
        self.body
    }
}

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

/// Build the streaming request payload.
pub fn compose_request(
    messages: &[Message],
    tools: &[ToolDefinition],
    config: &ProviderConfig,
) -> ProviderRequest {
    let model = config.model();
    let selection = config.selection();

    let mut body = Map::new();
    body.insert("model".into(), json!(model.id));
    body.insert(
        "messages".into(),
        Value::Array(messages_to_wire(messages, &config.system_message())),
    );
    body.insert("stream".into(), json!(true));

    if !tools.is_empty() {
        body.insert("tools".into(), tools_to_wire(tools));
        body.insert("tool_choice".into(), json!("auto"));
    }

    let max_tokens = [config.max_tokens, selection.max_tokens]
        .into_iter()
        .find(|&limit| limit > 0)
        .unwrap_or(model.default_max_tokens);

    if model.can_reason {
        body.insert("max_completion_tokens".into(), json!(max_tokens));
        if !selection.reasoning_effort.is_empty() {
            body.insert("reasoning_effort".into(), json!(selection.reasoning_effort));
        }
    } else {
        body.insert("max_tokens".into(), json!(max_tokens));
    }

    for (key, value) in &config.extra_body {
        body.insert(key.clone(), value.clone());
    }

    ProviderRequest {
        body: Value::Object(body),
    }
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// Convert the conversation to wire messages, prepending `system` when it
/// is non-empty.
pub fn messages_to_wire(messages: &[Message], system: &str) -> Vec<Value> {
    let mut wire = Vec::with_capacity(messages.len() + 1);

    if !system.is_empty() {
        wire.push(json!({ "role": "system", "content": system }));
    }

    for (pos, msg) in messages.iter().enumerate() {
        match msg.role {
            Role::System => {
                let text = msg.text();
                if !text.is_empty() {
                    wire.push(json!({ "role": "system", "content": text }));
                }
            }
            Role::User => wire.push(json!({ "role": "user", "content": user_content(msg) })),
            Role::Assistant => {
                if let Some(m) = assistant_message(msg, &messages[pos + 1..]) {
                    wire.push(m);
                }
            }
            Role::Tool => {
                for result in &msg.tool_results {
                    wire.push(json!({
                        "role": "tool",
                        "tool_call_id": result.tool_call_id,
                        "content": result.content,
                    }));
                }
            }
        }
    }

    wire
}

/// A single text part collapses to a plain string; images force the array
/// form.
fn user_content(msg: &Message) -> Value {
    let mut parts = Vec::new();

    let text = msg.text();
    if !text.is_empty() {
        parts.push(json!({ "type": "text", "text": text }));
    }
    for part in &msg.parts {
        if let ContentPart::Image { image } = part {
            parts.push(json!({
                "type": "image_url",
                "image_url": { "url": image.to_url() },
            }));
        }
    }

    if parts.len() == 1 && parts[0]["type"] == "text" {
        return json!(text);
    }
    Value::Array(parts)
}

/// Assistant text plus the tool calls worth replaying: finished ones and
/// ones a later tool message answers.  `None` when nothing is left.
fn assistant_message(msg: &Message, rest: &[Message]) -> Option<Value> {
    let answered: HashSet<&str> = rest
        .iter()
        .filter(|m| m.role == Role::Tool)
        .flat_map(|m| m.tool_results.iter().map(|r| r.tool_call_id.as_str()))
        .collect();

    let calls: Vec<Value> = msg
        .tool_calls
        .iter()
        .filter(|call| call.finished || answered.contains(call.id.as_str()))
        .map(tool_call_to_wire)
        .collect();

    let text = msg.text();
    if text.is_empty() && calls.is_empty() {
        return None;
    }

    let mut out = Map::new();
    out.insert("role".into(), json!("assistant"));
    if !text.is_empty() {
        out.insert("content".into(), json!(text));
    }
    if !calls.is_empty() {
        out.insert("tool_calls".into(), Value::Array(calls));
    }
    Some(Value::Object(out))
}

fn tool_call_to_wire(call: &ToolCall) -> Value {
    json!({
        "id": call.id,
        "type": "function",
        "function": {
            "name": call.name,
            "arguments": call.input,
        }
    })
}

// ---------------------------------------------------------------------------
// Tools
// ---------------------------------------------------------------------------

/// Convert tool definitions into `{"type":"function","function":{...}}`.
pub fn tools_to_wire(tools: &[ToolDefinition]) -> Value {
    tools
        .iter()
        .map(|t| {
            json!({
                "type": "function",
                "function": {
                    "name": t.name,
                    "description": t.description,
                    "parameters": {
                        "type": "object",
                        "properties": t.parameters,
                        "required": t.required,
                    },
                }
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ModelInfo, ProviderConfig};
    use crate::llm::types::{ImageRef, ToolResult};

    fn config() -> ProviderConfig {
        ProviderConfig::openai_compatible("http://localhost/v1", "", "gpt-4o")
    }

    fn call(id: &str, finished: bool) -> ToolCall {
        ToolCall {
            id: id.into(),
            name: "read_file".into(),
            input: "{}".into(),
            call_type: "function".into(),
            finished,
        }
    }

    fn result(id: &str) -> ToolResult {
        ToolResult {
            tool_call_id: id.into(),
            content: "ok".into(),
            is_error: false,
        }
    }

    #[test]
    fn basic_payload() {
        let req = compose_request(&[Message::user("Hello")], &[], &config());
        let body = req.body();
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["stream"], true);
        assert_eq!(body["max_tokens"], 4096);
        assert!(body.get("tools").is_none());
        assert!(body.get("tool_choice").is_none());
        assert_eq!(body["messages"][0], json!({"role": "user", "content": "Hello"}));
        assert_eq!(req.model(), "gpt-4o");
    }

    #[test]
    fn system_message_is_synthesized() {
        let mut cfg = config();
        cfg.system_prompt = "You are a coder.".into();
        cfg.system_prompt_prefix = "Be brief.".into();
        let body = compose_request(&[Message::user("hi")], &[], &cfg).into_body();
        assert_eq!(
            body["messages"][0],
            json!({"role": "system", "content": "Be brief.\nYou are a coder."})
        );
        assert_eq!(body["messages"][1]["role"], "user");
    }

    #[test]
    fn images_force_content_array() {
        let msg = Message::user("what is this?").with_image(ImageRef::Inline {
            mime_type: "image/png".into(),
            data: b"png".to_vec(),
        });
        let wire = messages_to_wire(&[msg], "");
        let content = &wire[0]["content"];
        assert_eq!(content[0], json!({"type": "text", "text": "what is this?"}));
        assert_eq!(content[1]["type"], "image_url");
        assert_eq!(content[1]["image_url"]["url"], "data:image/png;base64,cG5n");

        let image_only = Message::user("").with_image(ImageRef::Url {
            url: "https://example.com/a.png".into(),
        });
        let wire = messages_to_wire(&[image_only], "");
        assert!(wire[0]["content"].is_array());
        assert_eq!(wire[0]["content"].as_array().map(Vec::len), Some(1));
    }

    #[test]
    fn assistant_tool_calls_use_lookahead() {
        let messages = vec![
            Message::user("go"),
            Message::assistant_with_tool_calls(
                "",
                vec![call("done", true), call("answered", false), call("dangling", false)],
            ),
            Message::tool_results(vec![result("answered")]),
        ];
        let wire = messages_to_wire(&messages, "");
        assert_eq!(wire.len(), 3);

        let calls = wire[1]["tool_calls"].as_array().unwrap();
        let ids: Vec<_> = calls.iter().map(|c| c["id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["done", "answered"]);
        assert_eq!(calls[0]["function"]["arguments"], "{}");
        assert!(wire[1].get("content").is_none());

        assert_eq!(
            wire[2],
            json!({"role": "tool", "tool_call_id": "answered", "content": "ok"})
        );
    }

    #[test]
    fn lookahead_ignores_earlier_results() {
        let messages = vec![
            Message::tool_results(vec![result("x")]),
            Message::assistant_with_tool_calls("", vec![call("x", false)]),
        ];
        let wire = messages_to_wire(&messages, "");
        assert_eq!(wire.len(), 1);
        assert_eq!(wire[0]["role"], "tool");
    }

    #[test]
    fn empty_assistant_is_dropped() {
        let messages = vec![
            Message::user("a"),
            Message::assistant(""),
            Message::assistant_with_tool_calls("", vec![call("unfinished", false)]),
            Message::assistant("kept"),
        ];
        let wire = messages_to_wire(&messages, "");
        assert_eq!(wire.len(), 2);
        assert_eq!(wire[1], json!({"role": "assistant", "content": "kept"}));
    }

    #[test]
    fn tool_message_expands_per_result() {
        let wire = messages_to_wire(&[Message::tool_results(vec![result("a"), result("b")])], "");
        assert_eq!(wire.len(), 2);
        assert_eq!(wire[0]["tool_call_id"], "a");
        assert_eq!(wire[1]["tool_call_id"], "b");
    }

    #[test]
    fn tools_render_with_object_schema() {
        let tools = vec![ToolDefinition {
            name: "read_file".into(),
            description: "Read a file".into(),
            parameters: json!({"path": {"type": "string"}}),
            required: vec!["path".into()],
        }];
        let body = compose_request(&[Message::user("x")], &tools, &config()).into_body();
        assert_eq!(body["tool_choice"], "auto");
        let function = &body["tools"][0]["function"];
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(function["name"], "read_file");
        assert_eq!(function["parameters"]["type"], "object");
        assert_eq!(function["parameters"]["properties"]["path"]["type"], "string");
        assert_eq!(function["parameters"]["required"], json!(["path"]));
    }

    #[test]
    fn token_limit_priority() {
        let mut cfg = config();
        cfg.models.push(ModelInfo {
            id: "gpt-4o".into(),
            can_reason: false,
            default_max_tokens: 1000,
        });
        let limit = |cfg: &ProviderConfig| compose_request(&[], &[], cfg).into_body()["max_tokens"].clone();

        assert_eq!(limit(&cfg), 1000);
        cfg.large.max_tokens = 2000;
        assert_eq!(limit(&cfg), 2000);
        cfg.max_tokens = 3000;
        assert_eq!(limit(&cfg), 3000);
    }

    #[test]
    fn reasoning_models_use_completion_tokens() {
        let mut cfg = ProviderConfig::openai_compatible("http://x", "", "o3-mini");
        cfg.models.push(ModelInfo {
            id: "o3-mini".into(),
            can_reason: true,
            default_max_tokens: 8192,
        });
        cfg.large.reasoning_effort = "high".into();

        let body = compose_request(&[Message::user("x")], &[], &cfg).into_body();
        assert!(body.get("max_tokens").is_none());
        assert_eq!(body["max_completion_tokens"], 8192);
        assert_eq!(body["reasoning_effort"], "high");
    }

    #[test]
    fn extra_body_overrides_last() {
        let mut cfg = config();
        cfg.extra_body.insert("temperature".into(), json!(0.1));
        cfg.extra_body.insert("stream".into(), json!(false));
        let body = compose_request(&[Message::user("x")], &[], &cfg).into_body();
        assert_eq!(body["temperature"], 0.1);
        assert_eq!(body["stream"], false);
    }

    #[test]
    fn redaction_drops_system_and_tools() {
        let mut cfg = config();
        cfg.system_prompt = "secret prompt".into();
        let tools = vec![ToolDefinition {
            name: "ls".into(),
            description: "list".into(),
            parameters: json!({}),
            required: vec![],
        }];
        let req = compose_request(&[Message::user("hi")], &tools, &cfg);
        let redacted = req.redacted();
        assert!(redacted.get("tools").is_none());
        assert_eq!(redacted["messages"].as_array().map(Vec::len), Some(1));
        assert_eq!(redacted["messages"][0]["role"], "user");
        assert_eq!(redacted["tool_choice"], "auto");
        // The request itself is untouched.
        assert!(req.body().get("tools").is_some());
    }
}
