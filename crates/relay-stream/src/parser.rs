//! Per-channel Stream Parsers (spec.md §4.F). Grounded on
//! `gproxy-provider-impl::dispatch::stream` (SSE event decoding,
//! `sse_claude_bytes`'s typed-event naming, `parse_gemini_stream_payload`'s
//! single-object-or-array fallback) but rewritten to *extract* semantic
//! fields instead of *re-emit* vendor wire events, since transformation
//! between vendor protocols is out of scope here.

use relay_provider_core::ChannelKind;
use serde_json::Value;

use crate::content::StreamContent;
use crate::sse::parse_all;

pub fn parser_for(kind: ChannelKind) -> &'static dyn StreamParser {
    match kind {
        ChannelKind::OpenAi => &OpenAiStreamParser,
        ChannelKind::Anthropic => &AnthropicStreamParser,
        ChannelKind::Gemini => &GeminiStreamParser,
    }
}

/// Parses the complete accumulated parse buffer handed over at stream EOF.
/// Must never panic on malformed input — callers additionally isolate the
/// call behind `catch_unwind` (spec.md §4.F "must not corrupt the request").
pub trait StreamParser: Send + Sync {
    fn parse(&self, buffer: &[u8]) -> StreamContent;
}

pub struct OpenAiStreamParser;

impl StreamParser for OpenAiStreamParser {
    fn parse(&self, buffer: &[u8]) -> StreamContent {
        let mut content = StreamContent::default();
        let Ok(text) = std::str::from_utf8(buffer) else {
            return content;
        };

        for event in parse_all(text) {
            let data = event.data.trim();
            if data.is_empty() || data == "[DONE]" {
                continue;
            }
            let Ok(value) = serde_json::from_str::<Value>(data) else {
                continue;
            };
            let Some(delta) = value
                .get("choices")
                .and_then(Value::as_array)
                .and_then(|choices| choices.first())
                .and_then(|choice| choice.get("delta"))
            else {
                continue;
            };

            if let Some(reasoning) = delta.get("reasoning_content").and_then(Value::as_str) {
                content.push_reasoning(reasoning);
            }
            if let Some(text) = delta.get("content").and_then(Value::as_str) {
                content.push_text(text);
            }
            if let Some(tool_calls) = delta.get("tool_calls") {
                content.push_tool_call(&tool_calls.to_string());
            }
            if let Some(function_call) = delta.get("function_call") {
                content.push_tool_call(&function_call.to_string());
            }
        }

        content
    }
}

pub struct AnthropicStreamParser;

impl StreamParser for AnthropicStreamParser {
    fn parse(&self, buffer: &[u8]) -> StreamContent {
        let mut content = StreamContent::default();
        let Ok(text) = std::str::from_utf8(buffer) else {
            return content;
        };

        for event in parse_all(text) {
            if event.event.as_deref() != Some("content_block_delta") {
                continue;
            }
            let Ok(value) = serde_json::from_str::<Value>(event.data.trim()) else {
                continue;
            };
            let Some(delta) = value.get("delta") else {
                continue;
            };
            match delta.get("type").and_then(Value::as_str) {
                Some("text_delta") => {
                    if let Some(text) = delta.get("text").and_then(Value::as_str) {
                        content.push_text(text);
                    }
                }
                Some("thinking_delta") => {
                    if let Some(thinking) = delta.get("thinking").and_then(Value::as_str) {
                        content.push_reasoning(thinking);
                    }
                }
                Some("input_json_delta") => {
                    if let Some(partial) = delta.get("partial_json").and_then(Value::as_str) {
                        content.push_tool_call(partial);
                    }
                }
                _ => {}
            }
        }

        content
    }
}

pub struct GeminiStreamParser;

impl StreamParser for GeminiStreamParser {
    fn parse(&self, buffer: &[u8]) -> StreamContent {
        let mut content = StreamContent::default();
        let Ok(text) = std::str::from_utf8(buffer) else {
            return content;
        };

        let stripped = strip_sse_prefixes(text);
        for value in extract_json_objects(&stripped) {
            visit_gemini_payload(&value, &mut content);
        }

        content
    }
}

fn strip_sse_prefixes(text: &str) -> String {
    if !text.contains("data:") {
        return text.to_string();
    }
    text.lines()
        .map(|line| line.strip_prefix("data:").map(str::trim_start).unwrap_or(line))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn extract_json_objects(text: &str) -> Vec<Value> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(trimmed) {
        return items;
    }
    if let Ok(single) = serde_json::from_str::<Value>(trimmed) {
        return vec![single];
    }
    serde_json::Deserializer::from_str(trimmed)
        .into_iter::<Value>()
        .filter_map(Result::ok)
        .collect()
}

fn visit_gemini_payload(value: &Value, content: &mut StreamContent) {
    let Some(candidates) = value.get("candidates").and_then(Value::as_array) else {
        return;
    };
    for candidate in candidates {
        let Some(parts) = candidate
            .get("content")
            .and_then(|c| c.get("parts"))
            .and_then(Value::as_array)
        else {
            continue;
        };
        for part in parts {
            if let Some(text) = part.get("text").and_then(Value::as_str) {
                content.push_text(text);
            }
            if let Some(function_call) = part.get("functionCall") {
                content.push_tool_call(&function_call.to_string());
            }
            if let Some(function_calls) = part.get("functionCalls") {
                content.push_tool_call(&function_calls.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openai_accumulates_reasoning_text_and_tool_calls() {
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"reasoning_content\":\"thinking \"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"hello \"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"world\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"id\":\"1\"}]}}]}\n\n",
            "data: [DONE]\n\n",
        );
        let content = OpenAiStreamParser.parse(body.as_bytes());
        assert_eq!(content.reasoning.as_deref(), Some("thinking "));
        assert_eq!(content.text.as_deref(), Some("hello world"));
        assert!(content.tool_calls.unwrap().contains("\"id\":\"1\""));
    }

    #[test]
    fn openai_skips_done_and_non_json_lines() {
        let body = "data: not json\n\ndata: [DONE]\n\n";
        let content = OpenAiStreamParser.parse(body.as_bytes());
        assert!(content.text.is_none());
        assert!(content.reasoning.is_none());
    }

    #[test]
    fn anthropic_routes_delta_types_to_distinct_fields() {
        let body = concat!(
            "event: content_block_delta\ndata: {\"delta\":{\"type\":\"thinking_delta\",\"thinking\":\"why \"}}\n\n",
            "event: content_block_delta\ndata: {\"delta\":{\"type\":\"text_delta\",\"text\":\"because\"}}\n\n",
            "event: content_block_delta\ndata: {\"delta\":{\"type\":\"input_json_delta\",\"partial_json\":\"{\\\"a\\\":1}\"}}\n\n",
            "event: message_stop\ndata: {}\n\n",
        );
        let content = AnthropicStreamParser.parse(body.as_bytes());
        assert_eq!(content.reasoning.as_deref(), Some("why "));
        assert_eq!(content.text.as_deref(), Some("because"));
        assert_eq!(content.tool_calls.as_deref(), Some("{\"a\":1}"));
    }

    #[test]
    fn anthropic_ignores_non_content_block_delta_events() {
        let body = "event: ping\ndata: {}\n\n";
        let content = AnthropicStreamParser.parse(body.as_bytes());
        assert!(content.text.is_none());
    }

    #[test]
    fn gemini_parses_concatenated_json_objects() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"hi "}]}}]}{"candidates":[{"content":{"parts":[{"text":"there"}]}}]}"#;
        let content = GeminiStreamParser.parse(body.as_bytes());
        assert_eq!(content.text.as_deref(), Some("hi there"));
        assert!(content.reasoning.is_none());
    }

    #[test]
    fn gemini_parses_sse_wrapped_payload() {
        let body = "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"sse\"}]}}]}\n\n";
        let content = GeminiStreamParser.parse(body.as_bytes());
        assert_eq!(content.text.as_deref(), Some("sse"));
    }

    #[test]
    fn gemini_extracts_function_calls() {
        let body = r#"{"candidates":[{"content":{"parts":[{"functionCall":{"name":"lookup"}}]}}]}"#;
        let content = GeminiStreamParser.parse(body.as_bytes());
        assert!(content.tool_calls.unwrap().contains("lookup"));
    }

    #[test]
    fn malformed_input_never_panics() {
        let _ = OpenAiStreamParser.parse(b"\xff\xfe not utf8");
        let _ = AnthropicStreamParser.parse(b"garbage");
        let _ = GeminiStreamParser.parse(b"{not json");
    }
}
