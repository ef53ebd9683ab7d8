//! Per-vendor adapters (spec.md §4.A: `ModifyRequest`, `IsStreamRequest`,
//! `ExtractModel`). Grounded on `gproxy-provider-impl`'s `claude`, `openai`,
//! and `aistudio` provider modules — header injection mirrors
//! `auth_extractor::set_header`/`set_bearer`; the Gemini stream/model
//! detection mirrors `aistudio::normalize_model_name` and the
//! `:streamGenerateContent` suffix check used throughout that module.

use relay_provider_core::{ChannelKind, Headers, header_remove, header_set};
use serde_json::Value;

pub trait ChannelAdapter: Send + Sync {
    fn kind(&self) -> ChannelKind;

    /// Inject the vendor auth header, removing any client-supplied
    /// credential header first so the upstream only ever sees ours.
    fn modify_request(&self, headers: &mut Headers, credential_value: &str);

    /// Detect streaming intent from the request path and body.
    fn is_stream_request(&self, path_and_query: &str, body: &[u8]) -> bool;

    /// Best-effort model extraction; never fails (spec.md §4.A).
    fn extract_model(&self, path_and_query: &str, body: &[u8]) -> Option<String>;
}

fn body_json(body: &[u8]) -> Option<Value> {
    serde_json::from_slice(body).ok()
}

fn body_stream_flag(body: &[u8]) -> bool {
    body_json(body)
        .and_then(|v| v.get("stream").and_then(Value::as_bool))
        .unwrap_or(false)
}

fn body_model_field(body: &[u8]) -> Option<String> {
    body_json(body)?
        .get("model")?
        .as_str()
        .map(|s| s.to_string())
}

pub struct OpenAiAdapter;

impl ChannelAdapter for OpenAiAdapter {
    fn kind(&self) -> ChannelKind {
        ChannelKind::OpenAi
    }

    fn modify_request(&self, headers: &mut Headers, credential_value: &str) {
        header_remove(headers, "authorization");
        header_set(headers, "Authorization", format!("Bearer {credential_value}"));
    }

    fn is_stream_request(&self, _path_and_query: &str, body: &[u8]) -> bool {
        body_stream_flag(body)
    }

    fn extract_model(&self, _path_and_query: &str, body: &[u8]) -> Option<String> {
        body_model_field(body)
    }
}

pub struct AnthropicAdapter;

impl ChannelAdapter for AnthropicAdapter {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Anthropic
    }

    fn modify_request(&self, headers: &mut Headers, credential_value: &str) {
        header_remove(headers, "authorization");
        header_remove(headers, "x-api-key");
        header_set(headers, "x-api-key", credential_value);
    }

    fn is_stream_request(&self, _path_and_query: &str, body: &[u8]) -> bool {
        body_stream_flag(body)
    }

    fn extract_model(&self, _path_and_query: &str, body: &[u8]) -> Option<String> {
        body_model_field(body)
    }
}

pub struct GeminiAdapter;

impl ChannelAdapter for GeminiAdapter {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Gemini
    }

    fn modify_request(&self, headers: &mut Headers, credential_value: &str) {
        header_remove(headers, "authorization");
        header_remove(headers, "x-goog-api-key");
        header_set(headers, "x-goog-api-key", credential_value);
    }

    fn is_stream_request(&self, path_and_query: &str, _body: &[u8]) -> bool {
        path_and_query.contains(":streamGenerateContent")
    }

    fn extract_model(&self, path_and_query: &str, _body: &[u8]) -> Option<String> {
        let path = path_and_query.split('?').next().unwrap_or(path_and_query);
        let segment = path.split('/').find(|s| s.contains(':'))?;
        let model = segment.split(':').next()?;
        if model.is_empty() {
            None
        } else {
            Some(model.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openai_replaces_client_supplied_authorization() {
        let mut headers: Headers = vec![("Authorization".to_string(), "Bearer client-key".to_string())];
        OpenAiAdapter.modify_request(&mut headers, "sk-server-key");
        assert_eq!(headers.len(), 1);
        assert_eq!(headers[0].1, "Bearer sk-server-key");
    }

    #[test]
    fn anthropic_injects_x_api_key() {
        let mut headers: Headers = vec![];
        AnthropicAdapter.modify_request(&mut headers, "anthropic-secret");
        assert_eq!(
            headers.iter().find(|(k, _)| k == "x-api-key").map(|(_, v)| v.as_str()),
            Some("anthropic-secret")
        );
    }

    #[test]
    fn gemini_injects_x_goog_api_key() {
        let mut headers: Headers = vec![];
        GeminiAdapter.modify_request(&mut headers, "goog-secret");
        assert_eq!(
            headers.iter().find(|(k, _)| k == "x-goog-api-key").map(|(_, v)| v.as_str()),
            Some("goog-secret")
        );
    }

    #[test]
    fn openai_detects_stream_flag_in_body() {
        assert!(OpenAiAdapter.is_stream_request("/v1/chat/completions", br#"{"stream":true}"#));
        assert!(!OpenAiAdapter.is_stream_request("/v1/chat/completions", br#"{"stream":false}"#));
        assert!(!OpenAiAdapter.is_stream_request("/v1/chat/completions", b"not json"));
    }

    #[test]
    fn gemini_detects_stream_from_path_suffix() {
        assert!(GeminiAdapter.is_stream_request(
            "/v1beta/models/gemini-1.5-pro:streamGenerateContent",
            b""
        ));
        assert!(!GeminiAdapter.is_stream_request(
            "/v1beta/models/gemini-1.5-pro:generateContent",
            b""
        ));
    }

    #[test]
    fn gemini_extracts_model_from_path_segment() {
        let model = GeminiAdapter
            .extract_model(
                "/v1beta/models/gemini-1.5-pro:streamGenerateContent",
                b"",
            )
            .unwrap();
        assert_eq!(model, "gemini-1.5-pro");
    }

    #[test]
    fn openai_extracts_model_from_body_field() {
        let model = OpenAiAdapter
            .extract_model("/v1/chat/completions", br#"{"model":"gpt-4o"}"#)
            .unwrap();
        assert_eq!(model, "gpt-4o");
    }

    #[test]
    fn extract_model_never_fails_on_malformed_body() {
        assert_eq!(OpenAiAdapter.extract_model("/v1/chat/completions", b"{"), None);
        assert_eq!(AnthropicAdapter.extract_model("/v1/messages", b""), None);
    }
}
