//! `StreamContent` (spec.md §3): the parsed semantic extract of a
//! streaming response. All fields are independently optional and
//! concatenated across the whole stream.

use bytes::Bytes;

#[derive(Debug, Clone, Default)]
pub struct StreamContent {
    pub reasoning: Option<String>,
    pub text: Option<String>,
    pub tool_calls: Option<String>,
    pub raw: Option<Bytes>,
}

impl StreamContent {
    pub(crate) fn push_reasoning(&mut self, fragment: &str) {
        if fragment.is_empty() {
            return;
        }
        self.reasoning.get_or_insert_with(String::new).push_str(fragment);
    }

    pub(crate) fn push_text(&mut self, fragment: &str) {
        if fragment.is_empty() {
            return;
        }
        self.text.get_or_insert_with(String::new).push_str(fragment);
    }

    pub(crate) fn push_tool_call(&mut self, fragment: &str) {
        if fragment.is_empty() {
            return;
        }
        self.tool_calls.get_or_insert_with(String::new).push_str(fragment);
    }
}
