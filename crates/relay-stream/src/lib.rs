//! Streaming Tee & Parser (spec.md §4.F): bounded-chunk tee to the client
//! plus log/parse buffers, and the per-channel semantic Stream Parsers.

mod content;
mod parser;
mod sse;
mod tee;

pub use content::StreamContent;
pub use parser::{AnthropicStreamParser, GeminiStreamParser, OpenAiStreamParser, StreamParser, parser_for};
pub use sse::{SseEvent, SseParser};
pub use tee::{PARSE_BUFFER_CAP, TeeError, TeeOutcome, tee_stream};
