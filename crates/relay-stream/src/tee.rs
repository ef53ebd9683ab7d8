//! Streaming Tee (spec.md §4.F): reads the upstream body in fixed chunks,
//! writes each chunk to the client, and accumulates two independently
//! bounded buffers (log, parse) for post-hoc semantic parsing. Grounded on
//! `dispatch::stream::StreamDecoder`'s chunk-pump shape, but the
//! decode-as-you-go design is replaced with "accumulate then parse once at
//! EOF" per spec.md §4.F, which hands the whole parse buffer to the Stream
//! Parser only after the loop ends.

use bytes::{Bytes, BytesMut};
use futures_util::{Stream, StreamExt};

use relay_provider_core::ChannelKind;

use crate::content::StreamContent;
use crate::parser::parser_for;

/// Hard ceiling on the parse buffer regardless of group config (spec.md
/// §4.F: "unbounded (but hard-capped at 10 MiB) parse buffer").
pub const PARSE_BUFFER_CAP: usize = 10 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum TeeError {
    #[error("client disconnected")]
    ClientDisconnected,
}

pub struct TeeOutcome {
    /// Bytes accumulated up to `log_ceiling`. The caller (Request Logger)
    /// decides whether to append the truncation marker based on
    /// `log_truncated`.
    pub log_body: Bytes,
    pub log_truncated: bool,
    /// `None` only when the client disconnected before EOF, per spec.md
    /// §4.F's "recoverable scope" — a parser is still run on whatever was
    /// buffered if the upstream body completed normally.
    pub parsed: Option<StreamContent>,
}

/// Runs the tee loop. `write_to_client` is called once per chunk; returning
/// `Err` means the client disconnected and stops the loop without treating
/// it as an upstream failure.
pub async fn tee_stream<S, W, Fut>(
    mut upstream: S,
    mut write_to_client: W,
    channel: ChannelKind,
    log_ceiling: usize,
) -> TeeOutcome
where
    S: Stream<Item = Result<Bytes, std::io::Error>> + Unpin,
    W: FnMut(Bytes) -> Fut,
    Fut: std::future::Future<Output = Result<(), TeeError>>,
{
    let mut log_buffer = BytesMut::new();
    let mut log_truncated = false;
    let mut parse_buffer = BytesMut::new();
    let mut parse_truncated = false;
    let mut client_disconnected = false;

    while let Some(item) = upstream.next().await {
        let chunk = match item {
            Ok(chunk) => chunk,
            Err(_) => break,
        };

        if write_to_client(chunk.clone()).await.is_err() {
            client_disconnected = true;
            break;
        }

        append_bounded(&mut log_buffer, &chunk, log_ceiling, &mut log_truncated);
        append_bounded(
            &mut parse_buffer,
            &chunk,
            PARSE_BUFFER_CAP,
            &mut parse_truncated,
        );
    }

    let parse_buffer = parse_buffer.freeze();
    let parsed = if client_disconnected {
        None
    } else {
        let mut content = parse_panic_isolated(channel, &parse_buffer);
        if !parse_buffer.is_empty() {
            content.raw = Some(parse_buffer);
        }
        Some(content)
    };

    TeeOutcome {
        log_body: log_buffer.freeze(),
        log_truncated,
        parsed,
    }
}

fn append_bounded(buffer: &mut BytesMut, chunk: &Bytes, ceiling: usize, truncated: &mut bool) {
    if *truncated {
        return;
    }
    let remaining = ceiling.saturating_sub(buffer.len());
    if chunk.len() <= remaining {
        buffer.extend_from_slice(chunk);
    } else {
        buffer.extend_from_slice(&chunk[..remaining]);
        *truncated = true;
    }
}

/// Parsing never corrupts the request: a panicking parser yields "no
/// semantic content" instead of propagating (spec.md §4.F).
fn parse_panic_isolated(channel: ChannelKind, buffer: &[u8]) -> StreamContent {
    let parser = parser_for(channel);
    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| parser.parse(buffer))) {
        Ok(content) => content,
        Err(_) => {
            tracing::warn!(channel = channel.as_str(), "stream parser panicked");
            StreamContent::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    fn chunks(parts: &[&str]) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Unpin {
        stream::iter(
            parts
                .iter()
                .map(|p| Ok(Bytes::from(p.as_bytes().to_vec())))
                .collect::<Vec<_>>(),
        )
    }

    #[tokio::test]
    async fn tees_every_chunk_to_the_client() {
        let received: Arc<Mutex<Vec<Bytes>>> = Arc::new(Mutex::new(Vec::new()));
        let received_clone = received.clone();
        let outcome = tee_stream(
            chunks(&["hello ", "world"]),
            move |chunk| {
                let received = received_clone.clone();
                async move {
                    received.lock().await.push(chunk);
                    Ok(())
                }
            },
            ChannelKind::OpenAi,
            1024,
        )
        .await;

        let received = received.lock().await;
        assert_eq!(received.len(), 2);
        assert_eq!(&outcome.log_body[..], b"hello world");
        assert!(!outcome.log_truncated);
    }

    #[tokio::test]
    async fn truncates_log_buffer_at_ceiling() {
        let outcome = tee_stream(
            chunks(&["0123456789", "abcdefghij"]),
            |_chunk| async { Ok(()) },
            ChannelKind::OpenAi,
            5,
        )
        .await;
        assert_eq!(&outcome.log_body[..], b"01234");
        assert!(outcome.log_truncated);
    }

    #[tokio::test]
    async fn stops_on_client_disconnect_and_skips_parsing() {
        let outcome = tee_stream(
            chunks(&["a", "b", "c"]),
            |chunk| async move {
                if chunk.as_ref() == b"b" {
                    Err(TeeError::ClientDisconnected)
                } else {
                    Ok(())
                }
            },
            ChannelKind::OpenAi,
            1024,
        )
        .await;
        assert_eq!(&outcome.log_body[..], b"a");
        assert!(outcome.parsed.is_none());
    }

    #[tokio::test]
    async fn parses_buffer_once_at_eof() {
        let outcome = tee_stream(
            chunks(&["data: {\"choices\":[{\"delta\":{\"content\":\"hi\"}}]}\n\n"]),
            |_chunk| async { Ok(()) },
            ChannelKind::OpenAi,
            1024,
        )
        .await;
        assert_eq!(outcome.parsed.unwrap().text.as_deref(), Some("hi"));
    }

    #[tokio::test]
    async fn raw_bytes_carry_the_full_captured_body() {
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"hi\"}}]}\n\n";
        let outcome = tee_stream(chunks(&[body]), |_chunk| async { Ok(()) }, ChannelKind::OpenAi, 1024).await;
        let content = outcome.parsed.unwrap();
        assert_eq!(content.raw.as_deref(), Some(body.as_bytes()));
    }

    #[tokio::test]
    async fn empty_stream_leaves_raw_unset() {
        let outcome = tee_stream(chunks(&[]), |_chunk| async { Ok(()) }, ChannelKind::OpenAi, 1024).await;
        assert!(outcome.parsed.unwrap().raw.is_none());
    }
}
