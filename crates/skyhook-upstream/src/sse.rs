//! SSE line parser for the upstream `text/event-stream` body.
//!
//! Buffers incoming bytes, splits on newlines, extracts `data: `
//! payloads, and filters `[DONE]` markers and comments. The trailing
//! buffer is processed at end-of-stream because the upstream does not
//! always terminate the final event with a blank line.

use bytes::{Bytes, BytesMut};
use futures::Stream;
use tokio_stream::StreamExt;
use tracing::warn;

/// Parse SSE `data:` payload lines out of a byte stream.
pub fn sse_data_lines<S>(byte_stream: S) -> impl Stream<Item = String> + Send
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Send + Unpin + 'static,
{
    futures::stream::unfold(
        (byte_stream, BytesMut::with_capacity(8192), false),
        move |(mut stream, mut buffer, done)| async move {
            if done {
                return None;
            }

            loop {
                if let Some(newline_pos) = buffer.iter().position(|&b| b == b'\n') {
                    let mut line_bytes = buffer.split_to(newline_pos + 1);
                    line_bytes.truncate(line_bytes.len() - 1);
                    if line_bytes.last() == Some(&b'\r') {
                        line_bytes.truncate(line_bytes.len() - 1);
                    }

                    let Ok(line) = std::str::from_utf8(&line_bytes) else {
                        continue; // skip invalid UTF-8 lines
                    };

                    if let Some(data) = extract_sse_data(line) {
                        return Some((data, (stream, buffer, false)));
                    }
                    continue;
                }

                match stream.next().await {
                    Some(Ok(chunk)) => buffer.extend_from_slice(&chunk),
                    Some(Err(e)) => {
                        warn!("SSE stream read error: {e}");
                        return None;
                    }
                    None => {
                        if !buffer.is_empty() {
                            let trailing = match std::str::from_utf8(&buffer) {
                                Ok(s) => s.trim().to_string(),
                                Err(_) => return None,
                            };
                            buffer.clear();
                            if let Some(data) = extract_sse_data(&trailing) {
                                return Some((data, (stream, buffer, true)));
                            }
                        }
                        return None;
                    }
                }
            }
        },
    )
}

/// Extract the payload from a single SSE line.
///
/// Returns `None` for comments, non-data fields, empty payloads, and the
/// `[DONE]` marker.
fn extract_sse_data(line: &str) -> Option<String> {
    let trimmed = line.trim();

    if trimmed.is_empty() || trimmed.starts_with(':') {
        return None;
    }

    let data = trimmed
        .strip_prefix("data: ")
        .or_else(|| trimmed.strip_prefix("data:"))?
        .trim();

    if data == "[DONE]" || data.is_empty() {
        return None;
    }

    Some(data.to_string())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
