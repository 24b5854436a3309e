//! Server-Sent Events framing for streaming HTTP responses.
//!
//! Both upstream protocols deliver their chunks as SSE frames; this module
//! turns a raw byte stream into the sequence of `data:` payloads.

use futures::{Stream, StreamExt};

use super::GenerationError;

/// Split a byte stream into SSE `data:` payloads, one per frame.
///
/// Multi-line `data:` fields are joined with `\n`; frames without data
/// (comments, bare `event:` lines) are skipped. A trailing frame that is not
/// terminated by a blank line is still delivered when the stream ends.
pub fn data_payloads<S, B, E>(bytes: S) -> impl Stream<Item = Result<String, GenerationError>> + Send
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<GenerationError> + Send + 'static,
{
    async_stream::try_stream! {
        let mut buf = Vec::<u8>::new();

        futures::pin_mut!(bytes);
        while let Some(chunk) = bytes.next().await {
            let chunk = chunk.map_err(Into::<GenerationError>::into)?;
            buf.extend(chunk.as_ref().iter().copied().filter(|b| *b != b'\r'));

            while let Some(pos) = find_double_newline(&buf) {
                let frame = buf.drain(..pos + 2).collect::<Vec<_>>();
                if let Some(data) = frame_data(&frame) {
                    yield data;
                }
            }
        }

        if let Some(data) = frame_data(&buf) {
            yield data;
        }
    }
}

/// Extract the `data:` payload of one frame.
fn frame_data(frame: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(frame);
    let mut lines = text
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| data.strip_prefix(' ').unwrap_or(data))
        .peekable();

    lines.peek()?;
    Some(lines.collect::<Vec<_>>().join("\n"))
}

/// Find the position of a double newline in the buffer.
fn find_double_newline(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    async fn collect(chunks: Vec<&'static str>) -> Vec<String> {
        let input = stream::iter(chunks.into_iter().map(Ok::<_, GenerationError>));
        data_payloads(input)
            .map(|item| item.expect("payload"))
            .collect()
            .await
    }

    #[tokio::test]
    async fn test_frames_split_across_chunks() {
        let payloads = collect(vec!["data: {\"a\"", ":1}\n", "\ndata: two\n\n"]).await;
        assert_eq!(payloads, vec!["{\"a\":1}", "two"]);
    }

    #[tokio::test]
    async fn test_crlf_and_comments() {
        let payloads = collect(vec![": keep-alive\r\n\r\n", "data: x\r\n\r\n"]).await;
        assert_eq!(payloads, vec!["x"]);
    }

    #[tokio::test]
    async fn test_multiline_data_and_unterminated_tail() {
        let payloads = collect(vec!["event: m\ndata: a\ndata: b\n\n", "data: tail"]).await;
        assert_eq!(payloads, vec!["a\nb", "tail"]);
    }

    #[tokio::test]
    async fn test_error_ends_stream() {
        let input = stream::iter(vec![
            Ok("data: first\n\n"),
            Err(GenerationError::Service("boom".to_string())),
            Ok("data: never\n\n"),
        ]);
        let items: Vec<_> = data_payloads(input).collect().await;

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_deref().ok(), Some("first"));
        assert!(matches!(items[1], Err(GenerationError::Service(_))));
    }
}
