//! Fragment source over a raw stdout pipe
//!
//! Pipe reads return whatever the kernel has buffered, so fragments carry no
//! relation to line or message boundaries. They may also end in the middle of
//! a multi-byte UTF-8 sequence; [`Utf8Decoder`] holds those bytes back until
//! the next read completes them.

use crate::subprocess::runner::ChunkStream;
use crate::subprocess::ProcessError;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Incremental UTF-8 decoder for byte fragments
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode as much of `bytes` (plus any carried bytes) as possible.
    ///
    /// An incomplete trailing sequence is kept for the next call; invalid
    /// sequences become U+FFFD.
    pub fn push(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::with_capacity(self.pending.len());

        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match e.error_len() {
                        None => {
                            self.pending.drain(..valid);
                            break;
                        }
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + len);
                        }
                    }
                }
            }
        }

        out
    }

    /// Number of bytes waiting for the rest of their sequence
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Flush carried bytes at end of input
    pub fn finish(&mut self) -> String {
        let tail = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        tail
    }
}

struct ChunkReader<R> {
    reader: R,
    buf: Vec<u8>,
    utf8: Utf8Decoder,
    command: String,
    done: bool,
}

impl<R: AsyncRead + Unpin> ChunkReader<R> {
    async fn next_fragment(&mut self) -> Option<Result<String, ProcessError>> {
        loop {
            if self.done {
                return None;
            }

            let n = match self.reader.read(&mut self.buf).await {
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.done = true;
                    return Some(Err(ProcessError::IoError {
                        command: self.command.clone(),
                        source: e,
                    }));
                }
            };

            if n == 0 {
                self.done = true;
                let tail = self.utf8.finish();
                if tail.is_empty() {
                    return None;
                }
                return Some(Ok(tail));
            }

            let fragment = self.utf8.push(&self.buf[..n]);
            if fragment.is_empty() {
                // only part of a multi-byte character so far
                continue;
            }
            tracing::trace!("Read {} byte fragment from '{}'", n, self.command);
            return Some(Ok(fragment));
        }
    }
}

/// Turn a byte reader into a stream of text fragments.
///
/// Each read takes at most `buffer_size` bytes. A fragment can be up to three
/// bytes longer when the read completes a multi-byte character carried over
/// from the previous one.
pub fn chunk_stream<R>(reader: R, buffer_size: usize, command: String) -> ChunkStream
where
    R: AsyncRead + Send + Unpin + 'static,
{
    let state = ChunkReader {
        reader,
        buf: vec![0; buffer_size.max(1)],
        utf8: Utf8Decoder::new(),
        command,
        done: false,
    };

    Box::pin(futures::stream::unfold(state, |mut state| async move {
        let item = state.next_fragment().await?;
        Some((item, state))
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[test]
    fn test_split_multibyte_character_is_carried() {
        let bytes = "é!".as_bytes();
        let mut decoder = Utf8Decoder::new();
        assert_eq!(decoder.push(&bytes[..1]), "");
        assert_eq!(decoder.pending_len(), 1);
        assert_eq!(decoder.push(&bytes[1..]), "é!");
        assert_eq!(decoder.pending_len(), 0);
    }

    #[test]
    fn test_invalid_bytes_are_replaced() {
        let mut decoder = Utf8Decoder::new();
        assert_eq!(decoder.push(b"a\xFFb"), "a\u{FFFD}b");
        assert_eq!(decoder.pending_len(), 0);
    }

    #[test]
    fn test_truncated_sequence_at_end_is_lossy() {
        let mut decoder = Utf8Decoder::new();
        assert_eq!(decoder.push(b"ok\xE2\x82"), "ok");
        assert_eq!(decoder.finish(), "\u{FFFD}");
        assert_eq!(decoder.finish(), "");
    }

    #[tokio::test]
    async fn test_chunk_stream_respects_buffer_size() {
        let input: &[u8] = b"{\"a\":1}\n{\"b\":2}\n";
        let fragments: Vec<String> = chunk_stream(input, 4, "test".to_string())
            .map(|f| f.unwrap())
            .collect()
            .await;

        assert!(fragments.iter().all(|f| f.len() <= 4));
        assert_eq!(fragments.concat(), "{\"a\":1}\n{\"b\":2}\n");
    }

    #[tokio::test]
    async fn test_carried_bytes_can_exceed_buffer_size() {
        let text = "a😀b€c";
        let fragments: Vec<String> = chunk_stream(text.as_bytes(), 2, "test".to_string())
            .map(|f| f.unwrap())
            .collect()
            .await;

        assert!(fragments.iter().all(|f| f.len() <= 2 + 3));
        assert!(fragments.iter().any(|f| f.len() > 2));
        assert_eq!(fragments.concat(), text);
    }

    #[tokio::test]
    async fn test_chunk_stream_never_splits_characters() {
        let text = "ü€😀 done\n";
        let fragments: Vec<String> = chunk_stream(text.as_bytes(), 1, "test".to_string())
            .map(|f| f.unwrap())
            .collect()
            .await;

        assert_eq!(fragments.concat(), text);
        assert!(fragments.contains(&"😀".to_string()));
    }
}
