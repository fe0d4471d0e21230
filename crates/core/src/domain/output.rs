// Output Domain Model - chunks captured from a child process

use serde::{Deserialize, Serialize};

/// Which pipe a chunk was read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl std::fmt::Display for StreamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamKind::Stdout => write!(f, "stdout"),
            StreamKind::Stderr => write!(f, "stderr"),
        }
    }
}

/// Raw text read from one pipe, before it is sequenced by the bridge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFragment {
    pub stream: StreamKind,
    pub text: String,
}

impl OutputFragment {
    pub fn stdout(text: impl Into<String>) -> Self {
        Self {
            stream: StreamKind::Stdout,
            text: text.into(),
        }
    }

    pub fn stderr(text: impl Into<String>) -> Self {
        Self {
            stream: StreamKind::Stderr,
            text: text.into(),
        }
    }
}

/// A sequenced chunk of output, as surfaced to the presentation layer
///
/// `seq` starts at 0 and increases by one per chunk in delivery order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputChunk {
    pub seq: u64,
    pub stream: StreamKind,
    pub text: String,
}

/// Append-only, ordered record of everything a session produced
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputBuffer {
    chunks: Vec<OutputChunk>,
}

impl OutputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk. Chunks must arrive with increasing `seq`.
    pub fn push(&mut self, chunk: OutputChunk) {
        debug_assert!(
            self.chunks.last().map_or(true, |last| last.seq < chunk.seq),
            "output chunks must be appended in sequence order"
        );
        self.chunks.push(chunk);
    }

    pub fn chunks(&self) -> &[OutputChunk] {
        &self.chunks
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// All output concatenated in delivery order
    pub fn text(&self) -> String {
        self.chunks.iter().map(|c| c.text.as_str()).collect()
    }

    /// Output of a single stream, concatenated in order
    pub fn stream_text(&self, stream: StreamKind) -> String {
        self.chunks
            .iter()
            .filter(|c| c.stream == stream)
            .map(|c| c.text.as_str())
            .collect()
    }

    /// Drop captured chunks (the user cleared the log view)
    pub fn clear(&mut self) {
        self.chunks.clear();
    }
}

/// Incremental UTF-8 decoder for pipe reads
///
/// A read may end in the middle of a multi-byte sequence. The incomplete
/// tail is held back and prefixed to the next read instead of being turned
/// into replacement characters. Genuinely invalid bytes are replaced.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode the next block of bytes, returning whatever text is complete
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::new();
        let mut rest: &[u8] = &self.pending;

        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    rest = &[];
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    out.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(bad) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[bad..];
                        }
                        None => {
                            // Incomplete sequence at the end: keep for next read
                            rest = after;
                            break;
                        }
                    }
                }
            }
        }

        self.pending = rest.to_vec();
        out
    }

    /// Flush any held-back bytes at end of stream
    pub fn finish(&mut self) -> String {
        let tail = std::mem::take(&mut self.pending);
        String::from_utf8_lossy(&tail).into_owned()
    }
}
