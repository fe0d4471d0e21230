// Output Stream - lazy, finite, single-use sequence of output chunks

use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc::{self, error::TryRecvError};

use crate::domain::{OutputChunk, OutputFragment};

use super::handle::SessionShared;

/// Result of a non-blocking poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Chunk(OutputChunk),
    /// Nothing available right now; the process may still produce more
    Pending,
    /// The process has exited and all output was delivered
    Finished,
}

/// Output of one session, in delivery order
///
/// Ends once the process has terminated and every buffered chunk was
/// yielded. At that point the session's exit report is known. Each yielded
/// chunk is also appended to the session's output buffer.
pub struct OutputStream {
    shared: Arc<SessionShared>,
    rx: mpsc::Receiver<OutputFragment>,
    next_seq: u64,
    done: bool,
}

impl OutputStream {
    pub(crate) fn new(shared: Arc<SessionShared>, rx: mpsc::Receiver<OutputFragment>) -> Self {
        Self {
            shared,
            rx,
            next_seq: 0,
            done: false,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.shared.id
    }

    pub fn is_finished(&self) -> bool {
        self.done
    }

    /// Non-blocking poll for event loops that must not await
    pub fn try_next(&mut self) -> PollOutcome {
        if self.done {
            return PollOutcome::Finished;
        }
        match self.rx.try_recv() {
            Ok(fragment) => PollOutcome::Chunk(self.sequence(fragment)),
            Err(TryRecvError::Empty) => PollOutcome::Pending,
            Err(TryRecvError::Disconnected) => {
                self.finish();
                PollOutcome::Finished
            }
        }
    }

    /// Drain every chunk available right now without waiting
    pub fn drain_ready(&mut self) -> Vec<OutputChunk> {
        let mut chunks = Vec::new();
        while let PollOutcome::Chunk(chunk) = self.try_next() {
            chunks.push(chunk);
        }
        chunks
    }

    fn sequence(&mut self, fragment: OutputFragment) -> OutputChunk {
        let chunk = OutputChunk {
            seq: self.next_seq,
            stream: fragment.stream,
            text: fragment.text,
        };
        self.next_seq += 1;
        self.shared.session.lock().record_output(chunk.clone());
        chunk
    }

    fn finish(&mut self) {
        if !self.done {
            self.done = true;
            self.shared.settle();
        }
    }
}

impl Stream for OutputStream {
    type Item = OutputChunk;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<OutputChunk>> {
        if self.done {
            return Poll::Ready(None);
        }
        match self.rx.poll_recv(cx) {
            Poll::Ready(Some(fragment)) => Poll::Ready(Some(self.sequence(fragment))),
            Poll::Ready(None) => {
                self.finish();
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl std::fmt::Debug for OutputStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputStream")
            .field("session_id", &self.shared.id)
            .field("next_seq", &self.next_seq)
            .field("done", &self.done)
            .finish()
    }
}
