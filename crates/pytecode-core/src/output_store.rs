//! Broadcast + history store for the current run's output.

use std::{
    collections::VecDeque,
    sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use futures::{StreamExt, future};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::{ImageArtifact, OutputChunk, OutputEvent, RunOutput};

/// Console history limit (16 MB). Oldest text is dropped first.
const HISTORY_BYTES: usize = 16 * 1024 * 1024;

/// Shown once, ahead of the remaining text, after the limit is hit.
pub const TRUNCATED_NOTICE: &str = "output truncated, the earliest lines were dropped";

struct StoredChunk {
    chunk: OutputChunk,
    bytes: usize,
}

#[derive(Default)]
struct Inner {
    text: VecDeque<StoredChunk>,
    text_bytes: usize,
    images: Vec<ImageArtifact>,
    finished: bool,
    truncated: bool,
}

impl Inner {
    /// Stored chunks, led by the truncation notice when text was dropped.
    fn chunks(&self) -> impl Iterator<Item = OutputChunk> + '_ {
        let notice = self
            .truncated
            .then(|| OutputChunk::Stderr(TRUNCATED_NOTICE.to_string()));
        notice
            .into_iter()
            .chain(self.text.iter().map(|s| s.chunk.clone()))
    }
}

/// Output of the current (or most recent) run.
///
/// Holds the text and images of exactly one run. Late subscribers
/// receive what the run has produced so far, then live updates.
pub struct OutputStore {
    inner: RwLock<Inner>,
    sender: broadcast::Sender<OutputEvent>,
    history_limit: usize,
}

impl Default for OutputStore {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::with_history_limit(HISTORY_BYTES)
    }

    /// Create an empty store keeping at most `limit` bytes of text.
    #[must_use]
    pub fn with_history_limit(limit: usize) -> Self {
        let (sender, _) = broadcast::channel(10000);
        Self {
            inner: RwLock::new(Inner::default()),
            sender,
            history_limit: limit,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Discard everything from the previous run.
    pub fn reset(&self) {
        let mut inner = self.write();
        *inner = Inner::default();
        let _ = self.sender.send(OutputEvent::Cleared);
    }

    /// Append a text chunk.
    pub fn push_chunk(&self, chunk: OutputChunk) {
        let bytes = OutputEvent::Text(chunk.clone()).approx_bytes();

        let mut inner = self.write();
        while inner.text_bytes.saturating_add(bytes) > self.history_limit {
            if let Some(front) = inner.text.pop_front() {
                inner.text_bytes = inner.text_bytes.saturating_sub(front.bytes);
            } else {
                break;
            }
            if !inner.truncated {
                inner.truncated = true;
                tracing::warn!(limit = self.history_limit, "Console history limit reached");
                let notice = OutputChunk::Stderr(TRUNCATED_NOTICE.to_string());
                let _ = self.sender.send(OutputEvent::Text(notice));
            }
        }
        inner.text.push_back(StoredChunk {
            chunk: chunk.clone(),
            bytes,
        });
        inner.text_bytes = inner.text_bytes.saturating_add(bytes);
        // Sent under the lock so subscribers never see a gap or a duplicate.
        let _ = self.sender.send(OutputEvent::Text(chunk));
    }

    /// Push stdout text.
    pub fn push_stdout<S: Into<String>>(&self, s: S) {
        self.push_chunk(OutputChunk::Stdout(s.into()));
    }

    /// Push stderr text.
    pub fn push_stderr<S: Into<String>>(&self, s: S) {
        self.push_chunk(OutputChunk::Stderr(s.into()));
    }

    /// Append a plot.
    pub fn push_image(&self, image: ImageArtifact) {
        let mut inner = self.write();
        inner.images.push(image.clone());
        let _ = self.sender.send(OutputEvent::Image(image));
    }

    /// Mark the run as finished.
    pub fn finish(&self) {
        let mut inner = self.write();
        inner.finished = true;
        let _ = self.sender.send(OutputEvent::Finished);
    }

    /// Rendered console lines, stderr tagged.
    #[must_use]
    pub fn text_output(&self) -> Vec<String> {
        self.read().chunks().map(|c| c.render()).collect()
    }

    /// Raw chunks with their stream.
    #[must_use]
    pub fn chunks(&self) -> Vec<OutputChunk> {
        self.read().chunks().collect()
    }

    #[must_use]
    pub fn image_outputs(&self) -> Vec<ImageArtifact> {
        self.read().images.clone()
    }

    #[must_use]
    pub fn image_count(&self) -> usize {
        self.read().images.len()
    }

    #[must_use]
    pub fn has_images(&self) -> bool {
        !self.read().images.is_empty()
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.read().finished
    }

    /// Text and images of the current run.
    #[must_use]
    pub fn snapshot(&self) -> RunOutput {
        let inner = self.read();
        RunOutput {
            text: inner.chunks().map(|c| c.render()).collect(),
            images: inner.images.clone(),
        }
    }

    /// Get a receiver for live updates.
    #[must_use]
    pub fn get_receiver(&self) -> broadcast::Receiver<OutputEvent> {
        self.sender.subscribe()
    }

    /// Current run as events, plus a receiver positioned right after them.
    fn history_and_receiver(&self) -> (Vec<OutputEvent>, broadcast::Receiver<OutputEvent>) {
        let inner = self.read();
        let rx = self.sender.subscribe();
        let mut history: Vec<OutputEvent> = inner.chunks().map(OutputEvent::Text).collect();
        history.extend(inner.images.iter().cloned().map(OutputEvent::Image));
        if inner.finished {
            history.push(OutputEvent::Finished);
        }
        (history, rx)
    }

    /// Stream that yields the current run first, then live updates.
    #[must_use]
    pub fn history_plus_stream(&self) -> futures::stream::BoxStream<'static, OutputEvent> {
        let (history, rx) = self.history_and_receiver();

        let hist = futures::stream::iter(history);
        let live = BroadcastStream::new(rx).filter_map(|res| async move {
            if let Err(e) = &res {
                tracing::warn!("Output subscriber lagged: {e}");
            }
            res.ok()
        });

        Box::pin(hist.chain(live))
    }

    /// Rendered console lines until the run finishes.
    #[must_use]
    pub fn text_stream(&self) -> futures::stream::BoxStream<'static, String> {
        self.history_plus_stream()
            .take_while(|event| future::ready(!matches!(event, OutputEvent::Finished)))
            .filter_map(|event| async move {
                match event {
                    OutputEvent::Text(chunk) => Some(chunk.render()),
                    _ => None,
                }
            })
            .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png(tag: u8) -> ImageArtifact {
        ImageArtifact::new(vec![0x89, b'P', b'N', b'G', tag])
    }

    #[test]
    fn test_reset_replaces_previous_run() {
        let store = OutputStore::new();
        store.push_stdout("first");
        store.push_image(png(1));
        store.finish();

        store.reset();
        store.push_stdout("second");

        assert_eq!(store.text_output(), vec!["second".to_string()]);
        assert!(!store.has_images());
        assert!(!store.is_finished());
    }

    #[test]
    fn test_interleaved_order_is_kept() {
        let store = OutputStore::new();
        store.push_stdout("a");
        store.push_stderr("b");
        store.push_stdout("c");

        assert_eq!(store.text_output(), vec!["a", "Error: b", "c"]);
        assert!(store.chunks()[1].is_stderr());
    }

    #[test]
    fn test_images_keep_creation_order() {
        let store = OutputStore::new();
        store.push_image(png(1));
        store.push_image(png(2));

        let images = store.image_outputs();
        assert_eq!(images.len(), 2);
        assert_eq!(images[0].as_bytes()[4], 1);
        assert_eq!(images[1].as_bytes()[4], 2);
        assert_eq!(store.snapshot().images, images);
    }

    #[tokio::test]
    async fn test_text_stream_replays_then_follows() {
        let store = std::sync::Arc::new(OutputStore::new());
        store.push_stdout("before");

        let stream = store.text_stream();
        store.push_stderr("after");
        store.finish();
        store.push_stdout("ignored");

        let lines: Vec<String> = stream.collect().await;
        assert_eq!(lines, vec!["before", "Error: after"]);
    }

    #[test]
    fn test_history_limit_marks_truncation_once() {
        let limit = 3 * OutputEvent::Text(OutputChunk::Stdout("line-0".into())).approx_bytes();
        let store = OutputStore::with_history_limit(limit);
        let mut rx = store.get_receiver();

        for i in 0..5 {
            store.push_stdout(format!("line-{i}"));
        }

        let notice = format!("Error: {TRUNCATED_NOTICE}");
        assert_eq!(
            store.text_output(),
            vec![notice.clone(), "line-2".into(), "line-3".into(), "line-4".into()]
        );
        assert_eq!(store.snapshot().text[0], notice);

        let mut notices = 0;
        while let Ok(event) = rx.try_recv() {
            if let OutputEvent::Text(chunk) = event {
                if chunk.render() == notice {
                    notices += 1;
                }
            }
        }
        assert_eq!(notices, 1);

        store.reset();
        store.push_stdout("fresh");
        assert_eq!(store.text_output(), vec!["fresh".to_string()]);
    }

    #[tokio::test]
    async fn test_receiver_sees_clear() {
        let store = OutputStore::new();
        let mut rx = store.get_receiver();
        store.reset();
        assert_eq!(rx.recv().await.unwrap(), OutputEvent::Cleared);
    }
}
