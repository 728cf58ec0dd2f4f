//! Deterministic in-memory backend for tests.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        Mutex, MutexGuard, PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use pytecode_core::{
    LibrarySet, OutputChunk,
    traits::{BackendError, ExecutionBackend, StreamSender},
};
use tokio::sync::{Notify, oneshot};

/// Canned result for one source text.
#[derive(Debug, Clone, Default)]
pub struct Script {
    pub output: Vec<OutputChunk>,
    /// Base64 encoded plots.
    pub images: Vec<String>,
    /// Uncaught error raised after the output.
    pub error: Option<String>,
}

impl Script {
    #[must_use]
    pub fn output(chunks: impl IntoIterator<Item = OutputChunk>) -> Self {
        Self {
            output: chunks.into_iter().collect(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_images(mut self, images: impl IntoIterator<Item = String>) -> Self {
        self.images = images.into_iter().collect();
        self
    }

    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Understands `print('...')` lines and division by zero.
    fn interpret(source: &str) -> Self {
        let mut script = Self::default();
        for line in source.lines().map(str::trim) {
            if let Some(text) = line
                .strip_prefix("print(")
                .and_then(|rest| rest.strip_suffix(')'))
            {
                let text = text.trim_matches(|c| c == '\'' || c == '"');
                script.output.push(OutputChunk::Stdout(text.to_string()));
            } else if line.replace(' ', "").contains("/0") {
                script.error = Some(
                    "Traceback (most recent call last):\n  File \"<playground>\", line 1, in <module>\nZeroDivisionError: division by zero"
                        .to_string(),
                );
                break;
            }
        }
        script
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Backend whose behavior is set up by the test.
#[derive(Default)]
pub struct ScriptedBackend {
    scripts: Mutex<HashMap<String, Script>>,
    runtime_failure: Mutex<Option<String>>,
    unavailable: Mutex<HashSet<String>>,
    library_loads: Mutex<Vec<LibrarySet>>,
    runtime_loads: AtomicUsize,
    last_images: Mutex<Vec<String>>,
    init_gate: Mutex<Option<oneshot::Receiver<()>>>,
    init_entered: Notify,
    run_gate: Mutex<Option<oneshot::Receiver<()>>>,
    run_entered: Notify,
}

impl ScriptedBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `script` whenever `source` is run.
    pub fn script(&self, source: impl Into<String>, script: Script) {
        lock(&self.scripts).insert(source.into(), script);
    }

    /// Make `load_runtime` fail until cleared.
    pub fn fail_runtime(&self, message: impl Into<String>) {
        *lock(&self.runtime_failure) = Some(message.into());
    }

    pub fn clear_runtime_failure(&self) {
        *lock(&self.runtime_failure) = None;
    }

    /// Make a library fail to load.
    pub fn make_unavailable(&self, library: impl Into<String>) {
        lock(&self.unavailable).insert(library.into());
    }

    #[must_use]
    pub fn runtime_loads(&self) -> usize {
        self.runtime_loads.load(Ordering::SeqCst)
    }

    /// Every set passed to `load_libraries`, in call order.
    #[must_use]
    pub fn library_loads(&self) -> Vec<LibrarySet> {
        lock(&self.library_loads).clone()
    }

    /// Block the next `load_runtime` until the returned sender fires.
    pub fn hold_next_init(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *lock(&self.init_gate) = Some(rx);
        tx
    }

    /// Resolves once a held `load_runtime` is waiting.
    pub async fn init_entered(&self) {
        self.init_entered.notified().await;
    }

    /// Block the next run after its output is streamed.
    pub fn hold_next_run(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *lock(&self.run_gate) = Some(rx);
        tx
    }

    /// Resolves once a held run is waiting.
    pub async fn run_entered(&self) {
        self.run_entered.notified().await;
    }
}

#[async_trait]
impl ExecutionBackend for ScriptedBackend {
    async fn load_runtime(&self) -> Result<(), BackendError> {
        self.runtime_loads.fetch_add(1, Ordering::SeqCst);
        let gate = lock(&self.init_gate).take();
        if let Some(gate) = gate {
            self.init_entered.notify_one();
            let _ = gate.await;
        }
        match lock(&self.runtime_failure).clone() {
            Some(message) => Err(BackendError::RuntimeUnavailable(message)),
            None => Ok(()),
        }
    }

    async fn load_libraries(&self, libraries: &LibrarySet) -> Result<(), BackendError> {
        lock(&self.library_loads).push(libraries.clone());
        let unavailable = lock(&self.unavailable).clone();
        for library in libraries.iter() {
            if unavailable.contains(library) {
                return Err(BackendError::LibraryLoad {
                    library: library.to_string(),
                    message: format!("No module named '{library}'"),
                });
            }
        }
        Ok(())
    }

    async fn run_source(&self, source: &str, output: StreamSender) -> Result<(), BackendError> {
        let script = lock(&self.scripts)
            .get(source)
            .cloned()
            .unwrap_or_else(|| Script::interpret(source));

        for chunk in script.output {
            let _ = output.send(chunk);
        }

        let gate = lock(&self.run_gate).take();
        if let Some(gate) = gate {
            self.run_entered.notify_one();
            let _ = gate.await;
        }

        if let Some(error) = script.error {
            lock(&self.last_images).clear();
            return Err(BackendError::Runtime(error));
        }
        *lock(&self.last_images) = script.images;
        Ok(())
    }

    async fn collect_images(&self) -> Result<Vec<String>, BackendError> {
        Ok(std::mem::take(&mut *lock(&self.last_images)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interpret_prints_and_errors() {
        let script = Script::interpret("print('a')\nprint(\"b\")\ny = 2");
        assert_eq!(
            script.output,
            vec![OutputChunk::Stdout("a".into()), OutputChunk::Stdout("b".into())]
        );
        assert!(script.error.is_none());

        let script = Script::interpret("x = 1 / 0\nprint('never')");
        assert!(script.error.unwrap().ends_with("ZeroDivisionError: division by zero"));
        assert!(script.output.is_empty());
    }
}
