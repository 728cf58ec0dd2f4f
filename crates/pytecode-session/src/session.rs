//! Execution session: backend lifecycle, run serialization and output capture.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use pytecode_core::{
    BackendState, ImageArtifact, LibrarySet, OutputStore, RunOutput, RunState, ViewMode,
    traits::{BackendError, ExecutionBackend, KeyValueStore},
};
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use crate::{
    error::{ExecutionError, SessionError},
    events::{SessionEvent, SessionSnapshot},
    preferences,
};

struct SessionState {
    backend: BackendState,
    run: RunState,
    view_mode: ViewMode,
    /// What the user picked (and what is persisted).
    selection: LibrarySet,
    /// What the backend last loaded successfully.
    loaded: Option<LibrarySet>,
    /// Selection that arrived while initializing.
    pending: Option<LibrarySet>,
    last_error: Option<String>,
}

/// Owns the lifecycle of code runs against one backend.
///
/// Guards are checked and updated under a short lock that is never held
/// across an await, so at most one run and one initialization are ever
/// in flight. Share it behind an `Arc`.
pub struct ExecutionSession<B, K>
where
    B: ExecutionBackend,
    K: KeyValueStore,
{
    backend: B,
    store: K,
    state: Mutex<SessionState>,
    output: Arc<OutputStore>,
    events: broadcast::Sender<SessionEvent>,
}

/// Returns the session to `Idle` however the run ends, including when
/// the run future is dropped.
struct RunGuard<'a, B, K>
where
    B: ExecutionBackend,
    K: KeyValueStore,
{
    session: &'a ExecutionSession<B, K>,
    run_id: Uuid,
    success: bool,
}

impl<B, K> Drop for RunGuard<'_, B, K>
where
    B: ExecutionBackend,
    K: KeyValueStore,
{
    fn drop(&mut self) {
        self.session.output.finish();
        let mut st = self.session.lock();
        st.run = RunState::Idle;
        self.session.emit(SessionEvent::RunState(RunState::Idle));
        self.session.emit(SessionEvent::RunFinished {
            run_id: self.run_id,
            success: self.success,
        });
        tracing::info!(run_id = %self.run_id, success = self.success, "Run finished");
    }
}

/// Moves an abandoned initialization to `Failed` so it can be retried.
struct InitGuard<'a, B, K>
where
    B: ExecutionBackend,
    K: KeyValueStore,
{
    session: &'a ExecutionSession<B, K>,
    settled: bool,
}

impl<B, K> Drop for InitGuard<'_, B, K>
where
    B: ExecutionBackend,
    K: KeyValueStore,
{
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let message = "Environment loading was cancelled".to_string();
        tracing::warn!("{message}");
        let mut st = self.session.lock();
        st.pending = None;
        st.last_error = Some(message.clone());
        self.session.transition(&mut st, BackendState::Failed);
        self.session.emit(SessionEvent::InitFailed(message));
    }
}

impl<B, K> ExecutionSession<B, K>
where
    B: ExecutionBackend,
    K: KeyValueStore,
{
    /// Create a session with an empty library selection.
    #[must_use]
    pub fn new(backend: B, store: K) -> Self {
        let (events, _) = broadcast::channel(1024);
        Self {
            backend,
            store,
            state: Mutex::new(SessionState {
                backend: BackendState::Uninitialized,
                run: RunState::Idle,
                view_mode: ViewMode::Console,
                selection: LibrarySet::new(),
                loaded: None,
                pending: None,
                last_error: None,
            }),
            output: Arc::new(OutputStore::new()),
            events,
        }
    }

    /// Create a session and restore the persisted library selection.
    ///
    /// # Errors
    /// Returns error if the store cannot be read.
    pub async fn open(backend: B, store: K) -> Result<Self, SessionError> {
        let selection = preferences::load_library_selection(&store).await?;
        tracing::info!(libraries = %selection.describe(), "Restored library selection");
        let session = Self::new(backend, store);
        session.lock().selection = selection;
        Ok(session)
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    fn progress(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!("{message}");
        self.emit(SessionEvent::Progress(message));
    }

    fn transition(&self, st: &mut SessionState, next: BackendState) {
        debug_assert!(
            st.backend.can_transition_to(next),
            "illegal backend transition {} -> {next}",
            st.backend
        );
        tracing::debug!(from = %st.backend, to = %next, "Backend state change");
        st.backend = next;
        self.emit(SessionEvent::BackendState(next));
    }

    fn set_view_mode_locked(&self, st: &mut SessionState, mode: ViewMode) {
        if st.view_mode != mode {
            st.view_mode = mode;
            self.emit(SessionEvent::ViewMode(mode));
        }
    }

    #[must_use]
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    #[must_use]
    pub const fn store(&self) -> &K {
        &self.store
    }

    /// Output of the current or most recent run.
    #[must_use]
    pub const fn output(&self) -> &Arc<OutputStore> {
        &self.output
    }

    /// Subscribe to progress and state changes.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    #[must_use]
    pub fn backend_state(&self) -> BackendState {
        self.lock().backend
    }

    #[must_use]
    pub fn run_state(&self) -> RunState {
        self.lock().run
    }

    #[must_use]
    pub fn view_mode(&self) -> ViewMode {
        self.lock().view_mode
    }

    #[must_use]
    pub fn library_selection(&self) -> LibrarySet {
        self.lock().selection.clone()
    }

    /// Libraries the backend was last initialized with.
    #[must_use]
    pub fn loaded_libraries(&self) -> Option<LibrarySet> {
        self.lock().loaded.clone()
    }

    /// Message of the last failed initialization.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.lock().last_error.clone()
    }

    #[must_use]
    pub fn text_output(&self) -> Vec<String> {
        self.output.text_output()
    }

    #[must_use]
    pub fn image_outputs(&self) -> Vec<ImageArtifact> {
        self.output.image_outputs()
    }

    /// Whether the Graphics view may be selected.
    #[must_use]
    pub fn graphics_available(&self) -> bool {
        self.output.has_images()
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        let st = self.lock();
        SessionSnapshot {
            backend_state: st.backend,
            run_state: st.run,
            view_mode: st.view_mode,
            library_selection: st.selection.clone(),
            loaded_libraries: st.loaded.clone(),
            text_output: self.output.text_output(),
            image_count: self.output.image_count(),
            last_error: st.last_error.clone(),
        }
    }

    /// Initialize with the current library selection.
    ///
    /// # Errors
    /// See [`Self::initialize`].
    pub async fn start(&self) -> Result<(), SessionError> {
        let selection = self.library_selection();
        self.initialize(selection).await
    }

    /// Load the runtime and `libraries`.
    ///
    /// A no-op when already ready with the same libraries.
    ///
    /// # Errors
    /// `InitializationInProgress` if another initialization is running,
    /// `BackendInit` if the runtime or a library fails to load.
    pub async fn initialize(&self, libraries: LibrarySet) -> Result<(), SessionError> {
        {
            let mut st = self.lock();
            if !self.begin_initialize(&mut st, &libraries)? {
                tracing::debug!(libraries = %libraries.describe(), "Already initialized");
                return Ok(());
            }
        }
        self.run_initialization(libraries).await
    }

    /// Move to `Initializing` unless already ready with `libraries`.
    fn begin_initialize(
        &self,
        st: &mut SessionState,
        libraries: &LibrarySet,
    ) -> Result<bool, SessionError> {
        match st.backend {
            BackendState::Initializing => Err(SessionError::InitializationInProgress),
            BackendState::Ready if st.loaded.as_ref() == Some(libraries) => Ok(false),
            _ => {
                st.last_error = None;
                self.transition(st, BackendState::Initializing);
                Ok(true)
            }
        }
    }

    async fn run_initialization(&self, libraries: LibrarySet) -> Result<(), SessionError> {
        let mut guard = InitGuard {
            session: self,
            settled: false,
        };
        let mut target = libraries;
        loop {
            match self.load(&target).await {
                Ok(()) => {
                    let mut st = self.lock();
                    st.loaded = Some(target.clone());
                    match st.pending.take() {
                        Some(next) if next != target => {
                            tracing::info!(
                                libraries = %next.describe(),
                                "Selection changed while initializing, reloading"
                            );
                            target = next;
                        }
                        _ => {
                            guard.settled = true;
                            self.transition(&mut st, BackendState::Ready);
                            return Ok(());
                        }
                    }
                }
                Err(e) => {
                    let message = e.to_string();
                    tracing::error!("Backend initialization failed: {message}");
                    guard.settled = true;
                    let mut st = self.lock();
                    st.pending = None;
                    st.last_error = Some(message.clone());
                    self.transition(&mut st, BackendState::Failed);
                    self.emit(SessionEvent::InitFailed(message));
                    return Err(SessionError::BackendInit(e));
                }
            }
        }
    }

    async fn load(&self, libraries: &LibrarySet) -> Result<(), BackendError> {
        self.progress("Loading environment…");
        self.backend.load_runtime().await?;
        if !libraries.is_empty() {
            self.progress(format!("Loading libraries ({})…", libraries.describe()));
            self.backend.load_libraries(libraries).await?;
        }
        self.progress("Environment ready");
        Ok(())
    }

    /// Run `source`, replacing the previous run's output.
    ///
    /// # Errors
    /// `ConcurrentRunRejected` while another run is in flight and
    /// `BackendNotReady` before initialization; neither touches output.
    /// `Execution` when the source raises; the error text is also part
    /// of the captured output.
    pub async fn run(&self, source: &str) -> Result<RunOutput, SessionError> {
        let run_id = {
            let mut st = self.lock();
            if st.run == RunState::Running {
                tracing::warn!("Rejecting run while another is in progress");
                return Err(SessionError::ConcurrentRunRejected);
            }
            if st.backend != BackendState::Ready {
                return Err(SessionError::BackendNotReady(st.backend));
            }
            st.run = RunState::Running;
            self.emit(SessionEvent::RunState(RunState::Running));
            // The images Graphics would show are about to be cleared.
            self.set_view_mode_locked(&mut st, ViewMode::Console);
            Uuid::new_v4()
        };
        let mut guard = RunGuard {
            session: self,
            run_id,
            success: false,
        };

        self.output.reset();
        tracing::info!(%run_id, "Run started");

        let (tx, mut rx) = mpsc::unbounded_channel();
        let drain = async {
            while let Some(chunk) = rx.recv().await {
                self.output.push_chunk(chunk);
            }
        };
        let (result, ()) = tokio::join!(self.backend.run_source(source, tx), drain);

        let outcome = match result {
            Ok(()) => self.collect_images().await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(()) => {
                guard.success = true;
                Ok(self.output.snapshot())
            }
            Err(e) => {
                let message = match e {
                    BackendError::Runtime(message) => message,
                    other => other.to_string(),
                };
                self.output.push_stderr(message.clone());
                Err(ExecutionError {
                    message,
                    output: self.output.snapshot(),
                }
                .into())
            }
        }
    }

    async fn collect_images(&self) -> Result<(), BackendError> {
        let encoded = self.backend.collect_images().await?;
        for (index, data) in encoded.iter().enumerate() {
            match ImageArtifact::from_base64(data) {
                Ok(image) => self.output.push_image(image),
                Err(e) => {
                    tracing::warn!(index, "Skipping undecodable plot: {e}");
                    self.output
                        .push_stderr(format!("could not decode plot {}: {e}", index + 1));
                }
            }
        }
        Ok(())
    }

    /// Select the Console or Graphics view.
    ///
    /// Returns false, changing nothing, when Graphics is requested and
    /// there are no images.
    pub fn set_view_mode(&self, mode: ViewMode) -> bool {
        let mut st = self.lock();
        if mode == ViewMode::Graphics && !self.output.has_images() {
            tracing::debug!("Graphics view unavailable without images");
            return false;
        }
        self.set_view_mode_locked(&mut st, mode);
        true
    }

    /// Store a new library selection and reload the backend if needed.
    ///
    /// While an initialization is running the selection is queued and
    /// applied when it finishes.
    ///
    /// # Errors
    /// `Storage` if persisting fails, `BackendInit` if reloading fails.
    pub async fn set_library_selection(&self, libraries: LibrarySet) -> Result<(), SessionError> {
        preferences::save_library_selection(&self.store, &libraries).await?;

        let reload = {
            let mut st = self.lock();
            st.selection = libraries.clone();
            if st.backend == BackendState::Initializing {
                tracing::debug!("Queueing selection until initialization finishes");
                st.pending = Some(libraries.clone());
                false
            } else {
                self.begin_initialize(&mut st, &libraries)?
            }
        };

        if reload {
            self.run_initialization(libraries).await
        } else {
            Ok(())
        }
    }

    /// Discard the current output ("Clear All").
    ///
    /// Returns false while a run is in progress.
    pub fn clear_output(&self) -> bool {
        let mut st = self.lock();
        if st.run == RunState::Running {
            return false;
        }
        self.output.reset();
        self.set_view_mode_locked(&mut st, ViewMode::Console);
        true
    }
}
