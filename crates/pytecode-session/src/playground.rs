//! Host controller tying the editor buffer to the session.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use pytecode_core::{
    EditorBuffer, RunOutput, SourceExport, Theme,
    traits::{ExecutionBackend, KeyValueStore},
};
use serde::{Deserialize, Serialize};

use crate::{ExecutionSession, SessionError, preferences};

/// Actions bound to keyboard shortcuts and toolbar buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaygroundAction {
    Run,
    Reset,
    Clear,
    Save,
}

/// One editor attached to the shared session.
pub struct Playground<B, K>
where
    B: ExecutionBackend,
    K: KeyValueStore,
{
    session: Arc<ExecutionSession<B, K>>,
    editor: EditorBuffer,
}

impl<B, K> Playground<B, K>
where
    B: ExecutionBackend,
    K: KeyValueStore,
{
    /// Attach a new editor, holding the welcome program, to `session`.
    #[must_use]
    pub fn new(session: Arc<ExecutionSession<B, K>>) -> Self {
        Self {
            session,
            editor: EditorBuffer::new(),
        }
    }

    #[must_use]
    pub const fn session(&self) -> &Arc<ExecutionSession<B, K>> {
        &self.session
    }

    #[must_use]
    pub fn source(&self) -> &str {
        self.editor.source()
    }

    pub fn set_source(&mut self, source: impl Into<String>) {
        self.editor.set_source(source);
    }

    /// Run the editor contents.
    ///
    /// # Errors
    /// See [`ExecutionSession::run`].
    pub async fn run(&self) -> Result<RunOutput, SessionError> {
        self.session.run(self.editor.source()).await
    }

    /// Restore the welcome program and clear output.
    ///
    /// Returns false if output could not be cleared because a run is
    /// in progress; the editor is reset either way.
    pub fn reset(&mut self) -> bool {
        self.editor.reset();
        self.session.clear_output()
    }

    /// Empty the editor and the output.
    pub fn clear(&mut self) -> bool {
        self.editor.clear();
        self.session.clear_output()
    }

    /// The editor contents as a dated `.py` file.
    #[must_use]
    pub fn export(&self) -> SourceExport {
        SourceExport::today(self.editor.source())
    }

    /// Write the export into `dir`.
    ///
    /// # Errors
    /// Returns error if the file cannot be written.
    pub async fn save(&self, dir: &Path) -> std::io::Result<PathBuf> {
        self.export().write_to(dir).await
    }

    /// Saved theme preference.
    ///
    /// # Errors
    /// Returns error if the store fails.
    pub async fn theme(&self) -> Result<Theme, SessionError> {
        Ok(preferences::load_theme(self.session.store()).await?)
    }

    /// Persist a theme preference.
    ///
    /// # Errors
    /// Returns error if the store fails.
    pub async fn set_theme(&self, theme: Theme) -> Result<(), SessionError> {
        preferences::save_theme(self.session.store(), theme).await?;
        tracing::info!(%theme, "Theme changed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pytecode_core::{LibrarySet, editor::DEFAULT_CODE, export::export_file_name};

    use super::*;
    use crate::{storage::MemoryStore, testing::ScriptedBackend};

    async fn playground() -> Playground<ScriptedBackend, MemoryStore> {
        let session = ExecutionSession::new(ScriptedBackend::new(), MemoryStore::new());
        session.initialize(LibrarySet::new()).await.unwrap();
        Playground::new(Arc::new(session))
    }

    #[tokio::test]
    async fn test_run_reset_clear() {
        let mut playground = playground().await;
        assert_eq!(playground.source(), DEFAULT_CODE);

        playground.set_source("print('hello')");
        let output = playground.run().await.unwrap();
        assert_eq!(output.text, vec!["hello"]);

        assert!(playground.reset());
        assert_eq!(playground.source(), DEFAULT_CODE);
        assert!(playground.session().text_output().is_empty());

        playground.set_source("print('again')");
        playground.run().await.unwrap();
        assert!(playground.clear());
        assert!(playground.source().is_empty());
        assert!(playground.session().text_output().is_empty());
    }

    #[tokio::test]
    async fn test_save_writes_dated_file() {
        let mut playground = playground().await;
        playground.set_source("print(42)\n");
        let dir = tempfile::tempdir().unwrap();

        let path = playground.save(dir.path()).await.unwrap();
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        let today = chrono::Local::now().date_naive();
        // Tolerate the test straddling midnight.
        let yesterday = today.pred_opt().unwrap();
        assert!(name == export_file_name(today) || name == export_file_name(yesterday));
        assert_eq!(tokio::fs::read_to_string(&path).await.unwrap(), "print(42)\n");
    }

    #[tokio::test]
    async fn test_theme_persisted() {
        let playground = playground().await;
        assert_eq!(playground.theme().await.unwrap(), Theme::System);
        playground.set_theme(Theme::Light).await.unwrap();
        assert_eq!(playground.theme().await.unwrap(), Theme::Light);
    }
}
