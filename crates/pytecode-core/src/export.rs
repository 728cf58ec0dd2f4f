//! Saving the editor buffer as a `.py` file.

use std::path::{Path, PathBuf};

use chrono::{Datelike, Local, NaiveDate};

/// File name for an export made on `date`: `pytecode<DD><MM>.py`.
#[must_use]
pub fn export_file_name(date: NaiveDate) -> String {
    format!("pytecode{:02}{:02}.py", date.day(), date.month())
}

/// A downloadable copy of the source buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceExport {
    pub file_name: String,
    pub contents: String,
}

impl SourceExport {
    #[must_use]
    pub fn new(source: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            file_name: export_file_name(date),
            contents: source.into(),
        }
    }

    /// Export named after today's local date.
    #[must_use]
    pub fn today(source: impl Into<String>) -> Self {
        Self::new(source, Local::now().date_naive())
    }

    /// Write the file into `dir`, replacing any file of the same name.
    ///
    /// # Errors
    /// Returns error if the directory cannot be created or written.
    pub async fn write_to(&self, dir: &Path) -> std::io::Result<PathBuf> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(&self.file_name);
        tokio::fs::write(&path, self.contents.as_bytes()).await?;
        tracing::info!(path = %path.display(), "Saved source export");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_is_day_then_month() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        assert_eq!(export_file_name(date), "pytecode0703.py");

        let date = NaiveDate::from_ymd_opt(2024, 12, 25).unwrap();
        assert_eq!(export_file_name(date), "pytecode2512.py");
    }

    #[tokio::test]
    async fn test_write_to_directory() {
        let dir = std::env::temp_dir().join(format!("pytecode-export-{}", std::process::id()));
        let export = SourceExport::new("print('hi')\n", NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());

        let path = export.write_to(&dir).await.unwrap();
        assert_eq!(path.file_name().unwrap(), "pytecode0201.py");
        assert_eq!(tokio::fs::read_to_string(&path).await.unwrap(), "print('hi')\n");

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
