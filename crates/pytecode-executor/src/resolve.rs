//! Executable lookup.

use std::path::{Path, PathBuf};

/// Resolve an executable by name.
///
/// The search order is:
/// 1. Explicit paths (absolute or containing a separator).
/// 2. The current process PATH via `which`.
pub async fn resolve_executable_path(executable: &str) -> Option<PathBuf> {
    let executable = executable.trim();
    if executable.is_empty() {
        return None;
    }

    let path = Path::new(executable);
    if path.components().count() > 1 || path.is_absolute() {
        return path.is_file().then(|| path.to_path_buf());
    }

    let name = executable.to_string();
    tokio::task::spawn_blocking(move || which::which(name).ok())
        .await
        .ok()
        .flatten()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_blank_and_missing() {
        assert!(resolve_executable_path("  ").await.is_none());
        assert!(
            resolve_executable_path("pytecode-definitely-not-installed")
                .await
                .is_none()
        );
        assert!(resolve_executable_path("/no/such/dir/python3").await.is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_finds_sh() {
        let found = resolve_executable_path("sh").await.unwrap();
        assert!(found.is_absolute());
    }
}
