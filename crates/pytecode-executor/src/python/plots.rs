//! Collecting plots saved by the runner.

use std::path::Path;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};

const PLOT_PREFIX: &str = "plot-";
const PLOT_SUFFIX: &str = ".png";

fn is_plot_file(name: &str) -> bool {
    name.starts_with(PLOT_PREFIX) && name.ends_with(PLOT_SUFFIX)
}

/// Base64 encoded plots in `run_dir`, in creation order.
///
/// # Errors
/// Returns error if the directory or a plot cannot be read.
pub async fn collect_plots(run_dir: &Path) -> std::io::Result<Vec<String>> {
    let mut names = Vec::new();
    let mut entries = tokio::fs::read_dir(run_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_plot_file(&name) {
            names.push(name);
        }
    }
    // Zero-padded indices sort lexically in creation order.
    names.sort();

    let mut images = Vec::with_capacity(names.len());
    for name in names {
        let data = tokio::fs::read(run_dir.join(&name)).await?;
        images.push(BASE64.encode(data));
    }
    Ok(images)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_collects_in_index_order() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("plot-001.png"), b"second").await.unwrap();
        tokio::fs::write(dir.path().join("plot-000.png"), b"first").await.unwrap();
        tokio::fs::write(dir.path().join("main.py"), b"print(1)").await.unwrap();

        let images = collect_plots(dir.path()).await.unwrap();
        assert_eq!(images, vec![BASE64.encode("first"), BASE64.encode("second")]);
    }

    #[tokio::test]
    async fn test_no_plots() {
        let dir = tempfile::tempdir().unwrap();
        assert!(collect_plots(dir.path()).await.unwrap().is_empty());
    }
}
