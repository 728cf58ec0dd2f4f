//! The script that wraps every run.
//!
//! It executes `main.py` from the run directory, writes the traceback of
//! an uncaught exception to `error.txt`, and saves open matplotlib
//! figures as `plot-NNN.png` after a clean run or `sys.exit(0)`.

use std::path::Path;

/// User source file inside the run directory.
pub const SOURCE_FILE: &str = "main.py";
/// Wrapper script file inside the run directory.
pub const RUNNER_FILE: &str = "runner.py";
/// Traceback of an uncaught exception.
pub const ERROR_FILE: &str = "error.txt";
/// Environment variable pointing the runner at its directory.
pub const RUN_DIR_ENV: &str = "PYTECODE_RUN_DIR";

pub const RUNNER_SCRIPT: &str = r#"import os
import sys
import traceback
import warnings

RUN_DIR = os.environ["PYTECODE_RUN_DIR"]

warnings.filterwarnings("ignore", message=".*non-interactive.*")


def save_plots():
    plt = sys.modules.get("matplotlib.pyplot")
    if plt is None:
        return
    for index, num in enumerate(plt.get_fignums()):
        path = os.path.join(RUN_DIR, "plot-%03d.png" % index)
        plt.figure(num).savefig(path, format="png")
    plt.close("all")


def main():
    with open(os.path.join(RUN_DIR, "main.py"), encoding="utf-8") as f:
        source = f.read()
    namespace = {"__name__": "__main__", "__builtins__": __builtins__}
    try:
        exec(compile(source, "<playground>", "exec"), namespace)
    except SystemExit as exc:
        sys.stdout.flush()
        if exc.code not in (None, 0):
            raise
        save_plots()
        return
    except Exception:
        etype, value, tb = sys.exc_info()
        text = "".join(traceback.format_exception(etype, value, tb.tb_next))
        sys.stdout.flush()
        with open(os.path.join(RUN_DIR, "error.txt"), "w", encoding="utf-8") as f:
            f.write(text)
        sys.exit(1)
    sys.stdout.flush()
    save_plots()


main()
"#;

/// Read the traceback left by a failed run, if any.
pub async fn read_error(run_dir: &Path) -> Option<String> {
    let text = tokio::fs::read_to_string(run_dir.join(ERROR_FILE)).await.ok()?;
    let text = text.trim_end();
    (!text.is_empty()).then(|| text.to_string())
}

/// Last line of a traceback, e.g. `ZeroDivisionError: division by zero`.
#[must_use]
pub fn summarize_traceback(traceback: &str) -> &str {
    traceback
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or(traceback)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_is_last_line() {
        let tb = "Traceback (most recent call last):\n  File \"<playground>\", line 1, in <module>\nZeroDivisionError: division by zero\n";
        assert_eq!(summarize_traceback(tb), "ZeroDivisionError: division by zero");
    }

    #[test]
    fn test_runner_uses_shared_names() {
        assert!(RUNNER_SCRIPT.contains(RUN_DIR_ENV));
        assert!(RUNNER_SCRIPT.contains(SOURCE_FILE));
        assert!(RUNNER_SCRIPT.contains(ERROR_FILE));
    }

    #[tokio::test]
    async fn test_read_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_error(dir.path()).await.is_none());

        tokio::fs::write(dir.path().join(ERROR_FILE), "NameError: x\n\n").await.unwrap();
        assert_eq!(read_error(dir.path()).await.as_deref(), Some("NameError: x"));
    }
}
