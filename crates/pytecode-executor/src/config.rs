//! Interpreter configuration.

use std::{collections::HashMap, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

/// Default interpreter command line. `-u` keeps stdout unbuffered.
pub const DEFAULT_INTERPRETER: &str = "python3 -u";

/// How the backend launches Python.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PythonConfig {
    /// Interpreter command line, split with shell-word rules.
    pub interpreter: String,

    /// Working directory for runs.
    pub working_dir: PathBuf,

    /// Kill a run after this long. `None` lets runs go on forever.
    #[serde(default, with = "opt_secs")]
    pub run_timeout: Option<Duration>,

    /// Extra environment for the interpreter.
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl Default for PythonConfig {
    fn default() -> Self {
        Self {
            interpreter: DEFAULT_INTERPRETER.to_string(),
            working_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            run_timeout: None,
            env: HashMap::new(),
        }
    }
}

impl PythonConfig {
    /// Default config with a working directory.
    #[must_use]
    pub fn new(working_dir: PathBuf) -> Self {
        Self {
            working_dir,
            ..Self::default()
        }
    }

    /// Read overrides from `PYTECODE_PYTHON`, `PYTECODE_WORKDIR` and
    /// `PYTECODE_RUN_TIMEOUT_SECS`.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(interpreter) = var("PYTECODE_PYTHON").filter(|v| !v.trim().is_empty()) {
            config.interpreter = interpreter;
        }
        if let Some(dir) = var("PYTECODE_WORKDIR").filter(|v| !v.trim().is_empty()) {
            config.working_dir = PathBuf::from(dir);
        }
        if let Some(secs) = var("PYTECODE_RUN_TIMEOUT_SECS") {
            match secs.trim().parse::<u64>() {
                Ok(0) => config.run_timeout = None,
                Ok(secs) => config.run_timeout = Some(Duration::from_secs(secs)),
                Err(e) => tracing::warn!("Ignoring PYTECODE_RUN_TIMEOUT_SECS={secs:?}: {e}"),
            }
        }
        config
    }

    /// Set the interpreter command line.
    #[must_use]
    pub fn with_interpreter(mut self, interpreter: impl Into<String>) -> Self {
        self.interpreter = interpreter.into();
        self
    }

    /// Set the run timeout.
    #[must_use]
    pub const fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = Some(timeout);
        self
    }

    /// Add an environment variable.
    pub fn set_env(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.env.insert(key.into(), value.into());
    }
}

mod opt_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&d.as_secs()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("PYTECODE_PYTHON", "/opt/py/bin/python -u"),
            ("PYTECODE_WORKDIR", "/srv/play"),
            ("PYTECODE_RUN_TIMEOUT_SECS", "30"),
        ]
        .into_iter()
        .collect();

        let config = PythonConfig::from_vars(|k| vars.get(k).map(|v| (*v).to_string()));
        assert_eq!(config.interpreter, "/opt/py/bin/python -u");
        assert_eq!(config.working_dir, PathBuf::from("/srv/play"));
        assert_eq!(config.run_timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_bad_timeout_is_ignored() {
        let config = PythonConfig::from_vars(|k| {
            (k == "PYTECODE_RUN_TIMEOUT_SECS").then(|| "soon".to_string())
        });
        assert_eq!(config.run_timeout, None);
        assert_eq!(config.interpreter, DEFAULT_INTERPRETER);
    }

    #[test]
    fn test_deserialize_timeout_secs() {
        let config: PythonConfig = serde_json::from_str(
            r#"{"interpreter":"python3","working_dir":"/tmp","run_timeout":5}"#,
        )
        .unwrap();
        assert_eq!(config.run_timeout, Some(Duration::from_secs(5)));
        assert!(config.env.is_empty());
    }
}
