//! Interpreter command building.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::resolve::resolve_executable_path;

/// Command build error.
#[derive(Debug, Error)]
pub enum CommandBuildError {
    #[error("Interpreter command cannot be parsed: {0}")]
    InvalidBase(String),
    #[error("Interpreter command is empty after parsing")]
    EmptyCommand,
    #[error("Executable not found: {0}")]
    NotFound(String),
}

/// Parsed command parts (program + args).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandParts {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandParts {
    /// Create new command parts.
    #[must_use]
    pub const fn new(program: String, args: Vec<String>) -> Self {
        Self { program, args }
    }

    /// Resolve the program to an absolute path.
    ///
    /// # Errors
    /// Returns error if executable not found.
    pub async fn into_resolved(self) -> Result<(PathBuf, Vec<String>), CommandBuildError> {
        let Self { program, args } = self;
        let executable = resolve_executable_path(&program)
            .await
            .ok_or(CommandBuildError::NotFound(program))?;
        Ok((executable, args))
    }
}

/// Builder for interpreter invocations.
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    /// Interpreter command line, e.g. `python3 -u`.
    pub base: String,
}

impl CommandBuilder {
    /// Create a new command builder.
    #[must_use]
    pub fn new<S: Into<String>>(base: S) -> Self {
        Self { base: base.into() }
    }

    /// Just the interpreter and its flags.
    ///
    /// # Errors
    /// Returns error if command is invalid.
    pub fn build_interpreter(&self) -> Result<CommandParts, CommandBuildError> {
        self.build(&[])
    }

    /// Invocation running a script file.
    ///
    /// # Errors
    /// Returns error if command is invalid.
    pub fn build_script(&self, script: &Path) -> Result<CommandParts, CommandBuildError> {
        self.build(&[script.to_string_lossy().into_owned()])
    }

    /// Invocation evaluating an inline snippet with `-c`.
    ///
    /// # Errors
    /// Returns error if command is invalid.
    pub fn build_inline(&self, code: &str) -> Result<CommandParts, CommandBuildError> {
        self.build(&["-c".to_string(), code.to_string()])
    }

    fn build(&self, additional_args: &[String]) -> Result<CommandParts, CommandBuildError> {
        let mut parts = split_command_line(&self.base)?;
        parts.extend(additional_args.iter().cloned());

        if parts.is_empty() {
            return Err(CommandBuildError::EmptyCommand);
        }

        let program = parts.remove(0);
        Ok(CommandParts::new(program, parts))
    }
}

fn split_command_line(input: &str) -> Result<Vec<String>, CommandBuildError> {
    #[cfg(windows)]
    {
        let parts = winsplit::split(input);
        if parts.is_empty() {
            Err(CommandBuildError::EmptyCommand)
        } else {
            Ok(parts)
        }
    }

    #[cfg(not(windows))]
    {
        shlex::split(input).ok_or_else(|| CommandBuildError::InvalidBase(input.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_invocation() {
        let parts = CommandBuilder::new("python3 -u")
            .build_script(Path::new("/tmp/run/runner.py"))
            .unwrap();
        assert_eq!(parts.program, "python3");
        assert_eq!(parts.args, vec!["-u", "/tmp/run/runner.py"]);
    }

    #[test]
    fn test_quoted_base_and_inline_code() {
        let parts = CommandBuilder::new("'/opt/my python/bin/python3' -X utf8")
            .build_inline("import numpy")
            .unwrap();
        assert_eq!(parts.program, "/opt/my python/bin/python3");
        assert_eq!(parts.args, vec!["-X", "utf8", "-c", "import numpy"]);
    }

    #[cfg(not(windows))]
    #[test]
    fn test_invalid_and_empty_base() {
        assert!(matches!(
            CommandBuilder::new("python3 'unterminated").build_interpreter(),
            Err(CommandBuildError::InvalidBase(_))
        ));
        assert!(matches!(
            CommandBuilder::new("   ").build_interpreter(),
            Err(CommandBuildError::EmptyCommand)
        ));
    }
}
