//! Source buffer behind the editor pane.

/// Program shown on first launch and after a reset.
pub const DEFAULT_CODE: &str = r#"# Welcome to PyteCode!
# Write your Python code here and click Run

def greet(name):
    return f"Hello, {name}! 🐍"

print(greet("PyteCode"))

# Try some calculations
numbers = [1, 2, 3, 4, 5]
squared = [n**2 for n in numbers]
print(f"Squared numbers: {squared}")
"#;

/// Editor contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditorBuffer {
    source: String,
}

impl Default for EditorBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl EditorBuffer {
    /// A buffer holding the welcome program.
    #[must_use]
    pub fn new() -> Self {
        Self {
            source: DEFAULT_CODE.to_string(),
        }
    }

    #[must_use]
    pub fn with_source(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn set_source(&mut self, source: impl Into<String>) {
        self.source = source.into();
    }

    /// Restore the welcome program.
    pub fn reset(&mut self) {
        DEFAULT_CODE.clone_into(&mut self.source);
    }

    pub fn clear(&mut self) {
        self.source.clear();
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.source.trim().is_empty()
    }
}
