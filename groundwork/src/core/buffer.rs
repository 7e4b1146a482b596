//! In-memory content of a single scaffold file.

/// A file's content as ordered lines.
///
/// `trailing_newline` records whether the original text ended with `\n`, so
/// that a read/modify/write cycle does not change untouched bytes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TextBuffer {
    pub lines: Vec<String>,
    pub trailing_newline: bool,
    pub executable: bool,
}

impl TextBuffer {
    pub fn from_text(text: &str) -> Self {
        if text.is_empty() {
            return Self::default();
        }
        let trailing_newline = text.ends_with('\n');
        let body = text.strip_suffix('\n').unwrap_or(text);
        Self {
            lines: body.split('\n').map(str::to_string).collect(),
            trailing_newline,
            executable: false,
        }
    }

    pub fn to_text(&self) -> String {
        let mut text = self.lines.join("\n");
        if self.trailing_newline && !self.lines.is_empty() {
            text.push('\n');
        }
        text
    }

    /// Replace the whole content with `text`, keeping the executable flag.
    pub fn set_text(&mut self, text: &str) {
        let executable = self.executable;
        *self = Self::from_text(text);
        self.executable = executable;
    }

    pub fn with_executable(mut self, executable: bool) -> Self {
        self.executable = executable;
        self
    }
}

/// Split inserted text into lines, ignoring one trailing newline.
pub fn text_lines(text: &str) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    let body = text.strip_suffix('\n').unwrap_or(text);
    body.split('\n').map(str::to_string).collect()
}
