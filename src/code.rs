//! Emission of GLSL statements into the body of a shader.

/// A region of the `main` function body that code can be emitted into.
///
/// The zones are laid out one after another in the final source, so code in
/// [`Output`](Self::Output) can use anything defined in the other two.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CodeZone {
    /// Local definitions made at the start of the function.
    Top,
    /// The bulk of the computations.
    Main,
    /// Assignments to stage outputs.
    Output,
}

/// Builder for indented lines of GLSL code.
///
/// Text is collected in a buffer that is appended to the target string when
/// the builder is dropped, so the target receives the code in one piece.
#[derive(Debug)]
pub struct Code<'a> {
    target: &'a mut String,
    buffer: String,
    indentation: usize,
    line_started: bool,
}

impl<'a> Code<'a> {
    /// Creates a builder that will append its code to the given string, with
    /// every line indented by the given number of tabs.
    pub fn new(target: &'a mut String, indentation: usize) -> Self {
        Self {
            target,
            buffer: String::new(),
            indentation,
            line_started: false,
        }
    }

    /// Appends the given text to the current line. Newlines in the text end
    /// the current line, and every new line is indented.
    pub fn emit(&mut self, text: impl AsRef<str>) -> &mut Self {
        for (idx, segment) in text.as_ref().split('\n').enumerate() {
            if idx > 0 {
                self.end_of_line();
            }
            if !segment.is_empty() {
                self.start_line();
                self.buffer.push_str(segment);
            }
        }
        self
    }

    /// Appends the given text and ends the line.
    pub fn line(&mut self, text: impl AsRef<str>) -> &mut Self {
        self.emit(text).end_of_line()
    }

    /// Ends the current line.
    pub fn end_of_line(&mut self) -> &mut Self {
        self.buffer.push('\n');
        self.line_started = false;
        self
    }

    /// Ends the current line if anything has been emitted on it, then adds
    /// an empty line.
    pub fn blank_line(&mut self) -> &mut Self {
        if self.line_started {
            self.end_of_line();
        }
        self.buffer.push('\n');
        self
    }

    /// Increases the indentation of subsequent lines by one tab.
    pub fn indent(&mut self) -> &mut Self {
        self.indentation += 1;
        self
    }

    /// Decreases the indentation of subsequent lines by one tab.
    pub fn dedent(&mut self) -> &mut Self {
        self.indentation = self.indentation.saturating_sub(1);
        self
    }

    /// Whether nothing has been emitted yet.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    fn start_line(&mut self) {
        if !self.line_started {
            self.buffer
                .extend(std::iter::repeat_n('\t', self.indentation));
            self.line_started = true;
        }
    }
}

impl Drop for Code<'_> {
    fn drop(&mut self) {
        if self.line_started {
            self.end_of_line();
        }
        self.target.push_str(&self.buffer);
    }
}
