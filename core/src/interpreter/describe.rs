//! Statement descriptions
//!
//! [`Desc`] collects either a readable, indented reconstruction of a
//! statement tree or a compact structural encoding in which each statement is
//! introduced by its numeric tag code and tokens are separated by single
//! spaces. Statements write themselves through the same calls in both modes;
//! the writer decides what spacing and line breaks mean.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DescMode {
    #[default]
    Readable,
    Compact,
}

#[derive(Debug, Default)]
pub struct Desc {
    mode: DescMode,
    buf: String,
    indent: usize,
    at_line_start: bool,
    include_stats: bool,
}

impl Desc {
    pub fn new(mode: DescMode) -> Self {
        Self {
            mode,
            at_line_start: true,
            ..Default::default()
        }
    }

    pub fn readable() -> Self {
        Self::new(DescMode::Readable)
    }

    pub fn compact() -> Self {
        Self::new(DescMode::Compact)
    }

    /// Append `(@<time> #<count>)` access stats after readable statements
    pub fn with_stats(mut self, include: bool) -> Self {
        self.include_stats = include;
        self
    }

    pub fn mode(&self) -> DescMode {
        self.mode
    }

    pub fn is_readable(&self) -> bool {
        self.mode == DescMode::Readable
    }

    pub fn include_stats(&self) -> bool {
        self.include_stats && self.is_readable()
    }

    pub fn add(&mut self, s: &str) {
        match self.mode {
            DescMode::Readable => {
                if self.at_line_start {
                    for _ in 0..self.indent {
                        self.buf.push('\t');
                    }
                    self.at_line_start = false;
                }
            }
            DescMode::Compact => {
                if !self.buf.is_empty() {
                    self.buf.push(' ');
                }
            }
        }
        self.buf.push_str(s);
    }

    /// Append directly after the previous token, dropping a pending space
    pub fn add_tight(&mut self, s: &str) {
        if self.is_readable() && !self.at_line_start {
            let trimmed = self.buf.trim_end_matches(' ').len();
            self.buf.truncate(trimmed);
            self.buf.push_str(s);
        } else {
            self.add(s);
        }
    }

    /// Structural count: tag codes and list lengths. Omitted in readable mode.
    pub fn add_count(&mut self, n: u64) {
        if self.mode == DescMode::Compact {
            self.add(&n.to_string());
        }
    }

    pub fn sp(&mut self) {
        if self.is_readable() && !self.at_line_start {
            self.buf.push(' ');
        }
    }

    /// Line break; consecutive breaks collapse into one
    pub fn nl(&mut self) {
        if self.is_readable() && !self.at_line_start {
            let trimmed = self.buf.trim_end_matches(' ').len();
            self.buf.truncate(trimmed);
            self.buf.push('\n');
            self.at_line_start = true;
        }
    }

    /// Indent one more level and start a new line
    pub fn push_indent(&mut self) {
        self.indent += 1;
        self.nl();
    }

    pub fn pop_indent(&mut self) {
        self.indent = self.indent.saturating_sub(1);
        self.nl();
    }

    pub fn as_str(&self) -> &str {
        &self.buf
    }

    pub fn into_string(self) -> String {
        self.buf
    }
}
