//! Flow signal
//!
//! Every statement sets exactly one of these before returning. `Next` is the
//! identity: sequences keep going as long as children report it.

/// Control transfer requested by an executed statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Flow {
    #[default]
    Next,
    Break,
    Return,
    /// `next` inside a loop body
    Loop,
    Fallthrough,
}

impl Flow {
    pub fn name(self) -> &'static str {
        match self {
            Flow::Next => "next-stmt",
            Flow::Break => "break",
            Flow::Return => "return",
            Flow::Loop => "loop",
            Flow::Fallthrough => "fallthrough",
        }
    }

    /// Break or Return: the enclosing loop or case run stops here
    pub fn stops_loop(self) -> bool {
        matches!(self, Flow::Break | Flow::Return)
    }
}
