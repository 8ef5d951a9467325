//! Type definitions for the interpreter
//!
//! - Input AST nodes as produced by a front end (`ast`)
//! - Static types (`ty`)
//! - Runtime values (`values`)
//! - The flow signal threaded through statement execution (`flow`)

pub mod ast;
pub mod flow;
pub mod ty;
pub mod values;

pub use ast::Span;
pub use flow::Flow;
pub use ty::{Type, TypeTag};
pub use values::{IterCookie, TableVal, Val, VectorVal};
