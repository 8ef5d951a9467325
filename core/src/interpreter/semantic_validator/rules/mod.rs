//! Validation Rules
//!
//! - `unreachable_code.rs` - statements after break/next/fallthrough/return
//! - `unused_variable.rs` - loop variables and case bindings never read

mod unreachable_code;
mod unused_variable;

pub use unreachable_code::UnreachableCodeRule;
pub use unused_variable::UnusedVariableRule;
