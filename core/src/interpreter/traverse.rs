//! Visitor traversal over statements and expressions
//!
//! Traversal is pre-order with a closing post hook per node. A callback steers
//! it through the [`TraversalCode`] it returns from each hook.

use super::expressions::Expr;
use super::statements::Stmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalCode {
    Continue,
    /// Stop the whole traversal
    AbortAll,
    /// Skip the children of the current node, then carry on with its siblings
    AbortStmt,
}

/// Hooks called around every visited node. All default to `Continue`.
pub trait TraversalCallback {
    fn pre_stmt(&mut self, _s: &Stmt) -> TraversalCode {
        TraversalCode::Continue
    }

    fn post_stmt(&mut self, _s: &Stmt) -> TraversalCode {
        TraversalCode::Continue
    }

    fn pre_expr(&mut self, _e: &Expr) -> TraversalCode {
        TraversalCode::Continue
    }

    fn post_expr(&mut self, _e: &Expr) -> TraversalCode {
        TraversalCode::Continue
    }
}

/// After a pre hook or a child: return early on `AbortAll`, and on
/// `AbortStmt` return `Continue` so siblings are still visited
#[macro_export]
macro_rules! handle_tc_stmt_pre {
    ($code:expr) => {
        match $code {
            $crate::interpreter::traverse::TraversalCode::AbortAll => {
                return $crate::interpreter::traverse::TraversalCode::AbortAll
            }
            $crate::interpreter::traverse::TraversalCode::AbortStmt => {
                return $crate::interpreter::traverse::TraversalCode::Continue
            }
            $crate::interpreter::traverse::TraversalCode::Continue => {}
        }
    };
}

/// Result of a node once its post hook ran
#[macro_export]
macro_rules! handle_tc_stmt_post {
    ($code:expr) => {
        match $code {
            $crate::interpreter::traverse::TraversalCode::AbortAll => {
                $crate::interpreter::traverse::TraversalCode::AbortAll
            }
            _ => $crate::interpreter::traverse::TraversalCode::Continue,
        }
    };
}

#[macro_export]
macro_rules! handle_tc_expr_pre {
    ($code:expr) => {
        $crate::handle_tc_stmt_pre!($code)
    };
}

#[macro_export]
macro_rules! handle_tc_expr_post {
    ($code:expr) => {
        $crate::handle_tc_stmt_post!($code)
    };
}
