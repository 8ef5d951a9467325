//! Input AST node types
//!
//! This is the shape a front end hands to the statement builder. It carries
//! names rather than resolved identifiers and no type information beyond what
//! the script declared; [`Builder`](crate::interpreter::builder::Builder)
//! resolves, checks and lowers it into executable statements.

use serde::{Deserialize, Serialize};

use super::ty::Type;

/// Source location span for diagnostics and the debugger line map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Span {
    /// Start line (1-indexed, 0 when unknown)
    pub start_line: usize,
    /// Start column (0-indexed)
    pub start_col: usize,
    /// End line
    pub end_line: usize,
    /// End column
    pub end_col: usize,
}

impl Span {
    pub fn new(start_line: usize, start_col: usize, end_line: usize, end_col: usize) -> Self {
        Self {
            start_line,
            start_col,
            end_line,
            end_col,
        }
    }

    pub fn line(line: usize) -> Self {
        Self::new(line, 0, line, 0)
    }

    /// Create a span that covers both self and other
    pub fn merge(&self, other: &Span) -> Span {
        let (start_line, start_col) = if *self == Span::default() {
            (other.start_line, other.start_col)
        } else if *other == Span::default() {
            (self.start_line, self.start_col)
        } else {
            (self.start_line, self.start_col).min((other.start_line, other.start_col))
        };
        let (end_line, end_col) =
            (self.end_line, self.end_col).max((other.end_line, other.end_col));
        Span {
            start_line,
            start_col,
            end_line,
            end_col,
        }
    }

    /// Whether this span begins lexically after `other` begins
    pub fn starts_after(&self, other: &Span) -> bool {
        (self.start_line, self.start_col) > (other.start_line, other.start_col)
    }
}

/// Helper function for serde to skip serializing default spans
fn is_default_span(span: &Span) -> bool {
    *span == Span::default()
}

/// What kind of body a unit is: decides whether `return` is legal and what it
/// may carry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "t")]
pub enum UnitKind {
    /// Global statements; `return` is illegal
    #[default]
    Toplevel,
    /// A function body. Without a declared yield type the first `return`
    /// with an expression fixes it.
    Function {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        yield_type: Option<Type>,
    },
    Event,
    Hook,
}

/// Literal constant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum Lit {
    Bool { v: bool },
    Int { v: i64 },
    Count { v: u64 },
    Double { v: f64 },
    Str { v: String },
    /// Seconds
    Interval { v: f64 },
    /// Seconds since the epoch
    Time { v: f64 },
}

/// A declared local or constant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalDecl {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: Type,
    /// Present for constants; the identifier is then folded wherever a
    /// constant is required
    #[serde(default, rename = "const", skip_serializing_if = "Option::is_none")]
    pub konst: Option<Lit>,
    #[serde(default, skip_serializing_if = "is_default_span")]
    pub span: Span,
}

/// A script unit: one body plus the locals it declares
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Unit {
    pub name: String,
    #[serde(default)]
    pub kind: UnitKind,
    /// Source file, used for the debugger line map
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default)]
    pub locals: Vec<LocalDecl>,
    pub body: Stmt,
}

/// Loop variable, optionally typed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopVar {
    pub name: String,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub ty: Option<Type>,
    #[serde(default, skip_serializing_if = "is_default_span")]
    pub span: Span,
}

/// `type T` or `type T as name` case label
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeLabel {
    #[serde(rename = "type")]
    pub ty: Type,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binding: Option<String>,
    #[serde(default, skip_serializing_if = "is_default_span")]
    pub span: Span,
}

/// One `case`/`default` arm. Neither `values` nor `types` means `default`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Case {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<Expr>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub types: Option<Vec<TypeLabel>>,
    pub body: Stmt,
    #[serde(default, skip_serializing_if = "is_default_span")]
    pub span: Span,
}

/// `timeout <expr> { body }` clause of a `when`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Timeout {
    pub expr: Expr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Box<Stmt>>,
}

/// Statement AST node
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum Stmt {
    List {
        body: Vec<Stmt>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    /// Handler bodies of one event, all executed regardless of flow
    BodyList {
        body: Vec<Stmt>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Expr {
        expr: Expr,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Print {
        args: Vec<Expr>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Event {
        name: String,
        args: Vec<Expr>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    If {
        test: Expr,
        then_s: Box<Stmt>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        else_s: Option<Box<Stmt>>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    While {
        test: Expr,
        body: Box<Stmt>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    For {
        vars: Vec<LoopVar>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value_var: Option<LoopVar>,
        iterable: Expr,
        body: Box<Stmt>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Switch {
        expr: Expr,
        cases: Vec<Case>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Add {
        target: Expr,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Delete {
        target: Expr,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Next {
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Break {
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Fallthrough {
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Return {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<Expr>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    /// Reset aggregate locals to fresh empty values
    Init {
        names: Vec<String>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Null {
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    When {
        cond: Expr,
        body: Box<Stmt>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout: Option<Timeout>,
        #[serde(default)]
        is_return: bool,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
}

impl Stmt {
    /// Get the span of this statement
    pub fn span(&self) -> Span {
        match self {
            Stmt::List { span, .. }
            | Stmt::BodyList { span, .. }
            | Stmt::Expr { span, .. }
            | Stmt::Print { span, .. }
            | Stmt::Event { span, .. }
            | Stmt::If { span, .. }
            | Stmt::While { span, .. }
            | Stmt::For { span, .. }
            | Stmt::Switch { span, .. }
            | Stmt::Add { span, .. }
            | Stmt::Delete { span, .. }
            | Stmt::Next { span }
            | Stmt::Break { span }
            | Stmt::Fallthrough { span }
            | Stmt::Return { span, .. }
            | Stmt::Init { span, .. }
            | Stmt::Null { span }
            | Stmt::When { span, .. } => *span,
        }
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Negate,
    Positive,
    Not,
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }
}

/// Expression AST node
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum Expr {
    Const {
        value: Lit,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Name {
        name: String,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Assign {
        target: Box<Expr>,
        value: Box<Expr>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Index {
        target: Box<Expr>,
        index: Vec<Expr>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    In {
        elem: Vec<Expr>,
        target: Box<Expr>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Size {
        operand: Box<Expr>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
}

impl Expr {
    /// Get the span of this expression
    pub fn span(&self) -> Span {
        match self {
            Expr::Const { span, .. }
            | Expr::Name { span, .. }
            | Expr::Unary { span, .. }
            | Expr::Binary { span, .. }
            | Expr::Assign { span, .. }
            | Expr::Index { span, .. }
            | Expr::In { span, .. }
            | Expr::Size { span, .. } => *span,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_spans() {
        let a = Span::new(3, 4, 3, 10);
        let b = Span::new(5, 0, 7, 2);
        assert_eq!(a.merge(&b), Span::new(3, 4, 7, 2));
        assert_eq!(Span::default().merge(&b), b);
    }

    #[test]
    fn test_stmt_from_json() {
        let json = r#"{
            "t": "If",
            "test": {"t": "Const", "value": {"t": "Bool", "v": true}},
            "then_s": {"t": "Break"},
            "span": {"start_line": 2, "start_col": 0, "end_line": 2, "end_col": 20}
        }"#;
        let stmt: Stmt = serde_json::from_str(json).unwrap();
        assert_eq!(stmt.span().start_line, 2);
        assert!(matches!(stmt, Stmt::If { else_s: None, .. }));
    }
}
