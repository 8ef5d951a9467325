//! Static types
//!
//! Types are attached to every expression and identifier at construction time.
//! They drive the construction-time checks (conditions must be boolean, loop
//! variables must match the index types, case labels must match the switch)
//! and the composite key layout used for table indexing and case dispatch.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Discriminant of a [`Type`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Void,
    Bool,
    Int,
    Count,
    Double,
    String,
    Time,
    Interval,
    Any,
    Table,
    Vector,
    Error,
}

impl TypeTag {
    pub fn name(self) -> &'static str {
        match self {
            TypeTag::Void => "void",
            TypeTag::Bool => "bool",
            TypeTag::Int => "int",
            TypeTag::Count => "count",
            TypeTag::Double => "double",
            TypeTag::String => "string",
            TypeTag::Time => "time",
            TypeTag::Interval => "interval",
            TypeTag::Any => "any",
            TypeTag::Table => "table",
            TypeTag::Vector => "vector",
            TypeTag::Error => "error",
        }
    }
}

/// Script-level type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum Type {
    Void,
    Bool,
    Int,
    Count,
    Double,
    String,
    Time,
    Interval,
    Any,
    /// A table when `yield_type` is present, a set otherwise
    Table {
        index: Vec<Type>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        yield_type: Option<Box<Type>>,
    },
    Vector {
        elem: Box<Type>,
    },
    /// Produced by an expression that failed to construct; matches anything so
    /// one mistake does not cascade into a page of diagnostics.
    Error,
}

impl Type {
    pub fn table(index: Vec<Type>, yield_type: Type) -> Self {
        Type::Table {
            index,
            yield_type: Some(Box::new(yield_type)),
        }
    }

    pub fn set(index: Vec<Type>) -> Self {
        Type::Table {
            index,
            yield_type: None,
        }
    }

    pub fn vector(elem: Type) -> Self {
        Type::Vector {
            elem: Box::new(elem),
        }
    }

    pub fn tag(&self) -> TypeTag {
        match self {
            Type::Void => TypeTag::Void,
            Type::Bool => TypeTag::Bool,
            Type::Int => TypeTag::Int,
            Type::Count => TypeTag::Count,
            Type::Double => TypeTag::Double,
            Type::String => TypeTag::String,
            Type::Time => TypeTag::Time,
            Type::Interval => TypeTag::Interval,
            Type::Any => TypeTag::Any,
            Type::Table { .. } => TypeTag::Table,
            Type::Vector { .. } => TypeTag::Vector,
            Type::Error => TypeTag::Error,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Type::Error)
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, Type::Bool)
    }

    pub fn is_integral(&self) -> bool {
        matches!(self, Type::Int | Type::Count)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Int | Type::Count | Type::Double)
    }

    pub fn is_table(&self) -> bool {
        matches!(self, Type::Table { .. })
    }

    pub fn is_set(&self) -> bool {
        matches!(
            self,
            Type::Table {
                yield_type: None,
                ..
            }
        )
    }

    /// Atomic types can be hashed into a composite key on their own
    pub fn is_atomic(&self) -> bool {
        matches!(
            self,
            Type::Bool
                | Type::Int
                | Type::Count
                | Type::Double
                | Type::String
                | Type::Time
                | Type::Interval
        )
    }

    pub fn index_types(&self) -> Option<&[Type]> {
        match self {
            Type::Table { index, .. } => Some(index),
            _ => None,
        }
    }

    pub fn yield_type(&self) -> Option<&Type> {
        match self {
            Type::Table { yield_type, .. } => yield_type.as_deref(),
            Type::Vector { elem } => Some(elem),
            _ => None,
        }
    }
}

/// Structural type equality. The error type matches everything.
pub fn same_type(a: &Type, b: &Type) -> bool {
    match (a, b) {
        (Type::Error, _) | (_, Type::Error) => true,
        (
            Type::Table {
                index: ia,
                yield_type: ya,
            },
            Type::Table {
                index: ib,
                yield_type: yb,
            },
        ) => {
            ia.len() == ib.len()
                && ia.iter().zip(ib).all(|(x, y)| same_type(x, y))
                && match (ya, yb) {
                    (Some(x), Some(y)) => same_type(x, y),
                    (None, None) => true,
                    _ => false,
                }
        }
        (Type::Vector { elem: ea }, Type::Vector { elem: eb }) => same_type(ea, eb),
        _ => a.tag() == b.tag(),
    }
}

/// Whether a value of static type `from` may be cast to `to` at run time.
///
/// Values of type `any` may hold anything, so the final answer for them is
/// only known once the value exists.
pub fn can_cast_type(from: &Type, to: &Type) -> bool {
    matches!(from, Type::Any) || matches!(to, Type::Any) || same_type(from, to)
}

/// Arithmetic result type of two numeric operands
pub fn promote_numeric(a: &Type, b: &Type) -> Option<Type> {
    match (a, b) {
        (Type::Count, Type::Count) => Some(Type::Count),
        (Type::Double, t) | (t, Type::Double) if t.is_numeric() => Some(Type::Double),
        (x, y) if x.is_integral() && y.is_integral() => Some(Type::Int),
        _ => None,
    }
}

/// Whether a value of type `from` may be stored into a slot of type `to`
pub fn can_assign(from: &Type, to: &Type) -> bool {
    if same_type(from, to) || matches!(to, Type::Any) {
        return true;
    }
    match to {
        Type::Double => from.is_numeric(),
        Type::Int => from.is_integral(),
        _ => false,
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Table { index, yield_type } => {
                let names: Vec<String> = index.iter().map(|t| t.to_string()).collect();
                match yield_type {
                    Some(y) => write!(f, "table[{}] of {}", names.join(", "), y),
                    None => write!(f, "set[{}]", names.join(", ")),
                }
            }
            Type::Vector { elem } => write!(f, "vector of {}", elem),
            other => f.write_str(other.tag().name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_type_is_structural() {
        let a = Type::table(vec![Type::Count, Type::String], Type::Bool);
        let b = Type::table(vec![Type::Count, Type::String], Type::Bool);
        let c = Type::set(vec![Type::Count, Type::String]);

        assert!(same_type(&a, &b));
        assert!(!same_type(&a, &c));
        assert!(same_type(&a, &Type::Error));
    }

    #[test]
    fn test_numeric_promotion() {
        assert_eq!(promote_numeric(&Type::Count, &Type::Count), Some(Type::Count));
        assert_eq!(promote_numeric(&Type::Count, &Type::Int), Some(Type::Int));
        assert_eq!(promote_numeric(&Type::Int, &Type::Double), Some(Type::Double));
        assert_eq!(promote_numeric(&Type::String, &Type::Int), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(
            Type::table(vec![Type::Count], Type::String).to_string(),
            "table[count] of string"
        );
        assert_eq!(Type::set(vec![Type::String]).to_string(), "set[string]");
        assert_eq!(Type::vector(Type::Count).to_string(), "vector of count");
    }

    #[test]
    fn test_type_from_json() {
        let ty: Type =
            serde_json::from_str(r#"{"t": "Table", "index": [{"t": "Count"}]}"#).unwrap();
        assert!(ty.is_set());
        assert_eq!(ty.index_types(), Some(&[Type::Count][..]));
    }
}
