//! Runtime value types
//!
//! Atomic values are plain data; aggregates (tables, sets, vectors) are shared
//! handles, so a value bound in a frame and the same value stored in a table
//! refer to the same collection.

use chrono::{DateTime, Duration, Utc};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use super::super::errors::{internal_error, RuntimeError};
use super::super::hash::{CompositeHash, HashKey};
use super::ty::{same_type, Type, TypeTag};

/// Runtime value type
#[derive(Debug, Clone)]
pub enum Val {
    Bool(bool),
    Int(i64),
    Count(u64),
    Double(f64),
    /// Raw bytes; script strings need not be valid UTF-8
    Str(Vec<u8>),
    Time(DateTime<Utc>),
    Interval(Duration),
    Table(Rc<RefCell<TableVal>>),
    Vector(Rc<RefCell<VectorVal>>),
}

impl Val {
    pub fn type_tag(&self) -> TypeTag {
        match self {
            Val::Bool(_) => TypeTag::Bool,
            Val::Int(_) => TypeTag::Int,
            Val::Count(_) => TypeTag::Count,
            Val::Double(_) => TypeTag::Double,
            Val::Str(_) => TypeTag::String,
            Val::Time(_) => TypeTag::Time,
            Val::Interval(_) => TypeTag::Interval,
            Val::Table(_) => TypeTag::Table,
            Val::Vector(_) => TypeTag::Vector,
        }
    }

    /// Full dynamic type of the value
    pub fn ty(&self) -> Type {
        match self {
            Val::Bool(_) => Type::Bool,
            Val::Int(_) => Type::Int,
            Val::Count(_) => Type::Count,
            Val::Double(_) => Type::Double,
            Val::Str(_) => Type::String,
            Val::Time(_) => Type::Time,
            Val::Interval(_) => Type::Interval,
            Val::Table(t) => t.borrow().ty().clone(),
            Val::Vector(v) => Type::vector(v.borrow().elem_type().clone()),
        }
    }

    /// Condition test: zero selects the false branch, anything else the true one
    pub fn is_zero(&self) -> bool {
        match self {
            Val::Bool(b) => !*b,
            Val::Int(i) => *i == 0,
            Val::Count(c) => *c == 0,
            Val::Double(d) => *d == 0.0,
            Val::Interval(d) => d.is_zero(),
            Val::Str(_) | Val::Time(_) | Val::Table(_) | Val::Vector(_) => false,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Val::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_count(&self) -> Option<u64> {
        match self {
            Val::Count(c) => Some(*c),
            Val::Int(i) => u64::try_from(*i).ok(),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Val::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&Rc<RefCell<TableVal>>> {
        match self {
            Val::Table(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_vector(&self) -> Option<&Rc<RefCell<VectorVal>>> {
        match self {
            Val::Vector(v) => Some(v),
            _ => None,
        }
    }

    /// Fresh empty aggregate for a table/set/vector type
    pub fn empty_aggregate(ty: &Type) -> Option<Val> {
        match ty {
            Type::Table { .. } => Some(Val::Table(Rc::new(RefCell::new(TableVal::new(
                ty.clone(),
            ))))),
            Type::Vector { elem } => Some(Val::Vector(Rc::new(RefCell::new(VectorVal::new(
                (**elem).clone(),
            ))))),
            _ => None,
        }
    }
}

impl PartialEq for Val {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Val::Bool(a), Val::Bool(b)) => a == b,
            (Val::Int(a), Val::Int(b)) => a == b,
            (Val::Count(a), Val::Count(b)) => a == b,
            (Val::Double(a), Val::Double(b)) => a == b,
            (Val::Str(a), Val::Str(b)) => a == b,
            (Val::Time(a), Val::Time(b)) => a == b,
            (Val::Interval(a), Val::Interval(b)) => a == b,
            (Val::Table(a), Val::Table(b)) => Rc::ptr_eq(a, b),
            (Val::Vector(a), Val::Vector(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<&str> for Val {
    fn from(s: &str) -> Self {
        Val::Str(s.as_bytes().to_vec())
    }
}

impl From<bool> for Val {
    fn from(b: bool) -> Self {
        Val::Bool(b)
    }
}

impl From<u64> for Val {
    fn from(c: u64) -> Self {
        Val::Count(c)
    }
}

impl fmt::Display for Val {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Val::Bool(b) => f.write_str(if *b { "T" } else { "F" }),
            Val::Int(i) => write!(f, "{}", i),
            Val::Count(c) => write!(f, "{}", c),
            Val::Double(d) => write!(f, "{:.6}", d),
            Val::Str(s) => f.write_str(&String::from_utf8_lossy(s)),
            Val::Time(t) => write!(
                f,
                "{}.{:06}",
                t.timestamp(),
                t.timestamp_subsec_micros()
            ),
            Val::Interval(d) => {
                let secs = d.num_milliseconds() as f64 / 1000.0;
                write!(f, "{} secs", secs)
            }
            Val::Table(t) => {
                let t = t.borrow();
                let parts: Vec<String> = t
                    .iter()
                    .map(|(index, value)| {
                        let index: Vec<String> = index.iter().map(|v| v.to_string()).collect();
                        match value {
                            Some(v) => format!("[{}] = {}", index.join(", "), v),
                            None => index.join(", "),
                        }
                    })
                    .collect();
                write!(f, "{{{}}}", parts.join(", "))
            }
            Val::Vector(v) => {
                let v = v.borrow();
                let parts: Vec<String> = v
                    .slots
                    .iter()
                    .map(|s| s.as_ref().map(|v| v.to_string()).unwrap_or_default())
                    .collect();
                write!(f, "[{}]", parts.join(", "))
            }
        }
    }
}

/// Whether `v` may be viewed as a value of type `ty` (type-case matching)
pub fn can_cast_value_to_type(v: &Val, ty: &Type) -> bool {
    match ty {
        Type::Any => true,
        Type::Double => matches!(v, Val::Double(_)),
        _ => same_type(&v.ty(), ty),
    }
}

/// `v` viewed as `ty`, or `None` when [`can_cast_value_to_type`] says no
pub fn cast_value_to_type(v: &Val, ty: &Type) -> Option<Val> {
    can_cast_value_to_type(v, ty).then(|| v.clone())
}

/// Convert a numeric value to the representation a slot of type `ty` stores
pub fn coerce_to(v: Val, ty: &Type) -> Val {
    match (ty, v) {
        (Type::Double, Val::Int(i)) => Val::Double(i as f64),
        (Type::Double, Val::Count(c)) => Val::Double(c as f64),
        (Type::Int, Val::Count(c)) => Val::Int(c as i64),
        (_, v) => v,
    }
}

/* ===================== Tables ===================== */

/// Iteration state handed out by [`TableVal::init_for_iteration`].
///
/// A cookie that is abandoned before the table is exhausted must be handed
/// back through [`TableVal::stop_iteration`].
#[derive(Debug)]
pub struct IterCookie {
    keys: Vec<HashKey>,
    pos: usize,
    live: bool,
}

impl IterCookie {
    pub fn is_live(&self) -> bool {
        self.live
    }
}

/// Table or set value, keyed by the composite hash of its index
#[derive(Debug)]
pub struct TableVal {
    ty: Type,
    hash: CompositeHash,
    entries: BTreeMap<HashKey, Option<Val>>,
    active_iterations: usize,
}

impl TableVal {
    pub fn new(ty: Type) -> Self {
        let index = match ty.index_types() {
            Some(index) => index.to_vec(),
            None => internal_error(&format!("table value created with type {}", ty)),
        };
        Self {
            ty,
            hash: CompositeHash::new(index),
            entries: BTreeMap::new(),
            active_iterations: 0,
        }
    }

    pub fn ty(&self) -> &Type {
        &self.ty
    }

    pub fn is_set(&self) -> bool {
        self.ty.is_set()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Index values are promoted to the declared index types before hashing,
    /// so a `count` finds the same entry in a `set[int]` as the `int` would.
    fn key_for(&self, index: &[Val]) -> Result<HashKey, RuntimeError> {
        let types = self.ty.index_types().unwrap_or_default();
        let index: Vec<Val> = index
            .iter()
            .enumerate()
            .map(|(i, v)| match types.get(i) {
                Some(ty) => coerce_to(v.clone(), ty),
                None => v.clone(),
            })
            .collect();
        self.hash
            .compute_hash_list(&index, true)
            .ok_or_else(|| RuntimeError::TypeMismatch(format!("bad index for {}", self.ty)))
    }

    /// Insert or overwrite an entry. Sets take `None` as the value.
    pub fn assign(&mut self, index: &[Val], value: Option<Val>) -> Result<(), RuntimeError> {
        let key = self.key_for(index)?;
        self.entries.insert(key, value);
        Ok(())
    }

    pub fn contains(&self, index: &[Val]) -> Result<bool, RuntimeError> {
        let key = self.key_for(index)?;
        Ok(self.entries.contains_key(&key))
    }

    /// Value stored under `index`; `Ok(None)` when the entry is absent
    pub fn lookup(&self, index: &[Val]) -> Result<Option<Val>, RuntimeError> {
        let key = self.key_for(index)?;
        Ok(self.entries.get(&key).cloned().flatten())
    }

    /// Remove an entry, returning whether one was present
    pub fn remove(&mut self, index: &[Val]) -> Result<bool, RuntimeError> {
        let key = self.key_for(index)?;
        Ok(self.entries.remove(&key).is_some())
    }

    /// Recover the index values an entry key was built from
    pub fn recover_index(&self, key: &HashKey) -> Vec<Val> {
        match self.hash.recover_vals(key) {
            Some(vals) => vals,
            None => internal_error(&format!("undecodable key in {}", self.ty)),
        }
    }

    /// Snapshot the current keys for iteration. Entries removed before they
    /// are reached are skipped; entries added afterwards are not visited.
    pub fn init_for_iteration(&mut self) -> IterCookie {
        self.active_iterations += 1;
        IterCookie {
            keys: self.entries.keys().cloned().collect(),
            pos: 0,
            live: true,
        }
    }

    /// Next live entry, or `None` once exhausted (which also releases the cookie)
    pub fn next_entry(&mut self, cookie: &mut IterCookie) -> Option<(HashKey, Option<Val>)> {
        if !cookie.live {
            return None;
        }
        while let Some(key) = cookie.keys.get(cookie.pos) {
            cookie.pos += 1;
            if let Some(value) = self.entries.get(key) {
                return Some((key.clone(), value.clone()));
            }
        }
        self.stop_iteration(cookie);
        None
    }

    /// Release an iteration that ends before exhaustion
    pub fn stop_iteration(&mut self, cookie: &mut IterCookie) {
        if cookie.live {
            cookie.live = false;
            cookie.keys.clear();
            self.active_iterations = self.active_iterations.saturating_sub(1);
        }
    }

    /// Number of iteration cookies not yet released
    pub fn active_iterations(&self) -> usize {
        self.active_iterations
    }

    /// Entries in key order as (index, value) pairs
    pub fn iter(&self) -> impl Iterator<Item = (Vec<Val>, Option<Val>)> + '_ {
        self.entries
            .iter()
            .map(|(key, value)| (self.recover_index(key), value.clone()))
    }
}

/* ===================== Vectors ===================== */

/// Vector value; slots may be unpopulated
#[derive(Debug)]
pub struct VectorVal {
    elem_type: Type,
    slots: Vec<Option<Val>>,
}

impl VectorVal {
    pub fn new(elem_type: Type) -> Self {
        Self {
            elem_type,
            slots: Vec::new(),
        }
    }

    pub fn elem_type(&self) -> &Type {
        &self.elem_type
    }

    /// Number of slots, populated or not
    pub fn size(&self) -> usize {
        self.slots.len()
    }

    pub fn lookup(&self, index: usize) -> Option<&Val> {
        self.slots.get(index).and_then(|s| s.as_ref())
    }

    /// Store at `index`, growing the vector with holes as needed
    pub fn assign(&mut self, index: usize, value: Val) {
        if index >= self.slots.len() {
            self.slots.resize(index + 1, None);
        }
        self.slots[index] = Some(value);
    }

    pub fn remove(&mut self, index: usize) -> bool {
        match self.slots.get_mut(index) {
            Some(slot) => slot.take().is_some(),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn string_set() -> TableVal {
        TableVal::new(Type::set(vec![Type::String]))
    }

    #[test]
    fn test_is_zero() {
        assert!(Val::Bool(false).is_zero());
        assert!(Val::Count(0).is_zero());
        assert!(!Val::Int(-3).is_zero());
        assert!(!Val::from("").is_zero());
    }

    #[test]
    fn test_iteration_skips_removed_entries() {
        let mut t = string_set();
        t.assign(&[Val::from("a")], None).unwrap();
        t.assign(&[Val::from("b")], None).unwrap();
        t.assign(&[Val::from("c")], None).unwrap();

        let mut cookie = t.init_for_iteration();
        let (first, _) = t.next_entry(&mut cookie).unwrap();
        assert_eq!(t.recover_index(&first), vec![Val::from("a")]);

        t.remove(&[Val::from("b")]).unwrap();
        let (second, _) = t.next_entry(&mut cookie).unwrap();
        assert_eq!(t.recover_index(&second), vec![Val::from("c")]);

        assert!(t.next_entry(&mut cookie).is_none());
        assert!(!cookie.is_live());
        assert_eq!(t.active_iterations(), 0);
    }

    #[test]
    fn test_stop_iteration_releases_cookie() {
        let mut t = string_set();
        t.assign(&[Val::from("a")], None).unwrap();

        let mut cookie = t.init_for_iteration();
        assert_eq!(t.active_iterations(), 1);
        t.stop_iteration(&mut cookie);
        t.stop_iteration(&mut cookie);
        assert_eq!(t.active_iterations(), 0);
    }

    #[test]
    fn test_cast_value_to_any() {
        assert!(can_cast_value_to_type(&Val::Count(1), &Type::Any));
        assert!(can_cast_value_to_type(&Val::Count(1), &Type::Count));
        assert!(!can_cast_value_to_type(&Val::Count(1), &Type::String));
        assert_eq!(
            cast_value_to_type(&Val::from("x"), &Type::String),
            Some(Val::from("x"))
        );
    }

    #[test]
    fn test_vector_holes() {
        let mut v = VectorVal::new(Type::Count);
        v.assign(4, Val::Count(9));
        assert_eq!(v.size(), 5);
        assert!(v.lookup(2).is_none());
        assert_eq!(v.lookup(4), Some(&Val::Count(9)));
    }

    #[test]
    fn test_wrong_index_type_is_an_error() {
        let mut t = string_set();
        assert!(matches!(
            t.assign(&[Val::Count(1)], None),
            Err(RuntimeError::TypeMismatch(_))
        ));
    }
}
