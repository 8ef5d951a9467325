//! Composite key hashing
//!
//! A [`CompositeHash`] turns a tuple of atomic values into a canonical byte
//! key, laid out according to a fixed list of types. The same scheme backs
//! table indexing and switch case-value matching, so two values that would
//! address the same table slot also select the same case.
//!
//! Keys are reversible: [`CompositeHash::recover_vals`] decodes a key back
//! into the index values, which is how table iteration hands loop variables
//! their values.

use chrono::{DateTime, Duration, Utc};

use super::types::{Type, Val};

/// Canonical encoding of a composite index
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HashKey(Vec<u8>);

impl HashKey {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Key layout for one tuple type
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeHash {
    types: Vec<Type>,
}

impl CompositeHash {
    pub fn new(types: Vec<Type>) -> Self {
        Self { types }
    }

    /// Layout for a single value, as used by switch dispatch
    pub fn singleton(ty: Type) -> Self {
        Self { types: vec![ty] }
    }

    pub fn types(&self) -> &[Type] {
        &self.types
    }

    /// Hash a single value (one-element layouts only)
    pub fn compute_hash(&self, v: &Val, type_check: bool) -> Option<HashKey> {
        self.compute_hash_list(std::slice::from_ref(v), type_check)
    }

    /// Hash a tuple of values. Returns `None` when the arity differs, when a
    /// value is not atomic, or (with `type_check`) when a value's type does
    /// not match the layout.
    pub fn compute_hash_list(&self, vals: &[Val], type_check: bool) -> Option<HashKey> {
        if vals.len() != self.types.len() {
            return None;
        }

        let mut buf = Vec::with_capacity(vals.len() * 9);
        for (v, ty) in vals.iter().zip(&self.types) {
            if type_check && ty.tag() != v.type_tag() {
                return None;
            }
            encode(v, &mut buf)?;
        }
        Some(HashKey(buf))
    }

    /// Decode a key produced by this layout back into its values
    pub fn recover_vals(&self, key: &HashKey) -> Option<Vec<Val>> {
        let mut reader = Reader {
            bytes: key.as_bytes(),
            pos: 0,
        };
        let mut vals = Vec::with_capacity(self.types.len());
        for ty in &self.types {
            vals.push(reader.decode(ty)?);
        }
        if reader.pos != reader.bytes.len() {
            return None;
        }
        Some(vals)
    }
}

fn encode(v: &Val, buf: &mut Vec<u8>) -> Option<()> {
    match v {
        Val::Bool(b) => buf.push(u8::from(*b)),
        Val::Int(i) => buf.extend_from_slice(&i.to_be_bytes()),
        Val::Count(c) => buf.extend_from_slice(&c.to_be_bytes()),
        Val::Double(d) => {
            // 0.0 and -0.0 compare equal and must index the same slot
            let d = if *d == 0.0 { 0.0f64 } else { *d };
            buf.extend_from_slice(&d.to_bits().to_be_bytes());
        }
        Val::Str(s) => {
            let len = u32::try_from(s.len()).ok()?;
            buf.extend_from_slice(&len.to_be_bytes());
            buf.extend_from_slice(s);
        }
        Val::Time(t) => {
            buf.extend_from_slice(&t.timestamp().to_be_bytes());
            buf.extend_from_slice(&t.timestamp_subsec_nanos().to_be_bytes());
        }
        Val::Interval(d) => {
            buf.extend_from_slice(&d.num_seconds().to_be_bytes());
            buf.extend_from_slice(&d.subsec_nanos().to_be_bytes());
        }
        Val::Table(_) | Val::Vector(_) => return None,
    }
    Some(())
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take<const N: usize>(&mut self) -> Option<[u8; N]> {
        let end = self.pos.checked_add(N)?;
        let chunk = self.bytes.get(self.pos..end)?;
        self.pos = end;
        chunk.try_into().ok()
    }

    fn decode(&mut self, ty: &Type) -> Option<Val> {
        let v = match ty {
            Type::Bool => Val::Bool(self.take::<1>()?[0] != 0),
            Type::Int => Val::Int(i64::from_be_bytes(self.take()?)),
            Type::Count => Val::Count(u64::from_be_bytes(self.take()?)),
            Type::Double => Val::Double(f64::from_bits(u64::from_be_bytes(self.take()?))),
            Type::String => {
                let len = u32::from_be_bytes(self.take()?) as usize;
                let end = self.pos.checked_add(len)?;
                let raw = self.bytes.get(self.pos..end)?;
                self.pos = end;
                Val::Str(raw.to_vec())
            }
            Type::Time => {
                let secs = i64::from_be_bytes(self.take()?);
                let nanos = u32::from_be_bytes(self.take()?);
                Val::Time(DateTime::<Utc>::from_timestamp(secs, nanos)?)
            }
            Type::Interval => {
                let secs = i64::from_be_bytes(self.take()?);
                let nanos = i32::from_be_bytes(self.take()?);
                Val::Interval(Duration::seconds(secs) + Duration::nanoseconds(i64::from(nanos)))
            }
            _ => return None,
        };
        Some(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equal_values_hash_equal() {
        let h = CompositeHash::singleton(Type::Count);
        assert_eq!(
            h.compute_hash(&Val::Count(5), true),
            h.compute_hash(&Val::Count(5), true)
        );
        assert_ne!(
            h.compute_hash(&Val::Count(5), true),
            h.compute_hash(&Val::Count(6), true)
        );
    }

    #[test]
    fn test_type_check_rejects_mismatch() {
        let h = CompositeHash::singleton(Type::Count);
        assert!(h.compute_hash(&Val::Int(5), true).is_none());
        assert!(h.compute_hash(&Val::Int(5), false).is_some());
    }

    #[test]
    fn test_composite_key_recovers_index() {
        let h = CompositeHash::new(vec![Type::String, Type::Count, Type::Bool]);
        let index = vec![Val::from("10.0.0.1"), Val::Count(443), Val::Bool(true)];
        let key = h.compute_hash_list(&index, true).unwrap();

        assert_eq!(h.recover_vals(&key), Some(index));
    }

    #[test]
    fn test_negative_zero_shares_a_key() {
        let h = CompositeHash::singleton(Type::Double);
        assert_eq!(
            h.compute_hash(&Val::Double(0.0), true),
            h.compute_hash(&Val::Double(-0.0), true)
        );
    }
}
