//! Process-wide schema interning.
//!
//! Collectors accept a dense integer in place of a full schema description
//! once the schema has been announced. [`SchemaRegistry`] maps a schema key
//! (the concatenated name/type pairs of a record) to its assigned id and the
//! canonical on-wire encoding. Ids are assigned as `size + 1` at insert time
//! and are never reused.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::error::ShipError;

static GLOBAL: Lazy<SchemaRegistry> = Lazy::new(SchemaRegistry::default);

/// Thread-safe map from schema key to `(id, canonical encoding)`.
#[derive(Default)]
pub struct SchemaRegistry {
    inner: Mutex<HashMap<String, (u64, String)>>,
}

impl SchemaRegistry {
    /// The process-wide registry shared by every record builder.
    pub fn global() -> &'static SchemaRegistry {
        &GLOBAL
    }

    /// Look up a key, returning the stored id and encoding.
    pub fn get(&self, key: &str) -> Option<(u64, String)> {
        self.inner.lock().get(key).cloned()
    }

    /// Return the id stored under `key`, assigning a fresh one when the key
    /// is new. Registering a key twice with different encodings is a
    /// contract violation.
    pub fn find_or_insert(&self, key: &str, encoding: &str) -> Result<u64, ShipError> {
        if key.is_empty() {
            return Err(ShipError::InvalidArgument(
                "schema key must not be empty".into(),
            ));
        }
        if encoding.is_empty() {
            return Err(ShipError::InvalidArgument(
                "schema encoding must not be empty".into(),
            ));
        }
        let mut inner = self.inner.lock();
        if let Some((id, stored)) = inner.get(key) {
            if stored != encoding {
                return Err(ShipError::SchemaConflict {
                    expected: encoding.to_owned(),
                    actual: stored.clone(),
                });
            }
            return Ok(*id);
        }
        let id = inner.len() as u64 + 1;
        inner.insert(key.to_owned(), (id, encoding.to_owned()));
        Ok(id)
    }

    /// Insert `(id, encoding)` under `key` only when the key is absent.
    pub fn insert(&self, key: &str, id: u64, encoding: &str) -> Result<(), ShipError> {
        if key.is_empty() {
            return Err(ShipError::InvalidArgument(
                "schema key must not be empty".into(),
            ));
        }
        if encoding.is_empty() {
            return Err(ShipError::InvalidArgument(
                "schema encoding must not be empty".into(),
            ));
        }
        let mut inner = self.inner.lock();
        inner
            .entry(key.to_owned())
            .or_insert_with(|| (id, encoding.to_owned()));
        Ok(())
    }

    /// Number of keys registered. Unsorted aliases count separately.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Resolve the schema id and on-wire encoding for an ordered field list
    /// of `(name, type token)` pairs.
    ///
    /// Two records built from the same fields in different orders share one
    /// id, while each keeps its own field order on the wire: the id is
    /// assigned against the name-sorted key, and the caller's unsorted key
    /// is cached as an alias carrying the caller's encoding.
    pub fn resolve(&self, fields: &[(&str, &str)]) -> Result<(u64, String), ShipError> {
        let unsorted_key = compose_key(fields);
        if let Some((id, encoding)) = self.get(&unsorted_key) {
            return Ok((id, encoding));
        }

        let unsorted_encoding = compose_encoding(fields);
        let mut sorted: Vec<(&str, &str)> = fields.to_vec();
        sorted.sort_by(|a, b| a.0.cmp(b.0));
        let sorted_key = compose_key(&sorted);

        if let Some((id, _)) = self.get(&sorted_key) {
            self.insert(&unsorted_key, id, &unsorted_encoding)?;
            return Ok((id, unsorted_encoding));
        }

        let sorted_encoding = compose_encoding(&sorted);
        let id = self.find_or_insert(&sorted_key, &sorted_encoding)?;
        if unsorted_key != sorted_key {
            self.insert(&unsorted_key, id, &unsorted_encoding)?;
        }
        Ok((id, unsorted_encoding))
    }
}

fn compose_key(fields: &[(&str, &str)]) -> String {
    let mut key = String::new();
    for (name, token) in fields {
        key.push_str(name);
        key.push(',');
        key.push_str(token);
        key.push(',');
    }
    key
}

/// Render the `[["name","type"],…]` schema array.
fn compose_encoding(fields: &[(&str, &str)]) -> String {
    let mut out = String::from("[");
    for (i, (name, token)) in fields.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str("[\"");
        out.push_str(name);
        out.push_str("\",\"");
        out.push_str(token);
        out.push_str("\"]");
    }
    out.push(']');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn ids_start_at_one_and_increase() {
        let registry = SchemaRegistry::default();
        let a = registry.find_or_insert("a,FT_BOOL,", "[[\"a\",\"FT_BOOL\"]]").expect("insert a");
        let b = registry.find_or_insert("b,FT_INT32,", "[[\"b\",\"FT_INT32\"]]").expect("insert b");
        assert_eq!(a, 1);
        assert_eq!(b, 2);
    }

    #[rstest]
    fn find_or_insert_returns_existing_id() {
        let registry = SchemaRegistry::default();
        let first = registry.find_or_insert("k,FT_BOOL,", "[[\"k\",\"FT_BOOL\"]]").expect("insert");
        let again = registry.find_or_insert("k,FT_BOOL,", "[[\"k\",\"FT_BOOL\"]]").expect("lookup");
        assert_eq!(first, again);
        assert_eq!(registry.len(), 1);
    }

    #[rstest]
    fn conflicting_encoding_is_rejected() {
        let registry = SchemaRegistry::default();
        registry.find_or_insert("k,FT_BOOL,", "[[\"k\",\"FT_BOOL\"]]").expect("insert");
        let err = registry
            .find_or_insert("k,FT_BOOL,", "[[\"k\",\"FT_INT32\"]]")
            .expect_err("conflicting encoding must fail");
        assert!(matches!(err, ShipError::SchemaConflict { .. }));
    }

    #[rstest]
    fn insert_does_not_replace() {
        let registry = SchemaRegistry::default();
        registry.insert("k", 7, "first").expect("insert");
        registry.insert("k", 9, "second").expect("second insert is a no-op");
        assert_eq!(registry.get("k"), Some((7, "first".to_owned())));
    }

    #[rstest]
    fn empty_key_is_an_argument_error() {
        let registry = SchemaRegistry::default();
        assert!(matches!(
            registry.find_or_insert("", "enc"),
            Err(ShipError::InvalidArgument(_))
        ));
        assert!(matches!(
            registry.insert("", 1, "enc"),
            Err(ShipError::InvalidArgument(_))
        ));
    }

    #[rstest]
    fn permuted_fields_share_an_id_but_keep_their_order() {
        let registry = SchemaRegistry::default();
        let a = registry
            .resolve(&[("int32_data", "FT_INT32"), ("bool", "FT_BOOL")])
            .expect("resolve a");
        let b = registry
            .resolve(&[("bool", "FT_BOOL"), ("int32_data", "FT_INT32")])
            .expect("resolve b");
        assert_eq!(a.0, b.0, "permutations must intern to the same id");
        assert_eq!(a.1, "[[\"int32_data\",\"FT_INT32\"],[\"bool\",\"FT_BOOL\"]]");
        assert_eq!(b.1, "[[\"bool\",\"FT_BOOL\"],[\"int32_data\",\"FT_INT32\"]]");
    }

    #[rstest]
    fn distinct_field_sets_get_distinct_ids() {
        let registry = SchemaRegistry::default();
        let a = registry.resolve(&[("x", "FT_INT64")]).expect("resolve a");
        let b = registry.resolve(&[("y", "FT_INT64")]).expect("resolve b");
        assert_ne!(a.0, b.0);
    }

    #[rstest]
    fn repeated_unsorted_lookups_hit_the_alias() {
        let registry = SchemaRegistry::default();
        let fields = [("b", "FT_BOOL"), ("a", "FT_INT32")];
        let first = registry.resolve(&fields).expect("first resolve");
        let keys_after_first = registry.len();
        let second = registry.resolve(&fields).expect("second resolve");
        assert_eq!(first, second);
        assert_eq!(registry.len(), keys_after_first, "fast path must not add keys");
    }
}
