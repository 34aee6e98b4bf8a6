use core::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use itertools::Itertools;
use thiserror::Error;

use crate::value::{Symbol, Value};


#[derive(Debug, Clone, PartialEq, Error)]
pub enum TableError {
    #[error("table index is not an integer: {0}")]
    IndexNotInteger(Value),
}

// Hashable identity of a mapping key. Scalars hash by content, tables,
// errors and callables by address. The entry keeps the key value alive, so
// an address can't be reused while it is in the table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum KeyRepr {
    Nil,
    Int(i64),
    Float(u64),
    String(Rc<str>),
    Symbol(Symbol),
    Error(usize),
    Table(usize),
    Callable(usize),
}

impl From<&Value> for KeyRepr {
    fn from(value: &Value) -> Self {
        match value {
            Value::Nil => Self::Nil,
            Value::Int(i) => Self::Int(*i),
            Value::Float(f) => Self::Float(f.to_bits()),
            Value::String(text) => Self::String(text.clone()),
            Value::Symbol(symbol) => Self::Symbol(symbol.clone()),
            Value::Error(error) => Self::Error(Rc::as_ptr(error) as usize),
            Value::Table(table) => Self::Table(Rc::as_ptr(table) as usize),
            Value::Callable(callable) => Self::Callable(callable.address()),
        }
    }
}

#[derive(Debug, Clone)]
struct TableEntry {
    key: Value,
    value: Value,
}

/// A sequence and a mapping at the same time.
///
/// Integer keys `0..sequence_len()` live in a contiguous, hole free vector;
/// every other entry lives in an insertion ordered mapping. Removing an entry
/// from the middle of the sequence truncates it and moves the following
/// entries into the mapping under their original keys. Writing the key right
/// after the sequence pulls back every mapping entry that became contiguous
/// with it.
#[derive(Debug, Clone, Default)]
pub struct Table {
    seq: Vec<Value>,
    kv: IndexMap<KeyRepr, TableEntry>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of `key` if it addresses the sequence or the slot right after it.
    fn sequence_slot(&self, key: i64) -> Option<usize> {
        usize::try_from(key).ok().filter(|&index| index <= self.seq.len())
    }

    /// Returns the value stored under `key`, [Value::Nil] if there is none.
    pub fn get(&self, key: &Value) -> Value {
        if let Value::Int(index) = key {
            if let Some(value) = usize::try_from(*index).ok().and_then(|index| self.seq.get(index)) {
                return value.clone();
            }
        }

        self.kv.get(&KeyRepr::from(key))
            .map(|entry| entry.value.clone())
            .unwrap_or_default()
    }

    pub fn get_int(&self, index: i64) -> Value {
        self.get(&Value::Int(index))
    }

    pub fn has(&self, key: &Value) -> bool {
        match key {
            Value::Int(index) if usize::try_from(*index).is_ok_and(|index| index < self.seq.len()) => true,
            _ => self.kv.contains_key(&KeyRepr::from(key)),
        }
    }

    /// Inserts, updates or, when `value` is nil, deletes the entry for `key`.
    /// Returns the sequence length after the write.
    pub fn set(&mut self, key: Value, value: Value) -> usize {
        if let Value::Int(index) = key {
            if let Some(index) = self.sequence_slot(index) {
                self.sequence_set(index, value);
                return self.seq.len();
            }
        }

        self.mapping_set(key, value);
        self.seq.len()
    }

    // 0 <= index <= self.seq.len()
    fn sequence_set(&mut self, index: usize, value: Value) {
        if value.is_nil() {
            if index < self.seq.len() {
                let trailing = self.seq.split_off(index + 1);
                self.seq.truncate(index);

                for (offset, value) in trailing.into_iter().enumerate() {
                    let key = Value::Int((index + 1 + offset) as i64);
                    self.kv.insert(KeyRepr::from(&key), TableEntry { key, value });
                }
            }
            return;
        }

        if index == self.seq.len() {
            self.seq.push(value);
            self.fill_holes();
            return;
        }

        self.seq[index] = value;
    }

    fn mapping_set(&mut self, key: Value, value: Value) {
        let repr = KeyRepr::from(&key);
        if value.is_nil() {
            self.kv.shift_remove(&repr);
            return;
        }

        match self.kv.get_mut(&repr) {
            Some(entry) => entry.value = value,
            None => { self.kv.insert(repr, TableEntry { key, value }); }
        }
    }

    fn fill_holes(&mut self) {
        while let Some(entry) = self.kv.shift_remove(&KeyRepr::Int(self.seq.len() as i64)) {
            self.seq.push(entry.value);
        }
    }

    /// Adds `value` at the end of the sequence and returns its new length.
    pub fn append(&mut self, value: Value) -> usize {
        self.sequence_set(self.seq.len(), value);
        self.seq.len()
    }

    /// Inserts `values` starting at integer key `start`. Every occupied key of
    /// the contiguous run beginning at the insertion point moves up to make
    /// room, whether the run lives in the sequence or in the mapping. The
    /// n-th value goes to `start + n`; a nil value writes nothing but still
    /// uses up its key. Returns the new sequence length.
    pub fn insert(&mut self, start: &Value, values: impl IntoIterator<Item = Value>) -> Result<usize, TableError> {
        let &Value::Int(start) = start else {
            return Err(TableError::IndexNotInteger(start.clone()));
        };

        let mut key = start;
        for value in values {
            if !value.is_nil() {
                self.insert_one(key, value);
            }
            key = key.saturating_add(1);
        }

        Ok(self.seq.len())
    }

    fn insert_one(&mut self, key: i64, value: Value) {
        // A run starting inside the sequence ends with it, the mapping never
        // holds the key right after the sequence.
        if let Some(index) = self.sequence_slot(key) {
            self.seq.insert(index, value);
            self.fill_holes();
            return;
        }

        let mut end = key;
        while end < i64::MAX && self.has(&Value::Int(end)) {
            end += 1;
        }

        for moved in (key..end).rev() {
            let value = self.get_int(moved);
            self.set(Value::Int(moved + 1), value);
        }
        self.set(Value::Int(key), value);
    }

    /// Number of entries, sequence and mapping together.
    pub fn len(&self) -> usize {
        self.seq.len() + self.kv.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn sequence_len(&self) -> usize {
        self.seq.len()
    }

    pub fn mapping_len(&self) -> usize {
        self.kv.len()
    }

    pub fn sequence(&self) -> &[Value] {
        &self.seq
    }

    pub fn iter_seq(&self) -> impl Iterator<Item = &Value> + '_ {
        self.seq.iter()
    }

    pub fn iter_mapping(&self) -> impl Iterator<Item = (&Value, &Value)> + '_ {
        self.kv.values().map(|entry| (&entry.key, &entry.value))
    }

    /// Sequence entries in index order, then mapping entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (Value, &Value)> + '_ {
        self.seq.iter().enumerate()
            .map(|(index, value)| (Value::Int(index as i64), value))
            .chain(self.iter_mapping().map(|(key, value)| (key.clone(), value)))
    }

    /// Calls `f` with every entry, sequence first, and stores the value it
    /// returns under the same key. Stops after the first call returning `true`.
    pub fn map<F>(&mut self, mut f: F)
    where
        F: FnMut(&Value, &Value) -> (Value, bool),
    {
        let keys = (0..self.seq.len())
            .map(|index| Value::Int(index as i64))
            .chain(self.kv.values().map(|entry| entry.key.clone()))
            .collect_vec();

        for key in keys {
            let current = self.get(&key);
            if current.is_nil() {
                continue;
            }

            let (value, stop) = f(&key, &current);
            self.set(key, value);
            if stop {
                break;
            }
        }
    }
}

impl FromIterator<Value> for Table {
    fn from_iter<T: IntoIterator<Item = Value>>(iter: T) -> Self {
        let mut table = Self::new();
        for value in iter {
            table.append(value);
        }
        table
    }
}

impl PartialEq for Table {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
            && self.kv.len() == other.kv.len()
            && self.kv.iter().all(|(key, entry)| {
                other.kv.get(key).is_some_and(|other| other.value == entry.value)
            })
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.seq.iter()
            .map(|value| value.to_string())
            .chain(self.iter_mapping().map(|(key, value)| format!("{}: {}", key, value)))
            .join(" ");
        write!(f, "({})", entries)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    use super::*;

    fn int(i: i64) -> Value {
        Value::Int(i)
    }

    fn s(text: &str) -> Value {
        Value::string(text)
    }

    #[test]
    fn set_then_get() {
        let mut table = Table::new();
        table.set(s("foo"), s("bar"));
        assert_eq!(table.get(&s("foo")), s("bar"));

        table.set(s("foo"), s("baz"));
        assert_eq!(table.get(&s("foo")), s("baz"));
        assert_eq!(table.mapping_len(), 1);
    }

    #[test]
    fn append_to_empty() {
        let mut table = Table::new();
        assert_eq!(table.append(s("foo")), 1);
        assert_eq!(table.get(&int(0)), s("foo"));
    }

    #[test]
    fn append_after_sequence() {
        let mut table = Table::new();
        table.set(int(0), s("foo"));
        assert_eq!(table.append(s("bar")), 2);
        assert_eq!(table.get(&int(1)), s("bar"));
    }

    #[test]
    fn append_fills_hole() {
        let mut table = Table::new();
        table.set(int(0), s("a"));
        table.set(int(2), s("b"));
        assert_eq!(table.sequence_len(), 1);
        assert_eq!(table.mapping_len(), 1);

        assert_eq!(table.append(s("c")), 3);
        assert_eq!(table.get(&int(1)), s("c"));
        assert_eq!(table.get(&int(2)), s("b"));
        assert_eq!(table.mapping_len(), 0);
    }

    #[test]
    fn hole_fill_cascades() {
        let mut table = Table::new();
        for i in 2..10 {
            table.set(int(i), int(i));
        }
        table.set(int(0), int(0));
        assert_eq!(table.sequence_len(), 1);

        table.set(int(1), int(1));
        assert_eq!(table.sequence_len(), 10);
        assert_eq!(table.mapping_len(), 0);
    }

    #[test]
    fn delete_migrates_trailing_entries() {
        let mut table = Table::new();
        table.set(int(0), s("a"));
        table.set(int(1), s("b"));
        table.set(int(2), s("c"));
        table.set(int(1), Value::Nil);

        assert_eq!(table.sequence_len(), 1);
        assert_eq!(table.get(&int(0)), s("a"));
        assert_eq!(table.get(&int(1)), Value::Nil);
        assert_eq!(table.get(&int(2)), s("c"));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn delete_last_only_shrinks() {
        let mut table: Table = [s("a"), s("b")].into_iter().collect();
        table.set(int(1), Value::Nil);
        assert_eq!(table.sequence_len(), 1);
        assert_eq!(table.mapping_len(), 0);
    }

    #[test]
    fn delete_then_refill_restores_sequence() {
        let mut table: Table = [s("a"), s("b"), s("c"), s("d")].into_iter().collect();
        table.set(int(1), Value::Nil);
        table.set(int(1), s("B"));
        assert_eq!(table.sequence_len(), 4);
        assert_eq!(table.to_string(), r#"("a" "B" "c" "d")"#);
    }

    #[test]
    fn negative_and_non_integer_keys_go_to_mapping() {
        let mut table = Table::new();
        table.set(int(-1), s("neg"));
        table.set(Value::Float(0.0), s("float"));
        assert_eq!(table.sequence_len(), 0);
        assert_eq!(table.get(&int(-1)), s("neg"));
        assert_eq!(table.get(&Value::Float(0.0)), s("float"));
        assert_eq!(table.get(&int(0)), Value::Nil);
    }

    #[test]
    fn insert_inside_sequence_shifts() {
        let mut table: Table = [s("a"), s("c")].into_iter().collect();
        assert_eq!(table.insert(&int(1), [s("b")]), Ok(3));
        assert_eq!(table.to_string(), r#"("a" "b" "c")"#);
    }

    #[test]
    fn insert_several_values() {
        let mut table: Table = [s("a"), s("d")].into_iter().collect();
        assert_eq!(table.insert(&int(1), [s("b"), s("c")]), Ok(4));
        assert_eq!(table.to_string(), r#"("a" "b" "c" "d")"#);
    }

    #[test]
    fn insert_nil_uses_up_its_key() {
        let mut table: Table = [s("a"), s("d")].into_iter().collect();
        assert_eq!(table.insert(&int(1), [s("b"), Value::Nil, s("c")]), Ok(4));
        assert_eq!(table.to_string(), r#"("a" "b" "d" "c")"#);

        let mut table = Table::new();
        table.set(int(10), s("x"));
        assert_eq!(table.insert(&int(10), [Value::Nil, s("y")]), Ok(0));
        assert_eq!(table.get(&int(10)), s("x"));
        assert_eq!(table.get(&int(11)), s("y"));
    }

    #[test]
    fn insert_absorbs_stray_entries() {
        let mut table = Table::new();
        table.set(int(0), s("a"));
        table.set(int(2), s("c"));
        table.set(int(3), s("d"));

        assert_eq!(table.insert(&int(1), [s("b")]), Ok(4));
        assert_eq!(table.mapping_len(), 0);
        assert_eq!(table.get(&int(3)), s("d"));
    }

    #[test]
    fn insert_in_mapping_displaces_run() {
        let mut table = Table::new();
        table.set(int(5), s("five"));
        table.set(int(6), s("six"));
        table.set(int(8), s("eight"));

        table.insert(&int(5), [s("new")]).unwrap();
        assert_eq!(table.get(&int(5)), s("new"));
        assert_eq!(table.get(&int(6)), s("five"));
        assert_eq!(table.get(&int(7)), s("six"));
        assert_eq!(table.get(&int(8)), s("eight"));
    }

    #[test]
    fn insert_before_sequence_shifts_it() {
        let mut table: Table = [s("a"), s("b")].into_iter().collect();
        table.set(int(-1), s("m"));

        table.insert(&int(-1), [s("x")]).unwrap();
        assert_eq!(table.get(&int(-1)), s("x"));
        assert_eq!(table.sequence(), &[s("m"), s("a"), s("b")]);
    }

    #[test]
    fn insert_rejects_non_integer_index() {
        let mut table = Table::new();
        assert_eq!(
            table.insert(&s("x"), [int(1)]),
            Err(TableError::IndexNotInteger(s("x")))
        );
    }

    #[test]
    fn prints_sequence_then_mapping_in_insertion_order() {
        let mut table: Table = [Value::symbol("f"), int(1)].into_iter().collect();
        table.set(Value::symbol("zeta"), int(2));
        table.set(Value::symbol("alpha"), int(3));
        assert_eq!(table.to_string(), "(F 1 ZETA: 2 ALPHA: 3)");

        table.set(Value::symbol("zeta"), Value::Nil);
        table.set(Value::symbol("zeta"), int(4));
        assert_eq!(table.to_string(), "(F 1 ALPHA: 3 ZETA: 4)");
    }

    #[test]
    fn empty_table_prints_as_unit() {
        assert_eq!(Table::new().to_string(), "()");
    }

    #[test]
    fn map_writes_back_and_stops() {
        let mut table: Table = [int(1), int(2), int(3)].into_iter().collect();
        table.map(|_, value| match value {
            Value::Int(2) => (int(20), true),
            Value::Int(i) => (int(i * 10), false),
            other => (other.clone(), false),
        });
        assert_eq!(table.sequence(), &[int(10), int(20), int(3)]);
    }

    #[test]
    fn map_to_nil_migrates() {
        let mut table: Table = [int(1), int(2), int(3)].into_iter().collect();
        table.map(|key, value| if *key == int(1) { (Value::Nil, false) } else { (value.clone(), false) });
        assert_eq!(table.sequence_len(), 1);
        assert_eq!(table.get(&int(2)), int(3));
    }

    #[test]
    fn tables_as_keys_compare_by_identity() {
        let key = Value::table(Table::new());
        let mut table = Table::new();
        table.set(key.clone(), int(1));
        assert_eq!(table.get(&key), int(1));
        assert_eq!(table.get(&Value::table(Table::new())), Value::Nil);
    }

    #[test]
    fn long_sequence() {
        let mut table = Table::new();
        for i in 0..100_000 {
            table.set(int(i), int(i));
        }
        assert_eq!(table.sequence_len(), 100_000);
    }

    fn small_key() -> impl Strategy<Value = i64> {
        -2i64..12
    }

    fn small_value() -> impl Strategy<Value = Value> {
        prop_oneof![
            1 => Just(Value::Nil),
            4 => (0i64..100).prop_map(Value::Int),
        ]
    }

    proptest! {
        #[test]
        fn set_nil_deletes(writes in prop::collection::vec((small_key(), small_value()), 0..40), key in small_key()) {
            let mut table = Table::new();
            for (k, v) in writes {
                table.set(int(k), v);
            }
            table.set(int(key), Value::Nil);
            prop_assert_eq!(table.get(&int(key)), Value::Nil);
        }

        #[test]
        fn sequence_never_has_holes(writes in prop::collection::vec((small_key(), small_value()), 0..40)) {
            let mut table = Table::new();
            for (k, v) in writes {
                table.set(int(k), v);
            }
            prop_assert!(table.sequence().iter().all(|value| !value.is_nil()));
            prop_assert!(!table.has(&int(table.sequence_len() as i64)));
            prop_assert_eq!(table.len(), table.iter().count());
        }

        #[test]
        fn appends_stay_in_sequence(values in prop::collection::vec(1i64..1000, 0..50)) {
            let mut table = Table::new();
            for v in &values {
                table.append(int(*v));
            }
            prop_assert_eq!(table.sequence_len(), values.len());
            prop_assert_eq!(table.mapping_len(), 0);
            for (i, v) in values.iter().enumerate() {
                prop_assert_eq!(table.get(&int(i as i64)), int(*v));
            }
        }

        #[test]
        fn writes_match_a_plain_map(writes in prop::collection::vec((small_key(), small_value()), 0..40)) {
            let mut table = Table::new();
            let mut model = std::collections::BTreeMap::new();
            for (k, v) in writes {
                if v.is_nil() { model.remove(&k); } else { model.insert(k, v.clone()); }
                table.set(int(k), v);
            }
            for k in -2i64..12 {
                prop_assert_eq!(table.get(&int(k)), model.get(&k).cloned().unwrap_or_default());
            }
        }
    }
}
