//! The runtime's associative container.
//!
//! A [`Table`] has two parts, mirroring the reference runtime:
//!
//! - an **array part** holding the values for keys `1..=n`
//! - a **hash part** holding every other key, in insertion order
//!
//! Integer keys migrate into the array part as soon as they extend it contiguously, so an
//! array-shaped table built by ascending inserts never touches the hash part.
//!
//! # Length
//!
//! [`Table::border`] returns a *border*: an index `n` with `t[n] ~= nil` and `t[n + 1] == nil`
//! (or `0` if `t[1]` is nil). For array-shaped tables the border is unique and equals the
//! element count. For tables with holes any border may be returned; which one is
//! implementation-defined.
//!
//! # Traversal
//!
//! [`Table::next`] walks the array part in index order and then the hash part in insertion
//! order. Assigning `nil` to an existing key during traversal is allowed; inserting new keys
//! during traversal is not, and results in unspecified (but memory-safe) iteration order.
//!
//! Removing a key never shrinks the array part and leaves a dead slot in the hash part, so a
//! key handed out by `next` stays valid for the rest of the traversal. Dead hash slots are
//! reclaimed when a new key is inserted and they outnumber the live ones.

use std::{
    cell::{Ref, RefCell, RefMut},
    collections::HashMap,
    fmt,
    rc::Rc,
};

use crate::{runtime::Value, Error, Result};

/// Hashable identity of a non-string key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum KeyId {
    Boolean(bool),
    Number(u64),
    Object(usize),
}

/// A table: array part, ordered hash part and an optional metatable.
#[derive(Default)]
pub struct Table {
    array: Vec<Value>,
    entries: Vec<(Value, Value)>,
    strings: HashMap<Rc<str>, usize>,
    others: HashMap<KeyId, usize>,
    dead: usize,
    metatable: Option<TableRef>,
}

impl Table {
    /// Creates an empty table with room for `narr` sequential and `nrec` keyed entries.
    pub fn with_capacity(narr: usize, nrec: usize) -> Self {
        Table {
            array: Vec::with_capacity(narr),
            entries: Vec::with_capacity(nrec),
            strings: HashMap::with_capacity(nrec),
            others: HashMap::new(),
            dead: 0,
            metatable: None,
        }
    }

    /// Returns the value stored under `key`, or nil.
    pub fn get(&self, key: &Value) -> Value {
        if let Some(slot) = self.array_slot(key) {
            return self.array[slot].clone();
        }
        match self.entry_slot(key) {
            Some(slot) => self.entries[slot].1.clone(),
            None => Value::Nil,
        }
    }

    /// Returns the value stored under a string key, or nil.
    pub fn get_str(&self, key: &str) -> Value {
        match self.strings.get(key) {
            Some(&slot) => self.entries[slot].1.clone(),
            None => Value::Nil,
        }
    }

    /// Returns the value stored under the 1-based integer key `index`, or nil.
    pub fn get_int(&self, index: i64) -> Value {
        if index >= 1 && (index as usize) <= self.array.len() {
            return self.array[index as usize - 1].clone();
        }
        self.get(&Value::Number(index as f64))
    }

    /// Stores `value` under `key`. Storing nil removes the key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidKey`] if `key` is nil or NaN.
    pub fn set(&mut self, key: Value, value: Value) -> Result<()> {
        match &key {
            Value::Nil => return Err(Error::InvalidKey { reason: "index is nil" }),
            Value::Number(n) if n.is_nan() => {
                return Err(Error::InvalidKey { reason: "index is NaN" })
            }
            _ => {}
        }

        if let Value::Number(n) = key {
            if let Some(index) = as_array_index(n) {
                let len = self.array.len();
                if index <= len {
                    self.array[index - 1] = value;
                    return Ok(());
                }
                if index == len + 1 && !value.is_nil() {
                    self.array.push(value);
                    self.remove_entry(&Value::Number(index as f64));
                    self.migrate_from_hash();
                    return Ok(());
                }
            }
        }

        self.set_entry(key, value);
        Ok(())
    }

    /// Stores `value` under a string key.
    pub fn set_str(&mut self, key: &str, value: Value) {
        match self.strings.get(key) {
            Some(&slot) => self.store(slot, value),
            None if value.is_nil() => {}
            None => {
                self.reclaim_dead_slots();
                let key: Rc<str> = Rc::from(key);
                self.strings.insert(key.clone(), self.entries.len());
                self.entries.push((Value::String(key), value));
            }
        }
    }

    /// Stores `value` under the 1-based integer key `index`.
    pub fn set_int(&mut self, index: i64, value: Value) {
        // integral keys are never NaN, so this cannot fail
        let _ = self.set(Value::Number(index as f64), value);
    }

    /// Returns the length border of this table.
    ///
    /// See the [module documentation](self) for the meaning of a border on tables with holes.
    pub fn border(&self) -> usize {
        let live = self
            .array
            .iter()
            .rposition(|v| !v.is_nil())
            .map_or(0, |slot| slot + 1);
        if live < self.array.len() {
            return live;
        }
        let mut n = live;
        while !self.get(&Value::Number((n + 1) as f64)).is_nil() {
            n += 1;
        }
        n
    }

    /// Returns the key/value pair following `key` in traversal order.
    ///
    /// Pass nil to start a traversal. Returns `None` once every pair has been visited.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidKey`] if `key` is not present in the table.
    pub fn next(&self, key: &Value) -> Result<Option<(Value, Value)>> {
        let mut array_from = 0;
        let mut entries_from = 0;

        if !key.is_nil() {
            if let Some(slot) = self.array_slot(key) {
                array_from = slot + 1;
            } else {
                match self.entry_slot(key) {
                    Some(slot) => {
                        array_from = self.array.len();
                        entries_from = slot + 1;
                    }
                    None => {
                        return Err(Error::InvalidKey {
                            reason: "invalid key to 'next'",
                        })
                    }
                }
            }
        }

        for (slot, value) in self.array.iter().enumerate().skip(array_from) {
            if !value.is_nil() {
                return Ok(Some((Value::Number((slot + 1) as f64), value.clone())));
            }
        }
        for (key, value) in self.entries.iter().skip(entries_from) {
            if !value.is_nil() {
                return Ok(Some((key.clone(), value.clone())));
            }
        }
        Ok(None)
    }

    /// Number of non-nil pairs in both parts.
    pub fn pair_count(&self) -> usize {
        self.array.iter().filter(|v| !v.is_nil()).count()
            + self.entries.iter().filter(|(_, v)| !v.is_nil()).count()
    }

    /// Returns the metatable, if one is set.
    pub fn metatable(&self) -> Option<TableRef> {
        self.metatable.clone()
    }

    /// Replaces the metatable.
    pub fn set_metatable(&mut self, metatable: Option<TableRef>) {
        self.metatable = metatable;
    }

    /// Removes every pair and the metatable, returning the removed values.
    pub(crate) fn take_contents(&mut self) -> Vec<Value> {
        let mut values = std::mem::take(&mut self.array);
        for (key, value) in std::mem::take(&mut self.entries) {
            values.push(key);
            values.push(value);
        }
        self.strings.clear();
        self.others.clear();
        self.dead = 0;
        if let Some(meta) = self.metatable.take() {
            values.push(Value::Table(meta));
        }
        values
    }

    fn array_slot(&self, key: &Value) -> Option<usize> {
        match key {
            Value::Number(n) => {
                as_array_index(*n).filter(|&i| i <= self.array.len()).map(|i| i - 1)
            }
            _ => None,
        }
    }

    fn entry_slot(&self, key: &Value) -> Option<usize> {
        match key {
            Value::String(s) => self.strings.get(&**s).copied(),
            other => key_id(other).and_then(|id| self.others.get(&id).copied()),
        }
    }

    fn set_entry(&mut self, key: Value, value: Value) {
        if let Some(slot) = self.entry_slot(&key) {
            self.store(slot, value);
            return;
        }
        if value.is_nil() {
            return;
        }
        self.reclaim_dead_slots();
        let slot = self.entries.len();
        match &key {
            Value::String(s) => {
                self.strings.insert(s.clone(), slot);
            }
            other => {
                if let Some(id) = key_id(other) {
                    self.others.insert(id, slot);
                }
            }
        }
        self.entries.push((key, value));
    }

    fn remove_entry(&mut self, key: &Value) -> Value {
        match self.entry_slot(key) {
            Some(slot) => {
                let value = std::mem::take(&mut self.entries[slot].1);
                if !value.is_nil() {
                    self.dead += 1;
                }
                value
            }
            None => Value::Nil,
        }
    }

    /// Overwrites the value in hash slot `slot`, keeping the dead-slot count.
    fn store(&mut self, slot: usize, value: Value) {
        let was_dead = self.entries[slot].1.is_nil();
        match (was_dead, value.is_nil()) {
            (false, true) => self.dead += 1,
            (true, false) => self.dead -= 1,
            _ => {}
        }
        self.entries[slot].1 = value;
    }

    /// Drops dead hash slots once they outnumber the live ones and rebuilds the key indexes.
    fn reclaim_dead_slots(&mut self) {
        if self.dead == 0 || self.dead <= self.entries.len() - self.dead {
            return;
        }
        self.entries.retain(|(_, value)| !value.is_nil());
        self.strings.clear();
        self.others.clear();
        for (slot, (key, _)) in self.entries.iter().enumerate() {
            match key {
                Value::String(s) => {
                    self.strings.insert(s.clone(), slot);
                }
                other => {
                    if let Some(id) = key_id(other) {
                        self.others.insert(id, slot);
                    }
                }
            }
        }
        self.dead = 0;
    }

    fn migrate_from_hash(&mut self) {
        loop {
            let next = Value::Number((self.array.len() + 1) as f64);
            let value = self.remove_entry(&next);
            if value.is_nil() {
                break;
            }
            self.array.push(value);
        }
    }
}

fn as_array_index(n: f64) -> Option<usize> {
    if n >= 1.0 && n.fract() == 0.0 && n <= usize::MAX as f64 {
        Some(n as usize)
    } else {
        None
    }
}

fn key_id(key: &Value) -> Option<KeyId> {
    match key {
        Value::Nil | Value::String(_) => None,
        Value::Boolean(b) => Some(KeyId::Boolean(*b)),
        // -0.0 and 0.0 are the same key
        Value::Number(n) => Some(KeyId::Number((*n + 0.0).to_bits())),
        other => Some(KeyId::Object(other.address())),
    }
}

/// A shared handle to a [`Table`].
///
/// Cloning the handle never copies the table. Borrowing follows `RefCell` rules; the
/// runtime never holds a borrow across a call into native code.
#[derive(Clone, Default)]
pub struct TableRef(Rc<RefCell<Table>>);

impl TableRef {
    /// Wraps a table into a new shared handle.
    pub fn new(table: Table) -> Self {
        TableRef(Rc::new(RefCell::new(table)))
    }

    /// Immutably borrows the table.
    pub fn borrow(&self) -> Ref<'_, Table> {
        self.0.borrow()
    }

    /// Mutably borrows the table.
    pub fn borrow_mut(&self) -> RefMut<'_, Table> {
        self.0.borrow_mut()
    }

    /// Returns `true` if both handles refer to the same table.
    pub fn ptr_eq(&self, other: &TableRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn address(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }

    pub(crate) fn try_take_contents(&self) -> Vec<Value> {
        match self.0.try_borrow_mut() {
            Ok(mut table) => table.take_contents(),
            Err(_) => Vec::new(),
        }
    }
}

impl fmt::Debug for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "table: {:#x}", self.address())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &str) -> Value {
        Value::string(v)
    }

    #[test]
    fn test_array_part_grows_contiguously() {
        let mut t = Table::default();
        for i in 1..=4 {
            t.set_int(i, Value::Number(i as f64 * 10.0));
        }
        assert_eq!(t.border(), 4);
        assert_eq!(t.get_int(3), Value::Number(30.0));
        assert!(t.entries.is_empty());
    }

    #[test]
    fn test_out_of_order_keys_migrate() {
        let mut t = Table::default();
        t.set_int(3, s("c"));
        t.set_int(2, s("b"));
        assert_eq!(t.border(), 0);
        t.set_int(1, s("a"));
        assert_eq!(t.border(), 3);
        assert_eq!(t.array.len(), 3);
        assert_eq!(t.get_int(2), s("b"));
    }

    #[test]
    fn test_trailing_nil_shrinks_border() {
        let mut t = Table::default();
        for i in 1..=3 {
            t.set_int(i, Value::Boolean(true));
        }
        t.set_int(3, Value::Nil);
        assert_eq!(t.border(), 2);
        t.set_int(1, Value::Nil);
        // a hole at 1 keeps 2 as a valid border
        assert_eq!(t.border(), 2);
    }

    #[test]
    fn test_invalid_keys() {
        let mut t = Table::default();
        assert!(matches!(
            t.set(Value::Nil, Value::Boolean(true)),
            Err(Error::InvalidKey { .. })
        ));
        assert!(matches!(
            t.set(Value::Number(f64::NAN), Value::Boolean(true)),
            Err(Error::InvalidKey { .. })
        ));
    }

    #[test]
    fn test_string_and_numeric_keys_are_distinct() {
        let mut t = Table::default();
        t.set_str("1", s("string"));
        t.set_int(1, s("number"));
        assert_eq!(t.get_str("1"), s("string"));
        assert_eq!(t.get_int(1), s("number"));
        assert_eq!(t.pair_count(), 2);
    }

    #[test]
    fn test_negative_zero_key() {
        let mut t = Table::default();
        t.set(Value::Number(-0.0), s("zero")).unwrap();
        assert_eq!(t.get(&Value::Number(0.0)), s("zero"));
    }

    #[test]
    fn test_next_visits_all_pairs() {
        let mut t = Table::default();
        t.set_int(1, s("a"));
        t.set_int(2, s("b"));
        t.set_str("first", s("Hello"));
        t.set_str("second", s("World"));

        let mut key = Value::Nil;
        let mut seen = Vec::new();
        while let Some((k, v)) = t.next(&key).unwrap() {
            seen.push((k.clone(), v));
            key = k;
        }
        assert_eq!(seen.len(), 4);
        assert_eq!(seen[0], (Value::Number(1.0), s("a")));
        assert_eq!(seen[3], (s("second"), s("World")));
    }

    #[test]
    fn test_next_skips_removed_entries() {
        let mut t = Table::default();
        t.set_str("a", Value::Number(1.0));
        t.set_str("b", Value::Number(2.0));
        t.set_str("c", Value::Number(3.0));

        let (first, _) = t.next(&Value::Nil).unwrap().unwrap();
        t.set(s("b"), Value::Nil).unwrap();
        let (second, _) = t.next(&first).unwrap().unwrap();
        assert_eq!(second, s("c"));
        assert!(t.next(&second).unwrap().is_none());
    }

    #[test]
    fn test_next_survives_clearing_every_pair() {
        let mut t = Table::default();
        for i in 1..=3 {
            t.set_int(i, Value::Number(i as f64));
        }
        t.set_str("k", s("v"));

        let mut key = Value::Nil;
        let mut visited = 0;
        while let Some((k, _)) = t.next(&key).unwrap() {
            t.set(k.clone(), Value::Nil).unwrap();
            visited += 1;
            key = k;
        }
        assert_eq!(visited, 4);
        assert_eq!(t.pair_count(), 0);
        assert_eq!(t.border(), 0);
    }

    #[test]
    fn test_array_slots_reused_after_removal() {
        let mut t = Table::default();
        t.set_int(1, s("a"));
        t.set_int(2, s("b"));
        t.set_int(2, Value::Nil);
        assert_eq!(t.border(), 1);
        t.set_int(2, s("c"));
        t.set_int(3, s("d"));
        assert_eq!(t.border(), 3);
        assert!(t.entries.is_empty());
    }

    #[test]
    fn test_dead_hash_slots_are_reclaimed() {
        let mut t = Table::default();
        t.set_str("keep", s("x"));
        for i in 0..1000 {
            let key = format!("k{}", i);
            t.set_str(&key, Value::Boolean(true));
            t.set_str(&key, Value::Nil);
        }
        assert!(t.entries.len() <= 4);
        assert_eq!(t.pair_count(), 1);
        assert_eq!(t.get_str("keep"), s("x"));

        t.set(Value::Boolean(true), s("y")).unwrap();
        assert_eq!(t.get(&Value::Boolean(true)), s("y"));
        let (first, _) = t.next(&Value::Nil).unwrap().unwrap();
        assert_eq!(first, s("keep"));
    }

    #[test]
    fn test_revived_key_keeps_its_slot() {
        let mut t = Table::default();
        t.set_str("a", s("1"));
        t.set_str("b", s("2"));
        t.set_str("a", Value::Nil);
        t.set_str("a", s("3"));
        let (first, value) = t.next(&Value::Nil).unwrap().unwrap();
        assert_eq!((first, value), (s("a"), s("3")));
        assert_eq!(t.dead, 0);
    }

    #[test]
    fn test_table_ref_debug_shows_address() {
        let t = TableRef::default();
        assert_eq!(format!("{:?}", t), format!("table: {:#x}", t.address()));
    }

    #[test]
    fn test_next_unknown_key() {
        let t = Table::default();
        assert!(matches!(
            t.next(&s("missing")),
            Err(Error::InvalidKey { .. })
        ));
    }

    #[test]
    fn test_take_contents_clears() {
        let mut t = Table::default();
        t.set_int(1, s("a"));
        t.set_str("k", s("v"));
        t.set_metatable(Some(TableRef::default()));
        let removed = t.take_contents();
        assert_eq!(removed.len(), 4);
        assert_eq!(t.pair_count(), 0);
        assert!(t.metatable().is_none());
    }
}
