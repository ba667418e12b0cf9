//! Container Adapter: tables as host containers.
//!
//! [`ContainerView`] is a live handle to a table. It does not copy the table: reads and
//! writes go straight to the runtime, and enumeration walks the table over the stack using
//! the runtime's `next` primitive. For an owned snapshot, convert the table into a
//! [`HostMap`] with [`ContainerView::to_host_map`] or into a `Vec<T>` with
//! [`ContainerView::to_vec`].
//!
//! # Key Components
//!
//! - [`ContainerView`] - Keyed, indexed and raw access plus length
//! - [`Pairs`] - Stack-neutral iterator over key/value pairs
//! - `Vec<T>` conversions - Sequences map to array-shaped tables
//!
//! # Length
//!
//! [`ContainerView::count`] is the runtime's length operator. It is exact for array-shaped
//! tables (keys `1..=n` with no holes). For sparse tables it returns *a* border, an index
//! `n` with `t[n] ~= nil` and `t[n + 1] == nil`, and which border is unspecified.
//!
//! # Example
//!
//! ```rust
//! use luainterop::{container::ContainerView, State};
//!
//! let mut state = State::new();
//! let view = ContainerView::create(&mut state, 0, 2)?;
//! view.set(&mut state, "first", "Hello")?;
//! view.set(&mut state, "second", "World")?;
//!
//! let depth = state.top();
//! let mut seen = Vec::new();
//! for pair in view.iter(&mut state)? {
//!     let (key, value) = pair?;
//!     seen.push(format!("{}={}", key, value));
//! }
//! seen.sort();
//! assert_eq!(seen, ["first=Hello", "second=World"]);
//! assert_eq!(state.top(), depth);
//! # Ok::<(), luainterop::Error>(())
//! ```

mod convert;
mod iter;

pub(crate) use convert::{host_map_to_table, table_to_host_map};
pub use iter::Pairs;

use crate::{
    marshal::{FromStack, HostMap, IntoStack},
    runtime::{State, Table, TableRef, Value, ValueKind},
    Error, Result,
};

/// A live view of a table.
#[derive(Clone, Debug)]
pub struct ContainerView {
    table: TableRef,
}

impl ContainerView {
    /// Wraps an existing table.
    pub fn new(table: TableRef) -> Self {
        ContainerView { table }
    }

    /// Allocates an empty table sized for `narr` sequential and `nrec` keyed entries, pushes
    /// it and returns a view of it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StackOverflow`] if the stack is full.
    pub fn create(state: &mut State, narr: usize, nrec: usize) -> Result<Self> {
        Ok(Self::new(state.new_table(narr, nrec)?))
    }

    /// Pushes a new table sized for `len` sequential entries.
    pub fn new_array(state: &mut State, len: usize) -> Result<Self> {
        Self::create(state, len, 0)
    }

    /// Pushes a new table sized for `len` keyed entries.
    pub fn new_map(state: &mut State, len: usize) -> Result<Self> {
        Self::create(state, 0, len)
    }

    /// Pushes a new array-shaped table holding `values` at indices `1..=len`.
    pub fn from_list<T>(state: &mut State, values: &[T]) -> Result<Self>
    where
        T: IntoStack + Clone,
    {
        let table = TableRef::new(Table::with_capacity(values.len(), 0));
        for (i, value) in values.iter().enumerate() {
            let value = value.clone().into_value(state)?;
            table.borrow_mut().set_int(i as i64 + 1, value);
        }
        state.push_value(Value::Table(table.clone()))?;
        Ok(Self::new(table))
    }

    /// Builds a table from `map`, converting nested maps recursively, and pushes it.
    ///
    /// A table cannot hold nil, so [`HostValue::Nil`](crate::marshal::HostValue::Nil) entries
    /// are left out. For maps without nil values, `to_host_map` gives back an equal map.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StackOverflow`] if the stack is full.
    pub fn from_host_map(state: &mut State, map: &HostMap) -> Result<Self> {
        let table = host_map_to_table(state, map)?;
        state.push_value(Value::Table(table.clone()))?;
        Ok(Self::new(table))
    }

    /// Returns a view of the table at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeMismatch`] with `expected = table` if the value is not a table.
    pub fn from_stack(state: &State, index: i32) -> Result<Self> {
        state.read(index)
    }

    /// Returns a view of the table on top of the stack.
    pub fn from_top(state: &State) -> Result<Self> {
        Self::from_stack(state, -1)
    }

    /// The underlying table handle.
    pub fn table(&self) -> &TableRef {
        &self.table
    }

    fn value(&self) -> Value {
        Value::Table(self.table.clone())
    }

    /// Reads `t[key]`, honoring `__index`.
    pub fn get<K, V>(&self, state: &mut State, key: K) -> Result<V>
    where
        K: IntoStack,
        V: FromStack,
    {
        let key = key.into_value(state)?;
        let value = state.index_value(&self.value(), &key)?;
        V::from_value(value, state)
    }

    /// Assigns `t[key] = value`, honoring `__newindex`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidKey`] for a nil or NaN key.
    pub fn set<K, V>(&self, state: &mut State, key: K, value: V) -> Result<()>
    where
        K: IntoStack,
        V: IntoStack,
    {
        let key = key.into_value(state)?;
        let value = value.into_value(state)?;
        state.newindex_value(&self.value(), key, value)
    }

    /// Reads `t[i]` (1-based), honoring `__index`.
    pub fn get_index<V: FromStack>(&self, state: &mut State, i: i64) -> Result<V> {
        self.get(state, i as f64)
    }

    /// Assigns `t[i] = value` (1-based), honoring `__newindex`.
    pub fn set_index<V: IntoStack>(&self, state: &mut State, i: i64, value: V) -> Result<()> {
        self.set(state, i as f64, value)
    }

    /// Reads `t[key]` without metamethods.
    pub fn raw_get<K, V>(&self, state: &mut State, key: K) -> Result<V>
    where
        K: IntoStack,
        V: FromStack,
    {
        let key = key.into_value(state)?;
        let value = self.table.borrow().get(&key);
        V::from_value(value, state)
    }

    /// Assigns `t[key] = value` without metamethods.
    pub fn raw_set<K, V>(&self, state: &mut State, key: K, value: V) -> Result<()>
    where
        K: IntoStack,
        V: IntoStack,
    {
        let key = key.into_value(state)?;
        let value = value.into_value(state)?;
        let result = self.table.borrow_mut().set(key, value);
        result
    }

    /// The length of the table, honoring `__len`.
    ///
    /// See the [module documentation](self) for sparse tables.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeMismatch`] if a `__len` handler returns a non-number.
    pub fn count(&self, state: &mut State) -> Result<usize> {
        match state.length_of(&self.value())? {
            Value::Number(n) if n >= 0.0 => Ok(n as usize),
            Value::Number(_) => Ok(0),
            other => Err(Error::TypeMismatch {
                expected: ValueKind::Number,
                found: other.kind(),
            }),
        }
    }

    /// Iterates over the pairs of the table.
    ///
    /// The iterator borrows `state`; each pair is pushed and popped within its step so the
    /// stack depth seen between steps is constant.
    pub fn iter<'s>(&self, state: &'s mut State) -> Result<Pairs<'s>> {
        Pairs::new(state, self.value())
    }

    /// Calls `f` once per pair with the key at index `-2` and the value at index `-1`.
    ///
    /// `f` may use the stack freely but must leave it at the depth it found it.
    ///
    /// # Panics
    ///
    /// Panics if `f` returns with a different stack depth than it was called with.
    pub fn walk<F>(&self, state: &mut State, f: F) -> Result<()>
    where
        F: FnMut(&mut State) -> Result<()>,
    {
        iter::walk(state, self.value(), f)
    }

    /// Copies the table into a [`HostMap`], converting nested tables recursively.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeMismatch`] for keys that are not booleans, numbers or strings,
    /// and [`Error::StackOverflow`] when nesting exceeds the configured conversion depth.
    pub fn to_host_map(&self, state: &State) -> Result<HostMap> {
        table_to_host_map(state, &self.table, 1)
    }

    /// Copies the sequence `t[1..=count]` into a vector.
    pub fn to_vec<T: FromStack>(&self, state: &State) -> Result<Vec<T>> {
        Vec::<T>::from_value(self.value(), state)
    }

    /// Replaces the metatable of the table.
    pub fn set_metatable(&self, metatable: Option<&ContainerView>) {
        self.table
            .borrow_mut()
            .set_metatable(metatable.map(|m| m.table.clone()));
    }

    /// Returns the metatable of the table.
    pub fn metatable(&self) -> Option<ContainerView> {
        self.table.borrow().metatable().map(Self::new)
    }

    /// Pushes the table again.
    pub fn push(&self, state: &mut State) -> Result<()> {
        state.push_value(self.value())
    }
}

impl PartialEq for ContainerView {
    fn eq(&self, other: &Self) -> bool {
        self.table.ptr_eq(&other.table)
    }
}

impl IntoStack for ContainerView {
    fn into_value(self, _: &mut State) -> Result<Value> {
        Ok(Value::Table(self.table))
    }
}

impl IntoStack for &ContainerView {
    fn into_value(self, _: &mut State) -> Result<Value> {
        Ok(Value::Table(self.table.clone()))
    }
}

impl FromStack for ContainerView {
    fn from_value(value: Value, _: &State) -> Result<Self> {
        match value {
            Value::Table(table) => Ok(Self::new(table)),
            other => Err(Error::TypeMismatch {
                expected: ValueKind::Table,
                found: other.kind(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        marshal::{HostKey, HostValue},
        runtime::Metamethod,
    };

    #[test]
    fn test_create_pushes_table() {
        let mut state = State::new();
        let view = ContainerView::create(&mut state, 4, 0).unwrap();
        assert_eq!(state.top(), 1);
        assert_eq!(ContainerView::from_top(&state).unwrap(), view);
    }

    #[test]
    fn test_from_stack_rejects_non_tables() {
        let mut state = State::new();
        state.push(1.0).unwrap();
        assert_eq!(
            ContainerView::from_top(&state).unwrap_err(),
            Error::TypeMismatch {
                expected: ValueKind::Table,
                found: ValueKind::Number
            }
        );
    }

    #[test]
    fn test_indexed_access_is_one_based() {
        let mut state = State::new();
        let view = ContainerView::from_list(&mut state, &[10.0, 20.0, 30.0]).unwrap();
        assert_eq!(view.get_index::<f64>(&mut state, 1).unwrap(), 10.0);
        assert_eq!(view.get_index::<Option<f64>>(&mut state, 0).unwrap(), None);
        view.set_index(&mut state, 4, 40.0).unwrap();
        assert_eq!(view.count(&mut state).unwrap(), 4);
        assert_eq!(view.to_vec::<f64>(&state).unwrap(), vec![10.0, 20.0, 30.0, 40.0]);
    }

    #[test]
    fn test_count_honors_len_metamethod() {
        fn fixed(state: &mut State) -> Result<usize> {
            state.push(99.0)?;
            Ok(1)
        }
        let mut state = State::new();
        let view = ContainerView::new_map(&mut state, 0).unwrap();
        let meta = ContainerView::new_map(&mut state, 1).unwrap();
        state.push_native("fixed", fixed).unwrap();
        state.set_field(-2, Metamethod::Len.name()).unwrap();
        view.set_metatable(Some(&meta));
        assert_eq!(view.count(&mut state).unwrap(), 99);
        assert_eq!(state.raw_len(1).unwrap(), 0);
        assert_eq!(view.metatable(), Some(meta));
    }

    #[test]
    fn test_get_honors_index_but_raw_does_not() {
        let mut state = State::new();
        let defaults = ContainerView::new_map(&mut state, 1).unwrap();
        defaults.set(&mut state, "color", "red").unwrap();
        let meta = ContainerView::new_map(&mut state, 1).unwrap();
        meta.set(&mut state, Metamethod::Index.name(), &defaults).unwrap();
        let view = ContainerView::new_map(&mut state, 0).unwrap();
        view.set_metatable(Some(&meta));

        assert_eq!(view.get::<_, String>(&mut state, "color").unwrap(), "red");
        assert_eq!(view.raw_get::<_, Option<String>>(&mut state, "color").unwrap(), None);
        view.raw_set(&mut state, "color", "blue").unwrap();
        assert_eq!(view.get::<_, String>(&mut state, "color").unwrap(), "blue");
    }

    #[test]
    fn test_iteration_is_stack_neutral() {
        let mut state = State::new();
        let view = ContainerView::create(&mut state, 0, 2).unwrap();
        view.set(&mut state, "first", "Hello").unwrap();
        view.set(&mut state, "second", "World").unwrap();

        let before = state.top();
        let mut pairs = Vec::new();
        let mut iter = view.iter(&mut state).unwrap();
        while let Some(pair) = iter.next() {
            pairs.push(pair.unwrap());
        }
        drop(iter);
        assert_eq!(state.top(), before);
        assert_eq!(pairs.len(), 2);
        assert!(pairs.contains(&(Value::string("first"), Value::string("Hello"))));
        assert!(pairs.contains(&(Value::string("second"), Value::string("World"))));
    }

    #[test]
    fn test_abandoned_iteration_restores_stack() {
        let mut state = State::new();
        let view = ContainerView::from_list(&mut state, &[1.0, 2.0, 3.0]).unwrap();
        let before = state.top();
        {
            let mut iter = view.iter(&mut state).unwrap();
            assert!(iter.next().is_some());
        }
        assert_eq!(state.top(), before);
    }

    #[test]
    fn test_walk_exposes_pair_on_stack() {
        let mut state = State::new();
        let view = ContainerView::from_list(&mut state, &["a", "b"]).unwrap();
        let mut seen = Vec::new();
        view.walk(&mut state, |state| {
            seen.push((state.read::<f64>(-2)?, state.read::<String>(-1)?));
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, vec![(1.0, "a".to_string()), (2.0, "b".to_string())]);
        assert_eq!(state.top(), 1);
    }

    #[test]
    fn test_walk_error_restores_stack() {
        let mut state = State::new();
        let view = ContainerView::from_list(&mut state, &[1.0]).unwrap();
        let err = view
            .walk(&mut state, |state| state.read::<String>(-1).map(|_| ()))
            .unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
        assert_eq!(state.top(), 1);
    }

    #[test]
    #[should_panic(expected = "changed the stack depth")]
    fn test_walk_asserts_depth() {
        let mut state = State::new();
        let view = ContainerView::from_list(&mut state, &[1.0]).unwrap();
        let _ = view.walk(&mut state, |state| state.push(1.0));
    }

    #[test]
    fn test_host_map_round_trip() {
        let mut map = HostMap::new();
        map.insert(HostKey::from("name"), HostValue::from("vector"));
        map.insert(HostKey::Number(1.0), HostValue::Number(3.0));
        map.insert(HostKey::Boolean(true), HostValue::Boolean(false));
        let mut nested = HostMap::new();
        nested.insert(HostKey::from("x"), HostValue::Number(1.5));
        map.insert(HostKey::from("nested"), HostValue::Map(nested));

        let mut state = State::new();
        let view = ContainerView::from_host_map(&mut state, &map).unwrap();
        assert_eq!(view.to_host_map(&state).unwrap(), map);
    }

    #[test]
    fn test_nil_entries_are_left_out() {
        let mut map = HostMap::new();
        map.insert(HostKey::from("kept"), HostValue::Number(1.0));
        map.insert(HostKey::from("gone"), HostValue::Nil);

        let mut state = State::new();
        let view = ContainerView::from_host_map(&mut state, &map).unwrap();
        let back = view.to_host_map(&state).unwrap();
        assert_eq!(back.len(), 1);
        assert_eq!(back.get(&HostKey::from("kept")), Some(&HostValue::Number(1.0)));
        assert!(!back.contains_key(&HostKey::from("gone")));
    }
}
