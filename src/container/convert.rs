//! Deep conversion between tables and host collections.

use crate::{
    marshal::{FromStack, HostKey, HostMap, HostValue, IntoStack},
    runtime::{State, Table, TableRef, Value, ValueKind},
    Error, Result,
};

/// Copies `table` into a [`HostMap`], recursing into nested tables.
///
/// `depth` is the nesting level of `table` itself (1 for the outermost table); conversion
/// fails once it exceeds the state's `max_conversion_depth`, which also stops self-referencing
/// tables.
pub(crate) fn table_to_host_map(state: &State, table: &TableRef, depth: usize) -> Result<HostMap> {
    if depth > state.config().max_conversion_depth {
        return Err(Error::StackOverflow);
    }

    let mut map = HostMap::new();
    let mut key = Value::Nil;
    loop {
        let entry = table.borrow().next(&key)?;
        let Some((k, v)) = entry else {
            break;
        };
        let host_key = HostKey::from_value(&k)?;
        let host_value = HostValue::from_runtime(v, state, depth)?;
        map.insert(host_key, host_value);
        key = k;
    }
    Ok(map)
}

/// Builds a new table from `map`, converting nested maps into nested tables.
///
/// Nil values are skipped, matching how assigning nil removes a key.
pub(crate) fn host_map_to_table(state: &mut State, map: &HostMap) -> Result<TableRef> {
    let sequential = (1..=map.len())
        .take_while(|i| map.contains_key(&HostKey::Number(*i as f64)))
        .count();
    let table = TableRef::new(Table::with_capacity(sequential, map.len() - sequential));
    for (key, value) in map {
        if matches!(value, HostValue::Nil) {
            continue;
        }
        let value = value.clone().into_value(state)?;
        let result = table.borrow_mut().set(key.to_value(), value);
        result?;
    }
    Ok(table)
}

impl<T: IntoStack> IntoStack for Vec<T> {
    fn into_value(self, state: &mut State) -> Result<Value> {
        let table = TableRef::new(Table::with_capacity(self.len(), 0));
        for (i, element) in self.into_iter().enumerate() {
            let value = element.into_value(state)?;
            table.borrow_mut().set_int(i as i64 + 1, value);
        }
        Ok(Value::Table(table))
    }
}

impl<T: FromStack> FromStack for Vec<T> {
    fn from_value(value: Value, state: &State) -> Result<Self> {
        let table = match value {
            Value::Table(t) => t,
            other => {
                return Err(Error::TypeMismatch {
                    expected: ValueKind::Table,
                    found: other.kind(),
                })
            }
        };
        let len = table.borrow().border();
        let mut elements = Vec::with_capacity(len);
        for i in 1..=len {
            let element = table.borrow().get_int(i as i64);
            elements.push(T::from_value(element, state)?);
        }
        Ok(elements)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InteropConfig;

    #[test]
    fn test_vec_round_trip() {
        let mut state = State::new();
        state.push(vec![1.0, 2.0, 3.0]).unwrap();
        assert_eq!(state.raw_len(-1).unwrap(), 3);
        let back: Vec<f64> = state.read(-1).unwrap();
        assert_eq!(back, vec![1.0, 2.0, 3.0]);
        assert!(state.read::<Vec<String>>(-1).is_err());
    }

    #[test]
    fn test_nested_tables_convert() {
        let mut state = State::new();
        let outer = state.new_table(0, 1).unwrap();
        let inner = TableRef::default();
        inner.borrow_mut().set_int(1, Value::string("deep"));
        outer.borrow_mut().set_str("inner", Value::Table(inner));

        let map = table_to_host_map(&state, &outer, 1).unwrap();
        let inner = map[&HostKey::from("inner")].as_map().unwrap();
        assert_eq!(inner[&HostKey::Number(1.0)], HostValue::from("deep"));
    }

    #[test]
    fn test_cycles_hit_the_depth_limit() {
        let state = State::with_config(InteropConfig::new().with_max_conversion_depth(4));
        let t = TableRef::default();
        t.borrow_mut().set_str("self", Value::Table(t.clone()));
        assert_eq!(
            table_to_host_map(&state, &t, 1).unwrap_err(),
            Error::StackOverflow
        );
        t.borrow_mut().set_str("self", Value::Nil);
    }

    #[test]
    fn test_non_scalar_keys_are_rejected() {
        let state = State::new();
        let t = TableRef::default();
        t.borrow_mut()
            .set(Value::Table(TableRef::default()), Value::Boolean(true))
            .unwrap();
        assert!(matches!(
            table_to_host_map(&state, &t, 1),
            Err(Error::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_host_map_sizes_array_part() {
        let mut state = State::new();
        let mut map = HostMap::new();
        for i in 1..=4 {
            map.insert(HostKey::Number(i as f64), HostValue::Number(i as f64 * 10.0));
        }
        map.insert(HostKey::from("name"), HostValue::from("four"));
        let table = host_map_to_table(&mut state, &map).unwrap();
        assert_eq!(table.borrow().border(), 4);
        assert_eq!(table.borrow().get_str("name"), Value::string("four"));
    }
}
