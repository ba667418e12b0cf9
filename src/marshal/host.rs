//! Dynamically typed host values.
//!
//! [`HostValue`] is the host-side mirror of a stack slot, used when the shape of a value is
//! not known at compile time. Tables become [`HostMap`]s through a deep, eager conversion;
//! functions and userdata stay references.

use std::{
    collections::HashMap,
    fmt,
    hash::{Hash, Hasher},
    rc::Rc,
};

use crate::{
    container,
    function::ScriptFunction,
    marshal::{FromStack, IntoStack},
    runtime::{format_number, State, Value, ValueKind},
    userdata::Userdata,
    Error, Result,
};

/// A host map converted from (or convertible into) a table.
pub type HostMap = HashMap<HostKey, HostValue>;

/// A key of a [`HostMap`].
///
/// Only booleans, numbers and strings can be table keys on the host side. Numbers compare
/// by value with `-0.0 == 0.0`; NaN never appears since tables reject it as a key.
#[derive(Clone, Debug)]
pub enum HostKey {
    /// A boolean key
    Boolean(bool),
    /// A numeric key; sequence positions are `1.0`, `2.0`, ...
    Number(f64),
    /// A string key
    String(String),
}

impl HostKey {
    fn normalized_bits(n: f64) -> u64 {
        (n + 0.0).to_bits()
    }

    /// Converts a table key into a host key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeMismatch`] for keys that are not booleans, numbers or strings.
    pub fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Boolean(b) => Ok(HostKey::Boolean(*b)),
            Value::Number(n) => Ok(HostKey::Number(*n)),
            Value::String(s) => Ok(HostKey::String(s.to_string())),
            other => Err(Error::TypeMismatch {
                expected: ValueKind::String,
                found: other.kind(),
            }),
        }
    }

    /// Converts this key into a runtime value.
    pub fn to_value(&self) -> Value {
        match self {
            HostKey::Boolean(b) => Value::Boolean(*b),
            HostKey::Number(n) => Value::Number(*n),
            HostKey::String(s) => Value::string(s),
        }
    }
}

impl PartialEq for HostKey {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (HostKey::Boolean(a), HostKey::Boolean(b)) => a == b,
            (HostKey::Number(a), HostKey::Number(b)) => {
                Self::normalized_bits(*a) == Self::normalized_bits(*b)
            }
            (HostKey::String(a), HostKey::String(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for HostKey {}

impl Hash for HostKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            HostKey::Boolean(b) => b.hash(state),
            HostKey::Number(n) => Self::normalized_bits(*n).hash(state),
            HostKey::String(s) => s.hash(state),
        }
    }
}

impl fmt::Display for HostKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostKey::Boolean(b) => write!(f, "{}", b),
            HostKey::Number(n) => write!(f, "{}", format_number(*n)),
            HostKey::String(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for HostKey {
    fn from(value: &str) -> Self {
        HostKey::String(value.to_string())
    }
}

impl From<String> for HostKey {
    fn from(value: String) -> Self {
        HostKey::String(value)
    }
}

impl From<f64> for HostKey {
    fn from(value: f64) -> Self {
        HostKey::Number(value)
    }
}

impl From<bool> for HostKey {
    fn from(value: bool) -> Self {
        HostKey::Boolean(value)
    }
}

/// A host-side value of any kind.
#[derive(Clone, Debug, Default)]
pub enum HostValue {
    /// nil
    #[default]
    Nil,
    /// A boolean
    Boolean(bool),
    /// A number
    Number(f64),
    /// A copied string
    String(String),
    /// A deep copy of a table
    Map(HostMap),
    /// A reference to a callable
    Function(ScriptFunction),
    /// A reference to a wrapped host object
    Userdata(Rc<Userdata>),
    /// A bare address
    LightUserdata(usize),
}

impl HostValue {
    /// Returns the kind of slot this value converts into.
    pub fn kind(&self) -> ValueKind {
        match self {
            HostValue::Nil => ValueKind::Nil,
            HostValue::Boolean(_) => ValueKind::Boolean,
            HostValue::Number(_) => ValueKind::Number,
            HostValue::String(_) => ValueKind::String,
            HostValue::Map(_) => ValueKind::Table,
            HostValue::Function(_) => ValueKind::Function,
            HostValue::Userdata(_) => ValueKind::Userdata,
            HostValue::LightUserdata(_) => ValueKind::LightUserdata,
        }
    }

    /// Returns the nested map, if this value is one.
    pub fn as_map(&self) -> Option<&HostMap> {
        match self {
            HostValue::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Returns the number, if this value is one.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            HostValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the string, if this value is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            HostValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub(crate) fn from_runtime(value: Value, state: &State, depth: usize) -> Result<Self> {
        Ok(match value {
            Value::Nil => HostValue::Nil,
            Value::Boolean(b) => HostValue::Boolean(b),
            Value::Number(n) => HostValue::Number(n),
            Value::String(s) => HostValue::String(s.to_string()),
            Value::Table(t) => HostValue::Map(container::table_to_host_map(state, &t, depth + 1)?),
            Value::Function(f) => HostValue::Function(ScriptFunction::from_callable(f)),
            Value::Userdata(ud) => HostValue::Userdata(ud),
            Value::LightUserdata(p) => HostValue::LightUserdata(p),
        })
    }
}

impl PartialEq for HostValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (HostValue::Nil, HostValue::Nil) => true,
            (HostValue::Boolean(a), HostValue::Boolean(b)) => a == b,
            (HostValue::Number(a), HostValue::Number(b)) => a == b,
            (HostValue::String(a), HostValue::String(b)) => a == b,
            (HostValue::Map(a), HostValue::Map(b)) => a == b,
            (HostValue::Function(a), HostValue::Function(b)) => a == b,
            (HostValue::Userdata(a), HostValue::Userdata(b)) => Rc::ptr_eq(a, b),
            (HostValue::LightUserdata(a), HostValue::LightUserdata(b)) => a == b,
            _ => false,
        }
    }
}

impl From<f64> for HostValue {
    fn from(value: f64) -> Self {
        HostValue::Number(value)
    }
}

impl From<bool> for HostValue {
    fn from(value: bool) -> Self {
        HostValue::Boolean(value)
    }
}

impl From<&str> for HostValue {
    fn from(value: &str) -> Self {
        HostValue::String(value.to_string())
    }
}

impl From<String> for HostValue {
    fn from(value: String) -> Self {
        HostValue::String(value)
    }
}

impl From<HostMap> for HostValue {
    fn from(value: HostMap) -> Self {
        HostValue::Map(value)
    }
}

impl IntoStack for HostValue {
    fn into_value(self, state: &mut State) -> Result<Value> {
        Ok(match self {
            HostValue::Nil => Value::Nil,
            HostValue::Boolean(b) => Value::Boolean(b),
            HostValue::Number(n) => Value::Number(n),
            HostValue::String(s) => Value::from(s),
            HostValue::Map(m) => Value::Table(container::host_map_to_table(state, &m)?),
            HostValue::Function(f) => f.into_value(state)?,
            HostValue::Userdata(ud) => Value::Userdata(ud),
            HostValue::LightUserdata(p) => Value::LightUserdata(p),
        })
    }
}

impl FromStack for HostValue {
    const ACCEPTS_USERDATA: bool = true;

    fn from_value(value: Value, state: &State) -> Result<Self> {
        HostValue::from_runtime(value, state, 0)
    }
}

impl IntoStack for HostMap {
    fn into_value(self, state: &mut State) -> Result<Value> {
        Ok(Value::Table(container::host_map_to_table(state, &self)?))
    }
}

impl IntoStack for &HostMap {
    fn into_value(self, state: &mut State) -> Result<Value> {
        Ok(Value::Table(container::host_map_to_table(state, self)?))
    }
}

impl FromStack for HostMap {
    fn from_value(value: Value, state: &State) -> Result<Self> {
        match value {
            Value::Table(t) => container::table_to_host_map(state, &t, 1),
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

    #[test]
    fn test_numeric_keys_normalize_zero() {
        let mut map = HostMap::new();
        map.insert(HostKey::Number(-0.0), HostValue::from("zero"));
        assert_eq!(map.get(&HostKey::Number(0.0)), Some(&HostValue::from("zero")));
    }

    #[test]
    fn test_key_conversion() {
        assert_eq!(
            HostKey::from_value(&Value::string("k")).unwrap(),
            HostKey::from("k")
        );
        assert!(HostKey::from_value(&Value::Nil).is_err());
        assert_eq!(HostKey::from(2.0).to_value(), Value::Number(2.0));
        assert_eq!(HostKey::Number(3.0).to_string(), "3");
    }

    #[test]
    fn test_scalar_host_values() {
        let mut state = State::new();
        state.push(HostValue::from(1.5)).unwrap();
        state.push(HostValue::from("s")).unwrap();
        state.push(HostValue::Nil).unwrap();
        assert_eq!(state.read::<HostValue>(-3).unwrap(), HostValue::Number(1.5));
        assert_eq!(state.read::<HostValue>(-2).unwrap().as_str(), Some("s"));
        assert_eq!(state.read::<HostValue>(-1).unwrap().kind(), ValueKind::Nil);
    }

    #[test]
    fn test_nested_map_pushes_tables() {
        let mut inner = HostMap::new();
        inner.insert(HostKey::from("x"), HostValue::from(1.0));
        let mut outer = HostMap::new();
        outer.insert(HostKey::from("inner"), HostValue::Map(inner.clone()));

        let mut state = State::new();
        state.push(&outer).unwrap();
        assert_eq!(state.kind(-1).unwrap(), ValueKind::Table);
        state.get_field(-1, "inner").unwrap();
        state.get_field(-1, "x").unwrap();
        assert_eq!(state.read::<f64>(-1).unwrap(), 1.0);

        let back: HostMap = state.read(-3).unwrap();
        assert_eq!(back, outer);
    }
}
