//! Tagged values held in stack slots and tables.
//!
//! [`Value`] is the runtime's tag union. Scalars are stored inline; tables, functions and
//! userdata are reference-counted handles, so cloning a [`Value`] never copies the referenced
//! object. Two reference values are raw-equal only if they point at the same object.
//!
//! # Kinds
//!
//! | Kind | Variant | Notes |
//! |------|---------|-------|
//! | `nil` | [`Value::Nil`] | Also the result of reading an absent key |
//! | `boolean` | [`Value::Boolean`] | Only `nil` and `false` are falsy |
//! | `number` | [`Value::Number`] | Always `f64` |
//! | `string` | [`Value::String`] | Immutable, shared `Rc<str>` |
//! | `table` | [`Value::Table`] | See [`TableRef`] |
//! | `function` | [`Value::Function`] | A [`BoundCallable`] |
//! | `userdata` | [`Value::Userdata`] | Host object plus type tag and metatable |
//! | `light userdata` | [`Value::LightUserdata`] | Bare address, no metatable |

use std::{fmt, rc::Rc};

use strum::{Display, IntoStaticStr};

use crate::{function::BoundCallable, runtime::TableRef, userdata::Userdata};

/// The kind tag of a stack slot.
///
/// The `Display` form is the name scripts see for a value's type, and the name used in
/// [`Error::TypeMismatch`](crate::Error::TypeMismatch) messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum ValueKind {
    /// The absence of a value
    Nil,
    /// `true` or `false`
    Boolean,
    /// A bare address without type information
    #[strum(serialize = "light userdata")]
    LightUserdata,
    /// A double-precision number
    Number,
    /// An immutable byte string
    String,
    /// An associative container
    Table,
    /// A callable value
    Function,
    /// A host object wrapped for script access
    Userdata,
    /// A coroutine; never produced by this runtime
    Thread,
}

/// A single runtime value.
#[derive(Clone, Default)]
pub enum Value {
    /// The absence of a value.
    #[default]
    Nil,
    /// A boolean.
    Boolean(bool),
    /// A number. The runtime has no separate integer representation.
    Number(f64),
    /// An immutable string.
    String(Rc<str>),
    /// A reference to a table.
    Table(TableRef),
    /// A reference to a host-bound callable.
    Function(Rc<BoundCallable>),
    /// A reference to a wrapped host object.
    Userdata(Rc<Userdata>),
    /// An opaque address. Carries no type tag and cannot have a metatable.
    LightUserdata(usize),
}

impl Value {
    /// Returns the kind tag of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Nil => ValueKind::Nil,
            Value::Boolean(_) => ValueKind::Boolean,
            Value::Number(_) => ValueKind::Number,
            Value::String(_) => ValueKind::String,
            Value::Table(_) => ValueKind::Table,
            Value::Function(_) => ValueKind::Function,
            Value::Userdata(_) => ValueKind::Userdata,
            Value::LightUserdata(_) => ValueKind::LightUserdata,
        }
    }

    /// Returns `true` if this is `nil`.
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Script truthiness: everything except `nil` and `false` is true.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Boolean(false))
    }

    /// Creates a string value.
    pub fn string(value: &str) -> Self {
        Value::String(Rc::from(value))
    }

    /// Returns the number held by this value, if it is one.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the string held by this value, if it is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the table referenced by this value, if it is one.
    pub fn as_table(&self) -> Option<&TableRef> {
        match self {
            Value::Table(t) => Some(t),
            _ => None,
        }
    }

    /// Raw equality: no metamethods, references compare by identity.
    pub fn raw_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Table(a), Value::Table(b)) => a.ptr_eq(b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Userdata(a), Value::Userdata(b)) => Rc::ptr_eq(a, b),
            (Value::LightUserdata(a), Value::LightUserdata(b)) => a == b,
            _ => false,
        }
    }

    /// Type name used in diagnostics. Userdata report their host type name.
    pub fn type_name(&self) -> String {
        match self {
            Value::Userdata(ud) => ud.type_name().to_string(),
            other => other.kind().to_string(),
        }
    }

    /// Address of the referenced object, or `0` for scalars.
    pub(crate) fn address(&self) -> usize {
        match self {
            Value::Table(t) => t.address(),
            Value::Function(f) => Rc::as_ptr(f) as *const () as usize,
            Value::Userdata(u) => Rc::as_ptr(u) as *const () as usize,
            Value::LightUserdata(p) => *p,
            _ => 0,
        }
    }
}

/// Formats a number the way scripts print it: integral values without a fraction.
pub(crate) fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else if n.is_nan() {
        if n.is_sign_negative() {
            "-nan".to_string()
        } else {
            "nan".to_string()
        }
    } else if n.is_infinite() {
        if n > 0.0 {
            "inf".to_string()
        } else {
            "-inf".to_string()
        }
    } else {
        format!("{}", n)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", format_number(*n)),
            Value::String(s) => write!(f, "{}", s),
            Value::Table(_) => write!(f, "table: {:#x}", self.address()),
            Value::Function(_) => write!(f, "function: {:#x}", self.address()),
            Value::Userdata(ud) => write!(f, "{}: {:#x}", ud.type_name(), self.address()),
            Value::LightUserdata(p) => write!(f, "userdata: {:#x}", p),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{:?}", s),
            Value::Function(func) => write!(f, "function<{}>", func.name()),
            other => write!(f, "{}", other),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.raw_equals(other)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::string(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(Rc::from(value))
    }
}

impl From<TableRef> for Value {
    fn from(value: TableRef) -> Self {
        Value::Table(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names() {
        assert_eq!(ValueKind::Nil.to_string(), "nil");
        assert_eq!(ValueKind::Boolean.to_string(), "boolean");
        assert_eq!(ValueKind::LightUserdata.to_string(), "light userdata");
        assert_eq!(ValueKind::Userdata.to_string(), "userdata");
        let name: &'static str = ValueKind::Function.into();
        assert_eq!(name, "function");
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Nil.is_truthy());
        assert!(!Value::Boolean(false).is_truthy());
        assert!(Value::Boolean(true).is_truthy());
        assert!(Value::Number(0.0).is_truthy());
        assert!(Value::string("").is_truthy());
    }

    #[test]
    fn test_raw_equals() {
        assert_eq!(Value::Number(1.5), Value::Number(1.5));
        assert_eq!(Value::string("a"), Value::from("a".to_string()));
        assert_ne!(Value::Number(1.0), Value::string("1"));

        let a = TableRef::default();
        let b = TableRef::default();
        assert_eq!(Value::Table(a.clone()), Value::Table(a));
        assert_ne!(Value::Table(b), Value::Table(TableRef::default()));
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(5.0), "5");
        assert_eq!(format_number(-2.5), "-2.5");
        assert_eq!(format_number(41.875), "41.875");
        assert_eq!(format_number(f64::INFINITY), "inf");
    }
}
