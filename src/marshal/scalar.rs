//! Protocol implementations for scalar host types.

use std::rc::Rc;

use crate::{
    marshal::{FromStack, IntoStack},
    runtime::{State, TableRef, Value, ValueKind},
    Error, Result,
};

fn mismatch(expected: ValueKind, found: &Value) -> Error {
    Error::TypeMismatch {
        expected,
        found: found.kind(),
    }
}

impl IntoStack for Value {
    fn into_value(self, _: &mut State) -> Result<Value> {
        Ok(self)
    }
}

impl FromStack for Value {
    const ACCEPTS_USERDATA: bool = true;

    fn from_value(value: Value, _: &State) -> Result<Self> {
        Ok(value)
    }
}

impl IntoStack for bool {
    fn into_value(self, _: &mut State) -> Result<Value> {
        Ok(Value::Boolean(self))
    }
}

impl FromStack for bool {
    fn from_value(value: Value, _: &State) -> Result<Self> {
        match value {
            Value::Boolean(b) => Ok(b),
            other => Err(mismatch(ValueKind::Boolean, &other)),
        }
    }
}

macro_rules! impl_number {
    ($($ty:ty),* $(,)?) => {
        $(
            impl IntoStack for $ty {
                fn into_value(self, _: &mut State) -> Result<Value> {
                    Ok(Value::Number(self as f64))
                }
            }

            impl FromStack for $ty {
                fn from_value(value: Value, _: &State) -> Result<Self> {
                    match value {
                        Value::Number(n) => Ok(n as $ty),
                        other => Err(mismatch(ValueKind::Number, &other)),
                    }
                }
            }
        )*
    };
}

impl_number!(f64, f32, i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

impl IntoStack for &str {
    fn into_value(self, _: &mut State) -> Result<Value> {
        Ok(Value::string(self))
    }
}

impl IntoStack for String {
    fn into_value(self, _: &mut State) -> Result<Value> {
        Ok(Value::from(self))
    }
}

impl IntoStack for &String {
    fn into_value(self, _: &mut State) -> Result<Value> {
        Ok(Value::string(self))
    }
}

impl FromStack for String {
    fn from_value(value: Value, _: &State) -> Result<Self> {
        match value {
            Value::String(s) => Ok(s.to_string()),
            other => Err(mismatch(ValueKind::String, &other)),
        }
    }
}

impl IntoStack for Rc<str> {
    fn into_value(self, _: &mut State) -> Result<Value> {
        Ok(Value::String(self))
    }
}

impl FromStack for Rc<str> {
    fn from_value(value: Value, _: &State) -> Result<Self> {
        match value {
            Value::String(s) => Ok(s),
            other => Err(mismatch(ValueKind::String, &other)),
        }
    }
}

impl<T: IntoStack> IntoStack for Option<T> {
    fn into_value(self, state: &mut State) -> Result<Value> {
        match self {
            Some(value) => value.into_value(state),
            None => Ok(Value::Nil),
        }
    }
}

impl<T: FromStack> FromStack for Option<T> {
    const ACCEPTS_USERDATA: bool = T::ACCEPTS_USERDATA;

    fn from_value(value: Value, state: &State) -> Result<Self> {
        match value {
            Value::Nil => Ok(None),
            other => T::from_value(other, state).map(Some),
        }
    }
}

impl IntoStack for TableRef {
    fn into_value(self, _: &mut State) -> Result<Value> {
        Ok(Value::Table(self))
    }
}

impl FromStack for TableRef {
    fn from_value(value: Value, _: &State) -> Result<Self> {
        match value {
            Value::Table(t) => Ok(t),
            other => Err(mismatch(ValueKind::Table, &other)),
        }
    }
}
