//! Stack Value Protocol: conversions between host values and stack slots.
//!
//! Every value that crosses the host boundary goes through one of four traits:
//!
//! | Trait | Direction | Used by |
//! |-------|-----------|---------|
//! | [`IntoStack`] | host → one slot | [`State::push`], callable results, field getters |
//! | [`FromStack`] | one slot → host | [`State::read`], callable arguments, field setters |
//! | [`IntoStackMulti`] | host → N slots | callable results, script function arguments |
//! | [`FromStackMulti`] | N slots → host | script function results |
//!
//! # Conversion Rules
//!
//! | Host type | Slot kind | Notes |
//! |-----------|-----------|-------|
//! | `f64`, `f32` | number | `f32` widens exactly |
//! | `i8`..`i64`, `u8`..`u64`, `isize`, `usize` | number | converted with `as`; reading truncates |
//! | `bool` | boolean | strict, no truthiness coercion |
//! | `String`, `&str`, `Rc<str>` | string | always copied |
//! | `Option<T>` | nil or `T` | |
//! | [`Value`] | any | passed through unchanged |
//! | [`HostValue`] | any | tables converted deeply |
//! | [`HostMap`] | table | deep, eager conversion |
//!
//! No implicit narrowing happens on the runtime side: numbers are always `f64`. Reading a slot
//! of the wrong kind fails with [`Error::TypeMismatch`](crate::Error::TypeMismatch) carrying
//! both kinds.
//!
//! # Example
//!
//! ```rust
//! use luainterop::State;
//!
//! let mut state = State::new();
//! state.push("hello")?;
//! state.push(42_i32)?;
//! state.push(Some(true))?;
//!
//! assert_eq!(state.read::<String>(-3)?, "hello");
//! assert_eq!(state.read::<i32>(-2)?, 42);
//! assert_eq!(state.read::<Option<bool>>(-1)?, Some(true));
//! assert!(state.read::<bool>(-2).is_err());
//! # Ok::<(), luainterop::Error>(())
//! ```

mod host;
mod multi;
mod scalar;

pub use host::{HostKey, HostMap, HostValue};

use crate::{
    runtime::{State, Value},
    Result,
};

/// A host value that can be encoded into a single stack slot.
pub trait IntoStack {
    /// Encodes `self` as a runtime value.
    ///
    /// Composite values (tables, userdata) are allocated through `state`.
    ///
    /// # Errors
    ///
    /// Returns an error if allocating a composite value fails.
    fn into_value(self, state: &mut State) -> Result<Value>;
}

/// A host value that can be decoded from a single stack slot.
pub trait FromStack: Sized {
    /// Whether a userdata slot can decode into this type.
    const ACCEPTS_USERDATA: bool = false;

    /// Decodes a runtime value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeMismatch`](crate::Error::TypeMismatch) if the value has the wrong
    /// kind, or a type-specific decoding error.
    fn from_value(value: Value, state: &State) -> Result<Self>;

    /// Decodes the value at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIndex`](crate::Error::InvalidIndex) if `index` does not address
    /// a slot, or the error of [`FromStack::from_value`].
    fn from_stack(state: &State, index: i32) -> Result<Self> {
        Self::from_value(state.value(index)?, state)
    }
}

/// A host value that encodes into a fixed number of stack slots.
///
/// Implemented for `()` (no values), for every [`IntoStack`] type (one value) and for tuples
/// of up to eight [`IntoStack`] elements (one value each, pushed in declared order).
pub trait IntoStackMulti {
    /// Number of values [`IntoStackMulti::push_all`] pushes.
    const COUNT: usize;

    /// Pushes every value in declared order and returns how many were pushed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StackOverflow`](crate::Error::StackOverflow) if the stack is full.
    fn push_all(self, state: &mut State) -> Result<usize>;
}

/// A host value that decodes from a fixed number of stack slots.
///
/// Implemented for `()`, for every [`FromStack`] type and for tuples of up to eight
/// [`FromStack`] elements.
pub trait FromStackMulti: Sized {
    /// Number of values [`FromStackMulti::from_top`] consumes.
    const COUNT: usize;

    /// Whether the first value can be decoded from a userdata slot.
    const FIRST_ACCEPTS_USERDATA: bool;

    /// Decodes the top [`FromStackMulti::COUNT`] values, the deepest one first.
    ///
    /// # Errors
    ///
    /// Returns the first decoding error.
    fn from_top(state: &State) -> Result<Self>;
}

impl<T: IntoStack> IntoStackMulti for T {
    const COUNT: usize = 1;

    fn push_all(self, state: &mut State) -> Result<usize> {
        state.push(self)?;
        Ok(1)
    }
}

impl<T: FromStack> FromStackMulti for T {
    const COUNT: usize = 1;
    const FIRST_ACCEPTS_USERDATA: bool = T::ACCEPTS_USERDATA;

    fn from_top(state: &State) -> Result<Self> {
        T::from_stack(state, -1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{runtime::ValueKind, Error};

    #[test]
    fn test_number_round_trip() {
        let mut state = State::new();
        for n in [0.0, -1.5, 41.875, f64::MAX, f64::MIN_POSITIVE] {
            state.push(n).unwrap();
            assert_eq!(state.read::<f64>(-1).unwrap(), n);
        }
    }

    #[test]
    fn test_string_round_trip() {
        let mut state = State::new();
        for s in ["", "Test", "Set by Lua", "ünïcødé"] {
            state.push(s).unwrap();
            assert_eq!(state.read::<String>(-1).unwrap(), s);
        }
    }

    #[test]
    fn test_boolean_round_trip() {
        let mut state = State::new();
        for b in [true, false] {
            state.push(b).unwrap();
            assert_eq!(state.read::<bool>(-1).unwrap(), b);
        }
    }

    #[test]
    fn test_mismatch_carries_both_kinds() {
        let mut state = State::new();
        state.push("not a number").unwrap();
        assert_eq!(
            state.read::<f64>(-1).unwrap_err(),
            Error::TypeMismatch {
                expected: ValueKind::Number,
                found: ValueKind::String
            }
        );
    }

    #[test]
    fn test_multi_push_counts() {
        let mut state = State::new();
        assert_eq!(().push_all(&mut state).unwrap(), 0);
        assert_eq!(1.0_f64.push_all(&mut state).unwrap(), 1);
        assert_eq!((1.0_f64, "two", true).push_all(&mut state).unwrap(), 3);
        assert_eq!(state.top(), 4);

        let (a, b, c) = <(f64, String, bool)>::from_top(&state).unwrap();
        assert_eq!((a, b.as_str(), c), (1.0, "two", true));
    }
}
