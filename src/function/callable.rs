//! Native function values.
//!
//! A [`BoundCallable`] is what a runtime function value points to: a uniform entry point
//! ([`Thunk`]) plus the erased state that entry point operates on. The thunk is a plain `fn`
//! shared by every callable of the same host signature; the erased state is what makes one
//! callable differ from another.

use std::{
    any::{type_name, Any},
    fmt,
    panic::{self, AssertUnwindSafe},
    rc::Rc,
};

use crate::{runtime::State, Error, Result};

/// Signature of a hand-written native function.
///
/// The function receives its arguments at stack indices `1..=top()`, pushes its results and
/// returns how many it pushed.
pub type NativeFn = fn(&mut State) -> Result<usize>;

/// Uniform entry point of every [`BoundCallable`].
///
/// The second argument is the callable's erased state; a thunk downcasts it to the concrete
/// type it was generated for.
pub type Thunk = fn(&mut State, &dyn Any) -> Result<usize>;

/// A native closure operating directly on the stack.
pub(crate) type StackClosure = Rc<dyn Fn(&mut State) -> Result<usize>>;

/// Describes the host signature a callable was generated from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Signature {
    /// Type name of the argument list (a tuple, a single type, or `()`)
    pub params: &'static str,
    /// Type name of the result list
    pub results: &'static str,
    /// Number of stack slots read as arguments
    pub arity: usize,
    /// Number of stack slots pushed as results
    pub result_count: usize,
}

impl Signature {
    /// Signature of callables that manage the stack themselves.
    pub const NATIVE: Signature = Signature {
        params: "...",
        results: "...",
        arity: 0,
        result_count: 0,
    };

    /// Builds the descriptor for the host signature `fn(A) -> R`.
    pub fn of<A, R>(arity: usize, result_count: usize) -> Self {
        Signature {
            params: type_name::<A>(),
            results: type_name::<R>(),
            arity,
            result_count,
        }
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fn({}) -> {}", self.params, self.results)
    }
}

/// A host callable exposed to the runtime.
pub struct BoundCallable {
    name: Rc<str>,
    thunk: Thunk,
    state: Box<dyn Any>,
    signature: Signature,
}

impl BoundCallable {
    /// Creates a callable from a raw thunk and the state it operates on.
    pub fn new(name: &str, thunk: Thunk, state: Box<dyn Any>, signature: Signature) -> Self {
        BoundCallable {
            name: Rc::from(name),
            thunk,
            state,
            signature,
        }
    }

    /// Wraps a hand-written native function.
    pub fn native(name: &str, f: NativeFn) -> Self {
        Self::new(name, native_thunk, Box::new(f), Signature::NATIVE)
    }

    /// Wraps a native closure operating directly on the stack.
    pub(crate) fn from_closure<F>(name: &str, f: F) -> Self
    where
        F: Fn(&mut State) -> Result<usize> + 'static,
    {
        let closure: StackClosure = Rc::new(f);
        Self::new(name, closure_thunk, Box::new(closure), Signature::NATIVE)
    }

    /// Display name used in diagnostics.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The host signature this callable was generated from.
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// The entry point of this callable.
    pub fn thunk(&self) -> Thunk {
        self.thunk
    }

    /// Runs the callable on the current frame of `state` and returns its result count.
    ///
    /// Unless [`InteropConfig::catch_panics`](crate::InteropConfig::catch_panics) is off, a
    /// panic inside the host code is caught here and reported as
    /// [`Error::HostCallableFault`]; it never unwinds into the caller's frame.
    ///
    /// # Errors
    ///
    /// Returns whatever error the host code returned, or [`Error::HostCallableFault`].
    pub fn invoke(&self, state: &mut State) -> Result<usize> {
        if !state.config().catch_panics {
            return (self.thunk)(state, &*self.state);
        }
        match panic::catch_unwind(AssertUnwindSafe(|| (self.thunk)(state, &*self.state))) {
            Ok(result) => result,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                log::warn!("host function '{}' panicked: {}", self.name, message);
                Err(Error::HostCallableFault {
                    name: self.name.to_string(),
                    message,
                })
            }
        }
    }
}

impl fmt::Debug for BoundCallable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundCallable")
            .field("name", &self.name)
            .field("signature", &self.signature)
            .finish()
    }
}

fn native_thunk(state: &mut State, erased: &dyn Any) -> Result<usize> {
    match erased.downcast_ref::<NativeFn>() {
        Some(f) => f(state),
        None => Err(thunk_mismatch::<NativeFn>()),
    }
}

fn closure_thunk(state: &mut State, erased: &dyn Any) -> Result<usize> {
    match erased.downcast_ref::<StackClosure>() {
        Some(f) => {
            let f = f.clone();
            f(state)
        }
        None => Err(thunk_mismatch::<StackClosure>()),
    }
}

pub(crate) fn thunk_mismatch<T>() -> Error {
    Error::Runtime {
        message: format!("callable state is not a {}", type_name::<T>()),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with a non-string payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InteropConfig;

    fn answer(state: &mut State) -> Result<usize> {
        state.push(42.0)?;
        Ok(1)
    }

    fn explode(_: &mut State) -> Result<usize> {
        panic!("host exploded");
    }

    #[test]
    fn test_native_invoke() {
        let mut state = State::new();
        let callable = BoundCallable::native("answer", answer);
        assert_eq!(callable.name(), "answer");
        assert_eq!(callable.invoke(&mut state).unwrap(), 1);
        assert_eq!(state.read::<f64>(-1).unwrap(), 42.0);
    }

    #[test]
    fn test_closure_invoke() {
        let mut state = State::new();
        let offset = 10.0;
        let callable = BoundCallable::from_closure("offset", move |state| {
            state.push(offset)?;
            Ok(1)
        });
        assert_eq!(callable.invoke(&mut state).unwrap(), 1);
        assert_eq!(state.read::<f64>(-1).unwrap(), 10.0);
        assert_eq!(callable.signature(), &Signature::NATIVE);
    }

    #[test]
    fn test_panic_becomes_fault() {
        let mut state = State::new();
        let callable = BoundCallable::native("explode", explode);
        let err = callable.invoke(&mut state).unwrap_err();
        assert_eq!(
            err,
            Error::HostCallableFault {
                name: "explode".to_string(),
                message: "host exploded".to_string()
            }
        );
        assert_eq!(err.to_string(), "host function 'explode' failed: host exploded");
    }

    #[test]
    fn test_panics_propagate_when_disabled() {
        let mut state = State::with_config(InteropConfig::new().with_catch_panics(false));
        let callable = BoundCallable::native("explode", explode);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| callable.invoke(&mut state)));
        assert!(outcome.is_err());
    }

    #[test]
    fn test_mismatched_state_is_an_error() {
        let mut state = State::new();
        let callable = BoundCallable::new("bad", native_thunk, Box::new(1_u8), Signature::NATIVE);
        assert!(matches!(
            callable.invoke(&mut state),
            Err(Error::Runtime { .. })
        ));
    }

    #[test]
    fn test_signature_display() {
        let signature = Signature::of::<(f64, f64), f64>(2, 1);
        assert_eq!(signature.to_string(), "fn((f64, f64)) -> f64");
        assert_eq!(signature.arity, 2);
    }
}
