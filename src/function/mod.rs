//! Call Thunk Generator: exposing host callables to scripts.
//!
//! Any Rust closure `Fn(A) -> Result<R>` whose argument list `A` implements
//! [`FromStackMulti`] and whose result list `R` implements [`IntoStackMulti`] can be
//! registered as a script function. Argument lists are tuples (`(f64, String)`), a single
//! type (`f64`) or `()`; result lists follow the same shapes.
//!
//! # Calling Convention
//!
//! | Situation | Behavior |
//! |-----------|----------|
//! | Fewer arguments than declared | Missing trailing arguments read as nil |
//! | More arguments than declared | Surplus arguments are ignored |
//! | Argument of the wrong kind | [`Error::TypeMismatch`](crate::Error::TypeMismatch) raised to the caller |
//! | `()` result | Nothing pushed, result count 0 |
//! | Tuple result | One value per element, in declared order |
//! | Closure returns `Err` | The error is raised to the caller unchanged |
//! | Closure panics | [`Error::HostCallableFault`](crate::Error::HostCallableFault) raised to the caller |
//!
//! # Thunks
//!
//! Closures are type-erased into their [`BoundCallable`]; the code that moves arguments and
//! results is one monomorphized [`Thunk`] per signature, cached in the [`State`]. Registering
//! a hundred `fn(f64) -> f64` closures generates one thunk.
//!
//! # Example
//!
//! ```rust
//! use luainterop::State;
//!
//! let mut state = State::new();
//! state.register("triple", |(): ()| Ok((1.0, 2.0, -2.5)))?;
//!
//! state.get_global("triple")?;
//! state.call(0, 3)?;
//! assert_eq!(state.read::<f64>(-3)?, 1.0);
//! assert_eq!(state.read::<f64>(-1)?, -2.5);
//! # Ok::<(), luainterop::Error>(())
//! ```

mod callable;
mod script;
mod thunk;

pub use callable::{BoundCallable, NativeFn, Signature, Thunk};
pub use script::ScriptFunction;
pub use thunk::{host_thunk, HostClosure};

use std::rc::Rc;

use crate::{
    marshal::{FromStackMulti, IntoStackMulti},
    runtime::{State, Value},
    Result,
};

impl State {
    /// Pushes a hand-written native function.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StackOverflow`](crate::Error::StackOverflow) if the stack is full.
    pub fn push_native(&mut self, name: &str, f: NativeFn) -> Result<()> {
        self.push_value(Value::Function(Rc::new(BoundCallable::native(name, f))))
    }

    /// Stores a hand-written native function as the global `name`.
    pub fn register_native(&mut self, name: &str, f: NativeFn) -> Result<()> {
        self.push_native(name, f)?;
        self.set_global(name)
    }

    /// Pushes a host closure as a function value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StackOverflow`](crate::Error::StackOverflow) if the stack is full.
    pub fn push_function<A, R, F>(&mut self, name: &str, f: F) -> Result<()>
    where
        A: FromStackMulti + 'static,
        R: IntoStackMulti + 'static,
        F: Fn(A) -> Result<R> + 'static,
    {
        self.push_function_with_state(name, move |_: &mut State, args: A| f(args))
    }

    /// Pushes a host closure that also receives the state, so it can call back into script
    /// functions or inspect the stack.
    pub fn push_function_with_state<A, R, F>(&mut self, name: &str, f: F) -> Result<()>
    where
        A: FromStackMulti + 'static,
        R: IntoStackMulti + 'static,
        F: Fn(&mut State, A) -> Result<R> + 'static,
    {
        let closure: HostClosure<A, R> = Box::new(f);
        let callable = self.bind_closure(name, closure);
        self.push_value(Value::Function(Rc::new(callable)))
    }

    /// Stores a host closure as the global `name`.
    ///
    /// # Example
    ///
    /// ```rust
    /// use luainterop::State;
    ///
    /// let mut state = State::new();
    /// state.register("test", |(a, b): (f64, f64)| Ok(a - b))?;
    ///
    /// state.get_global("test")?;
    /// state.push(10.0)?;
    /// state.push(5.0)?;
    /// state.call(2, 1)?;
    /// assert_eq!(state.read::<f64>(-1)?, 5.0);
    /// # Ok::<(), luainterop::Error>(())
    /// ```
    pub fn register<A, R, F>(&mut self, name: &str, f: F) -> Result<()>
    where
        A: FromStackMulti + 'static,
        R: IntoStackMulti + 'static,
        F: Fn(A) -> Result<R> + 'static,
    {
        self.push_function(name, f)?;
        self.set_global(name)
    }

    /// Stores a host closure that receives the state as the global `name`.
    pub fn register_with_state<A, R, F>(&mut self, name: &str, f: F) -> Result<()>
    where
        A: FromStackMulti + 'static,
        R: IntoStackMulti + 'static,
        F: Fn(&mut State, A) -> Result<R> + 'static,
    {
        self.push_function_with_state(name, f)?;
        self.set_global(name)
    }

    /// Creates a function value for a host closure without leaving it on the stack.
    pub fn create_function<A, R, F>(&mut self, name: &str, f: F) -> Result<ScriptFunction>
    where
        A: FromStackMulti + 'static,
        R: IntoStackMulti + 'static,
        F: Fn(A) -> Result<R> + 'static,
    {
        let closure: HostClosure<A, R> = Box::new(move |_: &mut State, args: A| f(args));
        let callable = self.bind_closure(name, closure);
        Ok(ScriptFunction::from_callable(Rc::new(callable)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{runtime::CallStatus, Error};

    #[test]
    fn test_register_and_call() {
        let mut state = State::new();
        state
            .register("test", |(a, b): (f64, f64)| Ok(a - b))
            .unwrap();
        state.get_global("test").unwrap();
        state.push(10.0).unwrap();
        state.push(5.0).unwrap();
        state.call(2, 1).unwrap();
        assert_eq!(state.read::<f64>(-1).unwrap(), 5.0);
        assert_eq!(state.top(), 1);
    }

    #[test]
    fn test_depth_after_call_matches_results() {
        let mut state = State::new();
        state
            .register("three", |x: f64| Ok((x, x, x)))
            .unwrap();
        state.push("below").unwrap();
        state.get_global("three").unwrap();
        state.push(1.0).unwrap();
        state.push(2.0).unwrap();
        state.call(2, crate::runtime::MULTRET).unwrap();
        assert_eq!(state.top(), 1 + 3);
    }

    #[test]
    fn test_returned_error_keeps_variant() {
        let mut state = State::new();
        state
            .register("strict", |(): ()| -> Result<()> {
                Err(Error::InvalidKey { reason: "nope" })
            })
            .unwrap();
        state.get_global("strict").unwrap();
        let err = state.call(0, 0).unwrap_err();
        assert_eq!(err, Error::InvalidKey { reason: "nope" });
    }

    #[test]
    fn test_host_panic_is_catchable() {
        let mut state = State::new();
        state
            .register("explode", |(): ()| -> Result<()> { panic!("kaboom") })
            .unwrap();
        state.get_global("explode").unwrap();
        assert_eq!(state.pcall(0, 0).unwrap(), CallStatus::RuntimeError);
        assert_eq!(
            state.read::<String>(-1).unwrap(),
            "host function 'explode' failed: kaboom"
        );
    }

    #[test]
    fn test_closure_calls_back_into_script() {
        let mut state = State::new();
        state
            .register("mul", |(a, b): (f64, f64)| Ok(a * b))
            .unwrap();
        state
            .register_with_state("apply", |state: &mut State, (f, x): (ScriptFunction, f64)| {
                let doubled: f64 = f.call(state, (x, 2.0))?;
                Ok(doubled + 1.0)
            })
            .unwrap();
        state.get_global("apply").unwrap();
        state.get_global("mul").unwrap();
        state.push(4.0).unwrap();
        state.call(2, 1).unwrap();
        assert_eq!(state.read::<f64>(-1).unwrap(), 9.0);
    }

    #[test]
    fn test_create_function() {
        let mut state = State::new();
        let negate = state.create_function("negate", |x: f64| Ok(-x)).unwrap();
        assert_eq!(state.top(), 0);
        assert_eq!(negate.name(), "negate");
        let y: f64 = negate.call(&mut state, 3.0).unwrap();
        assert_eq!(y, -3.0);
    }

    #[test]
    fn test_native_registration() {
        fn nothing(_: &mut State) -> Result<usize> {
            Err(runtime_error!("nothing here"))
        }
        let mut state = State::new();
        state.register_native("nothing", nothing).unwrap();
        state.get_global("nothing").unwrap();
        assert_eq!(state.pcall(0, 0).unwrap(), CallStatus::RuntimeError);
        assert_eq!(state.read::<String>(-1).unwrap(), "nothing here");
    }
}
