//! Host handles to callable script values.

use std::rc::Rc;

use crate::{
    function::BoundCallable,
    marshal::{FromStack, FromStackMulti, IntoStack, IntoStackMulti},
    runtime::{CallStatus, State, Value, ValueKind},
    Error, Result,
};

/// A host-side handle to a function value.
///
/// The handle keeps the function alive; it can be called any number of times, including from
/// inside a host callable that the function itself invoked.
///
/// # Example
///
/// ```rust
/// use luainterop::{function::ScriptFunction, State};
///
/// let mut state = State::new();
/// state.register("add", |(a, b): (f64, f64)| Ok(a + b))?;
/// state.get_global("add")?;
/// let add: ScriptFunction = state.read(-1)?;
/// state.pop(1)?;
///
/// let sum: f64 = add.call(&mut state, (2.0, 3.0))?;
/// assert_eq!(sum, 5.0);
/// assert_eq!(state.top(), 0);
/// # Ok::<(), luainterop::Error>(())
/// ```
#[derive(Clone, Debug)]
pub struct ScriptFunction {
    value: Value,
}

impl ScriptFunction {
    pub(crate) fn from_callable(callable: Rc<BoundCallable>) -> Self {
        ScriptFunction {
            value: Value::Function(callable),
        }
    }

    /// Returns the function value.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Display name of the underlying callable.
    pub fn name(&self) -> &str {
        match &self.value {
            Value::Function(f) => f.name(),
            _ => "?",
        }
    }

    /// Calls the function with `args` and reads `R` from its results.
    ///
    /// The stack is left as it was before the call, on success and on error.
    ///
    /// # Errors
    ///
    /// Returns the error raised by the function, or a decoding error for its results.
    pub fn call<A, R>(&self, state: &mut State, args: A) -> Result<R>
    where
        A: IntoStackMulti,
        R: FromStackMulti,
    {
        let top = state.top();
        let outcome = self
            .push_and_call(state, args, R::COUNT as i32)
            .and_then(|()| R::from_top(state));
        state.set_top(top)?;
        outcome
    }

    fn push_and_call<A: IntoStackMulti>(&self, state: &mut State, args: A, nresults: i32) -> Result<()> {
        state.push_value(self.value.clone())?;
        let nargs = args.push_all(state)?;
        state.call(nargs as i32, nresults)
    }

    /// Calls the function in protected mode.
    ///
    /// Errors raised by the function come back as [`Error::Runtime`] carrying the error
    /// message; the stack is restored either way.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Runtime`] if the function raised, or a decoding error for its results.
    pub fn call_protected<A, R>(&self, state: &mut State, args: A) -> Result<R>
    where
        A: IntoStackMulti,
        R: FromStackMulti,
    {
        let top = state.top();
        let outcome = self.push_and_pcall::<A, R>(state, args);
        state.set_top(top)?;
        outcome
    }

    fn push_and_pcall<A, R>(&self, state: &mut State, args: A) -> Result<R>
    where
        A: IntoStackMulti,
        R: FromStackMulti,
    {
        state.push_value(self.value.clone())?;
        let nargs = args.push_all(state)?;
        match state.pcall(nargs as i32, R::COUNT as i32)? {
            CallStatus::Ok => R::from_top(state),
            _ => {
                let message = match state.take_error() {
                    Some(err) => err.to_string(),
                    None => state.read::<String>(-1)?,
                };
                Err(Error::Runtime { message })
            }
        }
    }

    /// Calls the function with `nargs` arguments already pushed.
    ///
    /// Pushes the function below the arguments and calls it, leaving `nresults` results (or
    /// all of them with [`MULTRET`](crate::runtime::MULTRET)).
    ///
    /// # Errors
    ///
    /// Returns [`Error::StackUnderflow`] if fewer than `nargs` values are on the stack, or the
    /// error raised by the function.
    pub fn invoke(&self, state: &mut State, nargs: i32, nresults: i32) -> Result<()> {
        self.place_below(state, nargs)?;
        state.call(nargs, nresults)
    }

    /// Like [`ScriptFunction::invoke`], in protected mode.
    ///
    /// # Errors
    ///
    /// Only misuse of the stack is returned as `Err`; failures of the function are reported
    /// through the returned status with the message on the stack.
    pub fn invoke_protected(&self, state: &mut State, nargs: i32, nresults: i32) -> Result<CallStatus> {
        self.place_below(state, nargs)?;
        state.pcall(nargs, nresults)
    }

    fn place_below(&self, state: &mut State, nargs: i32) -> Result<()> {
        if nargs < 0 || nargs > state.top() {
            return Err(Error::StackUnderflow);
        }
        state.push_value(self.value.clone())?;
        state.insert(-(nargs + 1))
    }
}

impl PartialEq for ScriptFunction {
    fn eq(&self, other: &Self) -> bool {
        self.value.raw_equals(&other.value)
    }
}

impl IntoStack for ScriptFunction {
    fn into_value(self, _: &mut State) -> Result<Value> {
        Ok(self.value)
    }
}

impl IntoStack for &ScriptFunction {
    fn into_value(self, _: &mut State) -> Result<Value> {
        Ok(self.value.clone())
    }
}

impl FromStack for ScriptFunction {
    fn from_value(value: Value, _: &State) -> Result<Self> {
        match value {
            Value::Function(_) => Ok(ScriptFunction { value }),
            other => Err(Error::TypeMismatch {
                expected: ValueKind::Function,
                found: other.kind(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_values(state: &mut State) -> Result<usize> {
        let n: f64 = state.read(1)?;
        state.push(n)?;
        state.push(n * 2.0)?;
        Ok(2)
    }

    fn fail(_: &mut State) -> Result<usize> {
        Err(runtime_error!("failed on purpose"))
    }

    fn function(state: &mut State, f: crate::function::NativeFn) -> ScriptFunction {
        state.push_native("f", f).unwrap();
        let function = state.read(-1).unwrap();
        state.pop(1).unwrap();
        function
    }

    #[test]
    fn test_call_reads_declared_results() {
        let mut state = State::new();
        let f = function(&mut state, two_values);
        let (a, b): (f64, f64) = f.call(&mut state, 4.0).unwrap();
        assert_eq!((a, b), (4.0, 8.0));
        let a: f64 = f.call(&mut state, 4.0).unwrap();
        assert_eq!(a, 4.0);
        assert_eq!(state.top(), 0);
    }

    #[test]
    fn test_call_protected_restores_stack() {
        let mut state = State::new();
        state.push("keep").unwrap();
        let f = function(&mut state, fail);
        let err = f.call_protected::<_, ()>(&mut state, ()).unwrap_err();
        assert_eq!(err, runtime_error!("failed on purpose"));
        assert_eq!(state.top(), 1);
        assert_eq!(state.read::<String>(-1).unwrap(), "keep");
    }

    #[test]
    fn test_call_error_restores_stack() {
        let mut state = State::new();
        let f = function(&mut state, fail);
        assert!(f.call::<_, ()>(&mut state, (1.0, 2.0)).is_err());
        assert_eq!(state.top(), 0);
    }

    #[test]
    fn test_invoke_with_pushed_arguments() {
        let mut state = State::new();
        let f = function(&mut state, two_values);
        state.push(3.0).unwrap();
        f.invoke(&mut state, 1, 2).unwrap();
        assert_eq!(state.top(), 2);
        assert_eq!(state.read::<f64>(-1).unwrap(), 6.0);
    }

    #[test]
    fn test_invoke_protected_status() {
        let mut state = State::new();
        let f = function(&mut state, fail);
        let status = f.invoke_protected(&mut state, 0, 0).unwrap();
        assert_eq!(status, CallStatus::RuntimeError);
        assert_eq!(state.read::<String>(-1).unwrap(), "failed on purpose");
        assert!(f.invoke_protected(&mut state, 5, 0).is_err());
    }

    #[test]
    fn test_read_non_function() {
        let mut state = State::new();
        state.push(1.0).unwrap();
        assert!(matches!(
            state.read::<ScriptFunction>(-1),
            Err(Error::TypeMismatch {
                expected: ValueKind::Function,
                found: ValueKind::Number
            })
        ));
    }
}
