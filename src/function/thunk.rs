//! Thunk generation for host closures.
//!
//! Every host closure is stored as a [`HostClosure<A, R>`] and driven by the single
//! monomorphized [`host_thunk::<A, R>`] for its signature. The thunk:
//!
//! 1. Normalizes the frame to exactly `A::COUNT` slots: missing trailing arguments become
//!    nil, surplus arguments are dropped.
//! 2. Reads the arguments through the Stack Value Protocol, the first one at
//!    `-(A::COUNT)` and the last one at `-1`.
//! 3. Calls the closure.
//! 4. Pushes the results in declared order and reports `R::COUNT`.
//!
//! The thunk is registered in the state's thunk table the first time its signature is seen;
//! later closures with the same signature reuse the cached entry point.

use std::any::{Any, TypeId};

use crate::{
    function::{
        callable::{thunk_mismatch, Signature},
        BoundCallable,
    },
    marshal::{FromStackMulti, IntoStackMulti},
    runtime::State,
    Result,
};

/// The erased form of a host closure with argument list `A` and results `R`.
pub type HostClosure<A, R> = Box<dyn Fn(&mut State, A) -> Result<R>>;

/// Entry point shared by every closure of signature `fn(A) -> R`.
pub fn host_thunk<A, R>(state: &mut State, erased: &dyn Any) -> Result<usize>
where
    A: FromStackMulti + 'static,
    R: IntoStackMulti + 'static,
{
    let closure = erased
        .downcast_ref::<HostClosure<A, R>>()
        .ok_or_else(thunk_mismatch::<HostClosure<A, R>>)?;

    state.set_top(A::COUNT as i32)?;
    let args = A::from_top(state)?;
    let results = closure(state, args)?;

    let depth = state.top();
    let pushed = results.push_all(state)?;
    debug_assert_eq!(pushed, R::COUNT);
    debug_assert_eq!((state.top() - depth) as usize, R::COUNT);
    Ok(R::COUNT)
}

impl State {
    /// Builds a callable for `f`, reusing the cached thunk of its signature.
    pub(crate) fn bind_closure<A, R>(&mut self, name: &str, f: HostClosure<A, R>) -> BoundCallable
    where
        A: FromStackMulti + 'static,
        R: IntoStackMulti + 'static,
    {
        let signature = Signature::of::<A, R>(A::COUNT, R::COUNT);
        let thunk = self.cached_thunk(
            TypeId::of::<fn(A) -> R>(),
            host_thunk::<A, R>,
            &signature.to_string(),
        );
        BoundCallable::new(name, thunk, Box::new(f), signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    fn closure<A: 'static, R: 'static>(
        f: impl Fn(&mut State, A) -> Result<R> + 'static,
    ) -> HostClosure<A, R> {
        Box::new(f)
    }

    #[test]
    fn test_thunk_pads_missing_arguments() {
        let mut state = State::new();
        let callable = state.bind_closure(
            "probe",
            closure(|_, (a, b): (f64, Option<f64>)| Ok(b.is_none() && a == 1.0)),
        );
        state.push(1.0).unwrap();
        assert_eq!(callable.invoke(&mut state).unwrap(), 1);
        assert!(state.read::<bool>(-1).unwrap());
    }

    #[test]
    fn test_thunk_drops_surplus_arguments() {
        let mut state = State::new();
        let callable = state.bind_closure("first", closure(|_, a: f64| Ok(a)));
        state.push(1.0).unwrap();
        state.push(2.0).unwrap();
        state.push(3.0).unwrap();
        assert_eq!(callable.invoke(&mut state).unwrap(), 1);
        assert_eq!(state.top(), 2);
        assert_eq!(state.read::<f64>(-1).unwrap(), 1.0);
    }

    #[test]
    fn test_unit_result_pushes_nothing() {
        let mut state = State::new();
        let callable = state.bind_closure("noop", closure(|_, (): ()| Ok(())));
        assert_eq!(callable.invoke(&mut state).unwrap(), 0);
        assert_eq!(state.top(), 0);
    }

    #[test]
    fn test_argument_mismatch_is_reported() {
        let mut state = State::new();
        let callable = state.bind_closure("half", closure(|_, a: f64| Ok(a / 2.0)));
        state.push("text").unwrap();
        assert!(matches!(
            callable.invoke(&mut state),
            Err(Error::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_thunks_are_cached_per_signature() {
        let mut state = State::new();
        let a = state.bind_closure("a", closure(|_, x: f64| Ok(x + 1.0)));
        let b = state.bind_closure("b", closure(|_, x: f64| Ok(x * 2.0)));
        assert_eq!(state.thunk_count(), 1);
        assert_eq!(a.thunk() as usize, b.thunk() as usize);

        state.bind_closure("c", closure(|_, (x, y): (f64, f64)| Ok(x + y)));
        assert_eq!(state.thunk_count(), 2);
        assert_eq!(a.signature().to_string(), "fn(f64) -> f64");
    }
}
