//! Reflected instances: host objects whose members scripts can reach.

use std::{rc::Rc, sync::Arc};

use crate::{
    marshal::{FromStack, IntoStack},
    runtime::{State, Value, ValueKind},
    userdata::{binding_for, dispatch, BindingBuilder, HostRef, ReflectedBinding, Userdata},
    Error, Result,
};

/// A host type whose fields, methods and operators are exposed to scripts.
///
/// `register` runs once per process, the first time the type is wrapped; the compiled
/// binding is cached and shared by every [`State`].
pub trait UserData: Sized + 'static {
    /// Declares the members of `Self`.
    fn register(b: &mut BindingBuilder<Self>);
}

impl State {
    /// Compiles the binding of `T` (if needed) and installs its metatable in this state.
    ///
    /// Wrapping an instance does this implicitly; calling it up front surfaces binding
    /// errors early and lets scripts find the metatable in the registry under the type name.
    ///
    /// # Errors
    ///
    /// Returns the validation error of [`BindingBuilder::build`] for an invalid binding.
    pub fn register_type<T: UserData>(&mut self) -> Result<Arc<ReflectedBinding>> {
        let binding = binding_for::<T>()?;
        dispatch::install(self, &binding)?;
        Ok(binding)
    }

    /// Wraps `value` as a reflected instance and pushes it.
    ///
    /// The instance owns `value`; the binding's finalizer runs when the last reference to
    /// it is released.
    ///
    /// # Errors
    ///
    /// Returns a binding validation error, or [`Error::StackOverflow`] if the stack is full.
    pub fn new_instance<T: UserData>(&mut self, value: T) -> Result<Rc<Userdata>> {
        let userdata = wrap(self, HostRef::new(value))?;
        self.push_value(Value::Userdata(userdata.clone()))?;
        Ok(userdata)
    }

    /// Pushes a reflected instance sharing `host` with the caller.
    ///
    /// Script writes through the instance are visible through `host` and vice versa. The
    /// finalizer does not run while the host still holds a reference.
    ///
    /// # Errors
    ///
    /// Same as [`State::new_instance`].
    pub fn push_shared<T: UserData>(&mut self, host: &HostRef<T>) -> Result<Rc<Userdata>> {
        let userdata = wrap(self, host.clone())?;
        self.push_value(Value::Userdata(userdata.clone()))?;
        Ok(userdata)
    }
}

fn wrap<T: UserData>(state: &mut State, host: HostRef<T>) -> Result<Rc<Userdata>> {
    let binding = binding_for::<T>()?;
    let metatable = dispatch::install(state, &binding)?;
    let userdata = Userdata::from_shared(host).with_finalizer(binding.finalizer.clone());
    userdata.set_metatable(Some(metatable));
    Ok(Rc::new(userdata))
}

/// Marshals a [`UserData`] value by wrapping it as a reflected instance.
///
/// Use it as a return type to hand new host objects to scripts, and as an argument or
/// result type to copy one back out.
///
/// ```rust
/// use luainterop::{
///     userdata::{BindingBuilder, UserData, Wrapped},
///     State,
/// };
///
/// #[derive(Clone)]
/// struct Point(f64);
///
/// impl UserData for Point {
///     fn register(b: &mut BindingBuilder<Self>) {
///         b.field_readonly("x", |p| p.0)
///             .method("moved", |p, dx: f64| Ok(Wrapped(Point(p.0 + dx))));
///     }
/// }
///
/// let mut state = State::new();
/// state.push(Wrapped(Point(1.0)))?;
/// let moved = state.read::<Wrapped<Point>>(-1)?;
/// assert_eq!(moved.0 .0, 1.0);
/// # Ok::<(), luainterop::Error>(())
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Wrapped<T>(pub T);

impl<T: UserData> IntoStack for Wrapped<T> {
    fn into_value(self, state: &mut State) -> Result<Value> {
        Ok(Value::Userdata(wrap(state, HostRef::new(self.0))?))
    }
}

impl<T: UserData + Clone> FromStack for Wrapped<T> {
    const ACCEPTS_USERDATA: bool = true;

    fn from_value(value: Value, _: &State) -> Result<Self> {
        match value {
            Value::Userdata(ud) => Ok(Wrapped(ud.borrow::<T>()?.clone())),
            other => Err(Error::TypeMismatch {
                expected: ValueKind::Userdata,
                found: other.kind(),
            }),
        }
    }
}
