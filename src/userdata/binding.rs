//! Compiled member tables of reflected host types.
//!
//! A [`BindingBuilder`] collects the members a host type exposes; [`BindingBuilder::build`]
//! validates them and produces an immutable [`ReflectedBinding`]. Every member is compiled
//! into a type-erased entry that reads its arguments through the Stack Value Protocol, so
//! dispatch never needs to know the concrete host type.

use std::{
    any::{type_name, Any},
    collections::{BTreeMap, HashMap},
    fmt,
    marker::PhantomData,
    sync::Arc,
};

use bitflags::bitflags;

use crate::{
    marshal::{FromStack, FromStackMulti, IntoStack, IntoStackMulti},
    runtime::{Metamethod, State, Value},
    userdata::{
        opaque::{short_type_name, ErasedFinalizer, TypeTag},
        Userdata,
    },
    Result,
};

pub(crate) type Getter = Arc<dyn Fn(&mut State, &Userdata) -> Result<Value> + Send + Sync>;
pub(crate) type Setter = Arc<dyn Fn(&mut State, &Userdata, Value) -> Result<()> + Send + Sync>;
pub(crate) type MethodCall =
    Arc<dyn Fn(&mut State, Option<&Userdata>) -> Result<usize> + Send + Sync>;
pub(crate) type OperatorCall =
    Arc<dyn Fn(&mut State, &Userdata, &Userdata) -> Result<Value> + Send + Sync>;

bitflags! {
    /// Access capabilities of an exposed field.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct FieldAccess: u8 {
        /// Scripts can read the field
        const READ = 0x01;
        /// Scripts can assign the field
        const WRITE = 0x02;
        /// Scripts can read and assign the field
        const READ_WRITE = Self::READ.bits() | Self::WRITE.bits();
    }
}

/// How a method receives its instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
pub enum MethodKind {
    /// Borrows the instance immutably
    Receiver,
    /// Borrows the instance mutably
    MutReceiver,
    /// Static function, no instance
    Function,
}

/// An exposed field.
pub struct FieldBinding {
    name: String,
    access: FieldAccess,
    type_name: &'static str,
    pub(crate) getter: Option<Getter>,
    pub(crate) setter: Option<Setter>,
}

impl FieldBinding {
    /// Script-visible name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Read/write capability.
    pub fn access(&self) -> FieldAccess {
        self.access
    }

    /// Declared host type of the field.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

/// An exposed method or static function.
pub struct MethodBinding {
    name: String,
    kind: MethodKind,
    params: &'static str,
    results: &'static str,
    arity: usize,
    first_accepts_userdata: bool,
    pub(crate) call: MethodCall,
}

impl MethodBinding {
    /// Script-visible name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Calling convention.
    pub fn kind(&self) -> MethodKind {
        self.kind
    }

    /// Declared argument list type, excluding the receiver.
    pub fn params(&self) -> &'static str {
        self.params
    }

    /// Declared result list type.
    pub fn results(&self) -> &'static str {
        self.results
    }

    /// Number of declared arguments, excluding the receiver.
    pub fn arity(&self) -> usize {
        self.arity
    }

    /// Whether the first declared argument can take a userdata value.
    pub(crate) fn first_accepts_userdata(&self) -> bool {
        self.first_accepts_userdata
    }
}

/// An operator overload.
pub struct OperatorBinding {
    event: Metamethod,
    results: &'static str,
    pub(crate) call: OperatorCall,
}

impl OperatorBinding {
    /// The metatable event the operator is installed under.
    pub fn event(&self) -> Metamethod {
        self.event
    }

    /// Declared result type.
    pub fn results(&self) -> &'static str {
        self.results
    }
}

/// The compiled, immutable description of a reflected host type.
///
/// Shared by every instance of the type in every state of the process.
pub struct ReflectedBinding {
    name: String,
    tag: TypeTag,
    fields: Vec<FieldBinding>,
    methods: Vec<MethodBinding>,
    members: HashMap<String, Member>,
    operators: BTreeMap<Metamethod, OperatorBinding>,
    pub(crate) finalizer: Option<ErasedFinalizer>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Member {
    Field(usize),
    Method(usize),
}

impl ReflectedBinding {
    /// Script-visible type name, also the registry key of the type's metatable.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tag of the host type.
    pub fn tag(&self) -> TypeTag {
        self.tag
    }

    /// Exposed fields in declaration order.
    pub fn fields(&self) -> &[FieldBinding] {
        &self.fields
    }

    /// Exposed methods and static functions in declaration order.
    pub fn methods(&self) -> &[MethodBinding] {
        &self.methods
    }

    /// Declared operator overloads.
    pub fn operators(&self) -> impl Iterator<Item = &OperatorBinding> {
        self.operators.values()
    }

    /// Looks up a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldBinding> {
        match self.members.get(name) {
            Some(Member::Field(i)) => self.fields.get(*i),
            _ => None,
        }
    }

    /// Looks up a method by name.
    pub fn method(&self, name: &str) -> Option<&MethodBinding> {
        self.method_index(name).and_then(|i| self.methods.get(i))
    }

    pub(crate) fn method_index(&self, name: &str) -> Option<usize> {
        match self.members.get(name) {
            Some(Member::Method(i)) => Some(*i),
            _ => None,
        }
    }

    /// Looks up the overload installed for `event`.
    pub fn operator(&self, event: Metamethod) -> Option<&OperatorBinding> {
        self.operators.get(&event)
    }

    /// Returns `true` if a finalizer was declared.
    pub fn has_finalizer(&self) -> bool {
        self.finalizer.is_some()
    }
}

impl fmt::Debug for ReflectedBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReflectedBinding")
            .field("name", &self.name)
            .field(
                "fields",
                &self.fields.iter().map(|b| &b.name).collect::<Vec<_>>(),
            )
            .field(
                "methods",
                &self.methods.iter().map(|b| &b.name).collect::<Vec<_>>(),
            )
            .field("operators", &self.operators.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Collects the members of host type `T`.
///
/// Passed to [`UserData::register`](crate::userdata::UserData::register). Members are
/// resolved by name at dispatch time; fields shadow methods of the same name, and declaring
/// the same member twice is rejected by [`BindingBuilder::build`].
///
/// # Example
///
/// ```rust
/// use luainterop::{
///     runtime::Metamethod,
///     userdata::{BindingBuilder, UserData, Wrapped},
/// };
///
/// #[derive(Clone, Copy)]
/// struct Vector {
///     x: f64,
///     y: f64,
/// }
///
/// impl UserData for Vector {
///     fn register(b: &mut BindingBuilder<Self>) {
///         b.field("x", |v| v.x, |v, x| v.x = x)
///             .field("y", |v| v.y, |v, y| v.y = y)
///             .method("length", |v, (): ()| Ok((v.x * v.x + v.y * v.y).sqrt()))
///             .operator(Metamethod::Add, |a, b| {
///                 Ok(Wrapped(Vector { x: a.x + b.x, y: a.y + b.y }))
///             });
///     }
/// }
/// ```
pub struct BindingBuilder<T> {
    name: String,
    fields: Vec<FieldBinding>,
    methods: Vec<MethodBinding>,
    operators: Vec<OperatorBinding>,
    finalizer: Option<ErasedFinalizer>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: 'static> BindingBuilder<T> {
    /// Creates an empty builder named after `T`.
    pub fn new() -> Self {
        BindingBuilder {
            name: short_type_name(type_name::<T>()).to_string(),
            fields: Vec::new(),
            methods: Vec::new(),
            operators: Vec::new(),
            finalizer: None,
            _marker: PhantomData,
        }
    }

    /// Overrides the script-visible type name.
    pub fn name(&mut self, name: &str) -> &mut Self {
        self.name = name.to_string();
        self
    }

    fn push_field(
        &mut self,
        name: &str,
        type_name: &'static str,
        getter: Option<Getter>,
        setter: Option<Setter>,
    ) -> &mut Self {
        let mut access = FieldAccess::empty();
        access.set(FieldAccess::READ, getter.is_some());
        access.set(FieldAccess::WRITE, setter.is_some());
        self.fields.push(FieldBinding {
            name: name.to_string(),
            access,
            type_name,
            getter,
            setter,
        });
        self
    }

    /// Exposes a readable and assignable field.
    pub fn field<V, G, S>(&mut self, name: &str, getter: G, setter: S) -> &mut Self
    where
        V: IntoStack + FromStack + 'static,
        G: Fn(&T) -> V + Send + Sync + 'static,
        S: Fn(&mut T, V) + Send + Sync + 'static,
    {
        self.push_field(
            name,
            type_name::<V>(),
            Some(compile_getter(getter)),
            Some(compile_setter(setter)),
        )
    }

    /// Exposes a field scripts can read but not assign.
    pub fn field_readonly<V, G>(&mut self, name: &str, getter: G) -> &mut Self
    where
        V: IntoStack + 'static,
        G: Fn(&T) -> V + Send + Sync + 'static,
    {
        self.push_field(name, type_name::<V>(), Some(compile_getter(getter)), None)
    }

    /// Exposes a field scripts can assign but not read.
    pub fn field_writeonly<V, S>(&mut self, name: &str, setter: S) -> &mut Self
    where
        V: FromStack + 'static,
        S: Fn(&mut T, V) + Send + Sync + 'static,
    {
        self.push_field(name, type_name::<V>(), None, Some(compile_setter(setter)))
    }

    fn push_method<A, R>(&mut self, name: &str, kind: MethodKind, call: MethodCall) -> &mut Self
    where
        A: FromStackMulti,
        R: IntoStackMulti,
    {
        self.methods.push(MethodBinding {
            name: name.to_string(),
            kind,
            params: type_name::<A>(),
            results: type_name::<R>(),
            arity: A::COUNT,
            first_accepts_userdata: A::FIRST_ACCEPTS_USERDATA,
            call,
        });
        self
    }

    /// Exposes a method borrowing the instance immutably.
    ///
    /// Scripts may call it as `obj:name(args)` or `obj.name(args)`.
    pub fn method<A, R, F>(&mut self, name: &str, f: F) -> &mut Self
    where
        A: FromStackMulti + 'static,
        R: IntoStackMulti + 'static,
        F: Fn(&T, A) -> Result<R> + Send + Sync + 'static,
    {
        let call: MethodCall = Arc::new(move |state: &mut State, receiver: Option<&Userdata>| {
            let receiver = receiver.ok_or_else(|| missing_receiver::<T>())?;
            state.set_top(A::COUNT as i32)?;
            let args = A::from_top(state)?;
            let results = {
                let this = receiver.borrow::<T>()?;
                f(&this, args)?
            };
            results.push_all(state)
        });
        self.push_method::<A, R>(name, MethodKind::Receiver, call)
    }

    /// Exposes a method borrowing the instance mutably.
    ///
    /// While it runs, any other access to the same instance fails with
    /// [`Error::InstanceBorrowed`](crate::Error::InstanceBorrowed).
    pub fn method_mut<A, R, F>(&mut self, name: &str, f: F) -> &mut Self
    where
        A: FromStackMulti + 'static,
        R: IntoStackMulti + 'static,
        F: Fn(&mut T, A) -> Result<R> + Send + Sync + 'static,
    {
        let call: MethodCall = Arc::new(move |state: &mut State, receiver: Option<&Userdata>| {
            let receiver = receiver.ok_or_else(|| missing_receiver::<T>())?;
            state.set_top(A::COUNT as i32)?;
            let args = A::from_top(state)?;
            let results = {
                let mut this = receiver.borrow_mut::<T>()?;
                f(&mut this, args)?
            };
            results.push_all(state)
        });
        self.push_method::<A, R>(name, MethodKind::MutReceiver, call)
    }

    /// Exposes a static function reachable through any instance.
    pub fn function<A, R, F>(&mut self, name: &str, f: F) -> &mut Self
    where
        A: FromStackMulti + 'static,
        R: IntoStackMulti + 'static,
        F: Fn(A) -> Result<R> + Send + Sync + 'static,
    {
        let call: MethodCall = Arc::new(move |state: &mut State, _: Option<&Userdata>| {
            state.set_top(A::COUNT as i32)?;
            let args = A::from_top(state)?;
            f(args)?.push_all(state)
        });
        self.push_method::<A, R>(name, MethodKind::Function, call)
    }

    /// Declares a binary operator overload.
    ///
    /// Both operands must be instances of `T`; anything else raises
    /// [`Error::UserdataTypeMismatch`](crate::Error::UserdataTypeMismatch). For comparison
    /// events the truthiness of the result is used.
    pub fn operator<R, F>(&mut self, event: Metamethod, f: F) -> &mut Self
    where
        R: IntoStack + 'static,
        F: Fn(&T, &T) -> Result<R> + Send + Sync + 'static,
    {
        let call: OperatorCall = Arc::new(move |state: &mut State, a: &Userdata, b: &Userdata| {
            let result = {
                let left = a.borrow::<T>()?;
                let right = b.borrow::<T>()?;
                f(&left, &right)?
            };
            result.into_value(state)
        });
        self.operators.push(OperatorBinding {
            event,
            results: type_name::<R>(),
            call,
        });
        self
    }

    /// Declares a unary operator overload (`Unm`, `BNot` or `Len`).
    pub fn unary_operator<R, F>(&mut self, event: Metamethod, f: F) -> &mut Self
    where
        R: IntoStack + 'static,
        F: Fn(&T) -> Result<R> + Send + Sync + 'static,
    {
        let call: OperatorCall = Arc::new(move |state: &mut State, a: &Userdata, _: &Userdata| {
            let result = {
                let operand = a.borrow::<T>()?;
                f(&operand)?
            };
            result.into_value(state)
        });
        self.operators.push(OperatorBinding {
            event,
            results: type_name::<R>(),
            call,
        });
        self
    }

    /// Registers a hook run when a userdata that exclusively owns its object is released.
    pub fn finalizer<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&mut T) + Send + Sync + 'static,
    {
        self.finalizer = Some(Arc::new(move |data: &dyn Any| {
            if let Some(cell) = data.downcast_ref::<std::cell::RefCell<T>>() {
                if let Ok(mut value) = cell.try_borrow_mut() {
                    f(&mut value);
                }
            }
        }));
        self
    }

    /// Validates the declared members and compiles the binding.
    ///
    /// # Errors
    ///
    /// Returns a runtime error if a member name is declared twice, or an operator is declared
    /// for an event of the wrong arity.
    pub fn build(self) -> Result<ReflectedBinding> {
        let mut members = HashMap::with_capacity(self.fields.len() + self.methods.len());
        for (i, field) in self.fields.iter().enumerate() {
            if members.insert(field.name.clone(), Member::Field(i)).is_some() {
                return Err(runtime_error!(
                    "duplicate member '{}' in binding for {}",
                    field.name,
                    self.name
                ));
            }
        }
        for (i, method) in self.methods.iter().enumerate() {
            if members.insert(method.name.clone(), Member::Method(i)).is_some() {
                return Err(runtime_error!(
                    "duplicate member '{}' in binding for {}",
                    method.name,
                    self.name
                ));
            }
        }

        let mut operators = BTreeMap::new();
        for operator in self.operators {
            let event = operator.event;
            if !event.is_binary_operator() && !event.is_unary_operator() {
                return Err(runtime_error!(
                    "'{}' is not an overloadable operator (binding for {})",
                    event,
                    self.name
                ));
            }
            if operators.insert(event, operator).is_some() {
                return Err(runtime_error!(
                    "operator '{}' declared twice in binding for {}",
                    event,
                    self.name
                ));
            }
        }

        Ok(ReflectedBinding {
            name: self.name,
            tag: TypeTag::of::<T>(),
            fields: self.fields,
            methods: self.methods,
            members,
            operators,
            finalizer: self.finalizer,
        })
    }
}

impl<T: 'static> Default for BindingBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn compile_getter<T, V, G>(getter: G) -> Getter
where
    T: 'static,
    V: IntoStack + 'static,
    G: Fn(&T) -> V + Send + Sync + 'static,
{
    Arc::new(move |state: &mut State, instance: &Userdata| {
        let value = {
            let this = instance.borrow::<T>()?;
            getter(&this)
        };
        value.into_value(state)
    })
}

fn compile_setter<T, V, S>(setter: S) -> Setter
where
    T: 'static,
    V: FromStack + 'static,
    S: Fn(&mut T, V) + Send + Sync + 'static,
{
    Arc::new(move |state: &mut State, instance: &Userdata, value: Value| {
        let value = V::from_value(value, state)?;
        let mut this = instance.borrow_mut::<T>()?;
        setter(&mut this, value);
        Ok(())
    })
}

fn missing_receiver<T>() -> crate::Error {
    runtime_error!(
        "method of {} called without an instance",
        short_type_name(type_name::<T>())
    )
}
