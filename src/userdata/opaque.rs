//! Opaque userdata: host objects carried through scripts untouched.

use std::{
    any::{type_name, Any, TypeId},
    cell::{Ref, RefCell, RefMut},
    fmt,
    rc::Rc,
    sync::Arc,
};

use crate::{
    marshal::{FromStack, IntoStack},
    runtime::{State, TableRef, Value, ValueKind},
    Error, Result,
};

/// Finalizer over an erased `RefCell<T>`.
pub(crate) type ErasedFinalizer = Arc<dyn Fn(&dyn Any) + Send + Sync>;

/// Identifies the host type stored in a userdata.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TypeTag {
    id: TypeId,
    name: &'static str,
}

impl TypeTag {
    /// The tag of host type `T`.
    pub fn of<T: 'static>() -> Self {
        TypeTag {
            id: TypeId::of::<T>(),
            name: short_type_name(type_name::<T>()),
        }
    }

    /// Type identity of the host type.
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Unqualified name of the host type.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Strips the module path from a type name, keeping generic arguments intact.
pub(crate) fn short_type_name(full: &'static str) -> &'static str {
    let head = match full.find('<') {
        Some(generic) => &full[..generic],
        None => full,
    };
    match head.rfind("::") {
        Some(separator) => &full[separator + 2..],
        None => full,
    }
}

/// A shared handle to a host object.
///
/// Pushing a `HostRef` and reading it back yields a handle to the same object;
/// [`HostRef::ptr_eq`] is the identity test. Changes made through any handle are visible
/// through all of them.
pub struct HostRef<T>(Rc<RefCell<T>>);

impl<T: 'static> HostRef<T> {
    /// Moves `value` into a new shared handle.
    pub fn new(value: T) -> Self {
        HostRef(Rc::new(RefCell::new(value)))
    }

    /// Borrows the object.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InstanceBorrowed`] if the object is mutably borrowed.
    pub fn borrow(&self) -> Result<Ref<'_, T>> {
        self.0.try_borrow().map_err(|_| borrowed::<T>())
    }

    /// Mutably borrows the object.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InstanceBorrowed`] if the object is already borrowed.
    pub fn borrow_mut(&self) -> Result<RefMut<'_, T>> {
        self.0.try_borrow_mut().map_err(|_| borrowed::<T>())
    }

    /// Returns `true` if both handles point at the same object.
    pub fn ptr_eq(&self, other: &HostRef<T>) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Number of handles (including userdata) sharing the object.
    pub fn share_count(&self) -> usize {
        Rc::strong_count(&self.0)
    }
}

impl<T> Clone for HostRef<T> {
    fn clone(&self) -> Self {
        HostRef(self.0.clone())
    }
}

impl<T: fmt::Debug> fmt::Debug for HostRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_borrow() {
            Ok(value) => f.debug_tuple("HostRef").field(&*value).finish(),
            Err(_) => f.write_str("HostRef(<borrowed>)"),
        }
    }
}

fn borrowed<T>() -> Error {
    Error::InstanceBorrowed {
        type_name: short_type_name(type_name::<T>()).to_string(),
    }
}

/// A host object stored in a userdata value.
///
/// The object lives in an `Rc<RefCell<T>>` that may be shared with [`HostRef`] handles on the
/// host side. Retrieval is checked against the stored [`TypeTag`].
pub struct Userdata {
    tag: TypeTag,
    data: Rc<dyn Any>,
    metatable: RefCell<Option<TableRef>>,
    finalizer: Option<ErasedFinalizer>,
}

impl Userdata {
    /// Wraps a host object the userdata owns exclusively.
    pub fn new<T: 'static>(value: T) -> Self {
        Self::from_shared(HostRef::new(value))
    }

    /// Wraps a host object shared with `host`.
    pub fn from_shared<T: 'static>(host: HostRef<T>) -> Self {
        Userdata {
            tag: TypeTag::of::<T>(),
            data: host.0,
            metatable: RefCell::new(None),
            finalizer: None,
        }
    }

    pub(crate) fn with_finalizer(mut self, finalizer: Option<ErasedFinalizer>) -> Self {
        self.finalizer = finalizer;
        self
    }

    /// The stored type tag.
    pub fn tag(&self) -> TypeTag {
        self.tag
    }

    /// Unqualified name of the stored host type.
    pub fn type_name(&self) -> &'static str {
        self.tag.name
    }

    /// Returns `true` if the userdata holds a `T`.
    pub fn is<T: 'static>(&self) -> bool {
        self.tag.id == TypeId::of::<T>()
    }

    fn cell<T: 'static>(&self) -> Result<&RefCell<T>> {
        self.data
            .downcast_ref::<RefCell<T>>()
            .ok_or_else(|| Error::UserdataTypeMismatch {
                expected: short_type_name(type_name::<T>()).to_string(),
                found: self.tag.name.to_string(),
            })
    }

    /// Returns a shared handle to the stored object.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UserdataTypeMismatch`] if the userdata does not hold a `T`.
    pub fn host_ref<T: 'static>(&self) -> Result<HostRef<T>> {
        self.cell::<T>()?;
        match self.data.clone().downcast::<RefCell<T>>() {
            Ok(rc) => Ok(HostRef(rc)),
            Err(_) => Err(Error::UserdataTypeMismatch {
                expected: short_type_name(type_name::<T>()).to_string(),
                found: self.tag.name.to_string(),
            }),
        }
    }

    /// Borrows the stored object.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UserdataTypeMismatch`] for the wrong `T`, or
    /// [`Error::InstanceBorrowed`] if the object is mutably borrowed.
    pub fn borrow<T: 'static>(&self) -> Result<Ref<'_, T>> {
        self.cell::<T>()?.try_borrow().map_err(|_| borrowed::<T>())
    }

    /// Mutably borrows the stored object.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UserdataTypeMismatch`] for the wrong `T`, or
    /// [`Error::InstanceBorrowed`] if the object is already borrowed.
    pub fn borrow_mut<T: 'static>(&self) -> Result<RefMut<'_, T>> {
        self.cell::<T>()?.try_borrow_mut().map_err(|_| borrowed::<T>())
    }

    /// The metatable of this userdata.
    pub fn metatable(&self) -> Option<TableRef> {
        self.metatable.borrow().clone()
    }

    /// Replaces the metatable of this userdata.
    pub fn set_metatable(&self, metatable: Option<TableRef>) {
        *self.metatable.borrow_mut() = metatable;
    }
}

impl Drop for Userdata {
    fn drop(&mut self) {
        if let Some(finalizer) = &self.finalizer {
            if Rc::strong_count(&self.data) == 1 {
                finalizer(&*self.data);
            }
        }
    }
}

impl fmt::Debug for Userdata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Userdata")
            .field("type", &self.tag.name)
            .field("metatable", &self.metatable.borrow().is_some())
            .finish()
    }
}

/// A bare address passed through scripts as light userdata.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LightUserdata(pub usize);

impl IntoStack for LightUserdata {
    fn into_value(self, _: &mut State) -> Result<Value> {
        Ok(Value::LightUserdata(self.0))
    }
}

impl FromStack for LightUserdata {
    fn from_value(value: Value, _: &State) -> Result<Self> {
        match value {
            Value::LightUserdata(address) => Ok(LightUserdata(address)),
            other => Err(Error::TypeMismatch {
                expected: ValueKind::LightUserdata,
                found: other.kind(),
            }),
        }
    }
}

impl<T: 'static> IntoStack for HostRef<T> {
    fn into_value(self, _: &mut State) -> Result<Value> {
        Ok(Value::Userdata(Rc::new(Userdata::from_shared(self))))
    }
}

impl<T: 'static> IntoStack for &HostRef<T> {
    fn into_value(self, _: &mut State) -> Result<Value> {
        Ok(Value::Userdata(Rc::new(Userdata::from_shared(self.clone()))))
    }
}

impl<T: 'static> FromStack for HostRef<T> {
    const ACCEPTS_USERDATA: bool = true;

    fn from_value(value: Value, _: &State) -> Result<Self> {
        match value {
            Value::Userdata(ud) => ud.host_ref(),
            other => Err(Error::TypeMismatch {
                expected: ValueKind::Userdata,
                found: other.kind(),
            }),
        }
    }
}

impl IntoStack for Rc<Userdata> {
    fn into_value(self, _: &mut State) -> Result<Value> {
        Ok(Value::Userdata(self))
    }
}

impl FromStack for Rc<Userdata> {
    const ACCEPTS_USERDATA: bool = true;

    fn from_value(value: Value, _: &State) -> Result<Self> {
        match value {
            Value::Userdata(ud) => Ok(ud),
            other => Err(Error::TypeMismatch {
                expected: ValueKind::Userdata,
                found: other.kind(),
            }),
        }
    }
}

impl State {
    /// Allocates a userdata holding `value` with no metatable and pushes it.
    ///
    /// The result is an opaque value: scripts can store and pass it around but cannot index
    /// it or call methods on it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StackOverflow`] if the stack is full.
    pub fn new_userdata<T: 'static>(&mut self, value: T) -> Result<Rc<Userdata>> {
        let userdata = Rc::new(Userdata::new(value));
        self.push_value(Value::Userdata(userdata.clone()))?;
        Ok(userdata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Handle(u32);

    #[test]
    fn test_short_type_name() {
        assert_eq!(short_type_name("crate::module::Vector"), "Vector");
        assert_eq!(short_type_name("Vector"), "Vector");
        assert_eq!(
            short_type_name("alloc::vec::Vec<core::option::Option<u8>>"),
            "Vec<core::option::Option<u8>>"
        );
        assert_eq!(TypeTag::of::<Handle>().name(), "Handle");
    }

    #[test]
    fn test_opaque_identity_round_trip() {
        let mut state = State::new();
        let original = HostRef::new(Handle(7));
        state.push(&original).unwrap();
        let back: HostRef<Handle> = state.read(-1).unwrap();
        assert!(back.ptr_eq(&original));
        back.borrow_mut().unwrap().0 = 8;
        assert_eq!(*original.borrow().unwrap(), Handle(8));
    }

    #[test]
    fn test_wrong_type_is_rejected() {
        let mut state = State::new();
        state.push(HostRef::new(Handle(1))).unwrap();
        assert_eq!(
            state.read::<HostRef<String>>(-1).unwrap_err(),
            Error::UserdataTypeMismatch {
                expected: "String".to_string(),
                found: "Handle".to_string()
            }
        );
        state.push(1.0).unwrap();
        assert!(matches!(
            state.read::<HostRef<Handle>>(-1),
            Err(Error::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_borrow_conflict() {
        let userdata = Userdata::new(Handle(1));
        let guard = userdata.borrow_mut::<Handle>().unwrap();
        assert_eq!(
            userdata.borrow::<Handle>().unwrap_err(),
            Error::InstanceBorrowed {
                type_name: "Handle".to_string()
            }
        );
        drop(guard);
        assert!(userdata.borrow::<Handle>().is_ok());
    }

    #[test]
    fn test_new_userdata_has_no_metatable() {
        let mut state = State::new();
        let userdata = state.new_userdata(Handle(3)).unwrap();
        assert!(userdata.metatable().is_none());
        assert!(userdata.is::<Handle>());
        assert_eq!(state.kind(-1).unwrap(), ValueKind::Userdata);
        assert!(!state.get_metatable(-1).unwrap());
    }

    #[test]
    fn test_light_userdata_round_trip() {
        let mut state = State::new();
        state.push(LightUserdata(0xdead)).unwrap();
        assert_eq!(state.kind(-1).unwrap(), ValueKind::LightUserdata);
        assert_eq!(state.read::<LightUserdata>(-1).unwrap(), LightUserdata(0xdead));
        assert!(state.get_field(-1, "x").is_err());
    }

    #[test]
    fn test_finalizer_runs_only_for_exclusive_owner() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        static RUNS: AtomicUsize = AtomicUsize::new(0);
        let finalizer: ErasedFinalizer = Arc::new(|_: &dyn Any| {
            RUNS.fetch_add(1, Ordering::SeqCst);
        });

        let shared = HostRef::new(Handle(1));
        drop(Userdata::from_shared(shared.clone()).with_finalizer(Some(finalizer.clone())));
        assert_eq!(RUNS.load(Ordering::SeqCst), 0);

        drop(Userdata::new(Handle(2)).with_finalizer(Some(finalizer)));
        assert_eq!(RUNS.load(Ordering::SeqCst), 1);
    }
}
