//! Object Wrapper: host objects as userdata.
//!
//! Host values reach scripts in one of two shapes:
//!
//! - **Opaque** - [`State::new_userdata`](crate::State::new_userdata) or a bare [`HostRef`]
//!   wraps any `'static` value with no metatable. Scripts can hold and pass it around but
//!   not look inside; the host gets it back through [`Userdata::borrow`] or
//!   [`Userdata::host_ref`].
//! - **Reflected** - types implementing [`UserData`] declare fields, methods and operators
//!   on a [`BindingBuilder`]. Wrapping an instance attaches a metatable that resolves member
//!   access and operators through the compiled [`ReflectedBinding`].
//!
//! # Architecture
//!
//! ```text
//! UserData::register ──> BindingBuilder ──build──> ReflectedBinding ──cache──> Arc (per process)
//!                                                                      │
//!                                          dispatch::install ─────────┘──> metatable (per state)
//! ```
//!
//! Bindings are `Send + Sync` and compiled once per type for the whole process
//! ([`binding_for`]). Metatables hold native closures bound to one state and are built
//! lazily, the first time a state wraps an instance of the type.
//!
//! # Member Resolution
//!
//! `obj.name` looks for a readable field first, then a method. A method is returned as a
//! function bound to `obj`, so `obj.m(x)` and `obj:m(x)` both work. Unknown members follow
//! the state's [`MissingMemberPolicy`](crate::MissingMemberPolicy): `nil` by default, an
//! [`Error::MemberNotFound`](crate::Error::MemberNotFound) under `RaiseError`.
//!
//! # Lifetime
//!
//! Instances are reference counted. Script copies and [`HostRef`] clones share the same
//! object; a binding's finalizer runs once the last reference is dropped.

mod binding;
mod cache;
mod dispatch;
mod instance;
mod opaque;

pub use binding::{
    BindingBuilder, FieldAccess, FieldBinding, MethodBinding, MethodKind, OperatorBinding,
    ReflectedBinding,
};
pub use cache::{binding_for, is_registered, registered_count};
pub use instance::{UserData, Wrapped};
pub use opaque::{HostRef, LightUserdata, TypeTag, Userdata};
