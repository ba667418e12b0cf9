//! # luainterop Prelude
//!
//! The types and traits needed by most embeddings: the runtime state, the marshaling
//! traits, callables, containers and the userdata API.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all luainterop operations
pub use crate::Error;

/// The result type used throughout luainterop
pub use crate::Result;

/// Per-state configuration
pub use crate::config::{InteropConfig, Libraries, MissingMemberPolicy};

// ================================================================================================
// Runtime
// ================================================================================================

/// The runtime instance and its call primitives
pub use crate::runtime::{CallStatus, State, MULTRET};

/// Slot values, tables and operator tags
pub use crate::runtime::{ArithOp, CompareOp, Metamethod, Table, TableRef, Value, ValueKind};

// ================================================================================================
// Stack Value Protocol
// ================================================================================================

/// Single- and multi-slot conversions
pub use crate::marshal::{FromStack, FromStackMulti, IntoStack, IntoStackMulti};

/// Owned host-side snapshots of runtime values
pub use crate::marshal::{HostKey, HostMap, HostValue};

// ================================================================================================
// Callables and Containers
// ================================================================================================

/// Host callables and script functions
pub use crate::function::{BoundCallable, NativeFn, ScriptFunction, Signature};

/// Live table views
pub use crate::container::{ContainerView, Pairs};

// ================================================================================================
// Userdata
// ================================================================================================

/// Reflected host types
pub use crate::userdata::{BindingBuilder, ReflectedBinding, UserData, Wrapped};

/// Opaque and shared host objects
pub use crate::userdata::{HostRef, LightUserdata, Userdata};
