//! Minimal stack runtime the interop layer builds on.
//!
//! This module provides the runtime collaborator the rest of the crate talks to: a single
//! evaluation stack, tables with metatables, a registry, a globals table, native functions
//! and protected calls. It implements the reference runtime's C API semantics but no
//! language front end; "script code" is any sequence of [`State`] operations, typically
//! native functions that drive the state the way compiled script code would.
//!
//! # Architecture
//!
//! ```text
//! +---------------------------------------------------+
//! |                      State                        |
//! |  +-------------+  +-----------+  +-------------+  |
//! |  | ValueStack  |  |  globals  |  |  registry   |  |
//! |  +-------------+  +-----------+  +-------------+  |
//! |  call / pcall / next / arith / index / newindex   |
//! +---------------------------------------------------+
//!           ^                                ^
//!           | Value (Rc handles)             | metatables
//!     Table (array + ordered hash)      Metamethod events
//! ```
//!
//! # Key Components
//!
//! - [`State`] - Runtime instance: stack addressing, calls, operators, metatables
//! - [`ValueStack`] - Bounded evaluation stack
//! - [`Value`] / [`ValueKind`] - Tagged slot values and their kind tags
//! - [`Table`] / [`TableRef`] - The associative container and its shared handle
//! - [`Metamethod`], [`ArithOp`], [`CompareOp`] - Operator and event tags

mod metamethod;
mod stack;
mod state;
mod table;
mod value;

pub use metamethod::{ArithOp, CompareOp, Metamethod};
pub use stack::ValueStack;
pub use state::{CallStatus, State, MULTRET};
pub use table::{Table, TableRef};
pub use value::{Value, ValueKind};

pub(crate) use value::format_number;
