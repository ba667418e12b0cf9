// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]

//! # luainterop
//!
//! Typed interop between Rust and an embedded Lua-style stack runtime. The runtime exposes
//! a value stack, tables with metatables and protected calls; `luainterop` layers four
//! pieces on top of it so host code never has to juggle raw stack slots:
//!
//! - **Stack Value Protocol** ([`marshal`]) - Host values to and from stack slots
//! - **Call Thunk Generator** ([`function`]) - Rust closures as script functions, and script
//!   functions as typed host callables
//! - **Container Adapter** ([`container`]) - Tables as live host containers
//! - **Object Wrapper** ([`userdata`]) - Host objects as opaque or reflected userdata
//!
//! ## Quick Start
//!
//! ```rust
//! use luainterop::prelude::*;
//!
//! let mut state = State::new();
//! state.register("mul", |(a, b): (f64, f64)| Ok(a * b))?;
//!
//! state.get_global("mul")?;
//! let mul = state.read::<ScriptFunction>(-1)?;
//! let product: f64 = mul.call(&mut state, (5.0, 7.0))?;
//! assert_eq!(product, 35.0);
//! # Ok::<(), luainterop::Error>(())
//! ```
//!
//! ## Reflected Types
//!
//! ```rust
//! use luainterop::prelude::*;
//!
//! #[derive(Clone)]
//! struct Counter {
//!     hits: f64,
//! }
//!
//! impl UserData for Counter {
//!     fn register(b: &mut BindingBuilder<Self>) {
//!         b.field_readonly("hits", |c| c.hits)
//!             .method_mut("hit", |c, by: Option<f64>| {
//!                 c.hits += by.unwrap_or(1.0);
//!                 Ok(c.hits)
//!             });
//!     }
//! }
//!
//! let mut state = State::new();
//! let counter = HostRef::new(Counter { hits: 0.0 });
//! state.push_shared(&counter)?;
//!
//! state.get_field(-1, "hit")?;
//! state.push(2.0)?;
//! state.call(1, 1)?;
//! assert_eq!(state.read::<f64>(-1)?, 2.0);
//! assert_eq!(counter.borrow()?.hits, 2.0);
//! # Ok::<(), luainterop::Error>(())
//! ```
//!
//! ## Error Handling
//!
//! Every fallible operation returns [`Result<T>`](Result). Errors raised by host closures
//! travel through the runtime's protected calls unchanged, so a script sees a host fault
//! exactly like a script error, and the host gets the original [`Error`] variant back from
//! [`State::take_error`] or [`State::call`].
//!
//! ## Logging
//!
//! The crate logs through the [`log`] facade: binding compilation and metatable
//! installation at `debug`, individual calls at `trace`, caught host panics at `warn`.
//! Install any `log` backend to see them.

#[macro_use]
pub(crate) mod error;

/// Per-state interop configuration
pub mod config;

/// Container Adapter
pub mod container;

/// Call Thunk Generator
pub mod function;

/// Stack Value Protocol
pub mod marshal;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use luainterop::prelude::*;
///
/// let mut state = State::new();
/// state.push(HostValue::from("hello"))?;
/// assert_eq!(state.read::<String>(-1)?, "hello");
/// # Ok::<(), luainterop::Error>(())
/// ```
pub mod prelude;

/// Stack runtime
pub mod runtime;

/// Object Wrapper
pub mod userdata;

/// `luainterop` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `luainterop` Error type
///
/// The error type of every operation in this crate, and the payload of every error that
/// crosses the runtime boundary.
///
/// # Examples
///
/// ```rust
/// use luainterop::{Error, State};
///
/// let mut state = State::new();
/// state.push(1.5)?;
/// match state.read::<String>(-1) {
///     Err(Error::TypeMismatch { expected, found }) => {
///         assert_eq!(expected.to_string(), "string");
///         assert_eq!(found.to_string(), "number");
///     }
///     other => panic!("unexpected {:?}", other),
/// }
/// # Ok::<(), luainterop::Error>(())
/// ```
pub use error::Error;

pub use config::{InteropConfig, Libraries, MissingMemberPolicy};
pub use runtime::{CallStatus, State, MULTRET};
