//! The runtime instance.
//!
//! [`State`] owns one [`ValueStack`], a globals table, a registry table and the per-state
//! caches of the interop layer (type metatables and the thunk table). Every interaction
//! between host code and script values goes through it.
//!
//! # Indices
//!
//! Stack indices follow the reference runtime's C API:
//!
//! ```text
//!            +----------+
//!   -1  ---> |  top     |   <- negative indices count from the top
//!   -2  ---> |  ...     |
//!            |  arg 2   |   <--  2
//!            |  arg 1   |   <--  1   positive indices count from the frame base
//!            +----------+
//!            | function |   (not addressable from inside the call)
//! ```
//!
//! Index `0` is never valid. Inside a native function, index `1` is its first argument.
//!
//! # Calls
//!
//! [`State::call`] and [`State::pcall`] call the value sitting below `nargs` arguments.
//! After the callee returns `n`, its top `n` values replace the function slot and the
//! arguments, adjusted to the requested result count. A callee reporting more results than
//! its frame holds is a broken stack discipline and aborts.
//!
//! Errors travel as [`Err`] values. [`State::pcall`] catches them, restores the stack to the
//! function slot and pushes the error message; [`State::call`] restores the stack the same
//! way and hands the error back to the host.
//!
//! # Thread Safety
//!
//! `State` is `!Send`: values are reference-counted without atomics. Independent states can
//! live on separate threads; the only process-wide data they share is the reflected binding
//! cache, which is synchronized on its own.

use std::{
    any::TypeId,
    collections::{HashMap, HashSet},
    fmt,
    rc::Rc,
};

use crate::{
    config::{InteropConfig, MissingMemberPolicy},
    function::Thunk,
    marshal::{FromStack, IntoStack},
    runtime::{
        value::format_number, ArithOp, CompareOp, Metamethod, Table, TableRef, Value, ValueKind,
        ValueStack,
    },
    Error, Result,
};

/// Requests every result of a call.
pub const MULTRET: i32 = -1;

/// Maximum length of an `__index`/`__newindex` chain before it is treated as a loop.
const MAX_META_CHAIN: usize = 100;

/// Outcome of a protected call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
pub enum CallStatus {
    /// The call completed; its results are on the stack.
    Ok,
    /// The call raised an error; the message is on the stack.
    RuntimeError,
    /// The call overflowed the stack or the call depth; the message is on the stack.
    MemoryError,
}

/// A runtime instance with its evaluation stack.
///
/// # Example
///
/// ```rust
/// use luainterop::State;
///
/// let mut state = State::new();
/// state.push(10.0)?;
/// state.push(5.0)?;
/// state.arith(luainterop::runtime::ArithOp::Sub)?;
/// assert_eq!(state.read::<f64>(-1)?, 5.0);
/// # Ok::<(), luainterop::Error>(())
/// ```
pub struct State {
    stack: ValueStack,
    base: usize,
    call_depth: usize,
    globals: TableRef,
    registry: TableRef,
    type_metatables: HashMap<TypeId, TableRef>,
    thunks: HashMap<TypeId, Thunk>,
    last_error: Option<Error>,
    config: InteropConfig,
}

impl State {
    /// Creates a state with the default configuration.
    pub fn new() -> Self {
        Self::with_config(InteropConfig::default())
    }

    /// Creates a state with the given configuration.
    pub fn with_config(config: InteropConfig) -> Self {
        let globals = TableRef::default();
        globals.borrow_mut().set_str("_G", Value::Table(globals.clone()));
        let registry = TableRef::default();
        registry
            .borrow_mut()
            .set_str("_G", Value::Table(globals.clone()));

        State {
            stack: ValueStack::new(config.max_stack_depth),
            base: 0,
            call_depth: 0,
            globals,
            registry,
            type_metatables: HashMap::new(),
            thunks: HashMap::new(),
            last_error: None,
            config,
        }
    }

    /// Returns the configuration of this state.
    pub fn config(&self) -> &InteropConfig {
        &self.config
    }

    /// Returns the active missing-member policy.
    pub fn missing_member_policy(&self) -> MissingMemberPolicy {
        self.config.missing_member
    }

    /// Changes the missing-member policy for subsequent lookups.
    pub fn set_missing_member_policy(&mut self, policy: MissingMemberPolicy) {
        self.config.missing_member = policy;
    }

    /// Returns the globals table.
    pub fn globals(&self) -> TableRef {
        self.globals.clone()
    }

    /// Returns the registry table.
    pub fn registry(&self) -> TableRef {
        self.registry.clone()
    }

    /// Current native call nesting.
    pub fn call_depth(&self) -> usize {
        self.call_depth
    }

    // --------------------------------------------------------------------------------------
    // Stack addressing
    // --------------------------------------------------------------------------------------

    /// Number of values in the current frame.
    pub fn top(&self) -> i32 {
        (self.stack.len() - self.base) as i32
    }

    /// Sets the frame size: grows with nils or drops values from the top.
    ///
    /// A negative index is relative to the current top, so `set_top(-2)` pops one value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIndex`] for a negative index below the frame, or
    /// [`Error::StackOverflow`] if growing exceeds the stack limit.
    pub fn set_top(&mut self, index: i32) -> Result<()> {
        let len = if index >= 0 {
            self.base + index as usize
        } else {
            self.position(index)? + 1
        };
        if len < self.stack.len() {
            self.stack.truncate(len);
            Ok(())
        } else {
            self.stack.extend_to(len)
        }
    }

    /// Converts `index` into an equivalent positive (frame-relative) index.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIndex`] if `index` does not address a slot.
    pub fn absolute(&self, index: i32) -> Result<i32> {
        Ok((self.position(index)? - self.base + 1) as i32)
    }

    fn position(&self, index: i32) -> Result<usize> {
        let top = self.stack.len();
        if index > 0 {
            let position = self.base + index as usize - 1;
            if position < top {
                return Ok(position);
            }
        } else if index < 0 {
            let back = index.unsigned_abs() as usize;
            if back <= top - self.base {
                return Ok(top - back);
            }
        }
        Err(Error::InvalidIndex { index })
    }

    /// Returns a copy of the value at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIndex`] if `index` does not address a slot.
    pub fn value(&self, index: i32) -> Result<Value> {
        let position = self.position(index)?;
        self.stack.get(position).cloned()
    }

    /// Returns the kind of the value at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIndex`] if `index` does not address a slot.
    pub fn kind(&self, index: i32) -> Result<ValueKind> {
        let position = self.position(index)?;
        Ok(self.stack.get(position)?.kind())
    }

    /// Returns argument `n` (1-based) of the current frame, or nil if it was not passed.
    pub fn arg(&self, n: usize) -> Value {
        if n == 0 {
            return Value::Nil;
        }
        self.stack
            .get(self.base + n - 1)
            .cloned()
            .unwrap_or(Value::Nil)
    }

    // --------------------------------------------------------------------------------------
    // Push / pop
    // --------------------------------------------------------------------------------------

    /// Pushes a raw value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StackOverflow`] if the stack is full.
    pub fn push_value(&mut self, value: Value) -> Result<()> {
        self.stack.push(value)
    }

    /// Encodes a host value through the Stack Value Protocol and pushes it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StackOverflow`] if the stack is full.
    pub fn push<T: IntoStack>(&mut self, value: T) -> Result<()> {
        let value = value.into_value(self)?;
        self.stack.push(value)
    }

    /// Pushes nil.
    pub fn push_nil(&mut self) -> Result<()> {
        self.stack.push(Value::Nil)
    }

    /// Pushes a number.
    pub fn push_number(&mut self, value: f64) -> Result<()> {
        self.stack.push(Value::Number(value))
    }

    /// Pushes a copy of a string.
    pub fn push_string(&mut self, value: &str) -> Result<()> {
        self.stack.push(Value::string(value))
    }

    /// Pushes a boolean.
    pub fn push_boolean(&mut self, value: bool) -> Result<()> {
        self.stack.push(Value::Boolean(value))
    }

    /// Pushes a light userdata carrying a bare address.
    pub fn push_light_userdata(&mut self, address: usize) -> Result<()> {
        self.stack.push(Value::LightUserdata(address))
    }

    /// Decodes the value at `index` through the Stack Value Protocol.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIndex`] if `index` does not address a slot, or the decoding
    /// error of `T` (usually [`Error::TypeMismatch`]).
    pub fn read<T: FromStack>(&self, index: i32) -> Result<T> {
        T::from_stack(self, index)
    }

    /// Pops `n` values.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StackUnderflow`] if the frame holds fewer than `n` values.
    pub fn pop(&mut self, n: usize) -> Result<()> {
        if n > self.stack.len() - self.base {
            return Err(Error::StackUnderflow);
        }
        self.stack.truncate(self.stack.len() - n);
        Ok(())
    }

    /// Pops and returns the top value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StackUnderflow`] if the frame is empty.
    pub fn pop_value(&mut self) -> Result<Value> {
        if self.stack.len() <= self.base {
            return Err(Error::StackUnderflow);
        }
        self.stack.pop()
    }

    /// Pushes a copy of the value at `index`.
    pub fn push_copy(&mut self, index: i32) -> Result<()> {
        let value = self.value(index)?;
        self.stack.push(value)
    }

    /// Moves the top value into `index`, shifting the values above it up.
    pub fn insert(&mut self, index: i32) -> Result<()> {
        let position = self.position(index)?;
        let value = self.pop_value()?;
        self.stack.insert(position, value)
    }

    /// Removes the value at `index`, shifting the values above it down.
    pub fn remove(&mut self, index: i32) -> Result<()> {
        let position = self.position(index)?;
        self.stack.remove(position).map(|_| ())
    }

    /// Pops the top value and stores it at `index`.
    pub fn replace(&mut self, index: i32) -> Result<()> {
        let position = self.position(index)?;
        let value = self.pop_value()?;
        if position >= self.stack.len() {
            // index addressed the popped slot itself
            return self.stack.push(value);
        }
        self.stack.set(position, value)
    }

    // --------------------------------------------------------------------------------------
    // Tables
    // --------------------------------------------------------------------------------------

    /// Creates a table sized for `narr` sequential and `nrec` keyed entries and pushes it.
    pub fn new_table(&mut self, narr: usize, nrec: usize) -> Result<TableRef> {
        let table = TableRef::new(Table::with_capacity(narr, nrec));
        self.stack.push(Value::Table(table.clone()))?;
        Ok(table)
    }

    /// Returns the table at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeMismatch`] if the value is not a table.
    pub fn table_at(&self, index: i32) -> Result<TableRef> {
        match self.value(index)? {
            Value::Table(t) => Ok(t),
            other => Err(Error::TypeMismatch {
                expected: ValueKind::Table,
                found: other.kind(),
            }),
        }
    }

    /// Pushes `t[name]` for the value `t` at `index`, honoring `__index`.
    pub fn get_field(&mut self, index: i32, name: &str) -> Result<ValueKind> {
        let target = self.value(index)?;
        let value = self.index_value(&target, &Value::string(name))?;
        let kind = value.kind();
        self.stack.push(value)?;
        Ok(kind)
    }

    /// Pops a value and assigns it to `t[name]` for the value `t` at `index`, honoring
    /// `__newindex`.
    pub fn set_field(&mut self, index: i32, name: &str) -> Result<()> {
        let target = self.value(index)?;
        let value = self.pop_value()?;
        self.newindex_value(&target, Value::string(name), value)
    }

    /// Pops a key and pushes `t[key]` for the value `t` at `index`, honoring `__index`.
    pub fn get_table(&mut self, index: i32) -> Result<ValueKind> {
        let target = self.value(index)?;
        let key = self.pop_value()?;
        let value = self.index_value(&target, &key)?;
        let kind = value.kind();
        self.stack.push(value)?;
        Ok(kind)
    }

    /// Pops a value and a key (value on top) and assigns `t[key] = value`, honoring
    /// `__newindex`.
    pub fn set_table(&mut self, index: i32) -> Result<()> {
        let target = self.value(index)?;
        let value = self.pop_value()?;
        let key = self.pop_value()?;
        self.newindex_value(&target, key, value)
    }

    /// Pushes `t[i]`, honoring `__index`.
    pub fn get_index(&mut self, index: i32, i: i64) -> Result<ValueKind> {
        let target = self.value(index)?;
        let value = self.index_value(&target, &Value::Number(i as f64))?;
        let kind = value.kind();
        self.stack.push(value)?;
        Ok(kind)
    }

    /// Pops a value and assigns `t[i] = value`, honoring `__newindex`.
    pub fn set_index(&mut self, index: i32, i: i64) -> Result<()> {
        let target = self.value(index)?;
        let value = self.pop_value()?;
        self.newindex_value(&target, Value::Number(i as f64), value)
    }

    /// Pops a key and pushes `t[key]` without metamethods.
    pub fn raw_get(&mut self, index: i32) -> Result<ValueKind> {
        let table = self.table_at(index)?;
        let key = self.pop_value()?;
        let value = table.borrow().get(&key);
        let kind = value.kind();
        self.stack.push(value)?;
        Ok(kind)
    }

    /// Pops a value and a key and assigns `t[key] = value` without metamethods.
    pub fn raw_set(&mut self, index: i32) -> Result<()> {
        let table = self.table_at(index)?;
        let value = self.pop_value()?;
        let key = self.pop_value()?;
        let result = table.borrow_mut().set(key, value);
        result
    }

    /// Pushes `t[i]` without metamethods.
    pub fn raw_get_index(&mut self, index: i32, i: i64) -> Result<ValueKind> {
        let table = self.table_at(index)?;
        let value = table.borrow().get_int(i);
        let kind = value.kind();
        self.stack.push(value)?;
        Ok(kind)
    }

    /// Pops a value and assigns `t[i] = value` without metamethods.
    pub fn raw_set_index(&mut self, index: i32, i: i64) -> Result<()> {
        let table = self.table_at(index)?;
        let value = self.pop_value()?;
        table.borrow_mut().set_int(i, value);
        Ok(())
    }

    /// Pops a key and pushes the next key/value pair of the table at `index`.
    ///
    /// Returns `false`, pushing nothing, once the traversal is complete.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeMismatch`] if the value at `index` is not a table, or
    /// [`Error::InvalidKey`] if the key is not present in the table.
    pub fn next(&mut self, index: i32) -> Result<bool> {
        let table = self.table_at(index)?;
        let key = self.pop_value()?;
        let entry = table.borrow().next(&key)?;
        match entry {
            Some((key, value)) => {
                self.stack.push(key)?;
                self.stack.push(value)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // --------------------------------------------------------------------------------------
    // Globals and metatables
    // --------------------------------------------------------------------------------------

    /// Pushes the global `name` and returns its kind.
    pub fn get_global(&mut self, name: &str) -> Result<ValueKind> {
        let globals = Value::Table(self.globals.clone());
        let value = self.index_value(&globals, &Value::string(name))?;
        let kind = value.kind();
        self.stack.push(value)?;
        Ok(kind)
    }

    /// Pops a value and stores it as the global `name`.
    pub fn set_global(&mut self, name: &str) -> Result<()> {
        let value = self.pop_value()?;
        let globals = Value::Table(self.globals.clone());
        self.newindex_value(&globals, Value::string(name), value)
    }

    /// Pushes the registry metatable named `name`, creating it if needed.
    ///
    /// Returns `true` if the metatable was created by this call. New metatables carry their
    /// name under `__name`.
    pub fn new_metatable(&mut self, name: &str) -> Result<bool> {
        let existing = self.registry.borrow().get_str(name);
        if let Value::Table(t) = existing {
            self.stack.push(Value::Table(t))?;
            return Ok(false);
        }
        let metatable = TableRef::new(Table::with_capacity(0, 4));
        metatable
            .borrow_mut()
            .set_str(Metamethod::Name.name(), Value::string(name));
        self.registry
            .borrow_mut()
            .set_str(name, Value::Table(metatable.clone()));
        self.stack.push(Value::Table(metatable))?;
        Ok(true)
    }

    /// Pushes the registry metatable named `name`, or nil, and returns its kind.
    pub fn get_named_metatable(&mut self, name: &str) -> Result<ValueKind> {
        let value = self.registry.borrow().get_str(name);
        let kind = value.kind();
        self.stack.push(value)?;
        Ok(kind)
    }

    /// Sets the registry metatable named `name` on the value at `index`.
    pub fn set_named_metatable(&mut self, index: i32, name: &str) -> Result<()> {
        let target = self.value(index)?;
        let metatable = self.registry.borrow().get_str(name);
        match metatable {
            Value::Table(t) => self.assign_metatable(&target, Some(t)),
            _ => Err(runtime_error!("no metatable named '{}'", name)),
        }
    }

    /// Pops a table (or nil) and sets it as the metatable of the value at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeMismatch`] if the popped value is neither a table nor nil, or a
    /// runtime error if the target cannot carry a metatable.
    pub fn set_metatable(&mut self, index: i32) -> Result<()> {
        let target = self.value(index)?;
        let metatable = match self.pop_value()? {
            Value::Nil => None,
            Value::Table(t) => Some(t),
            other => {
                return Err(Error::TypeMismatch {
                    expected: ValueKind::Table,
                    found: other.kind(),
                })
            }
        };
        self.assign_metatable(&target, metatable)
    }

    /// Pushes the metatable of the value at `index` and returns `true`, or pushes nothing and
    /// returns `false` if it has none.
    pub fn get_metatable(&mut self, index: i32) -> Result<bool> {
        let target = self.value(index)?;
        match self.metatable_of(&target) {
            Some(t) => {
                self.stack.push(Value::Table(t))?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn assign_metatable(&mut self, target: &Value, metatable: Option<TableRef>) -> Result<()> {
        match target {
            Value::Table(t) => {
                t.borrow_mut().set_metatable(metatable);
                Ok(())
            }
            Value::Userdata(ud) => {
                ud.set_metatable(metatable);
                Ok(())
            }
            other => Err(runtime_error!(
                "cannot set the metatable of a {} value",
                other.kind()
            )),
        }
    }

    pub(crate) fn metatable_of(&self, value: &Value) -> Option<TableRef> {
        match value {
            Value::Table(t) => t.borrow().metatable(),
            Value::Userdata(ud) => ud.metatable(),
            _ => None,
        }
    }

    /// Returns the handler for `event` in the metatable of `value`, or nil.
    pub(crate) fn metafield(&self, value: &Value, event: Metamethod) -> Value {
        match self.metatable_of(value) {
            Some(meta) => meta.borrow().get_str(event.name()),
            None => Value::Nil,
        }
    }

    pub(crate) fn type_metatable(&self, type_id: TypeId) -> Option<TableRef> {
        self.type_metatables.get(&type_id).cloned()
    }

    pub(crate) fn insert_type_metatable(&mut self, type_id: TypeId, metatable: TableRef) {
        self.type_metatables.insert(type_id, metatable);
    }

    // --------------------------------------------------------------------------------------
    // Metamethod-aware access
    // --------------------------------------------------------------------------------------

    /// `target[key]` with `__index` fallback.
    pub(crate) fn index_value(&mut self, target: &Value, key: &Value) -> Result<Value> {
        let mut current = target.clone();
        for _ in 0..MAX_META_CHAIN {
            let handler = match &current {
                Value::Table(t) => {
                    let raw = t.borrow().get(key);
                    if !raw.is_nil() {
                        return Ok(raw);
                    }
                    let handler = self.metafield(&current, Metamethod::Index);
                    if handler.is_nil() {
                        return Ok(Value::Nil);
                    }
                    handler
                }
                other => {
                    let handler = self.metafield(other, Metamethod::Index);
                    if handler.is_nil() {
                        return Err(Error::NotIndexable { kind: other.kind() });
                    }
                    handler
                }
            };
            if let Value::Function(_) = handler {
                let mut results = self.call_value(handler, vec![current, key.clone()], 1)?;
                return Ok(results.pop().unwrap_or_default());
            }
            current = handler;
        }
        Err(runtime_error!("'__index' chain too long; possible loop"))
    }

    /// `target[key] = value` with `__newindex` fallback.
    pub(crate) fn newindex_value(&mut self, target: &Value, key: Value, value: Value) -> Result<()> {
        let mut current = target.clone();
        for _ in 0..MAX_META_CHAIN {
            let handler = match &current {
                Value::Table(t) => {
                    let present = !t.borrow().get(&key).is_nil();
                    let handler = if present {
                        Value::Nil
                    } else {
                        self.metafield(&current, Metamethod::NewIndex)
                    };
                    if handler.is_nil() {
                        let result = t.borrow_mut().set(key, value);
                        return result;
                    }
                    handler
                }
                other => {
                    let handler = self.metafield(other, Metamethod::NewIndex);
                    if handler.is_nil() {
                        return Err(Error::NotIndexable { kind: other.kind() });
                    }
                    handler
                }
            };
            if let Value::Function(_) = handler {
                self.call_value(handler, vec![current, key, value], 0)?;
                return Ok(());
            }
            current = handler;
        }
        Err(runtime_error!("'__newindex' chain too long; possible loop"))
    }

    // --------------------------------------------------------------------------------------
    // Calls
    // --------------------------------------------------------------------------------------

    /// Calls the value below the top `nargs` values.
    ///
    /// The function and its arguments are replaced by `nresults` results, or by all of them
    /// with [`MULTRET`]. On error the function and its arguments are removed and the error is
    /// returned.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StackUnderflow`] if fewer than `nargs + 1` values are in the frame,
    /// or whatever error the callee raised.
    pub fn call(&mut self, nargs: i32, nresults: i32) -> Result<()> {
        let func = self.call_position(nargs)?;
        let result = self.call_at(func, nresults);
        if result.is_err() {
            self.stack.truncate(func);
        }
        result
    }

    /// Calls the value below the top `nargs` values in protected mode.
    ///
    /// On success behaves like [`State::call`]. On error the function and its arguments are
    /// replaced by the error message and the status tells the error class; the error itself
    /// is kept until [`State::take_error`].
    ///
    /// # Errors
    ///
    /// Only misuse of the stack (too few values for the call) is returned as `Err`.
    pub fn pcall(&mut self, nargs: i32, nresults: i32) -> Result<CallStatus> {
        let func = self.call_position(nargs)?;
        match self.call_at(func, nresults) {
            Ok(()) => Ok(CallStatus::Ok),
            Err(err) => {
                self.stack.truncate(func);
                let status = if err.is_memory_error() {
                    CallStatus::MemoryError
                } else {
                    CallStatus::RuntimeError
                };
                log::debug!("protected call failed ({}): {}", status, err);
                self.stack.push(Value::String(Rc::from(err.to_string())))?;
                self.last_error = Some(err);
                Ok(status)
            }
        }
    }

    /// Takes the error caught by the most recent failed [`State::pcall`].
    pub fn take_error(&mut self) -> Option<Error> {
        self.last_error.take()
    }

    /// Pops the top value and turns it into a runtime error.
    ///
    /// This is how a native function re-raises an error value it received, e.g. from a
    /// nested [`State::pcall`]: `return Err(state.raise())`.
    pub fn raise(&mut self) -> Error {
        match self.pop_value() {
            Ok(value) => Error::Runtime {
                message: value.to_string(),
            },
            Err(err) => err,
        }
    }

    fn call_position(&self, nargs: i32) -> Result<usize> {
        let nargs = usize::try_from(nargs).map_err(|_| Error::InvalidIndex { index: nargs })?;
        let top = self.stack.len();
        if top < self.base + nargs + 1 {
            return Err(Error::StackUnderflow);
        }
        Ok(top - nargs - 1)
    }

    fn call_at(&mut self, func: usize, nresults: i32) -> Result<()> {
        let callee = match self.stack.get(func)?.clone() {
            Value::Function(f) => f,
            other => match self.metafield(&other, Metamethod::Call) {
                Value::Function(f) => {
                    self.stack.insert(func, Value::Function(f.clone()))?;
                    f
                }
                _ => return Err(Error::NotCallable { kind: other.kind() }),
            },
        };

        if self.call_depth >= self.config.max_call_depth {
            return Err(Error::StackOverflow);
        }

        let saved_base = self.base;
        let frame = func + 1;
        self.base = frame;
        self.call_depth += 1;
        log::trace!(
            "call '{}' with {} argument(s) at depth {}",
            callee.name(),
            self.stack.len() - frame,
            self.call_depth
        );

        let outcome = callee.invoke(self);

        self.call_depth -= 1;
        self.base = saved_base;
        let returned = outcome?;

        let available = self.stack.len().saturating_sub(frame);
        assert!(
            returned <= available,
            "native function '{}' reported {} results but its frame holds {}",
            callee.name(),
            returned,
            available
        );

        let mut results = self.stack.split_off(self.stack.len() - returned);
        self.stack.truncate(func);
        if nresults >= 0 {
            results.resize(nresults as usize, Value::Nil);
        }
        for value in results {
            self.stack.push(value)?;
        }
        Ok(())
    }

    /// Calls `function` with `args` and returns its results.
    pub(crate) fn call_value(
        &mut self,
        function: Value,
        args: Vec<Value>,
        nresults: i32,
    ) -> Result<Vec<Value>> {
        let func = self.stack.len();
        self.stack.push(function)?;
        for arg in args {
            if let Err(err) = self.stack.push(arg) {
                self.stack.truncate(func);
                return Err(err);
            }
        }
        if let Err(err) = self.call_at(func, nresults) {
            self.stack.truncate(func);
            return Err(err);
        }
        Ok(self.stack.split_off(func))
    }

    pub(crate) fn cached_thunk(&mut self, signature: TypeId, thunk: Thunk, label: &str) -> Thunk {
        *self.thunks.entry(signature).or_insert_with(|| {
            log::debug!("cached thunk for signature {}", label);
            thunk
        })
    }

    /// Number of distinct thunks generated for this state.
    pub fn thunk_count(&self) -> usize {
        self.thunks.len()
    }

    // --------------------------------------------------------------------------------------
    // Operators
    // --------------------------------------------------------------------------------------

    /// Applies `op` to the top one (unary) or two (binary) values and replaces them with the
    /// result, honoring metamethods.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ArithmeticOperand`] if an operand is not a number and no metamethod
    /// applies, or a runtime error for bitwise operations on non-integral numbers.
    pub fn arith(&mut self, op: ArithOp) -> Result<()> {
        let (a, b) = if op.is_unary() {
            let a = self.pop_value()?;
            (a.clone(), a)
        } else {
            if self.top() < 2 {
                return Err(Error::StackUnderflow);
            }
            let b = self.pop_value()?;
            let a = self.pop_value()?;
            (a, b)
        };
        let result = self.arith_values(op, &a, &b)?;
        self.stack.push(result)
    }

    pub(crate) fn arith_values(&mut self, op: ArithOp, a: &Value, b: &Value) -> Result<Value> {
        if let (Value::Number(x), Value::Number(y)) = (a, b) {
            return numeric(op, *x, *y).map(Value::Number);
        }
        let event = op.metamethod();
        let mut handler = self.metafield(a, event);
        if handler.is_nil() {
            handler = self.metafield(b, event);
        }
        if handler.is_nil() {
            let culprit = if matches!(a, Value::Number(_)) { b } else { a };
            return Err(Error::ArithmeticOperand {
                op: if op.is_bitwise() {
                    "perform bitwise operation on"
                } else {
                    "perform arithmetic on"
                },
                kind: culprit.kind(),
            });
        }
        let mut results = self.call_value(handler, vec![a.clone(), b.clone()], 1)?;
        Ok(results.pop().unwrap_or_default())
    }

    /// Concatenates the top `n` values, honoring `__concat`, and pushes the result.
    pub fn concat(&mut self, n: usize) -> Result<()> {
        if n > self.stack.len() - self.base {
            return Err(Error::StackUnderflow);
        }
        if n == 0 {
            return self.stack.push(Value::string(""));
        }
        let mut values = self.stack.split_off(self.stack.len() - n);
        let mut acc = values.pop().unwrap_or_default();
        while let Some(prev) = values.pop() {
            acc = self.concat_pair(prev, acc)?;
        }
        self.stack.push(acc)
    }

    fn concat_pair(&mut self, a: Value, b: Value) -> Result<Value> {
        if let (Some(x), Some(y)) = (concat_text(&a), concat_text(&b)) {
            return Ok(Value::String(Rc::from(format!("{}{}", x, y))));
        }
        let mut handler = self.metafield(&a, Metamethod::Concat);
        if handler.is_nil() {
            handler = self.metafield(&b, Metamethod::Concat);
        }
        if handler.is_nil() {
            let culprit = if concat_text(&a).is_some() { &b } else { &a };
            return Err(Error::ArithmeticOperand {
                op: "concatenate",
                kind: culprit.kind(),
            });
        }
        let mut results = self.call_value(handler, vec![a, b], 1)?;
        Ok(results.pop().unwrap_or_default())
    }

    /// Compares the values at two indices, honoring `__eq`, `__lt` and `__le`.
    pub fn compare(&mut self, index1: i32, index2: i32, op: CompareOp) -> Result<bool> {
        let a = self.value(index1)?;
        let b = self.value(index2)?;
        self.compare_values(&a, &b, op)
    }

    pub(crate) fn compare_values(&mut self, a: &Value, b: &Value, op: CompareOp) -> Result<bool> {
        let event = match op {
            CompareOp::Eq => {
                if a.raw_equals(b) {
                    return Ok(true);
                }
                let same_kind = matches!(
                    (a, b),
                    (Value::Table(_), Value::Table(_)) | (Value::Userdata(_), Value::Userdata(_))
                );
                if !same_kind {
                    return Ok(false);
                }
                Metamethod::Eq
            }
            CompareOp::Lt | CompareOp::Le => {
                match (a, b) {
                    (Value::Number(x), Value::Number(y)) => {
                        return Ok(if op == CompareOp::Lt { x < y } else { x <= y })
                    }
                    (Value::String(x), Value::String(y)) => {
                        return Ok(if op == CompareOp::Lt { x < y } else { x <= y })
                    }
                    _ => {}
                }
                if op == CompareOp::Lt {
                    Metamethod::Lt
                } else {
                    Metamethod::Le
                }
            }
        };

        let mut handler = self.metafield(a, event);
        if handler.is_nil() {
            handler = self.metafield(b, event);
        }
        if handler.is_nil() {
            if op == CompareOp::Eq {
                return Ok(false);
            }
            return Err(Error::CompareOperands {
                left: a.kind(),
                right: b.kind(),
            });
        }
        let results = self.call_value(handler, vec![a.clone(), b.clone()], 1)?;
        Ok(results.first().is_some_and(Value::is_truthy))
    }

    /// Returns `true` if the values at two indices are raw-equal.
    pub fn raw_equal(&self, index1: i32, index2: i32) -> Result<bool> {
        Ok(self.value(index1)?.raw_equals(&self.value(index2)?))
    }

    /// Pushes the length of the value at `index`, honoring `__len`.
    ///
    /// Tables without `__len` yield a border; see [`Table::border`].
    pub fn len(&mut self, index: i32) -> Result<()> {
        let target = self.value(index)?;
        let length = self.length_of(&target)?;
        self.stack.push(length)
    }

    pub(crate) fn length_of(&mut self, target: &Value) -> Result<Value> {
        if let Value::String(s) = target {
            return Ok(Value::Number(s.len() as f64));
        }
        let handler = self.metafield(target, Metamethod::Len);
        if !handler.is_nil() {
            let mut results = self.call_value(handler, vec![target.clone(), target.clone()], 1)?;
            return Ok(results.pop().unwrap_or_default());
        }
        match target {
            Value::Table(t) => Ok(Value::Number(t.borrow().border() as f64)),
            other => Err(Error::ArithmeticOperand {
                op: "get length of",
                kind: other.kind(),
            }),
        }
    }

    /// Returns the length of the value at `index` without metamethods.
    ///
    /// Strings report their byte length, tables a border and everything else zero.
    pub fn raw_len(&self, index: i32) -> Result<usize> {
        Ok(match self.value(index)? {
            Value::String(s) => s.len(),
            Value::Table(t) => t.borrow().border(),
            _ => 0,
        })
    }

    /// Converts the value at `index` to a string, honoring `__tostring`.
    pub fn to_display_string(&mut self, index: i32) -> Result<String> {
        let target = self.value(index)?;
        let handler = self.metafield(&target, Metamethod::ToString);
        if handler.is_nil() {
            return Ok(target.to_string());
        }
        let results = self.call_value(handler, vec![target], 1)?;
        match results.first() {
            Some(Value::String(s)) => Ok(s.to_string()),
            _ => Err(runtime_error!("'__tostring' must return a string")),
        }
    }

    /// Releases every value reachable from this state.
    ///
    /// Tables reachable from the stack, the globals or the registry are emptied, which breaks
    /// reference cycles between them. The state stays usable but starts from an empty
    /// environment.
    pub fn close(&mut self) {
        let mut pending: Vec<Value> = self.stack.iter().cloned().collect();
        self.stack.clear();
        self.base = 0;
        pending.push(Value::Table(self.globals.clone()));
        pending.push(Value::Table(self.registry.clone()));
        pending.extend(self.type_metatables.drain().map(|(_, t)| Value::Table(t)));

        let mut visited = HashSet::new();
        while let Some(value) = pending.pop() {
            match &value {
                Value::Table(t) => {
                    if visited.insert(t.address()) {
                        pending.extend(t.try_take_contents());
                    }
                }
                Value::Userdata(ud) => {
                    if let Some(meta) = ud.metatable() {
                        pending.push(Value::Table(meta));
                    }
                }
                _ => {}
            }
        }
        self.thunks.clear();
        self.last_error = None;
    }
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for State {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("base", &self.base)
            .field("call_depth", &self.call_depth)
            .field("stack", &self.stack)
            .field("type_metatables", &self.type_metatables.len())
            .field("thunks", &self.thunks.len())
            .finish()
    }
}

fn concat_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.to_string()),
        Value::Number(n) => Some(format_number(*n)),
        _ => None,
    }
}

fn to_integer(n: f64) -> Result<i64> {
    if n.fract() == 0.0 && n >= i64::MIN as f64 && n < i64::MAX as f64 {
        Ok(n as i64)
    } else {
        Err(runtime_error!("number has no integer representation"))
    }
}

fn shift_left(x: i64, y: i64) -> i64 {
    if y <= -64 || y >= 64 {
        0
    } else if y >= 0 {
        ((x as u64) << y) as i64
    } else {
        ((x as u64) >> -y) as i64
    }
}

fn numeric(op: ArithOp, x: f64, y: f64) -> Result<f64> {
    Ok(match op {
        ArithOp::Add => x + y,
        ArithOp::Sub => x - y,
        ArithOp::Mul => x * y,
        ArithOp::Div => x / y,
        ArithOp::Pow => x.powf(y),
        ArithOp::IDiv => (x / y).floor(),
        ArithOp::Mod => {
            let m = x % y;
            if m != 0.0 && (m < 0.0) != (y < 0.0) {
                m + y
            } else {
                m
            }
        }
        ArithOp::Unm => -x,
        ArithOp::BAnd => (to_integer(x)? & to_integer(y)?) as f64,
        ArithOp::BOr => (to_integer(x)? | to_integer(y)?) as f64,
        ArithOp::BXor => (to_integer(x)? ^ to_integer(y)?) as f64,
        ArithOp::BNot => (!to_integer(x)?) as f64,
        ArithOp::Shl => shift_left(to_integer(x)?, to_integer(y)?) as f64,
        ArithOp::Shr => shift_left(to_integer(x)?, to_integer(y)?.saturating_neg()) as f64,
    })
}
