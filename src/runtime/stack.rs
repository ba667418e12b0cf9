//! The shared evaluation stack.
//!
//! This module provides [`ValueStack`], the single value stack every call chain of a
//! [`State`](crate::State) operates on. Host functions receive their arguments on it, push
//! their results onto it, and every marshaling operation reads from or writes to it.
//!
//! # Stack Semantics
//!
//! - Positions here are **absolute** (0-based from the bottom). Frame-relative and
//!   top-relative indexing is resolved by [`State`](crate::State) before reaching this type.
//! - A native call's frame starts right after its function slot; on return exactly the
//!   declared results replace the function slot and its arguments.
//!
//! # Overflow Protection
//!
//! The stack has a configurable maximum depth. Exceeding this limit returns
//! [`Error::StackOverflow`]; it is the only way a push can fail.
//!
//! # Type-Checked Operations
//!
//! [`pop`](ValueStack::pop) accepts any [`Value`], while [`pop_number`](ValueStack::pop_number),
//! [`pop_string`](ValueStack::pop_string) and [`pop_boolean`](ValueStack::pop_boolean) check the
//! tag and leave the value in place when it does not match.

use std::{fmt, rc::Rc};

use crate::{
    runtime::{Value, ValueKind},
    Error, Result,
};

/// Value stack with overflow protection.
///
/// # Example
///
/// ```rust
/// use luainterop::runtime::{Value, ValueStack};
///
/// let mut stack = ValueStack::new(100);
///
/// stack.push(Value::Number(42.0))?;
/// stack.push(Value::Boolean(true))?;
///
/// assert_eq!(stack.pop()?, Value::Boolean(true));
/// assert_eq!(stack.pop_number()?, 42.0);
/// # Ok::<(), luainterop::Error>(())
/// ```
#[derive(Clone)]
pub struct ValueStack {
    /// The stack storage.
    values: Vec<Value>,

    /// Maximum allowed stack depth.
    max_depth: usize,
}

impl ValueStack {
    /// Creates a new stack with the given maximum depth.
    #[must_use]
    pub fn new(max_depth: usize) -> Self {
        ValueStack {
            values: Vec::with_capacity(max_depth.min(256)),
            max_depth,
        }
    }

    /// Pushes a value onto the stack.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StackOverflow`] if the stack is full.
    ///
    /// # Example
    ///
    /// ```rust
    /// use luainterop::runtime::{Value, ValueStack};
    ///
    /// let mut stack = ValueStack::new(2);
    /// stack.push(Value::Nil).unwrap();
    /// stack.push(Value::Nil).unwrap();
    /// assert!(stack.push(Value::Nil).is_err()); // Overflow
    /// ```
    pub fn push(&mut self, value: Value) -> Result<()> {
        if self.values.len() >= self.max_depth {
            return Err(Error::StackOverflow);
        }
        self.values.push(value);
        Ok(())
    }

    /// Pops a value from the stack.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StackUnderflow`] if the stack is empty.
    pub fn pop(&mut self) -> Result<Value> {
        self.values.pop().ok_or(Error::StackUnderflow)
    }

    /// Peeks at the top value without removing it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StackUnderflow`] if the stack is empty.
    pub fn peek(&self) -> Result<&Value> {
        self.values.last().ok_or(Error::StackUnderflow)
    }

    /// Pops a number, leaving the stack unchanged on a tag mismatch.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StackUnderflow`] if the stack is empty, or [`Error::TypeMismatch`] if
    /// the top value is not a number.
    pub fn pop_number(&mut self) -> Result<f64> {
        match self.peek()? {
            Value::Number(n) => {
                let n = *n;
                self.values.pop();
                Ok(n)
            }
            other => Err(Error::TypeMismatch {
                expected: ValueKind::Number,
                found: other.kind(),
            }),
        }
    }

    /// Pops a string, leaving the stack unchanged on a tag mismatch.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StackUnderflow`] if the stack is empty, or [`Error::TypeMismatch`] if
    /// the top value is not a string.
    pub fn pop_string(&mut self) -> Result<Rc<str>> {
        match self.peek()? {
            Value::String(s) => {
                let s = s.clone();
                self.values.pop();
                Ok(s)
            }
            other => Err(Error::TypeMismatch {
                expected: ValueKind::String,
                found: other.kind(),
            }),
        }
    }

    /// Pops a boolean, leaving the stack unchanged on a tag mismatch.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StackUnderflow`] if the stack is empty, or [`Error::TypeMismatch`] if
    /// the top value is not a boolean.
    pub fn pop_boolean(&mut self) -> Result<bool> {
        match self.peek()? {
            Value::Boolean(b) => {
                let b = *b;
                self.values.pop();
                Ok(b)
            }
            other => Err(Error::TypeMismatch {
                expected: ValueKind::Boolean,
                found: other.kind(),
            }),
        }
    }

    /// Returns the value at an absolute position.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StackUnderflow`] if `position` is past the top.
    pub fn get(&self, position: usize) -> Result<&Value> {
        self.values.get(position).ok_or(Error::StackUnderflow)
    }

    /// Overwrites the value at an absolute position.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StackUnderflow`] if `position` is past the top.
    pub fn set(&mut self, position: usize, value: Value) -> Result<()> {
        let slot = self.values.get_mut(position).ok_or(Error::StackUnderflow)?;
        *slot = value;
        Ok(())
    }

    /// Inserts a value at an absolute position, shifting everything above it up.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StackOverflow`] if the stack is full, or [`Error::StackUnderflow`] if
    /// `position` is past the top.
    pub fn insert(&mut self, position: usize, value: Value) -> Result<()> {
        if position > self.values.len() {
            return Err(Error::StackUnderflow);
        }
        if self.values.len() >= self.max_depth {
            return Err(Error::StackOverflow);
        }
        self.values.insert(position, value);
        Ok(())
    }

    /// Removes the value at an absolute position, shifting everything above it down.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StackUnderflow`] if `position` is past the top.
    pub fn remove(&mut self, position: usize) -> Result<Value> {
        if position >= self.values.len() {
            return Err(Error::StackUnderflow);
        }
        Ok(self.values.remove(position))
    }

    /// Removes and returns every value from `position` upwards, bottom first.
    pub fn split_off(&mut self, position: usize) -> Vec<Value> {
        if position >= self.values.len() {
            return Vec::new();
        }
        self.values.split_off(position)
    }

    /// Shrinks the stack to `len` values. Does nothing if it is already shorter.
    pub fn truncate(&mut self, len: usize) {
        self.values.truncate(len);
    }

    /// Grows the stack to `len` values by pushing nils.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StackOverflow`] if `len` exceeds the maximum depth.
    pub fn extend_to(&mut self, len: usize) -> Result<()> {
        if len > self.max_depth {
            return Err(Error::StackOverflow);
        }
        self.values.resize(len, Value::Nil);
        Ok(())
    }

    /// Returns the current stack depth.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if the stack is empty.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the maximum depth.
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Removes every value.
    pub fn clear(&mut self) {
        self.values.clear();
    }

    /// Iterates from the bottom of the stack to the top.
    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.values.iter()
    }
}

impl fmt::Display for ValueStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, v) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{:?}", v)?;
        }
        write!(f, "]")
    }
}

impl fmt::Debug for ValueStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ValueStack(depth={}, max={}) {}", self.len(), self.max_depth, self)
    }
}
