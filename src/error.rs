use thiserror::Error;

use crate::runtime::ValueKind;

/// Builds an [`Error::Runtime`] from a message or a format string.
///
/// This is the host-side equivalent of raising a string error from script code;
/// the resulting error travels through `pcall` exactly like a script error.
macro_rules! runtime_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Runtime {
            message: $msg.to_string(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Runtime {
            message: format!($fmt, $($arg)*),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Every error produced while a script calls into the host, or while the host drives the
/// runtime, is one of these variants. Native functions return them as `Err`, and the runtime's
/// protected call turns them into a catchable error value whose message is the variant's
/// `Display` output. This makes faults raised by host code indistinguishable from faults raised
/// by script code at the script level.
///
/// # Error Categories
///
/// ## Stack Value Protocol
/// - [`Error::TypeMismatch`] - A stack slot holds a different kind than the one requested
/// - [`Error::StackOverflow`] - The value stack or the native call depth limit was exceeded
/// - [`Error::StackUnderflow`] - A pop or peek went below the current frame
/// - [`Error::InvalidIndex`] - A stack index does not refer to a slot of the current frame
///
/// ## Object Wrapper
/// - [`Error::UserdataTypeMismatch`] - An opaque reference was retrieved as the wrong host type
/// - [`Error::MemberNotFound`] - A reflected member lookup failed under the raising policy
/// - [`Error::ReadOnlyMember`] - A write targeted a field without an exposed setter
/// - [`Error::InstanceBorrowed`] - A wrapped instance is already borrowed by an outer call
///
/// ## Calls and Runtime Semantics
/// - [`Error::HostCallableFault`] - A host callable panicked
/// - [`Error::Runtime`] - An error raised by script code or by `runtime_error!`
/// - [`Error::NotCallable`], [`Error::NotIndexable`], [`Error::InvalidKey`],
///   [`Error::ArithmeticOperand`], [`Error::CompareOperands`] - Operations on values that do
///   not support them
///
/// # Examples
///
/// ```rust
/// use luainterop::{Error, State};
///
/// let mut state = State::new();
/// state.push(true)?;
///
/// match state.read::<f64>(-1) {
///     Err(Error::TypeMismatch { expected, found }) => {
///         assert_eq!(expected.to_string(), "number");
///         assert_eq!(found.to_string(), "boolean");
///     }
///     other => panic!("unexpected: {:?}", other),
/// }
/// # Ok::<(), luainterop::Error>(())
/// ```
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// A stack slot did not hold the kind of value that was requested.
    ///
    /// Raised by the Stack Value Protocol when decoding a slot whose tag disagrees with the
    /// requested host type. Both the expected and the actual kind are carried so callers can
    /// produce their own diagnostics.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// The kind the host asked for
        expected: ValueKind,
        /// The kind actually found on the stack
        found: ValueKind,
    },

    /// The value stack or the native call depth limit was exceeded.
    ///
    /// Fatal to the current call chain; a protected call reports it as a memory error.
    #[error("stack overflow")]
    StackOverflow,

    /// A pop or peek went below the base of the current call frame.
    #[error("stack underflow")]
    StackUnderflow,

    /// A stack index does not refer to a valid slot of the current frame.
    ///
    /// Index `0` is never valid; positive indices count from the frame base, negative
    /// indices count from the top.
    #[error("invalid stack index {index}")]
    InvalidIndex {
        /// The offending index as passed by the caller
        index: i32,
    },

    /// An opaque reference was retrieved as a host type other than the one it was pushed as.
    ///
    /// Also raised when an operator receives an operand that is not an instance of the
    /// operator's declaring type.
    #[error("userdata type mismatch: expected {expected}, found {found}")]
    UserdataTypeMismatch {
        /// Name of the requested host type
        expected: String,
        /// Name of the host type actually stored, or the value kind for non-userdata
        found: String,
    },

    /// A reflected member lookup failed while the missing-member policy raises errors.
    #[error("attempt to index {member} on a userdata value")]
    MemberNotFound {
        /// Name of the member that was requested
        member: String,
    },

    /// A script tried to assign a field that exposes no setter.
    ///
    /// Only raised under [`MissingMemberPolicy::RaiseError`](crate::MissingMemberPolicy);
    /// the default policy silently ignores such writes.
    #[error("attempt to assign read-only field {member} of {type_name}")]
    ReadOnlyMember {
        /// Name of the field
        member: String,
        /// Name of the declaring host type
        type_name: String,
    },

    /// A wrapped host instance is already borrowed by an enclosing call.
    ///
    /// Happens when a host method re-enters script code which then touches the same
    /// instance mutably.
    #[error("userdata of type {type_name} is already in use")]
    InstanceBorrowed {
        /// Name of the wrapped host type
        type_name: String,
    },

    /// A host callable panicked while servicing a script call.
    ///
    /// The panic is caught at the thunk boundary and never unwinds through the runtime.
    #[error("host function '{name}' failed: {message}")]
    HostCallableFault {
        /// Display name of the bound callable
        name: String,
        /// The panic payload, when it was a string
        message: String,
    },

    /// An error raised by script code, or reported by a protected call.
    #[error("{message}")]
    Runtime {
        /// The error message
        message: String,
    },

    /// Attempted to call a value that is neither a function nor has a `__call` metamethod.
    #[error("attempt to call a {kind} value")]
    NotCallable {
        /// Kind of the value that was called
        kind: ValueKind,
    },

    /// Attempted to index a value that is neither a table nor has an `__index` metamethod.
    #[error("attempt to index a {kind} value")]
    NotIndexable {
        /// Kind of the value that was indexed
        kind: ValueKind,
    },

    /// A table key was nil or NaN, or `next` received a key not present in the table.
    #[error("invalid table key: {reason}")]
    InvalidKey {
        /// What was wrong with the key
        reason: &'static str,
    },

    /// An arithmetic, bitwise or concatenation operand had no numeric meaning and no
    /// metamethod.
    #[error("attempt to {op} a {kind} value")]
    ArithmeticOperand {
        /// Verb describing the operation (`perform arithmetic on`, `concatenate`, ...)
        op: &'static str,
        /// Kind of the offending operand
        kind: ValueKind,
    },

    /// Two values could not be ordered.
    #[error("attempt to compare {left} with {right}")]
    CompareOperands {
        /// Kind of the left operand
        left: ValueKind,
        /// Kind of the right operand
        right: ValueKind,
    },
}

impl Error {
    /// Returns `true` for errors a protected call reports as a memory error rather than a
    /// runtime error.
    pub fn is_memory_error(&self) -> bool {
        matches!(self, Error::StackOverflow)
    }

    /// Returns `true` if this error was produced by the object wrapper.
    pub fn is_userdata_error(&self) -> bool {
        matches!(
            self,
            Error::UserdataTypeMismatch { .. }
                | Error::MemberNotFound { .. }
                | Error::ReadOnlyMember { .. }
                | Error::InstanceBorrowed { .. }
        )
    }
}
