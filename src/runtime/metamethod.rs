//! Metatable event names and operator tags.

use strum::{Display, EnumIter, EnumString, IntoStaticStr};

/// A metatable event.
///
/// The string form (`Display`, `FromStr`, `Into<&'static str>`) is the key under which the
/// handler is stored in a metatable, e.g. `"__add"`.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, IntoStaticStr, EnumIter,
)]
pub enum Metamethod {
    /// `t[k]` on an absent key or a non-table
    #[strum(serialize = "__index")]
    Index,
    /// `t[k] = v` on an absent key or a non-table
    #[strum(serialize = "__newindex")]
    NewIndex,
    /// Finalizer marker
    #[strum(serialize = "__gc")]
    Gc,
    /// Weak-table mode
    #[strum(serialize = "__mode")]
    Mode,
    /// `#v`
    #[strum(serialize = "__len")]
    Len,
    /// `a == b`
    #[strum(serialize = "__eq")]
    Eq,
    /// `a + b`
    #[strum(serialize = "__add")]
    Add,
    /// `a - b`
    #[strum(serialize = "__sub")]
    Sub,
    /// `a * b`
    #[strum(serialize = "__mul")]
    Mul,
    /// `a % b`
    #[strum(serialize = "__mod")]
    Mod,
    /// `a ^ b`
    #[strum(serialize = "__pow")]
    Pow,
    /// `a / b`
    #[strum(serialize = "__div")]
    Div,
    /// `a // b`
    #[strum(serialize = "__idiv")]
    IDiv,
    /// `a & b`
    #[strum(serialize = "__band")]
    BAnd,
    /// `a | b`
    #[strum(serialize = "__bor")]
    BOr,
    /// `a ~ b`
    #[strum(serialize = "__bxor")]
    BXor,
    /// `a << b`
    #[strum(serialize = "__shl")]
    Shl,
    /// `a >> b`
    #[strum(serialize = "__shr")]
    Shr,
    /// `-a`
    #[strum(serialize = "__unm")]
    Unm,
    /// `~a`
    #[strum(serialize = "__bnot")]
    BNot,
    /// `a < b`
    #[strum(serialize = "__lt")]
    Lt,
    /// `a <= b`
    #[strum(serialize = "__le")]
    Le,
    /// `a .. b`
    #[strum(serialize = "__concat")]
    Concat,
    /// `v(...)` on a non-function
    #[strum(serialize = "__call")]
    Call,
    /// To-be-closed variable going out of scope
    #[strum(serialize = "__close")]
    Close,
    /// String conversion
    #[strum(serialize = "__tostring")]
    ToString,
    /// Type name stored by named metatables
    #[strum(serialize = "__name")]
    Name,
}

impl Metamethod {
    /// The metatable key for this event.
    pub fn name(self) -> &'static str {
        self.into()
    }

    /// Returns `true` for events that take two operands and produce a value.
    pub fn is_binary_operator(self) -> bool {
        matches!(
            self,
            Metamethod::Add
                | Metamethod::Sub
                | Metamethod::Mul
                | Metamethod::Mod
                | Metamethod::Pow
                | Metamethod::Div
                | Metamethod::IDiv
                | Metamethod::BAnd
                | Metamethod::BOr
                | Metamethod::BXor
                | Metamethod::Shl
                | Metamethod::Shr
                | Metamethod::Concat
                | Metamethod::Eq
                | Metamethod::Lt
                | Metamethod::Le
        )
    }

    /// Returns `true` for events that take a single operand.
    pub fn is_unary_operator(self) -> bool {
        matches!(self, Metamethod::Unm | Metamethod::BNot | Metamethod::Len)
    }
}

/// An arithmetic or bitwise operator for [`State::arith`](crate::State::arith).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display)]
pub enum ArithOp {
    /// Addition
    Add,
    /// Subtraction
    Sub,
    /// Multiplication
    Mul,
    /// Floored modulo
    Mod,
    /// Exponentiation
    Pow,
    /// Float division
    Div,
    /// Floor division
    IDiv,
    /// Bitwise and
    BAnd,
    /// Bitwise or
    BOr,
    /// Bitwise exclusive or
    BXor,
    /// Left shift
    Shl,
    /// Logical right shift
    Shr,
    /// Negation (unary)
    Unm,
    /// Bitwise not (unary)
    BNot,
}

impl ArithOp {
    /// The metatable event consulted when an operand is not a number.
    pub fn metamethod(self) -> Metamethod {
        match self {
            ArithOp::Add => Metamethod::Add,
            ArithOp::Sub => Metamethod::Sub,
            ArithOp::Mul => Metamethod::Mul,
            ArithOp::Mod => Metamethod::Mod,
            ArithOp::Pow => Metamethod::Pow,
            ArithOp::Div => Metamethod::Div,
            ArithOp::IDiv => Metamethod::IDiv,
            ArithOp::BAnd => Metamethod::BAnd,
            ArithOp::BOr => Metamethod::BOr,
            ArithOp::BXor => Metamethod::BXor,
            ArithOp::Shl => Metamethod::Shl,
            ArithOp::Shr => Metamethod::Shr,
            ArithOp::Unm => Metamethod::Unm,
            ArithOp::BNot => Metamethod::BNot,
        }
    }

    /// Returns `true` for operators that consume a single operand.
    pub fn is_unary(self) -> bool {
        matches!(self, ArithOp::Unm | ArithOp::BNot)
    }

    /// Returns `true` for operators that work on the integer representation.
    pub fn is_bitwise(self) -> bool {
        matches!(
            self,
            ArithOp::BAnd | ArithOp::BOr | ArithOp::BXor | ArithOp::Shl | ArithOp::Shr | ArithOp::BNot
        )
    }
}

/// A comparison for [`State::compare`](crate::State::compare).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display)]
pub enum CompareOp {
    /// `==`
    Eq,
    /// `<`
    Lt,
    /// `<=`
    Le,
}
