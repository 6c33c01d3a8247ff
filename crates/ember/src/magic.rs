//! Well-known magic-method slot names.
//!
//! Every operator and protocol hook is an ordinary entry in a value's symbol table,
//! looked up by one of these names. Built-in types get their slots installed at VM
//! bootstrap, user classes define them as methods, and the dispatcher treats both alike.

use strum::{Display, EnumIter, EnumString, IntoStaticStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, IntoStaticStr)]
pub enum Magic {
    // --- arithmetic ---
    #[strum(serialize = "__add__")]
    Add,
    #[strum(serialize = "__sub__")]
    Sub,
    #[strum(serialize = "__mul__")]
    Mul,
    #[strum(serialize = "__div__")]
    Div,
    #[strum(serialize = "__floor_div__")]
    FloorDiv,
    #[strum(serialize = "__mod__")]
    Mod,
    #[strum(serialize = "__pow__")]
    Pow,
    #[strum(serialize = "__bit_and__")]
    BitAnd,
    #[strum(serialize = "__bit_or__")]
    BitOr,
    #[strum(serialize = "__bit_xor__")]
    BitXor,
    #[strum(serialize = "__shift_left__")]
    ShiftLeft,
    #[strum(serialize = "__shift_right__")]
    ShiftRight,

    // --- comparison ---
    #[strum(serialize = "__equals__")]
    Equals,
    #[strum(serialize = "__not_equals__")]
    NotEquals,
    #[strum(serialize = "__less_than__")]
    LessThan,
    #[strum(serialize = "__less_or_equal__")]
    LessOrEqual,
    #[strum(serialize = "__greater_than__")]
    GreaterThan,
    #[strum(serialize = "__greater_or_equal__")]
    GreaterOrEqual,
    #[strum(serialize = "__contains__")]
    Contains,

    // --- reflected ---
    #[strum(serialize = "__right_add__")]
    RightAdd,
    #[strum(serialize = "__right_sub__")]
    RightSub,
    #[strum(serialize = "__right_mul__")]
    RightMul,
    #[strum(serialize = "__right_div__")]
    RightDiv,
    #[strum(serialize = "__right_floor_div__")]
    RightFloorDiv,
    #[strum(serialize = "__right_mod__")]
    RightMod,
    #[strum(serialize = "__right_pow__")]
    RightPow,
    #[strum(serialize = "__right_bit_and__")]
    RightBitAnd,
    #[strum(serialize = "__right_bit_or__")]
    RightBitOr,
    #[strum(serialize = "__right_bit_xor__")]
    RightBitXor,
    #[strum(serialize = "__right_shift_left__")]
    RightShiftLeft,
    #[strum(serialize = "__right_shift_right__")]
    RightShiftRight,
    #[strum(serialize = "__right_equals__")]
    RightEquals,
    #[strum(serialize = "__right_not_equals__")]
    RightNotEquals,
    #[strum(serialize = "__right_less_than__")]
    RightLessThan,
    #[strum(serialize = "__right_less_or_equal__")]
    RightLessOrEqual,
    #[strum(serialize = "__right_greater_than__")]
    RightGreaterThan,
    #[strum(serialize = "__right_greater_or_equal__")]
    RightGreaterOrEqual,

    // --- unary ---
    #[strum(serialize = "__negate__")]
    Negate,
    #[strum(serialize = "__positive__")]
    Positive,
    #[strum(serialize = "__invert__")]
    Invert,

    // --- protocols ---
    #[strum(serialize = "__bool__")]
    Bool,
    #[strum(serialize = "__string__")]
    String,
    #[strum(serialize = "__repr__")]
    Repr,
    #[strum(serialize = "__hash__")]
    Hash,
    #[strum(serialize = "__length__")]
    Length,
    #[strum(serialize = "__index__")]
    Index,
    #[strum(serialize = "__assign__")]
    Assign,
    #[strum(serialize = "__iter__")]
    Iter,
    #[strum(serialize = "__has_next__")]
    HasNext,
    #[strum(serialize = "__next__")]
    Next,
    #[strum(serialize = "__call__")]
    Call,
    #[strum(serialize = "__init__")]
    Init,
    #[strum(serialize = "__copy__")]
    Copy,
}

impl Magic {
    /// The symbol-table name of this slot.
    #[must_use]
    pub fn name(self) -> &'static str {
        self.into()
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn names_are_dunder() {
        for slot in Magic::iter() {
            let name = slot.name();
            assert!(name.starts_with("__") && name.ends_with("__"), "{name}");
            assert_eq!(Magic::from_str(name), Ok(slot));
        }
    }

    #[test]
    fn reflected_names() {
        assert_eq!(Magic::RightAdd.name(), "__right_add__");
        assert_eq!(Magic::Call.to_string(), "__call__");
    }
}
