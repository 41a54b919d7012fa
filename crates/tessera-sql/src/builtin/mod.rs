//! Builtin-function lookup.
//!
//! Resolves a builtin call by name and argument datatypes to a concrete
//! overload. Overloads of one name form a chain linked through
//! [`BuiltinDecl::overloaded_opcode`]; resolution walks the chain in three
//! passes of decreasing strictness:
//!
//! 1. *Exact*: the argument datatypes are identical to the signature.
//! 2. *Similar*: arguments match within a type family. `Int8` is similar to
//!    `Int64`; `Float` is similar to `Double`; `Int8` is not similar to
//!    `Double`. This resolves overloading between integer and floating
//!    variants without surprises.
//! 3. *Convertible*: arguments are implicitly convertible to the signature,
//!    e.g. `Int16` widens to `Double`.
//!
//! Each pass must find a unique match; more than one compatible overload in
//! a pass is an error. The `cast` builtin only ever resolves exactly.

use std::fmt;

use thiserror::Error;
use tracing::trace;

/// The name of the cast builtin, which skips the similar and convertible
/// resolution passes.
pub const CAST_FUNC_NAME: &str = "cast";

/// Datatypes known to the builtin directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    /// Boolean.
    Bool,
    /// 8-bit signed integer.
    Int8,
    /// 16-bit signed integer.
    Int16,
    /// 32-bit signed integer.
    Int32,
    /// 64-bit signed integer.
    Int64,
    /// 32-bit floating point.
    Float,
    /// 64-bit floating point.
    Double,
    /// Character string.
    Text,
    /// Point in time.
    Timestamp,
    /// Matches any remaining arguments in a signature.
    TypeArgs,
    /// Not yet known; filled in during resolution.
    Unknown,
}

impl DataType {
    /// Returns true for the signed integer family.
    #[must_use]
    pub const fn is_integer(self) -> bool {
        matches!(self, Self::Int8 | Self::Int16 | Self::Int32 | Self::Int64)
    }

    /// Returns true for the floating-point family.
    #[must_use]
    pub const fn is_floating(self) -> bool {
        matches!(self, Self::Float | Self::Double)
    }

    /// Width rank within the integer family, for conversion checks.
    const fn integer_rank(self) -> u8 {
        match self {
            Self::Int8 => 1,
            Self::Int16 => 2,
            Self::Int32 => 3,
            Self::Int64 => 4,
            _ => 0,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Returns true if `left` and `right` belong to the same numeric family.
///
/// Similarity resolves overloads between integer and floating variants:
/// `Int8` is similar to `Int64` but not to `Double`.
#[must_use]
pub const fn is_similar(left: DataType, right: DataType) -> bool {
    (left.is_integer() && right.is_integer()) || (left.is_floating() && right.is_floating())
}

/// Returns true if a value of type `source` is implicitly convertible to
/// `target`.
///
/// Integers widen to wider integers and to either floating type; `Float`
/// widens to `Double`. Narrowing conversions are not implicit.
#[must_use]
pub const fn is_convertible(target: DataType, source: DataType) -> bool {
    if target as u8 == source as u8 {
        return true;
    }
    if source.is_integer() {
        return (target.is_integer() && target.integer_rank() >= source.integer_rank())
            || target.is_floating();
    }
    matches!(source, DataType::Float) && matches!(target, DataType::Double)
}

/// Opcodes for builtin-function overloads. The numeric value doubles as the
/// overload's index in the directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum BuiltinOpcode {
    /// `cast(int64, text)`.
    CastInt64ToText = 0,
    /// `cast(double, text)`.
    CastDoubleToText = 1,
    /// `token(...)`: partition hash of the primary key columns.
    Token = 2,
    /// `floor(double)`.
    Floor = 3,
    /// `ceil(double)`.
    Ceil = 4,
    /// `abs(int64)`.
    AbsInt64 = 5,
    /// `abs(double)`.
    AbsDouble = 6,
    /// `round(float)`.
    RoundFloat = 7,
    /// `round(double)`.
    RoundDouble = 8,
    /// `greatest(int64, int64)`.
    GreatestInt64 = 9,
    /// `greatest(double, double)`.
    GreatestDouble = 10,
    /// `length(text)`.
    LengthText = 11,
    /// `now()`.
    NowTimestamp = 12,
}

/// Declaration of one builtin-function overload.
#[derive(Debug)]
pub struct BuiltinDecl {
    /// The function name as written in queries.
    pub name: &'static str,
    /// This overload's opcode.
    pub opcode: BuiltinOpcode,
    /// The previous overload of the same name; equal to `opcode` at the end
    /// of the chain.
    pub overloaded_opcode: BuiltinOpcode,
    /// Formal parameter datatypes.
    pub param_types: &'static [DataType],
    /// Return datatype.
    pub return_type: DataType,
}

/// The builtin directory, indexed by opcode.
static DIRECTORY: &[BuiltinDecl] = &[
    BuiltinDecl {
        name: "cast",
        opcode: BuiltinOpcode::CastInt64ToText,
        overloaded_opcode: BuiltinOpcode::CastInt64ToText,
        param_types: &[DataType::Int64, DataType::Text],
        return_type: DataType::Text,
    },
    BuiltinDecl {
        name: "cast",
        opcode: BuiltinOpcode::CastDoubleToText,
        overloaded_opcode: BuiltinOpcode::CastInt64ToText,
        param_types: &[DataType::Double, DataType::Text],
        return_type: DataType::Text,
    },
    BuiltinDecl {
        name: "token",
        opcode: BuiltinOpcode::Token,
        overloaded_opcode: BuiltinOpcode::Token,
        param_types: &[DataType::TypeArgs],
        return_type: DataType::Int64,
    },
    BuiltinDecl {
        name: "floor",
        opcode: BuiltinOpcode::Floor,
        overloaded_opcode: BuiltinOpcode::Floor,
        param_types: &[DataType::Double],
        return_type: DataType::Double,
    },
    BuiltinDecl {
        name: "ceil",
        opcode: BuiltinOpcode::Ceil,
        overloaded_opcode: BuiltinOpcode::Ceil,
        param_types: &[DataType::Double],
        return_type: DataType::Double,
    },
    BuiltinDecl {
        name: "abs",
        opcode: BuiltinOpcode::AbsInt64,
        overloaded_opcode: BuiltinOpcode::AbsInt64,
        param_types: &[DataType::Int64],
        return_type: DataType::Int64,
    },
    BuiltinDecl {
        name: "abs",
        opcode: BuiltinOpcode::AbsDouble,
        overloaded_opcode: BuiltinOpcode::AbsInt64,
        param_types: &[DataType::Double],
        return_type: DataType::Double,
    },
    BuiltinDecl {
        name: "round",
        opcode: BuiltinOpcode::RoundFloat,
        overloaded_opcode: BuiltinOpcode::RoundFloat,
        param_types: &[DataType::Float],
        return_type: DataType::Float,
    },
    BuiltinDecl {
        name: "round",
        opcode: BuiltinOpcode::RoundDouble,
        overloaded_opcode: BuiltinOpcode::RoundFloat,
        param_types: &[DataType::Double],
        return_type: DataType::Double,
    },
    BuiltinDecl {
        name: "greatest",
        opcode: BuiltinOpcode::GreatestInt64,
        overloaded_opcode: BuiltinOpcode::GreatestInt64,
        param_types: &[DataType::Int64, DataType::Int64],
        return_type: DataType::Int64,
    },
    BuiltinDecl {
        name: "greatest",
        opcode: BuiltinOpcode::GreatestDouble,
        overloaded_opcode: BuiltinOpcode::GreatestInt64,
        param_types: &[DataType::Double, DataType::Double],
        return_type: DataType::Double,
    },
    BuiltinDecl {
        name: "length",
        opcode: BuiltinOpcode::LengthText,
        overloaded_opcode: BuiltinOpcode::LengthText,
        param_types: &[DataType::Text],
        return_type: DataType::Int32,
    },
    BuiltinDecl {
        name: "now",
        opcode: BuiltinOpcode::NowTimestamp,
        overloaded_opcode: BuiltinOpcode::NowTimestamp,
        param_types: &[],
        return_type: DataType::Timestamp,
    },
];

/// Maps a function name to the newest overload of its chain.
fn opcode_for_name(name: &str) -> Option<BuiltinOpcode> {
    Some(match name {
        "cast" => BuiltinOpcode::CastDoubleToText,
        "token" => BuiltinOpcode::Token,
        "floor" => BuiltinOpcode::Floor,
        "ceil" => BuiltinOpcode::Ceil,
        "abs" => BuiltinOpcode::AbsDouble,
        "round" => BuiltinOpcode::RoundDouble,
        "greatest" => BuiltinOpcode::GreatestDouble,
        "length" => BuiltinOpcode::LengthText,
        "now" => BuiltinOpcode::NowTimestamp,
        _ => return None,
    })
}

fn decl_for(opcode: BuiltinOpcode) -> &'static BuiltinDecl {
    let decl = &DIRECTORY[opcode as usize];
    debug_assert_eq!(decl.opcode, opcode);
    decl
}

/// Errors from builtin resolution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuiltinError {
    /// No builtin with this name, or no overload matching the arguments.
    #[error("no match found for builtin function '{name}' with the given arguments")]
    NotFound {
        /// The function name.
        name: String,
    },
    /// More than one overload matched in the same resolution pass.
    #[error("found too many matching overloads for builtin function '{name}'")]
    TooManyMatches {
        /// The function name.
        name: String,
    },
    /// The caller's expected return type is incompatible with the resolved
    /// overload.
    #[error("builtin function '{name}' returns {actual}, which does not convert to {expected}")]
    ReturnTypeMismatch {
        /// The function name.
        name: String,
        /// The caller's expected return type.
        expected: DataType,
        /// The overload's declared return type.
        actual: DataType,
    },
}

/// A resolved builtin call.
#[derive(Debug)]
pub struct BuiltinCall {
    /// The resolved overload's opcode.
    pub opcode: BuiltinOpcode,
    /// The resolved overload's declaration.
    pub decl: &'static BuiltinDecl,
    /// The call's return type: the caller's expected type when one was
    /// given, the declaration's otherwise.
    pub return_type: DataType,
}

/// Checks the actual argument types against a signature using `compatible`
/// as the per-parameter predicate. A `TypeArgs` formal accepts all
/// remaining arguments.
fn matches_signature(
    signature: &[DataType],
    actual_types: &[DataType],
    compatible: fn(DataType, DataType) -> bool,
) -> bool {
    for (index, &formal) in signature.iter().enumerate() {
        if formal == DataType::TypeArgs {
            return true;
        }
        if index >= actual_types.len() || !compatible(formal, actual_types[index]) {
            return false;
        }
    }
    actual_types.len() == signature.len()
}

/// Walks one overload chain and finds the unique declaration whose
/// signature matches under `compatible`.
fn find_match(
    name: &str,
    compatible: fn(DataType, DataType) -> bool,
    start: BuiltinOpcode,
    actual_types: &[DataType],
) -> Result<(BuiltinOpcode, &'static BuiltinDecl), BuiltinError> {
    let mut found: Option<(BuiltinOpcode, &'static BuiltinDecl)> = None;
    let mut opcode = start;
    loop {
        let decl = decl_for(opcode);
        if matches_signature(decl.param_types, actual_types, compatible) {
            if found.is_some() {
                return Err(BuiltinError::TooManyMatches { name: name.to_string() });
            }
            found = Some((opcode, decl));
        }
        if opcode == decl.overloaded_opcode {
            break;
        }
        opcode = decl.overloaded_opcode;
    }
    found.ok_or_else(|| BuiltinError::NotFound { name: name.to_string() })
}

/// Finds the builtin opcode, declaration, and return type for a call.
///
/// Resolution tries an exact signature match first, then (except for
/// `cast`) a similar match, then a convertible match. If
/// `expected_return_type` is given and not [`DataType::Unknown`], the
/// resolved overload's return type must be convertible to it.
pub fn find_opcode(
    name: &str,
    actual_types: &[DataType],
    expected_return_type: Option<DataType>,
) -> Result<BuiltinCall, BuiltinError> {
    let Some(start) = opcode_for_name(name) else {
        trace!(name, "builtin function is not found");
        return Err(BuiltinError::NotFound { name: name.to_string() });
    };

    let mut result = find_match(name, |formal, actual| formal == actual, start, actual_types);
    trace!(name, ok = result.is_ok(), "exact match for builtin call");

    if name != CAST_FUNC_NAME && matches!(result, Err(BuiltinError::NotFound { .. })) {
        result = find_match(name, is_similar, start, actual_types);
        trace!(name, ok = result.is_ok(), "similar match for builtin call");

        if matches!(result, Err(BuiltinError::NotFound { .. })) {
            result = find_match(name, is_convertible, start, actual_types);
            trace!(name, ok = result.is_ok(), "convertible match for builtin call");
        }
    }

    let (opcode, decl) = result?;
    let return_type = match expected_return_type {
        None | Some(DataType::Unknown) => decl.return_type,
        Some(expected) => {
            if !is_convertible(expected, decl.return_type) {
                return Err(BuiltinError::ReturnTypeMismatch {
                    name: name.to_string(),
                    expected,
                    actual: decl.return_type,
                });
            }
            expected
        }
    };

    Ok(BuiltinCall {
        opcode,
        decl,
        return_type,
    })
}
