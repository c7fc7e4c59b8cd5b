//! The diagnostic code registry.
//!
//! Codes are part of the compiler's external contract: build tooling and
//! editor integrations parse them, so numbers are stable and never reused.
//! Codes in the 200..=299 band are warnings (plus the historical exception
//! of 78); everything else is an error.

use crate::diag::Severity;

pub const FUNCTION_NOT_DEFINED: u16 = 4;
pub const MUST_ASSIGN_TO_ARRAY: u16 = 6;
pub const NOT_CONSTANT: u16 = 8;
pub const INVALID_ARRAY_SIZE: u16 = 9;
pub const INVALID_STATEMENT: u16 = 10;
pub const NO_ENTRY_POINT: u16 = 13;
pub const UNDEFINED_SYMBOL: u16 = 17;
pub const NOT_LVALUE: u16 = 22;
pub const ARRAY_ASSIGN_MUST_BE_SIMPLE: u16 = 23;
pub const INVALID_SUBSCRIPT: u16 = 28;
pub const INVALID_EXPRESSION: u16 = 29;
pub const INDEX_OUT_OF_BOUNDS: u16 = 32;
pub const ARRAY_NOT_INDEXED: u16 = 33;
pub const NO_DEFAULT_VALUE: u16 = 34;
pub const ARG_TYPE_MISMATCH: u16 = 35;
pub const SYMBOL_HAS_NO_SIZE: u16 = 39;
pub const DUPLICATE_CASE: u16 = 40;
pub const POSITIONAL_AFTER_NAMED: u16 = 44;
pub const TOO_MANY_ARGUMENTS: u16 = 45;
pub const UNKNOWN_ARRAY_SIZE: u16 = 46;
pub const ARRAY_SIZE_MISMATCH: u16 = 47;
pub const ARRAY_DIMENSION_MISMATCH: u16 = 48;
pub const COMPARE_OP_MUST_RETURN_BOOL: u16 = 51;
pub const ARGUMENT_ALREADY_SET: u16 = 58;
pub const STATIC_ASSERT_FAILED: u16 = 70;
pub const FUNCTION_HAS_NO_SIZE: u16 = 72;
pub const INVALID_FUNCTION_REFERENCE: u16 = 76;
pub const INVALID_INDEX_TAG: u16 = 77;
pub const MIXED_RETURN_STYLES: u16 = 78;
pub const MIXED_ARRAY_RETURN: u16 = 79;
pub const NATIVE_ARRAY_RETURN: u16 = 83;
pub const CTOR_CALLED_AS_METHOD: u16 = 84;
pub const RETURN_VALUE_IN_VOID: u16 = 88;
pub const CAST_OF_VOID_VALUE: u16 = 89;
pub const PUBLIC_ARRAY_RETURN: u16 = 90;
pub const ARGUMENT_COUNT_MISMATCH: u16 = 92;
pub const DIVIDE_BY_ZERO: u16 = 93;
pub const CAST_TO_ENUM_STRUCT: u16 = 95;
pub const NOT_A_MEMBER: u16 = 96;
pub const INTEGER_OVERFLOW: u16 = 97;
pub const NOT_A_METHODMAP: u16 = 104;
pub const MEMBER_NOT_FOUND: u16 = 105;
pub const NOT_A_SCALAR: u16 = 106;
pub const FIELD_ACCESS_ON_FUNCTION: u16 = 107;
pub const STATIC_ACCESS_INVALID: u16 = 108;
pub const SIZEOF_INDEX_ENUM_STRUCT: u16 = 111;
pub const STATIC_FIELD_NOT_ENUM_STRUCT: u16 = 112;
pub const NO_DESTRUCTOR: u16 = 115;
pub const INVALID_NEW_TARGET: u16 = 116;
pub const ENUM_STRUCT_ARRAY_INDEX: u16 = 117;
pub const INDETERMINATE_ARRAY_RETURN: u16 = 128;
pub const FORWARD_ARRAY_RETURN: u16 = 141;
pub const REFARRAY_NOT_ALLOWED: u16 = 142;
pub const VOID_NOT_ALLOWED: u16 = 144;
pub const VOID_ARRAY: u16 = 145;
pub const PROPERTY_HAS_NO_GETTER: u16 = 149;
pub const PROPERTY_HAS_NO_SETTER: u16 = 152;
pub const SIZEOF_INDETERMINATE: u16 = 163;
pub const DELETE_KIND_INVALID: u16 = 167;
pub const MUST_CONSTRUCT_WITH_NEW: u16 = 170;
pub const CANNOT_USE_NEW: u16 = 171;
pub const NO_CONSTRUCTOR: u16 = 172;
pub const TYPE_AS_VALUE: u16 = 174;
pub const INSTANCE_METHOD_ON_TYPE: u16 = 176;
pub const STATIC_METHOD_ON_INSTANCE: u16 = 177;
pub const STRING_ARG_MISMATCH: u16 = 178;
pub const STRING_ASSIGN_MISMATCH: u16 = 179;
pub const FORWARD_TAG_MISMATCH: u16 = 180;
pub const ARRAY_RETURN_REFERENCE: u16 = 182;

// Warning band.
pub const UNUSED_SYMBOL: u16 = 203;
pub const ASSIGNED_NEVER_READ: u16 = 204;
pub const ALWAYS_FALSE: u16 = 205;
pub const ALWAYS_TRUE: u16 = 206;
pub const SHOULD_RETURN_VALUE: u16 = 209;
pub const TAG_MISMATCH: u16 = 213;
pub const NO_EFFECT: u16 = 215;
pub const UNREACHABLE_CODE: u16 = 225;
pub const SELF_ASSIGNMENT: u16 = 226;
pub const INDEX_TAG_MISMATCH: u16 = 229;
pub const DEPRECATED: u16 = 234;
pub const FUNCTION_CAST: u16 = 237;
pub const MISSING_RETURN_VALUE: u16 = 242;
pub const DUPLICATE_FIELD_INIT: u16 = 244;
pub const ARRAY_RETURN_UNDECLARED: u16 = 246;

pub const INTERNAL_NODE_KIND: u16 = 315;
pub const MUST_RETURN_VALUE: u16 = 400;
pub const INVALID_FIELD_INIT: u16 = 405;
pub const RECURSIVE_ANALYSIS: u16 = 411;
pub const RETURN_DIMENSION_MISMATCH: u16 = 413;

/// Severity of a diagnostic code.
///
/// 78 predates the banding and stays a warning for compatibility with the
/// scripts that rely on mixed `return`/`return value` functions compiling.
pub fn severity(code: u16) -> Severity {
    match code {
        MIXED_RETURN_STYLES => Severity::Warning,
        200..=299 => Severity::Warning,
        _ => Severity::Error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warning_band() {
        assert_eq!(severity(UNUSED_SYMBOL), Severity::Warning);
        assert_eq!(severity(TAG_MISMATCH), Severity::Warning);
        assert_eq!(severity(ARRAY_SIZE_MISMATCH), Severity::Error);
        assert_eq!(severity(RECURSIVE_ANALYSIS), Severity::Error);
    }

    #[test]
    fn mixed_returns_is_a_warning() {
        assert_eq!(severity(MIXED_RETURN_STYLES), Severity::Warning);
    }
}
