//! Type-operation registry.
//!
//! Three lazily initialised, read-only tables consulted by the code
//! generator:
//!
//! 1. binary-op descriptors keyed by `(op, lhs id, rhs id)`
//! 2. unary-op descriptors keyed by `(op, operand id)`
//! 3. conversion descriptors keyed by `(from id, to id)`
//!
//! Each descriptor names either an inline fast path (all-primitive operands
//! lower to native LLVM instructions) or the runtime helper that implements
//! the operation on boxed values. [`find_operable_path`] resolves mixed-type
//! operand pairs to a pair for which a descriptor exists.

use crate::ast::{BinaryOp, UnaryOp};
use crate::types::{
    base_type_id, TYPE_ANY, TYPE_BOOL, TYPE_DOUBLE, TYPE_INT, TYPE_LIST, TYPE_STRING,
};
use std::collections::HashMap;
use std::sync::LazyLock;

/// Comparison codes passed to `py_object_compare`.
pub const CMP_EQ: i32 = 0;
pub const CMP_NE: i32 = 1;
pub const CMP_LT: i32 = 2;
pub const CMP_LE: i32 = 3;
pub const CMP_GT: i32 = 4;
pub const CMP_GE: i32 = 5;

/// Map a relational operator to its runtime comparison code.
pub fn comparison_code(op: BinaryOp) -> Option<i32> {
    match op {
        BinaryOp::Eq => Some(CMP_EQ),
        BinaryOp::NotEq => Some(CMP_NE),
        BinaryOp::Lt => Some(CMP_LT),
        BinaryOp::Le => Some(CMP_LE),
        BinaryOp::Gt => Some(CMP_GT),
        BinaryOp::Ge => Some(CMP_GE),
        _ => None,
    }
}

/// Inline lowering strategies for all-primitive operand pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InlineBinary {
    /// `add`/`sub`/`mul`/`srem` on i32
    IntArith,
    /// `fadd`/`fsub`/`fmul`/`fdiv`/`frem` on double
    FloatArith,
    /// `sdiv` on i32
    IntFloorDiv,
    /// `fdiv` + `llvm.floor.f64`
    FloatFloorDiv,
    /// via `llvm.pow.f64` with round-trip through double
    IntPow,
    /// `llvm.pow.f64`
    FloatPow,
    /// `icmp` with a signed predicate
    IntCompare,
    /// `fcmp` with an ordered predicate
    FloatCompare,
}

/// Inline lowering strategies for unary operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InlineUnary {
    /// `sub i32 0, x`
    IntNeg,
    /// `fneg`
    FloatNeg,
    /// no code emitted
    Identity,
    /// condition-ify then `xor i1 .., true`
    LogicalNot,
}

/// How a binary operation on a given operand-id pair lowers.
#[derive(Debug)]
pub struct BinaryOpDesc {
    pub result_type_id: u32,
    /// Runtime helper for boxed operands (comparisons use
    /// `py_object_compare` plus [`comparison_code`])
    pub runtime_fn: Option<&'static str>,
    pub inline: Option<InlineBinary>,
}

#[derive(Debug)]
pub struct UnaryOpDesc {
    pub result_type_id: u32,
    pub inline: InlineUnary,
}

type BinaryKey = (BinaryOp, u32, u32);

static BINARY_OPS: LazyLock<HashMap<BinaryKey, BinaryOpDesc>> = LazyLock::new(|| {
    use BinaryOp::*;
    let mut m = HashMap::new();

    let mut ins = |op: BinaryOp,
                   l: u32,
                   r: u32,
                   result: u32,
                   runtime_fn: Option<&'static str>,
                   inline: Option<InlineBinary>| {
        m.insert(
            (op, l, r),
            BinaryOpDesc {
                result_type_id: result,
                runtime_fn,
                inline,
            },
        );
    };

    // Integer arithmetic (true division produces double, so `/` has no
    // int-int entry; find_operable_path widens to double).
    for op in [Add, Sub, Mul, Mod] {
        ins(op, TYPE_INT, TYPE_INT, TYPE_INT, None, Some(InlineBinary::IntArith));
    }
    ins(
        FloorDiv,
        TYPE_INT,
        TYPE_INT,
        TYPE_INT,
        None,
        Some(InlineBinary::IntFloorDiv),
    );
    ins(Pow, TYPE_INT, TYPE_INT, TYPE_INT, None, Some(InlineBinary::IntPow));

    // Double arithmetic
    for op in [Add, Sub, Mul, Div, Mod] {
        ins(
            op,
            TYPE_DOUBLE,
            TYPE_DOUBLE,
            TYPE_DOUBLE,
            None,
            Some(InlineBinary::FloatArith),
        );
    }
    ins(
        FloorDiv,
        TYPE_DOUBLE,
        TYPE_DOUBLE,
        TYPE_DOUBLE,
        None,
        Some(InlineBinary::FloatFloorDiv),
    );
    ins(
        Pow,
        TYPE_DOUBLE,
        TYPE_DOUBLE,
        TYPE_DOUBLE,
        None,
        Some(InlineBinary::FloatPow),
    );

    // Primitive comparisons
    for op in [Eq, NotEq, Lt, Le, Gt, Ge] {
        ins(op, TYPE_INT, TYPE_INT, TYPE_BOOL, None, Some(InlineBinary::IntCompare));
        ins(
            op,
            TYPE_DOUBLE,
            TYPE_DOUBLE,
            TYPE_BOOL,
            None,
            Some(InlineBinary::FloatCompare),
        );
    }
    for op in [Eq, NotEq] {
        ins(op, TYPE_BOOL, TYPE_BOOL, TYPE_BOOL, None, Some(InlineBinary::IntCompare));
    }

    // String concatenation and comparison go through the runtime.
    ins(Add, TYPE_STRING, TYPE_STRING, TYPE_STRING, Some("py_object_add"), None);
    for op in [Eq, NotEq, Lt, Le, Gt, Ge] {
        ins(
            op,
            TYPE_STRING,
            TYPE_STRING,
            TYPE_BOOL,
            Some("py_object_compare"),
            None,
        );
    }

    // List concatenation and equality.
    ins(Add, TYPE_LIST, TYPE_LIST, TYPE_LIST, Some("py_object_add"), None);
    for op in [Eq, NotEq] {
        ins(
            op,
            TYPE_LIST,
            TYPE_LIST,
            TYPE_BOOL,
            Some("py_object_compare"),
            None,
        );
    }

    // Dynamic operands dispatch to the generic object helpers.
    ins(Add, TYPE_ANY, TYPE_ANY, TYPE_ANY, Some("py_object_add"), None);
    ins(Sub, TYPE_ANY, TYPE_ANY, TYPE_ANY, Some("py_object_subtract"), None);
    ins(Mul, TYPE_ANY, TYPE_ANY, TYPE_ANY, Some("py_object_multiply"), None);
    ins(Div, TYPE_ANY, TYPE_ANY, TYPE_ANY, Some("py_object_divide"), None);
    ins(FloorDiv, TYPE_ANY, TYPE_ANY, TYPE_ANY, Some("py_object_divide"), None);
    ins(Mod, TYPE_ANY, TYPE_ANY, TYPE_ANY, Some("py_object_modulo"), None);
    for op in [Eq, NotEq, Lt, Le, Gt, Ge] {
        ins(
            op,
            TYPE_ANY,
            TYPE_ANY,
            TYPE_BOOL,
            Some("py_object_compare"),
            None,
        );
    }

    m
});

static UNARY_OPS: LazyLock<HashMap<(UnaryOp, u32), UnaryOpDesc>> = LazyLock::new(|| {
    use UnaryOp::*;
    let mut m = HashMap::new();
    m.insert(
        (Neg, TYPE_INT),
        UnaryOpDesc {
            result_type_id: TYPE_INT,
            inline: InlineUnary::IntNeg,
        },
    );
    m.insert(
        (Neg, TYPE_DOUBLE),
        UnaryOpDesc {
            result_type_id: TYPE_DOUBLE,
            inline: InlineUnary::FloatNeg,
        },
    );
    m.insert(
        (Pos, TYPE_INT),
        UnaryOpDesc {
            result_type_id: TYPE_INT,
            inline: InlineUnary::Identity,
        },
    );
    m.insert(
        (Pos, TYPE_DOUBLE),
        UnaryOpDesc {
            result_type_id: TYPE_DOUBLE,
            inline: InlineUnary::Identity,
        },
    );
    for id in [TYPE_BOOL, TYPE_INT, TYPE_DOUBLE, TYPE_STRING, TYPE_LIST, TYPE_ANY] {
        m.insert(
            (Not, id),
            UnaryOpDesc {
                result_type_id: TYPE_BOOL,
                inline: InlineUnary::LogicalNot,
            },
        );
    }
    m
});

static CONVERSIONS: LazyLock<HashMap<(u32, u32), &'static str>> = LazyLock::new(|| {
    let mut m = HashMap::new();
    m.insert((TYPE_INT, TYPE_DOUBLE), "py_convert_int_to_double");
    m.insert((TYPE_DOUBLE, TYPE_INT), "py_convert_double_to_int");
    m.insert((TYPE_ANY, TYPE_INT), "py_convert_any_to_int");
    m.insert((TYPE_ANY, TYPE_DOUBLE), "py_convert_any_to_double");
    m.insert((TYPE_ANY, TYPE_BOOL), "py_convert_any_to_bool");
    m.insert((TYPE_ANY, TYPE_STRING), "py_convert_any_to_string");
    m
});

/// Look up a binary descriptor. Parameterised container ids collapse to
/// their base before lookup.
pub fn binary_desc(op: BinaryOp, lhs: u32, rhs: u32) -> Option<&'static BinaryOpDesc> {
    BINARY_OPS.get(&(op, base_type_id(lhs), base_type_id(rhs)))
}

/// Look up a unary descriptor.
pub fn unary_desc(op: UnaryOp, operand: u32) -> Option<&'static UnaryOpDesc> {
    UNARY_OPS.get(&(op, base_type_id(operand)))
}

/// Runtime helper converting a boxed value of `from` into a boxed `to`.
pub fn conversion_fn(from: u32, to: u32) -> Option<&'static str> {
    CONVERSIONS.get(&(base_type_id(from), base_type_id(to))).copied()
}

/// Resolve `(op, lhs, rhs)` to an operand-type pair for which a descriptor
/// exists, inserting the standard promotions:
///
/// - `bool` promotes to `int`
/// - mixed `int`/`double` widens to `(double, double)`
/// - `int / int` widens to `(double, double)` (true division)
/// - pairs involving `any` fall back to boxed `(any, any)` dispatch
///
/// Returns `None` when no coercion path exists — the caller reports an
/// unsupported-operand type error.
pub fn find_operable_path(op: BinaryOp, lhs: u32, rhs: u32) -> Option<(u32, u32)> {
    let l = base_type_id(lhs);
    let r = base_type_id(rhs);

    let has = |l: u32, r: u32| BINARY_OPS.contains_key(&(op, l, r));

    if has(l, r) {
        return Some((l, r));
    }

    // bool behaves as int in numeric contexts
    let l1 = if l == TYPE_BOOL { TYPE_INT } else { l };
    let r1 = if r == TYPE_BOOL { TYPE_INT } else { r };
    if has(l1, r1) {
        return Some((l1, r1));
    }

    // int widens to double in mixed arithmetic/comparison
    let numeric = |id: u32| id == TYPE_INT || id == TYPE_DOUBLE;
    if numeric(l1) && numeric(r1) && has(TYPE_DOUBLE, TYPE_DOUBLE) {
        return Some((TYPE_DOUBLE, TYPE_DOUBLE));
    }

    // A statically unknown operand forces boxed dispatch; two concrete but
    // incompatible operands do not (they are a compile-time type error).
    if (l1 == TYPE_ANY || r1 == TYPE_ANY) && has(TYPE_ANY, TYPE_ANY) {
        return Some((TYPE_ANY, TYPE_ANY));
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LIST_BASE;

    #[test]
    fn test_int_arithmetic_is_inline() {
        let desc = binary_desc(BinaryOp::Add, TYPE_INT, TYPE_INT).unwrap();
        assert_eq!(desc.result_type_id, TYPE_INT);
        assert_eq!(desc.inline, Some(InlineBinary::IntArith));
        assert!(desc.runtime_fn.is_none());
    }

    #[test]
    fn test_true_division_widens_ints() {
        assert!(binary_desc(BinaryOp::Div, TYPE_INT, TYPE_INT).is_none());
        assert_eq!(
            find_operable_path(BinaryOp::Div, TYPE_INT, TYPE_INT),
            Some((TYPE_DOUBLE, TYPE_DOUBLE))
        );
    }

    #[test]
    fn test_mixed_numeric_widens() {
        assert_eq!(
            find_operable_path(BinaryOp::Add, TYPE_INT, TYPE_DOUBLE),
            Some((TYPE_DOUBLE, TYPE_DOUBLE))
        );
        assert_eq!(
            find_operable_path(BinaryOp::Mul, TYPE_DOUBLE, TYPE_INT),
            Some((TYPE_DOUBLE, TYPE_DOUBLE))
        );
    }

    #[test]
    fn test_bool_promotes_to_int() {
        assert_eq!(
            find_operable_path(BinaryOp::Add, TYPE_BOOL, TYPE_INT),
            Some((TYPE_INT, TYPE_INT))
        );
    }

    #[test]
    fn test_any_falls_back_to_boxed_dispatch() {
        assert_eq!(
            find_operable_path(BinaryOp::Add, TYPE_ANY, TYPE_INT),
            Some((TYPE_ANY, TYPE_ANY))
        );
        let desc = binary_desc(BinaryOp::Add, TYPE_ANY, TYPE_ANY).unwrap();
        assert_eq!(desc.runtime_fn, Some("py_object_add"));
    }

    #[test]
    fn test_incompatible_concrete_operands_have_no_path() {
        assert_eq!(find_operable_path(BinaryOp::Add, TYPE_INT, TYPE_STRING), None);
        assert_eq!(find_operable_path(BinaryOp::Sub, TYPE_STRING, TYPE_STRING), None);
    }

    #[test]
    fn test_parameterised_ids_collapse_to_base() {
        let desc = binary_desc(BinaryOp::Add, LIST_BASE + TYPE_INT, LIST_BASE + TYPE_INT).unwrap();
        assert_eq!(desc.runtime_fn, Some("py_object_add"));
        assert_eq!(desc.result_type_id, TYPE_LIST);
    }

    #[test]
    fn test_comparison_codes() {
        assert_eq!(comparison_code(BinaryOp::Eq), Some(CMP_EQ));
        assert_eq!(comparison_code(BinaryOp::NotEq), Some(CMP_NE));
        assert_eq!(comparison_code(BinaryOp::Lt), Some(CMP_LT));
        assert_eq!(comparison_code(BinaryOp::Le), Some(CMP_LE));
        assert_eq!(comparison_code(BinaryOp::Gt), Some(CMP_GT));
        assert_eq!(comparison_code(BinaryOp::Ge), Some(CMP_GE));
        assert_eq!(comparison_code(BinaryOp::Add), None);
    }

    #[test]
    fn test_unary_descriptors() {
        assert_eq!(
            unary_desc(UnaryOp::Neg, TYPE_INT).unwrap().inline,
            InlineUnary::IntNeg
        );
        assert_eq!(
            unary_desc(UnaryOp::Not, TYPE_ANY).unwrap().result_type_id,
            TYPE_BOOL
        );
        assert!(unary_desc(UnaryOp::Neg, TYPE_STRING).is_none());
    }

    #[test]
    fn test_conversions() {
        assert_eq!(
            conversion_fn(TYPE_INT, TYPE_DOUBLE),
            Some("py_convert_int_to_double")
        );
        assert_eq!(
            conversion_fn(TYPE_ANY, TYPE_BOOL),
            Some("py_convert_any_to_bool")
        );
        assert_eq!(conversion_fn(TYPE_STRING, TYPE_INT), None);
    }
}
