//! Abstract syntax tree.
//!
//! Two closed hierarchies: [`ExprKind`] and [`StmtKind`]. Every node carries
//! a source location and expressions carry a cached type slot, filled by the
//! parser when a literal or annotation makes the type obvious and refined by
//! the code generator otherwise. The tree is exclusively owned top-down:
//! the module owns its statements, statements own their sub-expressions,
//! expressions form a tree. No cycles, no sharing.

use crate::types::PyType;

/// Source position of a node, 1-indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Loc {
    pub line: usize,
    pub column: usize,
}

impl Loc {
    pub fn new(line: usize, column: usize) -> Self {
        Loc { line, column }
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    /// `+x`
    Pos,
    /// `-x`
    Neg,
    /// `not x`
    Not,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Pos => "+",
            UnaryOp::Neg => "-",
            UnaryOp::Not => "not",
        }
    }
}

/// Binary operators, restricted to the kinds in the operator table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    NotEq,
    Is,
    IsNot,
    In,
    NotIn,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::FloorDiv => "//",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "**",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::Le => "<=",
            BinaryOp::Ge => ">=",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::Is => "is",
            BinaryOp::IsNot => "is not",
            BinaryOp::In => "in",
            BinaryOp::NotIn => "not in",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
        }
    }

    /// The relational operators, which lower to `py_object_compare` codes.
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Lt
                | BinaryOp::Gt
                | BinaryOp::Le
                | BinaryOp::Ge
                | BinaryOp::Eq
                | BinaryOp::NotEq
        )
    }
}

/// An expression node with location and cached type.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub loc: Loc,
    /// Filled by the parser for literals and obvious coercions; the code
    /// generator computes types on demand otherwise.
    pub ty: Option<PyType>,
}

impl Expr {
    pub fn new(kind: ExprKind, loc: Loc) -> Self {
        Expr {
            kind,
            loc,
            ty: None,
        }
    }

    pub fn with_type(kind: ExprKind, loc: Loc, ty: PyType) -> Self {
        Expr {
            kind,
            loc,
            ty: Some(ty),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// Numeric literal; the original spelling is kept for exact lowering
    Number { text: String, is_float: bool },
    Str(String),
    Bool(bool),
    NoneLit,
    Variable(String),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// The callee is a full expression, permitting chained calls
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Index {
        target: Box<Expr>,
        index: Box<Expr>,
    },
    List(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
}

/// A block is a non-empty statement sequence.
pub type Block = Vec<Stmt>;

/// A statement node with location.
#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub loc: Loc,
}

impl Stmt {
    pub fn new(kind: StmtKind, loc: Loc) -> Self {
        Stmt { kind, loc }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Expr(Expr),
    Assign {
        name: String,
        value: Expr,
    },
    /// `a[i] = v`; the target is always an `Index` expression
    IndexAssign {
        target: Expr,
        value: Expr,
    },
    Return(Option<Expr>),
    If {
        cond: Expr,
        then_block: Block,
        /// An `elif` chain nests as a single `If` statement in this slot
        else_block: Option<Block>,
    },
    While {
        cond: Expr,
        body: Block,
        /// Runs if the loop completes without `break`
        else_block: Option<Block>,
    },
    For {
        var: String,
        iterable: Expr,
        body: Block,
        else_block: Option<Block>,
    },
    Break,
    Continue,
    Print(Expr),
    Pass,
    Import {
        module: String,
        alias: Option<String>,
    },
    Class(ClassDef),
    FunctionDef(Function),
}

/// A function parameter; the annotation stays a string until the type
/// registry resolves it.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub annotation: Option<String>,
    pub loc: Loc,
}

/// A function definition (top-level, nested, or a class method).
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub params: Vec<Param>,
    pub return_annotation: Option<String>,
    pub body: Block,
    /// Name of the enclosing class for methods
    pub class_context: Option<String>,
    pub loc: Loc,
}

/// A class definition; methods are collected separately from the other
/// body statements.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassDef {
    pub name: String,
    pub bases: Vec<String>,
    pub body: Block,
    pub methods: Vec<Function>,
    pub loc: Loc,
}

/// A parsed module: the exclusive owner of its top-level statements.
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub name: String,
    pub statements: Vec<Stmt>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Module {
            name: name.into(),
            statements: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expr_type_slot() {
        let loc = Loc::new(1, 1);
        let untyped = Expr::new(ExprKind::Variable("x".to_string()), loc);
        assert!(untyped.ty.is_none());

        let typed = Expr::with_type(
            ExprKind::Number {
                text: "42".to_string(),
                is_float: false,
            },
            loc,
            PyType::int(),
        );
        assert_eq!(typed.ty.unwrap(), PyType::int());
    }

    #[test]
    fn test_binary_op_symbols() {
        assert_eq!(BinaryOp::FloorDiv.symbol(), "//");
        assert_eq!(BinaryOp::NotIn.symbol(), "not in");
        assert!(BinaryOp::Le.is_comparison());
        assert!(!BinaryOp::Add.is_comparison());
        assert!(!BinaryOp::And.is_comparison());
    }
}
