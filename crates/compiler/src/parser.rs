//! Recursive-descent statement parser with Pratt expression parsing.
//!
//! Statement parsers are selected through a registry keyed by the first
//! token's kind; everything else falls through to the expression-statement
//! path, which parses a full left-hand expression first and only then decides
//! between assignment, compound assignment, index assignment, and a plain
//! expression statement.
//!
//! The operator table is the single source of truth for precedence and
//! associativity:
//!
//! | prec | operators | assoc |
//! |------|-----------|-------|
//! | 4    | `or` | left |
//! | 5    | `and` | left |
//! | 8    | `not` (prefix) | — |
//! | 10   | `<` `>` `<=` `>=` `==` `!=` `is` `is not` `in` `not in` | left |
//! | 20   | `+` `-` | left |
//! | 40   | `*` `/` `//` `%` | left |
//! | 55   | unary `+` `-` | — |
//! | 60   | `**` | right |
//! | 70   | postfix `[]` `()` | — |

use crate::ast::{
    BinaryOp, Block, ClassDef, Expr, ExprKind, Function, Loc, Module, Param, Stmt, StmtKind,
    UnaryOp,
};
use crate::error::CompilationError;
use crate::lexer::TokenStream;
use crate::token::{token_name, Token, TokenKind};
use crate::types::PyType;
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

type ParseResult<T> = Result<T, CompilationError>;

pub const PREC_OR: u8 = 4;
pub const PREC_AND: u8 = 5;
pub const PREC_NOT: u8 = 8;
pub const PREC_COMPARISON: u8 = 10;
pub const PREC_ADDITIVE: u8 = 20;
pub const PREC_MULTIPLICATIVE: u8 = 40;
pub const PREC_UNARY: u8 = 55;
pub const PREC_POWER: u8 = 60;
pub const PREC_POSTFIX: u8 = 70;

/// Binary operator table entry.
#[derive(Debug, Clone, Copy)]
pub struct OpInfo {
    pub op: BinaryOp,
    pub prec: u8,
    pub right_assoc: bool,
}

/// Look up the infix table. Returns `None` for tokens that are not binary
/// operators.
pub fn binary_op_info(kind: TokenKind) -> Option<OpInfo> {
    let (op, prec, right_assoc) = match kind {
        TokenKind::Or => (BinaryOp::Or, PREC_OR, false),
        TokenKind::And => (BinaryOp::And, PREC_AND, false),
        TokenKind::Lt => (BinaryOp::Lt, PREC_COMPARISON, false),
        TokenKind::Gt => (BinaryOp::Gt, PREC_COMPARISON, false),
        TokenKind::Le => (BinaryOp::Le, PREC_COMPARISON, false),
        TokenKind::Ge => (BinaryOp::Ge, PREC_COMPARISON, false),
        TokenKind::EqEq => (BinaryOp::Eq, PREC_COMPARISON, false),
        TokenKind::NotEq => (BinaryOp::NotEq, PREC_COMPARISON, false),
        TokenKind::Is => (BinaryOp::Is, PREC_COMPARISON, false),
        TokenKind::IsNot => (BinaryOp::IsNot, PREC_COMPARISON, false),
        TokenKind::In => (BinaryOp::In, PREC_COMPARISON, false),
        TokenKind::NotIn => (BinaryOp::NotIn, PREC_COMPARISON, false),
        TokenKind::Plus => (BinaryOp::Add, PREC_ADDITIVE, false),
        TokenKind::Minus => (BinaryOp::Sub, PREC_ADDITIVE, false),
        TokenKind::Star => (BinaryOp::Mul, PREC_MULTIPLICATIVE, false),
        TokenKind::Slash => (BinaryOp::Div, PREC_MULTIPLICATIVE, false),
        TokenKind::FloorDiv => (BinaryOp::FloorDiv, PREC_MULTIPLICATIVE, false),
        TokenKind::Percent => (BinaryOp::Mod, PREC_MULTIPLICATIVE, false),
        TokenKind::Power => (BinaryOp::Pow, PREC_POWER, true),
        _ => return None,
    };
    Some(OpInfo {
        op,
        prec,
        right_assoc,
    })
}

/// Compound-assignment token -> desugared binary operator.
fn compound_assign_op(kind: TokenKind) -> Option<BinaryOp> {
    match kind {
        TokenKind::PlusAssign => Some(BinaryOp::Add),
        TokenKind::MinusAssign => Some(BinaryOp::Sub),
        TokenKind::StarAssign => Some(BinaryOp::Mul),
        TokenKind::SlashAssign => Some(BinaryOp::Div),
        TokenKind::PercentAssign => Some(BinaryOp::Mod),
        TokenKind::PowerAssign => Some(BinaryOp::Pow),
        TokenKind::FloorDivAssign => Some(BinaryOp::FloorDiv),
        _ => None,
    }
}

type StmtParseFn = fn(&mut Parser) -> ParseResult<Stmt>;
type PrefixParseFn = fn(&mut Parser) -> ParseResult<Expr>;

/// Statement dispatch registry keyed by the statement's first token.
static STMT_PARSERS: LazyLock<HashMap<TokenKind, StmtParseFn>> = LazyLock::new(|| {
    let mut m: HashMap<TokenKind, StmtParseFn> = HashMap::new();
    m.insert(TokenKind::Def, Parser::parse_def);
    m.insert(TokenKind::Class, Parser::parse_class);
    m.insert(TokenKind::If, Parser::parse_if);
    m.insert(TokenKind::While, Parser::parse_while);
    m.insert(TokenKind::For, Parser::parse_for);
    m.insert(TokenKind::Return, Parser::parse_return);
    m.insert(TokenKind::Print, Parser::parse_print);
    m.insert(TokenKind::Import, Parser::parse_import);
    m.insert(TokenKind::Pass, Parser::parse_pass);
    m.insert(TokenKind::Break, Parser::parse_break);
    m.insert(TokenKind::Continue, Parser::parse_continue);
    m
});

/// Prefix (atom) registry for expression starts.
static PREFIX_PARSERS: LazyLock<HashMap<TokenKind, PrefixParseFn>> = LazyLock::new(|| {
    let mut m: HashMap<TokenKind, PrefixParseFn> = HashMap::new();
    m.insert(TokenKind::Integer, Parser::parse_number);
    m.insert(TokenKind::Float, Parser::parse_number);
    m.insert(TokenKind::Str, Parser::parse_string);
    m.insert(TokenKind::Bool, Parser::parse_bool);
    m.insert(TokenKind::None, Parser::parse_none);
    m.insert(TokenKind::Identifier, Parser::parse_variable);
    m.insert(TokenKind::LParen, Parser::parse_grouping);
    m.insert(TokenKind::LBracket, Parser::parse_list_literal);
    m.insert(TokenKind::LBrace, Parser::parse_dict_literal);
    m
});

pub struct Parser {
    stream: TokenStream,
    module_name: String,
}

impl Parser {
    pub fn new(stream: TokenStream, module_name: impl Into<String>) -> Self {
        Parser {
            stream,
            module_name: module_name.into(),
        }
    }

    /// Parse the whole token stream into a module.
    pub fn parse_module(mut self) -> ParseResult<Module> {
        let mut module = Module::new(self.module_name.clone());

        loop {
            self.skip_newlines();
            if self.stream.is_at_end() {
                break;
            }
            if self.peek_kind() == TokenKind::Indent {
                return Err(self.err_here("unexpected indent"));
            }
            module.statements.push(self.parse_statement()?);
        }

        Ok(module)
    }

    // === Statements ===

    fn parse_statement(&mut self) -> ParseResult<Stmt> {
        let kind = self.peek_kind();

        if kind == TokenKind::Error {
            let tok = self.stream.peek();
            return Err(CompilationError::lex(tok.line, tok.column, tok.text.clone()));
        }
        if kind.is_unsupported_keyword() {
            let tok = self.stream.peek();
            return Err(CompilationError::parse(
                tok.line,
                tok.column,
                format!("{} is not supported", token_name(kind)),
            ));
        }

        if let Some(parse_fn) = STMT_PARSERS.get(&kind) {
            return parse_fn(self);
        }

        self.parse_expr_or_assign()
    }

    /// Expression-statement path. The left-hand side is parsed as a full
    /// expression first; the next token decides what the statement is.
    fn parse_expr_or_assign(&mut self) -> ParseResult<Stmt> {
        let loc = self.here();
        let lhs = self.parse_expr(0)?;

        let next = self.peek_kind();

        if next == TokenKind::Assign {
            self.stream.next();
            let value = self.parse_expr(0)?;
            self.expect_statement_end()?;
            return match lhs.kind {
                ExprKind::Variable(name) => Ok(Stmt::new(StmtKind::Assign { name, value }, loc)),
                ExprKind::Index { .. } => {
                    Ok(Stmt::new(StmtKind::IndexAssign { target: lhs, value }, loc))
                }
                _ => Err(CompilationError::parse(
                    lhs.loc.line,
                    lhs.loc.column,
                    "left-hand side of assignment is not assignable",
                )),
            };
        }

        if let Some(op) = compound_assign_op(next) {
            let op_tok = self.stream.next();
            let rhs = self.parse_expr(0)?;
            self.expect_statement_end()?;
            return match lhs.kind {
                ExprKind::Variable(name) => {
                    // Desugar `x op= e` to `x = x op e` with a fresh variable
                    // reference on the right.
                    let value = Expr::new(
                        ExprKind::Binary {
                            op,
                            lhs: Box::new(Expr::new(
                                ExprKind::Variable(name.clone()),
                                lhs.loc,
                            )),
                            rhs: Box::new(rhs),
                        },
                        Loc::new(op_tok.line, op_tok.column),
                    );
                    Ok(Stmt::new(StmtKind::Assign { name, value }, loc))
                }
                ExprKind::Index { .. } => Err(CompilationError::parse(
                    op_tok.line,
                    op_tok.column,
                    "compound assignment to an indexed target is not supported yet",
                )),
                _ => Err(CompilationError::parse(
                    lhs.loc.line,
                    lhs.loc.column,
                    "left-hand side of assignment is not assignable",
                )),
            };
        }

        match next {
            TokenKind::Newline | TokenKind::Eof | TokenKind::Dedent => {
                self.expect_statement_end()?;
                Ok(Stmt::new(StmtKind::Expr(lhs), loc))
            }
            other => Err(self.err_here(format!(
                "unexpected token {} after expression",
                token_name(other)
            ))),
        }
    }

    fn parse_if(&mut self) -> ParseResult<Stmt> {
        let loc = self.here();
        // `elif` re-enters this parser to build the right-leaning chain.
        self.stream.next();
        let cond = self.parse_expr(0)?;
        let then_block = self.parse_block()?;

        let else_block = match self.peek_kind() {
            TokenKind::Elif => {
                let elif = self.parse_if()?;
                Some(vec![elif])
            }
            TokenKind::Else => {
                self.stream.next();
                Some(self.parse_block()?)
            }
            _ => None,
        };

        Ok(Stmt::new(
            StmtKind::If {
                cond,
                then_block,
                else_block,
            },
            loc,
        ))
    }

    fn parse_while(&mut self) -> ParseResult<Stmt> {
        let loc = self.here();
        self.stream.next();
        let cond = self.parse_expr(0)?;
        let body = self.parse_block()?;
        let else_block = if self.peek_kind() == TokenKind::Else {
            self.stream.next();
            Some(self.parse_block()?)
        } else {
            None
        };
        Ok(Stmt::new(
            StmtKind::While {
                cond,
                body,
                else_block,
            },
            loc,
        ))
    }

    fn parse_for(&mut self) -> ParseResult<Stmt> {
        let loc = self.here();
        self.stream.next();
        let var = self.expect(TokenKind::Identifier, "loop variable name")?.text;
        self.expect(TokenKind::In, "'in'")?;
        let iterable = self.parse_expr(0)?;
        let body = self.parse_block()?;
        let else_block = if self.peek_kind() == TokenKind::Else {
            self.stream.next();
            Some(self.parse_block()?)
        } else {
            None
        };
        Ok(Stmt::new(
            StmtKind::For {
                var,
                iterable,
                body,
                else_block,
            },
            loc,
        ))
    }

    fn parse_return(&mut self) -> ParseResult<Stmt> {
        let loc = self.here();
        self.stream.next();
        let value = match self.peek_kind() {
            TokenKind::Newline | TokenKind::Eof | TokenKind::Dedent => None,
            _ => Some(self.parse_expr(0)?),
        };
        self.expect_statement_end()?;
        Ok(Stmt::new(StmtKind::Return(value), loc))
    }

    fn parse_print(&mut self) -> ParseResult<Stmt> {
        let loc = self.here();
        self.stream.next();
        let value = self.parse_expr(0)?;
        self.expect_statement_end()?;
        Ok(Stmt::new(StmtKind::Print(value), loc))
    }

    fn parse_import(&mut self) -> ParseResult<Stmt> {
        let loc = self.here();
        self.stream.next();
        let module = self.expect(TokenKind::Identifier, "module name")?.text;
        let alias = if self.peek_kind() == TokenKind::As {
            self.stream.next();
            Some(self.expect(TokenKind::Identifier, "import alias")?.text)
        } else {
            None
        };
        self.expect_statement_end()?;
        Ok(Stmt::new(StmtKind::Import { module, alias }, loc))
    }

    fn parse_pass(&mut self) -> ParseResult<Stmt> {
        let loc = self.here();
        self.stream.next();
        self.expect_statement_end()?;
        Ok(Stmt::new(StmtKind::Pass, loc))
    }

    fn parse_break(&mut self) -> ParseResult<Stmt> {
        let loc = self.here();
        self.stream.next();
        self.expect_statement_end()?;
        Ok(Stmt::new(StmtKind::Break, loc))
    }

    fn parse_continue(&mut self) -> ParseResult<Stmt> {
        let loc = self.here();
        self.stream.next();
        self.expect_statement_end()?;
        Ok(Stmt::new(StmtKind::Continue, loc))
    }

    fn parse_def(&mut self) -> ParseResult<Stmt> {
        let loc = self.here();
        self.stream.next();
        let name = self.expect(TokenKind::Identifier, "function name")?.text;
        self.expect(TokenKind::LParen, "'('")?;

        let mut params = Vec::new();
        let mut seen = HashSet::new();
        while self.peek_kind() != TokenKind::RParen {
            let tok = self.expect(TokenKind::Identifier, "parameter name")?;
            if !seen.insert(tok.text.clone()) {
                return Err(CompilationError::parse(
                    tok.line,
                    tok.column,
                    format!("duplicate parameter '{}' in function '{}'", tok.text, name),
                ));
            }
            let annotation = if self.stream.eat(TokenKind::Colon) {
                Some(self.parse_type_annotation()?)
            } else {
                None
            };
            params.push(Param {
                name: tok.text.clone(),
                annotation,
                loc: Loc::new(tok.line, tok.column),
            });
            if !self.stream.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen, "')'")?;

        let return_annotation = if self.stream.eat(TokenKind::Arrow) {
            Some(self.parse_type_annotation()?)
        } else {
            None
        };

        let body = self.parse_block()?;

        Ok(Stmt::new(
            StmtKind::FunctionDef(Function {
                name,
                params,
                return_annotation,
                body,
                class_context: None,
                loc,
            }),
            loc,
        ))
    }

    fn parse_class(&mut self) -> ParseResult<Stmt> {
        let loc = self.here();
        self.stream.next();
        let name = self.expect(TokenKind::Identifier, "class name")?.text;

        let mut bases = Vec::new();
        if self.stream.eat(TokenKind::LParen) {
            while self.peek_kind() != TokenKind::RParen {
                bases.push(self.expect(TokenKind::Identifier, "base class name")?.text);
                if !self.stream.eat(TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::RParen, "')'")?;
        }

        let raw_body = self.parse_block()?;

        // Methods are collected apart from other body statements; each one
        // records its enclosing class.
        let mut body = Vec::new();
        let mut methods = Vec::new();
        for stmt in raw_body {
            match stmt.kind {
                StmtKind::FunctionDef(mut func) => {
                    func.class_context = Some(name.clone());
                    methods.push(func);
                }
                _ => body.push(stmt),
            }
        }

        Ok(Stmt::new(
            StmtKind::Class(ClassDef {
                name,
                bases,
                body,
                methods,
                loc,
            }),
            loc,
        ))
    }

    /// Parse `: NEWLINE INDENT stmt+ DEDENT`. Every block must contain at
    /// least one statement.
    fn parse_block(&mut self) -> ParseResult<Block> {
        self.expect(TokenKind::Colon, "':'")?;
        self.expect(TokenKind::Newline, "end of line")?;
        if self.peek_kind() != TokenKind::Indent {
            return Err(self.err_here("expected indented block"));
        }
        self.stream.next();

        let mut statements = Vec::new();
        loop {
            self.skip_newlines();
            match self.peek_kind() {
                TokenKind::Dedent => {
                    self.stream.next();
                    break;
                }
                TokenKind::Eof => break,
                _ => statements.push(self.parse_statement()?),
            }
        }

        if statements.is_empty() {
            return Err(self.err_here("expected indented block"));
        }
        Ok(statements)
    }

    /// Type annotation sub-parser: an identifier or the generic forms
    /// `list[T]` / `dict[K, V]`, recursively. The result stays a string; the
    /// type registry resolves it later (unknown names become `any`).
    fn parse_type_annotation(&mut self) -> ParseResult<String> {
        let tok = self.stream.peek().clone();
        let mut s = match tok.kind {
            TokenKind::Identifier | TokenKind::None => {
                self.stream.next();
                tok.text
            }
            other => {
                return Err(CompilationError::parse(
                    tok.line,
                    tok.column,
                    format!("expected type name, found {}", token_name(other)),
                ));
            }
        };
        if self.stream.eat(TokenKind::LBracket) {
            s.push('[');
            s.push_str(&self.parse_type_annotation()?);
            while self.stream.eat(TokenKind::Comma) {
                s.push_str(", ");
                s.push_str(&self.parse_type_annotation()?);
            }
            self.expect(TokenKind::RBracket, "']'")?;
            s.push(']');
        }
        Ok(s)
    }

    // === Expressions (precedence climbing) ===

    pub fn parse_expr(&mut self, min_prec: u8) -> ParseResult<Expr> {
        let tok = self.stream.peek().clone();

        let mut lhs = match tok.kind {
            TokenKind::Plus => {
                self.stream.next();
                let operand = self.parse_expr(PREC_UNARY)?;
                Expr::new(
                    ExprKind::Unary {
                        op: UnaryOp::Pos,
                        operand: Box::new(operand),
                    },
                    Loc::new(tok.line, tok.column),
                )
            }
            TokenKind::Minus => {
                self.stream.next();
                let operand = self.parse_expr(PREC_UNARY)?;
                Expr::new(
                    ExprKind::Unary {
                        op: UnaryOp::Neg,
                        operand: Box::new(operand),
                    },
                    Loc::new(tok.line, tok.column),
                )
            }
            TokenKind::Not => {
                self.stream.next();
                let operand = self.parse_expr(PREC_NOT)?;
                Expr::new(
                    ExprKind::Unary {
                        op: UnaryOp::Not,
                        operand: Box::new(operand),
                    },
                    Loc::new(tok.line, tok.column),
                )
            }
            TokenKind::Error => {
                return Err(CompilationError::lex(tok.line, tok.column, tok.text));
            }
            kind => {
                let Some(prefix_fn) = PREFIX_PARSERS.get(&kind) else {
                    return Err(self.err_here(format!(
                        "unexpected token {} in expression",
                        token_name(kind)
                    )));
                };
                prefix_fn(self)?
            }
        };

        loop {
            let kind = self.peek_kind();

            // Postfix index/call chaining binds tightest.
            if (kind == TokenKind::LBracket || kind == TokenKind::LParen)
                && PREC_POSTFIX >= min_prec
            {
                lhs = if kind == TokenKind::LBracket {
                    self.parse_index_suffix(lhs)?
                } else {
                    self.parse_call_suffix(lhs)?
                };
                continue;
            }

            if let Some(info) = binary_op_info(kind) {
                if info.prec >= min_prec {
                    let op_tok = self.stream.next();
                    let next_min = if info.right_assoc {
                        info.prec
                    } else {
                        info.prec + 1
                    };
                    let rhs = self.parse_expr(next_min)?;
                    lhs = Expr::new(
                        ExprKind::Binary {
                            op: info.op,
                            lhs: Box::new(lhs),
                            rhs: Box::new(rhs),
                        },
                        Loc::new(op_tok.line, op_tok.column),
                    );
                    continue;
                }
            }

            break;
        }

        Ok(lhs)
    }

    fn parse_index_suffix(&mut self, target: Expr) -> ParseResult<Expr> {
        let open = self.stream.next();
        let index = self.parse_expr(0)?;
        self.expect(TokenKind::RBracket, "']'")?;
        Ok(Expr::new(
            ExprKind::Index {
                target: Box::new(target),
                index: Box::new(index),
            },
            Loc::new(open.line, open.column),
        ))
    }

    fn parse_call_suffix(&mut self, callee: Expr) -> ParseResult<Expr> {
        let open = self.stream.next();
        let mut args = Vec::new();
        while self.peek_kind() != TokenKind::RParen {
            args.push(self.parse_expr(0)?);
            if !self.stream.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen, "')'")?;
        Ok(Expr::new(
            ExprKind::Call {
                callee: Box::new(callee),
                args,
            },
            Loc::new(open.line, open.column),
        ))
    }

    // === Atoms ===

    fn parse_number(&mut self) -> ParseResult<Expr> {
        let tok = self.stream.next();
        let is_float = tok.kind == TokenKind::Float;
        let ty = if is_float {
            PyType::double()
        } else {
            PyType::int()
        };
        Ok(Expr::with_type(
            ExprKind::Number {
                text: tok.text,
                is_float,
            },
            Loc::new(tok.line, tok.column),
            ty,
        ))
    }

    fn parse_string(&mut self) -> ParseResult<Expr> {
        let tok = self.stream.next();
        Ok(Expr::with_type(
            ExprKind::Str(tok.text),
            Loc::new(tok.line, tok.column),
            PyType::string(),
        ))
    }

    fn parse_bool(&mut self) -> ParseResult<Expr> {
        let tok = self.stream.next();
        Ok(Expr::with_type(
            ExprKind::Bool(tok.text == "True"),
            Loc::new(tok.line, tok.column),
            PyType::bool(),
        ))
    }

    fn parse_none(&mut self) -> ParseResult<Expr> {
        let tok = self.stream.next();
        Ok(Expr::with_type(
            ExprKind::NoneLit,
            Loc::new(tok.line, tok.column),
            PyType::none(),
        ))
    }

    fn parse_variable(&mut self) -> ParseResult<Expr> {
        let tok = self.stream.next();
        Ok(Expr::new(
            ExprKind::Variable(tok.text),
            Loc::new(tok.line, tok.column),
        ))
    }

    fn parse_grouping(&mut self) -> ParseResult<Expr> {
        self.stream.next();
        let inner = self.parse_expr(0)?;
        if self.peek_kind() == TokenKind::Comma {
            return Err(self.err_here("tuple expressions are not supported"));
        }
        self.expect(TokenKind::RParen, "')'")?;
        Ok(inner)
    }

    fn parse_list_literal(&mut self) -> ParseResult<Expr> {
        let open = self.stream.next();
        let mut elements = Vec::new();
        while self.peek_kind() != TokenKind::RBracket {
            elements.push(self.parse_expr(0)?);
            if !self.stream.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RBracket, "']'")?;
        Ok(Expr::new(
            ExprKind::List(elements),
            Loc::new(open.line, open.column),
        ))
    }

    fn parse_dict_literal(&mut self) -> ParseResult<Expr> {
        let open = self.stream.next();
        let mut pairs = Vec::new();
        while self.peek_kind() != TokenKind::RBrace {
            let key = self.parse_expr(0)?;
            self.expect(TokenKind::Colon, "':'")?;
            let value = self.parse_expr(0)?;
            pairs.push((key, value));
            if !self.stream.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RBrace, "'}'")?;
        Ok(Expr::new(
            ExprKind::Dict(pairs),
            Loc::new(open.line, open.column),
        ))
    }

    // === Helpers ===

    fn peek_kind(&self) -> TokenKind {
        self.stream.peek().kind
    }

    fn here(&self) -> Loc {
        let tok = self.stream.peek();
        Loc::new(tok.line, tok.column)
    }

    fn skip_newlines(&mut self) {
        while self.peek_kind() == TokenKind::Newline {
            self.stream.next();
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> ParseResult<Token> {
        let tok = self.stream.peek().clone();
        if tok.kind == TokenKind::Error {
            return Err(CompilationError::lex(tok.line, tok.column, tok.text));
        }
        if tok.kind != kind {
            return Err(CompilationError::parse(
                tok.line,
                tok.column,
                format!("expected {}, found {}", what, token_name(tok.kind)),
            ));
        }
        Ok(self.stream.next())
    }

    /// A statement ends at NEWLINE (consumed), or at EOF / DEDENT (left for
    /// the caller).
    fn expect_statement_end(&mut self) -> ParseResult<()> {
        match self.peek_kind() {
            TokenKind::Newline => {
                self.stream.next();
                Ok(())
            }
            TokenKind::Eof | TokenKind::Dedent => Ok(()),
            other => Err(self.err_here(format!(
                "expected end of statement, found {}",
                token_name(other)
            ))),
        }
    }

    fn err_here(&self, message: impl Into<String>) -> CompilationError {
        let tok = self.stream.peek();
        CompilationError::parse(tok.line, tok.column, message)
    }
}

/// Convenience: lex and parse a source string.
pub fn parse_source(source: &str, module_name: &str) -> ParseResult<Module> {
    let stream = crate::lexer::tokenize(source)?;
    Parser::new(stream, module_name).parse_module()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Module {
        parse_source(source, "test").unwrap()
    }

    fn parse_err(source: &str) -> CompilationError {
        parse_source(source, "test").unwrap_err()
    }

    fn only_expr(module: &Module) -> &Expr {
        match &module.statements[0].kind {
            StmtKind::Expr(e) => e,
            other => panic!("expected expression statement, got {:?}", other),
        }
    }

    #[test]
    fn test_precedence_mul_over_add() {
        let m = parse("a + b * c\n");
        let ExprKind::Binary { op, rhs, .. } = &only_expr(&m).kind else {
            panic!("expected binary");
        };
        assert_eq!(*op, BinaryOp::Add);
        assert!(matches!(
            rhs.kind,
            ExprKind::Binary {
                op: BinaryOp::Mul,
                ..
            }
        ));
    }

    #[test]
    fn test_power_is_right_associative() {
        let m = parse("2 ** 3 ** 2\n");
        let ExprKind::Binary { op, lhs, rhs } = &only_expr(&m).kind else {
            panic!("expected binary");
        };
        assert_eq!(*op, BinaryOp::Pow);
        assert!(matches!(lhs.kind, ExprKind::Number { .. }));
        assert!(matches!(
            rhs.kind,
            ExprKind::Binary {
                op: BinaryOp::Pow,
                ..
            }
        ));
    }

    #[test]
    fn test_left_associativity() {
        // a - b + c parses as (a - b) + c
        let m = parse("a - b + c\n");
        let ExprKind::Binary { op, lhs, .. } = &only_expr(&m).kind else {
            panic!("expected binary");
        };
        assert_eq!(*op, BinaryOp::Add);
        assert!(matches!(
            lhs.kind,
            ExprKind::Binary {
                op: BinaryOp::Sub,
                ..
            }
        ));
    }

    #[test]
    fn test_unary_binds_below_power() {
        // -2 ** 2 parses as -(2 ** 2)
        let m = parse("-2 ** 2\n");
        let ExprKind::Unary { op, operand } = &only_expr(&m).kind else {
            panic!("expected unary");
        };
        assert_eq!(*op, UnaryOp::Neg);
        assert!(matches!(
            operand.kind,
            ExprKind::Binary {
                op: BinaryOp::Pow,
                ..
            }
        ));
    }

    #[test]
    fn test_not_binds_below_comparison() {
        // not a == b parses as not (a == b)
        let m = parse("not a == b\n");
        let ExprKind::Unary { op, operand } = &only_expr(&m).kind else {
            panic!("expected unary");
        };
        assert_eq!(*op, UnaryOp::Not);
        assert!(matches!(
            operand.kind,
            ExprKind::Binary {
                op: BinaryOp::Eq,
                ..
            }
        ));
    }

    #[test]
    fn test_and_or_precedence() {
        // a or b and c parses as a or (b and c)
        let m = parse("a or b and c\n");
        let ExprKind::Binary { op, rhs, .. } = &only_expr(&m).kind else {
            panic!("expected binary");
        };
        assert_eq!(*op, BinaryOp::Or);
        assert!(matches!(
            rhs.kind,
            ExprKind::Binary {
                op: BinaryOp::And,
                ..
            }
        ));
    }

    #[test]
    fn test_call_and_index_chaining() {
        let m = parse("f(1)(2)[3]\n");
        let ExprKind::Index { target, .. } = &only_expr(&m).kind else {
            panic!("expected index");
        };
        let ExprKind::Call { callee, args } = &target.kind else {
            panic!("expected call");
        };
        assert_eq!(args.len(), 1);
        assert!(matches!(callee.kind, ExprKind::Call { .. }));
    }

    #[test]
    fn test_is_not_and_not_in_operators() {
        let m = parse("a is not b\n");
        assert!(matches!(
            only_expr(&m).kind,
            ExprKind::Binary {
                op: BinaryOp::IsNot,
                ..
            }
        ));
        let m = parse("a not in b\n");
        assert!(matches!(
            only_expr(&m).kind,
            ExprKind::Binary {
                op: BinaryOp::NotIn,
                ..
            }
        ));
    }

    #[test]
    fn test_assignment_forms() {
        let m = parse("x = 1\n");
        assert!(matches!(m.statements[0].kind, StmtKind::Assign { .. }));

        let m = parse("a[0] = 1\n");
        assert!(matches!(m.statements[0].kind, StmtKind::IndexAssign { .. }));
    }

    #[test]
    fn test_compound_assignment_desugars() {
        let m = parse("x += 2\n");
        let StmtKind::Assign { name, value } = &m.statements[0].kind else {
            panic!("expected assign");
        };
        assert_eq!(name, "x");
        let ExprKind::Binary { op, lhs, .. } = &value.kind else {
            panic!("expected binary rhs");
        };
        assert_eq!(*op, BinaryOp::Add);
        assert!(matches!(&lhs.kind, ExprKind::Variable(n) if n == "x"));
    }

    #[test]
    fn test_all_compound_operators_desugar() {
        for (src, op) in [
            ("x -= 1\n", BinaryOp::Sub),
            ("x *= 1\n", BinaryOp::Mul),
            ("x /= 1\n", BinaryOp::Div),
            ("x %= 1\n", BinaryOp::Mod),
            ("x **= 1\n", BinaryOp::Pow),
            ("x //= 1\n", BinaryOp::FloorDiv),
        ] {
            let m = parse(src);
            let StmtKind::Assign { value, .. } = &m.statements[0].kind else {
                panic!("expected assign for {}", src);
            };
            assert!(
                matches!(&value.kind, ExprKind::Binary { op: got, .. } if *got == op),
                "wrong desugar for {}",
                src
            );
        }
    }

    #[test]
    fn test_not_assignable() {
        let err = parse_err("1 = 2\n");
        assert!(err.message.contains("not assignable"));
    }

    #[test]
    fn test_compound_on_index_rejected() {
        let err = parse_err("a[0] += 1\n");
        assert!(err.message.contains("not supported yet"));
    }

    #[test]
    fn test_unexpected_token_after_expression() {
        let err = parse_err("a b\n");
        assert!(err.message.contains("after expression"));
    }

    #[test]
    fn test_if_elif_else_chain() {
        let m = parse("if a:\n    pass\nelif b:\n    pass\nelse:\n    pass\n");
        let StmtKind::If { else_block, .. } = &m.statements[0].kind else {
            panic!("expected if");
        };
        // The elif nests as a single If statement in the else slot.
        let chain = else_block.as_ref().unwrap();
        assert_eq!(chain.len(), 1);
        let StmtKind::If { else_block, .. } = &chain[0].kind else {
            panic!("expected nested if");
        };
        assert!(else_block.is_some());
    }

    #[test]
    fn test_while_with_else() {
        let m = parse("while a:\n    pass\nelse:\n    pass\n");
        let StmtKind::While { else_block, .. } = &m.statements[0].kind else {
            panic!("expected while");
        };
        assert!(else_block.is_some());
    }

    #[test]
    fn test_for_loop() {
        let m = parse("for x in xs:\n    print x\nelse:\n    pass\n");
        let StmtKind::For {
            var, else_block, ..
        } = &m.statements[0].kind
        else {
            panic!("expected for");
        };
        assert_eq!(var, "x");
        assert!(else_block.is_some());
    }

    #[test]
    fn test_def_with_annotations() {
        let m = parse("def f(a: int, b: list[int]) -> int:\n    return a\n");
        let StmtKind::FunctionDef(func) = &m.statements[0].kind else {
            panic!("expected def");
        };
        assert_eq!(func.name, "f");
        assert_eq!(func.params.len(), 2);
        assert_eq!(func.params[0].annotation.as_deref(), Some("int"));
        assert_eq!(func.params[1].annotation.as_deref(), Some("list[int]"));
        assert_eq!(func.return_annotation.as_deref(), Some("int"));
    }

    #[test]
    fn test_nested_dict_annotation() {
        let m = parse("def f(d: dict[str, list[int]]):\n    pass\n");
        let StmtKind::FunctionDef(func) = &m.statements[0].kind else {
            panic!("expected def");
        };
        assert_eq!(
            func.params[0].annotation.as_deref(),
            Some("dict[str, list[int]]")
        );
    }

    #[test]
    fn test_duplicate_parameter_rejected() {
        let err = parse_err("def f(a, a):\n    pass\n");
        assert!(err.message.contains("duplicate parameter"));
    }

    #[test]
    fn test_nested_def_is_a_statement() {
        let m = parse("def outer():\n    def inner():\n        pass\n    pass\n");
        let StmtKind::FunctionDef(outer) = &m.statements[0].kind else {
            panic!("expected def");
        };
        assert!(matches!(outer.body[0].kind, StmtKind::FunctionDef(_)));
    }

    #[test]
    fn test_class_with_methods() {
        let m = parse("class Point(Base):\n    x = 0\n    def get(self):\n        return 1\n");
        let StmtKind::Class(class) = &m.statements[0].kind else {
            panic!("expected class");
        };
        assert_eq!(class.name, "Point");
        assert_eq!(class.bases, vec!["Base".to_string()]);
        assert_eq!(class.body.len(), 1);
        assert_eq!(class.methods.len(), 1);
        assert_eq!(class.methods[0].class_context.as_deref(), Some("Point"));
    }

    #[test]
    fn test_import_forms() {
        let m = parse("import math\nimport numpy as np\n");
        assert!(matches!(
            &m.statements[0].kind,
            StmtKind::Import { module, alias } if module == "math" && alias.is_none()
        ));
        assert!(matches!(
            &m.statements[1].kind,
            StmtKind::Import { module, alias: Some(a) } if module == "numpy" && a == "np"
        ));
    }

    #[test]
    fn test_trailing_commas_tolerated() {
        parse("xs = [1, 2, 3,]\n");
        parse("d = {'a': 1, 'b': 2,}\n");
        parse("f(1, 2,)\n");
        parse("def g(a, b,):\n    pass\n");
    }

    #[test]
    fn test_empty_block_rejected() {
        let err = parse_err("if x:\ny = 1\n");
        assert!(err.message.contains("expected indented block"));
    }

    #[test]
    fn test_unsupported_keyword_diagnostic() {
        let err = parse_err("lambda x\n");
        assert!(err.message.contains("'lambda' is not supported"));
        let err = parse_err("try:\n    pass\n");
        assert!(err.message.contains("'try' is not supported"));
    }

    #[test]
    fn test_lex_error_token_propagates() {
        let err = parse_err("x = $\n");
        assert!(err.message.contains("invalid character"));
        assert_eq!(err.kind, crate::error::ErrorKind::Lex);
    }

    #[test]
    fn test_tuple_rejected() {
        let err = parse_err("x = (1, 2)\n");
        assert!(err.message.contains("tuple"));
    }

    #[test]
    fn test_module_with_only_comments_is_empty() {
        let m = parse("# a comment\n\n# another\n");
        assert!(m.statements.is_empty());
    }

    #[test]
    fn test_literal_types_stamped() {
        let m = parse("1\n");
        assert_eq!(only_expr(&m).ty.as_ref().unwrap(), &PyType::int());
        let m = parse("1.5\n");
        assert_eq!(only_expr(&m).ty.as_ref().unwrap(), &PyType::double());
        let m = parse("'s'\n");
        assert_eq!(only_expr(&m).ty.as_ref().unwrap(), &PyType::string());
        let m = parse("True\n");
        assert_eq!(only_expr(&m).ty.as_ref().unwrap(), &PyType::bool());
        let m = parse("None\n");
        assert_eq!(only_expr(&m).ty.as_ref().unwrap(), &PyType::none());
    }

    #[test]
    fn test_return_without_value() {
        let m = parse("def f():\n    return\n");
        let StmtKind::FunctionDef(func) = &m.statements[0].kind else {
            panic!("expected def");
        };
        assert!(matches!(func.body[0].kind, StmtKind::Return(None)));
    }
}
