//! Token model and registry.
//!
//! Token kinds fall into disjoint bands: structural tokens synthesized by the
//! lexer (EOF, NEWLINE, INDENT, DEDENT, ERROR), keywords, operators and
//! delimiters, literals, and identifiers. The registries mapping keyword
//! strings and operator spellings to kinds are initialised once and read-only
//! afterwards.

use std::collections::HashMap;
use std::sync::LazyLock;

/// Every kind of token the lexer can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // Structural
    Eof,
    Newline,
    Indent,
    Dedent,
    Error,

    // Keywords
    Def,
    If,
    Else,
    Elif,
    Return,
    While,
    For,
    In,
    Print,
    Import,
    Class,
    Pass,
    Break,
    Continue,
    And,
    Or,
    Not,
    Is,
    // Fused two-word operators (`is not`, `not in`)
    IsNot,
    NotIn,
    // Recognised but unsupported keywords; the parser rejects these with a
    // dedicated diagnostic instead of a generic unexpected-token error.
    Lambda,
    Try,
    Except,
    Finally,
    With,
    As,
    Assert,
    From,
    Global,
    Nonlocal,
    Raise,
    Yield,
    Del,
    Exec,
    Async,
    Await,

    // Operators and delimiters
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Colon,
    Comma,
    Dot,
    At,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Power,
    FloorDiv,
    Lt,
    Gt,
    Le,
    Ge,
    EqEq,
    NotEq,
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    PercentAssign,
    PowerAssign,
    FloorDivAssign,
    Arrow,

    // Literals and identifiers
    Integer,
    Float,
    Str,
    Bool,
    None,
    Identifier,
}

impl TokenKind {
    /// Keywords, identifiers and word-shaped literals. Used by the
    /// source-recovery routine to decide where a space is mandatory.
    pub fn is_wordlike(self) -> bool {
        use TokenKind::*;
        matches!(
            self,
            Def | If
                | Else
                | Elif
                | Return
                | While
                | For
                | In
                | Print
                | Import
                | Class
                | Pass
                | Break
                | Continue
                | And
                | Or
                | Not
                | Is
                | IsNot
                | NotIn
                | Lambda
                | Try
                | Except
                | Finally
                | With
                | As
                | Assert
                | From
                | Global
                | Nonlocal
                | Raise
                | Yield
                | Del
                | Exec
                | Async
                | Await
                | Integer
                | Float
                | Bool
                | None
                | Identifier
        )
    }

    /// Keywords the lexer recognises but the parser does not support.
    pub fn is_unsupported_keyword(self) -> bool {
        use TokenKind::*;
        matches!(
            self,
            Lambda
                | Try
                | Except
                | Finally
                | With
                | As
                | Assert
                | From
                | Global
                | Nonlocal
                | Raise
                | Yield
                | Del
                | Exec
                | Async
                | Await
        )
    }
}

/// A single lexed token. Immutable once produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// The original spelling (for string literals, the unescaped body)
    pub text: String,
    /// 1-indexed line number
    pub line: usize,
    /// 1-indexed column number
    pub column: usize,
    /// For string literals, the opening quote character
    pub quote_char: Option<char>,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, line: usize, column: usize) -> Self {
        Token {
            kind,
            text: text.into(),
            line,
            column,
            quote_char: Option::None,
        }
    }

    pub fn with_quote(
        kind: TokenKind,
        text: impl Into<String>,
        line: usize,
        column: usize,
        quote: char,
    ) -> Self {
        Token {
            kind,
            text: text.into(),
            line,
            column,
            quote_char: Some(quote),
        }
    }
}

/// Keyword spelling -> token kind.
static KEYWORDS: LazyLock<HashMap<&'static str, TokenKind>> = LazyLock::new(|| {
    use TokenKind::*;
    let mut m = HashMap::new();
    m.insert("def", Def);
    m.insert("if", If);
    m.insert("else", Else);
    m.insert("elif", Elif);
    m.insert("return", Return);
    m.insert("while", While);
    m.insert("for", For);
    m.insert("in", In);
    m.insert("print", Print);
    m.insert("import", Import);
    m.insert("class", Class);
    m.insert("pass", Pass);
    m.insert("break", Break);
    m.insert("continue", Continue);
    m.insert("and", And);
    m.insert("or", Or);
    m.insert("not", Not);
    m.insert("is", Is);
    m.insert("lambda", Lambda);
    m.insert("try", Try);
    m.insert("except", Except);
    m.insert("finally", Finally);
    m.insert("with", With);
    m.insert("as", As);
    m.insert("assert", Assert);
    m.insert("from", From);
    m.insert("global", Global);
    m.insert("nonlocal", Nonlocal);
    m.insert("raise", Raise);
    m.insert("yield", Yield);
    m.insert("del", Del);
    m.insert("exec", Exec);
    m.insert("async", Async);
    m.insert("await", Await);
    // Literal keywords
    m.insert("True", Bool);
    m.insert("False", Bool);
    m.insert("None", None);
    m
});

/// Single-character operator -> token kind.
static SIMPLE_OPERATORS: LazyLock<HashMap<char, TokenKind>> = LazyLock::new(|| {
    use TokenKind::*;
    let mut m = HashMap::new();
    m.insert('(', LParen);
    m.insert(')', RParen);
    m.insert('[', LBracket);
    m.insert(']', RBracket);
    m.insert('{', LBrace);
    m.insert('}', RBrace);
    m.insert(':', Colon);
    m.insert(',', Comma);
    m.insert('.', Dot);
    m.insert('@', At);
    m.insert('+', Plus);
    m.insert('-', Minus);
    m.insert('*', Star);
    m.insert('/', Slash);
    m.insert('%', Percent);
    m.insert('<', Lt);
    m.insert('>', Gt);
    m.insert('=', Assign);
    m
});

/// Multi-character operator -> token kind. Looked up longest-prefix first.
static COMPOUND_OPERATORS: LazyLock<HashMap<&'static str, TokenKind>> = LazyLock::new(|| {
    use TokenKind::*;
    let mut m = HashMap::new();
    m.insert("<=", Le);
    m.insert(">=", Ge);
    m.insert("==", EqEq);
    m.insert("!=", NotEq);
    m.insert("+=", PlusAssign);
    m.insert("-=", MinusAssign);
    m.insert("*=", StarAssign);
    m.insert("/=", SlashAssign);
    m.insert("%=", PercentAssign);
    m.insert("**", Power);
    m.insert("//", FloorDiv);
    m.insert("->", Arrow);
    m.insert("**=", PowerAssign);
    m.insert("//=", FloorDivAssign);
    m
});

/// Longest multi-character operator spelling.
pub const MAX_OPERATOR_LEN: usize = 3;

/// Look up a keyword spelling.
pub fn keyword_kind(word: &str) -> Option<TokenKind> {
    KEYWORDS.get(word).copied()
}

/// Look up a single-character operator.
pub fn simple_operator_kind(c: char) -> Option<TokenKind> {
    SIMPLE_OPERATORS.get(&c).copied()
}

/// Look up a multi-character operator spelling.
pub fn compound_operator_kind(op: &str) -> Option<TokenKind> {
    COMPOUND_OPERATORS.get(op).copied()
}

/// Whether `c` can start a multi-character operator.
pub fn is_compound_operator_start(c: char) -> bool {
    COMPOUND_OPERATORS.keys().any(|op| op.starts_with(c))
}

/// Printable name for a token kind, used in diagnostics.
pub fn token_name(kind: TokenKind) -> &'static str {
    use TokenKind::*;
    match kind {
        Eof => "EOF",
        Newline => "NEWLINE",
        Indent => "INDENT",
        Dedent => "DEDENT",
        Error => "ERROR",
        Def => "'def'",
        If => "'if'",
        Else => "'else'",
        Elif => "'elif'",
        Return => "'return'",
        While => "'while'",
        For => "'for'",
        In => "'in'",
        Print => "'print'",
        Import => "'import'",
        Class => "'class'",
        Pass => "'pass'",
        Break => "'break'",
        Continue => "'continue'",
        And => "'and'",
        Or => "'or'",
        Not => "'not'",
        Is => "'is'",
        IsNot => "'is not'",
        NotIn => "'not in'",
        Lambda => "'lambda'",
        Try => "'try'",
        Except => "'except'",
        Finally => "'finally'",
        With => "'with'",
        As => "'as'",
        Assert => "'assert'",
        From => "'from'",
        Global => "'global'",
        Nonlocal => "'nonlocal'",
        Raise => "'raise'",
        Yield => "'yield'",
        Del => "'del'",
        Exec => "'exec'",
        Async => "'async'",
        Await => "'await'",
        LParen => "'('",
        RParen => "')'",
        LBracket => "'['",
        RBracket => "']'",
        LBrace => "'{'",
        RBrace => "'}'",
        Colon => "':'",
        Comma => "','",
        Dot => "'.'",
        At => "'@'",
        Plus => "'+'",
        Minus => "'-'",
        Star => "'*'",
        Slash => "'/'",
        Percent => "'%'",
        Power => "'**'",
        FloorDiv => "'//'",
        Lt => "'<'",
        Gt => "'>'",
        Le => "'<='",
        Ge => "'>='",
        EqEq => "'=='",
        NotEq => "'!='",
        Assign => "'='",
        PlusAssign => "'+='",
        MinusAssign => "'-='",
        StarAssign => "'*='",
        SlashAssign => "'/='",
        PercentAssign => "'%='",
        PowerAssign => "'**='",
        FloorDivAssign => "'//='",
        Arrow => "'->'",
        Integer => "integer literal",
        Float => "float literal",
        Str => "string literal",
        Bool => "boolean literal",
        None => "'None'",
        Identifier => "identifier",
    }
}

/// Whether a space must be rendered between two adjacent tokens when
/// re-rendering a token stream back into source text. Two word-shaped
/// tokens would otherwise fuse into one identifier.
pub fn needs_space_between(prev: TokenKind, next: TokenKind) -> bool {
    prev.is_wordlike() && next.is_wordlike()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_lookup() {
        assert_eq!(keyword_kind("def"), Some(TokenKind::Def));
        assert_eq!(keyword_kind("elif"), Some(TokenKind::Elif));
        assert_eq!(keyword_kind("True"), Some(TokenKind::Bool));
        assert_eq!(keyword_kind("False"), Some(TokenKind::Bool));
        assert_eq!(keyword_kind("None"), Some(TokenKind::None));
        assert_eq!(keyword_kind("banana"), Option::None);
    }

    #[test]
    fn test_operator_lookup_longest_first() {
        assert_eq!(compound_operator_kind("**="), Some(TokenKind::PowerAssign));
        assert_eq!(compound_operator_kind("**"), Some(TokenKind::Power));
        assert_eq!(compound_operator_kind("//"), Some(TokenKind::FloorDiv));
        assert_eq!(simple_operator_kind('*'), Some(TokenKind::Star));
        assert_eq!(simple_operator_kind('?'), Option::None);
    }

    #[test]
    fn test_compound_operator_start() {
        assert!(is_compound_operator_start('*'));
        assert!(is_compound_operator_start('!'));
        assert!(is_compound_operator_start('-'));
        assert!(!is_compound_operator_start('('));
    }

    #[test]
    fn test_needs_space_between() {
        assert!(needs_space_between(TokenKind::Def, TokenKind::Identifier));
        assert!(needs_space_between(TokenKind::Return, TokenKind::Integer));
        assert!(!needs_space_between(TokenKind::Identifier, TokenKind::LParen));
        assert!(!needs_space_between(TokenKind::LParen, TokenKind::Identifier));
    }

    #[test]
    fn test_token_names() {
        assert_eq!(token_name(TokenKind::Indent), "INDENT");
        assert_eq!(token_name(TokenKind::Power), "'**'");
        assert_eq!(token_name(TokenKind::Identifier), "identifier");
    }
}
