//! Lexical tokens.

/// Type tag of a lexical token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Whitespace,
    Comment,
    Keyword,
    /// Unquoted identifier or function name.
    Name,
    /// Backtick- or double-quoted identifier.
    QuotedName,
    Integer,
    Float,
    Hex,
    /// Single-quoted string literal (optionally `E`/`N`/`X`/`B` prefixed).
    String,
    /// Driver parameter marker: `%s`, `%(name)s`, `?`, `:name`, `$1`.
    Placeholder,
    /// `=`, `<>`, `LIKE`, `IN`, `NOT IN`, ...
    Comparison,
    /// Arithmetic, concatenation and cast operators.
    Operator,
    Punctuation,
    Wildcard,
    /// Anything the lexer could not classify.
    Error,
}

impl TokenKind {
    /// Number and string literals, the value-bearing tokens a fingerprint hides.
    #[must_use]
    pub const fn is_literal(self) -> bool {
        matches!(self, Self::Integer | Self::Float | Self::Hex | Self::String)
    }
}

/// A single lexical token with its source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub value: String,
}

impl Token {
    pub fn new(kind: TokenKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }

    #[must_use]
    pub fn is_whitespace(&self) -> bool {
        self.kind == TokenKind::Whitespace
    }

    /// Upper-cased text with inner whitespace runs collapsed, so that
    /// `order\n  by` and `ORDER BY` compare equal.
    #[must_use]
    pub fn normalized(&self) -> String {
        self.value
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_uppercase()
    }

    /// Keyword (or word-shaped comparison) check against an upper-case word.
    #[must_use]
    pub fn is_word(&self, word: &str) -> bool {
        matches!(self.kind, TokenKind::Keyword | TokenKind::Comparison) && self.normalized() == word
    }

    #[must_use]
    pub fn is_punctuation(&self, punct: &str) -> bool {
        self.kind == TokenKind::Punctuation && self.value == punct
    }
}
