//! Token tree produced by [`crate::grouping::parse`].

use std::fmt;

use crate::token::{Token, TokenKind};

/// Kind of a grouped node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKind {
    /// Root of a parsed statement.
    Statement,
    /// `( ... )` including both parentheses.
    Parenthesis,
    /// Consecutive comments and the whitespace between them.
    Comment,
    /// A name immediately followed by its argument parenthesis.
    Function,
    /// A name, dotted name, or any expression with an alias or sort order.
    Identifier,
    /// Arithmetic or concatenation of operands.
    Operation,
    /// `lhs <op> rhs`
    Comparison,
    /// Comma-separated run of identifiers or values.
    IdentifierList,
    /// A `WHERE` clause up to the keyword that closes it.
    Where,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Token(Token),
    Group(Group),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub kind: GroupKind,
    pub children: Vec<Node>,
}

impl Group {
    pub const fn new(kind: GroupKind, children: Vec<Node>) -> Self {
        Self { kind, children }
    }

    /// Indices of children that are not whitespace.
    pub fn word_indices(&self) -> Vec<usize> {
        self.children
            .iter()
            .enumerate()
            .filter(|(_, node)| !node.is_whitespace())
            .map(|(i, _)| i)
            .collect()
    }

    /// Whether the first non-whitespace child is the keyword `word`.
    pub fn starts_with_word(&self, word: &str) -> bool {
        self.children
            .iter()
            .find(|node| !node.is_whitespace())
            .is_some_and(|node| node.is_word(word))
    }
}

impl Node {
    pub fn token(kind: TokenKind, value: impl Into<String>) -> Self {
        Self::Token(Token::new(kind, value))
    }

    pub const fn as_token(&self) -> Option<&Token> {
        match self {
            Self::Token(token) => Some(token),
            Self::Group(_) => None,
        }
    }

    pub const fn as_group(&self) -> Option<&Group> {
        match self {
            Self::Group(group) => Some(group),
            Self::Token(_) => None,
        }
    }

    pub fn group_kind(&self) -> Option<GroupKind> {
        self.as_group().map(|g| g.kind)
    }

    pub fn is_whitespace(&self) -> bool {
        self.as_token().is_some_and(Token::is_whitespace)
    }

    pub fn is_word(&self, word: &str) -> bool {
        self.as_token().is_some_and(|t| t.is_word(word))
    }

    pub fn is_punctuation(&self, punct: &str) -> bool {
        self.as_token().is_some_and(|t| t.is_punctuation(punct))
    }

    pub fn is_kind(&self, kind: TokenKind) -> bool {
        self.as_token().is_some_and(|t| t.kind == kind)
    }

    /// Leftmost leaf token.
    pub fn first_token_mut(&mut self) -> Option<&mut Token> {
        match self {
            Self::Token(token) => Some(token),
            Self::Group(group) => group.children.first_mut().and_then(Self::first_token_mut),
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Token(token) => f.write_str(&token.value),
            Self::Group(group) => group.fmt(f),
        }
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.children.iter().try_for_each(|child| child.fmt(f))
    }
}
