//! SQL lexer.
//!
//! Splits a statement into [`Token`]s. The lexer is deliberately lenient: it
//! never fails, and anything it cannot classify becomes a single-character
//! [`TokenKind::Error`] token so that rendering always reproduces the input.

use crate::token::{Token, TokenKind};

/// Words lexed as keywords. Every other word is a name.
const KEYWORDS: &[&str] = &[
    "ADD", "ALL", "ALTER", "AND", "ANY", "AS", "ASC", "BEGIN", "BETWEEN", "BY", "CASCADE",
    "CASE", "CHECK", "CLOSE", "COLLATE", "COLUMN", "COMMIT", "CONSTRAINT", "CREATE", "CROSS",
    "CURSOR", "DECLARE", "DEFAULT", "DELETE", "DESC", "DISTINCT", "DROP", "ELSE", "END",
    "ESCAPE", "EXCEPT", "EXISTS", "FALSE", "FETCH", "FOR", "FOREIGN", "FORWARD", "FROM", "FULL",
    "GROUP", "HAVING", "HOLD", "INDEX", "INNER", "INSERT", "INTERSECT", "INTO", "IS", "JOIN",
    "KEY", "LEFT", "LIMIT", "LOCK", "LOCKED", "NATURAL", "NEXT", "NO", "NOT", "NOWAIT", "NULL",
    "NULLS", "OF", "OFFSET", "ON", "OR", "ORDER", "OUTER", "OVER", "PARTITION", "PRIMARY",
    "RECURSIVE", "REFERENCES", "RELEASE", "REPLACE", "RETURNING", "RIGHT", "ROLLBACK",
    "SAVEPOINT", "SCROLL", "SELECT", "SET", "SHARE", "SKIP", "START", "TABLE", "THEN", "TO",
    "TRANSACTION", "TRUE", "TRUNCATE", "UNION", "UNIQUE", "UPDATE", "USING", "VALUES", "VIEW",
    "WHEN", "WHERE", "WITH", "WITHOUT",
];

/// Words lexed as comparison operators.
const COMPARISON_WORDS: &[&str] = &["IN", "LIKE", "ILIKE"];

/// Words that may lead a multi-word join keyword (`LEFT OUTER JOIN`).
const JOIN_MODIFIERS: &[&str] = &["CROSS", "FULL", "INNER", "LEFT", "NATURAL", "OUTER", "RIGHT"];

/// Tokenize `sql`. Concatenating the values of the result reproduces `sql`.
#[must_use]
pub fn tokenize(sql: &str) -> Vec<Token> {
    Lexer::new(sql).run()
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    tokens: Vec<Token>,
}

impl Lexer {
    fn new(sql: &str) -> Self {
        Self {
            chars: sql.chars().collect(),
            pos: 0,
            tokens: Vec::new(),
        }
    }

    fn run(mut self) -> Vec<Token> {
        while let Some(c) = self.peek(0) {
            let start = self.pos;
            let kind = self.lex_one(c);
            let value: String = self.chars[start..self.pos].iter().collect();
            self.tokens.push(Token::new(kind, value));
        }
        self.tokens
    }

    fn peek(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn lex_one(&mut self, c: char) -> TokenKind {
        let next = self.peek(1);
        match c {
            c if c.is_whitespace() => {
                self.take_while(char::is_whitespace);
                TokenKind::Whitespace
            }
            '-' if next == Some('-') => {
                self.take_while(|c| c != '\n');
                // The newline belongs to the comment.
                if self.peek(0).is_some() {
                    self.pos += 1;
                }
                TokenKind::Comment
            }
            '/' if next == Some('*') => {
                self.pos += 2;
                while let Some(c) = self.peek(0) {
                    self.pos += 1;
                    if c == '*' && self.peek(0) == Some('/') {
                        self.pos += 1;
                        break;
                    }
                }
                TokenKind::Comment
            }
            '\'' => {
                self.take_string();
                TokenKind::String
            }
            '`' | '"' => {
                self.take_quoted(c);
                TokenKind::QuotedName
            }
            '0'..='9' => self.take_number(),
            '.' if next.is_some_and(|n| n.is_ascii_digit()) => self.take_number(),
            '-' | '+'
                if next.is_some_and(|n| n.is_ascii_digit() || n == '.')
                    && self.sign_allowed() =>
            {
                self.pos += 1;
                self.take_number()
            }
            '%' if next == Some('s') => {
                self.pos += 2;
                TokenKind::Placeholder
            }
            '%' if next == Some('(') => self.take_pyformat(),
            '?' => {
                self.pos += 1;
                TokenKind::Placeholder
            }
            ':' if next.is_some_and(is_word_start) => {
                self.pos += 1;
                self.take_while(is_word_char);
                TokenKind::Placeholder
            }
            '$' if next.is_some_and(|n| n.is_ascii_digit() || is_word_start(n)) => {
                self.pos += 1;
                self.take_while(is_word_char);
                TokenKind::Placeholder
            }
            c if is_word_start(c) => self.take_word(),
            _ => self.take_symbol(c, next),
        }
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) {
        while self.peek(0).is_some_and(&pred) {
            self.pos += 1;
        }
    }

    /// Single-quoted string; handles `''` and backslash escapes. An
    /// unterminated string runs to the end of input.
    fn take_string(&mut self) {
        self.pos += 1;
        while let Some(c) = self.peek(0) {
            self.pos += 1;
            match c {
                '\\' if self.peek(0).is_some() => self.pos += 1,
                '\'' if self.peek(0) == Some('\'') => self.pos += 1,
                '\'' => return,
                _ => {}
            }
        }
    }

    fn take_quoted(&mut self, quote: char) {
        self.pos += 1;
        while let Some(c) = self.peek(0) {
            self.pos += 1;
            if c == quote {
                if self.peek(0) == Some(quote) {
                    self.pos += 1;
                } else {
                    return;
                }
            }
        }
    }

    fn take_number(&mut self) -> TokenKind {
        if self.peek(0) == Some('0') && matches!(self.peek(1), Some('x' | 'X')) {
            self.pos += 2;
            self.take_while(|c| c.is_ascii_hexdigit());
            return self.number_or_name(TokenKind::Hex);
        }

        let mut kind = TokenKind::Integer;
        self.take_while(|c| c.is_ascii_digit());
        if self.peek(0) == Some('.') && self.peek(1) != Some('.') {
            kind = TokenKind::Float;
            self.pos += 1;
            self.take_while(|c| c.is_ascii_digit());
        }
        if matches!(self.peek(0), Some('e' | 'E')) {
            let digits_at = if matches!(self.peek(1), Some('+' | '-')) { 2 } else { 1 };
            if self.peek(digits_at).is_some_and(|c| c.is_ascii_digit()) {
                kind = TokenKind::Float;
                self.pos += digits_at;
                self.take_while(|c| c.is_ascii_digit());
            }
        }
        self.number_or_name(kind)
    }

    /// Digits running straight into letters (`1st`, `2fa_codes`) are a name.
    fn number_or_name(&mut self, kind: TokenKind) -> TokenKind {
        if self.peek(0).is_some_and(is_word_char) {
            self.take_while(is_word_char);
            TokenKind::Name
        } else {
            kind
        }
    }

    /// `%(name)s`
    fn take_pyformat(&mut self) -> TokenKind {
        let close = self.chars[self.pos..].iter().position(|&c| c == ')');
        match close {
            Some(offset) if self.chars.get(self.pos + offset + 1) == Some(&'s') => {
                self.pos += offset + 2;
                TokenKind::Placeholder
            }
            _ => {
                self.pos += 1;
                TokenKind::Operator
            }
        }
    }

    /// A sign starts a number only where an operand is expected.
    fn sign_allowed(&self) -> bool {
        let previous = self
            .tokens
            .iter()
            .rev()
            .find(|t| !matches!(t.kind, TokenKind::Whitespace | TokenKind::Comment));
        match previous {
            None => true,
            Some(t) => match t.kind {
                TokenKind::Keyword | TokenKind::Comparison | TokenKind::Operator => true,
                TokenKind::Punctuation => t.value != ")" && t.value != "]",
                _ => false,
            },
        }
    }

    fn take_word(&mut self) -> TokenKind {
        let start = self.pos;
        self.take_while(is_word_char);
        let word: String = self.chars[start..self.pos].iter().collect();
        let upper = word.to_uppercase();

        // E'..', N'..', X'..', B'..'
        if matches!(upper.as_str(), "E" | "N" | "X" | "B") && self.peek(0) == Some('\'') {
            self.take_string();
            return TokenKind::String;
        }

        let after_dot = self
            .tokens
            .last()
            .is_some_and(|t| t.is_punctuation("."));
        if after_dot || self.peek(0) == Some('.') {
            return TokenKind::Name;
        }

        if let Some(kind) = self.take_compound(&upper) {
            return kind;
        }

        if COMPARISON_WORDS.contains(&upper.as_str()) {
            return TokenKind::Comparison;
        }
        if KEYWORDS.contains(&upper.as_str()) {
            return TokenKind::Keyword;
        }
        TokenKind::Name
    }

    /// Extend the current word over the words of a multi-word keyword,
    /// e.g. `ORDER BY`, `NOT IN` or `LEFT OUTER JOIN`.
    fn take_compound(&mut self, first: &str) -> Option<TokenKind> {
        match first {
            "ORDER" | "GROUP" | "PARTITION" => {
                self.absorb_words(&["BY"]).then_some(TokenKind::Keyword)
            }
            "UNION" => {
                self.absorb_words(&["ALL"]);
                Some(TokenKind::Keyword)
            }
            "NULLS" => self
                .absorb_words(&["FIRST"])
                .then_some(TokenKind::Keyword)
                .or_else(|| self.absorb_words(&["LAST"]).then_some(TokenKind::Keyword)),
            "NOT" => {
                for word in COMPARISON_WORDS {
                    if self.absorb_words(&[*word]) {
                        return Some(TokenKind::Comparison);
                    }
                }
                self.absorb_words(&["NULL"]).then_some(TokenKind::Keyword)
            }
            m if JOIN_MODIFIERS.contains(&m) => {
                // Greedily extend over further modifiers; keep the chain only
                // if it ends in JOIN.
                let saved = self.pos;
                loop {
                    if self.absorb_words(&["JOIN"]) {
                        return Some(TokenKind::Keyword);
                    }
                    let Some(next) = self.peek_word() else { break };
                    if !JOIN_MODIFIERS.contains(&next.as_str()) {
                        break;
                    }
                    self.absorb_words(&[next.as_str()]);
                }
                self.pos = saved;
                None
            }
            _ => None,
        }
    }

    /// The next word after whitespace, upper-cased, without consuming it.
    fn peek_word(&self) -> Option<String> {
        let mut i = self.pos;
        let ws_start = i;
        while self.chars.get(i).is_some_and(|c| c.is_whitespace()) {
            i += 1;
        }
        if i == ws_start {
            return None;
        }
        let word_start = i;
        while self.chars.get(i).copied().is_some_and(is_word_char) {
            i += 1;
        }
        (i > word_start && is_word_start(self.chars[word_start]))
            .then(|| self.chars[word_start..i].iter().collect::<String>().to_uppercase())
    }

    /// Consume whitespace plus each of `words` in turn if all of them follow.
    fn absorb_words(&mut self, words: &[&str]) -> bool {
        let saved = self.pos;
        for word in words {
            match self.peek_word() {
                Some(next) if next == *word => {
                    self.take_while(char::is_whitespace);
                    self.take_while(is_word_char);
                }
                _ => {
                    self.pos = saved;
                    return false;
                }
            }
        }
        true
    }

    fn take_symbol(&mut self, c: char, next: Option<char>) -> TokenKind {
        let two: Option<String> = next.map(|n| [c, n].iter().collect());
        if let Some(two) = two.as_deref() {
            match two {
                "<=" | ">=" | "<>" | "!=" | "==" => {
                    self.pos += 2;
                    return TokenKind::Comparison;
                }
                "||" | "::" | "->" | "<<" | ">>" => {
                    self.pos += 2;
                    return TokenKind::Operator;
                }
                _ => {}
            }
        }
        self.pos += 1;
        match c {
            '=' | '<' | '>' => TokenKind::Comparison,
            '+' | '-' | '/' | '%' | '|' | '&' | '^' | '~' => TokenKind::Operator,
            '*' => TokenKind::Wildcard,
            '(' | ')' | ',' | ';' | '.' | '[' | ']' => TokenKind::Punctuation,
            _ => TokenKind::Error,
        }
    }
}

fn is_word_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}
