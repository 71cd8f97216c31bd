//! # perf-sql
//!
//! Structural SQL fingerprinting for perfrec.
//!
//! A statement is lexed, grouped into a token tree (parentheses, functions,
//! identifiers, comparisons, identifier lists, `WHERE` clauses) and then
//! rewritten in two passes:
//! - **strip**: canonical whitespace, padded comparison operators
//! - **simplify**: literals to `#`, column lists to `...`, savepoint and
//!   cursor names redacted
//!
//! ```
//! use perf_sql::fingerprint;
//!
//! assert_eq!(
//!     fingerprint("SELECT a, b FROM t WHERE id = 42", true),
//!     "SELECT ... FROM t WHERE id = #"
//! );
//! ```

pub mod fingerprint;
pub mod grouping;
pub mod lexer;
pub mod token;
pub mod tree;

pub use fingerprint::{LIST_PLACEHOLDER, VALUE_PLACEHOLDER, clear_cache, fingerprint};
pub use grouping::parse;
pub use lexer::tokenize;
pub use token::{Token, TokenKind};
pub use tree::{Group, GroupKind, Node};
