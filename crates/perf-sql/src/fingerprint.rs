//! SQL fingerprinting.
//!
//! A fingerprint is the statement with its volatile parts taken out: literal
//! values become `#`, column lists become `...`, savepoint and cursor names
//! are redacted and whitespace is canonical. Two runs of the same code path
//! produce the same fingerprint even when the values differ.

use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;

use crate::grouping::parse;
use crate::token::TokenKind;
use crate::tree::{Group, GroupKind, Node};

/// Replacement for literal values.
pub const VALUE_PLACEHOLDER: &str = "#";
/// Replacement for hidden lists.
pub const LIST_PLACEHOLDER: &str = "...";

const CURSOR_PREFIX: &str = "\"_django_curs_";
const CURSOR_REDACTED: &str = "\"_django_curs_#\"";
const SAVEPOINT_REDACTED: &str = "`#`";

/// Keywords after which an identifier list is kept even with `hide_columns`.
const ORDERING_KEYWORDS: &[&str] = &["ORDER BY", "GROUP BY", "HAVING"];

/// Maximum number of memoized fingerprints.
pub const CACHE_CAPACITY: usize = 500;

static FINGERPRINT_CACHE: Mutex<Option<LruCache<(String, bool), String>>> = Mutex::new(None);

/// Fingerprint `query`.
///
/// With `hide_columns`, comma-separated column and value lists collapse to
/// `...` except directly after `ORDER BY`, `GROUP BY` or `HAVING`. Results are
/// memoized per `(query, hide_columns)`.
#[must_use]
pub fn fingerprint(query: &str, hide_columns: bool) -> String {
    let key = (query.to_owned(), hide_columns);
    if let Some(hit) = FINGERPRINT_CACHE
        .lock()
        .as_mut()
        .and_then(|cache| cache.get(&key).cloned())
    {
        tracing::trace!(query, "fingerprint cache hit");
        return hit;
    }

    let result = compute(query, hide_columns);
    FINGERPRINT_CACHE
        .lock()
        .get_or_insert_with(|| LruCache::new(NonZeroUsize::new(CACHE_CAPACITY).unwrap()))
        .put(key, result.clone());
    result
}

/// Drop every memoized fingerprint.
pub fn clear_cache() {
    if let Some(cache) = FINGERPRINT_CACHE.lock().as_mut() {
        cache.clear();
    }
}

fn compute(query: &str, hide_columns: bool) -> String {
    let mut statement = parse(query);
    strip(&mut statement);
    simplify(&mut statement, hide_columns);
    statement.to_string().trim().to_string()
}

/// Pass 1: canonical whitespace, bottom-up.
fn strip(group: &mut Group) {
    for child in &mut group.children {
        if let Node::Group(sub) = child {
            strip(sub);
        }
    }
    if group.kind == GroupKind::Comment {
        return;
    }

    let mut in_whitespace = false;
    group.children.retain_mut(|child| match child {
        Node::Token(token) if token.is_whitespace() => {
            let keep = !in_whitespace;
            token.value = " ".to_string();
            in_whitespace = true;
            keep
        }
        Node::Token(token) => {
            if matches!(token.kind, TokenKind::Keyword | TokenKind::Comparison)
                && token.value.contains(char::is_whitespace)
            {
                token.value = token.value.split_whitespace().collect::<Vec<_>>().join(" ");
            }
            in_whitespace = false;
            true
        }
        Node::Group(_) => {
            in_whitespace = false;
            true
        }
    });

    match group.kind {
        GroupKind::Parenthesis => trim_parenthesis(group),
        GroupKind::Comparison => pad_comparison(group),
        _ => {}
    }
}

fn trim_parenthesis(group: &mut Group) {
    let children = &mut group.children;
    if children.len() > 1 && children[1].is_whitespace() {
        children.remove(1);
    }
    let closed = children.last().is_some_and(|n| n.is_punctuation(")"));
    if closed && children.len() > 2 && children[children.len() - 2].is_whitespace() {
        children.remove(children.len() - 2);
    }
}

/// `lhs<op>rhs` becomes `lhs <op> rhs`.
fn pad_comparison(group: &mut Group) {
    let operands: Vec<Node> = std::mem::take(&mut group.children)
        .into_iter()
        .filter(|n| !n.is_whitespace())
        .collect();
    let space = || Node::token(TokenKind::Whitespace, " ");
    for (i, node) in operands.into_iter().enumerate() {
        if i > 0 {
            group.children.push(space());
        }
        group.children.push(node);
    }
}

/// Pass 2: redact values and names, top-down.
fn simplify(group: &mut Group, hide_columns: bool) {
    if group.starts_with_word("UPDATE") {
        erase_assignments(group);
    }
    if group.kind == GroupKind::Where {
        collapse_in_lists(group);
    }
    if redact_savepoint(group) {
        return;
    }
    if let Some(Node::Token(first)) = group.children.first_mut()
        && first.value.starts_with(CURSOR_PREFIX)
    {
        first.value = CURSOR_REDACTED.to_string();
    }

    let mut after_ordering_keyword = false;
    for child in &mut group.children {
        match child {
            Node::Group(list)
                if list.kind == GroupKind::IdentifierList
                    && hide_columns
                    && !after_ordering_keyword =>
            {
                list.children = vec![Node::token(TokenKind::Punctuation, LIST_PLACEHOLDER)];
            }
            Node::Group(sub) => simplify(sub, hide_columns),
            Node::Token(token) if token.kind.is_literal() || token.is_word("NULL") => {
                token.value = VALUE_PLACEHOLDER.to_string();
            }
            Node::Token(_) => {}
        }
        if !child.is_whitespace() {
            after_ordering_keyword = ORDERING_KEYWORDS.iter().any(|w| child.is_word(w));
        }
    }
}

/// `UPDATE t SET a = 1, b = 2 WHERE ...` becomes `UPDATE t SET ... WHERE ...`.
fn erase_assignments(group: &mut Group) {
    let Some(set_at) = group.children.iter().position(|n| n.is_word("SET")) else {
        return;
    };
    let where_at = group
        .children
        .iter()
        .position(|n| n.group_kind() == Some(GroupKind::Where))
        .unwrap_or(group.children.len());

    let tail = group.children.split_off(where_at.max(set_at + 1));
    group.children.truncate(set_at + 1);
    group
        .children
        .push(Node::token(TokenKind::Punctuation, " ... "));
    group.children.extend(tail);
}

/// `IN (1, 2, 3)` left loose in a `WHERE` clause becomes `IN (...)`.
fn collapse_in_lists(group: &mut Group) {
    let in_positions: Vec<usize> = group
        .children
        .iter()
        .enumerate()
        .filter(|(_, n)| n.is_word("IN"))
        .map(|(i, _)| i)
        .collect();

    for at in in_positions {
        let Some(Node::Group(parenthesis)) = group.children[at + 1..]
            .iter_mut()
            .find(|n| n.group_kind() == Some(GroupKind::Parenthesis))
        else {
            continue;
        };
        let closed = parenthesis.children.len() > 1
            && parenthesis.children.last().is_some_and(|n| n.is_punctuation(")"));
        let interior_end = parenthesis.children.len() - usize::from(closed);
        let interior = &parenthesis.children[1..interior_end];
        let all_literals = interior
            .iter()
            .all(|n| n.as_token().is_some_and(|t| t.kind.is_literal()));
        if all_literals {
            parenthesis.children.splice(
                1..interior_end,
                [Node::token(TokenKind::Punctuation, LIST_PLACEHOLDER)],
            );
        }
    }
}

/// Redact the name in `SAVEPOINT x`, `RELEASE SAVEPOINT x` and
/// `ROLLBACK TO SAVEPOINT x`. Returns whether the group was a savepoint
/// statement.
fn redact_savepoint(group: &mut Group) -> bool {
    let words = group.word_indices();
    let word_is = |n: usize, w: &str| {
        words
            .get(n)
            .is_some_and(|&i| group.children[i].is_word(w))
    };

    let name_at = if word_is(0, "SAVEPOINT") {
        1
    } else if word_is(0, "RELEASE") && word_is(1, "SAVEPOINT") {
        2
    } else if word_is(0, "ROLLBACK") && word_is(1, "TO") && word_is(2, "SAVEPOINT") {
        3
    } else {
        return false;
    };

    let Some(&index) = words.get(name_at) else {
        return false;
    };
    if let Some(token) = group.children[index].first_token_mut() {
        token.value = SAVEPOINT_REDACTED.to_string();
    }
    true
}
