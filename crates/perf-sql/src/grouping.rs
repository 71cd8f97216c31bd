//! Grouping of a token stream into a statement tree.
//!
//! Parentheses are nested first, then each level is grouped bottom-up by a
//! fixed sequence of passes. Later passes see the groups built by earlier
//! ones, so the order matters: comparisons need their identifier operands,
//! identifier lists need their comparison items, and `WHERE` clauses wrap
//! everything that follows them.

use crate::lexer::tokenize;
use crate::token::{Token, TokenKind};
use crate::tree::{Group, GroupKind, Node};

/// Keywords that end a `WHERE` clause at the same level.
const WHERE_CLOSERS: &[&str] = &[
    "ORDER BY",
    "GROUP BY",
    "LIMIT",
    "UNION",
    "UNION ALL",
    "EXCEPT",
    "INTERSECT",
    "HAVING",
    "RETURNING",
];

/// Parentheses nested deeper than this stay flat tokens, which keeps every
/// tree walk within a bounded stack depth.
pub const MAX_NESTING: usize = 256;

/// Parse the first statement of `sql` into a [`GroupKind::Statement`] tree.
#[must_use]
pub fn parse(sql: &str) -> Group {
    let tokens = first_statement(tokenize(sql));
    Group::new(GroupKind::Statement, nest(tokens))
}

/// Tokens up to and including the first top-level `;`.
fn first_statement(tokens: Vec<Token>) -> Vec<Token> {
    let mut depth = 0usize;
    let mut statement = Vec::new();
    for token in tokens {
        let ends_statement = depth == 0 && token.is_punctuation(";");
        if token.is_punctuation("(") {
            depth += 1;
        } else if token.is_punctuation(")") {
            depth = depth.saturating_sub(1);
        }
        statement.push(token);
        if ends_statement {
            break;
        }
    }
    statement
}

/// Build parenthesis groups and group every level.
///
/// Unclosed parentheses run to the end of input; a stray `)` stays a token.
/// Below [`MAX_NESTING`] levels, parentheses and their matching closers are
/// kept as plain tokens of the deepest group.
fn nest(tokens: Vec<Token>) -> Vec<Node> {
    let mut outer: Vec<(Vec<Node>, Token)> = Vec::new();
    let mut current: Vec<Node> = Vec::new();
    let mut flat_depth = 0usize;

    for token in tokens {
        if token.is_punctuation("(") && outer.len() >= MAX_NESTING {
            flat_depth += 1;
            current.push(Node::Token(token));
        } else if token.is_punctuation(")") && flat_depth > 0 {
            flat_depth -= 1;
            current.push(Node::Token(token));
        } else if token.is_punctuation("(") {
            outer.push((std::mem::take(&mut current), token));
        } else if token.is_punctuation(")")
            && let Some((parent, open)) = outer.pop()
        {
            let inner = std::mem::replace(&mut current, parent);
            current.push(parenthesis(open, inner, Some(token)));
        } else {
            current.push(Node::Token(token));
        }
    }
    while let Some((parent, open)) = outer.pop() {
        let inner = std::mem::replace(&mut current, parent);
        current.push(parenthesis(open, inner, None));
    }

    group_level(current)
}

fn parenthesis(open: Token, inner: Vec<Node>, close: Option<Token>) -> Node {
    let mut children = vec![Node::Token(open)];
    children.extend(group_level(inner));
    children.extend(close.map(Node::Token));
    Node::Group(Group::new(GroupKind::Parenthesis, children))
}

fn group_level(mut nodes: Vec<Node>) -> Vec<Node> {
    group_comments(&mut nodes);
    group_functions(&mut nodes);
    group_identifiers(&mut nodes);
    group_operations(&mut nodes);
    group_aliases(&mut nodes);
    group_comparisons(&mut nodes);
    group_identifier_lists(&mut nodes);
    group_where(&mut nodes);
    nodes
}

/// Replace `nodes[start..end]` with a single group.
fn wrap(nodes: &mut Vec<Node>, start: usize, end: usize, kind: GroupKind) {
    let children: Vec<Node> = nodes.drain(start..end).collect();
    nodes.insert(start, Node::Group(Group::new(kind, children)));
}

/// Move `nodes[at + 1..end]` onto the end of the group at `at`.
fn extend(nodes: &mut Vec<Node>, at: usize, end: usize) {
    let tail: Vec<Node> = nodes.drain(at + 1..end).collect();
    if let Node::Group(group) = &mut nodes[at] {
        group.children.extend(tail);
    }
}

fn next_significant(nodes: &[Node], from: usize) -> Option<usize> {
    (from..nodes.len()).find(|&i| !nodes[i].is_whitespace())
}

fn prev_significant(nodes: &[Node], before: usize) -> Option<usize> {
    (0..before).rev().find(|&i| !nodes[i].is_whitespace())
}

/// Operands on both sides of a binary token at `at`, if present.
fn operands(nodes: &[Node], at: usize) -> Option<(usize, usize)> {
    Some((prev_significant(nodes, at)?, next_significant(nodes, at + 1)?))
}

fn is_name(node: &Node) -> bool {
    node.is_kind(TokenKind::Name) || node.is_kind(TokenKind::QuotedName)
}

fn is_value_keyword(node: &Node) -> bool {
    ["NULL", "TRUE", "FALSE"].iter().any(|w| node.is_word(w))
}

/// Anything that can stand on either side of an operator.
fn is_operand(node: &Node) -> bool {
    match node {
        Node::Group(group) => matches!(
            group.kind,
            GroupKind::Identifier
                | GroupKind::Function
                | GroupKind::Parenthesis
                | GroupKind::Operation
        ),
        Node::Token(token) => {
            token.kind.is_literal()
                || matches!(
                    token.kind,
                    TokenKind::Name | TokenKind::QuotedName | TokenKind::Placeholder
                )
                || is_value_keyword(node)
        }
    }
}

fn is_list_item(node: &Node) -> bool {
    is_operand(node)
        || matches!(
            node.group_kind(),
            Some(GroupKind::Comparison | GroupKind::IdentifierList)
        )
        || node.is_kind(TokenKind::Wildcard)
        || node.is_word("DEFAULT")
}

fn group_comments(nodes: &mut Vec<Node>) {
    let mut i = 0;
    while i < nodes.len() {
        if nodes[i].is_kind(TokenKind::Comment) {
            let mut end = i + 1;
            while let Some(next) = next_significant(nodes, end)
                && nodes[next].is_kind(TokenKind::Comment)
            {
                end = next + 1;
            }
            wrap(nodes, i, end, GroupKind::Comment);
        }
        i += 1;
    }
}

fn group_functions(nodes: &mut Vec<Node>) {
    let mut i = 0;
    while i + 1 < nodes.len() {
        if is_name(&nodes[i]) && nodes[i + 1].group_kind() == Some(GroupKind::Parenthesis) {
            wrap(nodes, i, i + 2, GroupKind::Function);
        }
        i += 1;
    }
}

/// Names, dotted names, casts and trailing sort orders.
fn group_identifiers(nodes: &mut Vec<Node>) {
    let name_like = |node: &Node| is_name(node) || node.group_kind() == Some(GroupKind::Function);

    let mut i = 0;
    while i < nodes.len() {
        if !name_like(&nodes[i]) {
            i += 1;
            continue;
        }

        let mut end = i + 1;
        while nodes.get(end).is_some_and(|n| n.is_punctuation("."))
            && nodes
                .get(end + 1)
                .is_some_and(|n| name_like(n) || n.is_kind(TokenKind::Wildcard))
        {
            end += 2;
        }
        while nodes
            .get(end)
            .and_then(Node::as_token)
            .is_some_and(|t| t.kind == TokenKind::Operator && t.value == "::")
            && nodes.get(end + 1).is_some_and(name_like)
        {
            end += 2;
        }
        if let Some(next) = next_significant(nodes, end)
            && (nodes[next].is_word("ASC") || nodes[next].is_word("DESC"))
        {
            end = next + 1;
        }
        if let Some(next) = next_significant(nodes, end)
            && (nodes[next].is_word("NULLS FIRST") || nodes[next].is_word("NULLS LAST"))
        {
            end = next + 1;
        }

        wrap(nodes, i, end, GroupKind::Identifier);
        i += 1;
    }
}

fn group_operations(nodes: &mut Vec<Node>) {
    let is_operator = |node: &Node| {
        node.as_token().is_some_and(|t| {
            (t.kind == TokenKind::Operator && t.value != "::") || t.kind == TokenKind::Wildcard
        })
    };

    let mut i = 0;
    while i < nodes.len() {
        if is_operator(&nodes[i])
            && let Some((lhs, rhs)) = operands(nodes, i)
            && is_operand(&nodes[lhs])
            && is_operand(&nodes[rhs])
        {
            if nodes[lhs].group_kind() == Some(GroupKind::Operation) {
                extend(nodes, lhs, rhs + 1);
            } else {
                wrap(nodes, lhs, rhs + 1, GroupKind::Operation);
            }
            i = lhs + 1;
            continue;
        }
        i += 1;
    }
}

/// `expr AS name` and `expr name`.
fn group_aliases(nodes: &mut Vec<Node>) {
    let is_alias = |node: &Node| {
        node.as_group().is_some_and(|g| {
            g.kind == GroupKind::Identifier && g.children.len() == 1 && is_name(&g.children[0])
        })
    };

    let mut i = 0;
    while i < nodes.len() {
        let aliasable = matches!(
            nodes[i].group_kind(),
            Some(
                GroupKind::Identifier
                    | GroupKind::Function
                    | GroupKind::Parenthesis
                    | GroupKind::Operation
            )
        );
        let literal = nodes[i].as_token().is_some_and(|t| t.kind.is_literal());

        if (aliasable || literal)
            && let Some(next) = next_significant(nodes, i + 1)
        {
            let end = if nodes[next].is_word("AS") {
                next_significant(nodes, next + 1)
                    .filter(|&alias| is_alias(&nodes[alias]))
                    .map(|alias| alias + 1)
            } else if aliasable && next > i + 1 && is_alias(&nodes[next]) {
                Some(next + 1)
            } else {
                None
            };
            if let Some(end) = end {
                wrap(nodes, i, end, GroupKind::Identifier);
            }
        }
        i += 1;
    }
}

fn group_comparisons(nodes: &mut Vec<Node>) {
    let mut i = 0;
    while i < nodes.len() {
        if nodes[i].is_kind(TokenKind::Comparison)
            && let Some((lhs, rhs)) = operands(nodes, i)
            && is_operand(&nodes[lhs])
            && is_operand(&nodes[rhs])
        {
            wrap(nodes, lhs, rhs + 1, GroupKind::Comparison);
            i = lhs + 1;
            continue;
        }
        i += 1;
    }
}

fn group_identifier_lists(nodes: &mut Vec<Node>) {
    let mut i = 0;
    while i < nodes.len() {
        if nodes[i].is_punctuation(",")
            && let Some((prev, next)) = operands(nodes, i)
            && is_list_item(&nodes[prev])
            && is_list_item(&nodes[next])
        {
            if nodes[prev].group_kind() == Some(GroupKind::IdentifierList) {
                extend(nodes, prev, next + 1);
            } else {
                wrap(nodes, prev, next + 1, GroupKind::IdentifierList);
            }
            i = prev + 1;
            continue;
        }
        i += 1;
    }
}

/// `WHERE ...` up to a closing keyword; trailing whitespace stays outside.
fn group_where(nodes: &mut Vec<Node>) {
    let mut i = 0;
    while i < nodes.len() {
        if nodes[i].is_word("WHERE") {
            let close = (i + 1..nodes.len())
                .find(|&j| WHERE_CLOSERS.iter().any(|w| nodes[j].is_word(w)))
                .unwrap_or(nodes.len());
            let mut end = close;
            while end > i + 1 && nodes[end - 1].is_whitespace() {
                end -= 1;
            }
            wrap(nodes, i, end, GroupKind::Where);
        }
        i += 1;
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn kinds(group: &Group) -> Vec<Option<GroupKind>> {
        group
            .children
            .iter()
            .filter(|n| !n.is_whitespace())
            .map(Node::group_kind)
            .collect()
    }

    #[test]
    fn rendering_reproduces_input() {
        let sql = "SELECT a.b AS c, COUNT(*) FROM t WHERE (x = 1 OR y IN (2, 3)) ORDER BY a";
        assert_eq!(parse(sql).to_string(), sql);
    }

    #[test]
    fn select_list_and_where() {
        let tree = parse("SELECT a, b FROM t WHERE a = 1");
        assert_eq!(
            kinds(&tree),
            vec![
                None,
                Some(GroupKind::IdentifierList),
                None,
                Some(GroupKind::Identifier),
                Some(GroupKind::Where),
            ]
        );
    }

    #[test]
    fn where_stops_at_order_by() {
        let tree = parse("SELECT a FROM t WHERE a = 1 ORDER BY a");
        let where_clause = tree
            .children
            .iter()
            .find(|n| n.group_kind() == Some(GroupKind::Where))
            .unwrap();
        assert_eq!(where_clause.to_string(), "WHERE a = 1");
    }

    #[test]
    fn only_first_statement_is_kept() {
        assert_eq!(parse("SELECT 1; SELECT 2").to_string(), "SELECT 1;");
    }

    #[test]
    fn semicolon_inside_parentheses_does_not_split() {
        assert_eq!(parse("SELECT f(';', (1;2))").to_string(), "SELECT f(';', (1;2))");
    }

    #[test]
    fn unclosed_parenthesis_runs_to_end() {
        let tree = parse("SELECT (a, b");
        let last = tree.children.last().unwrap();
        assert_eq!(last.group_kind(), Some(GroupKind::Parenthesis));
        assert_eq!(last.to_string(), "(a, b");
    }

    #[test]
    fn stray_close_parenthesis_stays_a_token() {
        assert_eq!(parse("SELECT a)").to_string(), "SELECT a)");
    }

    fn paren_depth(node: &Node) -> usize {
        match node {
            Node::Group(group) => {
                usize::from(group.kind == GroupKind::Parenthesis)
                    + group.children.iter().map(paren_depth).max().unwrap_or(0)
            }
            Node::Token(_) => 0,
        }
    }

    #[test]
    fn deep_parentheses_are_capped() {
        let depth = MAX_NESTING + 44;
        let sql = format!("SELECT {}1{} + 2", "(".repeat(depth), ")".repeat(depth));
        let tree = parse(&sql);

        assert_eq!(tree.to_string(), sql);
        let deepest = tree.children.iter().map(paren_depth).max().unwrap();
        assert_eq!(deepest, MAX_NESTING);
    }

    #[test]
    fn dotted_name_with_alias_and_sort_order() {
        let tree = parse("ORDER BY t.a DESC");
        let ident = tree.children.last().unwrap();
        assert_eq!(ident.group_kind(), Some(GroupKind::Identifier));
        assert_eq!(ident.to_string(), "t.a DESC");

        let tree = parse("SELECT t.a AS b");
        assert_eq!(tree.children.last().unwrap().to_string(), "t.a AS b");
    }

    #[test]
    fn in_is_grouped_as_comparison() {
        let tree = parse("x IN (1, 2)");
        assert_eq!(kinds(&tree), vec![Some(GroupKind::Comparison)]);
    }

    #[test]
    fn comments_are_grouped_together() {
        let tree = parse("/* a */ /* b */ SELECT");
        assert_eq!(tree.children[0].group_kind(), Some(GroupKind::Comment));
        assert_eq!(tree.children[0].to_string(), "/* a */ /* b */");
    }
}
