//! Alias ordering.

use crate::operation::DEFAULT_ALIAS;

/// Sort resource aliases, keeping `default` first if present.
///
/// Fan-out recorders install in this order so that operations against
/// equally configured resources come out the same on every run.
pub fn sorted_names<I, S>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut names: Vec<String> = names.into_iter().map(Into::into).collect();
    names.sort_by(|a, b| {
        (a != DEFAULT_ALIAS)
            .cmp(&(b != DEFAULT_ALIAS))
            .then_with(|| a.cmp(b))
    });
    names
}
