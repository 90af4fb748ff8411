//! forge::comments
//!
//! Backend-independent comment pipeline.
//!
//! Backends deliver comments oldest first. [`select_comments`] optionally
//! reverses that list and then keeps the comments matching a pattern and/or
//! author. [`search_in_comments`] walks an ordered list of comments and
//! descriptions and reports the first regex match.
//!
//! Patterns use search semantics: a match anywhere in the text counts.

use regex::Regex;
use serde::Serialize;

use super::traits::{Comment, CommentFilter};

/// Reverse and filter a fetched comment list.
///
/// Reversal happens before filtering. Without a pattern and an author the
/// (possibly reversed) list is returned untouched.
pub fn select_comments(mut comments: Vec<Comment>, filter: &CommentFilter) -> Vec<Comment> {
    if filter.reverse {
        comments.reverse();
    }
    if filter.is_filtering() {
        comments = filter_comments(comments, filter.pattern.as_ref(), filter.author.as_deref());
    }
    comments
}

/// Keep comments whose body matches `pattern` and whose author is `author`.
pub fn filter_comments(
    comments: Vec<Comment>,
    pattern: Option<&Regex>,
    author: Option<&str>,
) -> Vec<Comment> {
    comments
        .into_iter()
        .filter(|c| pattern.map_or(true, |p| p.is_match(&c.body)))
        .filter(|c| author.map_or(true, |a| c.author == a))
        .collect()
}

/// One searchable piece of text.
#[derive(Debug, Clone, Copy)]
pub enum SearchTarget<'a> {
    /// A pull request description
    Description(&'a str),
    /// A comment body
    Comment(&'a Comment),
}

impl SearchTarget<'_> {
    fn text(&self) -> &str {
        match self {
            SearchTarget::Description(text) => text,
            SearchTarget::Comment(comment) => &comment.body,
        }
    }

    fn source(&self) -> MatchSource {
        match self {
            SearchTarget::Description(_) => MatchSource::Description,
            SearchTarget::Comment(comment) => MatchSource::Comment {
                id: comment.id,
                author: comment.author.clone(),
            },
        }
    }
}

/// Where a search match was found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "in", rename_all = "snake_case")]
pub enum MatchSource {
    /// The pull request description
    Description,
    /// A comment
    Comment { id: u64, author: String },
}

/// A regex match found by [`search_in_comments`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchMatch {
    /// Where the match was found
    pub source: MatchSource,
    /// The matched text
    pub matched: String,
    /// Byte offset of the match start in the searched text
    pub start: usize,
    /// Byte offset of the match end in the searched text
    pub end: usize,
    /// Capture groups 1..n; `None` for groups that did not participate
    pub groups: Vec<Option<String>>,
}

impl SearchMatch {
    /// Capture group `index` (0 is the whole match).
    pub fn group(&self, index: usize) -> Option<&str> {
        if index == 0 {
            return Some(&self.matched);
        }
        self.groups.get(index - 1).and_then(|g| g.as_deref())
    }
}

/// First match of `pattern` in `targets`, in iteration order.
pub fn search_in_comments<'a, I>(targets: I, pattern: &Regex) -> Option<SearchMatch>
where
    I: IntoIterator<Item = SearchTarget<'a>>,
{
    targets.into_iter().find_map(|target| {
        let captures = pattern.captures(target.text())?;
        let whole = captures.get(0)?;
        Some(SearchMatch {
            source: target.source(),
            matched: whole.as_str().to_string(),
            start: whole.start(),
            end: whole.end(),
            groups: captures
                .iter()
                .skip(1)
                .map(|g| g.map(|m| m.as_str().to_string()))
                .collect(),
        })
    })
}
