//! Pagination state threaded between successive related-items batches.

use crate::catalog::{BookId, Subject};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashSet;
use std::fmt;

/// The three upstream sources blended into a related-items feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Same-category listing.
    Category,
    /// Generic listing filtered client-side to the subject's author.
    Author,
    /// Rating-ranked recommendation listing.
    Recommendation,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Category => "category",
            Self::Author => "author",
            Self::Recommendation => "recommendation",
        })
    }
}

/// Per-source page pointer. Exhaustion is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceCursor {
    page: u32,
    exhausted: bool,
}

impl SourceCursor {
    /// A fresh cursor pointing at page 1.
    pub const fn start() -> Self {
        Self {
            page: 1,
            exhausted: false,
        }
    }

    /// A cursor that will never issue a request.
    pub const fn finished() -> Self {
        Self {
            page: 1,
            exhausted: true,
        }
    }

    /// Next page to request.
    pub fn page(&self) -> u32 {
        self.page
    }

    /// Whether the source has no further pages.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Moves past the page just served, or terminates if it was the last.
    pub(crate) fn advance(&mut self, served_last: bool) {
        if self.exhausted {
            return;
        }
        if served_last {
            self.exhausted = true;
        } else {
            self.page = self.page.saturating_add(1);
        }
    }

    pub(crate) fn exhaust(&mut self) {
        self.exhausted = true;
    }
}

impl Default for SourceCursor {
    fn default() -> Self {
        Self::start()
    }
}

/// Identifiers already handed out in a session.
///
/// Held as a hash set; serialized as an ascending list so cursors are stable
/// across transports.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeenIds(HashSet<BookId>);

impl SeenIds {
    /// Records `id`, returning `false` when it was already present.
    pub fn insert(&mut self, id: BookId) -> bool {
        self.0.insert(id)
    }

    /// Whether `id` was already handed out.
    pub fn contains(&self, id: BookId) -> bool {
        self.0.contains(&id)
    }

    /// Number of recorded identifiers.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Identifiers in ascending order.
    pub fn sorted(&self) -> Vec<BookId> {
        let mut ids: Vec<BookId> = self.0.iter().copied().collect();
        ids.sort_unstable();
        ids
    }
}

impl FromIterator<BookId> for SeenIds {
    fn from_iter<I: IntoIterator<Item = BookId>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Serialize for SeenIds {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.sorted().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SeenIds {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Vec::<BookId>::deserialize(deserializer).map(|ids| ids.into_iter().collect())
    }
}

/// Opaque state handed between `fetch_batch` calls for one subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationCursor {
    pub(crate) subject: BookId,
    pub(crate) batch_index: u32,
    pub(crate) category: SourceCursor,
    pub(crate) author: SourceCursor,
    pub(crate) recommendation: SourceCursor,
    pub(crate) seen_ids: SeenIds,
}

impl AggregationCursor {
    /// Starting cursor for `subject`; the author source starts exhausted when
    /// the subject has no author.
    pub fn initial(subject: &Subject) -> Self {
        let author = if subject.author_id.is_some() {
            SourceCursor::start()
        } else {
            SourceCursor::finished()
        };
        Self {
            subject: subject.id,
            batch_index: 0,
            category: SourceCursor::start(),
            author,
            recommendation: SourceCursor::start(),
            seen_ids: std::iter::once(subject.id).collect(),
        }
    }

    /// Subject this cursor was created for.
    pub fn subject(&self) -> BookId {
        self.subject
    }

    /// Zero-based index of the batch this cursor will produce.
    pub fn batch_index(&self) -> u32 {
        self.batch_index
    }

    /// Cursor for one source.
    pub fn source(&self, kind: SourceKind) -> SourceCursor {
        match kind {
            SourceKind::Category => self.category,
            SourceKind::Author => self.author,
            SourceKind::Recommendation => self.recommendation,
        }
    }

    pub(crate) fn source_mut(&mut self, kind: SourceKind) -> &mut SourceCursor {
        match kind {
            SourceKind::Category => &mut self.category,
            SourceKind::Author => &mut self.author,
            SourceKind::Recommendation => &mut self.recommendation,
        }
    }

    /// Identifiers excluded from future batches.
    pub fn seen_ids(&self) -> &SeenIds {
        &self.seen_ids
    }

    /// Whether every source is exhausted.
    pub fn all_exhausted(&self) -> bool {
        self.category.exhausted && self.author.exhausted && self.recommendation.exhausted
    }
}
