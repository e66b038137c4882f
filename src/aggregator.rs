//! Related-items aggregation across the category, author and recommendation sources.

use crate::catalog::{
    Book, BookId, CatalogError, CatalogSource, Page, RecommendSort, RefId, Subject,
};
use crate::controls::AggregatorControls;
use crate::cursor::{AggregationCursor, SourceKind};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors that abort a `fetch_batch` call.
#[derive(Debug, Error)]
pub enum AggregateError {
    /// An upstream request failed or returned unusable pagination.
    #[error("{kind} source failed: {error}")]
    SourceFetch {
        /// Source whose request failed.
        kind: SourceKind,
        /// Underlying catalog error.
        #[source]
        error: CatalogError,
    },
    /// The subject has no category, so nothing topical can be fetched.
    #[error("book {subject} has no category")]
    MissingSubjectContext {
        /// Offending subject.
        subject: BookId,
    },
    /// The cursor was produced for another subject.
    #[error("cursor belongs to book {found}, not {expected}")]
    SubjectMismatch {
        /// Subject passed to the call.
        expected: BookId,
        /// Subject recorded in the cursor.
        found: BookId,
    },
}

/// One page of related items plus the cursor for the next one.
#[derive(Debug, Clone)]
pub struct Batch {
    /// Items in priority order.
    pub items: Vec<Book>,
    /// `None` once every source is exhausted.
    pub next_cursor: Option<AggregationCursor>,
}

impl Batch {
    /// Whether another batch can be requested.
    pub fn has_more(&self) -> bool {
        self.next_cursor.is_some()
    }
}

/// Blends three paginated sources into deduplicated, bounded batches.
///
/// Holds no per-session state; the cursor carries everything between calls,
/// so one aggregator can serve many subjects at once.
pub struct RelatedAggregator<S> {
    source: S,
    controls: AggregatorControls,
}

impl<S: CatalogSource> RelatedAggregator<S> {
    /// Builds an aggregator with default controls.
    pub fn new(source: S) -> Self {
        Self::with_controls(source, AggregatorControls::default())
    }

    /// Builds an aggregator with explicit controls.
    pub fn with_controls(source: S, controls: AggregatorControls) -> Self {
        Self { source, controls }
    }

    /// Underlying catalog.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Active controls.
    pub fn controls(&self) -> &AggregatorControls {
        &self.controls
    }

    /// Validates `subject` and returns its starting cursor.
    pub fn initial_cursor(&self, subject: &Subject) -> Result<AggregationCursor, AggregateError> {
        require_category(subject)?;
        Ok(AggregationCursor::initial(subject))
    }

    /// Produces the batch described by `cursor`.
    ///
    /// Sources are pulled sequentially each round (category, then author while
    /// the batch is below the soft cap, then recommendations as backfill) until
    /// the batch is full, every source is exhausted, or the round bound is hit.
    /// A round in which no source may be pulled also ends the batch, which
    /// happens when the soft cap holds back the author source below the
    /// first-batch floor; that author supply is served by the next batch.
    /// Any source failure aborts the whole call.
    pub async fn fetch_batch(
        &self,
        subject: &Subject,
        cursor: &AggregationCursor,
    ) -> Result<Batch, AggregateError> {
        let category = require_category(subject)?;
        if cursor.subject() != subject.id {
            return Err(AggregateError::SubjectMismatch {
                expected: subject.id,
                found: cursor.subject(),
            });
        }

        let batch_size = self.controls.batch_size();
        let floor = self.controls.floor_for(cursor.batch_index());
        let mut state = BatchState::new(cursor.clone(), batch_size);
        state.cursor.seen_ids.insert(subject.id);
        if subject.author_id.is_none() {
            state.cursor.author.exhaust();
        }

        let mut rounds = 0;
        while state.wants_more(floor) && rounds < self.controls.max_rounds() {
            rounds += 1;
            let before = state.collected.len();
            let mut requested = false;

            if state.can_pull(SourceKind::Category) {
                self.step(SourceKind::Category, subject, category, &mut state)
                    .await?;
                requested = true;
            }

            if state.collected.len() < self.controls.author_soft_cap()
                && state.can_pull(SourceKind::Author)
            {
                self.step(SourceKind::Author, subject, category, &mut state)
                    .await?;
                requested = true;
            }

            if state.wants_more(floor) && state.can_pull(SourceKind::Recommendation) {
                self.step(SourceKind::Recommendation, subject, category, &mut state)
                    .await?;
                requested = true;
            }

            // Nothing pullable: at most the capped author source remains, for the next batch.
            if !requested {
                debug!(
                    subject = %subject.id,
                    collected = state.collected.len(),
                    "no source can be pulled for this batch"
                );
                break;
            }
            if state.collected.len() == before && state.cursor.all_exhausted() {
                break;
            }
        }

        if rounds >= self.controls.max_rounds()
            && state.wants_more(floor)
            && !state.cursor.all_exhausted()
        {
            warn!(
                subject = %subject.id,
                rounds,
                collected = state.collected.len(),
                "round bound reached before filling related batch"
            );
        }

        let BatchState {
            mut cursor,
            collected,
            ..
        } = state;
        let next_cursor = if cursor.all_exhausted() {
            None
        } else {
            cursor.batch_index += 1;
            Some(cursor)
        };
        debug!(
            subject = %subject.id,
            items = collected.len(),
            more = next_cursor.is_some(),
            "related batch ready"
        );
        Ok(Batch {
            items: collected,
            next_cursor,
        })
    }

    async fn step(
        &self,
        kind: SourceKind,
        subject: &Subject,
        category: &RefId,
        state: &mut BatchState,
    ) -> Result<(), AggregateError> {
        let page_no = state.cursor.source(kind).page();
        let page = self.pull(kind, category, page_no).await?;
        let returned = page.items.len();
        let last = page.is_last();
        let accepted = match kind {
            SourceKind::Author => {
                let author = subject.author_id.as_ref();
                state.absorb(page.items, |book| {
                    author.is_some() && book.author_ref() == author
                })
            }
            SourceKind::Category | SourceKind::Recommendation => {
                state.absorb(page.items, |_| true)
            }
        };
        state.cursor.source_mut(kind).advance(last);
        debug!(
            source = %kind,
            page = page_no,
            returned,
            accepted,
            exhausted = last,
            "pulled related candidates"
        );
        Ok(())
    }

    async fn pull(
        &self,
        kind: SourceKind,
        category: &RefId,
        page: u32,
    ) -> Result<Page<Book>, AggregateError> {
        let limit = self.controls.batch_size();
        let result = match kind {
            SourceKind::Category => self.source.books_by_category(category, page, limit).await,
            SourceKind::Author => self.source.books(page, limit).await,
            SourceKind::Recommendation => {
                self.source
                    .recommended(RecommendSort::Rating, page, limit)
                    .await
            }
        };
        result
            .and_then(Page::validated)
            .map_err(|error| AggregateError::SourceFetch { kind, error })
    }
}

fn require_category(subject: &Subject) -> Result<&RefId, AggregateError> {
    subject
        .category_id
        .as_ref()
        .ok_or(AggregateError::MissingSubjectContext {
            subject: subject.id,
        })
}

/// Working state for one batch; the cursor is a private copy of the caller's.
struct BatchState {
    cursor: AggregationCursor,
    collected: Vec<Book>,
    batch_size: usize,
}

impl BatchState {
    fn new(cursor: AggregationCursor, batch_size: usize) -> Self {
        Self {
            cursor,
            collected: Vec::with_capacity(batch_size),
            batch_size,
        }
    }

    fn is_full(&self) -> bool {
        self.collected.len() >= self.batch_size
    }

    fn wants_more(&self, floor: usize) -> bool {
        self.collected.len() < self.batch_size || self.collected.len() < floor
    }

    fn can_pull(&self, kind: SourceKind) -> bool {
        !self.cursor.source(kind).is_exhausted() && !self.is_full()
    }

    /// Appends unseen items that pass `keep`, stopping once the batch is full.
    fn absorb(&mut self, items: Vec<Book>, keep: impl Fn(&Book) -> bool) -> usize {
        let mut accepted = 0;
        for book in items {
            if self.is_full() {
                break;
            }
            if !keep(&book) || !self.cursor.seen_ids.insert(book.id) {
                continue;
            }
            self.collected.push(book);
            accepted += 1;
        }
        accepted
    }
}
