//! Per-subject related-items feed that drops responses for stale subjects.

use crate::aggregator::{AggregateError, Batch, RelatedAggregator};
use crate::catalog::{Book, CatalogSource, Subject};
use crate::cursor::AggregationCursor;
use tracing::debug;

/// Claim on the next batch of a feed, valid until the feed is reset.
#[derive(Debug, Clone)]
pub struct BatchTicket {
    generation: u64,
    subject: Subject,
    cursor: AggregationCursor,
}

impl BatchTicket {
    /// Subject the request was issued for.
    pub fn subject(&self) -> &Subject {
        &self.subject
    }

    /// Cursor to hand to `fetch_batch`.
    pub fn cursor(&self) -> &AggregationCursor {
        &self.cursor
    }
}

/// Result of applying a batch to a feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The batch was appended.
    Appended {
        /// Items in the appended batch.
        items: usize,
    },
    /// The response belonged to a superseded request and was dropped.
    Stale,
    /// Every source is exhausted; nothing was requested.
    Finished,
    /// The drawer already holds items; nothing was requested.
    AlreadyLoaded,
}

/// Accumulated related-items batches for the subject currently on screen.
#[derive(Debug, Clone)]
pub struct RelatedFeed {
    subject: Subject,
    generation: u64,
    batches: Vec<Vec<Book>>,
    cursor: Option<AggregationCursor>,
}

impl RelatedFeed {
    /// Starts an empty feed for `subject`.
    pub fn new(subject: Subject) -> Self {
        let cursor = Some(AggregationCursor::initial(&subject));
        Self {
            subject,
            generation: 0,
            batches: Vec::new(),
            cursor,
        }
    }

    /// Current subject.
    pub fn subject(&self) -> &Subject {
        &self.subject
    }

    /// Bumped on every reset; tickets from older generations are stale.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether another batch can be requested.
    pub fn has_more(&self) -> bool {
        self.cursor.is_some()
    }

    /// Number of batches merged so far.
    pub fn batch_count(&self) -> usize {
        self.batches.len()
    }

    /// The first batch, shown inline on the detail view.
    pub fn first_batch(&self) -> &[Book] {
        self.batches.first().map(Vec::as_slice).unwrap_or(&[])
    }

    /// Items from every batch after the first, in load order.
    pub fn drawer_items(&self) -> impl Iterator<Item = &Book> {
        self.batches.iter().skip(1).flatten()
    }

    /// Every loaded batch.
    pub fn batches(&self) -> &[Vec<Book>] {
        &self.batches
    }

    /// Switches to a new subject, invalidating in-flight tickets.
    pub fn reset(&mut self, subject: Subject) {
        self.generation += 1;
        self.cursor = Some(AggregationCursor::initial(&subject));
        self.subject = subject;
        self.batches.clear();
    }

    /// Issues a ticket for the next batch, or `None` when finished.
    pub fn begin_load(&self) -> Option<BatchTicket> {
        self.cursor.as_ref().map(|cursor| BatchTicket {
            generation: self.generation,
            subject: self.subject.clone(),
            cursor: cursor.clone(),
        })
    }

    /// Merges the response for `ticket`.
    ///
    /// Responses for an older generation, another subject, or a cursor that
    /// was already consumed are dropped as `Stale`, errors included. An error
    /// for a live ticket leaves the cursor in place so the load can be retried.
    pub fn complete(
        &mut self,
        ticket: BatchTicket,
        result: Result<Batch, AggregateError>,
    ) -> Result<LoadOutcome, AggregateError> {
        if !self.is_current(&ticket) {
            debug!(
                subject = %ticket.subject.id,
                ticket_generation = ticket.generation,
                generation = self.generation,
                "discarding stale related batch"
            );
            return Ok(LoadOutcome::Stale);
        }
        let batch = result?;
        let items = batch.items.len();
        self.batches.push(batch.items);
        self.cursor = batch.next_cursor;
        Ok(LoadOutcome::Appended { items })
    }

    /// Loads the next batch through `aggregator`.
    pub async fn load_more<S: CatalogSource>(
        &mut self,
        aggregator: &RelatedAggregator<S>,
    ) -> Result<LoadOutcome, AggregateError> {
        let Some(ticket) = self.begin_load() else {
            return Ok(LoadOutcome::Finished);
        };
        let result = aggregator.fetch_batch(&ticket.subject, &ticket.cursor).await;
        self.complete(ticket, result)
    }

    /// Loads one more batch when the drawer is opened with nothing in it yet.
    pub async fn open_drawer<S: CatalogSource>(
        &mut self,
        aggregator: &RelatedAggregator<S>,
    ) -> Result<LoadOutcome, AggregateError> {
        if !self.has_more() {
            return Ok(LoadOutcome::Finished);
        }
        if self.drawer_items().next().is_some() {
            return Ok(LoadOutcome::AlreadyLoaded);
        }
        if self.batches.is_empty() {
            self.load_more(aggregator).await?;
        }
        self.load_more(aggregator).await
    }

    fn is_current(&self, ticket: &BatchTicket) -> bool {
        ticket.generation == self.generation
            && ticket.subject.id == self.subject.id
            && self
                .cursor
                .as_ref()
                .is_some_and(|cursor| cursor.batch_index() == ticket.cursor.batch_index())
    }
}
