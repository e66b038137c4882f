#![warn(missing_docs)]
//! Related-books aggregation for the library catalog client.

pub mod aggregator;
pub mod catalog;
pub mod controls;
pub mod cursor;
pub mod feed;
pub mod http;

pub use aggregator::{AggregateError, Batch, RelatedAggregator};
pub use catalog::{
    Author, Book, BookId, CatalogError, CatalogSource, Category, MemoryCatalog, Page,
    RecommendSort, RefId, Subject,
};
pub use controls::{AggregatorControls, Cli, ControlsError};
pub use cursor::{AggregationCursor, SeenIds, SourceCursor, SourceKind};
pub use feed::{BatchTicket, LoadOutcome, RelatedFeed};
pub use http::HttpCatalog;
