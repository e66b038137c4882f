//! Catalog data model and the paginated query seam consumed by the aggregator.

use async_trait::async_trait;
use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use thiserror::Error;

/// Numeric identifier of a catalog item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct BookId(u64);

impl BookId {
    /// Wraps a raw identifier.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw identifier.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for BookId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl From<u64> for BookId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

// The backend is inconsistent about sending identifiers as numbers or strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(u64),
    Text(String),
}

impl<'de> Deserialize<'de> for BookId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match NumberOrString::deserialize(deserializer)? {
            NumberOrString::Number(raw) => Ok(Self(raw)),
            NumberOrString::Text(text) => text
                .trim()
                .parse()
                .map(Self)
                .map_err(|_| D::Error::custom(format!("book id `{text}` is not numeric"))),
        }
    }
}

/// Opaque identifier for authors and categories.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct RefId(String);

impl RefId {
    /// Returns the identifier text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RefId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RefId {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

impl From<String> for RefId {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

impl From<u64> for RefId {
    fn from(raw: u64) -> Self {
        Self(raw.to_string())
    }
}

impl<'de> Deserialize<'de> for RefId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match NumberOrString::deserialize(deserializer)? {
            NumberOrString::Number(raw) => Self(raw.to_string()),
            NumberOrString::Text(text) => Self(text),
        })
    }
}

/// Author reference embedded in a book payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    /// Author identifier.
    pub id: RefId,
    /// Display name.
    #[serde(default)]
    pub name: String,
}

/// Category reference embedded in a book payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    /// Category identifier.
    pub id: RefId,
    /// Display name.
    #[serde(default)]
    pub name: String,
}

/// A catalog item as returned by the listing endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    /// Unique identifier.
    pub id: BookId,
    /// Title shown on shelves.
    #[serde(default)]
    pub title: String,
    /// Embedded author, when the backend expands it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<Author>,
    /// Embedded category, when the backend expands it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
    /// Flat author foreign key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_id: Option<RefId>,
    /// Flat category foreign key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<RefId>,
    /// Average review rating.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f32>,
    /// Number of reviews.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_count: Option<u32>,
    /// Cover image path or URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,
    /// Year of publication.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_year: Option<i32>,
    /// Copies currently available to borrow.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_copies: Option<u32>,
}

impl Book {
    /// Builds a bare book with only an identifier and title.
    pub fn new(id: u64, title: impl Into<String>) -> Self {
        Self {
            id: BookId(id),
            title: title.into(),
            author: None,
            category: None,
            author_id: None,
            category_id: None,
            rating: None,
            review_count: None,
            cover_image: None,
            published_year: None,
            available_copies: None,
        }
    }

    /// Sets the flat author identifier.
    pub fn with_author(mut self, author: impl Into<RefId>) -> Self {
        self.author_id = Some(author.into());
        self
    }

    /// Sets the flat category identifier.
    pub fn with_category(mut self, category: impl Into<RefId>) -> Self {
        self.category_id = Some(category.into());
        self
    }

    /// Sets the rating.
    pub fn with_rating(mut self, rating: f32) -> Self {
        self.rating = Some(rating);
        self
    }

    /// Author identifier, preferring the embedded author over the flat key.
    pub fn author_ref(&self) -> Option<&RefId> {
        self.author
            .as_ref()
            .map(|author| &author.id)
            .or(self.author_id.as_ref())
    }

    /// Category identifier, preferring the embedded category over the flat key.
    pub fn category_ref(&self) -> Option<&RefId> {
        self.category
            .as_ref()
            .map(|category| &category.id)
            .or(self.category_id.as_ref())
    }
}

/// The book whose detail view drives a related-items session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    /// Identifier excluded from every batch.
    pub id: BookId,
    /// Category used for topical matches. Required.
    pub category_id: Option<RefId>,
    /// Author used for same-author matches. Optional.
    pub author_id: Option<RefId>,
}

impl Subject {
    /// Creates a subject from its raw identifiers.
    pub fn new(id: u64, category_id: Option<RefId>, author_id: Option<RefId>) -> Self {
        Self {
            id: BookId(id),
            category_id,
            author_id,
        }
    }

    /// Derives the subject from a fetched book.
    pub fn from_book(book: &Book) -> Self {
        Self {
            id: book.id,
            category_id: book.category_ref().cloned(),
            author_id: book.author_ref().cloned(),
        }
    }
}

/// One page of a paginated listing.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    /// Items on this page.
    pub items: Vec<T>,
    /// 1-based page number as reported upstream.
    pub page: u32,
    /// Total number of pages as reported upstream.
    pub total_pages: u32,
}

impl<T> Page<T> {
    /// Whether this page is the final one of its listing.
    pub fn is_last(&self) -> bool {
        self.page >= self.total_pages
    }

    /// Rejects pagination metadata that cannot describe a real page.
    pub fn validated(self) -> Result<Self, CatalogError> {
        if self.page == 0 {
            return Err(CatalogError::MalformedPagination {
                page: self.page,
                total_pages: self.total_pages,
            });
        }
        Ok(self)
    }
}

/// Ranking used by the recommendation listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendSort {
    /// Highest average rating first.
    Rating,
    /// Most reviewed first.
    Popular,
}

impl RecommendSort {
    /// Query-string value understood by the backend.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rating => "rating",
            Self::Popular => "popular",
        }
    }
}

/// Errors raised by catalog sources.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Transport-level failure.
    #[error("catalog request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The backend answered with a non-success status.
    #[error("catalog responded {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Message extracted from the response body.
        message: String,
    },
    /// The payload did not match the expected shape.
    #[error("failed to decode catalog payload: {0}")]
    Decode(#[from] serde_json::Error),
    /// Pagination metadata was unusable.
    #[error("malformed pagination (page {page} of {total_pages})")]
    MalformedPagination {
        /// Reported page number.
        page: u32,
        /// Reported page count.
        total_pages: u32,
    },
    /// The requested book does not exist.
    #[error("book {0} not found")]
    NotFound(BookId),
    /// The configured base URL could not be parsed.
    #[error("invalid catalog base url: {0}")]
    InvalidBaseUrl(#[from] url::ParseError),
    /// The bearer token contains characters not allowed in a header.
    #[error("invalid bearer token")]
    InvalidToken,
}

/// Paginated, read-only catalog queries.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Lists books in one category.
    async fn books_by_category(
        &self,
        category: &RefId,
        page: u32,
        limit: usize,
    ) -> Result<Page<Book>, CatalogError>;

    /// Lists the whole catalog without filters.
    async fn books(&self, page: u32, limit: usize) -> Result<Page<Book>, CatalogError>;

    /// Lists books ranked by the given recommendation signal.
    async fn recommended(
        &self,
        sort: RecommendSort,
        page: u32,
        limit: usize,
    ) -> Result<Page<Book>, CatalogError>;

    /// Fetches a single book.
    async fn book(&self, id: BookId) -> Result<Book, CatalogError>;
}

/// Catalog held entirely in memory, used for fixtures and offline runs.
#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    books: Vec<Book>,
    recommended: Option<Vec<BookId>>,
}

#[derive(Debug, Deserialize)]
struct CatalogFixture {
    books: Vec<Book>,
    #[serde(default)]
    recommended: Option<Vec<BookId>>,
}

impl MemoryCatalog {
    /// Builds a catalog whose rating ranking is derived from `Book::rating`.
    pub fn new(books: Vec<Book>) -> Self {
        Self {
            books,
            recommended: None,
        }
    }

    /// Overrides the rating ranking with an explicit order.
    pub fn with_recommended(mut self, order: Vec<BookId>) -> Self {
        self.recommended = Some(order);
        self
    }

    /// Loads a catalog from a JSON fixture: `{ "books": [...], "recommended": [ids]? }`.
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self, CatalogError> {
        let fixture: CatalogFixture = parse_json(bytes)?;
        Ok(Self {
            books: fixture.books,
            recommended: fixture.recommended,
        })
    }

    /// Number of books in the catalog.
    pub fn len(&self) -> usize {
        self.books.len()
    }

    /// Whether the catalog holds no books.
    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }

    fn ranked(&self, sort: RecommendSort) -> Vec<Book> {
        match (sort, &self.recommended) {
            (RecommendSort::Rating, Some(order)) => order
                .iter()
                .filter_map(|id| self.books.iter().find(|book| book.id == *id))
                .cloned()
                .collect(),
            (RecommendSort::Rating, None) => {
                let mut ranked = self.books.clone();
                ranked.sort_by(|a, b| {
                    let a = a.rating.unwrap_or(0.0);
                    let b = b.rating.unwrap_or(0.0);
                    b.total_cmp(&a)
                });
                ranked
            }
            (RecommendSort::Popular, _) => {
                let mut ranked = self.books.clone();
                ranked.sort_by_key(|book| std::cmp::Reverse(book.review_count.unwrap_or(0)));
                ranked
            }
        }
    }
}

fn parse_json<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CatalogError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Slices `items` into the requested 1-based page.
fn paginate(items: Vec<Book>, page: u32, limit: usize) -> Result<Page<Book>, CatalogError> {
    let limit = limit.max(1);
    let total_pages = items.len().div_ceil(limit).max(1) as u32;
    if page == 0 {
        return Err(CatalogError::MalformedPagination { page, total_pages });
    }
    let start = (page as usize - 1).saturating_mul(limit);
    let items = items.into_iter().skip(start).take(limit).collect();
    Ok(Page {
        items,
        page,
        total_pages,
    })
}

#[async_trait]
impl CatalogSource for MemoryCatalog {
    async fn books_by_category(
        &self,
        category: &RefId,
        page: u32,
        limit: usize,
    ) -> Result<Page<Book>, CatalogError> {
        let matching = self
            .books
            .iter()
            .filter(|book| book.category_ref() == Some(category))
            .cloned()
            .collect();
        paginate(matching, page, limit)
    }

    async fn books(&self, page: u32, limit: usize) -> Result<Page<Book>, CatalogError> {
        paginate(self.books.clone(), page, limit)
    }

    async fn recommended(
        &self,
        sort: RecommendSort,
        page: u32,
        limit: usize,
    ) -> Result<Page<Book>, CatalogError> {
        paginate(self.ranked(sort), page, limit)
    }

    async fn book(&self, id: BookId) -> Result<Book, CatalogError> {
        self.books
            .iter()
            .find(|book| book.id == id)
            .cloned()
            .ok_or(CatalogError::NotFound(id))
    }
}
