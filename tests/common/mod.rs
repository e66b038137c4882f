#![allow(dead_code)]

use std::sync::Mutex;

use async_trait::async_trait;
use bookshelf::{
    Book, BookId, CatalogError, CatalogSource, Page, RecommendSort, RefId, SourceKind,
};

/// Canned responses for one upstream listing.
#[derive(Clone, Debug)]
pub enum Script {
    /// Fixed pages; requests past the end return an empty last page.
    Pages(Vec<Vec<Book>>),
    /// The same items on every page, never reporting a last page.
    Repeat(Vec<Book>),
    /// Every request fails with a 503.
    Fail,
    /// Every request reports page 0.
    Malformed,
}

impl Script {
    pub fn paged(items: Vec<Book>, per_page: usize) -> Self {
        Self::Pages(items.chunks(per_page).map(<[Book]>::to_vec).collect())
    }

    pub fn empty() -> Self {
        Self::Pages(Vec::new())
    }

    fn serve(&self, page: u32) -> Result<Page<Book>, CatalogError> {
        match self {
            Self::Pages(pages) => Ok(Page {
                items: pages.get(page as usize - 1).cloned().unwrap_or_default(),
                page,
                total_pages: pages.len().max(1) as u32,
            }),
            Self::Repeat(items) => Ok(Page {
                items: items.clone(),
                page,
                total_pages: u32::MAX,
            }),
            Self::Fail => Err(CatalogError::Status {
                status: 503,
                message: "unavailable".to_string(),
            }),
            Self::Malformed => Ok(Page {
                items: Vec::new(),
                page: 0,
                total_pages: 0,
            }),
        }
    }
}

/// Catalog that replays scripts and records every request.
pub struct ScriptedCatalog {
    category: Script,
    listing: Script,
    recommended: Script,
    calls: Mutex<Vec<(SourceKind, u32)>>,
}

impl ScriptedCatalog {
    pub fn new(category: Script, listing: Script, recommended: Script) -> Self {
        Self {
            category,
            listing,
            recommended,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(SourceKind, u32)> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn calls_to(&self, kind: SourceKind) -> usize {
        self.calls().iter().filter(|(called, _)| *called == kind).count()
    }

    fn record(&self, kind: SourceKind, page: u32) {
        self.calls.lock().expect("calls lock").push((kind, page));
    }
}

#[async_trait]
impl CatalogSource for ScriptedCatalog {
    async fn books_by_category(
        &self,
        _category: &RefId,
        page: u32,
        _limit: usize,
    ) -> Result<Page<Book>, CatalogError> {
        self.record(SourceKind::Category, page);
        self.category.serve(page)
    }

    async fn books(&self, page: u32, _limit: usize) -> Result<Page<Book>, CatalogError> {
        self.record(SourceKind::Author, page);
        self.listing.serve(page)
    }

    async fn recommended(
        &self,
        sort: RecommendSort,
        page: u32,
        _limit: usize,
    ) -> Result<Page<Book>, CatalogError> {
        assert_eq!(sort, RecommendSort::Rating);
        self.record(SourceKind::Recommendation, page);
        self.recommended.serve(page)
    }

    async fn book(&self, id: BookId) -> Result<Book, CatalogError> {
        Err(CatalogError::NotFound(id))
    }
}

pub fn book(id: u64, category: &str, author: &str) -> Book {
    Book::new(id, format!("Book {id}"))
        .with_category(category)
        .with_author(author)
}

/// `count` books with consecutive ids starting at `first`.
pub fn run_of(first: u64, count: u64, category: &str, author: &str) -> Vec<Book> {
    (first..first + count)
        .map(|id| book(id, category, author))
        .collect()
}

pub fn ids(items: &[Book]) -> Vec<u64> {
    items.iter().map(|book| book.id.get()).collect()
}
