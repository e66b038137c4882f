//! REST-backed catalog source.

use crate::catalog::{Book, BookId, CatalogError, CatalogSource, Page, RecommendSort, RefId};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Catalog client for the library backend's `/api/books` endpoints.
#[derive(Clone, Debug)]
pub struct HttpCatalog {
    client: Client,
    base: Url,
}

impl HttpCatalog {
    /// Builds a client rooted at `base_url`, optionally forwarding a bearer token.
    pub fn new(
        base_url: &str,
        token: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, CatalogError> {
        let base = Url::parse(&format!("{}/", base_url.trim().trim_end_matches('/')))?;
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(token) = token.map(str::trim).filter(|token| !token.is_empty()) {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| CatalogError::InvalidToken)?;
            headers.insert(AUTHORIZATION, value);
        }
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;
        Ok(Self { client, base })
    }

    /// Root URL every endpoint is resolved against.
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, CatalogError> {
        let url = self.base.join(path)?;
        debug!(%url, ?query, "catalog request");
        let response = self.client.get(url).query(query).send().await?;
        let status = response.status();
        let body = response.bytes().await?;
        if !status.is_success() {
            return Err(CatalogError::Status {
                status: status.as_u16(),
                message: error_message(status, &body),
            });
        }
        let envelope: Envelope<T> = serde_json::from_slice(&body)?;
        Ok(envelope.data)
    }

    async fn list(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Page<Book>, CatalogError> {
        let payload: ListPayload = self.get(path, query).await?;
        Ok(Page {
            items: decode_books(payload.books),
            page: payload.pagination.page,
            total_pages: payload.pagination.total_pages,
        })
    }
}

#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    message: Option<String>,
}

#[derive(Deserialize)]
struct ListPayload {
    books: Vec<Value>,
    pagination: Pagination,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Pagination {
    page: u32,
    total_pages: u32,
}

fn error_message(status: StatusCode, body: &[u8]) -> String {
    serde_json::from_slice::<ErrorEnvelope>(body)
        .ok()
        .and_then(|envelope| envelope.message)
        .or_else(|| {
            let text = String::from_utf8_lossy(body).trim().to_string();
            (!text.is_empty()).then_some(text)
        })
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string())
}

/// Decodes listing records one by one; a record that does not decode is dropped.
fn decode_books(raw: Vec<Value>) -> Vec<Book> {
    raw.into_iter()
        .filter_map(|record| match serde_json::from_value::<Book>(record) {
            Ok(book) => Some(book),
            Err(err) => {
                debug!(error = %err, "skipping undecodable listing record");
                None
            }
        })
        .collect()
}

fn paging(page: u32, limit: usize) -> Vec<(&'static str, String)> {
    vec![("page", page.to_string()), ("limit", limit.to_string())]
}

#[async_trait]
impl CatalogSource for HttpCatalog {
    async fn books_by_category(
        &self,
        category: &RefId,
        page: u32,
        limit: usize,
    ) -> Result<Page<Book>, CatalogError> {
        let mut query = paging(page, limit);
        query.push(("categoryId", category.to_string()));
        self.list("api/books", &query).await
    }

    async fn books(&self, page: u32, limit: usize) -> Result<Page<Book>, CatalogError> {
        self.list("api/books", &paging(page, limit)).await
    }

    async fn recommended(
        &self,
        sort: RecommendSort,
        page: u32,
        limit: usize,
    ) -> Result<Page<Book>, CatalogError> {
        let mut query = paging(page, limit);
        query.push(("by", sort.as_str().to_string()));
        self.list("api/books/recommend", &query).await
    }

    async fn book(&self, id: BookId) -> Result<Book, CatalogError> {
        match self.get(&format!("api/books/{id}"), &[]).await {
            Err(CatalogError::Status { status, .. })
                if status == StatusCode::NOT_FOUND.as_u16() =>
            {
                Err(CatalogError::NotFound(id))
            }
            other => other,
        }
    }
}
