use std::collections::HashMap;
use std::time::Duration;

use axum::extract::{Path, Query};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use bookshelf::{
    BookId, CatalogError, CatalogSource, HttpCatalog, RecommendSort, RefId, RelatedAggregator,
    Subject,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

type Reply = (StatusCode, Json<Value>);

fn unauthorized(headers: &HeaderMap) -> Option<Reply> {
    let token = headers.get(AUTHORIZATION).and_then(|value| value.to_str().ok());
    (token != Some("Bearer secret")).then(|| {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "success": false, "message": "Token expired" })),
        )
    })
}

fn param(params: &HashMap<String, String>, key: &str) -> String {
    params.get(key).cloned().unwrap_or_else(|| "-".to_string())
}

async fn list_books(headers: HeaderMap, Query(params): Query<HashMap<String, String>>) -> Reply {
    if let Some(reply) = unauthorized(&headers) {
        return reply;
    }
    let page: u32 = params.get("page").and_then(|raw| raw.parse().ok()).unwrap_or(1);
    let title = format!(
        "{}|{}|{}",
        param(&params, "page"),
        param(&params, "limit"),
        param(&params, "categoryId")
    );
    (
        StatusCode::OK,
        Json(json!({
            "success": true,
            "data": {
                "books": [
                    { "id": "11", "title": title, "author": { "id": 7, "name": "Ann" } },
                    { "id": "draft", "title": "unnumbered" }
                ],
                "pagination": { "page": page, "limit": 6, "total": 13, "totalPages": 3 }
            }
        })),
    )
}

async fn recommend(headers: HeaderMap, Query(params): Query<HashMap<String, String>>) -> Reply {
    if let Some(reply) = unauthorized(&headers) {
        return reply;
    }
    (
        StatusCode::OK,
        Json(json!({
            "data": {
                "mode": "rating",
                "books": [{ "id": 12, "title": param(&params, "by"), "rating": 4.5 }],
                "pagination": { "page": 1, "totalPages": 1 }
            }
        })),
    )
}

async fn show_book(headers: HeaderMap, Path(id): Path<u64>) -> Reply {
    if let Some(reply) = unauthorized(&headers) {
        return reply;
    }
    if id == 999 {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "success": false, "message": "Book not found" })),
        );
    }
    (
        StatusCode::OK,
        Json(json!({
            "data": {
                "id": id,
                "title": "Subject",
                "category": { "id": "fiction", "name": "Fiction" },
                "author": { "id": "7", "name": "Ann" }
            }
        })),
    )
}

async fn spawn_backend() -> String {
    let app = Router::new()
        .route("/api/books", get(list_books))
        .route("/api/books/recommend", get(recommend))
        .route("/api/books/:id", get(show_book));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test backend");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve test backend");
    });
    format!("http://{addr}")
}

fn client(base: &str, token: Option<&str>) -> HttpCatalog {
    HttpCatalog::new(base, token, Duration::from_secs(5)).expect("client")
}

#[tokio::test(flavor = "current_thread")]
async fn category_listing_forwards_query_and_token() {
    let base = spawn_backend().await;
    let catalog = client(&base, Some("secret"));

    let page = catalog
        .books_by_category(&RefId::from("fiction"), 2, 6)
        .await
        .expect("category page");

    assert_eq!(page.page, 2);
    assert_eq!(page.total_pages, 3);
    // The record without a numeric id is dropped, not the page.
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].id, BookId::new(11));
    assert_eq!(page.items[0].title, "2|6|fiction");
    assert_eq!(page.items[0].author_ref().map(RefId::as_str), Some("7"));
}

#[tokio::test(flavor = "current_thread")]
async fn generic_listing_sends_no_category() {
    let base = spawn_backend().await;
    let catalog = client(&base, Some("secret"));

    let page = catalog.books(1, 6).await.expect("listing page");

    assert_eq!(page.items[0].title, "1|6|-");
}

#[tokio::test(flavor = "current_thread")]
async fn recommendation_listing_sends_sort_key() {
    let base = spawn_backend().await;
    let catalog = client(&base, Some("secret"));

    let page = catalog
        .recommended(RecommendSort::Popular, 1, 6)
        .await
        .expect("recommendations");

    assert_eq!(page.items[0].title, "popular");
    assert!(page.is_last());
}

#[tokio::test(flavor = "current_thread")]
async fn rejected_token_surfaces_backend_message() {
    let base = spawn_backend().await;
    let catalog = client(&base, None);

    let err = catalog.books(1, 6).await.expect_err("unauthorized");

    match err {
        CatalogError::Status { status, message } => {
            assert_eq!(status, 401);
            assert_eq!(message, "Token expired");
        }
        other => panic!("expected status error, got {other:?}"),
    }
}

#[tokio::test(flavor = "current_thread")]
async fn book_lookup_maps_missing_to_not_found() {
    let base = spawn_backend().await;
    let catalog = client(&base, Some("secret"));

    let book = catalog.book(BookId::new(42)).await.expect("book");
    let subject = Subject::from_book(&book);
    assert_eq!(subject.category_id.as_ref().map(RefId::as_str), Some("fiction"));
    assert_eq!(subject.author_id.as_ref().map(RefId::as_str), Some("7"));

    let err = catalog.book(BookId::new(999)).await.expect_err("missing");
    assert!(matches!(err, CatalogError::NotFound(id) if id == BookId::new(999)));
}

#[tokio::test(flavor = "current_thread")]
async fn aggregator_runs_against_http_backend() {
    let base = spawn_backend().await;
    let aggregator = RelatedAggregator::new(client(&base, Some("secret")));
    let book = aggregator
        .source()
        .book(BookId::new(42))
        .await
        .expect("subject");
    let subject = Subject::from_book(&book);
    let cursor = aggregator.initial_cursor(&subject).expect("cursor");

    let batch = aggregator.fetch_batch(&subject, &cursor).await.expect("batch");

    let ids: Vec<u64> = batch.items.iter().map(|book| book.id.get()).collect();
    assert_eq!(ids, vec![11, 12]);
    assert!(batch.next_cursor.is_none());
}
