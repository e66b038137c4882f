use std::fs;

use anyhow::{Context, Result};
use bookshelf::{
    AggregatorControls, Book, BookId, CatalogSource, Cli, HttpCatalog, LoadOutcome,
    MemoryCatalog, RelatedAggregator, RelatedFeed, Subject,
};
use clap::Parser;
use futures_util::future::join_all;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Serialize)]
struct ShelfReport {
    subject: BookId,
    title: String,
    batches: Vec<Vec<ShelfEntry>>,
    exhausted: bool,
}

#[derive(Serialize)]
struct ShelfEntry {
    id: BookId,
    title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rating: Option<f32>,
}

impl From<&Book> for ShelfEntry {
    fn from(book: &Book) -> Self {
        Self {
            id: book.id,
            title: book.title.clone(),
            author: book.author.as_ref().map(|author| author.name.clone()),
            rating: book.rating,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let controls = cli.build_controls().context("invalid aggregation controls")?;

    match &cli.fixture {
        Some(path) => {
            let bytes = fs::read(path)
                .with_context(|| format!("failed to read fixture {}", path.display()))?;
            let catalog = MemoryCatalog::from_json_slice(&bytes)
                .with_context(|| format!("failed to parse fixture {}", path.display()))?;
            info!(books = catalog.len(), "loaded fixture catalog");
            run(catalog, controls, &cli).await
        }
        None => {
            let catalog =
                HttpCatalog::new(&cli.api_base, cli.token.as_deref(), cli.request_timeout())
                    .context("failed to build catalog client")?;
            info!(base = %catalog.base_url(), "using catalog backend");
            run(catalog, controls, &cli).await
        }
    }
}

async fn run<S: CatalogSource>(source: S, controls: AggregatorControls, cli: &Cli) -> Result<()> {
    let aggregator = RelatedAggregator::with_controls(source, controls);
    let shelves = join_all(
        cli.books
            .iter()
            .map(|&id| related_shelf(&aggregator, BookId::new(id), cli.batches)),
    )
    .await;

    for shelf in shelves {
        let report = shelf?;
        if cli.json {
            println!("{}", serde_json::to_string(&report)?);
        } else {
            render(&report);
        }
    }
    Ok(())
}

async fn related_shelf<S: CatalogSource>(
    aggregator: &RelatedAggregator<S>,
    id: BookId,
    batches: usize,
) -> Result<ShelfReport> {
    let book = aggregator
        .source()
        .book(id)
        .await
        .with_context(|| format!("failed to load book {id}"))?;
    let mut feed = RelatedFeed::new(Subject::from_book(&book));
    for _ in 0..batches {
        let outcome = feed
            .load_more(aggregator)
            .await
            .with_context(|| format!("failed to load related books for {id}"))?;
        if outcome == LoadOutcome::Finished {
            break;
        }
    }
    Ok(ShelfReport {
        subject: book.id,
        title: book.title,
        batches: feed
            .batches()
            .iter()
            .map(|batch| batch.iter().map(ShelfEntry::from).collect())
            .collect(),
        exhausted: !feed.has_more(),
    })
}

fn render(report: &ShelfReport) {
    println!("== {} ({})", report.title, report.subject);
    for (index, batch) in report.batches.iter().enumerate() {
        println!("-- batch {index}");
        for entry in batch {
            match &entry.author {
                Some(author) => println!("   {:>6}  {} ({author})", entry.id, entry.title),
                None => println!("   {:>6}  {}", entry.id, entry.title),
            }
        }
    }
    if report.exhausted {
        println!("-- no more related books");
    }
}
