//! Retrieval latency benchmarks.
//!
//! Uses 2,000 client documents by default. Set `BENCH_FULL_SCALE=1` to run
//! against 20,000, roughly the size of a large aggregated deployment.
//!
//! ```bash
//! BENCH_FULL_SCALE=1 cargo bench -p smartvoz-vector
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use criterion::{criterion_group, criterion_main, Criterion};
use uuid::Uuid;

use smartvoz_core::types::{Client, CompanyRef, Document};
use smartvoz_vector::embedding::{EmbeddingService, MockEmbedding};
use smartvoz_vector::index::{IndexEntry, IndexManifest, VectorIndex};
use smartvoz_vector::{ExtractiveSynthesizer, RetrievalGateway};

const CI_DOC_COUNT: usize = 2_000;
const FULL_SCALE_DOC_COUNT: usize = 20_000;

const FIRST_NAMES: [&str; 6] = ["Jorge", "Maria", "Carlos", "Lucia", "Pedro", "Ana"];
const LAST_NAMES: [&str; 5] = ["Urioste", "Lopez", "Benitez", "Rojas", "Vargas"];
const COMPANIES: [&str; 4] = ["Publicarte", "Andes Logistica", "Rio Telecom", "Altiplano Seguros"];

fn doc_count() -> usize {
    if std::env::var("BENCH_FULL_SCALE").is_ok() {
        FULL_SCALE_DOC_COUNT
    } else {
        CI_DOC_COUNT
    }
}

fn client_document(i: usize) -> Document {
    let company = i % COMPANIES.len();
    Document::Client(Client {
        id: i.to_string(),
        name: format!(
            "{} {} {}",
            FIRST_NAMES[i % FIRST_NAMES.len()],
            LAST_NAMES[(i / FIRST_NAMES.len()) % LAST_NAMES.len()],
            i
        ),
        companies: vec![CompanyRef {
            id: company.to_string(),
            name: COMPANIES[company].to_string(),
        }],
        ..Default::default()
    })
}

fn build_entries(count: usize, rt: &tokio::runtime::Runtime) -> Vec<IndexEntry> {
    let embedder = MockEmbedding::new();
    (0..count)
        .map(|i| {
            let document = client_document(i);
            let text = serde_json::to_string(&document).expect("serialize");
            let embedding = rt.block_on(embedder.embed(&text)).expect("embed failed");
            IndexEntry {
                doc_id: document.doc_id(),
                embedding,
                document,
                text,
            }
        })
        .collect()
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to build tokio runtime")
}

/// Brute-force cosine search over the in-memory index.
fn bench_index_search(c: &mut Criterion) {
    let count = doc_count();
    let rt = runtime();
    let index = VectorIndex::from_entries(build_entries(count, &rt));
    let query = rt
        .block_on(MockEmbedding::new().embed("Jorge Urioste de Publicarte"))
        .expect("query embed failed");

    let mut group = c.benchmark_group("index_search");
    group.sample_size(50);
    group.measurement_time(Duration::from_secs(10));
    group.bench_function(format!("top3_{}docs", count), |b| {
        b.iter(|| {
            let hits = index.search(&query, 3).expect("search failed");
            assert_eq!(hits.len(), 3);
            hits
        });
    });
    group.finish();
}

/// Full gateway path: enhanced query, embedding, search, synthesis.
fn bench_gateway_search(c: &mut Criterion) {
    let count = doc_count();
    let rt = runtime();
    let entries = build_entries(count, &rt);
    let dir = tempfile::tempdir().expect("tempdir");
    let manifest = IndexManifest {
        build_id: Uuid::new_v4(),
        created_at: Utc::now(),
        provider: "mock".to_string(),
        model: "lexical-hash-384".to_string(),
        dimensions: 384,
        document_count: entries.len(),
        fallback: false,
    };
    VectorIndex::from_entries(entries)
        .save(dir.path(), &manifest)
        .expect("save failed");

    let gateway = RetrievalGateway::new(
        dir.path(),
        Arc::new(MockEmbedding::new()),
        Arc::new(ExtractiveSynthesizer::new()),
        Duration::from_secs(10),
    );
    // Warm the lazy load outside the measured loop.
    assert!(rt.block_on(gateway.search("warm up", None)).failure.is_none());

    let mut group = c.benchmark_group("gateway_search");
    group.sample_size(50);
    group.measurement_time(Duration::from_secs(10));
    group.bench_function(format!("identity_query_{}docs", count), |b| {
        b.iter(|| {
            let result = rt.block_on(gateway.search("Maria Lopez de Andes Logistica", None));
            assert!(result.failure.is_none());
            result
        });
    });
    group.finish();
}

criterion_group!(benches, bench_index_search, bench_gateway_search);
criterion_main!(benches);
