use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use Seldex::core::config::{BackendKind, Config};
use Seldex::core::types::Record;
use Seldex::collection::collection::Collection;
use Seldex::engine::database::Database;
use Seldex::filter::group::FilterTree;
use Seldex::filter::operand::Operator;
use Seldex::query::compiler::QueryCompiler;
use Seldex::query::document::DocumentCompiler;
use Seldex::query::sql::SqlCompiler;
use Seldex::query::translate::OperatorTranslator;
use Seldex::schema::column::{CollectionSchema, ColumnDefinition};
use std::time::{Duration, Instant};
use rand::Rng;

const CATEGORIES: [&str; 8] = ["tools", "garden", "kitchen", "toys", "books", "music", "sport", "office"];

/// Helper to create a random product record
fn create_test_record(id: u64) -> Record {
    let mut rng = rand::thread_rng();
    Record::new()
        .with("sku", format!("sku-{:06}", id))
        .with("category", CATEGORIES[rng.gen_range(0..CATEGORIES.len())])
        .with("qty", rng.gen_range(0..500i64))
        .with("price", rng.gen_range(1.0..250.0f64))
}

fn columns() -> Vec<ColumnDefinition> {
    vec![
        ColumnDefinition::parse("sku", "varchar(20)").unwrap(),
        ColumnDefinition::parse("category", "text").unwrap().indexed(),
        ColumnDefinition::parse("qty", "integer").unwrap(),
        ColumnDefinition::parse("price", "money").unwrap(),
    ]
}

fn seeded(backend: BackendKind, records: u64) -> (Database, Collection) {
    let db = Database::open(Config::in_memory(backend)).unwrap();
    let products = db.create_collection("products", columns()).unwrap();
    for id in 0..records {
        products.save(create_test_record(id)).unwrap();
    }
    (db, products)
}

/// Three levels of nested groups, a few predicates each
fn nested_tree(schema: &CollectionSchema) -> FilterTree {
    let mut tree = FilterTree::new();
    tree.setup_group("root", false, "").unwrap();
    tree.setup_group("either", true, "root").unwrap();
    tree.setup_group("cheap", false, "either").unwrap();
    tree.add_filter(schema, "root", "qty", Operator::Gt, 10i64.into()).unwrap();
    tree.add_filter(schema, "root", "sku", Operator::Like, "sku-0".into()).unwrap();
    tree.add_filter(schema, "either", "category", Operator::In, vec!["tools", "books"].into()).unwrap();
    tree.add_filter(schema, "cheap", "price", Operator::Lt, 20.0f64.into()).unwrap();
    tree.add_filter(schema, "cheap", "qty", Operator::Gte, "100".into()).unwrap();
    tree
}

/// Benchmark filter tree compilation for both query languages
fn bench_compile(c: &mut Criterion) {
    let schema = CollectionSchema::with_columns("products", columns()).unwrap();
    let tree = nested_tree(&schema);
    let mut group = c.benchmark_group("compile");

    group.bench_function("sql", |b| {
        b.iter(|| {
            let fragment = SqlCompiler::default().compile(&schema, black_box(&tree)).unwrap();
            black_box(fragment)
        });
    });

    group.bench_function("document", |b| {
        b.iter(|| {
            let selector = DocumentCompiler::new(OperatorTranslator::default())
                .compile(&schema, black_box(&tree))
                .unwrap();
            black_box(selector)
        });
    });

    group.finish();
}

/// Benchmark single record upserts
fn bench_save(c: &mut Criterion) {
    let mut group = c.benchmark_group("save");

    for backend in [BackendKind::Relational, BackendKind::Document] {
        group.bench_function(format!("{:?}", backend).to_lowercase(), |b| {
            let (_db, products) = seeded(backend, 0);
            let mut id = 0;
            b.iter(|| {
                products.save(create_test_record(id)).unwrap();
                id += 1;
            });
        });
    }

    group.finish();
}

/// Benchmark filtered loads at several collection sizes
fn bench_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("load");
    group.sample_size(20);

    for size in [100u64, 1_000, 5_000].iter() {
        for backend in [BackendKind::Relational, BackendKind::Document] {
            let (_db, mut products) = seeded(backend, *size);
            products.add_filter("category", "in", vec!["tools", "books"]).unwrap();
            products.add_filter("qty", ">=", 250i64).unwrap();
            products.add_sort("price", true).unwrap();

            group.bench_with_input(
                BenchmarkId::new(format!("{:?}", backend).to_lowercase(), size),
                size,
                |b, _| {
                    b.iter(|| black_box(products.load().unwrap()));
                },
            );
        }
    }

    group.finish();
}

/// Relational writes inside and outside transactions
fn bench_transactions(c: &mut Criterion) {
    let mut group = c.benchmark_group("transactions");
    group.measurement_time(Duration::from_secs(10));

    group.bench_function("batch_of_100_in_transaction", |b| {
        b.iter_custom(|iters| {
            let (db, products) = seeded(BackendKind::Relational, 0);
            let mut id = 0;

            let start = Instant::now();
            for _ in 0..iters {
                let tx = db.begin_transaction().unwrap();
                let mut scoped = products.clone();
                scoped.assign_transaction(&tx).unwrap();
                for _ in 0..100 {
                    scoped.save(create_test_record(id)).unwrap();
                    id += 1;
                }
                db.commit_transaction(&tx).unwrap();
            }
            start.elapsed()
        });
    });

    group.finish();
}

criterion_group!(benches, bench_compile, bench_save, bench_load, bench_transactions);
criterion_main!(benches);
