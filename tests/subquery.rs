use std::sync::Arc;
use Seldex::core::config::{BackendKind, Config};
use Seldex::core::error::ErrorKind;
use Seldex::core::types::{Record, Value};
use Seldex::collection::collection::Collection;
use Seldex::engine::backend::Backend;
use Seldex::engine::database::Database;
use Seldex::engine::document_backend::DocumentBackend;
use Seldex::schema::column::ColumnDefinition;

fn setup(db: &Database) -> (Collection, Collection) {
    let products = db
        .create_collection(
            "products",
            vec![
                ColumnDefinition::parse("sku", "varchar(20)").unwrap(),
                ColumnDefinition::parse("price", "decimal").unwrap(),
            ],
        )
        .unwrap();
    let orders = db
        .create_collection(
            "orders",
            vec![
                ColumnDefinition::parse("sku", "text").unwrap(),
                ColumnDefinition::parse("status", "text").unwrap(),
            ],
        )
        .unwrap();

    for (sku, price) in [("a1", 10.0), ("b2", 20.0), ("c3", 30.0)] {
        products.save(Record::new().with("sku", sku).with("price", price)).unwrap();
    }
    for (sku, status) in [("a1", "open"), ("b2", "shipped"), ("a1", "shipped")] {
        orders.save(Record::new().with("sku", sku).with("status", status)).unwrap();
    }
    (products, orders)
}

fn skus(collection: &Collection) -> Vec<String> {
    collection
        .load()
        .unwrap()
        .iter()
        .map(|record| record.get("sku").and_then(Value::as_str).unwrap().to_string())
        .collect()
}

fn open_orders(orders: &Collection) -> Collection {
    let mut open = orders.clone();
    open.add_filter("status", "=", "open").unwrap();
    open.set_result_columns(&["sku"]).unwrap();
    open
}

#[test]
fn test_in_subquery_on_both_backends() {
    for backend in [BackendKind::Relational, BackendKind::Document] {
        let db = Database::open(Config::in_memory(backend)).unwrap();
        let (mut products, orders) = setup(&db);
        let subquery = open_orders(&orders).subquery().unwrap();

        products.add_filter("sku", "in", subquery.clone()).unwrap();
        products.add_sort("sku", false).unwrap();
        assert_eq!(skus(&products), vec!["a1"], "{:?}", backend);

        products.clear_filters().unwrap();
        products.add_filter("sku", "nin", subquery).unwrap();
        assert_eq!(skus(&products), vec!["b2", "c3"], "{:?}", backend);
    }
}

#[test]
fn test_relational_subquery_sees_current_rows() {
    let db = Database::open(Config::in_memory(BackendKind::Relational)).unwrap();
    let (mut products, orders) = setup(&db);

    products.add_filter("sku", "in", open_orders(&orders).subquery().unwrap()).unwrap();
    products.add_sort("sku", false).unwrap();
    assert_eq!(skus(&products), vec!["a1"]);

    orders.save(Record::new().with("sku", "c3").with("status", "open")).unwrap();
    assert_eq!(skus(&products), vec!["a1", "c3"]);
}

#[test]
fn test_document_subquery_is_resolved_at_compile_time() {
    let config = Config::in_memory(BackendKind::Document);
    let engine = Arc::new(DocumentBackend::open(None, &config).unwrap());
    let backend: Arc<dyn Backend> = engine.clone();
    let db = Database::with_backend(config, backend);
    let (mut products, orders) = setup(&db);

    products.add_filter("sku", "in", open_orders(&orders).subquery().unwrap()).unwrap();
    products.add_sort("sku", false).unwrap();

    let schema = products.schema().unwrap();
    let plan = products.plan(&schema);
    let selector = engine.compile_selector(&plan).unwrap();

    orders.save(Record::new().with("sku", "c3").with("status", "open")).unwrap();

    // The compiled selector keeps the inner result from before the insert
    let stale: Vec<Value> = engine
        .find_with_selector(&plan, &selector)
        .unwrap()
        .into_iter()
        .filter_map(|record| record.get("sku").cloned())
        .collect();
    assert_eq!(stale, vec![Value::from("a1")]);

    // A fresh load compiles again and sees the new order
    assert_eq!(skus(&products), vec!["a1", "c3"]);
}

#[test]
fn test_subquery_values_follow_outer_column_type() {
    for backend in [BackendKind::Relational, BackendKind::Document] {
        let db = Database::open(Config::in_memory(backend)).unwrap();
        let (mut products, _) = setup(&db);
        let limits = db
            .create_collection("limits", vec![ColumnDefinition::parse("amount", "text").unwrap()])
            .unwrap();
        limits.save(Record::new().with("amount", "20")).unwrap();

        let mut inner = limits.clone();
        inner.set_result_columns(&["amount"]).unwrap();
        products.add_filter("price", "in", inner.subquery().unwrap()).unwrap();
        assert_eq!(skus(&products), vec!["b2"], "{:?}", backend);
    }
}

#[test]
fn test_subquery_needs_exactly_one_column() {
    let db = Database::open(Config::in_memory(BackendKind::Relational)).unwrap();
    let (mut products, orders) = setup(&db);

    let err = orders.subquery().unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidSubquery);

    let mut two = orders.clone();
    two.set_result_columns(&["sku", "status"]).unwrap();
    assert_eq!(two.subquery().unwrap_err().kind, ErrorKind::InvalidSubquery);

    // Only in/nin accept a sub-query
    products.add_filter("sku", "=", open_orders(&orders).subquery().unwrap()).unwrap();
    assert_eq!(products.load().unwrap_err().kind, ErrorKind::InvalidSubquery);
}
