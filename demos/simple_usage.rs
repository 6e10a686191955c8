/// Seldex API demo
///
/// Walks through the main operations on the relational backend:
/// - Collections and columns
/// - Saving and loading records
/// - Nested filter groups and static filters
/// - Sub-queries
/// - Transactions

use Seldex::core::config::{BackendKind, Config};
use Seldex::core::logging::init_logging;
use Seldex::core::types::{Record, Value};
use Seldex::engine::database::Database;
use Seldex::schema::column::ColumnDefinition;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("\n╔═══════════════════════════════════════════════╗");
    println!("║        Seldex - Data Access API Demo          ║");
    println!("╚═══════════════════════════════════════════════╝\n");

    let config = Config::in_memory(BackendKind::Relational);
    init_logging(&config.log_filter);

    // Step 1: Open database and create collections
    println!("Step 1: Creating collections...");
    let db = Database::open(config)?;
    let products = db.create_collection(
        "products",
        vec![
            ColumnDefinition::parse("sku", "varchar(20)")?.indexed(),
            ColumnDefinition::parse("qty", "integer")?,
            ColumnDefinition::parse("price", "money")?,
            ColumnDefinition::parse("tags", "[]text")?,
        ],
    )?;
    let orders = db.create_collection(
        "orders",
        vec![
            ColumnDefinition::parse("sku", "varchar(20)")?,
            ColumnDefinition::parse("status", "text")?,
        ],
    )?;
    println!("  Collections: {:?}\n", db.collection_names());

    // Step 2: Save records; values are converted to the column types
    println!("Step 2: Saving records...");
    for (sku, qty, price, tags) in [
        ("bolt", "4", "0.25", "metal, small"),
        ("nut", "5", "0.10", "metal, small"),
        ("hammer", "9", "12.5", "tool"),
        ("saw", "10", "24.99", "tool, sharp"),
    ] {
        let id = products.save(
            Record::new()
                .with("sku", sku)
                .with("qty", qty)
                .with("price", price)
                .with("tags", tags),
        )?;
        println!("  {} -> {}", sku, id);
    }
    orders.save(Record::new().with("sku", "hammer").with("status", "open"))?;
    orders.save(Record::new().with("sku", "bolt").with("status", "shipped"))?;
    println!();

    // Step 3: Filter groups: qty >= 5 AND qty < 10
    println!("Step 3: Range filter...");
    let mut in_stock = products.clone();
    in_stock.add_filter("qty", ">=", "5")?;
    in_stock.setup_filter_group("range", false, "")?;
    in_stock.add_group_filter("range", "qty", "<", "10")?;
    in_stock.add_sort("qty", false)?;
    for record in in_stock.load()? {
        println!("  {}", describe(&record));
    }
    println!();

    // Step 4: OR group nested under an AND group
    println!("Step 4: Nested groups...");
    let mut tagged = products.clone();
    tagged.setup_filter_group("cheap", false, "")?;
    tagged.setup_filter_group("kind", true, "cheap")?;
    tagged.add_group_filter("cheap", "price", "<", 15.0f64)?;
    tagged.add_group_filter("kind", "tags", "in", vec!["small"])?;
    tagged.add_group_filter("kind", "sku", "like", "ham%")?;
    println!("  {} matching records\n", tagged.count()?);

    // Step 5: Sub-query: products with an open order
    println!("Step 5: Sub-query...");
    let mut open_orders = orders.clone();
    open_orders.add_filter("status", "=", "open")?;
    open_orders.set_result_columns(&["sku"])?;
    let mut ordered = products.clone();
    ordered.add_filter("sku", "in", open_orders.subquery()?)?;
    for record in ordered.load()? {
        println!("  {}", describe(&record));
    }
    println!();

    // Step 6: Transactions
    println!("Step 6: Transactions...");
    let tx = db.begin_transaction()?;
    let mut scoped = products.clone();
    scoped.assign_transaction(&tx)?;
    scoped.save(Record::new().with("sku", "drill").with("qty", 1i64))?;
    println!("  Inside transaction: {} records", scoped.count()?);
    db.rollback_transaction(&tx)?;
    println!("  After rollback: {} records", products.count()?);
    println!();

    // Step 7: Distinct values and pool statistics
    println!("Step 7: Statistics...");
    let qtys: Vec<String> = products.distinct("qty")?.iter().map(Value::to_text).collect();
    println!("  Distinct qty: {}", qtys.join(", "));
    if let Some(stats) = db.pool_stats() {
        println!("  Pool: {} of {} connections", stats.connections, stats.max_connections);
    }

    db.close()?;
    println!("\nDone!");
    Ok(())
}

fn describe(record: &Record) -> String {
    let field = |name: &str| record.get(name).map(Value::to_string).unwrap_or_default();
    format!(
        "{:<8} qty={:<3} price={:<6} tags={}",
        field("sku"),
        field("qty"),
        field("price"),
        field("tags")
    )
}
