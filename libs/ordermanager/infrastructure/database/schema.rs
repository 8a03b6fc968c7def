use crate::domain::OrderStatus;
use sqlx::SqlitePool;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, SchemaError>;

/// Database schema version
pub const SCHEMA_VERSION: i32 = 2;

/// Initialize database schema
pub async fn initialize_schema(pool: &SqlitePool) -> Result<()> {
    // Orders
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS orders (
            order_hash TEXT PRIMARY KEY,
            protocol TEXT NOT NULL,
            owner TEXT NOT NULL,
            token_s TEXT NOT NULL,
            token_b TEXT NOT NULL,
            amount_s TEXT NOT NULL,
            amount_b TEXT NOT NULL,
            buy_no_more_than_amount_b BOOLEAN NOT NULL DEFAULT false,
            order_type TEXT NOT NULL,
            valid_since INTEGER NOT NULL DEFAULT 0,
            valid_until INTEGER NOT NULL DEFAULT 0,
            market TEXT NOT NULL DEFAULT '',
            side TEXT NOT NULL,
            price REAL NOT NULL DEFAULT 0,
            dealt_amount_s TEXT NOT NULL DEFAULT '0',
            dealt_amount_b TEXT NOT NULL DEFAULT '0',
            split_amount_s TEXT NOT NULL DEFAULT '0',
            split_amount_b TEXT NOT NULL DEFAULT '0',
            cancelled_amount_s TEXT NOT NULL DEFAULT '0',
            cancelled_amount_b TEXT NOT NULL DEFAULT '0',
            status INTEGER NOT NULL,
            updated_block INTEGER NOT NULL DEFAULT 0,
            cutoff_block INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Cutoff candidate lookups
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_orders_owner ON orders(protocol, owner, status, valid_since)",
    )
    .execute(pool)
    .await?;

    // Version 1 databases predate the cutoff block
    let has_cutoff_block = sqlx::query_as::<_, (i64,)>(
        "SELECT COUNT(*) FROM pragma_table_info('orders') WHERE name = 'cutoff_block'",
    )
    .fetch_one(pool)
    .await?
    .0 > 0;
    if !has_cutoff_block {
        sqlx::query("ALTER TABLE orders ADD COLUMN cutoff_block INTEGER NOT NULL DEFAULT 0")
            .execute(pool)
            .await?;
        // Best guess for cutoffs applied before the column existed
        sqlx::query("UPDATE orders SET cutoff_block = updated_block WHERE status = ?")
            .bind(OrderStatus::Cutoff.code())
            .execute(pool)
            .await?;
    }

    sqlx::query("DROP INDEX IF EXISTS idx_orders_status_block")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_orders_status_cutoff ON orders(status, cutoff_block)")
        .execute(pool)
        .await?;

    // Fills
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS fill_events (
            tx_hash TEXT NOT NULL,
            fill_index INTEGER NOT NULL,
            ring_hash TEXT NOT NULL,
            order_hash TEXT NOT NULL,
            owner TEXT NOT NULL,
            token_s TEXT NOT NULL,
            token_b TEXT NOT NULL,
            amount_s TEXT NOT NULL,
            amount_b TEXT NOT NULL,
            split_s TEXT NOT NULL,
            split_b TEXT NOT NULL,
            side TEXT NOT NULL,
            market TEXT NOT NULL,
            order_type TEXT NOT NULL,
            block_number INTEGER NOT NULL,
            status INTEGER NOT NULL,
            applied BOOLEAN NOT NULL DEFAULT false,
            fork BOOLEAN NOT NULL DEFAULT false,
            PRIMARY KEY (tx_hash, fill_index)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_fill_events_block ON fill_events(block_number, fork)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_fill_events_order ON fill_events(order_hash)")
        .execute(pool)
        .await?;

    // Cancels
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS cancel_events (
            tx_hash TEXT PRIMARY KEY,
            order_hash TEXT NOT NULL,
            amount_cancelled TEXT NOT NULL,
            block_number INTEGER NOT NULL,
            status INTEGER NOT NULL,
            fork BOOLEAN NOT NULL DEFAULT false
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_cancel_events_block ON cancel_events(block_number, fork)",
    )
    .execute(pool)
    .await?;

    // Owner-wide cutoffs
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS cutoff_events (
            tx_hash TEXT PRIMARY KEY,
            protocol TEXT NOT NULL,
            owner TEXT NOT NULL,
            cutoff INTEGER NOT NULL,
            order_hashes TEXT NOT NULL DEFAULT '[]',
            block_number INTEGER NOT NULL,
            status INTEGER NOT NULL,
            fork BOOLEAN NOT NULL DEFAULT false
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Pairwise cutoffs
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS cutoff_pair_events (
            tx_hash TEXT PRIMARY KEY,
            protocol TEXT NOT NULL,
            owner TEXT NOT NULL,
            token1 TEXT NOT NULL,
            token2 TEXT NOT NULL,
            cutoff INTEGER NOT NULL,
            order_hashes TEXT NOT NULL DEFAULT '[]',
            block_number INTEGER NOT NULL,
            status INTEGER NOT NULL,
            fork BOOLEAN NOT NULL DEFAULT false
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Ring settlements (ring mined + submit ring)
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ring_mined_events (
            tx_hash TEXT PRIMARY KEY,
            ring_hash TEXT NOT NULL,
            miner TEXT NOT NULL,
            fee_recipient TEXT NOT NULL,
            ring_index INTEGER NOT NULL DEFAULT 0,
            block_number INTEGER NOT NULL,
            status INTEGER NOT NULL,
            err TEXT NOT NULL DEFAULT '',
            fork BOOLEAN NOT NULL DEFAULT false
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create schema version table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Insert current schema version
    sqlx::query(
        "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (?, CURRENT_TIMESTAMP)",
    )
    .bind(SCHEMA_VERSION)
    .execute(pool)
    .await?;

    Ok(())
}

/// Get current schema version
pub async fn get_schema_version(pool: &SqlitePool) -> Result<Option<i32>> {
    let row = sqlx::query_as::<_, (i32,)>(
        "SELECT version FROM schema_version ORDER BY version DESC LIMIT 1",
    )
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|(version,)| version))
}
