pub mod models;
pub mod schema;

use crate::domain::types::{address_hex, hash_hex, parse_hash};
use crate::domain::{Address, OrderStatus, TxStatus, H256};
use async_trait::async_trait;
use sqlx::query::Query;
use sqlx::sqlite::{
    SqliteArguments, SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePoolOptions,
};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, info};

// Re-export main types
pub use models::{
    CancelEventRow, CutoffEventRow, CutoffPairEventRow, FillEventRow, OrderRow, RingMinedEventRow,
};
pub use schema::{get_schema_version, initialize_schema};

use models::to_i64;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Database connection error: {0}")]
    ConnectionError(#[from] sqlx::Error),

    #[error("Schema error: {0}")]
    SchemaError(#[from] schema::SchemaError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Duplicate {table} row: {key}")]
    Duplicate { table: &'static str, key: String },

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("Corrupt {table} row {key}: {reason}")]
    Corrupt {
        table: &'static str,
        key: String,
        reason: String,
    },
}

impl DatabaseError {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, DatabaseError::Duplicate { .. })
    }
}

pub type Result<T> = std::result::Result<T, DatabaseError>;

/// Persistence contract the order manager and fork processor rely on
///
/// Inserts report a natural-key collision as [`DatabaseError::Duplicate`].
/// Partial order updates report a missing row as
/// [`DatabaseError::OrderNotFound`].
#[async_trait]
pub trait OrderStore: Send + Sync {
    // Orders
    async fn add_order(&self, order: &OrderRow) -> Result<()>;
    async fn get_order(&self, order_hash: &H256) -> Result<Option<OrderRow>>;
    /// Overwrite every mutable column
    async fn save_order(&self, order: &OrderRow) -> Result<()>;
    /// Persist status, dealt/split amounts and updated block
    async fn update_order_while_fill(&self, order: &OrderRow) -> Result<()>;
    /// Persist status, cancelled amounts and updated block
    async fn update_order_while_cancel(&self, order: &OrderRow) -> Result<()>;

    // Cutoffs
    /// Mark the listed still-open orders cut off at `block_number`; returns rows changed
    async fn set_cutoff_orders(&self, order_hashes: &[H256], block_number: u64) -> Result<u64>;
    async fn get_cutoff_orders(
        &self,
        protocol: &Address,
        owner: &Address,
        cutoff: u64,
    ) -> Result<Vec<H256>>;
    async fn get_cutoff_pair_orders(
        &self,
        protocol: &Address,
        owner: &Address,
        token1: &Address,
        token2: &Address,
        cutoff: u64,
    ) -> Result<Vec<H256>>;

    // Events
    async fn find_fill_event(&self, tx_hash: &H256, fill_index: u64) -> Result<Option<FillEventRow>>;
    async fn add_fill_event(&self, row: &FillEventRow) -> Result<()>;
    /// Insert `row` (or revive a forked one) and, when given, persist the
    /// order's fill columns, all in one transaction
    ///
    /// A live stored fill under the same key is a [`DatabaseError::Duplicate`]
    /// and leaves the order untouched.
    async fn record_fill(&self, row: &FillEventRow, order: Option<&OrderRow>) -> Result<()>;

    async fn find_ring_mined_event(&self, tx_hash: &H256) -> Result<Option<RingMinedEventRow>>;
    async fn add_ring_mined_event(&self, row: &RingMinedEventRow) -> Result<()>;
    async fn save_ring_mined_event(&self, row: &RingMinedEventRow) -> Result<()>;

    async fn find_cancel_event(&self, tx_hash: &H256) -> Result<Option<CancelEventRow>>;
    async fn add_cancel_event(&self, row: &CancelEventRow) -> Result<()>;
    async fn save_cancel_event(&self, row: &CancelEventRow) -> Result<()>;

    async fn find_cutoff_event(&self, tx_hash: &H256) -> Result<Option<CutoffEventRow>>;
    async fn add_cutoff_event(&self, row: &CutoffEventRow) -> Result<()>;
    async fn save_cutoff_event(&self, row: &CutoffEventRow) -> Result<()>;

    async fn find_cutoff_pair_event(&self, tx_hash: &H256) -> Result<Option<CutoffPairEventRow>>;
    async fn add_cutoff_pair_event(&self, row: &CutoffPairEventRow) -> Result<()>;
    async fn save_cutoff_pair_event(&self, row: &CutoffPairEventRow) -> Result<()>;

    // Fork support
    /// Applied fills above `block_number` not yet marked forked
    async fn fills_after_block(&self, block_number: u64) -> Result<Vec<FillEventRow>>;
    /// Successful cancels above `block_number` not yet marked forked
    async fn cancels_after_block(&self, block_number: u64) -> Result<Vec<CancelEventRow>>;
    /// Orders whose cutoff was applied at a block above `block_number`
    async fn orders_cutoff_after_block(&self, block_number: u64) -> Result<Vec<OrderRow>>;
    /// Flag every event above `block_number` as forked; returns rows changed
    async fn mark_forked_after_block(&self, block_number: u64) -> Result<u64>;
}

const ORDER_COLUMNS: &str = "order_hash, protocol, owner, token_s, token_b, amount_s, amount_b, \
    buy_no_more_than_amount_b, order_type, valid_since, valid_until, market, side, price, \
    dealt_amount_s, dealt_amount_b, split_amount_s, split_amount_b, \
    cancelled_amount_s, cancelled_amount_b, status, updated_block";

const FILL_COLUMNS: &str = "tx_hash, fill_index, ring_hash, order_hash, owner, token_s, token_b, \
    amount_s, amount_b, split_s, split_b, side, market, order_type, block_number, status, \
    applied, fork";

// SQLite's default bound-parameter limit is 999
const BATCH_SIZE: usize = 500;

/// Map a unique-constraint violation to `Duplicate`
fn on_insert(table: &'static str, key: impl Into<String>, err: sqlx::Error) -> DatabaseError {
    match err {
        sqlx::Error::Database(db) if db.is_unique_violation() => DatabaseError::Duplicate {
            table,
            key: key.into(),
        },
        other => DatabaseError::ConnectionError(other),
    }
}

/// SQLite-backed order and event store
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Create new database connection and initialize schema
    pub async fn new(db_url: &str, max_connections: u32) -> Result<Self> {
        info!("Connecting to database: {}", db_url);

        let in_memory = db_url.contains(":memory:");
        let mut options = SqliteConnectOptions::from_str(db_url)?.create_if_missing(true);
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        // Every connection to an in-memory database is a separate database
        let mut pool_options = SqlitePoolOptions::new();
        pool_options = if in_memory {
            pool_options
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            pool_options.max_connections(max_connections)
        };

        let pool = pool_options.connect_with(options).await?;

        schema::initialize_schema(&pool).await?;

        info!("Database initialized successfully");

        Ok(Self { pool })
    }

    /// Fresh private in-memory database
    pub async fn in_memory() -> Result<Self> {
        Self::new("sqlite::memory:", 1).await
    }

    /// Get database pool reference
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close database connection
    pub async fn close(self) {
        self.pool.close().await;
    }

    fn parse_hashes(rows: Vec<(String,)>) -> Result<Vec<H256>> {
        rows.into_iter()
            .map(|(hash,)| {
                parse_hash("order_hash", &hash).map_err(|e| DatabaseError::Corrupt {
                    table: "orders",
                    key: hash.clone(),
                    reason: e.to_string(),
                })
            })
            .collect()
    }
}

enum OrderUpdate {
    Fill,
    Cancel,
}

const FILL_UPDATE_SQL: &str = r#"
    UPDATE orders SET
        status = ?,
        dealt_amount_s = ?, dealt_amount_b = ?,
        split_amount_s = ?, split_amount_b = ?,
        updated_block = ?
    WHERE order_hash = ?
"#;

const CANCEL_UPDATE_SQL: &str = r#"
    UPDATE orders SET
        status = ?,
        cancelled_amount_s = ?, cancelled_amount_b = ?,
        updated_block = ?
    WHERE order_hash = ?
"#;

async fn exec_order_update(
    conn: &mut SqliteConnection,
    sql: &str,
    order: &OrderRow,
    binds: OrderUpdate,
) -> Result<()> {
    let mut query = sqlx::query(sql).bind(order.status);
    query = match binds {
        OrderUpdate::Fill => query
            .bind(&order.dealt_amount_s)
            .bind(&order.dealt_amount_b)
            .bind(&order.split_amount_s)
            .bind(&order.split_amount_b),
        OrderUpdate::Cancel => query
            .bind(&order.cancelled_amount_s)
            .bind(&order.cancelled_amount_b),
    };
    let result = query
        .bind(order.updated_block)
        .bind(&order.order_hash)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::OrderNotFound(order.order_hash.clone()));
    }
    Ok(())
}

/// Bind every fill column in `FILL_COLUMNS` order
fn bind_fill<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    row: &'q FillEventRow,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    query
        .bind(&row.tx_hash)
        .bind(row.fill_index)
        .bind(&row.ring_hash)
        .bind(&row.order_hash)
        .bind(&row.owner)
        .bind(&row.token_s)
        .bind(&row.token_b)
        .bind(&row.amount_s)
        .bind(&row.amount_b)
        .bind(&row.split_s)
        .bind(&row.split_b)
        .bind(&row.side)
        .bind(&row.market)
        .bind(&row.order_type)
        .bind(row.block_number)
        .bind(row.status)
        .bind(row.applied)
        .bind(row.fork)
}

#[async_trait]
impl OrderStore for SqliteStore {
    // ==================== ORDER OPERATIONS ====================

    async fn add_order(&self, order: &OrderRow) -> Result<()> {
        debug!(order_hash = %order.order_hash, "Inserting order");
        sqlx::query(&format!(
            "INSERT INTO orders ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            ORDER_COLUMNS
        ))
        .bind(&order.order_hash)
        .bind(&order.protocol)
        .bind(&order.owner)
        .bind(&order.token_s)
        .bind(&order.token_b)
        .bind(&order.amount_s)
        .bind(&order.amount_b)
        .bind(order.buy_no_more_than_amount_b)
        .bind(&order.order_type)
        .bind(order.valid_since)
        .bind(order.valid_until)
        .bind(&order.market)
        .bind(&order.side)
        .bind(order.price)
        .bind(&order.dealt_amount_s)
        .bind(&order.dealt_amount_b)
        .bind(&order.split_amount_s)
        .bind(&order.split_amount_b)
        .bind(&order.cancelled_amount_s)
        .bind(&order.cancelled_amount_b)
        .bind(order.status)
        .bind(order.updated_block)
        .execute(&self.pool)
        .await
        .map_err(|e| on_insert("orders", order.order_hash.as_str(), e))?;

        Ok(())
    }

    async fn get_order(&self, order_hash: &H256) -> Result<Option<OrderRow>> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {} FROM orders WHERE order_hash = ?",
            ORDER_COLUMNS
        ))
        .bind(hash_hex(order_hash))
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn save_order(&self, order: &OrderRow) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE orders SET
                market = ?, side = ?, price = ?,
                dealt_amount_s = ?, dealt_amount_b = ?,
                split_amount_s = ?, split_amount_b = ?,
                cancelled_amount_s = ?, cancelled_amount_b = ?,
                status = ?, updated_block = ?
            WHERE order_hash = ?
            "#,
        )
        .bind(&order.market)
        .bind(&order.side)
        .bind(order.price)
        .bind(&order.dealt_amount_s)
        .bind(&order.dealt_amount_b)
        .bind(&order.split_amount_s)
        .bind(&order.split_amount_b)
        .bind(&order.cancelled_amount_s)
        .bind(&order.cancelled_amount_b)
        .bind(order.status)
        .bind(order.updated_block)
        .bind(&order.order_hash)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::OrderNotFound(order.order_hash.clone()));
        }
        Ok(())
    }

    async fn update_order_while_fill(&self, order: &OrderRow) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        exec_order_update(&mut conn, FILL_UPDATE_SQL, order, OrderUpdate::Fill).await
    }

    async fn update_order_while_cancel(&self, order: &OrderRow) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        exec_order_update(&mut conn, CANCEL_UPDATE_SQL, order, OrderUpdate::Cancel).await
    }

    // ==================== CUTOFF OPERATIONS ====================

    async fn set_cutoff_orders(&self, order_hashes: &[H256], block_number: u64) -> Result<u64> {
        if order_hashes.is_empty() {
            return Ok(0);
        }

        let mut total = 0;
        for chunk in order_hashes.chunks(BATCH_SIZE) {
            let mut query_builder: QueryBuilder<Sqlite> =
                QueryBuilder::new("UPDATE orders SET status = ");
            query_builder.push_bind(OrderStatus::Cutoff.code());
            query_builder.push(", updated_block = ");
            query_builder.push_bind(to_i64(block_number));
            query_builder.push(", cutoff_block = ");
            query_builder.push_bind(to_i64(block_number));
            query_builder.push(" WHERE status IN (");
            query_builder.push_bind(OrderStatus::New.code());
            query_builder.push(", ");
            query_builder.push_bind(OrderStatus::Partial.code());
            query_builder.push(") AND order_hash IN (");
            let mut separated = query_builder.separated(", ");
            for hash in chunk {
                separated.push_bind(hash_hex(hash));
            }
            separated.push_unseparated(")");

            let result = query_builder.build().execute(&self.pool).await?;
            total += result.rows_affected();
        }

        debug!("Cut off {} of {} orders", total, order_hashes.len());
        Ok(total)
    }

    async fn get_cutoff_orders(
        &self,
        protocol: &Address,
        owner: &Address,
        cutoff: u64,
    ) -> Result<Vec<H256>> {
        let rows = sqlx::query_as::<_, (String,)>(
            r#"
            SELECT order_hash FROM orders
            WHERE protocol = ? AND owner = ? AND valid_since <= ? AND status IN (?, ?)
            ORDER BY order_hash
            "#,
        )
        .bind(address_hex(protocol))
        .bind(address_hex(owner))
        .bind(to_i64(cutoff))
        .bind(OrderStatus::New.code())
        .bind(OrderStatus::Partial.code())
        .fetch_all(&self.pool)
        .await?;

        Self::parse_hashes(rows)
    }

    async fn get_cutoff_pair_orders(
        &self,
        protocol: &Address,
        owner: &Address,
        token1: &Address,
        token2: &Address,
        cutoff: u64,
    ) -> Result<Vec<H256>> {
        let (token1, token2) = (address_hex(token1), address_hex(token2));
        let rows = sqlx::query_as::<_, (String,)>(
            r#"
            SELECT order_hash FROM orders
            WHERE protocol = ? AND owner = ? AND valid_since <= ? AND status IN (?, ?)
              AND ((token_s = ? AND token_b = ?) OR (token_s = ? AND token_b = ?))
            ORDER BY order_hash
            "#,
        )
        .bind(address_hex(protocol))
        .bind(address_hex(owner))
        .bind(to_i64(cutoff))
        .bind(OrderStatus::New.code())
        .bind(OrderStatus::Partial.code())
        .bind(&token1)
        .bind(&token2)
        .bind(&token2)
        .bind(&token1)
        .fetch_all(&self.pool)
        .await?;

        Self::parse_hashes(rows)
    }

    // ==================== FILL EVENTS ====================

    async fn find_fill_event(&self, tx_hash: &H256, fill_index: u64) -> Result<Option<FillEventRow>> {
        let row = sqlx::query_as::<_, FillEventRow>(&format!(
            "SELECT {} FROM fill_events WHERE tx_hash = ? AND fill_index = ?",
            FILL_COLUMNS
        ))
        .bind(hash_hex(tx_hash))
        .bind(to_i64(fill_index))
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn add_fill_event(&self, row: &FillEventRow) -> Result<()> {
        let sql = format!(
            "INSERT INTO fill_events ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            FILL_COLUMNS
        );
        bind_fill(sqlx::query(&sql), row)
            .execute(&self.pool)
            .await
            .map_err(|e| on_insert("fill_events", format!("{}#{}", row.tx_hash, row.fill_index), e))?;

        Ok(())
    }

    async fn record_fill(&self, row: &FillEventRow, order: Option<&OrderRow>) -> Result<()> {
        // Only a forked row may be overwritten
        let sql = format!(
            r#"
            INSERT INTO fill_events ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (tx_hash, fill_index) DO UPDATE SET
                ring_hash = excluded.ring_hash, order_hash = excluded.order_hash,
                owner = excluded.owner, token_s = excluded.token_s, token_b = excluded.token_b,
                amount_s = excluded.amount_s, amount_b = excluded.amount_b,
                split_s = excluded.split_s, split_b = excluded.split_b,
                side = excluded.side, market = excluded.market, order_type = excluded.order_type,
                block_number = excluded.block_number, status = excluded.status,
                applied = excluded.applied, fork = excluded.fork
            WHERE fill_events.fork = true
            "#,
            FILL_COLUMNS
        );

        let mut tx = self.pool.begin().await?;
        let result = bind_fill(sqlx::query(&sql), row).execute(&mut *tx).await?;
        if result.rows_affected() == 0 {
            return Err(DatabaseError::Duplicate {
                table: "fill_events",
                key: format!("{}#{}", row.tx_hash, row.fill_index),
            });
        }

        if let Some(order) = order {
            exec_order_update(&mut tx, FILL_UPDATE_SQL, order, OrderUpdate::Fill).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    // ==================== RING EVENTS ====================

    async fn find_ring_mined_event(&self, tx_hash: &H256) -> Result<Option<RingMinedEventRow>> {
        let row = sqlx::query_as::<_, RingMinedEventRow>(
            r#"
            SELECT tx_hash, ring_hash, miner, fee_recipient, ring_index, block_number, status, err, fork
            FROM ring_mined_events WHERE tx_hash = ?
            "#,
        )
        .bind(hash_hex(tx_hash))
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn add_ring_mined_event(&self, row: &RingMinedEventRow) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO ring_mined_events
                (tx_hash, ring_hash, miner, fee_recipient, ring_index, block_number, status, err, fork)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&row.tx_hash)
        .bind(&row.ring_hash)
        .bind(&row.miner)
        .bind(&row.fee_recipient)
        .bind(row.ring_index)
        .bind(row.block_number)
        .bind(row.status)
        .bind(&row.err)
        .bind(row.fork)
        .execute(&self.pool)
        .await
        .map_err(|e| on_insert("ring_mined_events", row.tx_hash.as_str(), e))?;

        Ok(())
    }

    async fn save_ring_mined_event(&self, row: &RingMinedEventRow) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE ring_mined_events SET
                ring_hash = ?, miner = ?, fee_recipient = ?, ring_index = ?,
                block_number = ?, status = ?, err = ?, fork = ?
            WHERE tx_hash = ?
            "#,
        )
        .bind(&row.ring_hash)
        .bind(&row.miner)
        .bind(&row.fee_recipient)
        .bind(row.ring_index)
        .bind(row.block_number)
        .bind(row.status)
        .bind(&row.err)
        .bind(row.fork)
        .bind(&row.tx_hash)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ==================== CANCEL EVENTS ====================

    async fn find_cancel_event(&self, tx_hash: &H256) -> Result<Option<CancelEventRow>> {
        let row = sqlx::query_as::<_, CancelEventRow>(
            r#"
            SELECT tx_hash, order_hash, amount_cancelled, block_number, status, fork
            FROM cancel_events WHERE tx_hash = ?
            "#,
        )
        .bind(hash_hex(tx_hash))
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn add_cancel_event(&self, row: &CancelEventRow) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO cancel_events (tx_hash, order_hash, amount_cancelled, block_number, status, fork)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&row.tx_hash)
        .bind(&row.order_hash)
        .bind(&row.amount_cancelled)
        .bind(row.block_number)
        .bind(row.status)
        .bind(row.fork)
        .execute(&self.pool)
        .await
        .map_err(|e| on_insert("cancel_events", row.tx_hash.as_str(), e))?;

        Ok(())
    }

    async fn save_cancel_event(&self, row: &CancelEventRow) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE cancel_events SET
                order_hash = ?, amount_cancelled = ?, block_number = ?, status = ?, fork = ?
            WHERE tx_hash = ?
            "#,
        )
        .bind(&row.order_hash)
        .bind(&row.amount_cancelled)
        .bind(row.block_number)
        .bind(row.status)
        .bind(row.fork)
        .bind(&row.tx_hash)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ==================== CUTOFF EVENTS ====================

    async fn find_cutoff_event(&self, tx_hash: &H256) -> Result<Option<CutoffEventRow>> {
        let row = sqlx::query_as::<_, CutoffEventRow>(
            r#"
            SELECT tx_hash, protocol, owner, cutoff, order_hashes, block_number, status, fork
            FROM cutoff_events WHERE tx_hash = ?
            "#,
        )
        .bind(hash_hex(tx_hash))
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn add_cutoff_event(&self, row: &CutoffEventRow) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO cutoff_events
                (tx_hash, protocol, owner, cutoff, order_hashes, block_number, status, fork)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&row.tx_hash)
        .bind(&row.protocol)
        .bind(&row.owner)
        .bind(row.cutoff)
        .bind(&row.order_hashes)
        .bind(row.block_number)
        .bind(row.status)
        .bind(row.fork)
        .execute(&self.pool)
        .await
        .map_err(|e| on_insert("cutoff_events", row.tx_hash.as_str(), e))?;

        Ok(())
    }

    async fn save_cutoff_event(&self, row: &CutoffEventRow) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE cutoff_events SET
                protocol = ?, owner = ?, cutoff = ?, order_hashes = ?,
                block_number = ?, status = ?, fork = ?
            WHERE tx_hash = ?
            "#,
        )
        .bind(&row.protocol)
        .bind(&row.owner)
        .bind(row.cutoff)
        .bind(&row.order_hashes)
        .bind(row.block_number)
        .bind(row.status)
        .bind(row.fork)
        .bind(&row.tx_hash)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_cutoff_pair_event(&self, tx_hash: &H256) -> Result<Option<CutoffPairEventRow>> {
        let row = sqlx::query_as::<_, CutoffPairEventRow>(
            r#"
            SELECT tx_hash, protocol, owner, token1, token2, cutoff, order_hashes,
                   block_number, status, fork
            FROM cutoff_pair_events WHERE tx_hash = ?
            "#,
        )
        .bind(hash_hex(tx_hash))
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn add_cutoff_pair_event(&self, row: &CutoffPairEventRow) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO cutoff_pair_events
                (tx_hash, protocol, owner, token1, token2, cutoff, order_hashes,
                 block_number, status, fork)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&row.tx_hash)
        .bind(&row.protocol)
        .bind(&row.owner)
        .bind(&row.token1)
        .bind(&row.token2)
        .bind(row.cutoff)
        .bind(&row.order_hashes)
        .bind(row.block_number)
        .bind(row.status)
        .bind(row.fork)
        .execute(&self.pool)
        .await
        .map_err(|e| on_insert("cutoff_pair_events", row.tx_hash.as_str(), e))?;

        Ok(())
    }

    async fn save_cutoff_pair_event(&self, row: &CutoffPairEventRow) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE cutoff_pair_events SET
                protocol = ?, owner = ?, token1 = ?, token2 = ?, cutoff = ?, order_hashes = ?,
                block_number = ?, status = ?, fork = ?
            WHERE tx_hash = ?
            "#,
        )
        .bind(&row.protocol)
        .bind(&row.owner)
        .bind(&row.token1)
        .bind(&row.token2)
        .bind(row.cutoff)
        .bind(&row.order_hashes)
        .bind(row.block_number)
        .bind(row.status)
        .bind(row.fork)
        .bind(&row.tx_hash)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ==================== FORK SUPPORT ====================

    async fn fills_after_block(&self, block_number: u64) -> Result<Vec<FillEventRow>> {
        let rows = sqlx::query_as::<_, FillEventRow>(&format!(
            r#"
            SELECT {} FROM fill_events
            WHERE block_number > ? AND fork = false AND applied = true
            ORDER BY block_number DESC, tx_hash, fill_index
            "#,
            FILL_COLUMNS
        ))
        .bind(to_i64(block_number))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn cancels_after_block(&self, block_number: u64) -> Result<Vec<CancelEventRow>> {
        let rows = sqlx::query_as::<_, CancelEventRow>(
            r#"
            SELECT tx_hash, order_hash, amount_cancelled, block_number, status, fork
            FROM cancel_events
            WHERE block_number > ? AND fork = false AND status = ?
            ORDER BY block_number DESC, tx_hash
            "#,
        )
        .bind(to_i64(block_number))
        .bind(TxStatus::Success.code())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn orders_cutoff_after_block(&self, block_number: u64) -> Result<Vec<OrderRow>> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {} FROM orders WHERE status = ? AND cutoff_block > ? ORDER BY order_hash",
            ORDER_COLUMNS
        ))
        .bind(OrderStatus::Cutoff.code())
        .bind(to_i64(block_number))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn mark_forked_after_block(&self, block_number: u64) -> Result<u64> {
        let block = to_i64(block_number);
        let mut tx = self.pool.begin().await?;
        let mut total = 0;

        for table in [
            "fill_events",
            "cancel_events",
            "cutoff_events",
            "cutoff_pair_events",
            "ring_mined_events",
        ] {
            let result = sqlx::query(&format!(
                "UPDATE {} SET fork = true WHERE block_number > ? AND fork = false",
                table
            ))
            .bind(block)
            .execute(&mut *tx)
            .await?;
            total += result.rows_affected();
        }

        tx.commit().await?;
        info!("Marked {} events above block {} as forked", total, block_number);
        Ok(total)
    }
}
