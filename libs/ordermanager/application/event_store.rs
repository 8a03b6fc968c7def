//! Idempotent persistence of chain events
//!
//! Every save follows one protocol: insert when absent, update when the stored
//! row has a different status or was orphaned by a fork, otherwise report a
//! duplicate.

use crate::domain::types::hash_hex;
use crate::domain::{
    CutoffEvent, CutoffPairEvent, FillRecord, OrderCancelledEvent, RingMinedEvent,
    SubmitRingMethodEvent, TxStatus, H256,
};
use crate::infrastructure::database::{
    CancelEventRow, CutoffEventRow, CutoffPairEventRow, DatabaseError, FillEventRow, OrderRow,
    OrderStore, RingMinedEventRow,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Inserted,
    Updated,
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Duplicate {kind} event {tx_hash}")]
    Duplicate { kind: &'static str, tx_hash: String },

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl StoreError {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, StoreError::Duplicate { .. })
    }

    fn from_insert(kind: &'static str, tx_hash: &str, err: DatabaseError) -> Self {
        if err.is_duplicate() {
            StoreError::Duplicate {
                kind,
                tx_hash: tx_hash.to_string(),
            }
        } else {
            StoreError::Database(err)
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Whether a stored record should be overwritten by an incoming one
fn should_update(stored_fork: bool, stored_status: TxStatus, incoming: TxStatus) -> bool {
    stored_fork || stored_status != incoming
}

/// Merge `extra` into `hashes`, keeping first-seen order
fn merge_hashes(hashes: &mut Vec<H256>, extra: impl IntoIterator<Item = H256>) {
    for hash in extra {
        if !hashes.contains(&hash) {
            hashes.push(hash);
        }
    }
}

pub struct EventStore {
    store: Arc<dyn OrderStore>,
}

impl EventStore {
    pub fn new(store: Arc<dyn OrderStore>) -> Self {
        Self { store }
    }

    pub async fn save_ring_mined(&self, event: &RingMinedEvent) -> Result<SaveOutcome> {
        const KIND: &str = "ring_mined";
        let tx_hash = hash_hex(&event.tx_hash);

        match self.store.find_ring_mined_event(&event.tx_hash).await? {
            None => {
                let row = RingMinedEventRow::from_ring_mined(event);
                self.store
                    .add_ring_mined_event(&row)
                    .await
                    .map_err(|e| StoreError::from_insert(KIND, &tx_hash, e))?;
                Ok(SaveOutcome::Inserted)
            }
            Some(mut row) => {
                if !should_update(row.fork, row.tx_status()?, event.status) {
                    return Err(StoreError::Duplicate { kind: KIND, tx_hash });
                }
                row.apply_ring_mined(event);
                self.store.save_ring_mined_event(&row).await?;
                Ok(SaveOutcome::Updated)
            }
        }
    }

    /// Shares the ring-mined table: a submitted ring and its mining are one tx
    pub async fn save_submit_ring_method(&self, event: &SubmitRingMethodEvent) -> Result<SaveOutcome> {
        const KIND: &str = "submit_ring_method";
        let tx_hash = hash_hex(&event.tx_hash);

        match self.store.find_ring_mined_event(&event.tx_hash).await? {
            None => {
                let row = RingMinedEventRow::from_submit_ring_method(event);
                self.store
                    .add_ring_mined_event(&row)
                    .await
                    .map_err(|e| StoreError::from_insert(KIND, &tx_hash, e))?;
                Ok(SaveOutcome::Inserted)
            }
            Some(mut row) => {
                if !should_update(row.fork, row.tx_status()?, event.status) {
                    return Err(StoreError::Duplicate { kind: KIND, tx_hash });
                }
                row.apply_submit_ring_method(event);
                self.store.save_ring_mined_event(&row).await?;
                Ok(SaveOutcome::Updated)
            }
        }
    }

    pub async fn save_cancel(&self, event: &OrderCancelledEvent) -> Result<SaveOutcome> {
        const KIND: &str = "cancel";
        let tx_hash = hash_hex(&event.tx_hash);

        match self.store.find_cancel_event(&event.tx_hash).await? {
            None => {
                let row = CancelEventRow::from_event(event);
                self.store
                    .add_cancel_event(&row)
                    .await
                    .map_err(|e| StoreError::from_insert(KIND, &tx_hash, e))?;
                Ok(SaveOutcome::Inserted)
            }
            Some(stored) => {
                if !should_update(stored.fork, stored.tx_status()?, event.status) {
                    return Err(StoreError::Duplicate { kind: KIND, tx_hash });
                }
                self.store
                    .save_cancel_event(&CancelEventRow::from_event(event))
                    .await?;
                Ok(SaveOutcome::Updated)
            }
        }
    }

    /// Check an owner-wide cutoff against its stored record and settle its order list
    ///
    /// On first insert (or revival of a forked row) the owner's open orders
    /// valid since at or before the cutoff are merged into
    /// `event.order_hashes`. Updates keep the previously stored hashes. Nothing
    /// is written; the returned outcome is what [`Self::persist_cutoff`] will do.
    pub async fn prepare_cutoff(&self, event: &mut CutoffEvent) -> Result<SaveOutcome> {
        const KIND: &str = "cutoff";
        let stored = self.store.find_cutoff_event(&event.tx_hash).await?;

        if let Some(row) = &stored {
            if !should_update(row.fork, row.tx_status()?, event.status) {
                return Err(StoreError::Duplicate {
                    kind: KIND,
                    tx_hash: hash_hex(&event.tx_hash),
                });
            }
            merge_hashes(&mut event.order_hashes, row.order_hashes()?);
        }

        if stored.as_ref().map_or(true, |row| row.fork) {
            let candidates = self
                .store
                .get_cutoff_orders(&event.protocol, &event.owner, event.cutoff)
                .await?;
            debug!(tx_hash = ?event.tx_hash, "Merging {} cutoff candidates", candidates.len());
            merge_hashes(&mut event.order_hashes, candidates);
        }

        Ok(if stored.is_some() {
            SaveOutcome::Updated
        } else {
            SaveOutcome::Inserted
        })
    }

    pub async fn persist_cutoff(&self, event: &CutoffEvent, outcome: SaveOutcome) -> Result<()> {
        let row = CutoffEventRow::from_event(event)?;
        match outcome {
            SaveOutcome::Inserted => self
                .store
                .add_cutoff_event(&row)
                .await
                .map_err(|e| StoreError::from_insert("cutoff", &row.tx_hash, e)),
            SaveOutcome::Updated => Ok(self.store.save_cutoff_event(&row).await?),
        }
    }

    /// Pairwise counterpart of [`Self::prepare_cutoff`]; candidates are limited to the token pair
    pub async fn prepare_cutoff_pair(&self, event: &mut CutoffPairEvent) -> Result<SaveOutcome> {
        const KIND: &str = "cutoff_pair";
        let stored = self.store.find_cutoff_pair_event(&event.tx_hash).await?;

        if let Some(row) = &stored {
            if !should_update(row.fork, row.tx_status()?, event.status) {
                return Err(StoreError::Duplicate {
                    kind: KIND,
                    tx_hash: hash_hex(&event.tx_hash),
                });
            }
            merge_hashes(&mut event.order_hashes, row.order_hashes()?);
        }

        if stored.as_ref().map_or(true, |row| row.fork) {
            let candidates = self
                .store
                .get_cutoff_pair_orders(
                    &event.protocol,
                    &event.owner,
                    &event.token1,
                    &event.token2,
                    event.cutoff,
                )
                .await?;
            debug!(tx_hash = ?event.tx_hash, "Merging {} cutoff pair candidates", candidates.len());
            merge_hashes(&mut event.order_hashes, candidates);
        }

        Ok(if stored.is_some() {
            SaveOutcome::Updated
        } else {
            SaveOutcome::Inserted
        })
    }

    pub async fn persist_cutoff_pair(&self, event: &CutoffPairEvent, outcome: SaveOutcome) -> Result<()> {
        let row = CutoffPairEventRow::from_event(event)?;
        match outcome {
            SaveOutcome::Inserted => self
                .store
                .add_cutoff_pair_event(&row)
                .await
                .map_err(|e| StoreError::from_insert("cutoff_pair", &row.tx_hash, e)),
            SaveOutcome::Updated => Ok(self.store.save_cutoff_pair_event(&row).await?),
        }
    }

    /// Whether a live (non-forked) fill with this key is already recorded
    pub async fn fill_exists(&self, tx_hash: &H256, fill_index: u64) -> Result<bool> {
        let row = self.store.find_fill_event(tx_hash, fill_index).await?;
        Ok(row.is_some_and(|r| !r.fork))
    }

    /// Insert a fill, or revive a forked one under the same key
    ///
    /// `order` carries the order's new accumulators and is written in the same
    /// transaction, so a stored fill always means an applied one.
    pub async fn save_fill(&self, record: &FillRecord, order: Option<&OrderRow>) -> Result<SaveOutcome> {
        const KIND: &str = "fill";
        let key = format!("{}#{}", hash_hex(&record.tx_hash), record.fill_index);

        let outcome = match self
            .store
            .find_fill_event(&record.tx_hash, record.fill_index)
            .await?
        {
            None => SaveOutcome::Inserted,
            Some(stored) if stored.fork => SaveOutcome::Updated,
            Some(_) => return Err(StoreError::Duplicate { kind: KIND, tx_hash: key }),
        };

        self.store
            .record_fill(&FillEventRow::from_record(record), order)
            .await
            .map_err(|e| StoreError::from_insert(KIND, &key, e))?;
        Ok(outcome)
    }
}
