//! Integration tests for chain fork handling
//!
//! A fork rolls orders back to the fork block and re-attaches intake; a failed
//! recovery halts the manager for good.

mod common;

use common::{addr, amount, fill, hash, order, wait_for, FailingFork, Harness, OWNER, PROTOCOL};
use ordermanager::application::{CutoffKey, RouterState};
use ordermanager::domain::{
    CutoffEvent, Event, EventKind, ForkEvent, OrderCancelledEvent, OrderStatus, TxStatus,
};
use ordermanager::infrastructure::OrderStore;
use std::sync::atomic::Ordering;
use std::sync::Arc;

fn fork_at(fork_block: u64) -> ForkEvent {
    ForkEvent {
        detected_block: fork_block + 5,
        fork_block,
        fork_hash: hash(999),
    }
}

#[tokio::test]
async fn test_fork_rolls_back_and_resumes() {
    let h = Harness::new().await;
    let o = order(1, 100, 200);
    h.manager.handle_new_order(o.clone()).await.unwrap();

    h.manager.handle_order_filled(fill(50, o.hash(), 30, 60, 8)).await.unwrap();
    h.manager.handle_order_filled(fill(51, o.hash(), 70, 140, 12)).await.unwrap();
    assert_eq!(h.stored(o.hash()).await.unwrap().status, OrderStatus::Finished);

    h.cache.update_cutoff(CutoffKey::new(addr(PROTOCOL), addr(OWNER)), 500);
    h.manager.start().unwrap();
    h.manager.handle_fork(fork_at(10)).await.unwrap();

    let repaired = h.stored(o.hash()).await.unwrap();
    verbose_println!("repaired order: {:?}", repaired);
    assert_eq!(repaired.dealt_amount_s, amount(30));
    assert_eq!(repaired.status, OrderStatus::Partial);
    assert_eq!(repaired.updated_block, 10);

    assert!(h.cache.is_empty());
    assert_eq!(h.manager.router_state(), RouterState::Running);
    assert_eq!(h.bus.subscriber_count(&EventKind::OrderFilled), 1);

    // the orphaned fill may be replayed on the new chain
    assert!(h.store.find_fill_event(&hash(51), 0).await.unwrap().unwrap().fork);
    h.manager.handle_order_filled(fill(51, o.hash(), 70, 140, 13)).await.unwrap();
    let replayed = h.stored(o.hash()).await.unwrap();
    assert_eq!(replayed.dealt_amount_s, amount(100));
    assert_eq!(replayed.status, OrderStatus::Finished);

    h.manager.stop().await.unwrap();
}

#[tokio::test]
async fn test_fork_reverts_orphaned_cutoff() {
    let h = Harness::new().await;
    let o = order(1, 100, 200);
    h.manager.handle_new_order(o.clone()).await.unwrap();

    h.manager
        .handle_cutoff(CutoffEvent {
            tx_hash: hash(70),
            protocol: addr(PROTOCOL),
            owner: addr(OWNER),
            cutoff: 1000,
            order_hashes: vec![o.hash()],
            block_number: 20,
            status: TxStatus::Success,
        })
        .await
        .unwrap();
    assert_eq!(h.stored(o.hash()).await.unwrap().status, OrderStatus::Cutoff);

    h.manager.start().unwrap();
    h.manager.handle_fork(fork_at(10)).await.unwrap();
    assert_eq!(h.stored(o.hash()).await.unwrap().status, OrderStatus::New);

    // replaying the revocation applies it again
    h.manager
        .handle_cutoff(CutoffEvent {
            tx_hash: hash(70),
            protocol: addr(PROTOCOL),
            owner: addr(OWNER),
            cutoff: 1000,
            order_hashes: vec![o.hash()],
            block_number: 21,
            status: TxStatus::Success,
        })
        .await
        .unwrap();
    let stored = h.stored(o.hash()).await.unwrap();
    assert_eq!(stored.status, OrderStatus::Cutoff);
    assert_eq!(stored.updated_block, 21);

    h.manager.stop().await.unwrap();
}

#[tokio::test]
async fn test_fork_keeps_cutoff_below_fork_block() {
    let h = Harness::new().await;
    let o = order(1, 100, 200);
    h.manager.handle_new_order(o.clone()).await.unwrap();

    h.manager
        .handle_cutoff(CutoffEvent {
            tx_hash: hash(70),
            protocol: addr(PROTOCOL),
            owner: addr(OWNER),
            cutoff: 1000,
            order_hashes: vec![o.hash()],
            block_number: 5,
            status: TxStatus::Success,
        })
        .await
        .unwrap();

    // a later cancel moves updated_block past the fork block
    h.manager
        .handle_order_cancelled(OrderCancelledEvent {
            tx_hash: hash(60),
            order_hash: o.hash(),
            amount_cancelled: amount(30),
            block_number: 20,
            status: TxStatus::Success,
        })
        .await
        .unwrap();
    let cancelled = h.stored(o.hash()).await.unwrap();
    verbose_println!("after cancel: {} at block {}", cancelled.status, cancelled.updated_block);
    assert_eq!(cancelled.status, OrderStatus::Cutoff);
    assert_eq!(cancelled.updated_block, 20);

    h.manager.start().unwrap();
    h.manager.handle_fork(fork_at(10)).await.unwrap();

    let repaired = h.stored(o.hash()).await.unwrap();
    verbose_println!("after fork: {} at block {}", repaired.status, repaired.updated_block);
    assert_eq!(repaired.status, OrderStatus::Cutoff);
    assert_eq!(repaired.cancelled_amount_s, amount(0));

    h.manager.stop().await.unwrap();
}

#[tokio::test]
async fn test_fork_while_stopped_is_ignored() {
    let h = Harness::new().await;
    h.manager.handle_fork(fork_at(10)).await.unwrap();
    assert_eq!(h.manager.router_state(), RouterState::Stopped);
    assert!(h.shutdown_flag.load(Ordering::Acquire));
}

#[tokio::test]
async fn test_failed_recovery_halts() {
    let h = Harness::with_fork(Arc::new(FailingFork)).await;
    h.manager.start().unwrap();

    h.bus.publish(Event::ChainForkDetected(fork_at(10)));
    let manager = &h.manager;
    assert!(wait_for(move || async move { manager.router_state() == RouterState::Halted }).await);

    assert!(!h.shutdown_flag.load(Ordering::Acquire));
    assert_eq!(h.bus.subscriber_count(&EventKind::NewOrder), 0);
    assert!(h.manager.start().is_err());
}
