//! Integration tests for the inventory and order services.

use std::sync::Arc;
use std::time::Duration;

use common::{ProductId, UserId};
use domain::{
    MAX_PRICE_CENTS, Money, NewProduct, OrderStatus, Product, ProductUpdate, StockDelta,
    StockRequest,
};
use ledger_store::{InMemoryLedgerStore, LedgerStore};
use order_engine::{
    EngineConfig, EngineError, InMemoryNotifier, InventoryService, LogSink, NotificationEvent,
    OrderService, QueueNotifier,
};

struct TestHarness {
    store: InMemoryLedgerStore,
    inventory: InventoryService<InMemoryLedgerStore>,
    orders: OrderService<InMemoryLedgerStore, InMemoryNotifier>,
    notifier: InMemoryNotifier,
}

impl TestHarness {
    fn new() -> Self {
        Self::with_config(EngineConfig::default().with_retry(3, Duration::from_millis(1)))
    }

    fn with_config(config: EngineConfig) -> Self {
        let store = InMemoryLedgerStore::new();
        let notifier = InMemoryNotifier::new();
        let inventory = InventoryService::new(store.clone(), config);
        let orders = OrderService::new(store.clone(), notifier.clone(), config);

        Self {
            store,
            inventory,
            orders,
            notifier,
        }
    }

    async fn product(&self, sku: &str, price_cents: i64, stock: i64) -> Product {
        self.inventory
            .create_product(NewProduct::new(sku, format!("{sku} product"), Money::from_cents(price_cents), stock))
            .await
            .unwrap()
    }

    async fn stock(&self, id: ProductId) -> i64 {
        self.inventory.get_product(id).await.unwrap().stock
    }
}

#[tokio::test]
async fn test_reserve_then_cancel_scenario() {
    let h = TestHarness::new();
    let p1 = h.product("P1", 1000, 5).await;

    let order1 = h
        .orders
        .create_order(UserId::new(), vec![StockRequest::new(p1.id, 3)], None)
        .await
        .unwrap();
    assert_eq!(h.stock(p1.id).await, 2);

    let second = h
        .orders
        .create_order(UserId::new(), vec![StockRequest::new(p1.id, 3)], None)
        .await;
    match second {
        Err(EngineError::InsufficientStock {
            product_id,
            available,
            requested,
        }) => {
            assert_eq!(product_id, p1.id);
            assert_eq!(available, 2);
            assert_eq!(requested, 3);
        }
        other => panic!("expected InsufficientStock, got {other:?}"),
    }
    assert_eq!(h.stock(p1.id).await, 2);

    let canceled = h.orders.cancel_order(order1.id).await.unwrap();
    assert_eq!(canceled.status, OrderStatus::Canceled);
    assert_eq!(h.stock(p1.id).await, 5);
}

#[tokio::test]
async fn test_multi_item_order_is_atomic() {
    let h = TestHarness::new();
    let a = h.product("A", 100, 10).await;
    let b = h.product("B", 100, 1).await;
    let user = UserId::new();

    let result = h
        .orders
        .create_order(
            user,
            vec![StockRequest::new(a.id, 4), StockRequest::new(b.id, 2)],
            None,
        )
        .await;

    assert!(matches!(
        result,
        Err(EngineError::InsufficientStock { product_id, .. }) if product_id == b.id
    ));
    assert_eq!(h.stock(a.id).await, 10);
    assert_eq!(h.stock(b.id).await, 1);
    assert!(h.orders.list_orders_by_user(user).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_products_are_listed() {
    let h = TestHarness::new();
    let a = h.product("A", 100, 10).await;
    let ghost_1 = ProductId::new();
    let ghost_2 = ProductId::new();

    let result = h
        .orders
        .create_order(
            UserId::new(),
            vec![
                StockRequest::new(ghost_1, 1),
                StockRequest::new(a.id, 1),
                StockRequest::new(ghost_2, 1),
            ],
            None,
        )
        .await;

    match result {
        Err(EngineError::ProductsNotFound(ids)) => assert_eq!(ids, vec![ghost_1, ghost_2]),
        other => panic!("expected ProductsNotFound, got {other:?}"),
    }
    assert_eq!(h.stock(a.id).await, 10);
}

#[tokio::test]
async fn test_double_cancel_restocks_once() {
    let h = TestHarness::new();
    let p = h.product("P", 100, 10).await;
    let order = h
        .orders
        .create_order(UserId::new(), vec![StockRequest::new(p.id, 4)], None)
        .await
        .unwrap();

    h.orders.cancel_order(order.id).await.unwrap();
    assert_eq!(h.stock(p.id).await, 10);

    let again = h.orders.cancel_order(order.id).await;
    assert!(matches!(
        again,
        Err(EngineError::InvalidTransition {
            from: OrderStatus::Canceled,
            to: OrderStatus::Canceled
        })
    ));
    assert_eq!(h.stock(p.id).await, 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_cancels_restock_once() {
    let h = Arc::new(TestHarness::new());
    let p = h.product("P", 100, 10).await;
    let order = h
        .orders
        .create_order(UserId::new(), vec![StockRequest::new(p.id, 4)], None)
        .await
        .unwrap();
    assert_eq!(h.stock(p.id).await, 6);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let h = h.clone();
            tokio::spawn(async move { h.orders.cancel_order(order.id).await })
        })
        .collect();

    let mut canceled = 0;
    for result in futures_util::future::join_all(handles).await {
        match result.unwrap() {
            Ok(order) => {
                assert_eq!(order.status, OrderStatus::Canceled);
                canceled += 1;
            }
            Err(EngineError::InvalidTransition {
                from: OrderStatus::Canceled,
                to: OrderStatus::Canceled,
            }) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(canceled, 1);
    assert_eq!(h.stock(p.id).await, 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_ship_racing_cancel_has_one_winner() {
    let h = Arc::new(TestHarness::new());
    let p = h.product("P", 100, 100).await;

    for _ in 0..10 {
        let before = h.stock(p.id).await;
        let order = h
            .orders
            .create_order(UserId::new(), vec![StockRequest::new(p.id, 2)], None)
            .await
            .unwrap();
        h.orders
            .update_status(order.id, OrderStatus::Confirmed)
            .await
            .unwrap();

        let ship = {
            let h = h.clone();
            tokio::spawn(async move { h.orders.update_status(order.id, OrderStatus::Shipped).await })
        };
        let cancel = {
            let h = h.clone();
            tokio::spawn(async move { h.orders.cancel_order(order.id).await })
        };
        let (shipped, canceled) = (ship.await.unwrap(), cancel.await.unwrap());

        let final_status = h.orders.get_order(order.id).await.unwrap().status;
        match (shipped, canceled) {
            (Ok(_), Err(EngineError::InvalidTransition { from: OrderStatus::Shipped, .. })) => {
                assert_eq!(final_status, OrderStatus::Shipped);
                assert_eq!(h.stock(p.id).await, before - 2);
            }
            (Err(EngineError::InvalidTransition { from: OrderStatus::Canceled, .. }), Ok(_)) => {
                assert_eq!(final_status, OrderStatus::Canceled);
                assert_eq!(h.stock(p.id).await, before);
            }
            other => panic!("expected exactly one winner, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_order_total_overflow_is_rejected_before_commit() {
    let h = TestHarness::new();
    let p = h.product("PRICEY", MAX_PRICE_CENTS, 100_000_000).await;

    let result = h
        .orders
        .create_order(UserId::new(), vec![StockRequest::new(p.id, 100_000_000)], None)
        .await;

    assert!(matches!(result, Err(EngineError::Validation(_))), "got {result:?}");
    assert_eq!(h.stock(p.id).await, 100_000_000);
    assert_eq!(h.store.order_count().await, 0);
    assert_eq!(h.notifier.event_count().await, 0);
}

#[tokio::test]
async fn test_price_above_cap_is_rejected() {
    let h = TestHarness::new();
    let result = h
        .inventory
        .create_product(NewProduct::new(
            "PRICEY",
            "Pricey",
            Money::from_cents(i64::MAX / 2),
            10,
        ))
        .await;
    assert!(matches!(result, Err(EngineError::Validation(_))));
}

#[tokio::test]
async fn test_duplicate_lines_past_u32_are_rejected() {
    let h = TestHarness::new();
    let p = h.product("BULK", 1, 10_000_000_000).await;

    let result = h
        .orders
        .create_order(
            UserId::new(),
            vec![
                StockRequest::new(p.id, u32::MAX),
                StockRequest::new(p.id, u32::MAX),
            ],
            None,
        )
        .await;

    assert!(matches!(result, Err(EngineError::Validation(_))), "got {result:?}");
    assert_eq!(h.stock(p.id).await, 10_000_000_000);
    assert_eq!(h.store.order_count().await, 0);
}

#[tokio::test]
async fn test_terminal_orders_cannot_be_canceled() {
    let h = TestHarness::new();
    let p = h.product("P", 100, 10).await;
    let order = h
        .orders
        .create_order(UserId::new(), vec![StockRequest::new(p.id, 2)], None)
        .await
        .unwrap();

    for status in [
        OrderStatus::Confirmed,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
    ] {
        let updated = h.orders.update_status(order.id, status).await.unwrap();
        assert_eq!(updated.status, status);
    }

    let result = h.orders.cancel_order(order.id).await;
    assert!(matches!(result, Err(EngineError::InvalidTransition { .. })));
    assert_eq!(h.stock(p.id).await, 8);
}

#[tokio::test]
async fn test_bulk_update_rejects_whole_batch() {
    let h = TestHarness::new();
    let p1 = h.product("P1", 100, 3).await;
    let p2 = h.product("P2", 100, 7).await;

    let result = h
        .inventory
        .bulk_update_stock(vec![StockDelta::new(p1.id, -10), StockDelta::new(p2.id, 5)])
        .await;

    assert!(matches!(
        result,
        Err(EngineError::InsufficientStock { product_id, available: 3, requested: 10 }) if product_id == p1.id
    ));
    assert_eq!(h.stock(p1.id).await, 3);
    assert_eq!(h.stock(p2.id).await, 7);

    let applied = h
        .inventory
        .bulk_update_stock(vec![StockDelta::new(p1.id, -3), StockDelta::new(p2.id, 5)])
        .await
        .unwrap();
    assert_eq!(applied.len(), 2);
    assert_eq!(h.stock(p1.id).await, 0);
    assert_eq!(h.stock(p2.id).await, 12);
}

#[tokio::test]
async fn test_price_snapshot_survives_price_change() {
    let h = TestHarness::new();
    let p = h.product("P", 1000, 10).await;
    let order = h
        .orders
        .create_order(UserId::new(), vec![StockRequest::new(p.id, 2)], None)
        .await
        .unwrap();

    h.inventory
        .update_product(
            p.id,
            ProductUpdate {
                price: Some(Money::from_cents(1500)),
                name: Some("Renamed".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let fetched = h.orders.get_order(order.id).await.unwrap();
    assert_eq!(fetched.items[0].unit_price, Money::from_cents(1000));
    assert_eq!(fetched.items[0].product_name, "P product");
    assert_eq!(fetched.total_amount(), Money::from_cents(2000));
}

#[tokio::test]
async fn test_notification_failure_does_not_fail_order() {
    let h = TestHarness::new();
    let p = h.product("P", 100, 10).await;
    h.notifier.set_fail_on_enqueue(true).await;

    let order = h
        .orders
        .create_order(UserId::new(), vec![StockRequest::new(p.id, 1)], None)
        .await
        .unwrap();

    assert_eq!(h.orders.get_order(order.id).await.unwrap().id, order.id);
    assert_eq!(h.stock(p.id).await, 9);
    assert_eq!(h.notifier.event_count().await, 0);
}

#[tokio::test]
async fn test_notification_carries_items_and_total() {
    let h = TestHarness::new();
    let a = h.product("A", 250, 10).await;
    let b = h.product("B", 1000, 10).await;
    let user = UserId::new();

    let order = h
        .orders
        .create_order(
            user,
            vec![StockRequest::new(a.id, 4), StockRequest::new(b.id, 1)],
            None,
        )
        .await
        .unwrap();

    let events = h.notifier.events().await;
    assert_eq!(events.len(), 1);
    let NotificationEvent::OrderCreated(payload) = &events[0];
    assert_eq!(payload.order_id, order.id);
    assert_eq!(payload.user_id, user);
    assert_eq!(payload.total, Money::from_cents(2000));
    assert_eq!(payload.items.len(), 2);
    assert_eq!(payload.items[0].name, "A product");
}

#[tokio::test]
async fn test_idempotency_key_replays_without_reserving() {
    let h = TestHarness::new();
    let p = h.product("P", 100, 10).await;
    let user = UserId::new();
    let items = vec![StockRequest::new(p.id, 3)];

    let first = h
        .orders
        .create_order(user, items.clone(), Some("checkout-42".to_string()))
        .await
        .unwrap();
    let second = h
        .orders
        .create_order(user, items, Some("checkout-42".to_string()))
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(h.stock(p.id).await, 7);
    assert_eq!(h.notifier.event_count().await, 1);
    assert_eq!(h.orders.list_orders_by_user(user).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_transient_conflicts_are_retried() {
    let h = TestHarness::new();
    let p = h.product("P", 100, 10).await;

    h.store.inject_conflicts(2).await;
    let order = h
        .orders
        .create_order(UserId::new(), vec![StockRequest::new(p.id, 1)], None)
        .await
        .unwrap();

    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(h.stock(p.id).await, 9);
}

#[tokio::test]
async fn test_exhausted_retries_surface_transaction_conflict() {
    let h = TestHarness::new();
    let p = h.product("P", 100, 10).await;

    h.store.inject_conflicts(3).await;
    let result = h
        .orders
        .create_order(UserId::new(), vec![StockRequest::new(p.id, 1)], None)
        .await;

    assert!(matches!(result, Err(EngineError::TransactionConflict(_))));
    assert_eq!(h.stock(p.id).await, 10);
    assert_eq!(h.store.order_count().await, 0);
    assert_eq!(h.notifier.event_count().await, 0);
}

#[tokio::test]
async fn test_delete_product_referenced_by_open_order() {
    let h = TestHarness::new();
    let p = h.product("P", 100, 10).await;
    let order = h
        .orders
        .create_order(UserId::new(), vec![StockRequest::new(p.id, 1)], None)
        .await
        .unwrap();

    let result = h.inventory.delete_product(p.id).await;
    assert!(matches!(result, Err(EngineError::ProductInUse(id)) if id == p.id));

    h.orders
        .update_status(order.id, OrderStatus::Confirmed)
        .await
        .unwrap();
    h.orders
        .update_status(order.id, OrderStatus::Shipped)
        .await
        .unwrap();
    h.orders
        .update_status(order.id, OrderStatus::Delivered)
        .await
        .unwrap();

    h.inventory.delete_product(p.id).await.unwrap();
    assert!(matches!(
        h.inventory.get_product(p.id).await,
        Err(EngineError::NotFound { .. })
    ));
}

#[tokio::test]
async fn test_list_orders_newest_first() {
    let h = TestHarness::new();
    let p = h.product("P", 100, 10).await;
    let user = UserId::new();

    let mut created = Vec::new();
    for _ in 0..3 {
        let order = h
            .orders
            .create_order(user, vec![StockRequest::new(p.id, 1)], None)
            .await
            .unwrap();
        created.push(order.id);
    }

    let listed: Vec<_> = h
        .orders
        .list_orders_by_user(user)
        .await
        .unwrap()
        .into_iter()
        .map(|o| o.id)
        .collect();
    created.reverse();
    assert_eq!(listed, created);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_orders_exactly_n_minus_one_succeed() {
    const N: usize = 16;
    let h = Arc::new(TestHarness::new());
    let p = h.product("HOT", 100, (N - 1) as i64).await;

    let mut handles = Vec::new();
    for _ in 0..N {
        let h = h.clone();
        handles.push(tokio::spawn(async move {
            h.orders
                .create_order(UserId::new(), vec![StockRequest::new(p.id, 1)], None)
                .await
        }));
    }

    let mut succeeded = 0;
    let mut insufficient = 0;
    for result in futures_util::future::join_all(handles).await {
        match result.unwrap() {
            Ok(_) => succeeded += 1,
            Err(EngineError::InsufficientStock { .. }) => insufficient += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(succeeded, N - 1);
    assert_eq!(insufficient, 1);
    assert_eq!(h.stock(p.id).await, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_conservation_under_concurrent_orders_and_cancels() {
    let h = Arc::new(TestHarness::new());
    let initial = 50;
    let p = h.product("P", 100, initial).await;

    let mut handles = Vec::new();
    for i in 0..20u32 {
        let h = h.clone();
        handles.push(tokio::spawn(async move {
            let quantity = i % 3 + 1;
            let order = h
                .orders
                .create_order(UserId::new(), vec![StockRequest::new(p.id, quantity)], None)
                .await?;
            if i % 2 == 0 {
                h.orders.cancel_order(order.id).await?;
                return Ok::<i64, EngineError>(0);
            }
            Ok(i64::from(quantity))
        }));
    }

    let mut held = 0;
    for result in futures_util::future::join_all(handles).await {
        match result.unwrap() {
            Ok(quantity) => held += quantity,
            Err(EngineError::InsufficientStock { .. }) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    let current = h.stock(p.id).await;
    assert!(current >= 0);
    assert_eq!(current, initial - held);
}

#[tokio::test]
async fn test_queue_notifier_delivers_through_worker() {
    let store = InMemoryLedgerStore::new();
    let sink = InMemoryNotifier::new();
    let (notifier, worker) = QueueNotifier::with_worker(16, sink.clone());
    let worker = tokio::spawn(worker.run());

    let config = EngineConfig::default();
    let inventory = InventoryService::new(store.clone(), config);
    let orders = OrderService::new(store.clone(), notifier, config);

    let p = inventory
        .create_product(NewProduct::new("Q", "Queued", Money::from_cents(100), 5))
        .await
        .unwrap();
    let order = orders
        .create_order(UserId::new(), vec![StockRequest::new(p.id, 2)], None)
        .await
        .unwrap();

    drop(orders);
    worker.await.unwrap();

    let delivered = sink.events().await;
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].order_id(), order.id);
}

#[tokio::test]
async fn test_full_queue_does_not_fail_orders() {
    let store = InMemoryLedgerStore::new();
    let (notifier, _worker) = QueueNotifier::with_worker(1, LogSink);
    let config = EngineConfig::default();
    let orders = OrderService::new(store.clone(), notifier, config);

    let p = store
        .create_product(NewProduct::new("F", "Full", Money::from_cents(100), 5))
        .await
        .unwrap();

    for _ in 0..3 {
        orders
            .create_order(UserId::new(), vec![StockRequest::new(p.id, 1)], None)
            .await
            .unwrap();
    }
    assert_eq!(store.get_product(p.id).await.unwrap().unwrap().stock, 2);
}
