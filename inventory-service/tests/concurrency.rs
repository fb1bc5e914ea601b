use bigdecimal::BigDecimal;
use chrono::Utc;
use inventory_service::{
    Catalog, CheckoutOrchestrator, ExpirySweeper, InMemoryCatalog, InventoryConfig,
    InventoryError, ManualClock, ReservationManager, VariantStock,
};
use shared::{CheckoutLine, ReservationStatus, SessionId, VariantId};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Barrier;

struct Harness {
    catalog: Arc<InMemoryCatalog>,
    clock: Arc<ManualClock>,
    checkout: Arc<CheckoutOrchestrator>,
}

impl Harness {
    fn new(stock: &[(i64, i32)]) -> Self {
        let catalog = Arc::new(InMemoryCatalog::with_variants(stock.iter().map(
            |&(id, on_hand)| VariantStock {
                id: VariantId(id),
                sku: format!("SKU-{id}"),
                on_hand_quantity: on_hand,
                unit_price: BigDecimal::from(100),
            },
        )));
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let manager = ReservationManager::new(
            catalog.clone(),
            clock.clone(),
            InventoryConfig::default(),
        );
        Self {
            catalog,
            clock,
            checkout: Arc::new(CheckoutOrchestrator::new(Arc::new(manager))),
        }
    }

    fn manager(&self) -> &Arc<ReservationManager> {
        self.checkout.manager()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn last_unit_goes_to_exactly_one_of_two_concurrent_checkouts() {
    let harness = Harness::new(&[(3, 1)]);
    let barrier = Arc::new(Barrier::new(2));

    let mut handles = Vec::new();
    for guest in ["guest-a", "guest-b"] {
        let checkout = harness.checkout.clone();
        let barrier = barrier.clone();
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            checkout
                .prepare(&[CheckoutLine::new(VariantId(3), 1)], &SessionId::new(guest))
                .await
        }));
    }

    let results: Vec<_> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    let successes = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1);
    let failure = results.iter().find_map(|r| r.as_ref().err()).unwrap();
    assert!(matches!(
        failure,
        InventoryError::InsufficientStock {
            requested: 1,
            available: 0,
            ..
        }
    ));
    assert_eq!(
        harness.manager().available_stock(VariantId(3)).await.unwrap(),
        0
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn many_shoppers_never_oversell() {
    let harness = Harness::new(&[(1, 7)]);
    let shoppers = 32;
    let barrier = Arc::new(Barrier::new(shoppers));

    let handles: Vec<_> = (0..shoppers)
        .map(|i| {
            let checkout = harness.checkout.clone();
            let barrier = barrier.clone();
            tokio::spawn(async move {
                barrier.wait().await;
                checkout
                    .prepare(&[CheckoutLine::new(VariantId(1), 1)], &SessionId::new(format!("s{i}")))
                    .await
            })
        })
        .collect();

    let mut successes = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(e) => assert!(e.is_insufficient_stock(), "unexpected error: {e}"),
        }
    }

    assert_eq!(successes, 7);
    let level = harness.manager().stock_level(VariantId(1)).await.unwrap();
    assert_eq!(level.reserved, 7);
    assert_eq!(level.available, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn opposite_cart_orders_do_not_deadlock() {
    let harness = Harness::new(&[(1, 1), (2, 1)]);

    for round in 0..20 {
        let barrier = Arc::new(Barrier::new(2));
        let carts = [
            ("a", [CheckoutLine::new(VariantId(1), 1), CheckoutLine::new(VariantId(2), 1)]),
            ("b", [CheckoutLine::new(VariantId(2), 1), CheckoutLine::new(VariantId(1), 1)]),
        ];

        let handles: Vec<_> = carts
            .into_iter()
            .map(|(name, lines)| {
                let checkout = harness.checkout.clone();
                let barrier = barrier.clone();
                let session = SessionId::new(format!("{name}-{round}"));
                tokio::spawn(async move {
                    barrier.wait().await;
                    let result = checkout.prepare(&lines, &session).await;
                    (session, result)
                })
            })
            .collect();

        let outcomes = tokio::time::timeout(
            Duration::from_secs(5),
            futures::future::join_all(handles),
        )
        .await
        .expect("checkouts deadlocked");

        let mut winners = Vec::new();
        for outcome in outcomes {
            let (session, result) = outcome.unwrap();
            match result {
                Ok(_) => winners.push(session),
                Err(e) => assert!(e.is_insufficient_stock(), "unexpected error: {e}"),
            }
        }

        // Both carts want the same two single-unit variants; at most one can
        // hold them, and a loser never keeps a partial hold.
        assert!(winners.len() <= 1);
        for variant in [1, 2] {
            let level = harness
                .manager()
                .stock_level(VariantId(variant))
                .await
                .unwrap();
            assert_eq!(level.reserved, winners.len() as i32);
        }

        for session in winners {
            harness.checkout.release(&session).await.unwrap();
        }
    }
}

#[tokio::test]
async fn confirm_deducts_stock() {
    let harness = Harness::new(&[(10, 10)]);
    let session = SessionId::new("s");
    harness
        .checkout
        .prepare(&[CheckoutLine::new(VariantId(10), 3)], &session)
        .await
        .unwrap();

    let report = harness.checkout.confirm(&session).await.unwrap();
    assert!(report.is_complete());

    let variant = harness
        .catalog
        .get_variant(VariantId(10))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(variant.on_hand_quantity, 7);
    let rows = harness.manager().reservations_for_session(&session);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, ReservationStatus::Completed);
    assert!(!harness.checkout.verify(&session));
}

#[tokio::test]
async fn expired_hold_returns_to_pool_after_one_sweep() {
    let harness = Harness::new(&[(5, 4)]);
    let session = SessionId::new("abandoned");
    harness
        .checkout
        .prepare(&[CheckoutLine::new(VariantId(5), 3)], &session)
        .await
        .unwrap();
    assert_eq!(harness.manager().available_stock(VariantId(5)).await.unwrap(), 1);

    let sweeper = ExpirySweeper::new(harness.manager().clone());
    assert_eq!(sweeper.run_expiry_sweep().await.expired, 0);

    harness.clock.advance(chrono::Duration::minutes(15) + chrono::Duration::seconds(1));
    assert!(harness.checkout.verify(&session));
    assert_eq!(sweeper.run_expiry_sweep().await.expired, 1);

    assert!(!harness.checkout.verify(&session));
    assert_eq!(harness.manager().available_stock(VariantId(5)).await.unwrap(), 4);
    assert!(matches!(
        harness.checkout.confirm(&session).await.unwrap_err(),
        InventoryError::NoActiveReservations { .. }
    ));
    assert_eq!(sweeper.run_expiry_sweep().await.expired, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sweep_racing_confirm_leaves_each_row_in_one_terminal_state() {
    let harness = Harness::new(&[(1, 50)]);
    let sessions: Vec<SessionId> = (0..20).map(|i| SessionId::new(format!("s{i}"))).collect();
    for session in &sessions {
        harness
            .checkout
            .prepare(&[CheckoutLine::new(VariantId(1), 2)], session)
            .await
            .unwrap();
    }
    harness.clock.advance(chrono::Duration::minutes(30));

    let sweeper = ExpirySweeper::new(harness.manager().clone());
    let confirms = {
        let checkout = harness.checkout.clone();
        let sessions = sessions.clone();
        tokio::spawn(async move {
            let mut confirmed = 0;
            for session in &sessions {
                if let Ok(report) = checkout.confirm(session).await {
                    confirmed += report.confirmed.len();
                }
            }
            confirmed
        })
    };
    let swept = sweeper.run_expiry_sweep().await;
    let confirmed = confirms.await.unwrap();

    assert_eq!(swept.failed, 0);
    assert_eq!(swept.expired + confirmed, sessions.len());

    let on_hand = harness
        .catalog
        .get_variant(VariantId(1))
        .await
        .unwrap()
        .unwrap()
        .on_hand_quantity;
    assert_eq!(on_hand, 50 - 2 * confirmed as i32);
    let level = harness.manager().stock_level(VariantId(1)).await.unwrap();
    assert_eq!(level.reserved, 0);
}
