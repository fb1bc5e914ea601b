use bigdecimal::BigDecimal;
use chrono::Utc;
use inventory_service::{
    Catalog, CheckoutOrchestrator, ExpirySweeper, InMemoryCatalog, InventoryConfig, ManualClock,
    ReservationManager, VariantStock,
};
use proptest::prelude::*;
use shared::{CheckoutLine, ReservationStatus, SessionId, VariantId};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

const VARIANTS: i64 = 3;

#[derive(Debug, Clone)]
enum Op {
    Prepare { session: u8, lines: Vec<(i64, i32)> },
    Release { session: u8 },
    Confirm { session: u8 },
    Advance { minutes: i64 },
    Sweep,
    Restock { variant: i64, quantity: i32 },
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0u8..4, prop::collection::vec((0..VARIANTS, 1i32..4), 1..3))
            .prop_map(|(session, lines)| Op::Prepare { session, lines }),
        1 => (0u8..4).prop_map(|session| Op::Release { session }),
        2 => (0u8..4).prop_map(|session| Op::Confirm { session }),
        1 => (0i64..20).prop_map(|minutes| Op::Advance { minutes }),
        1 => Just(Op::Sweep),
        1 => (0..VARIANTS, 1i32..3).prop_map(|(variant, quantity)| Op::Restock { variant, quantity }),
    ]
}

fn session(n: u8) -> SessionId {
    SessionId::new(format!("session-{n}"))
}

async fn check_invariants(
    catalog: &InMemoryCatalog,
    manager: &ReservationManager,
    terminal: &mut HashMap<Uuid, ReservationStatus>,
) {
    for id in 0..VARIANTS {
        let variant = catalog.get_variant(VariantId(id)).await.unwrap().unwrap();
        let level = manager.stock_level(VariantId(id)).await.unwrap();
        assert!(variant.on_hand_quantity >= 0);
        assert!(
            level.reserved <= variant.on_hand_quantity,
            "variant {id} oversold: {level:?}"
        );
    }

    for row in manager.reservations() {
        if let Some(previous) = terminal.get(&row.id) {
            assert_eq!(*previous, row.status, "terminal reservation {} changed", row.id);
        } else if row.status.is_terminal() {
            terminal.insert(row.id, row.status);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn ledger_never_oversells_and_terminal_states_stick(
        stock in prop::collection::vec(0i32..6, VARIANTS as usize),
        ops in prop::collection::vec(op(), 1..40),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async move {
            let catalog = Arc::new(InMemoryCatalog::with_variants(
                stock.iter().enumerate().map(|(id, &on_hand)| VariantStock {
                    id: VariantId(id as i64),
                    sku: format!("SKU-{id}"),
                    on_hand_quantity: on_hand,
                    unit_price: BigDecimal::from(1),
                }),
            ));
            let clock = Arc::new(ManualClock::new(Utc::now()));
            let manager = Arc::new(ReservationManager::new(
                catalog.clone(),
                clock.clone(),
                InventoryConfig::default(),
            ));
            let checkout = CheckoutOrchestrator::new(manager.clone());
            let sweeper = ExpirySweeper::new(manager.clone());
            let mut terminal = HashMap::new();

            for op in ops {
                match op {
                    Op::Prepare { session: s, lines } => {
                        let lines: Vec<CheckoutLine> = lines
                            .into_iter()
                            .map(|(v, q)| CheckoutLine::new(VariantId(v), q))
                            .collect();
                        if let Err(e) = checkout.prepare(&lines, &session(s)).await {
                            assert!(e.is_insufficient_stock(), "unexpected error: {e}");
                            assert!(!checkout.verify(&session(s)));
                        }
                    }
                    Op::Release { session: s } => {
                        checkout.release(&session(s)).await.unwrap();
                        assert!(!checkout.verify(&session(s)));
                        assert_eq!(checkout.release(&session(s)).await.unwrap(), 0);
                    }
                    Op::Confirm { session: s } => {
                        if let Ok(report) = checkout.confirm(&session(s)).await {
                            assert!(report.is_complete());
                        }
                    }
                    Op::Advance { minutes } => clock.advance(chrono::Duration::minutes(minutes)),
                    Op::Sweep => {
                        let report = sweeper.run_expiry_sweep().await;
                        assert_eq!(report.failed, 0);
                    }
                    Op::Restock { variant, quantity } => {
                        manager.restock(VariantId(variant), quantity).await.unwrap();
                    }
                }
                check_invariants(&catalog, &manager, &mut terminal).await;
            }
        });
    }
}
