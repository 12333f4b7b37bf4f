//! Property tests for the inventory ledger.
//!
//! Arbitrary sequences of holds, releases and confirmations must never break
//! `available + reserved + sold == total`, and a rejected hold must leave the
//! counters exactly as they were.
//!
//! Run with: `cargo test --test ledger_invariant_test`

#![allow(clippy::unwrap_used)]

use boxoffice::types::{TicketId, TicketInventory};
use boxoffice::{ErrorKind, TicketingError};
use chrono::Utc;
use proptest::prelude::*;

#[derive(Clone, Debug)]
enum Op {
    Reserve(u32),
    Release(usize),
    Confirm(usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0u32..15).prop_map(Op::Reserve),
        1 => any::<usize>().prop_map(Op::Release),
        1 => any::<usize>().prop_map(Op::Confirm),
    ]
}

fn counters(inventory: &TicketInventory) -> (u32, u32, u32) {
    (
        inventory.available_quantity,
        inventory.reserved_quantity,
        inventory.sold_quantity,
    )
}

proptest! {
    #[test]
    fn counters_stay_balanced(
        total in 1u32..100,
        ops in prop::collection::vec(op_strategy(), 0..80),
    ) {
        let now = Utc::now();
        let mut inventory = TicketInventory::new(TicketId::new(), total, now);
        let mut holds: Vec<u32> = Vec::new();
        let mut sold = 0u32;

        for op in ops {
            match op {
                Op::Reserve(quantity) => {
                    let before = counters(&inventory);
                    match inventory.reserve(quantity, now) {
                        Ok(()) => holds.push(quantity),
                        Err(e) => {
                            prop_assert_eq!(counters(&inventory), before);
                            if quantity == 0 {
                                prop_assert_eq!(e.kind(), ErrorKind::InvalidArgument);
                            } else {
                                let is_shortage = matches!(
                                    e,
                                    TicketingError::InsufficientInventory { .. }
                                );
                                prop_assert!(is_shortage);
                                prop_assert!(quantity > before.0);
                            }
                        }
                    }
                }
                Op::Release(index) if !holds.is_empty() => {
                    let quantity = holds.swap_remove(index % holds.len());
                    inventory.release(quantity, now).unwrap();
                }
                Op::Confirm(index) if !holds.is_empty() => {
                    let quantity = holds.swap_remove(index % holds.len());
                    inventory.confirm(quantity, now).unwrap();
                    sold += quantity;
                }
                Op::Release(_) | Op::Confirm(_) => {}
            }

            prop_assert!(inventory.check_invariant().is_ok());
            prop_assert_eq!(inventory.reserved_quantity, holds.iter().sum::<u32>());
            prop_assert_eq!(inventory.sold_quantity, sold);
        }
    }

    #[test]
    fn releasing_more_than_reserved_is_rejected(held in 1u32..20, extra in 1u32..20) {
        let now = Utc::now();
        let mut inventory = TicketInventory::new(TicketId::new(), 50, now);
        inventory.reserve(held, now).unwrap();
        let before = counters(&inventory);

        let err = inventory.release(held + extra, now).unwrap_err();

        prop_assert_eq!(err.kind(), ErrorKind::Internal);
        prop_assert_eq!(counters(&inventory), before);
    }
}

#[test]
fn oversubscribed_hold_leaves_ledger_untouched() {
    let now = Utc::now();
    let mut inventory = TicketInventory::new(TicketId::new(), 10, now);
    inventory.reserve(6, now).unwrap();

    let err = inventory.reserve(6, now).unwrap_err();

    assert_eq!(
        err,
        TicketingError::InsufficientInventory {
            requested: 6,
            available: 4
        }
    );
    assert_eq!(counters(&inventory), (4, 6, 0));
}
