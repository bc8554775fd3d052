//! End-to-end behaviour of the stock pipeline:
//! InventoryService → commit → ledger → alerts → observers → sweeper.

use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use proptest::prelude::*;

use tilestock_core::{CartSessionId, LocationId, ProductId, ReservationId, UserId};
use tilestock_events::{EventBus, EventEnvelope, InMemoryEventBus};
use tilestock_inventory::{
    AlertSeverity, AlertType, MovementStatus, MovementType, ReservationStatus, StockEvent,
    StockLevels, StockThresholds,
};

use crate::clock::{Clock, ManualClock};
use crate::config::InventoryConfig;
use crate::error::StockError;
use crate::retry::RetryPolicy;
use crate::notify::{BusObserver, StockObserver};
use crate::services::{InventoryService, ReceiveBatch, StockAdjustment, Transfer};
use crate::store::InMemoryStockStore;

fn manual_service() -> (InventoryService, Arc<ManualClock>) {
    manual_service_with(InventoryConfig::default())
}

fn manual_service_with(config: InventoryConfig) -> (InventoryService, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::starting_now());
    let store = Arc::new(InMemoryStockStore::with_clock(clock.clone()));
    (InventoryService::new(store, clock.clone(), config), clock)
}

fn stocked(svc: &InventoryService, on_hand: i64) -> (ProductId, LocationId) {
    let (p, l) = (ProductId::new(), LocationId::new());
    svc.stock_location(p, l, StockThresholds::default(), on_hand, None)
        .unwrap();
    (p, l)
}

fn session(name: &str) -> CartSessionId {
    CartSessionId::new(name).unwrap()
}

fn levels(on_hand: i64, reserved: i64) -> StockLevels {
    StockLevels {
        on_hand,
        reserved,
        available: on_hand - reserved,
    }
}

fn active_reserved(svc: &InventoryService, s: &CartSessionId) -> i64 {
    svc.reservations_for_session(s)
        .unwrap()
        .iter()
        .filter(|r| r.status == ReservationStatus::Active)
        .map(|r| r.quantity)
        .sum()
}

#[test]
fn reserve_confirm_release_keep_quantities_consistent() {
    let (svc, _) = manual_service();
    let (p, l) = stocked(&svc, 20);
    let cart = session("cart-1");

    let a = svc.reserve_for_cart(p, l, 5, cart.clone(), None).unwrap();
    let b = svc.reserve_for_cart(p, l, 4, cart.clone(), None).unwrap();
    assert_eq!(svc.get_availability(p, Some(l)).unwrap(), levels(20, 9));
    assert_eq!(active_reserved(&svc, &cart), 9);

    let confirmed = svc.confirm_reservation(a).unwrap();
    assert_eq!(confirmed.status, ReservationStatus::Confirmed);
    assert_eq!(svc.get_availability(p, Some(l)).unwrap(), levels(15, 4));

    assert!(svc.release_cart_reservation(b).unwrap().was_released());
    assert_eq!(svc.get_availability(p, Some(l)).unwrap(), levels(15, 0));
    assert_eq!(active_reserved(&svc, &cart), 0);

    assert!(svc.verify_ledger(p, l).unwrap().is_consistent());
}

#[test]
fn reserve_rejects_more_than_available() {
    let (svc, _) = manual_service();
    let (p, l) = stocked(&svc, 4);
    svc.reserve_for_cart(p, l, 3, session("a"), None).unwrap();

    let err = svc.reserve_for_cart(p, l, 2, session("b"), None).unwrap_err();
    assert_eq!(
        err,
        StockError::InsufficientStock {
            requested: 2,
            available: 1
        }
    );
    assert_eq!(err.user_message(), "not enough stock available");
}

#[test]
fn reserve_validates_quantity_and_ttl() {
    let (svc, _) = manual_service();
    let (p, l) = stocked(&svc, 4);
    let s = session("a");

    for (qty, ttl) in [
        (0, None),
        (-1, None),
        (1, Some(Duration::ZERO)),
        (1, Some(Duration::from_secs(31 * 60))),
    ] {
        assert!(matches!(
            svc.reserve_for_cart(p, l, qty, s.clone(), ttl),
            Err(StockError::Validation(_))
        ));
    }
    assert!(matches!(
        svc.reserve_for_cart(ProductId::new(), l, 1, s, None),
        Err(StockError::NotFound(_))
    ));
}

#[test]
fn releasing_twice_equals_releasing_once() {
    let (svc, _) = manual_service();
    let (p, l) = stocked(&svc, 10);
    let id = svc.reserve_for_cart(p, l, 6, session("s"), None).unwrap();

    let first = svc.release_cart_reservation(id).unwrap();
    let after_first = svc.get_availability(p, Some(l)).unwrap();
    let history_len = svc.get_movement_history(p, Some(l), None).unwrap().len();

    let second = svc.release_cart_reservation(id).unwrap();
    assert!(first.was_released());
    assert!(!second.was_released());
    assert_eq!(second.reservation().status, ReservationStatus::Released);
    assert_eq!(svc.get_availability(p, Some(l)).unwrap(), after_first);
    assert_eq!(after_first, levels(10, 0));
    assert_eq!(
        svc.get_movement_history(p, Some(l), None).unwrap().len(),
        history_len
    );
}

#[test]
fn concurrent_reservations_never_over_reserve() {
    let svc = InventoryService::in_memory(InventoryConfig::default());
    let (p, l) = stocked(&svc, 10);
    let barrier = Arc::new(Barrier::new(10));

    let handles: Vec<_> = (0..10)
        .map(|i| {
            let svc = svc.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                svc.reserve_for_cart(p, l, 3, session(&format!("cart-{i}")), None)
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let ok = results.iter().filter(|r| r.is_ok()).count();
    let short = results
        .iter()
        .filter(|r| matches!(r, Err(StockError::InsufficientStock { .. })))
        .count();
    assert_eq!(ok, 3);
    assert_eq!(short, 7);
    assert_eq!(svc.get_availability(p, Some(l)).unwrap(), levels(10, 9));
}

#[test]
fn concurrent_adjustments_do_not_lose_updates() {
    let svc = InventoryService::in_memory(InventoryConfig::default());
    let (p, l) = stocked(&svc, 0);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let svc = svc.clone();
            thread::spawn(move || {
                let mut applied = 0;
                for _ in 0..25 {
                    match svc.adjust_stock(p, l, 1, "restock", None) {
                        Ok(_) => applied += 1,
                        Err(StockError::ConcurrentUpdateFailure { .. }) => {}
                        Err(other) => panic!("unexpected error: {other}"),
                    }
                }
                applied
            })
        })
        .collect();
    let applied: i64 = handles.into_iter().map(|h| h.join().unwrap()).sum();

    let record = svc.record(p, l).unwrap();
    assert_eq!(record.quantity_on_hand(), applied);
    let audit = svc.verify_ledger(p, l).unwrap();
    assert!(audit.is_consistent());
    assert_eq!(audit.movements as i64, applied);
}

#[test]
fn expired_holds_cannot_be_confirmed() {
    let (svc, clock) = manual_service();
    let (p, l) = stocked(&svc, 10);
    let swept = svc
        .reserve_for_cart(p, l, 4, session("a"), Some(Duration::from_secs(60)))
        .unwrap();
    let unswept = svc
        .reserve_for_cart(p, l, 2, session("b"), Some(Duration::from_secs(60)))
        .unwrap();
    clock.advance(ChronoDuration::seconds(61));

    // Past its window but not yet swept: confirm expires it on the spot.
    assert!(matches!(
        svc.confirm_reservation(unswept),
        Err(StockError::InvalidState(_))
    ));
    assert_eq!(
        svc.get_reservation(unswept).unwrap().status,
        ReservationStatus::Expired
    );

    let report = svc.sweeper().sweep_once().unwrap();
    assert_eq!((report.scanned, report.expired), (1, 1));
    assert!(matches!(
        svc.confirm_reservation(swept),
        Err(StockError::InvalidState(_))
    ));

    assert_eq!(svc.get_availability(p, Some(l)).unwrap(), levels(10, 0));
    assert!(svc.verify_ledger(p, l).unwrap().is_consistent());
}

#[test]
fn racing_sweeps_and_cart_releases_release_each_hold_once() {
    // Only the outcome of each release is under test, not the retry budget.
    let (svc, clock) = manual_service_with(InventoryConfig {
        retry: RetryPolicy {
            jitter: 0.5,
            ..RetryPolicy::exponential(32, Duration::from_millis(1), Duration::from_millis(20))
        },
        ..InventoryConfig::default()
    });
    let (p, l) = stocked(&svc, 100);
    let ids: Vec<ReservationId> = (0..10)
        .map(|i| {
            svc.reserve_for_cart(p, l, 3, session(&format!("cart-{i}")), Some(Duration::from_secs(60)))
                .unwrap()
        })
        .collect();
    clock.advance(ChronoDuration::seconds(61));

    let barrier = Arc::new(Barrier::new(4));
    let sweepers: Vec<_> = (0..2)
        .map(|_| {
            let svc = svc.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                svc.sweeper().sweep_once()
            })
        })
        .collect();
    let releasers: Vec<_> = (0..2)
        .map(|_| {
            let svc = svc.clone();
            let barrier = barrier.clone();
            let ids = ids.clone();
            thread::spawn(move || {
                barrier.wait();
                ids.into_iter()
                    .map(|id| svc.release_cart_reservation(id))
                    .filter_map(Result::err)
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut released = 0;
    for handle in sweepers {
        let report = handle.join().unwrap().unwrap();
        assert_eq!(report.failed, 0, "{report:?}");
        released += report.expired;
    }
    for handle in releasers {
        let errors = handle.join().unwrap();
        assert!(errors.is_empty(), "{errors:?}");
    }
    assert!(released <= ids.len());

    assert_eq!(svc.get_availability(p, Some(l)).unwrap(), levels(100, 0));
    assert!(ids
        .iter()
        .all(|id| !svc.get_reservation(*id).unwrap().is_active()));
    let release_entries = svc
        .get_movement_history(p, Some(l), Some(100))
        .unwrap()
        .into_iter()
        .filter(|m| m.movement_type == MovementType::Release)
        .count();
    assert_eq!(release_entries, ids.len());
    assert!(svc.verify_ledger(p, l).unwrap().is_consistent());
}

#[test]
fn wall_clock_expiry_returns_stock() {
    let svc = InventoryService::in_memory(InventoryConfig::default());
    let (p, l) = stocked(&svc, 50);

    let id = svc
        .reserve_for_cart(p, l, 20, session("slow-cart"), Some(Duration::from_secs(1)))
        .unwrap();
    assert_eq!(svc.get_availability(p, Some(l)).unwrap().available, 30);

    thread::sleep(Duration::from_millis(1_100));
    let report = svc.sweeper().sweep_once().unwrap();

    assert_eq!(report.expired, 1);
    assert_eq!(svc.get_availability(p, Some(l)).unwrap().available, 50);
    assert_eq!(
        svc.get_reservation(id).unwrap().status,
        ReservationStatus::Expired
    );
}

#[test]
fn negative_adjustment_is_rejected_without_a_ledger_entry() {
    let (svc, _) = manual_service();
    let (p, l) = stocked(&svc, 3);
    let before = svc.get_movement_history(p, Some(l), None).unwrap();

    let err = svc.adjust_stock(p, l, -5, "damage", None).unwrap_err();
    assert!(matches!(err, StockError::InvalidState(_)));

    assert_eq!(svc.get_movement_history(p, Some(l), None).unwrap(), before);
    assert_eq!(svc.record(p, l).unwrap().quantity_on_hand(), 3);
}

#[test]
fn adjustments_cannot_eat_into_reserved_stock() {
    let (svc, _) = manual_service();
    let (p, l) = stocked(&svc, 10);
    svc.reserve_for_cart(p, l, 8, session("a"), None).unwrap();

    let damage = StockAdjustment::new(p, l, -3, "broken pallet").kind(MovementType::Damage);
    assert!(matches!(
        svc.apply_adjustment(damage),
        Err(StockError::InvalidState(_))
    ));

    let wrong_sign = StockAdjustment::new(p, l, 3, "broken pallet").kind(MovementType::Damage);
    assert!(matches!(
        svc.apply_adjustment(wrong_sign),
        Err(StockError::Validation(_))
    ));

    let not_manual = StockAdjustment::new(p, l, 3, "x").kind(MovementType::TransferIn);
    assert!(matches!(
        svc.apply_adjustment(not_manual),
        Err(StockError::Validation(_))
    ));
}

#[test]
fn sync_for_session_is_idempotent() {
    let (svc, clock) = manual_service();
    let (p, l) = stocked(&svc, 10);
    let cart = session("returning");
    let stale = svc
        .reserve_for_cart(p, l, 2, cart.clone(), Some(Duration::from_secs(60)))
        .unwrap();
    clock.advance(ChronoDuration::seconds(30));
    let fresh = svc
        .reserve_for_cart(p, l, 3, cart.clone(), Some(Duration::from_secs(600)))
        .unwrap();
    clock.advance(ChronoDuration::seconds(31));

    let first: Vec<_> = svc
        .sync_for_session(&cart)
        .unwrap()
        .into_iter()
        .map(|r| r.id)
        .collect();
    let second: Vec<_> = svc
        .sync_for_session(&cart)
        .unwrap()
        .into_iter()
        .map(|r| r.id)
        .collect();

    assert_eq!(first, vec![fresh]);
    assert_eq!(first, second);
    assert_eq!(
        svc.get_reservation(stale).unwrap().status,
        ReservationStatus::Expired
    );
    assert_eq!(svc.get_availability(p, Some(l)).unwrap(), levels(10, 3));
}

#[test]
fn availability_aggregates_across_locations() {
    let (svc, _) = manual_service();
    let p = ProductId::new();
    let (showroom, warehouse) = (LocationId::new(), LocationId::new());
    svc.stock_location(p, showroom, StockThresholds::default(), 4, None)
        .unwrap();
    svc.stock_location(p, warehouse, StockThresholds::default(), 40, None)
        .unwrap();
    svc.reserve_for_cart(p, warehouse, 5, session("a"), None)
        .unwrap();

    assert_eq!(svc.get_availability(p, None).unwrap(), levels(44, 5));
    assert!(matches!(
        svc.get_availability(ProductId::new(), None),
        Err(StockError::NotFound(_))
    ));
}

#[test]
fn stocking_a_location_twice_is_invalid_state() {
    let (svc, _) = manual_service();
    let (p, l) = stocked(&svc, 1);
    assert!(matches!(
        svc.stock_location(p, l, StockThresholds::default(), 0, None),
        Err(StockError::InvalidState(_))
    ));
}

#[test]
fn transfer_moves_stock_atomically() {
    let (svc, _) = manual_service();
    let p = ProductId::new();
    let (a, b) = (LocationId::new(), LocationId::new());
    svc.stock_location(p, a, StockThresholds::default(), 12, None)
        .unwrap();
    svc.stock_location(p, b, StockThresholds::default(), 0, None)
        .unwrap();
    svc.reserve_for_cart(p, a, 5, session("a"), None).unwrap();

    let too_much = Transfer {
        product_id: p,
        from: a,
        to: b,
        quantity: 8,
        actor: None,
        notes: None,
    };
    assert!(matches!(
        svc.transfer(too_much.clone()),
        Err(StockError::InsufficientStock { requested: 8, available: 7 })
    ));

    let (from, to) = svc
        .transfer(Transfer {
            quantity: 7,
            ..too_much
        })
        .unwrap();
    assert_eq!(from.levels(), levels(5, 5));
    assert_eq!(to.levels(), levels(7, 0));

    let out = &svc.get_movement_history(p, Some(a), Some(1)).unwrap()[0];
    assert_eq!(out.movement_type, MovementType::TransferOut);
    assert_eq!(out.quantity, -7);
    assert_eq!((out.from_location_id, out.to_location_id), (Some(a), Some(b)));
    assert!(svc.verify_ledger(p, a).unwrap().is_consistent());
    assert!(svc.verify_ledger(p, b).unwrap().is_consistent());
}

#[test]
fn physical_count_books_the_difference() {
    let (svc, _) = manual_service();
    let (p, l) = stocked(&svc, 10);
    svc.reserve_for_cart(p, l, 4, session("a"), None).unwrap();

    let record = svc.record_count(p, l, 7, None, None).unwrap();
    assert_eq!(record.levels(), levels(7, 4));
    let entry = &svc.get_movement_history(p, Some(l), Some(1)).unwrap()[0];
    assert_eq!(entry.movement_type, MovementType::CountAdjustment);
    assert_eq!(entry.quantity, -3);

    let unchanged = svc.record_count(p, l, 7, None, None).unwrap();
    assert_eq!(unchanged.levels(), record.levels());
    assert_eq!(
        svc.get_movement_history(p, Some(l), Some(1)).unwrap()[0].id,
        entry.id
    );

    assert!(matches!(
        svc.record_count(p, l, 3, None, None),
        Err(StockError::InvalidState(_))
    ));
    assert!(svc.verify_ledger(p, l).unwrap().is_consistent());
}

#[test]
fn pending_purchases_change_nothing_until_received() {
    let (svc, _) = manual_service();
    let (p, l) = stocked(&svc, 2);

    let po = StockAdjustment::new(p, l, 30, "PO-1001").kind(MovementType::Purchase);
    let pending = svc.record_pending(po.clone()).unwrap();
    assert_eq!(pending.status, MovementStatus::Pending);
    assert_eq!(svc.record(p, l).unwrap().quantity_on_hand(), 2);
    assert!(svc.verify_ledger(p, l).unwrap().is_consistent());

    let record = svc.receive_pending(pending.id).unwrap();
    assert_eq!(record.quantity_on_hand(), 32);
    assert!(matches!(
        svc.receive_pending(pending.id),
        Err(StockError::InvalidState(_))
    ));
    assert!(svc.verify_ledger(p, l).unwrap().is_consistent());

    let cancelled = svc.record_pending(po).unwrap();
    assert_eq!(
        svc.cancel_pending(cancelled.id).unwrap().status,
        MovementStatus::Cancelled
    );
    assert!(matches!(
        svc.receive_pending(cancelled.id),
        Err(StockError::InvalidState(_))
    ));
    assert_eq!(svc.record(p, l).unwrap().quantity_on_hand(), 32);
}

#[test]
fn low_stock_alert_is_upserted_then_resolved() {
    let (svc, _) = manual_service();
    let p = ProductId::new();
    let l = LocationId::new();
    let thresholds = StockThresholds {
        reorder_point: Some(10),
        reorder_quantity: Some(40),
        max_stock_level: Some(100),
    };
    svc.stock_location(p, l, thresholds, 20, None).unwrap();
    assert!(svc.get_active_alerts().unwrap().is_empty());

    svc.adjust_stock(p, l, -12, "sold off-system", None).unwrap();
    let alerts = svc.get_active_alerts().unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].alert_type, AlertType::LowStock);
    assert_eq!(alerts[0].severity, AlertSeverity::Medium);

    let admin = UserId::new();
    svc.acknowledge_alert(alerts[0].id, Some(admin)).unwrap();

    svc.adjust_stock(p, l, -4, "breakage", None).unwrap();
    let again = svc.get_active_alerts().unwrap();
    assert_eq!(again.len(), 1);
    assert_eq!(again[0].id, alerts[0].id);
    assert_eq!(again[0].current_value, 4);
    assert_eq!(again[0].severity, AlertSeverity::High);
    assert_eq!(again[0].acknowledged_by, Some(admin));

    svc.adjust_stock(p, l, 97, "overdelivery", None).unwrap();
    let over = svc.get_active_alerts().unwrap();
    assert_eq!(over.len(), 1);
    assert_eq!(over[0].alert_type, AlertType::Overstock);
    assert!(matches!(
        svc.acknowledge_alert(alerts[0].id, None),
        Err(StockError::InvalidState(_))
    ));
}

#[test]
fn reserving_the_last_units_raises_out_of_stock() {
    let (svc, _) = manual_service();
    let (p, l) = stocked(&svc, 3);
    let id = svc.reserve_for_cart(p, l, 3, session("a"), None).unwrap();

    let alerts = svc.get_active_alerts().unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].alert_type, AlertType::OutOfStock);
    assert_eq!(alerts[0].severity, AlertSeverity::Critical);

    svc.release_cart_reservation(id).unwrap();
    assert!(svc.get_active_alerts().unwrap().is_empty());
}

#[test]
fn batches_track_lots_and_expiry() {
    let (svc, clock) = manual_service();
    let (p, l) = stocked(&svc, 0);

    let batch = svc
        .receive_batch(ReceiveBatch {
            product_id: p,
            location_id: l,
            batch_number: "GROUT-2291".to_string(),
            quantity: 12,
            unit_cost: Some(850),
            expiry_date: Some(clock.now() + ChronoDuration::days(20)),
            actor: None,
        })
        .unwrap();
    assert_eq!(svc.record(p, l).unwrap().quantity_on_hand(), 12);

    let expiring: Vec<_> = svc
        .get_active_alerts()
        .unwrap()
        .into_iter()
        .filter(|a| a.alert_type == AlertType::Expiring)
        .collect();
    assert_eq!(expiring.len(), 1);
    assert_eq!(expiring[0].batch_id, Some(batch.id));
    assert_eq!(expiring[0].severity, AlertSeverity::Medium);

    let take = |qty: i64| {
        svc.apply_adjustment(
            StockAdjustment::new(p, l, qty, "used for sample boards")
                .kind(MovementType::Damage)
                .batch(Some(batch.id)),
        )
    };
    assert!(matches!(take(-13), Err(StockError::InvalidState(_))));
    take(-12).unwrap();
    assert!(svc.batches(p, l).unwrap()[0].is_depleted());

    assert!(svc
        .get_active_alerts()
        .unwrap()
        .iter()
        .all(|a| a.alert_type != AlertType::Expiring));
    assert!(svc.verify_ledger(p, l).unwrap().is_consistent());
}

#[test]
fn sweeper_escalates_batch_expiry() {
    let (svc, clock) = manual_service();
    let (p, l) = stocked(&svc, 0);
    svc.receive_batch(ReceiveBatch {
        product_id: p,
        location_id: l,
        batch_number: "ADH-7".to_string(),
        quantity: 3,
        unit_cost: None,
        expiry_date: Some(clock.now() + ChronoDuration::days(10)),
        actor: None,
    })
    .unwrap();

    clock.advance(ChronoDuration::days(11));
    svc.sweeper().sweep_once().unwrap();

    let expiring: Vec<_> = svc
        .get_active_alerts()
        .unwrap()
        .into_iter()
        .filter(|a| a.alert_type == AlertType::Expiring)
        .collect();
    assert_eq!(expiring.len(), 1);
    assert_eq!(expiring[0].severity, AlertSeverity::Critical);
}

#[derive(Default)]
struct Recorder(Mutex<Vec<StockEvent>>);

impl StockObserver for Recorder {
    fn on_stock_event(&self, event: &StockEvent) {
        self.0.lock().unwrap().push(event.clone());
    }
}

#[test]
fn observers_see_every_commit() {
    let (svc, _) = manual_service();
    let recorder = Arc::new(Recorder::default());
    svc.subscribe(recorder.clone());

    let bus = Arc::new(InMemoryEventBus::<EventEnvelope<StockEvent>>::new());
    let sub = bus.subscribe();
    let elsewhere = bus.subscribe_to_product(ProductId::new());
    svc.subscribe(Arc::new(BusObserver::new(bus.clone())));

    let (p, l) = stocked(&svc, 1);
    svc.reserve_for_cart(p, l, 1, session("a"), None).unwrap();

    let events = recorder.0.lock().unwrap().clone();
    let kinds: Vec<_> = events
        .iter()
        .map(|e| tilestock_events::Event::event_type(e))
        .collect();
    assert_eq!(
        kinds,
        vec![
            "stock.record.changed",
            "stock.record.changed",
            "stock.reservation.changed",
            "stock.alert.raised",
        ]
    );

    let envelopes = sub.drain();
    assert_eq!(envelopes.len(), events.len());
    assert_eq!(envelopes[1].sequence_number(), 2);
    assert!(envelopes.iter().all(|e| e.product_id() == p));
    assert!(elsewhere.drain().is_empty());
}

/// Releases `pending` from inside the notification for the next hold, i.e.
/// after that hold committed but before its alert evaluation ran.
struct ReleaseOnNextHold {
    svc: InventoryService,
    pending: Mutex<Option<ReservationId>>,
}

impl StockObserver for ReleaseOnNextHold {
    fn on_stock_event(&self, event: &StockEvent) {
        if let StockEvent::ReservationChanged {
            status: ReservationStatus::Active,
            ..
        } = event
        {
            if let Some(id) = self.pending.lock().unwrap().take() {
                self.svc.release_cart_reservation(id).unwrap();
            }
        }
    }
}

#[test]
fn late_alert_evaluation_does_not_resurrect_out_of_stock() {
    let (svc, _) = manual_service();
    let (p, l) = stocked(&svc, 10);
    let first = svc.reserve_for_cart(p, l, 4, session("a"), None).unwrap();
    svc.subscribe(Arc::new(ReleaseOnNextHold {
        svc: svc.clone(),
        pending: Mutex::new(Some(first)),
    }));

    // Commits at 0 available; `first` is released before this hold's alerts run.
    svc.reserve_for_cart(p, l, 6, session("b"), None).unwrap();

    assert_eq!(svc.get_availability(p, Some(l)).unwrap(), levels(10, 6));
    let active = svc.get_active_alerts().unwrap();
    assert!(active.is_empty(), "{active:?}");
}

#[test]
fn movement_history_is_newest_first() {
    let (svc, clock) = manual_service();
    let (p, l) = stocked(&svc, 5);
    for qty in [1, 2, 3] {
        clock.advance(ChronoDuration::seconds(1));
        svc.adjust_stock(p, l, qty, "restock", None).unwrap();
    }

    let history = svc.get_movement_history(p, Some(l), Some(3)).unwrap();
    let quantities: Vec<_> = history.iter().map(|m| m.quantity).collect();
    assert_eq!(quantities, vec![3, 2, 1]);
    assert!(matches!(
        svc.get_movement_history(p, Some(l), Some(0)),
        Err(StockError::Validation(_))
    ));
    assert_eq!(svc.get_movement_history(p, None, None).unwrap().len(), 4);
}

#[derive(Debug, Clone)]
enum Op {
    Adjust(i64),
    Reserve(i64),
    Confirm(usize),
    Release(usize),
    Count(i64),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (-20i64..30).prop_map(Op::Adjust),
        (1i64..8).prop_map(Op::Reserve),
        (0usize..8).prop_map(Op::Confirm),
        (0usize..8).prop_map(Op::Release),
        (0i64..40).prop_map(Op::Count),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        ..ProptestConfig::default()
    })]

    /// Property: whatever mix of operations succeeds or fails, replaying the
    /// completed ledger reproduces on-hand, and active holds sum to reserved.
    #[test]
    fn ledger_replay_reproduces_on_hand(ops in prop::collection::vec(op(), 1..40)) {
        let (svc, _) = manual_service();
        let (p, l) = stocked(&svc, 10);
        let cart = session("prop");
        let mut held = Vec::new();

        for op in ops {
            match op {
                Op::Adjust(0) => {}
                Op::Adjust(delta) => {
                    let _ = svc.adjust_stock(p, l, delta, "prop", None);
                }
                Op::Reserve(qty) => {
                    if let Ok(id) = svc.reserve_for_cart(p, l, qty, cart.clone(), None) {
                        held.push(id);
                    }
                }
                Op::Confirm(i) => {
                    if let Some(id) = held.get(i) {
                        let _ = svc.confirm_reservation(*id);
                    }
                }
                Op::Release(i) => {
                    if let Some(id) = held.get(i) {
                        let _ = svc.release_cart_reservation(*id);
                    }
                }
                Op::Count(counted) => {
                    let _ = svc.record_count(p, l, counted, None, None);
                }
            }
        }

        let audit = svc.verify_ledger(p, l).unwrap();
        prop_assert!(audit.is_consistent(), "{audit:?}");

        let record = svc.record(p, l).unwrap();
        prop_assert!(record.quantity_reserved() >= 0);
        prop_assert!(record.quantity_available() >= 0);
        prop_assert_eq!(record.quantity_reserved(), active_reserved(&svc, &cart));
    }
}
