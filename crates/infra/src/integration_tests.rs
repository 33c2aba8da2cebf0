//! Cross-component scenarios: checkout, outbox dispatch, and the workers
//! exercised together against shared in-memory stores.

use std::sync::{Arc, Mutex};
use std::thread;

use chrono::Utc;
use serde_json::json;

use storefront_catalog::{Product, StockEntry};
use storefront_core::{AddressId, DomainError, UserId};
use storefront_notify::{NotificationData, NotificationSink, NotifyJob, SinkError};
use storefront_orders::{Order, OrderStatus, PaymentMethod};

use crate::admin::AdminTransitionHandler;
use crate::checkout::{CheckoutConfig, CheckoutEngine, OrderItemRequest, PlaceOrderRequest};
use crate::docstore::{Collection, DocumentStore, InMemoryDocumentStore};
use crate::jobs::{InMemoryJobStore, JobExecutor, JobStore, QueueName};
use crate::outbox::{OutboxDispatcher, OutboxRecord};
use crate::workers::{AdvanceWorker, NotifyWorker};

struct World {
    docs: Arc<InMemoryDocumentStore>,
    jobs: Arc<InMemoryJobStore>,
    user_id: UserId,
    address_id: AddressId,
    product: Product,
}

fn world(stock_quantity: u32) -> World {
    let docs = Arc::new(InMemoryDocumentStore::new());
    let jobs = InMemoryJobStore::arc();
    let user_id = UserId::new();
    let address_id = AddressId::new();
    let product = Product::new(
        "Test Shirt",
        1999,
        vec![StockEntry {
            color: "Red".to_string(),
            size: "M".to_string(),
            quantity: stock_quantity,
        }],
    );

    docs.insert(
        Collection::Users,
        &user_id.to_string(),
        json!({"name": "A. Customer", "phone": "+1 555 0100"}),
    )
    .unwrap();
    docs.insert(
        Collection::Addresses,
        &address_id.to_string(),
        json!({
            "line1": "1 Main St",
            "city": "Springfield",
            "postal_code": "12345",
            "country": "US"
        }),
    )
    .unwrap();
    docs.insert(
        Collection::Products,
        &product.id.to_string(),
        serde_json::to_value(&product).unwrap(),
    )
    .unwrap();
    docs.insert(Collection::Carts, &user_id.to_string(), json!({"items": []}))
        .unwrap();

    World {
        docs,
        jobs,
        user_id,
        address_id,
        product,
    }
}

fn red_m_request(w: &World, quantity: u32) -> PlaceOrderRequest {
    PlaceOrderRequest {
        user_id: w.user_id,
        items: vec![OrderItemRequest {
            product_id: w.product.id,
            color: "Red".to_string(),
            size: "M".to_string(),
            quantity,
        }],
        address_id: w.address_id,
        payment_method: PaymentMethod::ManualSettlement,
        total_cents: 1999 * quantity as u64,
        phone: None,
    }
}

fn load_product(w: &World) -> Product {
    serde_json::from_value(
        w.docs
            .get(Collection::Products, &w.product.id.to_string())
            .unwrap()
            .unwrap(),
    )
    .unwrap()
}

fn load_order(w: &World, order: &Order) -> Order {
    serde_json::from_value(
        w.docs
            .get(Collection::Orders, &order.id.to_string())
            .unwrap()
            .unwrap(),
    )
    .unwrap()
}

#[derive(Default)]
struct CountingSink {
    user_titles: Mutex<Vec<String>>,
    role_titles: Mutex<Vec<String>>,
}

impl NotificationSink for CountingSink {
    fn deliver_to_user(&self, _recipient: &UserId, data: &NotificationData) -> Result<(), SinkError> {
        self.user_titles.lock().unwrap().push(data.title.clone());
        Ok(())
    }

    fn deliver_to_roles(&self, _roles: &[String], data: &NotificationData) -> Result<(), SinkError> {
        self.role_titles.lock().unwrap().push(data.title.clone());
        Ok(())
    }
}

#[test]
fn concurrent_checkouts_never_oversell_the_last_unit() {
    let w = world(1);
    let engine = Arc::new(CheckoutEngine::new(w.docs.clone(), CheckoutConfig::default()));

    let mut handles = Vec::new();
    for _ in 0..2 {
        let engine = engine.clone();
        let request = red_m_request(&w, 1);
        handles.push(thread::spawn(move || engine.place_order(&request)));
    }
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let successes = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1, "exactly one checkout may win the last unit");

    let loser = results.into_iter().find(|r| r.is_err()).unwrap().unwrap_err();
    assert!(
        matches!(
            loser,
            DomainError::VariantUnavailable(_) | DomainError::InsufficientStock(_)
        ),
        "loser got {loser:?}"
    );

    assert_eq!(load_product(&w).find_variant("Red", "M").unwrap().quantity, 0);
    assert_eq!(w.docs.list(Collection::Orders).unwrap().len(), 1);
}

#[test]
fn failing_line_aborts_the_whole_order() {
    let w = world(5);
    let engine = CheckoutEngine::new(w.docs.clone(), CheckoutConfig::default());

    let mut request = red_m_request(&w, 2);
    request.items.push(OrderItemRequest {
        product_id: w.product.id,
        color: "Chartreuse".to_string(),
        size: "M".to_string(),
        quantity: 1,
    });

    let err = engine.place_order(&request).unwrap_err();
    assert!(matches!(err, DomainError::VariantUnavailable(_)));

    // Line 1's decrement was not persisted and nothing else leaked out.
    assert_eq!(load_product(&w).find_variant("Red", "M").unwrap().quantity, 5);
    assert!(w.docs.list(Collection::Orders).unwrap().is_empty());
    assert!(w.docs.list(Collection::Outbox).unwrap().is_empty());
    assert!(w
        .docs
        .get(Collection::Carts, &w.user_id.to_string())
        .unwrap()
        .is_some());
}

#[test]
fn red_m_scenario_end_state() {
    let w = world(2);
    let engine = CheckoutEngine::new(w.docs.clone(), CheckoutConfig::default());
    let placed_at = Utc::now();

    let order = engine.place_order(&red_m_request(&w, 2)).unwrap();

    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(load_product(&w).find_variant("Red", "M").unwrap().quantity, 0);

    // One role-targeted and one user-targeted notification, one delayed
    // advancement record.
    let records: Vec<OutboxRecord> = w
        .docs
        .list(Collection::Outbox)
        .unwrap()
        .into_iter()
        .map(|(_, v)| serde_json::from_value(v).unwrap())
        .collect();
    assert_eq!(records.len(), 3);

    let notify_payloads: Vec<NotifyJob> = records
        .iter()
        .filter(|r| matches!(r.kind, crate::outbox::OutboxKind::Notify))
        .map(|r| serde_json::from_value(r.payload.clone()).unwrap())
        .collect();
    assert_eq!(notify_payloads.len(), 2);
    assert!(notify_payloads
        .iter()
        .any(|n| matches!(n, NotifyJob::NotifyRoles { .. })));
    assert!(notify_payloads
        .iter()
        .any(|n| matches!(n, NotifyJob::PushUser { .. })));

    // Dispatch turns the advancement record into a job delayed ~5000ms.
    let dispatcher = OutboxDispatcher::new(w.docs.clone(), w.jobs.clone());
    assert_eq!(dispatcher.dispatch_pending().unwrap(), 3);
    assert_eq!(w.jobs.stats(QueueName::Notify).unwrap().pending, 2);

    let advance_jobs = w
        .jobs
        .list_by_status(QueueName::Advance, None, 10)
        .unwrap();
    assert_eq!(advance_jobs.len(), 1);
    let due = advance_jobs[0].scheduled_at.expect("advancement is delayed");
    let delay_ms = (due - placed_at).num_milliseconds();
    assert!((4000..=7000).contains(&delay_ms), "delay was {delay_ms}ms");
}

#[test]
fn full_pipeline_advances_the_order_and_notifies() {
    let w = world(2);
    // Zero delay so the advancement job is immediately visible.
    let engine = CheckoutEngine::new(
        w.docs.clone(),
        CheckoutConfig {
            advancement_delay_ms: 0,
            ..Default::default()
        },
    );
    let order = engine.place_order(&red_m_request(&w, 1)).unwrap();

    OutboxDispatcher::new(w.docs.clone(), w.jobs.clone())
        .dispatch_pending()
        .unwrap();

    let advance = AdvanceWorker::new(w.docs.clone(), w.jobs.clone());
    let advance_exec = JobExecutor::new(w.jobs.clone(), QueueName::Advance, move |job| {
        advance.handle(job)
    });
    assert_eq!(advance_exec.drain().unwrap(), 1);

    let stored = load_order(&w, &order);
    assert_eq!(stored.status, OrderStatus::Processing);
    assert_eq!(stored.steps.len(), 2);

    // Staff alert, order-placed alert, and the processing update.
    let sink = Arc::new(CountingSink::default());
    let notify = NotifyWorker::new(sink.clone());
    let notify_exec = JobExecutor::new(w.jobs.clone(), QueueName::Notify, move |job| {
        notify.handle(job)
    });
    assert_eq!(notify_exec.drain().unwrap(), 3);
    assert_eq!(sink.role_titles.lock().unwrap().len(), 1);
    assert_eq!(sink.user_titles.lock().unwrap().len(), 2);
}

#[test]
fn cancelled_order_is_not_advanced() {
    let w = world(2);
    let engine = CheckoutEngine::new(
        w.docs.clone(),
        CheckoutConfig {
            advancement_delay_ms: 0,
            ..Default::default()
        },
    );
    let order = engine.place_order(&red_m_request(&w, 1)).unwrap();

    // Customer cancels before the advancement job runs.
    let admin = AdminTransitionHandler::new(w.docs.clone());
    admin.customer_cancel(order.id, w.user_id).unwrap();

    OutboxDispatcher::new(w.docs.clone(), w.jobs.clone())
        .dispatch_pending()
        .unwrap();
    let advance = AdvanceWorker::new(w.docs.clone(), w.jobs.clone());
    let advance_exec = JobExecutor::new(w.jobs.clone(), QueueName::Advance, move |job| {
        advance.handle(job)
    });
    assert_eq!(advance_exec.drain().unwrap(), 1);

    let stored = load_order(&w, &order);
    assert_eq!(stored.status, OrderStatus::Cancelled);
    // The advancement delivered but changed nothing and queued no update.
    assert_eq!(w.jobs.stats(QueueName::Advance).unwrap().completed, 1);
    assert_eq!(w.jobs.stats(QueueName::Notify).unwrap().pending, 2);
}

#[test]
fn shipped_order_still_rejects_customer_cancellation() {
    let w = world(2);
    let engine = CheckoutEngine::new(w.docs.clone(), CheckoutConfig::default());
    let order = engine.place_order(&red_m_request(&w, 1)).unwrap();

    let admin = AdminTransitionHandler::new(w.docs.clone());
    admin
        .set_status(order.id, OrderStatus::Processing, None)
        .unwrap();
    admin
        .set_status(order.id, OrderStatus::Shipped, Some("TRK-9".to_string()))
        .unwrap();

    let err = admin.customer_cancel(order.id, w.user_id).unwrap_err();
    assert!(matches!(err, DomainError::InvariantViolation(_)));
    assert_eq!(load_order(&w, &order).status, OrderStatus::Shipped);
}

#[test]
fn advancement_redelivery_is_idempotent_end_to_end() {
    let w = world(2);
    let engine = CheckoutEngine::new(
        w.docs.clone(),
        CheckoutConfig {
            advancement_delay_ms: 0,
            ..Default::default()
        },
    );
    let order = engine.place_order(&red_m_request(&w, 1)).unwrap();

    OutboxDispatcher::new(w.docs.clone(), w.jobs.clone())
        .dispatch_pending()
        .unwrap();

    // Simulate physical redelivery by running the handler on the same
    // payload twice.
    let advance_job = w
        .jobs
        .claim_next(QueueName::Advance)
        .unwrap()
        .expect("advancement job enqueued");
    let worker = AdvanceWorker::new(w.docs.clone(), w.jobs.clone());
    worker.handle(&advance_job);
    worker.handle(&advance_job);

    let stored = load_order(&w, &order);
    let processing_steps = stored
        .steps
        .iter()
        .filter(|s| s.status == OrderStatus::Processing)
        .count();
    assert_eq!(processing_steps, 1);
}
