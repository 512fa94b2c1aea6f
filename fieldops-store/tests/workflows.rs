use chrono::{Duration, Utc};
use fieldops_catalog::{CatalogEntry, ItemType, LineRequest, Technician};
use fieldops_core::{
    Actor, GatewayEvent, GatewayOutcome, GeoPoint, LogNotifier, PaymentMethod, Role, UserRecord,
};
use fieldops_core::payment::SandboxGateway;
use fieldops_estimate::{
    ConversionOptions, EstimatePatch, EstimateService, EstimateStatus, NewEstimate, PricingRules,
};
use fieldops_order::{
    ExecutionState, InvoiceItemInput, InvoiceService, InvoiceStatus, NewInvoice, NewOrder, OrderRepository,
    OrderService, PaymentReconciler, PaymentRepository, PaymentState, Reconciliation,
};
use fieldops_store::MemoryStore;
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

struct Harness {
    store: Arc<MemoryStore>,
    estimates: EstimateService,
    orders: OrderService,
    invoices: InvoiceService,
    payments: PaymentReconciler,
    admin: Actor,
    client: Actor,
    technician: Actor,
    service_item: Uuid,
    material_item: Uuid,
}

async fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());

    let admin = Actor::new(Uuid::new_v4(), Role::Admin);
    let client = Actor::new(Uuid::new_v4(), Role::Client);
    let technician = Actor::new(Uuid::new_v4(), Role::Technician);

    store
        .add_user(UserRecord {
            id: admin.user_id,
            name: "Ops".into(),
            email: None,
            role: Role::Admin,
        })
        .await;
    store
        .add_user(UserRecord {
            id: client.user_id,
            name: "Dana Client".into(),
            email: Some("dana@example.com".into()),
            role: Role::Client,
        })
        .await;
    store
        .add_technician(Technician {
            id: technician.user_id,
            name: "Sam Tech".into(),
            qualification: "plumbing".into(),
            location: GeoPoint::new(40.7128, -74.0060),
            available_from: Utc::now() - Duration::days(1),
            rating: 4.5,
        })
        .await;

    let labour = CatalogEntry::new(ItemType::Service, "Labour hour", Decimal::from(50));
    let valve = CatalogEntry::new(ItemType::Material, "Valve", Decimal::from(100));
    let service_item = labour.id;
    let material_item = valve.id;
    store.add_catalog_entry(labour).await;
    store.add_catalog_entry(valve).await;

    let notifier = Arc::new(LogNotifier);
    Harness {
        estimates: EstimateService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            notifier.clone(),
            PricingRules::default(),
        ),
        orders: OrderService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            notifier.clone(),
        ),
        invoices: InvoiceService::new(store.clone(), store.clone()),
        payments: PaymentReconciler::new(store.clone(), store.clone(), Arc::new(SandboxGateway), notifier),
        store,
        admin,
        client,
        technician,
        service_item,
        material_item,
    }
}

fn line(item_type: &str, item_id: Uuid, quantity: i64) -> LineRequest {
    LineRequest {
        item_type: item_type.to_string(),
        item_id,
        description: None,
        quantity: Decimal::from(quantity),
    }
}

fn new_estimate(h: &Harness) -> NewEstimate {
    NewEstimate {
        client_id: h.client.user_id,
        technician_id: None,
        items: vec![
            line("service", h.service_item, 2),
            line("material", h.material_item, 1),
        ],
        discount: Decimal::from(20),
        tax: Decimal::from(10),
        description: Some("Replace kitchen valve".into()),
        payment_terms: None,
        service_date: None,
        due_date: None,
        job_number: Some("JOB-7".into()),
    }
}

fn new_order(location: Option<GeoPoint>) -> NewOrder {
    NewOrder {
        qualification: "plumbing".into(),
        description: None,
        address: "12 Harbor Rd".into(),
        location,
        preferred_start_time: None,
        scheduled_start_time: None,
        scheduled_end_time: None,
        notes: None,
        items: vec![],
    }
}

fn gateway_event(order_id: Uuid, txn: &str, outcome: GatewayOutcome) -> GatewayEvent {
    GatewayEvent {
        method: PaymentMethod::Stripe,
        order_id,
        client_id: None,
        amount: Decimal::from(198),
        transaction_id: txn.to_string(),
        outcome,
        payload: json!({"type": "payment_intent.succeeded", "id": txn}),
    }
}

#[tokio::test]
async fn test_estimate_lifecycle_and_conversion() {
    let h = harness().await;

    let estimate = h.estimates.create(&h.technician, new_estimate(&h)).await.unwrap();
    assert_eq!(estimate.status, EstimateStatus::Draft);
    assert_eq!(estimate.technician_id, Some(h.technician.user_id));
    assert_eq!(estimate.total.to_string(), "198.00");

    h.estimates.send(&h.technician, estimate.id).await.unwrap();
    let approved = h.estimates.approve(&h.client, estimate.id).await.unwrap();
    assert_eq!(approved.status, EstimateStatus::Approved);

    let conversion = h
        .estimates
        .convert_to_order(&h.admin, estimate.id, ConversionOptions::default())
        .await
        .unwrap();

    let order = h.store.get_order(conversion.order.id).await.unwrap().unwrap();
    assert_eq!(order.status.execution, ExecutionState::Pending);
    assert_eq!(order.technician_id, Some(h.technician.user_id));
    assert_eq!(order.qualification, "general");
    assert_eq!(order.items.len(), 2);
    assert_eq!(order.total_cost, Some(approved.total));
    assert_eq!(conversion.estimate.converted_order_id, Some(order.id));

    let again = h
        .estimates
        .convert_to_order(&h.admin, estimate.id, ConversionOptions::default())
        .await
        .unwrap_err();
    assert_eq!(again.kind(), "invalid_state");
}

#[tokio::test]
async fn test_sent_estimate_cannot_be_converted() {
    let h = harness().await;

    let estimate = h.estimates.create(&h.technician, new_estimate(&h)).await.unwrap();
    h.estimates.send(&h.technician, estimate.id).await.unwrap();

    let err = h
        .estimates
        .convert_to_order(&h.admin, estimate.id, ConversionOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "invalid_state");
}

#[tokio::test]
async fn test_approved_estimate_cannot_be_deleted() {
    let h = harness().await;

    let estimate = h.estimates.create(&h.technician, new_estimate(&h)).await.unwrap();
    h.estimates.send(&h.technician, estimate.id).await.unwrap();
    h.estimates.approve(&h.client, estimate.id).await.unwrap();

    let err = h.estimates.delete(&h.admin, estimate.id).await.unwrap_err();
    assert_eq!(err.kind(), "invalid_state");
}

#[tokio::test]
async fn test_stale_assignment_is_refused() {
    let h = harness().await;
    let order = h.orders.create(&h.client, new_order(None)).await.unwrap();

    // A second writer holding the version loaded before the assignment.
    let stale = h.store.get_order(order.id).await.unwrap().unwrap();
    h.orders
        .assign(&h.admin, order.id, Some(h.technician.user_id))
        .await
        .unwrap();

    let err = h.store.update_order(&stale).await.unwrap_err();
    assert_eq!(err.kind(), "conflict");

    let stored = h.store.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(stored.technician_id, Some(h.technician.user_id));
    assert_eq!(stored.status.execution, ExecutionState::Assigned);
}

#[tokio::test]
async fn test_auto_assignment_prefers_nearest_then_rating() {
    let h = harness().await;
    let job = GeoPoint::new(51.5007, -0.1246);

    let mut expected = None;
    for (name, lat, rating) in [("near", 51.5087, 4.0), ("far", 51.5457, 5.0), ("near-top", 51.5087, 4.8)] {
        let id = Uuid::new_v4();
        if name == "near-top" {
            expected = Some(id);
        }
        h.store
            .add_technician(Technician {
                id,
                name: name.into(),
                qualification: "plumbing".into(),
                location: GeoPoint::new(lat, -0.1246),
                available_from: Utc::now() - Duration::hours(2),
                rating,
            })
            .await;
    }

    let order = h.orders.create(&h.client, new_order(Some(job))).await.unwrap();
    let assignment = h.orders.assign(&h.admin, order.id, None).await.unwrap();

    assert_eq!(Some(assignment.technician_id), expected);
    assert!(assignment.distance_km.unwrap() < 1.0);
    assert_eq!(assignment.order.status.execution, ExecutionState::Assigned);
}

#[tokio::test]
async fn test_auto_assignment_without_candidates() {
    let h = harness().await;
    let mut input = new_order(Some(GeoPoint::new(0.0, 0.0)));
    input.qualification = "roofing".into();
    let order = h.orders.create(&h.client, input).await.unwrap();

    let err = h.orders.assign(&h.admin, order.id, None).await.unwrap_err();
    assert_eq!(err.kind(), "not_found");
}

#[tokio::test]
async fn test_replayed_webhook_records_one_payment() {
    let h = harness().await;
    let order = h.orders.create(&h.client, new_order(None)).await.unwrap();
    let invoice = h
        .invoices
        .create(
            &h.client,
            NewInvoice {
                order_id: order.id,
                amount: Decimal::from(198),
                tax: Decimal::ZERO,
                discount: Decimal::ZERO,
                due_date: None,
                notes: None,
                items: vec![],
            },
        )
        .await
        .unwrap();
    assert_eq!(invoice.status, InvoiceStatus::Unpaid);

    let first = h
        .payments
        .reconcile(gateway_event(order.id, "pi_3Nx", GatewayOutcome::Completed))
        .await
        .unwrap();
    let second = h
        .payments
        .reconcile(gateway_event(order.id, "pi_3Nx", GatewayOutcome::Completed))
        .await
        .unwrap();

    assert!(!first.is_duplicate());
    assert!(second.is_duplicate());
    assert_eq!(h.store.list_payments_for_order(order.id).await.unwrap().len(), 1);

    let order = h.store.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(order.status.payment, PaymentState::Paid);
    let invoice = h.invoices.get(&h.client, invoice.id).await.unwrap();
    assert_eq!(invoice.status, InvoiceStatus::Paid);
}

#[tokio::test]
async fn test_failed_charge_leaves_order_unpaid() {
    let h = harness().await;
    let order = h.orders.create(&h.client, new_order(None)).await.unwrap();

    let result = h
        .payments
        .reconcile(gateway_event(order.id, "pi_declined", GatewayOutcome::Failed))
        .await
        .unwrap();
    assert!(!result.is_duplicate());

    let order = h.store.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(order.status.payment, PaymentState::Unpaid);
}

#[tokio::test]
async fn test_webhook_for_unknown_order_is_acknowledged() {
    let h = harness().await;
    let orphan = Uuid::new_v4();

    let result = h
        .payments
        .reconcile(gateway_event(orphan, "pi_orphan", GatewayOutcome::Completed))
        .await
        .unwrap();

    assert!(matches!(result, Reconciliation::UnknownOrder { order_id } if order_id == orphan));
    assert!(h.store.list_payments_for_order(orphan).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_concurrent_deliveries_record_one_payment() {
    let h = harness().await;
    let order = h.orders.create(&h.client, new_order(None)).await.unwrap();

    let (a, b) = tokio::join!(
        h.payments
            .reconcile(gateway_event(order.id, "pi_race", GatewayOutcome::Completed)),
        h.payments
            .reconcile(gateway_event(order.id, "pi_race", GatewayOutcome::Completed)),
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_ne!(a.is_duplicate(), b.is_duplicate());
    assert_eq!(h.store.list_payments_for_order(order.id).await.unwrap().len(), 1);
    let order = h.store.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(order.status.payment, PaymentState::Paid);
}

#[tokio::test]
async fn test_updating_draft_replaces_items_and_total() {
    let h = harness().await;
    let estimate = h.estimates.create(&h.technician, new_estimate(&h)).await.unwrap();
    let old_items: Vec<Uuid> = estimate.items.iter().map(|i| i.id).collect();
    assert_eq!(old_items.len(), 2);

    let updated = h
        .estimates
        .update(
            &h.technician,
            estimate.id,
            EstimatePatch {
                items: Some(vec![line("material", h.material_item, 3)]),
                discount: Some(Decimal::ZERO),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    // 3 x 100, plus 10% tax
    assert_eq!(updated.total.to_string(), "330.00");
    assert_eq!(updated.items.len(), 1);
    assert!(updated.items.iter().all(|i| !old_items.contains(&i.id)));

    let stored = h.estimates.get(&h.admin, estimate.id).await.unwrap();
    assert_eq!(stored.items.len(), 1);
    assert_eq!(stored.items[0].quantity, Decimal::from(3));
    assert_eq!(stored.total, updated.total);
}

#[tokio::test]
async fn test_sent_estimate_cannot_be_updated() {
    let h = harness().await;
    let estimate = h.estimates.create(&h.technician, new_estimate(&h)).await.unwrap();
    h.estimates.send(&h.technician, estimate.id).await.unwrap();

    let err = h
        .estimates
        .update(
            &h.technician,
            estimate.id,
            EstimatePatch {
                job_number: Some("JOB-8".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "invalid_state");
}

#[tokio::test]
async fn test_overflowing_estimate_quantity_is_rejected() {
    let h = harness().await;
    let mut input = new_estimate(&h);
    input.items[0].quantity = Decimal::MAX;

    let err = h.estimates.create(&h.technician, input).await.unwrap_err();
    assert_eq!(err.kind(), "validation_error");
}

#[tokio::test]
async fn test_overflowing_invoice_item_is_rejected() {
    let h = harness().await;
    let order = h.orders.create(&h.client, new_order(None)).await.unwrap();

    let err = h
        .invoices
        .create(
            &h.client,
            NewInvoice {
                order_id: order.id,
                amount: Decimal::from(198),
                tax: Decimal::ZERO,
                discount: Decimal::ZERO,
                due_date: None,
                notes: None,
                items: vec![InvoiceItemInput {
                    description: "Bulk fittings".into(),
                    quantity: Decimal::MAX,
                    unit_price: Decimal::from(2),
                }],
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "validation_error");
}
