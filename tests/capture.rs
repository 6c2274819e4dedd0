mod support;

use salus::{ChangeKind, Field, KeyValue, Record, SalusError, Store};
use serde_json::json;
use support::models::{AuditEntry, Customer, Order, Voucher};
use support::senders::RecordingSender;
use support::{producer, sync_options};
use uuid::Uuid;

#[test]
fn insert_carries_every_field() {
    let sender = RecordingSender::new();
    let salus = producer(sender.clone(), sync_options());

    let mut session = salus.session();
    session.add(&Customer::new(1, "Ada")).unwrap();
    assert_eq!(session.save_changes().unwrap(), 1);

    let saves = sender.saves();
    assert_eq!(saves.len(), 1);
    assert_eq!(saves[0].schema_version(), "1.0.0-test");

    let change = &saves[0].changes()[0];
    assert_eq!(change.kind, ChangeKind::Insert);
    assert_eq!(change.entity_type_tag, "Customer");
    assert_eq!(
        change.updated_fields,
        Some(vec![
            Field::new("id", 1),
            Field::new("name", "Ada"),
            Field::new("email", "ada@example.com"),
        ])
    );
    assert_eq!(change.primary_key_fields, vec![Field::new("id", 1)]);
}

#[test]
fn update_carries_only_changed_fields() {
    let sender = RecordingSender::new();
    let salus = producer(sender.clone(), sync_options());

    let mut session = salus.session();
    session.add(&Customer::new(1, "Ada")).unwrap();
    session.save_changes().unwrap();

    let mut customer: Customer = session.get(1).unwrap().unwrap();
    customer.email = "ada@lovelace.org".into();
    session.update(&customer).unwrap();
    session.save_changes().unwrap();

    let saves = sender.saves();
    let change = &saves[1].changes()[0];
    assert_eq!(change.kind, ChangeKind::Update);
    assert_eq!(
        change.updated_fields,
        Some(vec![Field::new("email", "ada@lovelace.org")])
    );
    assert_eq!(change.primary_key_fields, vec![Field::new("id", 1)]);
}

#[test]
fn delete_carries_key_and_null_fields() {
    let sender = RecordingSender::new();
    let salus = producer(sender.clone(), sync_options());

    let mut session = salus.session();
    session.add(&Customer::new(7, "Grace")).unwrap();
    session.save_changes().unwrap();
    session.remove_by_key::<Customer>(7).unwrap();
    session.save_changes().unwrap();

    let payload: serde_json::Value = serde_json::from_str(&sender.sent()[1]).unwrap();
    assert_eq!(
        payload["changes"][0],
        json!({
            "kind": "Delete",
            "entityTypeTag": "Customer",
            "updatedFields": null,
            "primaryKeyFields": [{ "name": "id", "value": 7 }]
        })
    );
    assert!(session.get::<Customer>(7).unwrap().is_none());
}

#[test]
fn one_save_per_call_in_first_touch_order() {
    let sender = RecordingSender::new();
    let salus = producer(sender.clone(), sync_options());
    let order_id = Uuid::new_v4();

    let mut session = salus.session();
    session.add(&Customer::new(2, "Hedy")).unwrap();
    session
        .add(&Order {
            order_id,
            customer_id: 2,
            total_cents: 1250,
        })
        .unwrap();
    session.add(&Customer::new(1, "Ada")).unwrap();
    assert_eq!(session.save_changes().unwrap(), 3);

    let saves = sender.saves();
    assert_eq!(saves.len(), 1);

    let tags: Vec<_> = saves[0]
        .changes()
        .iter()
        .map(|c| c.entity_type_tag.as_str())
        .collect();
    assert_eq!(tags, vec!["Customer", "Order", "Customer"]);

    let order = &saves[0].changes()[1];
    assert_eq!(
        order.primary_key_fields,
        vec![Field::new("OrderId", order_id.to_string())]
    );
    assert_eq!(order.primary_key(Order::KEY_KINDS), Some(vec![KeyValue::Uuid(order_id)]));
}

#[test]
fn untracked_types_write_rows_without_outbox() {
    let sender = RecordingSender::new();
    let salus = producer(sender.clone(), sync_options());

    let mut session = salus.session();
    session
        .add(&AuditEntry {
            id: 1,
            message: "login".into(),
        })
        .unwrap();
    assert_eq!(session.save_changes().unwrap(), 1);

    assert!(salus.store().outbox_all().unwrap().is_empty());
    assert!(sender.sent().is_empty());
    assert!(session.get::<AuditEntry>(1).unwrap().is_some());
}

#[test]
fn untracked_changes_are_left_out_of_mixed_saves() {
    let sender = RecordingSender::new();
    let salus = producer(sender.clone(), sync_options());

    let mut session = salus.session();
    session
        .add(&AuditEntry {
            id: 1,
            message: "signup".into(),
        })
        .unwrap();
    session.add(&Customer::new(1, "Ada")).unwrap();
    session.save_changes().unwrap();

    let saves = sender.saves();
    assert_eq!(saves[0].changes().len(), 1);
    assert_eq!(saves[0].changes()[0].entity_type_tag, "Customer");
}

#[test]
fn nothing_to_save_writes_nothing() {
    let sender = RecordingSender::new();
    let salus = producer(sender.clone(), sync_options());

    let mut session = salus.session();
    assert_eq!(session.save_changes().unwrap(), 0);

    session.add(&Customer::new(1, "Ada")).unwrap();
    session.remove_by_key::<Customer>(1).unwrap();
    assert!(!session.has_changes());
    assert_eq!(session.save_changes().unwrap(), 0);

    session.add(&Customer::new(2, "Grace")).unwrap();
    session.save_changes().unwrap();
    session.update(&Customer::new(2, "Grace")).unwrap();
    assert_eq!(session.save_changes().unwrap(), 0);

    assert_eq!(salus.store().outbox_all().unwrap().len(), 1);
    assert_eq!(sender.sent().len(), 1);
}

#[test]
fn remove_then_add_is_an_update() {
    let sender = RecordingSender::new();
    let salus = producer(sender.clone(), sync_options());

    let mut session = salus.session();
    session.add(&Customer::new(1, "Ada")).unwrap();
    session.save_changes().unwrap();

    session.remove_by_key::<Customer>(1).unwrap();
    session.add(&Customer::new(1, "Augusta")).unwrap();
    session.save_changes().unwrap();

    let binding = sender.saves();
    let change = &binding[1].changes()[0];
    assert_eq!(change.kind, ChangeKind::Update);
    assert_eq!(
        change.updated_fields,
        Some(vec![
            Field::new("name", "Augusta"),
            Field::new("email", "augusta@example.com"),
        ])
    );
}

#[test]
fn session_errors() {
    let salus = producer(RecordingSender::new(), sync_options());
    let mut session = salus.session();

    assert!(matches!(
        session.update(&Customer::new(1, "Ada")),
        Err(SalusError::NotFound(_))
    ));
    assert!(matches!(
        session.remove_by_key::<Customer>(1),
        Err(SalusError::NotFound(_))
    ));

    session.add(&Customer::new(1, "Ada")).unwrap();
    assert!(matches!(
        session.add(&Customer::new(1, "Ada")),
        Err(SalusError::AlreadyExists(_))
    ));
}

#[test]
fn reads_see_unsaved_and_saved_rows() {
    let salus = producer(RecordingSender::new(), sync_options());

    let mut writer = salus.session();
    writer.add(&Customer::new(1, "Ada")).unwrap();
    writer.add(&Customer::new(2, "Grace")).unwrap();
    writer.save_changes().unwrap();

    writer.add(&Customer::new(3, "Hedy")).unwrap();
    let seen = writer.find::<Customer>(|_| true).unwrap();
    assert_eq!(seen.len(), 3);

    let reader = salus.session();
    let committed = reader.find::<Customer>(|c| c.id > 1).unwrap();
    assert_eq!(committed, vec![Customer::new(2, "Grace")]);
    assert!(reader.get::<Customer>(3).unwrap().is_none());
}

#[test]
fn uuid_looking_string_keys_stay_distinct() {
    let salus = producer(RecordingSender::new(), sync_options());
    let hyphenated = "550e8400-e29b-41d4-a716-446655440000";
    let simple = "550E8400E29B41D4A716446655440000";

    let mut session = salus.session();
    for (id, amount_cents) in [(hyphenated, 500), (simple, 700)] {
        session
            .add(&Voucher {
                id: id.to_string(),
                amount_cents,
            })
            .unwrap();
    }
    assert_eq!(session.save_changes().unwrap(), 2);

    let reader = salus.session();
    assert_eq!(reader.get::<Voucher>(hyphenated).unwrap().unwrap().amount_cents, 500);
    assert_eq!(reader.get::<Voucher>(simple).unwrap().unwrap().amount_cents, 700);
    assert_eq!(reader.find::<Voucher>(|_| true).unwrap().len(), 2);
}
