use std::sync::{Arc, Barrier};
use std::thread;

use assert_matches::assert_matches;
use chrono::{DateTime, Duration, Timelike, Utc};
use rusqlite::params;
use uuid::Uuid;

use shared_database::{encode_ts, ClinicDb, DatabaseError};
use slot_cell::models::{
    CreateSlotRequest, Modality, SlotError, SlotStatus, UpdateSlotRequest,
};
use slot_cell::services::store::{set_slot_status, SlotStoreService};

fn test_db() -> Arc<ClinicDb> {
    Arc::new(ClinicDb::open_in_memory().unwrap())
}

fn seed_provider(db: &ClinicDb) -> Uuid {
    let id = Uuid::new_v4();
    db.transaction::<_, DatabaseError>(|tx| {
        tx.execute(
            "INSERT INTO providers (id, full_name, specialty, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![id.to_string(), "Dr. Test", "General Practice", encode_ts(Utc::now())],
        )?;
        Ok(())
    })
    .unwrap();
    id
}

/// A morning one week from now, aligned to the hour so offsets are readable.
fn base_time() -> DateTime<Utc> {
    (Utc::now() + Duration::days(7))
        .with_minute(0)
        .unwrap()
        .with_second(0)
        .unwrap()
        .with_nanosecond(0)
        .unwrap()
}

fn create_request(provider_id: Uuid, start: DateTime<Utc>, end: DateTime<Utc>) -> CreateSlotRequest {
    CreateSlotRequest {
        provider_id,
        start_time: start,
        end_time: end,
        modality: Modality::InPerson,
        status: None,
    }
}

#[test]
fn create_and_list_slots() {
    let db = test_db();
    let provider = seed_provider(&db);
    let service = SlotStoreService::new(db);

    let start = base_time();
    let slot = service
        .create_slot(create_request(provider, start, start + Duration::minutes(45)))
        .unwrap();
    assert_eq!(slot.status, SlotStatus::Available);

    service
        .create_slot(create_request(
            provider,
            start + Duration::hours(2),
            start + Duration::hours(2) + Duration::minutes(45),
        ))
        .unwrap();

    let slots = service.list_slots(provider, None).unwrap();
    assert_eq!(slots.len(), 2);
    assert!(slots[0].start_time < slots[1].start_time);

    let on_day = service
        .list_slots(provider, Some(start.date_naive()))
        .unwrap();
    assert_eq!(on_day.len(), 2);
    let other_day = service
        .list_slots(provider, Some(start.date_naive() + Duration::days(3)))
        .unwrap();
    assert!(other_day.is_empty());
}

#[test]
fn overlapping_slot_rejected() {
    let db = test_db();
    let provider = seed_provider(&db);
    let service = SlotStoreService::new(db);

    let start = base_time();
    service
        .create_slot(create_request(provider, start, start + Duration::minutes(45)))
        .unwrap();

    // Partial intersection from either side.
    let result = service.create_slot(create_request(
        provider,
        start + Duration::minutes(30),
        start + Duration::minutes(75),
    ));
    assert_matches!(result, Err(SlotError::Overlap));

    let result = service.create_slot(create_request(
        provider,
        start - Duration::minutes(15),
        start + Duration::minutes(15),
    ));
    assert_matches!(result, Err(SlotError::Overlap));

    // Containment.
    let result = service.create_slot(create_request(
        provider,
        start + Duration::minutes(10),
        start + Duration::minutes(20),
    ));
    assert_matches!(result, Err(SlotError::Overlap));
}

#[test]
fn back_to_back_slots_are_legal() {
    let db = test_db();
    let provider = seed_provider(&db);
    let service = SlotStoreService::new(db);

    let start = base_time();
    service
        .create_slot(create_request(provider, start, start + Duration::minutes(45)))
        .unwrap();

    // [start, end) is half-open: a slot starting exactly at the previous end
    // does not intersect.
    let result = service.create_slot(create_request(
        provider,
        start + Duration::minutes(45),
        start + Duration::minutes(90),
    ));
    assert!(result.is_ok());
}

#[test]
fn other_providers_do_not_collide() {
    let db = test_db();
    let provider_a = seed_provider(&db);
    let provider_b = seed_provider(&db);
    let service = SlotStoreService::new(db);

    let start = base_time();
    service
        .create_slot(create_request(provider_a, start, start + Duration::minutes(45)))
        .unwrap();
    let result =
        service.create_slot(create_request(provider_b, start, start + Duration::minutes(45)));
    assert!(result.is_ok());
}

#[test]
fn invalid_range_rejected() {
    let db = test_db();
    let provider = seed_provider(&db);
    let service = SlotStoreService::new(db);

    let start = base_time();
    let result = service.create_slot(create_request(provider, start, start));
    assert_matches!(result, Err(SlotError::InvalidRange(_)));

    let result =
        service.create_slot(create_request(provider, start, start - Duration::minutes(30)));
    assert_matches!(result, Err(SlotError::InvalidRange(_)));
}

#[test]
fn past_start_rejected() {
    let db = test_db();
    let provider = seed_provider(&db);
    let service = SlotStoreService::new(db);

    let start = Utc::now() - Duration::hours(2);
    let result = service.create_slot(create_request(provider, start, start + Duration::hours(1)));
    assert_matches!(result, Err(SlotError::InvalidRange(_)));
}

#[test]
fn unknown_provider_rejected() {
    let db = test_db();
    let service = SlotStoreService::new(db);

    let start = base_time();
    let result = service.create_slot(create_request(
        Uuid::new_v4(),
        start,
        start + Duration::minutes(45),
    ));
    assert_matches!(result, Err(SlotError::ProviderNotFound));
}

#[test]
fn creating_occupied_slot_rejected() {
    let db = test_db();
    let provider = seed_provider(&db);
    let service = SlotStoreService::new(db);

    let start = base_time();
    let mut request = create_request(provider, start, start + Duration::minutes(45));
    request.status = Some(SlotStatus::Occupied);
    assert_matches!(service.create_slot(request), Err(SlotError::Validation(_)));
}

#[test]
fn blocked_window_still_collides() {
    let db = test_db();
    let provider = seed_provider(&db);
    let service = SlotStoreService::new(db);

    let start = base_time();
    let mut request = create_request(provider, start, start + Duration::minutes(30));
    request.status = Some(SlotStatus::Blocked);
    service.create_slot(request).unwrap();

    let result =
        service.create_slot(create_request(provider, start, start + Duration::minutes(30)));
    assert_matches!(result, Err(SlotError::Overlap));
}

#[test]
fn occupied_slot_cannot_be_edited_or_deleted() {
    let db = test_db();
    let provider = seed_provider(&db);
    let service = SlotStoreService::new(db.clone());

    let start = base_time();
    let slot = service
        .create_slot(create_request(provider, start, start + Duration::minutes(45)))
        .unwrap();

    db.transaction::<_, DatabaseError>(|tx| set_slot_status(tx, slot.id, SlotStatus::Occupied))
        .unwrap();

    let result = service.update_slot(
        slot.id,
        UpdateSlotRequest {
            status: Some(SlotStatus::Blocked),
            ..Default::default()
        },
    );
    assert_matches!(result, Err(SlotError::Conflict));

    assert_matches!(service.delete_slot(slot.id), Err(SlotError::Conflict));
}

#[test]
fn update_rechecks_overlap_when_times_move() {
    let db = test_db();
    let provider = seed_provider(&db);
    let service = SlotStoreService::new(db);

    let start = base_time();
    service
        .create_slot(create_request(provider, start, start + Duration::minutes(45)))
        .unwrap();
    let second = service
        .create_slot(create_request(
            provider,
            start + Duration::hours(2),
            start + Duration::hours(2) + Duration::minutes(45),
        ))
        .unwrap();

    let result = service.update_slot(
        second.id,
        UpdateSlotRequest {
            start_time: Some(start + Duration::minutes(30)),
            end_time: Some(start + Duration::minutes(75)),
            ..Default::default()
        },
    );
    assert_matches!(result, Err(SlotError::Overlap));

    // Moving to a free window succeeds.
    let moved = service
        .update_slot(
            second.id,
            UpdateSlotRequest {
                start_time: Some(start + Duration::hours(3)),
                end_time: Some(start + Duration::hours(3) + Duration::minutes(45)),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(moved.start_time, start + Duration::hours(3));
}

#[test]
fn available_and_blocked_toggle() {
    let db = test_db();
    let provider = seed_provider(&db);
    let service = SlotStoreService::new(db);

    let start = base_time();
    let slot = service
        .create_slot(create_request(provider, start, start + Duration::minutes(45)))
        .unwrap();

    let blocked = service
        .update_slot(
            slot.id,
            UpdateSlotRequest {
                status: Some(SlotStatus::Blocked),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(blocked.status, SlotStatus::Blocked);

    let available = service
        .update_slot(
            slot.id,
            UpdateSlotRequest {
                status: Some(SlotStatus::Available),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(available.status, SlotStatus::Available);
}

#[test]
fn concurrent_overlapping_creates_admit_exactly_one() {
    let db = test_db();
    let provider = seed_provider(&db);
    let start = base_time();

    let attempts = 8;
    let barrier = Arc::new(Barrier::new(attempts));

    let handles: Vec<_> = (0..attempts)
        .map(|_| {
            let db = db.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                SlotStoreService::new(db).create_slot(create_request(
                    provider,
                    start,
                    start + Duration::minutes(45),
                ))
            })
        })
        .collect();

    let mut winners = 0;
    let mut losers = 0;
    for handle in handles {
        match handle.join().unwrap() {
            Ok(_) => winners += 1,
            Err(SlotError::Overlap) => losers += 1,
            Err(e) => panic!("unexpected create error: {e}"),
        }
    }
    assert_eq!(winners, 1);
    assert_eq!(losers, attempts - 1);

    let slots = SlotStoreService::new(db).list_slots(provider, None).unwrap();
    assert_eq!(slots.len(), 1);
}

#[test]
fn delete_missing_slot_not_found() {
    let db = test_db();
    let service = SlotStoreService::new(db);
    assert_matches!(service.delete_slot(Uuid::new_v4()), Err(SlotError::NotFound));
}
