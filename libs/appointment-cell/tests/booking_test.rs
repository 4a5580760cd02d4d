use std::sync::{Arc, Barrier};
use std::thread;

use assert_matches::assert_matches;
use chrono::{DateTime, Duration, Timelike, Utc};
use rusqlite::params;
use uuid::Uuid;

use appointment_cell::models::{
    AppointmentError, AppointmentSearchQuery, AppointmentStatus, BookSlotRequest,
};
use appointment_cell::services::booking::BookingService;
use appointment_cell::services::lifecycle::AppointmentLifecycleService;
use shared_database::{encode_ts, ClinicDb, DatabaseError};
use shared_models::auth::ActorRole;
use shared_utils::test_utils::TestActor;
use slot_cell::models::{CreateSlotRequest, Modality, Slot, SlotStatus};
use slot_cell::services::store::SlotStoreService;

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

fn seed_patient(db: &ClinicDb) -> Uuid {
    let id = Uuid::new_v4();
    db.transaction::<_, DatabaseError>(|tx| {
        tx.execute(
            "INSERT INTO patients (id, full_name, created_at) VALUES (?1, ?2, ?3)",
            params![id.to_string(), "Pat Test", encode_ts(Utc::now())],
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

fn make_slot(db: &Arc<ClinicDb>, provider_id: Uuid) -> Slot {
    let start = base_time();
    SlotStoreService::new(db.clone())
        .create_slot(CreateSlotRequest {
            provider_id,
            start_time: start,
            end_time: start + Duration::minutes(45),
            modality: Modality::InPerson,
            status: None,
        })
        .unwrap()
}

fn book_request(patient_id: Uuid, slot_id: Uuid) -> BookSlotRequest {
    BookSlotRequest {
        patient_id,
        slot_id,
        reason: Some("Follow-up".to_string()),
        confirm: false,
    }
}

#[test]
fn booking_creates_pending_appointment_and_occupies_slot() {
    let db = test_db();
    let provider = seed_provider(&db);
    let patient = seed_patient(&db);
    let slot = make_slot(&db, provider);

    let service = BookingService::new(db.clone());
    let appointment = service.book_slot(book_request(patient, slot.id)).unwrap();

    assert_eq!(appointment.status, AppointmentStatus::Pending);
    assert_eq!(appointment.patient_id, patient);
    assert_eq!(appointment.provider_id, provider);
    assert_eq!(appointment.start_time, slot.start_time);
    assert_eq!(appointment.end_time, slot.end_time);
    assert_eq!(appointment.reason.as_deref(), Some("Follow-up"));

    let slot_after = SlotStoreService::new(db).get_slot(slot.id).unwrap();
    assert_eq!(slot_after.status, SlotStatus::Occupied);
}

#[test]
fn confirm_flag_books_confirmed() {
    let db = test_db();
    let provider = seed_provider(&db);
    let patient = seed_patient(&db);
    let slot = make_slot(&db, provider);

    let appointment = BookingService::new(db)
        .book_slot(BookSlotRequest {
            patient_id: patient,
            slot_id: slot.id,
            reason: None,
            confirm: true,
        })
        .unwrap();

    assert_eq!(appointment.status, AppointmentStatus::Confirmed);
}

#[test]
fn second_booking_of_same_slot_is_rejected() {
    let db = test_db();
    let provider = seed_provider(&db);
    let first = seed_patient(&db);
    let second = seed_patient(&db);
    let slot = make_slot(&db, provider);

    let service = BookingService::new(db);
    service.book_slot(book_request(first, slot.id)).unwrap();

    assert_matches!(
        service.book_slot(book_request(second, slot.id)),
        Err(AppointmentError::SlotUnavailable)
    );
}

#[test]
fn blocked_slot_cannot_be_booked() {
    let db = test_db();
    let provider = seed_provider(&db);
    let patient = seed_patient(&db);
    let start = base_time();
    let slot = SlotStoreService::new(db.clone())
        .create_slot(CreateSlotRequest {
            provider_id: provider,
            start_time: start,
            end_time: start + Duration::minutes(45),
            modality: Modality::InPerson,
            status: Some(SlotStatus::Blocked),
        })
        .unwrap();

    assert_matches!(
        BookingService::new(db).book_slot(book_request(patient, slot.id)),
        Err(AppointmentError::SlotUnavailable)
    );
}

#[test]
fn unknown_patient_and_slot_are_not_found() {
    let db = test_db();
    let provider = seed_provider(&db);
    let patient = seed_patient(&db);
    let slot = make_slot(&db, provider);

    let service = BookingService::new(db);
    assert_matches!(
        service.book_slot(book_request(Uuid::new_v4(), slot.id)),
        Err(AppointmentError::PatientNotFound)
    );
    assert_matches!(
        service.book_slot(book_request(patient, Uuid::new_v4())),
        Err(AppointmentError::SlotNotFound)
    );
}

#[test]
fn concurrent_booking_admits_exactly_one() {
    let db = test_db();
    let provider = seed_provider(&db);
    let slot = make_slot(&db, provider);

    let attempts = 8;
    let patients: Vec<Uuid> = (0..attempts).map(|_| seed_patient(&db)).collect();
    let barrier = Arc::new(Barrier::new(attempts));

    let handles: Vec<_> = patients
        .into_iter()
        .map(|patient| {
            let db = db.clone();
            let barrier = barrier.clone();
            let slot_id = slot.id;
            thread::spawn(move || {
                barrier.wait();
                BookingService::new(db).book_slot(book_request(patient, slot_id))
            })
        })
        .collect();

    let mut winners = 0;
    let mut losers = 0;
    for handle in handles {
        match handle.join().unwrap() {
            Ok(_) => winners += 1,
            Err(AppointmentError::SlotUnavailable) => losers += 1,
            Err(e) => panic!("unexpected booking error: {e}"),
        }
    }
    assert_eq!(winners, 1);
    assert_eq!(losers, attempts - 1);

    let slot_after = SlotStoreService::new(db).get_slot(slot.id).unwrap();
    assert_eq!(slot_after.status, SlotStatus::Occupied);
}

#[test]
fn cancel_releases_slot_for_rebooking() {
    let db = test_db();
    let provider = seed_provider(&db);
    let patient = seed_patient(&db);
    let slot = make_slot(&db, provider);

    let service = BookingService::new(db.clone());
    let appointment = service.book_slot(book_request(patient, slot.id)).unwrap();

    let actor = TestActor::with_id(patient, ActorRole::Patient).to_actor();
    let cancelled = service
        .cancel_appointment(appointment.id, &actor, Some("Feeling better".to_string()))
        .unwrap();
    assert_eq!(cancelled.status, AppointmentStatus::Cancelled);
    assert!(cancelled.notes.unwrap().contains("Feeling better"));

    let slot_after = SlotStoreService::new(db.clone()).get_slot(slot.id).unwrap();
    assert_eq!(slot_after.status, SlotStatus::Available);

    // The released window is bookable again.
    let other = seed_patient(&db);
    service.book_slot(book_request(other, slot.id)).unwrap();
}

#[test]
fn double_cancel_reports_already_cancelled() {
    let db = test_db();
    let provider = seed_provider(&db);
    let patient = seed_patient(&db);
    let slot = make_slot(&db, provider);

    let service = BookingService::new(db);
    let appointment = service.book_slot(book_request(patient, slot.id)).unwrap();

    let actor = TestActor::with_id(patient, ActorRole::Patient).to_actor();
    service
        .cancel_appointment(appointment.id, &actor, None)
        .unwrap();

    assert_matches!(
        service.cancel_appointment(appointment.id, &actor, None),
        Err(AppointmentError::AlreadyCancelled)
    );
}

#[test]
fn cancel_from_attended_is_illegal() {
    let db = test_db();
    let provider = seed_provider(&db);
    let patient = seed_patient(&db);
    let slot = make_slot(&db, provider);

    let service = BookingService::new(db.clone());
    let appointment = service.book_slot(book_request(patient, slot.id)).unwrap();

    let provider_actor = TestActor::with_id(provider, ActorRole::Provider).to_actor();
    let lifecycle = AppointmentLifecycleService::new(db);
    lifecycle
        .transition(appointment.id, AppointmentStatus::InProgress, &provider_actor)
        .unwrap();
    lifecycle
        .transition(appointment.id, AppointmentStatus::Attended, &provider_actor)
        .unwrap();

    let patient_actor = TestActor::with_id(patient, ActorRole::Patient).to_actor();
    assert_matches!(
        service.cancel_appointment(appointment.id, &patient_actor, None),
        Err(AppointmentError::IllegalTransition {
            from: AppointmentStatus::Attended,
            to: AppointmentStatus::Cancelled,
        })
    );
}

#[test]
fn unrelated_patient_cannot_cancel() {
    let db = test_db();
    let provider = seed_provider(&db);
    let patient = seed_patient(&db);
    let stranger = seed_patient(&db);
    let slot = make_slot(&db, provider);

    let service = BookingService::new(db);
    let appointment = service.book_slot(book_request(patient, slot.id)).unwrap();

    let actor = TestActor::with_id(stranger, ActorRole::Patient).to_actor();
    assert_matches!(
        service.cancel_appointment(appointment.id, &actor, None),
        Err(AppointmentError::Forbidden)
    );
}

#[test]
fn search_filters_by_patient_and_status() {
    let db = test_db();
    let provider = seed_provider(&db);
    let patient = seed_patient(&db);
    let other = seed_patient(&db);

    let start = base_time();
    let slots = SlotStoreService::new(db.clone());
    let morning = slots
        .create_slot(CreateSlotRequest {
            provider_id: provider,
            start_time: start,
            end_time: start + Duration::minutes(30),
            modality: Modality::InPerson,
            status: None,
        })
        .unwrap();
    let afternoon = slots
        .create_slot(CreateSlotRequest {
            provider_id: provider,
            start_time: start + Duration::hours(4),
            end_time: start + Duration::hours(4) + Duration::minutes(30),
            modality: Modality::Teleconsult,
            status: None,
        })
        .unwrap();

    let service = BookingService::new(db);
    let first = service.book_slot(book_request(patient, morning.id)).unwrap();
    service.book_slot(book_request(other, afternoon.id)).unwrap();

    let actor = TestActor::with_id(patient, ActorRole::Patient).to_actor();
    service
        .cancel_appointment(first.id, &actor, None)
        .unwrap();

    let mine = service
        .search_appointments(&AppointmentSearchQuery {
            patient_id: Some(patient),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].id, first.id);

    let cancelled = service
        .search_appointments(&AppointmentSearchQuery {
            provider_id: Some(provider),
            status: Some(AppointmentStatus::Cancelled),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(cancelled.len(), 1);

    let all_for_provider = service
        .search_appointments(&AppointmentSearchQuery {
            provider_id: Some(provider),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(all_for_provider.len(), 2);
    // Most recent start time first.
    assert!(all_for_provider[0].start_time >= all_for_provider[1].start_time);
}
