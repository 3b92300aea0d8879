mod common;

use common::{seed_user, setup_test_db};
use mrp_core::{
    entities::AttendanceStatus,
    services::{AttendanceService, StandardWorkPolicy},
    ServiceError,
};
use chrono::{NaiveDate, TimeZone, Utc};
use rust_decimal_macros::dec;
use std::sync::Arc;

fn service(db: Arc<mrp_core::db::DbPool>) -> AttendanceService {
    AttendanceService::new(db, Arc::new(StandardWorkPolicy::default()))
}

#[tokio::test]
async fn check_out_fills_hours_from_the_work_policy() {
    let db = setup_test_db().await;
    let attendance = service(db.clone());
    let worker = seed_user(&db, "agus").await;

    let check_in = Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap();
    let record = attendance
        .check_in(worker.id, check_in, AttendanceStatus::Present, None)
        .await
        .unwrap();
    assert_eq!(record.attendance_date, check_in.date_naive());
    assert_eq!(record.working_hours, None);

    let check_out = Utc.with_ymd_and_hms(2024, 3, 4, 19, 30, 0).unwrap();
    let record = attendance.check_out(worker.id, check_out).await.unwrap();
    // 10.5 hours gross, minus the hour break: 8 regular + 1.5 overtime.
    assert_eq!(record.working_hours, Some(dec!(8)));
    assert_eq!(record.overtime_hours, Some(dec!(1.5)));
}

#[tokio::test]
async fn double_check_in_and_double_check_out_are_rejected() {
    let db = setup_test_db().await;
    let attendance = service(db.clone());
    let worker = seed_user(&db, "rina").await;

    let morning = Utc.with_ymd_and_hms(2024, 3, 5, 8, 0, 0).unwrap();
    attendance
        .check_in(worker.id, morning, AttendanceStatus::Present, None)
        .await
        .unwrap();
    let err = attendance
        .check_in(worker.id, morning, AttendanceStatus::Present, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidOperation(_)));

    let evening = Utc.with_ymd_and_hms(2024, 3, 5, 17, 0, 0).unwrap();
    attendance.check_out(worker.id, evening).await.unwrap();
    let err = attendance.check_out(worker.id, evening).await.unwrap_err();
    assert!(matches!(err, ServiceError::InvalidOperation(_)));
}

#[tokio::test]
async fn check_out_requires_a_matching_day() {
    let db = setup_test_db().await;
    let attendance = service(db.clone());
    let worker = seed_user(&db, "tono").await;

    let err = attendance
        .check_out(worker.id, Utc.with_ymd_and_hms(2024, 3, 6, 17, 0, 0).unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
}

#[tokio::test]
async fn records_are_listed_per_user_and_range() {
    let db = setup_test_db().await;
    let attendance = service(db.clone());
    let worker = seed_user(&db, "dewi").await;
    let colleague = seed_user(&db, "eko").await;

    for day in 4..=6u32 {
        let ts = Utc.with_ymd_and_hms(2024, 3, day, 9, 0, 0).unwrap();
        attendance
            .check_in(worker.id, ts, AttendanceStatus::Present, None)
            .await
            .unwrap();
    }
    attendance
        .check_in(
            colleague.id,
            Utc.with_ymd_and_hms(2024, 3, 5, 9, 0, 0).unwrap(),
            AttendanceStatus::Late,
            Some("traffic".into()),
        )
        .await
        .unwrap();

    let records = attendance
        .records_for_user(
            worker.id,
            NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 5).unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.user_id == worker.id));
}
