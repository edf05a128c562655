//! Integration tests for the core crate.

use chrono::{FixedOffset, TimeZone, Utc};
use institute_core::api::{ListQuery, NumberInput, OneOrMany, StudentInput};
use institute_core::backup::{
    backup_stamp, month_key, sanitize_file_name, ArtifactNames, BackupReason, BackupState,
    MonthlySchedule,
};
use institute_core::model::{monthly_installment, Gender, OtpPurpose};

#[test]
fn test_artifact_names() {
    let at = FixedOffset::east_opt(5 * 3600 + 1800)
        .unwrap()
        .with_ymd_and_hms(2024, 3, 1, 0, 5, 0)
        .unwrap();
    let names = ArtifactNames::new("A/B:C", &backup_stamp(&at));
    assert_eq!(names.base, "A_B_C_backup_01.03.2024 00.05");
    assert_eq!(names.workbook, "A_B_C_backup_01.03.2024 00.05.xlsx");
    assert_eq!(names.archive, "A_B_C_backup_01.03.2024 00.05.zip");
    assert_eq!(month_key(&at), "2024-03");
}

#[test]
fn test_sanitize_file_name() {
    assert_eq!(sanitize_file_name("   "), "institute");
    assert_eq!(sanitize_file_name("  Star Academy "), "Star Academy");
    assert_eq!(sanitize_file_name(r#"<>:"/\|?*"#), "_________");
}

#[test]
fn test_backup_state_serde() {
    let at = Utc.with_ymd_and_hms(2024, 3, 1, 0, 5, 0).unwrap();
    let state = BackupState::completed(at, "2024-03".into(), BackupReason::Startup);
    let serialized = serde_json::to_string(&state).unwrap();
    assert_eq!(
        serialized,
        r#"{"lastBackupAt":"2024-03-01T00:05:00.000Z","lastBackupMonth":"2024-03","reason":"startup"}"#
    );
    let deserialized: BackupState = serde_json::from_str(&serialized).unwrap();
    assert_eq!(deserialized, state);
    assert_eq!(serde_json::to_string(&BackupState::default()).unwrap(), "{}");
}

#[test]
fn test_schedule_next_after() {
    let schedule = MonthlySchedule::default();
    let before = Utc.with_ymd_and_hms(2024, 3, 1, 0, 4, 0).unwrap();
    assert_eq!(
        schedule.next_after(&before),
        Some(Utc.with_ymd_and_hms(2024, 3, 1, 0, 5, 0).unwrap())
    );
    let exactly = Utc.with_ymd_and_hms(2024, 3, 1, 0, 5, 0).unwrap();
    assert_eq!(
        schedule.next_after(&exactly),
        Some(Utc.with_ymd_and_hms(2024, 4, 1, 0, 5, 0).unwrap())
    );
    let december = Utc.with_ymd_and_hms(2024, 12, 20, 8, 0, 0).unwrap();
    assert_eq!(
        schedule.next_after(&december),
        Some(Utc.with_ymd_and_hms(2025, 1, 1, 0, 5, 0).unwrap())
    );
}

#[test]
fn test_schedule_skips_short_months() {
    let schedule = MonthlySchedule {
        day: 31,
        hour: 12,
        minute: 0,
    };
    let april = Utc.with_ymd_and_hms(2024, 4, 2, 0, 0, 0).unwrap();
    assert_eq!(
        schedule.next_after(&april),
        Some(Utc.with_ymd_and_hms(2024, 5, 31, 12, 0, 0).unwrap())
    );
    let invalid = MonthlySchedule {
        day: 32,
        hour: 0,
        minute: 0,
    };
    assert_eq!(invalid.next_after(&april), None);
}

#[test]
fn test_list_query_defaults() {
    let q = ListQuery::default();
    assert_eq!((q.page(), q.limit(), q.offset()), (1, 10, 0));
    let q = ListQuery {
        page: Some("3".into()),
        limit: Some("abc".into()),
        search: Some("  riya ".into()),
    };
    assert_eq!((q.page(), q.limit(), q.offset()), (3, 10, 20));
    assert_eq!(q.search(), Some("riya"));
}

#[test]
fn test_payload_shapes() {
    let input: StudentInput =
        serde_json::from_str(r#"{"firstName":"Riya","subject":"Maths"}"#).unwrap();
    assert_eq!(input.first_name.as_deref(), Some("Riya"));
    assert_eq!(input.subject, Some(OneOrMany::One("Maths".into())));

    let n: NumberInput = serde_json::from_str(r#""12.5""#).unwrap();
    assert_eq!(n.as_f64(), Some(12.5));
    let n: NumberInput = serde_json::from_str("7").unwrap();
    assert_eq!(n.as_f64(), Some(7.0));
}

#[test]
fn test_enum_serde() {
    assert_eq!(serde_json::to_string(&Gender::Other).unwrap(), r#""Other""#);
    assert_eq!(
        serde_json::to_string(&OtpPurpose::ResetPassword).unwrap(),
        r#""reset_password""#
    );
    assert_eq!(monthly_installment(1000.0, 0), 0.0);
    assert_eq!(monthly_installment(1000.0, 4), 250.0);
}
