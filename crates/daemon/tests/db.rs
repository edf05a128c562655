use chrono::{Duration, TimeZone, Utc};
use institute_core::api::{ListQuery, StudentInput};
use institute_core::model::{OtpPurpose, Student, Subject, SystemUser, SystemUserOtp};
use institute_core::snapshot::Field;
use institute_core::validation::validate_new_student;
use institute_core::new_id;
use institute_daemon::backup::{CollectionSource, OwnerDirectory};
use institute_daemon::db::Db;

async fn db() -> Db {
    let db = Db::connect("mem://").await.unwrap();
    db.bootstrap_schema().await.unwrap();
    db
}

fn student(first: &str, sur: &str, aadhaar: &str, created_min: i64) -> Student {
    let input = StudentInput {
        sur_name: Some(sur.into()),
        first_name: Some(first.into()),
        guardian_name: Some("Ramesh".into()),
        mothers_name: Some("Sita".into()),
        subject: Some(institute_core::api::OneOrMany::One("Maths".into())),
        address: Some("12 Main Road".into()),
        aadhaar_number: Some(aadhaar.into()),
        mobile_no: Some("9876543210".into()),
        birth_place: Some("Pune".into()),
        date_of_birth: Some("2008-05-14".into()),
        gender: Some("Male".into()),
        handicapped: Some("No".into()),
        latest_education: Some("10th".into()),
        previous_school_name: Some("City School".into()),
        ..StudentInput::default()
    };
    let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(created_min);
    validate_new_student(&input).unwrap().into_student(new_id(), at)
}

fn query(page: &str, limit: &str, search: Option<&str>) -> ListQuery {
    ListQuery {
        page: Some(page.into()),
        limit: Some(limit.into()),
        search: search.map(str::to_string),
    }
}

#[tokio::test]
async fn student_crud_with_soft_delete() {
    let db = db().await;
    let s = student("Ravi", "Patil", "123456789012", 0);
    db.create_student(&s).await.unwrap();

    let loaded = db.get_student(&s.id).await.unwrap().unwrap();
    assert_eq!(loaded, s);
    assert_eq!(loaded.name, "Ravi Patil");

    let mut changed = loaded.clone();
    changed.batch = Some("Morning".into());
    db.save_student(&changed).await.unwrap();
    assert_eq!(
        db.get_student(&s.id).await.unwrap().unwrap().batch.as_deref(),
        Some("Morning")
    );

    assert!(db.delete_student(&s.id).await.unwrap());
    assert!(db.get_student(&s.id).await.unwrap().is_none());
    assert!(!db.delete_student(&s.id).await.unwrap());
    assert!(db.all_students().await.unwrap().is_empty());
}

#[tokio::test]
async fn aadhaar_uniqueness_ignores_self_and_deleted() {
    let db = db().await;
    let s = student("Ravi", "Patil", "123456789012", 0);
    db.create_student(&s).await.unwrap();

    assert!(db.aadhaar_taken("123456789012", None).await.unwrap());
    assert!(!db.aadhaar_taken("123456789012", Some(&s.id)).await.unwrap());
    assert!(!db.aadhaar_taken("999999999999", None).await.unwrap());

    db.delete_student(&s.id).await.unwrap();
    assert!(!db.aadhaar_taken("123456789012", None).await.unwrap());
}

#[tokio::test]
async fn student_pages_are_newest_first_and_searchable() {
    let db = db().await;
    let names = [("Ravi", "Patil"), ("Meena", "Shah"), ("Arjun", "Rao")];
    for (i, (first, sur)) in names.iter().enumerate() {
        let s = student(first, sur, &format!("12345678901{i}"), i as i64);
        db.create_student(&s).await.unwrap();
    }

    let page = db.list_students(&query("1", "2", None)).await.unwrap();
    assert_eq!(page.total, 3);
    assert_eq!((page.page, page.limit), (1, 2));
    let firsts: Vec<_> = page.data.iter().map(|s| s.first_name.as_str()).collect();
    assert_eq!(firsts, ["Arjun", "Meena"]);

    let page = db.list_students(&query("2", "2", None)).await.unwrap();
    assert_eq!(page.data.len(), 1);
    assert_eq!(page.data[0].first_name, "Ravi");

    let page = db.list_students(&query("1", "10", Some("MEENA"))).await.unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.data[0].sur_name, "Shah");

    let page = db.list_students(&query("1", "10", Some("8901"))).await.unwrap();
    assert_eq!(page.total, 3);

    let page = db.list_students(&query("junk", "", None)).await.unwrap();
    assert_eq!((page.page, page.limit), (1, 10));
}

#[tokio::test]
async fn subject_names_clash_case_insensitively() {
    let db = db().await;
    let now = Utc::now();
    let maths = Subject {
        id: new_id(),
        subject_name: "Maths".into(),
        is_deleted: false,
        created_at: now,
        updated_at: now,
    };
    db.create_subject(&maths).await.unwrap();

    assert!(db.subject_name_taken(" maths ", None).await.unwrap());
    assert!(!db.subject_name_taken("MATHS", Some(&maths.id)).await.unwrap());
    assert!(!db.subject_name_taken("Science", None).await.unwrap());

    let page = db.list_subjects(&query("1", "10", Some("mat"))).await.unwrap();
    assert_eq!(page.total, 1);
}

#[tokio::test]
async fn owner_lookup_and_otp_lifecycle() {
    let db = db().await;
    assert!(db.get_owner().await.unwrap().is_none());
    assert!(db.find_owner().await.unwrap().is_none());

    let now = Utc::now();
    let user = SystemUser {
        id: new_id(),
        name: "Asha".into(),
        email: "asha@example.com".into(),
        institute_name: "Star Academy".into(),
        password: "$2b$10$abc".into(),
        institute_logo: String::new(),
        created_at: now,
        updated_at: now,
    };
    db.create_owner(&user).await.unwrap();
    assert_eq!(db.get_owner().await.unwrap().unwrap(), user);
    assert!(db.find_owner_by_email(" ASHA@example.com").await.unwrap().is_some());
    let owner = db.find_owner().await.unwrap().unwrap();
    assert_eq!(owner.institute_name, "Star Academy");

    let otp = |hash: &str, expires: chrono::DateTime<Utc>, created: chrono::DateTime<Utc>| SystemUserOtp {
        id: new_id(),
        email: "asha@example.com".into(),
        otp_hash: hash.into(),
        purpose: OtpPurpose::ResetPassword,
        expires_at: expires,
        created_at: created,
    };
    db.insert_otp(&otp("old", now - Duration::minutes(1), now - Duration::minutes(11)))
        .await
        .unwrap();
    db.insert_otp(&otp("fresh", now + Duration::minutes(9), now - Duration::minutes(1)))
        .await
        .unwrap();

    let purpose = OtpPurpose::ResetPassword;
    assert!(db.find_valid_otp("asha@example.com", purpose, "old", now).await.unwrap().is_none());
    assert!(db.find_valid_otp("asha@example.com", purpose, "fresh", now).await.unwrap().is_some());
    assert!(db
        .find_valid_otp("asha@example.com", OtpPurpose::CreateSystemUser, "fresh", now)
        .await
        .unwrap()
        .is_none());

    db.clear_otps("asha@example.com", purpose).await.unwrap();
    assert!(db.find_valid_otp("asha@example.com", purpose, "fresh", now).await.unwrap().is_none());
}

#[tokio::test]
async fn collection_source_skips_deleted_rows() {
    let db = db().await;
    let kept = student("Ravi", "Patil", "123456789012", 0);
    let gone = student("Meena", "Shah", "123456789013", 1);
    db.create_student(&kept).await.unwrap();
    db.create_student(&gone).await.unwrap();
    db.delete_student(&gone.id).await.unwrap();

    let docs = db.list_active("student").await.unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].get("_id"), Some(&Field::Id(kept.id.clone())));

    assert!(db.list_active("fees").await.unwrap().is_empty());
    assert!(db.list_active("nope").await.is_err());
}
