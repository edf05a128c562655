use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, Method, Request, StatusCode};
use axum::Json;
use chrono::Utc;
use institute_core::api::{
    CreateSystemUserRequest, FeesInput, ListQuery, LoginRequest, LogoRequest, NumberInput, OneOrMany,
    OtpRequest, ResetPasswordRequest, StudentInput, SubjectInput, YearQuery,
};
use institute_daemon::api::{self, ApiError, AppState};
use institute_core::model::SystemUser;
use institute_core::new_id;
use institute_daemon::auth::{hash_password, verify_token};
use institute_daemon::backup::Orchestrator;
use institute_daemon::config::{AuthConfig, BackupConfig, DaemonConfig, MailConfig};
use institute_daemon::db::Db;
use institute_daemon::mailer::{Mailer, OutgoingMail};
use serde_json::{json, Value};
use tower::ServiceExt;

#[derive(Default)]
struct Outbox {
    sent: Mutex<Vec<OutgoingMail>>,
}

impl Outbox {
    /// The six-digit code in the newest mail.
    fn last_code(&self) -> String {
        let sent = self.sent.lock().unwrap();
        let text = &sent.last().expect("a mail was sent").text;
        text.split(|c: char| !c.is_ascii_digit())
            .find(|w| w.len() == 6)
            .expect("mail carries a code")
            .to_string()
    }
}

#[async_trait]
impl Mailer for Outbox {
    async fn send(&self, mail: OutgoingMail) -> Result<()> {
        self.sent.lock().unwrap().push(mail);
        Ok(())
    }
}

struct App {
    _tmp: tempfile::TempDir,
    state: AppState,
    outbox: Arc<Outbox>,
}

async fn app() -> App {
    let tmp = tempfile::tempdir().unwrap();
    let db = Db::connect("mem://").await.unwrap();
    db.bootstrap_schema().await.unwrap();

    let config = DaemonConfig {
        listen: "127.0.0.1:0".into(),
        db_url: "mem://".into(),
        backup: BackupConfig::new(tmp.path().to_path_buf()),
        auth: AuthConfig {
            jwt_secret: "test-secret".into(),
            expires_minutes: 0,
            expires_days: 14,
        },
        mail: MailConfig::default(),
    };
    let outbox = Arc::new(Outbox::default());
    let store = Arc::new(db.clone());
    let backup = Arc::new(Orchestrator::new(&config.backup, store.clone(), store, outbox.clone()));
    let state = AppState::new(db, config, outbox.clone(), backup);
    App {
        _tmp: tmp,
        state,
        outbox,
    }
}

fn student_input(aadhaar: &str) -> StudentInput {
    StudentInput {
        sur_name: Some("Patil".into()),
        first_name: Some("Ravi".into()),
        guardian_name: Some("Ramesh".into()),
        mothers_name: Some("Sita".into()),
        subject: Some(OneOrMany::Many(vec!["Maths".into(), "Science".into()])),
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
    }
}

fn fees_input(student_id: &str, paid: f64, date: &str) -> FeesInput {
    FeesInput {
        student_id: Some(student_id.into()),
        admission_date: Some("2024-01-05".into()),
        total_fees: Some(NumberInput::Number(12000.0)),
        total_installments: Some(NumberInput::Text("4".into())),
        instalment_number: Some(NumberInput::Number(1.0)),
        fees_paid: Some(NumberInput::Number(paid)),
        date: Some(date.into()),
    }
}

async fn create_student(state: &AppState, aadhaar: &str) -> String {
    let Json(body) = api::students::create(State(state.clone()), Json(student_input(aadhaar)))
        .await
        .unwrap();
    body["student"]["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn onboarding_login_and_reset() {
    let App { state, outbox, .. } = app().await;

    let Json(status) = api::auth::status(State(state.clone())).await.unwrap();
    assert!(!status.exists);

    let err = api::auth::request_create_otp(State(state.clone()), Json(OtpRequest::default()))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::BadRequest(m) if m == "Email is required"));

    let request = OtpRequest {
        email: Some("Asha@Example.com".into()),
        name: Some("Asha".into()),
    };
    api::auth::request_create_otp(State(state.clone()), Json(request.clone()))
        .await
        .unwrap();
    let code = outbox.last_code();

    let mut create = CreateSystemUserRequest {
        name: Some("Asha".into()),
        email: Some("asha@example.com".into()),
        institute_name: Some("Star Academy".into()),
        password: Some("s3cret".into()),
        otp: Some("000000".into()),
    };
    let err = api::auth::create_owner(State(state.clone()), Json(create.clone()))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::BadRequest(m) if m == "Invalid or expired verification code"));

    create.otp = Some(code);
    let (code, Json(body)) = api::auth::create_owner(State(state.clone()), Json(create))
        .await
        .unwrap();
    assert_eq!(code, StatusCode::CREATED);
    assert_eq!(body["user"]["email"], "asha@example.com");
    assert!(body["user"].get("password").is_none());

    let err = api::auth::request_create_otp(State(state.clone()), Json(request))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Conflict(_)));

    let login = |password: &str| LoginRequest {
        email: Some("ASHA@example.com".into()),
        password: Some(password.into()),
    };
    let err = api::auth::login(State(state.clone()), Json(login("wrong")))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Unauthorized(m) if m == "Email or password is not matched"));

    let Json(session) = api::auth::login(State(state.clone()), Json(login("s3cret")))
        .await
        .unwrap();
    let claims = verify_token(&state.config.auth, &session.token).unwrap();
    assert_eq!(claims.email, "asha@example.com");
    assert!(session.expires_at.ends_with('Z'));

    let err = api::auth::request_reset_otp(
        State(state.clone()),
        Json(OtpRequest {
            email: Some("other@example.com".into()),
            name: None,
        }),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ApiError::BadRequest(m) if m == "Email does not match system user"));

    api::auth::request_reset_otp(
        State(state.clone()),
        Json(OtpRequest {
            email: Some("asha@example.com".into()),
            name: None,
        }),
    )
    .await
    .unwrap();
    let reset = ResetPasswordRequest {
        email: Some("asha@example.com".into()),
        otp: Some(outbox.last_code()),
        new_password: Some("n3w".into()),
    };
    api::auth::reset_password(State(state.clone()), Json(reset.clone()))
        .await
        .unwrap();
    // Codes are single use.
    assert!(api::auth::reset_password(State(state.clone()), Json(reset)).await.is_err());

    api::auth::login(State(state.clone()), Json(login("n3w"))).await.unwrap();
}

#[tokio::test]
async fn login_without_owner_is_not_found() {
    let App { state, .. } = app().await;
    let err = api::auth::login(
        State(state),
        Json(LoginRequest {
            email: Some("a@b.co".into()),
            password: Some("x".into()),
        }),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));
}

#[tokio::test]
async fn logo_requires_owner_and_valid_data_url() {
    let App { state, .. } = app().await;
    let logo = LogoRequest {
        logo: Some("data:image/png;base64,aGk=".into()),
    };
    let err = api::auth::set_logo(State(state.clone()), Json(logo)).await.unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));

    let err = api::auth::set_logo(State(state), Json(LogoRequest::default()))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::BadRequest(m) if m == "Logo is required"));
}

#[tokio::test]
async fn student_create_rejects_duplicates_and_bad_fields() {
    let App { state, .. } = app().await;
    let id = create_student(&state, "123456789012").await;

    let err = api::students::create(State(state.clone()), Json(student_input("123456789012")))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Conflict(m) if m == "Aadhaar number already exists"));

    let mut bad = student_input("12345");
    bad.first_name = Some("R4vi".into());
    let Err(ApiError::Validation(v)) = api::students::create(State(state.clone()), Json(bad)).await else {
        panic!("expected validation errors");
    };
    assert!(v.has("aadhaarNumber"));
    assert!(v.has("firstName"));

    let patch = StudentInput {
        first_name: Some("Ravindra".into()),
        ..StudentInput::default()
    };
    let Json(body) = api::students::update(State(state.clone()), Path(id.clone()), Json(patch))
        .await
        .unwrap();
    assert_eq!(body["student"]["name"], "Ravindra Patil");

    let Json(list) = api::students::list(State(state.clone()), Query(ListQuery::default()))
        .await
        .unwrap();
    assert_eq!(list["total"], 1);
    assert_eq!(list["page"], 1);
    assert_eq!(list["limit"], 10);

    api::students::remove(State(state.clone()), Path(id.clone())).await.unwrap();
    let err = api::students::get_one(State(state), Path(id)).await.unwrap_err();
    assert!(matches!(err, ApiError::NotFound(m) if m == "Student not found"));
}

#[tokio::test]
async fn subject_names_are_unique() {
    let App { state, .. } = app().await;
    let input = |name: &str| SubjectInput {
        subject_name: Some(name.into()),
    };
    api::subjects::create(State(state.clone()), Json(input("Maths"))).await.unwrap();
    let err = api::subjects::create(State(state.clone()), Json(input("maths")))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Conflict(_)));
    let err = api::subjects::create(State(state), Json(input("  ")))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::BadRequest(m) if m == "subjectName is required"));
}

#[tokio::test]
async fn fees_flow_with_summaries() {
    let App { state, .. } = app().await;

    let err = api::fees::create(State(state.clone()), Json(fees_input("missing", 3000.0, "2024-02-01")))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::NotFound(m) if m == "Student not found"));

    let sid = create_student(&state, "123456789012").await;
    let Json(first) = api::fees::create(State(state.clone()), Json(fees_input(&sid, 3000.0, "2024-02-01")))
        .await
        .unwrap();
    assert_eq!(first["fees"]["monthlyInstallments"], 3000.0);
    assert_eq!(first["fees"]["selectedStudent"]["name"], "Ravi Patil");

    let mut second = fees_input(&sid, 2500.0, "2024-03-01");
    second.instalment_number = Some(NumberInput::Number(2.0));
    api::fees::create(State(state.clone()), Json(second)).await.unwrap();

    let Json(last) = api::fees::last_for_student(State(state.clone()), Path(sid.clone()))
        .await
        .unwrap();
    assert_eq!(last["fees"]["instalmentNumber"], 2);

    let Json(summary) = api::fees::summary_by_student(State(state.clone())).await.unwrap();
    let row = &summary["data"][0];
    assert_eq!(row["name"], "Patil Ravi Ramesh");
    assert_eq!(row["totalPaid"], 5500.0);
    assert_eq!(row["amountDue"], 6500.0);

    let Json(monthly) = api::fees::monthly_summary(
        State(state.clone()),
        Query(YearQuery {
            year: Some("2024".into()),
        }),
    )
    .await
    .unwrap();
    assert_eq!(monthly["data"].as_array().unwrap().len(), 2);

    let err = api::fees::last_for_student(State(state), Path("nobody".into()))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));
}

#[tokio::test]
async fn manual_backup_without_owner_reports_no_owner() {
    let App { state, .. } = app().await;
    let Json(body) = api::backup::run(State(state.clone())).await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["outcome"]["status"], "no_owner");

    let Json(status) = api::backup::status(State(state)).await.unwrap();
    assert_eq!(status["state"], Value::Null);
    assert_eq!(status["running"], false);
    assert_eq!(status["queued"], 0);
}

/// Sends one request through the full `/api` router.
async fn call(
    state: &AppState,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let req = match body {
        Some(body) => req
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())),
        None => req.body(Body::empty()),
    }
    .unwrap();

    let resp = api::router(state.clone()).oneshot(req).await.unwrap();
    let code = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (code, body)
}

#[tokio::test]
async fn router_guards_data_routes_with_a_session() {
    let App { state, .. } = app().await;
    let guarded = ["/api/students", "/api/fees/summary/by-student", "/api/backup/status"];

    for uri in guarded {
        let (code, body) = call(&state, Method::GET, uri, None, None).await;
        assert_eq!(code, StatusCode::UNAUTHORIZED, "{uri}");
        assert_eq!(body, json!({ "success": false, "message": "Unauthorized" }));

        let (code, body) = call(&state, Method::GET, uri, Some("junk"), None).await;
        assert_eq!(code, StatusCode::UNAUTHORIZED, "{uri}");
        assert_eq!(body["message"], "Session expired or invalid");
    }

    let (code, body) = call(&state, Method::GET, "/api/auth/system-user", None, None).await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(body["exists"], false);

    let now = Utc::now();
    let owner = SystemUser {
        id: new_id(),
        name: "Asha".into(),
        email: "asha@example.com".into(),
        institute_name: "Star Academy".into(),
        password: hash_password("s3cret".into()).await.unwrap(),
        institute_logo: String::new(),
        created_at: now,
        updated_at: now,
    };
    state.db.create_owner(&owner).await.unwrap();

    let (code, body) = call(
        &state,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({ "email": "asha@example.com", "password": "s3cret" })),
    )
    .await;
    assert_eq!(code, StatusCode::OK);
    let token = body["token"].as_str().unwrap().to_string();

    for uri in guarded {
        let (code, body) = call(&state, Method::GET, uri, Some(&token), None).await;
        assert_eq!(code, StatusCode::OK, "{uri}");
        assert_eq!(body["success"], true, "{uri}");
    }
}
