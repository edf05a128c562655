use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::PublicUser;

/// Default page size for list endpoints.
pub const DEFAULT_LIMIT: u32 = 10;

/// `?page=&limit=&search=` query for list endpoints.
///
/// Values are kept as raw strings so that junk input falls back to defaults
/// instead of rejecting the request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListQuery {
    /// 1-based page, raw.
    #[serde(default)]
    pub page: Option<String>,
    /// Page size, raw.
    #[serde(default)]
    pub limit: Option<String>,
    /// Free-text filter.
    #[serde(default)]
    pub search: Option<String>,
}

impl ListQuery {
    /// 1-based page number.
    pub fn page(&self) -> u32 {
        parse_positive(self.page.as_deref()).unwrap_or(1)
    }

    /// Page size.
    pub fn limit(&self) -> u32 {
        parse_positive(self.limit.as_deref()).unwrap_or(DEFAULT_LIMIT)
    }

    /// Trimmed search term, `None` when blank.
    pub fn search(&self) -> Option<&str> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Number of records to skip.
    pub fn offset(&self) -> u64 {
        u64::from(self.page() - 1) * u64::from(self.limit())
    }
}

fn parse_positive(raw: Option<&str>) -> Option<u32> {
    raw.and_then(|s| s.trim().parse::<u32>().ok()).filter(|n| *n > 0)
}

/// One page of a list endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    /// Records on this page.
    pub data: Vec<T>,
    /// Matching records across all pages.
    pub total: u64,
    /// 1-based page number.
    pub page: u32,
    /// Page size used.
    pub limit: u32,
}

/// A single value or a list, as sent by form-style clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum OneOrMany {
    /// Single value.
    One(String),
    /// List of values.
    Many(Vec<String>),
}

impl OneOrMany {
    /// Non-blank trimmed entries.
    pub fn into_vec(self) -> Vec<String> {
        let items = match self {
            Self::One(s) => vec![s],
            Self::Many(v) => v,
        };
        items
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

/// A number sent either as JSON number or as text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum NumberInput {
    /// JSON number.
    Number(f64),
    /// Numeric text, possibly blank.
    Text(String),
}

impl NumberInput {
    /// Finite numeric value, if any.
    pub fn as_f64(&self) -> Option<f64> {
        let value = match self {
            Self::Number(n) => *n,
            Self::Text(s) => s.trim().parse::<f64>().ok()?,
        };
        value.is_finite().then_some(value)
    }

    /// True for an empty text value.
    pub fn is_blank(&self) -> bool {
        matches!(self, Self::Text(s) if s.trim().is_empty())
    }
}

/// Student create/update payload. Every field is optional on update.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentInput {
    /// Family name.
    #[serde(default)]
    pub sur_name: Option<String>,
    /// Given name.
    #[serde(default)]
    pub first_name: Option<String>,
    /// Father's or guardian's name.
    #[serde(default)]
    pub guardian_name: Option<String>,
    /// Mother's name.
    #[serde(default)]
    pub mothers_name: Option<String>,
    /// One subject name or a list.
    #[serde(default)]
    pub subject: Option<OneOrMany>,
    /// Optional batch label.
    #[serde(default)]
    pub batch: Option<String>,
    /// Postal address.
    #[serde(default)]
    pub address: Option<String>,
    /// 12-digit Aadhaar number.
    #[serde(default)]
    pub aadhaar_number: Option<String>,
    /// 10-digit mobile number.
    #[serde(default)]
    pub mobile_no: Option<String>,
    /// Contact email.
    #[serde(default)]
    pub email: Option<String>,
    /// Place of birth.
    #[serde(default)]
    pub birth_place: Option<String>,
    /// `YYYY-MM-DD`.
    #[serde(default)]
    pub date_of_birth: Option<String>,
    /// `Male`, `Female` or `Other`.
    #[serde(default)]
    pub gender: Option<String>,
    /// `Yes` or `No`.
    #[serde(default)]
    pub handicapped: Option<String>,
    /// Highest education completed.
    #[serde(default)]
    pub latest_education: Option<String>,
    /// Last school attended.
    #[serde(default)]
    pub previous_school_name: Option<String>,
    /// Photo path or URL.
    #[serde(default)]
    pub photo: Option<String>,
}

/// Subject create/update payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectInput {
    /// Subject name; trimmed before use.
    #[serde(default)]
    pub subject_name: Option<String>,
}

/// Fee installment create/update payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeesInput {
    /// Key of the student the installment belongs to.
    #[serde(default)]
    pub student_id: Option<String>,
    /// `YYYY-MM-DD`.
    #[serde(default)]
    pub admission_date: Option<String>,
    /// Whole fee for the course.
    #[serde(default)]
    pub total_fees: Option<NumberInput>,
    /// Number of planned installments.
    #[serde(default)]
    pub total_installments: Option<NumberInput>,
    /// 1-based installment position.
    #[serde(default)]
    pub instalment_number: Option<NumberInput>,
    /// Amount paid in this installment.
    #[serde(default)]
    pub fees_paid: Option<NumberInput>,
    /// Payment date, `YYYY-MM-DD`.
    #[serde(default)]
    pub date: Option<String>,
}

/// `?year=` filter for the monthly collection summary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct YearQuery {
    /// Year to filter on, raw.
    #[serde(default)]
    pub year: Option<String>,
}

impl YearQuery {
    /// Parsed year, `None` when absent or not a number.
    pub fn year(&self) -> Option<i32> {
        self.year.as_deref().and_then(|y| y.trim().parse().ok())
    }
}

/// One row of the per-student fee summary export.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FeesSummaryRow {
    /// Student key.
    pub student_id: String,
    /// Surname, first and guardian name; empty when the student is gone.
    pub name: String,
    /// Current student's subjects.
    pub subjects: Vec<String>,
    /// Largest planned installment count seen.
    pub total_installments: u32,
    /// Largest total fee seen.
    pub total_fees: f64,
    /// Largest per-installment amount seen.
    pub monthly_installments: f64,
    /// Sum of all payments.
    pub total_paid: f64,
    /// `max(0, total_fees - total_paid)`.
    pub amount_due: f64,
    /// Latest payment date.
    pub last_payment_date: Option<DateTime<Utc>>,
}

/// Fees collected in one calendar month.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyTotal {
    /// Calendar year.
    pub year: i32,
    /// Month, 1-12.
    pub month: u32,
    /// Sum of payments in the month.
    pub total_collected: f64,
}

/// `POST /auth/system-user/request-otp`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OtpRequest {
    /// Address the code is sent to.
    #[serde(default)]
    pub email: Option<String>,
    /// Greeting name for the mail.
    #[serde(default)]
    pub name: Option<String>,
}

/// `POST /auth/system-user`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSystemUserRequest {
    /// Owner's name.
    #[serde(default)]
    pub name: Option<String>,
    /// Owner's login address.
    #[serde(default)]
    pub email: Option<String>,
    /// Institute name.
    #[serde(default)]
    pub institute_name: Option<String>,
    /// Plain password.
    #[serde(default)]
    pub password: Option<String>,
    /// Six-digit verification code.
    #[serde(default)]
    pub otp: Option<String>,
}

/// `POST /auth/login`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoginRequest {
    /// Login address; case is ignored.
    #[serde(default)]
    pub email: Option<String>,
    /// Plain password.
    #[serde(default)]
    pub password: Option<String>,
}

/// `POST /auth/system-user/reset-password`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    /// Owner's address.
    #[serde(default)]
    pub email: Option<String>,
    /// Six-digit verification code.
    #[serde(default)]
    pub otp: Option<String>,
    /// Replacement password.
    #[serde(default)]
    pub new_password: Option<String>,
}

/// `PATCH /auth/system-user/logo`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogoRequest {
    /// Image data URL.
    #[serde(default)]
    pub logo: Option<String>,
}

/// `GET /auth/system-user` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemUserStatus {
    /// Always `true` on success.
    pub success: bool,
    /// True once the owner has been created.
    pub exists: bool,
    /// Owner profile, when it exists.
    pub user: Option<PublicUser>,
}

/// `POST /auth/login` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    /// Always `true` on success.
    pub success: bool,
    /// Human-readable result.
    pub message: String,
    /// Bearer session token.
    pub token: String,
    /// ISO-8601 expiry of `token`.
    pub expires_at: String,
    /// Logged-in owner.
    pub user: PublicUser,
}

/// Returns the trimmed value when it is non-blank.
pub fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}
