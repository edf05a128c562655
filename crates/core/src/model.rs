use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Student gender as captured on the admission form.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Gender {
    /// Male.
    Male,
    /// Female.
    Female,
    /// Other.
    Other,
}

impl Gender {
    /// Parses the exact form value (`Male`, `Female`, `Other`).
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Male" => Some(Self::Male),
            "Female" => Some(Self::Female),
            "Other" => Some(Self::Other),
            _ => None,
        }
    }

    /// Form value of this variant.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Male => "Male",
            Self::Female => "Female",
            Self::Other => "Other",
        }
    }
}

/// Yes/No answer for the handicapped field.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Handicapped {
    /// Yes.
    Yes,
    /// No.
    No,
}

impl Handicapped {
    /// Parses the exact form value (`Yes`, `No`).
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Yes" => Some(Self::Yes),
            "No" => Some(Self::No),
            _ => None,
        }
    }

    /// Form value of this variant.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Yes => "Yes",
            Self::No => "No",
        }
    }
}

/// Enrolled student.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    /// Record key.
    pub id: String,
    /// Derived `"{firstName} {surName}"`, kept for listings and search.
    pub name: String,
    /// Family name.
    pub sur_name: String,
    /// Given name.
    pub first_name: String,
    /// Father's or guardian's name.
    pub guardian_name: String,
    /// Mother's name.
    pub mothers_name: String,
    /// Enrolled subject names.
    pub subject: Vec<String>,
    /// Optional batch label.
    #[serde(default)]
    pub batch: Option<String>,
    /// Postal address.
    pub address: String,
    /// 12-digit national id; unique across students.
    pub aadhaar_number: String,
    /// 10-digit mobile number.
    pub mobile_no: String,
    /// Contact email.
    #[serde(default)]
    pub email: Option<String>,
    /// Place of birth.
    pub birth_place: String,
    /// Date of birth (midnight UTC).
    pub date_of_birth: DateTime<Utc>,
    /// `Male`, `Female` or `Other`.
    pub gender: Gender,
    /// `Yes` or `No`.
    pub handicapped: Handicapped,
    /// Highest education completed.
    pub latest_education: String,
    /// Last school attended.
    pub previous_school_name: String,
    /// Stored path or URL of the student's photo.
    #[serde(default)]
    pub photo: String,
    /// Soft-delete flag.
    #[serde(default)]
    pub is_deleted: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl Student {
    /// Builds the listing name from the first name and surname, skipping blanks.
    pub fn full_name(first_name: &str, sur_name: &str) -> String {
        [first_name.trim(), sur_name.trim()]
            .iter()
            .filter(|p| !p.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Name used on fee summaries: surname, first name, guardian name.
    pub fn summary_name(&self) -> String {
        [&self.sur_name, &self.first_name, &self.guardian_name]
            .iter()
            .filter(|p| !p.is_empty())
            .map(|p| p.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// A subject offered by the institute.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    /// Record key.
    pub id: String,
    /// Unique (case-insensitive) subject name.
    pub subject_name: String,
    /// Soft-delete flag.
    #[serde(default)]
    pub is_deleted: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

/// Copy of the student's identity taken when a fee installment is recorded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SelectedStudent {
    /// Student key.
    pub student_id: String,
    /// Listing name at the time of payment.
    pub name: String,
    /// 12-digit Aadhaar number.
    pub aadhaar_number: String,
    /// 10-digit mobile number.
    pub mobile_no: String,
    /// Subjects at the time of payment.
    #[serde(default)]
    pub subjects: Vec<String>,
}

impl From<&Student> for SelectedStudent {
    fn from(student: &Student) -> Self {
        Self {
            student_id: student.id.clone(),
            name: student.name.clone(),
            aadhaar_number: student.aadhaar_number.clone(),
            mobile_no: student.mobile_no.clone(),
            subjects: student.subject.clone(),
        }
    }
}

/// One recorded fee installment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FeesRecord {
    /// Record key.
    pub id: String,
    /// Identity copy taken when the installment was recorded.
    pub selected_student: SelectedStudent,
    /// Student's subjects when recorded.
    #[serde(default)]
    pub subjects: Vec<String>,
    /// Admission date.
    pub admission_date: DateTime<Utc>,
    /// Whole fee for the course.
    pub total_fees: f64,
    /// Number of planned installments.
    pub total_installments: u32,
    /// `total_fees / total_installments`, 0 when there are no installments.
    pub monthly_installments: f64,
    /// 1-based installment position.
    pub instalment_number: u32,
    /// Amount paid in this installment.
    pub fees_paid: f64,
    /// Payment date.
    pub date: DateTime<Utc>,
    /// Soft-delete flag.
    #[serde(default)]
    pub is_deleted: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

/// Per-installment amount for a fee plan.
pub fn monthly_installment(total_fees: f64, total_installments: u32) -> f64 {
    if total_installments > 0 {
        total_fees / f64::from(total_installments)
    } else {
        0.0
    }
}

/// The institute administrator; at most one exists.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SystemUser {
    /// Record key.
    pub id: String,
    /// Owner's name.
    pub name: String,
    /// Lowercased login address.
    pub email: String,
    /// Institute name.
    pub institute_name: String,
    /// bcrypt hash (legacy rows may still hold plaintext until next login).
    pub password: String,
    /// Image data URL, empty when unset.
    #[serde(default)]
    pub institute_logo: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

/// Owner profile as returned by the API (no password).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    /// Record key.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Login address.
    pub email: String,
    /// Institute name.
    pub institute_name: String,
    /// Logo data URL, empty when unset.
    pub institute_logo: String,
}

impl From<&SystemUser> for PublicUser {
    fn from(user: &SystemUser) -> Self {
        Self {
            id: user.id.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
            institute_name: user.institute_name.clone(),
            institute_logo: user.institute_logo.clone(),
        }
    }
}

/// What a one-time code was issued for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OtpPurpose {
    /// Onboarding of the first (and only) system user.
    CreateSystemUser,
    /// Password reset for the existing system user.
    ResetPassword,
}

impl OtpPurpose {
    /// Stored value of this purpose.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CreateSystemUser => "create_system_user",
            Self::ResetPassword => "reset_password",
        }
    }
}

/// Hashed one-time code awaiting verification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SystemUserOtp {
    /// Record key.
    pub id: String,
    /// Address the code was sent to.
    pub email: String,
    /// sha256 hex of the code.
    pub otp_hash: String,
    /// Flow the code unlocks.
    pub purpose: OtpPurpose,
    /// Code is rejected from this instant on.
    pub expires_at: DateTime<Utc>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}
