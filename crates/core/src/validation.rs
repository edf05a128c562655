//! Field-level validation of create/update payloads.
//!
//! Validators collect every failing field instead of stopping at the first,
//! and on success hand back a typed draft (create) or change set (update).

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::api::{non_blank, FeesInput, NumberInput, StudentInput};
use crate::model::{monthly_installment, FeesRecord, Gender, Handicapped, SelectedStudent, Student};

/// One failing field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Payload field name.
    pub field: String,
    /// Why it was rejected.
    pub message: String,
}

/// Every failing field of a payload.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{} field(s) failed validation", .errors.len())]
pub struct ValidationError {
    /// Failures in field order.
    pub errors: Vec<FieldError>,
}

impl ValidationError {
    /// True when `field` has at least one error.
    pub fn has(&self, field: &str) -> bool {
        self.errors.iter().any(|e| e.field == field)
    }
}

#[derive(Default)]
struct Checks {
    errors: Vec<FieldError>,
}

impl Checks {
    fn fail(&mut self, field: &str, message: impl Into<String>) {
        self.errors.push(FieldError {
            field: field.to_string(),
            message: message.into(),
        });
    }

    fn finish<T>(self, value: impl FnOnce() -> T) -> Result<T, ValidationError> {
        if self.errors.is_empty() {
            Ok(value())
        } else {
            Err(ValidationError {
                errors: self.errors,
            })
        }
    }

    fn required(&mut self, field: &str, value: &Option<String>) -> Option<String> {
        match non_blank(value) {
            Some(v) => Some(v.to_string()),
            None => {
                self.fail(field, format!("{field} is required"));
                None
            }
        }
    }

    /// Letters-and-spaces name. `required` distinguishes create from update.
    fn name(&mut self, field: &str, value: &Option<String>, required: bool) -> Option<String> {
        let raw = match value {
            Some(v) => v.trim(),
            None if required => {
                self.fail(field, format!("{field} is required"));
                return None;
            }
            None => return None,
        };
        if raw.is_empty() && required {
            self.fail(field, format!("{field} is required"));
            return None;
        }
        if !is_letters(raw) {
            self.fail(field, format!("{field} must contain only letters"));
            return None;
        }
        Some(raw.to_string())
    }

    fn digits(&mut self, field: &str, value: &str, len: usize) -> Option<String> {
        let v = value.trim();
        if v.len() == len && v.chars().all(|c| c.is_ascii_digit()) {
            Some(v.to_string())
        } else {
            self.fail(field, format!("{field} must be {len} digits"));
            None
        }
    }

    fn not_future(&mut self, field: &str, value: &str, today: NaiveDate) -> Option<DateTime<Utc>> {
        let Some(at) = parse_date_input(value) else {
            self.fail(field, format!("{field} must be a valid date"));
            return None;
        };
        if at.date_naive() > today {
            self.fail(field, format!("{field} cannot be in the future"));
            return None;
        }
        Some(at)
    }

    fn non_negative(&mut self, field: &str, value: &NumberInput) -> Option<f64> {
        match value.as_f64() {
            Some(n) if n >= 0.0 => Some(n),
            _ => {
                self.fail(field, format!("{field} must be a non-negative number"));
                None
            }
        }
    }

    fn at_least_one(&mut self, field: &str, value: &NumberInput, message: &str) -> Option<u32> {
        match value.as_f64() {
            Some(n) if n >= 1.0 && n.fract() == 0.0 && n <= f64::from(u32::MAX) => Some(n as u32),
            _ => {
                self.fail(field, message);
                None
            }
        }
    }
}

fn is_letters(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| c.is_ascii_alphabetic() || c.is_whitespace())
}

fn looks_like_email(value: &str) -> bool {
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !value.chars().any(char::is_whitespace)
}

/// Accepts RFC 3339 timestamps, `YYYY-MM-DDTHH:MM[:SS]` (read as UTC) and
/// bare `YYYY-MM-DD` dates (midnight UTC).
pub fn parse_date_input(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(value) {
        return Some(at.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(at) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(at.and_utc());
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|at| at.and_utc())
}

/// Validated student ready to be stored.
#[derive(Debug, Clone, PartialEq)]
pub struct StudentDraft {
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
    pub batch: Option<String>,
    /// Postal address.
    pub address: String,
    /// 12-digit Aadhaar number.
    pub aadhaar_number: String,
    /// 10-digit mobile number.
    pub mobile_no: String,
    /// Contact email.
    pub email: Option<String>,
    /// Place of birth.
    pub birth_place: String,
    /// Date of birth, midnight UTC.
    pub date_of_birth: DateTime<Utc>,
    /// `Male`, `Female` or `Other`.
    pub gender: Gender,
    /// `Yes` or `No`.
    pub handicapped: Handicapped,
    /// Highest education completed.
    pub latest_education: String,
    /// Last school attended.
    pub previous_school_name: String,
    /// Photo path or URL.
    pub photo: String,
}

impl StudentDraft {
    /// Materializes the record, deriving the listing name.
    pub fn into_student(self, id: String, now: DateTime<Utc>) -> Student {
        Student {
            id,
            name: Student::full_name(&self.first_name, &self.sur_name),
            sur_name: self.sur_name,
            first_name: self.first_name,
            guardian_name: self.guardian_name,
            mothers_name: self.mothers_name,
            subject: self.subject,
            batch: self.batch,
            address: self.address,
            aadhaar_number: self.aadhaar_number,
            mobile_no: self.mobile_no,
            email: self.email,
            birth_place: self.birth_place,
            date_of_birth: self.date_of_birth,
            gender: self.gender,
            handicapped: self.handicapped,
            latest_education: self.latest_education,
            previous_school_name: self.previous_school_name,
            photo: self.photo,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Validates a student create payload.
pub fn validate_new_student(input: &StudentInput) -> Result<StudentDraft, ValidationError> {
    let mut c = Checks::default();

    let sur_name = c.name("surName", &input.sur_name, true);
    let first_name = c.name("firstName", &input.first_name, true);
    let guardian_name = c.name("guardianName", &input.guardian_name, true);
    let mothers_name = c.name("mothersName", &input.mothers_name, true);

    let subject = input.subject.clone().map(|s| s.into_vec()).unwrap_or_default();
    if subject.is_empty() {
        c.fail("subject", "At least one subject is required");
    }

    let address = c.required("address", &input.address);
    let aadhaar_number = c
        .required("aadhaarNumber", &input.aadhaar_number)
        .and_then(|v| c.digits("aadhaarNumber", &v, 12));
    let mobile_no = c
        .required("mobileNo", &input.mobile_no)
        .and_then(|v| c.digits("mobileNo", &v, 10));

    let email = non_blank(&input.email).map(str::to_string);
    if let Some(e) = &email {
        if !looks_like_email(e) {
            c.fail("email", "Invalid email");
        }
    }

    let birth_place = c.required("birthPlace", &input.birth_place);
    let date_of_birth = c.required("dateOfBirth", &input.date_of_birth).and_then(|v| {
        let parsed = parse_date_input(&v);
        if parsed.is_none() {
            c.fail("dateOfBirth", "Invalid dateOfBirth");
        }
        parsed
    });
    let gender = c.required("gender", &input.gender).and_then(|v| {
        let parsed = Gender::parse(&v);
        if parsed.is_none() {
            c.fail("gender", "Invalid gender value");
        }
        parsed
    });
    let handicapped = c.required("handicapped", &input.handicapped).and_then(|v| {
        let parsed = Handicapped::parse(&v);
        if parsed.is_none() {
            c.fail("handicapped", "Invalid handicapped value");
        }
        parsed
    });
    let latest_education = c.required("latestEducation", &input.latest_education);
    let previous_school_name = c.required("previousSchoolName", &input.previous_school_name);

    c.finish(|| StudentDraft {
        sur_name: sur_name.unwrap_or_default(),
        first_name: first_name.unwrap_or_default(),
        guardian_name: guardian_name.unwrap_or_default(),
        mothers_name: mothers_name.unwrap_or_default(),
        subject,
        batch: non_blank(&input.batch).map(str::to_string),
        address: address.unwrap_or_default(),
        aadhaar_number: aadhaar_number.unwrap_or_default(),
        mobile_no: mobile_no.unwrap_or_default(),
        email,
        birth_place: birth_place.unwrap_or_default(),
        date_of_birth: date_of_birth.unwrap_or_default(),
        gender: gender.unwrap_or(Gender::Other),
        handicapped: handicapped.unwrap_or(Handicapped::No),
        latest_education: latest_education.unwrap_or_default(),
        previous_school_name: previous_school_name.unwrap_or_default(),
        photo: non_blank(&input.photo).unwrap_or_default().to_string(),
    })
}

/// Validated partial student update; `None` keeps the stored value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StudentChanges {
    /// Family name.
    pub sur_name: Option<String>,
    /// Given name.
    pub first_name: Option<String>,
    /// Father's or guardian's name.
    pub guardian_name: Option<String>,
    /// Mother's name.
    pub mothers_name: Option<String>,
    /// Enrolled subject names.
    pub subject: Option<Vec<String>>,
    /// Optional batch label.
    pub batch: Option<String>,
    /// Postal address.
    pub address: Option<String>,
    /// 12-digit Aadhaar number.
    pub aadhaar_number: Option<String>,
    /// 10-digit mobile number.
    pub mobile_no: Option<String>,
    /// Contact email.
    pub email: Option<String>,
    /// Place of birth.
    pub birth_place: Option<String>,
    /// Date of birth (midnight UTC).
    pub date_of_birth: Option<DateTime<Utc>>,
    /// `Male`, `Female` or `Other`.
    pub gender: Option<Gender>,
    /// `Yes` or `No`.
    pub handicapped: Option<Handicapped>,
    /// Highest education completed.
    pub latest_education: Option<String>,
    /// Last school attended.
    pub previous_school_name: Option<String>,
    /// Photo path or URL.
    pub photo: Option<String>,
}

impl StudentChanges {
    /// Applies the changes; the listing name is re-derived when either name
    /// part changes.
    pub fn apply(self, student: &mut Student, now: DateTime<Utc>) {
        let renamed = self.first_name.is_some() || self.sur_name.is_some();
        if let Some(v) = self.sur_name {
            student.sur_name = v;
        }
        if let Some(v) = self.first_name {
            student.first_name = v;
        }
        if renamed {
            student.name = Student::full_name(&student.first_name, &student.sur_name);
        }
        if let Some(v) = self.guardian_name {
            student.guardian_name = v;
        }
        if let Some(v) = self.mothers_name {
            student.mothers_name = v;
        }
        if let Some(v) = self.subject {
            student.subject = v;
        }
        if let Some(v) = self.batch {
            student.batch = Some(v);
        }
        if let Some(v) = self.address {
            student.address = v;
        }
        if let Some(v) = self.aadhaar_number {
            student.aadhaar_number = v;
        }
        if let Some(v) = self.mobile_no {
            student.mobile_no = v;
        }
        if let Some(v) = self.email {
            student.email = Some(v);
        }
        if let Some(v) = self.birth_place {
            student.birth_place = v;
        }
        if let Some(v) = self.date_of_birth {
            student.date_of_birth = v;
        }
        if let Some(v) = self.gender {
            student.gender = v;
        }
        if let Some(v) = self.handicapped {
            student.handicapped = v;
        }
        if let Some(v) = self.latest_education {
            student.latest_education = v;
        }
        if let Some(v) = self.previous_school_name {
            student.previous_school_name = v;
        }
        if let Some(v) = self.photo {
            student.photo = v;
        }
        student.updated_at = now;
    }
}

/// Validates a student update payload; absent fields are left alone.
pub fn validate_student_patch(input: &StudentInput) -> Result<StudentChanges, ValidationError> {
    let mut c = Checks::default();

    let sur_name = c.name("surName", &input.sur_name, false);
    let first_name = c.name("firstName", &input.first_name, false);
    let guardian_name = c.name("guardianName", &input.guardian_name, false);
    let mothers_name = c.name("mothersName", &input.mothers_name, false);

    let subject = input.subject.clone().map(|s| s.into_vec());
    if matches!(&subject, Some(s) if s.is_empty()) {
        c.fail("subject", "At least one subject is required");
    }

    let address = input.address.as_ref().and_then(|_| c.required("address", &input.address));
    let aadhaar_number = input
        .aadhaar_number
        .as_deref()
        .and_then(|v| c.digits("aadhaarNumber", v, 12));
    let mobile_no = input
        .mobile_no
        .as_deref()
        .and_then(|v| c.digits("mobileNo", v, 10));

    let email = non_blank(&input.email).map(str::to_string);
    if let Some(e) = &email {
        if !looks_like_email(e) {
            c.fail("email", "Invalid email");
        }
    }

    let date_of_birth = input.date_of_birth.as_deref().and_then(|v| {
        let parsed = parse_date_input(v);
        if parsed.is_none() {
            c.fail("dateOfBirth", "Invalid dateOfBirth");
        }
        parsed
    });
    let gender = input.gender.as_deref().and_then(|v| {
        let parsed = Gender::parse(v.trim());
        if parsed.is_none() {
            c.fail("gender", "Invalid gender value");
        }
        parsed
    });
    let handicapped = input.handicapped.as_deref().and_then(|v| {
        let parsed = Handicapped::parse(v.trim());
        if parsed.is_none() {
            c.fail("handicapped", "Invalid handicapped value");
        }
        parsed
    });

    c.finish(|| StudentChanges {
        sur_name,
        first_name,
        guardian_name,
        mothers_name,
        subject,
        batch: non_blank(&input.batch).map(str::to_string),
        address,
        aadhaar_number,
        mobile_no,
        email,
        birth_place: non_blank(&input.birth_place).map(str::to_string),
        date_of_birth,
        gender,
        handicapped,
        latest_education: non_blank(&input.latest_education).map(str::to_string),
        previous_school_name: non_blank(&input.previous_school_name).map(str::to_string),
        photo: non_blank(&input.photo).map(str::to_string),
    })
}

/// Validated fee installment ready to be stored.
#[derive(Debug, Clone, PartialEq)]
pub struct FeesDraft {
    /// Key of an existing student.
    pub student_id: String,
    /// Admission date.
    pub admission_date: DateTime<Utc>,
    /// Whole fee for the course.
    pub total_fees: f64,
    /// Number of planned installments.
    pub total_installments: u32,
    /// 1-based installment position.
    pub instalment_number: u32,
    /// Amount paid in this installment.
    pub fees_paid: f64,
    /// Payment date.
    pub date: DateTime<Utc>,
}

impl FeesDraft {
    /// Materializes the record against the (already verified) student.
    pub fn into_record(self, id: String, student: &Student, now: DateTime<Utc>) -> FeesRecord {
        let selected = SelectedStudent::from(student);
        FeesRecord {
            id,
            subjects: selected.subjects.clone(),
            selected_student: selected,
            admission_date: self.admission_date,
            total_fees: self.total_fees,
            total_installments: self.total_installments,
            monthly_installments: monthly_installment(self.total_fees, self.total_installments),
            instalment_number: self.instalment_number,
            fees_paid: self.fees_paid,
            date: self.date,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        }
    }
}

const INSTALLMENTS_MSG: &str = "totalInstallments must be at least 1";
const INSTALMENT_NUMBER_MSG: &str = "instalmentNumber must be a positive integer";

fn required_number<'a>(
    c: &mut Checks,
    field: &str,
    value: &'a Option<NumberInput>,
) -> Option<&'a NumberInput> {
    match value {
        Some(v) if !v.is_blank() => Some(v),
        _ => {
            c.fail(field, format!("{field} is required"));
            None
        }
    }
}

/// Validates a fee create payload; `today` bounds the date fields.
pub fn validate_new_fees(input: &FeesInput, today: NaiveDate) -> Result<FeesDraft, ValidationError> {
    let mut c = Checks::default();

    let student_id = c.required("studentId", &input.student_id);
    let admission_date = c
        .required("admissionDate", &input.admission_date)
        .and_then(|v| c.not_future("admissionDate", &v, today));
    let total_fees = required_number(&mut c, "totalFees", &input.total_fees)
        .and_then(|v| c.non_negative("totalFees", v));
    let total_installments = required_number(&mut c, "totalInstallments", &input.total_installments)
        .and_then(|v| c.at_least_one("totalInstallments", v, INSTALLMENTS_MSG));
    let instalment_number = required_number(&mut c, "instalmentNumber", &input.instalment_number)
        .and_then(|v| c.at_least_one("instalmentNumber", v, INSTALMENT_NUMBER_MSG));
    let fees_paid = required_number(&mut c, "feesPaid", &input.fees_paid)
        .and_then(|v| c.non_negative("feesPaid", v));
    let date = c
        .required("date", &input.date)
        .and_then(|v| c.not_future("date", &v, today));

    c.finish(|| FeesDraft {
        student_id: student_id.unwrap_or_default(),
        admission_date: admission_date.unwrap_or_default(),
        total_fees: total_fees.unwrap_or_default(),
        total_installments: total_installments.unwrap_or(1),
        instalment_number: instalment_number.unwrap_or(1),
        fees_paid: fees_paid.unwrap_or_default(),
        date: date.unwrap_or_default(),
    })
}

/// Validated partial fee update; `None` keeps the stored value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeesChanges {
    /// Moves the installment to another student.
    pub student_id: Option<String>,
    /// Admission date.
    pub admission_date: Option<DateTime<Utc>>,
    /// Whole fee for the course.
    pub total_fees: Option<f64>,
    /// Number of planned installments.
    pub total_installments: Option<u32>,
    /// 1-based installment position.
    pub instalment_number: Option<u32>,
    /// Amount paid in this installment.
    pub fees_paid: Option<f64>,
    /// Payment date.
    pub date: Option<DateTime<Utc>>,
}

impl FeesChanges {
    /// Applies the changes. `student` must be the record named by
    /// `student_id` when that field is set; its identity is re-copied.
    /// The per-installment amount is recomputed when either total changes.
    pub fn apply(self, record: &mut FeesRecord, student: Option<&Student>, now: DateTime<Utc>) {
        if let Some(student) = student {
            let selected = SelectedStudent::from(student);
            record.subjects = selected.subjects.clone();
            record.selected_student = selected;
        }
        let totals_changed = self.total_fees.is_some() || self.total_installments.is_some();
        if let Some(v) = self.total_fees {
            record.total_fees = v;
        }
        if let Some(v) = self.total_installments {
            record.total_installments = v;
        }
        if totals_changed {
            record.monthly_installments =
                monthly_installment(record.total_fees, record.total_installments);
        }
        if let Some(v) = self.admission_date {
            record.admission_date = v;
        }
        if let Some(v) = self.instalment_number {
            record.instalment_number = v;
        }
        if let Some(v) = self.fees_paid {
            record.fees_paid = v;
        }
        if let Some(v) = self.date {
            record.date = v;
        }
        record.updated_at = now;
    }
}

/// Validates a fee update payload; absent fields are left alone.
pub fn validate_fees_patch(input: &FeesInput, today: NaiveDate) -> Result<FeesChanges, ValidationError> {
    let mut c = Checks::default();

    let admission_date = input
        .admission_date
        .as_deref()
        .and_then(|v| c.not_future("admissionDate", v, today));
    let total_fees = input
        .total_fees
        .as_ref()
        .and_then(|v| c.non_negative("totalFees", v));
    let total_installments = input
        .total_installments
        .as_ref()
        .and_then(|v| c.at_least_one("totalInstallments", v, INSTALLMENTS_MSG));
    let instalment_number = input
        .instalment_number
        .as_ref()
        .and_then(|v| c.at_least_one("instalmentNumber", v, INSTALMENT_NUMBER_MSG));
    let fees_paid = input
        .fees_paid
        .as_ref()
        .and_then(|v| c.non_negative("feesPaid", v));
    let date = input.date.as_deref().and_then(|v| c.not_future("date", v, today));

    c.finish(|| FeesChanges {
        student_id: non_blank(&input.student_id).map(str::to_string),
        admission_date,
        total_fees,
        total_installments,
        instalment_number,
        fees_paid,
        date,
    })
}
