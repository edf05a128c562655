//! Collection snapshots: loosely-typed documents and their flattening into
//! spreadsheet-safe cells.
//!
//! Flattening rules:
//! - identifiers become their string form;
//! - timestamps become `YYYY-MM-DDTHH:MM:SS.sssZ`;
//! - lists and objects become one JSON text, with nested identifiers and
//!   timestamps converted the same way and key order preserved;
//! - text, numbers and booleans pass through and nulls become empty cells.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Number, Value};

use crate::model::{FeesRecord, SelectedStudent, Student, Subject};
use crate::util::iso_millis;

/// Key under which every document carries its record id.
pub const ID_KEY: &str = "_id";

/// A value inside a [`Document`].
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    /// Record identifier.
    Id(String),
    /// Point in time.
    Timestamp(DateTime<Utc>),
    /// String.
    Text(String),
    /// Number.
    Number(f64),
    /// Boolean.
    Bool(bool),
    /// Missing or null.
    Null,
    /// Array.
    List(Vec<Field>),
    /// Nested document.
    Object(Document),
}

impl Field {
    /// JSON form used inside composite cells.
    pub fn to_json(&self) -> Value {
        match self {
            Field::Id(id) => Value::String(id.clone()),
            Field::Timestamp(at) => Value::String(iso_millis(at)),
            Field::Text(s) => Value::String(s.clone()),
            Field::Number(n) => number_json(*n),
            Field::Bool(b) => Value::Bool(*b),
            Field::Null => Value::Null,
            Field::List(items) => Value::Array(items.iter().map(Field::to_json).collect()),
            Field::Object(doc) => Value::Object(doc.to_json_map()),
        }
    }
}

// Integral values print without a fractional part ("1500", not "1500.0").
fn number_json(n: f64) -> Value {
    const MAX_SAFE: f64 = 9_007_199_254_740_991.0;
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE {
        Value::Number(Number::from(n as i64))
    } else {
        Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
    }
}

impl From<&str> for Field {
    fn from(value: &str) -> Self {
        Field::Text(value.to_string())
    }
}

impl From<String> for Field {
    fn from(value: String) -> Self {
        Field::Text(value)
    }
}

impl From<f64> for Field {
    fn from(value: f64) -> Self {
        Field::Number(value)
    }
}

impl From<u32> for Field {
    fn from(value: u32) -> Self {
        Field::Number(f64::from(value))
    }
}

impl From<bool> for Field {
    fn from(value: bool) -> Self {
        Field::Bool(value)
    }
}

impl From<DateTime<Utc>> for Field {
    fn from(value: DateTime<Utc>) -> Self {
        Field::Timestamp(value)
    }
}

impl From<Option<String>> for Field {
    fn from(value: Option<String>) -> Self {
        value.map(Field::Text).unwrap_or(Field::Null)
    }
}

impl From<Vec<String>> for Field {
    fn from(value: Vec<String>) -> Self {
        Field::List(value.into_iter().map(Field::Text).collect())
    }
}

impl From<Document> for Field {
    fn from(value: Document) -> Self {
        Field::Object(value)
    }
}

impl From<Value> for Field {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Field::Null,
            Value::Bool(b) => Field::Bool(b),
            Value::Number(n) => n.as_f64().map(Field::Number).unwrap_or(Field::Null),
            Value::String(s) => Field::Text(s),
            Value::Array(items) => Field::List(items.into_iter().map(Field::from).collect()),
            Value::Object(map) => {
                let mut doc = Document::new();
                for (k, v) in map {
                    doc.insert(k, Field::from(v));
                }
                Field::Object(doc)
            }
        }
    }
}

/// Ordered key/value record as read from a collection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    fields: Vec<(String, Field)>,
}

impl Document {
    /// Empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`Document::insert`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Field>) -> Self {
        self.insert(key, value);
        self
    }

    /// Sets `key`, replacing an existing value in place.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Field>) {
        let key = key.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((key, value)),
        }
    }

    /// Value under `key`.
    pub fn get(&self, key: &str) -> Option<&Field> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Entries in insertion order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Field)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True when there are no entries.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn to_json_map(&self) -> Map<String, Value> {
        self.fields
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect()
    }
}

/// A spreadsheet cell value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    /// Text cell.
    Text(String),
    /// Numeric cell.
    Number(f64),
    /// Boolean cell.
    Bool(bool),
    /// Blank cell.
    Empty,
}

/// A flattened document: ordered keys mapped to cells.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlatRecord {
    cells: Vec<(String, Cell)>,
}

impl FlatRecord {
    /// Cell under `key`.
    pub fn get(&self, key: &str) -> Option<&Cell> {
        self.cells.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Keys in document order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(k, _)| k.as_str())
    }

    /// Entries in document order.
    pub fn cells(&self) -> impl Iterator<Item = (&str, &Cell)> {
        self.cells.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Flattens one document.
pub fn flatten(doc: &Document) -> FlatRecord {
    let cells = doc
        .fields()
        .map(|(key, value)| (key.to_string(), flatten_field(value)))
        .collect();
    FlatRecord { cells }
}

fn flatten_field(value: &Field) -> Cell {
    match value {
        Field::Id(id) => Cell::Text(id.clone()),
        Field::Timestamp(at) => Cell::Text(iso_millis(at)),
        Field::Text(s) => Cell::Text(s.clone()),
        Field::Number(n) => Cell::Number(*n),
        Field::Bool(b) => Cell::Bool(*b),
        Field::Null => Cell::Empty,
        composite @ (Field::List(_) | Field::Object(_)) => {
            Cell::Text(composite.to_json().to_string())
        }
    }
}

/// Flattened rows of one collection, in read order.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionSnapshot {
    /// Collection name, also the sheet name.
    pub name: String,
    /// One flattened record per document.
    pub records: Vec<FlatRecord>,
}

impl CollectionSnapshot {
    /// Flattens `docs` under the collection `name`.
    pub fn from_documents(name: impl Into<String>, docs: &[Document]) -> Self {
        Self {
            name: name.into(),
            records: docs.iter().map(flatten).collect(),
        }
    }
}

/// Conversion of a stored record into its backup document.
pub trait ToDocument {
    fn to_document(&self) -> Document;
}

impl ToDocument for Student {
    fn to_document(&self) -> Document {
        Document::new()
            .with(ID_KEY, Field::Id(self.id.clone()))
            .with("name", self.name.as_str())
            .with("surName", self.sur_name.as_str())
            .with("firstName", self.first_name.as_str())
            .with("guardianName", self.guardian_name.as_str())
            .with("mothersName", self.mothers_name.as_str())
            .with("subject", self.subject.clone())
            .with("batch", self.batch.clone())
            .with("address", self.address.as_str())
            .with("aadhaarNumber", self.aadhaar_number.as_str())
            .with("mobileNo", self.mobile_no.as_str())
            .with("email", self.email.clone())
            .with("birthPlace", self.birth_place.as_str())
            .with("dateOfBirth", self.date_of_birth)
            .with("gender", self.gender.as_str())
            .with("handicapped", self.handicapped.as_str())
            .with("latestEducation", self.latest_education.as_str())
            .with("previousSchoolName", self.previous_school_name.as_str())
            .with("photo", self.photo.as_str())
            .with("isDeleted", self.is_deleted)
            .with("createdAt", self.created_at)
            .with("updatedAt", self.updated_at)
    }
}

impl ToDocument for SelectedStudent {
    fn to_document(&self) -> Document {
        Document::new()
            .with("studentId", Field::Id(self.student_id.clone()))
            .with("name", self.name.as_str())
            .with("aadhaarNumber", self.aadhaar_number.as_str())
            .with("mobileNo", self.mobile_no.as_str())
            .with("subjects", self.subjects.clone())
    }
}

impl ToDocument for FeesRecord {
    fn to_document(&self) -> Document {
        Document::new()
            .with(ID_KEY, Field::Id(self.id.clone()))
            .with("selectedStudent", self.selected_student.to_document())
            .with("subjects", self.subjects.clone())
            .with("admissionDate", self.admission_date)
            .with("totalFees", self.total_fees)
            .with("totalInstallments", self.total_installments)
            .with("monthlyInstallments", self.monthly_installments)
            .with("instalmentNumber", self.instalment_number)
            .with("feesPaid", self.fees_paid)
            .with("date", self.date)
            .with("isDeleted", self.is_deleted)
            .with("createdAt", self.created_at)
            .with("updatedAt", self.updated_at)
    }
}

impl ToDocument for Subject {
    fn to_document(&self) -> Document {
        Document::new()
            .with(ID_KEY, Field::Id(self.id.clone()))
            .with("subjectName", self.subject_name.as_str())
            .with("isDeleted", self.is_deleted)
            .with("createdAt", self.created_at)
            .with("updatedAt", self.updated_at)
    }
}
