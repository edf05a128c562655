use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use institute_core::api::{ListQuery, Page};
use institute_core::model::{FeesRecord, OtpPurpose, Student, Subject, SystemUser, SystemUserOtp};
use institute_core::snapshot::{Document, ToDocument};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use surrealdb::engine::any::{self, Any};
use surrealdb::Surreal;
use tracing::debug;

use crate::backup::{CollectionSource, Owner, OwnerDirectory};

pub type SurrealDb = Surreal<Any>;

pub const STUDENT: &str = "student";
pub const SUBJECT: &str = "subject";
pub const FEES: &str = "fees";
pub const SYSTEM_USER: &str = "system_user";
pub const SYSTEM_USER_OTP: &str = "system_user_otp";

/// Projection that exposes the record key as a plain string `id`.
const FIELDS: &str = "*, record::id(id) AS id";

#[derive(Clone)]
pub struct Db {
    inner: SurrealDb,
}

#[derive(Debug, Deserialize)]
struct Total {
    total: u64,
}

/// Case-insensitive substring search over `fields` of one table.
struct Search<'a> {
    lowercase: &'a [&'a str],
    exact: &'a [&'a str],
}

impl Search<'_> {
    fn clause(&self) -> String {
        let parts: Vec<String> = self
            .lowercase
            .iter()
            .map(|f| format!("string::lowercase({f}) CONTAINS $q"))
            .chain(self.exact.iter().map(|f| format!("{f} CONTAINS $q")))
            .collect();
        format!("({})", parts.join(" OR "))
    }
}

const STUDENT_SEARCH: Search<'static> = Search {
    lowercase: &["name"],
    exact: &["mobileNo", "aadhaarNumber"],
};

const SUBJECT_SEARCH: Search<'static> = Search {
    lowercase: &["subjectName"],
    exact: &[],
};

const FEES_SEARCH: Search<'static> = Search {
    lowercase: &["selectedStudent.name"],
    exact: &["selectedStudent.aadhaarNumber"],
};

impl Db {
    /// Opens `url` (`surrealkv://path`, `mem://`, ...) and selects the
    /// `institute/main` namespace and database.
    pub async fn connect(url: &str) -> Result<Self> {
        let inner = any::connect(url.to_string())
            .await
            .with_context(|| format!("connecting to {url}"))?;
        inner
            .use_ns("institute")
            .use_db("main")
            .await
            .context("selecting surreal namespace/db")?;
        Ok(Self { inner })
    }

    pub async fn bootstrap_schema(&self) -> Result<()> {
        let schema = include_str!("../schema.surql");
        self.inner
            .query(schema)
            .await
            .context("applying schema")?
            .check()
            .context("applying schema")?;
        Ok(())
    }

    async fn insert<T: Serialize>(&self, table: &str, id: &str, record: &T) -> Result<()> {
        let mut data = serde_json::to_value(record).context("encoding record")?;
        if let Some(map) = data.as_object_mut() {
            map.remove("id");
        }
        self.inner
            .query("CREATE type::thing($tb, $id) CONTENT $data RETURN NONE;")
            .bind(("tb", table.to_string()))
            .bind(("id", id.to_string()))
            .bind(("data", data))
            .await?
            .check()
            .with_context(|| format!("creating {table}:{id}"))?;
        Ok(())
    }

    async fn replace<T: Serialize>(&self, table: &str, id: &str, record: &T) -> Result<()> {
        let mut data = serde_json::to_value(record).context("encoding record")?;
        if let Some(map) = data.as_object_mut() {
            map.remove("id");
        }
        self.inner
            .query("UPDATE type::thing($tb, $id) CONTENT $data RETURN NONE;")
            .bind(("tb", table.to_string()))
            .bind(("id", id.to_string()))
            .bind(("data", data))
            .await?
            .check()
            .with_context(|| format!("updating {table}:{id}"))?;
        Ok(())
    }

    async fn fetch<T: DeserializeOwned>(&self, table: &str, id: &str, active_only: bool) -> Result<Option<T>> {
        let filter = if active_only { " WHERE isDeleted = false" } else { "" };
        let mut res = self
            .inner
            .query(format!("SELECT {FIELDS} FROM type::thing($tb, $id){filter};"))
            .bind(("tb", table.to_string()))
            .bind(("id", id.to_string()))
            .await
            .with_context(|| format!("reading {table}:{id}"))?;
        let row: Option<T> = res.take(0)?;
        Ok(row)
    }

    /// Every non-deleted record, oldest first.
    async fn all_active<T: DeserializeOwned>(&self, table: &str) -> Result<Vec<T>> {
        let mut res = self
            .inner
            .query(format!(
                "SELECT {FIELDS} FROM {table} WHERE isDeleted = false ORDER BY createdAt ASC;"
            ))
            .await
            .with_context(|| format!("listing {table}"))?;
        let rows: Vec<T> = res.take(0)?;
        Ok(rows)
    }

    /// Newest-first page of non-deleted records, optionally filtered by `search`.
    async fn page<T: DeserializeOwned>(&self, table: &str, search: &Search<'_>, q: &ListQuery) -> Result<Page<T>> {
        let term = q.search().map(str::to_lowercase);
        let mut filter = "isDeleted = false".to_string();
        if term.is_some() {
            filter.push_str(" AND ");
            filter.push_str(&search.clause());
        }
        let (page, limit) = (q.page(), q.limit());
        let sql = format!(
            "SELECT {FIELDS} FROM {table} WHERE {filter} ORDER BY createdAt DESC LIMIT {limit} START {offset};\
             SELECT count() AS total FROM {table} WHERE {filter} GROUP ALL;",
            offset = q.offset(),
        );
        let mut res = self
            .inner
            .query(sql)
            .bind(("q", term.unwrap_or_default()))
            .await
            .with_context(|| format!("paging {table}"))?;
        let data: Vec<T> = res.take(0)?;
        let total: Option<Total> = res.take(1)?;
        Ok(Page {
            data,
            total: total.map(|t| t.total).unwrap_or(0),
            page,
            limit,
        })
    }

    /// Marks an active record deleted. `false` when there was nothing to delete.
    async fn soft_delete(&self, table: &str, id: &str) -> Result<bool> {
        let existing: Option<serde::de::IgnoredAny> = self.fetch(table, id, true).await?;
        if existing.is_none() {
            return Ok(false);
        }
        self.inner
            .query("UPDATE type::thing($tb, $id) MERGE { isDeleted: true, updatedAt: $now } RETURN NONE;")
            .bind(("tb", table.to_string()))
            .bind(("id", id.to_string()))
            .bind(("now", serde_json::to_value(Utc::now()).context("encoding timestamp")?))
            .await?
            .check()
            .with_context(|| format!("deleting {table}:{id}"))?;
        debug!(table, id, "soft-deleted");
        Ok(true)
    }

    async fn count_where(&self, table: &str, filter: &str, vars: Vec<(&'static str, String)>) -> Result<u64> {
        let mut query = self.inner.query(format!(
            "SELECT count() AS total FROM {table} WHERE {filter} GROUP ALL;"
        ));
        for var in vars {
            query = query.bind(var);
        }
        let mut res = query.await.with_context(|| format!("counting {table}"))?;
        let total: Option<Total> = res.take(0)?;
        Ok(total.map(|t| t.total).unwrap_or(0))
    }

    // students

    pub async fn create_student(&self, student: &Student) -> Result<()> {
        self.insert(STUDENT, &student.id, student).await
    }

    pub async fn get_student(&self, id: &str) -> Result<Option<Student>> {
        self.fetch(STUDENT, id, true).await
    }

    pub async fn save_student(&self, student: &Student) -> Result<()> {
        self.replace(STUDENT, &student.id, student).await
    }

    pub async fn delete_student(&self, id: &str) -> Result<bool> {
        self.soft_delete(STUDENT, id).await
    }

    pub async fn list_students(&self, q: &ListQuery) -> Result<Page<Student>> {
        self.page(STUDENT, &STUDENT_SEARCH, q).await
    }

    pub async fn all_students(&self) -> Result<Vec<Student>> {
        self.all_active(STUDENT).await
    }

    /// True when another active student already holds `aadhaar`.
    pub async fn aadhaar_taken(&self, aadhaar: &str, except: Option<&str>) -> Result<bool> {
        let n = self
            .count_where(
                STUDENT,
                "isDeleted = false AND aadhaarNumber = $aadhaar AND record::id(id) != $except",
                vec![
                    ("aadhaar", aadhaar.to_string()),
                    ("except", except.unwrap_or_default().to_string()),
                ],
            )
            .await?;
        Ok(n > 0)
    }

    // subjects

    pub async fn create_subject(&self, subject: &Subject) -> Result<()> {
        self.insert(SUBJECT, &subject.id, subject).await
    }

    pub async fn get_subject(&self, id: &str) -> Result<Option<Subject>> {
        self.fetch(SUBJECT, id, true).await
    }

    pub async fn save_subject(&self, subject: &Subject) -> Result<()> {
        self.replace(SUBJECT, &subject.id, subject).await
    }

    pub async fn delete_subject(&self, id: &str) -> Result<bool> {
        self.soft_delete(SUBJECT, id).await
    }

    pub async fn list_subjects(&self, q: &ListQuery) -> Result<Page<Subject>> {
        self.page(SUBJECT, &SUBJECT_SEARCH, q).await
    }

    /// Case-insensitive name clash with another active subject.
    pub async fn subject_name_taken(&self, name: &str, except: Option<&str>) -> Result<bool> {
        let n = self
            .count_where(
                SUBJECT,
                "isDeleted = false AND string::lowercase(subjectName) = $name AND record::id(id) != $except",
                vec![
                    ("name", name.trim().to_lowercase()),
                    ("except", except.unwrap_or_default().to_string()),
                ],
            )
            .await?;
        Ok(n > 0)
    }

    // fees

    pub async fn create_fees(&self, fees: &FeesRecord) -> Result<()> {
        self.insert(FEES, &fees.id, fees).await
    }

    pub async fn get_fees(&self, id: &str) -> Result<Option<FeesRecord>> {
        self.fetch(FEES, id, true).await
    }

    pub async fn save_fees(&self, fees: &FeesRecord) -> Result<()> {
        self.replace(FEES, &fees.id, fees).await
    }

    pub async fn delete_fees(&self, id: &str) -> Result<bool> {
        self.soft_delete(FEES, id).await
    }

    pub async fn list_fees(&self, q: &ListQuery) -> Result<Page<FeesRecord>> {
        self.page(FEES, &FEES_SEARCH, q).await
    }

    pub async fn all_fees(&self) -> Result<Vec<FeesRecord>> {
        self.all_active(FEES).await
    }

    pub async fn fees_for_student(&self, student_id: &str) -> Result<Vec<FeesRecord>> {
        let mut res = self
            .inner
            .query(format!(
                "SELECT {FIELDS} FROM {FEES} WHERE isDeleted = false AND selectedStudent.studentId = $sid;"
            ))
            .bind(("sid", student_id.to_string()))
            .await
            .context("listing fees for student")?;
        let rows: Vec<FeesRecord> = res.take(0)?;
        Ok(rows)
    }

    // system user

    /// The single owner account, if it has been created.
    pub async fn get_owner(&self) -> Result<Option<SystemUser>> {
        let mut res = self
            .inner
            .query(format!("SELECT {FIELDS} FROM {SYSTEM_USER} ORDER BY createdAt ASC LIMIT 1;"))
            .await
            .context("reading system user")?;
        let row: Option<SystemUser> = res.take(0)?;
        Ok(row)
    }

    pub async fn find_owner_by_email(&self, email: &str) -> Result<Option<SystemUser>> {
        let mut res = self
            .inner
            .query(format!("SELECT {FIELDS} FROM {SYSTEM_USER} WHERE email = $email LIMIT 1;"))
            .bind(("email", email.trim().to_lowercase()))
            .await
            .context("reading system user by email")?;
        let row: Option<SystemUser> = res.take(0)?;
        Ok(row)
    }

    pub async fn create_owner(&self, user: &SystemUser) -> Result<()> {
        self.insert(SYSTEM_USER, &user.id, user).await
    }

    pub async fn save_owner(&self, user: &SystemUser) -> Result<()> {
        self.replace(SYSTEM_USER, &user.id, user).await
    }

    // one-time codes

    pub async fn insert_otp(&self, otp: &SystemUserOtp) -> Result<()> {
        self.insert(SYSTEM_USER_OTP, &otp.id, otp).await
    }

    /// Newest unexpired code for `email`/`purpose` whose hash matches.
    pub async fn find_valid_otp(
        &self,
        email: &str,
        purpose: OtpPurpose,
        otp_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<SystemUserOtp>> {
        let mut res = self
            .inner
            .query(format!(
                "SELECT {FIELDS} FROM {SYSTEM_USER_OTP} WHERE email = $email AND purpose = $purpose AND otpHash = $hash;"
            ))
            .bind(("email", email.trim().to_lowercase()))
            .bind(("purpose", purpose.as_str().to_string()))
            .bind(("hash", otp_hash.to_string()))
            .await
            .context("reading verification codes")?;
        let rows: Vec<SystemUserOtp> = res.take(0)?;
        Ok(rows
            .into_iter()
            .filter(|o| o.expires_at > now)
            .max_by_key(|o| o.created_at))
    }

    pub async fn clear_otps(&self, email: &str, purpose: OtpPurpose) -> Result<()> {
        self.inner
            .query(format!(
                "DELETE {SYSTEM_USER_OTP} WHERE email = $email AND purpose = $purpose;"
            ))
            .bind(("email", email.trim().to_lowercase()))
            .bind(("purpose", purpose.as_str().to_string()))
            .await?
            .check()
            .context("clearing verification codes")?;
        Ok(())
    }
}

#[async_trait]
impl OwnerDirectory for Db {
    async fn find_owner(&self) -> Result<Option<Owner>> {
        Ok(self.get_owner().await?.map(|u| Owner {
            name: u.name,
            email: u.email,
            institute_name: u.institute_name,
        }))
    }
}

#[async_trait]
impl CollectionSource for Db {
    async fn list_active(&self, collection: &str) -> Result<Vec<Document>> {
        let docs: Vec<Document> = match collection {
            STUDENT => self.all_students().await?.iter().map(ToDocument::to_document).collect(),
            FEES => self.all_fees().await?.iter().map(ToDocument::to_document).collect(),
            SUBJECT => self
                .all_active::<Subject>(SUBJECT)
                .await?
                .iter()
                .map(ToDocument::to_document)
                .collect(),
            other => bail!("unknown backup collection {other}"),
        };
        Ok(docs)
    }
}
