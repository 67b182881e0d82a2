//! SQLite-based persistent storage for users and patients

use rusqlite::{Connection, params, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use chrono::{DateTime, NaiveDate, Utc};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::error::StorageError;
use crate::patient::{PatientRecord, PatientSummary, Sex, UserRecord, ValidPatient};
use crate::server::auth::{hash_password, verify_password};

type StoreResult<T> = Result<T, StorageError>;

/// SQLite-backed user and patient store
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database at the given path
    pub async fn new<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let conn = Connection::open(&path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA foreign_keys=ON;")?;
        Self::init_schema(&conn)?;

        info!("Opened patient database at {}", path.display());

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory database, used by tests and the guest CLI
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn init_schema(conn: &Connection) -> StoreResult<()> {
        conn.execute_batch(r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT UNIQUE NOT NULL,
                email TEXT,
                password_hash TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS patients (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                first_name TEXT NOT NULL,
                last_name TEXT NOT NULL,
                sex TEXT NOT NULL,
                birth_date TEXT NOT NULL,
                age INTEGER NOT NULL,
                documents TEXT NOT NULL DEFAULT '[]',
                user_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_patients_user ON patients(user_id);
        "#)?;

        Ok(())
    }

    // --- Users ---

    /// Register a user; usernames are unique
    pub async fn create_user(&self, username: &str, password: &str) -> StoreResult<UserRecord> {
        let conn = self.conn.lock().await;

        let exists: Option<String> = conn.query_row(
            "SELECT id FROM users WHERE username = ?1",
            params![username],
            |row| row.get(0),
        ).optional()?;
        if exists.is_some() {
            return Err(StorageError::DuplicateUser(username.to_string()));
        }

        let record = UserRecord {
            id: user_id_for(username),
            username: username.to_string(),
            email: format!("{}@datai.local", username),
            password_hash: hash_password(password)
                .map_err(|e| StorageError::Hashing(e.to_string()))?,
            created_at: Utc::now(),
        };

        conn.execute(
            "INSERT INTO users (id, username, email, password_hash, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.id,
                record.username,
                record.email,
                record.password_hash,
                record.created_at.to_rfc3339(),
            ],
        )?;

        info!("Registered user {}", record.username);
        Ok(record)
    }

    pub async fn find_user(&self, username: &str) -> StoreResult<Option<UserRecord>> {
        let conn = self.conn.lock().await;

        let mut stmt = conn.prepare_cached(
            "SELECT id, username, email, password_hash, created_at FROM users WHERE username = ?1"
        )?;
        let user = stmt.query_row(params![username], user_from_row).optional()?;
        Ok(user)
    }

    /// Return the user when the password matches
    pub async fn verify_credentials(&self, username: &str, password: &str) -> StoreResult<Option<UserRecord>> {
        let Some(user) = self.find_user(username).await? else {
            return Ok(None);
        };
        let ok = verify_password(password, &user.password_hash)
            .map_err(|e| StorageError::Hashing(e.to_string()))?;
        Ok(ok.then_some(user))
    }

    pub async fn list_users(&self) -> StoreResult<Vec<UserRecord>> {
        let conn = self.conn.lock().await;

        let mut stmt = conn.prepare_cached(
            "SELECT id, username, email, password_hash, created_at FROM users ORDER BY username"
        )?;
        let users = stmt.query_map([], user_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(users)
    }

    // --- Patients ---

    pub async fn create_patient(
        &self,
        user_id: &str,
        patient: &ValidPatient,
        documents: &[PathBuf],
    ) -> StoreResult<PatientRecord> {
        let conn = self.conn.lock().await;
        let now = Utc::now();
        let documents_json = serde_json::to_string(documents)?;

        conn.execute(
            r#"INSERT INTO patients
               (first_name, last_name, sex, birth_date, age, documents, user_id, created_at, updated_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)"#,
            params![
                patient.first_name,
                patient.last_name,
                patient.sex.as_str(),
                patient.birth_date.to_string(),
                patient.age,
                documents_json,
                user_id,
                now.to_rfc3339(),
            ],
        )?;

        let id = conn.last_insert_rowid();
        info!("Created patient {} for user {}", id, user_id);

        Ok(PatientRecord {
            id,
            first_name: patient.first_name.clone(),
            last_name: patient.last_name.clone(),
            sex: patient.sex,
            birth_date: patient.birth_date,
            age: patient.age,
            documents: documents.to_vec(),
            user_id: user_id.to_string(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Patients owned by the user, ordered by name
    pub async fn list_patients(&self, user_id: &str) -> StoreResult<Vec<PatientSummary>> {
        let conn = self.conn.lock().await;

        let mut stmt = conn.prepare_cached(
            "SELECT id, first_name, last_name, sex, age, documents
             FROM patients WHERE user_id = ?1
             ORDER BY first_name, last_name, id"
        )?;

        let rows = stmt.query_map(params![user_id], |row| {
            let sex: String = row.get(3)?;
            let documents: String = row.get(5)?;
            Ok(PatientSummary {
                id: row.get(0)?,
                first_name: row.get(1)?,
                last_name: row.get(2)?,
                sex: Sex::parse(&sex).unwrap_or(Sex::Other),
                age: row.get(4)?,
                document_count: serde_json::from_str::<Vec<PathBuf>>(&documents)
                    .map(|d| d.len())
                    .unwrap_or(0),
            })
        })?.collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    /// Load a patient only if it belongs to the user
    pub async fn get_patient(&self, id: i64, user_id: &str) -> StoreResult<Option<PatientRecord>> {
        let conn = self.conn.lock().await;
        Self::load_patient(&conn, id, user_id)
    }

    /// User id owning a patient, if the patient exists
    pub async fn patient_owner(&self, id: i64) -> StoreResult<Option<String>> {
        let conn = self.conn.lock().await;
        let owner = conn
            .query_row("SELECT user_id FROM patients WHERE id = ?1", params![id], |row| row.get(0))
            .optional()?;
        Ok(owner)
    }

    fn load_patient(conn: &Connection, id: i64, user_id: &str) -> StoreResult<Option<PatientRecord>> {
        let mut stmt = conn.prepare_cached(
            "SELECT id, first_name, last_name, sex, birth_date, age, documents, user_id, created_at, updated_at
             FROM patients WHERE id = ?1 AND user_id = ?2"
        )?;
        let patient = stmt.query_row(params![id, user_id], patient_from_row).optional()?;
        Ok(patient)
    }

    /// Update a patient's fields; documents are replaced only when given.
    ///
    /// Returns the updated record and the document paths that were replaced.
    pub async fn update_patient(
        &self,
        id: i64,
        user_id: &str,
        patient: &ValidPatient,
        documents: Option<&[PathBuf]>,
    ) -> StoreResult<(PatientRecord, Vec<PathBuf>)> {
        let conn = self.conn.lock().await;

        let existing = Self::load_patient(&conn, id, user_id)?
            .ok_or_else(|| StorageError::NotFound(format!("patient {}", id)))?;

        let (new_documents, replaced) = match documents {
            Some(docs) => (docs.to_vec(), existing.documents.clone()),
            None => (existing.documents.clone(), Vec::new()),
        };
        let now = Utc::now();

        conn.execute(
            r#"UPDATE patients
               SET first_name = ?1, last_name = ?2, sex = ?3, birth_date = ?4, age = ?5,
                   documents = ?6, updated_at = ?7
               WHERE id = ?8 AND user_id = ?9"#,
            params![
                patient.first_name,
                patient.last_name,
                patient.sex.as_str(),
                patient.birth_date.to_string(),
                patient.age,
                serde_json::to_string(&new_documents)?,
                now.to_rfc3339(),
                id,
                user_id,
            ],
        )?;

        info!("Updated patient {}", id);

        let record = PatientRecord {
            first_name: patient.first_name.clone(),
            last_name: patient.last_name.clone(),
            sex: patient.sex,
            birth_date: patient.birth_date,
            age: patient.age,
            documents: new_documents,
            updated_at: now,
            ..existing
        };
        Ok((record, replaced))
    }

    /// Delete a patient, returning the removed record
    pub async fn delete_patient(&self, id: i64, user_id: &str) -> StoreResult<Option<PatientRecord>> {
        let conn = self.conn.lock().await;

        let Some(existing) = Self::load_patient(&conn, id, user_id)? else {
            return Ok(None);
        };

        conn.execute(
            "DELETE FROM patients WHERE id = ?1 AND user_id = ?2",
            params![id, user_id],
        )?;

        info!("Deleted patient {}", id);
        Ok(Some(existing))
    }

    /// Get store statistics
    pub async fn stats(&self) -> StoreResult<StoreStats> {
        let conn = self.conn.lock().await;

        let users: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        let patients: i64 = conn.query_row("SELECT COUNT(*) FROM patients", [], |row| row.get(0))?;
        let newest: Option<String> = conn.query_row(
            "SELECT MAX(updated_at) FROM patients", [],
            |row| row.get(0)
        )?;

        Ok(StoreStats {
            total_users: users as usize,
            total_patients: patients as usize,
            last_patient_update: newest,
        })
    }
}

/// Stable user id derived from the username
pub fn user_id_for(username: &str) -> String {
    let digest = Sha256::digest(username.as_bytes());
    hex::encode(digest)[..32].to_string()
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRecord> {
    let created_at: String = row.get(4)?;
    Ok(UserRecord {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        password_hash: row.get(3)?,
        created_at: parse_timestamp(&created_at),
    })
}

fn patient_from_row(row: &Row<'_>) -> rusqlite::Result<PatientRecord> {
    let sex: String = row.get(3)?;
    let birth_date: String = row.get(4)?;
    let documents: String = row.get(6)?;
    let created_at: String = row.get(8)?;
    let updated_at: String = row.get(9)?;

    Ok(PatientRecord {
        id: row.get(0)?,
        first_name: row.get(1)?,
        last_name: row.get(2)?,
        sex: Sex::parse(&sex).unwrap_or(Sex::Other),
        birth_date: NaiveDate::parse_from_str(&birth_date, "%Y-%m-%d")
            .unwrap_or(NaiveDate::MIN),
        age: row.get(5)?,
        documents: serde_json::from_str(&documents).unwrap_or_default(),
        user_id: row.get(7)?,
        created_at: parse_timestamp(&created_at),
        updated_at: parse_timestamp(&updated_at),
    })
}

/// Store statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct StoreStats {
    pub total_users: usize,
    pub total_patients: usize,
    pub last_patient_update: Option<String>,
}
