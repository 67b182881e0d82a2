//! HTTP handlers
//!
//! Every handler returns `Result<_, ApiError>`, so failures reach the client
//! as `{"error", "details"}` JSON with a matching status code.

use axum::{
    body::Bytes,
    extract::{Multipart, Path, Request, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tower::ServiceExt;
use tower_http::services::ServeFile;
use tracing::{info, warn};

use crate::analysis::{load_dataset_from_bytes, AnalysisReport, Dataset, FileFormat, NumberFormat};
use crate::chatbot::BotReply;
use crate::config::AnalysisConfig;
use crate::error::ApiError;
use crate::patient::{NewPatient, PatientRecord, PatientSummary, Sex, UserRecord};
use crate::server::auth::{
    Claims, LoginRequest, LoginResponse, LogoutRequest, RefreshRequest, RegisterRequest, TokenType,
};
use crate::server::AppState;
use crate::storage::{original_name, secure_filename};
use crate::types::Message;

/// Status response
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: String,
    pub version: String,
    pub auth_enabled: bool,
    pub users: usize,
    pub patients: usize,
    pub cached_datasets: usize,
}

/// A stored document as shown to clients
#[derive(Debug, Serialize, Deserialize)]
pub struct DocumentView {
    pub index: usize,
    pub name: String,
}

/// Patient record without server-side paths
#[derive(Debug, Serialize, Deserialize)]
pub struct PatientView {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub sex: Sex,
    pub birth_date: NaiveDate,
    pub age: u32,
    pub documents: Vec<DocumentView>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&PatientRecord> for PatientView {
    fn from(record: &PatientRecord) -> Self {
        Self {
            id: record.id,
            first_name: record.first_name.clone(),
            last_name: record.last_name.clone(),
            full_name: record.full_name(),
            sex: record.sex,
            birth_date: record.birth_date,
            age: record.age,
            documents: record
                .documents
                .iter()
                .enumerate()
                .map(|(index, path)| DocumentView { index, name: original_name(path) })
                .collect(),
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PatientAnalysisResponse {
    pub patient: PatientView,
    pub report: AnalysisReport,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub question: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    #[serde(flatten)]
    pub reply: BotReply,
    pub history_len: usize,
}

/// A file part of a multipart body
struct Upload {
    name: String,
    bytes: Bytes,
}

// --- Auth ---

pub async fn register_handler(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<UserRecord>), ApiError> {
    let username = req.username.trim();
    if username.is_empty() || req.password.is_empty() {
        return Err(ApiError::Validation("Username and password are required".to_string()));
    }
    if !username.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')) {
        return Err(ApiError::Validation(
            "Username may only contain letters, digits, '.', '_' and '-'".to_string(),
        ));
    }

    let user = state.store.create_user(username, &req.password).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn login_handler(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let username = req.username.trim();

    if let Some(remaining) = state.auth_state.is_locked(username) {
        warn!("Login refused for locked account {}", username);
        return Err(ApiError::LockedOut(remaining.num_minutes() + 1));
    }

    let Some(user) = state.store.verify_credentials(username, &req.password).await? else {
        state.auth_state.record_failed_login(username);
        return Err(ApiError::Unauthorized);
    };

    state.auth_state.clear_login_attempts(username);
    info!("User {} logged in", user.username);
    Ok(Json(issue_tokens(&state, &user.id, &user.username)?))
}

pub async fn refresh_handler(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let claims = state
        .auth_state
        .validate_token(&req.refresh_token)
        .map_err(|_| ApiError::Unauthorized)?;

    if claims.token_type != TokenType::Refresh {
        return Err(ApiError::Unauthorized);
    }

    // Refresh tokens are single use
    state.auth_state.revoke_token(&claims.jti);
    Ok(Json(issue_tokens(&state, &claims.sub, &claims.username)?))
}

pub async fn logout_handler(
    State(state): State<AppState>,
    Json(req): Json<LogoutRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let jti = state
        .auth_state
        .extract_jti(&req.token)
        .map_err(|e| ApiError::Validation(format!("Invalid token: {}", e)))?;
    state.auth_state.revoke_token(&jti);
    Ok(Json(json!({ "message": "Logged out successfully" })))
}

fn issue_tokens(state: &AppState, user_id: &str, username: &str) -> Result<LoginResponse, ApiError> {
    Ok(LoginResponse {
        access_token: state.auth_state.generate_access_token(user_id, username)?,
        refresh_token: state.auth_state.generate_refresh_token(user_id, username)?,
        token_type: "Bearer".to_string(),
        expires_in: state.auth_state.access_token_ttl(),
    })
}

pub async fn status_handler(State(state): State<AppState>) -> Result<Json<StatusResponse>, ApiError> {
    let stats = state.store.stats().await?;
    Ok(Json(StatusResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        auth_enabled: true,
        users: stats.total_users,
        patients: stats.total_patients,
        cached_datasets: state.cache.len().await,
    }))
}

// --- Guest ---

/// Analyse an upload without storing it
pub async fn guest_analysis_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<AnalysisReport>, ApiError> {
    let mut file = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some("file") {
            file = read_upload(field).await?;
        }
    }

    let upload = file.ok_or_else(|| ApiError::Validation("Please select a file".to_string()))?;
    let dataset = parse_upload(upload, &state.config.analysis).await?;
    Ok(Json(AnalysisReport::from_dataset(&dataset)))
}

/// Answer one question about an upload without storing it
pub async fn guest_chat_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<BotReply>, ApiError> {
    let mut file = None;
    let mut question = String::new();
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => file = read_upload(field).await?,
            Some("question") => question = field.text().await?,
            _ => {}
        }
    }

    let question = question.trim();
    if question.is_empty() {
        return Err(ApiError::Validation("Question is required".to_string()));
    }

    let dataset = match file {
        Some(upload) => Some(parse_upload(upload, &state.config.analysis).await?),
        None => None,
    };
    Ok(Json(state.bot.respond(question, dataset.as_ref())))
}

// --- Patients ---

pub async fn list_patients_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<PatientSummary>>, ApiError> {
    Ok(Json(state.store.list_patients(&claims.sub).await?))
}

pub async fn create_patient_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<PatientView>), ApiError> {
    let (form, uploads) = read_patient_form(multipart).await?;
    let patient = form
        .validate(Utc::now().date_naive())
        .map_err(ApiError::Validation)?;

    if uploads.is_empty() {
        return Err(ApiError::Validation(
            "Fill in every field and select at least one document".to_string(),
        ));
    }

    let documents = save_uploads(&state, &claims.sub, uploads).await?;
    let record = match state.store.create_patient(&claims.sub, &patient, &documents).await {
        Ok(record) => record,
        Err(e) => {
            state.documents.remove_all(&documents).await;
            return Err(e.into());
        }
    };

    Ok((StatusCode::CREATED, Json(PatientView::from(&record))))
}

pub async fn get_patient_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<Json<PatientView>, ApiError> {
    let record = owned_patient(&state, id, &claims.sub).await?;
    Ok(Json(PatientView::from(&record)))
}

/// Update patient fields; uploaded documents replace the stored ones
pub async fn update_patient_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    multipart: Multipart,
) -> Result<Json<PatientView>, ApiError> {
    owned_patient(&state, id, &claims.sub).await?;

    let (form, uploads) = read_patient_form(multipart).await?;
    let patient = form
        .validate(Utc::now().date_naive())
        .map_err(ApiError::Validation)?;

    let new_documents = if uploads.is_empty() {
        None
    } else {
        Some(save_uploads(&state, &claims.sub, uploads).await?)
    };

    let (record, replaced) = match state
        .store
        .update_patient(id, &claims.sub, &patient, new_documents.as_deref())
        .await
    {
        Ok(updated) => updated,
        Err(e) => {
            if let Some(saved) = &new_documents {
                state.documents.remove_all(saved).await;
            }
            return Err(e.into());
        }
    };

    if !replaced.is_empty() {
        state.cache.invalidate(&replaced).await;
        state.documents.remove_all(&replaced).await;
    }

    Ok(Json(PatientView::from(&record)))
}

pub async fn delete_patient_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    owned_patient(&state, id, &claims.sub).await?;

    let record = state
        .store
        .delete_patient(id, &claims.sub)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Patient {}", id)))?;

    state.cache.invalidate(&record.documents).await;
    state.documents.remove_all(&record.documents).await;
    state.sessions.clear(&claims.sub, id);

    Ok(Json(json!({ "deleted": id })))
}

/// Statistics and chart data for the patient's first document
pub async fn patient_analysis_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<Json<PatientAnalysisResponse>, ApiError> {
    let record = owned_patient(&state, id, &claims.sub).await?;
    let dataset = patient_dataset(&state, &record).await?;

    Ok(Json(PatientAnalysisResponse {
        patient: PatientView::from(&record),
        report: AnalysisReport::from_dataset(&dataset),
    }))
}

pub async fn download_document_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((id, index)): Path<(i64, usize)>,
    request: Request,
) -> Result<Response, ApiError> {
    let record = owned_patient(&state, id, &claims.sub).await?;
    let path = record
        .documents
        .get(index)
        .ok_or_else(|| ApiError::NotFound(format!("Document {} of patient {}", index, id)))?;

    let mut response = ServeFile::new(path)
        .oneshot(request)
        .await
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("Failed to serve file: {}", e)))?
        .into_response();

    if response.status() == StatusCode::NOT_FOUND {
        return Err(ApiError::NotFound(format!("File for document {}", index)));
    }

    let disposition = format!("attachment; filename=\"{}\"", original_name(path));
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        response.headers_mut().insert(header::CONTENT_DISPOSITION, value);
    }
    Ok(response)
}

// --- Patient chat ---

pub async fn patient_chat_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let question = req.question.trim();
    if question.is_empty() {
        return Err(ApiError::Validation("Question is required".to_string()));
    }

    let record = owned_patient(&state, id, &claims.sub).await?;
    let dataset = patient_dataset(&state, &record).await?;
    let reply = state.bot.respond(question, Some(&dataset));

    state.sessions.append(
        &claims.sub,
        id,
        [Message::user(question), Message::assistant(reply.answer.clone())],
    );

    Ok(Json(ChatResponse {
        reply,
        history_len: state.sessions.history(&claims.sub, id).len(),
    }))
}

pub async fn chat_history_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<Message>>, ApiError> {
    owned_patient(&state, id, &claims.sub).await?;
    Ok(Json(state.sessions.history(&claims.sub, id)))
}

pub async fn clear_chat_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    owned_patient(&state, id, &claims.sub).await?;
    let cleared = state.sessions.clear(&claims.sub, id);
    Ok(Json(json!({ "cleared": cleared })))
}

// --- Helpers ---

/// Load a patient, distinguishing missing from someone else's
async fn owned_patient(state: &AppState, id: i64, user_id: &str) -> Result<PatientRecord, ApiError> {
    match state.store.patient_owner(id).await? {
        None => Err(ApiError::NotFound(format!("Patient {}", id))),
        Some(owner) if owner != user_id => {
            warn!("User {} denied access to patient {}", user_id, id);
            Err(ApiError::AccessDenied)
        }
        Some(_) => state
            .store
            .get_patient(id, user_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("Patient {}", id))),
    }
}

async fn patient_dataset(state: &AppState, record: &PatientRecord) -> Result<Arc<Dataset>, ApiError> {
    let path = record
        .primary_document()
        .ok_or_else(|| ApiError::NotFound(format!("Document of patient {}", record.id)))?;
    Ok(state
        .cache
        .get_or_load(path, NumberFormat::DecimalComma, &state.config.analysis)
        .await?)
}

/// File part, or `None` when the browser sent an empty file input
async fn read_upload(field: axum::extract::multipart::Field<'_>) -> Result<Option<Upload>, ApiError> {
    let name = field.file_name().unwrap_or_default().to_string();
    let bytes = field.bytes().await?;
    if name.is_empty() && bytes.is_empty() {
        return Ok(None);
    }
    Ok(Some(Upload { name, bytes }))
}

async fn read_patient_form(mut multipart: Multipart) -> Result<(NewPatient, Vec<Upload>), ApiError> {
    let mut form = NewPatient::default();
    let mut uploads = Vec::new();

    while let Some(field) = multipart.next_field().await? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        match name.as_str() {
            "first_name" => form.first_name = field.text().await?,
            "last_name" => form.last_name = field.text().await?,
            "sex" => form.sex = field.text().await?,
            "birth_date" => form.birth_date = field.text().await?,
            "documents" | "documents[]" => {
                if let Some(upload) = read_upload(field).await? {
                    uploads.push(upload);
                }
            }
            _ => {}
        }
    }

    Ok((form, uploads))
}

/// Check every format first so a bad file leaves nothing behind.
///
/// The stored name is what gets parsed later, so that is the one checked.
async fn save_uploads(state: &AppState, user_id: &str, uploads: Vec<Upload>) -> Result<Vec<PathBuf>, ApiError> {
    for upload in &uploads {
        FileFormat::from_name(&secure_filename(&upload.name))?;
    }

    let mut saved = Vec::with_capacity(uploads.len());
    for upload in uploads {
        match state.documents.save(user_id, &upload.name, &upload.bytes).await {
            Ok(path) => saved.push(path),
            Err(e) => {
                state.documents.remove_all(&saved).await;
                return Err(e.into());
            }
        }
    }
    Ok(saved)
}

async fn parse_upload(upload: Upload, config: &AnalysisConfig) -> Result<Dataset, ApiError> {
    let config = config.clone();
    let dataset = tokio::task::spawn_blocking(move || {
        load_dataset_from_bytes(&upload.name, &upload.bytes, NumberFormat::Robust, &config)
    })
    .await
    .map_err(|e| ApiError::Internal(e.into()))??;
    Ok(dataset)
}
