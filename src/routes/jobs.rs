use axum::extract::rejection::PathRejection;
use axum::extract::{Json, Multipart, Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, NaiveDate};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::applications::{
    delete_application, find_application, insert_application, list_applications,
    lock_application, stored_file_names, update_application, JobRecord, StoreError,
};
use crate::attachments::{
    discard_uploads, prepare_files, remote_collection, stage_uploads, to_new_job_files,
    IncomingFile, PreparedFile,
};
use crate::error::{AppError, AppResult, ErrorKind, JobError};
use crate::models::{JobApplicationChangeset, JobStatus, NewJobApplication};
use crate::state::AppState;

pub const FETCH_FAILED: &str = "Failed to fetch jobs";
pub const CREATE_FAILED: &str = "Failed to create job application";
pub const UPDATE_FAILED: &str = "Failed to update job application";
pub const DELETE_FAILED: &str = "Failed to delete job application";

/// Raw form values as submitted. A present-but-empty value is `Some("")`.
#[derive(Debug, Default)]
struct SubmittedJob {
    company_name: Option<String>,
    job_title: Option<String>,
    job_description: Option<String>,
    job_url: Option<String>,
    status: Option<String>,
    has_been_contacted: Option<String>,
    date_submitted: Option<String>,
    date_of_interview: Option<String>,
    confirmation_received: Option<String>,
    rejection_received: Option<String>,
    files: Vec<IncomingFile>,
}

pub async fn list_jobs(State(state): State<AppState>) -> AppResult<Json<Vec<JobRecord>>> {
    let jobs = state
        .db()
        .and_then(|mut conn| list_applications(&mut conn))
        .map_err(|err| {
            error!(error = %err, "failed to fetch jobs");
            JobError::from(err).into_app_error(FETCH_FAILED)
        })?;

    debug!(count = jobs.len(), "fetched jobs");
    Ok(Json(jobs))
}

pub async fn get_job(
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
) -> AppResult<Json<JobRecord>> {
    let job_id = job_id_from(path)?;
    let job = state
        .db()
        .and_then(|mut conn| find_application(&mut conn, job_id))
        .map_err(JobError::from)
        .and_then(|job| job.ok_or(JobError::NotFound))
        .map_err(|err| {
            log_failure("fetch", Some(job_id), &err);
            err.into_app_error(FETCH_FAILED)
        })?;

    Ok(Json(job))
}

pub async fn create_job(
    State(state): State<AppState>,
    multipart: Multipart,
) -> AppResult<Json<JobRecord>> {
    match create(&state, multipart).await {
        Ok(job) => {
            info!(
                job_id = %job.id,
                company_name = %job.company_name,
                files = job.files.len(),
                "job application created"
            );
            Ok(Json(job))
        }
        Err(err) => {
            log_failure("create", None, &err);
            Err(err.into_app_error(CREATE_FAILED))
        }
    }
}

pub async fn update_job(
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
    multipart: Multipart,
) -> AppResult<Json<JobRecord>> {
    let job_id = job_id_from(path)?;
    match update(&state, job_id, multipart).await {
        Ok(job) => {
            info!(job_id = %job.id, files = job.files.len(), "job application updated");
            Ok(Json(job))
        }
        Err(err) => {
            log_failure("update", Some(job_id), &err);
            Err(err.into_app_error(UPDATE_FAILED))
        }
    }
}

pub async fn delete_job(
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
) -> AppResult<StatusCode> {
    let job_id = job_id_from(path)?;
    let deleted = state
        .db()
        .and_then(|mut conn| delete_application(&mut conn, job_id))
        .map_err(JobError::from)
        .and_then(|deleted| deleted.then_some(()).ok_or(JobError::NotFound));

    if let Err(err) = deleted {
        log_failure("delete", Some(job_id), &err);
        return Err(err.into_app_error(DELETE_FAILED));
    }

    let collection = remote_collection(job_id);
    if let Err(err) = state.storage.delete(&collection).await {
        warn!(%job_id, path = %collection, error = %err, "failed to remove job files from storage");
    }

    info!(%job_id, "job application deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn create(state: &AppState, multipart: Multipart) -> Result<JobRecord, JobError> {
    let submitted = read_submission(multipart).await?;

    let job_id = Uuid::new_v4();
    let new_job = new_application(job_id, &submitted)?;
    let files = prepare_files(job_id, submitted.files, &[])?;

    stage_uploads(
        state.storage.as_ref(),
        &files,
        state.config.webdav_max_concurrent_uploads,
    )
    .await?;

    let rows = to_new_job_files(job_id, &files);
    let persisted = state
        .db()
        .and_then(|mut conn| insert_application(&mut conn, &new_job, &rows));
    if let Err(err) = persisted {
        discard_staged(state, &files).await;
        return Err(err.into());
    }

    let mut conn = state.db()?;
    find_application(&mut conn, job_id)?.ok_or(JobError::NotFound)
}

async fn update(
    state: &AppState,
    job_id: Uuid,
    multipart: Multipart,
) -> Result<JobRecord, JobError> {
    let submitted = read_submission(multipart).await?;
    let changes = changeset(&submitted)?;

    // Held until commit: stored names cannot be claimed by a concurrent edit
    // while this request stages files under them.
    let conn = state.db()?;
    let mut lock = tokio::task::spawn_blocking(move || lock_application(conn, job_id))
        .await
        .map_err(StoreError::from)??
        .ok_or(JobError::NotFound)?;

    let existing_names = stored_file_names(lock.conn(), job_id)?;
    let files = prepare_files(job_id, submitted.files, &existing_names)?;
    stage_uploads(
        state.storage.as_ref(),
        &files,
        state.config.webdav_max_concurrent_uploads,
    )
    .await?;

    let rows = to_new_job_files(job_id, &files);
    if let Err(err) = update_application(lock.conn(), job_id, &changes, &rows) {
        // Still locked, so nobody else can have written to these paths.
        discard_staged(state, &files).await;
        return Err(err.into());
    }
    if let Err(err) = lock.commit() {
        // The lock is gone; another edit may already reuse these names.
        if !files.is_empty() {
            warn!(
                %job_id,
                files = files.len(),
                "leaving staged files in storage after failed commit"
            );
        }
        return Err(err.into());
    }

    let mut conn = state.db()?;
    find_application(&mut conn, job_id)?.ok_or(JobError::NotFound)
}

async fn discard_staged(state: &AppState, files: &[PreparedFile]) {
    if !files.is_empty() {
        discard_uploads(state.storage.as_ref(), files).await;
    }
}

fn job_id_from(path: Result<Path<Uuid>, PathRejection>) -> AppResult<Uuid> {
    path.map(|Path(job_id)| job_id).map_err(|rejection| {
        debug!(error = %rejection, "rejected malformed job id");
        AppError::bad_request("invalid job id")
    })
}

async fn read_submission(mut multipart: Multipart) -> Result<SubmittedJob, JobError> {
    let mut submitted = SubmittedJob::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| JobError::Validation(format!("invalid multipart data: {err}")))?
    {
        let name = field.name().map(|n| n.to_string());
        if name.as_deref() == Some("files") {
            let file_name = field.file_name().map(|n| n.to_string()).unwrap_or_default();
            let content_type = field.content_type().map(|mime| mime.to_string());
            let bytes = field.bytes().await.map_err(|err| {
                JobError::Validation(format!("failed to read file bytes: {err}"))
            })?;
            submitted.files.push(IncomingFile {
                file_name,
                content_type,
                bytes,
            });
            continue;
        }

        let slot = match name.as_deref() {
            Some("companyName") => &mut submitted.company_name,
            Some("jobTitle") => &mut submitted.job_title,
            Some("jobDescription") => &mut submitted.job_description,
            Some("jobUrl") => &mut submitted.job_url,
            Some("status") => &mut submitted.status,
            Some("hasBeenContacted") => &mut submitted.has_been_contacted,
            Some("dateSubmitted") => &mut submitted.date_submitted,
            Some("dateOfInterview") => &mut submitted.date_of_interview,
            Some("confirmationReceived") => &mut submitted.confirmation_received,
            Some("rejectionReceived") => &mut submitted.rejection_received,
            _ => continue,
        };

        let value = field.text().await.map_err(|err| {
            JobError::Validation(format!("invalid value for {}: {err}", name.unwrap_or_default()))
        })?;
        // First occurrence wins.
        if slot.is_none() {
            *slot = Some(value);
        }
    }

    Ok(submitted)
}

fn new_application(job_id: Uuid, submitted: &SubmittedJob) -> Result<NewJobApplication, JobError> {
    Ok(NewJobApplication {
        id: job_id,
        company_name: required_text(submitted.company_name.as_deref(), "companyName")?,
        job_title: required_text(submitted.job_title.as_deref(), "jobTitle")?,
        job_description: optional_text(submitted.job_description.as_deref()),
        job_url: optional_text(submitted.job_url.as_deref()),
        status: parse_status(submitted.status.as_deref())?.as_str().to_string(),
        // Contact is only tracked after creation.
        has_been_contacted: false,
        date_submitted: parse_date(submitted.date_submitted.as_deref(), "dateSubmitted")?,
        date_of_interview: parse_date(submitted.date_of_interview.as_deref(), "dateOfInterview")?,
        confirmation_received: parse_flag(submitted.confirmation_received.as_deref()),
        rejection_received: parse_flag(submitted.rejection_received.as_deref()),
    })
}

fn changeset(submitted: &SubmittedJob) -> Result<JobApplicationChangeset, JobError> {
    let mut changes = JobApplicationChangeset::default();

    if let Some(value) = submitted.company_name.as_deref() {
        changes.company_name = Some(required_text(Some(value), "companyName")?);
    }
    if let Some(value) = submitted.job_title.as_deref() {
        changes.job_title = Some(required_text(Some(value), "jobTitle")?);
    }
    if let Some(value) = submitted.job_description.as_deref() {
        changes.job_description = Some(optional_text(Some(value)));
    }
    if let Some(value) = submitted.job_url.as_deref() {
        changes.job_url = Some(optional_text(Some(value)));
    }
    if let Some(value) = submitted.status.as_deref() {
        changes.status = Some(parse_status(Some(value))?.as_str().to_string());
    }
    if let Some(value) = submitted.has_been_contacted.as_deref() {
        changes.has_been_contacted = Some(parse_flag(Some(value)));
    }
    if let Some(value) = submitted.date_submitted.as_deref() {
        changes.date_submitted = Some(parse_date(Some(value), "dateSubmitted")?);
    }
    if let Some(value) = submitted.date_of_interview.as_deref() {
        changes.date_of_interview = Some(parse_date(Some(value), "dateOfInterview")?);
    }
    if let Some(value) = submitted.confirmation_received.as_deref() {
        changes.confirmation_received = Some(parse_flag(Some(value)));
    }
    if let Some(value) = submitted.rejection_received.as_deref() {
        changes.rejection_received = Some(parse_flag(Some(value)));
    }

    Ok(changes)
}

fn required_text(value: Option<&str>, field: &str) -> Result<String, JobError> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| JobError::Validation(format!("{field} is required")))
}

fn optional_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn parse_status(value: Option<&str>) -> Result<JobStatus, JobError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(JobStatus::default()),
        Some(raw) => raw
            .parse()
            .map_err(|err| JobError::Validation(format!("status: {err}"))),
    }
}

/// Accepts `YYYY-MM-DD` or an RFC 3339 timestamp (its date part is kept).
fn parse_date(value: Option<&str>, field: &str) -> Result<Option<NaiveDate>, JobError> {
    let Some(raw) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| DateTime::parse_from_rfc3339(raw).map(|dt| dt.date_naive()))
        .map(Some)
        .map_err(|_| JobError::Validation(format!("{field} must be a date in YYYY-MM-DD format")))
}

fn parse_flag(value: Option<&str>) -> bool {
    value == Some("true")
}

fn log_failure(operation: &str, job_id: Option<Uuid>, err: &JobError) {
    let job_id = job_id.map(|id| id.to_string()).unwrap_or_default();
    match err.kind() {
        ErrorKind::Validation => {
            warn!(%operation, %job_id, error = %err, "rejected job application request")
        }
        ErrorKind::NotFound => debug!(%operation, %job_id, "job application not found"),
        ErrorKind::Persistence | ErrorKind::Upload => {
            error!(%operation, %job_id, kind = ?err.kind(), error = ?err, "job application request failed")
        }
    }
}
