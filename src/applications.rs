//! Persistence for job applications and their attached files.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use diesel::connection::{AnsiTransactionManager, TransactionManager};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, PooledConnection};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    JobApplication, JobApplicationChangeset, JobFile, JobStatus, NewJobApplication, NewJobFile,
    UnknownStatus,
};
use crate::schema::{job_applications, job_files};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
    #[error("database pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),
    #[error("stored job {id} has invalid status: {source}")]
    InvalidStatus { id: Uuid, source: UnknownStatus },
    #[error("database task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type PgPooledConnection = PooledConnection<ConnectionManager<PgConnection>>;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobFileRecord {
    pub id: Uuid,
    pub file_name: String,
    pub file_type: String,
    pub nextcloud_path: String,
    pub job_application_id: Uuid,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub id: Uuid,
    pub company_name: String,
    pub job_title: String,
    pub job_description: Option<String>,
    pub job_url: Option<String>,
    pub status: JobStatus,
    pub has_been_contacted: bool,
    pub date_submitted: Option<NaiveDate>,
    pub date_of_interview: Option<NaiveDate>,
    pub confirmation_received: bool,
    pub rejection_received: bool,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub files: Vec<JobFileRecord>,
}

pub fn list_applications(conn: &mut PgConnection) -> StoreResult<Vec<JobRecord>> {
    let jobs: Vec<JobApplication> = job_applications::table
        .order((
            job_applications::updated_at.desc(),
            job_applications::created_at.desc(),
        ))
        .load(conn)?;

    let files: Vec<JobFile> = JobFile::belonging_to(&jobs)
        .order((job_files::created_at.asc(), job_files::file_name.asc()))
        .load(conn)?;

    files
        .grouped_by(&jobs)
        .into_iter()
        .zip(jobs)
        .map(|(files, job)| to_record(job, files))
        .collect()
}

pub fn find_application(conn: &mut PgConnection, job_id: Uuid) -> StoreResult<Option<JobRecord>> {
    let job: Option<JobApplication> = job_applications::table
        .find(job_id)
        .first(conn)
        .optional()?;

    let Some(job) = job else {
        return Ok(None);
    };

    let files: Vec<JobFile> = JobFile::belonging_to(&job)
        .order((job_files::created_at.asc(), job_files::file_name.asc()))
        .load(conn)?;

    to_record(job, files).map(Some)
}

/// Writes the job row and all of its file rows atomically.
pub fn insert_application(
    conn: &mut PgConnection,
    job: &NewJobApplication,
    files: &[NewJobFile],
) -> StoreResult<()> {
    conn.transaction(|conn| {
        diesel::insert_into(job_applications::table)
            .values(job)
            .execute(conn)?;

        if !files.is_empty() {
            diesel::insert_into(job_files::table)
                .values(files)
                .execute(conn)?;
        }

        Ok::<_, diesel::result::Error>(())
    })?;

    Ok(())
}

/// Applies `changes` and appends `new_files`. Returns `false` when the job
/// does not exist.
pub fn update_application(
    conn: &mut PgConnection,
    job_id: Uuid,
    changes: &JobApplicationChangeset,
    new_files: &[NewJobFile],
) -> StoreResult<bool> {
    let mut changes = changes.clone();
    changes.updated_at = Some(Utc::now().naive_utc());

    let updated = conn.transaction(|conn| {
        let updated = diesel::update(job_applications::table.find(job_id))
            .set(&changes)
            .execute(conn)?;

        if updated > 0 && !new_files.is_empty() {
            diesel::insert_into(job_files::table)
                .values(new_files)
                .execute(conn)?;
        }

        Ok::<_, diesel::result::Error>(updated)
    })?;

    Ok(updated > 0)
}

/// An open transaction holding the row lock of one job application.
///
/// Concurrent edits of the same job queue behind the lock, so file names read
/// through [`JobLock::conn`] stay unclaimed until [`JobLock::commit`].
/// Dropping the lock without committing rolls the transaction back.
pub struct JobLock {
    conn: PgPooledConnection,
    job_id: Uuid,
    open: bool,
}

impl JobLock {
    pub fn conn(&mut self) -> &mut PgConnection {
        &mut self.conn
    }

    pub fn commit(mut self) -> StoreResult<()> {
        self.open = false;
        AnsiTransactionManager::commit_transaction(&mut *self.conn)?;
        Ok(())
    }
}

impl Drop for JobLock {
    fn drop(&mut self) {
        if !self.open {
            return;
        }
        if let Err(err) = AnsiTransactionManager::rollback_transaction(&mut *self.conn) {
            tracing::warn!(job_id = %self.job_id, error = %err, "failed to roll back job transaction");
        }
    }
}

/// Begins a transaction and takes the row lock of `job_id`, blocking while
/// another transaction holds it. Returns `None` when the job does not exist.
pub fn lock_application(
    mut conn: PgPooledConnection,
    job_id: Uuid,
) -> StoreResult<Option<JobLock>> {
    AnsiTransactionManager::begin_transaction(&mut *conn)?;
    let mut lock = JobLock {
        conn,
        job_id,
        open: true,
    };

    let found = job_applications::table
        .find(job_id)
        .select(job_applications::id)
        .for_update()
        .first::<Uuid>(lock.conn())
        .optional()?;

    Ok(found.map(|_| lock))
}

/// Removes the job; its file rows go with it through the foreign key cascade.
pub fn delete_application(conn: &mut PgConnection, job_id: Uuid) -> StoreResult<bool> {
    let deleted = diesel::delete(job_applications::table.find(job_id)).execute(conn)?;
    Ok(deleted > 0)
}

pub fn stored_file_names(conn: &mut PgConnection, job_id: Uuid) -> StoreResult<Vec<String>> {
    let names = job_files::table
        .filter(job_files::job_application_id.eq(job_id))
        .select(job_files::file_name)
        .load(conn)?;
    Ok(names)
}

pub(crate) fn to_iso(dt: NaiveDateTime) -> String {
    DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc).to_rfc3339()
}

fn to_record(job: JobApplication, files: Vec<JobFile>) -> StoreResult<JobRecord> {
    let status = job
        .status
        .parse::<JobStatus>()
        .map_err(|source| StoreError::InvalidStatus { id: job.id, source })?;

    Ok(JobRecord {
        id: job.id,
        company_name: job.company_name,
        job_title: job.job_title,
        job_description: job.job_description,
        job_url: job.job_url,
        status,
        has_been_contacted: job.has_been_contacted,
        date_submitted: job.date_submitted,
        date_of_interview: job.date_of_interview,
        confirmation_received: job.confirmation_received,
        rejection_received: job.rejection_received,
        created_at: to_iso(job.created_at),
        updated_at: to_iso(job.updated_at),
        files: files.into_iter().map(to_file_record).collect(),
    })
}

fn to_file_record(file: JobFile) -> JobFileRecord {
    JobFileRecord {
        id: file.id,
        file_name: file.file_name,
        file_type: file.file_type,
        nextcloud_path: file.nextcloud_path,
        job_application_id: file.job_application_id,
        created_at: to_iso(file.created_at),
    }
}
