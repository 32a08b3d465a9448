//! Files attached to a job application: naming, remote layout and staged
//! uploads.

use std::collections::HashSet;
use std::path::Path;

use bytes::Bytes;
use futures_util::stream::{self, StreamExt};
use thiserror::Error;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::models::NewJobFile;
use crate::storage::RemoteStorage;

pub const REMOTE_ROOT: &str = "/job-tracker";
const FALLBACK_FILE_TYPE: &str = "application/octet-stream";

/// A file part as received from the client.
#[derive(Debug, Clone)]
pub struct IncomingFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

/// A file that has been named and placed, ready to upload.
#[derive(Debug, Clone)]
pub struct PreparedFile {
    pub id: Uuid,
    pub file_name: String,
    pub file_type: String,
    pub remote_path: String,
    pub bytes: Bytes,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid file name '{0}'")]
pub struct InvalidFileName(pub String);

#[derive(Debug, Error)]
pub enum StagingError {
    #[error("failed to upload {path}: {reason}")]
    Upload { path: String, reason: String },
}

pub fn remote_collection(job_id: Uuid) -> String {
    format!("{REMOTE_ROOT}/{job_id}")
}

pub fn remote_path(job_id: Uuid, file_name: &str) -> String {
    format!("{REMOTE_ROOT}/{job_id}/{file_name}")
}

/// Keeps only the final component of a client-supplied name.
pub fn sanitize_file_name(raw: &str) -> Result<String, InvalidFileName> {
    let base = raw
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();

    if base.is_empty() || base == "." || base == ".." || base.chars().any(char::is_control) {
        return Err(InvalidFileName(raw.to_string()));
    }

    Ok(base.to_string())
}

/// Returns `name`, or `stem (n).ext` for the smallest `n >= 2` not in `taken`.
pub fn dedupe_file_name(name: &str, taken: &HashSet<String>) -> String {
    if !taken.contains(name) {
        return name.to_string();
    }

    let path = Path::new(name);
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(name);
    let extension = path.extension().and_then(|s| s.to_str());

    (2..)
        .map(|n| match extension {
            Some(ext) => format!("{stem} ({n}).{ext}"),
            None => format!("{stem} ({n})"),
        })
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or_else(|| name.to_string())
}

pub fn resolve_file_type(declared: Option<&str>, file_name: &str) -> String {
    declared
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| {
            mime_guess::from_path(file_name)
                .first_raw()
                .unwrap_or(FALLBACK_FILE_TYPE)
                .to_string()
        })
}

/// Names and places every non-empty file. Empty parts are dropped.
pub fn prepare_files(
    job_id: Uuid,
    incoming: Vec<IncomingFile>,
    existing_names: &[String],
) -> Result<Vec<PreparedFile>, InvalidFileName> {
    let mut taken: HashSet<String> = existing_names.iter().cloned().collect();
    let mut prepared = Vec::with_capacity(incoming.len());

    for file in incoming {
        if file.bytes.is_empty() {
            debug!(file_name = %file.file_name, "skipping empty file part");
            continue;
        }

        let sanitized = sanitize_file_name(&file.file_name)?;
        let file_name = dedupe_file_name(&sanitized, &taken);
        taken.insert(file_name.clone());

        prepared.push(PreparedFile {
            id: Uuid::new_v4(),
            file_type: resolve_file_type(file.content_type.as_deref(), &file_name),
            remote_path: remote_path(job_id, &file_name),
            file_name,
            bytes: file.bytes,
        });
    }

    Ok(prepared)
}

pub fn to_new_job_files(job_id: Uuid, files: &[PreparedFile]) -> Vec<NewJobFile> {
    files
        .iter()
        .map(|file| NewJobFile {
            id: file.id,
            job_application_id: job_id,
            file_name: file.file_name.clone(),
            file_type: file.file_type.clone(),
            nextcloud_path: file.remote_path.clone(),
        })
        .collect()
}

/// Uploads every file with at most `concurrency` requests in flight. On the
/// first failure the remaining uploads are abandoned and everything already
/// written is removed again.
pub async fn stage_uploads(
    storage: &dyn RemoteStorage,
    files: &[PreparedFile],
    concurrency: usize,
) -> Result<(), StagingError> {
    let mut uploads = stream::iter(files.iter().cloned())
        .map(|file| async move {
            match storage
                .upload_file(&file.remote_path, file.bytes, Some(&file.file_type))
                .await
            {
                Ok(()) => Ok(file.remote_path),
                Err(err) => Err((file.remote_path, err)),
            }
        })
        .buffer_unordered(concurrency.max(1));

    let mut failure = None;
    while let Some(result) = uploads.next().await {
        match result {
            Ok(path) => debug!(%path, "uploaded job file"),
            Err((path, err)) => {
                error!(%path, error = ?err, "job file upload failed");
                failure = Some(StagingError::Upload {
                    path,
                    reason: err.to_string(),
                });
                break;
            }
        }
    }
    drop(uploads);

    match failure {
        Some(err) => {
            discard_uploads(storage, files).await;
            Err(err)
        }
        None => Ok(()),
    }
}

/// Best-effort removal of staged files; failures are only logged.
pub async fn discard_uploads(storage: &dyn RemoteStorage, files: &[PreparedFile]) {
    for file in files {
        if let Err(err) = storage.delete(&file.remote_path).await {
            warn!(path = %file.remote_path, error = %err, "failed to remove staged job file");
        }
    }
}
