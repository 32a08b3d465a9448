//! Client-side job form: one state object holding every field, normalized
//! into a multipart submission for the jobs endpoint.

use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use chrono::NaiveDate;
use reqwest::multipart::{Form, Part};
use thiserror::Error;
use tracing::error;

use crate::applications::JobRecord;
use crate::models::JobStatus;

pub const BUSY_LABEL: &str = "Saving...";
pub const CREATE_LABEL: &str = "Create";
pub const UPDATE_LABEL: &str = "Update";

#[derive(Debug, Error)]
pub enum FormError {
    #[error("a submission is already in progress")]
    Busy,
    #[error("invalid content type '{content_type}' for {file_name}")]
    InvalidContentType {
        file_name: String,
        content_type: String,
    },
    #[error(transparent)]
    Submit(#[from] anyhow::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectedFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

impl SelectedFile {
    pub fn new(file_name: impl Into<String>, content_type: Option<String>, bytes: Bytes) -> Self {
        Self {
            file_name: file_name.into(),
            content_type,
            bytes,
        }
    }

    pub async fn read(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default()
            .to_string();
        let content_type = mime_guess::from_path(path)
            .first_raw()
            .map(str::to_string);
        Ok(Self::new(file_name, content_type, Bytes::from(bytes)))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FormValue {
    Text(String),
    File(SelectedFile),
}

/// Ordered name/value pairs, the shape a browser `FormData` would have.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobSubmission {
    fields: Vec<(String, FormValue)>,
}

impl JobSubmission {
    fn text(&mut self, name: &str, value: impl Into<String>) {
        self.fields
            .push((name.to_string(), FormValue::Text(value.into())));
    }

    fn file(&mut self, name: &str, file: SelectedFile) {
        self.fields.push((name.to_string(), FormValue::File(file)));
    }

    pub fn fields(&self) -> &[(String, FormValue)] {
        &self.fields
    }

    /// First text value under `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.iter().find_map(|(key, value)| match value {
            FormValue::Text(text) if key == name => Some(text.as_str()),
            _ => None,
        })
    }

    pub fn files(&self) -> impl Iterator<Item = &SelectedFile> {
        self.fields.iter().filter_map(|(_, value)| match value {
            FormValue::File(file) => Some(file),
            FormValue::Text(_) => None,
        })
    }

    pub fn into_multipart(self) -> Result<Form, FormError> {
        let mut form = Form::new();
        for (name, value) in self.fields {
            form = match value {
                FormValue::Text(text) => form.text(name, text),
                FormValue::File(file) => {
                    let mut part = Part::bytes(file.bytes.to_vec()).file_name(file.file_name.clone());
                    if let Some(content_type) = file.content_type.as_deref() {
                        part = part.mime_str(content_type).map_err(|_| {
                            FormError::InvalidContentType {
                                file_name: file.file_name.clone(),
                                content_type: content_type.to_string(),
                            }
                        })?;
                    }
                    form.part(name, part)
                }
            };
        }
        Ok(form)
    }
}

/// Every field of the job form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobFormState {
    pub company_name: String,
    pub job_title: String,
    pub job_url: String,
    pub job_description: String,
    pub status: Option<JobStatus>,
    pub date_submitted: String,
    pub date_of_interview: String,
    pub confirmation_received: bool,
    pub rejection_received: bool,
    pub files: Vec<SelectedFile>,
}

impl JobFormState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-fills the form for editing `job`, or returns an empty form.
    pub fn from_job(job: Option<&JobRecord>) -> Self {
        let Some(job) = job else {
            return Self::new();
        };

        Self {
            company_name: job.company_name.clone(),
            job_title: job.job_title.clone(),
            job_url: job.job_url.clone().unwrap_or_default(),
            job_description: job.job_description.clone().unwrap_or_default(),
            status: Some(job.status),
            date_submitted: format_date(job.date_submitted),
            date_of_interview: format_date(job.date_of_interview),
            confirmation_received: job.confirmation_received,
            rejection_received: job.rejection_received,
            files: Vec::new(),
        }
    }

    /// The status that will be submitted. A received rejection archives the
    /// job whatever status was picked.
    pub fn effective_status(&self) -> JobStatus {
        if self.rejection_received {
            JobStatus::Archived
        } else {
            self.status.unwrap_or_default()
        }
    }

    pub fn submission(&self) -> JobSubmission {
        let mut submission = JobSubmission::default();
        submission.text("companyName", self.company_name.as_str());
        submission.text("jobTitle", self.job_title.as_str());
        submission.text("jobUrl", self.job_url.as_str());
        submission.text("jobDescription", self.job_description.as_str());
        submission.text("dateSubmitted", self.date_submitted.as_str());
        submission.text("dateOfInterview", self.date_of_interview.as_str());
        submission.text("status", self.effective_status().as_str());
        submission.text("confirmationReceived", self.confirmation_received.to_string());
        submission.text("rejectionReceived", self.rejection_received.to_string());
        for file in &self.files {
            submission.file("files", file.clone());
        }
        submission
    }
}

/// `YYYY-MM-DD`, or empty when there is no date.
pub fn format_date(date: Option<NaiveDate>) -> String {
    date.map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

/// Observes whether a form submission is in flight.
#[derive(Debug, Clone, Default)]
pub struct SubmitStatus(Arc<AtomicBool>);

impl SubmitStatus {
    pub fn is_busy(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct JobForm {
    state: JobFormState,
    editing: bool,
    status: SubmitStatus,
}

impl JobForm {
    pub fn new(job: Option<&JobRecord>) -> Self {
        Self {
            state: JobFormState::from_job(job),
            editing: job.is_some(),
            status: SubmitStatus::default(),
        }
    }

    pub fn state(&self) -> &JobFormState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut JobFormState {
        &mut self.state
    }

    pub fn submit_status(&self) -> SubmitStatus {
        self.status.clone()
    }

    pub fn is_disabled(&self) -> bool {
        self.status.is_busy()
    }

    pub fn submit_label(&self) -> &'static str {
        if self.status.is_busy() {
            BUSY_LABEL
        } else if self.editing {
            UPDATE_LABEL
        } else {
            CREATE_LABEL
        }
    }

    /// Hands the normalized submission to `handler`. The form stays disabled
    /// until the handler's future completes or is dropped.
    pub async fn submit<F, Fut, T>(&self, handler: F) -> Result<T, FormError>
    where
        F: FnOnce(JobSubmission) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let flag = &self.status.0;
        if flag
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(FormError::Busy);
        }
        let _guard = BusyGuard(flag.clone());

        handler(self.state.submission()).await.map_err(|err| {
            error!(error = ?err, "error submitting job form");
            FormError::Submit(err)
        })
    }
}
