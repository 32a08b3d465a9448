use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    #[default]
    ToApply,
    Applied,
    InterviewScheduled,
    Archived,
}

impl JobStatus {
    pub const ALL: [JobStatus; 4] = [
        JobStatus::ToApply,
        JobStatus::Applied,
        JobStatus::InterviewScheduled,
        JobStatus::Archived,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::ToApply => "TO_APPLY",
            JobStatus::Applied => "APPLIED",
            JobStatus::InterviewScheduled => "INTERVIEW_SCHEDULED",
            JobStatus::Archived => "ARCHIVED",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown job status '{}'", self.0)
    }
}

impl std::error::Error for UnknownStatus {}

impl FromStr for JobStatus {
    type Err = UnknownStatus;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        JobStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == trimmed)
            .ok_or_else(|| UnknownStatus(trimmed.to_string()))
    }
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = job_applications)]
pub struct JobApplication {
    pub id: Uuid,
    pub company_name: String,
    pub job_title: String,
    pub job_description: Option<String>,
    pub job_url: Option<String>,
    pub status: String,
    pub has_been_contacted: bool,
    pub date_submitted: Option<NaiveDate>,
    pub date_of_interview: Option<NaiveDate>,
    pub confirmation_received: bool,
    pub rejection_received: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = job_applications)]
pub struct NewJobApplication {
    pub id: Uuid,
    pub company_name: String,
    pub job_title: String,
    pub job_description: Option<String>,
    pub job_url: Option<String>,
    pub status: String,
    pub has_been_contacted: bool,
    pub date_submitted: Option<NaiveDate>,
    pub date_of_interview: Option<NaiveDate>,
    pub confirmation_received: bool,
    pub rejection_received: bool,
}

/// Partial update; `None` leaves a column untouched.
#[derive(Debug, Clone, Default, AsChangeset)]
#[diesel(table_name = job_applications)]
pub struct JobApplicationChangeset {
    pub company_name: Option<String>,
    pub job_title: Option<String>,
    pub job_description: Option<Option<String>>,
    pub job_url: Option<Option<String>>,
    pub status: Option<String>,
    pub has_been_contacted: Option<bool>,
    pub date_submitted: Option<Option<NaiveDate>>,
    pub date_of_interview: Option<Option<NaiveDate>>,
    pub confirmation_received: Option<bool>,
    pub rejection_received: Option<bool>,
    pub updated_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = job_files)]
#[diesel(belongs_to(JobApplication, foreign_key = job_application_id))]
pub struct JobFile {
    pub id: Uuid,
    pub job_application_id: Uuid,
    pub file_name: String,
    pub file_type: String,
    pub nextcloud_path: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = job_files)]
pub struct NewJobFile {
    pub id: Uuid,
    pub job_application_id: Uuid,
    pub file_name: String,
    pub file_type: String,
    pub nextcloud_path: String,
}
