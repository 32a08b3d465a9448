mod common;

use anyhow::Result;
use bytes::Bytes;
use common::{acquire_db_lock, TestApp};
use job_tracker::client::{ClientError, JobsClient};
use job_tracker::form::{FormError, JobForm, SelectedFile, CREATE_LABEL, UPDATE_LABEL};
use job_tracker::models::JobStatus;
use url::Url;

#[tokio::test]
async fn form_round_trip_through_http_client() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let addr = app.spawn().await?;
    let client = &JobsClient::new(Url::parse(&format!("http://{addr}"))?);

    let mut form = JobForm::new(None);
    assert_eq!(form.submit_label(), CREATE_LABEL);
    {
        let state = form.state_mut();
        state.company_name = "Acme".into();
        state.job_title = "Platform Engineer".into();
        state.job_url = "https://acme.example/careers/42".into();
        state.status = Some(JobStatus::Applied);
        state.date_submitted = "2024-05-02".into();
        state.files.push(SelectedFile::new(
            "cv.pdf",
            Some("application/pdf".into()),
            Bytes::from_static(b"%PDF resume"),
        ));
    }

    let created = form
        .submit(|submission| async move {
            Ok::<_, anyhow::Error>(client.create_job(submission).await?)
        })
        .await?;
    assert!(!form.is_disabled());
    assert_eq!(created.status, JobStatus::Applied);
    assert_eq!(created.job_url.as_deref(), Some("https://acme.example/careers/42"));
    assert_eq!(created.files.len(), 1);
    assert_eq!(
        created.files[0].nextcloud_path,
        format!("/job-tracker/{}/cv.pdf", created.id)
    );

    let mut edit = JobForm::new(Some(&created));
    assert_eq!(edit.submit_label(), UPDATE_LABEL);
    assert_eq!(edit.state().date_submitted, "2024-05-02");
    edit.state_mut().rejection_received = true;

    let job_id = created.id;
    let updated = edit
        .submit(|submission| async move {
            Ok::<_, anyhow::Error>(client.update_job(job_id, submission).await?)
        })
        .await?;
    assert_eq!(updated.status, JobStatus::Archived);
    assert!(updated.rejection_received);
    assert_eq!(updated.files.len(), 1);

    let listed = client.list_jobs().await?;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0], updated);

    client.delete_job(created.id).await?;
    match client.get_job(created.id).await {
        Err(ClientError::Api { status, kind, .. }) => {
            assert_eq!(status, 404);
            assert_eq!(kind.as_deref(), Some("not_found"));
        }
        other => panic!("expected not found, got {other:?}"),
    }

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn server_validation_errors_surface_through_the_form() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let addr = app.spawn().await?;
    let client = &JobsClient::new(Url::parse(&format!("http://{addr}"))?);

    let mut form = JobForm::new(None);
    form.state_mut().company_name = "Acme".into();

    let result = form
        .submit(|submission| async move {
            Ok::<_, anyhow::Error>(client.create_job(submission).await?)
        })
        .await;

    let Err(FormError::Submit(err)) = result else {
        panic!("expected submit failure");
    };
    match err.downcast_ref::<ClientError>() {
        Some(ClientError::Api { status, message, .. }) => {
            assert_eq!(*status, 400);
            assert_eq!(message, "jobTitle is required");
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert!(!form.is_disabled());
    assert!(client.list_jobs().await?.is_empty());

    app.cleanup().await?;
    Ok(())
}
