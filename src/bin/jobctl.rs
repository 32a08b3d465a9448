use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use url::Url;
use uuid::Uuid;

use job_tracker::applications::JobRecord;
use job_tracker::client::JobsClient;
use job_tracker::form::{format_date, JobForm, SelectedFile};
use job_tracker::models::JobStatus;

/// Command-line client for the job tracker API
#[derive(Parser, Debug)]
#[command(name = "jobctl", version, about, long_about = None)]
struct Cli {
    /// Base URL of the job tracker server
    #[arg(
        long,
        env = "JOB_TRACKER_URL",
        default_value = "http://127.0.0.1:3000"
    )]
    server: Url,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List job applications, most recently updated first
    List,
    /// Print one job application as JSON
    Show { id: Uuid },
    /// Create a job application and upload the given files
    Create(CreateArgs),
    /// Delete a job application and its files
    Delete { id: Uuid },
}

#[derive(Args, Debug)]
struct CreateArgs {
    #[arg(long)]
    company: String,
    #[arg(long)]
    title: String,
    #[arg(long = "job-url")]
    job_url: Option<String>,
    #[arg(long)]
    description: Option<String>,
    /// TO_APPLY, APPLIED, INTERVIEW_SCHEDULED or ARCHIVED
    #[arg(long)]
    status: Option<JobStatus>,
    /// Date the application was sent (YYYY-MM-DD)
    #[arg(long)]
    submitted: Option<NaiveDate>,
    /// Interview date (YYYY-MM-DD)
    #[arg(long)]
    interview: Option<NaiveDate>,
    #[arg(long)]
    confirmed: bool,
    /// Archives the application
    #[arg(long)]
    rejected: bool,
    /// Files to attach
    files: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();
    let client = JobsClient::new(cli.server);

    match cli.command {
        Command::List => {
            for job in client.list_jobs().await? {
                print_summary(&job);
            }
        }
        Command::Show { id } => {
            let job = client.get_job(id).await?;
            println!("{}", serde_json::to_string_pretty(&job)?);
        }
        Command::Create(args) => {
            let job = create(&client, args).await?;
            print_summary(&job);
        }
        Command::Delete { id } => {
            client.delete_job(id).await?;
            println!("Deleted {id}");
        }
    }

    Ok(())
}

async fn create(client: &JobsClient, args: CreateArgs) -> Result<JobRecord> {
    let mut form = JobForm::new(None);
    {
        let state = form.state_mut();
        state.company_name = args.company;
        state.job_title = args.title;
        state.job_url = args.job_url.unwrap_or_default();
        state.job_description = args.description.unwrap_or_default();
        state.status = args.status;
        state.date_submitted = format_date(args.submitted);
        state.date_of_interview = format_date(args.interview);
        state.confirmation_received = args.confirmed;
        state.rejection_received = args.rejected;
        for path in &args.files {
            let file = SelectedFile::read(path)
                .await
                .with_context(|| format!("failed to read {}", path.display()))?;
            state.files.push(file);
        }
    }

    let job = form
        .submit(|submission| async move {
            Ok::<_, anyhow::Error>(client.create_job(submission).await?)
        })
        .await?;
    Ok(job)
}

fn print_summary(job: &JobRecord) {
    println!(
        "{}  {:<20} {:<24} {:<40} files={}",
        job.id,
        job.status,
        job.company_name,
        job.job_title,
        job.files.len()
    );
}
