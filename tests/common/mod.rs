use std::collections::HashMap;
use std::env;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request};
use axum::Router;
use bytes::Bytes;
use diesel::connection::SimpleConnection;
use diesel::PgConnection;
use diesel_migrations::MigrationHarness;
use http_body_util::BodyExt;
use job_tracker::config::AppConfig;
use job_tracker::db::{self, PgPool, MIGRATIONS};
use job_tracker::routes;
use job_tracker::state::AppState;
use job_tracker::storage::RemoteStorage;
use once_cell::sync::Lazy;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tower::util::ServiceExt;
use uuid::Uuid;

static DB_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

#[allow(dead_code)]
#[derive(Clone)]
pub struct StoredFile {
    pub path: String,
    pub bytes: Bytes,
    pub content_type: Option<String>,
}

#[derive(Default)]
pub struct FakeStorage {
    files: Mutex<HashMap<String, StoredFile>>,
    uploads: Mutex<Vec<String>>,
    fail_paths_ending_with: Mutex<Option<String>>,
    upload_delay: Mutex<Option<Duration>>,
}

#[async_trait]
impl RemoteStorage for FakeStorage {
    async fn upload_file(
        &self,
        path: &str,
        bytes: Bytes,
        content_type: Option<&str>,
    ) -> Result<()> {
        self.uploads.lock().await.push(path.to_string());
        let delay = *self.upload_delay.lock().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(suffix) = self.fail_paths_ending_with.lock().await.as_deref() {
            if path.ends_with(suffix) {
                bail!("simulated WebDAV outage for {path}");
            }
        }
        let stored = StoredFile {
            path: path.to_string(),
            bytes,
            content_type: content_type.map(str::to_string),
        };
        self.files.lock().await.insert(stored.path.clone(), stored);
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let prefix = format!("{}/", path.trim_end_matches('/'));
        self.files
            .lock()
            .await
            .retain(|key, _| key != path && !key.starts_with(&prefix));
        Ok(())
    }
}

#[allow(dead_code)]
impl FakeStorage {
    pub async fn get(&self, path: &str) -> Option<StoredFile> {
        self.files.lock().await.get(path).cloned()
    }

    pub async fn file_count(&self) -> usize {
        self.files.lock().await.len()
    }

    pub async fn upload_attempts(&self) -> usize {
        self.uploads.lock().await.len()
    }

    pub async fn fail_uploads_ending_with(&self, suffix: &str) {
        *self.fail_paths_ending_with.lock().await = Some(suffix.to_string());
    }

    pub async fn delay_uploads(&self, delay: Duration) {
        *self.upload_delay.lock().await = Some(delay);
    }
}

pub enum Part<'a> {
    Text(&'a str, &'a str),
    File {
        name: &'a str,
        file_name: &'a str,
        content_type: Option<&'a str>,
        data: &'a [u8],
    },
}

pub struct TestApp {
    pub state: AppState,
    router: Router,
    storage: Arc<FakeStorage>,
}

impl TestApp {
    pub async fn new() -> Result<Self> {
        let database_url = env::var("TEST_DATABASE_URL")
            .context("TEST_DATABASE_URL must be set for integration tests")?;

        let config = AppConfig {
            database_url: database_url.clone(),
            database_max_pool_size: db::DEFAULT_MAX_POOL_SIZE,
            server_host: "127.0.0.1".to_string(),
            server_port: 0,
            cors_allowed_origin: None,
            max_upload_bytes: 1024 * 1024,
            webdav_url: "http://webdav.invalid/remote.php/dav/files/test".to_string(),
            webdav_username: None,
            webdav_password: None,
            webdav_timeout_seconds: 5,
            webdav_max_concurrent_uploads: 2,
        };

        let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
        prepare_database(&pool).await?;

        let storage = Arc::new(FakeStorage::default());
        let storage_for_state: Arc<dyn RemoteStorage> = storage.clone();
        let state = AppState::new(pool.clone(), config, storage_for_state);
        let router = routes::create_router(state.clone());

        Ok(Self {
            state,
            router,
            storage,
        })
    }

    pub async fn cleanup(&self) -> Result<()> {
        let pool = self.state.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut conn = pool
                .get()
                .map_err(|err| anyhow!("failed to get cleanup connection: {err}"))?;
            truncate_all(&mut conn)?;
            Ok(())
        })
        .await
        .context("cleanup task panicked")?
    }

    #[allow(dead_code)]
    pub async fn execute_sql(&self, sql: &str) -> Result<()> {
        let pool = self.state.pool.clone();
        let sql = sql.to_string();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut conn = pool
                .get()
                .map_err(|err| anyhow!("failed to get connection: {err}"))?;
            conn.batch_execute(&sql).context("failed to execute SQL")?;
            Ok(())
        })
        .await
        .context("SQL task panicked")?
    }

    /// Serves the router on an ephemeral local port.
    #[allow(dead_code)]
    pub async fn spawn(&self) -> Result<SocketAddr> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let router = self.router.clone();
        tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, router).await {
                eprintln!("test server stopped: {err}");
            }
        });
        Ok(addr)
    }

    #[allow(dead_code)]
    pub fn storage(&self) -> Arc<FakeStorage> {
        self.storage.clone()
    }

    pub async fn get(&self, path: &str) -> Result<hyper::Response<Body>> {
        let request = Request::builder()
            .method(Method::GET)
            .uri(path)
            .body(Body::empty())?;
        self.send(request).await
    }

    #[allow(dead_code)]
    pub async fn delete(&self, path: &str) -> Result<hyper::Response<Body>> {
        let request = Request::builder()
            .method(Method::DELETE)
            .uri(path)
            .body(Body::empty())?;
        self.send(request).await
    }

    pub async fn post_multipart(
        &self,
        path: &str,
        parts: &[Part<'_>],
    ) -> Result<hyper::Response<Body>> {
        self.multipart(Method::POST, path, parts).await
    }

    #[allow(dead_code)]
    pub async fn patch_multipart(
        &self,
        path: &str,
        parts: &[Part<'_>],
    ) -> Result<hyper::Response<Body>> {
        self.multipart(Method::PATCH, path, parts).await
    }

    async fn multipart(
        &self,
        method: Method,
        path: &str,
        parts: &[Part<'_>],
    ) -> Result<hyper::Response<Body>> {
        let boundary = format!("boundary-{}", Uuid::new_v4());
        let mut body = Vec::new();
        for part in parts {
            body.extend(format!("--{boundary}\r\n").as_bytes());
            match part {
                Part::Text(name, value) => {
                    body.extend(
                        format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n")
                            .as_bytes(),
                    );
                    body.extend(value.as_bytes());
                }
                Part::File {
                    name,
                    file_name,
                    content_type,
                    data,
                } => {
                    body.extend(
                        format!(
                            "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\n"
                        )
                        .as_bytes(),
                    );
                    if let Some(content_type) = content_type {
                        body.extend(format!("Content-Type: {content_type}\r\n").as_bytes());
                    }
                    body.extend(b"\r\n");
                    body.extend(*data);
                }
            }
            body.extend(b"\r\n");
        }
        body.extend(format!("--{boundary}--\r\n").as_bytes());

        let request = Request::builder()
            .method(method)
            .uri(path)
            .header(
                "content-type",
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))?;
        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> Result<hyper::Response<Body>> {
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }
}

pub async fn acquire_db_lock() -> tokio::sync::MutexGuard<'static, ()> {
    DB_LOCK.lock().await
}

pub async fn body_to_vec(body: Body) -> Result<Vec<u8>> {
    let collected = body
        .collect()
        .await
        .map_err(|err| anyhow!("failed to read response body: {err}"))?;
    Ok(collected.to_bytes().to_vec())
}

async fn prepare_database(pool: &PgPool) -> Result<()> {
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || -> Result<()> {
        let mut conn = pool
            .get()
            .map_err(|err| anyhow!("failed to acquire connection: {err}"))?;
        conn.run_pending_migrations(MIGRATIONS)
            .map_err(|err| anyhow!("failed to run migrations: {err}"))?;
        truncate_all(&mut conn)?;
        Ok(())
    })
    .await
    .context("migration task panicked")?
}

fn truncate_all(conn: &mut PgConnection) -> Result<()> {
    conn.batch_execute("TRUNCATE TABLE job_files, job_applications RESTART IDENTITY CASCADE;")
        .context("failed to truncate tables")?;
    Ok(())
}
