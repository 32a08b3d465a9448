use std::collections::HashSet;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{header, Client, Method, StatusCode};
use tokio::sync::Mutex;
use url::Url;

#[async_trait]
pub trait RemoteStorage: Send + Sync + 'static {
    /// Stores `bytes` at `path`, replacing whatever was there.
    async fn upload_file(&self, path: &str, bytes: Bytes, content_type: Option<&str>)
        -> Result<()>;

    /// Removes a file or collection. Missing paths are not an error.
    async fn delete(&self, path: &str) -> Result<()>;
}

pub struct WebDavStorage {
    client: Client,
    base_url: Url,
    username: Option<String>,
    password: Option<String>,
    known_collections: Mutex<HashSet<String>>,
}

impl WebDavStorage {
    pub fn new(
        client: Client,
        base_url: Url,
        username: Option<String>,
        password: Option<String>,
    ) -> Self {
        Self {
            client,
            base_url,
            username,
            password,
            known_collections: Mutex::new(HashSet::new()),
        }
    }

    fn resource_url(&self, path: &str) -> Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| anyhow!("WebDAV base URL cannot carry a path"))?;
            segments.pop_if_empty();
            for segment in path_segments(path) {
                segments.push(segment);
            }
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
        let request = self.client.request(method, url);
        match &self.username {
            Some(username) => request.basic_auth(username, self.password.as_ref()),
            None => request,
        }
    }

    async fn ensure_collection(&self, collection: &str) -> Result<()> {
        if self.known_collections.lock().await.contains(collection) {
            return Ok(());
        }

        let method = Method::from_bytes(b"MKCOL").context("invalid MKCOL method")?;
        let url = self.resource_url(collection)?;
        let response = self
            .request(method, url)
            .send()
            .await
            .with_context(|| format!("failed to create WebDAV collection {collection}"))?;

        // 405 means the collection already exists.
        match response.status() {
            status if status.is_success() || status == StatusCode::METHOD_NOT_ALLOWED => {
                tracing::debug!(%collection, %status, "ensured WebDAV collection");
                self.known_collections
                    .lock()
                    .await
                    .insert(collection.to_string());
                Ok(())
            }
            status => bail!("MKCOL {collection} returned status {status}"),
        }
    }
}

#[async_trait]
impl RemoteStorage for WebDavStorage {
    async fn upload_file(
        &self,
        path: &str,
        bytes: Bytes,
        content_type: Option<&str>,
    ) -> Result<()> {
        for collection in parent_collections(path) {
            self.ensure_collection(&collection).await?;
        }

        let url = self.resource_url(path)?;
        let mut request = self.request(Method::PUT, url);
        if let Some(content_type) = content_type {
            request = request.header(header::CONTENT_TYPE, content_type);
        }

        let response = request
            .body(bytes)
            .send()
            .await
            .with_context(|| format!("failed to upload {path} to WebDAV"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(%path, %status, %body, "WebDAV upload rejected");
            bail!("PUT {path} returned status {status}");
        }

        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let url = self.resource_url(path)?;
        let response = self
            .request(Method::DELETE, url)
            .send()
            .await
            .with_context(|| format!("failed to delete {path} from WebDAV"))?;

        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            let mut known = self.known_collections.lock().await;
            let prefix = format!("{}/", path.trim_end_matches('/'));
            known.retain(|collection| collection != path && !collection.starts_with(&prefix));
            Ok(())
        } else {
            bail!("DELETE {path} returned status {status}")
        }
    }
}

fn path_segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|segment| !segment.is_empty())
}

/// `/a/b/c.pdf` yields `/a` and `/a/b`.
fn parent_collections(path: &str) -> Vec<String> {
    let segments: Vec<&str> = path_segments(path).collect();
    let mut collections = Vec::new();
    let mut current = String::new();
    for segment in segments.iter().take(segments.len().saturating_sub(1)) {
        current.push('/');
        current.push_str(segment);
        collections.push(current.clone());
    }
    collections
}
