use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use url::Url;

use crate::config::AppConfig;
use crate::storage::WebDavStorage;

pub fn build_client(config: &AppConfig) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(config.webdav_timeout_seconds))
        .user_agent(concat!("job-tracker/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("failed to build WebDAV HTTP client")
}

pub fn build_storage(config: &AppConfig) -> Result<WebDavStorage> {
    let client = build_client(config)?;
    let mut base_url = Url::parse(&config.webdav_url).context("WEBDAV_URL must be a valid URL")?;

    // Credentials embedded in the URL are used unless set explicitly.
    let username = config
        .webdav_username
        .clone()
        .or_else(|| (!base_url.username().is_empty()).then(|| base_url.username().to_string()));
    let password = config
        .webdav_password
        .clone()
        .or_else(|| base_url.password().map(str::to_string));
    let _ = base_url.set_username("");
    let _ = base_url.set_password(None);

    Ok(WebDavStorage::new(client, base_url, username, password))
}
