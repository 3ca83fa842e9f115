//! Google Drive v3 client
//!
//! Implements [`RemoteStore`] over the Drive REST API. Uploads use the
//! resumable protocol so archives are streamed from disk instead of being
//! read into memory.

use super::auth::TokenProvider;
use super::drive_ops::{DriveError, EntryFilter, EntryKind, RemoteEntry, RemoteStore, Result};
use crate::config::DriveConfig;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, LOCATION};
use reqwest::{Body, Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::io::ReaderStream;
use tracing::debug;

pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";
const ARCHIVE_MIME_TYPE: &str = "application/zip";
const LIST_FIELDS: &str = "nextPageToken,files(id,name,mimeType,createdTime)";
const PAGE_SIZE: &str = "1000";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    next_page_token: Option<String>,
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    name: String,
    mime_type: String,
    created_time: DateTime<Utc>,
}

impl From<DriveFile> for RemoteEntry {
    fn from(file: DriveFile) -> Self {
        let kind = if file.mime_type == FOLDER_MIME_TYPE {
            EntryKind::Folder
        } else {
            EntryKind::File
        };
        RemoteEntry {
            id: file.id,
            name: file.name,
            kind,
            created_at: file.created_time,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CreatedFile {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Quote a value for use inside a Drive query string literal
fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

fn rfc3339(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Build the `q` parameter listing the children of `parent_id`
pub fn build_query(parent_id: &str, filter: &EntryFilter) -> String {
    let mut clauses = vec![format!("{} in parents", quote(parent_id)), "trashed=false".to_string()];

    match filter.kind {
        Some(EntryKind::Folder) => clauses.push(format!("mimeType={}", quote(FOLDER_MIME_TYPE))),
        Some(EntryKind::File) => clauses.push(format!("mimeType!={}", quote(FOLDER_MIME_TYPE))),
        None => {}
    }
    if let Some(ref name) = filter.name {
        clauses.push(format!("name={}", quote(name)));
    }
    if let Some(ref before) = filter.created_before {
        clauses.push(format!("createdTime<{}", quote(&rfc3339(before))));
    }
    if let Some(ref after) = filter.created_after {
        clauses.push(format!("createdTime>{}", quote(&rfc3339(after))));
    }

    clauses.join(" and ")
}

/// Turn a non-success response into a [`DriveError`]
async fn check(response: Response, what: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::NOT_FOUND {
        return Err(DriveError::NotFound(what.to_string()));
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiErrorBody>(&body)
        .map(|b| b.error.message)
        .unwrap_or(body);
    Err(DriveError::Api {
        status: status.as_u16(),
        message,
    })
}

/// Drive API client authenticated through a [`TokenProvider`]
pub struct DriveClient {
    http: Client,
    api_base: String,
    upload_base: String,
    tokens: Arc<dyn TokenProvider>,
}

impl DriveClient {
    pub fn new(http: Client, config: &DriveConfig, tokens: Arc<dyn TokenProvider>) -> Self {
        Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            upload_base: config.upload_base.trim_end_matches('/').to_string(),
            tokens,
        }
    }

    /// Build a client from configuration, wiring in the configured credential flow
    pub fn from_config(config: &DriveConfig) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()?;
        let tokens = super::auth::provider_from_config(&config.auth, http.clone());
        Ok(Self::new(http, config, tokens))
    }

    async fn bearer(&self) -> Result<String> {
        Ok(self.tokens.access_token().await?)
    }

    /// Open a resumable upload session and return its URL
    async fn start_upload(&self, name: &str, parent_id: &str, size: u64) -> Result<String> {
        let token = self.bearer().await?;
        let response = self
            .http
            .post(format!("{}/files", self.upload_base))
            .query(&[("uploadType", "resumable"), ("fields", "id")])
            .bearer_auth(token)
            .header("X-Upload-Content-Type", ARCHIVE_MIME_TYPE)
            .header("X-Upload-Content-Length", size.to_string())
            .json(&json!({ "name": name, "parents": [parent_id] }))
            .send()
            .await?;
        let response = check(response, parent_id).await?;

        response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| DriveError::InvalidResponse("upload session without Location header".to_string()))
    }
}

#[async_trait]
impl RemoteStore for DriveClient {
    async fn authorize(&self) -> Result<()> {
        self.bearer().await?;
        Ok(())
    }

    async fn list_entries(&self, parent_id: &str, filter: &EntryFilter) -> Result<Vec<RemoteEntry>> {
        let query = build_query(parent_id, filter);
        debug!("Listing Drive entries: {}", query);

        let mut entries = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let token = self.bearer().await?;
            let mut request = self
                .http
                .get(format!("{}/files", self.api_base))
                .bearer_auth(token)
                .query(&[
                    ("q", query.as_str()),
                    ("fields", LIST_FIELDS),
                    ("pageSize", PAGE_SIZE),
                    ("supportsAllDrives", "true"),
                    ("includeItemsFromAllDrives", "true"),
                ]);
            if let Some(ref next) = page_token {
                request = request.query(&[("pageToken", next.as_str())]);
            }

            let response = check(request.send().await?, parent_id).await?;
            let page: FileList = response
                .json()
                .await
                .map_err(|e| DriveError::InvalidResponse(e.to_string()))?;

            entries.extend(page.files.into_iter().map(RemoteEntry::from));
            match page.next_page_token {
                Some(next) if !next.is_empty() => page_token = Some(next),
                _ => break,
            }
        }

        Ok(entries)
    }

    async fn create_folder(&self, name: &str, parent_id: &str) -> Result<String> {
        let token = self.bearer().await?;
        let response = self
            .http
            .post(format!("{}/files", self.api_base))
            .query(&[("fields", "id"), ("supportsAllDrives", "true")])
            .bearer_auth(token)
            .json(&json!({
                "name": name,
                "mimeType": FOLDER_MIME_TYPE,
                "parents": [parent_id],
            }))
            .send()
            .await?;

        let created: CreatedFile = check(response, parent_id)
            .await?
            .json()
            .await
            .map_err(|e| DriveError::InvalidResponse(e.to_string()))?;
        Ok(created.id)
    }

    async fn upload_file(&self, local_path: &Path, name: &str, parent_id: &str) -> Result<String> {
        let size = tokio::fs::metadata(local_path).await?.len();
        let session = self.start_upload(name, parent_id, size).await?;
        debug!("Uploading {} ({} bytes) to {}", local_path.display(), size, parent_id);

        let file = tokio::fs::File::open(local_path).await?;
        let token = self.bearer().await?;
        let response = self
            .http
            .put(session)
            .bearer_auth(token)
            .header(CONTENT_TYPE, ARCHIVE_MIME_TYPE)
            .header(CONTENT_LENGTH, size)
            .body(Body::wrap_stream(ReaderStream::new(file)))
            .send()
            .await?;

        let created: CreatedFile = check(response, name)
            .await?
            .json()
            .await
            .map_err(|e| DriveError::InvalidResponse(e.to_string()))?;
        Ok(created.id)
    }

    async fn delete_entry(&self, id: &str) -> Result<()> {
        let token = self.bearer().await?;
        let response = self
            .http
            .delete(format!("{}/files/{}", self.api_base, id))
            .query(&[("supportsAllDrives", "true")])
            .bearer_auth(token)
            .send()
            .await?;
        check(response, id).await?;
        Ok(())
    }
}
