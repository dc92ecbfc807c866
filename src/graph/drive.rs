//! Drive uploads
//!
//! Payloads up to the small-file limit (4 MiB) are written with a single
//! `PUT .../content`. Larger payloads go through an upload session: the session
//! is created with `createUploadSession`, then the payload is sent in sequential
//! `Content-Range` chunks to the pre-authenticated session URL. When the chunk
//! sequence ends without a completed drive item, the whole session is started
//! again, up to `session_attempts` times.

use super::client::GraphClient;
use crate::config::UploadConfig;
use crate::error::{RequestError, UploadError};
use crate::types::{DriveScope, UploadedItem};
use regex::Regex;
use reqwest::header::{CONTENT_RANGE, CONTENT_TYPE};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::sync::LazyLock;
use tokio_util::sync::CancellationToken;

#[allow(clippy::expect_used)]
static ETAG_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{[a-zA-Z0-9-]+\}").expect("eTag id pattern is valid"));

/// Drive item as returned by upload endpoints
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveItem {
    /// Item id
    pub id: String,
    /// Browser URL
    #[serde(default)]
    pub web_url: Option<String>,
    /// Entity tag, `"{GUID},version"`
    #[serde(rename = "eTag", default)]
    pub e_tag: Option<String>,
    /// File facet
    #[serde(default)]
    pub file: Option<FileFacet>,
    /// Pre-authenticated download URL
    #[serde(rename = "@microsoft.graph.downloadUrl", default)]
    pub graph_download_url: Option<String>,
    /// Legacy spelling of the download URL annotation
    #[serde(rename = "@content.downloadUrl", default)]
    pub content_download_url: Option<String>,
}

/// File facet of a drive item
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileFacet {
    /// MIME type detected by the drive
    #[serde(default)]
    pub mime_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadSession {
    #[serde(default)]
    upload_url: Option<String>,
}

impl UploadedItem {
    /// Normalize a drive item into an upload result
    ///
    /// The download URL comes from `@microsoft.graph.downloadUrl`, falling back to
    /// `@content.downloadUrl`. If it carries a `UniqueId` query parameter, that
    /// becomes the unique id and the URL is reduced to
    /// `{scheme}://{host}{path}?UniqueId={id}`. Otherwise the unique id is the
    /// first `{...}` token of the eTag.
    pub fn from_drive_item(item: DriveItem) -> Self {
        let raw_download = item
            .graph_download_url
            .filter(|u| !u.is_empty())
            .or(item.content_download_url.filter(|u| !u.is_empty()));

        let mut download_url = raw_download.clone();
        let mut unique_id = None;

        if let Some(parsed) = raw_download.as_deref().and_then(|u| url::Url::parse(u).ok()) {
            if let Some((_, id)) = parsed.query_pairs().find(|(k, _)| k == "UniqueId") {
                let mut base = parsed.clone();
                base.set_query(None);
                base.set_fragment(None);
                download_url = Some(format!("{base}?UniqueId={id}"));
                unique_id = Some(id.into_owned());
            }
        }

        let unique_id = unique_id
            .or_else(|| item.e_tag.as_deref().and_then(unique_id_from_etag))
            .unwrap_or_default();

        Self {
            id: item.id,
            web_url: item.web_url,
            download_url,
            mime_type: item.file.and_then(|f| f.mime_type),
            unique_id,
            file_name: None,
        }
    }
}

fn unique_id_from_etag(etag: &str) -> Option<String> {
    ETAG_ID
        .find(etag)
        .map(|m| m.as_str().trim_matches(|c| c == '{' || c == '}').to_string())
}

/// Uploads report payloads into a personal or group drive
#[derive(Clone, Debug)]
pub struct DriveUploader {
    client: GraphClient,
    small_file_limit: usize,
    chunk_size: usize,
    session_attempts: u32,
}

impl DriveUploader {
    /// Create an uploader with the thresholds from `config`
    pub fn new(client: GraphClient, config: &UploadConfig) -> Self {
        Self {
            client,
            small_file_limit: config.small_file_limit,
            chunk_size: config.chunk_size.max(1),
            session_attempts: config.session_attempts.max(1),
        }
    }

    /// Store `payload` at `destination_path` inside `drive`
    ///
    /// # Errors
    ///
    /// - [`UploadError::Request`] when the direct PUT or session creation fails
    /// - [`UploadError::Incomplete`] when no session attempt produced an item
    /// - [`UploadError::Cancelled`] when `cancel` fires
    pub async fn upload(
        &self,
        payload: &[u8],
        destination_path: &str,
        drive: &DriveScope,
        cancel: &CancellationToken,
    ) -> Result<UploadedItem, UploadError> {
        let token = self
            .client
            .access_token()
            .await
            .map_err(|e| UploadError::Token(e.to_string()))?;
        let item_url = self.item_url(drive, destination_path);

        let item = if payload.len() <= self.small_file_limit {
            tracing::debug!(path = %destination_path, bytes = payload.len(), "Direct upload");
            let url = format!("{item_url}/content");
            let response = self
                .client
                .send(&token, cancel, |http| {
                    http.put(&url)
                        .header(CONTENT_TYPE, "application/octet-stream")
                        .body(payload.to_vec())
                })
                .await
                .map_err(upload_request_error)?;
            decode::<DriveItem>(response, &url).await?
        } else {
            self.upload_in_session(&token, &item_url, payload, destination_path, cancel)
                .await?
        };

        let uploaded = UploadedItem::from_drive_item(item);
        tracing::info!(
            path = %destination_path,
            bytes = payload.len(),
            item_id = %uploaded.id,
            "Upload complete"
        );
        Ok(uploaded)
    }

    /// `{base}/{drive root}:/{encoded path}:`
    fn item_url(&self, drive: &DriveScope, destination_path: &str) -> String {
        let root = match drive {
            DriveScope::Personal => "me/drive/root".to_string(),
            DriveScope::Group { group_id } => format!("groups/{group_id}/drive/root"),
        };
        let encoded: Vec<String> = destination_path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect();
        self.client
            .url(&format!("{root}:/{}:", encoded.join("/")))
    }

    async fn upload_in_session(
        &self,
        token: &str,
        item_url: &str,
        payload: &[u8],
        destination_path: &str,
        cancel: &CancellationToken,
    ) -> Result<DriveItem, UploadError> {
        let mut errors = Vec::new();

        for attempt in 1..=self.session_attempts {
            if cancel.is_cancelled() {
                return Err(UploadError::Cancelled);
            }

            let session_url = self
                .create_session(token, item_url, destination_path, cancel)
                .await?;
            tracing::debug!(
                path = %destination_path,
                attempt,
                bytes = payload.len(),
                "Upload session created"
            );

            if let Some(item) = self
                .send_chunks(&session_url, payload, &mut errors, cancel)
                .await?
            {
                return Ok(item);
            }

            tracing::warn!(
                path = %destination_path,
                attempt,
                max_attempts = self.session_attempts,
                chunk_errors = errors.len(),
                "Upload session ended without a completed item"
            );
        }

        Err(UploadError::Incomplete {
            path: destination_path.to_string(),
            attempts: self.session_attempts,
            errors,
        })
    }

    async fn create_session(
        &self,
        token: &str,
        item_url: &str,
        destination_path: &str,
        cancel: &CancellationToken,
    ) -> Result<String, UploadError> {
        let url = format!("{item_url}/createUploadSession");
        let body = serde_json::json!({
            "item": { "@microsoft.graph.conflictBehavior": "rename" }
        });
        let response = self
            .client
            .send(token, cancel, |http| http.post(&url).json(&body))
            .await
            .map_err(upload_request_error)?;

        decode::<UploadSession>(response, &url)
            .await?
            .upload_url
            .filter(|u| !u.is_empty())
            .ok_or_else(|| UploadError::MissingSessionUrl {
                path: destination_path.to_string(),
            })
    }

    /// Send every chunk; returns the item carried by a 200/201 chunk response
    ///
    /// Chunk failures are recorded in `errors` and do not stop the sequence.
    async fn send_chunks(
        &self,
        session_url: &str,
        payload: &[u8],
        errors: &mut Vec<String>,
        cancel: &CancellationToken,
    ) -> Result<Option<DriveItem>, UploadError> {
        let total = payload.len();
        let mut completed = None;

        for (index, chunk) in payload.chunks(self.chunk_size).enumerate() {
            if cancel.is_cancelled() {
                return Err(UploadError::Cancelled);
            }

            let start = index * self.chunk_size;
            let end = start + chunk.len() - 1;
            let range = format!("bytes {start}-{end}/{total}");

            let result = self
                .client
                .send_anonymous(cancel, |http| {
                    http.put(session_url)
                        .header(CONTENT_RANGE, range.as_str())
                        .body(chunk.to_vec())
                })
                .await;

            match result {
                Ok(response) => {
                    let status = response.status().as_u16();
                    if status == 200 || status == 201 {
                        match decode::<DriveItem>(response, session_url).await {
                            Ok(item) => completed = Some(item),
                            Err(e) => {
                                tracing::warn!(chunk = index, range = %range, error = %e, "Completed chunk carried no item");
                                errors.push(format!("chunk {index} ({range}): {e}"));
                            }
                        }
                    }
                }
                Err(RequestError::Cancelled) => return Err(UploadError::Cancelled),
                Err(e) => {
                    tracing::warn!(chunk = index, range = %range, error = %e, "Chunk upload failed");
                    errors.push(format!("chunk {index} ({range}): {e}"));
                }
            }
        }

        Ok(completed)
    }
}

fn upload_request_error(error: RequestError) -> UploadError {
    match error {
        RequestError::Cancelled => UploadError::Cancelled,
        other => UploadError::Request(other),
    }
}

async fn decode<T: DeserializeOwned>(
    response: reqwest::Response,
    url: &str,
) -> Result<T, UploadError> {
    response.json::<T>().await.map_err(|source| UploadError::Decode {
        url: url.to_string(),
        source,
    })
}
