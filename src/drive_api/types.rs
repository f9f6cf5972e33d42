use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::SyncError;

/// Mime type the Drive API uses to mark folders.
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// A single entry from the files listing, folder or file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveItem {
    pub id: String,
    #[serde(rename = "title")]
    pub name: String,
    pub mime_type: String,
    #[serde(default)]
    pub parents: Vec<ParentRef>,
    /// RFC 3339 with milliseconds, e.g. `2024-01-02T00:00:00.000Z`
    #[serde(default)]
    pub modified_date: Option<String>,
    /// Direct content URL; absent for Drive-native documents
    #[serde(default)]
    pub download_url: Option<String>,
    /// Export URLs keyed by content type; present only for
    /// Drive-native documents without raw bytes
    #[serde(default)]
    pub export_links: Option<HashMap<String, String>>,
}

impl DriveItem {
    pub fn is_folder(&self) -> bool {
        self.mime_type == FOLDER_MIME_TYPE
    }

    /// Parse the remote modification timestamp.
    pub fn modified_at(&self) -> Result<DateTime<Utc>, SyncError> {
        let raw = self
            .modified_date
            .as_deref()
            .ok_or_else(|| SyncError::BadTimestamp {
                name: self.name.clone(),
                raw: "<missing>".into(),
            })?;
        DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|_| SyncError::BadTimestamp {
                name: self.name.clone(),
                raw: raw.to_string(),
            })
    }
}

/// A parent reference on a listed item.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentRef {
    pub id: String,
    #[serde(default)]
    pub is_root: bool,
}

/// One page of a files listing.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileListPage {
    #[serde(default)]
    pub items: Vec<DriveItem>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// Error body the Drive API attaches to non-success responses.
#[derive(Debug, Clone, Deserialize)]
pub struct DriveApiError {
    pub error: DriveApiErrorBody,
}

#[derive(Debug, Clone, Deserialize)]
#[allow(dead_code)]
pub struct DriveApiErrorBody {
    #[serde(default)]
    pub code: Option<u16>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Extract a readable message from an API error body, falling back to the
/// raw text when it is not the documented JSON shape.
pub fn api_error_message(body: &str) -> String {
    match serde_json::from_str::<DriveApiError>(body) {
        Ok(err) => err
            .error
            .message
            .unwrap_or_else(|| "unknown error".to_string()),
        Err(_) => body.chars().take(500).collect(),
    }
}
