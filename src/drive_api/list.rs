use crate::error::SyncError;

use super::client::DriveClient;
use super::types::{DriveItem, FileListPage, FOLDER_MIME_TYPE};

/// The two listing modes the sync run needs: every folder in the drive
/// (one global pass), and the non-folder children of a single folder
/// (once per folder during the download pass).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListQuery {
    AllFolders,
    FilesInFolder(String),
}

impl ListQuery {
    /// Render the Drive query string. `include_trashed` widens the
    /// result set by dropping the `trashed = false` clause.
    pub fn to_query_string(&self, include_trashed: bool) -> String {
        let mut clauses = Vec::new();
        if !include_trashed {
            clauses.push("trashed = false".to_string());
        }
        match self {
            ListQuery::AllFolders => {
                clauses.push(format!("mimeType = '{FOLDER_MIME_TYPE}'"));
            }
            ListQuery::FilesInFolder(folder_id) => {
                clauses.push(format!("mimeType != '{FOLDER_MIME_TYPE}'"));
                clauses.push(format!("'{folder_id}' in parents"));
            }
        }
        clauses.join(" and ")
    }
}

impl DriveClient {
    /// Fetch one listing page. The sequence ends when the response
    /// carries no `nextPageToken`.
    pub async fn list_page(
        &self,
        query: &ListQuery,
        page_token: Option<&str>,
    ) -> Result<FileListPage, SyncError> {
        let mut params: Vec<(&str, String)> = vec![
            ("q", query.to_query_string(self.include_trashed())),
            ("maxResults", self.page_size().to_string()),
        ];
        if let Some(token) = page_token {
            params.push(("pageToken", token.to_string()));
        }

        let resp = self.get_api("/files", &params).await?;
        let page: FileListPage = resp.json().await?;
        Ok(page)
    }
}

/// Lazy pagination driver over one query. Each cursor is restartable
/// per call, not resumable mid-stream: a fresh cursor always begins at
/// the first page.
pub struct PageCursor<'a> {
    client: &'a DriveClient,
    query: ListQuery,
    next_token: Option<String>,
    started: bool,
}

impl<'a> PageCursor<'a> {
    pub fn new(client: &'a DriveClient, query: ListQuery) -> Self {
        Self {
            client,
            query,
            next_token: None,
            started: false,
        }
    }

    /// The next batch of records, or `None` once the listing is drained.
    pub async fn next_page(&mut self) -> Result<Option<Vec<DriveItem>>, SyncError> {
        if self.started && self.next_token.is_none() {
            return Ok(None);
        }

        let page = self
            .client
            .list_page(&self.query, self.next_token.as_deref())
            .await?;
        self.started = true;
        self.next_token = page.next_page_token.filter(|t| !t.is_empty());
        Ok(Some(page.items))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_folders_query_narrows_to_untrashed() {
        assert_eq!(
            ListQuery::AllFolders.to_query_string(false),
            "trashed = false and mimeType = 'application/vnd.google-apps.folder'"
        );
    }

    #[test]
    fn include_trashed_widens_the_query() {
        assert_eq!(
            ListQuery::AllFolders.to_query_string(true),
            "mimeType = 'application/vnd.google-apps.folder'"
        );
    }

    #[test]
    fn files_query_names_the_parent() {
        assert_eq!(
            ListQuery::FilesInFolder("abc".into()).to_query_string(false),
            "trashed = false and mimeType != 'application/vnd.google-apps.folder' \
             and 'abc' in parents"
        );
    }
}
