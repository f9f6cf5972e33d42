pub mod decision;
pub mod exclude;
pub mod hierarchy;
pub mod mirror;
pub mod paths;

use std::path::Path;
use std::sync::Arc;

use crate::config::MirrorConfig;
use crate::drive_api::{DriveClient, ListQuery, PageCursor};
use crate::drive_api::types::DriveItem;
use crate::error::{Phase, RunError, SyncError};

use decision::{DecisionContext, SyncDecision};
use exclude::ExclusionFilter;
use hierarchy::FolderMeta;
use mirror::LocalMirror;

/// Per-invocation switches from the command line.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Log every decision but mutate nothing, locally or remotely
    pub dry_run: bool,
    /// Transfer every non-excluded file regardless of timestamps
    pub ignore_modtime: bool,
}

/// What a completed run did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    pub transferred: usize,
    pub up_to_date: usize,
    pub excluded: usize,
    pub timestamp_warnings: usize,
}

/// Drives one mirror run through its phases: list folders, build the
/// hierarchy, prepare the local mirror, then walk every folder's files
/// and transfer what the decision engine says to.
pub struct SyncEngine {
    client: Arc<DriveClient>,
    config: MirrorConfig,
    filter: ExclusionFilter,
    opts: RunOptions,
}

impl SyncEngine {
    /// Compiles the exclusion rules; a malformed pattern fails here,
    /// before any network activity.
    pub fn new(
        client: Arc<DriveClient>,
        config: MirrorConfig,
        opts: RunOptions,
    ) -> Result<Self, SyncError> {
        let filter = ExclusionFilter::new(&config.exclusions)?;
        Ok(Self {
            client,
            config,
            filter,
            opts,
        })
    }

    pub async fn run(&self) -> Result<SyncReport, RunError> {
        let folders = self
            .list_all_folders()
            .await
            .map_err(|e| e.during(Phase::ListingFolders))?;
        tracing::debug!(count = folders.len(), "remote folders listed");

        let (table, tree) = hierarchy::build_hierarchy(folders)
            .map_err(|e| e.during(Phase::BuildingHierarchy))?;
        tracing::info!(folders = table.len() - 1, "hierarchy resolved");

        let mirror = LocalMirror::new(&self.config.storage_path, self.opts.dry_run);
        mirror
            .prepare(&table, &tree)
            .map_err(|e| e.during(Phase::PreparingMirror))?;

        let mut report = SyncReport::default();
        for folder_id in table.ids() {
            let segments = paths::folder_path(folder_id, &table)
                .map_err(|e| e.during(Phase::IteratingFiles))?;

            let mut cursor = PageCursor::new(
                &self.client,
                ListQuery::FilesInFolder(folder_id.to_string()),
            );
            while let Some(items) = cursor
                .next_page()
                .await
                .map_err(|e| e.during(Phase::IteratingFiles))?
            {
                for item in &items {
                    self.process_file(item, &segments, mirror.root(), &mut report)
                        .await
                        .map_err(|e| e.during(Phase::IteratingFiles))?;
                }
            }
        }

        tracing::info!(
            transferred = report.transferred,
            up_to_date = report.up_to_date,
            excluded = report.excluded,
            timestamp_warnings = report.timestamp_warnings,
            dry_run = self.opts.dry_run,
            "mirror run complete"
        );
        Ok(report)
    }

    async fn list_all_folders(&self) -> Result<Vec<FolderMeta>, SyncError> {
        let mut cursor = PageCursor::new(&self.client, ListQuery::AllFolders);
        let mut folders = Vec::new();
        while let Some(items) = cursor.next_page().await? {
            folders.extend(
                items
                    .iter()
                    .filter(|item| item.is_folder())
                    .map(FolderMeta::from_item),
            );
        }
        Ok(folders)
    }

    async fn process_file(
        &self,
        item: &DriveItem,
        folder_segments: &[String],
        mirror_root: &Path,
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        let filename = paths::local_filename(item, &self.config.download_formats);
        paths::validate_segment(&filename)?;
        let relative = paths::join_relative(folder_segments, &filename);

        match self.sync_one(item, &relative, mirror_root).await {
            Ok(SyncDecision::Excluded) => {
                tracing::debug!(path = %relative, "excluded");
                report.excluded += 1;
            }
            Ok(SyncDecision::UpToDate) => {
                tracing::debug!(path = %relative, "unchanged, skipping");
                report.up_to_date += 1;
            }
            Ok(SyncDecision::Transfer(_)) => {
                report.transferred += 1;
            }
            Err(SyncError::BadTimestamp { name, raw }) if !self.config.strict_timestamps => {
                tracing::warn!(
                    file = %name,
                    raw = %raw,
                    "unparsable remote timestamp, skipping file"
                );
                report.timestamp_warnings += 1;
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }

    async fn sync_one(
        &self,
        item: &DriveItem,
        relative: &str,
        mirror_root: &Path,
    ) -> Result<SyncDecision, SyncError> {
        let ctx = DecisionContext {
            filter: &self.filter,
            mirror_root,
            ignore_modtime: self.opts.ignore_modtime,
        };
        let verdict = decision::decide(&ctx, relative, item)?;

        if let SyncDecision::Transfer(reason) = verdict {
            tracing::info!(path = %relative, reason = %reason, "downloading");
            if !self.opts.dry_run {
                let dest = mirror_root.join(relative);
                self.client
                    .download_to(item, &dest, &self.config.download_formats)
                    .await?;
            }
        }
        Ok(verdict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::BTreeMap;
    use std::path::PathBuf;

    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::auth::{credential_store, CredentialManager};
    use crate::config::AuthConfig;

    const FOLDER_MIME: &str = "application/vnd.google-apps.folder";
    const REPORT_STAMP_SECS: i64 = 1_704_153_600; // 2024-01-02T00:00:00Z

    fn test_credentials(dir: &Path) -> Arc<CredentialManager> {
        let store_path = dir.join("credentials.json");
        let credential = credential_store::Credential {
            access_token: "test-token".into(),
            refresh_token: "test-refresh".into(),
            expires_at: chrono::Utc::now() + chrono::Duration::days(365),
        };
        credential_store::store(&store_path, "test-client", &credential).unwrap();
        let cfg = AuthConfig {
            client_id: "test-client".into(),
            client_secret: "secret".into(),
            credentials_path: Some(store_path),
        };
        Arc::new(CredentialManager::new(&cfg).unwrap())
    }

    fn mirror_config(storage_path: PathBuf, exclusions: Vec<String>) -> MirrorConfig {
        MirrorConfig {
            storage_path,
            include_trashed: false,
            page_size: 100,
            exclusions,
            strict_timestamps: false,
            download_formats: BTreeMap::new(),
        }
    }

    fn folders_query() -> String {
        format!("trashed = false and mimeType = '{FOLDER_MIME}'")
    }

    fn files_query(folder_id: &str) -> String {
        format!("trashed = false and mimeType != '{FOLDER_MIME}' and '{folder_id}' in parents")
    }

    async fn mount_listing(server: &MockServer, query: String, body: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path("/files"))
            .and(query_param("q", query))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }

    async fn engine_for(
        server: &MockServer,
        dir: &Path,
        exclusions: Vec<String>,
        opts: RunOptions,
    ) -> SyncEngine {
        let credentials = test_credentials(dir);
        let client = Arc::new(DriveClient::with_base_url(
            credentials,
            server.uri(),
            100,
            false,
        ));
        SyncEngine::new(client, mirror_config(dir.join("mirror"), exclusions), opts).unwrap()
    }

    fn report_txt(server_uri: &str) -> serde_json::Value {
        json!({
            "id": "f1",
            "title": "report.txt",
            "mimeType": "text/plain",
            "parents": [{"id": "d", "isRoot": false}],
            "modifiedDate": "2024-01-02T00:00:00.000Z",
            "downloadUrl": format!("{server_uri}/download/f1"),
        })
    }

    #[tokio::test]
    async fn mirrors_a_new_file_into_its_folder() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();

        mount_listing(
            &server,
            folders_query(),
            json!({"items": [{
                "id": "d", "title": "Docs", "mimeType": FOLDER_MIME,
                "parents": [{"id": "r", "isRoot": true}],
            }]}),
        )
        .await;
        mount_listing(&server, files_query("root"), json!({"items": []})).await;
        mount_listing(
            &server,
            files_query("d"),
            json!({"items": [report_txt(&server.uri())]}),
        )
        .await;
        Mock::given(method("GET"))
            .and(path("/download/f1"))
            .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
            .expect(1)
            .mount(&server)
            .await;

        let engine = engine_for(&server, dir.path(), vec![r"\.tmp$".into()], RunOptions::default())
            .await;
        let report = engine.run().await.unwrap();

        assert_eq!(report.transferred, 1);
        assert_eq!(report.excluded, 0);

        let target = dir.path().join("mirror/Docs/report.txt");
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "hello");

        let meta = std::fs::metadata(&target).unwrap();
        let mtime = filetime::FileTime::from_last_modification_time(&meta);
        assert_eq!(mtime.unix_seconds(), REPORT_STAMP_SECS);
    }

    #[tokio::test]
    async fn excluded_files_are_never_fetched() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();

        mount_listing(
            &server,
            folders_query(),
            json!({"items": [{
                "id": "d", "title": "Docs", "mimeType": FOLDER_MIME,
                "parents": [{"id": "r", "isRoot": true}],
            }]}),
        )
        .await;
        mount_listing(&server, files_query("root"), json!({"items": []})).await;
        mount_listing(
            &server,
            files_query("d"),
            json!({"items": [report_txt(&server.uri())]}),
        )
        .await;
        Mock::given(method("GET"))
            .and(path("/download/f1"))
            .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
            .expect(0)
            .mount(&server)
            .await;

        let engine =
            engine_for(&server, dir.path(), vec!["report".into()], RunOptions::default()).await;
        let report = engine.run().await.unwrap();

        assert_eq!(report.transferred, 0);
        assert_eq!(report.excluded, 1);
        // folder creation still happened, the file was never written
        assert!(dir.path().join("mirror/Docs").is_dir());
        assert!(!dir.path().join("mirror/Docs/report.txt").exists());
    }

    #[tokio::test]
    async fn unchanged_files_are_skipped() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();

        mount_listing(
            &server,
            folders_query(),
            json!({"items": [{
                "id": "d", "title": "Docs", "mimeType": FOLDER_MIME,
                "parents": [{"id": "r", "isRoot": true}],
            }]}),
        )
        .await;
        mount_listing(&server, files_query("root"), json!({"items": []})).await;
        mount_listing(
            &server,
            files_query("d"),
            json!({"items": [report_txt(&server.uri())]}),
        )
        .await;
        Mock::given(method("GET"))
            .and(path("/download/f1"))
            .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
            .expect(0)
            .mount(&server)
            .await;

        // seed the mirror with an up-to-date copy
        let target_dir = dir.path().join("mirror/Docs");
        std::fs::create_dir_all(&target_dir).unwrap();
        let target = target_dir.join("report.txt");
        std::fs::write(&target, "hello").unwrap();
        filetime::set_file_mtime(
            &target,
            filetime::FileTime::from_unix_time(REPORT_STAMP_SECS, 0),
        )
        .unwrap();

        let engine = engine_for(&server, dir.path(), vec![], RunOptions::default()).await;
        let report = engine.run().await.unwrap();

        assert_eq!(report.transferred, 0);
        assert_eq!(report.up_to_date, 1);
    }

    #[tokio::test]
    async fn folder_listing_pagination_is_drained() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();

        // page 2 first, with higher priority so the page-1 mock does not
        // swallow the tokened request
        Mock::given(method("GET"))
            .and(path("/files"))
            .and(query_param("q", folders_query()))
            .and(query_param("pageToken", "p2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": [{
                "id": "w", "title": "Work", "mimeType": FOLDER_MIME,
                "parents": [{"id": "d", "isRoot": false}],
            }]})))
            .with_priority(1)
            .mount(&server)
            .await;
        mount_listing(
            &server,
            folders_query(),
            json!({
                "items": [{
                    "id": "d", "title": "Docs", "mimeType": FOLDER_MIME,
                    "parents": [{"id": "r", "isRoot": true}],
                }],
                "nextPageToken": "p2",
            }),
        )
        .await;
        for folder_id in ["root", "d", "w"] {
            mount_listing(&server, files_query(folder_id), json!({"items": []})).await;
        }

        let engine = engine_for(&server, dir.path(), vec![], RunOptions::default()).await;
        engine.run().await.unwrap();

        assert!(dir.path().join("mirror/Docs/Work").is_dir());
    }

    fn broken_txt(server_uri: &str) -> serde_json::Value {
        json!({
            "id": "f2",
            "title": "broken.txt",
            "mimeType": "text/plain",
            "parents": [{"id": "d", "isRoot": false}],
            "modifiedDate": "not-a-date",
            "downloadUrl": format!("{server_uri}/download/f2"),
        })
    }

    #[tokio::test]
    async fn bad_timestamp_warns_and_the_run_continues() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();

        mount_listing(
            &server,
            folders_query(),
            json!({"items": [{
                "id": "d", "title": "Docs", "mimeType": FOLDER_MIME,
                "parents": [{"id": "r", "isRoot": true}],
            }]}),
        )
        .await;
        mount_listing(&server, files_query("root"), json!({"items": []})).await;
        mount_listing(
            &server,
            files_query("d"),
            json!({"items": [broken_txt(&server.uri()), report_txt(&server.uri())]}),
        )
        .await;
        // only the parsable file is ever fetched
        Mock::given(method("GET"))
            .and(path("/download/f1"))
            .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/download/f2"))
            .respond_with(ResponseTemplate::new(200).set_body_string("never"))
            .expect(0)
            .mount(&server)
            .await;

        let engine = engine_for(&server, dir.path(), vec![], RunOptions::default()).await;
        let report = engine.run().await.unwrap();

        assert_eq!(report.timestamp_warnings, 1);
        assert_eq!(report.transferred, 1);
        assert!(dir.path().join("mirror/Docs/report.txt").is_file());
        assert!(!dir.path().join("mirror/Docs/broken.txt").exists());
    }

    #[tokio::test]
    async fn strict_timestamps_abort_on_unparsable_stamp() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();

        mount_listing(
            &server,
            folders_query(),
            json!({"items": [{
                "id": "d", "title": "Docs", "mimeType": FOLDER_MIME,
                "parents": [{"id": "r", "isRoot": true}],
            }]}),
        )
        .await;
        mount_listing(&server, files_query("root"), json!({"items": []})).await;
        mount_listing(
            &server,
            files_query("d"),
            json!({"items": [broken_txt(&server.uri())]}),
        )
        .await;

        let credentials = test_credentials(dir.path());
        let client = Arc::new(DriveClient::with_base_url(
            credentials,
            server.uri(),
            100,
            false,
        ));
        let mut cfg = mirror_config(dir.path().join("mirror"), vec![]);
        cfg.strict_timestamps = true;
        let engine = SyncEngine::new(client, cfg, RunOptions::default()).unwrap();

        let err = engine.run().await.unwrap_err();
        assert_eq!(err.phase, Phase::IteratingFiles);
        assert!(matches!(err.source, SyncError::BadTimestamp { .. }));
    }

    #[tokio::test]
    async fn dry_run_decides_but_mutates_nothing() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();

        mount_listing(
            &server,
            folders_query(),
            json!({"items": [{
                "id": "d", "title": "Docs", "mimeType": FOLDER_MIME,
                "parents": [{"id": "r", "isRoot": true}],
            }]}),
        )
        .await;
        mount_listing(&server, files_query("root"), json!({"items": []})).await;
        mount_listing(
            &server,
            files_query("d"),
            json!({"items": [report_txt(&server.uri())]}),
        )
        .await;
        Mock::given(method("GET"))
            .and(path("/download/f1"))
            .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
            .expect(0)
            .mount(&server)
            .await;

        let opts = RunOptions {
            dry_run: true,
            ignore_modtime: false,
        };
        let engine = engine_for(&server, dir.path(), vec![], opts).await;
        let report = engine.run().await.unwrap();

        // the decision was made and counted, but nothing touched disk
        assert_eq!(report.transferred, 1);
        assert!(!dir.path().join("mirror").exists());
    }
}
