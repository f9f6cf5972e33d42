use std::collections::BTreeMap;

use crate::config::DownloadFormat;
use crate::drive_api::types::DriveItem;
use crate::error::SyncError;

use super::hierarchy::{self, FolderTable};

/// Reject a remote name that cannot serve as a single local path
/// segment. A name carrying a separator or `..` would place content
/// outside the mirror root.
pub fn validate_segment(name: &str) -> Result<(), SyncError> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
    {
        return Err(SyncError::Integrity(format!(
            "remote name {name:?} is not usable as a path segment"
        )));
    }
    Ok(())
}

/// Resolve a folder's path relative to the drive root: name segments in
/// root-to-leaf order. The root itself resolves to the empty path.
pub fn folder_path(id: &str, table: &FolderTable) -> Result<Vec<String>, SyncError> {
    let chain = hierarchy::ancestor_chain(id, table)?;
    chain
        .iter()
        .map(|link| {
            let meta = table.get(link).ok_or_else(|| {
                SyncError::Integrity(format!("folder {link} vanished from the table"))
            })?;
            validate_segment(&meta.name)?;
            Ok(meta.name.clone())
        })
        .collect()
}

/// The local filename for a file record: the display name, with the
/// configured export extension appended when the mime type maps to an
/// export format.
pub fn local_filename(item: &DriveItem, formats: &BTreeMap<String, DownloadFormat>) -> String {
    match formats.get(&item.mime_type) {
        Some(format) => format!("{}.{}", item.name, format.extension),
        None => item.name.clone(),
    }
}

/// Join folder segments and a filename into the forward-slash relative
/// path used for exclusion matching and mirror placement.
pub fn join_relative(folder_segments: &[String], filename: &str) -> String {
    if folder_segments.is_empty() {
        filename.to_string()
    } else {
        format!("{}/{}", folder_segments.join("/"), filename)
    }
}
