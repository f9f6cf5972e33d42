use std::path::Path;
use std::time::UNIX_EPOCH;

use crate::drive_api::types::DriveItem;
use crate::error::SyncError;

use super::exclude::ExclusionFilter;

/// Why a transfer is required.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferReason {
    /// No local file exists at the target path
    Missing,
    /// The remote copy is strictly newer than the local one
    RemoteNewer,
    /// The modification-time check is overridden
    Forced,
}

impl std::fmt::Display for TransferReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TransferReason::Missing => "missing locally",
            TransferReason::RemoteNewer => "remote is newer",
            TransferReason::Forced => "forced",
        };
        f.write_str(s)
    }
}

/// The verdict for one remote file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDecision {
    /// Matched an exclusion rule; no transfer, no filesystem touch
    Excluded,
    /// Local copy is as new as the remote; skip
    UpToDate,
    Transfer(TransferReason),
}

/// Inputs the decision needs besides the file record itself.
pub struct DecisionContext<'a> {
    pub filter: &'a ExclusionFilter,
    pub mirror_root: &'a Path,
    pub ignore_modtime: bool,
}

/// Decide whether a remote file needs transferring.
///
/// Exclusion is checked first and touches nothing on disk. Timestamps
/// are compared at second granularity on both sides; equal or older
/// remote means skip. An unparsable remote timestamp surfaces as
/// [`SyncError::BadTimestamp`], fatal for this file only, unless the
/// caller is configured strict.
pub fn decide(
    ctx: &DecisionContext<'_>,
    relative_path: &str,
    item: &DriveItem,
) -> Result<SyncDecision, SyncError> {
    if ctx.filter.is_excluded(relative_path) {
        return Ok(SyncDecision::Excluded);
    }

    let abs_path = ctx.mirror_root.join(relative_path);
    if !abs_path.exists() {
        return Ok(SyncDecision::Transfer(TransferReason::Missing));
    }
    if ctx.ignore_modtime {
        return Ok(SyncDecision::Transfer(TransferReason::Forced));
    }

    let remote_secs = item.modified_at()?.timestamp();
    let metadata =
        std::fs::metadata(&abs_path).map_err(|e| SyncError::local_fs(&abs_path, e))?;
    let local_secs = metadata
        .modified()
        .map_err(|e| SyncError::local_fs(&abs_path, e))?
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64;

    if remote_secs > local_secs {
        Ok(SyncDecision::Transfer(TransferReason::RemoteNewer))
    } else {
        Ok(SyncDecision::UpToDate)
    }
}
