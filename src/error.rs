use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// The closed set of failure kinds the sync core can produce.
///
/// Callers dispatch on the variant, never on message text: transport and
/// authorization failures abort the run, `BadTimestamp` is fatal only for
/// the affected file (unless strict timestamps are configured), and
/// everything filesystem- or configuration-shaped is fatal outright.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Protocol-level failure talking to the Drive API (connect, timeout,
    /// malformed response body).
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    /// The API rejected our credentials.
    #[error("authorization failure: {0}")]
    Auth(String),

    /// No cached credential exists for the configured client id.
    #[error("no cached credential for client id {client_id}, run `drivemirror login` first")]
    CredentialNotFound { client_id: String },

    /// The API answered a listing request with a non-success status.
    #[error("Drive API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// A file transfer came back with a non-success status.
    #[error("download failed (HTTP {code}): {body}")]
    Download { code: u16, body: String },

    /// A file offers no usable content URL for the configured formats.
    #[error("no downloadable content for {name}: {reason}")]
    NoContent { name: String, reason: String },

    /// The folder listing contradicts itself (dangling parent, cycle).
    #[error("hierarchy integrity error: {0}")]
    Integrity(String),

    /// A file's remote modification timestamp could not be parsed.
    #[error("cannot parse remote timestamp {raw:?} for {name}")]
    BadTimestamp { name: String, raw: String },

    #[error("filesystem error at {path}: {source}")]
    LocalFs {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration error: {0}")]
    Config(String),
}

impl SyncError {
    pub fn local_fs(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::LocalFs {
            path: path.into(),
            source,
        }
    }

    /// Attach the run phase in which this error surfaced.
    pub fn during(self, phase: Phase) -> RunError {
        RunError {
            phase,
            source: self,
        }
    }
}

/// The phases a sync run moves through, in order. Used to annotate fatal
/// errors so the operator can tell where the run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    ListingFolders,
    BuildingHierarchy,
    PreparingMirror,
    IteratingFiles,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::ListingFolders => "listing remote folders",
            Phase::BuildingHierarchy => "building the folder hierarchy",
            Phase::PreparingMirror => "preparing the local mirror",
            Phase::IteratingFiles => "iterating remote files",
        };
        f.write_str(s)
    }
}

/// A fatal sync failure, tagged with the phase it happened in.
#[derive(Debug, Error)]
#[error("sync failed while {phase}: {source}")]
pub struct RunError {
    pub phase: Phase,
    #[source]
    pub source: SyncError,
}
