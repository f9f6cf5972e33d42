use regex::Regex;

use crate::error::SyncError;

/// Compiled exclusion rules, matched against forward-slash relative
/// paths with search semantics: a pattern matching anywhere within the
/// path excludes the file.
#[derive(Debug)]
pub struct ExclusionFilter {
    patterns: Vec<Regex>,
}

impl ExclusionFilter {
    /// Compile every pattern up front. A malformed pattern fails the
    /// whole run before any network activity.
    pub fn new(patterns: &[String]) -> Result<Self, SyncError> {
        let compiled = patterns
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|e| {
                    SyncError::Config(format!("invalid exclusion pattern {p:?}: {e}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns: compiled })
    }

    pub fn is_excluded(&self, relative_path: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(relative_path))
    }
}
