//! Account directory adapter.
//!
//! The relay never manages accounts itself. It asks the directory for the
//! full roster when the admin's session starts, and (when enforcement is on)
//! whether an announced identity is a registered one.

use relay_core::{Identity, RelayError, RelayResult};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, info, warn};

/// Read-only view of the registered accounts.
pub trait AccountDirectory: Send + Sync {
    /// Every registered identity.
    fn list_all_identities(&self) -> RelayResult<BTreeSet<Identity>>;

    /// Whether `identity` is a registered account.
    fn verify(&self, identity: &Identity) -> bool;
}

/// Directory backed by a fixed identity list (config and/or roster file).
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    identities: BTreeSet<Identity>,
}

impl StaticDirectory {
    pub fn new(identities: impl IntoIterator<Item = Identity>) -> Self {
        Self {
            identities: identities.into_iter().collect(),
        }
    }

    /// Add the identities listed in a roster file: one per line, blank lines
    /// and `#` comments ignored. Lines are taken verbatim apart from the
    /// trailing newline; surrounding whitespace is kept (identities are
    /// exact) but logged, since it is almost always an editing mistake.
    pub fn load_roster_file(&mut self, path: &Path) -> RelayResult<usize> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RelayError::Config(format!("cannot read roster {}: {e}", path.display()))
        })?;
        let added = self.add_roster_lines(&content)?;
        info!(path = %path.display(), added, "loaded roster file");
        Ok(added)
    }

    fn add_roster_lines(&mut self, content: &str) -> RelayResult<usize> {
        let mut added = 0;
        for (lineno, line) in content.lines().enumerate() {
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() || line.trim_start().starts_with('#') {
                continue;
            }
            if has_surrounding_whitespace(line) {
                warn!(
                    line = lineno + 1,
                    identity = ?line,
                    "roster entry has surrounding whitespace, kept verbatim"
                );
            }
            let identity = Identity::new(line).map_err(|e| {
                RelayError::Config(format!("roster line {}: {e}", lineno + 1))
            })?;
            if self.identities.insert(identity) {
                added += 1;
            }
        }
        Ok(added)
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }
}

fn has_surrounding_whitespace(line: &str) -> bool {
    line.trim() != line
}

impl AccountDirectory for StaticDirectory {
    fn list_all_identities(&self) -> RelayResult<BTreeSet<Identity>> {
        debug!(count = self.identities.len(), "listing directory identities");
        Ok(self.identities.clone())
    }

    fn verify(&self, identity: &Identity) -> bool {
        self.identities.contains(identity)
    }
}
