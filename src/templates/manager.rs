//! Template loading and fingerprinting.
//!
//! # Design Decisions
//! - Each reload builds a complete [`TemplateSet`] before anything is
//!   published; a failed reload leaves the previous set in effect
//! - The fingerprint covers the raw bytes of both documents, so any edit
//!   (including whitespace) yields a new revision
//! - Callers get owned copies of the decoded templates and may mutate them
//!   freely

use arc_swap::ArcSwap;
use sha2::{Digest, Sha256};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::templates::schema::{ChildSaConf, IkeConf, DEFAULT_CHILD_SA_CONF, DEFAULT_IKE_CONF};
use crate::templates::{CHILD_SA_CONF_NAME, IKE_CONF_NAME};

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("failed to read template {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid {document} template: {source}")]
    Invalid {
        document: &'static str,
        /// The offending document as read from disk.
        raw: String,
        #[source]
        source: serde_json::Error,
    },
}

pub type TemplateResult<T> = Result<T, TemplateError>;

/// One validated generation of templates.
#[derive(Debug, Clone)]
struct TemplateSet {
    ike: IkeConf,
    child_sa: ChildSaConf,
    revision: String,
}

pub struct TemplateManager {
    directory: PathBuf,
    current: ArcSwap<TemplateSet>,
}

impl TemplateManager {
    /// Load templates from `directory`; fails if the initial set is invalid.
    pub fn load(directory: impl Into<PathBuf>) -> TemplateResult<Self> {
        let directory = directory.into();
        let set = read_set(&directory)?;
        tracing::info!(directory = %directory.display(), revision = %set.revision, "Templates loaded");
        Ok(Self {
            directory,
            current: ArcSwap::from_pointee(set),
        })
    }

    /// Re-read both documents and publish them if they validate.
    pub fn reload(&self) -> TemplateResult<String> {
        let set = read_set(&self.directory)?;
        let revision = set.revision.clone();
        let previous = self.current.swap(Arc::new(set));
        if previous.revision != revision {
            tracing::info!(old = %previous.revision, new = %revision, "Template revision changed");
        }
        Ok(revision)
    }

    /// Hex SHA-256 over the IKE bytes followed by the CHILD_SA bytes.
    pub fn revision(&self) -> String {
        self.current.load().revision.clone()
    }

    pub fn new_ike_config(&self) -> IkeConf {
        self.current.load().ike.clone()
    }

    pub fn new_child_sa_config(&self) -> ChildSaConf {
        self.current.load().child_sa.clone()
    }
}

fn read_set(directory: &Path) -> TemplateResult<TemplateSet> {
    let ike_bytes = read_or_default(&directory.join(IKE_CONF_NAME), DEFAULT_IKE_CONF)?;
    let ike = decode::<IkeConf>(IKE_CONF_NAME, &ike_bytes)?;

    let child_sa_bytes = read_or_default(&directory.join(CHILD_SA_CONF_NAME), DEFAULT_CHILD_SA_CONF)?;
    let child_sa = decode::<ChildSaConf>(CHILD_SA_CONF_NAME, &child_sa_bytes)?;

    let mut digest = Sha256::new();
    digest.update(&ike_bytes);
    digest.update(&child_sa_bytes);
    let revision = hex::encode(digest.finalize());

    Ok(TemplateSet {
        ike,
        child_sa,
        revision,
    })
}

fn read_or_default(path: &Path, default: &str) -> TemplateResult<Vec<u8>> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "Template not found, using built-in default");
            Ok(default.as_bytes().to_vec())
        }
        Err(source) => Err(TemplateError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn decode<T: serde::de::DeserializeOwned>(document: &'static str, bytes: &[u8]) -> TemplateResult<T> {
    serde_json::from_slice(bytes).map_err(|source| {
        let raw = String::from_utf8_lossy(bytes).into_owned();
        tracing::error!(document, error = %source, raw = %raw, "Failed to decode template");
        TemplateError::Invalid {
            document,
            raw,
            source,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_defaults_when_files_absent() {
        let dir = tempfile::tempdir().unwrap();
        let manager = TemplateManager::load(dir.path()).unwrap();

        assert_eq!(manager.new_ike_config().dpd_delay, "10s");
        assert_eq!(manager.new_child_sa_config().start_action, "start");
        assert_eq!(manager.revision().len(), 64);
    }

    #[test]
    fn test_revision_stable_for_unchanged_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(IKE_CONF_NAME), r#"{"version":"2"}"#).unwrap();

        let manager = TemplateManager::load(dir.path()).unwrap();
        let first = manager.revision();
        assert_eq!(manager.reload().unwrap(), first);

        let other = TemplateManager::load(dir.path()).unwrap();
        assert_eq!(other.revision(), first);
    }

    #[test]
    fn test_revision_changes_when_either_file_changes() {
        let dir = tempfile::tempdir().unwrap();
        let manager = TemplateManager::load(dir.path()).unwrap();
        let initial = manager.revision();

        fs::write(dir.path().join(CHILD_SA_CONF_NAME), r#"{"mode":"tunnel"}"#).unwrap();
        let after_child = manager.reload().unwrap();
        assert_ne!(after_child, initial);

        fs::write(dir.path().join(IKE_CONF_NAME), r#"{"version":"1"}"#).unwrap();
        let after_ike = manager.reload().unwrap();
        assert_ne!(after_ike, after_child);
        assert_eq!(manager.new_ike_config().version, "1");
    }

    #[test]
    fn test_malformed_template_keeps_previous_set() {
        let dir = tempfile::tempdir().unwrap();
        let manager = TemplateManager::load(dir.path()).unwrap();
        let revision = manager.revision();

        fs::write(dir.path().join(IKE_CONF_NAME), "{ not json").unwrap();
        match manager.reload() {
            Err(TemplateError::Invalid { document, raw, .. }) => {
                assert_eq!(document, IKE_CONF_NAME);
                assert_eq!(raw, "{ not json");
            }
            other => panic!("expected invalid template, got {other:?}"),
        }

        assert_eq!(manager.revision(), revision);
        assert_eq!(manager.new_ike_config().encap, "yes");
    }

    #[test]
    fn test_load_fails_on_invalid_initial_template() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CHILD_SA_CONF_NAME), r#"{"esp_proposals": 5}"#).unwrap();
        assert!(matches!(
            TemplateManager::load(dir.path()),
            Err(TemplateError::Invalid { document: CHILD_SA_CONF_NAME, .. })
        ));
    }

    #[test]
    fn test_unreadable_template_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join(IKE_CONF_NAME)).unwrap();
        assert!(matches!(TemplateManager::load(dir.path()), Err(TemplateError::Io { .. })));
    }

    #[test]
    fn test_copies_are_independent() {
        let dir = tempfile::tempdir().unwrap();
        let manager = TemplateManager::load(dir.path()).unwrap();

        let mut copy = manager.new_child_sa_config();
        copy.local_ts.push("10.0.0.0/8".to_string());
        copy.mode = "transport".to_string();

        let fresh = manager.new_child_sa_config();
        assert_eq!(fresh.local_ts, vec!["0.0.0.0/0".to_string()]);
        assert_eq!(fresh.mode, "tunnel");
    }
}
