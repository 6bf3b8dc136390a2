//! Template directory watcher for hot reload.

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::templates::{CHILD_SA_CONF_NAME, IKE_CONF_NAME};

/// A watcher that monitors the template directory for changes to
/// `ike.conf` / `childsa.conf`.
pub struct TemplateWatcher {
    directory: PathBuf,
    change_tx: mpsc::UnboundedSender<PathBuf>,
}

impl TemplateWatcher {
    /// Create a new TemplateWatcher.
    ///
    /// Returns the watcher and a receiver that yields the changed file.
    pub fn new(directory: &Path) -> (Self, mpsc::UnboundedReceiver<PathBuf>) {
        let (change_tx, change_rx) = mpsc::unbounded_channel();

        (
            Self {
                directory: directory.to_path_buf(),
                change_tx,
            },
            change_rx,
        )
    }

    /// Start watching the directory in a background thread.
    ///
    /// The returned watcher must be kept alive for notifications to flow.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.change_tx.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if !(event.kind.is_modify() || event.kind.is_create() || event.kind.is_remove()) {
                        return;
                    }
                    for path in event.paths.into_iter().filter(|p| is_template_file(p)) {
                        tracing::info!(path = ?path, "Template file change detected");
                        let _ = tx.send(path);
                    }
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.directory, RecursiveMode::NonRecursive)?;

        tracing::info!(directory = ?self.directory, "Template watcher started");
        Ok(watcher)
    }
}

fn is_template_file(path: &Path) -> bool {
    matches!(
        path.file_name().and_then(OsStr::to_str),
        Some(IKE_CONF_NAME) | Some(CHILD_SA_CONF_NAME)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_template_files_match() {
        assert!(is_template_file(Path::new("/etc/ipsec/ike.conf")));
        assert!(is_template_file(Path::new("childsa.conf")));
        assert!(!is_template_file(Path::new("/etc/ipsec/ike.conf.swp")));
        assert!(!is_template_file(Path::new("/etc/ipsec")));
    }
}
