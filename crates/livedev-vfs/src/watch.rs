//! Mirror a project directory on disk into a [`VirtualServer`].

use crate::server::VirtualServer;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("watch error: {0}")]
    Notify(#[from] notify::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Written,
    Removed,
}

/// A project file that changed on disk and has been mirrored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectChange {
    /// Project-relative, `/`-separated.
    pub path: String,
    pub kind: ChangeKind,
}

fn is_ignored(relative: &Path) -> bool {
    relative.components().any(|c| match c {
        Component::Normal(seg) => {
            let s = seg.to_string_lossy();
            s.starts_with('.') || matches!(s.as_ref(), "target" | "node_modules")
        }
        _ => false,
    })
}

fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    if is_ignored(relative) {
        return None;
    }
    let segments: Vec<String> = relative
        .components()
        .map(|c| match c {
            Component::Normal(seg) => Some(seg.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Option<_>>()?;
    (!segments.is_empty()).then(|| segments.join("/"))
}

/// Load every file under `root` into `server`. Returns the file count.
pub fn load_dir(root: &Path, server: &VirtualServer) -> Result<usize, WatchError> {
    let root = root.canonicalize()?;
    let mut loaded = 0;
    for entry in WalkDir::new(&root).follow_links(false) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(relative) = relative_path(&root, entry.path()) else {
            continue;
        };
        let bytes = std::fs::read(entry.path())?;
        if let Err(e) = server.write_file(&relative, bytes) {
            tracing::warn!("Skipping {}: {}", relative, e);
            continue;
        }
        loaded += 1;
    }
    tracing::info!("Loaded {} files from {}", loaded, root.display());
    Ok(loaded)
}

/// Bring the server's copy of `path` in line with the disk.
///
/// Returns `None` when nothing changed (unchanged bytes, ignored or
/// out-of-root paths, directories).
pub fn sync_path(root: &Path, server: &VirtualServer, path: &Path) -> Option<ProjectChange> {
    let relative = relative_path(root, path)?;

    if path.is_file() {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!("Failed to read {}: {}", path.display(), e);
                return None;
            }
        };
        if server
            .store()
            .get(&relative)
            .is_some_and(|entry| entry.bytes[..] == bytes[..])
        {
            return None;
        }
        let relative = server.write_file(&relative, bytes).ok()?;
        return Some(ProjectChange {
            path: relative,
            kind: ChangeKind::Written,
        });
    }

    if path.exists() {
        return None;
    }
    match server.remove_file(&relative) {
        Ok(true) => Some(ProjectChange {
            path: relative,
            kind: ChangeKind::Removed,
        }),
        _ => None,
    }
}

/// Filesystem watcher feeding a [`VirtualServer`].
pub struct ProjectWatcher {
    _watcher: RecommendedWatcher,
    changes: mpsc::UnboundedReceiver<ProjectChange>,
}

impl ProjectWatcher {
    /// Watch `root` recursively. Files are mirrored into `server` before the
    /// matching [`ProjectChange`] is delivered.
    pub fn start(root: &Path, server: Arc<VirtualServer>) -> Result<Self, WatchError> {
        let root: PathBuf = root.canonicalize()?;
        let (tx, changes) = mpsc::unbounded_channel();
        let watch_root = root.clone();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    tracing::warn!("Watch error: {}", e);
                    return;
                }
            };
            if matches!(event.kind, EventKind::Access(_)) {
                return;
            }
            for path in &event.paths {
                if let Some(change) = sync_path(&watch_root, &server, path) {
                    tracing::debug!(path = %change.path, kind = ?change.kind, "project change");
                    let _ = tx.send(change);
                }
            }
        })?;
        watcher.watch(&root, RecursiveMode::Recursive)?;
        tracing::info!("Watching {}", root.display());

        Ok(Self {
            _watcher: watcher,
            changes,
        })
    }

    pub async fn next(&mut self) -> Option<ProjectChange> {
        self.changes.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::ServerConfig;
    use crate::store::VirtualFileStore;
    use std::fs;

    fn server() -> VirtualServer {
        VirtualServer::new(ServerConfig::default(), Arc::new(VirtualFileStore::new()))
    }

    #[test]
    fn loads_files_and_skips_hidden_dirs() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("css")).unwrap();
        fs::create_dir_all(dir.path().join(".git")).unwrap();
        fs::write(dir.path().join("index.html"), "<p>hi</p>").unwrap();
        fs::write(dir.path().join("css/site.css"), "p{}").unwrap();
        fs::write(dir.path().join(".git/HEAD"), "ref").unwrap();

        let server = server();
        assert_eq!(load_dir(dir.path(), &server).unwrap(), 2);
        assert_eq!(
            server.store().paths(),
            vec!["css/site.css".to_string(), "index.html".to_string()]
        );
    }

    #[test]
    fn sync_mirrors_writes_and_removals() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let file = root.join("a.css");
        let server = server();

        fs::write(&file, "a{}").unwrap();
        assert_eq!(
            sync_path(&root, &server, &file),
            Some(ProjectChange {
                path: "a.css".into(),
                kind: ChangeKind::Written
            })
        );
        assert_eq!(sync_path(&root, &server, &file), None);

        fs::remove_file(&file).unwrap();
        assert_eq!(
            sync_path(&root, &server, &file).map(|c| c.kind),
            Some(ChangeKind::Removed)
        );
        assert!(server.store().is_empty());
    }

    #[test]
    fn paths_outside_the_root_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let other = tempfile::tempdir().unwrap();
        let file = other.path().join("x.css");
        fs::write(&file, "").unwrap();
        assert_eq!(sync_path(dir.path(), &server(), &file), None);
    }

    #[tokio::test]
    async fn watcher_reports_changes() {
        let dir = tempfile::tempdir().unwrap();
        let server = Arc::new(server());
        let mut watcher = ProjectWatcher::start(dir.path(), server.clone()).unwrap();

        fs::write(dir.path().join("page.html"), "<b>x</b>").unwrap();
        let change = tokio::time::timeout(std::time::Duration::from_secs(5), async {
            loop {
                let change = watcher.next().await.unwrap();
                if change.path == "page.html" {
                    break change;
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(change.kind, ChangeKind::Written);
        assert_eq!(&server.store().get("page.html").unwrap().bytes[..], b"<b>x</b>");
    }
}
