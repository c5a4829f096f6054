//! The local repository cache.
//!
//! RPKI repositories are published in an rsync namespace. This module
//! keeps a local mirror of that namespace under a configured directory,
//! laid out as `<cache>/<authority>/<module>/<path>`. The unit of
//! synchronization is the rsync module: before any file below a module
//! is read during a validation cycle, the module is synchronized
//! exactly once. Concurrent requests for the same module wait for the
//! one running sync; requests for different modules run in parallel up
//! to a configured limit.
//!
//! The actual transfer is delegated to the rsync binary. The cache owns
//! only the URI-to-path mapping, the per-cycle synced set, and the
//! serialization of in-flight syncs.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use bytes::Bytes;
use log::{debug, error, warn};
use tokio::process::Command;
use tokio::sync::{Mutex, Semaphore};
use crate::uri;


//------------ Cache ---------------------------------------------------------

/// The local repository cache.
#[derive(Debug)]
pub struct Cache {
    /// The directory the rsync namespace is mirrored under.
    cache_dir: PathBuf,

    /// The rsync command to run.
    command: String,

    /// Additional arguments for the command.
    args: Vec<String>,

    /// Bounds the number of concurrently running rsync processes.
    concurrency: Arc<Semaphore>,
}

impl Cache {
    /// Creates a new cache under the given directory.
    pub fn new(
        cache_dir: PathBuf,
        command: String,
        args: Vec<String>,
        concurrency: usize,
    ) -> Result<Self, io::Error> {
        std::fs::create_dir_all(&cache_dir)?;
        Ok(Cache {
            cache_dir,
            command,
            args,
            concurrency: Arc::new(Semaphore::new(concurrency.max(1))),
        })
    }

    /// Starts a new validation cycle.
    ///
    /// The returned value tracks which modules have been synchronized
    /// during this cycle and lives until the cycle ends.
    pub fn start(&self) -> Run {
        Run {
            cache: self,
            modules: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the local path for an rsync URI.
    ///
    /// Returns `None` for URIs whose path could escape the cache
    /// directory.
    pub fn uri_path(&self, uri: &uri::Rsync) -> Option<PathBuf> {
        let mut res = self.cache_dir.clone();
        res.push(uri.module().authority());
        res.push(uri.module().module());
        for item in uri.path().split('/') {
            if item.is_empty() || item == "." || item == ".." {
                return None
            }
            res.push(item);
        }
        Some(res)
    }

    /// Returns the local directory for an rsync module.
    fn module_path(&self, module: &uri::RsyncModule) -> PathBuf {
        let mut res = self.cache_dir.clone();
        res.push(module.authority());
        res.push(module.module());
        res
    }

    /// Runs rsync for the given module.
    async fn sync_module(&self, module: &uri::RsyncModule) -> bool {
        let dest = self.module_path(module);
        if let Err(err) = std::fs::create_dir_all(&dest) {
            error!(
                "Failed to create directory {}: {}", dest.display(), err
            );
            return false
        }

        // The semaphore is never closed, so acquiring cannot fail.
        let _permit = self.concurrency.acquire().await.expect(
            "rsync concurrency semaphore closed"
        );
        debug!("rsyncing from {}", module);
        let mut cmd = Command::new(&self.command);
        // A cycle hitting its deadline must not leave transfers behind.
        cmd.kill_on_drop(true);
        cmd.args(&self.args)
            .arg("-rltz")
            .arg("--delete")
            .arg(module.to_string())
            .arg(&dest);
        match cmd.output().await {
            Ok(output) => {
                if output.status.success() {
                    true
                }
                else {
                    warn!(
                        "rsync for {} failed: {}",
                        module,
                        String::from_utf8_lossy(&output.stderr).trim()
                    );
                    false
                }
            }
            Err(err) => {
                warn!("Cannot run {}: {}", self.command, err);
                false
            }
        }
    }
}


//------------ Run -----------------------------------------------------------

/// The cache’s view of one validation cycle.
pub struct Run<'a> {
    /// The underlying cache.
    cache: &'a Cache,

    /// The modules this cycle knows about.
    ///
    /// Each module has its own entry lock so a sync happens exactly
    /// once while concurrent requests for other modules proceed.
    modules: Mutex<HashMap<uri::RsyncModule, Arc<Mutex<Option<bool>>>>>,
}

impl Run<'_> {
    /// Makes sure the module of the given URI is synchronized.
    ///
    /// Returns whether the module is (now) locally available. Every
    /// module is synchronized at most once per cycle; a failed sync
    /// stays failed for the rest of the cycle.
    pub async fn ensure_module(&self, uri: &uri::Rsync) -> bool {
        let entry = {
            let mut modules = self.modules.lock().await;
            modules.entry(uri.to_module())
                .or_insert_with(Default::default)
                .clone()
        };
        let mut state = entry.lock().await;
        match *state {
            Some(success) => success,
            None => {
                let success
                    = self.cache.sync_module(&uri.to_module()).await;
                *state = Some(success);
                success
            }
        }
    }

    /// Returns the local path of the file behind the given URI.
    ///
    /// Synchronizes the module first if necessary. Returns `None` if
    /// the module cannot be synchronized or the URI’s path is illegal.
    /// The file itself may still be absent from the local copy.
    pub async fn file_path(
        &self, uri: &uri::Rsync
    ) -> Option<PathBuf> {
        if !self.ensure_module(uri).await {
            return None
        }
        match self.cache.uri_path(uri) {
            Some(path) => Some(path),
            None => {
                warn!("{}: illegal URI path", uri);
                None
            }
        }
    }

    /// Loads the file behind the given URI.
    ///
    /// Synchronizes the module first if necessary. Returns `None` if
    /// the module cannot be synchronized or the file is missing or
    /// unreadable.
    pub async fn load_file(&self, uri: &uri::Rsync) -> Option<Bytes> {
        let path = self.file_path(uri).await?;
        self.read_file(uri, &path)
    }

    fn read_file(&self, uri: &uri::Rsync, path: &Path) -> Option<Bytes> {
        match std::fs::read(path) {
            Ok(data) => Some(data.into()),
            Err(err) => {
                if err.kind() == io::ErrorKind::NotFound {
                    debug!("{}: not found in local copy", uri);
                }
                else {
                    warn!("Failed to read file {}: {}", path.display(), err);
                }
                None
            }
        }
    }
}


//------------ Tests ---------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::str::FromStr;
    use super::*;

    fn cache(dir: &Path) -> Cache {
        Cache::new(
            dir.into(), "true".into(), Vec::new(), 4
        ).unwrap()
    }

    #[test]
    fn uri_path_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path());
        let uri = uri::Rsync::from_str(
            "rsync://rpki.example.net/repo/ta/cert.cer"
        ).unwrap();
        assert_eq!(
            cache.uri_path(&uri).unwrap(),
            dir.path()
                .join("rpki.example.net").join("repo")
                .join("ta").join("cert.cer")
        );
    }

    #[test]
    fn reject_escaping_paths() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path());
        for uri in [
            "rsync://example.com/mod/../escape.cer",
            "rsync://example.com/mod/a/../../b",
            "rsync://example.com/mod/./x",
            "rsync://example.com/mod/a//b",
        ] {
            let uri = uri::Rsync::from_str(uri).unwrap();
            assert!(cache.uri_path(&uri).is_none(), "{}", uri);
        }
    }

    #[tokio::test]
    async fn module_synced_once_and_file_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path());
        let uri = uri::Rsync::from_str(
            "rsync://example.com/mod/file.cer"
        ).unwrap();

        // Place the file where a successful sync would have put it.
        let path = cache.uri_path(&uri).unwrap();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"content").unwrap();

        let run = cache.start();
        assert!(run.ensure_module(&uri).await);
        assert_eq!(
            run.load_file(&uri).await.unwrap().as_ref(), b"content"
        );
        assert!(
            run.load_file(
                &uri::Rsync::from_str(
                    "rsync://example.com/mod/missing.cer"
                ).unwrap()
            ).await.is_none()
        );
    }
}
