//! Remote-service client interface.
//!
//! The sync core never talks to a cloud API directly; it dispatches through
//! [`RemoteClient`], which a deployment backs with its provider SDK. The
//! implementation must be safe for concurrent use: one shared instance
//! serves every worker.
//!
//! Two implementations ship here: [`mirror::MirrorRemote`], which materializes
//! the remote namespace inside a local directory (useful for demos and for
//! exercising the daemon end-to-end without credentials), and
//! [`fake::FakeRemote`] with scriptable failures for tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// What to do with remote files when the local copy disappears.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeleteBehavior {
    Trash,
    Permanent,
}

impl Default for DeleteBehavior {
    fn default() -> Self {
        DeleteBehavior::Trash
    }
}

/// Identity of a remote object, memoized in the node-mapping table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteNode {
    pub node_uid: String,
    pub parent_node_uid: String,
}

#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("network error: {0}")]
    Network(String),

    #[error("{0}")]
    Api(String),

    #[error("{0}")]
    Io(#[from] std::io::Error),
}

/// Write-side operations the processor needs from the remote service.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Upload a file, streaming from disk. Overwrites an existing object at
    /// `remote_path`. Returns the stored node's identity.
    async fn upload_file(&self, local_path: &Path, remote_path: &str)
        -> Result<RemoteNode, RemoteError>;

    /// Create a folder (parents implied). Returns the folder's identity.
    async fn create_folder(&self, remote_path: &str) -> Result<RemoteNode, RemoteError>;

    /// Trash (or permanently delete) the object at `remote_path`.
    /// Returns whether anything existed there.
    async fn delete(&self, remote_path: &str, permanent: bool) -> Result<bool, RemoteError>;
}

pub mod mirror {
    //! Filesystem-backed remote: the remote namespace lives under a local
    //! target directory. Node UIDs are stable hashes of the remote path.

    use super::*;
    use sha2::{Digest, Sha256};
    use std::path::PathBuf;

    pub struct MirrorRemote {
        target: PathBuf,
    }

    impl MirrorRemote {
        pub fn new(target: PathBuf) -> Self {
            Self { target }
        }

        fn resolve(&self, remote_path: &str) -> PathBuf {
            self.target.join(remote_path.trim_start_matches('/'))
        }

        fn node_for(remote_path: &str) -> RemoteNode {
            let parent = match remote_path.rfind('/') {
                Some(0) | None => "/".to_string(),
                Some(idx) => remote_path[..idx].to_string(),
            };
            RemoteNode {
                node_uid: uid(remote_path),
                parent_node_uid: uid(&parent),
            }
        }
    }

    fn uid(remote_path: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(remote_path.as_bytes());
        let digest = hasher.finalize();
        digest[..8].iter().map(|b| format!("{:02x}", b)).collect()
    }

    #[async_trait]
    impl RemoteClient for MirrorRemote {
        async fn upload_file(
            &self,
            local_path: &Path,
            remote_path: &str,
        ) -> Result<RemoteNode, RemoteError> {
            let dest = self.resolve(remote_path);
            if let Some(parent) = dest.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::copy(local_path, &dest).await?;
            Ok(Self::node_for(remote_path))
        }

        async fn create_folder(&self, remote_path: &str) -> Result<RemoteNode, RemoteError> {
            tokio::fs::create_dir_all(self.resolve(remote_path)).await?;
            Ok(Self::node_for(remote_path))
        }

        async fn delete(&self, remote_path: &str, _permanent: bool) -> Result<bool, RemoteError> {
            let dest = self.resolve(remote_path);
            match tokio::fs::metadata(&dest).await {
                Err(_) => Ok(false),
                Ok(meta) if meta.is_dir() => {
                    tokio::fs::remove_dir_all(&dest).await?;
                    Ok(true)
                }
                Ok(_) => {
                    tokio::fs::remove_file(&dest).await?;
                    Ok(true)
                }
            }
        }
    }
}

pub mod fake {
    //! In-memory remote with scriptable failures, for tests.

    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum FakeCall {
        Upload(String),
        CreateFolder(String),
        Delete(String, bool),
    }

    /// Scriptable in-memory [`RemoteClient`].
    ///
    /// Failures are a FIFO script: each queued message fails the next
    /// operation, whatever it is. Successful creates get node UIDs `N1`,
    /// `N2`, ... with parents `P1`, `P2`, ...
    #[derive(Default)]
    pub struct FakeRemote {
        nodes: Mutex<HashMap<String, RemoteNode>>,
        failures: Mutex<VecDeque<String>>,
        calls: Mutex<Vec<FakeCall>>,
        counter: AtomicU64,
        delay: Mutex<std::time::Duration>,
    }

    impl FakeRemote {
        pub fn new() -> Self {
            Self::default()
        }

        /// Make every operation take at least `delay` (keeps workers
        /// observably in flight for concurrency tests).
        pub fn set_delay(&self, delay: std::time::Duration) {
            *self.delay.lock().unwrap() = delay;
        }

        async fn simulate_latency(&self) {
            let delay = *self.delay.lock().unwrap();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }

        /// Queue a failure for the next operation.
        pub fn push_failure(&self, message: &str) {
            self.failures.lock().unwrap().push_back(message.to_string());
        }

        /// Queue the same failure `n` times.
        pub fn push_failures(&self, message: &str, n: usize) {
            for _ in 0..n {
                self.push_failure(message);
            }
        }

        pub fn calls(&self) -> Vec<FakeCall> {
            self.calls.lock().unwrap().clone()
        }

        pub fn node(&self, remote_path: &str) -> Option<RemoteNode> {
            self.nodes.lock().unwrap().get(remote_path).cloned()
        }

        fn take_failure(&self) -> Option<String> {
            self.failures.lock().unwrap().pop_front()
        }

        fn next_node(&self) -> RemoteNode {
            let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
            RemoteNode {
                node_uid: format!("N{n}"),
                parent_node_uid: format!("P{n}"),
            }
        }
    }

    #[async_trait]
    impl RemoteClient for FakeRemote {
        async fn upload_file(
            &self,
            _local_path: &Path,
            remote_path: &str,
        ) -> Result<RemoteNode, RemoteError> {
            self.simulate_latency().await;
            self.calls
                .lock()
                .unwrap()
                .push(FakeCall::Upload(remote_path.to_string()));
            if let Some(message) = self.take_failure() {
                return Err(RemoteError::Api(message));
            }
            let node = self.next_node();
            self.nodes
                .lock()
                .unwrap()
                .insert(remote_path.to_string(), node.clone());
            Ok(node)
        }

        async fn create_folder(&self, remote_path: &str) -> Result<RemoteNode, RemoteError> {
            self.simulate_latency().await;
            self.calls
                .lock()
                .unwrap()
                .push(FakeCall::CreateFolder(remote_path.to_string()));
            if let Some(message) = self.take_failure() {
                return Err(RemoteError::Api(message));
            }
            let node = self.next_node();
            self.nodes
                .lock()
                .unwrap()
                .insert(remote_path.to_string(), node.clone());
            Ok(node)
        }

        async fn delete(&self, remote_path: &str, permanent: bool) -> Result<bool, RemoteError> {
            self.simulate_latency().await;
            self.calls
                .lock()
                .unwrap()
                .push(FakeCall::Delete(remote_path.to_string(), permanent));
            if let Some(message) = self.take_failure() {
                return Err(RemoteError::Api(message));
            }
            Ok(self.nodes.lock().unwrap().remove(remote_path).is_some())
        }
    }
}
