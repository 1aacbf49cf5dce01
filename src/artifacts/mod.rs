//! Artifact Store (C3, spec §4.4).
//!
//! Maps job id to an ordered artifact list. Artifacts live under a
//! per-job directory and are sidecar-recorded in an append-only
//! `manifest.jsonl`. Writes are serialised per job id; reads are lock-free
//! against the in-memory index (spec §5 "Shared resources").

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};

use crate::domain::job::{Artifact, ArtifactType};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ManifestLine {
    job_id: String,
    correlation_id: String,
    artifact: Artifact,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecentArtifactEntry {
    pub job_id: String,
    pub correlation_id: String,
    pub finished_at: DateTime<Utc>,
    pub artifacts: Vec<Artifact>,
}

pub struct ArtifactStore {
    root: PathBuf,
    index: RwLock<HashMap<String, Vec<Artifact>>>,
    write_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ArtifactStore {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            index: RwLock::new(HashMap::new()),
            write_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn job_dir(&self, job_id: &str) -> PathBuf {
        self.root.join(job_id)
    }

    async fn lock_for(&self, job_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.write_locks.lock().await;
        locks
            .entry(job_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Adds an artifact, idempotent on identical (type, path, size). The
    /// artifact only becomes visible to `get` after the manifest line is
    /// durably appended (spec §8 "Artifact atomicity").
    pub async fn add(
        &self,
        job_id: &str,
        correlation_id: &str,
        artifact: Artifact,
    ) -> anyhow::Result<()> {
        let per_job = self.lock_for(job_id).await;
        let _guard = per_job.lock().await;

        {
            let index = self.index.read().await;
            if let Some(existing) = index.get(job_id) {
                if existing.iter().any(|a| {
                    a.kind == artifact.kind && a.path == artifact.path && a.size_bytes == artifact.size_bytes
                }) {
                    return Ok(());
                }
            }
        }

        let dir = self.job_dir(job_id);
        tokio::fs::create_dir_all(&dir).await?;
        let manifest_path = dir.join("manifest.jsonl");
        let line = ManifestLine {
            job_id: job_id.to_string(),
            correlation_id: correlation_id.to_string(),
            artifact: artifact.clone(),
        };
        let serialized = serde_json::to_string(&line)?;
        append_line(&manifest_path, &serialized).await?;

        let mut index = self.index.write().await;
        index.entry(job_id.to_string()).or_default().push(artifact);
        Ok(())
    }

    pub async fn get(&self, job_id: &str) -> Vec<Artifact> {
        self.index
            .read()
            .await
            .get(job_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn reveal_directory(&self, job_id: &str) -> PathBuf {
        self.job_dir(job_id)
    }

    /// Best-effort: never fails, returns an empty list on any I/O error
    /// (spec §4.4).
    pub async fn recent_completed(&self, n: usize, index_path: &Path) -> Vec<RecentArtifactEntry> {
        match read_index_entries(index_path).await {
            Ok(mut entries) => {
                entries.sort_by(|a, b| b.finished_at.cmp(&a.finished_at));
                entries.truncate(n);
                entries
            }
            Err(_) => Vec::new(),
        }
    }

    pub async fn record_terminal_job(
        &self,
        index_path: &Path,
        job_id: &str,
        correlation_id: &str,
        finished_at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let artifacts = self.get(job_id).await;
        let entry = RecentArtifactEntry {
            job_id: job_id.to_string(),
            correlation_id: correlation_id.to_string(),
            finished_at,
            artifacts,
        };
        let serialized = serde_json::to_string(&entry)?;
        append_line(index_path, &serialized).await?;
        Ok(())
    }
}

async fn append_line(path: &Path, line: &str) -> anyhow::Result<()> {
    use tokio::io::AsyncWriteExt;
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(line.as_bytes()).await?;
    file.write_all(b"\n").await?;
    file.flush().await?;
    Ok(())
}

async fn read_index_entries(path: &Path) -> anyhow::Result<Vec<RecentArtifactEntry>> {
    let text = tokio::fs::read_to_string(path).await?;
    let mut entries = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        if let Ok(entry) = serde_json::from_str::<RecentArtifactEntry>(line) {
            entries.push(entry);
        }
    }
    Ok(entries)
}

pub fn new_artifact(kind: ArtifactType, path: PathBuf, size_bytes: u64) -> Artifact {
    Artifact {
        kind,
        path: path.to_string_lossy().to_string(),
        size_bytes,
        created_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn add_is_idempotent_on_identical_artifact() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().to_path_buf());
        let artifact = new_artifact(ArtifactType::Script, dir.path().join("script.txt"), 10);
        store.add("job-1", "corr-1", artifact.clone()).await.unwrap();
        store.add("job-1", "corr-1", artifact.clone()).await.unwrap();
        assert_eq!(store.get("job-1").await.len(), 1);
    }

    #[tokio::test]
    async fn recent_completed_is_best_effort_on_missing_index() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().to_path_buf());
        let missing = dir.path().join("does-not-exist.jsonl");
        let entries = store.recent_completed(10, &missing).await;
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn get_is_empty_before_add() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().to_path_buf());
        assert!(store.get("unknown-job").await.is_empty());
    }
}
