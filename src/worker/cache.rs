//! Named response caches on disk.
//!
//! Layout: `<root>/<cache name>/<sha256(path)>.entry`. An entry file is one
//! line of JSON metadata followed by the raw body. Each put writes the whole
//! entry through a temp file + rename, so readers see one complete response
//! and concurrent writers of one path leave the last complete write.

use super::fetch::AssetResponse;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Metadata line at the head of each entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EntryMeta {
    path: String,
    status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content_type: Option<String>,
    stored_at: DateTime<Utc>,
}

/// All named caches under one root directory.
#[derive(Debug, Clone)]
pub struct CacheStorage {
    root: PathBuf,
}

impl CacheStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Open (creating if needed) the cache called `name`.
    pub async fn open(&self, name: &str) -> std::io::Result<Cache> {
        let dir = self.root.join(name);
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Cache {
            name: name.to_owned(),
            dir,
        })
    }

    /// Names of every cache present.
    pub async fn keys(&self) -> std::io::Result<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(e),
        };
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Delete the cache called `name`. Returns whether it existed.
    pub async fn delete(&self, name: &str) -> std::io::Result<bool> {
        match tokio::fs::remove_dir_all(self.root.join(name)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// One named cache.
#[derive(Debug, Clone)]
pub struct Cache {
    name: String,
    dir: PathBuf,
}

impl Cache {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up the cached response for `path`.
    pub async fn match_path(&self, path: &str) -> std::io::Result<Option<AssetResponse>> {
        let raw = match tokio::fs::read(self.entry_path(path)).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        let (meta, body) = decode_entry(raw)?;
        Ok(Some(AssetResponse {
            status: meta.status,
            content_type: meta.content_type,
            body,
        }))
    }

    /// Store `response` for `path`, replacing any previous entry.
    pub async fn put(&self, path: &str, response: &AssetResponse) -> std::io::Result<()> {
        let meta = EntryMeta {
            path: path.to_owned(),
            status: response.status,
            content_type: response.content_type.clone(),
            stored_at: Utc::now(),
        };
        let mut entry = serde_json::to_vec(&meta).map_err(std::io::Error::other)?;
        entry.push(b'\n');
        entry.extend_from_slice(&response.body);

        let target = self.entry_path(path);
        let tmp = self
            .dir
            .join(format!("{}.{}.tmp", entry_key(path), uuid::Uuid::new_v4()));
        tokio::fs::write(&tmp, &entry).await?;
        tokio::fs::rename(&tmp, target).await
    }

    /// Whether every path in `paths` has an entry.
    pub async fn contains_all(&self, paths: &[String]) -> bool {
        for path in paths {
            if !matches!(self.match_path(path).await, Ok(Some(_))) {
                return false;
            }
        }
        true
    }

    /// Copy the cached body for `path` to a plain file named after the
    /// path's last segment, for consumers that need a real file.
    pub async fn materialize(&self, path: &str) -> std::io::Result<Option<PathBuf>> {
        let Some(response) = self.match_path(path).await? else {
            return Ok(None);
        };
        let file_name = path
            .rsplit('/')
            .find(|s| !s.is_empty())
            .unwrap_or("index");
        let files = self.dir.join("files");
        tokio::fs::create_dir_all(&files).await?;
        let target = files.join(file_name);
        tokio::fs::write(&target, &response.body).await?;
        Ok(Some(target))
    }

    fn entry_path(&self, path: &str) -> PathBuf {
        self.dir.join(format!("{}.entry", entry_key(path)))
    }
}

fn entry_key(path: &str) -> String {
    hex::encode(Sha256::digest(path.as_bytes()))
}

/// Split an entry file into its metadata line and body.
fn decode_entry(mut raw: Vec<u8>) -> std::io::Result<(EntryMeta, Vec<u8>)> {
    let Some(split) = raw.iter().position(|b| *b == b'\n') else {
        return Err(std::io::Error::new(
            ErrorKind::InvalidData,
            "cache entry has no metadata line",
        ));
    };
    let meta: EntryMeta = serde_json::from_slice(&raw[..split]).map_err(std::io::Error::other)?;
    let body = raw.split_off(split + 1);
    Ok((meta, body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_and_match() {
        let dir = tempfile::tempdir().unwrap();
        let caches = CacheStorage::new(dir.path());
        let cache = caches.open("v1").await.unwrap();

        assert!(cache.match_path("/styles.css").await.unwrap().is_none());
        let resp = AssetResponse::ok("text/css", b"body{}".to_vec());
        cache.put("/styles.css", &resp).await.unwrap();
        assert_eq!(cache.match_path("/styles.css").await.unwrap(), Some(resp));
    }

    #[tokio::test]
    async fn test_put_replaces_entry() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStorage::new(dir.path()).open("v1").await.unwrap();
        cache
            .put("/", &AssetResponse::ok("text/html", b"old".to_vec()))
            .await
            .unwrap();
        cache
            .put("/", &AssetResponse::ok("text/html", b"new".to_vec()))
            .await
            .unwrap();
        let hit = cache.match_path("/").await.unwrap().unwrap();
        assert_eq!(hit.body, b"new");
    }

    #[tokio::test]
    async fn test_keys_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let caches = CacheStorage::new(dir.path());
        assert!(caches.keys().await.unwrap().is_empty());

        caches.open("old-v0").await.unwrap();
        caches.open("v1").await.unwrap();
        assert_eq!(caches.keys().await.unwrap(), vec!["old-v0", "v1"]);

        assert!(caches.delete("old-v0").await.unwrap());
        assert!(!caches.delete("old-v0").await.unwrap());
        assert_eq!(caches.keys().await.unwrap(), vec!["v1"]);
    }

    #[tokio::test]
    async fn test_contains_all() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStorage::new(dir.path()).open("v1").await.unwrap();
        let paths = vec!["/".to_string(), "/script.js".to_string()];
        assert!(!cache.contains_all(&paths).await);
        for p in &paths {
            cache
                .put(p, &AssetResponse::ok("text/plain", b"x".to_vec()))
                .await
                .unwrap();
        }
        assert!(cache.contains_all(&paths).await);
    }

    #[tokio::test]
    async fn test_materialize_writes_named_file() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStorage::new(dir.path()).open("v1").await.unwrap();
        assert!(cache.materialize("/icons/water.svg").await.unwrap().is_none());

        cache
            .put("/icons/water.svg", &AssetResponse::ok("image/svg+xml", b"<svg/>".to_vec()))
            .await
            .unwrap();
        let file = cache.materialize("/icons/water.svg").await.unwrap().unwrap();
        assert!(file.ends_with("files/water.svg"), "got: {}", file.display());
        assert_eq!(std::fs::read(file).unwrap(), b"<svg/>");
    }

    #[tokio::test]
    async fn test_entry_is_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStorage::new(dir.path()).open("v1").await.unwrap();
        cache
            .put("/", &AssetResponse::ok("text/html", b"a\nb".to_vec()))
            .await
            .unwrap();

        let files: Vec<_> = std::fs::read_dir(dir.path().join("v1"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(files, vec![format!("{}.entry", entry_key("/"))]);

        let hit = cache.match_path("/").await.unwrap().unwrap();
        assert_eq!(hit.body, b"a\nb");
        assert_eq!(hit.content_type.as_deref(), Some("text/html"));
    }

    #[tokio::test]
    async fn test_concurrent_puts_keep_matching_pairs() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStorage::new(dir.path()).open("v1").await.unwrap();
        let html = AssetResponse::ok("text/html", b"<p>".to_vec());
        let css = AssetResponse::ok("text/css", b"p{}".to_vec());

        let mut writers = Vec::new();
        for i in 0..20 {
            let cache = cache.clone();
            let response = if i % 2 == 0 { html.clone() } else { css.clone() };
            writers.push(tokio::spawn(async move { cache.put("/x", &response).await }));
        }
        for w in writers {
            w.await.unwrap().unwrap();
        }

        let hit = cache.match_path("/x").await.unwrap().unwrap();
        assert!(hit == html || hit == css, "mixed entry: {hit:?}");
    }

    #[test]
    fn test_entry_without_metadata_line_is_invalid() {
        let err = decode_entry(b"no newline".to_vec()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
    }

    #[test]
    fn test_entry_key_is_stable_hex() {
        let k = entry_key("/index.html");
        assert_eq!(k.len(), 64);
        assert_eq!(k, entry_key("/index.html"));
        assert_ne!(k, entry_key("/"));
    }
}
