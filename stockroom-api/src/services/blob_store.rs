//! Blob storage for rendered labels
//!
//! Blobs are addressed by slash-separated keys. Public keys (labels) are
//! served as-is; anything else needs a short-lived HMAC-signed URL.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use stockroom_common::{Error, Result};
use tracing::debug;

use crate::models::SignedUrl;

type HmacSha256 = Hmac<Sha256>;

/// Key prefix served without a signature
pub const PUBLIC_PREFIX: &str = "labels/";

/// Stored blob with its media type
#[derive(Debug, Clone, PartialEq)]
pub struct Blob {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// Injectable blob storage
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` under `key`, replacing any previous blob; returns its URL
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<String>;

    async fn get(&self, key: &str) -> Result<Option<Blob>>;

    /// Stable, unsigned URL for `key`
    fn url_for(&self, key: &str) -> String;

    /// Key addressed by a URL this store produced
    fn key_from_url(&self, url: &str) -> Option<String>;

    /// URL for `key` that stays valid until `expires_at`
    fn signed_url(&self, key: &str, expires_at: DateTime<Utc>) -> SignedUrl;

    /// Whether `signature` authorizes `key` at `now`
    fn verify(&self, key: &str, expires: i64, signature: &str, now: DateTime<Utc>) -> bool;
}

/// Reject keys that could escape the storage root
pub fn validate_key(key: &str) -> Result<()> {
    let invalid = key.contains('\\')
        || key.contains('\0')
        || key
            .split('/')
            .any(|segment| segment.is_empty() || segment == "." || segment == "..");
    if invalid {
        return Err(Error::InvalidInput(format!("invalid blob key {:?}", key)));
    }
    Ok(())
}

/// Media type from the key's extension
pub fn content_type_for(key: &str) -> &'static str {
    match key.rsplit('.').next() {
        Some("pdf") => "application/pdf",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        _ => "application/octet-stream",
    }
}

// ========================================
// URL Signing
// ========================================

/// HMAC-SHA256 signer for blob URLs
#[derive(Clone)]
pub struct UrlSigner {
    key: Vec<u8>,
}

impl UrlSigner {
    pub fn new(key: impl AsRef<[u8]>) -> Self {
        Self {
            key: key.as_ref().to_vec(),
        }
    }

    fn mac(&self, key: &str, expires: i64) -> HmacSha256 {
        // HMAC accepts keys of any length
        let mut mac = HmacSha256::new_from_slice(&self.key).expect("HMAC can take key of any size");
        mac.update(key.as_bytes());
        mac.update(b"\n");
        mac.update(expires.to_string().as_bytes());
        mac
    }

    pub fn sign(&self, key: &str, expires: i64) -> String {
        hex::encode(self.mac(key, expires).finalize().into_bytes())
    }

    pub fn verify(&self, key: &str, expires: i64, signature: &str, now: DateTime<Utc>) -> bool {
        if expires <= now.timestamp() {
            return false;
        }
        let Ok(raw) = hex::decode(signature) else {
            return false;
        };
        self.mac(key, expires).verify_slice(&raw).is_ok()
    }

    fn signed_url(&self, base: &str, key: &str, expires_at: DateTime<Utc>) -> SignedUrl {
        let expires = expires_at.timestamp();
        SignedUrl {
            url: format!("{}?expires={}&signature={}", base, expires, self.sign(key, expires)),
            expires_at,
        }
    }
}

fn join_url(public_url: &str, key: &str) -> String {
    format!("{}/{}", public_url.trim_end_matches('/'), key)
}

fn strip_url(public_url: &str, url: &str) -> Option<String> {
    let prefix = format!("{}/", public_url.trim_end_matches('/'));
    let rest = url.strip_prefix(&prefix)?;
    let key = rest.split('?').next().unwrap_or(rest);
    validate_key(key).ok().map(|_| key.to_string())
}

// ========================================
// Filesystem Store
// ========================================

/// Blob store on the local filesystem, served back by the API
pub struct FsBlobStore {
    root: PathBuf,
    public_url: String,
    signer: UrlSigner,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>, public_url: impl Into<String>, signing_key: &str) -> Self {
        Self {
            root: root.into(),
            public_url: public_url.into(),
            signer: UrlSigner::new(signing_key),
        }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<String> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::UpstreamUnavailable(format!("blob store: {}", e)))?;
        }

        // Write then rename so readers never see a partial blob
        let staging = path.with_extension("partial");
        tokio::fs::write(&staging, &bytes)
            .await
            .map_err(|e| Error::UpstreamUnavailable(format!("blob store: {}", e)))?;
        tokio::fs::rename(&staging, &path)
            .await
            .map_err(|e| Error::UpstreamUnavailable(format!("blob store: {}", e)))?;

        debug!(key, bytes = bytes.len(), content_type, "Blob stored");
        Ok(self.url_for(key))
    }

    async fn get(&self, key: &str) -> Result<Option<Blob>> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(Blob {
                bytes,
                content_type: content_type_for(key).to_string(),
            })),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::UpstreamUnavailable(format!("blob store: {}", e))),
        }
    }

    fn url_for(&self, key: &str) -> String {
        join_url(&self.public_url, key)
    }

    fn key_from_url(&self, url: &str) -> Option<String> {
        strip_url(&self.public_url, url)
    }

    fn signed_url(&self, key: &str, expires_at: DateTime<Utc>) -> SignedUrl {
        self.signer.signed_url(&self.url_for(key), key, expires_at)
    }

    fn verify(&self, key: &str, expires: i64, signature: &str, now: DateTime<Utc>) -> bool {
        self.signer.verify(key, expires, signature, now)
    }
}

// ========================================
// In-Memory Store
// ========================================

/// Blob store kept in memory; used by tests and dry runs
pub struct MemoryBlobStore {
    public_url: String,
    signer: UrlSigner,
    blobs: Mutex<HashMap<String, Blob>>,
}

impl MemoryBlobStore {
    pub fn new(public_url: impl Into<String>) -> Self {
        Self {
            public_url: public_url.into(),
            signer: UrlSigner::new(b"memory-blob-store"),
            blobs: Mutex::new(HashMap::new()),
        }
    }

    /// Keys currently stored, sorted
    pub fn keys(&self) -> Vec<String> {
        let blobs = self.blobs.lock().unwrap_or_else(|p| p.into_inner());
        let mut keys: Vec<String> = blobs.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<String> {
        validate_key(key)?;
        let mut blobs = self.blobs.lock().unwrap_or_else(|p| p.into_inner());
        blobs.insert(
            key.to_string(),
            Blob {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(self.url_for(key))
    }

    async fn get(&self, key: &str) -> Result<Option<Blob>> {
        validate_key(key)?;
        let blobs = self.blobs.lock().unwrap_or_else(|p| p.into_inner());
        Ok(blobs.get(key).cloned())
    }

    fn url_for(&self, key: &str) -> String {
        join_url(&self.public_url, key)
    }

    fn key_from_url(&self, url: &str) -> Option<String> {
        strip_url(&self.public_url, url)
    }

    fn signed_url(&self, key: &str, expires_at: DateTime<Utc>) -> SignedUrl {
        self.signer.signed_url(&self.url_for(key), key, expires_at)
    }

    fn verify(&self, key: &str, expires: i64, signature: &str, now: DateTime<Utc>) -> bool {
        self.signer.verify(key, expires, signature, now)
    }
}

/// Default lifetime of a signed preview link
pub fn preview_ttl() -> Duration {
    Duration::minutes(15)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_key() {
        assert!(validate_key("labels/org_a/x.pdf").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("/etc/passwd").is_err());
        assert!(validate_key("labels/../secret").is_err());
        assert!(validate_key("labels/./x").is_err());
        assert!(validate_key("labels\\x").is_err());
        assert!(validate_key("labels//x").is_err());
        assert!(validate_key("labels/x/").is_err());
        assert!(validate_key("labels/.").is_err());
        assert!(validate_key("labels/.hidden.png").is_ok());
    }

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for("a/b.pdf"), "application/pdf");
        assert_eq!(content_type_for("a/b.png"), "image/png");
        assert_eq!(content_type_for("a/b"), "application/octet-stream");
    }

    #[test]
    fn test_signature_roundtrip_and_expiry() {
        let signer = UrlSigner::new("k");
        let now = Utc::now();
        let expires = (now + Duration::minutes(5)).timestamp();
        let sig = signer.sign("labels/a.png", expires);

        assert!(signer.verify("labels/a.png", expires, &sig, now));
        assert!(!signer.verify("labels/b.png", expires, &sig, now));
        assert!(!signer.verify("labels/a.png", expires + 1, &sig, now));
        assert!(!signer.verify("labels/a.png", expires, &sig, now + Duration::minutes(6)));
        assert!(!signer.verify("labels/a.png", expires, "zz", now));
    }

    #[test]
    fn test_url_key_roundtrip() {
        let store = MemoryBlobStore::new("http://localhost:8080/blobs/");
        let url = store.url_for("labels/org_a/p.png");
        assert_eq!(url, "http://localhost:8080/blobs/labels/org_a/p.png");
        assert_eq!(store.key_from_url(&url).as_deref(), Some("labels/org_a/p.png"));
        assert_eq!(
            store.key_from_url(&format!("{}?expires=1&signature=ab", url)).as_deref(),
            Some("labels/org_a/p.png")
        );
        assert!(store.key_from_url("https://elsewhere/labels/p.png").is_none());
    }

    #[tokio::test]
    async fn test_fs_store_put_get() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path(), "http://localhost/blobs", "secret");

        let url = store
            .put("labels/org_a/p.pdf", b"%PDF-1.4".to_vec(), "application/pdf")
            .await
            .unwrap();
        assert_eq!(url, "http://localhost/blobs/labels/org_a/p.pdf");

        let blob = store.get("labels/org_a/p.pdf").await.unwrap().unwrap();
        assert_eq!(blob.bytes, b"%PDF-1.4");
        assert_eq!(blob.content_type, "application/pdf");
        assert!(store.get("labels/org_a/missing.pdf").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fs_store_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path(), "http://localhost/blobs", "secret");
        store.put("labels/x.png", vec![1], "image/png").await.unwrap();
        store.put("labels/x.png", vec![2, 3], "image/png").await.unwrap();
        assert_eq!(store.get("labels/x.png").await.unwrap().unwrap().bytes, vec![2, 3]);
    }
}
