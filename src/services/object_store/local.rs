//! LocalObjectStore: image payloads on local disk.
//!
//! Objects are sharded beneath `base_path/{shard}/{shard}/{key}` with a
//! `.content-type` sidecar next to each payload. Read access goes through
//! signed links served by `GET /objects/{*key}`.

use super::{
    ObjectFuture, ObjectStore, ObjectStoreError, ObjectStoreResult, ensure_key_safe,
    signing::{SignatureError, UrlSigner},
};
use bytes::Bytes;
use chrono::Utc;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    time::Duration,
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

const CONTENT_TYPE_SUFFIX: &str = ".content-type";
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

pub struct LocalObjectStore {
    /// Base directory on disk where object payloads are stored.
    base_path: PathBuf,

    /// Origin the signed links point at, without a trailing slash.
    public_base_url: String,

    signer: UrlSigner,
}

impl LocalObjectStore {
    pub fn new(
        base_path: impl Into<PathBuf>,
        public_base_url: impl Into<String>,
        signing_secret: &[u8],
    ) -> Self {
        Self {
            base_path: base_path.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
            signer: UrlSigner::new(signing_secret),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Generate two-level shard identifiers for an object key.
    ///
    /// Uses MD5(key) and returns the first two bytes as lowercase
    /// hexadecimal strings (00–ff). Reduces file count per directory.
    fn object_shards(key: &str) -> (String, String) {
        let digest = md5::compute(key);
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    /// Construct a fully-qualified object payload path.
    fn object_path(&self, key: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::object_shards(key);
        let mut path = self.base_path.clone();
        path.push(shard_a);
        path.push(shard_b);
        path.push(key);
        path
    }

    fn sidecar_path(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_os_string();
        name.push(CONTENT_TYPE_SUFFIX);
        PathBuf::from(name)
    }

    /// Check a signed link's parameters against `key` as of now.
    pub fn verify_link(&self, key: &str, expires: i64, signature: &str) -> Result<(), SignatureError> {
        self.signer
            .verify(key, expires, signature, Utc::now().timestamp())
    }

    /// Build a signed link for `key` expiring at unix time `expires`.
    pub fn link(&self, key: &str, expires: i64) -> String {
        format!(
            "{}/objects/{}?expires={}&signature={}",
            self.public_base_url,
            key,
            expires,
            self.signer.sign(key, expires)
        )
    }

    /// Open an object for streaming, returning its content type and size.
    pub async fn open(&self, key: &str) -> ObjectStoreResult<(File, String, u64)> {
        ensure_key_safe(key)?;
        let path = self.object_path(key);
        let file = File::open(&path).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                ObjectStoreError::NotFound(key.to_string())
            } else {
                unavailable(err)
            }
        })?;
        let size = file.metadata().await.map_err(unavailable)?.len();
        let content_type = match fs::read_to_string(Self::sidecar_path(&path)).await {
            Ok(value) => value.trim().to_string(),
            Err(_) => DEFAULT_CONTENT_TYPE.to_string(),
        };
        Ok((file, content_type, size))
    }

    /// Write to a temp file, fsync, then rename into place so readers never
    /// see a partial payload.
    async fn write_object(&self, key: &str, data: &[u8], content_type: &str) -> io::Result<()> {
        let file_path = self.object_path(key);
        let parent = file_path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| io::Error::new(ErrorKind::Other, "object path missing parent directory"))?;
        fs::create_dir_all(&parent).await?;

        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let result = async {
            let mut file = File::create(&tmp_path).await?;
            file.write_all(data).await?;
            file.flush().await?;
            file.sync_all().await?;
            fs::write(Self::sidecar_path(&file_path), content_type.as_bytes()).await?;
            fs::rename(&tmp_path, &file_path).await
        }
        .await;

        if result.is_err() {
            let _ = fs::remove_file(&tmp_path).await;
            let _ = fs::remove_file(Self::sidecar_path(&file_path)).await;
        }
        result
    }

    async fn remove_object(&self, key: &str) -> io::Result<()> {
        let file_path = self.object_path(key);
        // sidecar first: a failure here leaves the payload, and the row, intact
        match fs::remove_file(Self::sidecar_path(&file_path)).await {
            Ok(_) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(err),
        }
        match fs::remove_file(&file_path).await {
            Ok(_) => debug!("removed physical file {}", file_path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("file {} already missing", file_path.display());
            }
            Err(err) => return Err(err),
        }

        if let Some(parent) = file_path.parent() {
            self.prune_empty_dirs(parent).await;
        }
        Ok(())
    }

    /// Remove empty directories from `start` up to the store root.
    async fn prune_empty_dirs(&self, start: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(&self.base_path) && current != self.base_path {
            match fs::remove_dir(&current).await {
                Ok(_) => {
                    if let Some(parent) = current.parent() {
                        current = parent.to_path_buf();
                    } else {
                        break;
                    }
                }
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

impl ObjectStore for LocalObjectStore {
    fn put(&self, key: &str, data: Bytes, content_type: &str) -> ObjectFuture<'_, ()> {
        let key = key.to_string();
        let content_type = content_type.to_string();
        Box::pin(async move {
            ensure_key_safe(&key)?;
            self.write_object(&key, &data, &content_type)
                .await
                .map_err(unavailable)?;
            debug!("stored {} ({} bytes) on local disk", key, data.len());
            Ok(())
        })
    }

    fn delete(&self, key: &str) -> ObjectFuture<'_, ()> {
        let key = key.to_string();
        Box::pin(async move {
            ensure_key_safe(&key)?;
            self.remove_object(&key).await.map_err(unavailable)
        })
    }

    fn signed_read_url(&self, key: &str, ttl: Duration) -> ObjectFuture<'_, String> {
        let key = key.to_string();
        Box::pin(async move {
            ensure_key_safe(&key)?;
            let expires = Utc::now().timestamp() + ttl.as_secs() as i64;
            Ok(self.link(&key, expires))
        })
    }

    fn exists(&self, key: &str) -> ObjectFuture<'_, bool> {
        let key = key.to_string();
        Box::pin(async move {
            ensure_key_safe(&key)?;
            fs::try_exists(self.object_path(&key))
                .await
                .map_err(unavailable)
        })
    }

    fn backend(&self) -> &'static str {
        "local"
    }
}

fn unavailable(err: io::Error) -> ObjectStoreError {
    ObjectStoreError::Unavailable(err.to_string())
}
