//! S3ObjectStore: image payloads in an AWS S3 (or compatible) bucket.
//!
//! Objects are written with a private ACL; reads go through presigned GET
//! URLs. Credentials are resolved via the standard AWS credential chain.

use super::{ObjectFuture, ObjectStore, ObjectStoreError, ensure_key_safe};
use aws_sdk_s3::{
    Client,
    presigning::PresigningConfig,
    primitives::ByteStream,
    types::ObjectCannedAcl,
};
use bytes::Bytes;
use std::time::Duration;
use tracing::{debug, info};

pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl S3ObjectStore {
    /// Build a client for `bucket` in `region`, optionally against a custom
    /// endpoint (path-style addressing is used when one is given).
    pub async fn new(bucket: String, region: String, endpoint_url: Option<String>) -> Self {
        let mut config_loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(region));
        if let Some(ref endpoint) = endpoint_url {
            config_loader = config_loader.endpoint_url(endpoint);
        }
        let sdk_config = config_loader.load().await;

        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(endpoint_url.is_some())
            .build();

        info!("S3 object store initialized: bucket={}", bucket);

        Self {
            client: Client::from_conf(s3_config),
            bucket,
        }
    }

    fn sdk_error(operation: &str, err: impl std::fmt::Display) -> ObjectStoreError {
        ObjectStoreError::Unavailable(format!("S3 {operation}: {err}"))
    }
}

impl ObjectStore for S3ObjectStore {
    fn put(&self, key: &str, data: Bytes, content_type: &str) -> ObjectFuture<'_, ()> {
        let key = key.to_string();
        let content_type = content_type.to_string();
        Box::pin(async move {
            ensure_key_safe(&key)?;
            debug!("S3 put_object: bucket={} key={}", self.bucket, key);
            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(&key)
                .body(ByteStream::from(data))
                .content_type(content_type)
                .acl(ObjectCannedAcl::Private)
                .send()
                .await
                .map_err(|e| Self::sdk_error("put_object", e))?;
            Ok(())
        })
    }

    fn delete(&self, key: &str) -> ObjectFuture<'_, ()> {
        let key = key.to_string();
        Box::pin(async move {
            ensure_key_safe(&key)?;
            debug!("S3 delete_object: bucket={} key={}", self.bucket, key);
            // delete_object succeeds for missing keys.
            self.client
                .delete_object()
                .bucket(&self.bucket)
                .key(&key)
                .send()
                .await
                .map_err(|e| Self::sdk_error("delete_object", e))?;
            Ok(())
        })
    }

    fn signed_read_url(&self, key: &str, ttl: Duration) -> ObjectFuture<'_, String> {
        let key = key.to_string();
        Box::pin(async move {
            ensure_key_safe(&key)?;
            let presigning =
                PresigningConfig::expires_in(ttl).map_err(|e| Self::sdk_error("presign", e))?;
            let request = self
                .client
                .get_object()
                .bucket(&self.bucket)
                .key(&key)
                .presigned(presigning)
                .await
                .map_err(|e| Self::sdk_error("presign get_object", e))?;
            Ok(request.uri().to_string())
        })
    }

    fn exists(&self, key: &str) -> ObjectFuture<'_, bool> {
        let key = key.to_string();
        Box::pin(async move {
            ensure_key_safe(&key)?;
            match self
                .client
                .head_object()
                .bucket(&self.bucket)
                .key(&key)
                .send()
                .await
            {
                Ok(_) => Ok(true),
                Err(err) => {
                    let service_err = err.into_service_error();
                    if service_err.is_not_found() {
                        Ok(false)
                    } else {
                        Err(Self::sdk_error("head_object", service_err))
                    }
                }
            }
        })
    }

    fn backend(&self) -> &'static str {
        "s3"
    }
}
