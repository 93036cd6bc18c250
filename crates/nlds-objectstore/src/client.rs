use std::sync::Arc;

use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use tokio::io::{AsyncRead, AsyncWriteExt};

use crate::error::Error;

/// Wraps an `object_store::ObjectStore` scoped to one tenancy, addressed
/// per spec §6 as `tenancy://bucket/object` where the bucket is the
/// transaction id. One client is built per transfer, from the
/// `access_key`/`secret_key` carried in the envelope — credentials are
/// never shared across tenancies or cached beyond a single stage's
/// lifetime.
pub struct ObjectStoreClient {
    store: Arc<dyn ObjectStore>,
}

impl ObjectStoreClient {
    /// `endpoint` is the tenancy's S3-compatible HTTPS endpoint;
    /// `require_secure` gates TLS certificate verification, per the
    /// `transfer_put_q`/`transfer_get_q` config group.
    pub fn connect(
        endpoint: &str,
        bucket: &str,
        access_key: &str,
        secret_key: &str,
        require_secure: bool,
    ) -> Result<Self, Error> {
        let store = AmazonS3Builder::new()
            .with_endpoint(endpoint)
            .with_bucket_name(bucket)
            .with_access_key_id(access_key)
            .with_secret_access_key(secret_key)
            .with_allow_http(!require_secure)
            .build()
            .map_err(|source| Error::Build {
                tenancy: bucket.to_string(),
                source,
            })?;

        Ok(Self {
            store: Arc::new(store),
        })
    }

    /// Streams `reader` into `object_name`, using a multipart upload so
    /// memory use doesn't scale with file size.
    pub async fn put_stream(
        &self,
        object_name: &str,
        mut reader: impl AsyncRead + Unpin,
    ) -> Result<(), Error> {
        let path = ObjectPath::from(object_name);
        let (_id, mut writer) = self.store.put_multipart(&path).await?;
        tokio::io::copy(&mut reader, &mut writer).await?;
        // Multipart uploads only complete once the writer is shut down;
        // dropping it without this aborts the upload.
        writer.shutdown().await?;
        Ok(())
    }

    /// Opens `object_name` for streaming read.
    pub async fn get_stream(
        &self,
        object_name: &str,
    ) -> Result<impl AsyncRead + Unpin, Error> {
        let path = ObjectPath::from(object_name);
        let result = self.store.get(&path).await?;
        let stream = result.into_stream();
        Ok(tokio_util::io::StreamReader::new(
            futures::StreamExt::map(stream, |chunk| {
                chunk.map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err))
            }),
        ))
    }

    pub async fn delete(&self, object_name: &str) -> Result<(), Error> {
        let path = ObjectPath::from(object_name);
        self.store.delete(&path).await?;
        Ok(())
    }

    pub async fn exists(&self, object_name: &str) -> Result<bool, Error> {
        let path = ObjectPath::from(object_name);
        match self.store.head(&path).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }
}
