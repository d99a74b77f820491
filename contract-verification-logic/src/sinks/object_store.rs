use super::{
    repository::{verification_files, RepositoryLayout},
    JobContext, SinkError, SinkIdentifier, SinkReceipt, WriteSink,
};
use crate::{to_checksum_address, types::VerificationResult};
use anyhow::Context;
use async_trait::async_trait;
use base64::{prelude::BASE64_STANDARD, Engine};
use minio::{
    s3,
    s3::{
        multimap::{Multimap, MultimapExt},
        types::S3Api,
    },
};
use serde::Deserialize;
use verification_common::MatchStatus;

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ObjectStorageSettings {
    pub endpoint: String,
    pub bucket: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    #[serde(default)]
    pub create_bucket: bool,
    #[serde(default)]
    pub validate_on_initialization: bool,
}

/// Thin S3 wrapper shared by the repository sink and the debug-input dump.
#[derive(Clone, Debug)]
pub struct ObjectStorage {
    // Use one bucket instance for all users
    client: s3::Client,
    bucket: String,
}

impl ObjectStorage {
    pub async fn new(settings: ObjectStorageSettings) -> anyhow::Result<Self> {
        let credentials = s3::creds::StaticProvider::new(
            &settings.access_key_id,
            &settings.secret_access_key,
            None,
        );
        let client = s3::Client::new(
            settings
                .endpoint
                .parse()
                .context("parsing endpoint into url failed")?,
            Some(Box::new(credentials)),
            None,
            None,
        )
        .context("s3 client initialization failed")?;

        if settings.create_bucket {
            Self::create_bucket_if_not_exists(&client, &settings.bucket)
                .await
                .context("bucket initialization failed")?;
        }

        if settings.validate_on_initialization {
            let bucket_exists_response = client
                .bucket_exists(&settings.bucket)
                .send()
                .await
                .context("bucket validation failed")?;
            if !bucket_exists_response.exists {
                anyhow::bail!("bucket ({}) is not available", settings.bucket);
            }
        }

        Ok(ObjectStorage {
            client,
            bucket: settings.bucket,
        })
    }

    pub async fn insert(&self, key: &str, content: Vec<u8>) -> Result<(), anyhow::Error> {
        let content_md5 = md5::compute(&content);

        let mut segmented = s3::segmented_bytes::SegmentedBytes::new();
        segmented.append(content.into());

        let mut extra_headers = Multimap::new();
        extra_headers.add("Content-MD5", BASE64_STANDARD.encode(content_md5.0));

        let response = self
            .client
            .put_object(&self.bucket, key, segmented)
            .extra_headers(Some(extra_headers))
            .send()
            .await
            .context(format!("put object {key} into s3 storage failed"))?;

        // The integrity should already be validated by the storage as we
        // provided the 'Content-MD5' header; re-checked in case the header
        // is not supported by the given backend.
        if response.etag != hex::encode(content_md5.0) {
            anyhow::bail!("({key}) object MD5 checksum does not match returned ETag value")
        }

        Ok(())
    }

    pub async fn remove_prefix(&self, prefix: &str) -> Result<(), anyhow::Error> {
        let listing = self
            .client
            .list_objects(&self.bucket)
            .prefix(Some(prefix.to_string()))
            .send()
            .await
            .context(format!("list objects under {prefix} failed"))?;

        for object in listing.contents {
            self.client
                .delete_object(&self.bucket, &object.name)
                .send()
                .await
                .context(format!("delete object {} failed", object.name))?;
        }

        Ok(())
    }

    async fn create_bucket_if_not_exists(
        s3_client: &s3::Client,
        bucket_name: &str,
    ) -> Result<(), anyhow::Error> {
        let result = s3_client.create_bucket(bucket_name).send().await;
        match result {
            Ok(_) => Ok(()),
            Err(s3::error::Error::S3Error(error))
                if error.code == s3::error::ErrorCode::BucketAlreadyOwnedByYou =>
            {
                Ok(())
            }
            Err(error) => Err(error.into()),
        }
    }
}

/// Uploads the raw request of a failed verification so operators can replay
/// it. Keys are `failed-verification-inputs/{verification_id}.json`.
pub async fn dump_failed_verification_input(
    storage: &ObjectStorage,
    verification_id: sea_orm::prelude::Uuid,
    raw_input: &serde_json::Value,
) {
    let key = format!("failed-verification-inputs/{verification_id}.json");
    let content = match serde_json::to_vec(raw_input) {
        Ok(content) => content,
        Err(error) => {
            tracing::warn!(error = %error, "failed to serialize debug verification input");
            return;
        }
    };
    if let Err(error) = storage.insert(&key, content).await {
        tracing::warn!(error = %error, key, "failed to upload debug verification input");
    }
}

/// Repository layout written into an S3 bucket instead of the local
/// filesystem.
#[derive(Clone)]
pub struct S3RepositorySink {
    storage: ObjectStorage,
}

impl S3RepositorySink {
    pub fn new(storage: ObjectStorage) -> Self {
        Self { storage }
    }

    fn contract_prefix(match_dir: &str, result: &VerificationResult) -> String {
        format!(
            "contracts/{}/{}/{}",
            match_dir,
            result.deployment.chain_id,
            to_checksum_address(&result.deployment.address)
        )
    }
}

#[async_trait]
impl WriteSink for S3RepositorySink {
    fn identifier(&self) -> SinkIdentifier {
        SinkIdentifier::S3Repository
    }

    async fn init(&self) -> Result<(), anyhow::Error> {
        Ok(())
    }

    async fn store_verification(
        &self,
        result: &VerificationResult,
        _job: Option<&JobContext>,
    ) -> Result<SinkReceipt, SinkError> {
        let (runtime, creation) = result.status_pair();
        let is_full = runtime == Some(MatchStatus::Perfect) || creation == Some(MatchStatus::Perfect);
        let match_dir = if is_full { "full_match" } else { "partial_match" };

        let prefix = Self::contract_prefix(match_dir, result);
        for (relative_path, content) in verification_files(result, RepositoryLayout::V2) {
            self.storage
                .insert(&format!("{prefix}/{relative_path}"), content)
                .await
                .map_err(SinkError::Internal)?;
        }

        if is_full {
            let partial_prefix = Self::contract_prefix("partial_match", result);
            self.storage
                .remove_prefix(&partial_prefix)
                .await
                .map_err(SinkError::Internal)?;
        }

        Ok(SinkReceipt::default())
    }
}
