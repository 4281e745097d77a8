//! S3 backend for state storage

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{
    BucketLocationConstraint, BucketVersioningStatus, CreateBucketConfiguration,
    PublicAccessBlockConfiguration, ServerSideEncryption, VersioningConfiguration,
};
use log::{info, warn};

use crate::backend::{
    BackendConfig, BackendError, BackendResult, StateBackend, check_lineage,
};
use crate::lock::{LockInfo, LockOperation};
use crate::state::StateFile;

/// S3-based state backend
pub struct S3Backend {
    client: Client,
    bucket: String,
    /// Object key for the state file
    key: String,
    region: String,
    /// Whether to request SSE-S3 encryption on writes (default: true)
    encrypt: bool,
    /// Whether `init` may create a missing bucket (default: true)
    auto_create: bool,
}

impl S3Backend {
    pub async fn from_config(config: &BackendConfig) -> BackendResult<Self> {
        let bucket = config
            .get_string("bucket")
            .ok_or_else(|| BackendError::configuration("Missing required attribute: bucket"))?
            .to_string();

        let key = config
            .get_string("key")
            .ok_or_else(|| BackendError::configuration("Missing required attribute: key"))?
            .to_string();

        let region = config
            .get_string("region")
            .map(convert_region_value)
            .ok_or_else(|| BackendError::configuration("Missing required attribute: region"))?;

        let aws_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new(region.clone()))
            .load()
            .await;

        Ok(Self {
            client: Client::new(&aws_config),
            bucket,
            key,
            region,
            encrypt: config.get_bool_or("encrypt", true),
            auto_create: config.get_bool_or("auto_create", true),
        })
    }

    fn lock_key(&self) -> String {
        lock_key_for(&self.key)
    }

    async fn get_object(&self, key: &str) -> BackendResult<Option<Vec<u8>>> {
        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        match result {
            Ok(output) => {
                let body = output
                    .body
                    .collect()
                    .await
                    .map_err(|e| BackendError::Aws(e.to_string()))?;
                Ok(Some(body.into_bytes().to_vec()))
            }
            Err(err) if has_status(&err, 404) => Ok(None),
            Err(err) => Err(BackendError::Aws(err.to_string())),
        }
    }

    async fn read_lock(&self) -> BackendResult<Option<LockInfo>> {
        match self.get_object(&self.lock_key()).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Conditionally create the lock object; `false` when one already exists
    async fn create_lock(&self, lock: &LockInfo) -> BackendResult<bool> {
        let body = serde_json::to_vec_pretty(lock)?;

        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(self.lock_key())
            .if_none_match("*")
            .body(ByteStream::from(body))
            .content_type("application/json");

        if self.encrypt {
            request = request.server_side_encryption(ServerSideEncryption::Aes256);
        }

        match request.send().await {
            Ok(_) => Ok(true),
            Err(err) if has_status(&err, 412) || has_status(&err, 409) => Ok(false),
            Err(err) => Err(BackendError::Aws(err.to_string())),
        }
    }

    async fn delete_lock(&self) -> BackendResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(self.lock_key())
            .send()
            .await
            .map_err(|e| BackendError::Aws(e.to_string()))?;

        Ok(())
    }

    async fn remove_lock(&self, lock_id: &str) -> BackendResult<()> {
        match self.read_lock().await? {
            Some(existing) if existing.id == lock_id => self.delete_lock().await,
            Some(existing) => Err(BackendError::LockMismatch {
                expected: lock_id.to_string(),
                actual: existing.id,
            }),
            None => Err(BackendError::LockNotFound(lock_id.to_string())),
        }
    }

    async fn bucket_exists(&self) -> BackendResult<bool> {
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => Ok(true),
            Err(err) if has_status(&err, 404) => Ok(false),
            Err(err) => Err(BackendError::Aws(err.to_string())),
        }
    }

    /// Create the bucket with versioning on and public access blocked
    async fn create_bucket(&self) -> BackendResult<()> {
        let mut create_request = self.client.create_bucket().bucket(&self.bucket);

        // us-east-1 rejects an explicit location constraint
        if self.region != "us-east-1" {
            let config = CreateBucketConfiguration::builder()
                .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                .build();
            create_request = create_request.create_bucket_configuration(config);
        }

        create_request
            .send()
            .await
            .map_err(|e| BackendError::BucketCreationFailed(e.to_string()))?;

        let versioning_config = VersioningConfiguration::builder()
            .status(BucketVersioningStatus::Enabled)
            .build();

        self.client
            .put_bucket_versioning()
            .bucket(&self.bucket)
            .versioning_configuration(versioning_config)
            .send()
            .await
            .map_err(|e| BackendError::Aws(format!("Failed to enable versioning: {}", e)))?;

        let public_access_block = PublicAccessBlockConfiguration::builder()
            .block_public_acls(true)
            .block_public_policy(true)
            .ignore_public_acls(true)
            .restrict_public_buckets(true)
            .build();

        self.client
            .put_public_access_block()
            .bucket(&self.bucket)
            .public_access_block_configuration(public_access_block)
            .send()
            .await
            .map_err(|e| BackendError::Aws(format!("Failed to block public access: {}", e)))?;

        info!("Created state bucket {} in {}", self.bucket, self.region);
        Ok(())
    }
}

#[async_trait]
impl StateBackend for S3Backend {
    async fn read_state(&self) -> BackendResult<Option<StateFile>> {
        match self.get_object(&self.key).await? {
            Some(bytes) => {
                let state = serde_json::from_slice(&bytes)
                    .map_err(|e| BackendError::InvalidState(e.to_string()))?;
                Ok(Some(state))
            }
            None => Ok(None),
        }
    }

    async fn write_state(&self, state: &StateFile) -> BackendResult<()> {
        let existing = self.read_state().await?;
        check_lineage(existing.as_ref(), state)?;

        let body = serde_json::to_vec_pretty(state)?;

        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(&self.key)
            .body(ByteStream::from(body))
            .content_type("application/json");

        if self.encrypt {
            request = request.server_side_encryption(ServerSideEncryption::Aes256);
        }

        request
            .send()
            .await
            .map_err(|e| BackendError::Aws(e.to_string()))?;

        Ok(())
    }

    async fn acquire_lock(&self, operation: LockOperation) -> BackendResult<LockInfo> {
        let lock = LockInfo::new(operation);
        if self.create_lock(&lock).await? {
            return Ok(lock);
        }

        match self.read_lock().await? {
            Some(existing) if existing.is_expired() => {
                warn!(
                    "Replacing expired lock {} held by {}",
                    existing.id, existing.who
                );
                self.delete_lock().await?;
            }
            Some(existing) => return Err(BackendError::locked(&existing)),
            None => {}
        }

        if self.create_lock(&lock).await? {
            Ok(lock)
        } else {
            match self.read_lock().await? {
                Some(winner) => Err(BackendError::locked(&winner)),
                None => Err(BackendError::LockNotFound(lock.id)),
            }
        }
    }

    async fn release_lock(&self, lock: &LockInfo) -> BackendResult<()> {
        self.remove_lock(&lock.id).await
    }

    async fn force_unlock(&self, lock_id: &str) -> BackendResult<()> {
        self.remove_lock(lock_id).await
    }

    async fn init(&self) -> BackendResult<()> {
        if !self.bucket_exists().await? {
            if self.auto_create {
                self.create_bucket().await?;
            } else {
                return Err(BackendError::BucketNotFound(self.bucket.clone()));
            }
        }
        Ok(())
    }

    fn location(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.key)
    }
}

/// Convert a region from DSL form to AWS form
/// e.g., "awscc.Region.ap_northeast_1" -> "ap-northeast-1"
fn convert_region_value(value: &str) -> String {
    value
        .strip_prefix("awscc.Region.")
        .or_else(|| value.strip_prefix("aws.Region."))
        .map(|region| region.replace('_', "-"))
        .unwrap_or_else(|| value.to_string())
}

fn lock_key_for(key: &str) -> String {
    format!("{}.lock", key)
}

fn has_status<E>(err: &SdkError<E>, status: u16) -> bool {
    err.raw_response()
        .is_some_and(|r| r.status().as_u16() == status)
}
