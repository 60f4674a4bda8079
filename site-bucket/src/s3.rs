//! # S3 store
//!
//! Bridges the core [`RemoteStore`] contract to Amazon S3 (or any S3-compatible
//! endpoint) through `aws-sdk-s3`. The client is built once from the resolved
//! configuration and reused for the whole run.
//!
//! Errors are classified here: client-side timeouts, dispatch timeouts and the
//! service's `RequestTimeout` code become [`StoreError::Timeout`] and are retried by
//! the core; every other failure is permanent.

use async_trait::async_trait;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration, ObjectCannedAcl};
use aws_sdk_s3::Client as S3Client;
use site_bucket_core::contract::{ListPage, RemoteObject, RemoteStore, StoreError};
use std::error::Error as StdError;
use tracing::{debug, error, info};

use crate::load_config::{CliConfig, DEFAULT_REGION};

const REQUEST_TIMEOUT_CODE: &str = "RequestTimeout";

pub struct S3Store {
    client: S3Client,
    bucket: String,
    region: String,
}

impl S3Store {
    /// Builds an S3 client from the configured credentials, region and endpoint.
    pub fn connect(config: &CliConfig) -> Self {
        let credentials = aws_credential_types::Credentials::new(
            &config.credentials.access_key_id,
            &config.credentials.secret_access_key,
            None,
            None,
            "site-bucket-config",
        );

        let mut config_builder = aws_sdk_s3::Config::builder()
            .region(aws_types::region::Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .behavior_version_latest();

        if let Some(ref endpoint) = config.endpoint {
            config_builder = config_builder
                .endpoint_url(endpoint)
                .force_path_style(true);
        }

        info!(
            bucket = %config.bucket,
            region = %config.region,
            endpoint = ?config.endpoint,
            "Initialized S3 client"
        );

        Self {
            client: S3Client::from_conf(config_builder.build()),
            bucket: config.bucket.clone(),
            region: config.region.clone(),
        }
    }
}

/// Maps an SDK failure onto the core's transient/permanent split.
fn classify<E, R>(operation: &str, err: SdkError<E, R>) -> StoreError
where
    E: ProvideErrorMetadata + StdError + Send + Sync + 'static,
    R: std::fmt::Debug,
{
    let message = format!("{operation} failed: {}", DisplayErrorContext(&err));
    let transient = match &err {
        SdkError::TimeoutError(_) => true,
        SdkError::DispatchFailure(failure) => failure.is_timeout(),
        SdkError::ServiceError(_) => {
            err.as_service_error().and_then(|e| e.code()) == Some(REQUEST_TIMEOUT_CODE)
        }
        _ => false,
    };
    if transient {
        StoreError::Timeout(message)
    } else if matches!(err, SdkError::ServiceError(_)) {
        StoreError::Service(message)
    } else {
        StoreError::Other(message)
    }
}

#[async_trait]
impl RemoteStore for S3Store {
    fn bucket(&self) -> String {
        self.bucket.clone()
    }

    async fn list_page(&self, continuation: Option<String>) -> Result<ListPage, StoreError> {
        let resp = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .set_continuation_token(continuation)
            .send()
            .await
            .map_err(|e| classify("list objects", e))?;

        let objects: Vec<RemoteObject> = resp
            .contents()
            .iter()
            .filter_map(|obj| {
                obj.key().map(|key| RemoteObject {
                    key: key.to_string(),
                    etag: obj.e_tag().map(str::to_string),
                })
            })
            .collect();

        let next_continuation = if resp.is_truncated().unwrap_or(false) {
            resp.next_continuation_token().map(str::to_string)
        } else {
            None
        };
        debug!(
            bucket = %self.bucket,
            count = objects.len(),
            truncated = next_continuation.is_some(),
            "Listed page of objects"
        );
        Ok(ListPage {
            objects,
            next_continuation,
        })
    }

    async fn store_object(&self, key: &str, body: Vec<u8>) -> Result<(), StoreError> {
        let size = body.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .acl(ObjectCannedAcl::PublicRead)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| classify(&format!("upload of {key}"), e))?;

        debug!("uploaded {size} bytes to s3://{}/{key}", self.bucket);
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> Result<(), StoreError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| classify(&format!("delete of {key}"), e))?;

        debug!("deleted s3://{}/{key}", self.bucket);
        Ok(())
    }

    async fn bucket_exists(&self) -> Result<bool, StoreError> {
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => Ok(true),
            Err(e) => {
                if e.as_service_error().map(|se| se.is_not_found()).unwrap_or(false) {
                    Ok(false)
                } else {
                    error!(bucket = %self.bucket, error = %DisplayErrorContext(&e), "Bucket check failed");
                    Err(classify("bucket check", e))
                }
            }
        }
    }

    async fn create_bucket(&self) -> Result<(), StoreError> {
        let mut request = self.client.create_bucket().bucket(&self.bucket);
        // us-east-1 rejects an explicit location constraint.
        if self.region != DEFAULT_REGION {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }
        request
            .send()
            .await
            .map_err(|e| classify("create bucket", e))?;
        info!(bucket = %self.bucket, "Created bucket");
        Ok(())
    }
}
