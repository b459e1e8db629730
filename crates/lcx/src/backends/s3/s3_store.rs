// ai
//! 🪣 S3Store — `ObjectStore` over the AWS SDK.
//!
//! Three calls, three `.context(...)`s. No retries beyond what the SDK does on its own
//! (and we don't ask it for more). No HEAD requests, no multipart, no presigning.
//! Fragments are small, bundles are at most a few hundred MiB, PutObject copes.

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::primitives::ByteStream;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::backends::{ListPage, ListRequest, ObjectStore};

// -- 🏷️ what a bundle says it is when someone downloads it from the console
const BUNDLE_CONTENT_TYPE: &str = "application/gzip";

/// 🔧 Configuration for the S3 backend.
///
/// 📐 `endpoint_url` + `force_path_style` exist for S3-compatible stores (MinIO,
/// LocalStack). Leave both alone for real AWS.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct S3StoreConfig {
    /// 🌎 AWS region, defaults to "us-east-1" because that's where data goes to retire
    #[serde(default = "default_s3_region")]
    pub region: String,
    /// 🔗 Optional endpoint override for S3-compatible stores
    #[serde(default)]
    pub endpoint_url: Option<String>,
    /// 🛣️ `bucket.host/key` vs `host/bucket/key`. MinIO wants the latter
    #[serde(default)]
    pub force_path_style: bool,
}

fn default_s3_region() -> String {
    "us-east-1".to_string()
}

impl Default for S3StoreConfig {
    fn default() -> Self {
        Self {
            region: default_s3_region(),
            endpoint_url: None,
            force_path_style: false,
        }
    }
}

/// 🪣 The live object store.
#[derive(Debug, Clone)]
pub struct S3Store {
    client: aws_sdk_s3::Client,
}

impl S3Store {
    /// 🚀 Build an S3 client from the environment.
    ///
    /// Credentials come from the usual chain: env vars → ~/.aws/config → IAM role → hope.
    /// Nothing is called here, so a bad credential shows up on the first LIST, not now.
    pub async fn new(config: &S3StoreConfig) -> Result<Self> {
        let the_sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new(config.region.clone()))
            .load()
            .await;

        let mut the_s3_config = aws_sdk_s3::config::Builder::from(&the_sdk_config)
            .force_path_style(config.force_path_style);
        if let Some(ref endpoint_url) = config.endpoint_url {
            the_s3_config = the_s3_config.endpoint_url(endpoint_url);
        }

        Ok(Self {
            client: aws_sdk_s3::Client::from_conf(the_s3_config.build()),
        })
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn list_page(&self, request: &ListRequest, continuation: Option<String>) -> Result<ListPage> {
        let mut the_call = self
            .client
            .list_objects_v2()
            .bucket(&request.bucket)
            .prefix(&request.prefix);
        if let Some(ref delimiter) = request.delimiter {
            the_call = the_call.delimiter(delimiter);
        }
        if let Some(token) = continuation {
            the_call = the_call.continuation_token(token);
        }

        let the_output = the_call.send().await.context(format!(
            "💀 ListObjectsV2 failed for s3://{}/{}. Check: bucket name, region, and whether \
             the role is allowed to s3:ListBucket.",
            request.bucket, request.prefix
        ))?;

        let keys: Vec<String> = the_output
            .contents()
            .iter()
            .filter_map(|object| object.key().map(str::to_string))
            .collect();
        let common_prefixes: Vec<String> = the_output
            .common_prefixes()
            .iter()
            .filter_map(|common| common.prefix().map(str::to_string))
            .collect();
        // -- 🔄 S3 only hands out a token when the listing is truncated, but trust, verify
        let next_continuation = if the_output.is_truncated().unwrap_or(false) {
            the_output.next_continuation_token().map(str::to_string)
        } else {
            None
        };

        trace!(
            "📜 listed s3://{}/{}: {} keys, {} prefixes, more={}",
            request.bucket,
            request.prefix,
            keys.len(),
            common_prefixes.len(),
            next_continuation.is_some()
        );

        Ok(ListPage {
            keys,
            common_prefixes,
            next_continuation,
        })
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let the_output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .context(format!("💀 GetObject failed for s3://{bucket}/{key}"))?;

        let the_bytes = the_output
            .body
            .collect()
            .await
            .context(format!(
                "💀 GetObject for s3://{bucket}/{key} started fine and then the body stream died mid-read"
            ))?
            .into_bytes();
        Ok(the_bytes.to_vec())
    }

    async fn put(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<()> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(BUNDLE_CONTENT_TYPE)
            .body(ByteStream::from(body))
            .send()
            .await
            .context(format!(
                "💀 PutObject failed for s3://{bucket}/{key}. Check s3:PutObject on the destination."
            ))?;
        Ok(())
    }
}
