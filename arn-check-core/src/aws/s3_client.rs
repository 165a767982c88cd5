use async_trait::async_trait;
use aws_config::{Region, SdkConfig};
use aws_sdk_s3::error::ProvideErrorMetadata;
use aws_sdk_s3::types::BucketLocationConstraint;
use aws_sdk_s3::Client as S3Client;
use log::debug;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::aws::{ApiErrorKind, AwsError, AwsResult, BucketRef, StorageApi};

/// Error codes S3 returns when a bucket is addressed through the wrong region
const WRONG_REGION_CODES: &[&str] = &[
    "PermanentRedirect",
    "AuthorizationHeaderMalformed",
    "IllegalLocationConstraintException",
];

/// Client to call Amazon S3.
///
/// Bucket calls go to the bucket's own region; the SDK does not follow
/// cross-region redirects.
pub struct AwsS3Client {
    config: SdkConfig,
    home: S3Client,
    regional: Mutex<HashMap<String, S3Client>>,
}

impl AwsS3Client {
    /// New construct from the profile's loaded configuration
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            config: config.clone(),
            home: S3Client::new(config),
            regional: Mutex::new(HashMap::new()),
        }
    }

    /// Client bound to `region`, or the profile's own client when unknown
    fn client_for(&self, region: Option<&str>) -> S3Client {
        let Some(region) = region else {
            return self.home.clone();
        };
        if self.home.config().region().is_some_and(|r| r.as_ref() == region) {
            return self.home.clone();
        }

        let mut regional = match self.regional.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        regional
            .entry(region.to_string())
            .or_insert_with(|| {
                debug!("Creating S3 client for region {region}");
                let conf = aws_sdk_s3::config::Builder::from(&self.config)
                    .region(Region::new(region.to_string()))
                    .build();
                S3Client::from_conf(conf)
            })
            .clone()
    }

    async fn locate(&self, bucket: &str) -> AwsResult<String> {
        let out = self
            .home
            .get_bucket_location()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| AwsError::from_sdk("GetBucketLocation", bucket, &e))?;
        Ok(region_from_location(
            out.location_constraint().map(BucketLocationConstraint::as_str),
        ))
    }
}

fn is_wrong_region(code: Option<&str>) -> bool {
    code.is_some_and(|c| WRONG_REGION_CODES.contains(&c))
}

/// `GetBucketLocation` reports us-east-1 as empty and eu-west-1 as the legacy `EU`.
fn region_from_location(constraint: Option<&str>) -> String {
    match constraint {
        None | Some("") => "us-east-1".to_string(),
        Some("EU") => "eu-west-1".to_string(),
        Some(region) => region.to_string(),
    }
}

#[async_trait]
impl StorageApi for AwsS3Client {
    /// List all buckets, paginating with the continuation token
    async fn list_buckets(&self) -> AwsResult<Vec<BucketRef>> {
        let mut buckets = Vec::<BucketRef>::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let out = self
                .home
                .list_buckets()
                .set_continuation_token(continuation_token.take())
                .send()
                .await
                .map_err(|e| AwsError::from_sdk("ListBuckets", "account", &e))?;

            buckets.extend(out.buckets().iter().filter_map(|b| {
                b.name().map(|name| {
                    BucketRef::new(name.to_string(), b.bucket_region().map(str::to_string))
                })
            }));

            match out.continuation_token() {
                Some(token) if !token.is_empty() => continuation_token = Some(token.to_string()),
                _ => break,
            }
        }

        Ok(buckets)
    }

    async fn get_bucket_policy(&self, bucket: &BucketRef) -> AwsResult<String> {
        let name = bucket.name.as_str();
        let client = self.client_for(bucket.region.as_deref());
        let result = match client.get_bucket_policy().bucket(name).send().await {
            Err(e) if bucket.region.is_none() && is_wrong_region(e.code()) => {
                let region = self.locate(name).await?;
                debug!("Bucket {name} lives in {region}, retrying there");
                self.client_for(Some(&region))
                    .get_bucket_policy()
                    .bucket(name)
                    .send()
                    .await
            }
            other => other,
        };
        let out = result.map_err(|e| AwsError::from_sdk("GetBucketPolicy", name, &e))?;

        out.policy().map(str::to_string).ok_or_else(|| {
            AwsError::api(
                ApiErrorKind::NotFound,
                "GetBucketPolicy",
                name,
                "response has no policy",
            )
        })
    }
}
