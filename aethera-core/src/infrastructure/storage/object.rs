// aethera-core/src/infrastructure/storage/object.rs
//
// S3-compatible backend: single-PUT writes, SigV4 request signing and
// presigned GET URLs. Only the subset of the protocol the platform needs.

use crate::error::AetheraError;
use crate::infrastructure::error::InfrastructureError;
use crate::infrastructure::storage::{StorageBackend, normalize_key};
use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::time::Duration;

type HmacSha256 = Hmac<Sha256>;

const SERVICE: &str = "s3";
const EMPTY_PAYLOAD_SHA256: &str =
    "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

#[derive(Debug, Clone)]
pub struct ObjectStorageConfig {
    /// e.g. `https://s3.eu-central-1.amazonaws.com` or a MinIO endpoint.
    pub endpoint: String,
    pub bucket: String,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
}

pub struct ObjectStorage {
    config: ObjectStorageConfig,
    client: reqwest::Client,
}

impl ObjectStorage {
    pub fn new(config: ObjectStorageConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, key: &str) -> String {
        format!(
            "{}/{}/{}",
            self.config.endpoint.trim_end_matches('/'),
            self.config.bucket,
            key
        )
    }

    fn host(&self) -> String {
        self.config
            .endpoint
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_end_matches('/')
            .to_string()
    }

    fn storage_err(message: impl ToString) -> AetheraError {
        AetheraError::Infrastructure(InfrastructureError::Storage(message.to_string()))
    }

    #[allow(clippy::expect_used)]
    fn hmac(key: &[u8], data: &str) -> Vec<u8> {
        // HMAC accepts keys of any length; this cannot fail.
        let mut mac =
            HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
        mac.update(data.as_bytes());
        mac.finalize().into_bytes().to_vec()
    }

    fn signing_key(&self, date: &str) -> Vec<u8> {
        let k_date = Self::hmac(
            format!("AWS4{}", self.config.secret_key).as_bytes(),
            date,
        );
        let k_region = Self::hmac(&k_date, &self.config.region);
        let k_service = Self::hmac(&k_region, SERVICE);
        Self::hmac(&k_service, "aws4_request")
    }

    /// SigV4 header signature for a request with the given payload hash.
    fn sign(
        &self,
        method: &str,
        canonical_uri: &str,
        canonical_query: &str,
        payload_sha256: &str,
    ) -> (String, String, String) {
        let now = Utc::now();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = now.format("%Y%m%d").to_string();
        let scope = format!("{date}/{}/{SERVICE}/aws4_request", self.config.region);

        let canonical_headers = format!(
            "host:{}\nx-amz-content-sha256:{payload_sha256}\nx-amz-date:{amz_date}\n",
            self.host()
        );
        let signed_headers = "host;x-amz-content-sha256;x-amz-date";
        let canonical_request = format!(
            "{method}\n{canonical_uri}\n{canonical_query}\n{canonical_headers}\n{signed_headers}\n{payload_sha256}"
        );

        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{amz_date}\n{scope}\n{}",
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );
        let signature = hex::encode(Self::hmac(&self.signing_key(&date), &string_to_sign));
        let authorization = format!(
            "AWS4-HMAC-SHA256 Credential={}/{scope}, SignedHeaders={signed_headers}, Signature={signature}",
            self.config.access_key
        );
        (authorization, amz_date, signature)
    }

    async fn request(
        &self,
        method: reqwest::Method,
        key: &str,
        query: &str,
        body: Option<Vec<u8>>,
    ) -> Result<reqwest::Response, AetheraError> {
        let payload_sha256 = match &body {
            Some(bytes) => hex::encode(Sha256::digest(bytes)),
            None => EMPTY_PAYLOAD_SHA256.to_string(),
        };
        let canonical_uri = format!("/{}/{}", self.config.bucket, key);
        let (authorization, amz_date, _) =
            self.sign(method.as_str(), &canonical_uri, query, &payload_sha256);

        let mut url = self.url(key);
        if !query.is_empty() {
            url = format!("{url}?{query}");
        }

        let mut request = self
            .client
            .request(method, url)
            .header("authorization", authorization)
            .header("x-amz-date", amz_date)
            .header("x-amz-content-sha256", payload_sha256);
        if let Some(bytes) = body {
            request = request.body(bytes);
        }

        let response = request.send().await.map_err(Self::storage_err)?;
        if !response.status().is_success() {
            return Err(Self::storage_err(format!(
                "object store returned {} for '{key}'",
                response.status()
            )));
        }
        Ok(response)
    }
}

#[async_trait]
impl StorageBackend for ObjectStorage {
    async fn save(&self, path: &str, bytes: &[u8]) -> Result<(), AetheraError> {
        let key = normalize_key(path)?;
        // Single PUT: the backend's own atomicity guarantee.
        self.request(reqwest::Method::PUT, &key, "", Some(bytes.to_vec()))
            .await?;
        Ok(())
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>, AetheraError> {
        let key = normalize_key(path)?;
        let response = self.request(reqwest::Method::GET, &key, "", None).await?;
        Ok(response.bytes().await.map_err(Self::storage_err)?.to_vec())
    }

    async fn delete(&self, path: &str) -> Result<(), AetheraError> {
        let key = normalize_key(path)?;
        self.request(reqwest::Method::DELETE, &key, "", None).await?;
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, AetheraError> {
        let prefix = normalize_key(prefix)?;
        let query = format!("list-type=2&prefix={prefix}");
        let response = self
            .request(reqwest::Method::GET, "", &query, None)
            .await?;
        let body = response.text().await.map_err(Self::storage_err)?;

        // ListObjectsV2 XML: only <Key> matters to us.
        let re = regex::Regex::new(r"<Key>([^<]+)</Key>")
            .map_err(|e| Self::storage_err(e.to_string()))?;
        let mut keys: Vec<String> = re
            .captures_iter(&body)
            .map(|c| c[1].to_string())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn presign(&self, path: &str, ttl: Duration) -> Result<Option<String>, AetheraError> {
        let key = normalize_key(path)?;
        let now = Utc::now();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = now.format("%Y%m%d").to_string();
        let scope = format!("{date}/{}/{SERVICE}/aws4_request", self.config.region);
        let credential = format!("{}/{scope}", self.config.access_key);

        let canonical_query = format!(
            "X-Amz-Algorithm=AWS4-HMAC-SHA256&X-Amz-Credential={}&X-Amz-Date={amz_date}&X-Amz-Expires={}&X-Amz-SignedHeaders=host",
            credential.replace('/', "%2F"),
            ttl.as_secs().max(1)
        );
        let canonical_uri = format!("/{}/{}", self.config.bucket, key);
        let canonical_request = format!(
            "GET\n{canonical_uri}\n{canonical_query}\nhost:{}\n\nhost\nUNSIGNED-PAYLOAD",
            self.host()
        );
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{amz_date}\n{scope}\n{}",
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );
        let signature = hex::encode(Self::hmac(&self.signing_key(&date), &string_to_sign));

        Ok(Some(format!(
            "{}?{canonical_query}&X-Amz-Signature={signature}",
            self.url(&key)
        )))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn storage() -> ObjectStorage {
        ObjectStorage::new(ObjectStorageConfig {
            endpoint: "https://s3.eu-central-1.amazonaws.com".into(),
            bucket: "aethera-artifacts".into(),
            region: "eu-central-1".into(),
            access_key: "AKIDEXAMPLE".into(),
            secret_key: "secret".into(),
        })
    }

    #[test]
    fn test_url_and_host() {
        let s = storage();
        assert_eq!(
            s.url("run_1/manifest.json"),
            "https://s3.eu-central-1.amazonaws.com/aethera-artifacts/run_1/manifest.json"
        );
        assert_eq!(s.host(), "s3.eu-central-1.amazonaws.com");
    }

    #[test]
    fn test_signature_is_deterministic_per_inputs() {
        let s = storage();
        let date = "20240901";
        let a = s.signing_key(date);
        let b = s.signing_key(date);
        assert_eq!(a, b);
        assert_ne!(a, s.signing_key("20240902"));
    }

    #[tokio::test]
    async fn test_presign_contains_signature_and_expiry() {
        let s = storage();
        let url = s
            .presign("run_1/manifest.json", Duration::from_secs(300))
            .await
            .unwrap()
            .expect("object backend always presigns");
        assert!(url.contains("X-Amz-Signature="));
        assert!(url.contains("X-Amz-Expires=300"));
        assert!(url.starts_with("https://s3.eu-central-1.amazonaws.com/aethera-artifacts/"));
    }

    #[tokio::test]
    async fn test_traversal_blocked_before_any_network_io() {
        let s = storage();
        let err = s.read("../secrets").await.unwrap_err();
        assert!(matches!(err, AetheraError::UnsafePath(_)));
    }
}
