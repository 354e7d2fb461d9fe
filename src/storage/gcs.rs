//! Google Cloud Storage backend.
//!
//! Uploads go through the GCS JSON API upload endpoint using `reqwest`.
//! This is the same bucket a Firebase project exposes as its default
//! storage bucket.
//!
//! Object naming: `{prefix}{file_name}`.
//!
//! Read access depends on [`GcsAccess`]:
//!   - `download_token`: a multipart upload stores a fresh
//!     `firebaseStorageDownloadTokens` value in the object metadata and the
//!     URL is `{download_base}/v0/b/{bucket}/o/{object}?alt=media&token=..`.
//!   - `public_read`: a media upload with `predefinedAcl=publicRead`; the
//!     URL is `{public_base}/{bucket}/{object}`.
//!
//! Credentials are resolved lazily on the first upload, in order:
//!   - `access_token` from config
//!   - `GOOGLE_OAUTH_ACCESS_TOKEN` environment variable
//!   - `credentials_file` from config, else `GOOGLE_APPLICATION_CREDENTIALS`
//!     (service account key or `authorized_user` file)
//!   - gcloud application-default credentials
//!   - GCE metadata server

use base64::Engine;
use bytes::Bytes;
use md5::{Digest, Md5};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

use super::backend::{encode_key, FileMetadata, ObjectStorage, UploadTarget};
use crate::config::{GcsAccess, GcsStorageConfig};

/// OAuth scope needed to write objects.
const STORAGE_SCOPE: &str = "https://www.googleapis.com/auth/devstorage.read_write";

/// Default OAuth token endpoint.
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// GCE metadata server token endpoint.
const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// Refresh tokens this long before they expire.
const TOKEN_EXPIRY_MARGIN_SECS: u64 = 60;

/// Object metadata key Firebase reads download tokens from.
const DOWNLOAD_TOKENS_KEY: &str = "firebaseStorageDownloadTokens";

/// `encodeURIComponent` set: object names go into a single path segment.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

// -- GCS JSON API types -------------------------------------------------------

/// Object resource returned by a media upload.
#[derive(Debug, Deserialize)]
struct GcsObject {
    name: Option<String>,
    #[serde(rename = "md5Hash")]
    md5_hash: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GcsErrorDetail {
    code: Option<u16>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GcsErrorResponse {
    error: Option<GcsErrorDetail>,
}

// -- Credentials --------------------------------------------------------------

/// The two credential file layouts Google tooling writes.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum CredentialsFile {
    ServiceAccount {
        client_email: String,
        private_key: String,
        #[serde(default)]
        token_uri: Option<String>,
    },
    AuthorizedUser {
        client_id: String,
        client_secret: String,
        refresh_token: String,
    },
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

/// JWT claims for the service-account bearer grant.
#[derive(Debug, Serialize)]
struct JwtClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: u64,
    exp: u64,
}

/// Cached access token with expiry.
struct CachedToken {
    access_token: String,
    expiry: Instant,
}

/// Object storage backed by a GCS bucket.
pub struct GcsStorage {
    /// HTTP client for GCS JSON API calls.
    client: reqwest::Client,
    bucket: String,
    prefix: String,
    credentials_file: Option<String>,
    static_token: Option<String>,
    upload_base: String,
    public_base: String,
    download_base: String,
    access: GcsAccess,
    /// Cached OAuth2 access token.
    token_cache: Mutex<Option<CachedToken>>,
}

impl GcsStorage {
    /// Build the backend. No network I/O happens until the first upload.
    pub fn new(config: &GcsStorageConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {e}"))?;

        info!(
            "GCS storage initialized: bucket={} prefix='{}'",
            config.bucket, config.prefix
        );

        Ok(Self {
            client,
            bucket: config.bucket.clone(),
            prefix: config.prefix.clone(),
            credentials_file: config.credentials_file.clone(),
            static_token: config.access_token.clone(),
            upload_base: config.upload_base.trim_end_matches('/').to_string(),
            public_base: config.public_base.trim_end_matches('/').to_string(),
            download_base: config.download_base.trim_end_matches('/').to_string(),
            access: config.access,
            token_cache: Mutex::new(None),
        })
    }

    /// Map a file name to the upstream object name.
    fn object_name(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    /// Public URL of an upstream object.
    fn public_url(&self, object_name: &str) -> String {
        format!(
            "{}/{}/{}",
            self.public_base,
            encode_key(&self.bucket),
            encode_key(object_name)
        )
    }

    /// Firebase download URL for an object carrying `token`.
    fn download_url(&self, object_name: &str, token: &str) -> String {
        format!(
            "{}/v0/b/{}/o/{}?alt=media&token={}",
            self.download_base,
            encode_key(&self.bucket),
            utf8_percent_encode(object_name, COMPONENT),
            token
        )
    }

    /// Base64 MD5 digest, the form GCS reports in `md5Hash`.
    fn compute_md5_base64(data: &[u8]) -> String {
        let mut hasher = Md5::new();
        hasher.update(data);
        base64::engine::general_purpose::STANDARD.encode(hasher.finalize())
    }

    /// Map a GCS HTTP error to an anyhow error with context.
    fn map_gcs_error(context: &str, status: StatusCode, body: &str) -> anyhow::Error {
        if let Ok(GcsErrorResponse { error: Some(err) }) =
            serde_json::from_str::<GcsErrorResponse>(body)
        {
            return anyhow::anyhow!(
                "GCS {}: {} (code {})",
                context,
                err.message.unwrap_or_default(),
                err.code.unwrap_or(status.as_u16())
            );
        }
        anyhow::anyhow!("GCS {context}: HTTP {status} - {body}")
    }

    // -- Token management -----------------------------------------------------

    /// Return a cached token, or fetch and cache a fresh one.
    async fn access_token(&self) -> anyhow::Result<String> {
        if let Some(token) = &self.static_token {
            return Ok(token.clone());
        }

        {
            let cache = self.token_cache.lock().expect("token cache mutex poisoned");
            if let Some(cached) = cache.as_ref() {
                if cached.expiry > Instant::now() {
                    return Ok(cached.access_token.clone());
                }
            }
        }

        let fresh = self.fetch_access_token().await?;
        let expiry = Instant::now()
            + Duration::from_secs(fresh.expires_in.saturating_sub(TOKEN_EXPIRY_MARGIN_SECS));

        let mut cache = self.token_cache.lock().expect("token cache mutex poisoned");
        *cache = Some(CachedToken {
            access_token: fresh.access_token.clone(),
            expiry,
        });
        Ok(fresh.access_token)
    }

    async fn fetch_access_token(&self) -> anyhow::Result<TokenResponse> {
        if let Ok(token) = std::env::var("GOOGLE_OAUTH_ACCESS_TOKEN") {
            return Ok(TokenResponse {
                access_token: token,
                expires_in: default_expires_in(),
            });
        }

        let explicit = self
            .credentials_file
            .clone()
            .or_else(|| std::env::var("GOOGLE_APPLICATION_CREDENTIALS").ok());
        if let Some(path) = explicit {
            return self.token_from_file(&path).await;
        }

        let adc_path = application_default_credentials_path();
        if let Ok(true) = tokio::fs::try_exists(&adc_path).await {
            return self.token_from_file(&adc_path).await;
        }

        self.token_from_metadata_server().await
    }

    async fn token_from_file(&self, path: &str) -> anyhow::Result<TokenResponse> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to read credentials file {path}: {e}"))?;
        let creds: CredentialsFile = serde_json::from_str(&contents)
            .map_err(|e| anyhow::anyhow!("Failed to parse credentials file {path}: {e}"))?;

        match creds {
            CredentialsFile::ServiceAccount {
                client_email,
                private_key,
                token_uri,
            } => {
                let token_uri = token_uri.as_deref().unwrap_or(DEFAULT_TOKEN_URI);
                let assertion = sign_service_account_jwt(&client_email, &private_key, token_uri)?;
                self.exchange_token(
                    token_uri,
                    &[
                        ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                        ("assertion", assertion.as_str()),
                    ],
                )
                .await
            }
            CredentialsFile::AuthorizedUser {
                client_id,
                client_secret,
                refresh_token,
            } => {
                self.exchange_token(
                    DEFAULT_TOKEN_URI,
                    &[
                        ("client_id", client_id.as_str()),
                        ("client_secret", client_secret.as_str()),
                        ("refresh_token", refresh_token.as_str()),
                        ("grant_type", "refresh_token"),
                    ],
                )
                .await
            }
        }
    }

    /// POST a form to an OAuth token endpoint.
    async fn exchange_token(
        &self,
        token_uri: &str,
        form: &[(&str, &str)],
    ) -> anyhow::Result<TokenResponse> {
        let resp = self
            .client
            .post(token_uri)
            .form(form)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Token request failed: {e}"))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("Token exchange failed ({status}): {body}"));
        }
        Ok(resp.json().await?)
    }

    async fn token_from_metadata_server(&self) -> anyhow::Result<TokenResponse> {
        let resp = self
            .client
            .get(METADATA_TOKEN_URL)
            .header("Metadata-Flavor", "Google")
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(|e| {
                anyhow::anyhow!(
                    "Metadata server request failed: {e}. Set storage.gcs.credentials_file, \
                     GOOGLE_APPLICATION_CREDENTIALS or GOOGLE_OAUTH_ACCESS_TOKEN."
                )
            })?;

        if !resp.status().is_success() {
            return Err(anyhow::anyhow!(
                "Metadata server returned {}",
                resp.status()
            ));
        }
        Ok(resp.json().await?)
    }

    // -- Upload ---------------------------------------------------------------

    /// Upload `data` as `object_name`.
    ///
    /// With a download token this is a multipart upload carrying the token
    /// in the object metadata; otherwise a media upload with a public-read
    /// ACL. Returns the object resource GCS reports back.
    async fn gcs_upload(
        &self,
        object_name: &str,
        data: Bytes,
        content_type: &str,
        download_token: Option<&str>,
    ) -> anyhow::Result<GcsObject> {
        let token = self.access_token().await?;
        let endpoint = format!("{}/b/{}/o", self.upload_base, encode_key(&self.bucket));

        let request = match download_token {
            Some(download_token) => {
                let metadata = serde_json::json!({
                    "name": object_name,
                    "contentType": content_type,
                    "metadata": { DOWNLOAD_TOKENS_KEY: download_token },
                });
                let boundary = format!("stencil-{}", uuid::Uuid::new_v4().simple());
                let metadata = serde_json::to_vec(&metadata)?;
                let body = related_body(&boundary, &metadata, content_type, &data);
                self.client
                    .post(format!("{endpoint}?uploadType=multipart"))
                    .header(CONTENT_TYPE, format!("multipart/related; boundary={boundary}"))
                    .body(body)
            }
            None => self
                .client
                .post(format!(
                    "{endpoint}?uploadType=media&predefinedAcl=publicRead&name={}",
                    utf8_percent_encode(object_name, NON_ALPHANUMERIC)
                ))
                .header(CONTENT_TYPE, content_type)
                .body(data),
        };

        let resp = request
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("GCS upload request failed: {e}"))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Self::map_gcs_error("upload", status, &body));
        }

        resp.json::<GcsObject>()
            .await
            .map_err(|e| anyhow::anyhow!("GCS upload response unreadable: {e}"))
    }
}

/// `multipart/related` body: JSON object metadata, then the media.
fn related_body(boundary: &str, metadata: &[u8], content_type: &str, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(metadata.len() + data.len() + 256);
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
    body.extend_from_slice(metadata);
    body.extend_from_slice(format!("\r\n--{boundary}\r\n").as_bytes());
    body.extend_from_slice(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    body
}

/// Sign the RS256 assertion for the service-account token grant.
fn sign_service_account_jwt(
    client_email: &str,
    private_key_pem: &str,
    token_uri: &str,
) -> anyhow::Result<String> {
    let iat = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();
    let claims = JwtClaims {
        iss: client_email,
        scope: STORAGE_SCOPE,
        aud: token_uri,
        iat,
        exp: iat + default_expires_in(),
    };
    let key = jsonwebtoken::EncodingKey::from_rsa_pem(private_key_pem.as_bytes())
        .map_err(|e| anyhow::anyhow!("Invalid service account private key: {e}"))?;
    let header = jsonwebtoken::Header::new(jsonwebtoken::Algorithm::RS256);
    Ok(jsonwebtoken::encode(&header, &claims, &key)?)
}

/// Path gcloud writes application-default credentials to.
fn application_default_credentials_path() -> String {
    if let Ok(config_dir) = std::env::var("CLOUDSDK_CONFIG") {
        return format!("{config_dir}/application_default_credentials.json");
    }
    if let Ok(home) = std::env::var("HOME") {
        return format!("{home}/.config/gcloud/application_default_credentials.json");
    }
    ".config/gcloud/application_default_credentials.json".to_string()
}

impl ObjectStorage for GcsStorage {
    fn upload_file(
        &self,
        name: &str,
        content: Bytes,
        metadata: FileMetadata,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send + '_>> {
        let name = name.to_string();
        Box::pin(async move {
            UploadTarget::check(&name, &metadata)?;
            let object_name = self.object_name(&name);
            let expected_md5 = Self::compute_md5_base64(&content);

            debug!(
                bucket = %self.bucket,
                object = %object_name,
                size = content.len(),
                "GCS upload"
            );

            let download_token = match self.access {
                GcsAccess::DownloadToken => Some(uuid::Uuid::new_v4().to_string()),
                GcsAccess::PublicRead => None,
            };
            let object = self
                .gcs_upload(
                    &object_name,
                    content,
                    &metadata.content_type,
                    download_token.as_deref(),
                )
                .await?;

            if let Some(reported) = object.md5_hash.as_deref() {
                if reported != expected_md5 {
                    return Err(anyhow::anyhow!(
                        "GCS upload of {object_name} stored different bytes \
                         (md5 {reported}, expected {expected_md5})"
                    ));
                }
            }

            let stored_name = object.name.unwrap_or(object_name);
            Ok(match download_token {
                Some(token) => self.download_url(&stored_name, &token),
                None => self.public_url(&stored_name),
            })
        })
    }
}

// -- Tests -------------------------------------------------------------------
