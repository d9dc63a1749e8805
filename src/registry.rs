//! Minimal client for a Confluent-compatible schema registry.
use anyhow::Context;
use apache_avro::Schema;
use reqwest::{Client, Url};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::config::Config;

const ACCEPT: &str = "application/vnd.schemaregistry.v1+json";

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("request for subject {subject} failed: {source}")]
    Request {
        subject: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("schema registry returned HTTP {status} for subject {subject}: {body}")]
    Status {
        subject: String,
        status: u16,
        body: String,
    },
    #[error("subject {subject} holds a {schema_type} schema, expected AVRO")]
    UnsupportedType { subject: String, schema_type: String },
    #[error("invalid Avro schema for subject {subject}: {source}")]
    InvalidSchema {
        subject: String,
        #[source]
        source: apache_avro::Error,
    },
}

/// A parsed schema plus the id the registry assigned to it.
#[derive(Debug, Clone)]
pub struct RegisteredSchema {
    pub subject: String,
    pub version: i32,
    pub id: u32,
    pub schema: Schema,
}

impl RegisteredSchema {
    pub fn parse(
        subject: impl Into<String>,
        version: i32,
        id: u32,
        schema: &str,
    ) -> Result<Self, RegistryError> {
        let subject = subject.into();
        let schema = Schema::parse_str(schema).map_err(|source| RegistryError::InvalidSchema {
            subject: subject.clone(),
            source,
        })?;
        Ok(Self {
            subject,
            version,
            id,
            schema,
        })
    }
}

#[derive(Deserialize, Debug)]
struct LatestVersionResp {
    subject: String,
    version: i32,
    id: u32,
    schema: String,
    /// Absent for Avro, the registry's default type.
    #[serde(rename = "schemaType", default)]
    schema_type: Option<String>,
}

#[derive(Clone)]
pub struct SchemaRegistryClient {
    http: Client,
    base_url: Url,
    basic_auth: Option<(String, String)>,
}

impl fmt::Debug for SchemaRegistryClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaRegistryClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl SchemaRegistryClient {
    pub fn new(
        mut base_url: Url,
        basic_auth: Option<(String, String)>,
        timeout: Duration,
    ) -> reqwest::Result<Self> {
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let http = Client::builder()
            .user_agent("youtube-watcher/0.1")
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            base_url,
            basic_auth,
        })
    }

    pub fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        let sr = &cfg.schema_registry;
        let base_url = Url::parse(&sr.url).context("invalid schema registry URL")?;
        let auth = match (&sr.username, &sr.password) {
            (Some(user), Some(pass)) => Some((user.clone(), pass.clone())),
            _ => None,
        };
        Ok(Self::new(base_url, auth, cfg.youtube.request_timeout())?)
    }

    pub fn build_request(&self, subject: &str) -> anyhow::Result<reqwest::Request> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("schema registry URL cannot be a base"))?
            .pop_if_empty()
            .extend(["subjects", subject, "versions", "latest"]);
        let mut req = self.http.get(url).header("Accept", ACCEPT);
        if let Some((user, pass)) = &self.basic_auth {
            req = req.basic_auth(user, Some(pass));
        }
        req.build().context("failed to build schema registry request")
    }

    /// Fetch and parse the latest version registered under `subject`.
    pub async fn get_latest_schema(&self, subject: &str) -> Result<RegisteredSchema, RegistryError> {
        let request_err = |source: anyhow::Error| RegistryError::Request {
            subject: subject.to_string(),
            source,
        };

        let request = self.build_request(subject).map_err(request_err)?;
        let res = self
            .http
            .execute(request)
            .await
            .map_err(|e| request_err(e.into()))?;
        if !res.status().is_success() {
            let status = res.status().as_u16();
            let body = res.text().await.unwrap_or_default();
            return Err(RegistryError::Status {
                subject: subject.to_string(),
                status,
                body,
            });
        }
        let resp: LatestVersionResp = res.json().await.map_err(|e| request_err(e.into()))?;
        let schema = parse_latest_version(resp)?;
        info!(
            subject = %schema.subject,
            version = schema.version,
            schema_id = schema.id,
            "resolved latest schema"
        );
        Ok(schema)
    }
}

fn parse_latest_version(resp: LatestVersionResp) -> Result<RegisteredSchema, RegistryError> {
    if let Some(kind) = resp.schema_type.filter(|t| !t.eq_ignore_ascii_case("AVRO")) {
        return Err(RegistryError::UnsupportedType {
            subject: resp.subject,
            schema_type: kind,
        });
    }
    RegisteredSchema::parse(resp.subject, resp.version, resp.id, &resp.schema)
}

#[cfg(test)]
mod tests {
    use super::*;

    const VIDEO_SCHEMA: &str = r#"{"type":"record","name":"KsqlDataSourceSchema","fields":[{"name":"TITLE","type":["null","string"],"default":null}]}"#;

    fn client(auth: Option<(String, String)>) -> SchemaRegistryClient {
        SchemaRegistryClient::new(
            Url::parse("http://registry:8081/sr").unwrap(),
            auth,
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn build_request_targets_latest_version() {
        let request = client(None).build_request("youtube_videos-value").unwrap();
        assert_eq!(request.method(), reqwest::Method::GET);
        assert_eq!(
            request.url().path(),
            "/sr/subjects/youtube_videos-value/versions/latest"
        );
        assert_eq!(
            request.headers().get("Accept").and_then(|h| h.to_str().ok()).unwrap(),
            ACCEPT
        );
        assert!(request.headers().get("Authorization").is_none());
    }

    #[test]
    fn build_request_sets_basic_auth() {
        let request = client(Some(("key".into(), "secret".into())))
            .build_request("s")
            .unwrap();
        let auth = request
            .headers()
            .get("Authorization")
            .and_then(|h| h.to_str().ok())
            .unwrap();
        assert!(auth.starts_with("Basic "));
    }

    #[test]
    fn parses_avro_response() {
        let resp: LatestVersionResp = serde_json::from_value(serde_json::json!({
            "subject": "youtube_videos-value",
            "version": 3,
            "id": 42,
            "schema": VIDEO_SCHEMA,
        }))
        .unwrap();
        let schema = parse_latest_version(resp).unwrap();
        assert_eq!(schema.id, 42);
        assert_eq!(schema.version, 3);
        assert!(matches!(schema.schema, Schema::Record(_)));
    }

    #[test]
    fn rejects_non_avro_and_broken_schemas() {
        let resp: LatestVersionResp = serde_json::from_value(serde_json::json!({
            "subject": "s", "version": 1, "id": 1, "schema": "syntax = \"proto3\";", "schemaType": "PROTOBUF"
        }))
        .unwrap();
        assert!(matches!(
            parse_latest_version(resp),
            Err(RegistryError::UnsupportedType { .. })
        ));

        let err = RegisteredSchema::parse("s", 1, 1, "{not json").unwrap_err();
        assert!(matches!(err, RegistryError::InvalidSchema { .. }));
    }
}
