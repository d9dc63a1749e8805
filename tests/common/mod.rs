#![allow(dead_code)]

use anyhow::Result;
use apache_avro::types::Value as AvroValue;
use async_trait::async_trait;
use futures::future::{self, FutureExt};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::Mutex;
use youtube_watcher::publisher::{DeliveryHandle, DeliveryOutcome, Transport};
use youtube_watcher::registry::RegisteredSchema;
use youtube_watcher::youtube::{FetchError, Page, PageFetcher, Resource};

pub const KSQL_SCHEMA: &str = r#"{
  "type": "record",
  "name": "KsqlDataSourceSchema",
  "namespace": "io.confluent.ksql.avro_schemas",
  "fields": [
    {"name": "TITLE", "type": ["null", "string"], "default": null},
    {"name": "VIEWS", "type": ["null", "long"], "default": null},
    {"name": "LIKES", "type": ["null", "long"], "default": null},
    {"name": "COMMENTS", "type": ["null", "long"], "default": null}
  ]
}"#;

pub fn video_schema() -> RegisteredSchema {
    RegisteredSchema::parse("youtube_videos-value", 1, 42, KSQL_SCHEMA).unwrap()
}

pub fn playlist_item(video_id: &str) -> Value {
    json!({
        "kind": "youtube#playlistItem",
        "contentDetails": { "videoId": video_id }
    })
}

pub fn video(id: &str, title: &str, views: &str, likes: &str, comments: &str) -> Value {
    json!({
        "kind": "youtube#video",
        "id": id,
        "snippet": { "title": title },
        "statistics": {
            "viewCount": views,
            "likes": likes,
            "commentCount": comments
        }
    })
}

pub type FetchKey = (String, Option<String>);

/// Serves scripted pages keyed by resource and cursor, and records every call.
#[derive(Clone, Default)]
pub struct RecordingFetcher {
    script: Arc<Mutex<HashMap<FetchKey, Result<Page, FetchError>>>>,
    calls: Arc<Mutex<Vec<FetchKey>>>,
}

impl RecordingFetcher {
    pub async fn page(&self, resource: Resource, cursor: Option<&str>, page: Page) -> &Self {
        self.script
            .lock()
            .await
            .insert((resource.to_string(), cursor.map(str::to_string)), Ok(page));
        self
    }

    pub async fn fail(&self, resource: Resource, cursor: Option<&str>, err: FetchError) -> &Self {
        self.script
            .lock()
            .await
            .insert((resource.to_string(), cursor.map(str::to_string)), Err(err));
        self
    }

    pub async fn calls(&self) -> Vec<FetchKey> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl PageFetcher for RecordingFetcher {
    async fn fetch_page(&self, resource: &Resource, cursor: Option<&str>) -> Result<Page, FetchError> {
        let key = (resource.to_string(), cursor.map(str::to_string));
        self.calls.lock().await.push(key.clone());
        self.script
            .lock()
            .await
            .remove(&key)
            .unwrap_or_else(|| panic!("unexpected fetch of {:?}", key))
    }
}

#[derive(Debug, Clone)]
pub struct Submission {
    pub topic: String,
    pub key: String,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, Copy)]
pub enum Reply {
    Ack,
    AckAfter(Duration),
    Fail,
    Never,
}

/// Records submissions and answers each with the next scripted reply (Ack once exhausted).
#[derive(Clone, Default)]
pub struct RecordingTransport {
    replies: Arc<StdMutex<VecDeque<Reply>>>,
    submissions: Arc<StdMutex<Vec<Submission>>>,
    flushes: Arc<StdMutex<usize>>,
}

impl RecordingTransport {
    pub fn with_replies(replies: Vec<Reply>) -> Self {
        Self {
            replies: Arc::new(StdMutex::new(VecDeque::from(replies))),
            ..Default::default()
        }
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.submissions.lock().unwrap().clone()
    }

    pub fn keys(&self) -> Vec<String> {
        self.submissions().into_iter().map(|s| s.key).collect()
    }

    pub fn flushes(&self) -> usize {
        *self.flushes.lock().unwrap()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    fn submit(&self, topic: &str, key: &str, payload: Vec<u8>) -> DeliveryHandle {
        let offset = {
            let mut subs = self.submissions.lock().unwrap();
            subs.push(Submission {
                topic: topic.to_string(),
                key: key.to_string(),
                payload,
            });
            subs.len() as i64 - 1
        };
        let reply = self.replies.lock().unwrap().pop_front().unwrap_or(Reply::Ack);
        let acked = DeliveryOutcome::Acknowledged { partition: 0, offset };
        match reply {
            Reply::Ack => future::ready(acked).boxed(),
            Reply::AckAfter(delay) => async move {
                tokio::time::sleep(delay).await;
                acked
            }
            .boxed(),
            Reply::Fail => future::ready(DeliveryOutcome::Failed("Message timed out".into())).boxed(),
            Reply::Never => future::pending().boxed(),
        }
    }

    async fn flush(&self, _timeout: Duration) -> Result<()> {
        *self.flushes.lock().unwrap() += 1;
        Ok(())
    }
}

/// Decoded value fields of one Confluent-framed payload, unions unwrapped.
pub fn decode(payload: &[u8]) -> HashMap<String, AvroValue> {
    assert_eq!(payload[0], 0, "magic byte");
    assert_eq!(&payload[1..5], &42u32.to_be_bytes(), "schema id");
    let schema = video_schema().schema;
    let value = apache_avro::from_avro_datum(&schema, &mut &payload[5..], None).unwrap();
    let AvroValue::Record(fields) = value else {
        panic!("payload is not a record")
    };
    fields
        .into_iter()
        .map(|(name, v)| match v {
            AvroValue::Union(_, inner) => (name, *inner),
            other => (name, other),
        })
        .collect()
}
