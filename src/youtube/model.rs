use serde::Deserialize;
use serde_json::Value;

/// One item of a paginated response, kept as raw JSON.
pub type RawItem = Value;

/// The list envelope shared by every YouTube Data API collection endpoint.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Page {
    pub items: Vec<RawItem>,
    #[serde(rename = "nextPageToken", default)]
    pub next_page_token: Option<String>,
}

impl Page {
    pub fn last(items: Vec<RawItem>) -> Self {
        Self {
            items,
            next_page_token: None,
        }
    }

    pub fn with_cursor(items: Vec<RawItem>, cursor: impl Into<String>) -> Self {
        Self {
            items,
            next_page_token: Some(cursor.into()),
        }
    }
}
