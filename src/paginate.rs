//! Cursor-following walk over one paginated resource.
use std::collections::VecDeque;
use tracing::warn;

use crate::youtube::{FetchError, PageFetcher, RawItem, Resource};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Cursor {
    Start,
    Next(String),
    Exhausted,
}

/// Lazily walks every page of one resource, starting from the first page.
///
/// Holds at most one fetched page. Once the last page has been consumed, or a
/// fetch has failed, the paginator stays exhausted; walking the resource
/// again needs a new `Paginator`.
pub struct Paginator<'a, F: PageFetcher + ?Sized> {
    fetcher: &'a F,
    resource: Resource,
    cursor: Cursor,
    buffer: VecDeque<RawItem>,
    pages_fetched: usize,
}

impl<'a, F: PageFetcher + ?Sized> Paginator<'a, F> {
    pub fn new(fetcher: &'a F, resource: Resource) -> Self {
        Self {
            fetcher,
            resource,
            cursor: Cursor::Start,
            buffer: VecDeque::new(),
            pages_fetched: 0,
        }
    }

    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    /// Fetch the next page, or `None` once the previous page carried no cursor.
    ///
    /// Pages already partly consumed through [`Paginator::next_item`] are not
    /// returned again.
    pub async fn next_page(&mut self) -> Result<Option<Vec<RawItem>>, FetchError> {
        let token = match &self.cursor {
            Cursor::Exhausted => return Ok(None),
            Cursor::Start => None,
            Cursor::Next(token) => Some(token.as_str()),
        };

        let page = match self.fetcher.fetch_page(&self.resource, token).await {
            Ok(page) => page,
            Err(err) => {
                self.cursor = Cursor::Exhausted;
                self.buffer.clear();
                return Err(err);
            }
        };
        self.pages_fetched += 1;
        self.cursor = match page.next_page_token {
            Some(next) if Some(next.as_str()) == token => {
                warn!(resource = %self.resource, cursor = %next, "cursor did not advance, stopping");
                Cursor::Exhausted
            }
            Some(next) => Cursor::Next(next),
            None => Cursor::Exhausted,
        };
        Ok(Some(page.items))
    }

    /// Next item across page boundaries, in source order.
    pub async fn next_item(&mut self) -> Result<Option<RawItem>, FetchError> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Ok(Some(item));
            }
            // Empty pages that still carry a cursor are skipped over.
            match self.next_page().await? {
                Some(items) => self.buffer.extend(items),
                None => return Ok(None),
            }
        }
    }
}
