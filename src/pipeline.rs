use std::fmt;
use thiserror::Error;
use tracing::{info, instrument};

use crate::model::{container_video_id, map_video, MappingError};
use crate::paginate::Paginator;
use crate::publisher::{DrainReport, EventPublisher, SerializationError};
use crate::youtube::{FetchError, PageFetcher, Resource};

/// Where a run is, or where it stopped.
///
/// Only a label for logs and errors. A run that has not started is just a
/// [`Pipeline`], and a failed one is a [`PipelineError`] carrying the stage
/// it failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    WalkContainer,
    WalkDetail,
    Publish,
    Drain,
    Done,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::WalkContainer => "walk_playlist",
            Stage::WalkDetail => "walk_video",
            Stage::Publish => "publish",
            Stage::Drain => "drain",
            Stage::Done => "done",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{stage} failed: {source}")]
    Fetch {
        stage: Stage,
        #[source]
        source: FetchError,
    },
    #[error("{stage} failed: malformed item from {resource}: {source}")]
    Mapping {
        stage: Stage,
        resource: String,
        #[source]
        source: MappingError,
    },
    #[error("publish failed for video {key}: {source}")]
    Serialization {
        key: String,
        #[source]
        source: SerializationError,
    },
    #[error("drain finished with {failed} failed and {unresolved} unresolved deliveries")]
    Delivery { failed: usize, unresolved: usize },
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Fetch { stage, .. } | PipelineError::Mapping { stage, .. } => *stage,
            PipelineError::Serialization { .. } => Stage::Publish,
            PipelineError::Delivery { .. } => Stage::Drain,
        }
    }
}

#[derive(Debug)]
pub struct RunSummary {
    pub playlist_items: usize,
    pub published: usize,
    pub deliveries: DrainReport,
}

/// Walks one playlist, looks up every video it references and publishes it.
pub struct Pipeline<'a, F: PageFetcher + ?Sized> {
    fetcher: &'a F,
    publisher: EventPublisher,
    playlist_id: String,
    fail_on_delivery_error: bool,
}

impl<'a, F: PageFetcher + ?Sized> Pipeline<'a, F> {
    pub fn new(fetcher: &'a F, publisher: EventPublisher, playlist_id: impl Into<String>) -> Self {
        Self {
            fetcher,
            publisher,
            playlist_id: playlist_id.into(),
            fail_on_delivery_error: false,
        }
    }

    /// Fail the run when any delivery failed or stayed unresolved after the drain.
    pub fn fail_on_delivery_error(mut self, enabled: bool) -> Self {
        self.fail_on_delivery_error = enabled;
        self
    }

    /// Run to completion. Any fetch, mapping or serialization error aborts
    /// immediately, without draining.
    #[instrument(skip_all, fields(playlist_id = %self.playlist_id))]
    pub async fn run(self) -> Result<RunSummary, PipelineError> {
        let Self {
            fetcher,
            mut publisher,
            playlist_id,
            fail_on_delivery_error,
        } = self;

        let mut playlist_items = 0usize;
        let mut published = 0usize;
        let mut playlist = Paginator::new(fetcher, Resource::playlist_items(playlist_id));
        info!(stage = %Stage::WalkContainer, resource = %playlist.resource(), "start");

        while let Some(item) = playlist
            .next_item()
            .await
            .map_err(|source| PipelineError::Fetch {
                stage: Stage::WalkContainer,
                source,
            })?
        {
            playlist_items += 1;
            let video_id = container_video_id(&item).map_err(|source| PipelineError::Mapping {
                stage: Stage::WalkContainer,
                resource: playlist.resource().to_string(),
                source,
            })?;

            // The videos endpoint filtered by id normally answers with a single page.
            let mut videos = Paginator::new(fetcher, Resource::videos(video_id));
            while let Some(video) = videos
                .next_item()
                .await
                .map_err(|source| PipelineError::Fetch {
                    stage: Stage::WalkDetail,
                    source,
                })?
            {
                let event = map_video(&video).map_err(|source| PipelineError::Mapping {
                    stage: Stage::WalkDetail,
                    resource: videos.resource().to_string(),
                    source,
                })?;
                info!(
                    video_id = %event.id,
                    title = %event.title,
                    views = event.views,
                    likes = event.likes,
                    comments = event.comments,
                    "got video"
                );

                let key = event.id.clone();
                publisher
                    .publish(event)
                    .map_err(|source| PipelineError::Serialization { key, source })?;
                published += 1;
            }
        }

        info!(
            stage = %Stage::Drain,
            playlist_items,
            published,
            pages = playlist.pages_fetched(),
            "playlist exhausted"
        );
        let deliveries = publisher.drain().await;
        if fail_on_delivery_error && !deliveries.is_clean() {
            return Err(PipelineError::Delivery {
                failed: deliveries.failed(),
                unresolved: deliveries.unresolved.len(),
            });
        }

        info!(stage = %Stage::Done, playlist_items, published, "finished");
        Ok(RunSummary {
            playlist_items,
            published,
            deliveries,
        })
    }
}
