use std::collections::VecDeque;
use std::sync::Arc;

use harvest_logging::{harvest_error, harvest_info, harvest_warn};
use tokio::task::JoinSet;

use crate::extract::ExtractorRegistry;
use crate::fetch::Downloader;
use crate::pipeline::PipelineRegistry;
use crate::promise::Outcome;
use crate::request::Request;

#[derive(Debug, Clone)]
pub struct CrawlSettings {
    /// Upper bound on concurrent downloads. Values below 1 are treated as 1.
    pub max_in_flight: usize,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self { max_in_flight: 8 }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlStats {
    /// Pages downloaded successfully.
    pub pages: usize,
    /// Records the pipelines stored.
    pub records: usize,
    pub failed: usize,
    pub cancelled: usize,
}

enum Step {
    Page {
        records: usize,
        follow_ups: Vec<Request>,
    },
    Failed,
    Cancelled,
}

/// Drives the fetch/extract/dispatch cycle until the frontier is empty.
///
/// Follow-up requests emitted by extractors are queued behind the seeds.
/// Failed and cancelled downloads never produce follow-ups.
pub struct Spider {
    downloader: Arc<dyn Downloader>,
    extractors: Arc<ExtractorRegistry>,
    pipelines: Arc<PipelineRegistry>,
    settings: CrawlSettings,
}

impl Spider {
    pub fn new(
        downloader: Arc<dyn Downloader>,
        extractors: ExtractorRegistry,
        pipelines: PipelineRegistry,
        settings: CrawlSettings,
    ) -> Self {
        Self {
            downloader,
            extractors: Arc::new(extractors),
            pipelines: Arc::new(pipelines),
            settings,
        }
    }

    pub async fn run(&self, seeds: impl IntoIterator<Item = Request>) -> CrawlStats {
        let mut frontier: VecDeque<Request> = seeds.into_iter().collect();
        let mut in_flight = JoinSet::new();
        let mut stats = CrawlStats::default();
        let limit = self.settings.max_in_flight.max(1);

        loop {
            while in_flight.len() < limit {
                let Some(request) = frontier.pop_front() else {
                    break;
                };
                in_flight.spawn(crawl_one(
                    self.downloader.clone(),
                    self.extractors.clone(),
                    self.pipelines.clone(),
                    request,
                ));
            }

            let Some(joined) = in_flight.join_next().await else {
                break;
            };
            match joined {
                Ok(Step::Page {
                    records,
                    follow_ups,
                }) => {
                    stats.pages += 1;
                    stats.records += records;
                    frontier.extend(follow_ups);
                }
                Ok(Step::Failed) => stats.failed += 1,
                Ok(Step::Cancelled) => stats.cancelled += 1,
                Err(err) => {
                    harvest_error!("crawl task ended abnormally: {}", err);
                    stats.failed += 1;
                }
            }
        }

        harvest_info!(
            "crawl finished: {} pages, {} records, {} failed, {} cancelled",
            stats.pages,
            stats.records,
            stats.failed,
            stats.cancelled
        );
        stats
    }
}

async fn crawl_one(
    downloader: Arc<dyn Downloader>,
    extractors: Arc<ExtractorRegistry>,
    pipelines: Arc<PipelineRegistry>,
    request: Request,
) -> Step {
    let mut page = match downloader.download(request).await {
        Outcome::Succeeded(page) => page,
        Outcome::Failed(err) => {
            harvest_warn!("download failed: {}", err);
            return Step::Failed;
        }
        Outcome::Cancelled => return Step::Cancelled,
    };

    extractors.process(&mut page);
    let (request, batch, follow_ups) = page.into_parts();

    // Stores may block on I/O; keep them off the async workers.
    let records =
        match tokio::task::spawn_blocking(move || pipelines.dispatch(&request, &batch)).await {
            Ok(stored) => stored.unwrap_or(0),
            Err(err) => {
                harvest_error!("pipeline dispatch panicked: {}", err);
                0
            }
        };

    Step::Page {
        records,
        follow_ups,
    }
}
