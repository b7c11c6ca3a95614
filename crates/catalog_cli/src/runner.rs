use std::sync::Arc;

use anyhow::Context;
use catalog_engine::{
    CrawlStats, ExtractorRegistry, JsonLinesStore, ListingEndpoint, PipelineRegistry,
    ReqwestDownloader, SkuPipeline, Spider, WareListExtractor,
};
use harvest_logging::{harvest_error, harvest_info, harvest_warn};

use crate::config::HarvestConfig;

/// Crawls every configured category from its first page and appends the
/// harvested items to the JSON-lines output.
pub(crate) async fn run(config: &HarvestConfig) -> anyhow::Result<CrawlStats> {
    if config.categories.is_empty() {
        harvest_warn!("No categories configured; nothing to harvest");
        return Ok(CrawlStats::default());
    }

    let store = Arc::new(
        JsonLinesStore::open(&config.output_dir, &config.output_file)
            .context("opening output store")?,
    );
    let downloader =
        Arc::new(ReqwestDownloader::new(config.fetch_settings()).context("creating downloader")?);
    let endpoint = ListingEndpoint::new(config.listing_endpoint.as_str());

    let spider = Spider::new(
        downloader.clone(),
        ExtractorRegistry::new().with(WareListExtractor::new(endpoint.clone())),
        PipelineRegistry::new().with(SkuPipeline::new(store.clone())),
        config.crawl_settings(),
    );

    let seeds: Vec<_> = config
        .categories
        .iter()
        .map(|category| endpoint.request(category, 1))
        .collect();
    harvest_info!("Harvesting {} categories from {}", seeds.len(), endpoint.url());

    let stats = spider.run(seeds).await;
    drop(spider);

    if let Err(err) = store.flush() {
        harvest_error!("Failed to flush {:?}: {}", store.path(), err);
    }
    if let Ok(downloader) = Arc::try_unwrap(downloader) {
        downloader.close();
    }
    Ok(stats)
}
