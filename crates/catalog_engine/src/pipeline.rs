use std::sync::Arc;

use harvest_logging::{harvest_debug, harvest_error};

use crate::listing::{LIST_PAGE, SKUS};
use crate::request::{Request, ResultBatch};
use crate::store::CatalogStore;

/// One result handler in a [`PipelineRegistry`].
pub trait ResultPipeline: Send + Sync {
    fn matches(&self, request: &Request) -> bool;
    /// Persists `batch` and returns how many records were stored.
    fn persist(&self, batch: &ResultBatch) -> usize;
}

/// Ordered list of pipelines, dispatched first-match like the extractors.
#[derive(Default)]
pub struct PipelineRegistry {
    pipelines: Vec<Box<dyn ResultPipeline>>,
}

impl PipelineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, pipeline: impl ResultPipeline + 'static) -> &mut Self {
        self.pipelines.push(Box::new(pipeline));
        self
    }

    pub fn with(mut self, pipeline: impl ResultPipeline + 'static) -> Self {
        self.register(pipeline);
        self
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }

    /// Hands `batch` to the first pipeline matching `request` and returns the
    /// number of records it stored, or `None` when no pipeline matched.
    pub fn dispatch(&self, request: &Request, batch: &ResultBatch) -> Option<usize> {
        match self
            .pipelines
            .iter()
            .find(|pipeline| pipeline.matches(request))
        {
            Some(pipeline) => Some(pipeline.persist(batch)),
            None => {
                harvest_debug!("no pipeline for {}", request);
                None
            }
        }
    }
}

/// Saves listing items one by one, in list order.
///
/// Each item gets a single save attempt; a failed save is logged and the
/// remaining items are still saved.
pub struct SkuPipeline {
    store: Arc<dyn CatalogStore>,
}

impl SkuPipeline {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self { store }
    }
}

impl ResultPipeline for SkuPipeline {
    fn matches(&self, request: &Request) -> bool {
        request.is_routed_to(LIST_PAGE)
    }

    fn persist(&self, batch: &ResultBatch) -> usize {
        let Some(skus) = batch.get(SKUS) else {
            return 0;
        };
        skus.iter()
            .filter(|sku| match self.store.save(sku) {
                Ok(()) => true,
                Err(err) => {
                    harvest_error!("fail to save sku {}: {}", sku.id, err);
                    false
                }
            })
            .count()
    }
}
