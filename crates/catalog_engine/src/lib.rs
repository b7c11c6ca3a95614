//! Catalog engine: download, extraction and persistence pipeline for paginated
//! catalog listings.
mod engine;
mod extract;
mod fetch;
mod listing;
mod pipeline;
mod promise;
mod record;
mod request;
mod scheduler;
mod store;
mod types;

pub use engine::{CrawlSettings, CrawlStats, Spider};
pub use extract::{ExtractorRegistry, PageExtractor};
pub use fetch::{encode_form, Downloader, FetchSettings, ReqwestDownloader, FORM_CONTENT_TYPE};
pub use listing::{
    decode_envelope, parse_ware_list, CategoryContext, ExtractionError, ListingEndpoint,
    WareListExtractor, CATEGORY_KEY, LIST_PAGE, PAGE_KEY, SKUS,
};
pub use pipeline::{PipelineRegistry, ResultPipeline, SkuPipeline};
pub use promise::{CancellablePromise, Outcome, WeakPromise};
pub use record::{Price, Sku};
pub use request::{FieldError, FieldKey, Page, Request, ResultBatch, ROUTING_TAG_KEY};
pub use scheduler::DeadlineScheduler;
pub use store::{ensure_output_dir, CatalogStore, JsonLinesStore, MemoryStore, StorageError};
pub use types::{FailureKind, FetchError, FetchOutcome};

/// HTTP method type used by [`Request`].
pub use reqwest::Method;
