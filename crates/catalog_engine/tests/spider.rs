use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use catalog_engine::{
    CategoryContext, CrawlSettings, CrawlStats, Downloader, ExtractorRegistry, FetchOutcome,
    FetchSettings, ListingEndpoint, MemoryStore, Outcome, Page, PipelineRegistry, Request,
    ReqwestDownloader, SkuPipeline, Spider, WareListExtractor,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn listing_body(ids: &[i64]) -> String {
    let wares: Vec<_> = ids
        .iter()
        .map(|id| json!({"wareId": id, "wname": format!("ware {id}"), "jdPrice": 1.25, "catid": 655}))
        .collect();
    json!({ "value": json!({ "wareList": wares }).to_string() }).to_string()
}

async fn mount_page(server: &MockServer, category: i64, page: u64, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path("/search"))
        .and(body_string_contains(format!("categoryId={category}").as_str()))
        .and(body_string_contains(format!("page={page}").as_str()))
        .respond_with(response)
        .expect(1)
        .mount(server)
        .await;
}

fn spider(endpoint: &ListingEndpoint, store: Arc<MemoryStore>, timeout_ms: u64) -> Spider {
    harvest_logging::initialize_for_tests();
    let downloader = ReqwestDownloader::new(FetchSettings::with_overall_timeout_ms(timeout_ms))
        .expect("downloader");
    Spider::new(
        Arc::new(downloader),
        ExtractorRegistry::new().with(WareListExtractor::new(endpoint.clone())),
        PipelineRegistry::new().with(SkuPipeline::new(store)),
        CrawlSettings::default(),
    )
}

#[tokio::test]
async fn walks_each_category_until_an_empty_page() {
    let server = MockServer::start().await;
    mount_page(&server, 655, 1, ResponseTemplate::new(200).set_body_string(listing_body(&[1, 2]))).await;
    mount_page(&server, 655, 2, ResponseTemplate::new(200).set_body_string(listing_body(&[3, 4]))).await;
    mount_page(&server, 655, 3, ResponseTemplate::new(200).set_body_string(listing_body(&[]))).await;
    mount_page(&server, 700, 1, ResponseTemplate::new(500)).await;

    let endpoint = ListingEndpoint::new(format!("{}/search", server.uri()));
    let store = Arc::new(MemoryStore::new());
    let seeds = vec![
        endpoint.request(&CategoryContext::new(655, "Phones", vec![9987, 653]), 1),
        endpoint.request(&CategoryContext::new(700, "Cameras", vec![]), 1),
    ];

    let stats = spider(&endpoint, store.clone(), 2_000).run(seeds).await;

    assert_eq!(
        stats,
        CrawlStats {
            pages: 3,
            records: 4,
            failed: 1,
            cancelled: 0,
        }
    );
    let ids: Vec<i64> = store.snapshot().iter().map(|sku| sku.id).collect();
    assert_eq!(ids, vec![1, 2, 3, 4]);
}

#[tokio::test]
async fn cancelled_page_does_not_continue_pagination() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        655,
        1,
        ResponseTemplate::new(200)
            .set_delay(Duration::from_millis(500))
            .set_body_string(listing_body(&[1])),
    )
    .await;

    let endpoint = ListingEndpoint::new(format!("{}/search", server.uri()));
    let store = Arc::new(MemoryStore::new());
    let seed = endpoint.request(&CategoryContext::new(655, "Phones", vec![]), 1);

    let stats = spider(&endpoint, store.clone(), 50).run([seed]).await;

    assert_eq!(stats.cancelled, 1);
    assert_eq!(stats.pages, 0);
    assert!(store.is_empty());
}

/// Serves canned bodies without touching the network.
struct CannedDownloader {
    calls: AtomicUsize,
}

#[async_trait::async_trait]
impl Downloader for CannedDownloader {
    async fn download(&self, request: Request) -> FetchOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Outcome::Succeeded(Page::new(request, listing_body(&[42])))
    }
}

#[tokio::test]
async fn pages_nobody_claims_are_counted_but_not_followed() {
    let downloader = Arc::new(CannedDownloader {
        calls: AtomicUsize::new(0),
    });
    let store = Arc::new(MemoryStore::new());
    let spider = Spider::new(
        downloader.clone(),
        ExtractorRegistry::new().with(WareListExtractor::new(ListingEndpoint::new(
            "https://catalog.example.com/search",
        ))),
        PipelineRegistry::new().with(SkuPipeline::new(store.clone())),
        CrawlSettings { max_in_flight: 0 },
    );

    let untagged = Request::get("https://catalog.example.com/help");
    let stats = spider.run([untagged]).await;

    assert_eq!(downloader.calls.load(Ordering::SeqCst), 1);
    assert_eq!(stats.pages, 1);
    assert_eq!(stats.records, 0);
    assert!(store.is_empty());
}
