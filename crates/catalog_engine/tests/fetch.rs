use std::time::Duration;

use catalog_engine::{
    Downloader, FailureKind, FetchSettings, Method, Outcome, Request, ReqwestDownloader,
    FORM_CONTENT_TYPE,
};
use pretty_assertions::assert_eq;
use wiremock::matchers::{body_string, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn downloader(timeout_ms: u64) -> ReqwestDownloader {
    harvest_logging::initialize_for_tests();
    ReqwestDownloader::new(FetchSettings::with_overall_timeout_ms(timeout_ms)).expect("downloader")
}

#[tokio::test]
async fn get_returns_page_and_sends_no_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/list"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{\"value\":\"{}\"}"))
        .mount(&server)
        .await;

    let url = format!("{}/list", server.uri());
    let outcome = downloader(2_000).download(Request::get(&url)).await;

    let page = outcome.succeeded().expect("page");
    assert_eq!(page.raw_text(), "{\"value\":\"{}\"}");
    assert_eq!(page.request().url(), url);
    assert!(page.new_requests().is_empty());

    let received = server.received_requests().await.unwrap();
    assert_eq!(received.len(), 1);
    assert!(received[0].body.is_empty());
}

#[tokio::test]
async fn post_sends_url_encoded_utf8_form() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/search"))
        .and(header("content-type", FORM_CONTENT_TYPE))
        .and(body_string("categoryId=5&keyword=caf%C3%A9+bar"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&server)
        .await;

    let request = Request::post(format!("{}/search", server.uri()))
        .with_form("keyword", "café bar")
        .with_form("categoryId", "5");
    let outcome = downloader(2_000).download(request).await;

    assert_eq!(outcome.succeeded().map(|page| page.raw_text().to_string()), Some("ok".into()));
}

#[tokio::test]
async fn non_ok_status_fails_with_that_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/created"))
        .respond_with(ResponseTemplate::new(201).set_body_string("not a listing"))
        .mount(&server)
        .await;

    let downloader = downloader(2_000);
    let missing = downloader
        .download(Request::get(format!("{}/missing", server.uri())))
        .await;
    assert_eq!(missing.failed().unwrap().kind, FailureKind::HttpStatus(404));

    let created = downloader
        .download(Request::get(format!("{}/created", server.uri())))
        .await;
    assert_eq!(created.failed().unwrap().kind, FailureKind::HttpStatus(201));
}

#[tokio::test]
async fn unsupported_method_fails_without_network_call() {
    let server = MockServer::start().await;
    Mock::given(wiremock::matchers::any())
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let request = Request::new(Method::PUT, format!("{}/list", server.uri()));
    let outcome = downloader(2_000).download(request).await;

    assert_eq!(
        outcome.failed().unwrap().kind,
        FailureKind::UnsupportedMethod("PUT".to_string())
    );
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn invalid_utf8_body_is_a_decoding_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(vec![0x41, 0xff, 0xfe], "text/plain"))
        .mount(&server)
        .await;

    let outcome = downloader(2_000).download(Request::get(server.uri())).await;
    assert_eq!(outcome.failed().unwrap().kind, FailureKind::Decoding);
}

#[tokio::test]
async fn refused_connection_is_a_transport_error() {
    let outcome = downloader(2_000)
        .download(Request::get("http://127.0.0.1:1/list"))
        .await;
    assert_eq!(outcome.failed().unwrap().kind, FailureKind::Transport);
}

#[tokio::test]
async fn malformed_url_is_rejected() {
    let outcome = downloader(2_000).download(Request::get("not a url")).await;
    assert_eq!(outcome.failed().unwrap().kind, FailureKind::InvalidUrl);
}

#[tokio::test]
async fn slow_response_is_cancelled_and_stays_cancelled() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_millis(400))
                .set_body_string("too late"),
        )
        .mount(&server)
        .await;

    let downloader = downloader(50);
    let promise = downloader.submit(Request::get(server.uri()));
    assert!(promise.wait().await.is_cancelled());

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert!(promise.peek().unwrap().is_cancelled());
    assert!(!promise.succeed(catalog_engine::Page::new(Request::get(server.uri()), "late")));
}

#[tokio::test]
async fn zero_timeout_disables_the_deadline() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_millis(100))
                .set_body_string("eventually"),
        )
        .mount(&server)
        .await;

    let outcome = downloader(0).download(Request::get(server.uri())).await;
    assert!(matches!(outcome, Outcome::Succeeded(ref page) if page.raw_text() == "eventually"));
}

#[tokio::test]
async fn concurrent_downloads_share_one_downloader() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("same"))
        .expect(8)
        .mount(&server)
        .await;

    let downloader = std::sync::Arc::new(downloader(2_000));
    let mut tasks = Vec::new();
    for i in 0..8 {
        let downloader = downloader.clone();
        let url = format!("{}/item/{i}", server.uri());
        tasks.push(tokio::spawn(async move { downloader.download(Request::get(url)).await }));
    }
    for task in tasks {
        assert!(task.await.unwrap().succeeded().is_some());
    }
}

#[tokio::test]
async fn closing_the_downloader_cancels_in_flight_downloads() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_millis(1_500))
                .set_body_string("never seen"),
        )
        .mount(&server)
        .await;

    // Deadline far beyond the response delay: only the close can end it early.
    let downloader = downloader(60_000);
    let promise = downloader.submit(Request::get(server.uri()));
    tokio::time::sleep(Duration::from_millis(50)).await;
    downloader.close();

    let outcome = tokio::time::timeout(Duration::from_millis(500), promise.wait())
        .await
        .expect("close resolves pending downloads");
    assert!(outcome.is_cancelled());

    tokio::time::sleep(Duration::from_millis(1_600)).await;
    assert!(promise.peek().unwrap().is_cancelled());
}

#[tokio::test]
async fn closing_leaves_resolved_downloads_alone() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("done"))
        .mount(&server)
        .await;

    let downloader = downloader(2_000);
    let promise = downloader.submit(Request::get(server.uri()));
    let outcome = promise.wait().await;
    downloader.close();

    assert_eq!(
        outcome.succeeded().map(|p| p.raw_text().to_string()),
        Some("done".to_string())
    );
    assert!(!promise.peek().unwrap().is_cancelled());
}

#[tokio::test]
async fn observers_share_one_page_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(64 * 1024)))
        .mount(&server)
        .await;

    let downloader = downloader(2_000);
    let promise = downloader.submit(Request::get(server.uri()));
    let first = promise.wait().await.succeeded().expect("page");
    let second = promise.wait().await.succeeded().expect("page");

    assert_eq!(first.raw_text().len(), 64 * 1024);
    assert!(std::ptr::eq(first.raw_text().as_ptr(), second.raw_text().as_ptr()));
}
