use std::collections::BTreeMap;
use std::time::Duration;

use futures_util::StreamExt;
use harvest_logging::{harvest_debug, harvest_info};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, StatusCode};
use tokio_util::sync::CancellationToken;

use crate::promise::CancellablePromise;
use crate::request::{Page, Request};
use crate::scheduler::DeadlineScheduler;
use crate::{FailureKind, FetchError, FetchOutcome};

/// Content type sent with POST form bodies.
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=UTF-8";

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub connect_timeout: Duration,
    /// Deadline for a whole download. Zero disables it.
    pub overall_timeout: Duration,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            overall_timeout: Duration::from_secs(30),
        }
    }
}

impl FetchSettings {
    pub fn with_overall_timeout_ms(timeout_ms: u64) -> Self {
        Self {
            overall_timeout: Duration::from_millis(timeout_ms),
            ..Self::default()
        }
    }
}

#[async_trait::async_trait]
pub trait Downloader: Send + Sync {
    /// Downloads one request. Resolves exactly once.
    async fn download(&self, request: Request) -> FetchOutcome;
}

/// Downloader backed by one shared reqwest connection pool and one shared
/// deadline thread.
///
/// The downloader keeps no per-request state. Dropping it (or calling
/// [`ReqwestDownloader::close`]) cancels every download still in flight and
/// stops the deadline thread.
pub struct ReqwestDownloader {
    client: reqwest::Client,
    settings: FetchSettings,
    scheduler: DeadlineScheduler,
    shutdown: CancellationToken,
}

impl ReqwestDownloader {
    pub fn new(settings: FetchSettings) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .build()
            .map_err(|err| FetchError::new(FailureKind::Transport, err.to_string()))?;
        let scheduler = DeadlineScheduler::start()
            .map_err(|err| FetchError::new(FailureKind::Transport, err.to_string()))?;
        Ok(Self {
            client,
            settings,
            scheduler,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn settings(&self) -> &FetchSettings {
        &self.settings
    }

    /// Starts a download and returns its promise without waiting.
    ///
    /// Must be called from within a tokio runtime; the HTTP exchange runs on
    /// that runtime's workers.
    pub fn submit(&self, request: Request) -> CancellablePromise<Page, FetchError> {
        let promise = CancellablePromise::new();

        let builder = match self.build_request(&request) {
            Ok(builder) => builder,
            Err(err) => {
                promise.fail(err);
                return promise;
            }
        };
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(err) => {
                promise.fail(FetchError::new(FailureKind::Transport, err.to_string()));
                return promise;
            }
        };

        harvest_info!(
            "start downloading {} method {} form {:?}",
            request.url(),
            request.method(),
            request.form()
        );
        let url = request.url().to_string();
        let task = runtime.spawn(guarded(
            self.shutdown.clone(),
            builder,
            request,
            promise.clone(),
        ));

        let deadline = self.settings.overall_timeout;
        if !deadline.is_zero() {
            let watched = promise.downgrade();
            let abort = task.abort_handle();
            let scheduled = self.scheduler.schedule(deadline, move || {
                // A resolved and dropped promise leaves nothing to cancel.
                let Some(watched) = watched.upgrade() else {
                    return;
                };
                // `cancel` only succeeds while the promise is still pending.
                if !watched.is_done() && watched.cancel() {
                    abort.abort();
                    harvest_info!("cancelled downloading {} after {:?}", url, deadline);
                }
            });
            if !scheduled {
                harvest_debug!("deadline scheduler is closed; no deadline for this download");
            }
        }

        promise
    }

    /// Cancels every in-flight download, then stops the deadline thread.
    /// Dropping the downloader does the same.
    pub fn close(self) {
        drop(self);
    }

    fn build_request(&self, request: &Request) -> Result<reqwest::RequestBuilder, FetchError> {
        let method = request.method();
        if *method != Method::GET && *method != Method::POST {
            return Err(FetchError::new(
                FailureKind::UnsupportedMethod(method.to_string()),
                format!("{method} is not supported"),
            ));
        }

        let url = reqwest::Url::parse(request.url())
            .map_err(|err| FetchError::new(FailureKind::InvalidUrl, err.to_string()))?;

        if *method == Method::GET {
            Ok(self.client.get(url))
        } else {
            Ok(self
                .client
                .post(url)
                .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
                .body(encode_form(request.form())))
        }
    }
}

impl Drop for ReqwestDownloader {
    fn drop(&mut self) {
        self.shutdown.cancel();
        self.scheduler.shutdown();
    }
}

#[async_trait::async_trait]
impl Downloader for ReqwestDownloader {
    async fn download(&self, request: Request) -> FetchOutcome {
        self.submit(request).wait().await
    }
}

/// URL-encodes form fields as UTF-8, in key order.
pub fn encode_form(form: &BTreeMap<String, String>) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(form.iter())
        .finish()
}

// Dropping `execute` on shutdown aborts its exchange and releases the
// connection.
async fn guarded(
    shutdown: CancellationToken,
    builder: reqwest::RequestBuilder,
    request: Request,
    promise: CancellablePromise<Page, FetchError>,
) {
    let url = request.url().to_string();
    let watched = promise.clone();
    tokio::select! {
        biased;
        _ = shutdown.cancelled() => {
            if watched.cancel() {
                harvest_info!("cancelled downloading {} on shutdown", url);
            }
        }
        _ = execute(builder, request, promise) => {}
    }
}

// Every early return drops the response, which hands its connection back to
// the pool or discards it. Aborting this task on deadline does the same.
async fn execute(
    builder: reqwest::RequestBuilder,
    request: Request,
    promise: CancellablePromise<Page, FetchError>,
) {
    let response = match builder.send().await {
        Ok(response) => response,
        Err(err) => {
            harvest_info!(
                "fail downloading {} method {} form {:?}: {}",
                request.url(),
                request.method(),
                request.form(),
                err
            );
            promise.fail(FetchError::new(FailureKind::Transport, err.to_string()));
            return;
        }
    };

    let status = response.status();
    harvest_info!(
        "finish downloading {} method {} form {:?} status {}",
        request.url(),
        request.method(),
        request.form(),
        status.as_u16()
    );

    if status != StatusCode::OK {
        drop(response);
        promise.fail(FetchError::new(
            FailureKind::HttpStatus(status.as_u16()),
            format!("{} returned {}", request.url(), status),
        ));
        return;
    }

    match read_body(response).await {
        Ok(text) => {
            promise.succeed(Page::new(request, text));
        }
        Err(err) => {
            promise.fail(err);
        }
    }
}

async fn read_body(response: reqwest::Response) -> Result<String, FetchError> {
    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|err| FetchError::new(FailureKind::Decoding, err.to_string()))?;
        bytes.extend_from_slice(&chunk);
    }

    encoding_rs::UTF_8
        .decode_without_bom_handling_and_without_replacement(&bytes)
        .map(|text| text.into_owned())
        .ok_or_else(|| FetchError::new(FailureKind::Decoding, "body is not valid UTF-8"))
}

