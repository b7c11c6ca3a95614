use harvest_logging::harvest_debug;

use crate::request::{Page, Request};

/// One page extractor in an [`ExtractorRegistry`].
///
/// `extract` may only touch the page's fields and follow-up requests, and
/// must not panic or fail: decoding problems are logged and turned into an
/// empty result.
pub trait PageExtractor: Send + Sync {
    fn matches(&self, request: &Request) -> bool;
    fn extract(&self, page: &mut Page);
}

/// Ordered list of extractors. The first one whose predicate accepts the
/// page's request runs; the rest are skipped.
#[derive(Default)]
pub struct ExtractorRegistry {
    extractors: Vec<Box<dyn PageExtractor>>,
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, extractor: impl PageExtractor + 'static) -> &mut Self {
        self.extractors.push(Box::new(extractor));
        self
    }

    pub fn with(mut self, extractor: impl PageExtractor + 'static) -> Self {
        self.register(extractor);
        self
    }

    pub fn len(&self) -> usize {
        self.extractors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extractors.is_empty()
    }

    /// Runs the first matching extractor. Returns `false` when none matched,
    /// in which case the page is left untouched.
    pub fn process(&self, page: &mut Page) -> bool {
        match self
            .extractors
            .iter()
            .find(|extractor| extractor.matches(page.request()))
        {
            Some(extractor) => {
                extractor.extract(page);
                true
            }
            None => {
                harvest_debug!("no extractor for {}", page.request());
                false
            }
        }
    }
}
