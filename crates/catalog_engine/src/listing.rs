//! Category listing pages: the `{"value": "<json>"}` envelope, the ware list
//! inside it, and the pagination requests that walk a category.

use harvest_logging::{harvest_error, harvest_warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::extract::PageExtractor;
use crate::record::{Price, Sku};
use crate::request::{FieldKey, Page, Request, ROUTING_TAG_KEY};

/// Routing tag of category listing pages.
pub const LIST_PAGE: &str = "list";
/// Extras key holding the serialized [`CategoryContext`].
pub const CATEGORY_KEY: &str = "category";
/// Extras key holding the 1-based page number.
pub const PAGE_KEY: &str = "page";
/// Field under which listing pages store their valid items.
pub const SKUS: FieldKey<Vec<Sku>> = FieldKey::new("skus");

#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("payload is not valid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("envelope has no textual `value` field")]
    MissingValue,
    #[error("listing has no `wareList` array")]
    MissingWareList,
    #[error("request extras have no usable `{0}` entry")]
    MissingExtra(&'static str),
    #[error("page {0} has no successor")]
    PageOverflow(u64),
}

/// Category being walked, carried unchanged along its pagination chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryContext {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    /// Ancestor ids, top level first.
    #[serde(default)]
    pub parent_ids: Vec<i64>,
}

impl CategoryContext {
    pub fn new(id: i64, name: impl Into<String>, parent_ids: Vec<i64>) -> Self {
        Self {
            id,
            name: name.into(),
            parent_ids,
        }
    }
}

/// Builds listing requests for one search endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEndpoint {
    url: String,
}

impl ListingEndpoint {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Request for `page` of `category`, tagged as a listing page.
    pub fn request(&self, category: &CategoryContext, page: u64) -> Request {
        let context = serde_json::to_value(category).unwrap_or(Value::Null);
        self.build(category, context, page)
    }

    /// Request for the page after `current`, same category and routing tag.
    ///
    /// The category entry is copied as is, so keys this endpoint does not
    /// read still reach the next page.
    pub fn next_page(&self, current: &Request) -> Result<Request, ExtractionError> {
        let context = current
            .extra(CATEGORY_KEY)
            .cloned()
            .ok_or(ExtractionError::MissingExtra(CATEGORY_KEY))?;
        let category = CategoryContext::deserialize(&context)
            .map_err(|_| ExtractionError::MissingExtra(CATEGORY_KEY))?;
        let page = current
            .extra(PAGE_KEY)
            .and_then(Value::as_u64)
            .ok_or(ExtractionError::MissingExtra(PAGE_KEY))?;
        let next_page = page
            .checked_add(1)
            .ok_or(ExtractionError::PageOverflow(page))?;

        let next = self.build(&category, context, next_page);
        Ok(match current.routing_tag() {
            Some(tag) => next.with_extra(ROUTING_TAG_KEY, tag),
            None => next,
        })
    }

    fn build(&self, category: &CategoryContext, context: Value, page: u64) -> Request {
        let parent = |index: usize| {
            category
                .parent_ids
                .get(index)
                .map(ToString::to_string)
                .unwrap_or_default()
        };

        Request::post(self.url.as_str())
            .with_form("_format_", "json")
            .with_form("categoryId", category.id.to_string())
            .with_form("c1", parent(0))
            .with_form("c2", parent(1))
            .with_form("page", page.to_string())
            .with_routing_tag(LIST_PAGE)
            .with_extra(CATEGORY_KEY, context)
            .with_extra(PAGE_KEY, page)
    }
}

/// Decodes the outer envelope and the JSON text inside its `value` field.
pub fn decode_envelope(raw: &str) -> Result<Value, ExtractionError> {
    let outer: Value = serde_json::from_str(raw)?;
    let inner = outer
        .get("value")
        .and_then(Value::as_str)
        .ok_or(ExtractionError::MissingValue)?;
    Ok(serde_json::from_str(inner)?)
}

/// Reads every `wareList` entry, valid or not.
///
/// Fields are read leniently: numbers may arrive as JSON strings, and an
/// absent or unreadable id becomes 0 so the caller can reject the entry.
pub fn parse_ware_list(listing: &Value) -> Result<Vec<Sku>, ExtractionError> {
    let entries = listing
        .get("wareList")
        .and_then(Value::as_array)
        .ok_or(ExtractionError::MissingWareList)?;
    Ok(entries.iter().map(parse_ware).collect())
}

fn parse_ware(node: &Value) -> Sku {
    Sku {
        id: read_i64(node.get("wareId")),
        name: read_text(node.get("wname")),
        price: Price::new(read_f64(node.get("jdPrice"))),
        category_id: read_i64(node.get("catid")),
        raw: node.to_string(),
    }
}

fn read_i64(value: Option<&Value>) -> i64 {
    match value {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

fn read_f64(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

fn read_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// Extracts items from category listing pages and queues the next page while
/// the current one still yields items.
///
/// An empty page ends the chain, even if the catalog has more pages after it.
#[derive(Debug, Clone)]
pub struct WareListExtractor {
    endpoint: ListingEndpoint,
}

impl WareListExtractor {
    pub fn new(endpoint: ListingEndpoint) -> Self {
        Self { endpoint }
    }

    fn valid_skus(&self, page: &Page) -> Result<Vec<Sku>, ExtractionError> {
        let listing = decode_envelope(page.raw_text())?;
        let mut skus = parse_ware_list(&listing)?;
        skus.retain(|sku| {
            if !sku.is_valid() {
                harvest_warn!(
                    "skip ware with id 0 from {}: {}",
                    page.request().url(),
                    sku.raw
                );
            }
            sku.is_valid()
        });
        Ok(skus)
    }
}

impl PageExtractor for WareListExtractor {
    fn matches(&self, request: &Request) -> bool {
        request.is_routed_to(LIST_PAGE)
    }

    fn extract(&self, page: &mut Page) {
        let skus = self.valid_skus(page).unwrap_or_else(|err| {
            harvest_error!("fail to extract skus from {}: {}", page.request(), err);
            Vec::new()
        });

        if !skus.is_empty() {
            match self.endpoint.next_page(page.request()) {
                Ok(next) => page.add_request(next),
                Err(err) => harvest_error!("cannot continue {}: {}", page.request(), err),
            }
        }

        if let Err(err) = page.put_field(SKUS, skus) {
            harvest_warn!("{} on {}", err, page.request());
        }
    }
}
