use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use reqwest::Method;
use serde_json::{Map, Value};

/// Extras key holding the routing tag that selects an extractor/pipeline pair.
pub const ROUTING_TAG_KEY: &str = "page_type";

/// A request to download, immutable once built.
///
/// `extras` is a side channel carrying the routing tag and any pagination
/// context the extractor needs to derive follow-up requests.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    url: String,
    method: Method,
    form: BTreeMap<String, String>,
    extras: Map<String, Value>,
}

impl Request {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method,
            form: BTreeMap::new(),
            extras: Map::new(),
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn with_form(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.form.insert(key.into(), value.into());
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extras.insert(key.into(), value.into());
        self
    }

    pub fn with_routing_tag(self, tag: impl Into<String>) -> Self {
        self.with_extra(ROUTING_TAG_KEY, tag.into())
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn form(&self) -> &BTreeMap<String, String> {
        &self.form
    }

    pub fn extras(&self) -> &Map<String, Value> {
        &self.extras
    }

    pub fn extra(&self, key: &str) -> Option<&Value> {
        self.extras.get(key)
    }

    pub fn routing_tag(&self) -> Option<&str> {
        self.extra(ROUTING_TAG_KEY).and_then(Value::as_str)
    }

    /// True when the request carries exactly the given routing tag.
    pub fn is_routed_to(&self, tag: &str) -> bool {
        self.routing_tag() == Some(tag)
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)?;
        if !self.form.is_empty() {
            write!(f, " form {:?}", self.form)?;
        }
        Ok(())
    }
}

/// Typed name of a page field.
///
/// The type parameter ties the key to the value stored under it, so a
/// pipeline reading `FieldKey<Vec<Sku>>` gets back exactly what the
/// extractor stored.
pub struct FieldKey<T> {
    name: &'static str,
    marker: PhantomData<fn() -> T>,
}

impl<T> FieldKey<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            marker: PhantomData,
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for FieldKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for FieldKey<T> {}

impl<T> fmt::Debug for FieldKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FieldKey").field(&self.name).finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldError {
    #[error("field `{0}` is already set on this page")]
    AlreadySet(&'static str),
}

type FieldMap = HashMap<&'static str, Arc<dyn Any + Send + Sync>>;

/// A downloaded page together with what extraction derived from it.
///
/// Cloning shares the body and the stored fields.
#[derive(Clone)]
pub struct Page {
    request: Request,
    raw_text: Arc<str>,
    fields: FieldMap,
    new_requests: Vec<Request>,
}

impl Page {
    pub fn new(request: Request, raw_text: impl Into<Arc<str>>) -> Self {
        Self {
            request,
            raw_text: raw_text.into(),
            fields: HashMap::new(),
            new_requests: Vec::new(),
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn raw_text(&self) -> &str {
        &self.raw_text
    }

    /// Stores an extraction result. Each key can be written once.
    pub fn put_field<T>(&mut self, key: FieldKey<T>, value: T) -> Result<(), FieldError>
    where
        T: Any + Send + Sync,
    {
        if self.fields.contains_key(key.name) {
            return Err(FieldError::AlreadySet(key.name));
        }
        self.fields.insert(key.name, Arc::new(value));
        Ok(())
    }

    pub fn field<T: Any>(&self, key: FieldKey<T>) -> Option<&T> {
        self.fields.get(key.name)?.downcast_ref::<T>()
    }

    pub fn add_request(&mut self, request: Request) {
        self.new_requests.push(request);
    }

    pub fn new_requests(&self) -> &[Request] {
        &self.new_requests
    }

    /// Splits the page into its originating request, the batch handed to the
    /// pipelines and the follow-up requests, in production order.
    pub fn into_parts(self) -> (Request, ResultBatch, Vec<Request>) {
        (
            self.request,
            ResultBatch {
                fields: self.fields,
            },
            self.new_requests,
        )
    }
}

impl fmt::Debug for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Page")
            .field("request", &self.request)
            .field("raw_len", &self.raw_text.len())
            .field("fields", &self.fields.keys().collect::<Vec<_>>())
            .field("new_requests", &self.new_requests)
            .finish()
    }
}

/// Extraction output handed to the pipeline stage.
#[derive(Clone, Default)]
pub struct ResultBatch {
    fields: FieldMap,
}

impl ResultBatch {
    pub fn get<T: Any>(&self, key: FieldKey<T>) -> Option<&T> {
        self.fields.get(key.name)?.downcast_ref::<T>()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl fmt::Debug for ResultBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultBatch")
            .field("fields", &self.fields.keys().collect::<Vec<_>>())
            .finish()
    }
}
