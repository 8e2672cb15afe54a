// File: architect-broker/src/policy.rs
// Purpose: Decide how an intercepted request is handled

use http::Method;
use url::{Origin, Url};

use crate::request::BrokerRequest;

/// Handling strategy for one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
    /// Forwarded untouched: cross-origin traffic and non-API writes
    PassThrough,

    /// Same-origin page or asset read: network, then cache, then offline page / 503
    PageRead,

    /// Same-origin API read: network, then cache, then fallback table
    ApiRead,

    /// Same-origin API write: network, then durable queue + optimistic ack
    ApiWrite,
}

impl RequestClass {
    pub fn is_intercepted(self) -> bool {
        self != Self::PassThrough
    }
}

/// Classifies requests against the application origin and API prefix
#[derive(Debug, Clone)]
pub struct InterceptPolicy {
    origin: Origin,
    api_prefix: String,
}

impl InterceptPolicy {
    pub fn new(origin: &Url, api_prefix: impl Into<String>) -> Self {
        Self {
            origin: origin.origin(),
            api_prefix: api_prefix.into(),
        }
    }

    pub fn api_prefix(&self) -> &str {
        &self.api_prefix
    }

    pub fn is_same_origin(&self, url: &Url) -> bool {
        url.origin() == self.origin
    }

    pub fn is_api(&self, url: &Url) -> bool {
        url.path().starts_with(&self.api_prefix)
    }

    pub fn classify(&self, request: &BrokerRequest) -> RequestClass {
        if !self.is_same_origin(&request.url) {
            return RequestClass::PassThrough;
        }

        let api = self.is_api(&request.url);
        match (request.method == Method::GET, api) {
            (true, false) => RequestClass::PageRead,
            (true, true) => RequestClass::ApiRead,
            (false, true) => RequestClass::ApiWrite,
            (false, false) => RequestClass::PassThrough,
        }
    }
}

/// `rest` equals `pattern` or continues with a '/'
pub(crate) fn segment_prefix(rest: &str, pattern: &str) -> bool {
    match rest.strip_prefix(pattern) {
        Some("") => true,
        Some(tail) => tail.starts_with('/'),
        None => false,
    }
}

/// Part of `path` below the API prefix, without a leading '/'
pub(crate) fn api_relative<'a>(api_prefix: &str, path: &'a str) -> Option<&'a str> {
    let rest = path.strip_prefix(api_prefix.trim_end_matches('/'))?;
    match rest.strip_prefix('/') {
        Some(rest) => Some(rest),
        None if rest.is_empty() => Some(rest),
        None => None,
    }
}
