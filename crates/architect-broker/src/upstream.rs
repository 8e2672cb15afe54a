// File: architect-broker/src/upstream.rs
// Purpose: The network side of the broker

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use std::str::FromStr;

use crate::error::UpstreamError;
use crate::request::{BrokerRequest, BrokerResponse};
use crate::store::PendingAction;

/// Hop-by-hop headers never forwarded in either direction
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "transfer-encoding",
    "upgrade",
    "te",
    "trailer",
    "host",
    "content-length",
];

/// Anything that can perform a request against the network.
///
/// An `Err` means no response arrived at all. Non-2xx statuses are
/// successful exchanges and come back as `Ok`.
#[async_trait]
pub trait Upstream: Send + Sync {
    async fn fetch(&self, request: &BrokerRequest) -> Result<BrokerResponse, UpstreamError>;
}

/// Real network access through reqwest
///
/// Redirects are handed back to the page untouched, together with their
/// `Set-Cookie` and `Location` headers.
#[derive(Clone)]
pub struct HttpUpstream {
    client: reqwest::Client,
}

impl HttpUpstream {
    pub fn new() -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn fetch(&self, request: &BrokerRequest) -> Result<BrokerResponse, UpstreamError> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone())
            .body(request.body.clone());

        for (name, value) in request.headers.iter() {
            if !is_hop_by_hop(name) {
                builder = builder.header(name, value);
            }
        }

        let response = builder
            .send()
            .await
            .map_err(|e| UpstreamError::Network(e.to_string()))?;

        let status = response.status();
        let mut headers = HeaderMap::new();
        for (name, value) in response.headers().iter() {
            if !is_hop_by_hop(name) {
                headers.append(name.clone(), value.clone());
            }
        }

        // A body cut off mid-stream counts as a network failure
        let body = response
            .bytes()
            .await
            .map_err(|e| UpstreamError::Network(e.to_string()))?;

        Ok(BrokerResponse {
            status,
            headers,
            body,
        })
    }
}

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(&name.as_str())
}

/// Rebuild the original request from a queued action
pub fn replay_request(action: &PendingAction) -> Result<BrokerRequest, UpstreamError> {
    let method = Method::from_str(&action.method)
        .map_err(|e| UpstreamError::InvalidRequest(e.to_string()))?;
    let url = url::Url::parse(&action.url)
        .map_err(|e| UpstreamError::InvalidRequest(e.to_string()))?;

    Ok(BrokerRequest {
        method,
        url,
        headers: header_map(&action.headers),
        body: Bytes::from(action.body.clone()),
    })
}

/// Repeated names are appended, never overwritten
fn header_map(headers: &[(String, String)]) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            map.append(name, value);
        }
    }
    map
}
