//! Inbound request model and downstream request construction.
//!
//! # Responsibilities
//! - Hold the buffered inbound request shared by every fan-out call
//! - Expand a target's path template with the matched parameters
//! - Shape forwarded headers (hop-by-hop removal, forwarding headers)

use std::net::SocketAddr;

use axum::body::Bytes;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, Uri};

use crate::dispatch::client::DownstreamRequest;
use crate::routing::definition::CompiledTarget;
use crate::routing::template::Params;

pub const X_REQUEST_ID: &str = "x-request-id";
pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
pub const X_FORWARDED_HOST: &str = "x-forwarded-host";

const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// A buffered client request as seen by the dispatcher.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub host: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub request_id: Option<String>,
    pub client_addr: Option<SocketAddr>,
}

impl InboundRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: None,
            host: None,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            request_id: None,
            client_addr: None,
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }
}

/// Remove hop-by-hop headers, including any named by `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in &named {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

/// Headers sent to a downstream target for `inbound`.
pub fn forwarded_headers(inbound: &InboundRequest) -> HeaderMap {
    let mut headers = inbound.headers.clone();
    strip_hop_by_hop(&mut headers);
    headers.remove(header::HOST);
    headers.remove(header::CONTENT_LENGTH);

    if let Some(id) = inbound
        .request_id
        .as_deref()
        .and_then(|id| HeaderValue::from_str(id).ok())
    {
        headers.insert(X_REQUEST_ID, id);
    }

    if let Some(addr) = inbound.client_addr {
        let ip = addr.ip().to_string();
        let value = match headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
            Some(existing) => format!("{existing}, {ip}"),
            None => ip,
        };
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(X_FORWARDED_FOR, value);
        }
    }

    if let Some(host) = inbound
        .host
        .as_deref()
        .and_then(|h| HeaderValue::from_str(h).ok())
    {
        headers.insert(X_FORWARDED_HOST, host);
    }

    headers
}

/// Build the request for one target. Fails if the path cannot be expanded
/// or the resulting URI is invalid.
pub fn build_downstream_request(
    target: &CompiledTarget,
    params: &Params,
    inbound: &InboundRequest,
) -> Result<DownstreamRequest, String> {
    let path = target
        .path
        .expand(params)
        .ok_or_else(|| format!("cannot expand '{}'", target.path.as_str()))?;

    let path_and_query = match inbound.query.as_deref() {
        Some(q) if !q.is_empty() => format!("{path}?{q}"),
        _ => path,
    };

    let uri = Uri::builder()
        .scheme(target.target.scheme.as_str())
        .authority(target.target.authority())
        .path_and_query(path_and_query)
        .build()
        .map_err(|e| e.to_string())?;

    Ok(DownstreamRequest {
        method: inbound.method.clone(),
        uri,
        headers: forwarded_headers(inbound),
        body: inbound.body.clone(),
    })
}
