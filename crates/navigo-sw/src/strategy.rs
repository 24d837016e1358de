//! Fetch interception: route table and caching strategies.
//!
//! Handling is a small decision table rather than nested conditionals: an
//! ordered list of predicate → strategy rows, first match wins. The
//! standard NAVIGo table is:
//!
//! 1. non-GET or cross-origin  → pass through (no custom handling)
//! 2. path prefix `/api/`      → network-first
//! 3. path prefix `/static/`   → cache-first with write-through
//! 4. everything else          → network-first with cached-root fallback

use bytes::Bytes;
use hashbrown::HashMap;
use http::{Method, StatusCode};
use tokio::sync::RwLock;
use tracing::{debug, trace, warn};
use url::Url;

use navigo_net::{same_origin, Fetcher, Request, Response};

use crate::cache::{CacheEntry, CacheStorage};
use crate::config::SwConfig;
use crate::SwError;

/// A fetch event: one outgoing request from a controlled page.
#[derive(Debug, Clone)]
pub struct FetchEvent {
    /// The request.
    pub request: Request,

    /// Client that issued the request.
    pub client_id: Option<String>,

    /// Whether this is a top-level navigation.
    pub is_navigation: bool,
}

impl FetchEvent {
    /// Create a fetch event for a request.
    pub fn new(request: Request) -> Self {
        Self {
            request,
            client_id: None,
            is_navigation: false,
        }
    }

    /// Mark as a navigation request.
    pub fn navigation(mut self) -> Self {
        self.is_navigation = true;
        self
    }

    /// Attach the issuing client.
    pub fn with_client(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }
}

/// Response produced by fetch interception.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// Response URL.
    pub url: String,

    /// Status code.
    pub status: StatusCode,

    /// Response headers.
    pub headers: HashMap<String, String>,

    /// Response body.
    pub body: Bytes,

    /// Whether this was served from cache.
    pub from_cache: bool,
}

impl FetchResponse {
    /// Build from a live network response.
    pub fn from_network(response: &Response) -> Self {
        let headers = response
            .headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        Self {
            url: response.url.to_string(),
            status: response.status,
            headers,
            body: response.body().clone(),
            from_cache: false,
        }
    }

    /// Build from a cache entry.
    pub fn from_entry(entry: &CacheEntry) -> Self {
        Self {
            url: entry.url.clone(),
            status: StatusCode::from_u16(entry.status).unwrap_or(StatusCode::OK),
            headers: entry.headers.clone(),
            body: entry.body_bytes(),
            from_cache: true,
        }
    }
}

/// Predicate deciding whether a route row applies to an event.
#[derive(Debug, Clone)]
pub enum RoutePredicate {
    /// Non-GET method or request origin differs from the worker's origin.
    NonGetOrCrossOrigin,
    /// Request path begins with the given prefix.
    PathPrefix(String),
    /// Matches everything.
    Any,
}

impl RoutePredicate {
    /// Check the predicate against an event.
    pub fn matches(&self, event: &FetchEvent, origin: &Url) -> bool {
        match self {
            RoutePredicate::NonGetOrCrossOrigin => {
                event.request.method != Method::GET || !same_origin(&event.request.url, origin)
            }
            RoutePredicate::PathPrefix(prefix) => event.request.url.path().starts_with(prefix),
            RoutePredicate::Any => true,
        }
    }
}

/// Strategy applied to a matched event.
#[derive(Debug, Clone)]
pub enum Strategy {
    /// Not handled; default platform behavior applies.
    PassThrough,
    /// Prefer the network; fall back to cache on transport failure. An
    /// optional path is consulted last when no exact entry exists.
    NetworkFirst { fallback: Option<String> },
    /// Prefer the cache; fetch and store on miss.
    CacheFirst,
}

/// One row of the decision table.
#[derive(Debug, Clone)]
pub struct Route {
    pub predicate: RoutePredicate,
    pub strategy: Strategy,
}

/// Ordered decision table; first matching row wins.
#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    /// Build the standard NAVIGo table from configuration.
    pub fn for_config(config: &SwConfig) -> Self {
        Self {
            routes: vec![
                Route {
                    predicate: RoutePredicate::NonGetOrCrossOrigin,
                    strategy: Strategy::PassThrough,
                },
                Route {
                    predicate: RoutePredicate::PathPrefix("/api/".to_string()),
                    strategy: Strategy::NetworkFirst { fallback: None },
                },
                Route {
                    predicate: RoutePredicate::PathPrefix("/static/".to_string()),
                    strategy: Strategy::CacheFirst,
                },
                Route {
                    predicate: RoutePredicate::Any,
                    strategy: Strategy::NetworkFirst {
                        fallback: config.navigation_fallback.clone(),
                    },
                },
            ],
        }
    }

    /// Pick the strategy for an event. The table always terminates in an
    /// `Any` row, so a strategy is always found.
    pub fn decide(&self, event: &FetchEvent, origin: &Url) -> &Strategy {
        for route in &self.routes {
            if route.predicate.matches(event, origin) {
                trace!(
                    url = %event.request.url,
                    predicate = ?route.predicate,
                    "Route matched"
                );
                return &route.strategy;
            }
        }
        // Unreachable with a well-formed table; treat as unhandled.
        static UNMATCHED: Strategy = Strategy::PassThrough;
        &UNMATCHED
    }
}

/// Execute a strategy for an event.
///
/// `Ok(None)` means the event is not handled and default platform behavior
/// applies. Errors surface to the requester as a network failure; no
/// synthetic error responses are produced.
pub async fn run_strategy(
    strategy: &Strategy,
    event: &FetchEvent,
    fetcher: &dyn Fetcher,
    caches: &RwLock<CacheStorage>,
    cache_name: &str,
    origin: &Url,
) -> Result<Option<FetchResponse>, SwError> {
    match strategy {
        Strategy::PassThrough => Ok(None),

        Strategy::NetworkFirst { fallback } => {
            match fetcher.fetch(event.request.clone()).await {
                Ok(response) => {
                    trace!(url = %event.request.url, status = %response.status, "Network-first: live response");
                    Ok(Some(FetchResponse::from_network(&response)))
                }
                Err(err) => {
                    debug!(url = %event.request.url, error = %err, "Network-first: falling back to cache");
                    let caches = caches.read().await;
                    if let Some(entry) = caches.match_request(event.request.url.as_str()) {
                        return Ok(Some(FetchResponse::from_entry(entry)));
                    }
                    if let Some(path) = fallback {
                        let fallback_url = origin
                            .join(path)
                            .map_err(|e| SwError::StateError(e.to_string()))?;
                        if let Some(entry) = caches.match_request(fallback_url.as_str()) {
                            warn!(
                                url = %event.request.url,
                                fallback = %fallback_url,
                                "Serving cached fallback for failed navigation"
                            );
                            return Ok(Some(FetchResponse::from_entry(entry)));
                        }
                    }
                    Err(SwError::NetworkError(err.to_string()))
                }
            }
        }

        Strategy::CacheFirst => {
            {
                let caches = caches.read().await;
                if let Some(entry) = caches.match_request(event.request.url.as_str()) {
                    trace!(url = %event.request.url, "Cache-first: hit");
                    return Ok(Some(FetchResponse::from_entry(entry)));
                }
            }

            let response = fetcher
                .fetch(event.request.clone())
                .await
                .map_err(|e| SwError::NetworkError(e.to_string()))?;

            // Store a copy before handing the response back; Bytes bodies
            // make the copy a refcount bump.
            let entry = CacheEntry::from_response(&event.request.url, &response);
            let mut caches = caches.write().await;
            caches
                .open(cache_name)
                .put(event.request.url.as_str(), entry);

            trace!(url = %event.request.url, "Cache-first: miss stored");
            Ok(Some(FetchResponse::from_network(&response)))
        }
    }
}
