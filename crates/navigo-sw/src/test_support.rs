//! Canned fetch backend for tests: routed responses, a reachability
//! switch to simulate going offline, and a call log for asserting that a
//! strategy did (or did not) hit the network.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use http::StatusCode;

use navigo_net::{Fetcher, NetError, Request, Response};

pub(crate) struct MockFetcher {
    routes: Mutex<HashMap<String, (u16, Vec<u8>)>>,
    reachable: AtomicBool,
    calls: Mutex<Vec<String>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self {
            routes: Mutex::new(HashMap::new()),
            reachable: AtomicBool::new(true),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Serve `status`/`body` for an exact URL. Unrouted URLs get a 404.
    pub fn route(&self, url: &str, status: u16, body: &[u8]) {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), (status, body.to_vec()));
    }

    /// Flip the simulated network on or off.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Number of fetches issued for a URL.
    pub fn calls_for(&self, url: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|u| u.as_str() == url)
            .count()
    }

    /// Total number of fetches issued.
    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, request: Request) -> Result<Response, NetError> {
        if !self.reachable.load(Ordering::SeqCst) {
            return Err(NetError::RequestFailed("network unreachable".to_string()));
        }

        self.calls.lock().unwrap().push(request.url.to_string());

        let routes = self.routes.lock().unwrap();
        match routes.get(request.url.as_str()) {
            Some((status, body)) => Ok(Response::new(
                request.id,
                request.url.clone(),
                StatusCode::from_u16(*status).unwrap_or(StatusCode::OK),
                Bytes::from(body.clone()),
            )),
            None => Ok(Response::new(
                request.id,
                request.url.clone(),
                StatusCode::NOT_FOUND,
                Bytes::new(),
            )),
        }
    }
}
