//! NAVIGo Smoke Harness
//!
//! Exercises the offline subsystem against a live NAVIGo origin: registers
//! the cache worker (precaching the manifest), replays a scripted set of
//! fetches through the interception path, and prints a JSON timing summary.
//!
//! Usage:
//!   navigo-smoke <origin> [--config <path>] [--json-logs]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use tracing::{error, info};
use url::Url;

use navigo_common::{init_logging, LogConfig};
use navigo_net::{HttpFetcher, LoaderConfig, Request};
use navigo_sw::{FetchEvent, ServiceWorkerContainer, SwConfig};

/// Performance timing collector for tracking operation durations.
struct PerfTiming {
    timings: HashMap<&'static str, Vec<Duration>>,
}

impl PerfTiming {
    fn new() -> Self {
        Self {
            timings: HashMap::new(),
        }
    }

    fn record(&mut self, operation: &'static str, duration: Duration) {
        self.timings.entry(operation).or_default().push(duration);
    }

    fn summary(&self) -> serde_json::Value {
        let mut summary = serde_json::Map::new();

        for (op, durations) in &self.timings {
            if durations.is_empty() {
                continue;
            }

            let count = durations.len();
            let total_ms: f64 = durations.iter().map(|d| d.as_secs_f64() * 1000.0).sum();
            let avg_ms = total_ms / count as f64;

            summary.insert(
                op.to_string(),
                json!({
                    "count": count,
                    "total_ms": (total_ms * 100.0).round() / 100.0,
                    "avg_ms": (avg_ms * 100.0).round() / 100.0,
                }),
            );
        }

        serde_json::Value::Object(summary)
    }
}

/// Parsed command line arguments.
struct Args {
    origin: String,
    config_path: Option<String>,
    json_logs: bool,
}

fn parse_args() -> Option<Args> {
    let mut args = std::env::args().skip(1);
    let origin = args.next()?;

    let mut config_path = None;
    let mut json_logs = false;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => config_path = args.next(),
            "--json-logs" => json_logs = true,
            _ => return None,
        }
    }

    Some(Args {
        origin,
        config_path,
        json_logs,
    })
}

#[tokio::main]
async fn main() {
    let Some(args) = parse_args() else {
        eprintln!("usage: navigo-smoke <origin> [--config <path>] [--json-logs]");
        std::process::exit(2);
    };

    let log_config = if args.json_logs {
        LogConfig::production()
    } else {
        LogConfig::default()
    };
    init_logging(log_config);

    match run(&args).await {
        Ok(summary) => {
            println!("{}", serde_json::to_string_pretty(&summary).unwrap_or_default());
        }
        Err(err) => {
            error!(error = %err, "Smoke run failed");
            std::process::exit(1);
        }
    }
}

async fn run(args: &Args) -> Result<serde_json::Value, Box<dyn std::error::Error>> {
    let origin = Url::parse(&args.origin)?;

    let sw_config = match &args.config_path {
        Some(path) => SwConfig::from_json_file(path)?,
        None => SwConfig::default(),
    };
    let cache_name = sw_config.cache_name.clone();
    let precache_count = sw_config.precache.len();

    let fetcher = Arc::new(HttpFetcher::new(LoaderConfig::default())?);
    let (container, _events) = ServiceWorkerContainer::new(origin.clone(), fetcher, sw_config);

    let mut timing = PerfTiming::new();

    info!(origin = %origin, cache = %cache_name, "Registering cache worker");
    let start = Instant::now();
    container.register().await?;
    timing.record("register", start.elapsed());

    // Scripted replay: one request per strategy branch. The stylesheet is
    // fetched twice to show the precached copy short-circuiting the
    // network.
    let script = [
        ("api_network_first", "/api/destinations"),
        ("static_cache_first", "/static/css/style.css"),
        ("static_cache_first", "/static/css/style.css"),
        ("navigation", "/"),
        ("navigation", "/dashboard"),
    ];

    let mut replays = Vec::new();
    for (label, path) in script {
        let url = origin.join(path)?;
        let event = FetchEvent::new(Request::get(url));

        let start = Instant::now();
        let outcome = container.handle_fetch(event).await;
        timing.record(label, start.elapsed());

        let entry = match outcome {
            Ok(Some(response)) => json!({
                "path": path,
                "status": response.status.as_u16(),
                "from_cache": response.from_cache,
            }),
            Ok(None) => json!({ "path": path, "handled": false }),
            Err(err) => json!({ "path": path, "error": err.to_string() }),
        };
        replays.push(entry);
    }

    let cached_urls: Vec<String> = {
        let caches = container.caches.read().await;
        caches
            .get(&cache_name)
            .map(|cache| cache.keys().iter().map(|k| k.to_string()).collect())
            .unwrap_or_default()
    };

    Ok(json!({
        "origin": origin.to_string(),
        "cache": cache_name,
        "precache_manifest": precache_count,
        "cached_urls": cached_urls,
        "replays": replays,
        "timings": timing.summary(),
    }))
}
