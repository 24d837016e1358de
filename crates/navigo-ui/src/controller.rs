//! The page shell controller.
//!
//! Runs once per page load: wires navigation-link highlighting and the
//! chat sidebar toggle, and registers the cache worker after the load
//! event. Registration failure is logged and swallowed; it must never
//! block page interactivity.

use std::rc::Rc;
use std::sync::Arc;

use tracing::{debug, info, warn};

use navigo_common::Result;
use navigo_sw::ServiceWorkerContainer;

use crate::dom::{Document, Element};

/// Selectors and class names the controller operates on.
#[derive(Debug, Clone)]
pub struct UiConfig {
    /// Navigation link selector.
    pub nav_link_selector: String,
    /// Class carried by the most recently clicked link.
    pub active_class: String,
    /// `id` of the chat toggle control.
    pub toggle_id: String,
    /// Chat sidebar selector.
    pub sidebar_selector: String,
    /// Class toggled on the sidebar.
    pub open_class: String,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            nav_link_selector: ".nav-links a, .nav-menu a".to_string(),
            active_class: "active".to_string(),
            toggle_id: "chatbot-toggle".to_string(),
            sidebar_selector: ".chatbot-sidebar".to_string(),
            open_class: "open".to_string(),
        }
    }
}

/// The UI controller for one page.
pub struct UiController {
    container: Option<Arc<ServiceWorkerContainer>>,
    nav_links: Vec<Rc<Element>>,
}

impl UiController {
    /// Wire up the page.
    ///
    /// Passing `None` for the container models a platform without worker
    /// support; the UI features still work and `on_load` is a no-op.
    pub fn attach(
        document: &Document,
        container: Option<Arc<ServiceWorkerContainer>>,
        config: UiConfig,
    ) -> Result<Self> {
        info!("NAVIGo UI helpers ready");

        // Navigation highlight: the clicked link becomes the only one
        // carrying the active class.
        let nav_links = document.query_selector_all(&config.nav_link_selector)?;
        for link in &nav_links {
            let all: Vec<Rc<Element>> = nav_links.iter().map(Rc::clone).collect();
            let clicked = Rc::clone(link);
            let active = config.active_class.clone();
            link.add_event_listener(
                "click",
                Box::new(move || {
                    for other in &all {
                        other.remove_class(&active);
                    }
                    clicked.add_class(&active);
                }),
            );
        }
        debug!(count = nav_links.len(), "Navigation links wired");

        // Chat sidebar toggle; silently inactive if either element is
        // missing from the markup.
        let toggle = document.element_by_id(&config.toggle_id);
        let sidebar = document.query_selector(&config.sidebar_selector)?;
        match (toggle, sidebar) {
            (Some(toggle), Some(sidebar)) => {
                let open = config.open_class.clone();
                toggle.add_event_listener(
                    "click",
                    Box::new(move || {
                        sidebar.toggle_class(&open);
                    }),
                );
            }
            _ => debug!("Chatbot toggle or sidebar missing; feature inactive"),
        }

        Ok(Self {
            container,
            nav_links,
        })
    }

    /// Page-load hook: request cache worker registration.
    ///
    /// A rejected registration is logged as a warning and otherwise
    /// ignored.
    pub async fn on_load(&self) {
        let Some(container) = &self.container else {
            debug!("No worker support; skipping registration");
            return;
        };

        match container.register().await {
            Ok(worker_id) => debug!(?worker_id, "Cache worker registered"),
            Err(err) => warn!(error = %err, "Service worker registration failed"),
        }
    }

    /// The wired navigation links.
    pub fn nav_links(&self) -> &[Rc<Element>] {
        &self.nav_links
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use http::StatusCode;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use url::Url;

    use navigo_net::{Fetcher, NetError, Request, Response};
    use navigo_sw::SwConfig;

    /// Canned fetch backend: routed URLs answer 200, everything else 404,
    /// and the whole network can be switched off.
    struct CannedFetcher {
        routes: Mutex<HashMap<String, Vec<u8>>>,
        reachable: bool,
    }

    impl CannedFetcher {
        fn offline() -> Self {
            Self {
                routes: Mutex::new(HashMap::new()),
                reachable: false,
            }
        }

        fn with_precache(origin: &Url) -> Self {
            let mut routes = HashMap::new();
            for path in SwConfig::default().precache {
                let url = origin.join(&path).unwrap();
                routes.insert(url.to_string(), path.into_bytes());
            }
            Self {
                routes: Mutex::new(routes),
                reachable: true,
            }
        }
    }

    #[async_trait]
    impl Fetcher for CannedFetcher {
        async fn fetch(&self, request: Request) -> std::result::Result<Response, NetError> {
            if !self.reachable {
                return Err(NetError::RequestFailed("network unreachable".to_string()));
            }
            let routes = self.routes.lock().unwrap();
            let (status, body) = match routes.get(request.url.as_str()) {
                Some(body) => (StatusCode::OK, Bytes::from(body.clone())),
                None => (StatusCode::NOT_FOUND, Bytes::new()),
            };
            Ok(Response::new(request.id, request.url.clone(), status, body))
        }
    }

    fn sample_page() -> Document {
        let doc = Document::new();

        let nav = Element::new("nav");
        nav.add_class("nav-links");
        Element::append_child(doc.root(), &nav);
        for _ in 0..3 {
            Element::append_child(&nav, &Element::new("a"));
        }

        Element::append_child(doc.root(), &Element::with_id("button", "chatbot-toggle"));

        let sidebar = Element::new("aside");
        sidebar.add_class("chatbot-sidebar");
        Element::append_child(doc.root(), &sidebar);

        doc
    }

    fn active_count(links: &[Rc<Element>]) -> usize {
        links.iter().filter(|l| l.has_class("active")).count()
    }

    #[test]
    fn test_exactly_one_active_link_after_each_click() {
        let doc = sample_page();
        let controller = UiController::attach(&doc, None, UiConfig::default()).unwrap();
        let links = controller.nav_links();
        assert_eq!(links.len(), 3);
        assert_eq!(active_count(links), 0);

        for &i in &[0usize, 2, 1, 1, 0] {
            links[i].click();
            assert_eq!(active_count(links), 1);
            assert!(links[i].has_class("active"));
        }
    }

    #[test]
    fn test_sidebar_toggle_parity() {
        let doc = sample_page();
        let _controller = UiController::attach(&doc, None, UiConfig::default()).unwrap();

        let toggle = doc.element_by_id("chatbot-toggle").unwrap();
        let sidebar = doc.query_selector(".chatbot-sidebar").unwrap().unwrap();
        assert!(!sidebar.has_class("open"));

        // Odd number of clicks flips the state.
        toggle.click();
        assert!(sidebar.has_class("open"));

        // An even number leaves it unchanged.
        toggle.click();
        toggle.click();
        assert!(sidebar.has_class("open"));

        toggle.click();
        assert!(!sidebar.has_class("open"));
    }

    #[test]
    fn test_missing_sidebar_is_tolerated() {
        let doc = Document::new();
        let nav = Element::new("nav");
        nav.add_class("nav-menu");
        Element::append_child(doc.root(), &nav);
        Element::append_child(&nav, &Element::new("a"));

        // No toggle, no sidebar: attach must still succeed and wire the
        // nav links.
        let controller = UiController::attach(&doc, None, UiConfig::default()).unwrap();
        assert_eq!(controller.nav_links().len(), 1);

        controller.nav_links()[0].click();
        assert!(controller.nav_links()[0].has_class("active"));
    }

    #[tokio::test]
    async fn test_on_load_registers_worker() {
        let origin = Url::parse("https://navigo.example/").unwrap();
        let fetcher = Arc::new(CannedFetcher::with_precache(&origin));
        let (container, _rx) =
            ServiceWorkerContainer::new(origin, fetcher, SwConfig::default());
        let container = Arc::new(container);

        let doc = sample_page();
        let controller =
            UiController::attach(&doc, Some(Arc::clone(&container)), UiConfig::default()).unwrap();

        controller.on_load().await;
        assert!(container.active_worker("/").await.is_some());
    }

    #[tokio::test]
    async fn test_on_load_swallows_registration_failure() {
        let origin = Url::parse("https://navigo.example/").unwrap();
        let fetcher = Arc::new(CannedFetcher::offline());
        let (container, _rx) =
            ServiceWorkerContainer::new(origin, fetcher, SwConfig::default());
        let container = Arc::new(container);

        let doc = sample_page();
        let controller =
            UiController::attach(&doc, Some(Arc::clone(&container)), UiConfig::default()).unwrap();

        // Must not error or panic; the page stays interactive.
        controller.on_load().await;
        assert!(container.active_worker("/").await.is_none());

        controller.nav_links()[0].click();
        assert!(controller.nav_links()[0].has_class("active"));
    }

    #[tokio::test]
    async fn test_on_load_without_worker_support() {
        let doc = sample_page();
        let controller = UiController::attach(&doc, None, UiConfig::default()).unwrap();
        controller.on_load().await;
    }
}
