//! Minimal element tree for the page shell.
//!
//! Supports exactly what the UI controller needs: class-list mutation,
//! click listeners, and the selector shapes the page markup uses
//! (`#id`, `.class`, descendant `".class tag"`, and comma-separated lists).

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use navigo_common::{NavigoError, Result};

/// Unique identifier for an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementId(u64);

impl ElementId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// A listener callback.
pub type ListenerCallback = Box<dyn Fn()>;

/// An element in the page tree.
pub struct Element {
    /// Unique ID.
    pub id: ElementId,

    /// Tag name (lowercase).
    pub tag: String,

    /// The `id` attribute, if any.
    dom_id: Option<String>,

    /// Class set.
    classes: RefCell<BTreeSet<String>>,

    /// Parent link (weak, to avoid cycles).
    parent: RefCell<Weak<Element>>,

    /// Child elements.
    children: RefCell<Vec<Rc<Element>>>,

    /// Listeners keyed by event type.
    listeners: RefCell<HashMap<String, Vec<ListenerCallback>>>,
}

impl Element {
    /// Create a detached element.
    pub fn new(tag: &str) -> Rc<Self> {
        Rc::new(Self {
            id: ElementId::new(),
            tag: tag.to_ascii_lowercase(),
            dom_id: None,
            classes: RefCell::new(BTreeSet::new()),
            parent: RefCell::new(Weak::new()),
            children: RefCell::new(Vec::new()),
            listeners: RefCell::new(HashMap::new()),
        })
    }

    /// Create a detached element with an `id` attribute.
    pub fn with_id(tag: &str, dom_id: &str) -> Rc<Self> {
        Rc::new(Self {
            id: ElementId::new(),
            tag: tag.to_ascii_lowercase(),
            dom_id: Some(dom_id.to_string()),
            classes: RefCell::new(BTreeSet::new()),
            parent: RefCell::new(Weak::new()),
            children: RefCell::new(Vec::new()),
            listeners: RefCell::new(HashMap::new()),
        })
    }

    /// The `id` attribute.
    pub fn dom_id(&self) -> Option<&str> {
        self.dom_id.as_deref()
    }

    /// Append a child.
    pub fn append_child(parent: &Rc<Element>, child: &Rc<Element>) {
        *child.parent.borrow_mut() = Rc::downgrade(parent);
        parent.children.borrow_mut().push(Rc::clone(child));
    }

    /// Add a class. Adding a class that is already present is a no-op.
    pub fn add_class(&self, class: &str) {
        self.classes.borrow_mut().insert(class.to_string());
    }

    /// Remove a class.
    pub fn remove_class(&self, class: &str) {
        self.classes.borrow_mut().remove(class);
    }

    /// Toggle a class: present → absent, absent → present. Returns whether
    /// the class is present afterwards.
    pub fn toggle_class(&self, class: &str) -> bool {
        let mut classes = self.classes.borrow_mut();
        if classes.remove(class) {
            false
        } else {
            classes.insert(class.to_string());
            true
        }
    }

    /// Check for a class.
    pub fn has_class(&self, class: &str) -> bool {
        self.classes.borrow().contains(class)
    }

    /// Add a listener for an event type.
    pub fn add_event_listener(&self, event_type: &str, callback: ListenerCallback) {
        self.listeners
            .borrow_mut()
            .entry(event_type.to_string())
            .or_default()
            .push(callback);
    }

    /// Check if there are any listeners for an event type.
    pub fn has_listeners(&self, event_type: &str) -> bool {
        self.listeners
            .borrow()
            .get(event_type)
            .map(|l| !l.is_empty())
            .unwrap_or(false)
    }

    /// Dispatch an event to this element's listeners.
    pub fn dispatch(&self, event_type: &str) {
        let listeners = self.listeners.borrow();
        if let Some(list) = listeners.get(event_type) {
            for listener in list {
                listener();
            }
        }
    }

    /// Dispatch a click.
    pub fn click(&self) {
        self.dispatch("click");
    }

    fn children(&self) -> Vec<Rc<Element>> {
        self.children.borrow().clone()
    }
}

impl std::fmt::Debug for Element {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Element")
            .field("tag", &self.tag)
            .field("dom_id", &self.dom_id)
            .field("classes", &self.classes.borrow())
            .finish()
    }
}

/// The page: a tree of elements with query support.
pub struct Document {
    root: Rc<Element>,
}

impl Document {
    /// Create a document with an empty body root.
    pub fn new() -> Self {
        Self {
            root: Element::new("body"),
        }
    }

    /// The root element.
    pub fn root(&self) -> &Rc<Element> {
        &self.root
    }

    /// Find an element by its `id` attribute.
    pub fn element_by_id(&self, dom_id: &str) -> Option<Rc<Element>> {
        let mut found = None;
        walk(&self.root, &mut |node| {
            if found.is_none() && node.dom_id() == Some(dom_id) {
                found = Some(Rc::clone(node));
            }
        });
        found
    }

    /// Find all elements carrying a class.
    pub fn elements_by_class(&self, class: &str) -> Vec<Rc<Element>> {
        let mut found = Vec::new();
        walk(&self.root, &mut |node| {
            if node.has_class(class) {
                found.push(Rc::clone(node));
            }
        });
        found
    }

    /// Query elements by selector.
    ///
    /// Supported shapes: `#id`, `.class`, descendant `".class tag"`, and
    /// comma-separated lists of those. Anything else is a DOM error.
    pub fn query_selector_all(&self, selector: &str) -> Result<Vec<Rc<Element>>> {
        let mut results = Vec::new();
        for part in selector.split(',') {
            results.extend(self.query_single(part.trim())?);
        }
        Ok(results)
    }

    /// Query the first element matching a selector.
    pub fn query_selector(&self, selector: &str) -> Result<Option<Rc<Element>>> {
        Ok(self.query_selector_all(selector)?.into_iter().next())
    }

    fn query_single(&self, selector: &str) -> Result<Vec<Rc<Element>>> {
        if selector.is_empty() {
            return Err(NavigoError::dom("empty selector"));
        }

        if let Some(dom_id) = selector.strip_prefix('#') {
            return Ok(self.element_by_id(dom_id).into_iter().collect());
        }

        if let Some(rest) = selector.strip_prefix('.') {
            return match rest.split_once(char::is_whitespace) {
                // ".class tag": tag descendants of class-matching containers
                Some((class, tag)) => {
                    let tag = tag.trim().to_ascii_lowercase();
                    let mut found = Vec::new();
                    for container in self.elements_by_class(class) {
                        collect_descendants_by_tag(&container, &tag, &mut found);
                    }
                    Ok(found)
                }
                None => Ok(self.elements_by_class(rest)),
            };
        }

        Err(NavigoError::dom(format!(
            "unsupported selector: {selector}"
        )))
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

fn walk(node: &Rc<Element>, visit: &mut impl FnMut(&Rc<Element>)) {
    visit(node);
    for child in node.children() {
        walk(&child, visit);
    }
}

fn collect_descendants_by_tag(node: &Rc<Element>, tag: &str, found: &mut Vec<Rc<Element>>) {
    for child in node.children() {
        if child.tag == tag {
            found.push(Rc::clone(&child));
        }
        collect_descendants_by_tag(&child, tag, found);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_class_list_ops() {
        let element = Element::new("div");
        assert!(!element.has_class("active"));

        element.add_class("active");
        assert!(element.has_class("active"));

        // Re-adding is a no-op.
        element.add_class("active");
        assert!(element.has_class("active"));

        element.remove_class("active");
        assert!(!element.has_class("active"));
    }

    #[test]
    fn test_toggle_class_parity() {
        let element = Element::new("aside");

        assert!(element.toggle_class("open"));
        assert!(element.has_class("open"));

        assert!(!element.toggle_class("open"));
        assert!(!element.has_class("open"));
    }

    #[test]
    fn test_click_dispatch() {
        let element = Element::new("a");
        let clicks = Rc::new(Cell::new(0));

        let counter = Rc::clone(&clicks);
        element.add_event_listener("click", Box::new(move || counter.set(counter.get() + 1)));

        assert!(element.has_listeners("click"));
        element.click();
        element.click();
        assert_eq!(clicks.get(), 2);
    }

    fn sample_page() -> Document {
        // <body>
        //   <nav class="nav-links"><a/><a/></nav>
        //   <nav class="nav-menu"><a/></nav>
        //   <button id="chatbot-toggle"/>
        //   <aside class="chatbot-sidebar"/>
        // </body>
        let doc = Document::new();

        let nav = Element::new("nav");
        nav.add_class("nav-links");
        Element::append_child(doc.root(), &nav);
        Element::append_child(&nav, &Element::new("a"));
        Element::append_child(&nav, &Element::new("a"));

        let menu = Element::new("nav");
        menu.add_class("nav-menu");
        Element::append_child(doc.root(), &menu);
        Element::append_child(&menu, &Element::new("a"));

        Element::append_child(doc.root(), &Element::with_id("button", "chatbot-toggle"));

        let sidebar = Element::new("aside");
        sidebar.add_class("chatbot-sidebar");
        Element::append_child(doc.root(), &sidebar);

        doc
    }

    #[test]
    fn test_query_by_id() {
        let doc = sample_page();
        let toggle = doc.element_by_id("chatbot-toggle").unwrap();
        assert_eq!(toggle.tag, "button");
        assert!(doc.element_by_id("missing").is_none());
    }

    #[test]
    fn test_query_by_class() {
        let doc = sample_page();
        let sidebars = doc.query_selector_all(".chatbot-sidebar").unwrap();
        assert_eq!(sidebars.len(), 1);
        assert_eq!(sidebars[0].tag, "aside");
    }

    #[test]
    fn test_query_descendants() {
        let doc = sample_page();
        let links = doc.query_selector_all(".nav-links a").unwrap();
        assert_eq!(links.len(), 2);
    }

    #[test]
    fn test_query_selector_list() {
        let doc = sample_page();
        let links = doc.query_selector_all(".nav-links a, .nav-menu a").unwrap();
        assert_eq!(links.len(), 3);
    }

    #[test]
    fn test_unsupported_selector() {
        let doc = sample_page();
        assert!(doc.query_selector_all("nav > a").is_err());
        assert!(doc.query_selector_all("").is_err());
    }
}
