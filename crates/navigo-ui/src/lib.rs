//! # NAVIGo UI
//!
//! The page-side UI controller for NAVIGo: navigation-link highlighting,
//! the chat sidebar toggle, and cache worker registration on page load.
//!
//! ## Features
//!
//! - **Element model**: class lists, click listeners, selector queries
//! - **Navigation highlight**: exactly one active link at a time
//! - **Chat sidebar**: open-class toggle, silently inactive when absent
//! - **Registration hook**: warn-and-continue on failure

pub mod controller;
pub mod dom;

pub use controller::{UiConfig, UiController};
pub use dom::{Document, Element, ElementId};
