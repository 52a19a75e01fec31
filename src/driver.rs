//! Browser capability consumed by the engine.
//!
//! Every workflow, extraction and booking step is expressed in terms of these
//! primitives plus the selectors and script fragments in [`crate::site`].

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::DriverError;

/// Addresses one element to click.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementTarget {
    /// First element matching the selector.
    First(String),
    /// The `item_index`-th `item` inside the `container_index`-th `container`.
    Nested {
        container: String,
        container_index: usize,
        item: String,
        item_index: usize,
    },
}

impl ElementTarget {
    pub fn first(selector: &str) -> Self {
        ElementTarget::First(selector.to_string())
    }
}

/// One browser process able to hand out pages.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn new_page(&self) -> Result<Box<dyn PageDriver>, DriverError>;
}

/// One tab. Not reentrant: callers serialise access per page.
#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<(), DriverError>;

    async fn set_user_agent(&self, user_agent: &str, accept_language: &str)
        -> Result<(), DriverError>;

    /// Waits until `selector` matches at least one element.
    async fn wait_for_element(&self, selector: &str, timeout: Duration) -> Result<(), DriverError>;

    async fn fill(&self, selector: &str, text: &str) -> Result<(), DriverError>;

    async fn click(&self, target: &ElementTarget) -> Result<(), DriverError>;

    /// Evaluates an expression and returns its JSON value (`Null` for `undefined`).
    async fn eval(&self, script: &str) -> Result<Value, DriverError>;

    /// Blocks until no navigation or network activity is pending, or `timeout` elapses.
    async fn wait_stable(&self, timeout: Duration) -> Result<(), DriverError>;

    async fn url(&self) -> Result<String, DriverError>;

    /// Serialised DOM of the current document.
    async fn content(&self) -> Result<String, DriverError>;

    async fn close(&self) -> Result<(), DriverError>;
}
