use async_trait::async_trait;
use serde_json::Value;

use super::error::DriverError;

/// The handful of browser interactions the login sequence needs.
/// Elements are addressed by XPath.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn goto(&self, url: &str) -> Result<(), DriverError>;

    /// Run a synchronous script and return its result.
    async fn execute(&self, script: &str) -> Result<Value, DriverError>;

    async fn click(&self, xpath: &str) -> Result<(), DriverError>;

    /// Clear an input and type `text` into it.
    async fn fill(&self, xpath: &str, text: &str) -> Result<(), DriverError>;

    /// PNG bytes of the current viewport.
    async fn screenshot(&self) -> Result<Vec<u8>, DriverError>;

    async fn quit(&self) -> Result<(), DriverError>;
}

/// Launches a fresh, isolated browser for every login attempt.
#[async_trait]
pub trait DriverFactory: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn BrowserDriver>, DriverError>;
}
