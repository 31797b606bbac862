//! Minimal W3C WebDriver client (chromedriver, selenium) over reqwest.

use async_trait::async_trait;
use base64::Engine;
use reqwest::{Client, Method};
use serde_json::{json, Value};

use super::driver::{BrowserDriver, DriverFactory};
use super::error::DriverError;

/// W3C web element reference key.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

const CHROME_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

fn chrome_args() -> Vec<String> {
    vec![
        "--headless=new".to_string(),
        "--window-size=1920,1080".to_string(),
        "--disable-blink-features=AutomationControlled".to_string(),
        format!("--user-agent={}", CHROME_USER_AGENT),
        "--no-sandbox".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--disable-gpu".to_string(),
    ]
}

/// Launches headless Chrome sessions on a running WebDriver server.
#[derive(Debug, Clone)]
pub struct WebDriverFactory {
    client: Client,
    server_url: String,
    chrome_binary: Option<String>,
}

impl WebDriverFactory {
    pub fn new(client: Client, server_url: &str, chrome_binary: Option<String>) -> Self {
        Self {
            client,
            server_url: server_url.trim_end_matches('/').to_string(),
            chrome_binary,
        }
    }

    fn capabilities(&self) -> Value {
        let mut chrome = json!({
            "args": chrome_args(),
            "excludeSwitches": ["enable-automation"],
        });
        if let Some(binary) = &self.chrome_binary {
            chrome["binary"] = Value::String(binary.clone());
        }
        json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": chrome,
                }
            }
        })
    }
}

#[async_trait]
impl DriverFactory for WebDriverFactory {
    async fn launch(&self) -> Result<Box<dyn BrowserDriver>, DriverError> {
        let value = command(
            &self.client,
            Method::POST,
            format!("{}/session", self.server_url),
            Some(self.capabilities()),
        )
        .await?;
        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| DriverError::Protocol("new session response has no sessionId".into()))?;
        tracing::debug!(session = session_id, "Started browser session");
        Ok(Box::new(WebDriverSession {
            client: self.client.clone(),
            base: format!("{}/session/{}", self.server_url, session_id),
        }))
    }
}

/// One browser session. Every call addresses `/session/{id}/...`.
#[derive(Debug)]
pub struct WebDriverSession {
    client: Client,
    base: String,
}

/// Send a WebDriver command and unwrap the `value` envelope. Error
/// responses carry `{"value": {"error", "message"}}` with a 4xx/5xx.
async fn command(
    client: &Client,
    method: Method,
    url: String,
    body: Option<Value>,
) -> Result<Value, DriverError> {
    let mut request = client.request(method, url);
    if let Some(body) = body {
        request = request.json(&body);
    }
    let response = request.send().await?;
    let status = response.status();
    let mut payload: Value = response.json().await?;
    let value = payload
        .get_mut("value")
        .map(Value::take)
        .unwrap_or(Value::Null);

    if !status.is_success() {
        let field = |key: &str| {
            value
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        return Err(DriverError::WebDriver {
            error: field("error"),
            message: field("message"),
        });
    }
    Ok(value)
}

impl WebDriverSession {
    async fn call(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value, DriverError> {
        command(&self.client, method, format!("{}{}", self.base, path), body).await
    }

    async fn find(&self, xpath: &str) -> Result<String, DriverError> {
        let value = self
            .call(
                Method::POST,
                "/element",
                Some(json!({ "using": "xpath", "value": xpath })),
            )
            .await?;
        value
            .get(ELEMENT_KEY)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| DriverError::Protocol(format!("no element reference for {}", xpath)))
    }
}

#[async_trait]
impl BrowserDriver for WebDriverSession {
    async fn goto(&self, url: &str) -> Result<(), DriverError> {
        self.call(Method::POST, "/url", Some(json!({ "url": url })))
            .await?;
        Ok(())
    }

    async fn execute(&self, script: &str) -> Result<Value, DriverError> {
        self.call(
            Method::POST,
            "/execute/sync",
            Some(json!({ "script": script, "args": [] })),
        )
        .await
    }

    async fn click(&self, xpath: &str) -> Result<(), DriverError> {
        let element = self.find(xpath).await?;
        self.call(
            Method::POST,
            &format!("/element/{}/click", element),
            Some(json!({})),
        )
        .await?;
        Ok(())
    }

    async fn fill(&self, xpath: &str, text: &str) -> Result<(), DriverError> {
        let element = self.find(xpath).await?;
        self.call(
            Method::POST,
            &format!("/element/{}/clear", element),
            Some(json!({})),
        )
        .await?;
        self.call(
            Method::POST,
            &format!("/element/{}/value", element),
            Some(json!({ "text": text })),
        )
        .await?;
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>, DriverError> {
        let value = self.call(Method::GET, "/screenshot", None).await?;
        let encoded = value
            .as_str()
            .ok_or_else(|| DriverError::Protocol("screenshot is not a string".into()))?;
        Ok(base64::engine::general_purpose::STANDARD.decode(encoded)?)
    }

    async fn quit(&self) -> Result<(), DriverError> {
        self.call(Method::DELETE, "", None).await?;
        Ok(())
    }
}
