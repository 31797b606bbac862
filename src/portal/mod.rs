//! Scripted login against the utility portal.
//!
//! The portal only hands out a bearer token to a browser that walks the
//! login dialog, so the sequence is modelled as an explicit state machine
//! driven through [`BrowserDriver`]. Every attempt gets a fresh browser;
//! a failed attempt leaves a screenshot named after the state it died in.

pub mod driver;
pub mod endpoints;
pub mod error;
pub mod webdriver;

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

pub use self::driver::{BrowserDriver, DriverFactory};
pub use self::error::{DriverError, LoginError};

use crate::config::Account;
use crate::retry::{self, RetryAction, RetryConfig};

/// Where the login sequence currently is. The `Display` form is used in
/// screenshot names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginState {
    Init,
    NavigatePortal,
    AwaitReady,
    OpenLoginModal,
    FillCredentials,
    SubmitForm,
    AwaitToken,
}

impl fmt::Display for LoginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoginState::Init => "init",
            LoginState::NavigatePortal => "navigate_portal",
            LoginState::AwaitReady => "await_ready",
            LoginState::OpenLoginModal => "open_login_modal",
            LoginState::FillCredentials => "fill_credentials",
            LoginState::SubmitForm => "submit_form",
            LoginState::AwaitToken => "await_token",
        };
        f.write_str(name)
    }
}

/// Bounded polling: `polls` probes, `interval` apart.
#[derive(Debug, Clone, Copy)]
pub struct Poll {
    pub polls: u32,
    pub interval: Duration,
}

impl Poll {
    pub fn total(&self) -> Duration {
        self.interval * self.polls
    }

    /// Probe until it yields a value or the poll budget runs out.
    /// Probe errors end the wait immediately.
    async fn until<F, Fut, T>(&self, mut probe: F) -> Result<Option<T>, DriverError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>, DriverError>>,
    {
        for n in 0..self.polls.max(1) {
            if n > 0 {
                tokio::time::sleep(self.interval).await;
            }
            if let Some(value) = probe().await? {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }
}

/// Every pause in the login sequence. The portal is an Angular app with
/// animated dialogs, so the settle delays are load-bearing.
#[derive(Debug, Clone, Copy)]
pub struct LoginTimings {
    pub after_navigate: Duration,
    pub ready: Poll,
    pub after_modal: Duration,
    pub after_typing: Duration,
    pub after_submit: Duration,
    pub token: Poll,
    pub attempts: u32,
    pub retry_delay_secs: u64,
}

impl Default for LoginTimings {
    fn default() -> Self {
        Self {
            after_navigate: Duration::from_secs(4),
            ready: Poll {
                polls: 60,
                interval: Duration::from_millis(500),
            },
            after_modal: Duration::from_secs(3),
            after_typing: Duration::from_secs(1),
            after_submit: Duration::from_secs(2),
            token: Poll {
                polls: 20,
                interval: Duration::from_secs(1),
            },
            attempts: 3,
            retry_delay_secs: 5,
        }
    }
}

impl LoginTimings {
    /// No pauses at all; polls keep their counts.
    #[cfg(test)]
    pub(crate) fn immediate() -> Self {
        let defaults = Self::default();
        Self {
            after_navigate: Duration::ZERO,
            ready: Poll {
                polls: defaults.ready.polls,
                interval: Duration::ZERO,
            },
            after_modal: Duration::ZERO,
            after_typing: Duration::ZERO,
            after_submit: Duration::ZERO,
            token: Poll {
                polls: defaults.token.polls,
                interval: Duration::ZERO,
            },
            attempts: defaults.attempts,
            retry_delay_secs: 0,
        }
    }
}

/// Portal bearer token. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(String);

impl BearerToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BearerToken(<redacted>)")
    }
}

/// Pull the bearer out of the local-storage blob: the text after the
/// first `:` up to the next `,`, stripped of quotes, braces and spaces.
pub fn extract_bearer(raw: &str) -> Option<String> {
    let tail = match raw.split_once(':') {
        Some((_, rest)) => rest.split(',').next().unwrap_or(rest),
        None => raw,
    };
    let token = tail.trim_matches(|c: char| c.is_whitespace() || matches!(c, '"' | '{' | '}'));
    (!token.is_empty()).then(|| token.to_string())
}

/// Keep only characters that are safe in a file name.
fn screenshot_tag(account: &str) -> String {
    account
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
        .collect()
}

pub fn screenshot_name(account: &str, attempt: u32, state: LoginState) -> String {
    format!(
        "login_{}_attempt{}_{}.png",
        screenshot_tag(account),
        attempt,
        state
    )
}

pub struct PortalLogin {
    factory: Arc<dyn DriverFactory>,
    portal_url: String,
    screenshot_dir: PathBuf,
    timings: LoginTimings,
}

impl PortalLogin {
    pub fn new(factory: Arc<dyn DriverFactory>, portal_url: &str, screenshot_dir: &Path) -> Self {
        Self {
            factory,
            portal_url: portal_url.to_string(),
            screenshot_dir: screenshot_dir.to_path_buf(),
            timings: LoginTimings::default(),
        }
    }

    pub fn with_timings(mut self, timings: LoginTimings) -> Self {
        self.timings = timings;
        self
    }

    /// Log in as `account`, retrying the whole sequence with a fixed pause.
    pub async fn obtain_token(&self, account: &Account) -> Result<BearerToken, LoginError> {
        self.clear_stale_screenshots(&account.name).await;

        let policy = RetryConfig::fixed(self.timings.attempts, self.timings.retry_delay_secs);
        let attempt = AtomicU32::new(0);
        let result = retry::retry_with_backoff(
            &policy,
            |_: &LoginError| RetryAction::Retry,
            || async {
                let n = attempt.fetch_add(1, Ordering::SeqCst) + 1;
                tracing::info!(
                    account = %account.name,
                    attempt = n,
                    "Portal login attempt {}/{}",
                    n,
                    self.timings.attempts
                );
                self.attempt(account, n).await
            },
        )
        .await;

        result.map_err(|last| LoginError::Exhausted {
            attempts: attempt.load(Ordering::SeqCst),
            last: Box::new(last),
        })
    }

    async fn attempt(&self, account: &Account, n: u32) -> Result<BearerToken, LoginError> {
        let driver = self
            .factory
            .launch()
            .await
            .map_err(LoginError::step(LoginState::Init))?;

        let mut state = LoginState::Init;
        let result = self.run(driver.as_ref(), account, &mut state).await;

        if let Err(e) = &result {
            tracing::warn!(account = %account.name, attempt = n, %state, "Login attempt failed: {}", e);
            self.capture(driver.as_ref(), &account.name, n, state).await;
        }
        if let Err(e) = driver.quit().await {
            tracing::debug!("Failed to close browser session: {}", e);
        }
        result
    }

    /// Walk the states in order. `state` always holds the step being
    /// executed so a failure can be attributed to it.
    async fn run(
        &self,
        driver: &dyn BrowserDriver,
        account: &Account,
        state: &mut LoginState,
    ) -> Result<BearerToken, LoginError> {
        let t = &self.timings;
        loop {
            let current = *state;
            let step = LoginError::step(current);
            *state = match current {
                LoginState::Init => LoginState::NavigatePortal,
                LoginState::NavigatePortal => {
                    driver.goto(&self.portal_url).await.map_err(step)?;
                    tokio::time::sleep(t.after_navigate).await;
                    LoginState::AwaitReady
                }
                LoginState::AwaitReady => {
                    let ready = t
                        .ready
                        .until(|| async {
                            let v = driver.execute(endpoints::READY_STATE_SCRIPT).await?;
                            Ok::<_, DriverError>((v.as_str() == Some("complete")).then_some(()))
                        })
                        .await
                        .map_err(LoginError::step(current))?;
                    if ready.is_none() {
                        return Err(step(DriverError::Timeout {
                            waited: t.ready.total(),
                            what: "document ready",
                        }));
                    }
                    LoginState::OpenLoginModal
                }
                LoginState::OpenLoginModal => {
                    driver
                        .click(endpoints::LOGIN_BUTTON_XPATH)
                        .await
                        .map_err(step)?;
                    tokio::time::sleep(t.after_modal).await;
                    LoginState::FillCredentials
                }
                LoginState::FillCredentials => {
                    driver
                        .fill(endpoints::USER_FIELD_XPATH, &account.login_user)
                        .await
                        .map_err(LoginError::step(current))?;
                    tokio::time::sleep(t.after_typing).await;
                    driver
                        .fill(endpoints::PASSWORD_FIELD_XPATH, &account.login_password)
                        .await
                        .map_err(step)?;
                    tokio::time::sleep(t.after_typing).await;
                    LoginState::SubmitForm
                }
                LoginState::SubmitForm => {
                    driver.click(endpoints::SUBMIT_XPATH).await.map_err(step)?;
                    tokio::time::sleep(t.after_submit).await;
                    LoginState::AwaitToken
                }
                LoginState::AwaitToken => {
                    let script = endpoints::token_script();
                    let token = t
                        .token
                        .until(|| async {
                            let v = driver.execute(&script).await?;
                            Ok::<_, DriverError>(match v {
                                Value::String(raw) => extract_bearer(&raw),
                                _ => None,
                            })
                        })
                        .await
                        .map_err(step)?;
                    return match token {
                        Some(token) => {
                            tracing::info!(account = %account.name, "Portal login succeeded");
                            Ok(BearerToken::new(token))
                        }
                        None => Err(LoginError::TokenTimeout {
                            waited: t.token.total(),
                        }),
                    };
                }
            };
        }
    }

    async fn capture(&self, driver: &dyn BrowserDriver, account: &str, n: u32, state: LoginState) {
        let png = match driver.screenshot().await {
            Ok(png) => png,
            Err(e) => {
                tracing::warn!("Could not capture login screenshot: {}", e);
                return;
            }
        };
        if let Err(e) = tokio::fs::create_dir_all(&self.screenshot_dir).await {
            tracing::warn!(
                "Could not create screenshot directory {}: {}",
                self.screenshot_dir.display(),
                e
            );
            return;
        }
        let path = self.screenshot_dir.join(screenshot_name(account, n, state));
        match tokio::fs::write(&path, png).await {
            Ok(()) => tracing::info!("Saved login screenshot to {}", path.display()),
            Err(e) => tracing::warn!("Could not write {}: {}", path.display(), e),
        }
    }

    /// Remove screenshots left behind by earlier runs for this account.
    async fn clear_stale_screenshots(&self, account: &str) {
        let prefix = format!("login_{}_attempt", screenshot_tag(account));
        let Ok(mut entries) = tokio::fs::read_dir(&self.screenshot_dir).await else {
            return;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if name.starts_with(&prefix) && name.ends_with(".png") {
                if let Err(e) = tokio::fs::remove_file(entry.path()).await {
                    tracing::debug!("Could not remove stale screenshot {}: {}", name, e);
                }
            }
        }
    }
}
