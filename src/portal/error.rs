use std::time::Duration;

use thiserror::Error;

use super::LoginState;

/// Failures talking to the browser.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("WebDriver error '{error}': {message}")]
    WebDriver { error: String, message: String },

    #[error("Timed out after {waited:?} waiting for {what}")]
    Timeout { waited: Duration, what: &'static str },

    #[error("Unexpected WebDriver response: {0}")]
    Protocol(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("Invalid screenshot payload: {0}")]
    Screenshot(#[from] base64::DecodeError),
}

/// Errors from the portal login sequence.
#[derive(Debug, Error)]
pub enum LoginError {
    #[error("No token in local storage after {waited:?}")]
    TokenTimeout { waited: Duration },

    #[error("Login failed during {state}: {source}")]
    Step {
        state: LoginState,
        #[source]
        source: DriverError,
    },

    #[error("Login failed after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: Box<LoginError>,
    },
}

impl LoginError {
    pub(crate) fn step(state: LoginState) -> impl FnOnce(DriverError) -> LoginError {
        move |source| LoginError::Step { state, source }
    }

    /// The state the attempt was in when it failed.
    pub fn state(&self) -> LoginState {
        match self {
            LoginError::TokenTimeout { .. } => LoginState::AwaitToken,
            LoginError::Step { state, .. } => *state,
            LoginError::Exhausted { last, .. } => last.state(),
        }
    }
}
