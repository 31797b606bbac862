//! Human-readable progress lines for whoever drives a run. Every line is
//! logged at debug and, when a receiver exists, sent over a channel.

use tokio::sync::mpsc;

#[derive(Debug, Clone, Default)]
pub struct Progress {
    tx: Option<mpsc::UnboundedSender<String>>,
    account: Option<String>,
}

impl Progress {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx: Some(tx),
                account: None,
            },
            rx,
        )
    }

    /// Log-only progress.
    pub fn silent() -> Self {
        Self::default()
    }

    /// Same sink, lines prefixed with `[ACCOUNT]`.
    pub fn for_account(&self, account: &str) -> Self {
        Self {
            tx: self.tx.clone(),
            account: Some(account.to_uppercase()),
        }
    }

    pub fn line(&self, message: impl AsRef<str>) {
        let line = match &self.account {
            Some(account) => format!("[{}] {}", account, message.as_ref()),
            None => message.as_ref().to_string(),
        };
        tracing::debug!(target: "progress", "{}", line);
        if let Some(tx) = &self.tx {
            // Receiver gone means nobody is listening any more.
            let _ = tx.send(line);
        }
    }
}
