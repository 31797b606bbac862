//! End-of-run report: one line per client, in processing order.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientStatus {
    Success,
    Failure(Option<String>),
    /// Not started because shutdown was requested.
    Skipped,
}

impl fmt::Display for ClientStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientStatus::Success => f.write_str("Success"),
            ClientStatus::Failure(None) => f.write_str("Failure"),
            ClientStatus::Failure(Some(reason)) => write!(f, "Failure ({})", reason),
            ClientStatus::Skipped => f.write_str("Skipped"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunReport {
    clients: Vec<(String, ClientStatus)>,
}

impl RunReport {
    pub fn record(&mut self, client: &str, ok: bool, reason: Option<&str>) {
        let status = if ok {
            ClientStatus::Success
        } else {
            ClientStatus::Failure(reason.map(str::to_string))
        };
        self.clients.push((client.to_string(), status));
    }

    pub fn skip(&mut self, client: &str) {
        self.clients
            .push((client.to_string(), ClientStatus::Skipped));
    }

    /// A skipped client counts: the run did not do what was asked.
    pub fn any_failed(&self) -> bool {
        self.clients
            .iter()
            .any(|(_, status)| *status != ClientStatus::Success)
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "── Report ──")?;
        for (client, status) in &self.clients {
            writeln!(f, "  {}: {}", client, status)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_lines() {
        let mut report = RunReport::default();
        report.record("blue", true, None);
        report.record("soft", false, Some("missing configuration"));
        report.record("DNA", false, None);
        assert_eq!(
            report.to_string(),
            "── Report ──\n  blue: Success\n  soft: Failure (missing configuration)\n  DNA: Failure\n"
        );
        assert!(report.any_failed());
    }

    #[test]
    fn test_all_success_and_skips() {
        let mut report = RunReport::default();
        report.record("blue", true, None);
        assert!(!report.any_failed());
        report.skip("NCA");
        assert!(report.any_failed());
        assert!(report.to_string().contains("NCA: Skipped"));
    }
}
