use std::path::PathBuf;

use anyhow::Context as _;
use chrono::NaiveDate;
use thiserror::Error;

use crate::cli::{Command, CommonArgs, ExtractArgs, PaidArgs};

/// One portal client. Credentials come from the environment.
#[derive(Clone)]
pub struct Account {
    pub name: String,
    pub login_user: String,
    pub login_password: String,
    pub worksheet: String,
}

impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account")
            .field("name", &self.name)
            .field("login_user", &self.login_user)
            .field("login_password", &"<redacted>")
            .field("worksheet", &self.worksheet)
            .finish()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("missing configuration: {}", missing.join(", "))]
pub struct MissingConfig {
    pub missing: Vec<String>,
}

fn env_key(client: &str, suffix: &str) -> String {
    format!("{}_{}", client.to_uppercase(), suffix)
}

/// `{CLIENT}_WORKSHEET`, if set and non-blank.
pub fn worksheet_for(client: &str, lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
    lookup(&env_key(client, "WORKSHEET")).filter(|v| !v.trim().is_empty())
}

impl Account {
    pub fn from_env(name: &str) -> Result<Self, MissingConfig> {
        Self::from_lookup(name, |key| std::env::var(key).ok())
    }

    /// Resolve `{NAME}_LOGIN_USER`, `{NAME}_LOGIN_PASSWORD` and
    /// `{NAME}_WORKSHEET` through `lookup`.
    pub fn from_lookup(
        name: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, MissingConfig> {
        let mut missing = Vec::new();
        let mut get = |suffix: &str| {
            let key = env_key(name, suffix);
            match lookup(&key).filter(|v| !v.trim().is_empty()) {
                Some(v) => v,
                None => {
                    missing.push(key);
                    String::new()
                }
            }
        };
        let login_user = get("LOGIN_USER");
        let login_password = get("LOGIN_PASSWORD");
        let worksheet = get("WORKSHEET");
        if !missing.is_empty() {
            return Err(MissingConfig { missing });
        }
        Ok(Self {
            name: name.to_string(),
            login_user,
            login_password,
            worksheet,
        })
    }
}

#[derive(Debug, Clone)]
pub struct GoogleConfig {
    pub spreadsheet_id: String,
    pub credentials: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ExtractConfig {
    pub clients: Vec<String>,
    pub google: GoogleConfig,
    pub invoice_folder: String,
    pub webdriver_url: String,
    pub chrome_binary: Option<String>,
    pub screenshot_dir: PathBuf,
    pub portal_api: String,
    pub portal_url: String,
    pub cutoff: NaiveDate,
    pub no_progress_bar: bool,
}

#[derive(Debug, Clone)]
pub struct PaidConfig {
    pub clients: Vec<String>,
    pub google: GoogleConfig,
    pub paid_folder: String,
    pub no_progress_bar: bool,
}

#[derive(Debug, Clone)]
pub enum Config {
    Extract(ExtractConfig),
    Paid(PaidConfig),
}

pub(crate) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

fn clients(raw: Vec<String>) -> Vec<String> {
    raw.into_iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect()
}

fn google(common: &CommonArgs) -> GoogleConfig {
    GoogleConfig {
        spreadsheet_id: common.spreadsheet_id.clone(),
        credentials: expand_tilde(&common.credentials),
    }
}

impl Config {
    pub fn from_cli(command: Command) -> anyhow::Result<Self> {
        match command {
            Command::Extract(args) => Ok(Config::Extract(ExtractConfig::from_args(args)?)),
            Command::Paid(args) => Ok(Config::Paid(PaidConfig::from_args(args))),
        }
    }
}

impl ExtractConfig {
    fn from_args(args: ExtractArgs) -> anyhow::Result<Self> {
        let cutoff = NaiveDate::parse_from_str(args.cutoff.trim(), "%Y-%m-%d").with_context(
            || format!("Cannot parse cutoff '{}' as an ISO date (2024-12-01)", args.cutoff),
        )?;
        Ok(Self {
            google: google(&args.common),
            clients: clients(args.common.clients),
            invoice_folder: args.invoice_folder,
            webdriver_url: args.webdriver_url,
            chrome_binary: args.chrome_binary.filter(|b| !b.trim().is_empty()),
            screenshot_dir: expand_tilde(&args.screenshot_dir),
            portal_api: args.portal_api,
            portal_url: args.portal_url,
            cutoff,
            no_progress_bar: args.common.no_progress_bar,
        })
    }
}

impl PaidConfig {
    fn from_args(args: PaidArgs) -> Self {
        Self {
            google: google(&args.common),
            clients: clients(args.common.clients),
            paid_folder: args.paid_folder,
            no_progress_bar: args.common.no_progress_bar,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_expand_tilde_with_home() {
        let result = expand_tilde("~/creds.json");
        if let Some(home) = dirs::home_dir() {
            assert_eq!(result, home.join("creds.json"));
        }
    }

    #[test]
    fn test_expand_tilde_no_prefix() {
        assert_eq!(expand_tilde("/abs/k.json"), PathBuf::from("/abs/k.json"));
        assert_eq!(expand_tilde("k.json"), PathBuf::from("k.json"));
    }

    #[test]
    fn test_account_from_upper_cased_keys() {
        let lookup = env(&[
            ("BLUE_LOGIN_USER", "123"),
            ("BLUE_LOGIN_PASSWORD", "pw"),
            ("BLUE_WORKSHEET", "Blue Tab"),
        ]);
        let account = Account::from_lookup("blue", lookup).unwrap();
        assert_eq!(account.name, "blue");
        assert_eq!(account.login_user, "123");
        assert_eq!(account.worksheet, "Blue Tab");
        assert!(!format!("{:?}", account).contains("pw"));
    }

    #[test]
    fn test_account_reports_every_missing_key() {
        let lookup = env(&[("NCA_LOGIN_USER", "1"), ("NCA_WORKSHEET", " ")]);
        let err = Account::from_lookup("nca", lookup).unwrap_err();
        assert_eq!(
            err.missing,
            vec!["NCA_LOGIN_PASSWORD".to_string(), "NCA_WORKSHEET".to_string()]
        );
    }

    #[test]
    fn test_worksheet_for() {
        let lookup = env(&[("SOFT_WORKSHEET", "Soft")]);
        assert_eq!(worksheet_for("soft", &lookup).as_deref(), Some("Soft"));
        assert_eq!(worksheet_for("dna", &lookup), None);
    }

    #[test]
    fn test_from_cli_parses_cutoff() {
        let cli = Cli::try_parse_from([
            "invoice-harvester",
            "extract",
            "--spreadsheet-id",
            "s",
            "--invoice-folder",
            "f",
            "--cutoff",
            "2025-03-01",
            "--client",
            "blue, ,soft",
        ])
        .unwrap();
        let Config::Extract(cfg) = Config::from_cli(cli.command).unwrap() else {
            panic!("expected extract config");
        };
        assert_eq!(cfg.cutoff, NaiveDate::from_ymd_opt(2025, 3, 1).unwrap());
        assert_eq!(cfg.clients, vec!["blue", "soft"]);
    }

    #[test]
    fn test_from_cli_rejects_bad_cutoff() {
        let cli = Cli::try_parse_from([
            "invoice-harvester",
            "extract",
            "--spreadsheet-id",
            "s",
            "--invoice-folder",
            "f",
            "--cutoff",
            "December",
        ])
        .unwrap();
        assert!(Config::from_cli(cli.command).is_err());
    }
}
