use clap::{Args, Parser, Subcommand};

use crate::portal::endpoints::{PORTAL_API_ROOT, PORTAL_LOGIN_URL};
use crate::types::LogLevel;

pub const DEFAULT_CLIENTS: &str = "blue,criatech,soft,softcomp,DNA,NCA";

#[derive(Parser, Debug)]
#[command(
    name = "invoice-harvester",
    about = "Collect utility invoices into a spreadsheet and a Drive folder"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Log level (RUST_LOG takes precedence)
    #[arg(long, value_enum, default_value = "info", global = true)]
    pub log_level: LogLevel,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Log in to the portal, refresh each client's tab and upload new PDFs
    Extract(ExtractArgs),
    /// Produce watermarked "paid" copies of the PDFs linked in each tab
    Paid(PaidArgs),
}

#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// Client(s) to process, in order
    #[arg(long = "client", value_delimiter = ',', default_value = DEFAULT_CLIENTS)]
    pub clients: Vec<String>,

    /// Target spreadsheet id
    #[arg(long, env = "SPREADSHEET_ID")]
    pub spreadsheet_id: String,

    /// Google service-account key file
    #[arg(long, env = "GOOGLE_APPLICATION_CREDENTIALS", default_value = "credentials.json")]
    pub credentials: String,

    /// Disable progress bar
    #[arg(long)]
    pub no_progress_bar: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ExtractArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Drive folder receiving invoice PDFs
    #[arg(long, env = "INVOICE_FOLDER_ID")]
    pub invoice_folder: String,

    /// WebDriver server (chromedriver) URL
    #[arg(long, env = "WEBDRIVER_URL", default_value = "http://localhost:9515")]
    pub webdriver_url: String,

    /// Chrome binary passed to the WebDriver
    #[arg(long, env = "CHROME_BINARY")]
    pub chrome_binary: Option<String>,

    /// Where failed-login screenshots are written
    #[arg(long, default_value = ".")]
    pub screenshot_dir: String,

    /// Drop invoices due before this ISO date
    #[arg(long, default_value = "2024-12-01")]
    pub cutoff: String,

    /// Portal REST API root
    #[arg(long, default_value = PORTAL_API_ROOT)]
    pub portal_api: String,

    /// Portal login page
    #[arg(long, default_value = PORTAL_LOGIN_URL)]
    pub portal_url: String,
}

#[derive(Args, Debug, Clone)]
pub struct PaidArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Drive folder receiving watermarked copies
    #[arg(long, env = "PAID_FOLDER_ID")]
    pub paid_folder: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_defaults() {
        let cli = Cli::try_parse_from([
            "invoice-harvester",
            "extract",
            "--spreadsheet-id",
            "sheet",
            "--invoice-folder",
            "folder",
        ])
        .unwrap();
        assert_eq!(cli.log_level, LogLevel::Info);
        let Command::Extract(args) = cli.command else {
            panic!("expected extract");
        };
        assert_eq!(
            args.common.clients,
            vec!["blue", "criatech", "soft", "softcomp", "DNA", "NCA"]
        );
        assert_eq!(args.cutoff, "2024-12-01");
        assert_eq!(args.portal_api, PORTAL_API_ROOT);
        assert!(!args.common.no_progress_bar);
    }

    #[test]
    fn test_clients_comma_delimited_and_repeatable() {
        let cli = Cli::try_parse_from([
            "invoice-harvester",
            "paid",
            "--spreadsheet-id",
            "s",
            "--paid-folder",
            "p",
            "--client",
            "blue,soft",
            "--client",
            "NCA",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert_eq!(cli.log_level, LogLevel::Debug);
        let Command::Paid(args) = cli.command else {
            panic!("expected paid");
        };
        assert_eq!(args.common.clients, vec!["blue", "soft", "NCA"]);
        assert_eq!(args.paid_folder, "p");
    }
}
