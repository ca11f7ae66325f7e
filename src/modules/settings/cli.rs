use clap::{builder::ValueParser, Parser};
use std::{path::PathBuf, sync::LazyLock};

#[cfg(not(test))]
pub static SETTINGS: LazyLock<Settings> = LazyLock::new(Settings::parse);

#[cfg(test)]
pub static SETTINGS: LazyLock<Settings> = LazyLock::new(Settings::new_for_test);

fn parse_folder_list(s: &str) -> Result<Vec<String>, String> {
    Ok(s.split(',')
        .map(|f| f.trim().to_string())
        .filter(|f| !f.is_empty())
        .collect())
}

#[derive(Debug, Parser)]
#[clap(
    name = "mailharvest",
    about = "Scans an IMAP mailbox for vendor price-list attachments,
    filtering messages against per-vendor ingestion rules and downloading the approved files.",
    version = env!("CARGO_PKG_VERSION")
)]
pub struct Settings {
    /// mailharvest log level (default: "info")
    #[clap(
        long,
        default_value = "info",
        env,
        help = "Set the log level for mailharvest"
    )]
    pub mailharvest_log_level: String,

    /// Enable ANSI formatted logs
    #[clap(long, default_value = "true", env, help = "Enable ANSI formatted logs")]
    pub mailharvest_ansi_logs: bool,

    /// Enable log file output (otherwise logs go to stdout)
    #[clap(
        long,
        default_value = "false",
        env,
        help = "Enable log file output (otherwise logs go to stdout)"
    )]
    pub mailharvest_log_to_file: bool,

    /// Maximum number of log files (default: 5)
    #[clap(
        long,
        default_value = "5",
        env,
        help = "Set the maximum number of log files to retain"
    )]
    pub mailharvest_max_log_files: usize,

    /// IMAP server hostname
    #[clap(
        long,
        default_value = "imap.yandex.ru",
        env,
        help = "Set the IMAP server hostname"
    )]
    pub mailharvest_imap_host: String,

    /// IMAP server port (implicit TLS)
    #[clap(
        long,
        default_value = "993",
        env,
        help = "Set the IMAP server port (implicit TLS)"
    )]
    pub mailharvest_imap_port: u16,

    /// Mailbox login name
    #[clap(long, env, help = "Set the mailbox login name")]
    pub mailharvest_username: String,

    /// Mailbox password
    #[clap(long, env, help = "Set the mailbox password")]
    pub mailharvest_password: String,

    /// Root directory for downloads, watermarks and logs
    #[clap(
        long,
        env,
        help = "Set the root directory for downloads, watermarks and log files"
    )]
    pub mailharvest_root_dir: PathBuf,

    /// Path to the JSON file holding vendors and ingestion rules
    #[clap(
        long,
        env,
        help = "Set the path of the JSON file holding vendors and ingestion rules"
    )]
    pub mailharvest_rules_file: PathBuf,

    #[clap(
        long,
        default_value = "10",
        env,
        help = "Set the number of folders scanned in parallel",
        value_parser = clap::value_parser!(u16).range(1..)
    )]
    pub mailharvest_folder_workers: u16,

    #[clap(
        long,
        default_value = "5",
        env,
        help = "Set the number of messages processed in parallel per folder",
        value_parser = clap::value_parser!(u16).range(1..)
    )]
    pub mailharvest_message_workers: u16,

    #[clap(
        long,
        env,
        help = "Maximum number of live IMAP sessions (default: folder workers x 2)",
        value_parser = clap::value_parser!(u16).range(1..)
    )]
    pub mailharvest_max_connections: Option<u16>,

    #[clap(
        long,
        default_value = "300",
        env,
        help = "Seconds of inactivity after which a pooled IMAP session is retired",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub mailharvest_stale_after_secs: u64,

    /// Folders that are never scanned (comma-separated, raw IMAP names)
    #[clap(
        long,
        default_value = "Outbox,Spam,Trash,Drafts,Archive,Sent",
        env,
        help = "Set the system folders excluded from scanning (comma-separated)",
        value_parser = ValueParser::new(parse_folder_list)
    )]
    pub mailharvest_excluded_folders: Vec<String>,

    /// Scan only messages from the last N days
    #[clap(long, env, help = "Scan only messages received within the last N days")]
    pub mailharvest_days: Option<u32>,

    /// Scan only messages on or after this date (YYYY-MM-DD)
    #[clap(long, env, help = "Scan only messages on or after this date (YYYY-MM-DD)")]
    pub mailharvest_since: Option<chrono::NaiveDate>,

    /// Scan only messages before this date (YYYY-MM-DD)
    #[clap(long, env, help = "Scan only messages before this date (YYYY-MM-DD)")]
    pub mailharvest_before: Option<chrono::NaiveDate>,

    /// Scan unread messages only
    #[clap(
        long,
        default_value = "false",
        env,
        help = "Scan unread messages only"
    )]
    pub mailharvest_unread_only: bool,
}

impl Settings {
    pub fn max_connections(&self) -> usize {
        self.mailharvest_max_connections
            .map(usize::from)
            .unwrap_or(usize::from(self.mailharvest_folder_workers) * 2)
    }

    #[cfg(test)]
    fn new_for_test() -> Self {
        Self {
            mailharvest_log_level: "info".to_string(),
            mailharvest_ansi_logs: false,
            mailharvest_log_to_file: false,
            mailharvest_max_log_files: 5,
            mailharvest_imap_host: "imap.yandex.ru".to_string(),
            mailharvest_imap_port: 993,
            mailharvest_username: "tester@example.com".to_string(),
            mailharvest_password: "secret".to_string(),
            mailharvest_root_dir: std::env::temp_dir().join("mailharvest_test_data"),
            mailharvest_rules_file: std::env::temp_dir().join("mailharvest_rules.json"),
            mailharvest_folder_workers: 2,
            mailharvest_message_workers: 2,
            mailharvest_max_connections: Some(2),
            mailharvest_stale_after_secs: 300,
            mailharvest_excluded_folders: vec![
                "Outbox".into(),
                "Spam".into(),
                "Trash".into(),
                "Drafts".into(),
                "Archive".into(),
                "Sent".into(),
            ],
            mailharvest_days: Some(30),
            mailharvest_since: None,
            mailharvest_before: None,
            mailharvest_unread_only: false,
        }
    }
}
