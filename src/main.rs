use mimalloc::MiMalloc;
use modules::{
    error::HarvestResult,
    imap::{
        manager::{ImapCredentials, ImapSessionManager},
        pool::ConnectionPool,
        retry::RetryPolicy,
    },
    logger,
    rules::{load_rules_file, RuleScope},
    scan::{
        criteria::ScanWindow, download::AttachmentWriter, watermark::WatermarkStore,
        MailboxHarvester, ScanRequest,
    },
    settings::{cli::SETTINGS, dir::DATA_DIR_MANAGER},
    store::memory::MemoryStore,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

mod modules;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

static LOGO: &str = r#"
                  _ _ _                                _
  _ __ ___   __ _(_) | |__   __ _ _ ____   _____  ___| |_
 | '_ ` _ \ / _` | | | '_ \ / _` | '__\ \ / / _ \/ __| __|
 | | | | | | (_| | | | | | | (_| | |   \ V /  __/\__ \ |_
 |_| |_| |_|\__,_|_|_|_| |_|\__,_|_|    \_/ \___||___/\__|

"#;

#[tokio::main]
async fn main() -> HarvestResult<()> {
    logger::initialize_logging();
    info!("{}", LOGO);
    info!("Starting mailharvest");
    info!("Version:  {}", mailharvest_version!());

    DATA_DIR_MANAGER.initialize()?;

    let config = load_rules_file(&SETTINGS.mailharvest_rules_file)?;
    info!(
        "Loaded {} vendors and {} ingestion rules from {:?}.",
        config.vendors.len(),
        config.rules.len(),
        SETTINGS.mailharvest_rules_file
    );
    let scope = RuleScope::new(config.vendors, config.rules);

    let credentials = ImapCredentials {
        host: SETTINGS.mailharvest_imap_host.clone(),
        port: SETTINGS.mailharvest_imap_port,
        username: SETTINGS.mailharvest_username.clone(),
        password: SETTINGS.mailharvest_password.clone(),
    };
    let pool = ConnectionPool::new(
        ImapSessionManager::new(credentials),
        SETTINGS.max_connections(),
        Duration::from_secs(SETTINGS.mailharvest_stale_after_secs),
        RetryPolicy::default(),
    );

    let store = Arc::new(MemoryStore::new());
    let harvester = MailboxHarvester::new(
        pool,
        scope,
        store.clone(),
        AttachmentWriter::new(DATA_DIR_MANAGER.attachments_dir.clone()),
        WatermarkStore::new(DATA_DIR_MANAGER.watermark_dir.clone()),
    );

    let window = if let Some(days) = SETTINGS.mailharvest_days {
        ScanWindow::Days(days)
    } else if SETTINGS.mailharvest_since.is_some() || SETTINGS.mailharvest_before.is_some() {
        ScanWindow::Range {
            since: SETTINGS.mailharvest_since,
            before: SETTINGS.mailharvest_before,
        }
    } else {
        ScanWindow::RecentOnly
    };
    let request = ScanRequest {
        window,
        unread_only: SETTINGS.mailharvest_unread_only,
        excluded_folders: SETTINGS.mailharvest_excluded_folders.clone(),
        folder_workers: usize::from(SETTINGS.mailharvest_folder_workers),
        message_workers: usize::from(SETTINGS.mailharvest_message_workers),
    };

    let report = harvester.run(&request).await?;

    info!(
        "Folders scanned: {} (failed: {}).",
        report.folders_scanned, report.folders_failed
    );
    for harvested in &report.harvested {
        info!(
            "Harvested \"{}\" from {}: {} file(s).",
            harvested.subject,
            decode_mailbox_name!(harvested.folder.clone()),
            harvested.downloaded.len()
        );
    }
    info!(
        "Messages recorded: {}, attachments downloaded: {}.",
        store.message_count(),
        report.harvested.iter().map(|h| h.downloaded.len()).sum::<usize>()
    );
    Ok(())
}
