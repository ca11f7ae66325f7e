use crate::modules::error::code::ErrorCode;
use crate::modules::error::HarvestResult;
use crate::modules::settings::cli::SETTINGS;
use crate::raise_error;
use std::path::PathBuf;
use std::sync::LazyLock;

pub static DATA_DIR_MANAGER: LazyLock<DataDirManager> = LazyLock::new(DataDirManager::new);

/// Directory layout under the configured root:
/// `attachments/<vendor-id>/` for downloads, `watermarks/` for the per-rule
/// "last processed" files and `logs/` for rolling log output.
#[derive(Debug, Clone)]
pub struct DataDirManager {
    pub root: PathBuf,
    pub attachments_dir: PathBuf,
    pub watermark_dir: PathBuf,
    pub log_dir: PathBuf,
}

impl DataDirManager {
    fn new() -> Self {
        let root = SETTINGS.mailharvest_root_dir.clone();
        Self {
            attachments_dir: root.join("attachments"),
            watermark_dir: root.join("watermarks"),
            log_dir: root.join("logs"),
            root,
        }
    }

    pub fn initialize(&self) -> HarvestResult<()> {
        for dir in [
            &self.root,
            &self.attachments_dir,
            &self.watermark_dir,
            &self.log_dir,
        ] {
            std::fs::create_dir_all(dir).map_err(|e| {
                raise_error!(
                    format!("Failed to create data directory {:?}: {}", dir, e),
                    ErrorCode::MissingConfiguration
                )
            })?;
        }
        Ok(())
    }
}
