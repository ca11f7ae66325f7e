use crate::modules::error::code::ErrorCode;
use crate::modules::error::HarvestResult;
use crate::modules::utils::sanitize_filename;
use crate::raise_error;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Writes approved attachment bytes under
/// `<attachments-root>/<vendor-id>/<sanitized-filename>`, resolving name
/// collisions with `_1`, `_2`, ... suffixes. Files are opened with
/// create-new semantics so two workers racing on the same name each end up
/// with their own file instead of one clobbering the other.
#[derive(Debug, Clone)]
pub struct AttachmentWriter {
    root: PathBuf,
}

impl AttachmentWriter {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn write(&self, vendor_id: u64, filename: &str, data: &[u8]) -> HarvestResult<PathBuf> {
        let clean = sanitize_filename(filename);
        let dir = self.root.join(vendor_id.to_string());
        std::fs::create_dir_all(&dir).map_err(|e| {
            raise_error!(
                format!("Failed to create download directory {:?}: {}", dir, e),
                ErrorCode::AttachmentWriteFailed
            )
        })?;

        let (stem, ext) = split_extension(&clean);
        let mut counter = 0u32;
        loop {
            let candidate = if counter == 0 {
                dir.join(&clean)
            } else {
                dir.join(format!("{stem}_{counter}{ext}"))
            };
            match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&candidate)
            {
                Ok(mut file) => {
                    file.write_all(data).map_err(|e| {
                        raise_error!(
                            format!("Failed to write attachment {:?}: {}", candidate, e),
                            ErrorCode::AttachmentWriteFailed
                        )
                    })?;
                    return Ok(candidate);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    counter += 1;
                }
                Err(e) => {
                    return Err(raise_error!(
                        format!("Failed to create attachment file {:?}: {}", candidate, e),
                        ErrorCode::AttachmentWriteFailed
                    ));
                }
            }
        }
    }
}

fn split_extension(filename: &str) -> (&str, String) {
    match Path::new(filename).extension() {
        Some(ext) => {
            let ext = ext.to_string_lossy();
            let stem = &filename[..filename.len() - ext.len() - 1];
            (stem, format!(".{ext}"))
        }
        None => (filename, String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_under_vendor_directory() {
        let dir = tempfile::tempdir().unwrap();
        let writer = AttachmentWriter::new(dir.path().to_path_buf());

        let path = writer.write(7, "price.xlsx", b"abc").unwrap();

        assert_eq!(path, dir.path().join("7").join("price.xlsx"));
        assert_eq!(std::fs::read(path).unwrap(), b"abc");
    }

    #[test]
    fn collisions_get_numeric_suffixes_without_overwriting() {
        let dir = tempfile::tempdir().unwrap();
        let writer = AttachmentWriter::new(dir.path().to_path_buf());

        let first = writer.write(1, "list.xlsx", b"one").unwrap();
        let second = writer.write(1, "list.xlsx", b"two").unwrap();
        let third = writer.write(1, "list.xlsx", b"three").unwrap();

        assert_eq!(first.file_name().unwrap(), "list.xlsx");
        assert_eq!(second.file_name().unwrap(), "list_1.xlsx");
        assert_eq!(third.file_name().unwrap(), "list_2.xlsx");
        assert_eq!(std::fs::read(first).unwrap(), b"one");
        assert_eq!(std::fs::read(second).unwrap(), b"two");
    }

    #[test]
    fn illegal_characters_are_sanitized() {
        let dir = tempfile::tempdir().unwrap();
        let writer = AttachmentWriter::new(dir.path().to_path_buf());

        let path = writer.write(1, "pri/ce:2025?.xlsx", b"x").unwrap();

        assert_eq!(path.file_name().unwrap(), "pri_ce_2025_.xlsx");
    }

    #[test]
    fn extensionless_names_still_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let writer = AttachmentWriter::new(dir.path().to_path_buf());

        writer.write(1, "README", b"a").unwrap();
        let second = writer.write(1, "README", b"b").unwrap();

        assert_eq!(second.file_name().unwrap(), "README_1");
    }
}
