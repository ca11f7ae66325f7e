use std::sync::LazyLock;

use regex::Regex;

pub mod net;
pub mod tls;

#[macro_export]
macro_rules! mailharvest_version {
    () => {
        env!("CARGO_PKG_VERSION")
    };
}

#[macro_export]
macro_rules! raise_error {
    ($msg:expr, $code:expr) => {
        $crate::modules::error::HarvestError::Generic {
            message: $msg,
            location: snafu::Location::default(),
            code: $code,
        }
    };
}

#[macro_export]
macro_rules! decode_mailbox_name {
    ($name:expr) => {{
        utf7_imap::decode_utf7_imap($name.to_string())
    }};
}

#[macro_export]
macro_rules! get_encoding {
    ($label:expr) => {
        match encoding_rs::Encoding::for_label($label.as_bytes()) {
            None => None,
            Some(encoding) => Some(encoding),
        }
    };
}

static BARE_ADDRESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").unwrap()
});

static ILLEGAL_FILENAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[<>:"/\\|?*]"#).unwrap());

/// Extracts a bare email address from a raw `From` header value.
///
/// Headers usually carry a display name (`"Vendor Sales" <sales@vendor.com>`),
/// sometimes RFC 2047 encoded, so a permissive pattern match is more robust
/// than strict address parsing. Falls back to the trimmed input when no
/// address-shaped token is present.
pub fn extract_bare_address(raw_from: &str) -> String {
    let trimmed = raw_from.trim();
    BARE_ADDRESS
        .find(trimmed)
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| trimmed.to_string())
}

/// Replaces filesystem-illegal characters in an attachment filename with `_`.
pub fn sanitize_filename(filename: &str) -> String {
    ILLEGAL_FILENAME_CHARS.replace_all(filename, "_").into_owned()
}

/// Formats a second count as `HH:MM:SS` for progress/summary lines.
pub fn format_duration(total_secs: u64) -> String {
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
}
