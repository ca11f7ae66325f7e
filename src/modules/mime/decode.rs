use crate::get_encoding;

/// Charsets tried after the declared one, in priority order. Cyrillic
/// vendors routinely mislabel windows-1251 content, so it sits right behind
/// utf-8.
pub const FALLBACK_CHARSETS: [&str; 4] = ["utf-8", "windows-1251", "koi8-r", "iso-8859-1"];

/// Ordered fallible decode: declared charset first, then the fallback chain,
/// accepting the first decode with no replacement characters. Lossy utf-8 is
/// the last resort, so this never fails.
pub fn decode_text(raw: &[u8], declared: Option<&str>) -> String {
    let mut labels: Vec<&str> = Vec::with_capacity(1 + FALLBACK_CHARSETS.len());
    if let Some(declared) = declared.filter(|l| !l.trim().is_empty()) {
        labels.push(declared);
    }
    for fallback in FALLBACK_CHARSETS {
        if !labels.iter().any(|l| l.eq_ignore_ascii_case(fallback)) {
            labels.push(fallback);
        }
    }
    for label in labels {
        if let Some(encoding) = get_encoding!(label) {
            let (text, _, had_errors) = encoding.decode(raw);
            if !had_errors {
                return text.into_owned();
            }
        }
    }
    String::from_utf8_lossy(raw).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declared_charset_wins_when_clean() {
        let raw = "Привет".as_bytes();
        assert_eq!(decode_text(raw, Some("utf-8")), "Привет");
    }

    #[test]
    fn falls_back_past_a_lying_charset_label() {
        // windows-1251 bytes for "Привет" are invalid utf-8.
        let raw: &[u8] = &[0xCF, 0xF0, 0xE8, 0xE2, 0xE5, 0xF2];
        assert_eq!(decode_text(raw, Some("utf-8")), "Привет");
    }

    #[test]
    fn unknown_label_is_skipped_not_fatal() {
        assert_eq!(decode_text(b"hello", Some("x-bogus-charset")), "hello");
    }

    #[test]
    fn lossy_replacement_is_the_last_resort() {
        // 0x98 is unmapped in windows-1251 and invalid utf-8; every chain
        // entry that rejects it gets skipped but a string still comes back.
        let raw: &[u8] = &[0x68, 0x98, 0x69];
        let decoded = decode_text(raw, None);
        assert!(decoded.starts_with('h'));
        assert!(decoded.ends_with('i'));
    }
}
