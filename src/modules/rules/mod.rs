use crate::modules::error::code::ErrorCode;
use crate::modules::error::HarvestResult;
use crate::raise_error;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Attachment extensions treated as spreadsheet candidates during MIME
/// classification, before any per-rule extension allow-list is applied.
pub const SPREADSHEET_EXTENSIONS: [&str; 4] = [".xls", ".xlsx", ".xlsm", ".xlsb"];

pub fn is_spreadsheet_file(filename: &str) -> bool {
    let lower = filename.to_lowercase();
    SPREADSHEET_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vendor {
    pub id: u64,
    pub name: String,
    #[serde(default = "default_active")]
    pub active: bool,
    /// When this vendor's data was last loaded downstream; rules whose
    /// watermark has already passed this point are skipped as unchanged.
    #[serde(default)]
    pub last_load: Option<chrono::DateTime<chrono::Utc>>,
}

fn default_active() -> bool {
    true
}

/// One per-vendor ingestion rule. Keyword lists are semicolon-delimited
/// strings, the extension allow-list is comma-delimited; empty or absent
/// fields impose no constraint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionRule {
    pub id: u64,
    pub vendor_id: u64,
    /// Semicolon-delimited sender address allow-list.
    pub senders: String,
    #[serde(default)]
    pub subject_contains: Option<String>,
    #[serde(default)]
    pub subject_excludes: Option<String>,
    #[serde(default)]
    pub filename_contains: Option<String>,
    #[serde(default)]
    pub filename_excludes: Option<String>,
    /// Comma-delimited extension allow-list, e.g. ".xlsx,.xls".
    #[serde(default)]
    pub extensions: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

/// Case-insensitive keyword gate shared by the subject and filename filters:
/// at least one "contains" keyword must be a substring (OR) and no "excludes"
/// keyword may be (AND of NOT). An unset list imposes nothing.
fn check_filter_conditions(text: &str, contains: Option<&str>, excludes: Option<&str>) -> bool {
    let lower = text.to_lowercase();
    if let Some(contains) = contains.filter(|s| !s.trim().is_empty()) {
        let any_hit = contains
            .split(';')
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .any(|k| lower.contains(&k));
        if !any_hit {
            return false;
        }
    }
    if let Some(excludes) = excludes.filter(|s| !s.trim().is_empty()) {
        let any_hit = excludes
            .split(';')
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .any(|k| lower.contains(&k));
        if any_hit {
            return false;
        }
    }
    true
}

impl IngestionRule {
    pub fn sender_matches(&self, sender_email: &str) -> bool {
        self.senders
            .split(';')
            .map(str::trim)
            .any(|s| s == sender_email)
    }

    pub fn subject_passes(&self, subject: &str) -> bool {
        check_filter_conditions(
            subject,
            self.subject_contains.as_deref(),
            self.subject_excludes.as_deref(),
        )
    }

    /// Filename keyword gate plus the extension allow-list.
    pub fn attachment_approved(&self, filename: &str) -> bool {
        if !check_filter_conditions(
            filename,
            self.filename_contains.as_deref(),
            self.filename_excludes.as_deref(),
        ) {
            return false;
        }
        if let Some(extensions) = self.extensions.as_deref().filter(|s| !s.trim().is_empty()) {
            let lower = filename.to_lowercase();
            return extensions
                .split(',')
                .map(|ext| ext.trim().to_lowercase())
                .filter(|ext| !ext.is_empty())
                .any(|ext| lower.ends_with(&ext));
        }
        true
    }
}

/// The on-disk rules file: active-vendor list plus the ordered rule list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesConfig {
    pub vendors: Vec<Vendor>,
    pub rules: Vec<IngestionRule>,
}

pub fn load_rules_file(path: &Path) -> HarvestResult<RulesConfig> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        raise_error!(
            format!("Failed to read rules file {:?}: {}", path, e),
            ErrorCode::RulesFileInvalid
        )
    })?;
    serde_json::from_str(&raw).map_err(|e| {
        raise_error!(
            format!("Failed to parse rules file {:?}: {}", path, e),
            ErrorCode::RulesFileInvalid
        )
    })
}

/// The rule set one scan operates over: rules kept in caller order (first
/// match wins when senders overlap) with a vendor table for the active check.
#[derive(Debug, Clone)]
pub struct RuleScope {
    rules: Vec<IngestionRule>,
    vendors: HashMap<u64, Vendor>,
}

impl RuleScope {
    pub fn new(vendors: Vec<Vendor>, rules: Vec<IngestionRule>) -> Self {
        Self {
            rules,
            vendors: vendors.into_iter().map(|v| (v.id, v)).collect(),
        }
    }

    /// A scope narrowed to one rule, for single-rule scan requests.
    pub fn single(vendors: Vec<Vendor>, rule: IngestionRule) -> Self {
        Self::new(vendors, vec![rule])
    }

    pub fn rules(&self) -> &[IngestionRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn vendor(&self, id: u64) -> Option<&Vendor> {
        self.vendors.get(&id)
    }

    /// A copy of this scope keeping only the rules `keep` accepts, in the
    /// same order.
    pub fn filtered<P: Fn(&IngestionRule) -> bool>(&self, keep: P) -> RuleScope {
        RuleScope {
            rules: self.rules.iter().filter(|r| keep(r)).cloned().collect(),
            vendors: self.vendors.clone(),
        }
    }

    fn vendor_is_active(&self, vendor_id: u64) -> bool {
        self.vendors.get(&vendor_id).is_some_and(|v| v.active)
    }

    /// First rule (in caller order) that is active, belongs to an active
    /// vendor and lists the sender.
    pub fn find_rule(&self, sender_email: &str) -> Option<&IngestionRule> {
        self.rules
            .iter()
            .filter(|rule| rule.active && self.vendor_is_active(rule.vendor_id))
            .find(|rule| rule.sender_matches(sender_email))
    }

    /// Header-phase decision. The first sender match is binding: if its
    /// subject filter rejects the message, later rules are not consulted.
    pub fn evaluate_header(&self, sender_email: &str, subject: &str) -> Option<&IngestionRule> {
        let rule = self.find_rule(sender_email)?;
        rule.subject_passes(subject).then_some(rule)
    }
}
