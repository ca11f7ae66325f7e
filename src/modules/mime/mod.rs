use crate::modules::error::code::ErrorCode;
use crate::modules::error::HarvestResult;
use crate::modules::mime::decode::decode_text;
use crate::modules::utils::extract_bare_address;
use crate::raise_error;
use chrono::{DateTime, Utc};
use mail_parser::{MessageParser, MimeHeaders};

pub mod decode;

/// What the header-only fetch yields: enough to run the rule filters without
/// ever pulling the message body.
#[derive(Debug, Clone)]
pub struct HeaderSnapshot {
    /// Raw "From" text, display name included.
    pub sender: String,
    /// Bare address extracted from `sender`; falls back to the raw text when
    /// no address-shaped token is present.
    pub sender_email: String,
    pub subject: String,
    pub date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct AttachmentCandidate {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

impl AttachmentCandidate {
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

#[derive(Debug, Clone, Default)]
pub struct MessageContent {
    pub body_text: String,
    pub body_html: String,
    pub attachments: Vec<AttachmentCandidate>,
}

pub fn parse_header(raw: &[u8]) -> HarvestResult<HeaderSnapshot> {
    let message = MessageParser::new().parse(raw).ok_or_else(|| {
        raise_error!(
            "Email header parse result is not available".into(),
            ErrorCode::MessageParseFailed
        )
    })?;

    let sender = message
        .from()
        .and_then(|a| a.first())
        .map(|addr| match (addr.name(), addr.address()) {
            (Some(name), Some(email)) => format!("{} <{}>", name, email),
            (None, Some(email)) => email.to_string(),
            (Some(name), None) => name.to_string(),
            (None, None) => String::new(),
        })
        .unwrap_or_default();
    let sender_email = extract_bare_address(&sender);

    Ok(HeaderSnapshot {
        sender_email,
        sender,
        subject: message.subject().map(String::from).unwrap_or_default(),
        date: message
            .date()
            .and_then(|d| DateTime::from_timestamp(d.to_timestamp(), 0)),
    })
}

/// Parses a full RFC 822 message into body text and attachment candidates.
/// Attachments lacking a filename are skipped rather than failing the
/// message; charset trouble in text parts degrades through the fallback
/// decode chain.
pub fn parse_full(raw: &[u8]) -> HarvestResult<MessageContent> {
    let message = MessageParser::new().parse(raw).ok_or_else(|| {
        raise_error!(
            "Email body parse result is not available".into(),
            ErrorCode::MessageParseFailed
        )
    })?;

    let body_text = match message.body_text(0) {
        Some(text) => text.into_owned(),
        None => message
            .text_bodies()
            .next()
            .map(|part| {
                let declared = part
                    .content_type()
                    .and_then(|ct| ct.attribute("charset"));
                decode_text(part.contents(), declared)
            })
            .unwrap_or_default(),
    };
    let body_html = message
        .body_html(0)
        .map(|html| html.into_owned())
        .unwrap_or_default();

    let mut attachments = Vec::new();
    for part in message.attachments() {
        let Some(filename) = part.attachment_name() else {
            continue;
        };
        let content_type = part
            .content_type()
            .map(|ct| match ct.subtype() {
                Some(subtype) => format!("{}/{}", ct.ctype(), subtype),
                None => ct.ctype().to_string(),
            })
            .unwrap_or_else(|| "application/octet-stream".to_string());
        attachments.push(AttachmentCandidate {
            filename: filename.to_string(),
            content_type,
            data: part.contents().to_vec(),
        });
    }

    Ok(MessageContent {
        body_text,
        body_html,
        attachments,
    })
}
