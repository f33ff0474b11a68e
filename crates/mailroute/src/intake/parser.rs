//! Flattens a provider message into the fields the pipeline routes on.

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use chrono::{DateTime, Utc};
use encoding_rs::{Encoding, UTF_8};
use serde::Serialize;

use crate::mailbox::{Header, MessagePart, RawMessage};

/// URL-safe base64 that accepts bodies with or without padding.
const BODY_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// A parsed message, ready for routing. Not persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchedMessage {
    pub id: String,
    pub subject: String,
    pub from: String,
    pub to: String,
    pub body: String,
    pub received_at: DateTime<Utc>,
}

/// Parses a fully fetched message.
///
/// Missing headers become empty strings and a missing or malformed `Date`
/// becomes the Unix epoch. Parts that fail to decode are left out of the body;
/// text is decoded with the charset each part declares, UTF-8 otherwise.
pub fn parse(raw: &RawMessage) -> FetchedMessage {
    let headers = &raw.payload.headers;

    FetchedMessage {
        id: raw.id.clone(),
        subject: header_value(headers, "Subject").to_string(),
        from: header_value(headers, "From").to_string(),
        to: header_value(headers, "To").to_string(),
        body: extract_body(&raw.payload),
        received_at: parse_date(header_value(headers, "Date")),
    }
}

fn header_value<'a>(headers: &'a [Header], name: &str) -> &'a str {
    headers
        .iter()
        .find(|h| h.name == name)
        .map(|h| h.value.as_str())
        .unwrap_or("")
}

fn parse_date(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc2822(value.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::UNIX_EPOCH)
}

/// Decodes the part's own body, then appends every text part below it in
/// document order. Multipart containers are descended into.
fn extract_body(part: &MessagePart) -> String {
    let mut body = decode_part(part).unwrap_or_default();

    for child in &part.parts {
        if child.mime_type.contains("text/") || child.mime_type.starts_with("multipart/") {
            body.push_str(&extract_body(child));
        }
    }

    body
}

fn decode_part(part: &MessagePart) -> Option<String> {
    let data = part.body.as_ref()?.data.as_deref().filter(|d| !d.is_empty())?;
    let bytes = BODY_ENGINE.decode(data.trim()).ok()?;
    let encoding = part_charset(part)
        .and_then(|label| Encoding::for_label(label.as_bytes()))
        .unwrap_or(UTF_8);
    let (text, _, had_errors) = encoding.decode(&bytes);
    if had_errors {
        log::debug!("Part {} has bytes invalid in {}", part.mime_type, encoding.name());
    }
    Some(text.into_owned())
}

/// The `charset` parameter of the part's own `Content-Type` header.
fn part_charset(part: &MessagePart) -> Option<&str> {
    let content_type = part
        .headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case("Content-Type"))?;
    content_type.value.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches('"'))
            .filter(|v| !v.is_empty())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailbox::PartBody;

    fn text_part(mime: &str, text: &str) -> MessagePart {
        MessagePart {
            mime_type: mime.to_string(),
            body: Some(PartBody {
                data: Some(BODY_ENGINE.encode(text)),
                size: text.len() as u64,
                attachment_id: None,
            }),
            ..Default::default()
        }
    }

    fn header(name: &str, value: &str) -> Header {
        Header {
            name: name.to_string(),
            value: value.to_string(),
        }
    }

    #[test]
    fn test_parse_headers() {
        let mut payload = text_part("text/plain", "hello");
        payload.headers = vec![
            header("From", "alice@example.com"),
            header("To", "support@example.com"),
            header("Subject", "紧急 - 客服部门"),
            header("Date", "Tue, 2 Jan 2024 10:30:00 +0800"),
        ];
        let raw = RawMessage {
            id: "m1".into(),
            payload,
            ..Default::default()
        };

        let msg = parse(&raw);
        assert_eq!(msg.id, "m1");
        assert_eq!(msg.subject, "紧急 - 客服部门");
        assert_eq!(msg.from, "alice@example.com");
        assert_eq!(msg.to, "support@example.com");
        assert_eq!(msg.body, "hello");
        assert_eq!(msg.received_at.to_rfc3339(), "2024-01-02T02:30:00+00:00");
    }

    #[test]
    fn test_missing_headers_are_empty() {
        let msg = parse(&RawMessage::default());
        assert_eq!(msg.subject, "");
        assert_eq!(msg.from, "");
        assert_eq!(msg.body, "");
        assert_eq!(msg.received_at, DateTime::UNIX_EPOCH);
    }

    #[test]
    fn test_bad_date_is_epoch() {
        assert_eq!(parse_date("yesterday"), DateTime::UNIX_EPOCH);
    }

    #[test]
    fn test_header_lookup_is_exact() {
        let headers = vec![header("subject", "lower"), header("Subject", "proper")];
        assert_eq!(header_value(&headers, "Subject"), "proper");
    }

    #[test]
    fn test_multipart_concatenates_text_parts() {
        let payload = MessagePart {
            mime_type: "multipart/mixed".into(),
            parts: vec![
                text_part("text/plain", "plain "),
                text_part("application/pdf", "binary"),
                text_part("text/html", "<b>html</b>"),
            ],
            ..Default::default()
        };
        assert_eq!(extract_body(&payload), "plain <b>html</b>");
    }

    #[test]
    fn test_nested_multipart() {
        let payload = MessagePart {
            mime_type: "multipart/mixed".into(),
            parts: vec![MessagePart {
                mime_type: "multipart/alternative".into(),
                parts: vec![text_part("text/plain", "inner")],
                ..Default::default()
            }],
            ..Default::default()
        };
        assert_eq!(extract_body(&payload), "inner");
    }

    #[test]
    fn test_undecodable_part_is_skipped() {
        let mut broken = text_part("text/plain", "");
        broken.body = Some(PartBody {
            data: Some("!!not base64!!".into()),
            ..Default::default()
        });
        let payload = MessagePart {
            mime_type: "multipart/mixed".into(),
            parts: vec![broken, text_part("text/plain", "ok")],
            ..Default::default()
        };
        assert_eq!(extract_body(&payload), "ok");
    }

    #[test]
    fn test_accepts_padded_and_unpadded() {
        let mut part = text_part("text/plain", "");
        part.body = Some(PartBody {
            data: Some("YQ==".into()),
            ..Default::default()
        });
        assert_eq!(decode_part(&part).as_deref(), Some("a"));
        part.body = Some(PartBody {
            data: Some("YQ".into()),
            ..Default::default()
        });
        assert_eq!(decode_part(&part).as_deref(), Some("a"));
    }

    #[test]
    fn test_url_safe_alphabet() {
        // 0xfb 0xff encodes to "-_8" in the URL-safe alphabet.
        let mut part = text_part("text/plain", "");
        part.headers = vec![header("Content-Type", "text/plain; charset=windows-1252")];
        part.body = Some(PartBody {
            data: Some("-_8".into()),
            ..Default::default()
        });
        assert_eq!(decode_part(&part).as_deref(), Some("ûÿ"));
    }

    #[test]
    fn test_gbk_part_is_decoded_by_charset() {
        let gbk = [0xd6, 0xd0, 0xce, 0xc4];
        let mut part = text_part("text/plain", "");
        part.headers = vec![header("Content-Type", "text/plain; charset=\"GBK\"")];
        part.body = Some(PartBody {
            data: Some(BODY_ENGINE.encode(gbk)),
            size: gbk.len() as u64,
            attachment_id: None,
        });
        let payload = MessagePart {
            mime_type: "multipart/alternative".into(),
            parts: vec![part, text_part("text/html", "<p>ok</p>")],
            ..Default::default()
        };
        assert_eq!(extract_body(&payload), "中文<p>ok</p>");
    }

    #[test]
    fn test_gb2312_label_and_case_insensitive_header() {
        let mut part = text_part("text/plain", "");
        part.headers = vec![header("content-type", "text/plain; format=flowed; Charset=gb2312")];
        part.body = Some(PartBody {
            data: Some(BODY_ENGINE.encode([0xd6, 0xd0, 0xce, 0xc4])),
            ..Default::default()
        });
        assert_eq!(decode_part(&part).as_deref(), Some("中文"));
    }

    #[test]
    fn test_missing_or_unknown_charset_is_utf8() {
        let mut part = text_part("text/plain", "héllo");
        assert_eq!(decode_part(&part).as_deref(), Some("héllo"));
        part.headers = vec![header("Content-Type", "text/plain; charset=x-made-up")];
        assert_eq!(decode_part(&part).as_deref(), Some("héllo"));
    }
}
