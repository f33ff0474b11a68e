//! Composition of the forwarded message.

use serde::{Deserialize, Serialize};

use super::parser::FetchedMessage;

/// Time format shown in the quoted header block.
const RECEIVED_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// How forwarded messages are labelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForwardTemplate {
    /// Prepended to the original subject, separated by one space.
    pub subject_prefix: String,
    /// Small print appended under the quoted message. Empty disables it.
    pub footer: String,
}

impl Default for ForwardTemplate {
    fn default() -> Self {
        Self {
            subject_prefix: "[Fwd]".to_string(),
            footer: "This message was forwarded automatically by mailroute.".to_string(),
        }
    }
}

impl ForwardTemplate {
    pub fn subject(&self, message: &FetchedMessage) -> String {
        if self.subject_prefix.is_empty() {
            message.subject.clone()
        } else {
            format!("{} {}", self.subject_prefix, message.subject)
        }
    }

    /// Wraps the original body in a quote block listing the original
    /// sender, recipient, subject and received time.
    ///
    /// Header values are HTML-escaped; the body is embedded as is since it is
    /// usually HTML already.
    pub fn html_body(&self, message: &FetchedMessage) -> String {
        let mut html = format!(
            concat!(
                "<div style=\"border-left: 4px solid #ccc; padding-left: 10px; margin: 10px 0;\">\n",
                "<h3>Original message</h3>\n",
                "<p><strong>From:</strong> {from}</p>\n",
                "<p><strong>To:</strong> {to}</p>\n",
                "<p><strong>Subject:</strong> {subject}</p>\n",
                "<p><strong>Received:</strong> {received}</p>\n",
                "<hr style=\"margin: 10px 0;\">\n",
                "<div>\n{body}\n</div>\n",
                "</div>\n"
            ),
            from = html_escape::encode_text(&message.from),
            to = html_escape::encode_text(&message.to),
            subject = html_escape::encode_text(&message.subject),
            received = message.received_at.format(RECEIVED_FORMAT),
            body = message.body,
        );

        if !self.footer.is_empty() {
            html.push_str(&format!(
                "<br>\n<p style=\"font-size: 12px; color: #666;\">{}</p>\n",
                html_escape::encode_text(&self.footer)
            ));
        }

        html
    }
}
