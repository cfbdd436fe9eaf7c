//! Secondary message channel used to receive verification codes.

use crate::remote::BoxFuture;
use anyhow::Result;
use mail_parser::MessageParser;

#[derive(Clone, Debug)]
pub struct MailMessage {
    /// Transport identifier passed back to [`Mailbox::mark_seen`].
    pub id: String,
    /// Higher is more recent.
    pub received_order: u64,
    /// RFC 822 source.
    pub raw: Vec<u8>,
}

impl MailMessage {
    /// Decoded message body, preferring the HTML part of multipart messages.
    #[must_use]
    pub fn body(&self) -> Option<String> {
        let message = MessageParser::default().parse(self.raw.as_slice())?;
        message
            .body_html(0)
            .or_else(|| message.body_text(0))
            .map(|body| body.into_owned())
    }
}

/// Mail transport abstraction used by the challenge resolver.
///
/// Implementations open and close their connection inside each call; the resolver
/// never holds a mailbox session across its polling delay.
pub trait Mailbox: Send + Sync {
    /// Up to `limit` unseen messages, most recent first.
    fn fetch_unseen(&self, limit: usize) -> BoxFuture<'_, Result<Vec<MailMessage>>>;

    fn mark_seen<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<()>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(raw: &str) -> MailMessage {
        MailMessage {
            id: "1".to_string(),
            received_order: 1,
            raw: raw.as_bytes().to_vec(),
        }
    }

    #[test]
    fn plain_text_body() {
        let msg = message(
            "From: security@mail.instagram.com\r\n\
             Subject: Verify your account\r\n\
             Content-Type: text/plain; charset=utf-8\r\n\
             \r\n\
             Your code is 482913.\r\n",
        );
        let body = msg.body().unwrap_or_default();
        assert!(body.contains("482913"));
    }

    #[test]
    fn multipart_prefers_html_part() {
        let msg = message(
            "From: security@mail.instagram.com\r\n\
             Subject: Verify your account\r\n\
             MIME-Version: 1.0\r\n\
             Content-Type: multipart/alternative; boundary=\"b1\"\r\n\
             \r\n\
             --b1\r\n\
             Content-Type: text/plain; charset=utf-8\r\n\
             \r\n\
             plain part 111111\r\n\
             --b1\r\n\
             Content-Type: text/html; charset=utf-8\r\n\
             \r\n\
             <p>html part <b>222222</b></p>\r\n\
             --b1--\r\n",
        );
        let body = msg.body().unwrap_or_default();
        assert!(body.contains("222222"));
        assert!(!body.contains("111111"));
    }
}
