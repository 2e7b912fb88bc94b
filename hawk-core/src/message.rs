//! Inbound message model and message-text recovery.
//!
//! A message may carry its interesting text somewhere other than the body: in
//! a link preview, a media caption, an unsupported-media placeholder, a text
//! link entity, or the message it forwards. [`recover_text`] resolves all of
//! these into one plain string before extraction.

use tracing::debug;

use crate::transport::ChatTransport;

/// A message as delivered by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub id: i32,
    pub chat_id: i64,
    pub sender_id: Option<i64>,
    pub text: String,
    pub media: Option<MessageMedia>,
    pub entities: Vec<MessageEntity>,
    pub forward: Option<ForwardRef>,
    /// Unix timestamp (seconds).
    pub date: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageMedia {
    WebpagePreview { url: Option<String> },
    Captioned { caption: Option<String> },
    Unsupported { raw_text: Option<String> },
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageEntity {
    TextUrl { url: String },
    Other,
}

/// Points at the original of a forwarded message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForwardRef {
    pub chat_id: i64,
    pub message_id: i32,
}

/// Where recovered text was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextOrigin {
    Body,
    WebpagePreview,
    Caption,
    UnsupportedMedia,
    EntityUrl,
    Forwarded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveredText {
    pub origin: TextOrigin,
    pub text: String,
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.filter(|s| !s.trim().is_empty())
}

impl IncomingMessage {
    /// Text available without further network calls, in fallback order.
    pub fn local_text(&self) -> Option<RecoveredText> {
        if let Some(text) = non_empty(Some(&self.text)) {
            return Some(RecoveredText {
                origin: TextOrigin::Body,
                text: text.to_owned(),
            });
        }

        let from_media = match &self.media {
            Some(MessageMedia::WebpagePreview { url }) => {
                non_empty(url.as_deref()).map(|t| (TextOrigin::WebpagePreview, t))
            }
            Some(MessageMedia::Captioned { caption }) => {
                non_empty(caption.as_deref()).map(|t| (TextOrigin::Caption, t))
            }
            Some(MessageMedia::Unsupported { raw_text }) => {
                non_empty(raw_text.as_deref()).map(|t| (TextOrigin::UnsupportedMedia, t))
            }
            Some(MessageMedia::Other) | None => None,
        };
        if let Some((origin, text)) = from_media {
            return Some(RecoveredText {
                origin,
                text: text.to_owned(),
            });
        }

        self.entities.iter().find_map(|entity| match entity {
            MessageEntity::TextUrl { url } => non_empty(Some(url)).map(|url| RecoveredText {
                origin: TextOrigin::EntityUrl,
                text: url.to_owned(),
            }),
            MessageEntity::Other => None,
        })
    }
}

/// Resolve the text of `message`, first non-empty source wins.
///
/// Falls back to fetching the original of a forwarded message. Lookup errors
/// are logged and treated as "no text".
pub async fn recover_text(
    transport: &dyn ChatTransport,
    message: &IncomingMessage,
) -> Option<RecoveredText> {
    if let Some(local) = message.local_text() {
        return Some(local);
    }

    let forward = message.forward?;
    match transport
        .get_message(forward.chat_id, forward.message_id)
        .await
    {
        Ok(Some(original)) => original.local_text().map(|r| RecoveredText {
            origin: TextOrigin::Forwarded,
            text: r.text,
        }),
        Ok(None) => None,
        Err(e) => {
            debug!(
                chat_id = forward.chat_id,
                message_id = forward.message_id,
                error = %e,
                "Could not fetch forwarded original"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockTransport, message};

    #[test]
    fn test_body_wins_over_media() {
        let mut msg = message(-100, 1, "hello");
        msg.media = Some(MessageMedia::Captioned {
            caption: Some("caption".into()),
        });
        let recovered = msg.local_text().unwrap();
        assert_eq!(recovered.origin, TextOrigin::Body);
        assert_eq!(recovered.text, "hello");
    }

    #[test]
    fn test_media_fallbacks() {
        let mut msg = message(-100, 1, "   ");
        msg.media = Some(MessageMedia::WebpagePreview {
            url: Some("https://dexscreener.com/solana/abc".into()),
        });
        assert_eq!(msg.local_text().unwrap().origin, TextOrigin::WebpagePreview);

        msg.media = Some(MessageMedia::Unsupported {
            raw_text: Some("raw".into()),
        });
        assert_eq!(msg.local_text().unwrap().origin, TextOrigin::UnsupportedMedia);

        msg.media = Some(MessageMedia::Captioned { caption: None });
        msg.entities = vec![
            MessageEntity::Other,
            MessageEntity::TextUrl {
                url: "https://pump.fun/coin/x".into(),
            },
        ];
        let recovered = msg.local_text().unwrap();
        assert_eq!(recovered.origin, TextOrigin::EntityUrl);
        assert_eq!(recovered.text, "https://pump.fun/coin/x");
    }

    #[tokio::test]
    async fn test_forwarded_original_is_fetched() {
        let transport = MockTransport::new();
        transport.put_message(message(-200, 9, "original text")).await;

        let mut msg = message(-100, 1, "");
        msg.forward = Some(ForwardRef {
            chat_id: -200,
            message_id: 9,
        });
        let recovered = recover_text(&transport, &msg).await.unwrap();
        assert_eq!(recovered.origin, TextOrigin::Forwarded);
        assert_eq!(recovered.text, "original text");

        msg.forward = Some(ForwardRef {
            chat_id: -200,
            message_id: 10,
        });
        assert!(recover_text(&transport, &msg).await.is_none());
    }
}
