use tracing::error;

use mooai_core::domain::turn::{ContentPart, Role, Turn, TurnContent};

use crate::{attachments::AttachmentMap, thread::SlackMessage};

/// One turn per message, in thread order.
///
/// Messages with accepted attachments carry the attachment parts followed by
/// their text (when non-empty). Everything else is plain text, possibly empty.
pub fn format_turns(messages: &[SlackMessage], attachments: &AttachmentMap) -> Vec<Turn> {
    if messages.is_empty() {
        error!(event_name = "slack.format.empty_thread", "slack thread messages are empty");
        return Vec::new();
    }

    messages
        .iter()
        .map(|message| {
            let role = Role::from_bot_marker(message.authored_by_bot());
            let text = message.text_or_empty();
            let parts = message.ts.as_deref().and_then(|ts| attachments.get(ts));

            let content = match parts {
                Some(parts) if !parts.is_empty() => {
                    let mut content = parts.clone();
                    if !text.is_empty() {
                        content.push(ContentPart::text(text));
                    }
                    TurnContent::Parts(content)
                }
                _ => TurnContent::Text(text.to_owned()),
            };

            Turn { role, content }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use mooai_core::domain::turn::{ContentPart, Role, TurnContent};

    use super::format_turns;
    use crate::{attachments::AttachmentMap, thread::SlackMessage};

    fn message(ts: &str, text: Option<&str>, bot: bool) -> SlackMessage {
        SlackMessage {
            ts: Some(ts.to_owned()),
            text: text.map(str::to_owned),
            bot_id: bot.then(|| "B1".to_owned()),
            ..SlackMessage::default()
        }
    }

    #[test]
    fn plain_thread_keeps_order_roles_and_text() {
        let messages = vec![
            message("1.0", Some("hi"), false),
            message("1.1", Some("hello!"), true),
            message("1.2", Some("how are you?"), false),
        ];

        let turns = format_turns(&messages, &AttachmentMap::new());

        assert_eq!(turns.len(), messages.len());
        let roles: Vec<Role> = turns.iter().map(|turn| turn.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::User]);
        let texts: Vec<&str> = turns.iter().filter_map(|turn| turn.plain_text()).collect();
        assert_eq!(texts, vec!["hi", "hello!", "how are you?"]);
    }

    #[test]
    fn empty_message_still_yields_a_turn() {
        let turns = format_turns(&[message("1.0", None, false)], &AttachmentMap::new());
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].content, TurnContent::Text(String::new()));
    }

    #[test]
    fn attachments_precede_trailing_text() {
        let image = ContentPart::Image { mime: "image/png".to_owned(), base64: "AAAA".to_owned() };
        let mut attachments = AttachmentMap::new();
        attachments.insert("1.0".to_owned(), vec![image.clone()]);
        attachments.insert("2.0".to_owned(), vec![image.clone()]);

        let turns = format_turns(
            &[message("1.0", Some("what is this?"), false), message("2.0", Some(""), false)],
            &attachments,
        );

        assert_eq!(
            turns[0].content,
            TurnContent::Parts(vec![image.clone(), ContentPart::text("what is this?")])
        );
        assert_eq!(turns[1].content, TurnContent::Parts(vec![image]));
    }

    #[test]
    fn empty_input_yields_no_turns() {
        assert!(format_turns(&[], &AttachmentMap::new()).is_empty());
    }
}
