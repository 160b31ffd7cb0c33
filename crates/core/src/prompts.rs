//! User-facing copy for the assistant.

use crate::domain::reply::SuggestedPrompt;

pub const ASSISTANT_GREETING: &str = "🐄🐮 You called, I herd you! Let's get started!";

pub const MENTION_GREETING: &str = "🐮 Thanks for the moo-mention! Give me a second, and I'll help you with that. If you want me to reply to any later messages in this thread, just mention me again.";

pub const THINKING_STATUS: &str = "is thinking 🐮💭 ...";

pub const FOLLOWUP_PROMPTS_TITLE: &str = "💭✍️ Suggested follow-ups or write your own ";

pub const STARTER_PROMPTS: [&str; 4] = [
    "😊 What are some positive news stories from today?",
    "📧 Help me write an email",
    "🧠 Brainstorm ideas for my next project",
    "🌍 Give me ideas for reducing my carbon footprint",
];

pub const SYSTEM_INSTRUCTIONS: &str = "\
- You are a very friendly and helpful assistant.
- Be concise and to the point.
- Format your responses with markdown and emojis.
- Your responses will be structured with the following components:
  1. Thread Title: A concise title that summarizes the conversation thread (3-5 words) and starts with emojis.
  2. Message Title: A brief header for your current response (optional) and starts with emojis.
  3. Response: Your main response content formatted with markdown and emojis.
  4. Followups: 2-3 suggested follow-up questions the user might want to ask formatted with emojis.
- For thread titles, focus on the overall topic of conversation, not just the current message.
- For message titles, use a short phrase that captures the essence of your response.
- Keep your main response clear, helpful, and well-formatted.
- Suggest followups that are natural extensions of the conversation.
";

pub fn starter_prompts() -> Vec<SuggestedPrompt> {
    STARTER_PROMPTS.iter().map(|prompt| SuggestedPrompt::same(*prompt)).collect()
}

/// The single notice users see when handling fails.
pub fn generic_error(error: &str) -> String {
    format!(":warning: Something went wrong! ({error})")
}

#[cfg(test)]
mod tests {
    use super::{generic_error, starter_prompts};

    #[test]
    fn starter_prompts_repeat_title_as_message() {
        let prompts = starter_prompts();
        assert_eq!(prompts.len(), 4);
        assert!(prompts.iter().all(|prompt| prompt.title == prompt.message));
    }

    #[test]
    fn generic_error_wraps_summary() {
        assert_eq!(generic_error("timeout"), ":warning: Something went wrong! (timeout)");
    }
}
