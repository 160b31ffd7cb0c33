use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn from_bot_marker(authored_by_bot: bool) -> Self {
        if authored_by_bot {
            Self::Assistant
        } else {
            Self::User
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One piece of a multi-part turn. Binary payloads are already base64 encoded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContentPart {
    Text { value: String },
    Image { mime: String, base64: String },
    Document { filename: String, mime: String, base64: String },
}

impl ContentPart {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text { value: value.into() }
    }

    /// `data:` URL form used by inline image and file inputs.
    pub fn data_url(&self) -> Option<String> {
        match self {
            Self::Text { .. } => None,
            Self::Image { mime, base64 } | Self::Document { mime, base64, .. } => {
                Some(format!("data:{mime};base64,{base64}"))
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TurnContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: TurnContent,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self { role: Role::User, content: TurnContent::Text(text.into()) }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: TurnContent::Text(text.into()) }
    }

    pub fn plain_text(&self) -> Option<&str> {
        match &self.content {
            TurnContent::Text(text) => Some(text),
            TurnContent::Parts(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ContentPart, Role};

    #[test]
    fn role_follows_bot_marker() {
        assert_eq!(Role::from_bot_marker(true), Role::Assistant);
        assert_eq!(Role::from_bot_marker(false), Role::User);
    }

    #[test]
    fn binary_parts_render_as_data_urls() {
        let image = ContentPart::Image { mime: "image/png".to_owned(), base64: "AAAA".to_owned() };
        assert_eq!(image.data_url().as_deref(), Some("data:image/png;base64,AAAA"));
        assert_eq!(ContentPart::text("hi").data_url(), None);
    }
}
