use serde::{Deserialize, Serialize};

use crate::api::ChatMessage;

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// One conversation turn. An ordered sequence of these forms the history
/// sent with every request; the order carries meaning and must survive
/// serialization untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }

    pub fn is_user(self) -> bool {
        self == Role::User
    }

    pub fn is_assistant(self) -> bool {
        self == Role::Assistant
    }
}

impl AsRef<str> for Role {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl TryFrom<&str> for Role {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "system" => Ok(Role::System),
            _ => Err(format!("invalid message role: {value}")),
        }
    }
}

impl TryFrom<String> for Role {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from(value.as_str())
    }
}

impl From<Role> for String {
    fn from(value: Role) -> Self {
        value.as_str().to_string()
    }
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn to_api(&self) -> ChatMessage {
        ChatMessage {
            role: self.role.as_str().to_string(),
            content: self.content.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_round_trip_through_strings() {
        for role in [Role::User, Role::Assistant, Role::System] {
            assert_eq!(Role::try_from(role.as_str()), Ok(role));
        }
    }

    #[test]
    fn invalid_role_strings_are_rejected() {
        assert!(Role::try_from("moderator").is_err());
    }

    #[test]
    fn api_conversion_keeps_role_and_content() {
        let api = Message::system("Be terse.").to_api();
        assert_eq!(api.role, "system");
        assert_eq!(api.content, "Be terse.");
    }

    #[test]
    fn message_order_survives_serialization() {
        let history = vec![Message::user("a"), Message::assistant("b"), Message::user("c")];
        let json = serde_json::to_string(&history).unwrap();
        let contents: Vec<&str> = json.matches(r#""content":""#).collect();
        assert_eq!(contents.len(), 3);
        assert!(json.find(r#""a""#).unwrap() < json.find(r#""b""#).unwrap());
        assert!(json.find(r#""b""#).unwrap() < json.find(r#""c""#).unwrap());
    }
}
