use serde::Serialize;

#[derive(Serialize, Clone, Debug)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// Body of a chat completion request. The message order is the conversation
/// turn order and is preserved as-is on the wire.
#[derive(Serialize, Clone, Debug)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
}
