pub mod chat_stream;
pub mod config;
pub mod credentials;
pub mod delivery;
pub mod message;
