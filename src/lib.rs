//! Causerie is the streaming transport layer of a chat client: it talks to a
//! remote chat-completion endpoint and turns the response byte stream into
//! incremental text deltas.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns the transport session (one cancellable exchange at a
//!   time), the incremental stream decoder, the delivery contract, credential
//!   access, and configuration.
//! - [`api`] defines the serialized chat payloads sent to the endpoint.
//! - [`utils`] holds small shared helpers such as URL construction.
//!
//! A consumer builds a [`core::chat_stream::ChatTransport`] around a
//! [`core::credentials::CredentialProvider`], calls `send` with the ordered
//! conversation history and a [`core::delivery::StreamSink`], and receives
//! deltas until exactly one terminal outcome: completion, error, or a silent
//! cancellation.

pub mod api;
pub mod core;
pub mod utils;
