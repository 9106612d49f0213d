use std::sync::{Arc, Mutex};

use crate::core::chat_stream::TransportError;
use crate::core::delivery::StreamSink;

/// Everything a sink observed during one send.
#[derive(Default, Clone, Debug)]
pub struct SinkRecord {
    pub chunks: Vec<String>,
    pub completed: u32,
    pub errors: Vec<String>,
}

/// Sink that records every callback for later assertions. Clones share the
/// same record, so tests keep one handle and give another to the transport.
#[derive(Default, Clone)]
pub struct RecordingSink(Arc<Mutex<SinkRecord>>);

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self) -> SinkRecord {
        self.0.lock().unwrap().clone()
    }

    pub fn concatenated(&self) -> String {
        self.0.lock().unwrap().chunks.concat()
    }
}

impl StreamSink for RecordingSink {
    fn on_chunk(&mut self, text: &str) {
        self.0.lock().unwrap().chunks.push(text.to_owned());
    }

    fn on_complete(&mut self) {
        self.0.lock().unwrap().completed += 1;
    }

    fn on_error(&mut self, error: TransportError) {
        self.0.lock().unwrap().errors.push(error.to_string());
    }
}
