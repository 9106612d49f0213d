use tokio::sync::mpsc;

use crate::core::chat_stream::TransportError;

/// Caller-supplied callbacks that receive decoded stream output.
///
/// For one send, `on_chunk` fires zero or more times in parse order, then
/// exactly one of `on_complete`/`on_error` fires — unless the send was
/// cancelled, which resolves it silently with no terminal callback at all.
pub trait StreamSink {
    fn on_chunk(&mut self, text: &str);
    fn on_complete(&mut self);
    fn on_error(&mut self, error: TransportError);
}

/// Enforces the delivery protocol around a sink: after the first terminal
/// outcome (including a silent cancellation) every further event is dropped.
pub(crate) struct Delivery<S> {
    sink: S,
    terminated: bool,
}

impl<S: StreamSink> Delivery<S> {
    pub(crate) fn new(sink: S) -> Self {
        Self {
            sink,
            terminated: false,
        }
    }

    pub(crate) fn chunk(&mut self, text: &str) {
        if !self.terminated {
            self.sink.on_chunk(text);
        }
    }

    pub(crate) fn complete(&mut self) {
        if !self.terminated {
            self.terminated = true;
            self.sink.on_complete();
        }
    }

    pub(crate) fn error(&mut self, error: TransportError) {
        if !self.terminated {
            self.terminated = true;
            self.sink.on_error(error);
        }
    }

    /// Resolve the send silently. Cancellation is not a failure and must not
    /// reach the error callback.
    pub(crate) fn cancel(&mut self) {
        self.terminated = true;
    }
}

/// Stream output as plain values, for consumers that drain a channel from an
/// event loop instead of implementing [`StreamSink`] directly.
#[derive(Clone, Debug)]
pub enum StreamMessage {
    Chunk(String),
    Error(String),
    End,
}

/// Forwards sink callbacks onto an unbounded channel. Errors are followed by
/// `End` so a receiver can treat `End` as the single stop condition.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<StreamMessage>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<StreamMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl StreamSink for ChannelSink {
    fn on_chunk(&mut self, text: &str) {
        let _ = self.tx.send(StreamMessage::Chunk(text.to_owned()));
    }

    fn on_complete(&mut self) {
        let _ = self.tx.send(StreamMessage::End);
    }

    fn on_error(&mut self, error: TransportError) {
        let _ = self.tx.send(StreamMessage::Error(error.to_string()));
        let _ = self.tx.send(StreamMessage::End);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test_utils::RecordingSink;

    #[test]
    fn terminal_callback_fires_exactly_once() {
        let sink = RecordingSink::new();
        let mut delivery = Delivery::new(sink.clone());

        delivery.chunk("one");
        delivery.complete();
        delivery.complete();
        delivery.error(TransportError::Busy);

        let record = sink.record();
        assert_eq!(record.chunks, vec!["one"]);
        assert_eq!(record.completed, 1);
        assert!(record.errors.is_empty());
    }

    #[test]
    fn chunks_after_termination_are_dropped() {
        let sink = RecordingSink::new();
        let mut delivery = Delivery::new(sink.clone());

        delivery.chunk("kept");
        delivery.error(TransportError::Busy);
        delivery.chunk("dropped");

        let record = sink.record();
        assert_eq!(record.chunks, vec!["kept"]);
        assert_eq!(record.errors.len(), 1);
    }

    #[test]
    fn cancellation_is_silent_and_final() {
        let sink = RecordingSink::new();
        let mut delivery = Delivery::new(sink.clone());

        delivery.chunk("before");
        delivery.cancel();
        delivery.chunk("after");
        delivery.complete();
        delivery.error(TransportError::Busy);

        let record = sink.record();
        assert_eq!(record.chunks, vec!["before"]);
        assert_eq!(record.completed, 0);
        assert!(record.errors.is_empty());
    }

    #[test]
    fn channel_sink_follows_errors_with_end() {
        let (mut sink, mut rx) = ChannelSink::new();

        sink.on_chunk("hi");
        sink.on_error(TransportError::Busy);

        assert!(matches!(rx.try_recv(), Ok(StreamMessage::Chunk(text)) if text == "hi"));
        assert!(matches!(rx.try_recv(), Ok(StreamMessage::Error(_))));
        assert!(matches!(rx.try_recv(), Ok(StreamMessage::End)));
        assert!(rx.try_recv().is_err());
    }
}
