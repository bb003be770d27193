use std::sync::Mutex;

/// Per-subtask status reported to an [`OutputSink`] (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkStatus {
    Running,
    Completed,
    Failed,
}

/// Contract the dispatcher publishes streamed chunks and status transitions
/// to, one instance per subtask. Implementations are free to render in any
/// layout but MUST present completed outputs in subtask-identifier order
/// once a wave ends — that guarantee is the caller's responsibility to
/// uphold (the dispatcher buffers per-wave output and flushes in order), not
/// this trait's.
pub trait OutputSink: Send + Sync {
    fn start(&self);
    fn chunk(&self, id: &str, text: &str);
    fn status(&self, id: &str, status: SinkStatus);
    fn stop(&self);
}

/// Discards everything. Default sink for headless operation.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl OutputSink for NullSink {
    fn start(&self) {}
    fn chunk(&self, _id: &str, _text: &str) {}
    fn status(&self, _id: &str, _status: SinkStatus) {}
    fn stop(&self) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    Start,
    Chunk { id: String, text: String },
    Status { id: String, status: SinkStatus },
    Stop,
}

/// Buffers every call in arrival order, for asserting the §4.C "ascending
/// identifier order, post-wave" rendering guarantee in tests without a real
/// terminal renderer.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SinkEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().expect("sink mutex poisoned").clone()
    }
}

impl OutputSink for RecordingSink {
    fn start(&self) {
        self.events.lock().expect("sink mutex poisoned").push(SinkEvent::Start);
    }

    fn chunk(&self, id: &str, text: &str) {
        self.events
            .lock()
            .expect("sink mutex poisoned")
            .push(SinkEvent::Chunk { id: id.to_string(), text: text.to_string() });
    }

    fn status(&self, id: &str, status: SinkStatus) {
        self.events
            .lock()
            .expect("sink mutex poisoned")
            .push(SinkEvent::Status { id: id.to_string(), status });
    }

    fn stop(&self) {
        self.events.lock().expect("sink mutex poisoned").push(SinkEvent::Stop);
    }
}
