//! Scripted collaborators for pipeline tests

use std::collections::VecDeque;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use catmig_common::TaggedRecord;
use catmig_recon::authority::AuthorityTransport;
use catmig_recon::identifier::Identifier;
use catmig_recon::output::RecordSink;
use catmig_recon::{ReconError, ReconResult};

/// Transport answering from a queue of canned bodies
///
/// An empty queue answers with a transport error.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    responses: Arc<Mutex<VecDeque<String>>>,
    calls: Arc<AtomicUsize>,
    requested: Arc<Mutex<Vec<String>>>,
}

impl ScriptedTransport {
    pub fn new<S: Into<String>>(responses: impl IntoIterator<Item = S>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses.into_iter().map(Into::into).collect())),
            calls: Arc::new(AtomicUsize::new(0)),
            requested: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Identifiers asked for, one entry per call
    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuthorityTransport for ScriptedTransport {
    async fn fetch(&self, identifier: &Identifier) -> ReconResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requested.lock().unwrap().push(identifier.to_string());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ReconError::Transport(format!("no response scripted for {identifier}")))
    }
}

/// Record sink that keeps everything written to it
#[derive(Clone, Default)]
pub struct CapturingSink(Arc<Mutex<Vec<TaggedRecord>>>);

impl CapturingSink {
    pub fn records(&self) -> Vec<TaggedRecord> {
        self.0.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }
}

impl RecordSink for CapturingSink {
    fn write_record(&mut self, record: &TaggedRecord) -> catmig_common::Result<()> {
        self.0.lock().unwrap().push(record.clone());
        Ok(())
    }
}

/// Byte buffer shared between a writer handed to the code under test and the test
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn text(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }

    pub fn bytes(&self) -> Vec<u8> {
        self.0.lock().unwrap().clone()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
