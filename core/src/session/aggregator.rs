//! Result batch shared by invocation tasks and the reporter

use parking_lot::Mutex;

/// Consecutive records produced by one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultSegment {
    /// Session the records belong to
    pub session_id: String,
    /// Records in completion order
    pub records: Vec<String>,
}

/// Lock-guarded accumulation of successful invocation results
///
/// Appends and drains take the same lock, so a drain observes every append
/// that completed before it and none that started after it. Records are
/// grouped by session so a drain that straddles two sessions never mixes
/// their ids.
#[derive(Debug, Default)]
pub struct ResultBatch {
    segments: Mutex<Vec<ResultSegment>>,
}

impl ResultBatch {
    /// Create an empty batch
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one record for a session
    pub fn append(&self, session_id: &str, record: String) {
        let mut segments = self.segments.lock();
        match segments.last_mut() {
            Some(segment) if segment.session_id == session_id => segment.records.push(record),
            _ => segments.push(ResultSegment {
                session_id: session_id.to_string(),
                records: vec![record],
            }),
        }
    }

    /// Swap the batch for an empty one and return what it held
    pub fn drain(&self) -> Vec<ResultSegment> {
        std::mem::take(&mut *self.segments.lock())
    }

    /// Records currently held across all sessions
    pub fn len(&self) -> usize {
        self.segments
            .lock()
            .iter()
            .map(|segment| segment.records.len())
            .sum()
    }

    /// Whether no records are held
    pub fn is_empty(&self) -> bool {
        self.segments.lock().is_empty()
    }
}
