//! Write worker
//!
//! Single thread that applies Puts one at a time: encode, rotate if the
//! active segment is full, append, update the index.

use std::sync::Arc;

use crossbeam::channel::{self, Receiver, Sender};
use tracing::debug;

use crate::error::{LogKvError, Result};
use crate::record::{checked_frame_len, encode};
use crate::segment::Segment;

use super::index::IndexOp;
use super::segments::SegmentSet;

/// A queued Put and where to send its outcome
pub(crate) struct WriteRequest {
    pub(crate) key: String,
    pub(crate) value: String,
    pub(crate) reply: Sender<Result<()>>,
}

pub(crate) struct WriteWorker {
    set: Arc<SegmentSet>,
    index_ops: Sender<IndexOp>,
}

impl WriteWorker {
    pub(crate) fn new(set: Arc<SegmentSet>, index_ops: Sender<IndexOp>) -> Self {
        Self { set, index_ops }
    }

    /// Process requests until every sender is gone
    pub(crate) fn run(self, requests: Receiver<WriteRequest>) {
        debug!("Write worker started");

        for request in requests.iter() {
            let result = self.apply(&request.key, &request.value);
            let _ = request.reply.send(result);
        }

        debug!("Write worker stopped");
    }

    fn apply(&self, key: &str, value: &str) -> Result<()> {
        if checked_frame_len(key.len(), value.len()).is_none() {
            return Err(LogKvError::RecordTooLarge {
                key_len: key.len(),
                value_len: value.len(),
            });
        }

        let frame = encode(key, value);
        let frame_len = frame.len() as u64;

        let mut active = self.set.active();
        let limit = self.set.config().segment_size_limit;
        if active.size() > 0 && active.size() + frame_len > limit {
            active = self.rotate(&active)?;
        }

        let appended = active.append(&frame)?;

        // Wait for the index write: a rotation must never seal a segment
        // whose index is still missing entries, and the caller must not
        // return before its write is visible to lookups.
        let (done_tx, done_rx) = channel::bounded(1);
        self.index_ops
            .send(IndexOp::Record {
                segment: Arc::clone(&active),
                key: key.to_string(),
                offset: appended.offset,
                done: done_tx,
            })
            .map_err(|_| LogKvError::Closed)?;
        done_rx.recv().map_err(|_| LogKvError::Closed)?;

        Ok(())
    }

    /// Seal `current` and install a fresh active segment
    fn rotate(&self, current: &Arc<Segment>) -> Result<Arc<Segment>> {
        let config = self.set.config();
        let id = self.set.allocate_id();
        let next = Arc::new(Segment::create(self.set.dir(), id, config.sync_strategy)?);

        // Seal before publishing: every non-last segment in the list is sealed
        let sealed = current.seal();
        let count = self.set.push(Arc::clone(&next));

        debug!(
            sealed = current.id(),
            active = id,
            segments = count,
            "Rotated segment"
        );

        if count >= config.compaction_trigger {
            self.set.schedule_compaction();
        }

        sealed?;
        Ok(next)
    }
}
