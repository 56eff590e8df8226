//! Index worker
//!
//! Single thread through which every index lookup and index write passes,
//! one operation at a time, in arrival order.

use std::sync::Arc;

use crossbeam::channel::{Receiver, Sender};
use tracing::debug;

use crate::segment::Segment;

use super::segments::SegmentSet;

/// Where the most recent record for a key lives
#[derive(Debug, Clone)]
pub struct KeyPosition {
    pub segment: Arc<Segment>,
    pub offset: u64,
}

/// Operations accepted by the index worker
pub(crate) enum IndexOp {
    /// Resolve a key, scanning segments newest → oldest
    Lookup {
        key: String,
        reply: Sender<Option<KeyPosition>>,
    },

    /// Point `key` at `offset` in `segment`; `done` fires once applied
    Record {
        segment: Arc<Segment>,
        key: String,
        offset: u64,
        done: Sender<()>,
    },
}

pub(crate) struct IndexWorker {
    set: Arc<SegmentSet>,
}

impl IndexWorker {
    pub(crate) fn new(set: Arc<SegmentSet>) -> Self {
        Self { set }
    }

    /// Process operations until every sender is gone
    pub(crate) fn run(self, ops: Receiver<IndexOp>) {
        debug!("Index worker started");

        for op in ops.iter() {
            match op {
                IndexOp::Lookup { key, reply } => {
                    let _ = reply.send(self.resolve(&key));
                }
                IndexOp::Record {
                    segment,
                    key,
                    offset,
                    done,
                } => {
                    segment.record(key, offset);
                    let _ = done.send(());
                }
            }
        }

        debug!("Index worker stopped");
    }

    fn resolve(&self, key: &str) -> Option<KeyPosition> {
        let segments = self.set.snapshot();
        segments.iter().rev().find_map(|segment| {
            segment.lookup(key).map(|offset| KeyPosition {
                segment: Arc::clone(segment),
                offset,
            })
        })
    }
}
