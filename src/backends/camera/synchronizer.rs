// SPDX-License-Identifier: GPL-3.0-only

//! Output fan-in and timestamp synchronization
//!
//! Each output stage of a running stream (video, depth, metadata) pushes an
//! [`OutputEvent`] onto one channel. A single consumer feeds the events into a
//! [`Synchronizer`], which groups them by capture timestamp and emits one
//! [`SynchronizedDataCollection`] per timestamp once every keyed output has
//! reported for it.
//!
//! ```text
//!  video stage ─┐
//!  depth stage ─┼─▶ mpsc ─▶ Synchronizer ─▶ collection per timestamp
//!  meta stage  ─┘
//! ```
//!
//! Collections are always emitted in timestamp order. A collection that never
//! completes is flushed as-is when a newer one completes, when too many are
//! pending, or when the stream ends.

use super::types::{DepthData, MetadataObject, VideoFrame};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::mpsc;
use std::time::Duration;
use tracing::debug;

/// The three outputs wired into a capture session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputKind {
    Video,
    Depth,
    Metadata,
}

impl OutputKind {
    pub const ALL: [OutputKind; 3] = [OutputKind::Video, OutputKind::Depth, OutputKind::Metadata];
}

impl std::fmt::Display for OutputKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputKind::Video => write!(f, "video"),
            OutputKind::Depth => write!(f, "depth"),
            OutputKind::Metadata => write!(f, "metadata"),
        }
    }
}

/// Why an output discarded its datum for a timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// The consumer was too slow and late frames are discarded
    LateData,
    /// The output ran out of buffers
    OutOfBuffers,
    /// A capture discontinuity (device reconfiguration, interruption)
    Discontinuity,
}

/// A datum that was either delivered or explicitly marked dropped
#[derive(Debug, Clone)]
pub enum Delivery<T> {
    Delivered(T),
    Dropped(DropReason),
}

impl<T> Delivery<T> {
    pub fn was_dropped(&self) -> bool {
        matches!(self, Delivery::Dropped(_))
    }

    /// The delivered datum, or `None` if it was dropped
    pub fn into_delivered(self) -> Option<T> {
        match self {
            Delivery::Delivered(value) => Some(value),
            Delivery::Dropped(_) => None,
        }
    }
}

/// A typed event pushed by one output stage
#[derive(Debug, Clone)]
pub enum OutputEvent {
    Video {
        timestamp: Duration,
        data: Delivery<VideoFrame>,
    },
    Depth {
        timestamp: Duration,
        data: Delivery<Arc<DepthData>>,
    },
    Metadata {
        timestamp: Duration,
        objects: Vec<MetadataObject>,
    },
}

impl OutputEvent {
    pub fn timestamp(&self) -> Duration {
        match self {
            OutputEvent::Video { timestamp, .. }
            | OutputEvent::Depth { timestamp, .. }
            | OutputEvent::Metadata { timestamp, .. } => *timestamp,
        }
    }

    pub fn kind(&self) -> OutputKind {
        match self {
            OutputEvent::Video { .. } => OutputKind::Video,
            OutputEvent::Depth { .. } => OutputKind::Depth,
            OutputEvent::Metadata { .. } => OutputKind::Metadata,
        }
    }
}

/// Sending half handed to a backend stream
///
/// Cloned once per output stage. Sends fail silently once the synchronizer
/// has gone away; the return value lets a stream notice and stop.
#[derive(Debug, Clone)]
pub struct OutputSink {
    sender: mpsc::Sender<OutputEvent>,
}

impl OutputSink {
    pub fn new(sender: mpsc::Sender<OutputEvent>) -> Self {
        Self { sender }
    }

    /// Push an event, returning `false` if the consumer is gone
    pub fn send(&self, event: OutputEvent) -> bool {
        self.sender.send(event).is_ok()
    }
}

/// Everything the outputs reported for one capture timestamp
#[derive(Debug, Clone)]
pub struct SynchronizedDataCollection {
    pub timestamp: Duration,
    pub video: Option<Delivery<VideoFrame>>,
    pub depth: Option<Delivery<Arc<DepthData>>>,
    pub metadata: Option<Vec<MetadataObject>>,
}

impl SynchronizedDataCollection {
    fn empty(timestamp: Duration) -> Self {
        Self {
            timestamp,
            video: None,
            depth: None,
            metadata: None,
        }
    }

    /// Whether `kind` reported (delivered or dropped) for this timestamp
    pub fn has(&self, kind: OutputKind) -> bool {
        match kind {
            OutputKind::Video => self.video.is_some(),
            OutputKind::Depth => self.depth.is_some(),
            OutputKind::Metadata => self.metadata.is_some(),
        }
    }

    fn insert(&mut self, event: OutputEvent) {
        match event {
            OutputEvent::Video { data, .. } => self.video = Some(data),
            OutputEvent::Depth { data, .. } => self.depth = Some(data),
            OutputEvent::Metadata { objects, .. } => self.metadata = Some(objects),
        }
    }
}

/// Merges per-output events into per-timestamp collections
#[derive(Debug)]
pub struct Synchronizer {
    keys: Vec<OutputKind>,
    pending: BTreeMap<Duration, SynchronizedDataCollection>,
    max_pending: usize,
    last_emitted: Option<Duration>,
}

impl Synchronizer {
    /// Synchronizer keyed on `keys`: a collection completes once all of them reported
    pub fn new(keys: &[OutputKind]) -> Self {
        Self {
            keys: keys.to_vec(),
            pending: BTreeMap::new(),
            max_pending: crate::constants::sync::MAX_PENDING,
            last_emitted: None,
        }
    }

    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = max_pending.max(1);
        self
    }

    /// Number of collections still waiting for outputs
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Feed one event; returns the collections that became ready, oldest first
    pub fn push(&mut self, event: OutputEvent) -> Vec<SynchronizedDataCollection> {
        let timestamp = event.timestamp();

        if self.last_emitted.is_some_and(|last| timestamp <= last) {
            debug!(
                output = %event.kind(),
                timestamp_us = timestamp.as_micros() as u64,
                "Late event for an already emitted timestamp"
            );
            return Vec::new();
        }

        let collection = self
            .pending
            .entry(timestamp)
            .or_insert_with(|| SynchronizedDataCollection::empty(timestamp));
        collection.insert(event);

        let complete = self.keys.iter().all(|k| collection.has(*k));
        let mut ready = Vec::new();

        if complete {
            // Everything older than a completed timestamp will never complete in order
            let mut newer = self.pending.split_off(&timestamp);
            let current = newer.remove(&timestamp);
            let older = std::mem::replace(&mut self.pending, newer);
            ready.extend(older.into_values());
            ready.extend(current);
        }

        while self.pending.len() > self.max_pending {
            if let Some((_, oldest)) = self.pending.pop_first() {
                ready.push(oldest);
            }
        }

        if let Some(last) = ready.last() {
            self.last_emitted = Some(last.timestamp);
        }
        ready
    }

    /// Emit every pending collection, oldest first
    pub fn flush(&mut self) -> Vec<SynchronizedDataCollection> {
        let pending = std::mem::take(&mut self.pending);
        let ready: Vec<_> = pending.into_values().collect();
        if let Some(last) = ready.last() {
            self.last_emitted = Some(last.timestamp);
        }
        ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::types::PixelFormat;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn video(ts: u64) -> OutputEvent {
        OutputEvent::Video {
            timestamp: ms(ts),
            data: Delivery::Delivered(VideoFrame {
                width: 1,
                height: 1,
                data: Arc::from(vec![0u8; 4]),
                format: PixelFormat::BGRA,
                stride: 4,
                timestamp: ms(ts),
            }),
        }
    }

    fn depth_dropped(ts: u64) -> OutputEvent {
        OutputEvent::Depth {
            timestamp: ms(ts),
            data: Delivery::Dropped(DropReason::LateData),
        }
    }

    fn metadata(ts: u64) -> OutputEvent {
        OutputEvent::Metadata {
            timestamp: ms(ts),
            objects: Vec::new(),
        }
    }

    #[test]
    fn test_collection_emitted_when_all_outputs_reported() {
        let mut sync = Synchronizer::new(&OutputKind::ALL);
        assert!(sync.push(depth_dropped(0)).is_empty());
        assert!(sync.push(metadata(0)).is_empty());
        let ready = sync.push(video(0));
        assert_eq!(ready.len(), 1);
        assert!(ready[0].has(OutputKind::Video));
        assert!(ready[0].depth.as_ref().unwrap().was_dropped());
        assert_eq!(sync.pending_len(), 0);
    }

    #[test]
    fn test_incomplete_older_collection_flushed_first() {
        let mut sync = Synchronizer::new(&OutputKind::ALL);
        // Metadata for t=0 never arrives
        sync.push(video(0));
        sync.push(depth_dropped(0));

        sync.push(video(33));
        sync.push(depth_dropped(33));
        let ready = sync.push(metadata(33));

        let timestamps: Vec<_> = ready.iter().map(|c| c.timestamp).collect();
        assert_eq!(timestamps, vec![ms(0), ms(33)]);
        assert!(!ready[0].has(OutputKind::Metadata));
    }

    #[test]
    fn test_late_event_is_discarded() {
        let mut sync = Synchronizer::new(&OutputKind::ALL);
        sync.push(video(10));
        sync.push(depth_dropped(10));
        assert_eq!(sync.push(metadata(10)).len(), 1);

        assert!(sync.push(metadata(10)).is_empty());
        assert!(sync.push(video(5)).is_empty());
        assert_eq!(sync.pending_len(), 0);
    }

    #[test]
    fn test_pending_bound_flushes_oldest() {
        let mut sync = Synchronizer::new(&OutputKind::ALL).with_max_pending(2);
        assert!(sync.push(video(0)).is_empty());
        assert!(sync.push(video(1)).is_empty());
        let ready = sync.push(video(2));
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].timestamp, ms(0));
        assert_eq!(sync.pending_len(), 2);
    }

    #[test]
    fn test_flush_drains_in_order() {
        let mut sync = Synchronizer::new(&OutputKind::ALL);
        sync.push(video(20));
        sync.push(depth_dropped(10));
        let ready = sync.flush();
        let timestamps: Vec<_> = ready.iter().map(|c| c.timestamp).collect();
        assert_eq!(timestamps, vec![ms(10), ms(20)]);
        assert!(sync.push(video(15)).is_empty());
    }

    #[test]
    fn test_video_only_key_completes_immediately() {
        let mut sync = Synchronizer::new(&[OutputKind::Video]);
        assert_eq!(sync.push(video(0)).len(), 1);
    }
}
