//! Optional structured tracing.
//!
//! A process-wide sink receives shaping events selected by a bitmask. The
//! sink is opt-in: while no sink is installed the only cost anywhere in the
//! engine is one relaxed atomic load.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::RwLock;

use lazy_static::lazy_static;

bitflags::bitflags! {
    /// Which event families reach the sink.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TraceMask: u32 {
        const FACE = 0x1;
        const PASS = 0x2;
        const SEGMENT = 0x4;
        const OPCODE = 0x8;
    }
}

/// One traced event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TraceEvent<'a> {
    FaceLoaded {
        num_glyphs: u16,
        num_features: usize,
        num_passes: usize,
    },
    PassStart {
        pass: usize,
        n_slots: usize,
    },
    RuleFired {
        rule: u16,
        n_slots: usize,
    },
    SegmentDone {
        n_slots: usize,
        advance: f32,
    },
    Opcode {
        name: &'a str,
    },
}

/// Receives traced events. Implementations must tolerate concurrent calls.
pub trait TraceSink: Send + Sync {
    fn event(&self, event: &TraceEvent<'_>);
}

static MASK: AtomicU32 = AtomicU32::new(0);

lazy_static! {
    static ref SINK: RwLock<Option<Box<dyn TraceSink>>> = RwLock::new(None);
}

/// Install `sink` and start forwarding the events selected by `mask`.
pub fn start_logging(sink: Box<dyn TraceSink>, mask: TraceMask) {
    *SINK.write().unwrap_or_else(|e| e.into_inner()) = Some(sink);
    MASK.store(mask.bits(), Ordering::Release);
}

/// Remove the sink. Events stop immediately.
pub fn stop_logging() {
    MASK.store(0, Ordering::Release);
    *SINK.write().unwrap_or_else(|e| e.into_inner()) = None;
}

pub(crate) fn enabled(mask: TraceMask) -> bool {
    MASK.load(Ordering::Relaxed) & mask.bits() != 0
}

fn emit(mask: TraceMask, event: TraceEvent<'_>) {
    if !enabled(mask) {
        return;
    }
    if let Some(sink) = &*SINK.read().unwrap_or_else(|e| e.into_inner()) {
        sink.event(&event);
    }
}

pub(crate) fn face_loaded(num_glyphs: u16, num_features: usize, num_passes: usize) {
    emit(
        TraceMask::FACE,
        TraceEvent::FaceLoaded {
            num_glyphs,
            num_features,
            num_passes,
        },
    );
}

pub(crate) fn pass_start(pass: usize, n_slots: usize) {
    emit(TraceMask::PASS, TraceEvent::PassStart { pass, n_slots });
}

pub(crate) fn rule_fired(rule: u16, n_slots: usize) {
    emit(TraceMask::PASS, TraceEvent::RuleFired { rule, n_slots });
}

pub(crate) fn segment_done(n_slots: usize, advance: f32) {
    emit(TraceMask::SEGMENT, TraceEvent::SegmentDone { n_slots, advance });
}

pub(crate) fn opcode(name: &str) {
    emit(TraceMask::OPCODE, TraceEvent::Opcode { name });
}
