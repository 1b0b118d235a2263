//! Structured diagnostics for training and indexing.
//!
//! Instead of a mutable verbose flag, an index takes an optional event
//! sink at construction and reports phase summaries and timings through
//! it. The sink is a plain callback so callers can forward events to any
//! logging framework.

use std::sync::Arc;

/// Events reported by the index variants.
#[derive(Debug, Clone)]
pub enum IndexEvent {
    /// Training started on `n` vectors of width `d`.
    TrainBegin { n: usize, d: usize },
    /// Feature classification finished with the given tier sizes.
    FeaturesClassified {
        pq: usize,
        itq: usize,
        discarded: usize,
    },
    /// Training finished; `code_size` is the per-vector code length.
    TrainComplete { code_size: usize, elapsed_ms: f64 },
    /// A batch of vectors was encoded and stored.
    VectorsAdded {
        n: usize,
        ntotal: usize,
        elapsed_ms: f64,
    },
}

/// Callback receiving [`IndexEvent`]s.
pub type EventSink = Arc<dyn Fn(&IndexEvent) + Send + Sync>;

/// Optional sink holder shared by the index variants.
#[derive(Clone, Default)]
pub(crate) struct Reporter {
    sink: Option<EventSink>,
}

impl Reporter {
    pub(crate) fn set_sink(&mut self, sink: EventSink) {
        self.sink = Some(sink);
    }

    #[inline]
    pub(crate) fn emit(&self, event: IndexEvent) {
        if let Some(sink) = &self.sink {
            sink(&event);
        }
    }
}

impl std::fmt::Debug for Reporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reporter")
            .field("attached", &self.sink.is_some())
            .finish()
    }
}
