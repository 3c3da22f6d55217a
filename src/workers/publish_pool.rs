use crate::server::metrics;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Hard ceiling on concurrently running publish operations.
///
/// A slot is reserved before a job is taken off its queue and released when
/// the [`PublishSlot`] is dropped, whatever way the operation ended.
#[derive(Clone)]
pub struct PublishPool {
    max_concurrent: usize,
    in_flight: Arc<AtomicUsize>,
}

impl PublishPool {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            max_concurrent: max_concurrent.max(1),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn try_reserve(&self) -> Option<PublishSlot> {
        let reserved = self
            .in_flight
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                (current < self.max_concurrent).then_some(current + 1)
            })
            .ok()?;
        metrics::set_publish_in_flight(reserved + 1);
        Some(PublishSlot {
            in_flight: self.in_flight.clone(),
        })
    }
}

pub struct PublishSlot {
    in_flight: Arc<AtomicUsize>,
}

impl Drop for PublishSlot {
    fn drop(&mut self) {
        let previous = self.in_flight.fetch_sub(1, Ordering::SeqCst);
        metrics::set_publish_in_flight(previous - 1);
    }
}
