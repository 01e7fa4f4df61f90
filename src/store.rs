//! Detection state store.
//!
//! Holds the result currently on display. Every outgoing request takes a
//! ticket with a monotonically increasing sequence number; a resolution is
//! accepted only if its sequence is newer than anything accepted so far and
//! newer than the last abandonment point. Slow early responses therefore
//! never overwrite faster later ones.
//!
//! The displayed dimensions are read from the stored `DetectionResult`
//! itself, so boxes and dimensions are always replaced together.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::detect::{DetectionResult, SourceDims};

/// Sequence number handed out at dispatch time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestTicket(u64);

impl RequestTicket {
    pub fn seq(&self) -> u64 {
        self.0
    }
}

/// Outcome of offering a resolved result to the store.
#[derive(Clone, Debug, PartialEq)]
pub enum Resolution {
    Accepted(Arc<DetectionResult>),
    /// A newer request was accepted, or the request was abandoned.
    Stale,
}

impl Resolution {
    pub fn accepted(self) -> Option<Arc<DetectionResult>> {
        match self {
            Resolution::Accepted(result) => Some(result),
            Resolution::Stale => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct DetectionStore {
    current: Option<(RequestTicket, Arc<DetectionResult>)>,
    last_dispatched: u64,
    /// Tickets at or below this are discarded on resolution.
    floor: u64,
}

impl DetectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tag an outgoing request.
    pub fn dispatch(&mut self) -> RequestTicket {
        self.last_dispatched += 1;
        RequestTicket(self.last_dispatched)
    }

    /// Offer a result for `ticket`.
    pub fn resolve(&mut self, ticket: RequestTicket, result: DetectionResult) -> Resolution {
        let newest_accepted = self.current.as_ref().map(|(t, _)| t.0).unwrap_or(0);
        if ticket.0 <= self.floor || ticket.0 <= newest_accepted {
            return Resolution::Stale;
        }
        let result = Arc::new(result);
        self.current = Some((ticket, result.clone()));
        Resolution::Accepted(result)
    }

    /// Discard every request dispatched so far; the displayed result stays.
    pub fn abandon_pending(&mut self) {
        self.floor = self.last_dispatched;
    }

    /// Drop the displayed result and abandon pending requests.
    pub fn clear(&mut self) {
        self.abandon_pending();
        self.current = None;
    }

    pub fn current(&self) -> Option<Arc<DetectionResult>> {
        self.current.as_ref().map(|(_, result)| result.clone())
    }

    /// Dimensions of the frame behind the current result.
    pub fn current_source_dims(&self) -> Option<SourceDims> {
        self.current.as_ref().map(|(_, result)| result.source())
    }

    /// Sequence of the displayed result.
    pub fn current_ticket(&self) -> Option<RequestTicket> {
        self.current.as_ref().map(|(ticket, _)| *ticket)
    }

    pub fn last_dispatched(&self) -> u64 {
        self.last_dispatched
    }
}

/// Thread-safe handle to a `DetectionStore`, shared by the scan paths.
#[derive(Clone, Debug, Default)]
pub struct SharedDetectionStore {
    inner: Arc<Mutex<DetectionStore>>,
}

impl SharedDetectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, DetectionStore> {
        // State is replaced whole on every write, so a poisoned lock is still consistent.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn dispatch(&self) -> RequestTicket {
        self.lock().dispatch()
    }

    pub fn resolve(&self, ticket: RequestTicket, result: DetectionResult) -> Resolution {
        self.lock().resolve(ticket, result)
    }

    pub fn abandon_pending(&self) {
        self.lock().abandon_pending()
    }

    pub fn clear(&self) {
        self.lock().clear()
    }

    pub fn current(&self) -> Option<Arc<DetectionResult>> {
        self.lock().current()
    }

    pub fn current_source_dims(&self) -> Option<SourceDims> {
        self.lock().current_source_dims()
    }

    pub fn current_ticket(&self) -> Option<RequestTicket> {
        self.lock().current_ticket()
    }

    pub fn last_dispatched(&self) -> u64 {
        self.lock().last_dispatched()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{DetectionBox, MaskClass, ScanId};

    fn result(id: u64, width: u32) -> DetectionResult {
        let boxes = vec![DetectionBox::new(MaskClass::WithMask, 0.9, [1.0, 1.0, 5.0, 5.0]).unwrap()];
        DetectionResult::new(ScanId(id), boxes, SourceDims::new(width, 480)).unwrap()
    }

    #[test]
    fn out_of_order_resolution_keeps_newest() {
        let mut store = DetectionStore::new();
        let t1 = store.dispatch();
        let t2 = store.dispatch();
        let t3 = store.dispatch();

        assert!(matches!(store.resolve(t2, result(2, 200)), Resolution::Accepted(_)));
        assert_eq!(store.resolve(t1, result(1, 100)), Resolution::Stale);
        assert_eq!(store.current().unwrap().id(), ScanId(2));
        assert!(matches!(store.resolve(t3, result(3, 300)), Resolution::Accepted(_)));

        let current = store.current().unwrap();
        assert_eq!(current.id(), ScanId(3));
        assert_eq!(store.current_source_dims(), Some(SourceDims::new(300, 480)));
        assert_eq!(store.current_ticket(), Some(t3));
    }

    #[test]
    fn late_resolution_after_newer_acceptance_is_stale() {
        let mut store = DetectionStore::new();
        let t1 = store.dispatch();
        let t2 = store.dispatch();
        let t3 = store.dispatch();
        assert!(store.resolve(t3, result(3, 300)).accepted().is_some());
        assert_eq!(store.resolve(t2, result(2, 200)), Resolution::Stale);
        assert_eq!(store.resolve(t1, result(1, 100)), Resolution::Stale);
        assert_eq!(store.current().unwrap().id(), ScanId(3));
    }

    #[test]
    fn abandoned_requests_are_discarded() {
        let mut store = DetectionStore::new();
        let t1 = store.dispatch();
        store.abandon_pending();
        assert_eq!(store.resolve(t1, result(1, 100)), Resolution::Stale);
        assert!(store.current().is_none());

        let t2 = store.dispatch();
        assert!(store.resolve(t2, result(2, 200)).accepted().is_some());
    }

    #[test]
    fn clear_drops_result_and_pending() {
        let mut store = DetectionStore::new();
        let t1 = store.dispatch();
        assert!(store.resolve(t1, result(1, 100)).accepted().is_some());
        let t2 = store.dispatch();
        store.clear();
        assert!(store.current().is_none());
        assert!(store.current_source_dims().is_none());
        assert_eq!(store.resolve(t2, result(2, 200)), Resolution::Stale);
    }

    #[test]
    fn shared_store_orders_across_threads() {
        let store = SharedDetectionStore::new();
        let tickets: Vec<_> = (0..8).map(|_| store.dispatch()).collect();
        let handles: Vec<_> = tickets
            .into_iter()
            .rev()
            .map(|ticket| {
                let store = store.clone();
                std::thread::spawn(move || {
                    store.resolve(ticket, result(ticket.seq(), 100 + ticket.seq() as u32));
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.current().unwrap().id(), ScanId(8));
        assert_eq!(store.last_dispatched(), 8);
    }
}
