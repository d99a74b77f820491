use std::{collections::HashSet, sync::Arc};

/// The set of `(chain_id, address)` keys currently being verified. At most
/// one verification per key is admitted at any instant; the key is released
/// by the guard when the dispatch path finishes, success or error.
#[derive(Default)]
pub struct InFlightVerifications {
    inner: parking_lot::Mutex<HashSet<(i64, Vec<u8>)>>,
}

impl InFlightVerifications {
    pub fn try_begin(
        self: &Arc<Self>,
        chain_id: i64,
        contract_address: Vec<u8>,
    ) -> Option<InFlightGuard> {
        let key = (chain_id, contract_address);
        let mut inner = self.inner.lock();
        if !inner.insert(key.clone()) {
            return None;
        }
        crate::metrics::IN_FLIGHT_VERIFICATIONS.inc();
        Some(InFlightGuard {
            set: Arc::clone(self),
            key,
        })
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

pub struct InFlightGuard {
    set: Arc<InFlightVerifications>,
    key: (i64, Vec<u8>),
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set.inner.lock().remove(&self.key);
        crate::metrics::IN_FLIGHT_VERIFICATIONS.dec();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_submission_for_the_same_key_is_rejected() {
        let set = Arc::new(InFlightVerifications::default());
        let guard = set.try_begin(1337, vec![0xab; 20]);
        assert!(guard.is_some());
        assert!(set.try_begin(1337, vec![0xab; 20]).is_none());

        // a different address or chain is admitted concurrently
        assert!(set.try_begin(1337, vec![0xcd; 20]).is_some());
        assert!(set.try_begin(1, vec![0xab; 20]).is_some());
    }

    #[test]
    fn dropping_the_guard_releases_the_key() {
        let set = Arc::new(InFlightVerifications::default());
        let guard = set.try_begin(1337, vec![0xab; 20]).unwrap();
        assert_eq!(set.len(), 1);
        drop(guard);
        assert!(set.is_empty());
        assert!(set.try_begin(1337, vec![0xab; 20]).is_some());
    }
}
