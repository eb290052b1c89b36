//! Request id generation for JSON-RPC requests sent over a single transport.

use crate::core::protocol::RequestId;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Request ID generator
pub struct RequestIdGenerator {
    counter: AtomicU64,
    use_uuid: bool,
}

impl RequestIdGenerator {
    /// Sequential numeric ids starting at 1
    pub fn new() -> Self {
        Self {
            counter: AtomicU64::new(1),
            use_uuid: false,
        }
    }

    /// Random UUID string ids
    pub fn with_uuid() -> Self {
        Self {
            counter: AtomicU64::new(1),
            use_uuid: true,
        }
    }

    pub fn next_id(&self) -> RequestId {
        if self.use_uuid {
            RequestId::String(Uuid::new_v4().to_string())
        } else {
            let num = self.counter.fetch_add(1, Ordering::SeqCst);
            RequestId::Number(num as i64)
        }
    }
}

impl Default for RequestIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_id_generation() {
        let generator = RequestIdGenerator::new();
        assert_eq!(generator.next_id(), RequestId::Number(1));
        assert_eq!(generator.next_id(), RequestId::Number(2));
        assert_eq!(generator.next_id(), RequestId::Number(3));
    }

    #[test]
    fn test_uuid_id_generation() {
        let generator = RequestIdGenerator::with_uuid();
        let id1 = generator.next_id();
        let id2 = generator.next_id();

        assert!(matches!(id1, RequestId::String(_)));
        assert_ne!(id1, id2);
    }
}
