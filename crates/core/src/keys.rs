//! Store key layout for a queue.

/// Builds the store keys belonging to one named queue.
#[derive(Debug, Clone)]
pub struct QueueKeys {
    queue: String,
}

impl QueueKeys {
    /// Create a new QueueKeys instance for the given queue.
    pub fn new(queue: impl Into<String>) -> Self {
        Self {
            queue: queue.into(),
        }
    }

    /// Get the queue name.
    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Key for pending item ids (ZSET, scored by ready time).
    pub fn pending(&self) -> String {
        format!("queue:{}", self.queue)
    }

    /// Key for claimed, in-flight item ids (ZSET, scored by claim time).
    pub fn processing(&self) -> String {
        format!("processing:{}", self.queue)
    }

    /// Key for the success log (ZSET, scored by completion time).
    pub fn success(&self) -> String {
        format!("success:{}", self.queue)
    }

    /// Key for the error log (ZSET, scored by completion time).
    pub fn error(&self) -> String {
        format!("error:{}", self.queue)
    }

    /// Key for an item record (HASH).
    pub fn item(&self, id: &str) -> String {
        format!("items:{}:{}", self.queue, id)
    }

    /// Key for one of the queue's sorted sets.
    pub fn set(&self, set: QueueSet) -> String {
        match set {
            QueueSet::Pending => self.pending(),
            QueueSet::Processing => self.processing(),
            QueueSet::Success => self.success(),
            QueueSet::Error => self.error(),
        }
    }
}

/// The sorted sets kept per queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueSet {
    /// Ids waiting to be claimed.
    Pending,
    /// Ids claimed by a worker.
    Processing,
    /// Success log.
    Success,
    /// Error log.
    Error,
}

impl QueueSet {
    /// All four sets, in lifecycle order.
    pub const ALL: [QueueSet; 4] = [
        QueueSet::Pending,
        QueueSet::Processing,
        QueueSet::Success,
        QueueSet::Error,
    ];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_keys() {
        let keys = QueueKeys::new("orders");
        assert_eq!(keys.pending(), "queue:orders");
        assert_eq!(keys.processing(), "processing:orders");
        assert_eq!(keys.success(), "success:orders");
        assert_eq!(keys.error(), "error:orders");
        assert_eq!(keys.item("abc"), "items:orders:abc");
    }

    #[test]
    fn test_queue_keys_set() {
        let keys = QueueKeys::new("orders");
        let all: Vec<String> = QueueSet::ALL.iter().map(|s| keys.set(*s)).collect();
        assert_eq!(
            all,
            vec![
                "queue:orders",
                "processing:orders",
                "success:orders",
                "error:orders"
            ]
        );
    }

    #[test]
    fn test_queue_keys_complex_name() {
        let keys = QueueKeys::new("app:v2");
        assert_eq!(keys.queue(), "app:v2");
        assert_eq!(keys.pending(), "queue:app:v2");
        assert_eq!(keys.item("x"), "items:app:v2:x");
    }
}
