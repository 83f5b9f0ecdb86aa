use std::sync::Mutex;
use tokio::sync::Notify;
use crate::util::lock;

struct Slot<T> {
    value: Option<T>,
    closed: bool,
}

/// Single-slot, overwrite-on-write cell carrying the latest value of one attribute.
///
/// Writers never block: a write replaces any value that has not been consumed yet. A reader
/// only ever sees the most recent write. Meant for a single consumer.
pub struct PropertyCell<T> {
    slot: Mutex<Slot<T>>,
    notify: Notify,
}

impl<T> Default for PropertyCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PropertyCell<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot { value: None, closed: false }),
            notify: Notify::new(),
        }
    }

    /// Stores `value`, discarding any pending one. Returns `false` if the cell is closed, in
    /// which case the value is dropped.
    pub fn set(&self, value: T) -> bool {
        {
            let mut slot = lock(&self.slot);
            if slot.closed {
                return false;
            }
            slot.value = Some(value);
        }
        self.notify.notify_one();
        true
    }

    /// Takes the pending value, if any, without waiting.
    pub fn take(&self) -> Option<T> {
        lock(&self.slot).value.take()
    }

    pub fn has_pending(&self) -> bool {
        lock(&self.slot).value.is_some()
    }

    /// Waits for a value and takes it. Returns `None` once the cell is closed and drained.
    ///
    /// Cancel safe: a value is only taken by a poll that also returns it.
    pub async fn recv(&self) -> Option<T> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut slot = lock(&self.slot);
                if let Some(value) = slot.value.take() {
                    return Some(value);
                }
                if slot.closed {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Closes the cell. Later writes are refused; a pending value can still be taken.
    pub fn close(&self) {
        lock(&self.slot).closed = true;
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.slot).closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn last_write_wins() {
        let cell = PropertyCell::new();
        for v in 1..=10 {
            assert!(cell.set(v));
        }
        assert_eq!(cell.take(), Some(10));
        assert_eq!(cell.take(), None);
    }

    #[tokio::test]
    async fn recv_sees_only_the_latest_value() {
        let cell = PropertyCell::new();
        cell.set("A".to_string());
        cell.set("B".to_string());

        assert_eq!(cell.recv().await.as_deref(), Some("B"));
        assert!(!cell.has_pending());
    }

    #[tokio::test]
    async fn recv_wakes_on_a_later_write() {
        let cell = Arc::new(PropertyCell::new());
        let reader = {
            let cell = cell.clone();
            tokio::spawn(async move { cell.recv().await })
        };

        tokio::time::sleep(Duration::from_millis(5)).await;
        cell.set(12.0f32);

        let got = tokio::time::timeout(Duration::from_secs(1), reader).await.unwrap().unwrap();
        assert_eq!(got, Some(12.0));
    }

    #[tokio::test]
    async fn recv_returns_none_after_close() {
        let cell: PropertyCell<u32> = PropertyCell::new();
        cell.set(1);
        cell.close();

        assert!(!cell.set(2));
        // pending value survives the close
        assert_eq!(cell.recv().await, Some(1));
        assert_eq!(cell.recv().await, None);
    }

    #[tokio::test]
    async fn concurrent_writers_never_block_and_one_value_remains() {
        let cell = Arc::new(PropertyCell::new());
        let mut writers = Vec::new();
        for t in 0..4u32 {
            let cell = cell.clone();
            writers.push(std::thread::spawn(move || {
                for i in 0..1000u32 {
                    cell.set(t * 1000 + i);
                }
            }));
        }
        for w in writers {
            w.join().unwrap();
        }

        let value = cell.recv().await.unwrap();
        // the surviving value is the final write of one of the writers
        assert_eq!(value % 1000, 999);
        assert_eq!(cell.take(), None);
    }
}
