use tokio::sync::watch;

/// Owned canonical state with change notification.
///
/// The owning manager is the only writer; any number of readers can
/// `watch()` for updates or take a `current()` copy.
#[derive(Debug)]
pub struct Published<T> {
    tx: watch::Sender<T>,
}

impl<T: Clone> Published<T> {
    pub fn new(initial: T) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    /// Replace the value wholesale and wake every watcher
    pub fn publish(&self, value: T) {
        self.tx.send_replace(value);
    }

    pub fn modify(&self, f: impl FnOnce(&mut T)) {
        self.tx.send_modify(f);
    }

    pub fn current(&self) -> T {
        self.tx.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<T> {
        self.tx.subscribe()
    }
}

impl<T: Clone + Default> Default for Published<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_watchers_see_published_values() {
        let cell = Published::new(Vec::<u32>::new());
        let mut rx = cell.watch();

        cell.publish(vec![1, 2]);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), vec![1, 2]);

        cell.modify(|v| v.push(3));
        rx.changed().await.unwrap();
        assert_eq!(cell.current(), vec![1, 2, 3]);
    }

    #[test]
    fn test_publish_without_watchers() {
        let cell: Published<String> = Published::default();
        cell.publish("kept".to_string());
        assert_eq!(cell.current(), "kept");
    }
}
