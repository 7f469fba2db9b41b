use tokio::sync::watch;

/// Observable value holder.
///
/// Consumers get cloned snapshots or a `watch::Receiver` for change
/// notifications; only the owning store mutates the value, through
/// [`StateContainer::update`] and [`StateContainer::replace`].
pub struct StateContainer<T> {
    sender: watch::Sender<T>,
}

impl<T: Clone> StateContainer<T> {
    pub fn new(initial: T) -> Self {
        let (sender, _rx) = watch::channel(initial);
        Self { sender }
    }

    /// Returns a copy of the current value.
    pub fn snapshot(&self) -> T {
        self.sender.borrow().clone()
    }

    /// Reads the current value without cloning it.
    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.sender.borrow())
    }

    /// Mutates the value in place and notifies subscribers.
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut output = None;
        self.sender.send_modify(|value| output = Some(f(value)));
        // Safe to unwrap because send_modify always runs the closure
        output.unwrap()
    }

    /// Replaces the value wholesale, returning the previous one.
    pub fn replace(&self, value: T) -> T {
        self.sender.send_replace(value)
    }

    /// Subscribes to changes. The receiver starts at the current value.
    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.sender.subscribe()
    }
}

impl<T: Clone + Default> Default for StateContainer<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_is_detached() {
        let container = StateContainer::new(vec![1]);
        let snapshot = container.snapshot();
        container.update(|v| v.push(2));

        assert_eq!(snapshot, vec![1]);
        assert_eq!(container.snapshot(), vec![1, 2]);
    }

    #[test]
    fn test_update_returns_closure_output() {
        let container = StateContainer::new(10u32);
        let previous = container.update(|v| {
            let old = *v;
            *v += 5;
            old
        });
        assert_eq!(previous, 10);
        assert_eq!(container.read(|v| *v), 15);
    }

    #[tokio::test]
    async fn test_subscribers_see_changes() {
        let container = StateContainer::new(String::from("a"));
        let mut rx = container.subscribe();

        container.replace(String::from("b"));

        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), "b");
    }
}
