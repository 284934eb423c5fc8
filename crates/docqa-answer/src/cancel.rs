use tokio::sync::watch;

/// Owner side of a cancellation signal. Dropping it without calling
/// [`cancel`](Self::cancel) leaves listeners uncancelled.
#[derive(Debug)]
pub struct CancellationHandle {
    sender: watch::Sender<bool>,
}

/// Clonable observer of a [`CancellationHandle`].
#[derive(Debug, Clone)]
pub struct CancellationListener {
    receiver: watch::Receiver<bool>,
}

/// Create a connected handle and listener.
pub fn cancellation() -> (CancellationHandle, CancellationListener) {
    let (sender, receiver) = watch::channel(false);
    (CancellationHandle { sender }, CancellationListener { receiver })
}

impl CancellationHandle {
    pub fn cancel(&self) {
        // no listeners left is fine
        let _ = self.sender.send(true);
    }

    pub fn listener(&self) -> CancellationListener {
        CancellationListener { receiver: self.sender.subscribe() }
    }
}

impl CancellationListener {
    /// A listener that is never cancelled.
    pub fn never() -> Self {
        cancellation().1
    }

    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves once cancellation is requested. Pends forever if the handle
    /// is dropped first.
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        while !*receiver.borrow_and_update() {
            if receiver.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

impl Default for CancellationListener {
    fn default() -> Self {
        Self::never()
    }
}
