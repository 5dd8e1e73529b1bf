use std::future::Future;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::error;

/// A task serving one role until it is told to quit.
#[derive(Debug)]
pub(crate) struct EventLoop {
    quit: Arc<Notify>,
    task: JoinHandle<()>,
}

/// Handed to the body of an [`EventLoop`] to observe quit requests.
#[derive(Debug, Clone)]
pub(crate) struct Quit(Arc<Notify>);

impl Quit {
    /// Completes once the loop has been asked to quit.
    pub(crate) async fn requested(&self) {
        self.0.notified().await
    }
}

impl EventLoop {
    pub(crate) fn spawn<F, Fut>(runtime: &Handle, body: F) -> Self
    where
        F: FnOnce(Quit) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let quit = Arc::new(Notify::new());
        let task = runtime.spawn(body(Quit(quit.clone())));
        EventLoop { quit, task }
    }

    /// Asks the loop to quit and waits for it to finish.
    ///
    /// The request is remembered, so a loop which is not waiting for it yet still observes it.
    pub(crate) async fn quit(self) {
        self.quit.notify_one();
        if let Err(err) = self.task.await {
            if err.is_panic() {
                error!("event loop panicked: {:?}", err);
            }
        }
    }
}
