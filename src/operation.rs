//! The operation primitive behind every channel and factory call.
//!
//! Each `begin_*` method spawns the work onto the runtime and returns an
//! [`Operation`]. The async methods await it and the `*_blocking` methods
//! [`wait`](Operation::wait) on it, so all three surfaces share one code path
//! and produce identical results.
//!
//! # Example
//!
//! ```ignore
//! // Future-based
//! let id = channel.begin_send(message, timeout).await?;
//!
//! // Callback-based
//! channel
//!     .begin_receive(timeout)
//!     .on_complete(|result| println!("{:?}", result.map(|m| m.id().cloned())));
//!
//! // Blocking, from a thread outside the runtime
//! let reply = channel.begin_receive(timeout).wait()?;
//! ```

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;
use tokio::task::JoinHandle;

use crate::error::{ChannelError, Result};

/// Handle to an in-flight operation.
///
/// Dropping the handle does not stop the work; use [`cancel`](Self::cancel)
/// for that.
#[must_use = "an operation does nothing useful unless its result is observed"]
pub struct Operation<T> {
    name: &'static str,
    rx: oneshot::Receiver<Result<T>>,
    task: Option<JoinHandle<()>>,
    handle: Handle,
}

impl<T: Send + 'static> Operation<T> {
    /// Spawn `work` on `handle`.
    pub(crate) fn spawn<F>(handle: &Handle, name: &'static str, work: F) -> Self
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let task = handle.spawn(async move {
            let _ = tx.send(work.await);
        });
        Self {
            name,
            rx,
            task: Some(task),
            handle: handle.clone(),
        }
    }

    /// An operation that has already finished.
    pub(crate) fn ready(handle: &Handle, name: &'static str, result: Result<T>) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(result);
        Self {
            name,
            rx,
            task: None,
            handle: handle.clone(),
        }
    }

    /// Operation name used in errors and logs.
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Block the current thread until the operation finishes.
    ///
    /// # Panics
    ///
    /// Panics if called from an async execution context (a runtime worker
    /// thread). Use `.await` there instead.
    pub fn wait(self) -> Result<T> {
        let name = self.name;
        self.rx
            .blocking_recv()
            .unwrap_or(Err(ChannelError::Aborted(name)))
    }

    /// Poll for the result without blocking.
    ///
    /// Returns `None` while the operation is still running. After a result
    /// has been returned once, later calls report `Aborted`.
    pub fn try_result(&mut self) -> Option<Result<T>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Closed) => Some(Err(ChannelError::Aborted(self.name))),
        }
    }

    /// Run `callback` with the result once the operation finishes.
    ///
    /// The callback runs on the runtime; it must not block.
    pub fn on_complete<F>(self, callback: F)
    where
        F: FnOnce(Result<T>) + Send + 'static,
    {
        let handle = self.handle.clone();
        handle.spawn(async move {
            callback(self.await);
        });
    }

    /// Stop the operation. Awaiting it afterwards yields `Aborted`.
    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        tracing::debug!(operation = self.name, "operation cancelled");
    }
}

impl<T> Future for Operation<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let name = self.name;
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(ChannelError::Aborted(name))))
    }
}

impl<T> std::fmt::Debug for Operation<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Operation").field("name", &self.name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_await_result() {
        let op = Operation::spawn(&Handle::current(), "add", async { Ok(2 + 2) });
        assert_eq!(op.await.unwrap(), 4);
    }

    #[test]
    fn test_blocking_wait_matches_await() {
        let rt = runtime();
        let work = || async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Err::<u32, _>(ChannelError::SessionEnded)
        };

        let blocking = Operation::spawn(rt.handle(), "op", work()).wait();
        let awaited = rt.block_on(Operation::spawn(rt.handle(), "op", work()));

        assert_eq!(
            blocking.unwrap_err().class(),
            awaited.unwrap_err().class()
        );
    }

    #[tokio::test]
    async fn test_try_result() {
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let mut op = Operation::spawn(&Handle::current(), "gated", async move {
            let _ = release_rx.await;
            Ok("done")
        });

        assert!(op.try_result().is_none());
        release_tx.send(()).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(op.try_result().unwrap().unwrap(), "done");
        assert!(matches!(op.try_result(), Some(Err(ChannelError::Aborted("gated")))));
    }

    #[tokio::test]
    async fn test_on_complete_callback() {
        let (tx, rx) = mpsc::channel();
        Operation::spawn(&Handle::current(), "cb", async { Ok(7u8) }).on_complete(move |r| {
            let _ = tx.send(r.unwrap());
        });

        let got = tokio::task::spawn_blocking(move || rx.recv_timeout(Duration::from_secs(5)))
            .await
            .unwrap();
        assert_eq!(got.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_cancel_reports_aborted() {
        let mut op: Operation<()> = Operation::spawn(&Handle::current(), "slow", async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        });

        op.cancel();
        assert!(matches!(op.await, Err(ChannelError::Aborted("slow"))));
    }

    #[tokio::test]
    async fn test_ready_operation() {
        let op = Operation::ready(
            &Handle::current(),
            "send",
            Err::<(), _>(ChannelError::ChannelClosed),
        );
        assert!(matches!(op.await, Err(ChannelError::ChannelClosed)));
    }

    #[test]
    fn test_runtime_shutdown_aborts() {
        let rt = runtime();
        let op: Operation<()> = Operation::spawn(rt.handle(), "orphan", async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        });
        rt.shutdown_background();

        assert!(matches!(op.wait(), Err(ChannelError::Aborted("orphan"))));
    }
}
