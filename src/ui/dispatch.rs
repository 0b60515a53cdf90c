//! Hand-off of work to the UI thread.
//!
//! The UI thread owns its state `S` and drains a queue of closures; any
//! other thread may submit a closure and block until it has run.

use std::sync::{Arc, OnceLock};
use std::thread::{self, ThreadId};
use tokio::sync::{mpsc, oneshot};

type Job<S> = Box<dyn FnOnce(&mut S) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("the UI thread is no longer accepting work")]
    Closed,
    #[error("cannot wait on the UI thread from the UI thread itself")]
    OnUiThread,
}

/// Receiving end, owned by the UI thread.
///
/// The first thread to pump the queue becomes the UI thread.
pub struct Dispatcher<S> {
    rx: mpsc::UnboundedReceiver<Job<S>>,
    tx: mpsc::UnboundedSender<Job<S>>,
    ui_thread: Arc<OnceLock<ThreadId>>,
}

/// Submitting end; cheap to clone and safe to send to other threads.
pub struct UiHandle<S> {
    tx: mpsc::UnboundedSender<Job<S>>,
    ui_thread: Arc<OnceLock<ThreadId>>,
}

impl<S> Clone for UiHandle<S> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            ui_thread: Arc::clone(&self.ui_thread),
        }
    }
}

impl<S> Default for Dispatcher<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Dispatcher<S> {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            rx,
            tx,
            ui_thread: Arc::new(OnceLock::new()),
        }
    }

    pub fn handle(&self) -> UiHandle<S> {
        UiHandle {
            tx: self.tx.clone(),
            ui_thread: Arc::clone(&self.ui_thread),
        }
    }

    fn claim_thread(&self) {
        let _ = self.ui_thread.set(thread::current().id());
    }

    /// Run every queued job without blocking. Returns how many ran.
    pub fn run_pending(&mut self, state: &mut S) -> usize {
        self.claim_thread();
        let mut ran = 0;
        while let Ok(job) = self.rx.try_recv() {
            job(state);
            ran += 1;
        }
        ran
    }

    /// Run jobs until every handle has been dropped.
    pub fn run(self, state: &mut S) {
        self.claim_thread();
        let Dispatcher { mut rx, tx, .. } = self;
        drop(tx);
        while let Some(job) = rx.blocking_recv() {
            job(state);
        }
    }
}

impl<S> UiHandle<S> {
    pub fn is_ui_thread(&self) -> bool {
        self.ui_thread.get() == Some(&thread::current().id())
    }

    /// Run `f` on the UI thread and block until it has finished.
    pub fn invoke_and_wait<F, R>(&self, f: F) -> Result<R, DispatchError>
    where
        F: FnOnce(&mut S) -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.is_ui_thread() {
            return Err(DispatchError::OnUiThread);
        }
        let (done_tx, done_rx) = oneshot::channel();
        self.tx
            .send(Box::new(move |state: &mut S| {
                let _ = done_tx.send(f(state));
            }))
            .map_err(|_| DispatchError::Closed)?;
        done_rx.blocking_recv().map_err(|_| DispatchError::Closed)
    }

    /// Queue `f` for the UI thread without waiting for it.
    pub fn invoke_later<F>(&self, f: F) -> Result<(), DispatchError>
    where
        F: FnOnce(&mut S) + Send + 'static,
    {
        self.tx
            .send(Box::new(f))
            .map_err(|_| DispatchError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invoke_and_wait_returns_result() {
        let dispatcher: Dispatcher<Vec<i32>> = Dispatcher::new();
        let handle = dispatcher.handle();
        let ui = thread::spawn(move || {
            let mut state = Vec::new();
            dispatcher.run(&mut state);
            state
        });

        let len = handle
            .invoke_and_wait(|v: &mut Vec<i32>| {
                v.push(1);
                v.len()
            })
            .unwrap();
        assert_eq!(len, 1);
        handle.invoke_later(|v| v.push(2)).unwrap();
        let last = handle.invoke_and_wait(|v| v.last().copied()).unwrap();
        assert_eq!(last, Some(2));

        drop(handle);
        assert_eq!(ui.join().unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_run_pending_drains_in_order() {
        let mut dispatcher: Dispatcher<String> = Dispatcher::new();
        let handle = dispatcher.handle();
        handle.invoke_later(|s| s.push('a')).unwrap();
        handle.invoke_later(|s| s.push('b')).unwrap();

        let mut state = String::new();
        assert_eq!(dispatcher.run_pending(&mut state), 2);
        assert_eq!(state, "ab");
        assert_eq!(dispatcher.run_pending(&mut state), 0);
    }

    #[test]
    fn test_waiting_from_ui_thread_is_refused() {
        let mut dispatcher: Dispatcher<u8> = Dispatcher::new();
        let handle = dispatcher.handle();
        dispatcher.run_pending(&mut 0);
        assert!(handle.is_ui_thread());
        assert_eq!(handle.invoke_and_wait(|_| ()), Err(DispatchError::OnUiThread));
    }

    #[test]
    fn test_closed_queue() {
        let dispatcher: Dispatcher<u8> = Dispatcher::new();
        let handle = dispatcher.handle();
        drop(dispatcher);
        assert_eq!(handle.invoke_and_wait(|_| ()), Err(DispatchError::Closed));
        assert_eq!(handle.invoke_later(|_| ()), Err(DispatchError::Closed));
    }
}
