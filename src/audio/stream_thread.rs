//! Owner thread for cpal streams.
//!
//! A `cpal::Stream` is not `Send` on every host, so each stream is built,
//! played and dropped on one dedicated thread. Stopping the thread drops the
//! stream, which releases the device and discards anything still queued.

use crate::error::{Result, VoiceError};
use std::sync::mpsc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error};

const READY_TIMEOUT: Duration = Duration::from_secs(5);

pub(crate) struct StreamThread {
    name: String,
    stop_tx: Option<mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl StreamThread {
    /// Spawn the owner thread and run `build` on it.
    ///
    /// Returns once `build` has finished; its error (or a timeout) is returned
    /// and the thread exits. On success the stream stays alive until
    /// [`StreamThread::shutdown`] or drop.
    pub(crate) fn spawn<T, F>(name: &str, build: F) -> Result<(Self, T)>
    where
        F: FnOnce() -> Result<(cpal::Stream, T)> + Send + 'static,
        T: Send + 'static,
    {
        let (ready_tx, ready_rx) = mpsc::channel::<Result<T>>();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || match build() {
                Ok((stream, info)) => {
                    if ready_tx.send(Ok(info)).is_err() {
                        return;
                    }
                    // Returns on explicit stop or when the owner is dropped.
                    let _ = stop_rx.recv();
                    drop(stream);
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            })
            .map_err(|e| VoiceError::Device(format!("failed to spawn {name} thread: {e}")))?;

        let mut thread = Self {
            name: name.to_string(),
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        };

        match ready_rx.recv_timeout(READY_TIMEOUT) {
            Ok(Ok(info)) => Ok((thread, info)),
            Ok(Err(e)) => {
                thread.join();
                Err(e)
            }
            Err(_) => {
                // Detach: a wedged driver call must not hang the caller too.
                thread.stop_tx.take();
                thread.handle.take();
                Err(VoiceError::Device(format!("{name} did not become ready")))
            }
        }
    }

    pub(crate) fn shutdown(mut self) {
        self.join();
    }

    fn join(&mut self) {
        self.stop_tx.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("{} thread panicked", self.name);
            } else {
                debug!("{} thread stopped", self.name);
            }
        }
    }
}

impl Drop for StreamThread {
    fn drop(&mut self) {
        self.join();
    }
}
