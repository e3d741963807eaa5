//! Background snapshot/delta creation
//!
//! A single thread that invokes the SUT's `build()` hook at a fixed
//! cadence while the workers hammer the update interface. The sleep is a
//! `recv_timeout` on the stop channel, so stopping interrupts it
//! immediately instead of waiting out the period.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};

use crate::error::{DriverError, Result};
use crate::sut::UpdateInterface;

pub(crate) struct BuildService {
    thread: Option<JoinHandle<Result<u64>>>,
    stop_tx: Option<Sender<()>>,
}

impl BuildService {
    /// Start the service. A zero `frequency` makes it inert.
    pub fn start(
        library: Arc<dyn UpdateInterface>,
        thread_id: usize,
        frequency: Duration,
    ) -> Self {
        if frequency.is_zero() {
            return Self {
                thread: None,
                stop_tx: None,
            };
        }

        let (stop_tx, stop_rx) = bounded(1);
        let thread = thread::spawn(move || build_loop(library, thread_id, frequency, stop_rx));
        Self {
            thread: Some(thread),
            stop_tx: Some(stop_tx),
        }
    }

    /// Stop the service and return how many times `build()` ran.
    pub fn stop(mut self) -> Result<u64> {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .map_err(|_| DriverError::Sut("build service thread panicked".into()))?,
            None => Ok(0),
        }
    }
}

fn build_loop(
    library: Arc<dyn UpdateInterface>,
    thread_id: usize,
    frequency: Duration,
    stop_rx: Receiver<()>,
) -> Result<u64> {
    library.on_thread_init(thread_id)?;

    let mut invocations = 0u64;
    let outcome = loop {
        match stop_rx.recv_timeout(frequency) {
            Err(RecvTimeoutError::Timeout) => match library.build() {
                Ok(()) => invocations += 1,
                Err(e) => break Err(e),
            },
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break Ok(()),
        }
    };

    library.on_thread_destroy(thread_id)?;
    outcome.map(|()| invocations)
}
