//! Bounded worker pool in front of a flattener.
//!
//! External tool processes are expensive; the pool caps how many run at
//! once and keeps them off the caller's thread.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, SendTimeoutError, Sender};

use crate::error::{Error, Result};
use crate::options::FlattenOptions;

use super::Flattener;

struct Request {
    input: Vec<u8>,
    reply: Sender<Result<Vec<u8>>>,
    /// Set once the caller stops waiting for the reply
    cancelled: Arc<AtomicBool>,
}

/// Runs flatten requests on a fixed set of named worker threads.
pub struct FlattenPool {
    inner: Arc<dyn Flattener>,
    sender: Option<Sender<Request>>,
    workers: Vec<JoinHandle<()>>,
    timeout: Duration,
}

impl FlattenPool {
    /// Start `options.max_concurrent` workers around `inner`.
    ///
    /// Callers wait at most `options.timeout` to enqueue and again to
    /// receive the result.
    pub fn new(inner: Arc<dyn Flattener>, options: &FlattenOptions) -> Result<Self> {
        let count = options.max_concurrent.max(1);
        let (sender, receiver) = bounded::<Request>(count * 4);

        let mut workers = Vec::with_capacity(count);
        for i in 0..count {
            let receiver = receiver.clone();
            let flattener = Arc::clone(&inner);
            let handle = thread::Builder::new()
                .name(format!("fillpdf-flatten-{}", i))
                .spawn(move || {
                    for request in receiver.iter() {
                        if request.cancelled.load(Ordering::SeqCst) {
                            log::debug!("Skipping flatten request abandoned by its caller");
                            continue;
                        }
                        let result = flattener.flatten(&request.input);
                        // the caller may have given up waiting
                        let _ = request.reply.send(result);
                    }
                })?;
            workers.push(handle);
        }

        log::debug!("Started {} flatten workers ({})", count, inner.name());
        Ok(Self {
            inner,
            sender: Some(sender),
            workers,
            timeout: options.timeout,
        })
    }

    /// Number of worker threads.
    pub fn workers(&self) -> usize {
        self.workers.len()
    }
}

impl Flattener for FlattenPool {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn flatten(&self, input: &[u8]) -> Result<Vec<u8>> {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| Error::Flatten("flatten pool is shut down".into()))?;
        let (reply, response) = bounded(1);
        let cancelled = Arc::new(AtomicBool::new(false));

        sender
            .send_timeout(
                Request {
                    input: input.to_vec(),
                    reply,
                    cancelled: Arc::clone(&cancelled),
                },
                self.timeout,
            )
            .map_err(|e| match e {
                SendTimeoutError::Timeout(_) => {
                    Error::Flatten("flatten queue is full".into())
                }
                SendTimeoutError::Disconnected(_) => {
                    Error::Flatten("flatten workers stopped".into())
                }
            })?;

        response.recv_timeout(self.timeout).map_err(|_| {
            cancelled.store(true, Ordering::SeqCst);
            Error::Flatten(format!("no result within {:?}", self.timeout))
        })?
    }

    fn flatten_file(&self, input: &Path, output: &Path) -> Result<()> {
        let bytes = std::fs::read(input)?;
        let flattened = self.flatten(&bytes)?;
        crate::writer::write_atomic(&flattened, output)
    }
}

impl Drop for FlattenPool {
    fn drop(&mut self) {
        // closing the channel ends the worker loops
        self.sender.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

impl std::fmt::Debug for FlattenPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlattenPool")
            .field("inner", &self.inner.name())
            .field("workers", &self.workers.len())
            .field("timeout", &self.timeout)
            .finish()
    }
}
