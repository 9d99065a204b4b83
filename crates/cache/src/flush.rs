//! Background flush worker fed by a bounded channel

use crate::{Error, Result};
use std::sync::mpsc::{self, Receiver, SyncSender, TryRecvError, TrySendError};
use std::thread::{self, JoinHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlushRequest {
    Flush,
    Shutdown,
}

/// A single long-lived thread that runs the flush callback on request.
///
/// The channel holds one request, so a burst of requests while a flush is
/// queued collapses into that one flush.
pub(crate) struct FlushWorker {
    tx: SyncSender<FlushRequest>,
    handle: Option<JoinHandle<()>>,
}

impl FlushWorker {
    pub(crate) fn spawn<F>(flush: F) -> Result<Self>
    where
        F: Fn() + Send + 'static,
    {
        let (tx, rx) = mpsc::sync_channel(1);
        let handle = thread::Builder::new()
            .name("nlcli-cache-flush".to_string())
            .spawn(move || run(&rx, &flush))
            .map_err(|e| Error::io_no_path(e, "spawn flush worker"))?;
        Ok(Self {
            tx,
            handle: Some(handle),
        })
    }

    /// Ask for a flush without waiting. Returns false when the request was
    /// coalesced into one already queued.
    pub(crate) fn request(&self) -> bool {
        match self.tx.try_send(FlushRequest::Flush) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::trace!("Flush already queued; coalescing request");
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                tracing::warn!("Cache flush worker is gone; request dropped");
                false
            }
        }
    }

    /// Stop the worker after any queued flush has run
    pub(crate) fn shutdown(mut self) {
        let _ = self.tx.send(FlushRequest::Shutdown);
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            tracing::warn!("Cache flush worker panicked");
        }
    }
}

fn run<F: Fn()>(rx: &Receiver<FlushRequest>, flush: &F) {
    while let Ok(request) = rx.recv() {
        if request == FlushRequest::Shutdown {
            break;
        }
        let mut shutdown = false;
        loop {
            match rx.try_recv() {
                Ok(FlushRequest::Flush) => {}
                Ok(FlushRequest::Shutdown) => shutdown = true,
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
        flush();
        if shutdown {
            break;
        }
    }
    tracing::trace!("Cache flush worker stopped");
}
