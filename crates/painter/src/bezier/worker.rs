use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
    sync::mpsc::{channel, Receiver, Sender},
    thread::JoinHandle,
};

use super::{Curve, Sample};

struct Request {
    generation: u64,
    id: u64,
    curve: Curve,
    max_samples: usize,
}

struct Response {
    generation: u64,
    id: u64,
    lut: Vec<Sample>,
}

/// Computes curve lookup tables on a background thread.
///
/// Every request is tagged with the current generation. [`CurveWorker::reset`] starts a new
/// generation, and any tables still in flight from the old one are dropped when they arrive.
pub struct CurveWorker {
    tx: Option<Sender<Request>>,
    rx: Receiver<Response>,
    thread: Option<JoinHandle<()>>,
    generation: Cell<u64>,
    next_id: Cell<u64>,
    ready: RefCell<HashMap<u64, Vec<Sample>>>,
}

fn curve_thread(rx: Receiver<Request>, tx: Sender<Response>) {
    while let Ok(req) = rx.recv() {
        let lut = req.curve.lookup_table(req.max_samples);
        log::trace!("computed {} samples for curve {}", lut.len(), req.id);
        let resp = Response {
            generation: req.generation,
            id: req.id,
            lut,
        };
        if tx.send(resp).is_err() {
            break;
        }
    }
}

impl CurveWorker {
    pub fn spawn() -> CurveWorker {
        let (req_tx, req_rx) = channel();
        let (resp_tx, resp_rx) = channel();
        let thread = std::thread::Builder::new()
            .name("curve-worker".to_owned())
            .spawn(move || curve_thread(req_rx, resp_tx));
        let (tx, thread) = match thread {
            Ok(handle) => (Some(req_tx), Some(handle)),
            Err(e) => {
                log::warn!("failed to start curve worker, computing curves inline: {e}");
                (None, None)
            }
        };
        CurveWorker {
            tx,
            rx: resp_rx,
            thread,
            generation: Cell::new(0),
            next_id: Cell::new(0),
            ready: RefCell::default(),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation.get()
    }

    /// Forgets everything requested so far.
    pub fn reset(&self) {
        self.generation.set(self.generation.get() + 1);
        self.ready.borrow_mut().clear();
    }

    /// Asks for a curve's lookup table, returning the id to collect it with. Returns `None` if
    /// the worker isn't running.
    pub fn request(&self, curve: Curve, max_samples: usize) -> Option<u64> {
        let tx = self.tx.as_ref()?;
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        let req = Request {
            generation: self.generation.get(),
            id,
            curve,
            max_samples,
        };
        match tx.send(req) {
            Ok(()) => Some(id),
            Err(_) => {
                log::warn!("curve worker has stopped");
                None
            }
        }
    }

    fn poll(&self) {
        let current = self.generation.get();
        let mut ready = self.ready.borrow_mut();
        while let Ok(resp) = self.rx.try_recv() {
            if resp.generation == current {
                ready.insert(resp.id, resp.lut);
            } else {
                log::debug!("dropping stale table for curve {}", resp.id);
            }
        }
    }

    /// The table for `id`, if it has arrived.
    pub fn take(&self, id: u64) -> Option<Vec<Sample>> {
        self.poll();
        self.ready.borrow_mut().remove(&id)
    }
}

impl Drop for CurveWorker {
    fn drop(&mut self) {
        // Closing the channel ends the thread's loop.
        self.tx = None;
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
