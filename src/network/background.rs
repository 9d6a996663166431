use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::Sender;
use instant::{Duration, Instant};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::network::messages::Message;
use crate::network::socket::NonBlockingSocket;
use crate::RollnetError;

/// How long a single blocking receive may take before the worker re-checks cancellation.
const RECEIVE_SLICE: Duration = Duration::from_millis(50);

/// Cooperative cancellation for background jobs. Cloning shares the token.
#[derive(Debug, Clone, Default)]
pub(crate) struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Runs the session's background jobs, each on one long-lived thread. The only job today
/// is the transport pump: receive datagrams, deserialize them and hand them to the host
/// thread through the channel. Job errors are latched and re-thrown synchronously from the
/// next host call.
pub(crate) struct BackgroundJobManager {
    token: CancellationToken,
    latched_error: Arc<Mutex<Option<String>>>,
    workers: Vec<thread::JoinHandle<()>>,
}

impl BackgroundJobManager {
    pub(crate) fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            latched_error: Arc::new(Mutex::new(None)),
            workers: Vec::new(),
        }
    }

    /// Spawns the receive pump for `socket`. Received messages are pushed into `inbound`;
    /// the pump stops when cancelled, when the receiving side hangs up or on a transport
    /// error (which is latched).
    pub(crate) fn spawn_receive_pump(
        &mut self,
        socket: Arc<dyn NonBlockingSocket>,
        inbound: Sender<(SocketAddr, Message)>,
    ) {
        let token = self.token.clone();
        let latched_error = self.latched_error.clone();
        let worker = thread::Builder::new()
            .name("rollnet-recv".to_owned())
            .spawn(move || {
                while !token.is_cancelled() {
                    match socket.receive(RECEIVE_SLICE) {
                        Ok(Some(message)) => {
                            if inbound.send(message).is_err() {
                                // the session is gone
                                return;
                            }
                        }
                        Ok(None) => {}
                        Err(err) => {
                            warn!("transport receive failed: {}", err);
                            *latched_error.lock() = Some(err.to_string());
                            return;
                        }
                    }
                }
                debug!("receive pump cancelled");
            })
            .expect("failed to spawn the transport worker");
        self.workers.push(worker);
    }

    /// Re-throws an error a background job hit since the last call.
    pub(crate) fn throw_if_error(&self) -> Result<(), RollnetError> {
        match self.latched_error.lock().take() {
            Some(info) => Err(RollnetError::TransportFailure { info }),
            None => Ok(()),
        }
    }

    /// Cancels all jobs and waits up to `grace` for them to finish. Stragglers are left
    /// detached and reported.
    pub(crate) fn stop(&mut self, grace: Duration) {
        self.token.cancel();
        let deadline = Instant::now() + grace;
        for worker in self.workers.drain(..) {
            while !worker.is_finished() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(1));
            }
            if worker.is_finished() {
                let _ = worker.join();
            } else {
                warn!("background worker did not stop within the grace period");
            }
        }
    }
}

impl Drop for BackgroundJobManager {
    fn drop(&mut self) {
        self.stop(Duration::from_millis(500));
    }
}

// #########
// # TESTS #
// #########
