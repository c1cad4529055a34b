//! TCP listener for clamscan output.
//!
//! Every accepted connection is one scan run and gets its own handler
//! thread. The listener keeps a handle to each open connection so shutdown
//! can wait for them and, past the grace period, close them.

use std::collections::HashMap;
use std::io;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::fingerprint::Fingerprinter;
use crate::handler::ConnectionHandler;
use crate::metrics::MetricsSink;

/// Errors starting the scan listener.
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("failed to bind scan listener on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to spawn listener thread: {0}")]
    Spawn(#[source] io::Error),
}

impl From<ListenerError> for ce_common::Error {
    fn from(err: ListenerError) -> Self {
        match err {
            ListenerError::Bind { addr, source } => ce_common::Error::Bind {
                what: "scan listener",
                addr,
                source,
            },
            ListenerError::Spawn(source) => ce_common::Error::Io(source),
        }
    }
}

/// Shared dependencies handed to every connection handler.
#[derive(Clone)]
pub struct HandlerContext {
    pub sink: Arc<dyn MetricsSink>,
    pub fingerprinter: Option<Arc<dyn Fingerprinter>>,
}

/// Result of a graceful shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ShutdownReport {
    /// Connections still open at the deadline; they were force-closed.
    pub abandoned: usize,
    pub waited: Duration,
}

#[derive(Default)]
struct InFlight {
    conns: Mutex<HashMap<u64, TcpStream>>,
    finished: Condvar,
}

impl InFlight {
    fn conns(&self) -> MutexGuard<'_, HashMap<u64, TcpStream>> {
        match self.conns.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn register(&self, id: u64, stream: &TcpStream) {
        match stream.try_clone() {
            Ok(handle) => {
                self.conns().insert(id, handle);
            }
            Err(e) => warn!(conn_id = id, error = %e, "connection not tracked for shutdown"),
        }
    }

    fn finish(&self, id: u64) {
        self.conns().remove(&id);
        self.finished.notify_all();
    }
}

/// Running scan listener.
pub struct ScanListener {
    addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    in_flight: Arc<InFlight>,
    acceptor: Option<thread::JoinHandle<()>>,
}

impl ScanListener {
    /// Bind `addr` and start accepting on a background thread.
    ///
    /// `addr` may use port 0; [`addr`](Self::addr) reports the bound port.
    pub fn bind(addr: &str, ctx: HandlerContext) -> Result<Self, ListenerError> {
        let listener = TcpListener::bind(addr).map_err(|source| ListenerError::Bind {
            addr: addr.to_string(),
            source,
        })?;
        let bound = listener.local_addr().map_err(|source| ListenerError::Bind {
            addr: addr.to_string(),
            source,
        })?;

        info!(addr = %bound, "scan listener started");

        let shutdown = Arc::new(AtomicBool::new(false));
        let in_flight = Arc::new(InFlight::default());

        let acceptor = {
            let shutdown = shutdown.clone();
            let in_flight = in_flight.clone();
            thread::Builder::new()
                .name("ce-accept".to_string())
                .spawn(move || accept_loop(listener, ctx, &shutdown, &in_flight))
                .map_err(ListenerError::Spawn)?
        };

        Ok(Self {
            addr: bound,
            shutdown,
            in_flight,
            acceptor: Some(acceptor),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Connections currently being read.
    pub fn in_flight(&self) -> usize {
        self.in_flight.conns().len()
    }

    /// Stop accepting, wait up to `grace` for open runs, then close the rest.
    pub fn shutdown(mut self, grace: Duration) -> ShutdownReport {
        let started = Instant::now();
        self.stop_accepting();

        // A grace too large to represent means waiting for every run.
        let deadline = started.checked_add(grace);
        let mut conns = self.in_flight.conns();
        while !conns.is_empty() {
            let finished = &self.in_flight.finished;
            conns = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        break;
                    }
                    match finished.wait_timeout(conns, deadline - now) {
                        Ok((guard, _)) => guard,
                        Err(poisoned) => poisoned.into_inner().0,
                    }
                }
                None => match finished.wait(conns) {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                },
            };
        }

        let abandoned = conns.len();
        for (id, stream) in conns.drain() {
            warn!(conn_id = id, "closing connection still open after grace period");
            if let Err(e) = stream.shutdown(Shutdown::Both) {
                debug!(conn_id = id, error = %e, "close failed");
            }
        }
        drop(conns);

        let report = ShutdownReport {
            abandoned,
            waited: started.elapsed(),
        };
        info!(
            abandoned = report.abandoned,
            waited_ms = report.waited.as_millis() as u64,
            "scan listener stopped"
        );
        report
    }

    fn stop_accepting(&mut self) {
        let Some(acceptor) = self.acceptor.take() else {
            return;
        };
        self.shutdown.store(true, Ordering::SeqCst);
        // Unblock accept().
        if let Err(e) = TcpStream::connect(wake_addr(self.addr)) {
            debug!(error = %e, "wake-up connection failed");
        }
        if acceptor.join().is_err() {
            error!("accept thread panicked");
        }
    }

    /// Whether the accept loop is still running.
    pub fn is_accepting(&self) -> bool {
        self.acceptor.is_some()
    }
}

impl Drop for ScanListener {
    fn drop(&mut self) {
        self.stop_accepting();
    }
}

/// An address that reaches a listener bound to `addr`.
fn wake_addr(addr: SocketAddr) -> SocketAddr {
    let mut target = addr;
    if addr.ip().is_unspecified() {
        match addr {
            SocketAddr::V4(_) => target.set_ip([127, 0, 0, 1].into()),
            SocketAddr::V6(_) => target.set_ip(std::net::Ipv6Addr::LOCALHOST.into()),
        }
    }
    target
}

fn accept_loop(
    listener: TcpListener,
    ctx: HandlerContext,
    shutdown: &AtomicBool,
    in_flight: &Arc<InFlight>,
) {
    let mut next_id: u64 = 1;

    for stream in listener.incoming() {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        let stream = match stream {
            Ok(stream) => stream,
            Err(e) => {
                warn!(error = %e, "accept failed");
                // Back off on fd exhaustion and similar persistent errors.
                thread::sleep(Duration::from_millis(50));
                continue;
            }
        };

        let id = next_id;
        next_id += 1;
        in_flight.register(id, &stream);

        let handler = ConnectionHandler::new(id, ctx.sink.clone(), ctx.fingerprinter.clone());
        let in_flight_conn = in_flight.clone();
        let spawned = thread::Builder::new()
            .name(format!("ce-conn-{id}"))
            .spawn(move || {
                match stream.peer_addr() {
                    Ok(peer) => debug!(conn_id = id, peer = %peer, "serving connection"),
                    Err(_) => debug!(conn_id = id, "serving connection"),
                }
                handler.run(&stream);
                in_flight_conn.finish(id);
            });

        if let Err(e) = spawned {
            error!(conn_id = id, error = %e, "failed to spawn connection handler");
            in_flight.finish(id);
        }
    }

    debug!("accept loop exited");
}
