use std::io;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{error, info};

use super::service::AppService;

/// How long a worker waits for a request before re-checking for shutdown.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A `tiny_http` listener drained by a fixed pool of worker threads.
///
/// Each request is handled synchronously on the worker that received it.
pub struct HttpServer {
    service: AppService,
    workers: usize,
}

/// Handle to a running server.
pub struct ServerHandle {
    addr: SocketAddr,
    shutdown: ShutdownTrigger,
    workers: Vec<JoinHandle<()>>,
}

/// Stops a server from another thread (e.g. a signal handler) while the
/// owner of the [`ServerHandle`] is blocked in [`ServerHandle::join`].
#[derive(Clone)]
pub struct ShutdownTrigger {
    flag: Arc<AtomicBool>,
    server: Arc<tiny_http::Server>,
    workers: usize,
}

impl ShutdownTrigger {
    /// Ask every worker to finish its current request and exit.
    pub fn trigger(&self) {
        if self.flag.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Server shutdown requested");
        for _ in 0..self.workers {
            self.server.unblock();
        }
    }

    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

impl ServerHandle {
    /// Address actually bound; differs from the requested one for port 0.
    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Poll the listener until it accepts a TCP connection.
    ///
    /// # Errors
    ///
    /// `TimedOut` when nothing accepts within about half a second.
    pub fn wait_ready(&self) -> io::Result<()> {
        for _ in 0..100 {
            if TcpStream::connect(self.addr).is_ok() {
                return Ok(());
            }
            thread::sleep(Duration::from_millis(5));
        }
        Err(io::Error::new(io::ErrorKind::TimedOut, "server not ready"))
    }

    #[must_use]
    pub fn shutdown_trigger(&self) -> ShutdownTrigger {
        self.shutdown.clone()
    }

    /// Stop accepting, let in-flight requests finish and join the workers.
    pub fn stop(self) {
        self.shutdown.trigger();
        // Workers never panic out of `handle`; a join error means a bug was
        // already logged by the panic hook.
        let _ = self.join();
    }

    /// Block until every worker has exited.
    ///
    /// # Errors
    ///
    /// Returns the payload of the first worker that panicked.
    pub fn join(self) -> thread::Result<()> {
        let mut result = Ok(());
        for worker in self.workers {
            if let Err(e) = worker.join() {
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }
        info!(addr = %self.addr, "Server stopped");
        result
    }
}

impl HttpServer {
    pub fn new(service: AppService, workers: usize) -> Self {
        Self {
            service,
            workers: workers.max(1),
        }
    }

    /// Bind `addr` and spawn the worker pool.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid or cannot be bound.
    pub fn start<A: ToSocketAddrs>(self, addr: A) -> io::Result<ServerHandle> {
        let requested = addr
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "invalid address"))?;

        let server = Arc::new(tiny_http::Server::http(requested).map_err(io::Error::other)?);
        let addr = server.server_addr().to_ip().unwrap_or(requested);

        let shutdown = ShutdownTrigger {
            flag: Arc::new(AtomicBool::new(false)),
            server: Arc::clone(&server),
            workers: self.workers,
        };

        let mut workers = Vec::with_capacity(self.workers);
        for id in 0..self.workers {
            let server = Arc::clone(&server);
            let service = self.service.clone();
            let flag = Arc::clone(&shutdown.flag);
            let worker = thread::Builder::new()
                .name(format!("http-worker-{id}"))
                .spawn(move || worker_loop(&server, &service, &flag))?;
            workers.push(worker);
        }

        info!(addr = %addr, workers = self.workers, "HTTP server listening");
        Ok(ServerHandle {
            addr,
            shutdown,
            workers,
        })
    }
}

fn worker_loop(server: &tiny_http::Server, service: &AppService, shutdown: &AtomicBool) {
    while !shutdown.load(Ordering::SeqCst) {
        match server.recv_timeout(POLL_INTERVAL) {
            Ok(Some(request)) => service.handle(request),
            Ok(None) => {}
            Err(e) => {
                if !shutdown.load(Ordering::SeqCst) {
                    error!(error = %e, "Listener failed; worker exiting");
                }
                break;
            }
        }
    }
}
