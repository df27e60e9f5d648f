//! TCP server
//!
//! Binds the service and manager listeners, spawns the worker pool, and
//! feeds accepted connections to it. The accept threads poll non-blocking
//! listeners so they can observe the shutdown flag.

use std::net::{SocketAddr, TcpListener, TcpStream};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{bounded, Receiver, Sender};

use crate::cluster;
use crate::context::ServerContext;
use crate::error::{KvdbError, Result};

use super::connection::handle_connection;
use super::PortClass;

/// Backlog of accepted-but-not-yet-claimed connections
const PENDING_CONNECTIONS: usize = 1024;

/// Message sent to worker threads
enum WorkerMessage {
    NewConnection(TcpStream, PortClass),
    Shutdown,
}

pub struct Server {
    ctx: Arc<ServerContext>,
    shutdown: Arc<AtomicBool>,
    work_sender: Option<Sender<WorkerMessage>>,
    workers: Vec<JoinHandle<()>>,
    acceptors: Vec<JoinHandle<()>>,
    service_addr: Option<SocketAddr>,
    manager_addr: Option<SocketAddr>,
}

impl Server {
    pub fn new(ctx: Arc<ServerContext>) -> Self {
        Self {
            ctx,
            shutdown: Arc::new(AtomicBool::new(false)),
            work_sender: None,
            workers: Vec::new(),
            acceptors: Vec::new(),
            service_addr: None,
            manager_addr: None,
        }
    }

    /// Bind both listeners and spawn the pool. Returns once the ports are
    /// accepting; readiness is still gated on `confirm_cluster`.
    pub fn start(&mut self) -> Result<()> {
        let (service_addr, manager_addr) = {
            let config = self.ctx.kvdb_config();
            (config.service_addr(), config.manager_addr())
        };

        let service = bind(&service_addr)?;
        let manager = bind(&manager_addr)?;
        self.service_addr = Some(service.local_addr()?);
        self.manager_addr = Some(manager.local_addr()?);
        tracing::info!(
            service = %self.service_addr.unwrap(),
            manager = %self.manager_addr.unwrap(),
            "listening"
        );

        let worker_count = worker_pool_size();
        let (sender, receiver) = bounded::<WorkerMessage>(PENDING_CONNECTIONS);
        self.work_sender = Some(sender.clone());

        tracing::info!(workers = worker_count, "starting worker pool");
        for worker_id in 0..worker_count {
            let worker = Worker {
                id: worker_id,
                receiver: receiver.clone(),
                ctx: Arc::clone(&self.ctx),
            };
            let handle = thread::Builder::new()
                .name(format!("kvdb-worker-{}", worker_id))
                .spawn(move || worker.run())
                .map_err(|e| KvdbError::Internal(format!("cannot spawn worker: {}", e)))?;
            self.workers.push(handle);
        }

        for (listener, port) in [(service, PortClass::Service), (manager, PortClass::Manager)] {
            let sender = sender.clone();
            let shutdown = Arc::clone(&self.shutdown);
            let label = match port {
                PortClass::Service => "kvdb-accept-service",
                PortClass::Manager => "kvdb-accept-manager",
            };
            let handle = thread::Builder::new()
                .name(label.to_string())
                .spawn(move || accept_loop(listener, port, sender, shutdown))
                .map_err(|e| KvdbError::Internal(format!("cannot spawn acceptor: {}", e)))?;
            self.acceptors.push(handle);
        }

        Ok(())
    }

    /// Run the cluster handshake and open the service port up. Blocks
    /// until every peer confirms; a descriptor mismatch is returned to the
    /// caller, which exits. `cluster_info` is already being served on both
    /// ports while this waits, so peers can confirm against each other.
    pub fn confirm_cluster(&self) -> Result<()> {
        cluster::confirm(&self.ctx)?;
        self.ctx.set_ready();
        tracing::info!("server ready");
        Ok(())
    }

    /// Start listeners, confirm the cluster, serve. Returns when the
    /// server has shut down.
    pub fn run(&mut self) -> Result<()> {
        self.start()?;
        self.confirm_cluster()?;
        self.wait();
        Ok(())
    }

    /// Block until the accept threads exit (i.e. until shutdown).
    pub fn wait(&mut self) {
        for handle in self.acceptors.drain(..) {
            if let Err(e) = handle.join() {
                tracing::error!("acceptor thread panicked: {:?}", e);
            }
        }
        self.drain_workers();
    }

    /// Signal shutdown and join everything.
    pub fn shutdown(&mut self) {
        tracing::info!("shutting down server");
        self.shutdown.store(true, Ordering::Relaxed);
        for handle in self.acceptors.drain(..) {
            let _ = handle.join();
        }
        self.drain_workers();
        tracing::info!("server stopped");
    }

    fn drain_workers(&mut self) {
        if let Some(sender) = self.work_sender.take() {
            for _ in 0..self.workers.len() {
                let _ = sender.send(WorkerMessage::Shutdown);
            }
        }
        for handle in self.workers.drain(..) {
            if let Err(e) = handle.join() {
                tracing::error!("worker thread panicked: {:?}", e);
            }
        }
    }

    /// Actual bound service address (useful when configured with port 0)
    pub fn service_addr(&self) -> Option<SocketAddr> {
        self.service_addr
    }

    /// Actual bound manager address
    pub fn manager_addr(&self) -> Option<SocketAddr> {
        self.manager_addr
    }
}

fn bind(addr: &str) -> Result<TcpListener> {
    let listener = TcpListener::bind(addr)
        .map_err(|e| KvdbError::Internal(format!("cannot bind {}: {}", addr, e)))?;
    listener.set_nonblocking(true)?;
    Ok(listener)
}

fn accept_loop(
    listener: TcpListener,
    port: PortClass,
    sender: Sender<WorkerMessage>,
    shutdown: Arc<AtomicBool>,
) {
    while !shutdown.load(Ordering::Relaxed) {
        match listener.accept() {
            Ok((stream, addr)) => {
                tracing::debug!(client = %addr, ?port, "accepted");
                if stream.set_nonblocking(false).is_err() {
                    continue;
                }
                if sender.send(WorkerMessage::NewConnection(stream, port)).is_err() {
                    break;
                }
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(10));
            }
            Err(e) => {
                if !shutdown.load(Ordering::Relaxed) {
                    tracing::error!(?port, error = %e, "accept error");
                }
            }
        }
    }
}

/// Worker thread that handles client connections
struct Worker {
    id: usize,
    receiver: Receiver<WorkerMessage>,
    ctx: Arc<ServerContext>,
}

impl Worker {
    fn run(self) {
        tracing::debug!(worker = self.id, "worker started");
        loop {
            match self.receiver.recv() {
                Ok(WorkerMessage::NewConnection(stream, port)) => {
                    let ctx = Arc::clone(&self.ctx);
                    // A panicking executor must cost one connection, not a
                    // pool thread.
                    let outcome =
                        catch_unwind(AssertUnwindSafe(|| handle_connection(&ctx, stream, port)));
                    if let Err(panic) = outcome {
                        tracing::error!(worker = self.id, ?panic, "connection handler panicked");
                    }
                }
                Ok(WorkerMessage::Shutdown) | Err(_) => break,
            }
        }
        tracing::debug!(worker = self.id, "worker stopped");
    }
}

/// Frame decode and executor dispatch pool: `2 × logical CPUs`.
fn worker_pool_size() -> usize {
    thread::available_parallelism().map(|p| p.get()).unwrap_or(4) * 2
}
