//! Lifecycle of the mock server: `Idle → Running → Stopped`, one cycle per harness.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use itest_proto::auctioneer::channel_auctioneer_server::{
    ChannelAuctioneer, ChannelAuctioneerServer,
};
use itest_proto::swapserver::swap_server_server::{SwapServer, SwapServerServer};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tonic::service::RoutesBuilder;
use tonic::transport::Channel;
use tonic::transport::server::{Server, TcpIncoming};
use tracing::{Instrument, debug, info, info_span, warn};

use crate::client;
use crate::config::HarnessConfig;
use crate::credentials;
use crate::error::HarnessError;
use crate::service::MockAuctioneer;

/// Terminal result of the background serve loop. `Ok(())` after a clean shutdown.
pub type ServeOutcome = Result<(), tonic::transport::Error>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarnessState {
    Idle,
    Running,
    Stopped,
}

impl std::fmt::Display for HarnessState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Stopped => "stopped",
        })
    }
}

/// Scratch directory owning the credential files.
enum Scratch {
    Scoped(TempDir),
    Kept(PathBuf),
}

impl Scratch {
    fn path(&self) -> &Path {
        match self {
            Self::Scoped(dir) => dir.path(),
            Self::Kept(path) => path,
        }
    }
}

/// Test-owned handle on a TLS-secured mock gRPC server.
///
/// `start` returns as soon as the listener is bound and the serve task is
/// spawned. `stop` returns only after that task has exited.
pub struct ServerHarness<A = MockAuctioneer> {
    config: HarnessConfig,
    service: Arc<A>,
    routes: RoutesBuilder,
    state: HarnessState,
    scratch: Option<Scratch>,
    cert_file: Option<PathBuf>,
    key_file: Option<PathBuf>,
    local_addr: Option<SocketAddr>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    serve_task: Option<JoinHandle<()>>,
    serve_rx: Option<oneshot::Receiver<ServeOutcome>>,
}

impl ServerHarness<MockAuctioneer> {
    /// Harness serving the default all-unimplemented auctioneer.
    pub fn new(config: HarnessConfig) -> Self {
        Self::with_service(config, MockAuctioneer)
    }
}

impl<A: ChannelAuctioneer> ServerHarness<A> {
    /// Harness serving a caller-supplied auctioneer implementation.
    pub fn with_service(config: HarnessConfig, service: A) -> Self {
        Self {
            config,
            service: Arc::new(service),
            routes: RoutesBuilder::default(),
            state: HarnessState::Idle,
            scratch: None,
            cert_file: None,
            key_file: None,
            local_addr: None,
            shutdown_tx: None,
            serve_task: None,
            serve_rx: None,
        }
    }

    /// Register additional service contracts next to the auctioneer.
    pub fn register(mut self, f: impl FnOnce(&mut RoutesBuilder)) -> Self {
        f(&mut self.routes);
        self
    }

    /// Also serve the swap server contract.
    pub fn with_swap_server<S: SwapServer>(self, server: S) -> Self {
        self.register(|routes| {
            routes.add_service(SwapServerServer::new(server));
        })
    }

    /// Provision credentials, bind the listener and spawn the serve loop.
    ///
    /// On error the harness stays `Idle`, no task is running and the scratch
    /// directory has already been removed.
    pub async fn start(&mut self) -> Result<(), HarnessError> {
        match self.state {
            HarnessState::Idle => {}
            HarnessState::Running | HarnessState::Stopped => {
                return Err(HarnessError::AlreadyStarted);
            }
        }

        let scratch = tempfile::Builder::new()
            .prefix(&self.config.temp_dir_prefix)
            .tempdir()
            .map_err(HarnessError::TempDir)?;
        let cert_file = scratch.path().join(&self.config.cert_file_name);
        let key_file = scratch.path().join(&self.config.key_file_name);

        let tls = credentials::provision(&cert_file, &key_file, &self.config.cert).await?;

        let listener = TcpListener::bind(&self.config.listen_addr)
            .await
            .map_err(|source| HarnessError::Bind {
                addr: self.config.listen_addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr().map_err(HarnessError::LocalAddr)?;

        let mut server = Server::builder().tls_config(tls)?;
        let mut routes = std::mem::take(&mut self.routes);
        routes.add_service(ChannelAuctioneerServer::from_arc(Arc::clone(&self.service)));
        let router = server.add_routes(routes.routes());

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let (serve_tx, serve_rx) = oneshot::channel::<ServeOutcome>();

        let span = info_span!("mock_server", addr = %local_addr);
        let serve_task = tokio::spawn(
            async move {
                let outcome = router
                    .serve_with_incoming_shutdown(TcpIncoming::from(listener), async {
                        let _ = shutdown_rx.await;
                    })
                    .await;
                match &outcome {
                    Ok(()) => debug!("serve loop exited"),
                    Err(e) => warn!(error = %e, "serve loop failed"),
                }
                // Nobody may be listening; the slot is buffered either way.
                let _ = serve_tx.send(outcome);
            }
            .instrument(span),
        );

        let scratch = if self.config.keep_credentials {
            Scratch::Kept(scratch.keep())
        } else {
            Scratch::Scoped(scratch)
        };

        info!(
            addr = %local_addr,
            cert = %cert_file.display(),
            "mock server started"
        );

        self.scratch = Some(scratch);
        self.cert_file = Some(cert_file);
        self.key_file = Some(key_file);
        self.local_addr = Some(local_addr);
        self.shutdown_tx = Some(shutdown_tx);
        self.serve_task = Some(serve_task);
        self.serve_rx = Some(serve_rx);
        self.state = HarnessState::Running;
        Ok(())
    }

    /// Gracefully shut the server down and wait for the serve task to exit.
    ///
    /// In-flight calls are drained under tonic's own shutdown policy, so no
    /// connection or handler outlives this call. The serve outcome is left in
    /// the serve signal.
    pub async fn stop(&mut self) -> Result<(), HarnessError> {
        if self.state != HarnessState::Running {
            return Err(HarnessError::NotRunning);
        }
        self.state = HarnessState::Stopped;

        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
        if let Some(serve_task) = self.serve_task.take() {
            serve_task.await.map_err(HarnessError::TaskPanicked)?;
        }
        info!(addr = ?self.local_addr, "mock server stopped");
        Ok(())
    }

    /// Open a client channel to the running server, trusting the generated certificate.
    pub async fn channel(&self) -> Result<Channel, HarnessError> {
        match (self.local_addr, self.cert_file.as_deref()) {
            (Some(addr), Some(cert_file)) if self.state == HarnessState::Running => {
                client::connect(addr, cert_file).await
            }
            _ => Err(HarnessError::NotRunning),
        }
    }
}

impl<A> ServerHarness<A> {
    pub fn state(&self) -> HarnessState {
        self.state
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// The configured `host:port`, as passed in.
    pub fn listen_addr(&self) -> &str {
        &self.config.listen_addr
    }

    /// The address actually bound, with port 0 resolved. `None` before `start`.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// PEM certificate a client should trust. `None` before `start`.
    pub fn cert_file(&self) -> Option<&Path> {
        self.cert_file.as_deref()
    }

    pub fn key_file(&self) -> Option<&Path> {
        self.key_file.as_deref()
    }

    /// Directory holding the credential files. `None` before `start`.
    pub fn scratch_dir(&self) -> Option<&Path> {
        self.scratch.as_ref().map(Scratch::path)
    }

    pub fn service(&self) -> &Arc<A> {
        &self.service
    }

    /// Whether the background serve task is still alive.
    pub fn is_serving(&self) -> bool {
        self.serve_task
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Take the one-shot receiver carrying the serve loop's terminal result.
    ///
    /// Returns `None` before `start` or once taken.
    pub fn take_serve_signal(&mut self) -> Option<oneshot::Receiver<ServeOutcome>> {
        self.serve_rx.take()
    }
}

impl<A> Drop for ServerHarness<A> {
    fn drop(&mut self) {
        if let Some(task) = self.serve_task.take() {
            if !task.is_finished() {
                warn!(addr = ?self.local_addr, "harness dropped while serving, aborting serve task");
            }
            task.abort();
        }
    }
}
