//! TFaaS server

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum_server::Handle;
use axum_server::tls_rustls::RustlsConfig;
use tokio::signal;
use tracing::{error, info, warn};

use super::acceptor::PeerCertAcceptor;
use super::router::{AppState, create_router};
use crate::authz::Authorizer;
use crate::config::Config;
use crate::directory::HttpDirectory;
use crate::mtls::{CredentialLoader, build_tls_config, cert_manager};
use crate::predict::StaticPredictor;
use crate::verbosity::Verbosity;
use crate::{Error, Result};

/// Time in-flight requests get to finish after a shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// TFaaS server
pub struct TfaasServer {
    /// Configuration
    config: Config,
    /// Shared request state
    state: Arc<AppState>,
}

impl TfaasServer {
    /// Create a server with the directory-backed gate and the static model.
    ///
    /// The outbound identity is resolved here so that malformed credential
    /// files stop the process before it listens.
    ///
    /// # Errors
    ///
    /// `Error::Credential` if the configured proxy or user credentials
    /// cannot be loaded.
    pub async fn new(config: Config, verbosity: Arc<Verbosity>) -> Result<Self> {
        let credentials = Arc::new(CredentialLoader::from_process(
            &config.credentials.proxy_dir,
        ));
        match credentials.load().await? {
            Some(identity) => info!(
                subject = %identity.subject(),
                source = identity.source().label(),
                "Outbound identity loaded"
            ),
            None => info!("Outbound calls are anonymous"),
        }

        let directory = Arc::new(HttpDirectory::new(config.directory.clone(), credentials));
        info!(url = %directory.url(), "Identity directory configured");

        let state = Arc::new(AppState {
            authorizer: Arc::new(Authorizer::new(directory)),
            predictor: Arc::new(StaticPredictor),
            verbosity,
            model_dir: config.server.dir.clone(),
            max_body_bytes: config.server.max_body_bytes,
        });

        Ok(Self::with_state(config, state))
    }

    /// Create a server over prebuilt state.
    #[must_use]
    pub fn with_state(config: Config, state: Arc<AppState>) -> Self {
        Self { config, state }
    }

    /// Run until SIGINT or SIGTERM.
    ///
    /// # Errors
    ///
    /// `Error::Tls` if the server certificate or key is unusable,
    /// `Error::Io` if the listener cannot be bound.
    pub async fn run(self) -> Result<()> {
        let handle = Handle::new();
        tokio::spawn(shutdown_signal(handle.clone()));
        self.serve(handle).await
    }

    /// Serve until `handle` is told to shut down.
    ///
    /// # Errors
    ///
    /// See [`TfaasServer::run`].
    pub async fn serve(self, handle: Handle<SocketAddr>) -> Result<()> {
        let addr = SocketAddr::new(
            self.config
                .server
                .host
                .parse()
                .map_err(|e| Error::Config(format!("Invalid host: {e}")))?,
            self.config.server.port,
        );

        cert_manager::preflight(&self.config.tls);
        let tls = build_tls_config(&self.config.tls)?;
        let acceptor = PeerCertAcceptor::new(RustlsConfig::from_config(Arc::new(tls)));

        if !self.state.model_dir.is_dir() {
            warn!(dir = %self.state.model_dir.display(), "Model directory does not exist");
        }

        info!("============================================================");
        info!("TFAAS SERVER v{}", env!("CARGO_PKG_VERSION"));
        info!("============================================================");
        info!(host = %self.config.server.host, port = self.config.server.port, "Listening (HTTPS)");
        info!(
            require_client_cert = self.config.tls.require_client_cert,
            "Client certificates requested"
        );
        info!(dir = %self.state.model_dir.display(), "Serving models under /models/");
        info!("Endpoints: .../data?model=<file>  .../predict  .../verbose  /");
        info!("============================================================");

        let app = create_router(Arc::clone(&self.state));

        axum_server::bind(addr)
            .acceptor(acceptor)
            .handle(handle)
            .serve(app.into_make_service())
            .await
            .map_err(|e| {
                error!(%addr, error = %e, "Server terminated");
                Error::Io(e)
            })?;

        info!("Server stopped");
        Ok(())
    }
}

/// Shutdown signal handler
async fn shutdown_signal(handle: Handle<SocketAddr>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
    handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
}
