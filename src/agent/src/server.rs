//! gRPC server setup for the Agent service.
//!
//! Serves over TCP, or over a Unix domain socket when one is configured.

use std::future::Future;
use std::path::{Path, PathBuf};

use tokio::net::{TcpListener, UnixListener};
use tokio_stream::wrappers::{TcpListenerStream, UnixListenerStream};
use tonic::transport::Server;

use harness_runtime::LifecycleController;

use crate::rpc::agent_server::AgentServer as AgentRpcServer;
use crate::service::AgentService;

/// Error type returned by the serve functions.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Where the agent accepts connections.
#[derive(Debug, Clone)]
pub enum Listen {
    /// TCP address, e.g. `0.0.0.0:9090`
    Tcp(String),
    /// Unix domain socket path
    Unix(PathBuf),
}

impl std::fmt::Display for Listen {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Listen::Tcp(addr) => write!(f, "tcp://{}", addr),
            Listen::Unix(path) => write!(f, "unix://{}", path.display()),
        }
    }
}

/// Agent gRPC server.
pub struct AgentServer {
    service: AgentService,
}

impl AgentServer {
    /// Create a server for `controller`.
    pub fn new(controller: LifecycleController) -> Self {
        Self {
            service: AgentService::new(controller),
        }
    }

    /// Bind `listen` and serve until `shutdown` resolves.
    pub async fn serve<F>(self, listen: &Listen, shutdown: F) -> Result<(), BoxError>
    where
        F: Future<Output = ()>,
    {
        match listen {
            Listen::Tcp(addr) => {
                let listener = TcpListener::bind(addr.as_str()).await?;
                self.serve_tcp(listener, shutdown).await
            }
            Listen::Unix(path) => self.serve_unix(path, shutdown).await,
        }
    }

    /// Serve on an already-bound TCP listener until `shutdown` resolves.
    pub async fn serve_tcp<F>(
        self,
        listener: TcpListener,
        shutdown: F,
    ) -> Result<(), BoxError>
    where
        F: Future<Output = ()>,
    {
        tracing::info!(addr = %listener.local_addr()?, "Agent listening");

        Server::builder()
            .add_service(AgentRpcServer::new(self.service))
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), shutdown)
            .await?;

        tracing::info!("Agent stopped");
        Ok(())
    }

    /// Serve on a Unix domain socket until `shutdown` resolves.
    pub async fn serve_unix<F>(self, socket_path: &Path, shutdown: F) -> Result<(), BoxError>
    where
        F: Future<Output = ()>,
    {
        // Remove existing socket file if present
        if socket_path.exists() {
            std::fs::remove_file(socket_path)?;
        }

        // Ensure parent directory exists
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let uds = UnixListener::bind(socket_path)?;
        tracing::info!(socket = %socket_path.display(), "Agent listening");

        Server::builder()
            .add_service(AgentRpcServer::new(self.service))
            .serve_with_incoming_shutdown(UnixListenerStream::new(uds), shutdown)
            .await?;

        let _ = std::fs::remove_file(socket_path);
        tracing::info!("Agent stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use harness_core::config::LimitsConfig;
    use harness_core::event::EventEmitter;
    use harness_runtime::{InstanceRegistry, RetryPolicy, SimulatedProvisioner};
    use tokio::sync::oneshot;

    fn controller() -> LifecycleController {
        LifecycleController::new(
            Arc::new(InstanceRegistry::new()),
            Arc::new(SimulatedProvisioner::instant()),
            RetryPolicy::none(),
            LimitsConfig::default(),
            EventEmitter::default(),
        )
    }

    #[test]
    fn test_listen_display() {
        assert_eq!(
            Listen::Tcp("0.0.0.0:9090".to_string()).to_string(),
            "tcp://0.0.0.0:9090"
        );
        assert_eq!(
            Listen::Unix(PathBuf::from("/tmp/agent.sock")).to_string(),
            "unix:///tmp/agent.sock"
        );
    }

    #[tokio::test]
    async fn test_unix_socket_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("run").join("agent.sock");
        let (tx, rx) = oneshot::channel::<()>();

        let listen = Listen::Unix(socket.clone());
        let server = tokio::spawn(async move {
            AgentServer::new(controller())
                .serve(&listen, async {
                    let _ = rx.await;
                })
                .await
                .unwrap();
        });

        for _ in 0..200 {
            if socket.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(socket.exists());

        tx.send(()).unwrap();
        server.await.unwrap();
        assert!(!socket.exists());
    }
}
