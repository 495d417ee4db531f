use relay_core::{
    adjuster::spawn_difficulty_adjuster,
    api_server::ApiServer,
    bitcoin_rpc::BitcoinRpcClient,
    connection::{ConnectionLimits, RelayContext},
    difficulty::DifficultyPolicy,
    server::{RelayServer, ServerHandle},
    share_validator::RandomWorkSource,
    Error, RelayConfig, RelayController, Result, RuntimeState,
};
use std::sync::Arc;
use tokio::{signal, task::JoinHandle};
use tracing::{error, info, warn};

/// Wires the relay components together and owns their tasks
pub struct RelayDaemon {
    config: RelayConfig,
    state: Arc<RuntimeState>,
    server_handle: Option<ServerHandle>,
    server_task: Option<JoinHandle<Result<()>>>,
    adjuster_task: Option<JoinHandle<()>>,
    api_task: Option<JoinHandle<()>>,
}

impl RelayDaemon {
    pub fn new(config: RelayConfig) -> Self {
        let state = Arc::new(RuntimeState::from_config(&config));
        Self {
            config,
            state,
            server_handle: None,
            server_task: None,
            adjuster_task: None,
            api_task: None,
        }
    }

    /// Bind the miner listener and spawn the background tasks.
    ///
    /// Failing to bind the listener is fatal. A control panel that cannot
    /// bind only logs, the relay keeps serving miners.
    pub async fn start(&mut self) -> Result<()> {
        let rpc = BitcoinRpcClient::new(self.config.rpc.clone())?;
        let context = RelayContext {
            state: Arc::clone(&self.state),
            policy: Arc::new(DifficultyPolicy::new(Arc::new(rpc))),
            work_source: Arc::new(RandomWorkSource),
            limits: ConnectionLimits {
                max_request_bytes: self.config.network.max_request_bytes,
                read_timeout: self.config.network.read_timeout(),
                write_timeout: self.config.network.write_timeout(),
            },
        };

        let (server, handle) = RelayServer::bind(&self.config.network, context).await?;
        info!("Miner listener bound to {}", server.local_addr()?);
        self.server_task = Some(tokio::spawn(server.run()));

        self.adjuster_task = Some(spawn_difficulty_adjuster(
            Arc::clone(&self.state),
            self.config.difficulty.auto_increase_interval(),
        ));

        if self.config.control_panel.enabled {
            let controller = Arc::new(RelayController::new(Arc::clone(&self.state), handle.clone()));
            let api_server = ApiServer::new(self.config.control_panel.bind_address, controller);
            self.api_task = Some(tokio::spawn(async move {
                if let Err(e) = api_server.start().await {
                    error!("Control panel stopped: {}", e);
                }
            }));
        } else {
            info!("Control panel disabled");
        }

        self.server_handle = Some(handle);
        Ok(())
    }

    /// Run until Ctrl-C or until the miner listener goes down
    pub async fn run_until_shutdown(&mut self) -> Result<()> {
        let mut server_task = self
            .server_task
            .take()
            .ok_or_else(|| Error::Internal("Relay was not started".to_string()))?;

        let outcome = tokio::select! {
            signal = signal::ctrl_c() => {
                match signal {
                    Ok(()) => info!("Shutdown signal received"),
                    Err(e) => warn!("Failed to listen for shutdown signal: {}", e),
                }
                self.stop().await;
                match server_task.await {
                    Ok(result) => result,
                    Err(e) => Err(Error::Internal(format!("Relay server task failed: {}", e))),
                }
            }
            joined = &mut server_task => {
                self.stop().await;
                match joined {
                    Ok(result) => result,
                    Err(e) => Err(Error::Internal(format!("Relay server task failed: {}", e))),
                }
            }
        };

        info!("relayd stopped");
        outcome
    }

    async fn stop(&mut self) {
        if let Some(handle) = self.server_handle.take() {
            // The server may already be gone after a fatal rebind.
            let _ = handle.shutdown().await;
        }
        if let Some(task) = self.adjuster_task.take() {
            task.abort();
        }
        if let Some(task) = self.api_task.take() {
            task.abort();
        }
    }
}
