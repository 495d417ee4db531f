// Per-connection request/response exchange
use crate::{
    difficulty::DifficultyPolicy,
    error::{Error, Result},
    share_validator::{classify_share, WorkSource},
    state::RuntimeState,
    types::{ConnectionId, RelayResponse, ShareOutcome},
};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    time::timeout,
};
use tracing::{debug, info, warn};

/// Limits applied to every connection
#[derive(Debug, Clone, Copy)]
pub struct ConnectionLimits {
    pub max_request_bytes: usize,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
}

impl Default for ConnectionLimits {
    fn default() -> Self {
        Self {
            max_request_bytes: 1024,
            read_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(10),
        }
    }
}

/// Everything a handler needs besides its socket
#[derive(Clone)]
pub struct RelayContext {
    pub state: Arc<RuntimeState>,
    pub policy: Arc<DifficultyPolicy>,
    pub work_source: Arc<dyn WorkSource>,
    pub limits: ConnectionLimits,
}

/// Connection handler for individual client connections
pub struct ConnectionHandler {
    connection_id: ConnectionId,
    stream: TcpStream,
    peer_addr: SocketAddr,
    context: RelayContext,
}

impl ConnectionHandler {
    pub fn new(
        connection_id: ConnectionId,
        stream: TcpStream,
        peer_addr: SocketAddr,
        context: RelayContext,
    ) -> Self {
        Self {
            connection_id,
            stream,
            peer_addr,
            context,
        }
    }

    /// Run one request/response exchange and close the connection.
    ///
    /// The miner stays counted as connected until this returns, whichever
    /// path it returns through.
    pub async fn handle(self) -> Result<()> {
        let Self {
            connection_id,
            mut stream,
            peer_addr,
            context,
        } = self;
        let _miner = context.state.connect_miner();

        debug!("Handling connection from {}: {}", peer_addr, connection_id);

        let request = Self::read_request(&mut stream, &context.limits).await?;
        debug!("Received from {}: {}", connection_id, request.trim_end());

        let work = context.work_source.next_work();
        let outcome = classify_share(work.value);
        context.state.record_share(work, outcome);

        let mut response = match outcome {
            ShareOutcome::Accepted => {
                let endpoint = context.state.endpoint().await;
                RelayResponse::success(endpoint.pool_info(), endpoint.tcp_info())
            }
            ShareOutcome::Stale | ShareOutcome::Rejected => {
                RelayResponse::error(outcome.error_message().unwrap_or("Rejected share"))
            }
        };

        let difficulty = context.policy.adjust(&context.state).await;
        response.set_difficulty(difficulty);

        info!(
            "Share {} from {} classified {:?}, difficulty {}",
            work.value, peer_addr, outcome, difficulty
        );

        Self::send_response(&mut stream, &response, context.limits.write_timeout).await?;

        if let Err(e) = stream.shutdown().await {
            debug!("Shutdown of {} failed: {}", connection_id, e);
        }
        Ok(())
    }

    /// Read the single request payload and decode it as UTF-8
    async fn read_request(stream: &mut TcpStream, limits: &ConnectionLimits) -> Result<String> {
        let mut buffer = vec![0u8; limits.max_request_bytes];
        let n = timeout(limits.read_timeout, stream.read(&mut buffer))
            .await
            .map_err(|_| Error::Connection("Timed out waiting for request".to_string()))?
            .map_err(|e| Error::Connection(format!("Failed to read request: {}", e)))?;

        buffer.truncate(n);
        Ok(String::from_utf8(buffer)?)
    }

    /// Send a response back to the client
    async fn send_response(
        stream: &mut TcpStream,
        response: &RelayResponse,
        write_timeout: Duration,
    ) -> Result<()> {
        let line = response.to_line()?;
        let write = async {
            stream.write_all(line.as_bytes()).await?;
            stream.flush().await
        };

        timeout(write_timeout, write)
            .await
            .map_err(|_| Error::Network("Timed out sending response".to_string()))?
            .map_err(|e| Error::Network(format!("Failed to send response: {}", e)))?;
        Ok(())
    }
}

/// Run a handler and log its failure; nothing propagates to the accept loop
pub async fn serve_connection(handler: ConnectionHandler) {
    let connection_id = handler.connection_id;
    if let Err(e) = handler.handle().await {
        warn!(
            category = e.category(),
            "Error handling client {}: {}", connection_id, e
        );
    }
}
