// TCP server accepting miner connections
use crate::{
    config::NetworkConfig,
    connection::{serve_connection, ConnectionHandler, RelayContext},
    error::{Error, Result},
};
use std::{io, net::SocketAddr};
use tokio::{
    net::{lookup_host, TcpListener, TcpSocket, TcpStream},
    sync::{mpsc, oneshot},
    time::{sleep, Duration},
};
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Bind `host:port`, moving to the next port while the current one is taken.
///
/// Only "address in use" is retried. Any other failure is returned as
/// [`Error::Bind`] and is meant to be fatal.
pub async fn bind_with_retry(host: &str, port: u16, backlog: u32) -> Result<TcpListener> {
    let mut port = port;
    loop {
        match bind_listener(host, port, backlog).await {
            Ok(listener) => return Ok(listener),
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
                warn!("Port {} is in use. Trying next port...", port);
                port = port.checked_add(1).ok_or_else(|| {
                    Error::Bind(format!("No free port left on {} above {}", host, port))
                })?;
            }
            Err(e) => {
                return Err(Error::Bind(format!("Failed to bind {}:{}: {}", host, port, e)));
            }
        }
    }
}

async fn bind_listener(host: &str, port: u16, backlog: u32) -> io::Result<TcpListener> {
    let addr = lookup_host((host, port)).await?.next().ok_or_else(|| {
        io::Error::new(io::ErrorKind::AddrNotAvailable, format!("{} did not resolve", host))
    })?;

    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    #[cfg(unix)]
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    socket.listen(backlog)
}

enum ServerCommand {
    Rebind {
        port: u16,
        reply: oneshot::Sender<Result<SocketAddr>>,
    },
    Shutdown,
}

enum ServerEvent {
    Accepted(io::Result<(TcpStream, SocketAddr)>),
    Command(ServerCommand),
}

/// Handle used to steer a running [`RelayServer`]
#[derive(Clone)]
pub struct ServerHandle {
    command_tx: mpsc::Sender<ServerCommand>,
}

impl ServerHandle {
    /// Close the listener and bind again on `port`, with the same
    /// next-port retry as startup. Returns the address actually bound.
    pub async fn rebind(&self, port: u16) -> Result<SocketAddr> {
        let (reply, response) = oneshot::channel();
        self.command_tx
            .send(ServerCommand::Rebind { port, reply })
            .await
            .map_err(|_| Error::Internal("Relay server is not running".to_string()))?;
        response
            .await
            .map_err(|_| Error::Internal("Relay server stopped during rebind".to_string()))?
    }

    /// Stop accepting connections. In-flight handlers run to completion.
    pub async fn shutdown(&self) -> Result<()> {
        self.command_tx
            .send(ServerCommand::Shutdown)
            .await
            .map_err(|_| Error::Internal("Failed to send shutdown signal".to_string()))
    }
}

/// Accept loop for miner connections.
///
/// The loop owns the listener. Rebind requests arrive over the command
/// channel and are served between accepts, so a rebind never overlaps an
/// accept in progress.
pub struct RelayServer {
    host: String,
    backlog: u32,
    listener: TcpListener,
    context: RelayContext,
    command_rx: mpsc::Receiver<ServerCommand>,
}

impl RelayServer {
    /// Bind the configured address and record the port actually bound
    pub async fn bind(network: &NetworkConfig, context: RelayContext) -> Result<(Self, ServerHandle)> {
        let listener = bind_with_retry(&network.host, network.port, network.listen_backlog).await?;
        let local_addr = listener.local_addr()?;
        context.state.set_listen_port(local_addr.port()).await;

        let (command_tx, command_rx) = mpsc::channel(8);
        let server = Self {
            host: network.host.clone(),
            backlog: network.listen_backlog,
            listener,
            context,
            command_rx,
        };

        Ok((server, ServerHandle { command_tx }))
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until shutdown or a fatal rebind failure
    pub async fn run(self) -> Result<()> {
        let Self {
            host,
            backlog,
            mut listener,
            context,
            mut command_rx,
        } = self;

        info!("Stratum relay listening on {}", listener.local_addr()?);

        loop {
            let event = tokio::select! {
                result = listener.accept() => ServerEvent::Accepted(result),
                Some(command) = command_rx.recv() => ServerEvent::Command(command),
            };

            match event {
                ServerEvent::Accepted(Ok((stream, peer_addr))) => {
                    let connection_id = Uuid::new_v4();
                    let handler =
                        ConnectionHandler::new(connection_id, stream, peer_addr, context.clone());
                    let span = info_span!("connection", id = %connection_id, peer = %peer_addr);
                    tokio::spawn(serve_connection(handler).instrument(span));
                }
                ServerEvent::Accepted(Err(e)) => {
                    error!("Failed to accept connection: {}", e);
                    sleep(Duration::from_millis(100)).await;
                }
                ServerEvent::Command(ServerCommand::Rebind { port, reply }) => {
                    info!("Rebinding relay listener to {}:{}", host, port);
                    drop(listener);

                    match bind_with_retry(&host, port, backlog).await {
                        Ok(new_listener) => {
                            let local_addr = new_listener.local_addr()?;
                            context.state.set_listen_port(local_addr.port()).await;
                            info!("Stratum relay listening on {}", local_addr);
                            listener = new_listener;
                            let _ = reply.send(Ok(local_addr));
                        }
                        Err(e) => {
                            error!("Rebind failed, relay listener is down: {}", e);
                            let message = e.to_string();
                            let _ = reply.send(Err(Error::Bind(message.clone())));
                            return Err(Error::Bind(message));
                        }
                    }
                }
                ServerEvent::Command(ServerCommand::Shutdown) => {
                    info!("Shutting down Stratum relay");
                    break;
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_skips_occupied_port() {
        let blocker = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let taken = blocker.local_addr().unwrap().port();
        let next_port_free = std::net::TcpListener::bind(("127.0.0.1", taken + 1)).is_ok();

        let listener = bind_with_retry("127.0.0.1", taken, 10).await.unwrap();
        let bound = listener.local_addr().unwrap().port();
        assert!(bound > taken);
        if next_port_free {
            assert_eq!(bound, taken + 1);
        }
    }

    #[tokio::test]
    async fn test_bind_to_foreign_address_is_fatal() {
        // TEST-NET-1 is never assigned to a local interface.
        let err = bind_with_retry("192.0.2.1", 0, 10).await.unwrap_err();
        assert!(matches!(err, Error::Bind(_)));
        assert!(!err.is_recoverable());
    }
}
