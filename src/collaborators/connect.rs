//! Outbound network collaborator (SPEC_FULL.md §6).

use async_trait::async_trait;
use thiserror::Error;
use tokio::net::{TcpSocket, UnixStream};
use tracing::debug;

use crate::address::Address;
use crate::socket::Socket;

/// Outcome of exhausting the candidate target list, or failing locally
/// while trying one.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// Every candidate target was unreachable or refused (`sock = -1`
    /// in the source's callback contract).
    #[error("all candidate targets were unreachable or refused")]
    Exhausted,
    /// A local resource failure occurred while attempting to connect
    /// (e.g. socket creation or bind failed), as opposed to the remote
    /// end refusing the connection.
    #[error("local resource failure while connecting: {0}")]
    Resource(#[source] std::io::Error),
}

/// Tries each of `targets` in order (optionally bound to `bind_addr`)
/// until one succeeds (SPEC_FULL.md §6 `connect_bind`).
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(
        &self,
        targets: &[Address],
        bind_addr: Option<&Address>,
    ) -> Result<Socket, ConnectError>;
}

/// Production [`Connector`] using real TCP and UNIX-domain sockets.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioConnector;

#[async_trait]
impl Connector for TokioConnector {
    async fn connect(
        &self,
        targets: &[Address],
        bind_addr: Option<&Address>,
    ) -> Result<Socket, ConnectError> {
        for target in targets {
            match connect_one(target, bind_addr).await {
                Ok(socket) => return Ok(socket),
                Err(err) => debug!(target = %target.pretty(), %err, "candidate target failed"),
            }
        }
        Err(ConnectError::Exhausted)
    }
}

async fn connect_one(target: &Address, bind_addr: Option<&Address>) -> std::io::Result<Socket> {
    if target.family() == libc::AF_UNIX {
        let path = target
            .to_unix_path()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "malformed unix address"))?;
        let stream = UnixStream::connect(path).await?;
        return Ok(Socket::Unix(stream));
    }

    let addr = target
        .to_socket_addr()
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "malformed inet address"))?;

    let socket = match addr {
        std::net::SocketAddr::V4(_) => TcpSocket::new_v4()?,
        std::net::SocketAddr::V6(_) => TcpSocket::new_v6()?,
    };

    if let Some(bind_addr) = bind_addr.and_then(Address::to_socket_addr) {
        socket.bind(bind_addr)?;
    }

    let stream = socket.connect(addr).await?;
    Ok(Socket::Tcp(stream))
}
