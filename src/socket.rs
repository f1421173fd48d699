//! The core's view of an open, already-connected stream socket.
//!
//! The accepted socket and the outbound socket are each one of these.
//! `AF_UNIX` targets are as first-class as `AF_INET`/`AF_INET6` in
//! [`Address`](crate::address::Address), so the engine cannot assume
//! every peer is a TCP stream.

use std::{
    io, mem,
    os::unix::io::{AsRawFd, RawFd},
    pin::Pin,
    task::{Context, Poll},
};

use tokio::{
    io::{AsyncRead, AsyncWrite, ReadBuf, ReadHalf, WriteHalf},
    net::{TcpStream, UnixStream},
};

/// Either flavor of stream socket the engine can own.
#[derive(Debug)]
pub enum Socket {
    Tcp(TcpStream),
    Unix(UnixStream),
}

/// The read half produced by splitting a [`Socket`] for a pipe task.
pub type SocketReadHalf = ReadHalf<Socket>;
/// The write half produced by splitting a [`Socket`] for a pipe task.
pub type SocketWriteHalf = WriteHalf<Socket>;

impl Socket {
    /// Splits into independent read/write halves so the forward and
    /// reverse pipe tasks can each own exactly the half they need
    /// (SPEC_FULL.md §4.1 pipe launch). No locking is required because
    /// ownership, not borrowing, partitions access.
    pub fn into_split(self) -> (SocketReadHalf, SocketWriteHalf) {
        tokio::io::split(self)
    }

    /// Sets `SO_KEEPALIVE`, ignoring errors (§4.1 pipe launch, step 1):
    /// the option may not apply to every socket kind and pipe launch
    /// must proceed regardless.
    pub fn set_keepalive(&self, enabled: bool) {
        set_bool_sockopt(self.as_raw_fd(), libc::SOL_SOCKET, libc::SO_KEEPALIVE, enabled);
    }

    /// Sets `TCP_NODELAY`, ignoring errors (§4.1 pipe launch, step 2):
    /// meaningless on `AF_UNIX` sockets, where it silently no-ops.
    pub fn set_nodelay(&self, enabled: bool) {
        if let Socket::Tcp(tcp) = self {
            let _ = tcp.set_nodelay(enabled);
        }
    }
}

impl AsRawFd for Socket {
    fn as_raw_fd(&self) -> RawFd {
        match self {
            Socket::Tcp(s) => s.as_raw_fd(),
            Socket::Unix(s) => s.as_raw_fd(),
        }
    }
}

fn set_bool_sockopt(fd: RawFd, level: libc::c_int, name: libc::c_int, value: bool) {
    let flag: libc::c_int = value as libc::c_int;
    unsafe {
        // Return value intentionally ignored: the option may not apply
        // to this socket kind, and pipe launch must proceed regardless.
        libc::setsockopt(
            fd,
            level,
            name,
            &flag as *const libc::c_int as *const libc::c_void,
            mem::size_of::<libc::c_int>() as libc::socklen_t,
        );
    }
}

// `Socket`'s variants (`TcpStream`, `UnixStream`) are both `Unpin`, so
// `Socket` is `Unpin` too; `Pin::get_mut` below is therefore safe
// without any unsafe pin-projection machinery.
impl AsyncRead for Socket {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Socket::Tcp(s) => Pin::new(s).poll_read(cx, buf),
            Socket::Unix(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Socket {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Socket::Tcp(s) => Pin::new(s).poll_write(cx, buf),
            Socket::Unix(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Socket::Tcp(s) => Pin::new(s).poll_flush(cx),
            Socket::Unix(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Socket::Tcp(s) => Pin::new(s).poll_shutdown(cx),
            Socket::Unix(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}
