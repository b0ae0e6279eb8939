// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The agent's UDP socket: bound to the control port, joined to the
//! control multicast group on one interface, non-blocking, registered
//! with the event loop's `mio::Poll`.

use crate::error::SetupError;
use crate::net::multicast::{self, GROUP, PORT};
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};

/// `mio` registration token for the agent's socket.
pub const SOCKET_TOKEN: mio::Token = mio::Token(0);

pub struct AgentSocket {
    inner: mio::net::UdpSocket,
}

impl AgentSocket {
    /// Open, bind, and join the socket on `ifname`. Any failure here is
    /// fatal per §4.2 — the caller is expected to log and exit.
    pub fn open(ifname: &str) -> Result<Self, SetupError> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
            .map_err(SetupError::Socket)?;
        socket.set_reuse_address(true).map_err(SetupError::Socket)?;

        let bind_addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, PORT);
        socket
            .bind(&bind_addr.into())
            .map_err(|source| SetupError::Bind { port: PORT, source })?;

        let std_socket: std::net::UdpSocket = socket.into();
        multicast::join_and_bind_device(&std_socket, ifname)?;
        std_socket.set_nonblocking(true).map_err(SetupError::Socket)?;

        Ok(Self {
            inner: mio::net::UdpSocket::from_std(std_socket),
        })
    }

    /// Wrap an already-bound loopback socket directly, skipping the
    /// multicast join/device-bind steps. Used by tests that exercise the
    /// dispatcher's wire behavior without requiring a real multicast
    /// interface.
    #[must_use]
    pub fn from_bound(socket: UdpSocket) -> Self {
        socket.set_nonblocking(true).expect("set_nonblocking on test socket");
        Self {
            inner: mio::net::UdpSocket::from_std(socket),
        }
    }

    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr().expect("bound socket has a local address")
    }

    /// Register this socket for readability with `registry`.
    pub fn register(&mut self, registry: &mio::Registry) -> Result<(), SetupError> {
        registry
            .register(&mut self.inner, SOCKET_TOKEN, mio::Interest::READABLE)
            .map_err(SetupError::Poll)
    }

    /// Read one datagram, if any is pending. Returns `Ok(None)` on
    /// `WouldBlock` (§4.2 "transient read errors are silently ignored").
    pub fn try_recv(&self, buf: &mut [u8]) -> std::io::Result<Option<(usize, SocketAddr)>> {
        match self.inner.recv_from(buf) {
            Ok((len, addr)) => Ok(Some((len, addr))),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Unicast `payload` to `addr` (every reply is addressed back to the
    /// request's sender, never multicast).
    pub fn send_to(&self, payload: &[u8], addr: SocketAddr) -> std::io::Result<usize> {
        self.inner.send_to(payload, addr)
    }

    #[must_use]
    pub fn multicast_group() -> SocketAddr {
        SocketAddr::new(GROUP.into(), PORT)
    }
}
