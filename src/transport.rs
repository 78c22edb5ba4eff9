// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Wire transport abstraction.
//!
//! [`Transport`] is the seam between the admin/router logic and the host
//! network stack, with two concrete implementations: [`UdpMulticastTransport`]
//! for real multicast admin traffic (socket setup follows the standard
//! multicast-join sequence: reuse address/port, bind, join group, set
//! TTL/loopback) and [`LoopbackTransport`], an in-memory double used by
//! tests to exercise multiple devices in one process without a network.
//!
//! Both implementations are driven from [`crate::device::Device::poll`]
//! via non-blocking `mio::Poll` readiness checks — there is no background
//! thread anywhere in this module; the whole crate runs cooperatively off
//! a single `poll()` call.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::rc::Rc;
use std::time::Duration;

use mio::net::UdpSocket as MioUdpSocket;
use mio::{Events, Interest, Poll, Token};
use socket2::{Domain, Protocol, Socket, Type};

use crate::error::{Error, Result};

const MAX_DATAGRAM: usize = 4096;
const MIO_TOKEN: Token = Token(0);

/// A datagram-oriented transport capable of admin-bus broadcast and
/// point-to-point signal traffic.
pub trait Transport {
    /// Send `bytes` to `dest`. For multicast transports, `dest` is the
    /// group address; for point-to-point traffic it is the peer's
    /// advertised data address.
    fn send_to(&mut self, dest: SocketAddr, bytes: &[u8]) -> Result<()>;

    /// Broadcast `bytes` to the admin group.
    fn broadcast(&mut self, bytes: &[u8]) -> Result<()>;

    /// Drain all datagrams currently available without blocking.
    fn poll_recv(&mut self) -> Result<Vec<(SocketAddr, Vec<u8>)>>;

    /// The local address this transport is bound to, once known.
    fn local_addr(&self) -> Option<SocketAddr>;
}

/// Real UDP multicast transport for the admin bus.
///
/// Socket setup mirrors the standard multicast-join sequence: enable
/// address/port reuse so multiple devices can share the group on one
/// host, bind, join the multicast group, and set TTL/loopback so
/// same-host peers see each other's announcements.
pub struct UdpMulticastTransport {
    socket: MioUdpSocket,
    poll: Poll,
    events: Events,
    group: SocketAddr,
    local_addr: SocketAddr,
}

impl UdpMulticastTransport {
    /// Bind to `bind_port` (0 for ephemeral) and join `group` on
    /// `interface`.
    pub fn join(
        group: Ipv4Addr,
        group_port: u16,
        bind_port: u16,
        interface: Ipv4Addr,
    ) -> Result<Self> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
            .map_err(|e| Error::Transport(format!("socket: {e}")))?;
        socket
            .set_reuse_address(true)
            .map_err(|e| Error::Transport(format!("reuse_address: {e}")))?;
        #[cfg(unix)]
        socket
            .set_reuse_port(true)
            .map_err(|e| Error::Transport(format!("reuse_port: {e}")))?;

        let bind_addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, bind_port);
        socket
            .bind(&bind_addr.into())
            .map_err(|e| Error::Transport(format!("bind: {e}")))?;
        socket
            .join_multicast_v4(&group, &interface)
            .map_err(|e| Error::Transport(format!("join_multicast_v4: {e}")))?;
        socket
            .set_multicast_loop_v4(true)
            .map_err(|e| Error::Transport(format!("multicast_loop_v4: {e}")))?;
        socket
            .set_multicast_ttl_v4(1)
            .map_err(|e| Error::Transport(format!("multicast_ttl_v4: {e}")))?;
        socket
            .set_nonblocking(true)
            .map_err(|e| Error::Transport(format!("nonblocking: {e}")))?;

        let local_addr = socket
            .local_addr()
            .map_err(|e| Error::Transport(format!("local_addr: {e}")))?
            .as_socket()
            .ok_or_else(|| Error::Transport("socket has no IPv4 local address".into()))?;

        let mut mio_socket = MioUdpSocket::from_std(socket.into());
        let poll = Poll::new().map_err(|e| Error::Transport(format!("mio::Poll::new: {e}")))?;
        poll.registry()
            .register(&mut mio_socket, MIO_TOKEN, Interest::READABLE)
            .map_err(|e| Error::Transport(format!("mio register: {e}")))?;

        Ok(Self {
            socket: mio_socket,
            poll,
            events: Events::with_capacity(64),
            group: SocketAddr::new(group.into(), group_port),
            local_addr,
        })
    }
}

impl Transport for UdpMulticastTransport {
    fn send_to(&mut self, dest: SocketAddr, bytes: &[u8]) -> Result<()> {
        self.socket
            .send_to(bytes, dest)
            .map(|_| ())
            .map_err(|e| Error::Transport(format!("send_to {dest}: {e}")))
    }

    fn broadcast(&mut self, bytes: &[u8]) -> Result<()> {
        let group = self.group;
        self.send_to(group, bytes)
    }

    fn poll_recv(&mut self) -> Result<Vec<(SocketAddr, Vec<u8>)>> {
        self.poll
            .poll(&mut self.events, Some(Duration::ZERO))
            .map_err(|e| Error::Transport(format!("mio poll: {e}")))?;
        if self.events.is_empty() {
            return Ok(Vec::new());
        }

        let mut out = Vec::new();
        let mut buf = [0u8; MAX_DATAGRAM];
        loop {
            match self.socket.recv_from(&mut buf) {
                Ok((n, from)) => out.push((from, buf[..n].to_vec())),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(Error::Transport(format!("recv_from: {e}"))),
            }
        }
        Ok(out)
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        Some(self.local_addr)
    }
}

/// Shared mailbox backing a [`LoopbackTransport`] pair: a list of
/// registered endpoints and their pending inboxes.
#[derive(Default)]
pub struct LoopbackHub {
    next_addr: u16,
    inboxes: Vec<(SocketAddr, VecDeque<(SocketAddr, Vec<u8>)>)>,
}

/// In-process transport double. `broadcast` fans a datagram out to every
/// other endpoint sharing the same [`LoopbackHub`], modeling a multicast
/// group without touching a real socket — used by integration tests that
/// exercise two or more [`crate::device::Device`]s in one process.
pub struct LoopbackTransport {
    hub: Rc<RefCell<LoopbackHub>>,
    addr: SocketAddr,
}

impl LoopbackTransport {
    /// Create a fresh, empty hub that devices can join via
    /// [`LoopbackTransport::join`].
    pub fn new_hub() -> Rc<RefCell<LoopbackHub>> {
        Rc::new(RefCell::new(LoopbackHub::default()))
    }

    /// Join `hub`, allocating a unique loopback port.
    pub fn join(hub: Rc<RefCell<LoopbackHub>>) -> Self {
        let addr = {
            let mut h = hub.borrow_mut();
            h.next_addr += 1;
            let addr = SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 20000 + h.next_addr);
            h.inboxes.push((addr, VecDeque::new()));
            addr
        };
        Self { hub, addr }
    }
}

impl Transport for LoopbackTransport {
    fn send_to(&mut self, dest: SocketAddr, bytes: &[u8]) -> Result<()> {
        let mut h = self.hub.borrow_mut();
        if let Some((_, inbox)) = h.inboxes.iter_mut().find(|(addr, _)| *addr == dest) {
            inbox.push_back((self.addr, bytes.to_vec()));
            Ok(())
        } else {
            Err(Error::Transport(format!("no loopback peer at {dest}")))
        }
    }

    fn broadcast(&mut self, bytes: &[u8]) -> Result<()> {
        let mut h = self.hub.borrow_mut();
        let from = self.addr;
        for (addr, inbox) in h.inboxes.iter_mut() {
            if *addr != from {
                inbox.push_back((from, bytes.to_vec()));
            }
        }
        Ok(())
    }

    fn poll_recv(&mut self) -> Result<Vec<(SocketAddr, Vec<u8>)>> {
        let mut h = self.hub.borrow_mut();
        let my_addr = self.addr;
        if let Some((_, inbox)) = h.inboxes.iter_mut().find(|(addr, _)| *addr == my_addr) {
            Ok(inbox.drain(..).collect())
        } else {
            Ok(Vec::new())
        }
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        Some(self.addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_delivers_point_to_point() {
        let hub = LoopbackTransport::new_hub();
        let mut a = LoopbackTransport::join(hub.clone());
        let mut b = LoopbackTransport::join(hub);

        a.send_to(b.local_addr().unwrap(), b"hello").unwrap();
        let received = b.poll_recv().unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].1, b"hello");
    }

    #[test]
    fn loopback_broadcast_reaches_all_other_peers() {
        let hub = LoopbackTransport::new_hub();
        let mut a = LoopbackTransport::join(hub.clone());
        let mut b = LoopbackTransport::join(hub.clone());
        let mut c = LoopbackTransport::join(hub);

        a.broadcast(b"announce").unwrap();
        assert_eq!(b.poll_recv().unwrap().len(), 1);
        assert_eq!(c.poll_recv().unwrap().len(), 1);
        assert_eq!(a.poll_recv().unwrap().len(), 0);
    }
}
