// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Multicast group join and interface binding.
//!
//! Unlike a DDS participant, which joins on every non-loopback interface
//! to maximize discovery reach, this agent is bound to exactly one
//! operator-specified interface (§6): multicast must not be forwarded
//! anywhere else.

use crate::error::SetupError;
use std::net::{Ipv4Addr, UdpSocket};
use std::os::unix::io::AsRawFd;

/// Control multicast group, per §6.
pub const GROUP: Ipv4Addr = Ipv4Addr::new(239, 6, 6, 6);
/// Well-known port, per §6.
pub const PORT: u16 = 21337;

/// Resolve `ifname` to its kernel interface index via `SIOCGIFINDEX`.
pub fn interface_index(socket: &UdpSocket, ifname: &str) -> Result<i32, SetupError> {
    if ifname.len() >= libc::IFNAMSIZ {
        return Err(SetupError::InterfaceNotFound(ifname.to_string()));
    }

    #[repr(C)]
    struct IfReqIndex {
        ifr_name: [libc::c_char; libc::IFNAMSIZ],
        ifr_ifindex: libc::c_int,
    }

    let mut req: IfReqIndex = unsafe { std::mem::zeroed() };
    for (dst, src) in req.ifr_name.iter_mut().zip(ifname.bytes()) {
        *dst = src as libc::c_char;
    }

    // SAFETY: `req` is a zero-initialized, correctly sized `ifreq`-shaped
    // struct and `fd` is a valid open socket; `SIOCGIFINDEX` only fills in
    // the `ifr_ifindex` field.
    let ret = unsafe {
        libc::ioctl(
            socket.as_raw_fd(),
            libc::SIOCGIFINDEX,
            &mut req as *mut IfReqIndex as *mut libc::c_void,
        )
    };

    if ret != 0 {
        return Err(SetupError::InterfaceNotFound(ifname.to_string()));
    }

    Ok(req.ifr_ifindex)
}

/// Join [`GROUP`] on `ifname` and bind the socket exclusively to that
/// device, so multicast traffic from other interfaces never reaches us.
pub fn join_and_bind_device(socket: &UdpSocket, ifname: &str) -> Result<(), SetupError> {
    let ifindex = interface_index(socket, ifname)?;

    // ip_mreqn lets us join by ifindex directly, rather than needing the
    // interface's local IPv4 address (which embedded devices may not have
    // yet at startup).
    let mreqn = libc::ip_mreqn {
        imr_multiaddr: libc::in_addr {
            s_addr: u32::from(GROUP).to_be(),
        },
        imr_address: libc::in_addr { s_addr: 0 },
        imr_ifindex: ifindex,
    };

    // SAFETY: `mreqn` is fully initialized and correctly sized for
    // `IP_ADD_MEMBERSHIP`; `fd` is a valid open UDP socket.
    let ret = unsafe {
        libc::setsockopt(
            socket.as_raw_fd(),
            libc::IPPROTO_IP,
            libc::IP_ADD_MEMBERSHIP,
            &mreqn as *const libc::ip_mreqn as *const libc::c_void,
            std::mem::size_of::<libc::ip_mreqn>() as libc::socklen_t,
        )
    };
    if ret != 0 {
        return Err(SetupError::MulticastJoin(std::io::Error::last_os_error()));
    }

    let ifname_bytes = ifname.as_bytes();
    // SAFETY: `ifname_bytes` lives for the duration of the call and
    // `SO_BINDTODEVICE` only reads `len` bytes from it.
    let ret = unsafe {
        libc::setsockopt(
            socket.as_raw_fd(),
            libc::SOL_SOCKET,
            libc::SO_BINDTODEVICE,
            ifname_bytes.as_ptr() as *const libc::c_void,
            ifname_bytes.len() as libc::socklen_t,
        )
    };
    if ret != 0 {
        return Err(SetupError::MulticastJoin(std::io::Error::last_os_error()));
    }

    Ok(())
}
