// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Derives this agent's stable unique ID from its interface's link-layer
//! address, mirroring the original's `SIOCGIFHWADDR` lookup.

use std::os::unix::io::AsRawFd;

const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

/// Query `ifname`'s hardware (MAC) address via `SIOCGIFHWADDR` and format it
/// as 12 lowercase hex characters with no separators.
///
/// Returns the all-zero ID on any failure, matching the original: the
/// controller simply won't be able to address this agent directly.
#[must_use]
pub fn derive_unique_id(socket: &impl AsRawFd, ifname: &str) -> String {
    match query_hwaddr(socket.as_raw_fd(), ifname) {
        Ok(mac) => format_hex(&mac),
        Err(e) => {
            tracing::error!(interface = ifname, error = %e, "failed to derive unique id from interface hwaddr");
            "0".repeat(12)
        }
    }
}

fn format_hex(mac: &[u8; 6]) -> String {
    let mut out = String::with_capacity(12);
    for byte in mac {
        out.push(HEX_DIGITS[(byte >> 4) as usize] as char);
        out.push(HEX_DIGITS[(byte & 0x0f) as usize] as char);
    }
    out
}

fn query_hwaddr(fd: i32, ifname: &str) -> std::io::Result<[u8; 6]> {
    // `ifreq` is not exposed by `libc` with a stable layout on every target,
    // so we lay it out by hand: a 16-byte interface name followed by the
    // `sockaddr` union `ioctl(SIOCGIFHWADDR)` fills in.
    #[repr(C)]
    struct IfReqHwaddr {
        ifr_name: [libc::c_char; libc::IFNAMSIZ],
        ifr_hwaddr: libc::sockaddr,
    }

    if ifname.len() >= libc::IFNAMSIZ {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("interface name '{ifname}' too long"),
        ));
    }

    let mut req: IfReqHwaddr = unsafe { std::mem::zeroed() };
    for (dst, src) in req.ifr_name.iter_mut().zip(ifname.bytes()) {
        *dst = src as libc::c_char;
    }

    // SAFETY: `fd` is a valid, open socket descriptor; `req` is a
    // correctly sized and zero-initialized `ifreq`-compatible struct, and
    // `SIOCGIFHWADDR` only reads/writes within its bounds.
    let ret = unsafe {
        libc::ioctl(
            fd,
            libc::SIOCGIFHWADDR,
            &mut req as *mut IfReqHwaddr as *mut libc::c_void,
        )
    };

    if ret != 0 {
        return Err(std::io::Error::last_os_error());
    }

    let mut mac = [0u8; 6];
    mac.copy_from_slice(&req.ifr_hwaddr.sa_data[..6].iter().map(|&b| b as u8).collect::<Vec<_>>());
    Ok(mac)
}
