//! Parser for the Linux `/proc/net/tcp` and `/proc/net/tcp6` tables.
//!
//! Each row looks like:
//!
//! ```text
//!   sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid ...
//!    0: 0100007F:0CEA 00000000:0000 0A 00000000:00000000 00:00000000 00000000   112 ...
//! ```
//!
//! Addresses are the kernel's in-memory words printed as hex, so each 32-bit
//! group is converted back with native byte order. Ports are plain hex.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use super::model::{NetConnection, TcpState};

/// Parse a whole table, skipping the header and any row that does not parse.
pub fn parse_table(contents: &str) -> impl Iterator<Item = NetConnection> + '_ {
    contents.lines().skip(1).filter_map(parse_row)
}

/// Parse one table row.
pub fn parse_row(line: &str) -> Option<NetConnection> {
    let mut fields = line.split_whitespace();
    let _slot = fields.next()?;
    let local_addr = parse_endpoint(fields.next()?)?;
    let remote = parse_endpoint(fields.next()?)?;
    let status = TcpState::from_proc_code(u8::from_str_radix(fields.next()?, 16).ok()?)?;

    let remote_addr = (!remote.ip().is_unspecified() || remote.port() != 0).then_some(remote);

    Some(NetConnection {
        local_addr,
        remote_addr,
        status,
    })
}

fn parse_endpoint(field: &str) -> Option<SocketAddr> {
    let (addr, port) = field.split_once(':')?;
    let port = u16::from_str_radix(port, 16).ok()?;

    let ip = match addr.len() {
        8 => IpAddr::V4(Ipv4Addr::from(parse_word(addr)?)),
        32 => {
            let mut octets = [0u8; 16];
            for (i, chunk) in octets.chunks_exact_mut(4).enumerate() {
                chunk.copy_from_slice(&parse_word(&addr[i * 8..i * 8 + 8])?);
            }
            IpAddr::V6(Ipv6Addr::from(octets))
        }
        _ => return None,
    };

    Some(SocketAddr::new(ip, port))
}

fn parse_word(hex: &str) -> Option<[u8; 4]> {
    u32::from_str_radix(hex, 16).ok().map(u32::to_ne_bytes)
}
