//! Minimal Ethernet/IPv4/TCP header walk.
//!
//! Only enough decoding to classify a frame as the first packet of a TCP
//! connection attempt. Anything malformed or out of scope yields `None`
//! and is dropped silently.

use std::net::Ipv4Addr;

const ETHERTYPE_IPV4: u16 = 0x0800;
const ETH_HEADER_LEN: usize = 14;
const IP_PROTO_TCP: u8 = 6;

const TCP_FLAG_SYN: u8 = 0x02;
const TCP_FLAG_ACK: u8 = 0x10;

/// A decoded TCP connection attempt (SYN without ACK).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpSyn {
    pub src_ip: Ipv4Addr,
    pub src_port: u16,
    pub dst_ip: Ipv4Addr,
    pub dst_port: u16,
}

/// Decode `frame` as Ethernet/IPv4/TCP and return the connection attempt,
/// or `None` for anything else (non-IPv4, non-TCP, continuation packets,
/// truncated headers).
pub fn decode_tcp_syn(frame: &[u8]) -> Option<TcpSyn> {
    if frame.len() < ETH_HEADER_LEN {
        return None;
    }
    let ethertype = u16::from_be_bytes([frame[12], frame[13]]);
    if ethertype != ETHERTYPE_IPV4 {
        return None;
    }

    let ip = &frame[ETH_HEADER_LEN..];
    if ip.len() < 20 {
        return None;
    }
    let version = ip[0] >> 4;
    let ihl = (ip[0] & 0x0f) as usize * 4;
    if version != 4 || ihl < 20 || ip.len() < ihl {
        return None;
    }
    if ip[9] != IP_PROTO_TCP {
        return None;
    }
    let src_ip = Ipv4Addr::new(ip[12], ip[13], ip[14], ip[15]);
    let dst_ip = Ipv4Addr::new(ip[16], ip[17], ip[18], ip[19]);

    let tcp = &ip[ihl..];
    if tcp.len() < 14 {
        return None;
    }
    let flags = tcp[13];
    if flags & TCP_FLAG_SYN == 0 || flags & TCP_FLAG_ACK != 0 {
        return None;
    }

    Some(TcpSyn {
        src_ip,
        src_port: u16::from_be_bytes([tcp[0], tcp[1]]),
        dst_ip,
        dst_port: u16::from_be_bytes([tcp[2], tcp[3]]),
    })
}

#[cfg(test)]
pub(crate) fn build_syn_frame(
    src_ip: Ipv4Addr,
    src_port: u16,
    dst_ip: Ipv4Addr,
    dst_port: u16,
    flags: u8,
) -> Vec<u8> {
    let mut frame = vec![0u8; ETH_HEADER_LEN + 20 + 20];
    frame[12] = 0x08;
    frame[13] = 0x00;

    let ip = &mut frame[ETH_HEADER_LEN..];
    ip[0] = 0x45; // version 4, ihl 5
    ip[9] = IP_PROTO_TCP;
    ip[12..16].copy_from_slice(&src_ip.octets());
    ip[16..20].copy_from_slice(&dst_ip.octets());

    let tcp = &mut ip[20..];
    tcp[0..2].copy_from_slice(&src_port.to_be_bytes());
    tcp[2..4].copy_from_slice(&dst_port.to_be_bytes());
    tcp[13] = flags;
    frame
}
