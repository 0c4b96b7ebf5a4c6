//! Link, network and transport decoding down to the flow key.
//!
//! ```text
//! link (Ethernet / SLL / NULL / raw) → IPv4 | IPv6 → TCP | UDP ports
//! ```
//!
//! Non-IP frames pass through without a flow key. Non-first IPv4 fragments
//! and port-less protocols get zero ports.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use pcapflow_core::packet::{IPPROTO_TCP, IPPROTO_UDP};
use pcapflow_core::{FlowKey, Packet, Stage, StageError, ThreadInfo, Verdict};

/// BSD loopback.
pub const LINKTYPE_NULL: u32 = 0;
/// Ethernet II.
pub const LINKTYPE_ETHERNET: u32 = 1;
/// Raw IP, version in the first nibble.
pub const LINKTYPE_RAW: u32 = 101;
/// Linux cooked capture v1.
pub const LINKTYPE_LINUX_SLL: u32 = 113;
/// Raw IPv4.
pub const LINKTYPE_IPV4: u32 = 228;
/// Raw IPv6.
pub const LINKTYPE_IPV6: u32 = 229;

const ETHERTYPE_IPV4: u16 = 0x0800;
const ETHERTYPE_IPV6: u16 = 0x86dd;
const ETHERTYPE_VLAN: u16 = 0x8100;
const ETHERTYPE_QINQ: u16 = 0x88a8;

/// IPv6 extension headers walked before giving up.
const MAX_EXTENSION_HEADERS: usize = 8;

/// Malformed packet.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The packet ends inside a header.
    #[error("truncated {0} header")]
    Truncated(&'static str),

    /// The link type is not decoded.
    #[error("unsupported link type {0}")]
    UnsupportedLinkType(u32),

    /// IP version nibble is neither 4 nor 6.
    #[error("invalid IP version {0}")]
    BadIpVersion(u8),

    /// IPv4 header length below the minimum.
    #[error("invalid IPv4 header length {0}")]
    BadHeaderLength(usize),
}

/// Decodes `data` captured on `linktype` into a flow key.
///
/// # Errors
///
/// Returns a [`DecodeError`] for malformed or unsupported frames.
pub fn decode_flow(linktype: u32, data: &[u8]) -> Result<Option<FlowKey>, DecodeError> {
    match linktype {
        LINKTYPE_ETHERNET => decode_ethernet(data),
        LINKTYPE_LINUX_SLL => {
            let header = data.get(..16).ok_or(DecodeError::Truncated("SLL"))?;
            let ethertype = u16::from_be_bytes([header[14], header[15]]);
            decode_ethertype(ethertype, &data[16..])
        }
        LINKTYPE_NULL => {
            let header = data.get(..4).ok_or(DecodeError::Truncated("loopback"))?;
            // Address family in host order of the capturing machine.
            let family = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
            let family = if family > 0xffff { family.swap_bytes() } else { family };
            match family {
                2 => decode_ipv4(&data[4..]).map(Some),
                // 24, 28, 30 depending on the BSD flavour.
                24 | 28 | 30 => decode_ipv6(&data[4..]).map(Some),
                _ => Ok(None),
            }
        }
        LINKTYPE_RAW => decode_ip(data).map(Some),
        LINKTYPE_IPV4 => decode_ipv4(data).map(Some),
        LINKTYPE_IPV6 => decode_ipv6(data).map(Some),
        other => Err(DecodeError::UnsupportedLinkType(other)),
    }
}

fn decode_ethernet(data: &[u8]) -> Result<Option<FlowKey>, DecodeError> {
    let header = data.get(..14).ok_or(DecodeError::Truncated("Ethernet"))?;
    let mut ethertype = u16::from_be_bytes([header[12], header[13]]);
    let mut offset = 14;
    while ethertype == ETHERTYPE_VLAN || ethertype == ETHERTYPE_QINQ {
        let tag = data
            .get(offset..offset + 4)
            .ok_or(DecodeError::Truncated("VLAN"))?;
        ethertype = u16::from_be_bytes([tag[2], tag[3]]);
        offset += 4;
    }
    decode_ethertype(ethertype, &data[offset..])
}

fn decode_ethertype(ethertype: u16, payload: &[u8]) -> Result<Option<FlowKey>, DecodeError> {
    match ethertype {
        ETHERTYPE_IPV4 => decode_ipv4(payload).map(Some),
        ETHERTYPE_IPV6 => decode_ipv6(payload).map(Some),
        _ => Ok(None),
    }
}

fn decode_ip(data: &[u8]) -> Result<FlowKey, DecodeError> {
    let first = *data.first().ok_or(DecodeError::Truncated("IP"))?;
    match first >> 4 {
        4 => decode_ipv4(data),
        6 => decode_ipv6(data),
        v => Err(DecodeError::BadIpVersion(v)),
    }
}

fn decode_ipv4(data: &[u8]) -> Result<FlowKey, DecodeError> {
    let header = data.get(..20).ok_or(DecodeError::Truncated("IPv4"))?;
    let version = header[0] >> 4;
    if version != 4 {
        return Err(DecodeError::BadIpVersion(version));
    }
    let header_len = usize::from(header[0] & 0x0f) * 4;
    if header_len < 20 {
        return Err(DecodeError::BadHeaderLength(header_len));
    }
    if data.len() < header_len {
        return Err(DecodeError::Truncated("IPv4 options"));
    }

    let protocol = header[9];
    let src = Ipv4Addr::new(header[12], header[13], header[14], header[15]);
    let dst = Ipv4Addr::new(header[16], header[17], header[18], header[19]);
    let fragment_offset = u16::from_be_bytes([header[6], header[7]]) & 0x1fff;

    let (src_port, dst_port) = if fragment_offset == 0 {
        ports(protocol, &data[header_len..])?
    } else {
        (0, 0)
    };
    Ok(FlowKey::new(
        IpAddr::V4(src),
        src_port,
        IpAddr::V4(dst),
        dst_port,
        protocol,
    ))
}

fn decode_ipv6(data: &[u8]) -> Result<FlowKey, DecodeError> {
    let header = data.get(..40).ok_or(DecodeError::Truncated("IPv6"))?;
    let version = header[0] >> 4;
    if version != 6 {
        return Err(DecodeError::BadIpVersion(version));
    }
    let src = ipv6_at(&header[8..24]);
    let dst = ipv6_at(&header[24..40]);

    let mut next = header[6];
    let mut offset = 40;
    let mut first_fragment = true;
    for _ in 0..MAX_EXTENSION_HEADERS {
        match next {
            // Hop-by-hop, routing, destination options.
            0 | 43 | 60 => {
                let ext = data
                    .get(offset..offset + 2)
                    .ok_or(DecodeError::Truncated("IPv6 extension"))?;
                next = ext[0];
                offset += (usize::from(ext[1]) + 1) * 8;
            }
            44 => {
                let frag = data
                    .get(offset..offset + 8)
                    .ok_or(DecodeError::Truncated("IPv6 fragment"))?;
                next = frag[0];
                first_fragment = u16::from_be_bytes([frag[2], frag[3]]) >> 3 == 0;
                offset += 8;
            }
            _ => break,
        }
    }

    let (src_port, dst_port) = match data.get(offset..) {
        Some(rest) if first_fragment => ports(next, rest)?,
        Some(_) => (0, 0),
        None => return Err(DecodeError::Truncated("IPv6 extension")),
    };
    Ok(FlowKey::new(
        IpAddr::V6(src),
        src_port,
        IpAddr::V6(dst),
        dst_port,
        next,
    ))
}

fn ipv6_at(bytes: &[u8]) -> Ipv6Addr {
    let mut octets = [0u8; 16];
    octets.copy_from_slice(bytes);
    Ipv6Addr::from(octets)
}

fn ports(protocol: u8, transport: &[u8]) -> Result<(u16, u16), DecodeError> {
    let layer = match protocol {
        IPPROTO_TCP => "TCP",
        IPPROTO_UDP => "UDP",
        _ => return Ok((0, 0)),
    };
    let header = transport.get(..4).ok_or(DecodeError::Truncated(layer))?;
    Ok((
        u16::from_be_bytes([header[0], header[1]]),
        u16::from_be_bytes([header[2], header[3]]),
    ))
}

/// Decode stage: sets [`Packet::flow`]. A malformed packet is flagged
/// [`Packet::invalid`] and passed on without a flow key.
#[derive(Debug, Default)]
pub struct DecodeStage {
    decoded: u64,
    non_ip: u64,
    invalid: u64,
}

impl DecodeStage {
    /// Creates the stage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Stage for DecodeStage {
    fn process(&mut self, packet: &mut Packet) -> Result<Verdict, StageError> {
        match decode_flow(packet.datalink, &packet.data) {
            Ok(Some(flow)) => {
                self.decoded += 1;
                packet.flow = Some(flow);
                Ok(Verdict::Pass)
            }
            Ok(None) => {
                self.non_ip += 1;
                Ok(Verdict::Pass)
            }
            Err(e) => {
                self.invalid += 1;
                packet.invalid = true;
                tracing::trace!(seq = packet.seq, error = %e, "invalid packet");
                Ok(Verdict::Pass)
            }
        }
    }

    fn thread_exit(&mut self, thread: &ThreadInfo<'_>) {
        tracing::debug!(
            worker = thread.worker_name,
            decoded = self.decoded,
            non_ip = self.non_ip,
            invalid = self.invalid,
            "decoder finished"
        );
    }
}
