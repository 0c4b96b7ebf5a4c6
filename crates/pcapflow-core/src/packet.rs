//! Packet buffers and flow keys.
//!
//! A [`Packet`] is the unit of work moved between workers. Buffers are owned
//! by the recycle pool and travel `source → … → sink → pool`; stages fill and
//! annotate them in place.
//!
//! The [`FlowKey`] is the 5-tuple used for flow-affine routing. Both
//! directions of a connection hash to the same value.

use std::fmt;
use std::hash::Hasher;
use std::net::IpAddr;

use fxhash::FxHasher;
use smallvec::SmallVec;

/// Default snap length used when the pool allocates a fresh buffer.
pub const DEFAULT_SNAPLEN: usize = 65_535;

/// IP protocol number for TCP.
pub const IPPROTO_TCP: u8 = 6;
/// IP protocol number for UDP.
pub const IPPROTO_UDP: u8 = 17;

/// Connection-identifying 5-tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FlowKey {
    /// Source address.
    pub src: IpAddr,
    /// Destination address.
    pub dst: IpAddr,
    /// Source port (0 for port-less protocols).
    pub src_port: u16,
    /// Destination port (0 for port-less protocols).
    pub dst_port: u16,
    /// IP protocol number.
    pub protocol: u8,
}

impl FlowKey {
    /// Creates a new flow key.
    #[must_use]
    pub fn new(src: IpAddr, src_port: u16, dst: IpAddr, dst_port: u16, protocol: u8) -> Self {
        Self {
            src,
            dst,
            src_port,
            dst_port,
            protocol,
        }
    }

    /// Returns the key with endpoints ordered so that both directions of a
    /// connection produce the same value.
    #[must_use]
    pub fn normalized(&self) -> Self {
        if (self.src, self.src_port) <= (self.dst, self.dst_port) {
            *self
        } else {
            Self {
                src: self.dst,
                dst: self.src,
                src_port: self.dst_port,
                dst_port: self.src_port,
                protocol: self.protocol,
            }
        }
    }

    /// Direction-independent 64-bit flow hash.
    ///
    /// `FxHasher` over the normalised tuple, words written explicitly so the
    /// value does not depend on std's `Hash` layout, followed by a 64-bit
    /// finalizer so every output bit depends on every input bit.
    #[must_use]
    pub fn flow_hash(&self) -> u64 {
        let key = self.normalized();
        let mut hasher = FxHasher::default();
        hasher.write_u8(key.protocol);
        write_addr(&mut hasher, key.src);
        write_addr(&mut hasher, key.dst);
        hasher.write_u32((u32::from(key.src_port) << 16) | u32::from(key.dst_port));
        mix64(hasher.finish())
    }
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{{}}} {} -> {}",
            protocol_name(self.protocol),
            SocketDisplay(self.src, self.src_port),
            SocketDisplay(self.dst, self.dst_port)
        )
    }
}

struct SocketDisplay(IpAddr, u16);

impl fmt::Display for SocketDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            IpAddr::V4(addr) => write!(f, "{addr}:{}", self.1),
            IpAddr::V6(addr) => write!(f, "[{addr}]:{}", self.1),
        }
    }
}

/// Short protocol name for log lines.
#[must_use]
pub fn protocol_name(protocol: u8) -> &'static str {
    match protocol {
        1 => "ICMP",
        IPPROTO_TCP => "TCP",
        IPPROTO_UDP => "UDP",
        58 => "IPV6-ICMP",
        _ => "IP",
    }
}

fn write_addr(hasher: &mut FxHasher, addr: IpAddr) {
    match addr {
        IpAddr::V4(v4) => hasher.write_u32(u32::from(v4)),
        IpAddr::V6(v6) => {
            let bits = u128::from(v6);
            #[allow(clippy::cast_possible_truncation)]
            {
                hasher.write_u64((bits >> 64) as u64);
                hasher.write_u64(bits as u64);
            }
        }
    }
}

/// Murmur3 64-bit finalizer.
#[inline]
fn mix64(mut h: u64) -> u64 {
    h ^= h >> 33;
    h = h.wrapping_mul(0xff51_afd7_ed55_8ccd);
    h ^= h >> 33;
    h = h.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    h ^= h >> 33;
    h
}

/// A packet buffer travelling through the pipeline.
#[derive(Debug, Default)]
pub struct Packet {
    /// Capture sequence number assigned by the source stage.
    pub seq: u64,
    /// Capture timestamp in microseconds since the epoch.
    pub timestamp_us: u64,
    /// Data link type of `data` (libpcap `LINKTYPE_*`).
    pub datalink: u32,
    /// Raw captured bytes.
    pub data: Vec<u8>,
    /// Flow key, set once the packet has been decoded.
    pub flow: Option<FlowKey>,
    /// Set by the decoder for a malformed packet, which still travels the
    /// rest of the pipeline.
    pub invalid: bool,
    /// Signature ids matched by detection.
    pub matches: SmallVec<[u32; 4]>,
}

impl Packet {
    /// Creates an empty packet whose data buffer can hold `capacity` bytes
    /// without reallocating.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            ..Self::default()
        }
    }

    /// Clears all per-packet state, keeping the data allocation.
    pub fn reset(&mut self) {
        self.seq = 0;
        self.timestamp_us = 0;
        self.datalink = 0;
        self.data.clear();
        self.flow = None;
        self.invalid = false;
        self.matches.clear();
    }

    /// Flow hash of the decoded key, if any.
    #[must_use]
    pub fn flow_hash(&self) -> Option<u64> {
        self.flow.as_ref().map(FlowKey::flow_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    fn v4(a: u8, b: u8, c: u8, d: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(a, b, c, d))
    }

    #[test]
    fn test_flow_hash_is_direction_independent() {
        let fwd = FlowKey::new(v4(10, 0, 0, 1), 40000, v4(10, 0, 0, 2), 80, IPPROTO_TCP);
        let rev = FlowKey::new(v4(10, 0, 0, 2), 80, v4(10, 0, 0, 1), 40000, IPPROTO_TCP);
        assert_eq!(fwd.flow_hash(), rev.flow_hash());
        assert_eq!(fwd.normalized(), rev.normalized());
    }

    #[test]
    fn test_flow_hash_distinguishes_protocol() {
        let tcp = FlowKey::new(v4(1, 1, 1, 1), 53, v4(2, 2, 2, 2), 5353, IPPROTO_TCP);
        let udp = FlowKey { protocol: IPPROTO_UDP, ..tcp };
        assert_ne!(tcp.flow_hash(), udp.flow_hash());
    }

    #[test]
    fn test_ipv6_key() {
        let a = IpAddr::V6(Ipv6Addr::LOCALHOST);
        let b = IpAddr::V6(Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 1));
        let k1 = FlowKey::new(a, 1, b, 2, IPPROTO_UDP);
        let k2 = FlowKey::new(b, 2, a, 1, IPPROTO_UDP);
        assert_eq!(k1.flow_hash(), k2.flow_hash());
        assert_eq!(k1.to_string(), "{UDP} [::1]:1 -> [fe80::1]:2");
    }

    #[test]
    fn test_packet_reset_keeps_capacity() {
        let mut packet = Packet::with_capacity(128);
        packet.data.extend_from_slice(&[1, 2, 3]);
        packet.seq = 7;
        packet.matches.push(1000);
        packet.invalid = true;
        packet.flow = Some(FlowKey::new(v4(1, 2, 3, 4), 1, v4(4, 3, 2, 1), 2, IPPROTO_TCP));

        packet.reset();

        assert!(packet.data.is_empty());
        assert!(packet.data.capacity() >= 128);
        assert_eq!(packet.seq, 0);
        assert!(packet.matches.is_empty());
        assert!(!packet.invalid);
        assert!(packet.flow_hash().is_none());
    }
}
