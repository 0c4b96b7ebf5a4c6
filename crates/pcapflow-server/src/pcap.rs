//! Classic libpcap capture file reader.
//!
//! ```text
//! global header (24 bytes)
//!   magic | major | minor | thiszone | sigfigs | snaplen | network
//! record header (16 bytes), repeated
//!   ts_sec | ts_frac | incl_len | orig_len
//! ```
//!
//! Both byte orders and both timestamp resolutions (micro and nano) are
//! accepted. pcapng is not.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

/// Microsecond-resolution magic, as written by the capturing host.
const MAGIC_MICROS: u32 = 0xa1b2_c3d4;
/// Nanosecond-resolution magic.
const MAGIC_NANOS: u32 = 0xa1b2_3c4d;

const GLOBAL_HEADER_LEN: usize = 24;
const RECORD_HEADER_LEN: usize = 16;

/// Records larger than this are treated as corruption.
pub const MAX_RECORD_LEN: u32 = 256 * 1024;

/// Capture file errors.
#[derive(Debug, thiserror::Error)]
pub enum PcapError {
    /// Underlying read failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Not a classic pcap file.
    #[error("unrecognised pcap magic {0:#010x}")]
    BadMagic(u32),

    /// The file ends in the middle of a header or record.
    #[error("capture truncated in {0}")]
    Truncated(&'static str),

    /// A record claims an implausible length.
    #[error("record length {0} exceeds {MAX_RECORD_LEN}")]
    OversizedRecord(u32),
}

/// Per-record metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    /// Capture timestamp in microseconds since the epoch.
    pub timestamp_us: u64,
    /// Bytes stored in the file.
    pub captured_len: u32,
    /// Bytes on the wire.
    pub original_len: u32,
}

/// Streaming reader over a classic pcap file.
#[derive(Debug)]
pub struct PcapReader<R> {
    inner: R,
    big_endian: bool,
    nanos: bool,
    snaplen: u32,
    linktype: u32,
    records: u64,
}

impl PcapReader<BufReader<File>> {
    /// Opens `path` and reads its global header.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or is not a pcap file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PcapError> {
        let file = File::open(path.as_ref())?;
        Self::new(BufReader::new(file))
    }
}

impl<R: Read> PcapReader<R> {
    /// Reads the global header from `inner`.
    ///
    /// # Errors
    ///
    /// Returns [`PcapError::BadMagic`] or [`PcapError::Truncated`] for a
    /// malformed header.
    pub fn new(mut inner: R) -> Result<Self, PcapError> {
        let mut header = [0u8; GLOBAL_HEADER_LEN];
        if read_full(&mut inner, &mut header)? < GLOBAL_HEADER_LEN {
            return Err(PcapError::Truncated("global header"));
        }

        let magic_le = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        let magic_be = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
        let (big_endian, nanos) = match (magic_le, magic_be) {
            (MAGIC_MICROS, _) => (false, false),
            (MAGIC_NANOS, _) => (false, true),
            (_, MAGIC_MICROS) => (true, false),
            (_, MAGIC_NANOS) => (true, true),
            _ => return Err(PcapError::BadMagic(magic_le)),
        };

        let mut reader = Self {
            inner,
            big_endian,
            nanos,
            snaplen: 0,
            linktype: 0,
            records: 0,
        };
        reader.snaplen = reader.word(&header[16..20]);
        reader.linktype = reader.word(&header[20..24]);
        tracing::debug!(
            linktype = reader.linktype,
            snaplen = reader.snaplen,
            big_endian,
            nanos,
            "opened capture"
        );
        Ok(reader)
    }

    /// Data link type of every record (`LINKTYPE_*`).
    #[must_use]
    pub fn linktype(&self) -> u32 {
        self.linktype
    }

    /// Snap length declared by the file.
    #[must_use]
    pub fn snaplen(&self) -> u32 {
        self.snaplen
    }

    /// Records read so far.
    #[must_use]
    pub fn records(&self) -> u64 {
        self.records
    }

    /// Reads the next record into `data`, replacing its contents.
    ///
    /// Returns `Ok(None)` at a clean end of file.
    ///
    /// # Errors
    ///
    /// Returns an error for I/O failures, truncation, or oversized records.
    pub fn next_into(&mut self, data: &mut Vec<u8>) -> Result<Option<RecordHeader>, PcapError> {
        let mut header = [0u8; RECORD_HEADER_LEN];
        match read_full(&mut self.inner, &mut header)? {
            0 => return Ok(None),
            RECORD_HEADER_LEN => {}
            _ => return Err(PcapError::Truncated("record header")),
        }

        let ts_sec = u64::from(self.word(&header[0..4]));
        let ts_frac = u64::from(self.word(&header[4..8]));
        let captured_len = self.word(&header[8..12]);
        let original_len = self.word(&header[12..16]);
        if captured_len > MAX_RECORD_LEN {
            return Err(PcapError::OversizedRecord(captured_len));
        }

        // Bounded by MAX_RECORD_LEN above.
        let len = captured_len as usize;
        data.clear();
        data.resize(len, 0);
        if read_full(&mut self.inner, data)? < len {
            return Err(PcapError::Truncated("record data"));
        }
        self.records += 1;

        let micros = if self.nanos { ts_frac / 1_000 } else { ts_frac };
        Ok(Some(RecordHeader {
            timestamp_us: ts_sec * 1_000_000 + micros,
            captured_len,
            original_len,
        }))
    }

    fn word(&self, bytes: &[u8]) -> u32 {
        let raw = [bytes[0], bytes[1], bytes[2], bytes[3]];
        if self.big_endian {
            u32::from_be_bytes(raw)
        } else {
            u32::from_le_bytes(raw)
        }
    }
}

/// Fills `buf` as far as the reader allows. Returns the bytes read.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
