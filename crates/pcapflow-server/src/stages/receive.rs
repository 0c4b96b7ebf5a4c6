//! Capture file source.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use pcapflow_core::{Packet, Stage, StageError, ThreadInfo, Verdict};

use crate::pcap::{PcapError, PcapReader};

/// Source stage reading records from a pcap file.
///
/// The file is opened when the stage is created, so an unreadable capture
/// fails topology construction rather than the first packet.
#[derive(Debug)]
pub struct ReceivePcapStage {
    reader: PcapReader<BufReader<File>>,
    next_seq: u64,
    bytes: u64,
}

impl ReceivePcapStage {
    /// Opens `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or is not a pcap file.
    pub fn open(path: &Path) -> Result<Self, StageError> {
        let reader = PcapReader::open(path).map_err(|e| match e {
            PcapError::Io(io) => StageError::Io(io),
            other => StageError::Other(format!("{}: {other}", path.display())),
        })?;
        Ok(Self {
            reader,
            next_seq: 0,
            bytes: 0,
        })
    }
}

impl Stage for ReceivePcapStage {
    fn process(&mut self, packet: &mut Packet) -> Result<Verdict, StageError> {
        let header = match self.reader.next_into(&mut packet.data) {
            Ok(Some(header)) => header,
            Ok(None) => return Ok(Verdict::EndOfInput),
            // A damaged tail ends the capture like a clean EOF would.
            Err(PcapError::Truncated(what)) => {
                tracing::warn!(records = self.reader.records(), "capture truncated in {what}");
                return Ok(Verdict::EndOfInput);
            }
            // The reader cannot resync after a bad record header.
            Err(e) => {
                tracing::error!(records = self.reader.records(), error = %e, "capture unreadable");
                return Ok(Verdict::EndOfInput);
            }
        };

        self.next_seq += 1;
        self.bytes += u64::from(header.captured_len);
        packet.seq = self.next_seq;
        packet.timestamp_us = header.timestamp_us;
        packet.datalink = self.reader.linktype();
        Ok(Verdict::Pass)
    }

    fn thread_exit(&mut self, thread: &ThreadInfo<'_>) {
        tracing::info!(
            worker = thread.worker_name,
            packets = self.next_seq,
            bytes = self.bytes,
            "capture read"
        );
    }
}
