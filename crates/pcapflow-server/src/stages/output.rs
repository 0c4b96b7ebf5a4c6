//! Alert writers.
//!
//! Every output instance writing to the same file shares one buffered
//! writer. Instances live on different workers under the sharded strategy,
//! so each alert is formatted locally and written under the lock in one
//! call.

use std::fmt::Write as _;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fxhash::FxHashMap;
use parking_lot::Mutex;
use pcapflow_core::{Packet, Stage, StageError, StageId, ThreadInfo, Verdict};

use crate::rules::DetectContext;

/// File written by `alert-fastlog`.
pub const FAST_LOG_FILE: &str = "fast.log";
/// File written by `alert-debuglog`.
pub const DEBUG_LOG_FILE: &str = "alert-debug.log";

/// Bytes of packet data dumped per debug record.
const DEBUG_DUMP_LIMIT: usize = 256;

/// A log file shared by several output instances.
pub type SharedLog = Arc<Mutex<BufWriter<File>>>;

/// Opens each log file once and hands out shared writers.
#[derive(Debug, Default)]
pub struct LogFiles {
    open: Mutex<FxHashMap<PathBuf, SharedLog>>,
}

impl LogFiles {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the writer for `path`, creating (and truncating) the file on
    /// first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created.
    pub fn open(&self, path: &Path) -> io::Result<SharedLog> {
        let mut open = self.open.lock();
        if let Some(log) = open.get(path) {
            return Ok(Arc::clone(log));
        }
        let file = File::create(path)?;
        tracing::debug!(path = %path.display(), "opened alert log");
        let log = Arc::new(Mutex::new(BufWriter::new(file)));
        open.insert(path.to_path_buf(), Arc::clone(&log));
        Ok(log)
    }
}

/// Alert record layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertFormat {
    /// One line per alert.
    Fast,
    /// Multi-line record per alerting packet with a hex dump.
    Debug,
}

impl AlertFormat {
    /// The format written by output stage `id`, if it is an alert writer.
    #[must_use]
    pub fn for_stage(id: StageId) -> Option<Self> {
        match id {
            StageId::AlertFastLog => Some(Self::Fast),
            StageId::AlertDebugLog => Some(Self::Debug),
            _ => None,
        }
    }

    /// File name inside the log directory.
    #[must_use]
    pub fn file_name(self) -> &'static str {
        match self {
            Self::Fast => FAST_LOG_FILE,
            Self::Debug => DEBUG_LOG_FILE,
        }
    }
}

/// Output stage writing alerts for packets with matches.
pub struct AlertLogStage {
    format: AlertFormat,
    log: SharedLog,
    rules: Arc<DetectContext>,
    line: String,
    written: u64,
}

impl AlertLogStage {
    /// Creates a writer appending to `log`.
    #[must_use]
    pub fn new(format: AlertFormat, log: SharedLog, rules: Arc<DetectContext>) -> Self {
        Self {
            format,
            log,
            rules,
            line: String::new(),
            written: 0,
        }
    }

    fn format_fast(&mut self, packet: &Packet) {
        for &sid in &packet.matches {
            let msg = self.rules.rule(sid).map_or("", |r| r.msg());
            let _ = write!(
                self.line,
                "{} [**] [1:{sid}:0] {msg} [**] ",
                Timestamp(packet.timestamp_us)
            );
            match &packet.flow {
                Some(flow) => {
                    let _ = writeln!(self.line, "{flow}");
                }
                None => self.line.push_str("{IP} unknown\n"),
            }
        }
    }

    fn format_debug(&mut self, packet: &Packet) {
        let out = &mut self.line;
        let _ = writeln!(out, "+================");
        let _ = writeln!(out, "TIME:              {}", Timestamp(packet.timestamp_us));
        let _ = writeln!(out, "PKT SEQ:           {}", packet.seq);
        match &packet.flow {
            Some(flow) => {
                let _ = writeln!(out, "FLOW:              {flow}");
            }
            None => out.push_str("FLOW:              none\n"),
        }
        let _ = writeln!(out, "ALERT CNT:         {}", packet.matches.len());
        for (i, &sid) in packet.matches.iter().enumerate() {
            let msg = self.rules.rule(sid).map_or("", |r| r.msg());
            let _ = writeln!(out, "ALERT MSG [{i:02}]:    {msg}");
            let _ = writeln!(out, "ALERT SID [{i:02}]:    {sid}");
        }
        if packet.invalid {
            out.push_str("DECODE:            invalid\n");
        }
        let _ = writeln!(out, "PACKET LEN:        {}", packet.data.len());
        out.push_str("PACKET:\n");
        let shown = &packet.data[..packet.data.len().min(DEBUG_DUMP_LIMIT)];
        for (row, chunk) in shown.chunks(16).enumerate() {
            let _ = write!(out, " {:04X}  ", row * 16);
            for byte in chunk {
                let _ = write!(out, "{byte:02X} ");
            }
            for _ in chunk.len()..16 {
                out.push_str("   ");
            }
            out.push(' ');
            out.extend(chunk.iter().map(|&b| {
                if b.is_ascii_graphic() || b == b' ' {
                    char::from(b)
                } else {
                    '.'
                }
            }));
            out.push('\n');
        }
        out.push('\n');
    }
}

impl Stage for AlertLogStage {
    fn process(&mut self, packet: &mut Packet) -> Result<Verdict, StageError> {
        if packet.matches.is_empty() {
            return Ok(Verdict::Pass);
        }
        self.line.clear();
        match self.format {
            AlertFormat::Fast => self.format_fast(packet),
            AlertFormat::Debug => self.format_debug(packet),
        }
        self.log.lock().write_all(self.line.as_bytes())?;
        self.written += 1;
        Ok(Verdict::Pass)
    }

    fn thread_exit(&mut self, thread: &ThreadInfo<'_>) {
        if let Err(e) = self.log.lock().flush() {
            tracing::error!(
                worker = thread.worker_name,
                file = self.format.file_name(),
                error = %e,
                "failed to flush alert log"
            );
        }
        tracing::debug!(
            worker = thread.worker_name,
            file = self.format.file_name(),
            records = self.written,
            "alert writer finished"
        );
    }
}

/// `seconds.micros` capture time.
struct Timestamp(u64);

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:06}", self.0 / 1_000_000, self.0 % 1_000_000)
    }
}
