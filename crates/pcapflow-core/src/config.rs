//! # Configuration
//!
//! YAML configuration with dotted-key lookup, plus the typed
//! [`TopologyConfig`] the builder consumes.
//!
//! ```yaml
//! runmode: autofp
//! pcap-file:
//!   file: /data/capture.pcap
//! max-pending-packets: 1024
//! outputs: [alert-fastlog, alert-debuglog]
//! threading:
//!   set-cpu-affinity: yes
//!   detect-thread-ratio: 1.5
//!   cpu-affinity:
//!     receive-cpu-set: [0]
//!     detect-cpu-set: [1, 2, 3]
//! ```
//!
//! Lookups go through [`ConfigKey`], the closed set of keys this crate
//! understands. Scalars are accepted in their YAML type or as strings
//! (`"4"`, `"yes"`); CPU sets may be lists or comma/range strings
//! (`"0,2-3"`).

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde_yaml::{Mapping, Value};

use crate::stage::StageId;
use crate::topology::Strategy;
use crate::worker::CPU_SET_CAPACITY;

/// Default recycle pool size.
pub const DEFAULT_MAX_PENDING_PACKETS: usize = 1024;

/// Default detect thread ratio.
pub const DEFAULT_DETECT_RATIO: f64 = 1.0;

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// File path.
        path: PathBuf,
        /// I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid YAML.
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// A required key is absent.
    #[error("missing required config key '{0}'")]
    MissingKey(ConfigKey),

    /// A key has a value of the wrong type or out of range.
    #[error("invalid value for '{key}': {reason}")]
    InvalidValue {
        /// Dotted key.
        key: String,
        /// What is wrong.
        reason: String,
    },
}

impl ConfigError {
    fn invalid(key: ConfigKey, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.path().to_string(),
            reason: reason.into(),
        }
    }
}

/// Recognised configuration keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigKey {
    /// Topology strategy.
    RunMode,
    /// Capture file read by the source stage.
    PcapFile,
    /// Explicit detect worker count (0 = unset).
    DetectThreadCount,
    /// Detect workers per CPU.
    DetectThreadRatio,
    /// Enables pinning and priorities.
    SetCpuAffinity,
    /// CPU set of the receive worker.
    ReceiveCpuSet,
    /// CPU set of the decode worker.
    DecodeCpuSet,
    /// CPU set of the detect workers.
    DetectCpuSet,
    /// CPU set of the output worker.
    OutputCpuSet,
    /// Per-shard queue capacity (0 = unbounded).
    QueueCapacity,
    /// Recycle pool size.
    MaxPendingPackets,
    /// Output stage names.
    Outputs,
    /// Directory for output files.
    DefaultLogDir,
}

impl ConfigKey {
    /// Every key.
    pub const ALL: [ConfigKey; 13] = [
        Self::RunMode,
        Self::PcapFile,
        Self::DetectThreadCount,
        Self::DetectThreadRatio,
        Self::SetCpuAffinity,
        Self::ReceiveCpuSet,
        Self::DecodeCpuSet,
        Self::DetectCpuSet,
        Self::OutputCpuSet,
        Self::QueueCapacity,
        Self::MaxPendingPackets,
        Self::Outputs,
        Self::DefaultLogDir,
    ];

    /// Dotted path of the key.
    #[must_use]
    pub fn path(self) -> &'static str {
        match self {
            Self::RunMode => "runmode",
            Self::PcapFile => "pcap-file.file",
            Self::DetectThreadCount => "threading.detect-thread-count",
            Self::DetectThreadRatio => "threading.detect-thread-ratio",
            Self::SetCpuAffinity => "threading.set-cpu-affinity",
            Self::ReceiveCpuSet => "threading.cpu-affinity.receive-cpu-set",
            Self::DecodeCpuSet => "threading.cpu-affinity.decode-cpu-set",
            Self::DetectCpuSet => "threading.cpu-affinity.detect-cpu-set",
            Self::OutputCpuSet => "threading.cpu-affinity.output-cpu-set",
            Self::QueueCapacity => "threading.queue-capacity",
            Self::MaxPendingPackets => "max-pending-packets",
            Self::Outputs => "outputs",
            Self::DefaultLogDir => "default-log-dir",
        }
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

impl FromStr for ConfigKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|key| key.path() == lower)
            .ok_or_else(|| ConfigError::InvalidValue {
                key: s.to_string(),
                reason: "unknown configuration key".to_string(),
            })
    }
}

/// A loaded configuration tree.
#[derive(Debug, Clone, Default)]
pub struct Config {
    root: Value,
}

impl Config {
    /// Empty configuration; every lookup falls back to defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            root: Value::Mapping(Mapping::new()),
        }
    }

    /// Loads a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_yaml_str(&text)?;
        tracing::debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Parses YAML text. An empty document is an empty configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid YAML or not a mapping.
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let root: Value = serde_yaml::from_str(text)?;
        match root {
            Value::Null => Ok(Self::new()),
            Value::Mapping(_) => Ok(Self { root }),
            _ => Err(ConfigError::InvalidValue {
                key: "<root>".to_string(),
                reason: "top level must be a mapping".to_string(),
            }),
        }
    }

    /// Raw value at a dotted path.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&Value> {
        path.split('.').try_fold(&self.root, |node, part| match node {
            Value::Mapping(map) => map.get(part),
            _ => None,
        })
        .filter(|v| !v.is_null())
    }

    /// Sets a value at a dotted path, creating intermediate mappings.
    pub fn set(&mut self, key: ConfigKey, value: impl Into<Value>) {
        let mut node = &mut self.root;
        let mut parts = key.path().split('.').peekable();
        while let Some(part) = parts.next() {
            if !node.is_mapping() {
                *node = Value::Mapping(Mapping::new());
            }
            let Value::Mapping(map) = node else {
                return;
            };
            let slot = Value::String(part.to_string());
            if parts.peek().is_none() {
                map.insert(slot, value.into());
                return;
            }
            node = map
                .entry(slot)
                .or_insert_with(|| Value::Mapping(Mapping::new()));
        }
    }

    /// Returns true if `key` is present.
    #[must_use]
    pub fn contains(&self, key: ConfigKey) -> bool {
        self.get(key.path()).is_some()
    }

    /// String value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not a scalar.
    pub fn get_str(&self, key: ConfigKey) -> Result<Option<String>, ConfigError> {
        match self.get(key.path()) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(Value::Number(n)) => Ok(Some(n.to_string())),
            Some(Value::Bool(b)) => Ok(Some(b.to_string())),
            Some(_) => Err(ConfigError::invalid(key, "expected a string")),
        }
    }

    /// Non-negative integer value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not a non-negative integer.
    pub fn get_usize(&self, key: ConfigKey) -> Result<Option<usize>, ConfigError> {
        let parsed = match self.get(key.path()) {
            None => return Ok(None),
            Some(Value::Number(n)) => n.as_u64().and_then(|v| usize::try_from(v).ok()),
            Some(Value::String(s)) => s.trim().parse::<usize>().ok(),
            Some(_) => None,
        };
        parsed
            .map(Some)
            .ok_or_else(|| ConfigError::invalid(key, "expected a non-negative integer"))
    }

    /// Floating-point value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not a number.
    pub fn get_f64(&self, key: ConfigKey) -> Result<Option<f64>, ConfigError> {
        let parsed = match self.get(key.path()) {
            None => return Ok(None),
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
            Some(_) => None,
        };
        parsed
            .map(Some)
            .ok_or_else(|| ConfigError::invalid(key, "expected a number"))
    }

    /// Boolean value. Accepts `yes`/`no`, `true`/`false`, `on`/`off`, `1`/`0`.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not a recognised boolean.
    pub fn get_bool(&self, key: ConfigKey) -> Result<Option<bool>, ConfigError> {
        let parsed = match self.get(key.path()) {
            None => return Ok(None),
            Some(Value::Bool(b)) => Some(*b),
            Some(Value::Number(n)) => n.as_u64().map(|v| v != 0),
            Some(Value::String(s)) => parse_bool(s),
            Some(_) => None,
        };
        parsed
            .map(Some)
            .ok_or_else(|| ConfigError::invalid(key, "expected a boolean"))
    }

    /// List of strings. A scalar counts as a one-element list.
    ///
    /// # Errors
    ///
    /// Returns an error if an element is not a scalar.
    pub fn get_str_list(&self, key: ConfigKey) -> Result<Option<Vec<String>>, ConfigError> {
        match self.get(key.path()) {
            None => Ok(None),
            Some(Value::Sequence(items)) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s.clone()),
                    // `- alert-fastlog: {enabled: yes}` style entries.
                    Value::Mapping(map) if map.len() == 1 => map
                        .keys()
                        .next()
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .ok_or_else(|| ConfigError::invalid(key, "expected a string entry")),
                    _ => Err(ConfigError::invalid(key, "expected a string entry")),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Some),
            Some(Value::String(s)) => Ok(Some(
                s.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect(),
            )),
            Some(_) => Err(ConfigError::invalid(key, "expected a list")),
        }
    }

    /// CPU id list. Accepts `[0, 2, 3]`, `"0,2-3"` or a single integer.
    ///
    /// # Errors
    ///
    /// Returns an error if an entry is not a CPU id or range.
    pub fn get_cpu_set(&self, key: ConfigKey) -> Result<Option<Vec<usize>>, ConfigError> {
        let mut cpus = Vec::new();
        match self.get(key.path()) {
            None => return Ok(None),
            Some(Value::Number(n)) => cpus.push(number_to_cpu(key, n)?),
            Some(Value::String(s)) => parse_cpu_list(key, s, &mut cpus)?,
            Some(Value::Sequence(items)) => {
                for item in items {
                    match item {
                        Value::Number(n) => cpus.push(number_to_cpu(key, n)?),
                        Value::String(s) => parse_cpu_list(key, s, &mut cpus)?,
                        _ => return Err(ConfigError::invalid(key, "expected CPU ids")),
                    }
                }
            }
            Some(_) => return Err(ConfigError::invalid(key, "expected CPU ids")),
        }
        cpus.sort_unstable();
        cpus.dedup();
        Ok(Some(cpus))
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "yes" | "true" | "on" | "1" | "enable" | "enabled" => Some(true),
        "no" | "false" | "off" | "0" | "disable" | "disabled" => Some(false),
        _ => None,
    }
}

fn number_to_cpu(key: ConfigKey, n: &serde_yaml::Number) -> Result<usize, ConfigError> {
    n.as_u64()
        .and_then(|v| usize::try_from(v).ok())
        .ok_or_else(|| ConfigError::invalid(key, format!("'{n}' is not a CPU id")))
}

fn parse_cpu_list(key: ConfigKey, s: &str, out: &mut Vec<usize>) -> Result<(), ConfigError> {
    let bad = |part: &str| ConfigError::invalid(key, format!("'{part}' is not a CPU id or range"));
    for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        if let Some((lo, hi)) = part.split_once('-') {
            let lo: usize = lo.trim().parse().map_err(|_| bad(part))?;
            let hi: usize = hi.trim().parse().map_err(|_| bad(part))?;
            if lo > hi || hi >= CPU_SET_CAPACITY {
                return Err(bad(part));
            }
            out.extend(lo..=hi);
        } else {
            out.push(part.parse().map_err(|_| bad(part))?);
        }
    }
    Ok(())
}

/// Per-role CPU sets. Empty means "not configured".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleCpuSets {
    /// Receive worker.
    pub receive: Vec<usize>,
    /// Decode/stream worker.
    pub decode: Vec<usize>,
    /// Detect workers.
    pub detect: Vec<usize>,
    /// Output worker.
    pub output: Vec<usize>,
}

impl RoleCpuSets {
    fn iter(&self) -> impl Iterator<Item = (&'static str, &[usize])> {
        [
            ("receive", self.receive.as_slice()),
            ("decode", self.decode.as_slice()),
            ("detect", self.detect.as_slice()),
            ("output", self.output.as_slice()),
        ]
        .into_iter()
    }
}

/// Tunables consumed by the topology builder.
#[derive(Debug, Clone)]
pub struct TopologyConfig {
    /// Strategy to build.
    pub strategy: Strategy,
    /// Online CPUs.
    pub cpu_count: usize,
    /// Capture file bound to the source stage.
    pub pcap_file: Option<PathBuf>,
    /// Explicit detect worker count (0 = derive from ratio).
    pub detect_thread_count: usize,
    /// Detect workers per CPU.
    pub detect_thread_ratio: f64,
    /// Pin workers and set priorities.
    pub cpu_affinity: bool,
    /// Per-role CPU sets.
    pub cpu_sets: RoleCpuSets,
    /// Per-shard queue capacity (`None` = unbounded).
    pub queue_capacity: Option<usize>,
    /// Recycle pool size.
    pub max_pending_packets: usize,
    /// Output stages, in attach order.
    pub outputs: Vec<StageId>,
    /// Directory for output files.
    pub log_dir: PathBuf,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::default(),
            cpu_count: online_processor_count(),
            pcap_file: None,
            detect_thread_count: 0,
            detect_thread_ratio: DEFAULT_DETECT_RATIO,
            cpu_affinity: false,
            cpu_sets: RoleCpuSets::default(),
            queue_capacity: None,
            max_pending_packets: DEFAULT_MAX_PENDING_PACKETS,
            outputs: vec![StageId::AlertFastLog],
            log_dir: PathBuf::from("."),
        }
    }
}

impl TopologyConfig {
    /// Creates a new configuration builder.
    #[must_use]
    pub fn builder() -> TopologyConfigBuilder {
        TopologyConfigBuilder::default()
    }

    /// Reads every recognised key from `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if a key has an invalid value or the result does
    /// not validate.
    pub fn from_config(config: &Config, cpu_count: usize) -> Result<Self, ConfigError> {
        let strategy = match config.get_str(ConfigKey::RunMode)? {
            Some(name) => name
                .parse::<Strategy>()
                .map_err(|e| ConfigError::invalid(ConfigKey::RunMode, e.to_string()))?,
            None => Strategy::default(),
        };

        let outputs = match config.get_str_list(ConfigKey::Outputs)? {
            Some(names) => names
                .iter()
                .map(|name| match name.parse::<StageId>() {
                    Ok(id) if id.is_output() => Ok(id),
                    Ok(id) => Err(ConfigError::invalid(
                        ConfigKey::Outputs,
                        format!("{id} is not an output stage"),
                    )),
                    Err(e) => Err(ConfigError::invalid(ConfigKey::Outputs, e.to_string())),
                })
                .collect::<Result<Vec<_>, _>>()?,
            None => vec![StageId::AlertFastLog],
        };

        let cpu_sets = RoleCpuSets {
            receive: config.get_cpu_set(ConfigKey::ReceiveCpuSet)?.unwrap_or_default(),
            decode: config.get_cpu_set(ConfigKey::DecodeCpuSet)?.unwrap_or_default(),
            detect: config.get_cpu_set(ConfigKey::DetectCpuSet)?.unwrap_or_default(),
            output: config.get_cpu_set(ConfigKey::OutputCpuSet)?.unwrap_or_default(),
        };

        let topology = Self {
            strategy,
            cpu_count,
            pcap_file: config.get_str(ConfigKey::PcapFile)?.map(PathBuf::from),
            detect_thread_count: config.get_usize(ConfigKey::DetectThreadCount)?.unwrap_or(0),
            detect_thread_ratio: config
                .get_f64(ConfigKey::DetectThreadRatio)?
                .unwrap_or(DEFAULT_DETECT_RATIO),
            cpu_affinity: config.get_bool(ConfigKey::SetCpuAffinity)?.unwrap_or(false),
            cpu_sets,
            queue_capacity: config
                .get_usize(ConfigKey::QueueCapacity)?
                .filter(|&c| c > 0),
            max_pending_packets: config
                .get_usize(ConfigKey::MaxPendingPackets)?
                .unwrap_or(DEFAULT_MAX_PENDING_PACKETS),
            outputs,
            log_dir: config
                .get_str(ConfigKey::DefaultLogDir)?
                .map_or_else(|| PathBuf::from("."), PathBuf::from),
        };
        topology.validate()?;
        Ok(topology)
    }

    /// Explicit detect worker count: the configured count, else the size of
    /// the detect CPU set, else 0.
    #[must_use]
    pub fn detect_override(&self) -> usize {
        if self.detect_thread_count > 0 {
            self.detect_thread_count
        } else {
            self.cpu_sets.detect.len()
        }
    }

    /// The capture file, required by the source stage.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingKey`] if no file is configured.
    pub fn require_pcap_file(&self) -> Result<&Path, ConfigError> {
        self.pcap_file
            .as_deref()
            .ok_or(ConfigError::MissingKey(ConfigKey::PcapFile))
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_pending_packets == 0 {
            return Err(ConfigError::invalid(
                ConfigKey::MaxPendingPackets,
                "must be > 0",
            ));
        }
        if !self.detect_thread_ratio.is_finite() {
            return Err(ConfigError::invalid(
                ConfigKey::DetectThreadRatio,
                "must be a finite number",
            ));
        }
        for (role, set) in self.cpu_sets.iter() {
            if let Some(&cpu) = set.iter().find(|&&cpu| cpu >= CPU_SET_CAPACITY) {
                return Err(ConfigError::InvalidValue {
                    key: format!("threading.cpu-affinity.{role}-cpu-set"),
                    reason: format!("CPU {cpu} exceeds CPU_SET_CAPACITY ({CPU_SET_CAPACITY})"),
                });
            }
            if self.cpu_affinity && self.cpu_count > 0 {
                if let Some(&cpu) = set.iter().find(|&&cpu| cpu >= self.cpu_count) {
                    return Err(ConfigError::InvalidValue {
                        key: format!("threading.cpu-affinity.{role}-cpu-set"),
                        reason: format!("CPU {cpu} is not online ({} CPUs)", self.cpu_count),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Builder for [`TopologyConfig`].
#[derive(Debug, Default)]
pub struct TopologyConfigBuilder {
    strategy: Option<Strategy>,
    cpu_count: Option<usize>,
    pcap_file: Option<PathBuf>,
    detect_thread_count: Option<usize>,
    detect_thread_ratio: Option<f64>,
    cpu_affinity: Option<bool>,
    cpu_sets: Option<RoleCpuSets>,
    queue_capacity: Option<usize>,
    max_pending_packets: Option<usize>,
    outputs: Option<Vec<StageId>>,
    log_dir: Option<PathBuf>,
}

impl TopologyConfigBuilder {
    /// Sets the strategy.
    #[must_use]
    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Sets the CPU count (defaults to the online processor count).
    #[must_use]
    pub fn cpu_count(mut self, n: usize) -> Self {
        self.cpu_count = Some(n);
        self
    }

    /// Sets the capture file.
    #[must_use]
    pub fn pcap_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.pcap_file = Some(path.into());
        self
    }

    /// Sets an explicit detect worker count.
    #[must_use]
    pub fn detect_thread_count(mut self, n: usize) -> Self {
        self.detect_thread_count = Some(n);
        self
    }

    /// Sets the detect thread ratio.
    #[must_use]
    pub fn detect_thread_ratio(mut self, ratio: f64) -> Self {
        self.detect_thread_ratio = Some(ratio);
        self
    }

    /// Enables or disables CPU affinity.
    #[must_use]
    pub fn cpu_affinity(mut self, enabled: bool) -> Self {
        self.cpu_affinity = Some(enabled);
        self
    }

    /// Sets the per-role CPU sets.
    #[must_use]
    pub fn cpu_sets(mut self, sets: RoleCpuSets) -> Self {
        self.cpu_sets = Some(sets);
        self
    }

    /// Sets the per-shard queue capacity (0 = unbounded).
    #[must_use]
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity);
        self
    }

    /// Sets the recycle pool size.
    #[must_use]
    pub fn max_pending_packets(mut self, n: usize) -> Self {
        self.max_pending_packets = Some(n);
        self
    }

    /// Sets the output stages.
    #[must_use]
    pub fn outputs(mut self, outputs: Vec<StageId>) -> Self {
        self.outputs = Some(outputs);
        self
    }

    /// Sets the output directory.
    #[must_use]
    pub fn log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn build(self) -> Result<TopologyConfig, ConfigError> {
        let config = TopologyConfig {
            strategy: self.strategy.unwrap_or_default(),
            cpu_count: self.cpu_count.unwrap_or_else(online_processor_count),
            pcap_file: self.pcap_file,
            detect_thread_count: self.detect_thread_count.unwrap_or(0),
            detect_thread_ratio: self.detect_thread_ratio.unwrap_or(DEFAULT_DETECT_RATIO),
            cpu_affinity: self.cpu_affinity.unwrap_or(false),
            cpu_sets: self.cpu_sets.unwrap_or_default(),
            queue_capacity: self.queue_capacity.filter(|&c| c > 0),
            max_pending_packets: self
                .max_pending_packets
                .unwrap_or(DEFAULT_MAX_PENDING_PACKETS),
            outputs: self.outputs.unwrap_or_else(|| vec![StageId::AlertFastLog]),
            log_dir: self.log_dir.unwrap_or_else(|| PathBuf::from(".")),
        };
        config.validate()?;
        Ok(config)
    }
}

/// Number of online processors.
#[must_use]
pub fn online_processor_count() -> usize {
    num_cpus::get()
}
