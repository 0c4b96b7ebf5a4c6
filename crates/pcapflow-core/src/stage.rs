//! # Stages
//!
//! A stage is an opaque unit of packet-processing logic (receive, decode,
//! reassemble, detect, output). The topology layer never looks inside a
//! stage; it only knows the stage's [`StageId`], how to create a per-thread
//! instance through a [`StageFactory`], and how to call it.
//!
//! Stage identifiers form a closed enumeration. A [`StageRegistry`] maps each
//! identifier to a factory. Resolution happens once, at build time, and the
//! resolved factory is cached in the [`StageRef`].
//!
//! ```rust,ignore
//! let mut registry = StaticStageRegistry::new();
//! registry.register(StageId::Detect, |ctx: Option<&BoundContext>| {
//!     Ok(Box::new(MyDetect::new(ctx)?) as Box<dyn Stage>)
//! });
//!
//! let detect = StageRef::resolve(&registry, StageId::Detect, Some(detect_ctx))?;
//! ```

use std::any::Any;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use fxhash::FxHashMap;
use serde::Serialize;

use crate::error::TopologyError;
use crate::packet::Packet;

/// Context object bound to a stage reference (a file path, a detection
/// context, ...). Opaque to the topology layer; stages downcast it.
pub type BoundContext = Arc<dyn Any + Send + Sync>;

/// Identifier of a processing stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum StageId {
    /// Reads packets from a capture file into pool buffers.
    ReceivePcapFile,
    /// Decodes link/network/transport headers and sets the flow key.
    DecodePcapFile,
    /// TCP stream tracking and reassembly.
    StreamTcp,
    /// Signature matching against the detection context.
    Detect,
    /// One-line-per-alert output.
    AlertFastLog,
    /// Verbose per-packet alert output.
    AlertDebugLog,
}

impl StageId {
    /// Every stage identifier, in pipeline order.
    pub const ALL: [StageId; 6] = [
        Self::ReceivePcapFile,
        Self::DecodePcapFile,
        Self::StreamTcp,
        Self::Detect,
        Self::AlertFastLog,
        Self::AlertDebugLog,
    ];

    /// Module name of the stage.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::ReceivePcapFile => "ReceivePcapFile",
            Self::DecodePcapFile => "DecodePcapFile",
            Self::StreamTcp => "StreamTcp",
            Self::Detect => "Detect",
            Self::AlertFastLog => "AlertFastLog",
            Self::AlertDebugLog => "AlertDebugLog",
        }
    }

    /// Returns true for stages that emit results (attached by output wiring).
    #[must_use]
    pub fn is_output(self) -> bool {
        matches!(self, Self::AlertFastLog | Self::AlertDebugLog)
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when a string does not name a known stage.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown stage name: {0}")]
pub struct UnknownStage(pub String);

impl FromStr for StageId {
    type Err = UnknownStage;

    /// Accepts module names (`AlertFastLog`) and output config names
    /// (`alert-fastlog`), case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .map(|c| c.to_ascii_lowercase())
            .collect();
        Self::ALL
            .into_iter()
            .find(|id| id.name().to_ascii_lowercase() == normalized)
            .ok_or_else(|| UnknownStage(s.to_string()))
    }
}

/// What the worker should do with a packet after a stage ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Continue with the next stage, then forward downstream.
    Pass,
    /// Stop processing and return the buffer to the pool.
    Drop,
    /// The source is exhausted. The buffer goes back to the pool and the
    /// worker shuts down, closing its output.
    EndOfInput,
}

/// Errors raised by stage implementations.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    /// The stage needs a bound context and none was supplied.
    #[error("stage {0} requires a bound context")]
    MissingContext(StageId),

    /// The bound context is not of the type the stage expects.
    #[error("bound context for stage {0} has an unexpected type")]
    ContextType(StageId),

    /// I/O failure inside the stage.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other stage failure.
    #[error("{0}")]
    Other(String),
}

/// Per-thread information handed to stages at init and exit.
#[derive(Debug, Clone, Copy)]
pub struct ThreadInfo<'a> {
    /// Name of the worker thread.
    pub worker_name: &'a str,
    /// Position of this worker among the workers sharing its role.
    pub role_index: usize,
}

/// A per-thread stage instance.
///
/// Instances are created on the building thread and moved into their worker
/// thread; all per-thread state lives in the instance.
pub trait Stage: Send {
    /// Called once on the worker thread before the first packet.
    ///
    /// # Errors
    ///
    /// An error aborts topology construction.
    fn thread_init(&mut self, _thread: &ThreadInfo<'_>) -> Result<(), StageError> {
        Ok(())
    }

    /// Processes one packet in place.
    ///
    /// # Errors
    ///
    /// Runtime errors are logged by the worker and the packet is dropped.
    fn process(&mut self, packet: &mut Packet) -> Result<Verdict, StageError>;

    /// Called once on the worker thread after the last packet.
    fn thread_exit(&mut self, _thread: &ThreadInfo<'_>) {}
}

/// Creates stage instances, one per worker that runs the stage.
pub trait StageFactory: Send + Sync {
    /// Creates a new instance bound to `context`.
    ///
    /// # Errors
    ///
    /// Returns an error if the instance cannot be set up (missing context,
    /// unreadable file, ...).
    fn create(&self, context: Option<&BoundContext>) -> Result<Box<dyn Stage>, StageError>;
}

impl<F> StageFactory for F
where
    F: Fn(Option<&BoundContext>) -> Result<Box<dyn Stage>, StageError> + Send + Sync,
{
    fn create(&self, context: Option<&BoundContext>) -> Result<Box<dyn Stage>, StageError> {
        self(context)
    }
}

/// Maps stage identifiers to factories.
pub trait StageRegistry {
    /// Looks up the factory for `id`.
    fn resolve(&self, id: StageId) -> Option<Arc<dyn StageFactory>>;
}

/// Registry backed by a hash map, filled at init time.
#[derive(Default)]
pub struct StaticStageRegistry {
    entries: FxHashMap<StageId, Arc<dyn StageFactory>>,
}

impl StaticStageRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the factory for `id`.
    pub fn register<F>(&mut self, id: StageId, factory: F) -> &mut Self
    where
        F: StageFactory + 'static,
    {
        self.entries.insert(id, Arc::new(factory));
        self
    }

    /// Returns true if `id` has a factory.
    #[must_use]
    pub fn contains(&self, id: StageId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Number of registered stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl StageRegistry for StaticStageRegistry {
    fn resolve(&self, id: StageId) -> Option<Arc<dyn StageFactory>> {
        self.entries.get(&id).cloned()
    }
}

impl fmt::Debug for StaticStageRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<_> = self.entries.keys().copied().collect();
        ids.sort();
        f.debug_struct("StaticStageRegistry")
            .field("stages", &ids)
            .finish()
    }
}

/// A resolved stage bound to an optional context.
#[derive(Clone)]
pub struct StageRef {
    id: StageId,
    factory: Arc<dyn StageFactory>,
    context: Option<BoundContext>,
}

impl StageRef {
    /// Resolves `id` against `registry`.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::StageNotFound`] if the registry has no
    /// factory for `id`.
    pub fn resolve(
        registry: &dyn StageRegistry,
        id: StageId,
        context: Option<BoundContext>,
    ) -> Result<Self, TopologyError> {
        let factory = registry
            .resolve(id)
            .ok_or(TopologyError::StageNotFound(id))?;
        tracing::debug!(stage = %id, "resolved stage");
        Ok(Self {
            id,
            factory,
            context,
        })
    }

    /// The stage identifier.
    #[must_use]
    pub fn id(&self) -> StageId {
        self.id
    }

    /// The bound context, if any.
    #[must_use]
    pub fn context(&self) -> Option<&BoundContext> {
        self.context.as_ref()
    }

    /// Creates a fresh instance through the cached factory.
    ///
    /// # Errors
    ///
    /// Propagates the factory's error.
    pub fn instantiate(&self) -> Result<Box<dyn Stage>, StageError> {
        self.factory.create(self.context.as_ref())
    }
}

impl fmt::Debug for StageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageRef")
            .field("id", &self.id)
            .field("has_context", &self.context.is_some())
            .finish_non_exhaustive()
    }
}
