//! # Queues
//!
//! Named inter-thread channels connecting workers.
//!
//! ## Dispatch Policies
//!
//! | Policy | Consumers | Ordering |
//! |--------|-----------|----------|
//! | [`DispatchPolicy::Exclusive`] | 1 | producer order |
//! | [`DispatchPolicy::RoundRobin`] | N | none across consumers |
//! | [`DispatchPolicy::FlowAffine`] | N | producer order per flow |
//!
//! Each consumer owns one physical channel (a shard). Producers pick the
//! shard through a [`ShardRouter`]. Any number of producers may feed a queue.
//!
//! ## Lifetime
//!
//! Queues live in a [`QueueSet`] during construction. `QueueSet::create`
//! hands out a [`QueueHandle`]; asking again for the same name and policy
//! returns the same underlying channels. Once the topology is spawned the set
//! is dropped, so a channel closes as soon as its last [`Producer`] goes
//! away. Consumers then drain what is left and observe
//! [`Dequeued::Shutdown`].
//!
//! ## Capacity
//!
//! Unbounded by default. With a capacity, `push` blocks while the target
//! shard is full (backpressure) and resumes once the consumer catches up.
//!
//! The [`RecyclePool`] is the free list of packet buffers shared by the
//! source and sink roles.

mod recycle;
mod router;

pub use recycle::{RecyclePool, RECYCLE_POOL_NAME};
pub use router::{fast_range, ShardRouter};

use std::collections::TryReserveError;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use fxhash::FxHashMap;
use parking_lot::Mutex;
use serde::Serialize;

use crate::packet::Packet;

/// How a queue distributes items among its consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DispatchPolicy {
    /// One consumer.
    Exclusive,
    /// N interchangeable consumers, strict rotation.
    RoundRobin,
    /// N consumers, `hash(flow) → shard`.
    FlowAffine,
}

impl fmt::Display for DispatchPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Exclusive => "simple",
            Self::RoundRobin => "round-robin",
            Self::FlowAffine => "flow",
        };
        f.write_str(name)
    }
}

/// Items that can be routed by flow.
pub trait Routable {
    /// Hash of the item's flow key, if it has one.
    fn flow_hash(&self) -> Option<u64>;
}

impl Routable for Packet {
    fn flow_hash(&self) -> Option<u64> {
        Packet::flow_hash(self)
    }
}

/// Read-only description of a queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueInfo {
    /// Queue name.
    pub name: String,
    /// Dispatch policy.
    pub policy: DispatchPolicy,
    /// Number of physical channels.
    pub shards: usize,
    /// Per-shard capacity (`None` = unbounded).
    pub capacity: Option<usize>,
}

/// Result of a dequeue.
#[derive(Debug, PartialEq, Eq)]
#[must_use]
pub enum Dequeued<T> {
    /// An item.
    Item(T),
    /// Every producer is gone and the shard is drained.
    Shutdown,
}

/// Queue allocation errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    /// A queue must have at least one shard.
    #[error("queue '{name}': shard count must be >= 1")]
    ZeroShards {
        /// Queue name.
        name: String,
    },

    /// Exclusive queues have exactly one consumer.
    #[error("queue '{name}': exclusive queues have exactly one shard, requested {shards}")]
    ExclusiveShards {
        /// Queue name.
        name: String,
        /// Requested shard count.
        shards: usize,
    },

    /// The name is already used with a different policy.
    #[error("queue '{name}' already exists with policy {existing}, requested {requested}")]
    PolicyConflict {
        /// Queue name.
        name: String,
        /// Existing policy.
        existing: DispatchPolicy,
        /// Requested policy.
        requested: DispatchPolicy,
    },

    /// The name is already used with a different shard count.
    #[error("queue '{name}' already exists with {existing} shards, requested {requested}")]
    ShardConflict {
        /// Queue name.
        name: String,
        /// Existing shard count.
        existing: usize,
        /// Requested shard count.
        requested: usize,
    },

    /// Consumer index out of range.
    #[error("queue '{name}': no shard {shard} (shards: {shards})")]
    ShardOutOfRange {
        /// Queue name.
        name: String,
        /// Requested shard.
        shard: usize,
        /// Shard count.
        shards: usize,
    },

    /// The shard already has its consumer.
    #[error("queue '{name}': shard {shard} already has a consumer")]
    ConsumerTaken {
        /// Queue name.
        name: String,
        /// Shard.
        shard: usize,
    },

    /// The shard table could not be reserved.
    #[error("queue '{name}': cannot allocate {shards} shards: {source}")]
    Allocation {
        /// Queue name.
        name: String,
        /// Requested shard count.
        shards: usize,
        /// Underlying reservation error.
        #[source]
        source: TryReserveError,
    },

    /// A shard has no consumer, or the queue has no producer.
    #[error("queue '{name}': {what}")]
    Unclaimed {
        /// Queue name.
        name: String,
        /// What is missing.
        what: String,
    },
}

struct Shared<T> {
    info: QueueInfo,
    senders: Vec<Sender<T>>,
    receivers: Mutex<Vec<Option<Receiver<T>>>>,
    router: ShardRouter,
    producers: AtomicUsize,
}

/// Handle to an allocated queue.
pub struct QueueHandle<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for QueueHandle<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> QueueHandle<T> {
    fn allocate(
        name: &str,
        policy: DispatchPolicy,
        shards: usize,
        capacity: Option<usize>,
    ) -> Result<Self, QueueError> {
        let failed = |source| QueueError::Allocation {
            name: name.to_string(),
            shards,
            source,
        };
        let mut senders = Vec::new();
        senders.try_reserve_exact(shards).map_err(failed)?;
        let mut receivers = Vec::new();
        receivers.try_reserve_exact(shards).map_err(failed)?;
        for _ in 0..shards {
            let (tx, rx) = match capacity {
                Some(cap) => crossbeam_channel::bounded(cap),
                None => crossbeam_channel::unbounded(),
            };
            senders.push(tx);
            receivers.push(Some(rx));
        }
        Ok(Self {
            shared: Arc::new(Shared {
                info: QueueInfo {
                    name: name.to_string(),
                    policy,
                    shards,
                    capacity,
                },
                senders,
                receivers: Mutex::new(receivers),
                router: ShardRouter::new(policy, shards),
                producers: AtomicUsize::new(0),
            }),
        })
    }

    /// Queue description.
    #[must_use]
    pub fn info(&self) -> &QueueInfo {
        &self.shared.info
    }

    /// Queue name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.shared.info.name
    }

    /// Creates a producer. Any number of producers may exist.
    #[must_use]
    pub fn producer(&self) -> Producer<T> {
        self.shared.producers.fetch_add(1, Ordering::Relaxed);
        Producer {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Takes the consumer end of `shard`. Each shard has exactly one consumer.
    ///
    /// # Errors
    ///
    /// Returns an error if the shard does not exist or is already taken.
    pub fn consumer(&self, shard: usize) -> Result<Consumer<T>, QueueError> {
        let info = &self.shared.info;
        let mut receivers = self.shared.receivers.lock();
        let slot = receivers
            .get_mut(shard)
            .ok_or_else(|| QueueError::ShardOutOfRange {
                name: info.name.clone(),
                shard,
                shards: info.shards,
            })?;
        let receiver = slot.take().ok_or_else(|| QueueError::ConsumerTaken {
            name: info.name.clone(),
            shard,
        })?;
        Ok(Consumer {
            name: Arc::from(info.name.as_str()),
            shard,
            receiver,
        })
    }

    fn check_claimed(&self) -> Result<(), QueueError> {
        let info = &self.shared.info;
        if self.shared.producers.load(Ordering::Relaxed) == 0 {
            return Err(QueueError::Unclaimed {
                name: info.name.clone(),
                what: "no producer".to_string(),
            });
        }
        let receivers = self.shared.receivers.lock();
        if let Some(shard) = receivers.iter().position(Option::is_some) {
            return Err(QueueError::Unclaimed {
                name: info.name.clone(),
                what: format!("shard {shard} has no consumer"),
            });
        }
        Ok(())
    }
}

impl<T> fmt::Debug for QueueHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueHandle")
            .field("info", &self.shared.info)
            .finish_non_exhaustive()
    }
}

/// Producer end of a queue.
pub struct Producer<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Producer<T> {
    /// Queue name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.shared.info.name
    }

    /// Queue description.
    #[must_use]
    pub fn info(&self) -> &QueueInfo {
        &self.shared.info
    }
}

impl<T: Routable> Producer<T> {
    /// Routes and enqueues `item`. Blocks while a bounded shard is full.
    ///
    /// # Errors
    ///
    /// Returns the item if the target shard's consumer is gone.
    pub fn push(&self, item: T) -> Result<(), T> {
        let shard = self.shared.router.route(item.flow_hash());
        self.shared.senders[shard]
            .send(item)
            .map_err(crossbeam_channel::SendError::into_inner)
    }
}

impl<T> fmt::Debug for Producer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Producer")
            .field("queue", &self.shared.info.name)
            .field("policy", &self.shared.info.policy)
            .finish_non_exhaustive()
    }
}

/// Consumer end of one queue shard.
pub struct Consumer<T> {
    name: Arc<str>,
    shard: usize,
    receiver: Receiver<T>,
}

impl<T> Consumer<T> {
    /// Queue name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Shard index.
    #[must_use]
    pub fn shard(&self) -> usize {
        self.shard
    }

    /// Blocks until an item arrives or the shard is closed and drained.
    pub fn pop(&self) -> Dequeued<T> {
        match self.receiver.recv() {
            Ok(item) => Dequeued::Item(item),
            Err(_) => Dequeued::Shutdown,
        }
    }

    /// Non-blocking dequeue. `None` means the shard is empty but still open.
    pub fn try_pop(&self) -> Option<Dequeued<T>> {
        match self.receiver.try_recv() {
            Ok(item) => Some(Dequeued::Item(item)),
            Err(crossbeam_channel::TryRecvError::Empty) => None,
            Err(crossbeam_channel::TryRecvError::Disconnected) => Some(Dequeued::Shutdown),
        }
    }

    /// Items waiting in the shard.
    #[must_use]
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    /// Returns true if the shard is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

impl<T> fmt::Debug for Consumer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer")
            .field("queue", &self.name)
            .field("shard", &self.shard)
            .field("len", &self.len())
            .finish()
    }
}

/// The named queues of one topology.
pub struct QueueSet<T> {
    queues: FxHashMap<String, QueueHandle<T>>,
    order: Vec<String>,
    capacity: Option<usize>,
}

impl<T> QueueSet<T> {
    /// Creates an empty set. `capacity` applies to every shard of every queue
    /// (`None` = unbounded).
    #[must_use]
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            queues: FxHashMap::default(),
            order: Vec::new(),
            capacity: capacity.filter(|&c| c > 0),
        }
    }

    /// Allocates `name`, or returns the existing queue if the name is already
    /// allocated with the same policy and shard count.
    ///
    /// # Errors
    ///
    /// Returns an error for zero shards, a multi-shard exclusive queue, a
    /// conflicting redefinition, or a shard table that cannot be allocated.
    pub fn create(
        &mut self,
        name: &str,
        policy: DispatchPolicy,
        shards: usize,
    ) -> Result<QueueHandle<T>, QueueError> {
        if shards == 0 {
            return Err(QueueError::ZeroShards {
                name: name.to_string(),
            });
        }
        if policy == DispatchPolicy::Exclusive && shards != 1 {
            return Err(QueueError::ExclusiveShards {
                name: name.to_string(),
                shards,
            });
        }
        if let Some(existing) = self.queues.get(name) {
            let info = existing.info();
            if info.policy != policy {
                return Err(QueueError::PolicyConflict {
                    name: name.to_string(),
                    existing: info.policy,
                    requested: policy,
                });
            }
            if info.shards != shards {
                return Err(QueueError::ShardConflict {
                    name: name.to_string(),
                    existing: info.shards,
                    requested: shards,
                });
            }
            return Ok(existing.clone());
        }

        let handle = QueueHandle::allocate(name, policy, shards, self.capacity)?;
        tracing::debug!(queue = name, %policy, shards, "allocated queue");
        self.queues.insert(name.to_string(), handle.clone());
        self.order.push(name.to_string());
        Ok(handle)
    }

    /// Looks up an allocated queue.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&QueueHandle<T>> {
        self.queues.get(name)
    }

    /// Number of queues.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns true if no queue was allocated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Checks that every queue has a producer and every shard a consumer.
    ///
    /// # Errors
    ///
    /// Returns the first unclaimed queue.
    pub fn check_claimed(&self) -> Result<(), QueueError> {
        self.order
            .iter()
            .filter_map(|name| self.queues.get(name))
            .try_for_each(QueueHandle::check_claimed)
    }

    /// Queue descriptions in allocation order.
    #[must_use]
    pub fn infos(&self) -> Vec<QueueInfo> {
        self.order
            .iter()
            .filter_map(|name| self.queues.get(name))
            .map(|q| q.info().clone())
            .collect()
    }

    /// Drops every handle held by the set and returns the descriptions.
    #[must_use]
    pub fn into_infos(self) -> Vec<QueueInfo> {
        self.infos()
    }
}

impl<T> fmt::Debug for QueueSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueSet")
            .field("queues", &self.infos())
            .finish()
    }
}
