//! Unit tests for the topology builder: strategy shapes, placement,
//! all-or-nothing construction, and flow affinity.

#![allow(clippy::cast_possible_truncation)]

use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicUsize, Ordering};

use fxhash::FxHashMap;
use parking_lot::Mutex;

use super::*;
use crate::error::BuildStep;
use crate::packet::{FlowKey, IPPROTO_TCP};
use crate::placement::{Placement, PriorityClass};
use crate::queue::QueueError;
use crate::stage::{Stage, StageError, StaticStageRegistry, ThreadInfo, Verdict};

/// Shared observations of the test stages.
#[derive(Default)]
struct Tally {
    created: AtomicUsize,
    live: AtomicUsize,
    source_calls: AtomicUsize,
    delivered: AtomicUsize,
    /// flow hash → detect role index that saw it
    shard_of: Mutex<FxHashMap<u64, usize>>,
    affinity_violations: AtomicUsize,
}

/// Tracks stage instance lifetime.
struct Live(Arc<Tally>);

impl Live {
    fn new(tally: &Arc<Tally>) -> Self {
        tally.created.fetch_add(1, Ordering::SeqCst);
        tally.live.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(tally))
    }
}

impl Drop for Live {
    fn drop(&mut self) {
        self.0.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Emits `total` packets; packet `i` belongs to flow `i % flows`.
struct Source {
    live: Live,
    next: u64,
    total: u64,
    flows: u64,
}

impl Stage for Source {
    fn process(&mut self, packet: &mut Packet) -> Result<Verdict, StageError> {
        self.live.0.source_calls.fetch_add(1, Ordering::SeqCst);
        if self.next == self.total {
            return Ok(Verdict::EndOfInput);
        }
        packet.seq = self.next;
        let flow = (self.next % self.flows) as u32;
        packet.data.clear();
        packet.data.extend_from_slice(&flow.to_be_bytes());
        self.next += 1;
        Ok(Verdict::Pass)
    }
}

/// Sets the flow key from the flow index written by [`Source`].
struct Decode {
    _live: Live,
}

impl Stage for Decode {
    fn process(&mut self, packet: &mut Packet) -> Result<Verdict, StageError> {
        let bytes: [u8; 4] = packet
            .data
            .get(..4)
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| StageError::Other("short packet".to_string()))?;
        packet.flow = Some(synthetic_key(u32::from_be_bytes(bytes)));
        Ok(Verdict::Pass)
    }
}

struct Pass {
    _live: Live,
}

impl Stage for Pass {
    fn process(&mut self, _packet: &mut Packet) -> Result<Verdict, StageError> {
        Ok(Verdict::Pass)
    }
}

/// Records which detect worker saw each flow.
struct Detect {
    live: Live,
    role_index: usize,
    fail_init_at: Option<usize>,
    panic_at_seq: Option<u64>,
}

impl Stage for Detect {
    fn thread_init(&mut self, thread: &ThreadInfo<'_>) -> Result<(), StageError> {
        self.role_index = thread.role_index;
        if self.fail_init_at == Some(thread.role_index) {
            return Err(StageError::Other("detect init failed".to_string()));
        }
        Ok(())
    }

    fn process(&mut self, packet: &mut Packet) -> Result<Verdict, StageError> {
        if self.panic_at_seq == Some(packet.seq) {
            panic!("detect engine fault on packet {}", packet.seq);
        }
        if let Some(hash) = packet.flow_hash() {
            let mut shard_of = self.live.0.shard_of.lock();
            let seen = *shard_of.entry(hash).or_insert(self.role_index);
            if seen != self.role_index {
                self.live
                    .0
                    .affinity_violations
                    .fetch_add(1, Ordering::SeqCst);
            }
        }
        Ok(Verdict::Pass)
    }
}

struct Output {
    live: Live,
}

impl Stage for Output {
    fn process(&mut self, _packet: &mut Packet) -> Result<Verdict, StageError> {
        self.live.0.delivered.fetch_add(1, Ordering::SeqCst);
        Ok(Verdict::Pass)
    }
}

fn synthetic_key(i: u32) -> FlowKey {
    let [_, b, c, d] = i.to_be_bytes();
    FlowKey::new(
        IpAddr::V4(Ipv4Addr::new(10, b, c, d)),
        1024 + (i % 50_000) as u16,
        IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1)),
        80,
        IPPROTO_TCP,
    )
}

struct RegistryOptions {
    packets: u64,
    flows: u64,
    fail_detect_init_at: Option<usize>,
    fail_detect_create_after: Option<usize>,
    panic_detect_at_seq: Option<u64>,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            packets: 100,
            flows: 10,
            fail_detect_init_at: None,
            fail_detect_create_after: None,
            panic_detect_at_seq: None,
        }
    }
}

fn test_registry(tally: &Arc<Tally>, options: &RegistryOptions) -> StaticStageRegistry {
    let mut registry = StaticStageRegistry::new();

    let (p, total, flows) = (Arc::clone(tally), options.packets, options.flows);
    registry.register(
        StageId::ReceivePcapFile,
        move |ctx: Option<&BoundContext>| -> Result<Box<dyn Stage>, StageError> {
            ctx.and_then(|c| c.downcast_ref::<PathBuf>())
                .ok_or(StageError::MissingContext(StageId::ReceivePcapFile))?;
            Ok(Box::new(Source {
                live: Live::new(&p),
                next: 0,
                total,
                flows,
            }))
        },
    );

    let p = Arc::clone(tally);
    registry.register(
        StageId::DecodePcapFile,
        move |_: Option<&BoundContext>| -> Result<Box<dyn Stage>, StageError> {
            Ok(Box::new(Decode {
                _live: Live::new(&p),
            }))
        },
    );

    let p = Arc::clone(tally);
    registry.register(
        StageId::StreamTcp,
        move |_: Option<&BoundContext>| -> Result<Box<dyn Stage>, StageError> {
            Ok(Box::new(Pass {
                _live: Live::new(&p),
            }))
        },
    );

    let p = Arc::clone(tally);
    let fail_init_at = options.fail_detect_init_at;
    let fail_after = options.fail_detect_create_after;
    let panic_at_seq = options.panic_detect_at_seq;
    let detect_created = Arc::new(AtomicUsize::new(0));
    registry.register(
        StageId::Detect,
        move |ctx: Option<&BoundContext>| -> Result<Box<dyn Stage>, StageError> {
            ctx.ok_or(StageError::MissingContext(StageId::Detect))?;
            let n = detect_created.fetch_add(1, Ordering::SeqCst);
            if fail_after.is_some_and(|limit| n >= limit) {
                return Err(StageError::Other("detect engine exhausted".to_string()));
            }
            Ok(Box::new(Detect {
                live: Live::new(&p),
                role_index: 0,
                fail_init_at,
                panic_at_seq,
            }))
        },
    );

    for id in [StageId::AlertFastLog, StageId::AlertDebugLog] {
        let p = Arc::clone(tally);
        registry.register(
            id,
            move |_: Option<&BoundContext>| -> Result<Box<dyn Stage>, StageError> {
                Ok(Box::new(Output {
                    live: Live::new(&p),
                }))
            },
        );
    }

    registry
}

/// Fails the `fail_at`-th lookup (0-based).
struct FailingRegistry {
    inner: StaticStageRegistry,
    fail_at: usize,
    lookups: AtomicUsize,
}

impl StageRegistry for FailingRegistry {
    fn resolve(&self, id: StageId) -> Option<Arc<dyn crate::stage::StageFactory>> {
        let n = self.lookups.fetch_add(1, Ordering::SeqCst);
        if n == self.fail_at {
            None
        } else {
            self.inner.resolve(id)
        }
    }
}

fn config(cpus: usize) -> crate::config::TopologyConfigBuilder {
    TopologyConfig::builder()
        .cpu_count(cpus)
        .pcap_file("capture.pcap")
        .max_pending_packets(32)
}

fn detect_ctx() -> BoundContext {
    Arc::new("rules".to_string())
}

const STRATEGIES: [Strategy; 3] = [Strategy::Single, Strategy::FanOut, Strategy::FlowAffine];

#[test]
fn test_strategy_names() {
    assert_eq!("single".parse::<Strategy>(), Ok(Strategy::Single));
    assert_eq!("AUTO".parse::<Strategy>(), Ok(Strategy::FanOut));
    assert_eq!("autofp".parse::<Strategy>(), Ok(Strategy::FlowAffine));
    assert!("workers".parse::<Strategy>().is_err());
    assert_eq!(Strategy::default(), Strategy::FlowAffine);
    for strategy in STRATEGIES {
        assert_eq!(strategy.name().parse::<Strategy>(), Ok(strategy));
    }
}

#[test]
fn test_single_pipeline_shape() {
    let tally = Arc::new(Tally::default());
    let registry = test_registry(&tally, &RegistryOptions::default());
    let config = config(4).cpu_affinity(true).build().unwrap();

    let plan = TopologyBuilder::new(&config, &registry, detect_ctx())
        .plan(Strategy::Single)
        .unwrap();
    let workers = plan.workers();

    assert_eq!(workers.len(), 1);
    assert_eq!(
        workers[0].stages,
        vec![
            StageId::ReceivePcapFile,
            StageId::DecodePcapFile,
            StageId::StreamTcp,
            StageId::Detect,
            StageId::AlertFastLog,
        ]
    );
    assert_eq!(workers[0].input, crate::worker::EndpointInfo::Pool);
    assert_eq!(workers[0].output, crate::worker::EndpointInfo::Pool);
    assert!(plan.queues().is_empty());
    // Descriptors only; no stage instance exists before spawn.
    assert_eq!(tally.created.load(Ordering::SeqCst), 0);
}

#[test]
fn test_fan_out_shape() {
    let tally = Arc::new(Tally::default());
    let registry = test_registry(&tally, &RegistryOptions::default());
    let config = config(3).build().unwrap();

    let plan = TopologyBuilder::new(&config, &registry, detect_ctx())
        .plan(Strategy::FanOut)
        .unwrap();
    let workers = plan.workers();
    let names: Vec<&str> = workers.iter().map(|w| w.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["ReceivePcapFile", "Decode&Stream", "Detect1", "Detect2", "Detect3", "Outputs"]
    );
    assert_eq!(workers[1].stages, vec![StageId::DecodePcapFile, StageId::StreamTcp]);
    assert!(workers[2..5]
        .iter()
        .all(|w| w.stages == vec![StageId::Detect] && w.group.as_deref() == Some(DETECT_GROUP)));
    assert_eq!(workers[5].stages, vec![StageId::AlertFastLog]);

    let queues = plan.queues();
    let shape: Vec<(&str, DispatchPolicy, usize)> = queues
        .iter()
        .map(|q| (q.name.as_str(), q.policy, q.shards))
        .collect();
    assert_eq!(
        shape,
        vec![
            ("pickup-queue", DispatchPolicy::Exclusive, 1),
            ("stream-queue1", DispatchPolicy::RoundRobin, 3),
            ("alert-queue1", DispatchPolicy::Exclusive, 1),
        ]
    );
}

#[test]
fn test_flow_affine_shape() {
    let tally = Arc::new(Tally::default());
    let registry = test_registry(&tally, &RegistryOptions::default());
    let config = config(2)
        .outputs(vec![StageId::AlertFastLog, StageId::AlertDebugLog])
        .build()
        .unwrap();

    let plan = TopologyBuilder::new(&config, &registry, detect_ctx())
        .plan(Strategy::FlowAffine)
        .unwrap();
    let workers = plan.workers();

    assert_eq!(workers.len(), 3);
    assert_eq!(
        workers[0].stages,
        vec![StageId::ReceivePcapFile, StageId::DecodePcapFile]
    );
    for (i, worker) in workers[1..].iter().enumerate() {
        assert_eq!(worker.name, format!("Detect{}", i + 1));
        assert_eq!(
            worker.stages,
            vec![
                StageId::StreamTcp,
                StageId::Detect,
                StageId::AlertFastLog,
                StageId::AlertDebugLog,
            ]
        );
        assert_eq!(worker.output, crate::worker::EndpointInfo::Pool);
    }
    let queues = plan.queues();
    assert_eq!(queues.len(), 1);
    assert_eq!(queues[0].policy, DispatchPolicy::FlowAffine);
    assert_eq!(queues[0].shards, 2);
}

#[test]
fn test_every_strategy_is_acyclic_with_one_path_per_detect_worker() {
    let tally = Arc::new(Tally::default());
    let registry = test_registry(&tally, &RegistryOptions::default());
    let config = config(3).build().unwrap();

    for (strategy, expected_paths) in STRATEGIES.into_iter().zip([1, 3, 3]) {
        let plan = TopologyBuilder::new(&config, &registry, detect_ctx())
            .plan(strategy)
            .unwrap();
        let graph = plan.graph();
        assert!(graph.execution_order().is_ok(), "{strategy} has a cycle");
        assert_eq!(graph.sources().len(), 1, "{strategy}");
        assert_eq!(graph.path_count(), expected_paths, "{strategy}");
    }
}

#[test]
fn test_scenario_a_single_cpu_fan_out() {
    let tally = Arc::new(Tally::default());
    let registry = test_registry(&tally, &RegistryOptions::default());
    let config = config(1).cpu_affinity(true).build().unwrap();

    let plan = TopologyBuilder::new(&config, &registry, detect_ctx())
        .plan(Strategy::FanOut)
        .unwrap();
    let workers = plan.workers();
    let detect: Vec<_> = workers
        .iter()
        .filter(|w| w.role == WorkerRole::Detect)
        .collect();

    assert_eq!(detect.len(), 1);
    assert!(workers.iter().all(|w| w.placement == Placement::unpinned()));

    // Runs to completion on one CPU.
    let report = plan.spawn().unwrap().join().unwrap();
    assert_eq!(report.delivered(), 100);
    assert_eq!(tally.delivered.load(Ordering::SeqCst), 100);
}

#[test]
fn test_scenario_b_four_cpus_fan_out() {
    let tally = Arc::new(Tally::default());
    let registry = test_registry(&tally, &RegistryOptions::default());
    let config = config(4)
        .cpu_affinity(true)
        .detect_thread_ratio(1.0)
        .build()
        .unwrap();

    let plan = TopologyBuilder::new(&config, &registry, detect_ctx())
        .plan(Strategy::FanOut)
        .unwrap();
    let workers = plan.workers();
    let detect: Vec<_> = workers
        .iter()
        .filter(|w| w.role == WorkerRole::Detect)
        .collect();

    let cpus: Vec<usize> = detect.iter().filter_map(|w| w.placement.cpu()).collect();
    assert_eq!(cpus, vec![1, 2, 3, 0]);
    let priorities: Vec<PriorityClass> = detect.iter().map(|w| w.placement.priority).collect();
    assert_eq!(
        priorities,
        vec![
            PriorityClass::Medium,
            PriorityClass::Medium,
            PriorityClass::Medium,
            PriorityClass::Low,
        ]
    );

    // Role workers without a configured set go to CPU 0.
    for worker in workers.iter().filter(|w| w.role != WorkerRole::Detect) {
        assert_eq!(
            worker.placement,
            Placement::pinned(vec![0], PriorityClass::Medium),
            "{}",
            worker.name
        );
    }
}

#[test]
fn test_role_cpu_sets() {
    let tally = Arc::new(Tally::default());
    let registry = test_registry(&tally, &RegistryOptions::default());
    let config = config(4)
        .cpu_affinity(true)
        .cpu_sets(crate::config::RoleCpuSets {
            receive: vec![0],
            decode: vec![1],
            detect: vec![2, 3],
            output: vec![1],
        })
        .build()
        .unwrap();

    let plan = TopologyBuilder::new(&config, &registry, detect_ctx())
        .plan(Strategy::FanOut)
        .unwrap();
    let workers = plan.workers();

    // The detect set supplies the worker count; rotation still places them.
    let detect: Vec<_> = workers
        .iter()
        .filter(|w| w.role == WorkerRole::Detect)
        .collect();
    assert_eq!(detect.len(), 2);
    assert_eq!(workers[1].placement.cpus, vec![1]);
    assert_eq!(workers.last().unwrap().placement.cpus, vec![1]);
}

#[test]
fn test_explicit_detect_count() {
    let tally = Arc::new(Tally::default());
    let registry = test_registry(&tally, &RegistryOptions::default());
    let config = config(8).detect_thread_count(3).build().unwrap();

    let plan = TopologyBuilder::new(&config, &registry, detect_ctx())
        .plan(Strategy::FlowAffine)
        .unwrap();
    assert_eq!(plan.queues()[0].shards, 3);
    assert_eq!(plan.workers().len(), 4);
}

#[test]
fn test_scenario_c_flow_affine_sharding() {
    const KEYS: u64 = 10_000;

    let run = || {
        let tally = Arc::new(Tally::default());
        let registry = test_registry(
            &tally,
            &RegistryOptions {
                packets: KEYS,
                flows: KEYS,
                ..RegistryOptions::default()
            },
        );
        let config = config(4).build().unwrap();
        let topology = build_flow_affine(&config, &registry, detect_ctx()).unwrap();
        assert_eq!(topology.queues()[0].shards, 4);
        let report = topology.join().unwrap();
        assert_eq!(report.groups[DETECT_GROUP].processed, KEYS);
        assert_eq!(tally.affinity_violations.load(Ordering::SeqCst), 0);
        let shard_of = tally.shard_of.lock().clone();
        shard_of
    };

    let first = run();
    assert_eq!(first.len(), KEYS as usize);

    let mut per_shard = [0usize; 4];
    for &shard in first.values() {
        per_shard[shard] += 1;
    }
    let mean = KEYS as usize / 4;
    for count in per_shard {
        assert!(count <= 2 * mean, "shard overloaded: {per_shard:?}");
    }

    let second = run();
    assert_eq!(first, second);
}

#[test]
fn test_flows_stay_on_one_shard_with_repeats() {
    let tally = Arc::new(Tally::default());
    let registry = test_registry(
        &tally,
        &RegistryOptions {
            packets: 2_000,
            flows: 17,
            ..RegistryOptions::default()
        },
    );
    let config = config(3).queue_capacity(4).build().unwrap();
    let report = build_flow_affine(&config, &registry, detect_ctx())
        .unwrap()
        .join()
        .unwrap();

    assert_eq!(report.delivered(), 2_000);
    assert_eq!(tally.shard_of.lock().len(), 17);
    assert_eq!(tally.affinity_violations.load(Ordering::SeqCst), 0);
}

#[test]
fn test_registry_failure_at_every_lookup() {
    for strategy in STRATEGIES {
        // Count the lookups of a successful plan.
        let tally = Arc::new(Tally::default());
        let counting = FailingRegistry {
            inner: test_registry(&tally, &RegistryOptions::default()),
            fail_at: usize::MAX,
            lookups: AtomicUsize::new(0),
        };
        let config = config(4).build().unwrap();
        TopologyBuilder::new(&config, &counting, detect_ctx())
            .plan(strategy)
            .unwrap();
        let lookups = counting.lookups.load(Ordering::SeqCst);
        assert!(lookups >= 5);

        for k in 0..lookups {
            let tally = Arc::new(Tally::default());
            let registry = FailingRegistry {
                inner: test_registry(&tally, &RegistryOptions::default()),
                fail_at: k,
                lookups: AtomicUsize::new(0),
            };
            let err = build(strategy, &config, &registry, detect_ctx()).unwrap_err();
            assert!(
                matches!(err, TopologyError::StageNotFound(_)),
                "{strategy} lookup {k}: {err}"
            );
            assert_eq!(err.step(), BuildStep::Resolve);
            assert_eq!(tally.created.load(Ordering::SeqCst), 0);
            assert_eq!(tally.source_calls.load(Ordering::SeqCst), 0);
        }
    }
}

#[test]
fn test_init_failure_leaves_no_worker_running() {
    for strategy in [Strategy::FanOut, Strategy::FlowAffine] {
        let tally = Arc::new(Tally::default());
        let registry = test_registry(
            &tally,
            &RegistryOptions {
                fail_detect_init_at: Some(2),
                ..RegistryOptions::default()
            },
        );
        let config = config(4).build().unwrap();

        let err = build(strategy, &config, &registry, detect_ctx()).unwrap_err();
        match &err {
            TopologyError::WorkerInit { worker, .. } => assert_eq!(worker, "Detect3"),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(err.step(), BuildStep::Spawn);
        // Every thread has exited and dropped its stages.
        assert!(tally.created.load(Ordering::SeqCst) > 0);
        assert_eq!(tally.live.load(Ordering::SeqCst), 0);
        assert_eq!(tally.source_calls.load(Ordering::SeqCst), 0);
    }
}

#[test]
fn test_stage_create_failure_spawns_nothing() {
    let tally = Arc::new(Tally::default());
    let registry = test_registry(
        &tally,
        &RegistryOptions {
            fail_detect_create_after: Some(2),
            ..RegistryOptions::default()
        },
    );
    let config = config(4).build().unwrap();

    let err = build_fan_out(&config, &registry, detect_ctx()).unwrap_err();
    assert!(matches!(
        err,
        TopologyError::StageCreate {
            stage: StageId::Detect,
            ..
        }
    ));
    assert_eq!(err.step(), BuildStep::CreateWorkers);
    assert_eq!(tally.live.load(Ordering::SeqCst), 0);
    assert_eq!(tally.source_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_panicking_stage_fails_join_instead_of_hanging() {
    for strategy in [Strategy::FanOut, Strategy::FlowAffine] {
        let tally = Arc::new(Tally::default());
        let registry = test_registry(
            &tally,
            &RegistryOptions {
                packets: 1000,
                panic_detect_at_seq: Some(0),
                ..RegistryOptions::default()
            },
        );
        // Fewer buffers than packets: the source needs the pool to keep
        // turning over after the detect worker dies.
        let config = config(1).max_pending_packets(8).queue_capacity(4).build().unwrap();
        let topology = build(strategy, &config, &registry, detect_ctx()).unwrap();

        let (tx, rx) = crossbeam_channel::bounded(1);
        std::thread::spawn(move || {
            let panicked = match topology.join() {
                Err(TopologyError::WorkerPanicked(worker)) => Some(worker),
                _ => None,
            };
            let _ = tx.send(panicked);
        });

        let panicked = rx
            .recv_timeout(std::time::Duration::from_secs(10))
            .unwrap_or_else(|_| panic!("{strategy}: join did not return"));
        assert_eq!(panicked.as_deref(), Some("Detect1"), "{strategy}");
        assert_eq!(tally.live.load(Ordering::SeqCst), 0, "{strategy}");
    }
}

#[test]
fn test_unallocatable_detect_count_is_an_error() {
    let tally = Arc::new(Tally::default());
    let registry = test_registry(&tally, &RegistryOptions::default());
    let config = config(4).detect_thread_count(usize::MAX / 2).build().unwrap();

    for strategy in [Strategy::FanOut, Strategy::FlowAffine] {
        let err = TopologyBuilder::new(&config, &registry, detect_ctx())
            .plan(strategy)
            .unwrap_err();
        assert!(
            matches!(err, TopologyError::Queue(QueueError::Allocation { .. })),
            "{strategy}: {err}"
        );
        assert_eq!(err.step(), BuildStep::AllocateQueues);
    }
    assert_eq!(tally.created.load(Ordering::SeqCst), 0);
}

#[test]
fn test_missing_pcap_file_is_configuration_error() {
    let tally = Arc::new(Tally::default());
    let registry = test_registry(&tally, &RegistryOptions::default());
    let config = TopologyConfig::builder().cpu_count(2).build().unwrap();

    let err = build_single(&config, &registry, detect_ctx()).unwrap_err();
    assert!(matches!(err, TopologyError::Config(_)));
    assert_eq!(err.step(), BuildStep::Configure);
}

#[test]
fn test_custom_output_wiring() {
    struct DebugOnly(StageRef);

    impl OutputWiring for DebugOnly {
        fn attach(&self, worker: &mut WorkerSpec) -> Result<(), TopologyError> {
            worker.push_stage(self.0.clone())
        }
    }

    let tally = Arc::new(Tally::default());
    let registry = test_registry(&tally, &RegistryOptions::default());
    let config = config(2).build().unwrap();
    let wiring = DebugOnly(StageRef::resolve(&registry, StageId::AlertDebugLog, None).unwrap());

    let plan = TopologyBuilder::new(&config, &registry, detect_ctx())
        .with_output_wiring(&wiring)
        .plan(Strategy::FanOut)
        .unwrap();
    let workers = plan.workers();
    assert_eq!(workers.last().unwrap().stages, vec![StageId::AlertDebugLog]);
}

#[test]
fn test_running_topology_introspection() {
    let tally = Arc::new(Tally::default());
    let registry = test_registry(&tally, &RegistryOptions::default());
    let config = config(2).build().unwrap();

    let topology = build_fan_out(&config, &registry, detect_ctx()).unwrap();
    assert!(topology.is_offline());
    assert_eq!(topology.strategy(), Strategy::FanOut);
    assert_eq!(topology.worker_count(), 5);
    assert_eq!(topology.workers().filter(|w| w.group.is_some()).count(), 2);
    assert_eq!(topology.queues().len(), 3);
    assert_eq!(topology.graph().path_count(), 2);

    let report = topology.join().unwrap();
    let detect = &report.groups[DETECT_GROUP];
    assert_eq!(detect.processed, 100);
    assert_eq!(report.delivered(), 100);
    assert_eq!(tally.live.load(Ordering::SeqCst), 0);
}
