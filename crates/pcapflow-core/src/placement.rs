//! # Placement Policy
//!
//! Pure functions deciding how many detect workers to run and which CPU and
//! scheduling priority each worker gets.
//!
//! ## Rotation
//!
//! Detect workers are placed round-robin over the online CPUs, starting at
//! CPU 1 so that CPU 0 (where the OS and the receive worker usually live) is
//! used last:
//!
//! ```text
//! cpu_count = 4:  1 → 2 → 3 → 0 → 1 → ...
//! cpu_count = 1:  0 → 0 → ...
//! ```
//!
//! The rotation cursor is a [`PlacementState`] value threaded through the
//! builder; nothing here is global.
//!
//! ## Priority
//!
//! Pinning and priority only apply when affinity is enabled and there is
//! more than one CPU. A rotated worker that lands on CPU 0 runs at
//! [`PriorityClass::Low`] so it yields to the receive worker sharing that
//! core; every other pinned worker runs at [`PriorityClass::Medium`].
//!
//! Role workers (receive, decode, output) sit outside the rotation. They are
//! pinned to their configured role CPU set, or to CPU 0 when none is set.

use serde::Serialize;

/// Scheduling priority class of a worker thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum PriorityClass {
    /// Background (nice +10).
    Low,
    /// Normal (nice 0).
    Medium,
    /// Leave the OS default untouched.
    #[default]
    Default,
}

impl PriorityClass {
    /// Nice value applied to the thread, `None` for [`PriorityClass::Default`].
    #[must_use]
    pub fn nice_value(self) -> Option<i32> {
        match self {
            Self::Low => Some(10),
            Self::Medium => Some(0),
            Self::Default => None,
        }
    }
}

/// CPU affinity and priority of one worker.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Placement {
    /// CPUs the thread is pinned to (empty = not pinned).
    pub cpus: Vec<usize>,
    /// Priority class.
    pub priority: PriorityClass,
}

impl Placement {
    /// No pinning, default priority.
    #[must_use]
    pub fn unpinned() -> Self {
        Self::default()
    }

    /// Pinned to `cpus` with `priority`.
    #[must_use]
    pub fn pinned(cpus: Vec<usize>, priority: PriorityClass) -> Self {
        Self { cpus, priority }
    }

    /// The single CPU of a rotated placement.
    #[must_use]
    pub fn cpu(&self) -> Option<usize> {
        match self.cpus.as_slice() {
            [cpu] => Some(*cpu),
            _ => None,
        }
    }

    /// Returns true if the thread is pinned.
    #[must_use]
    pub fn is_pinned(&self) -> bool {
        !self.cpus.is_empty()
    }
}

/// Inputs that decide whether placement applies at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlacementPolicy {
    /// Online CPUs.
    pub cpu_count: usize,
    /// `threading.set-cpu-affinity`.
    pub affinity_enabled: bool,
}

impl PlacementPolicy {
    /// Creates a policy.
    #[must_use]
    pub fn new(cpu_count: usize, affinity_enabled: bool) -> Self {
        Self {
            cpu_count,
            affinity_enabled,
        }
    }

    /// Returns true if workers get pinned and prioritised.
    #[must_use]
    pub fn pins(&self) -> bool {
        self.affinity_enabled && self.cpu_count > 1
    }
}

/// Number of detect workers.
///
/// An explicit override wins; otherwise `round(cpu_count * ratio)`. The
/// result is never below 1. Negative or non-finite ratios count as 0.
#[must_use]
pub fn detect_worker_count(cpu_count: usize, ratio: f64, explicit: usize) -> usize {
    if explicit > 0 {
        return explicit;
    }
    let ratio = if ratio.is_finite() && ratio > 0.0 {
        ratio
    } else {
        0.0
    };
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    let count = (cpu_count as f64 * ratio).round() as usize;
    count.max(1)
}

/// Rotation cursor over the online CPUs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlacementState {
    cpu_count: usize,
    next_cpu: usize,
    wrap_boundary: usize,
}

impl PlacementState {
    /// Starts the rotation: CPU 1 first when there is more than one CPU,
    /// CPU 0 otherwise. A CPU count of 0 behaves like 1.
    #[must_use]
    pub fn new(cpu_count: usize) -> Self {
        let wrap_boundary = cpu_count.max(1);
        Self {
            cpu_count,
            next_cpu: usize::from(wrap_boundary > 1),
            wrap_boundary,
        }
    }

    /// CPU count the rotation was built for.
    #[must_use]
    pub fn cpu_count(&self) -> usize {
        self.cpu_count
    }

    /// CPU the next worker will get.
    #[must_use]
    pub fn next_cpu(&self) -> usize {
        self.next_cpu
    }

    /// Takes the next CPU and returns the advanced state.
    #[must_use]
    pub fn advance(self) -> (usize, Self) {
        let cpu = self.next_cpu;
        let next_cpu = if cpu + 1 >= self.wrap_boundary { 0 } else { cpu + 1 };
        (cpu, Self { next_cpu, ..self })
    }

    /// Places one rotated worker.
    #[must_use]
    pub fn place(self, policy: &PlacementPolicy) -> (Placement, Self) {
        let (cpu, next) = self.advance();
        if !policy.pins() {
            return (Placement::unpinned(), next);
        }
        let priority = if cpu == 0 {
            PriorityClass::Low
        } else {
            PriorityClass::Medium
        };
        (Placement::pinned(vec![cpu], priority), next)
    }
}

/// Placement of a role worker (receive, decode, output).
#[must_use]
pub fn role_placement(policy: &PlacementPolicy, role_set: &[usize]) -> Placement {
    if !policy.pins() {
        return Placement::unpinned();
    }
    let cpus = if role_set.is_empty() {
        vec![0]
    } else {
        role_set.to_vec()
    };
    Placement::pinned(cpus, PriorityClass::Medium)
}

/// The first `n` CPUs of the rotation for `cpu_count`.
#[must_use]
pub fn cpu_sequence(cpu_count: usize, n: usize) -> Vec<usize> {
    let mut state = PlacementState::new(cpu_count);
    (0..n)
        .map(|_| {
            let (cpu, next) = state.advance();
            state = next;
            cpu
        })
        .collect()
}
