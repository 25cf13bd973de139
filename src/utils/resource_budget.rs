//! Resource budget tracking and host-derived thresholds for composition builds

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use std::time::Duration;
use tracing::{debug, info};

const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * MIB;

/// Budget configuration. Every threshold left as `None` is derived from the
/// sampled host capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    /// Largest segment count merged in a single direct pass
    pub direct_max: Option<usize>,
    /// Largest segment count handled by the batched tier
    pub batched_max: Option<usize>,
    /// Batch size of the batched tier
    pub batch_size: Option<usize>,
    /// Leaf batch size of the hierarchical tier
    pub leaf_batch_size: Option<usize>,
    /// Batches between reclaim cycles in the batched tier
    pub reclaim_every_batched: Option<usize>,
    /// Leaf batches between reclaim cycles in the hierarchical tier
    pub reclaim_every_hierarchical: Option<usize>,
    /// Concurrently open probe resources before throttling
    pub handle_ceiling: Option<usize>,
    /// Live intermediate artifacts before throttling
    pub intermediate_ceiling: Option<usize>,
    /// Parallel probes within one batch
    pub probe_parallelism: Option<usize>,
    /// Cooperative pause after each reclaim request
    pub reclaim_pause_ms: u64,
    /// Available memory below which builds throttle
    pub min_available_memory_mb: u64,
    /// Resample the host on every reclaim cycle
    pub adaptive: bool,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            direct_max: None,
            batched_max: None,
            batch_size: None,
            leaf_batch_size: None,
            reclaim_every_batched: None,
            reclaim_every_hierarchical: None,
            handle_ceiling: None,
            intermediate_ceiling: None,
            probe_parallelism: None,
            reclaim_pause_ms: 50,
            min_available_memory_mb: 256,
            adaptive: true,
        }
    }
}

/// Sampled host capability. Unknown values stay `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostCapability {
    pub cpu_count: usize,
    pub total_memory_bytes: Option<u64>,
    pub available_memory_bytes: Option<u64>,
    pub open_file_limit: Option<u64>,
}

impl HostCapability {
    /// Sample the current host
    pub fn sample() -> Self {
        let (total, available) = std::fs::read_to_string("/proc/meminfo")
            .map(|text| parse_meminfo(&text))
            .unwrap_or((None, None));
        let open_file_limit = std::fs::read_to_string("/proc/self/limits")
            .ok()
            .and_then(|text| parse_open_file_limit(&text));

        Self {
            cpu_count: num_cpus::get().max(1),
            total_memory_bytes: total,
            available_memory_bytes: available,
            open_file_limit,
        }
    }

    pub fn host_class(&self) -> HostClass {
        let available = self.available_memory_bytes;
        if available.is_some_and(|bytes| bytes < GIB) || self.cpu_count <= 2 {
            HostClass::Constrained
        } else if available.is_some_and(|bytes| bytes >= 4 * GIB) && self.cpu_count >= 8 {
            HostClass::Capable
        } else {
            HostClass::Standard
        }
    }
}

/// Parse `MemTotal` and `MemAvailable` (kB) from `/proc/meminfo` text
pub fn parse_meminfo(text: &str) -> (Option<u64>, Option<u64>) {
    let field = |name: &str| {
        text.lines()
            .find(|line| line.starts_with(name))
            .and_then(|line| line.split_whitespace().nth(1))
            .and_then(|value| value.parse::<u64>().ok())
            .map(|kb| kb * 1024)
    };
    (field("MemTotal:"), field("MemAvailable:"))
}

/// Parse the soft "Max open files" limit from `/proc/self/limits` text
pub fn parse_open_file_limit(text: &str) -> Option<u64> {
    text.lines()
        .find(|line| line.starts_with("Max open files"))
        .and_then(|line| line.trim_start_matches("Max open files").split_whitespace().next())
        .and_then(|soft| soft.parse::<u64>().ok())
}

/// Coarse host tier used to scale default thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostClass {
    Constrained,
    Standard,
    Capable,
}

impl HostClass {
    fn scale(self, value: usize) -> usize {
        match self {
            HostClass::Constrained => (value / 2).max(1),
            HostClass::Standard => value,
            HostClass::Capable => value * 3 / 2,
        }
    }
}

/// Effective thresholds for one host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetThresholds {
    pub host_class: HostClass,
    pub direct_max: usize,
    pub batched_max: usize,
    pub batch_size: usize,
    pub leaf_batch_size: usize,
    pub reclaim_every_batched: usize,
    pub reclaim_every_hierarchical: usize,
    pub handle_ceiling: usize,
    pub intermediate_ceiling: usize,
    pub probe_parallelism: usize,
    pub reclaim_pause: Duration,
    pub min_available_memory: u64,
}

impl Default for BudgetThresholds {
    fn default() -> Self {
        Self {
            host_class: HostClass::Standard,
            direct_max: 20,
            batched_max: 50,
            batch_size: 10,
            leaf_batch_size: 5,
            reclaim_every_batched: 3,
            reclaim_every_hierarchical: 10,
            handle_ceiling: 64,
            intermediate_ceiling: 16,
            probe_parallelism: 4,
            reclaim_pause: Duration::from_millis(50),
            min_available_memory: 256 * MIB,
        }
    }
}

impl BudgetThresholds {
    /// Derive thresholds from host capability, then apply pinned values
    pub fn derive(capability: &HostCapability, config: &BudgetConfig) -> Self {
        let base = Self::default();
        let class = capability.host_class();

        let handle_ceiling = capability
            .open_file_limit
            .map(|limit| ((limit / 4) as usize).clamp(8, 256))
            .unwrap_or(base.handle_ceiling);
        let probe_parallelism = match class {
            HostClass::Constrained => 1,
            HostClass::Standard => capability.cpu_count.min(4),
            HostClass::Capable => capability.cpu_count.min(8),
        };

        let direct_max = config.direct_max.unwrap_or_else(|| class.scale(base.direct_max));
        let batched_max = config
            .batched_max
            .unwrap_or_else(|| class.scale(base.batched_max))
            .max(direct_max);

        Self {
            host_class: class,
            direct_max,
            batched_max,
            batch_size: config
                .batch_size
                .unwrap_or_else(|| class.scale(base.batch_size))
                .max(1),
            leaf_batch_size: config
                .leaf_batch_size
                .unwrap_or_else(|| class.scale(base.leaf_batch_size))
                .max(1),
            reclaim_every_batched: config
                .reclaim_every_batched
                .unwrap_or_else(|| class.scale(base.reclaim_every_batched))
                .max(1),
            reclaim_every_hierarchical: config
                .reclaim_every_hierarchical
                .unwrap_or_else(|| class.scale(base.reclaim_every_hierarchical))
                .max(1),
            handle_ceiling: config.handle_ceiling.unwrap_or(handle_ceiling).max(1),
            intermediate_ceiling: config
                .intermediate_ceiling
                .unwrap_or_else(|| class.scale(base.intermediate_ceiling))
                .max(2),
            probe_parallelism: config
                .probe_parallelism
                .unwrap_or(probe_parallelism)
                .max(1),
            reclaim_pause: Duration::from_millis(config.reclaim_pause_ms),
            min_available_memory: config.min_available_memory_mb * MIB,
        }
    }
}

/// Point-in-time counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetSnapshot {
    pub open_probes: usize,
    pub peak_open_probes: usize,
    pub live_intermediates: usize,
    pub peak_live_intermediates: usize,
    pub reclaim_cycles: usize,
}

type Sampler = Box<dyn Fn() -> HostCapability + Send + Sync>;
type ReclaimHook = Arc<dyn Fn() + Send + Sync>;

/// Tracks approximate resource pressure and issues throttle/reclaim hints.
///
/// Shared across builds as `Arc<ResourceBudgetManager>`; counters are
/// maintained by RAII leases so they stay correct on every exit path.
pub struct ResourceBudgetManager {
    config: BudgetConfig,
    capability: RwLock<HostCapability>,
    thresholds: RwLock<BudgetThresholds>,
    sampler: Sampler,
    open_probes: AtomicUsize,
    peak_open_probes: AtomicUsize,
    live_intermediates: AtomicUsize,
    peak_live_intermediates: AtomicUsize,
    reclaim_cycles: AtomicUsize,
    reclaim_hooks: Mutex<Vec<ReclaimHook>>,
}

impl ResourceBudgetManager {
    /// Create a manager that samples the real host
    pub fn new(config: BudgetConfig) -> Self {
        Self::with_sampler(config, Box::new(HostCapability::sample))
    }

    /// Create a manager pinned to a fixed capability
    pub fn with_capability(config: BudgetConfig, capability: HostCapability) -> Self {
        Self::with_sampler(config, Box::new(move || capability.clone()))
    }

    fn with_sampler(config: BudgetConfig, sampler: Sampler) -> Self {
        let capability = sampler();
        let thresholds = BudgetThresholds::derive(&capability, &config);
        info!(
            host_class = ?thresholds.host_class,
            cpus = capability.cpu_count,
            direct_max = thresholds.direct_max,
            batched_max = thresholds.batched_max,
            batch_size = thresholds.batch_size,
            leaf_batch_size = thresholds.leaf_batch_size,
            handle_ceiling = thresholds.handle_ceiling,
            "resource budget initialized"
        );

        Self {
            config,
            capability: RwLock::new(capability),
            thresholds: RwLock::new(thresholds),
            sampler,
            open_probes: AtomicUsize::new(0),
            peak_open_probes: AtomicUsize::new(0),
            live_intermediates: AtomicUsize::new(0),
            peak_live_intermediates: AtomicUsize::new(0),
            reclaim_cycles: AtomicUsize::new(0),
            reclaim_hooks: Mutex::new(Vec::new()),
        }
    }

    pub fn thresholds(&self) -> BudgetThresholds {
        self.thresholds.read().clone()
    }

    pub fn capability(&self) -> HostCapability {
        self.capability.read().clone()
    }

    /// Register a callback run on every reclaim cycle (e.g. cache trimming)
    pub fn add_reclaim_hook(&self, hook: impl Fn() + Send + Sync + 'static) {
        self.reclaim_hooks.lock().push(Arc::new(hook));
    }

    /// Account for one open probe resource until the lease drops
    pub fn acquire_probe(self: &Arc<Self>) -> ProbeLease {
        let now = self.open_probes.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak_open_probes.fetch_max(now, Ordering::AcqRel);
        ProbeLease {
            budget: Arc::clone(self),
        }
    }

    /// Account for one live intermediate artifact until the lease drops
    pub fn track_intermediate(self: &Arc<Self>) -> IntermediateLease {
        let now = self.live_intermediates.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak_live_intermediates.fetch_max(now, Ordering::AcqRel);
        IntermediateLease {
            budget: Arc::clone(self),
        }
    }

    pub fn open_probes(&self) -> usize {
        self.open_probes.load(Ordering::Acquire)
    }

    pub fn live_intermediates(&self) -> usize {
        self.live_intermediates.load(Ordering::Acquire)
    }

    /// True when callers should slow down before acquiring more resources
    pub fn should_throttle(&self) -> bool {
        let thresholds = self.thresholds.read();
        if self.open_probes() >= thresholds.handle_ceiling {
            return true;
        }
        if self.live_intermediates() >= thresholds.intermediate_ceiling {
            return true;
        }
        self.capability
            .read()
            .available_memory_bytes
            .is_some_and(|available| available < thresholds.min_available_memory)
    }

    /// Hint a reclamation cycle, then pause for the bounded interval.
    ///
    /// Resamples the host when adaptive, runs registered hooks, and sleeps
    /// `reclaim_pause`. Callers cancel the pause by dropping the future.
    pub async fn request_reclaim(&self) {
        let cycle = self.reclaim_cycles.fetch_add(1, Ordering::AcqRel) + 1;

        if self.config.adaptive {
            let sampled = (self.sampler)();
            let derived = BudgetThresholds::derive(&sampled, &self.config);
            if derived != *self.thresholds.read() {
                debug!(host_class = ?derived.host_class, "host capability changed, thresholds rederived");
            }
            *self.capability.write() = sampled;
            *self.thresholds.write() = derived;
        }

        let hooks: Vec<ReclaimHook> = self.reclaim_hooks.lock().clone();
        for hook in hooks {
            hook();
        }

        let pause = self.thresholds.read().reclaim_pause;
        debug!(
            cycle,
            open_probes = self.open_probes(),
            live_intermediates = self.live_intermediates(),
            pause_ms = pause.as_millis() as u64,
            "reclaim requested"
        );
        if !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
    }

    pub fn snapshot(&self) -> BudgetSnapshot {
        BudgetSnapshot {
            open_probes: self.open_probes(),
            peak_open_probes: self.peak_open_probes.load(Ordering::Acquire),
            live_intermediates: self.live_intermediates(),
            peak_live_intermediates: self.peak_live_intermediates.load(Ordering::Acquire),
            reclaim_cycles: self.reclaim_cycles.load(Ordering::Acquire),
        }
    }
}

/// Open probe resource accounting; releases on drop
#[must_use = "the probe slot is released as soon as the lease is dropped"]
pub struct ProbeLease {
    budget: Arc<ResourceBudgetManager>,
}

impl Drop for ProbeLease {
    fn drop(&mut self) {
        self.budget.open_probes.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Live intermediate accounting; releases on drop
#[must_use = "the intermediate slot is released as soon as the lease is dropped"]
pub struct IntermediateLease {
    budget: Arc<ResourceBudgetManager>,
}

impl Drop for IntermediateLease {
    fn drop(&mut self) {
        self.budget.live_intermediates.fetch_sub(1, Ordering::AcqRel);
    }
}
