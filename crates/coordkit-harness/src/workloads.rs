//! Multi-threaded workloads, one per [`ScenarioKind`].
//!
//! Every blocking call is bounded by [`STALL_TIMEOUT`], so a lost wakeup
//! shows up as a `stalled` failure instead of a hung campaign. Each workload
//! checks the invariant of its primitive after all threads have joined and
//! reports the first violation as a [`Failure`] with a stable marker.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use coordkit_core::{
    ConditionId, CyclicBarrier, Exchanger, Latch, Monitor, Phaser, ResourcePool, Semaphore,
    SlotChannel, SyncError, Wait,
};
use serde_json::json;

use crate::scenarios::{ScenarioCase, ScenarioKind};

/// Upper bound on any single blocking call inside a workload.
pub const STALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Knobs resolved from the campaign config and the case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkloadParams {
    pub rounds: u32,
    pub hold_max: Duration,
    pub seed: u64,
}

/// First invariant violation a workload observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub marker: &'static str,
    pub detail: String,
}

impl Failure {
    #[must_use]
    pub fn new(marker: &'static str, detail: impl Into<String>) -> Self {
        Self {
            marker,
            detail: detail.into(),
        }
    }
}

/// Result of one workload run.
#[derive(Debug, Clone)]
pub struct WorkloadOutcome {
    pub op_counts: BTreeMap<String, u64>,
    pub failure: Option<Failure>,
    pub details: serde_json::Value,
}

/// Deterministic xorshift64* generator for hold times.
#[derive(Debug, Clone)]
pub struct SeededRng(u64);

impl SeededRng {
    #[must_use]
    pub fn new(seed: u64) -> Self {
        // xorshift has a fixed point at zero.
        Self(if seed == 0 { 0x9E37_79B9_7F4A_7C15 } else { seed })
    }

    /// Independent stream for worker `stream`.
    #[must_use]
    pub fn fork(&self, stream: u64) -> Self {
        Self::new(self.0 ^ (stream + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15))
    }

    pub fn next_u64(&mut self) -> u64 {
        self.0 ^= self.0 >> 12;
        self.0 ^= self.0 << 25;
        self.0 ^= self.0 >> 27;
        self.0.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    /// Uniform in `0..=max`, at microsecond resolution.
    pub fn hold(&mut self, max: Duration) -> Duration {
        let max_us = u64::try_from(max.as_micros()).unwrap_or(u64::MAX);
        if max_us == 0 {
            return Duration::ZERO;
        }
        Duration::from_micros(self.next_u64() % max_us.saturating_add(1))
    }
}

#[derive(Debug, Default)]
struct Tally(BTreeMap<&'static str, u64>);

impl Tally {
    fn bump(&mut self, op: &'static str) {
        *self.0.entry(op).or_default() += 1;
    }

    fn merge(&mut self, other: Tally) {
        for (op, n) in other.0 {
            *self.0.entry(op).or_default() += n;
        }
    }

    fn into_counts(self) -> BTreeMap<String, u64> {
        self.0.into_iter().map(|(op, n)| (op.to_string(), n)).collect()
    }
}

type WorkerResult<T> = Result<(T, Tally), Failure>;

fn sync_failure(op: &str, err: &SyncError) -> Failure {
    let marker = match err {
        SyncError::Timeout => "stalled",
        SyncError::Interrupted => "interrupted",
        SyncError::BrokenBarrier => "barrier_broken",
        _ => "unexpected_error",
    };
    Failure::new(marker, format!("{op}: {err}"))
}

/// Join every handle, merging tallies; reports the first failure seen.
fn join_all<T>(handles: Vec<JoinHandle<WorkerResult<T>>>, tally: &mut Tally) -> Result<Vec<T>, Failure> {
    let mut values = Vec::with_capacity(handles.len());
    let mut first_failure = None;
    for handle in handles {
        match handle.join() {
            Ok(Ok((value, local))) => {
                tally.merge(local);
                values.push(value);
            }
            Ok(Err(failure)) => {
                first_failure.get_or_insert(failure);
            }
            Err(_) => {
                first_failure.get_or_insert(Failure::new(
                    "worker_panicked",
                    "a workload thread panicked",
                ));
            }
        }
    }
    match first_failure {
        Some(failure) => Err(failure),
        None => Ok(values),
    }
}

/// Run the workload for `case`.
#[must_use]
pub fn run_workload(case: &ScenarioCase, params: &WorkloadParams) -> WorkloadOutcome {
    let mut tally = Tally::default();
    let result = match case.kind {
        ScenarioKind::Handoff => handoff(case, params, &mut tally),
        ScenarioKind::PoolContention => pool_contention(case, params, &mut tally),
        ScenarioKind::LatchStartGate => latch_start_gate(case, params, &mut tally),
        ScenarioKind::BarrierWaves => barrier_waves(case, params, &mut tally),
        ScenarioKind::PhaserRounds => phaser_rounds(case, params, &mut tally),
        ScenarioKind::ExchangerSwap => exchanger_swap(case, params, &mut tally),
        ScenarioKind::SemaphoreThrottle => semaphore_throttle(case, params, &mut tally),
        ScenarioKind::PhaserLateJoin => phaser_late_join(case, params, &mut tally),
        ScenarioKind::RwPublish => rw_publish(case, params, &mut tally),
        ScenarioKind::SharedCounter => shared_counter(case, params, &mut tally),
    };
    let (failure, details) = match result {
        Ok(details) => (None, details),
        Err(failure) => (Some(failure), serde_json::Value::Null),
    };
    WorkloadOutcome {
        op_counts: tally.into_counts(),
        failure,
        details,
    }
}

fn handoff(
    case: &ScenarioCase,
    params: &WorkloadParams,
    tally: &mut Tally,
) -> Result<serde_json::Value, Failure> {
    let pairs = case.workers;
    let per_producer = u64::from(params.rounds);
    let channel = Arc::new(SlotChannel::with_capacity(case.resources));
    let base = SeededRng::new(params.seed);

    let producers: Vec<_> = (0..pairs as u64)
        .map(|p| {
            let channel = Arc::clone(&channel);
            let mut rng = base.fork(p);
            let hold_max = params.hold_max;
            thread::spawn(move || -> WorkerResult<()> {
                let mut local = Tally::default();
                for i in 0..per_producer {
                    channel
                        .put_timeout(p * per_producer + i, STALL_TIMEOUT)
                        .map_err(|rejected| sync_failure("put", rejected.error()))?;
                    local.bump("put");
                    thread::sleep(rng.hold(hold_max));
                }
                Ok(((), local))
            })
        })
        .collect();
    let consumers: Vec<_> = (0..pairs)
        .map(|_| {
            let channel = Arc::clone(&channel);
            thread::spawn(move || -> WorkerResult<Vec<u64>> {
                let mut local = Tally::default();
                let mut taken = Vec::new();
                for _ in 0..per_producer {
                    let value = channel
                        .take_timeout(STALL_TIMEOUT)
                        .map_err(|err| sync_failure("take", &err))?;
                    local.bump("take");
                    taken.push(value);
                }
                Ok((taken, local))
            })
        })
        .collect();

    let produced = join_all(producers, tally);
    let consumed = join_all(consumers, tally);
    produced?;
    let streams = consumed?;

    let expected = pairs as u64 * per_producer;
    let mut seen = BTreeSet::new();
    for value in streams.iter().flatten() {
        if !seen.insert(*value) {
            return Err(Failure::new(
                "duplicate_delivery",
                format!("value {value} taken twice"),
            ));
        }
    }
    if seen.len() as u64 != expected {
        return Err(Failure::new(
            "lost_value",
            format!("{} of {expected} values delivered", seen.len()),
        ));
    }
    if pairs == 1 && !streams[0].windows(2).all(|w| w[0] < w[1]) {
        return Err(Failure::new(
            "fifo_violation",
            "single consumer saw values out of put order",
        ));
    }
    if !channel.is_empty() {
        return Err(Failure::new("lost_value", "values left in the channel"));
    }
    Ok(json!({
        "pairs": pairs,
        "capacity": case.resources,
        "delivered": expected,
    }))
}

fn pool_contention(
    case: &ScenarioCase,
    params: &WorkloadParams,
    tally: &mut Tally,
) -> Result<serde_json::Value, Failure> {
    let size = case.resources;
    let pool = Arc::new(ResourcePool::new((0..size).map(|i| format!("Item{i}"))));
    let holders = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let base = SeededRng::new(params.seed);

    let workers: Vec<_> = (0..case.workers as u64)
        .map(|w| {
            let pool = Arc::clone(&pool);
            let holders = Arc::clone(&holders);
            let peak = Arc::clone(&peak);
            let mut rng = base.fork(w);
            let (rounds, hold_max) = (params.rounds, params.hold_max);
            thread::spawn(move || -> WorkerResult<()> {
                let mut local = Tally::default();
                let wait = Wait::timeout(STALL_TIMEOUT);
                for _ in 0..rounds {
                    let lease = pool
                        .lease_with(&wait)
                        .map_err(|err| sync_failure("acquire", &err))?;
                    local.bump("acquire");
                    let now = holders.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(rng.hold(hold_max));
                    holders.fetch_sub(1, Ordering::SeqCst);
                    drop(lease);
                    local.bump("release");
                }
                Ok(((), local))
            })
        })
        .collect();
    join_all(workers, tally)?;

    let peak = peak.load(Ordering::SeqCst);
    if peak > size {
        return Err(Failure::new(
            "pool_oversubscribed",
            format!("{peak} concurrent holders of a {size}-item pool"),
        ));
    }
    if pool.available() != size || pool.in_use() != 0 {
        return Err(Failure::new(
            "token_leak",
            format!("{} of {size} items available after run", pool.available()),
        ));
    }
    Ok(json!({ "size": size, "workers": case.workers, "peak_holders": peak }))
}

fn latch_start_gate(
    case: &ScenarioCase,
    params: &WorkloadParams,
    tally: &mut Tally,
) -> Result<serde_json::Value, Failure> {
    let workers = case.workers;
    let mut rng = SeededRng::new(params.seed);

    for round in 0..params.rounds {
        let start = Arc::new(Latch::new(1));
        let done = Arc::new(Latch::new(workers));
        let opened = Arc::new(AtomicBool::new(false));

        let handles: Vec<_> = (0..workers as u64)
            .map(|w| {
                let start = Arc::clone(&start);
                let done = Arc::clone(&done);
                let opened = Arc::clone(&opened);
                let mut worker_rng = rng.fork(w);
                let hold_max = params.hold_max;
                thread::spawn(move || -> WorkerResult<()> {
                    let mut local = Tally::default();
                    start
                        .wait_timeout(STALL_TIMEOUT)
                        .map_err(|err| sync_failure("wait", &err))?;
                    local.bump("wait");
                    if !opened.load(Ordering::SeqCst) {
                        return Err(Failure::new(
                            "early_release",
                            format!("worker passed the start gate before it opened in round {round}"),
                        ));
                    }
                    thread::sleep(worker_rng.hold(hold_max));
                    done.count_down();
                    local.bump("count_down");
                    Ok(((), local))
                })
            })
            .collect();

        thread::sleep(rng.hold(params.hold_max));
        opened.store(true, Ordering::SeqCst);
        start.count_down();
        tally.bump("count_down");
        let finished = done.wait_timeout(STALL_TIMEOUT);
        tally.bump("wait");
        join_all(handles, tally)?;
        finished.map_err(|err| sync_failure("wait", &err))?;
        if done.count() != 0 {
            return Err(Failure::new(
                "latch_not_open",
                format!("done latch still at {} after release", done.count()),
            ));
        }
    }
    Ok(json!({ "workers": workers, "gates": params.rounds }))
}

fn barrier_waves(
    case: &ScenarioCase,
    params: &WorkloadParams,
    tally: &mut Tally,
) -> Result<serde_json::Value, Failure> {
    let parties = case.workers;
    let waves = params.rounds;
    let trips = Arc::new(AtomicU64::new(0));
    let barrier = {
        let trips = Arc::clone(&trips);
        Arc::new(CyclicBarrier::with_action(parties, move || {
            trips.fetch_add(1, Ordering::SeqCst);
        }))
    };
    let base = SeededRng::new(params.seed);

    let handles: Vec<_> = (0..parties as u64)
        .map(|p| {
            let barrier = Arc::clone(&barrier);
            let mut rng = base.fork(p);
            let hold_max = params.hold_max;
            thread::spawn(move || -> WorkerResult<Vec<usize>> {
                let mut local = Tally::default();
                let mut indices = Vec::new();
                for _ in 0..waves {
                    thread::sleep(rng.hold(hold_max));
                    let index = barrier
                        .wait_timeout(STALL_TIMEOUT)
                        .map_err(|err| sync_failure("wait", &err))?;
                    local.bump("wait");
                    indices.push(index);
                }
                Ok((indices, local))
            })
        })
        .collect();
    let per_party = join_all(handles, tally)?;

    let trips = trips.load(Ordering::SeqCst);
    if trips != u64::from(waves) {
        return Err(Failure::new(
            "action_count_mismatch",
            format!("action ran {trips} times over {waves} waves"),
        ));
    }
    let full: BTreeSet<usize> = (0..parties).collect();
    for wave in 0..waves as usize {
        let indices: BTreeSet<usize> = per_party.iter().map(|run| run[wave]).collect();
        if indices != full {
            return Err(Failure::new(
                "index_set_mismatch",
                format!("wave {wave} returned indices {indices:?}"),
            ));
        }
    }
    if barrier.is_broken() {
        return Err(Failure::new("barrier_broken", "barrier broken after clean run"));
    }
    Ok(json!({ "parties": parties, "waves": waves, "generation": barrier.generation() }))
}

fn phaser_rounds(
    case: &ScenarioCase,
    params: &WorkloadParams,
    tally: &mut Tally,
) -> Result<serde_json::Value, Failure> {
    let workers = case.workers;
    let rounds = u64::from(params.rounds);
    let phaser = Arc::new(Phaser::new(1));
    phaser.bulk_register(workers);
    tally.bump("register");
    let base = SeededRng::new(params.seed);

    let handles: Vec<_> = (0..workers as u64)
        .map(|w| {
            let phaser = Arc::clone(&phaser);
            let mut rng = base.fork(w);
            let hold_max = params.hold_max;
            thread::spawn(move || -> WorkerResult<Vec<u64>> {
                let mut local = Tally::default();
                let wait = Wait::timeout(STALL_TIMEOUT);
                let mut phases = Vec::new();
                for _ in 0..rounds {
                    thread::sleep(rng.hold(hold_max));
                    let arrived_at = phaser.arrive().map_err(|err| sync_failure("arrive", &err))?;
                    local.bump("arrive");
                    let next = phaser
                        .await_advance_with(arrived_at, &wait)
                        .map_err(|err| sync_failure("await_advance", &err))?;
                    local.bump("await_advance");
                    phases.push(next);
                }
                phaser
                    .arrive_and_deregister()
                    .map_err(|err| sync_failure("deregister", &err))?;
                local.bump("deregister");
                Ok((phases, local))
            })
        })
        .collect();

    let coordinator = phaser.arrive_and_deregister();
    tally.bump("deregister");
    let per_worker = join_all(handles, tally)?;
    coordinator.map_err(|err| sync_failure("deregister", &err))?;

    let expected: Vec<u64> = (1..=rounds).collect();
    if let Some(skewed) = per_worker.iter().find(|phases| **phases != expected) {
        return Err(Failure::new(
            "phase_skew",
            format!("worker saw phases {skewed:?}"),
        ));
    }
    if phaser.registered_parties() != 0 {
        return Err(Failure::new(
            "parties_leaked",
            format!("{} parties still registered", phaser.registered_parties()),
        ));
    }
    Ok(json!({ "workers": workers, "rounds": rounds, "final_phase": phaser.phase() }))
}

fn exchanger_swap(
    case: &ScenarioCase,
    params: &WorkloadParams,
    tally: &mut Tally,
) -> Result<serde_json::Value, Failure> {
    let batch = case.resources as u64;
    let rounds = params.rounds;
    let exchanger: Arc<Exchanger<Vec<u64>>> = Arc::new(Exchanger::new());
    let rng = SeededRng::new(params.seed);
    let hold_max = params.hold_max;

    let producer = {
        let exchanger = Arc::clone(&exchanger);
        let mut rng = rng.fork(0);
        thread::spawn(move || -> WorkerResult<u64> {
            let mut local = Tally::default();
            let mut buffer = Vec::new();
            let mut next = 0u64;
            for _ in 0..rounds {
                buffer.extend(next..next + batch);
                next += batch;
                local.bump("fill");
                thread::sleep(rng.hold(hold_max));
                buffer = exchanger
                    .exchange_timeout(buffer, STALL_TIMEOUT)
                    .map_err(|rejected| sync_failure("exchange", rejected.error()))?;
                local.bump("exchange");
                if !buffer.is_empty() {
                    return Err(Failure::new(
                        "buffer_not_drained",
                        format!("producer got back {} items", buffer.len()),
                    ));
                }
            }
            Ok((next, local))
        })
    };
    let consumer = {
        let exchanger = Arc::clone(&exchanger);
        let mut rng = rng.fork(1);
        thread::spawn(move || -> WorkerResult<u64> {
            let mut local = Tally::default();
            let mut buffer = Vec::new();
            let mut expected = 0u64;
            for _ in 0..rounds {
                buffer = exchanger
                    .exchange_timeout(buffer, STALL_TIMEOUT)
                    .map_err(|rejected| sync_failure("exchange", rejected.error()))?;
                local.bump("exchange");
                for value in buffer.drain(..) {
                    if value != expected {
                        return Err(Failure::new(
                            "out_of_order",
                            format!("expected {expected}, got {value}"),
                        ));
                    }
                    expected += 1;
                }
                local.bump("drain");
                thread::sleep(rng.hold(hold_max));
            }
            Ok((expected, local))
        })
    };

    let counts = join_all(vec![producer, consumer], tally)?;
    let (produced, consumed) = (counts[0], counts[1]);
    if produced != consumed {
        return Err(Failure::new(
            "lost_value",
            format!("produced {produced}, consumed {consumed}"),
        ));
    }
    if exchanger.has_waiter() {
        return Err(Failure::new("dangling_exchange", "value left in the exchange slot"));
    }
    Ok(json!({ "rounds": rounds, "batch": batch, "transferred": consumed }))
}

fn semaphore_throttle(
    case: &ScenarioCase,
    params: &WorkloadParams,
    tally: &mut Tally,
) -> Result<serde_json::Value, Failure> {
    let permits = case.resources;
    let semaphore = Arc::new(Semaphore::new(permits));
    let inside = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let base = SeededRng::new(params.seed);

    let handles: Vec<_> = (0..case.workers as u64)
        .map(|w| {
            let semaphore = Arc::clone(&semaphore);
            let inside = Arc::clone(&inside);
            let peak = Arc::clone(&peak);
            let mut rng = base.fork(w);
            let (rounds, hold_max) = (params.rounds, params.hold_max);
            thread::spawn(move || -> WorkerResult<()> {
                let mut local = Tally::default();
                for _ in 0..rounds {
                    semaphore
                        .acquire_timeout(STALL_TIMEOUT)
                        .map_err(|err| sync_failure("acquire", &err))?;
                    local.bump("acquire");
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(rng.hold(hold_max));
                    inside.fetch_sub(1, Ordering::SeqCst);
                    semaphore.release();
                    local.bump("release");
                }
                Ok(((), local))
            })
        })
        .collect();
    join_all(handles, tally)?;

    let peak = peak.load(Ordering::SeqCst);
    if peak > permits {
        return Err(Failure::new(
            "permit_oversubscribed",
            format!("{peak} holders of {permits} permits"),
        ));
    }
    if semaphore.available_permits() != permits {
        return Err(Failure::new(
            "permit_leak",
            format!(
                "{} of {permits} permits after run",
                semaphore.available_permits()
            ),
        ));
    }
    Ok(json!({ "permits": permits, "workers": case.workers, "peak_holders": peak }))
}

fn phaser_late_join(
    case: &ScenarioCase,
    params: &WorkloadParams,
    tally: &mut Tally,
) -> Result<serde_json::Value, Failure> {
    let rounds = u64::from(params.rounds);
    let phaser = Arc::new(Phaser::new(1));
    let mut rng = SeededRng::new(params.seed);
    let mut deferred = 0usize;

    let mut handles = Vec::with_capacity(case.workers);
    for w in 0..case.workers as u64 {
        let joined = phaser.register();
        tally.bump("register");
        if joined > phaser.phase() {
            deferred += 1;
        }
        let phaser = Arc::clone(&phaser);
        let mut worker_rng = rng.fork(w);
        let hold_max = params.hold_max;
        handles.push(thread::spawn(move || -> WorkerResult<(u64, Vec<u64>)> {
            let mut local = Tally::default();
            phaser
                .await_phase_timeout(joined, STALL_TIMEOUT)
                .map_err(|err| sync_failure("await_phase", &err))?;
            local.bump("await_phase");
            let mut phases = Vec::new();
            for _ in 0..rounds {
                thread::sleep(worker_rng.hold(hold_max));
                let next = phaser
                    .arrive_and_await_advance_timeout(STALL_TIMEOUT)
                    .map_err(|err| sync_failure("arrive_and_await_advance", &err))?;
                local.bump("arrive");
                phases.push(next);
            }
            phaser
                .arrive_and_deregister()
                .map_err(|err| sync_failure("deregister", &err))?;
            local.bump("deregister");
            Ok(((joined, phases), local))
        }));
        thread::sleep(rng.hold(params.hold_max));
    }

    let coordinator = phaser.arrive_and_deregister();
    tally.bump("deregister");
    let per_worker = join_all(handles, tally)?;
    coordinator.map_err(|err| sync_failure("deregister", &err))?;

    for (joined, phases) in &per_worker {
        let expected: Vec<u64> = (joined + 1..=joined + rounds).collect();
        if *phases != expected {
            return Err(Failure::new(
                "phase_skew",
                format!("worker admitted to phase {joined} saw phases {phases:?}"),
            ));
        }
    }
    if phaser.registered_parties() != 0 {
        return Err(Failure::new(
            "parties_leaked",
            format!("{} parties still registered", phaser.registered_parties()),
        ));
    }
    Ok(json!({
        "workers": case.workers,
        "rounds": rounds,
        "deferred": deferred,
        "final_phase": phaser.phase(),
    }))
}

const LIST_GREW: ConditionId = ConditionId::new(0);

fn rw_publish(
    case: &ScenarioCase,
    params: &WorkloadParams,
    tally: &mut Tally,
) -> Result<serde_json::Value, Failure> {
    let items = params.rounds as usize;
    let list: Arc<Monitor<Vec<u64>>> = Arc::new(Monitor::new(Vec::new()));

    let writer = {
        let list = Arc::clone(&list);
        let mut rng = SeededRng::new(params.seed);
        let hold_max = params.hold_max;
        thread::spawn(move || -> WorkerResult<usize> {
            let mut local = Tally::default();
            for i in 0..items as u64 {
                list.lock().push(i);
                list.signal_all(LIST_GREW);
                local.bump("write");
                thread::sleep(rng.hold(hold_max));
            }
            Ok((items, local))
        })
    };
    let readers: Vec<_> = (0..case.workers)
        .map(|_| {
            let list = Arc::clone(&list);
            thread::spawn(move || -> WorkerResult<usize> {
                let mut local = Tally::default();
                let wait = Wait::timeout(STALL_TIMEOUT);
                for want in 1..=items {
                    let mut guard = list.lock();
                    list.wait_until(&mut guard, LIST_GREW, &wait, |l| l.len() >= want)
                        .map_err(|err| sync_failure("read", &err))?;
                    local.bump("read");
                    let torn = guard[..want]
                        .iter()
                        .enumerate()
                        .find(|(at, value)| **value != *at as u64);
                    if let Some((at, value)) = torn {
                        return Err(Failure::new(
                            "torn_read",
                            format!("reader saw {value} at position {at}"),
                        ));
                    }
                }
                let seen = list.lock().len();
                Ok((seen, local))
            })
        })
        .collect();

    let written = join_all(vec![writer], tally);
    let seen = join_all(readers, tally)?;
    written?;
    if let Some(short) = seen.iter().find(|len| **len != items) {
        return Err(Failure::new(
            "lost_value",
            format!("reader finished with {short} of {items} items"),
        ));
    }
    Ok(json!({ "readers": case.workers, "items": items }))
}

const COUNTER_ROUNDS_FACTOR: u64 = 10;

fn shared_counter(
    case: &ScenarioCase,
    params: &WorkloadParams,
    tally: &mut Tally,
) -> Result<serde_json::Value, Failure> {
    let draws = u64::from(params.rounds) * COUNTER_ROUNDS_FACTOR;
    let counter = Arc::new(Monitor::new(0_u64));

    let handles: Vec<_> = (0..case.workers)
        .map(|_| {
            let counter = Arc::clone(&counter);
            thread::spawn(move || -> WorkerResult<Vec<u64>> {
                let mut local = Tally::default();
                let mut drawn = Vec::new();
                for _ in 0..draws {
                    let mut value = counter.lock();
                    *value += 1;
                    drawn.push(*value);
                    drop(value);
                    local.bump("next");
                }
                Ok((drawn, local))
            })
        })
        .collect();
    let per_worker = join_all(handles, tally)?;

    let total = case.workers as u64 * draws;
    let mut seen = BTreeSet::new();
    for value in per_worker.iter().flatten() {
        if !seen.insert(*value) {
            return Err(Failure::new(
                "duplicate_delivery",
                format!("counter value {value} handed out twice"),
            ));
        }
    }
    if seen.len() as u64 != total || seen.last().copied() != Some(total) {
        return Err(Failure::new(
            "lost_update",
            format!("{} distinct values for {total} increments", seen.len()),
        ));
    }
    if let Some(unordered) = per_worker.iter().find(|d| !d.windows(2).all(|w| w[0] < w[1])) {
        return Err(Failure::new(
            "counter_went_backwards",
            format!("worker drew {:?}", &unordered[..unordered.len().min(8)]),
        ));
    }
    let final_value = *counter.lock();
    if final_value != total {
        return Err(Failure::new(
            "lost_update",
            format!("counter ended at {final_value}, expected {total}"),
        ));
    }
    Ok(json!({ "workers": case.workers, "increments": total }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick(rounds: u32) -> WorkloadParams {
        WorkloadParams {
            rounds,
            hold_max: Duration::from_micros(200),
            seed: 0xC0DE_0001,
        }
    }

    #[test]
    fn seeded_rng_is_reproducible() {
        let mut a = SeededRng::new(42);
        let mut b = SeededRng::new(42);
        let xs: Vec<u64> = (0..8).map(|_| a.next_u64()).collect();
        let ys: Vec<u64> = (0..8).map(|_| b.next_u64()).collect();
        assert_eq!(xs, ys);
        assert_ne!(SeededRng::new(42).fork(0).next_u64(), SeededRng::new(42).fork(1).next_u64());
    }

    #[test]
    fn hold_respects_bound() {
        let mut rng = SeededRng::new(0);
        let max = Duration::from_micros(50);
        assert!((0..100).all(|_| rng.hold(max) <= max));
        assert_eq!(rng.hold(Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn every_kind_passes_a_small_run() {
        for kind in ScenarioKind::ALL {
            let case = ScenarioCase::new(kind.as_str(), kind, 3, 2);
            let outcome = run_workload(&case, &quick(5));
            assert_eq!(outcome.failure, None, "{} failed", kind.as_str());
            assert!(!outcome.op_counts.is_empty());
        }
    }

    #[test]
    fn handoff_counts_every_operation() {
        let case = ScenarioCase::new("h", ScenarioKind::Handoff, 2, 1);
        let outcome = run_workload(&case, &quick(10));
        assert_eq!(outcome.op_counts["put"], 20);
        assert_eq!(outcome.op_counts["take"], 20);
        assert_eq!(outcome.details["delivered"], 20);
    }

    #[test]
    fn late_joiners_see_consecutive_phases() {
        let case = ScenarioCase::new("late", ScenarioKind::PhaserLateJoin, 5, 1);
        let outcome = run_workload(&case, &quick(4));
        assert_eq!(outcome.failure, None);
        assert_eq!(outcome.op_counts["register"], 5);
        assert_eq!(outcome.op_counts["arrive"], 20);
        assert_eq!(outcome.op_counts["deregister"], 6);
    }

    #[test]
    fn readers_observe_every_published_item() {
        let case = ScenarioCase::new("rw", ScenarioKind::RwPublish, 3, 1);
        let outcome = run_workload(&case, &quick(6));
        assert_eq!(outcome.failure, None);
        assert_eq!(outcome.op_counts["write"], 6);
        assert_eq!(outcome.op_counts["read"], 18);
    }

    #[test]
    fn shared_counter_hands_out_each_value_once() {
        let case = ScenarioCase::new("counter", ScenarioKind::SharedCounter, 4, 1);
        let outcome = run_workload(&case, &quick(3));
        assert_eq!(outcome.failure, None);
        assert_eq!(outcome.op_counts["next"], 4 * 3 * COUNTER_ROUNDS_FACTOR);
        assert_eq!(outcome.details["increments"], 4 * 3 * COUNTER_ROUNDS_FACTOR);
    }

    #[test]
    fn sync_errors_map_to_markers() {
        assert_eq!(sync_failure("take", &SyncError::Timeout).marker, "stalled");
        assert_eq!(
            sync_failure("wait", &SyncError::BrokenBarrier).marker,
            "barrier_broken"
        );
    }
}
