use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use rand::Rng;

/// Policy used to choose which worker handles the next job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchStrategy {
    /// Strict cyclic order, independent of load
    #[default]
    RoundRobin,
    /// Uniform pick, no state
    Random,
    /// Fewest in-flight jobs, lowest index on ties
    LeastBusy,
}

impl DispatchStrategy {
    /// Parses a strategy name. Unknown names fall back to `LeastBusy`.
    pub fn from_name(name: &str) -> Self {
        Self::parse_known(name).unwrap_or(DispatchStrategy::LeastBusy)
    }

    /// Parses a strategy name, returning `None` for unknown names.
    pub fn parse_known(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "roundrobin" => Some(DispatchStrategy::RoundRobin),
            "random" => Some(DispatchStrategy::Random),
            "leastbusy" => Some(DispatchStrategy::LeastBusy),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DispatchStrategy::RoundRobin => "roundrobin",
            DispatchStrategy::Random => "random",
            DispatchStrategy::LeastBusy => "leastbusy",
        }
    }
}

impl fmt::Display for DispatchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Strategy plus the state it needs between selections.
#[derive(Debug)]
pub struct Selector {
    strategy: DispatchStrategy,
    cursor: AtomicUsize,
}

impl Selector {
    pub fn new(strategy: DispatchStrategy) -> Self {
        Self {
            strategy,
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn strategy(&self) -> DispatchStrategy {
        self.strategy
    }

    /// Picks a worker index given each worker's in-flight count.
    ///
    /// `in_flight.len()` is the worker count; an empty slice yields 0.
    pub fn select(&self, in_flight: &[usize]) -> usize {
        let workers = in_flight.len();
        if workers <= 1 {
            return 0;
        }

        match self.strategy {
            DispatchStrategy::RoundRobin => self.next_in_cycle(workers),
            DispatchStrategy::Random => rand::thread_rng().gen_range(0..workers),
            DispatchStrategy::LeastBusy => least_busy(in_flight),
        }
    }

    fn next_in_cycle(&self, workers: usize) -> usize {
        let advance = |cursor: usize| Some((cursor + 1) % workers);
        match self.cursor.fetch_update(Ordering::AcqRel, Ordering::Acquire, advance) {
            Ok(previous) | Err(previous) => previous % workers,
        }
    }
}

/// Index of the first minimum in `in_flight`.
fn least_busy(in_flight: &[usize]) -> usize {
    let mut best = 0;
    for (i, &load) in in_flight.iter().enumerate().skip(1) {
        if load < in_flight[best] {
            best = i;
        }
    }
    best
}
