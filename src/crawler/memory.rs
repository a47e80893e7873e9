use sysinfo::{Pid, System};

const MB: u64 = 1024 * 1024;

/// Source of resident memory readings.
pub trait MemorySampler {
    /// Resident set size of the running process in bytes, if it can be read.
    fn resident_bytes(&mut self) -> Option<u64>;
}

/// Reads the current process RSS through `sysinfo`.
pub struct ProcessMemory {
    system: System,
    pid: Option<Pid>,
}

impl ProcessMemory {
    pub fn new() -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(e) => {
                log::warn!("[memory] cannot resolve current pid: {}", e);
                None
            }
        };
        Self {
            system: System::new(),
            pid,
        }
    }
}

impl Default for ProcessMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySampler for ProcessMemory {
    fn resident_bytes(&mut self) -> Option<u64> {
        let pid = self.pid?;
        if !self.system.refresh_process(pid) {
            return None;
        }
        self.system.process(pid).map(|process| process.memory())
    }
}

/// One checkpoint reading together with the peak seen so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemorySample {
    pub current_bytes: u64,
    pub peak_bytes: u64,
}

impl MemorySample {
    pub fn current_mb(&self) -> u64 {
        self.current_bytes / MB
    }

    pub fn peak_mb(&self) -> u64 {
        self.peak_bytes / MB
    }
}

/// New running peak after observing `sample`.
pub fn next_peak(peak: u64, sample: u64) -> u64 {
    peak.max(sample)
}

/// Explicit peak accumulator threaded through the dispatcher. Advisory only:
/// nothing is throttled on its readings.
pub struct MemoryMonitor<S> {
    sampler: S,
    peak: u64,
}

impl<S: MemorySampler> MemoryMonitor<S> {
    pub fn new(sampler: S) -> Self {
        Self { sampler, peak: 0 }
    }

    /// Take a reading and fold it into the peak. An unreadable sample counts as 0.
    pub fn checkpoint(&mut self) -> MemorySample {
        let current = self.sampler.resident_bytes().unwrap_or(0);
        self.peak = next_peak(self.peak, current);
        MemorySample {
            current_bytes: current,
            peak_bytes: self.peak,
        }
    }

    pub fn peak_bytes(&self) -> u64 {
        self.peak
    }

    pub fn peak_mb(&self) -> u64 {
        self.peak / MB
    }
}
