//! Process memory probe.

use parking_lot::Mutex;
use serde::Serialize;
use sysinfo::{get_current_pid, Pid, ProcessRefreshKind, ProcessesToUpdate, System};

/// Point-in-time memory reading.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct MemorySnapshot {
    /// Resident set size of this process
    pub process_rss_bytes: u64,
    /// Virtual memory of this process
    pub process_virtual_bytes: u64,
    /// Bytes the process RSS is measured against
    pub budget_bytes: u64,
    pub system_total_bytes: u64,
    pub system_available_bytes: u64,
    /// 0..1, process RSS over the budget
    pub pressure: f64,
}

/// Source of process memory pressure.
pub trait MemoryProbe: Send + Sync {
    fn snapshot(&self) -> MemorySnapshot;
}

/// Share of `budget` taken by `used`, clamped to 0..1. A zero budget reads as no pressure.
pub fn pressure_ratio(used: u64, budget: u64) -> f64 {
    if budget == 0 {
        return 0.0;
    }
    (used as f64 / budget as f64).clamp(0.0, 1.0)
}

/// Reads this process's memory through sysinfo, reusing one `System` instance.
///
/// Pressure is the process RSS over the configured budget, or over total
/// system memory when no budget is set. Memory held by other processes on
/// the host does not count.
pub struct SysinfoProbe {
    pid: Option<Pid>,
    budget_bytes: Option<u64>,
    system: Mutex<System>,
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new(None)
    }
}

impl SysinfoProbe {
    pub fn new(budget_bytes: Option<u64>) -> Self {
        Self {
            pid: get_current_pid().ok(),
            budget_bytes: budget_bytes.filter(|b| *b > 0),
            system: Mutex::new(System::new()),
        }
    }
}

impl MemoryProbe for SysinfoProbe {
    fn snapshot(&self) -> MemorySnapshot {
        let mut system = self.system.lock();
        system.refresh_memory();

        let (rss, virt) = match self.pid {
            Some(pid) => {
                system.refresh_processes_specifics(
                    ProcessesToUpdate::Some(&[pid]),
                    true,
                    ProcessRefreshKind::nothing().with_memory(),
                );
                system
                    .process(pid)
                    .map(|p| (p.memory(), p.virtual_memory()))
                    .unwrap_or((0, 0))
            }
            None => (0, 0),
        };

        let total = system.total_memory();
        let budget = self.budget_bytes.unwrap_or(total);

        MemorySnapshot {
            process_rss_bytes: rss,
            process_virtual_bytes: virt,
            budget_bytes: budget,
            system_total_bytes: total,
            system_available_bytes: system.available_memory(),
            pressure: pressure_ratio(rss, budget),
        }
    }
}

/// Probe that always reports the same pressure.
#[derive(Debug, Clone, Copy)]
pub struct FixedProbe(pub f64);

impl MemoryProbe for FixedProbe {
    fn snapshot(&self) -> MemorySnapshot {
        MemorySnapshot {
            pressure: self.0,
            ..MemorySnapshot::default()
        }
    }
}
