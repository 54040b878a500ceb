// Loss of precision is allowable in this module's use cases.
#![allow(clippy::cast_precision_loss)]

use std::time::{Duration, Instant};

use bytesize::ByteSize;
use humantime::format_duration;
use log::{debug, error, info};
use serde_derive::Serialize;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

/// Minimum time between two memory polls.
const REFRESH_INTERVAL: Duration = Duration::from_secs(1);

/// Resource use of a whole run. Per-trajectory figures are zero when no trajectory was simulated.
#[derive(Serialize)]
pub struct ExecutionStatistics {
    pub max_memory_usage: u64,
    pub cpu_time: Duration,
    pub wall_time: Duration,

    /// Trajectories simulated, discarded ones included.
    pub trajectories: u64,
    pub cpu_time_per_trajectory: Duration,
    pub wall_time_per_trajectory: Duration,
}

pub struct ExecutionProfilingCollector {
    start_time: Instant,
    last_refresh: Instant,
    /// Accumulated CPU time of the process at start, in CPU-milliseconds.
    start_cpu_time: u64,
    /// Largest resident memory seen so far.
    max_memory_usage: u64,
    system: System,
    /// `None` where `sysinfo` cannot see the current process.
    process_id: Option<Pid>,
}

impl Default for ExecutionProfilingCollector {
    fn default() -> Self {
        ExecutionProfilingCollector::new()
    }
}

impl ExecutionProfilingCollector {
    #[must_use]
    pub fn new() -> ExecutionProfilingCollector {
        let process_id = sysinfo::get_current_pid().ok();
        let now = Instant::now();
        let mut collector = ExecutionProfilingCollector {
            start_time: now,
            last_refresh: now,
            start_cpu_time: 0,
            max_memory_usage: 0,
            system: System::new(),
            process_id,
        };
        if let Some(pid) = process_id {
            debug!("profiling process {pid}");
            collector.update_system_info(ProcessRefreshKind::nothing().with_cpu().with_memory());
            if let Some(process) = collector.system.process(pid) {
                collector.max_memory_usage = process.memory();
                collector.start_cpu_time = process.accumulated_cpu_time();
            }
        }
        collector
    }

    /// Polls memory use if `REFRESH_INTERVAL` has passed since the last poll. Cheap enough to
    /// call between trajectories.
    pub fn refresh(&mut self) {
        if self.last_refresh.elapsed() >= REFRESH_INTERVAL {
            self.poll_memory();
            self.last_refresh = Instant::now();
        }
    }

    fn poll_memory(&mut self) {
        self.update_system_info(ProcessRefreshKind::nothing().with_memory());
        if let Some(process) = self.process_id.and_then(|pid| self.system.process(pid)) {
            self.max_memory_usage = self.max_memory_usage.max(process.memory());
        }
    }

    fn update_system_info(&mut self, process_refresh_kind: ProcessRefreshKind) {
        if let Some(pid) = self.process_id {
            if self.system.refresh_processes_specifics(
                ProcessesToUpdate::Some(&[pid]),
                true,
                process_refresh_kind,
            ) < 1
            {
                error!("could not refresh process statistics");
            }
        }
    }

    pub fn compute_final_statistics(&mut self, trajectories: u64) -> ExecutionStatistics {
        self.update_system_info(ProcessRefreshKind::nothing().with_cpu().with_memory());
        let mut cpu_time_millis = 0;
        if let Some(process) = self.process_id.and_then(|pid| self.system.process(pid)) {
            self.max_memory_usage = self.max_memory_usage.max(process.memory());
            cpu_time_millis = process
                .accumulated_cpu_time()
                .saturating_sub(self.start_cpu_time);
        }
        let cpu_time = Duration::from_millis(cpu_time_millis);
        let wall_time = self.start_time.elapsed();

        let (cpu_time_per_trajectory, wall_time_per_trajectory) = if trajectories > 0 {
            (
                Duration::from_secs_f64(cpu_time.as_secs_f64() / trajectories as f64),
                Duration::from_secs_f64(wall_time.as_secs_f64() / trajectories as f64),
            )
        } else {
            (Duration::ZERO, Duration::ZERO)
        };

        ExecutionStatistics {
            max_memory_usage: self.max_memory_usage,
            cpu_time,
            wall_time,
            trajectories,
            cpu_time_per_trajectory,
            wall_time_per_trajectory,
        }
    }
}

/// Prints execution statistics to the console.
pub fn print_execution_statistics(summary: &ExecutionStatistics) {
    println!("━━━━ Execution Summary ━━━━");
    if summary.max_memory_usage == 0 {
        println!("Memory and CPU statistics are not available on your platform.");
    } else {
        println!(
            "{:<28}{}",
            "Max memory usage:",
            ByteSize::b(summary.max_memory_usage)
        );
        println!("{:<28}{}", "CPU time:", format_duration(summary.cpu_time));
    }
    println!("{:<28}{}", "Wall time:", format_duration(summary.wall_time));

    if summary.trajectories > 0 {
        println!("{:<28}{}", "Trajectories:", summary.trajectories);
        if summary.max_memory_usage > 0 {
            println!(
                "{:<28}{}",
                "CPU time per trajectory:",
                format_duration(summary.cpu_time_per_trajectory)
            );
        }
        println!(
            "{:<28}{}",
            "Wall time per trajectory:",
            format_duration(summary.wall_time_per_trajectory)
        );
    }
}

/// Logs execution statistics at `info` level.
pub fn log_execution_statistics(stats: &ExecutionStatistics) {
    info!("Execution complete.");
    if stats.max_memory_usage > 0 {
        info!("Max memory usage: {}", ByteSize::b(stats.max_memory_usage));
        info!("CPU time: {}", format_duration(stats.cpu_time));
    }
    info!("Wall time: {}", format_duration(stats.wall_time));
    if stats.trajectories > 0 {
        info!(
            "{} trajectories, {} wall time each",
            stats.trajectories,
            format_duration(stats.wall_time_per_trajectory)
        );
    }
}
