//! Optional per-render statistics.

use std::time::Duration;

use log::trace;
use sysinfo::{Pid, ProcessesToUpdate, System};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderStats {
    pub frames_rendered: usize,
    pub elapsed: Duration,
    /// Time spent on each frame, in render order.
    pub per_frame: Vec<(i32, Duration)>,
    pub peak_memory_bytes: Option<u64>,
}

impl RenderStats {
    pub fn record_frame(&mut self, frame: i32, took: Duration) {
        self.frames_rendered += 1;
        self.per_frame.push((frame, took));
    }

    pub fn average_frame_time(&self) -> Option<Duration> {
        if self.per_frame.is_empty() {
            return None;
        }
        let total: Duration = self.per_frame.iter().map(|(_, d)| *d).sum();
        Some(total / self.per_frame.len() as u32)
    }

    pub fn slowest_frame(&self) -> Option<(i32, Duration)> {
        self.per_frame.iter().copied().max_by_key(|(_, d)| *d)
    }
}

/// Tracks the resident memory peak of one process.
pub struct MemorySampler {
    system: System,
    pid: Pid,
    peak: Option<u64>,
}

impl MemorySampler {
    pub fn current_process() -> Option<Self> {
        sysinfo::get_current_pid().ok().map(Self::for_pid)
    }

    pub fn child(pid: u32) -> Self {
        Self::for_pid(Pid::from_u32(pid))
    }

    fn for_pid(pid: Pid) -> Self {
        Self {
            system: System::new(),
            pid,
            peak: None,
        }
    }

    pub fn sample(&mut self) {
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[self.pid]), true);
        if let Some(process) = self.system.process(self.pid) {
            let memory = process.memory();
            trace!("MemorySampler: pid {} at {} bytes", self.pid, memory);
            self.peak = Some(self.peak.map_or(memory, |peak| peak.max(memory)));
        }
    }

    pub fn peak(&self) -> Option<u64> {
        self.peak
    }
}
