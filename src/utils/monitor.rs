#[cfg(feature = "cli")]
use std::sync::Mutex;
#[cfg(feature = "cli")]
use std::time::{Duration, Instant};
#[cfg(feature = "cli")]
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

#[cfg(feature = "cli")]
#[derive(Debug, Clone)]
pub struct ProcessStats {
    pub cpu_usage: f32,
    pub memory_mb: u64,
    pub memory_percent: f32,
}

/// 單一階段花費的時間與結束時的資源用量
#[cfg(feature = "cli")]
#[derive(Debug, Clone)]
pub struct PhaseRecord {
    pub phase: String,
    pub duration: Duration,
    pub stats: Option<ProcessStats>,
}

#[cfg(feature = "cli")]
#[derive(Debug, Default)]
struct MonitorState {
    last_mark: Option<Instant>,
    peak_memory_mb: u64,
    phases: Vec<PhaseRecord>,
}

/// 記錄 extract / transform / load 各階段的 CPU、記憶體與耗時
#[cfg(feature = "cli")]
pub struct SystemMonitor {
    system: Mutex<System>,
    pid: Option<Pid>,
    started: Instant,
    state: Mutex<MonitorState>,
    enabled: bool,
}

#[cfg(feature = "cli")]
impl SystemMonitor {
    pub fn new(enabled: bool) -> Self {
        let pid = if enabled {
            sysinfo::get_current_pid()
                .map_err(|e| tracing::warn!("⚠️ Process stats unavailable: {}", e))
                .ok()
        } else {
            None
        };

        let mut system = System::new();
        if enabled {
            system.refresh_memory();
        }

        Self {
            system: Mutex::new(system),
            pid,
            started: Instant::now(),
            state: Mutex::new(MonitorState::default()),
            enabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn sample(&self) -> Option<ProcessStats> {
        let pid = self.pid?;
        let mut system = self.system.lock().ok()?;
        system.refresh_memory();
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::everything(),
        );

        let process = system.process(pid)?;
        let memory_mb = process.memory() / 1024 / 1024;
        let total_mb = system.total_memory() / 1024 / 1024;
        Some(ProcessStats {
            cpu_usage: process.cpu_usage(),
            memory_mb,
            memory_percent: if total_mb > 0 {
                memory_mb as f32 / total_mb as f32 * 100.0
            } else {
                0.0
            },
        })
    }

    /// 結束一個階段；耗時從上一次標記（或建立時）算起
    pub fn log_stats(&self, phase: &str) {
        if !self.enabled {
            return;
        }
        let stats = self.sample();
        let Ok(mut state) = self.state.lock() else {
            return;
        };

        let now = Instant::now();
        let duration = now.duration_since(state.last_mark.unwrap_or(self.started));
        state.last_mark = Some(now);

        match &stats {
            Some(s) => {
                state.peak_memory_mb = state.peak_memory_mb.max(s.memory_mb);
                tracing::info!(
                    "📊 {} - {:?}, CPU: {:.1}%, Memory: {}MB ({:.1}%)",
                    phase,
                    duration,
                    s.cpu_usage,
                    s.memory_mb,
                    s.memory_percent
                );
            }
            None => tracing::info!("📊 {} - {:?}", phase, duration),
        }

        state.phases.push(PhaseRecord {
            phase: phase.to_string(),
            duration,
            stats,
        });
    }

    pub fn phases(&self) -> Vec<PhaseRecord> {
        self.state
            .lock()
            .map(|state| state.phases.clone())
            .unwrap_or_default()
    }

    pub fn log_final_stats(&self) {
        if !self.enabled {
            return;
        }
        let Ok(state) = self.state.lock() else {
            return;
        };
        let slowest = state.phases.iter().max_by_key(|p| p.duration);
        tracing::info!(
            "📊 Final Stats - Total Time: {:?}, Peak Memory: {}MB, Slowest Phase: {}",
            self.started.elapsed(),
            state.peak_memory_mb,
            slowest.map(|p| p.phase.as_str()).unwrap_or("-")
        );
    }
}

#[cfg(feature = "cli")]
impl Default for SystemMonitor {
    fn default() -> Self {
        Self::new(false)
    }
}

// 非 CLI 環境提供空實現
#[cfg(not(feature = "cli"))]
pub struct SystemMonitor;

#[cfg(not(feature = "cli"))]
impl SystemMonitor {
    pub fn new(_enabled: bool) -> Self {
        Self
    }

    pub fn log_stats(&self, _phase: &str) {}

    pub fn log_final_stats(&self) {}

    pub fn is_enabled(&self) -> bool {
        false
    }
}
