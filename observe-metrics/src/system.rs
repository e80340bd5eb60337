//! Host system statistics written into the registry as gauges.

use std::sync::Mutex;

use observe_primitives::LabelSet;

use crate::registry::MetricsRegistry;

/// One sample of host utilisation.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SystemSample {
    /// CPU utilisation since the previous sample, 0-100.
    pub cpu_percent: f64,
    /// Used physical memory as a percentage of total.
    pub memory_percent: f64,
    /// Used physical memory in mebibytes.
    pub memory_used_mb: f64,
    /// Used space on the root filesystem as a percentage.
    pub disk_percent: f64,
    /// Free space on the root filesystem in gibibytes.
    pub disk_free_gb: f64,
}

/// Narrow OS-stat collaborator feeding `collect_system_metrics`.
///
/// Implementations must be cheap and non-blocking; returning `None` skips
/// the collection cycle silently.
pub trait SystemProbe: Send + Sync {
    /// Takes one utilisation sample, or `None` when stats are unavailable.
    fn sample(&self) -> Option<SystemSample>;
}

#[derive(Clone, Copy, Debug, Default)]
struct CpuTimes {
    busy: u64,
    total: u64,
}

/// Default probe reading `/proc` and `statvfs` on Unix hosts.
///
/// CPU utilisation is computed from the delta between consecutive samples,
/// so the first call reports zero.
#[derive(Debug, Default)]
pub struct HostProbe {
    last_cpu: Mutex<Option<CpuTimes>>,
}

impl HostProbe {
    /// Creates a probe for the local host.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SystemProbe for HostProbe {
    #[cfg(unix)]
    fn sample(&self) -> Option<SystemSample> {
        let cpu = read_cpu_times()?;
        let (memory_percent, memory_used_mb) = read_memory()?;
        let (disk_percent, disk_free_gb) = read_disk("/")?;

        let mut last = self.last_cpu.lock().expect("cpu sample poisoned");
        let cpu_percent = match *last {
            Some(prev) if cpu.total > prev.total => {
                #[allow(clippy::cast_precision_loss)]
                {
                    (cpu.busy.saturating_sub(prev.busy) as f64
                        / (cpu.total - prev.total) as f64)
                        * 100.0
                }
            }
            _ => 0.0,
        };
        *last = Some(cpu);

        Some(SystemSample {
            cpu_percent,
            memory_percent,
            memory_used_mb,
            disk_percent,
            disk_free_gb,
        })
    }

    #[cfg(not(unix))]
    fn sample(&self) -> Option<SystemSample> {
        None
    }
}

#[cfg(unix)]
fn read_cpu_times() -> Option<CpuTimes> {
    let stat = std::fs::read_to_string("/proc/stat").ok()?;
    let line = stat.lines().next()?;
    let fields: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .filter_map(|f| f.parse().ok())
        .collect();
    if fields.len() < 5 {
        return None;
    }
    let total: u64 = fields.iter().sum();
    // idle + iowait are fields 3 and 4.
    let idle = fields[3] + fields.get(4).copied().unwrap_or(0);
    Some(CpuTimes {
        busy: total.saturating_sub(idle),
        total,
    })
}

#[cfg(unix)]
fn read_memory() -> Option<(f64, f64)> {
    let meminfo = std::fs::read_to_string("/proc/meminfo").ok()?;
    let mut total_kb = None;
    let mut available_kb = None;
    for line in meminfo.lines() {
        if let Some(rest) = line.strip_prefix("MemTotal:") {
            total_kb = parse_kb(rest);
        } else if let Some(rest) = line.strip_prefix("MemAvailable:") {
            available_kb = parse_kb(rest);
        }
    }
    let total = total_kb?;
    let available = available_kb?;
    if total == 0.0 {
        return None;
    }
    let used = (total - available).max(0.0);
    Some((used / total * 100.0, used / 1024.0))
}

#[cfg(unix)]
fn parse_kb(rest: &str) -> Option<f64> {
    rest.split_whitespace().next()?.parse().ok()
}

#[cfg(unix)]
fn read_disk(path: &str) -> Option<(f64, f64)> {
    use std::ffi::CString;

    let c_path = CString::new(path).ok()?;
    let mut stats: libc::statvfs = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::statvfs(c_path.as_ptr(), &raw mut stats) };
    if rc != 0 {
        return None;
    }
    #[allow(clippy::cast_precision_loss, clippy::unnecessary_cast)]
    {
        let block = stats.f_frsize as f64;
        let total = stats.f_blocks as f64 * block;
        let avail = stats.f_bavail as f64 * block;
        let free = stats.f_bfree as f64 * block;
        if total <= 0.0 {
            return None;
        }
        let used = total - free;
        let percent = used / (used + avail).max(1.0) * 100.0;
        Some((percent, avail / 1024.0 / 1024.0 / 1024.0))
    }
}

impl MetricsRegistry {
    /// Samples the host through `probe` and writes the standard system
    /// gauges (`system.cpu_percent`, `system.memory_percent`,
    /// `system.memory_mb`, `system.disk_percent`, `system.disk_free_gb`).
    ///
    /// Probe failure skips the cycle without error.
    pub fn collect_system_metrics(&self, probe: &dyn SystemProbe) {
        if !self.is_enabled() {
            return;
        }
        let Some(sample) = probe.sample() else {
            return;
        };
        let labels = LabelSet::new();
        self.set_gauge("system.cpu_percent", sample.cpu_percent, &labels);
        self.set_gauge("system.memory_percent", sample.memory_percent, &labels);
        self.set_gauge("system.memory_mb", sample.memory_used_mb, &labels);
        self.set_gauge("system.disk_percent", sample.disk_percent, &labels);
        self.set_gauge("system.disk_free_gb", sample.disk_free_gb, &labels);
    }
}
