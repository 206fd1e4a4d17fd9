//! OS metrics collaborator: the boundary between the sampler and the host.

use std::panic::{catch_unwind, AssertUnwindSafe};
use sysinfo::{
    CpuRefreshKind, MemoryRefreshKind, ProcessRefreshKind, ProcessesToUpdate, RefreshKind, System,
};
use tracing::warn;

use crate::error::SampleError;

/// Raw readings the sampler needs each tick. Implementations may keep internal
/// counter state (CPU usage is a delta between two refreshes) but must not
/// have other side effects.
pub trait MetricsSource: Send {
    fn sample_cpu_percent(&mut self) -> Result<f64, SampleError>;
    fn sample_available_memory_mb(&mut self) -> Result<f64, SampleError>;
    fn total_memory_mb(&mut self) -> Result<f64, SampleError>;
    fn process_count(&mut self) -> Result<u32, SampleError>;
}

const MB: f64 = 1024.0 * 1024.0;

/// Default collaborator backed by a persistent `sysinfo::System`.
pub struct SysinfoSource {
    sys: System,
}

impl SysinfoSource {
    pub fn new() -> Result<Self, SampleError> {
        if !sysinfo::IS_SUPPORTED_SYSTEM {
            return Err(SampleError::Unsupported);
        }
        let refresh_kind = RefreshKind::nothing()
            .with_cpu(CpuRefreshKind::nothing().with_cpu_usage())
            .with_memory(MemoryRefreshKind::nothing().with_ram());
        Ok(Self {
            sys: System::new_with_specifics(refresh_kind),
        })
    }

    // Selective sysinfo refreshes have been seen to panic on some kernels;
    // treat that as a failed sample instead of taking the tick loop down.
    fn guarded<T>(
        &mut self,
        what: &'static str,
        f: impl FnOnce(&mut System) -> T,
    ) -> Result<T, SampleError> {
        let sys = &mut self.sys;
        catch_unwind(AssertUnwindSafe(|| f(sys))).map_err(|e| {
            let msg = e
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| e.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".into());
            warn!(metric = what, "sysinfo refresh panicked: {msg}");
            SampleError::Panicked(msg)
        })
    }
}

impl MetricsSource for SysinfoSource {
    fn sample_cpu_percent(&mut self) -> Result<f64, SampleError> {
        self.guarded("cpu", |sys| {
            sys.refresh_cpu_usage();
            f64::from(sys.global_cpu_usage())
        })
    }

    fn sample_available_memory_mb(&mut self) -> Result<f64, SampleError> {
        self.guarded("memory", |sys| {
            sys.refresh_memory_specifics(MemoryRefreshKind::nothing().with_ram());
            sys.available_memory() as f64 / MB
        })
    }

    fn total_memory_mb(&mut self) -> Result<f64, SampleError> {
        let total = self.sys.total_memory();
        if total == 0 {
            return Err(SampleError::Unavailable("total memory"));
        }
        Ok(total as f64 / MB)
    }

    fn process_count(&mut self) -> Result<u32, SampleError> {
        self.guarded("processes", |sys| {
            sys.refresh_processes_specifics(
                ProcessesToUpdate::All,
                true,
                ProcessRefreshKind::nothing(),
            );
            u32::try_from(sys.processes().len()).unwrap_or(u32::MAX)
        })
    }
}
