//! Sampler: turns raw collaborator readings into a rounded `MetricsSnapshot`.
//! Owned exclusively by the hub task, so two samples never overlap.

use std::time::Instant;

use crate::error::SampleError;
use crate::source::MetricsSource;
use crate::types::MetricsSnapshot;

pub struct Sampler<S> {
    source: S,
    started: Instant,
}

impl<S: MetricsSource> Sampler<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            started: Instant::now(),
        }
    }

    /// Throwaway read: the first delta-based counters after initialization
    /// are unreliable.
    pub fn prime(&mut self) {
        let _ = self.source.sample_cpu_percent();
        let _ = self.source.sample_available_memory_mb();
    }

    pub fn sample(&mut self) -> Result<MetricsSnapshot, SampleError> {
        let cpu = self.source.sample_cpu_percent()?;
        let available_mb = self.source.sample_available_memory_mb()?;
        let total_mb = self.source.total_memory_mb()?;
        let processes = self.source.process_count()?;

        if total_mb.is_nan() || total_mb <= 0.0 {
            return Err(SampleError::Unavailable("total memory"));
        }
        let used_percent = 100.0 * (1.0 - available_mb / total_mb);

        Ok(MetricsSnapshot::new(
            cpu,
            used_percent,
            available_mb / 1024.0,
            processes,
            self.started.elapsed().as_secs_f64(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Scripted {
        cpu: Vec<f64>,
        calls: usize,
        total_mb: f64,
        fail_memory: bool,
    }

    impl Scripted {
        fn new(cpu: Vec<f64>) -> Self {
            Self {
                cpu,
                calls: 0,
                total_mb: 8192.0,
                fail_memory: false,
            }
        }
    }

    impl MetricsSource for Scripted {
        fn sample_cpu_percent(&mut self) -> Result<f64, SampleError> {
            let v = self.cpu.get(self.calls).copied().unwrap_or(0.0);
            self.calls += 1;
            Ok(v)
        }
        fn sample_available_memory_mb(&mut self) -> Result<f64, SampleError> {
            if self.fail_memory {
                return Err(SampleError::Unavailable("memory"));
            }
            Ok(2048.0)
        }
        fn total_memory_mb(&mut self) -> Result<f64, SampleError> {
            Ok(self.total_mb)
        }
        fn process_count(&mut self) -> Result<u32, SampleError> {
            Ok(123)
        }
    }

    #[test]
    fn prime_discards_the_first_reading() {
        let mut s = Sampler::new(Scripted::new(vec![99.0, 12.34]));
        s.prime();
        let m = s.sample().unwrap();
        assert_eq!(m.cpu_usage, 12.3);
    }

    #[test]
    fn derives_memory_percent_and_gigabytes() {
        let mut s = Sampler::new(Scripted::new(vec![5.0]));
        let m = s.sample().unwrap();
        assert_eq!(m.memory_usage, 75.0);
        assert_eq!(m.available_memory_gb, 2.0);
        assert_eq!(m.total_processes, 123);
        assert!(m.system_uptime_sec >= 0.0);
    }

    #[test]
    fn collaborator_errors_propagate() {
        let mut src = Scripted::new(vec![1.0]);
        src.fail_memory = true;
        let mut s = Sampler::new(src);
        assert!(matches!(s.sample(), Err(SampleError::Unavailable(_))));
    }

    #[test]
    fn zero_total_memory_is_a_failed_sample() {
        let mut src = Scripted::new(vec![1.0]);
        src.total_mb = 0.0;
        let mut s = Sampler::new(src);
        assert!(matches!(
            s.sample(),
            Err(SampleError::Unavailable("total memory"))
        ));
    }
}
