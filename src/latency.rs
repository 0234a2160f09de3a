use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serenity::all::ShardManager;
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};

pub(crate) const SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq)]
struct Samples {
    count: u64,
    average: f64,
}

/// Running mean of the gateway heartbeat latency, in milliseconds.
#[derive(Debug)]
pub(crate) struct LatencyTracker {
    samples: Mutex<Samples>,
}

impl LatencyTracker {
    pub fn new(initial_latency_ms: f64) -> Self {
        Self {
            samples: Mutex::new(Samples {
                count: 0,
                average: initial_latency_ms,
            }),
        }
    }

    pub fn tick(&self, current_latency_ms: f64) {
        let mut samples = self.samples.lock().unwrap_or_else(PoisonError::into_inner);
        samples.count += 1;
        samples.average += (current_latency_ms - samples.average) / samples.count as f64;
    }

    /// Returns `(average_latency_ms, sample_count)`.
    pub fn read(&self) -> (f64, u64) {
        let samples = self.samples.lock().unwrap_or_else(PoisonError::into_inner);
        (samples.average, samples.count)
    }
}

/// Mean heartbeat latency over the shards that have reported one.
async fn shard_latency_ms(manager: &ShardManager) -> Option<f64> {
    let runners = manager.runners.lock().await;
    let latencies: Vec<f64> = runners
        .values()
        .filter_map(|runner| runner.latency)
        .map(|latency| latency.as_secs_f64() * 1000.0)
        .collect();
    if latencies.is_empty() {
        None
    } else {
        Some(latencies.iter().sum::<f64>() / latencies.len() as f64)
    }
}

/// One tick per [`SAMPLE_INTERVAL`]; ticks missed during a stall are dropped
/// rather than replayed.
fn sample_interval() -> Interval {
    let mut interval = tokio::time::interval(SAMPLE_INTERVAL);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

/// Feeds a [`LatencyTracker`] once per [`SAMPLE_INTERVAL`] until stopped.
pub(crate) struct LatencySampler {
    tracker: Arc<LatencyTracker>,
    task: JoinHandle<()>,
}

impl LatencySampler {
    pub fn start(manager: Arc<ShardManager>, tracker: Arc<LatencyTracker>) -> Self {
        let task_tracker = tracker.clone();
        let task = tokio::spawn(async move {
            let mut interval = sample_interval();
            loop {
                interval.tick().await;
                // No heartbeat acknowledged yet, nothing to sample.
                let Some(latency) = shard_latency_ms(&manager).await else {
                    continue;
                };
                task_tracker.tick(latency);
                tracing::debug!(latency, "sampled gateway latency");
            }
        });

        Self { tracker, task }
    }

    pub fn tracker(&self) -> &LatencyTracker {
        &self.tracker
    }

    /// Stops sampling. The tracker keeps its last values.
    pub async fn stop(&mut self) {
        self.task.abort();
        // Cancellation is the expected outcome here.
        let _ = (&mut self.task).await;
    }

    #[cfg(test)]
    fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for LatencySampler {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{a} != {b}");
    }

    #[test]
    fn read_after_new_returns_initial_value() {
        let tracker = LatencyTracker::new(42.5);
        assert_eq!(tracker.read(), (42.5, 0));
    }

    #[test]
    fn average_is_mean_of_all_readings() {
        let readings = [120.0, 80.0, 95.5, 310.25, 0.0, 44.0];
        let tracker = LatencyTracker::new(999.0);
        for (n, reading) in readings.iter().enumerate() {
            tracker.tick(*reading);
            let expected = readings[..=n].iter().sum::<f64>() / (n + 1) as f64;
            let (average, count) = tracker.read();
            assert_close(average, expected);
            assert_eq!(count, n as u64 + 1);
        }
    }

    #[test]
    fn first_tick_discards_initial_value() {
        let tracker = LatencyTracker::new(1000.0);
        tracker.tick(20.0);
        assert_eq!(tracker.read(), (20.0, 1));
    }

    #[test]
    fn concurrent_ticks_keep_count() {
        let tracker = Arc::new(LatencyTracker::new(0.0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tracker = tracker.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        tracker.tick(50.0);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let (average, count) = tracker.read();
        assert_eq!(count, 8000);
        assert_close(average, 50.0);
    }

    #[tokio::test]
    async fn missed_ticks_are_skipped() {
        let interval = sample_interval();
        assert_eq!(interval.missed_tick_behavior(), MissedTickBehavior::Skip);
        assert_eq!(interval.period(), SAMPLE_INTERVAL);
    }

    #[tokio::test]
    async fn sampler_stops_and_keeps_values() {
        let tracker = Arc::new(LatencyTracker::new(7.0));
        let mut sampler = LatencySampler {
            tracker: tracker.clone(),
            task: tokio::spawn(std::future::pending::<()>()),
        };
        assert!(sampler.is_running());
        sampler.tracker().tick(9.0);

        sampler.stop().await;
        assert!(!sampler.is_running());
        assert_eq!(tracker.read(), (9.0, 1));
    }
}
