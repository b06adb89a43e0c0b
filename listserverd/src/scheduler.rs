use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use crate::registry_manager::RegistryHandle;

/// Periodic expiry sweep over the registry.
///
/// At most one sweep loop runs per scheduler, and the loop awaits each sweep
/// before waiting for the next tick, so sweeps never overlap.
pub struct ExpiryScheduler {
    registry: RegistryHandle,
    period: Duration,
    running: Option<Running>,
}

struct Running {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl ExpiryScheduler {
    pub fn new(registry: RegistryHandle, period: Duration) -> Self {
        Self {
            registry,
            period,
            running: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Start sweeping. Does nothing if already started.
    pub fn start(&mut self) {
        if self.running.is_some() {
            tracing::warn!("Expiry scheduler already running");
            return;
        }

        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(self.registry.clone(), self.period, cancel.clone()));
        self.running = Some(Running { cancel, task });
        tracing::info!("Expiry scheduler sweeping every {:?}", self.period);
    }

    /// Stop sweeping and wait for an in-flight sweep to finish
    pub async fn stop(&mut self) {
        if let Some(running) = self.running.take() {
            running.cancel.cancel();
            if let Err(e) = running.task.await {
                tracing::error!("Expiry scheduler task failed: {}", e);
            }
        }
    }

    pub async fn restart(&mut self) {
        self.stop().await;
        self.start();
    }
}

async fn run(registry: RegistryHandle, period: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately
    interval.tick().await;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                match registry.sweep().await {
                    Ok(report) if report.removed > 0 => {
                        tracing::info!(
                            "Swept {} lapsed servers, {} remain",
                            report.removed,
                            report.remaining
                        );
                    }
                    Ok(report) => {
                        tracing::debug!("Sweep found nothing to reclaim, {} servers live", report.remaining);
                    }
                    Err(e) => {
                        tracing::error!("Failed to sweep registry: {}", e);
                    }
                }
            }
            _ = cancel.cancelled() => {
                tracing::info!("Expiry scheduler shutting down");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::IpAddr;
    use std::sync::Arc;
    use tokio::time::Instant;
    use shared::types::{FieldValue, RegistrationRequest};
    use crate::config::{Config, SweepPolicy};
    use crate::registry::clock::ManualClock;
    use crate::registry::{Registry, RegistryPolicy};

    fn spawn_registry() -> (RegistryHandle, ManualClock) {
        let clock = ManualClock::new();
        let registry = Registry::new(RegistryPolicy::default(), Arc::new(clock.clone()));
        (RegistryHandle::spawn(registry), clock)
    }

    async fn register(registry: &RegistryHandle, port: i64) {
        let request = RegistrationRequest {
            port: Some(FieldValue::from(port)),
            display_name: Some(format!("Arena {}", port)),
            ..Default::default()
        };
        registry
            .register(request, IpAddr::from([10, 0, 0, 1]))
            .await
            .unwrap();
    }

    /// Poll in one-second steps of virtual time until the scheduler has
    /// reclaimed every stored entry; returns the virtual time that took
    async fn wait_until_swept(registry: &RegistryHandle) -> Duration {
        let start = Instant::now();
        for _ in 0..600 {
            if registry.stored_count().await.unwrap() == 0 {
                return start.elapsed();
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        panic!("scheduler never reclaimed the lapsed entries");
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeps_lapsed_entries_on_period() {
        let (registry, clock) = spawn_registry();
        register(&registry, 7777).await;

        let mut scheduler = ExpiryScheduler::new(registry.clone(), Duration::from_secs(1));
        scheduler.start();
        assert!(scheduler.is_running());

        clock.advance(chrono::Duration::minutes(6));
        assert_eq!(registry.stored_count().await.unwrap(), 1);
        let took = wait_until_swept(&registry).await;
        assert!(took <= Duration::from_secs(5), "took {:?}", took);

        scheduler.stop().await;
        assert!(!scheduler.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_window_policy_sweeps_at_half_the_window() {
        let mut config = Config::default();
        config.pruning.sweep_policy = SweepPolicy::HalfWindow;
        let period = config.pruning.sweep_period();
        assert_eq!(period, Duration::from_secs(150));

        let (registry, clock) = spawn_registry();
        register(&registry, 7777).await;
        clock.advance(chrono::Duration::minutes(6));

        let mut scheduler = ExpiryScheduler::new(registry.clone(), period);
        scheduler.start();

        let took = wait_until_swept(&registry).await;
        assert!(took >= period && took < period + Duration::from_secs(10), "took {:?}", took);

        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_twice_keeps_one_loop() {
        let (registry, _clock) = spawn_registry();
        let mut scheduler = ExpiryScheduler::new(registry, Duration::from_secs(1));

        scheduler.start();
        scheduler.start();
        assert!(scheduler.is_running());

        scheduler.stop().await;
        assert!(!scheduler.is_running());

        // Stopping again is harmless
        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopped_scheduler_leaves_entries_alone() {
        let (registry, clock) = spawn_registry();
        register(&registry, 7777).await;

        let mut scheduler = ExpiryScheduler::new(registry.clone(), Duration::from_secs(1));
        scheduler.start();
        scheduler.stop().await;

        clock.advance(chrono::Duration::minutes(6));
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(registry.stored_count().await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_resumes_sweeping() {
        let (registry, clock) = spawn_registry();
        register(&registry, 7777).await;
        register(&registry, 7778).await;

        let mut scheduler = ExpiryScheduler::new(registry.clone(), Duration::from_secs(1));
        scheduler.start();
        scheduler.restart().await;
        assert!(scheduler.is_running());

        clock.advance(chrono::Duration::minutes(6));
        wait_until_swept(&registry).await;

        scheduler.stop().await;
    }
}
