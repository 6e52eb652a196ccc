use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::core::lifecycle::LifecycleManager;
use crate::core::preferences::PreferenceStore;
use crate::core::process::{ProcessRecord, ProcessState};
use crate::core::supervisor::ServerPool;
use crate::core::tracker::{Observation, SharedTracker};
use crate::interfaces::formatter;
use crate::interfaces::keyboard::{self, Keyboard};
use crate::interfaces::messenger::Messenger;

/// What one reconciliation pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub servers_polled: usize,
    pub servers_failed: usize,
    pub alerts: usize,
    pub deliveries: usize,
    /// Set when the previous tick was still running and this one did nothing.
    pub skipped: bool,
}

struct Alert {
    record: ProcessRecord,
    previous: ProcessState,
}

/// Polls every server, diffs against the tracker and alerts subscribers of
/// processes that left RUNNING on their own.
pub struct Reconciler {
    pool: ServerPool,
    tracker: SharedTracker,
    preferences: Arc<dyn PreferenceStore>,
    messenger: Arc<dyn Messenger>,
    in_flight: Mutex<()>,
}

impl Reconciler {
    pub fn new(
        pool: ServerPool,
        tracker: SharedTracker,
        preferences: Arc<dyn PreferenceStore>,
        messenger: Arc<dyn Messenger>,
    ) -> Self {
        Self {
            pool,
            tracker,
            preferences,
            messenger,
            in_flight: Mutex::new(()),
        }
    }

    pub async fn tick(&self) -> TickReport {
        let Ok(_guard) = self.in_flight.try_lock() else {
            debug!("Previous reconciliation still running, skipping tick");
            return TickReport {
                skipped: true,
                ..Default::default()
            };
        };

        let mut report = TickReport::default();
        let mut alerts = Vec::new();

        for (binding, result) in self.pool.list_all().await {
            report.servers_polled += 1;
            let records = match result {
                Ok(records) => records,
                Err(e) => {
                    report.servers_failed += 1;
                    warn!(endpoint = %binding.endpoint, "Failed to poll processes: {}", e);
                    continue;
                }
            };

            let mut tracker = self.tracker.lock().await;
            for record in records {
                let key = record.identity_key();
                match tracker.observe(&key, record.state) {
                    Observation::Crashed { previous } => {
                        info!(process = %key, "{} -> {}", previous, record.state);
                        alerts.push(Alert { record, previous });
                    }
                    Observation::SuppressedStop => {
                        info!(process = %key, "Skipping alert for user-requested stop");
                    }
                    Observation::Changed { previous } => {
                        debug!(process = %key, "{} -> {}", previous, record.state);
                    }
                    Observation::Baseline | Observation::Unchanged => {}
                }
            }
        }

        report.alerts = alerts.len();
        for alert in alerts {
            report.deliveries += self.deliver(&alert).await;
        }

        debug!(?report, "Reconciliation tick finished");
        report
    }

    /// Sends one alert to every subscriber; returns how many sends succeeded.
    async fn deliver(&self, alert: &Alert) -> usize {
        let key = alert.record.identity_key();
        let recipients = match self.preferences.subscribers(&key).await {
            Ok(recipients) => recipients,
            Err(e) => {
                error!(process = %key, "Failed to load subscribers: {}", e);
                return 0;
            }
        };
        if recipients.is_empty() {
            debug!(process = %key, "No subscribers for alert");
            return 0;
        }

        let text = formatter::format_status_change(&alert.record, alert.previous);
        let markup = Keyboard::Inline(keyboard::control_keyboard(&alert.record));
        let mut delivered = 0;
        for chat_id in recipients {
            match self.messenger.send(chat_id, &text, Some(&markup)).await {
                Ok(()) => delivered += 1,
                Err(e) => warn!(process = %key, chat_id, "Failed to deliver alert: {}", e),
            }
        }
        delivered
    }

    /// Registers the tick as a repeated job on the lifecycle scheduler.
    pub async fn schedule(
        self: Arc<Self>,
        lifecycle: &LifecycleManager,
        interval: Duration,
    ) -> Result<()> {
        let job = tokio_cron_scheduler::Job::new_repeated_async(interval, move |_uuid, mut _l| {
            let reconciler = self.clone();
            Box::pin(async move {
                reconciler.tick().await;
            })
        })?;
        lifecycle.scheduler.add(job).await?;
        info!("Reconciliation scheduled every {:?}", interval);
        Ok(())
    }
}
