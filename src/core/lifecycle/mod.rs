use anyhow::Result;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_cron_scheduler::JobScheduler;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Init,
    StartComponents,
    Ready,
    Shutdown,
}

#[async_trait::async_trait]
pub trait LifecycleComponent {
    async fn on_init(&mut self) -> Result<()> {
        Ok(())
    }
    async fn on_start(&mut self) -> Result<()> {
        Ok(())
    }
    async fn on_shutdown(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Owns the scheduler that drives periodic work and the long-lived
/// components (chat interfaces) that start and stop with the process.
pub struct LifecycleManager {
    state: LifecycleState,
    components: Vec<Arc<Mutex<dyn LifecycleComponent + Send + Sync>>>,
    pub scheduler: JobScheduler,
}

impl LifecycleManager {
    pub async fn new() -> Result<Self> {
        let scheduler = JobScheduler::new().await?;
        Ok(Self {
            state: LifecycleState::Init,
            components: Vec::new(),
            scheduler,
        })
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn attach(&mut self, component: Arc<Mutex<dyn LifecycleComponent + Send + Sync>>) {
        self.components.push(component);
    }

    /// Initializes every component, then starts them in attach order, then
    /// starts the scheduler. Any component error aborts start-up.
    pub async fn start(&mut self) -> Result<()> {
        info!("Lifecycle Phase: Init");
        self.state = LifecycleState::Init;
        for comp in &self.components {
            comp.lock().await.on_init().await?;
        }

        info!("Lifecycle Phase: Start Components");
        self.state = LifecycleState::StartComponents;
        for comp in &self.components {
            comp.lock().await.on_start().await?;
        }

        info!("Lifecycle Phase: Ready (Starting Scheduler)");
        self.scheduler.start().await?;
        self.state = LifecycleState::Ready;

        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        info!("Lifecycle Phase: Shutdown");
        self.state = LifecycleState::Shutdown;

        if let Err(e) = self.scheduler.shutdown().await {
            warn!("Scheduler shutdown error: {}", e);
        }
        for comp in &self.components {
            if let Err(e) = comp.lock().await.on_shutdown().await {
                warn!("Component shutdown error: {}", e);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        calls: Arc<std::sync::Mutex<Vec<&'static str>>>,
        fail_start: bool,
    }

    #[async_trait::async_trait]
    impl LifecycleComponent for Recorder {
        async fn on_init(&mut self) -> Result<()> {
            self.calls.lock().unwrap().push("init");
            Ok(())
        }
        async fn on_start(&mut self) -> Result<()> {
            self.calls.lock().unwrap().push("start");
            if self.fail_start {
                anyhow::bail!("boom");
            }
            Ok(())
        }
        async fn on_shutdown(&mut self) -> Result<()> {
            self.calls.lock().unwrap().push("shutdown");
            Err(anyhow::anyhow!("ignored"))
        }
    }

    #[tokio::test]
    async fn runs_phases_in_order_and_tolerates_shutdown_errors() {
        let calls = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut lifecycle = LifecycleManager::new().await.unwrap();
        lifecycle.attach(Arc::new(Mutex::new(Recorder {
            calls: calls.clone(),
            fail_start: false,
        })));

        lifecycle.start().await.unwrap();
        assert_eq!(lifecycle.state(), LifecycleState::Ready);
        lifecycle.shutdown().await.unwrap();
        assert_eq!(lifecycle.state(), LifecycleState::Shutdown);

        assert_eq!(*calls.lock().unwrap(), vec!["init", "start", "shutdown"]);
    }

    #[tokio::test]
    async fn start_failure_aborts_before_ready() {
        let mut lifecycle = LifecycleManager::new().await.unwrap();
        lifecycle.attach(Arc::new(Mutex::new(Recorder {
            fail_start: true,
            ..Default::default()
        })));
        assert!(lifecycle.start().await.is_err());
        assert_eq!(lifecycle.state(), LifecycleState::StartComponents);
    }
}
