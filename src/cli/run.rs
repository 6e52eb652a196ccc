use anyhow::{Context, Result, bail};
use std::collections::HashSet;
use std::sync::Arc;
use teloxide::Bot;
use tokio::sync::Mutex;
use tracing::{error, info};

use super::CommonFlags;
use crate::core::config::{self, NotifierConfig};
use crate::core::lifecycle::LifecycleManager;
use crate::core::preferences::{FixedRecipients, PreferenceStore, SqlitePreferenceStore};
use crate::core::reconciler::Reconciler;
use crate::core::router::{CommandRouter, RouterSettings};
use crate::core::supervisor::{ServerBinding, ServerPool, SupervisorClient};
use crate::core::terminal;
use crate::core::tracker::ProcessTracker;
use crate::interfaces::messenger::Messenger;
use crate::interfaces::telegram::{TelegramInterface, TelegramMessenger};
use crate::logging;

/// One XML-RPC client per watched server, in configuration order.
pub(crate) fn build_pool(config: &NotifierConfig) -> Result<ServerPool> {
    let mut bindings = Vec::new();
    for server in config.active_servers() {
        let client = SupervisorClient::new(
            &server.endpoint,
            server.credentials(),
            config.request_timeout(),
        )
        .with_context(|| format!("Failed to build client for {}", server.endpoint))?;
        bindings.push(ServerBinding::new(Arc::new(client)));
    }
    Ok(ServerPool::new(bindings))
}

/// Every server must answer once before the bot goes live.
async fn probe_servers(pool: &ServerPool) -> Result<()> {
    let mut failures = Vec::new();
    for (binding, result) in pool.list_all().await {
        match result {
            Ok(records) => info!(
                endpoint = %binding.endpoint,
                "Watching {} process(es)",
                records.len()
            ),
            Err(e) => {
                error!(endpoint = %binding.endpoint, "Start-up listing failed: {}", e);
                failures.push(e.to_string());
            }
        }
    }
    if !failures.is_empty() {
        bail!("Cannot reach supervisor: {}", failures.join("; "));
    }
    Ok(())
}

async fn open_preferences(config: &NotifierConfig) -> Result<Arc<dyn PreferenceStore>> {
    if config.persistent_preferences {
        let store = SqlitePreferenceStore::open(&config.database_path)
            .await
            .with_context(|| {
                format!(
                    "Failed to open preference database {}",
                    config.database_path.display()
                )
            })?;
        Ok(Arc::new(store))
    } else {
        let recipients = config.alert_recipients();
        terminal::print_warn("Notification preferences are disabled; alerts go to fixed chats.");
        info!("Alerts go to {:?}", recipients);
        Ok(Arc::new(FixedRecipients::new(recipients)))
    }
}

pub async fn run_notifier(flags: CommonFlags) -> Result<()> {
    let path = config::resolve_path(flags.config.as_deref());
    let config = NotifierConfig::load(&path).await?;
    let _log_guard = logging::init(&config.log, flags.verbose)?;

    config.validate(true)?;
    terminal::print_banner();

    let pool = build_pool(&config)?;
    terminal::print_step(&format!("Probing {} supervisor server(s)...", pool.len()));
    probe_servers(&pool).await?;
    let preferences = open_preferences(&config).await?;

    let token = config.bot_token.clone().unwrap_or_default();
    let bot = Bot::new(token);
    let messenger: Arc<dyn Messenger> = Arc::new(TelegramMessenger::new(bot.clone()));
    let tracker = ProcessTracker::shared();

    let router = Arc::new(CommandRouter::new(
        pool.clone(),
        tracker.clone(),
        preferences.clone(),
        messenger.clone(),
        RouterSettings {
            allowed_chats: config.allowed_chat_ids.iter().copied().collect::<HashSet<_>>(),
            page_size: config.page_size,
            show_server: config.multi_server,
        },
    ));
    let reconciler = Arc::new(Reconciler::new(pool.clone(), tracker, preferences, messenger));

    let mut lifecycle = LifecycleManager::new().await?;
    lifecycle.attach(Arc::new(Mutex::new(TelegramInterface::new(bot, router))));
    reconciler
        .schedule(&lifecycle, config.poll_interval())
        .await?;
    lifecycle.start().await?;

    terminal::print_success(&format!(
        "Watching {} server(s) every {}s. Press Ctrl+C to stop.",
        pool.len(),
        config.poll_interval_secs
    ));
    for binding in pool.bindings() {
        terminal::print_status(&binding.token, &binding.endpoint);
    }

    tokio::signal::ctrl_c().await?;
    lifecycle.shutdown().await?;
    terminal::print_goodbye();
    Ok(())
}
