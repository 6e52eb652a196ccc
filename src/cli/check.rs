use anyhow::{Result, bail};

use super::CommonFlags;
use super::run::build_pool;
use crate::core::config::{self, NotifierConfig};
use crate::core::terminal;
use crate::logging;

/// Lists every configured server once and prints a status table. Fails when
/// any server cannot be listed.
pub async fn run_check(flags: CommonFlags) -> Result<()> {
    logging::init_console();
    let path = config::resolve_path(flags.config.as_deref());
    let config = NotifierConfig::load(&path).await?;
    config.validate(false)?;

    let pool = build_pool(&config)?;
    let mut failed = 0;
    for (binding, result) in pool.list_all().await {
        terminal::print_server(&binding.endpoint);
        match result {
            Ok(mut records) => {
                records.sort_by_key(|r| r.full_name());
                for record in &records {
                    terminal::print_process_row(
                        record.state.icon(),
                        &record.full_name(),
                        record.state.as_str(),
                        &record.description,
                    );
                }
                terminal::print_status("Processes", &records.len().to_string());
            }
            Err(e) => {
                failed += 1;
                terminal::print_error(&e.to_string());
            }
        }
    }
    println!();

    if failed > 0 {
        bail!("{} of {} server(s) could not be listed", failed, pool.len());
    }
    terminal::print_success(&format!("All {} server(s) reachable", pool.len()));
    Ok(())
}
