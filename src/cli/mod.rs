mod check;
mod run;

use anyhow::Result;
use console::style;

use crate::core::terminal::{self, GuideSection, print_error};

fn print_help() {
    terminal::print_banner();

    GuideSection::new("Commands")
        .command("run", "Start the Telegram bot and the process watcher")
        .command("check", "List processes on every configured server and exit")
        .command("help", "Show this help")
        .print();

    GuideSection::new("Options")
        .command("--config <path>", "Config file (default: notifier.toml or $NOTIFIER_CONFIG)")
        .command("--verbose, -v", "Log at debug level (run only)")
        .print();

    GuideSection::new("Environment")
        .command("TELEGRAM_BOT_TOKEN", "Bot token from @BotFather")
        .command("SERVER_URLS", "Comma-separated supervisord XML-RPC endpoints")
        .command("ALLOWED_CHAT_IDS", "Comma-separated chats allowed to use the bot")
        .command("PROCESSES_PER_PAGE", "Page size for /list")
        .command("SUPERVISOR_USERNAME", "Default basic-auth user for every server")
        .command("SUPERVISOR_PASSWORD", "Default basic-auth password")
        .print();

    println!(
        "\n {} {} <command> [options]\n",
        style("Usage:").bold(),
        style("supervisor-notifier").green()
    );
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct CommonFlags {
    pub config: Option<String>,
    pub verbose: bool,
}

pub(crate) fn parse_common_flags(args: &[String], start: usize) -> CommonFlags {
    let mut flags = CommonFlags::default();
    let mut i = start;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    flags.config = Some(args[i + 1].clone());
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--verbose" | "-v" => {
                flags.verbose = true;
                i += 1;
            }
            _ => i += 1,
        }
    }
    flags
}

pub async fn run_main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let cmd = args.get(1).map(String::as_str).unwrap_or("help");

    match cmd {
        "run" => run::run_notifier(parse_common_flags(&args, 2)).await,
        "check" => check::run_check(parse_common_flags(&args, 2)).await,
        "help" | "--help" | "-h" => {
            print_help();
            Ok(())
        }
        other => {
            print_error(&format!("Unknown command: {}", other));
            print_help();
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_config_and_verbose() {
        let flags = parse_common_flags(
            &args(&["bin", "run", "--config", "/etc/n.toml", "-v"]),
            2,
        );
        assert_eq!(flags.config.as_deref(), Some("/etc/n.toml"));
        assert!(flags.verbose);
    }

    #[test]
    fn dangling_config_flag_is_ignored() {
        let flags = parse_common_flags(&args(&["bin", "check", "--config"]), 2);
        assert_eq!(flags, CommonFlags::default());
    }
}
