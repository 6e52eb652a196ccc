use console::{Emoji, style};

pub static SUCCESS_ICON: Emoji<'_, '_> = Emoji("✅ ", "");
pub static WARN_ICON: Emoji<'_, '_> = Emoji("⚠️  ", "");
pub static ERROR_ICON: Emoji<'_, '_> = Emoji("❌ ", "");
pub static GEAR: Emoji<'_, '_> = Emoji("⚙️  ", "");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "");
pub static SERVER: Emoji<'_, '_> = Emoji("🖥️  ", "");

pub fn print_success(msg: &str) {
    println!("{} {}", SUCCESS_ICON, style(msg).green());
}

pub fn print_warn(msg: &str) {
    println!("{} {}", WARN_ICON, style(msg).yellow());
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", ERROR_ICON, style(msg).red().bold());
}

pub fn print_status(label: &str, msg: &str) {
    println!("  {} {}: {}", GEAR, style(label).bold().cyan(), msg);
}

pub fn print_step(step: &str) {
    println!("{} {}", SPARKLE, style(step).bold());
}

pub fn print_server(endpoint: &str) {
    println!("\n{} {}", SERVER, style(endpoint).bold().underlined());
}

/// One process row of the `check` table.
pub fn print_process_row(icon: &str, name: &str, state: &str, description: &str) {
    println!(
        "    {} {:<32} {:<10} {}",
        icon,
        style(name).bold(),
        state,
        style(description).dim()
    );
}

/// A titled block of `command  description` lines for help output.
pub struct GuideSection {
    title: String,
    rows: Vec<(String, String)>,
}

impl GuideSection {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            rows: Vec::new(),
        }
    }

    pub fn command(mut self, command: &str, description: &str) -> Self {
        self.rows.push((command.to_string(), description.to_string()));
        self
    }

    pub fn print(&self) {
        println!("{}", style(&self.title).bold().cyan());
        let width = self.rows.iter().map(|(c, _)| c.len()).max().unwrap_or(0);
        for (command, description) in &self.rows {
            println!(
                "  {:<width$}  {}",
                style(command).green(),
                description,
                width = width
            );
        }
        println!();
    }
}

pub fn print_banner() {
    println!();
    println!(
        "{}",
        style("supervisor-notifier").bold().cyan()
    );
    println!(
        "{}\n",
        style("supervisord process alerts and controls over Telegram").dim()
    );
}

pub fn print_goodbye() {
    println!(
        "\n{} {}",
        SPARKLE,
        style("supervisor-notifier stopped.").bold().cyan()
    );
}
