//! MarkdownV2 renderers for everything the bot says. Remote and user text is
//! always passed through [`escape_markdown_v2`]; literal text is pre-escaped.

use std::collections::{BTreeMap, BTreeSet};

use crate::core::process::{ProcessRecord, ProcessState};

pub const UNAUTHORIZED: &str = "⚠️ You are not authorized to use this bot\\.";
pub const UNKNOWN_COMMAND: &str =
    "Unknown command\\. Use /start or /help to see available commands\\.";
pub const PROCESS_NOT_FOUND: &str = "Process not found";
pub const PREFERENCES_DISABLED: &str =
    "Notification preferences are disabled on this bot\\. Alerts go to the configured chats\\.";
pub const PREFERENCES_SAVED: &str = "Preferences saved successfully";
pub const REPLY_KEYBOARD_PROMPT: &str = "Select a process to view details:";
pub const CHOOSE_PROMPT: &str = "*Choose processes to be notified about:*";

const SPECIAL: &[char] = &[
    '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!',
];

pub fn escape_markdown_v2(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 8);
    for c in input.chars() {
        if c == '\\' || SPECIAL.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// One server's processes, grouped by group then state.
pub fn format_server_summary(endpoint: &str, records: &[ProcessRecord]) -> String {
    let mut by_group: BTreeMap<&str, BTreeMap<ProcessState, Vec<String>>> = BTreeMap::new();
    for record in records {
        by_group
            .entry(record.group.as_str())
            .or_default()
            .entry(record.state)
            .or_default()
            .push(record.full_name());
    }

    let mut out = String::from("*📊 Process Status Summary*\n\n");
    out.push_str(&format!(
        "🖥️ *Server: {}*\n━━━━━━━━━━━━━━\n",
        escape_markdown_v2(endpoint)
    ));
    if records.is_empty() {
        out.push_str("\n_No processes configured_\n");
    }

    for (group, states) in by_group {
        if !group.is_empty() {
            out.push_str(&format!("\n📦 *Group: {}*\n", escape_markdown_v2(group)));
        }
        for (state, mut names) in states {
            names.sort();
            out.push_str(&format!(
                "\n{} *{}*\n",
                state.icon(),
                escape_markdown_v2(state.as_str())
            ));
            for name in names {
                out.push_str(&format!("  • {}\n", escape_markdown_v2(&name)));
            }
        }
    }

    out.push_str("\n💡 *Tips:*\n");
    out.push_str("• Tap a process name below to view details\n");
    out.push_str("• Use /list for a paginated view and /notify to pick alerts\n");
    out
}

pub fn format_server_error(endpoint: &str, error: &str) -> String {
    format!(
        "⚠️ Error fetching processes from {}: `{}`",
        escape_markdown_v2(endpoint),
        escape_markdown_v2(error)
    )
}

pub fn format_state_counts(records: &[ProcessRecord]) -> String {
    let mut counts: BTreeMap<ProcessState, usize> = BTreeMap::new();
    for record in records {
        *counts.entry(record.state).or_default() += 1;
    }
    let mut out = String::from("*Process Status Summary*\n");
    for (state, count) in counts {
        out.push_str(&format!(
            "{} {}: `{}`\n",
            state.icon(),
            escape_markdown_v2(state.as_str()),
            count
        ));
    }
    out
}

/// A page of the cross-server list. `records` holds only the page's entries.
pub fn format_process_list(
    records: &[ProcessRecord],
    page: usize,
    total_pages: usize,
    show_server: bool,
) -> String {
    let mut out = format!("*Processes List* \\(Page {}/{}\\)\n\n", page, total_pages);
    if records.is_empty() {
        out.push_str("_No processes found_\n");
    }
    for record in records {
        out.push_str(&format!(
            "{} *Name:* `{}`\n*Status:* `{}`\n",
            record.state.icon(),
            escape_markdown_v2(&record.full_name()),
            escape_markdown_v2(record.state.as_str())
        ));
        if show_server {
            out.push_str(&format!(
                "*Server:* `{}`\n",
                escape_markdown_v2(&record.server_endpoint)
            ));
        }
        out.push('\n');
    }
    out
}

pub fn format_process_details(record: &ProcessRecord, show_server: bool) -> String {
    let mut out = format!(
        "*Process Details*\n\n*Name:* `{}`\n*Status:* {} `{}`\n*Description:* `{}`",
        escape_markdown_v2(&record.full_name()),
        record.state.icon(),
        escape_markdown_v2(record.state.as_str()),
        escape_markdown_v2(&record.description)
    );
    if show_server {
        out.push_str(&format!(
            "\n*Server:* `{}`",
            escape_markdown_v2(&record.server_endpoint)
        ));
    }
    out
}

/// Alert body for a process that left RUNNING.
pub fn format_status_change(record: &ProcessRecord, previous: ProcessState) -> String {
    format!(
        "*Process Status Change Alert*\n*Server:* `{}`\n*Name:* `{}`\n*Status:* `{}` → {} `{}`\n*Error:* `{}`",
        escape_markdown_v2(&record.server_endpoint),
        escape_markdown_v2(&record.full_name()),
        escape_markdown_v2(previous.as_str()),
        record.state.icon(),
        escape_markdown_v2(record.state.as_str()),
        escape_markdown_v2(&record.description)
    )
}

pub fn format_disambiguation(records: &[ProcessRecord]) -> String {
    let mut out = String::from("*Multiple processes found with same name:*\n\n");
    for record in records {
        out.push_str(&format!(
            "• Server: `{}`\n  Process: `{}`\n  Status: `{}`\n\n",
            escape_markdown_v2(&record.server_endpoint),
            escape_markdown_v2(&record.full_name()),
            escape_markdown_v2(record.state.as_str())
        ));
    }
    out
}

pub fn format_preferences(keys: &BTreeSet<String>) -> String {
    if keys.is_empty() {
        return "You are not subscribed to any process\\. Use /notify to choose some\\."
            .to_string();
    }
    let mut out = String::from("*Your notification preferences:*\n\n");
    for key in keys {
        out.push_str(&format!("• `{}`\n", escape_markdown_v2(key)));
    }
    out
}

pub fn format_unresolved(entries: &[String]) -> String {
    let names: Vec<String> = entries
        .iter()
        .map(|e| format!("`{}`", escape_markdown_v2(e)))
        .collect();
    format!("Could not find these processes: {}", names.join(", "))
}

pub fn format_action_failed(action: &str, process: &str, error: &str) -> String {
    format!(
        "❌ Failed to {} `{}`: `{}`",
        action,
        escape_markdown_v2(process),
        escape_markdown_v2(error)
    )
}

pub fn help_text() -> String {
    [
        "*Supervisor Notifier*",
        "",
        "/start, /help \\- status summary of every server",
        "/list \\- paginated process list",
        "/notify \\- choose which processes alert you",
        "/preferences \\- show your subscriptions",
        "`View <process>` \\- process details",
        "`Start <process>`, `Stop <process>` \\- control a process",
        "`Notify a, b` \\- replace your subscriptions",
    ]
    .join("\n")
}
