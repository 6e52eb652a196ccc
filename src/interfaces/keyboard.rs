//! Transport-neutral keyboard layouts. The Telegram interface turns these into
//! teloxide markup; tests inspect them directly.

use std::collections::BTreeSet;

use crate::core::process::ProcessRecord;
use crate::core::router::callback::CallbackAction;
use crate::core::server_id;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineButton {
    pub label: String,
    pub data: String,
}

impl InlineButton {
    pub fn new(label: impl Into<String>, action: &CallbackAction) -> Self {
        Self {
            label: label.into(),
            data: action.encode(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InlineKeyboard {
    pub rows: Vec<Vec<InlineButton>>,
}

impl InlineKeyboard {
    pub fn buttons(&self) -> impl Iterator<Item = &InlineButton> {
        self.rows.iter().flatten()
    }
}

/// Buttons that type their label into the chat when pressed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplyKeyboard {
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Keyboard {
    Inline(InlineKeyboard),
    Reply(ReplyKeyboard),
}

fn token_of(record: &ProcessRecord) -> String {
    server_id::shorten(&record.server_endpoint)
}

pub fn control_keyboard(record: &ProcessRecord) -> InlineKeyboard {
    let process = record.full_name();
    let server = token_of(record);
    InlineKeyboard {
        rows: vec![vec![
            InlineButton::new(
                "🚀 Start",
                &CallbackAction::Start {
                    process: process.clone(),
                    server: server.clone(),
                },
            ),
            InlineButton::new("🛑 Stop", &CallbackAction::Stop { process, server }),
        ]],
    }
}

pub fn total_pages(count: usize, page_size: usize) -> usize {
    count.div_ceil(page_size.max(1)).max(1)
}

/// Clamps a requested 1-based page into range.
pub fn clamp_page(page: usize, count: usize, page_size: usize) -> usize {
    page.clamp(1, total_pages(count, page_size))
}

/// The records shown on `page` (1-based, clamped).
pub fn page_slice(records: &[ProcessRecord], page: usize, page_size: usize) -> &[ProcessRecord] {
    let page_size = page_size.max(1);
    let page = clamp_page(page, records.len(), page_size);
    let start = (page - 1) * page_size;
    let end = (start + page_size).min(records.len());
    &records[start.min(end)..end]
}

pub fn paginated_keyboard(
    records: &[ProcessRecord],
    page: usize,
    page_size: usize,
) -> InlineKeyboard {
    let page = clamp_page(page, records.len(), page_size);
    let pages = total_pages(records.len(), page_size);

    let mut rows: Vec<Vec<InlineButton>> = page_slice(records, page, page_size)
        .iter()
        .map(|record| {
            vec![InlineButton::new(
                format!("🔍 {}", record.full_name()),
                &CallbackAction::Details {
                    process: record.full_name(),
                    server: token_of(record),
                },
            )]
        })
        .collect();

    let mut nav = Vec::new();
    if page > 1 {
        nav.push(InlineButton::new(
            "⬅️ Previous Page",
            &CallbackAction::Page(page - 1),
        ));
    }
    if page < pages {
        nav.push(InlineButton::new("Next Page ➡️", &CallbackAction::Page(page + 1)));
    }
    if !nav.is_empty() {
        rows.push(nav);
    }
    InlineKeyboard { rows }
}

/// One toggle per process; subscribed ones carry a check mark.
pub fn choose_keyboard(records: &[ProcessRecord], selected: &BTreeSet<String>) -> InlineKeyboard {
    let mut rows: Vec<Vec<InlineButton>> = records
        .iter()
        .map(|record| {
            let mark = if selected.contains(&record.identity_key()) {
                "✅"
            } else {
                "⬜"
            };
            vec![InlineButton::new(
                format!("{} {} @ {}", mark, record.full_name(), record.server_endpoint),
                &CallbackAction::Choose {
                    process: record.full_name(),
                    server: token_of(record),
                },
            )]
        })
        .collect();
    rows.push(vec![InlineButton::new("✔️ Done", &CallbackAction::DoneChoosing)]);
    InlineKeyboard { rows }
}

pub fn disambiguation_keyboard(records: &[ProcessRecord]) -> InlineKeyboard {
    InlineKeyboard {
        rows: records
            .iter()
            .map(|record| {
                vec![InlineButton::new(
                    format!("View on {}", record.server_endpoint),
                    &CallbackAction::Details {
                        process: record.full_name(),
                        server: token_of(record),
                    },
                )]
            })
            .collect(),
    }
}

pub fn summary_keyboard() -> InlineKeyboard {
    InlineKeyboard {
        rows: vec![vec![
            InlineButton::new("📋 Paginated View", &CallbackAction::Page(1)),
            InlineButton::new("🔄 Refresh", &CallbackAction::ShowAll),
        ]],
    }
}

/// `View <process>` buttons, one per distinct full name.
pub fn process_reply_keyboard(records: &[ProcessRecord]) -> ReplyKeyboard {
    let names: BTreeSet<String> = records.iter().map(ProcessRecord::full_name).collect();
    ReplyKeyboard {
        rows: names
            .into_iter()
            .map(|name| vec![format!("View {}", name)])
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::process::ProcessState;

    fn record(name: &str, endpoint: &str) -> ProcessRecord {
        ProcessRecord {
            name: name.to_string(),
            group: "web".to_string(),
            state: ProcessState::Running,
            description: String::new(),
            server_endpoint: endpoint.to_string(),
        }
    }

    fn records(n: usize) -> Vec<ProcessRecord> {
        (0..n)
            .map(|i| record(&format!("p{}", i), "http://a:9001/RPC2"))
            .collect()
    }

    fn labels(keyboard: &InlineKeyboard) -> Vec<&str> {
        keyboard.buttons().map(|b| b.label.as_str()).collect()
    }

    #[test]
    fn control_keyboard_targets_process_on_its_server() {
        let r = record("worker", "http://a:9001/RPC2");
        let kb = control_keyboard(&r);
        let token = server_id::shorten("http://a:9001/RPC2");
        let data: Vec<&str> = kb.buttons().map(|b| b.data.as_str()).collect();
        assert_eq!(
            data,
            vec![
                format!("start_web:worker_{}", token),
                format!("stop_web:worker_{}", token)
            ]
        );
    }

    #[test]
    fn pagination_adds_navigation_only_where_needed() {
        let all = records(12);

        let first = paginated_keyboard(&all, 1, 5);
        assert_eq!(first.rows.len(), 6);
        assert_eq!(first.rows[5].len(), 1);
        assert_eq!(first.rows[5][0].data, "page_2");

        let middle = paginated_keyboard(&all, 2, 5);
        let nav: Vec<&str> = middle.rows[5].iter().map(|b| b.data.as_str()).collect();
        assert_eq!(nav, vec!["page_1", "page_3"]);

        let last = paginated_keyboard(&all, 3, 5);
        assert_eq!(last.rows.len(), 3);
        assert_eq!(last.rows[2][0].data, "page_2");

        let single = paginated_keyboard(&records(3), 1, 5);
        assert_eq!(single.rows.len(), 3);
    }

    #[test]
    fn out_of_range_pages_are_clamped() {
        let all = records(7);
        assert_eq!(clamp_page(0, all.len(), 5), 1);
        assert_eq!(clamp_page(9, all.len(), 5), 2);
        assert_eq!(page_slice(&all, 9, 5).len(), 2);
        assert_eq!(total_pages(0, 5), 1);
        assert!(page_slice(&[], 1, 5).is_empty());
        assert!(paginated_keyboard(&[], 1, 5).rows.is_empty());
    }

    #[test]
    fn choose_keyboard_marks_selected_processes() {
        let all = vec![
            record("a", "http://a:9001/RPC2"),
            record("b", "http://a:9001/RPC2"),
        ];
        let selected = BTreeSet::from([all[1].identity_key()]);
        let kb = choose_keyboard(&all, &selected);
        let labels = labels(&kb);
        assert!(labels[0].starts_with("⬜"));
        assert!(labels[1].starts_with("✅"));
        assert_eq!(kb.rows.last().unwrap()[0].data, "done_choosing");
    }

    #[test]
    fn reply_keyboard_deduplicates_names_across_servers() {
        let all = vec![
            record("worker", "http://a:9001/RPC2"),
            record("worker", "http://b:9001/RPC2"),
            record("api", "http://b:9001/RPC2"),
        ];
        assert_eq!(
            process_reply_keyboard(&all).rows,
            vec![vec!["View web:api".to_string()], vec!["View web:worker".to_string()]]
        );
    }

    #[test]
    fn disambiguation_offers_one_button_per_server() {
        let all = vec![
            record("worker", "http://a:9001/RPC2"),
            record("worker", "http://b:9001/RPC2"),
        ];
        let kb = disambiguation_keyboard(&all);
        assert_eq!(
            labels(&kb),
            vec!["View on http://a:9001/RPC2", "View on http://b:9001/RPC2"]
        );
        assert_ne!(kb.rows[0][0].data, kb.rows[1][0].data);
    }
}
