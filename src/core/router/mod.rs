pub mod callback;

use anyhow::Result;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{info, warn};

use crate::core::error::{NotifierError, NotifierResult};
use crate::core::preferences::PreferenceStore;
use crate::core::process::{ProcessRecord, identity_key};
use crate::core::supervisor::{ServerBinding, ServerPool};
use crate::core::tracker::SharedTracker;
use crate::interfaces::formatter::{self, escape_markdown_v2};
use crate::interfaces::keyboard::{self, Keyboard};
use crate::interfaces::messenger::Messenger;
use callback::CallbackAction;

/// A chat update after the transport has been stripped away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Message {
        chat_id: i64,
        text: String,
    },
    Callback {
        chat_id: i64,
        message_id: i32,
        data: String,
    },
}

impl Inbound {
    pub fn chat_id(&self) -> i64 {
        match self {
            Inbound::Message { chat_id, .. } | Inbound::Callback { chat_id, .. } => *chat_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    Start,
    Stop,
}

impl Control {
    fn verb(self) -> &'static str {
        match self {
            Control::Start => "start",
            Control::Stop => "stop",
        }
    }
}

/// Where a rendered reply should go: a fresh message or an edit of the one
/// whose button was pressed.
#[derive(Debug, Clone, Copy)]
enum Reply {
    New,
    Edit(i32),
}

#[derive(Debug, Clone)]
pub struct RouterSettings {
    pub allowed_chats: HashSet<i64>,
    pub page_size: usize,
    /// Whether detail and list views name the server a process lives on.
    pub show_server: bool,
}

pub struct CommandRouter {
    pool: ServerPool,
    tracker: SharedTracker,
    preferences: Arc<dyn PreferenceStore>,
    messenger: Arc<dyn Messenger>,
    settings: RouterSettings,
}

impl CommandRouter {
    pub fn new(
        pool: ServerPool,
        tracker: SharedTracker,
        preferences: Arc<dyn PreferenceStore>,
        messenger: Arc<dyn Messenger>,
        settings: RouterSettings,
    ) -> Self {
        Self {
            pool,
            tracker,
            preferences,
            messenger,
            settings,
        }
    }

    pub fn is_authorized(&self, chat_id: i64) -> bool {
        self.settings.allowed_chats.contains(&chat_id)
    }

    pub async fn handle(&self, inbound: Inbound) -> Result<()> {
        let chat_id = inbound.chat_id();
        if !self.is_authorized(chat_id) {
            warn!("{}", NotifierError::Unauthorized(chat_id));
            if let Inbound::Message { .. } = inbound {
                self.send(chat_id, formatter::UNAUTHORIZED, None).await?;
            }
            return Ok(());
        }

        match inbound {
            Inbound::Message { chat_id, text } => self.handle_text(chat_id, text.trim()).await,
            Inbound::Callback {
                chat_id,
                message_id,
                data,
            } => match CallbackAction::parse(&data) {
                Some(action) => self.handle_callback(chat_id, message_id, action).await,
                None => {
                    warn!(chat_id, "Ignoring malformed callback data {:?}", data);
                    Ok(())
                }
            },
        }
    }

    async fn handle_text(&self, chat_id: i64, text: &str) -> Result<()> {
        match text {
            "/start" => return self.show_summary(chat_id).await,
            "/help" => {
                self.send(chat_id, &formatter::help_text(), None).await?;
                return self.show_summary(chat_id).await;
            }
            "/list" => return self.show_page(chat_id, 1, Reply::New).await,
            "/notify" => return self.show_choices(chat_id).await,
            "/preferences" => return self.show_preferences(chat_id).await,
            _ if text.eq_ignore_ascii_case("show all") => return self.show_summary(chat_id).await,
            _ => {}
        }

        if let Some(name) = text.strip_prefix("View ") {
            // reply keyboards echo names the way the user may have typed them escaped
            let name = name.trim().replace("\\_", "_");
            return self.view_by_name(chat_id, &name).await;
        }
        if let Some(name) = text.strip_prefix("Start ") {
            return self.control_by_name(chat_id, name.trim(), Control::Start).await;
        }
        if let Some(name) = text.strip_prefix("Stop ") {
            return self.control_by_name(chat_id, name.trim(), Control::Stop).await;
        }
        if let Some(list) = text.strip_prefix("Notify ") {
            return self.save_preferences(chat_id, list).await;
        }

        self.send(chat_id, formatter::UNKNOWN_COMMAND, None).await
    }

    async fn handle_callback(
        &self,
        chat_id: i64,
        message_id: i32,
        action: CallbackAction,
    ) -> Result<()> {
        match action {
            CallbackAction::ShowAll => self.show_summary(chat_id).await,
            CallbackAction::Page(page) => self.show_page(chat_id, page, Reply::Edit(message_id)).await,
            CallbackAction::DoneChoosing => self.show_preferences(chat_id).await,
            CallbackAction::Details { process, server } => {
                let Some(binding) = self.binding_for(&server) else {
                    return self.send(chat_id, formatter::PROCESS_NOT_FOUND, None).await;
                };
                let process = match self.process_name(&binding, &process).await {
                    Ok(name) => name,
                    Err(e) => return self.report_lookup_error(chat_id, &binding, &process, e).await,
                };
                match binding.registry.get_process(&process).await {
                    Ok(record) => self.render_details(chat_id, &record, Reply::Edit(message_id)).await,
                    Err(e) => self.report_lookup_error(chat_id, &binding, &process, e).await,
                }
            }
            CallbackAction::Start { process, server } => {
                self.control_callback(chat_id, message_id, &process, &server, Control::Start)
                    .await
            }
            CallbackAction::Stop { process, server } => {
                self.control_callback(chat_id, message_id, &process, &server, Control::Stop)
                    .await
            }
            CallbackAction::Choose { process, server } => {
                self.toggle_choice(chat_id, message_id, &process, &server).await
            }
        }
    }

    /// Full process name behind a callback's process field, expanding a
    /// `#<digest>` reference against the server's current listing.
    async fn process_name(&self, binding: &ServerBinding, process: &str) -> NotifierResult<String> {
        let Some(digest) = callback::digest_ref(process) else {
            return Ok(process.to_string());
        };
        binding
            .registry
            .list_processes()
            .await?
            .into_iter()
            .map(|record| record.full_name())
            .find(|name| callback::name_digest(name) == digest)
            .ok_or_else(|| NotifierError::NotFound(process.to_string()))
    }

    fn binding_for(&self, token: &str) -> Option<ServerBinding> {
        let binding = self.pool.by_token(token).cloned();
        if binding.is_none() {
            warn!("No configured server matches token {}", token);
        }
        binding
    }

    async fn send(&self, chat_id: i64, text: &str, keyboard: Option<&Keyboard>) -> Result<()> {
        self.messenger.send(chat_id, text, keyboard).await
    }

    async fn reply(
        &self,
        chat_id: i64,
        reply: Reply,
        text: &str,
        markup: keyboard::InlineKeyboard,
    ) -> Result<()> {
        match reply {
            Reply::New => {
                self.send(chat_id, text, Some(&Keyboard::Inline(markup)))
                    .await
            }
            Reply::Edit(message_id) => {
                self.messenger
                    .edit(chat_id, message_id, text, Some(&markup))
                    .await
            }
        }
    }

    /// Every process on every reachable server, ordered by server then name.
    async fn sorted_processes(&self) -> Vec<ProcessRecord> {
        let mut records = self.pool.all_processes().await;
        records.sort_by(|a, b| {
            (a.server_endpoint.as_str(), a.full_name())
                .cmp(&(b.server_endpoint.as_str(), b.full_name()))
        });
        records
    }

    async fn show_summary(&self, chat_id: i64) -> Result<()> {
        let mut everything = Vec::new();
        for (binding, result) in self.pool.list_all().await {
            match result {
                Ok(records) => {
                    let text = formatter::format_server_summary(&binding.endpoint, &records);
                    let markup = Keyboard::Inline(keyboard::summary_keyboard());
                    self.send(chat_id, &text, Some(&markup)).await?;
                    everything.extend(records);
                }
                Err(e) => {
                    warn!(endpoint = %binding.endpoint, "Failed to list processes: {}", e);
                    let text = formatter::format_server_error(&binding.endpoint, &e.to_string());
                    self.send(chat_id, &text, None).await?;
                }
            }
        }

        if !everything.is_empty() {
            let markup = Keyboard::Reply(keyboard::process_reply_keyboard(&everything));
            self.send(chat_id, formatter::REPLY_KEYBOARD_PROMPT, Some(&markup))
                .await?;
        }
        Ok(())
    }

    async fn show_page(&self, chat_id: i64, page: usize, reply: Reply) -> Result<()> {
        let records = self.sorted_processes().await;
        let page_size = self.settings.page_size;
        let page = keyboard::clamp_page(page, records.len(), page_size);
        let text = format!(
            "{}\n{}",
            formatter::format_state_counts(&records),
            formatter::format_process_list(
                keyboard::page_slice(&records, page, page_size),
                page,
                keyboard::total_pages(records.len(), page_size),
                self.settings.show_server,
            )
        );
        let markup = keyboard::paginated_keyboard(&records, page, page_size);
        self.reply(chat_id, reply, &text, markup).await
    }

    async fn render_details(&self, chat_id: i64, record: &ProcessRecord, reply: Reply) -> Result<()> {
        let text = formatter::format_process_details(record, self.settings.show_server);
        self.reply(chat_id, reply, &text, keyboard::control_keyboard(record))
            .await
    }

    async fn report_lookup_error(
        &self,
        chat_id: i64,
        binding: &ServerBinding,
        process: &str,
        error: NotifierError,
    ) -> Result<()> {
        match error {
            NotifierError::NotFound(_) => self.send(chat_id, formatter::PROCESS_NOT_FOUND, None).await,
            other => {
                warn!(endpoint = %binding.endpoint, process, "Failed to load process: {}", other);
                let text = format!(
                    "Error retrieving process info: `{}`",
                    escape_markdown_v2(&other.to_string())
                );
                self.send(chat_id, &text, None).await
            }
        }
    }

    async fn view_by_name(&self, chat_id: i64, name: &str) -> Result<()> {
        let found = self.pool.find(name).await;
        match found.as_slice() {
            [] => self.send(chat_id, formatter::PROCESS_NOT_FOUND, None).await,
            [record] => self.render_details(chat_id, record, Reply::New).await,
            many => {
                let markup = Keyboard::Inline(keyboard::disambiguation_keyboard(many));
                self.send(chat_id, &formatter::format_disambiguation(many), Some(&markup))
                    .await
            }
        }
    }

    async fn control_by_name(&self, chat_id: i64, name: &str, control: Control) -> Result<()> {
        let found = self.pool.find(name).await;
        let record = match found.as_slice() {
            [] => return self.send(chat_id, formatter::PROCESS_NOT_FOUND, None).await,
            [record] => record,
            many => {
                let markup = Keyboard::Inline(keyboard::disambiguation_keyboard(many));
                return self
                    .send(chat_id, &formatter::format_disambiguation(many), Some(&markup))
                    .await;
            }
        };
        let Some(binding) = self.pool.by_endpoint(&record.server_endpoint).cloned() else {
            return self.send(chat_id, formatter::PROCESS_NOT_FOUND, None).await;
        };
        self.run_control(chat_id, &binding, &record.full_name(), control, Reply::New)
            .await
    }

    async fn control_callback(
        &self,
        chat_id: i64,
        message_id: i32,
        process: &str,
        token: &str,
        control: Control,
    ) -> Result<()> {
        let Some(binding) = self.binding_for(token) else {
            return self.send(chat_id, formatter::PROCESS_NOT_FOUND, None).await;
        };
        let process = match self.process_name(&binding, process).await {
            Ok(name) => name,
            Err(e) => return self.report_lookup_error(chat_id, &binding, process, e).await,
        };
        self.run_control(chat_id, &binding, &process, control, Reply::Edit(message_id))
            .await
    }

    async fn run_control(
        &self,
        chat_id: i64,
        binding: &ServerBinding,
        process: &str,
        control: Control,
        reply: Reply,
    ) -> Result<()> {
        match self.apply_control(binding, process, control).await {
            Ok(record) => self.render_details(chat_id, &record, reply).await,
            Err(e) => {
                warn!(
                    endpoint = %binding.endpoint,
                    process,
                    operation = control.verb(),
                    "Process control failed: {}",
                    e
                );
                let text = formatter::format_action_failed(control.verb(), process, &e.to_string());
                self.send(chat_id, &text, None).await
            }
        }
    }

    /// Issues the start or stop and returns the refreshed record. A stop marks
    /// the process as user-stopped before the call so the loop never alerts on
    /// it; the mark is withdrawn if the call fails.
    async fn apply_control(
        &self,
        binding: &ServerBinding,
        process: &str,
        control: Control,
    ) -> NotifierResult<ProcessRecord> {
        let key = identity_key(&binding.endpoint, process);
        match control {
            Control::Start => {
                binding.registry.start_process(process).await?;
                self.tracker.lock().await.clear_suppression(&key);
                info!(process = %key, "Started on user request");
            }
            Control::Stop => {
                let flagged = self.tracker.lock().await.suppress(&key);
                if let Err(e) = binding.registry.stop_process(process).await {
                    if flagged {
                        self.tracker.lock().await.clear_suppression(&key);
                    }
                    return Err(e);
                }
                info!(process = %key, "Stopped on user request");
            }
        }
        binding.registry.get_process(process).await
    }

    async fn show_choices(&self, chat_id: i64) -> Result<()> {
        if !self.preferences.is_persistent() {
            return self.send(chat_id, formatter::PREFERENCES_DISABLED, None).await;
        }
        let records = self.sorted_processes().await;
        let selected = match self.preferences.get(chat_id).await {
            Ok(selected) => selected,
            Err(e) => return self.report_preference_error(chat_id, e).await,
        };
        let markup = Keyboard::Inline(keyboard::choose_keyboard(&records, &selected));
        self.send(chat_id, formatter::CHOOSE_PROMPT, Some(&markup))
            .await
    }

    async fn toggle_choice(
        &self,
        chat_id: i64,
        message_id: i32,
        process: &str,
        token: &str,
    ) -> Result<()> {
        if !self.preferences.is_persistent() {
            return self.send(chat_id, formatter::PREFERENCES_DISABLED, None).await;
        }
        let Some(binding) = self.binding_for(token) else {
            return self.send(chat_id, formatter::PROCESS_NOT_FOUND, None).await;
        };
        let process = match self.process_name(&binding, process).await {
            Ok(name) => name,
            Err(e) => return self.report_lookup_error(chat_id, &binding, process, e).await,
        };
        let key = identity_key(&binding.endpoint, &process);
        let subscribed = match self.preferences.toggle(chat_id, &key).await {
            Ok(subscribed) => subscribed,
            Err(e) => return self.report_preference_error(chat_id, e).await,
        };
        info!(chat_id, process = %key, subscribed, "Toggled notification preference");

        let records = self.sorted_processes().await;
        let selected = match self.preferences.get(chat_id).await {
            Ok(selected) => selected,
            Err(e) => return self.report_preference_error(chat_id, e).await,
        };
        self.messenger
            .edit_keyboard(
                chat_id,
                message_id,
                &keyboard::choose_keyboard(&records, &selected),
            )
            .await
    }

    async fn show_preferences(&self, chat_id: i64) -> Result<()> {
        if !self.preferences.is_persistent() {
            return self.send(chat_id, formatter::PREFERENCES_DISABLED, None).await;
        }
        match self.preferences.get(chat_id).await {
            Ok(keys) => {
                self.send(chat_id, &formatter::format_preferences(&keys), None)
                    .await
            }
            Err(e) => self.report_preference_error(chat_id, e).await,
        }
    }

    async fn save_preferences(&self, chat_id: i64, list: &str) -> Result<()> {
        if !self.preferences.is_persistent() {
            return self.send(chat_id, formatter::PREFERENCES_DISABLED, None).await;
        }
        let entries: Vec<&str> = list
            .split(',')
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .collect();

        let (keys, unresolved) = self.resolve_entries(&entries).await;
        if keys.is_empty() && !unresolved.is_empty() {
            return self
                .send(chat_id, &formatter::format_unresolved(&unresolved), None)
                .await;
        }

        let keys: Vec<String> = keys.into_iter().collect();
        if let Err(e) = self.preferences.save(chat_id, &keys).await {
            return self.report_preference_error(chat_id, e).await;
        }
        info!(chat_id, count = keys.len(), "Saved notification preferences");
        self.send(chat_id, formatter::PREFERENCES_SAVED, None).await?;
        if !unresolved.is_empty() {
            self.send(chat_id, &formatter::format_unresolved(&unresolved), None)
                .await?;
        }
        Ok(())
    }

    /// Maps user-typed entries onto identity keys. Entries already naming a
    /// configured server are kept verbatim; anything else is looked up by
    /// process name across all servers.
    async fn resolve_entries(&self, entries: &[&str]) -> (BTreeSet<String>, Vec<String>) {
        let mut keys = BTreeSet::new();
        let mut unresolved = Vec::new();
        let mut records: Option<Vec<ProcessRecord>> = None;

        for entry in entries {
            if self.is_identity_key(entry) {
                keys.insert(entry.to_string());
                continue;
            }
            if records.is_none() {
                records = Some(self.pool.all_processes().await);
            }
            let matched: Vec<String> = records
                .iter()
                .flatten()
                .filter(|r| r.matches(entry))
                .map(ProcessRecord::identity_key)
                .collect();
            if matched.is_empty() {
                unresolved.push(entry.to_string());
            } else {
                keys.extend(matched);
            }
        }
        (keys, unresolved)
    }

    fn is_identity_key(&self, entry: &str) -> bool {
        self.pool.bindings().iter().any(|b| {
            entry
                .strip_prefix(b.endpoint.as_str())
                .and_then(|rest| rest.strip_prefix(':'))
                .is_some_and(|name| !name.is_empty())
        })
    }

    async fn report_preference_error(&self, chat_id: i64, error: NotifierError) -> Result<()> {
        warn!(chat_id, "Preference store error: {}", error);
        let text = format!(
            "Error updating preferences: `{}`",
            escape_markdown_v2(&error.to_string())
        );
        self.send(chat_id, &text, None).await
    }
}
