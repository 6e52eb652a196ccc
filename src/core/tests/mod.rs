
use anyhow::Result;
use async_trait::async_trait;
use rusqlite::Connection;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use crate::core::error::{NotifierError, NotifierResult};
use crate::core::preferences::{PreferenceStore, SqlitePreferenceStore};
use crate::core::process::{ProcessRecord, ProcessState};
use crate::core::reconciler::Reconciler;
use crate::core::router::callback::MAX_CALLBACK_BYTES;
use crate::core::router::{CommandRouter, Inbound, RouterSettings};
use crate::core::supervisor::{ProcessRegistry, ServerBinding, ServerPool};
use crate::core::tracker::{ProcessTracker, SharedTracker};
use crate::interfaces::keyboard::{InlineKeyboard, Keyboard};
use crate::interfaces::messenger::Messenger;

pub const SERVER_A: &str = "http://10.0.0.1:9001/RPC2";
pub const SERVER_B: &str = "http://10.0.0.2:9001/RPC2";
pub const ADMIN: i64 = 100;
pub const OPERATOR: i64 = 200;
pub const STRANGER: i64 = 999;

/// In-memory supervisord whose process table tests mutate directly.
pub struct FakeRegistry {
    endpoint: String,
    processes: StdMutex<Vec<ProcessRecord>>,
    pub unreachable: AtomicBool,
    pub reject_stop: AtomicBool,
    pub calls: StdMutex<Vec<String>>,
}

impl FakeRegistry {
    pub fn new(endpoint: &str, processes: &[(&str, &str, ProcessState)]) -> Arc<Self> {
        Arc::new(Self {
            endpoint: endpoint.to_string(),
            processes: StdMutex::new(
                processes
                    .iter()
                    .map(|(group, name, state)| ProcessRecord {
                        name: name.to_string(),
                        group: group.to_string(),
                        state: *state,
                        description: format!("{} description", name),
                        server_endpoint: endpoint.to_string(),
                    })
                    .collect(),
            ),
            unreachable: AtomicBool::new(false),
            reject_stop: AtomicBool::new(false),
            calls: StdMutex::new(Vec::new()),
        })
    }

    pub fn set_state(&self, full_name: &str, state: ProcessState) {
        let mut processes = self.processes.lock().unwrap();
        for p in processes.iter_mut().filter(|p| p.full_name() == full_name) {
            p.state = state;
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn transport(&self, operation: &'static str) -> NotifierError {
        NotifierError::transport(&self.endpoint, operation, "connection refused")
    }
}

#[async_trait]
impl ProcessRegistry for FakeRegistry {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn list_processes(&self) -> NotifierResult<Vec<ProcessRecord>> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(self.transport("supervisor.getAllProcessInfo"));
        }
        Ok(self.processes.lock().unwrap().clone())
    }

    async fn get_process(&self, name: &str) -> NotifierResult<ProcessRecord> {
        self.processes
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.full_name() == name)
            .cloned()
            .ok_or_else(|| NotifierError::NotFound(name.to_string()))
    }

    async fn start_process(&self, name: &str) -> NotifierResult<()> {
        self.calls.lock().unwrap().push(format!("start {}", name));
        self.set_state(name, ProcessState::Running);
        Ok(())
    }

    async fn stop_process(&self, name: &str) -> NotifierResult<()> {
        self.calls.lock().unwrap().push(format!("stop {}", name));
        if self.reject_stop.load(Ordering::SeqCst) {
            return Err(self.transport("supervisor.stopProcess"));
        }
        self.set_state(name, ProcessState::Stopped);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outgoing {
    Send {
        chat_id: i64,
        text: String,
        keyboard: Option<Keyboard>,
    },
    Edit {
        chat_id: i64,
        message_id: i32,
        text: String,
        keyboard: Option<InlineKeyboard>,
    },
    EditKeyboard {
        chat_id: i64,
        message_id: i32,
        keyboard: InlineKeyboard,
    },
}

impl Outgoing {
    pub fn chat_id(&self) -> i64 {
        match self {
            Outgoing::Send { chat_id, .. }
            | Outgoing::Edit { chat_id, .. }
            | Outgoing::EditKeyboard { chat_id, .. } => *chat_id,
        }
    }

    pub fn text(&self) -> &str {
        match self {
            Outgoing::Send { text, .. } | Outgoing::Edit { text, .. } => text,
            Outgoing::EditKeyboard { .. } => "",
        }
    }
}

#[derive(Default)]
pub struct RecordingMessenger {
    outbox: StdMutex<Vec<Outgoing>>,
}

/// Telegram refuses the whole request when any button carries oversized data.
fn check_callback_data(keyboard: Option<&InlineKeyboard>) -> Result<()> {
    if let Some(button) = keyboard
        .into_iter()
        .flat_map(InlineKeyboard::buttons)
        .find(|b| b.data.len() > MAX_CALLBACK_BYTES)
    {
        anyhow::bail!("Bad Request: BUTTON_DATA_INVALID ({:?})", button.data);
    }
    Ok(())
}

impl RecordingMessenger {
    /// Everything sent since the last call.
    pub fn take(&self) -> Vec<Outgoing> {
        std::mem::take(&mut *self.outbox.lock().unwrap())
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send(&self, chat_id: i64, text: &str, keyboard: Option<&Keyboard>) -> Result<()> {
        if let Some(Keyboard::Inline(inline)) = keyboard {
            check_callback_data(Some(inline))?;
        }
        self.outbox.lock().unwrap().push(Outgoing::Send {
            chat_id,
            text: text.to_string(),
            keyboard: keyboard.cloned(),
        });
        Ok(())
    }

    async fn edit(
        &self,
        chat_id: i64,
        message_id: i32,
        text: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<()> {
        check_callback_data(keyboard)?;
        self.outbox.lock().unwrap().push(Outgoing::Edit {
            chat_id,
            message_id,
            text: text.to_string(),
            keyboard: keyboard.cloned(),
        });
        Ok(())
    }

    async fn edit_keyboard(
        &self,
        chat_id: i64,
        message_id: i32,
        keyboard: &InlineKeyboard,
    ) -> Result<()> {
        check_callback_data(Some(keyboard))?;
        self.outbox.lock().unwrap().push(Outgoing::EditKeyboard {
            chat_id,
            message_id,
            keyboard: keyboard.clone(),
        });
        Ok(())
    }
}

/// A fully wired notifier over fake servers.
pub struct Harness {
    pub tracker: SharedTracker,
    pub preferences: Arc<dyn PreferenceStore>,
    pub messenger: Arc<RecordingMessenger>,
    pub router: CommandRouter,
    pub reconciler: Reconciler,
}

impl Harness {
    pub async fn new(servers: Vec<Arc<FakeRegistry>>) -> Self {
        let db = Connection::open_in_memory().expect("in-memory db");
        let store = SqlitePreferenceStore::new(Arc::new(tokio::sync::Mutex::new(db)));
        store.initialize().await.expect("init preference tables");
        Self::with_store(servers, Arc::new(store), true)
    }

    pub fn with_store(
        servers: Vec<Arc<FakeRegistry>>,
        preferences: Arc<dyn PreferenceStore>,
        show_server: bool,
    ) -> Self {
        let pool = ServerPool::new(
            servers
                .into_iter()
                .map(|s| ServerBinding::new(s as Arc<dyn ProcessRegistry>))
                .collect(),
        );
        let tracker = ProcessTracker::shared();
        let messenger = Arc::new(RecordingMessenger::default());
        let router = CommandRouter::new(
            pool.clone(),
            tracker.clone(),
            preferences.clone(),
            messenger.clone(),
            RouterSettings {
                allowed_chats: HashSet::from([ADMIN, OPERATOR]),
                page_size: 2,
                show_server,
            },
        );
        let reconciler = Reconciler::new(
            pool,
            tracker.clone(),
            preferences.clone(),
            messenger.clone(),
        );
        Self {
            tracker,
            preferences,
            messenger,
            router,
            reconciler,
        }
    }

    pub async fn text(&self, chat_id: i64, text: &str) -> Vec<Outgoing> {
        self.router
            .handle(Inbound::Message {
                chat_id,
                text: text.to_string(),
            })
            .await
            .unwrap();
        self.messenger.take()
    }

    pub async fn press(&self, chat_id: i64, message_id: i32, data: &str) -> Vec<Outgoing> {
        self.router
            .handle(Inbound::Callback {
                chat_id,
                message_id,
                data: data.to_string(),
            })
            .await
            .unwrap();
        self.messenger.take()
    }
}
