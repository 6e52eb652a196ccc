use std::fmt;

pub const UNKNOWN_NAME: &str = "Unknown";
pub const NO_DESCRIPTION: &str = "No description available";

/// Process states as reported by supervisord's `statename` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProcessState {
    Running,
    Starting,
    Stopping,
    Stopped,
    Backoff,
    Exited,
    Fatal,
    Unknown,
}

impl ProcessState {
    pub fn as_str(self) -> &'static str {
        match self {
            ProcessState::Running => "RUNNING",
            ProcessState::Starting => "STARTING",
            ProcessState::Stopping => "STOPPING",
            ProcessState::Stopped => "STOPPED",
            ProcessState::Backoff => "BACKOFF",
            ProcessState::Exited => "EXITED",
            ProcessState::Fatal => "FATAL",
            ProcessState::Unknown => "UNKNOWN",
        }
    }

    /// Anything supervisord sends that we do not recognise collapses to `Unknown`.
    pub fn from_statename(value: &str) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "RUNNING" => ProcessState::Running,
            "STARTING" => ProcessState::Starting,
            "STOPPING" => ProcessState::Stopping,
            "STOPPED" => ProcessState::Stopped,
            "BACKOFF" => ProcessState::Backoff,
            "EXITED" => ProcessState::Exited,
            "FATAL" => ProcessState::Fatal,
            _ => ProcessState::Unknown,
        }
    }

    pub fn is_running(self) -> bool {
        self == ProcessState::Running
    }

    pub fn icon(self) -> &'static str {
        match self {
            ProcessState::Running => "🟢",
            ProcessState::Stopped => "🔴",
            ProcessState::Starting => "🟡",
            ProcessState::Stopping => "🟠",
            ProcessState::Fatal => "⚠️",
            _ => "❓",
        }
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One supervised process as seen on one server at one moment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRecord {
    pub name: String,
    pub group: String,
    pub state: ProcessState,
    pub description: String,
    pub server_endpoint: String,
}

impl ProcessRecord {
    /// `group:name`, or just `name` for processes outside a group.
    /// supervisord accepts this form for start/stop calls.
    pub fn full_name(&self) -> String {
        if self.group.is_empty() {
            self.name.clone()
        } else {
            format!("{}:{}", self.group, self.name)
        }
    }

    pub fn identity_key(&self) -> String {
        identity_key(&self.server_endpoint, &self.full_name())
    }

    /// True when `query` names this process either fully (`group:name`) or by bare name.
    pub fn matches(&self, query: &str) -> bool {
        self.full_name() == query || self.name == query
    }
}

pub fn identity_key(endpoint: &str, full_name: &str) -> String {
    format!("{}:{}", endpoint, full_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(group: &str, name: &str) -> ProcessRecord {
        ProcessRecord {
            name: name.to_string(),
            group: group.to_string(),
            state: ProcessState::Running,
            description: String::new(),
            server_endpoint: "http://10.0.0.1:9001/RPC2".to_string(),
        }
    }

    #[test]
    fn identity_key_includes_group_when_present() {
        assert_eq!(
            record("web", "worker").identity_key(),
            "http://10.0.0.1:9001/RPC2:web:worker"
        );
        assert_eq!(
            record("", "cron").identity_key(),
            "http://10.0.0.1:9001/RPC2:cron"
        );
    }

    #[test]
    fn statename_parsing_is_case_insensitive_and_defaults_to_unknown() {
        assert_eq!(ProcessState::from_statename("running"), ProcessState::Running);
        assert_eq!(ProcessState::from_statename(" FATAL "), ProcessState::Fatal);
        assert_eq!(ProcessState::from_statename("EXITED"), ProcessState::Exited);
        assert_eq!(ProcessState::from_statename("bogus"), ProcessState::Unknown);
        assert_eq!(ProcessState::from_statename(""), ProcessState::Unknown);
    }

    #[test]
    fn matches_full_or_bare_name() {
        let r = record("web", "worker");
        assert!(r.matches("web:worker"));
        assert!(r.matches("worker"));
        assert!(!r.matches("web"));
    }
}
