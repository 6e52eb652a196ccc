use sha1::{Digest, Sha1};

use crate::core::server_id::TOKEN_LEN;

/// Telegram rejects callback data longer than this many bytes.
pub const MAX_CALLBACK_BYTES: usize = 64;

/// Hex characters kept from a process-name digest.
pub const NAME_DIGEST_LEN: usize = 16;

const NAME_DIGEST_MARKER: char = '#';

/// Stable short form of a full process name, used when the name itself does
/// not fit in callback data.
pub fn name_digest(full_name: &str) -> String {
    let mut digest = hex::encode(Sha1::digest(full_name.as_bytes()));
    digest.truncate(NAME_DIGEST_LEN);
    digest
}

/// The digest carried by a `#<digest>` process field, if that is what it is.
pub fn digest_ref(process: &str) -> Option<&str> {
    process
        .strip_prefix(NAME_DIGEST_MARKER)
        .filter(|d| d.len() == NAME_DIGEST_LEN && d.chars().all(|c| c.is_ascii_hexdigit()))
}

fn scoped(action: &str, process: &str, server: &str) -> String {
    let data = format!("{}_{}_{}", action, process, server);
    if data.len() <= MAX_CALLBACK_BYTES {
        return data;
    }
    format!(
        "{}_{}{}_{}",
        action,
        NAME_DIGEST_MARKER,
        name_digest(process),
        server
    )
}

/// Actions carried in inline-button callback data.
///
/// Process-scoped actions encode as `<action>_<full name>_<server token>`.
/// The token is always the last `_`-separated segment, so process names may
/// contain underscores themselves. Names too long for Telegram's limit are
/// replaced by `#<digest>` (see [`name_digest`]); the receiver maps the digest
/// back by listing the server's processes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackAction {
    Details { process: String, server: String },
    Start { process: String, server: String },
    Stop { process: String, server: String },
    Choose { process: String, server: String },
    Page(usize),
    ShowAll,
    DoneChoosing,
}

impl CallbackAction {
    pub fn encode(&self) -> String {
        match self {
            CallbackAction::Details { process, server } => scoped("details", process, server),
            CallbackAction::Start { process, server } => scoped("start", process, server),
            CallbackAction::Stop { process, server } => scoped("stop", process, server),
            CallbackAction::Choose { process, server } => scoped("choose", process, server),
            CallbackAction::Page(page) => format!("page_{}", page),
            CallbackAction::ShowAll => "show_all".to_string(),
            CallbackAction::DoneChoosing => "done_choosing".to_string(),
        }
    }

    pub fn parse(data: &str) -> Option<Self> {
        match data {
            "show_all" => return Some(CallbackAction::ShowAll),
            "done_choosing" => return Some(CallbackAction::DoneChoosing),
            _ => {}
        }
        if let Some(page) = data.strip_prefix("page_") {
            return page.parse().ok().filter(|p| *p >= 1).map(CallbackAction::Page);
        }

        let (action, rest) = data.split_once('_')?;
        let (process, server) = rest.rsplit_once('_')?;
        if process.is_empty()
            || server.len() != TOKEN_LEN
            || !server.chars().all(|c| c.is_ascii_hexdigit())
        {
            return None;
        }
        let (process, server) = (process.to_string(), server.to_string());
        match action {
            "details" => Some(CallbackAction::Details { process, server }),
            "start" => Some(CallbackAction::Start { process, server }),
            "stop" => Some(CallbackAction::Stop { process, server }),
            "choose" => Some(CallbackAction::Choose { process, server }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_process_actions_with_underscores_in_name() {
        assert_eq!(
            CallbackAction::parse("stop_queue:mail_sender_1_0a1b2c3d"),
            Some(CallbackAction::Stop {
                process: "queue:mail_sender_1".to_string(),
                server: "0a1b2c3d".to_string()
            })
        );
        assert_eq!(
            CallbackAction::parse("details_cron_ffffffff"),
            Some(CallbackAction::Details {
                process: "cron".to_string(),
                server: "ffffffff".to_string()
            })
        );
    }

    #[test]
    fn encode_then_parse_preserves_action() {
        let action = CallbackAction::Choose {
            process: "web:worker_2".to_string(),
            server: "12ab34cd".to_string(),
        };
        assert_eq!(CallbackAction::parse(&action.encode()), Some(action));
    }

    #[test]
    fn parses_navigation_actions() {
        assert_eq!(CallbackAction::parse("page_3"), Some(CallbackAction::Page(3)));
        assert_eq!(CallbackAction::parse("page_0"), None);
        assert_eq!(CallbackAction::parse("page_x"), None);
        assert_eq!(CallbackAction::parse("show_all"), Some(CallbackAction::ShowAll));
        assert_eq!(
            CallbackAction::parse("done_choosing"),
            Some(CallbackAction::DoneChoosing)
        );
    }

    #[test]
    fn long_names_fall_back_to_a_digest_within_the_limit() {
        let process = "celery-worker-high-priority:celery-worker-high-priority_00";
        let action = CallbackAction::Start {
            process: process.to_string(),
            server: "0a1b2c3d".to_string(),
        };
        let data = action.encode();
        assert!(data.len() <= MAX_CALLBACK_BYTES, "{} bytes", data.len());
        assert_eq!(data, format!("start_#{}_0a1b2c3d", name_digest(process)));

        match CallbackAction::parse(&data) {
            Some(CallbackAction::Start { process: field, server }) => {
                assert_eq!(digest_ref(&field), Some(name_digest(process).as_str()));
                assert_eq!(server, "0a1b2c3d");
            }
            other => panic!("unexpected parse {:?}", other),
        }
    }

    #[test]
    fn short_names_are_carried_verbatim() {
        let data = CallbackAction::Stop {
            process: "web:worker".to_string(),
            server: "0a1b2c3d".to_string(),
        }
        .encode();
        assert_eq!(data, "stop_web:worker_0a1b2c3d");
        assert_eq!(digest_ref("web:worker"), None);
        assert_eq!(digest_ref("#nothex"), None);
    }

    #[test]
    fn rejects_malformed_payloads() {
        for data in [
            "",
            "start",
            "start_worker",
            "start__0a1b2c3d",
            "start_worker_nothex!!",
            "start_worker_0a1b",
            "restart_worker_0a1b2c3d",
        ] {
            assert_eq!(CallbackAction::parse(data), None, "payload {:?}", data);
        }
    }
}
