pub mod xmlrpc;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::core::error::{NotifierError, NotifierResult};
use crate::core::process::{NO_DESCRIPTION, ProcessRecord, ProcessState, UNKNOWN_NAME};
use crate::core::server_id;
use xmlrpc::{MethodResponse, Value};

/// The slice of a process supervisor's RPC surface the notifier relies on.
#[async_trait]
pub trait ProcessRegistry: Send + Sync {
    fn endpoint(&self) -> &str;
    async fn list_processes(&self) -> NotifierResult<Vec<ProcessRecord>>;
    async fn get_process(&self, name: &str) -> NotifierResult<ProcessRecord>;
    async fn start_process(&self, name: &str) -> NotifierResult<()>;
    async fn stop_process(&self, name: &str) -> NotifierResult<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// supervisord XML-RPC client bound to one endpoint.
pub struct SupervisorClient {
    endpoint: String,
    credentials: Option<Credentials>,
    http: reqwest::Client,
}

impl SupervisorClient {
    pub fn new(
        endpoint: &str,
        credentials: Option<Credentials>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            endpoint: endpoint.to_string(),
            credentials,
            http,
        })
    }

    async fn call(&self, method: &'static str, params: &[Value]) -> NotifierResult<MethodResponse> {
        debug!(endpoint = %self.endpoint, method, "XML-RPC call");
        let mut request = self
            .http
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "text/xml")
            .body(xmlrpc::encode_call(method, params));
        if let Some(creds) = &self.credentials {
            request = request.basic_auth(&creds.username, Some(&creds.password));
        }

        let res = request
            .send()
            .await
            .map_err(|e| NotifierError::transport(&self.endpoint, method, e))?;
        let status = res.status();
        if !status.is_success() {
            return Err(NotifierError::transport(
                &self.endpoint,
                method,
                format!("HTTP {}", status),
            ));
        }
        let body = res
            .text()
            .await
            .map_err(|e| NotifierError::transport(&self.endpoint, method, e))?;
        xmlrpc::decode_response(&body)
            .map_err(|e| NotifierError::transport(&self.endpoint, method, e))
    }

    /// Calls a method whose success value is a boolean, treating `false` as failure.
    async fn call_control(&self, method: &'static str, name: &str) -> NotifierResult<()> {
        match self.call(method, &[Value::Str(name.to_string())]).await? {
            MethodResponse::Success(value) if value.as_bool() == Some(false) => Err(
                NotifierError::transport(&self.endpoint, method, format!("{} returned false", name)),
            ),
            MethodResponse::Success(_) => Ok(()),
            MethodResponse::Fault { code, message } => Err(NotifierError::transport(
                &self.endpoint,
                method,
                format!("fault {}: {}", code, message),
            )),
        }
    }
}

#[async_trait]
impl ProcessRegistry for SupervisorClient {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn list_processes(&self) -> NotifierResult<Vec<ProcessRecord>> {
        const METHOD: &str = "supervisor.getAllProcessInfo";
        match self.call(METHOD, &[]).await? {
            MethodResponse::Success(Value::Array(items)) => Ok(items
                .iter()
                .map(|item| decode_process(item, &self.endpoint))
                .collect()),
            MethodResponse::Success(other) => Err(NotifierError::transport(
                &self.endpoint,
                METHOD,
                format!("expected an array, got {:?}", other),
            )),
            MethodResponse::Fault { code, message } => Err(NotifierError::transport(
                &self.endpoint,
                METHOD,
                format!("fault {}: {}", code, message),
            )),
        }
    }

    async fn get_process(&self, name: &str) -> NotifierResult<ProcessRecord> {
        match self
            .call("supervisor.getProcessInfo", &[Value::Str(name.to_string())])
            .await?
        {
            MethodResponse::Success(value) => Ok(decode_process(&value, &self.endpoint)),
            MethodResponse::Fault { code, message } => {
                debug!(endpoint = %self.endpoint, code, %message, "getProcessInfo fault");
                Err(NotifierError::NotFound(format!(
                    "process {} on {}",
                    name, self.endpoint
                )))
            }
        }
    }

    async fn start_process(&self, name: &str) -> NotifierResult<()> {
        self.call_control("supervisor.startProcess", name).await
    }

    async fn stop_process(&self, name: &str) -> NotifierResult<()> {
        self.call_control("supervisor.stopProcess", name).await
    }
}

/// Maps a loosely typed process-info struct onto a record, defaulting anything
/// missing or mistyped instead of failing the whole reply.
pub fn decode_process(value: &Value, endpoint: &str) -> ProcessRecord {
    ProcessRecord {
        name: text_field(value, "name").unwrap_or(UNKNOWN_NAME).to_string(),
        group: text_field(value, "group").unwrap_or_default().to_string(),
        state: text_field(value, "statename")
            .map(ProcessState::from_statename)
            .unwrap_or(ProcessState::Unknown),
        description: text_field(value, "description")
            .unwrap_or(NO_DESCRIPTION)
            .to_string(),
        server_endpoint: endpoint.to_string(),
    }
}

fn text_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.member(key).and_then(Value::as_str)
}

/// One configured supervisor instance and the client that talks to it.
#[derive(Clone)]
pub struct ServerBinding {
    pub endpoint: String,
    pub token: String,
    pub registry: Arc<dyn ProcessRegistry>,
}

impl ServerBinding {
    pub fn new(registry: Arc<dyn ProcessRegistry>) -> Self {
        let endpoint = registry.endpoint().to_string();
        Self {
            token: server_id::shorten(&endpoint),
            endpoint,
            registry,
        }
    }
}

/// The fixed set of servers the notifier watches, in configuration order.
#[derive(Clone, Default)]
pub struct ServerPool {
    bindings: Vec<ServerBinding>,
}

impl ServerPool {
    pub fn new(bindings: Vec<ServerBinding>) -> Self {
        for (i, a) in bindings.iter().enumerate() {
            if let Some(b) = bindings[..i].iter().find(|b| b.token == a.token) {
                warn!(
                    "Servers {} and {} share short token {}; callbacks resolve to {}",
                    b.endpoint, a.endpoint, a.token, b.endpoint
                );
            }
        }
        Self { bindings }
    }

    pub fn bindings(&self) -> &[ServerBinding] {
        &self.bindings
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn by_endpoint(&self, endpoint: &str) -> Option<&ServerBinding> {
        self.bindings.iter().find(|b| b.endpoint == endpoint)
    }

    pub fn by_token(&self, token: &str) -> Option<&ServerBinding> {
        let endpoint = server_id::resolve(token, self.bindings.iter().map(|b| b.endpoint.as_str()))?;
        self.by_endpoint(endpoint)
    }

    /// Lists every server concurrently. Results come back in configuration
    /// order, one per server, so a failing server never hides the others.
    pub async fn list_all(&self) -> Vec<(ServerBinding, NotifierResult<Vec<ProcessRecord>>)> {
        let mut set = tokio::task::JoinSet::new();
        for (idx, binding) in self.bindings.iter().cloned().enumerate() {
            set.spawn(async move {
                let result = binding.registry.list_processes().await;
                (idx, binding, result)
            });
        }

        let mut results = Vec::with_capacity(self.bindings.len());
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(entry) => results.push(entry),
                Err(e) => warn!("Process listing task failed: {}", e),
            }
        }
        results.sort_by_key(|(idx, _, _)| *idx);
        results
            .into_iter()
            .map(|(_, binding, result)| (binding, result))
            .collect()
    }

    /// Every process on every reachable server; unreachable servers are logged and skipped.
    pub async fn all_processes(&self) -> Vec<ProcessRecord> {
        let mut all = Vec::new();
        for (binding, result) in self.list_all().await {
            match result {
                Ok(records) => all.extend(records),
                Err(e) => warn!(endpoint = %binding.endpoint, "Failed to list processes: {}", e),
            }
        }
        all
    }

    /// Processes named `query` (full or bare name) across all reachable servers.
    pub async fn find(&self, query: &str) -> Vec<ProcessRecord> {
        self.all_processes()
            .await
            .into_iter()
            .filter(|record| record.matches(query))
            .collect()
    }
}
