//! Stub collaborators for runner tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use agentroom_protocols::{
    ChannelAdapter, ChannelError, Conversation, DecisionError, DecisionLoop, RecoveredClaim,
    ResourceError, ResourceManager, TaskId, TaskSink, Updates, resource_name,
};
use agentroom_runner::{ResourceLedger, TaskRegistry};
use agentroom_state::StateStore;
use async_trait::async_trait;
use serde_json::json;
use tempfile::TempDir;

/// Ordered log of notable events across all stubs.
#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn push(&self, event: impl Into<String>) {
        self.0.lock().unwrap().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn position(&self, event: &str) -> Option<usize> {
        self.events().iter().position(|e| e == event)
    }

    pub fn count(&self, event: &str) -> usize {
        self.events().iter().filter(|e| *e == event).count()
    }
}

#[derive(Default)]
pub struct StubResources {
    pub log: EventLog,
    pub alive: Mutex<HashSet<TaskId>>,
    pub fail_create: Mutex<bool>,
    pub fail_destroy: Mutex<bool>,
    pub fail_checkout: Mutex<bool>,
    pub create_delay: Mutex<Option<Duration>>,
    pub created: Mutex<Vec<TaskId>>,
    pub destroyed: Mutex<Vec<TaskId>>,
    pub checkouts: Mutex<Vec<(TaskId, String)>>,
}

impl StubResources {
    pub fn with_log(log: EventLog) -> Self {
        Self {
            log,
            ..Default::default()
        }
    }

    pub fn set_alive(&self, task_id: &str) {
        self.alive.lock().unwrap().insert(TaskId::new(task_id));
    }

    pub fn created(&self) -> Vec<TaskId> {
        self.created.lock().unwrap().clone()
    }

    pub fn destroyed(&self) -> Vec<TaskId> {
        self.destroyed.lock().unwrap().clone()
    }

    pub fn checkouts(&self) -> Vec<(TaskId, String)> {
        self.checkouts.lock().unwrap().clone()
    }

    /// Make every `create` take `delay` before it returns.
    pub fn slow_create(&self, delay: Duration) {
        *self.create_delay.lock().unwrap() = Some(delay);
    }
}

#[async_trait]
impl ResourceManager for StubResources {
    async fn create(&self, task_id: &TaskId) -> Result<String, ResourceError> {
        let name = resource_name(task_id);
        self.log.push(format!("creating:{}", task_id));
        let delay = *self.create_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if *self.fail_create.lock().unwrap() {
            return Err(ResourceError::CreateFailed {
                name,
                message: "image missing".to_string(),
            });
        }
        self.created.lock().unwrap().push(task_id.clone());
        self.alive.lock().unwrap().insert(task_id.clone());
        self.log.push(format!("create:{}", task_id));
        Ok(name)
    }

    async fn destroy(&self, task_id: &TaskId) -> Result<(), ResourceError> {
        if *self.fail_destroy.lock().unwrap() {
            return Err(ResourceError::DestroyFailed {
                name: resource_name(task_id),
                message: "busy".to_string(),
            });
        }
        self.destroyed.lock().unwrap().push(task_id.clone());
        self.alive.lock().unwrap().remove(task_id);
        self.log.push(format!("destroy:{}", task_id));
        Ok(())
    }

    async fn probe_alive(&self, task_id: &TaskId) -> Result<bool, ResourceError> {
        Ok(self.alive.lock().unwrap().contains(task_id))
    }

    async fn checkout(&self, task_id: &TaskId, url: &str) -> Result<(), ResourceError> {
        if *self.fail_checkout.lock().unwrap() {
            return Err(ResourceError::CheckoutFailed {
                name: resource_name(task_id),
                message: "repository not found".to_string(),
            });
        }
        self.checkouts
            .lock()
            .unwrap()
            .push((task_id.clone(), url.to_string()));
        self.log.push(format!("checkout:{}", task_id));
        Ok(())
    }
}

/// Decision loop that records its calls and echoes the message.
///
/// Messages starting with `fail` return an error, messages starting with
/// `panic` panic.
#[derive(Default)]
pub struct StubDecider {
    pub log: EventLog,
    pub delays: Mutex<HashMap<TaskId, Duration>>,
    pub calls: Mutex<Vec<(TaskId, String)>>,
    pub prompts: Mutex<Vec<String>>,
}

impl StubDecider {
    pub fn with_log(log: EventLog) -> Self {
        Self {
            log,
            ..Default::default()
        }
    }

    pub fn set_delay(&self, task_id: &str, delay: Duration) {
        self.delays
            .lock()
            .unwrap()
            .insert(TaskId::new(task_id), delay);
    }

    pub fn calls(&self) -> Vec<(TaskId, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn messages_for(&self, task_id: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|(id, _)| id.as_str() == task_id)
            .map(|(_, message)| message)
            .collect()
    }
}

#[async_trait]
impl DecisionLoop for StubDecider {
    async fn handle(
        &self,
        task_id: &TaskId,
        message: &str,
        system_prompt: &str,
        conversation: &mut Conversation,
        updates: &Updates,
    ) -> Result<String, DecisionError> {
        self.calls
            .lock()
            .unwrap()
            .push((task_id.clone(), message.to_string()));
        self.prompts.lock().unwrap().push(system_prompt.to_string());
        self.log.push(format!("begin:{}:{}", task_id, message));

        let delay = self.delays.lock().unwrap().get(task_id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        conversation.push(json!({"role": "user", "content": message}));
        updates.send(&format!("working on {}", message)).await;

        if message.starts_with("panic") {
            panic!("decision loop blew up");
        }
        if message.starts_with("fail") {
            return Err(DecisionError::ExecutionFailed(format!("cannot {}", message)));
        }

        conversation.push(json!({"role": "assistant", "content": format!("done: {}", message)}));
        Ok(format!("done: {}", message))
    }
}

/// Channel that records everything delivered to it.
pub struct StubChannel {
    pub id: String,
    pub log: EventLog,
    pub invalid: Mutex<HashSet<TaskId>>,
    pub claims: Mutex<Vec<RecoveredClaim>>,
    pub fail_connect: Mutex<bool>,
    pub fail_recover: Mutex<bool>,
    pub fail_start: Mutex<bool>,
    pub panic_on_deliver: Mutex<bool>,
    pub repository: Mutex<Option<String>>,
    pub results: Mutex<Vec<(TaskId, String)>>,
    pub errors: Mutex<Vec<(TaskId, String)>>,
    pub updates: Mutex<Vec<(TaskId, String)>>,
    pub sink: Mutex<Option<Arc<dyn TaskSink>>>,
}

impl StubChannel {
    pub fn new(id: &str, log: EventLog) -> Self {
        Self {
            id: id.to_string(),
            log,
            invalid: Mutex::new(HashSet::new()),
            claims: Mutex::new(Vec::new()),
            fail_connect: Mutex::new(false),
            fail_recover: Mutex::new(false),
            fail_start: Mutex::new(false),
            panic_on_deliver: Mutex::new(false),
            repository: Mutex::new(None),
            results: Mutex::new(Vec::new()),
            errors: Mutex::new(Vec::new()),
            updates: Mutex::new(Vec::new()),
            sink: Mutex::new(None),
        }
    }

    pub fn invalidate(&self, task_id: &str) {
        self.invalid.lock().unwrap().insert(TaskId::new(task_id));
    }

    pub fn claim(&self, claim: RecoveredClaim) {
        self.claims.lock().unwrap().push(claim);
    }

    pub fn results(&self) -> Vec<(TaskId, String)> {
        self.results.lock().unwrap().clone()
    }

    pub fn results_for(&self, task_id: &str) -> Vec<String> {
        self.results()
            .into_iter()
            .filter(|(id, _)| id.as_str() == task_id)
            .map(|(_, text)| text)
            .collect()
    }

    pub fn errors(&self) -> Vec<(TaskId, String)> {
        self.errors.lock().unwrap().clone()
    }

    pub fn sink(&self) -> Option<Arc<dyn TaskSink>> {
        self.sink.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChannelAdapter for StubChannel {
    fn id(&self) -> &str {
        &self.id
    }

    fn system_prompt(&self) -> &str {
        "stub prompt"
    }

    async fn send_update(&self, task_id: &TaskId, text: &str) -> Result<(), ChannelError> {
        self.updates
            .lock()
            .unwrap()
            .push((task_id.clone(), text.to_string()));
        Ok(())
    }

    async fn deliver_result(&self, task_id: &TaskId, text: &str) -> Result<(), ChannelError> {
        if *self.panic_on_deliver.lock().unwrap() {
            self.log.push(format!("panic:{}", task_id));
            panic!("channel blew up");
        }
        self.results
            .lock()
            .unwrap()
            .push((task_id.clone(), text.to_string()));
        self.log.push(format!("result:{}:{}", task_id, text));
        Ok(())
    }

    async fn deliver_error(&self, task_id: &TaskId, error: &str) -> Result<(), ChannelError> {
        self.errors
            .lock()
            .unwrap()
            .push((task_id.clone(), error.to_string()));
        self.log.push(format!("error:{}", task_id));
        Ok(())
    }

    async fn is_valid(&self, task_id: &TaskId) -> bool {
        !self.invalid.lock().unwrap().contains(task_id)
    }

    fn checkout_url(&self, _task_id: &TaskId) -> Option<String> {
        self.repository.lock().unwrap().clone()
    }

    async fn connect(&self) -> Result<(), ChannelError> {
        self.log.push(format!("connect:{}", self.id));
        if *self.fail_connect.lock().unwrap() {
            return Err(ChannelError::ConnectionFailed("homeserver down".to_string()));
        }
        Ok(())
    }

    async fn recover_tasks(&self) -> Result<Vec<RecoveredClaim>, ChannelError> {
        self.log.push(format!("recover:{}", self.id));
        if *self.fail_recover.lock().unwrap() {
            return Err(ChannelError::RecoveryFailed("api unreachable".to_string()));
        }
        Ok(std::mem::take(&mut *self.claims.lock().unwrap()))
    }

    async fn start(&self, sink: Arc<dyn TaskSink>) -> Result<(), ChannelError> {
        if *self.fail_start.lock().unwrap() {
            return Err(ChannelError::ConnectionFailed("port in use".to_string()));
        }
        self.log.push(format!("start:{}", self.id));
        *self.sink.lock().unwrap() = Some(sink);
        Ok(())
    }

    async fn stop(&self) -> Result<(), ChannelError> {
        self.log.push(format!("stop:{}", self.id));
        Ok(())
    }
}

/// Registry wired to stubs and a state file in a temp dir.
pub struct Harness {
    pub dir: TempDir,
    pub log: EventLog,
    pub resources: Arc<StubResources>,
    pub decider: Arc<StubDecider>,
    pub state: Arc<StateStore>,
    pub registry: Arc<TaskRegistry>,
}

impl Harness {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let state = Arc::new(StateStore::new(dir.path().join("state.json")));
        Self::with_state(dir, state)
    }

    /// Harness over a state file that already exists in `dir`.
    pub fn with_state(dir: TempDir, state: Arc<StateStore>) -> Self {
        let log = EventLog::default();
        let resources = Arc::new(StubResources::with_log(log.clone()));
        let decider = Arc::new(StubDecider::with_log(log.clone()));
        let ledger = Arc::new(ResourceLedger::new(resources.clone(), state.clone()));
        let registry = Arc::new(TaskRegistry::new(ledger, decider.clone()));
        Self {
            dir,
            log,
            resources,
            decider,
            state,
            registry,
        }
    }

    pub fn channel(&self, id: &str) -> Arc<StubChannel> {
        Arc::new(StubChannel::new(id, self.log.clone()))
    }
}

/// Poll `condition` until it holds or `timeout` elapses.
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

pub const WAIT: Duration = Duration::from_secs(5);
