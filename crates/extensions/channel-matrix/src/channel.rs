//! Matrix room channel.

use std::collections::HashSet;
use std::sync::Arc;

use agentroom_config::MatrixConfig;
use agentroom_protocols::{ChannelAdapter, ChannelError, RecoveredClaim, TaskId, TaskSink};
use agentroom_state::StateStore;
use async_trait::async_trait;
use matrix_sdk::config::{RequestConfig, SyncSettings};
use matrix_sdk::ruma::OwnedUserId;
use matrix_sdk::ruma::events::room::member::{
    MembershipState, OriginalSyncRoomMemberEvent, StrippedRoomMemberEvent,
};
use matrix_sdk::ruma::events::room::message::{
    MessageType, OriginalSyncRoomMessageEvent, RoomMessageEventContent,
};
use matrix_sdk::{Client, Room, RoomMemberships, RoomState};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::rooms::{format_update, queue_notice, recovered_claims, should_leave};
use crate::{SCHEME, parse_room_task_id, room_task_id};

#[cfg(test)]
#[path = "channel_tests.rs"]
mod tests;

const DEFAULT_SYSTEM_PROMPT: &str = "You are a coding assistant running inside a sandboxed \
container with git, Node.js and Python installed. Work in /workspace. Requests come from a Matrix \
chat room and your final answer is posted back to it, so explain what you did briefly.";

const GREETING: &str = "Ready! Send me a task to get started.";

/// Attempts per homeserver request before giving up.
const REQUEST_RETRIES: u64 = 3;

struct Syncer {
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

/// One task per joined room.
///
/// [`connect`](ChannelAdapter::connect) logs in and runs one sync so room
/// membership is known before recovery. Events are only dispatched once
/// [`start`](ChannelAdapter::start) registers the handlers and begins
/// syncing from where `connect` stopped, so nothing sent before the
/// restart is replayed.
pub struct MatrixChannel {
    config: MatrixConfig,
    state: Arc<StateStore>,
    system_prompt: String,
    client: Mutex<Option<Client>>,
    sync_token: Mutex<Option<String>>,
    syncer: Mutex<Option<Syncer>>,
}

impl MatrixChannel {
    /// `state` tells recovery which rooms still own a sandbox.
    pub fn new(config: MatrixConfig, state: Arc<StateStore>) -> Self {
        let system_prompt = config
            .system_prompt
            .clone()
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());
        Self {
            config,
            state,
            system_prompt,
            client: Mutex::new(None),
            sync_token: Mutex::new(None),
            syncer: Mutex::new(None),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.client.lock().is_some()
    }

    pub fn is_started(&self) -> bool {
        self.syncer.lock().is_some()
    }

    fn client(&self) -> Result<Client, ChannelError> {
        self.client
            .lock()
            .clone()
            .ok_or_else(|| ChannelError::NotStarted(SCHEME.to_string()))
    }

    fn sync_settings(&self) -> SyncSettings {
        let settings = SyncSettings::default().timeout(self.config.sync_timeout());
        match self.sync_token.lock().clone() {
            Some(token) => settings.token(token),
            None => settings,
        }
    }

    fn room(&self, task_id: &TaskId) -> Result<Room, ChannelError> {
        let room_id = parse_room_task_id(task_id)
            .ok_or_else(|| ChannelError::SendFailed(format!("not a Matrix room: {}", task_id)))?;
        self.client()?
            .get_room(&room_id)
            .ok_or_else(|| ChannelError::SendFailed(format!("unknown room {}", room_id)))
    }

    async fn send_text(&self, task_id: &TaskId, body: String) -> Result<(), ChannelError> {
        let room = self.room(task_id)?;
        room.send(RoomMessageEventContent::text_plain(body))
            .await
            .map_err(|e| ChannelError::SendFailed(e.to_string()))?;
        Ok(())
    }
}

/// Join rooms the bot is invited to and say hello.
async fn on_invite(event: StrippedRoomMemberEvent, room: Room, own_user: OwnedUserId) {
    if event.state_key != own_user {
        return;
    }

    info!("Invited to {} by {}", room.room_id(), event.sender);
    if let Err(e) = room.join().await {
        warn!("Failed to join {}: {}", room.room_id(), e);
        return;
    }
    if let Err(e) = room.send(RoomMessageEventContent::text_plain(GREETING)).await {
        warn!("Failed to greet {}: {}", room.room_id(), e);
    }
}

/// Queue text messages of joined rooms, telling the sender when the room
/// is already busy.
async fn on_message(
    event: OriginalSyncRoomMessageEvent,
    room: Room,
    own_user: OwnedUserId,
    sink: Arc<dyn TaskSink>,
) {
    if event.sender == own_user || room.state() != RoomState::Joined {
        return;
    }
    let MessageType::Text(text) = event.content.msgtype else {
        return;
    };

    let task_id = room_task_id(room.room_id());
    let ahead = sink.backlog(&task_id);
    debug!("Message from {} in {} ({} ahead)", event.sender, room.room_id(), ahead);
    sink.submit(task_id, text.body);

    if let Some(notice) = queue_notice(ahead) {
        if let Err(e) = room.send(RoomMessageEventContent::text_plain(notice)).await {
            warn!("Failed to send queue notice to {}: {}", room.room_id(), e);
        }
    }
}

/// Leave a room once every other member is gone. The sandbox itself is
/// destroyed by the reconciler when the room stops being valid.
async fn on_member(event: OriginalSyncRoomMemberEvent, room: Room, own_user: OwnedUserId) {
    if !matches!(
        event.content.membership,
        MembershipState::Leave | MembershipState::Ban
    ) {
        return;
    }

    if event.state_key == own_user {
        info!("Removed from {}", room.room_id());
        return;
    }

    let members = match room.members(RoomMemberships::JOIN).await {
        Ok(members) => members,
        Err(e) => {
            warn!("Could not list members of {}: {}", room.room_id(), e);
            return;
        }
    };
    let others = members
        .iter()
        .filter(|member| member.user_id() != &*own_user)
        .count();

    if should_leave(others) {
        info!("Everyone left {}, leaving", room.room_id());
        if let Err(e) = room.leave().await {
            warn!("Failed to leave {}: {}", room.room_id(), e);
        }
    }
}

#[async_trait]
impl ChannelAdapter for MatrixChannel {
    fn id(&self) -> &str {
        SCHEME
    }

    fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    async fn send_update(&self, task_id: &TaskId, text: &str) -> Result<(), ChannelError> {
        self.send_text(task_id, format_update(text)).await
    }

    async fn deliver_result(&self, task_id: &TaskId, text: &str) -> Result<(), ChannelError> {
        self.send_text(task_id, text.to_string()).await?;
        info!("Posted result to {}", task_id);
        Ok(())
    }

    async fn deliver_error(&self, task_id: &TaskId, error: &str) -> Result<(), ChannelError> {
        self.send_text(task_id, format!("Error: {}", error)).await
    }

    /// Joined rooms are valid. Before `connect` nothing is known, so every
    /// room counts as valid.
    async fn is_valid(&self, task_id: &TaskId) -> bool {
        let Some(room_id) = parse_room_task_id(task_id) else {
            return false;
        };
        let Some(client) = self.client.lock().clone() else {
            return true;
        };
        client
            .get_room(&room_id)
            .is_some_and(|room| room.state() == RoomState::Joined)
    }

    async fn connect(&self) -> Result<(), ChannelError> {
        if self.is_connected() {
            return Ok(());
        }
        let password = self.config.password.as_deref().ok_or_else(|| {
            ChannelError::AuthenticationFailed("matrix.password is not set".to_string())
        })?;

        let client = Client::builder()
            .homeserver_url(&self.config.homeserver)
            .request_config(RequestConfig::new().retry_limit(REQUEST_RETRIES))
            .build()
            .await
            .map_err(|e| ChannelError::ConnectionFailed(e.to_string()))?;

        client
            .matrix_auth()
            .login_username(&self.config.user, password)
            .initial_device_display_name(&self.config.device_name)
            .await
            .map_err(|e| {
                ChannelError::AuthenticationFailed(format!(
                    "login as {} failed: {}",
                    self.config.user, e
                ))
            })?;
        info!("Logged in to {} as {}", self.config.homeserver, self.config.user);

        let response = client
            .sync_once(SyncSettings::default().timeout(self.config.sync_timeout()))
            .await
            .map_err(|e| ChannelError::ConnectionFailed(format!("initial sync failed: {}", e)))?;

        // Invites that arrived while offline are stale, so no greeting.
        for room in client.invited_rooms() {
            info!("Joining {} (invited while offline)", room.room_id());
            if let Err(e) = room.join().await {
                warn!("Failed to join {}: {}", room.room_id(), e);
            }
        }

        *self.sync_token.lock() = Some(response.next_batch);
        *self.client.lock() = Some(client);
        Ok(())
    }

    async fn recover_tasks(&self) -> Result<Vec<RecoveredClaim>, ChannelError> {
        let client = self.client()?;
        let recorded: HashSet<TaskId> = self
            .state
            .resources()
            .into_iter()
            .map(|(task_id, _)| task_id)
            .collect();

        let joined = client
            .joined_rooms()
            .into_iter()
            .map(|room| room.room_id().to_owned());
        let claims = recovered_claims(joined, &recorded);

        info!("Recovered {} room(s) with a sandbox", claims.len());
        Ok(claims)
    }

    async fn start(&self, sink: Arc<dyn TaskSink>) -> Result<(), ChannelError> {
        if self.is_started() {
            return Err(ChannelError::AlreadyStarted(SCHEME.to_string()));
        }
        let client = self.client()?;
        let own_user = client
            .user_id()
            .map(ToOwned::to_owned)
            .ok_or_else(|| ChannelError::NotStarted(SCHEME.to_string()))?;

        let user = own_user.clone();
        client.add_event_handler(move |event: StrippedRoomMemberEvent, room: Room| {
            on_invite(event, room, user.clone())
        });
        let user = own_user.clone();
        client.add_event_handler(move |event: OriginalSyncRoomMessageEvent, room: Room| {
            on_message(event, room, user.clone(), sink.clone())
        });
        let user = own_user;
        client.add_event_handler(move |event: OriginalSyncRoomMemberEvent, room: Room| {
            on_member(event, room, user.clone())
        });

        let settings = self.sync_settings();
        let shutdown = CancellationToken::new();
        let signal = shutdown.clone();
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = signal.cancelled() => debug!("Matrix sync cancelled"),
                result = client.sync(settings) => {
                    if let Err(e) = result {
                        error!("Matrix sync stopped: {}", e);
                    }
                }
            }
        });

        info!("Matrix channel listening as {}", self.config.user);
        *self.syncer.lock() = Some(Syncer { shutdown, handle });
        Ok(())
    }

    async fn stop(&self) -> Result<(), ChannelError> {
        let syncer = self.syncer.lock().take();
        let Some(syncer) = syncer else {
            return Ok(());
        };

        syncer.shutdown.cancel();
        if let Err(e) = syncer.handle.await {
            warn!("Matrix sync task failed: {}", e);
        }
        info!("Matrix channel stopped");
        Ok(())
    }
}
