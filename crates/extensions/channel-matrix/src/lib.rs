//! # agentroom Channel - Matrix
//!
//! Every joined Matrix room is one task. The bot joins rooms it is invited
//! to, queues each text message of the room for the room's sandbox, and
//! leaves once the last other member is gone. A room the bot is no longer
//! joined to is invalid, so the reconciler destroys its sandbox.
//!
//! Task ids have the form `matrix:<room id>`.

mod channel;
mod rooms;

pub use channel::MatrixChannel;
pub use rooms::{format_update, queue_notice, recovered_claims, should_leave};

use agentroom_protocols::TaskId;
use matrix_sdk::ruma::{OwnedRoomId, RoomId};

/// Task id scheme of this channel.
pub const SCHEME: &str = "matrix";

pub fn room_task_id(room_id: &RoomId) -> TaskId {
    TaskId::namespaced(SCHEME, room_id.as_str())
}

/// Room of a Matrix task id.
pub fn parse_room_task_id(task_id: &TaskId) -> Option<OwnedRoomId> {
    if task_id.scheme() != Some(SCHEME) {
        return None;
    }
    RoomId::parse(task_id.key()).ok()
}
