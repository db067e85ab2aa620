//! Room bookkeeping that does not need a homeserver.

use std::collections::HashSet;

use agentroom_protocols::{RecoveredClaim, TaskId};
use matrix_sdk::ruma::OwnedRoomId;

use crate::room_task_id;

/// Claims for the joined rooms that still have a recorded sandbox.
///
/// Rooms are kept, not resumed: a chat message is never replayed.
pub fn recovered_claims(
    joined: impl IntoIterator<Item = OwnedRoomId>,
    recorded: &HashSet<TaskId>,
) -> Vec<RecoveredClaim> {
    joined
        .into_iter()
        .map(|room_id| room_task_id(&room_id))
        .filter(|task_id| recorded.contains(task_id))
        .map(RecoveredClaim::keep)
        .collect()
}

/// Notice for a message that has `ahead` messages queued or running
/// before it. `None` when it starts right away.
pub fn queue_notice(ahead: usize) -> Option<String> {
    (ahead > 0).then(|| {
        format!(
            "Queued (position {}). I'll get to this after the current task.",
            ahead + 1
        )
    })
}

/// Intermediate output, as a code block.
pub fn format_update(text: &str) -> String {
    format!("```\n{}\n```", text.trim())
}

/// Whether the bot should leave a room once `others` members besides
/// itself remain joined.
pub fn should_leave(others: usize) -> bool {
    others == 0
}
