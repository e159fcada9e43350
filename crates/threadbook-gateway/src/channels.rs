//! Channel and room naming. Publishers and token claims must agree on these
//! strings, so every name in the system comes from here.

use threadbook_types::events::Target;
use threadbook_types::{ThreadId, UserId};

pub fn user_channel(user_id: UserId) -> String {
    format!("user#{}", user_id)
}

pub fn thread_channel(thread_id: ThreadId) -> String {
    format!("thread#{}", thread_id)
}

pub fn for_target(target: Target) -> String {
    match target {
        Target::User(id) => user_channel(id),
        Target::Thread(id) => thread_channel(id),
    }
}

/// Media room backing a thread's voice call.
pub fn voice_room(thread_id: ThreadId) -> String {
    format!("thread_{}", thread_id)
}
