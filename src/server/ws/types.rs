use serde::{Deserialize, Serialize};

use crate::server::models::chat::Message;

/// Frames a client may send on the live channel.
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ClientMessage {
    Subscribe {
        #[serde(rename = "groupId")]
        group_id: String,
    },
    Unsubscribe,
}

/// Frames the server pushes. Clients ignore types they do not know.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerEvent {
    Message {
        payload: Message,
    },
    Subscribed {
        #[serde(rename = "groupId")]
        group_id: String,
    },
    Error {
        message: String,
    },
}
