use serde::{Deserialize, Serialize};

/// Messages the worker posts back to its host.
///
/// The wire shapes are fixed: `{"status":"loading","message":...}` for
/// progress, `{"status":"ready"}` exactly once after a successful bootstrap,
/// and `{"result":...}` / `{"error":...}` as mutually exclusive terminal
/// outcomes of a single inbound request. `Status` lines are informational
/// and never mark request completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutboundMessage {
    Status { status: LoadingTag, message: String },
    Ready { status: ReadyTag },
    Result { result: String },
    Error { error: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadingTag {
    #[serde(rename = "loading")]
    Loading,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadyTag {
    #[serde(rename = "ready")]
    Ready,
}

impl OutboundMessage {
    pub fn status(message: impl Into<String>) -> Self {
        Self::Status {
            status: LoadingTag::Loading,
            message: message.into(),
        }
    }

    pub fn ready() -> Self {
        Self::Ready {
            status: ReadyTag::Ready,
        }
    }

    pub fn result(text: impl Into<String>) -> Self {
        Self::Result {
            result: text.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error: message.into(),
        }
    }
}
