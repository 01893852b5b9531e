//! Error taxonomy for the hub core.
//!
//! Every fallible operation on the store, the hub actors, or the admin
//! surface returns [`Error`]. Callers that render errors for humans or an
//! HTTP layer use [`Error::kind`] to pick a status and [`Error::code`] for a
//! stable numeric identifier.

use uuid::Uuid;

/// Result alias used throughout the library.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors produced by the hub core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A channel name is already taken.
    #[error("channel {name} already exists with uuid {uuid}")]
    ChannelExists {
        /// Requested (conflicting) name.
        name: String,
        /// UUID of the existing channel.
        uuid: Uuid,
    },

    /// No channel with the given identity.
    #[error("channel not found: {0}")]
    ChannelNotFound(String),

    /// No device with the given UUID.
    #[error("device not found: {0}")]
    DeviceNotFound(Uuid),

    /// No applet with the given UUID in the channel.
    #[error("applet {applet} not found in channel {channel}")]
    AppletNotFound {
        /// Channel that was searched.
        channel: Uuid,
        /// Applet that was requested.
        applet: Uuid,
    },

    /// The catalog has no app with this id.
    #[error("applet \"{0}\" not registered")]
    UnknownApp(String),

    /// Requested applet position is beyond the channel's applet list.
    #[error("index {index} out of range (channel has {count} applets)")]
    IndexOutOfRange {
        /// Requested position.
        index: i64,
        /// Applet count at the time of the request.
        count: i64,
    },

    /// Malformed or contradictory request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Durable store failure.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Filesystem failure (database directory, app bundles).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Connection-level failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// A client was registered with a hub twice.
    #[error("client already owned by a hub")]
    AlreadyOwned,

    /// The actor's loop has stopped and can no longer accept work.
    #[error("{0} actor is not running")]
    ActorGone(&'static str),
}

/// Coarse classification of [`Error`] values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Channel, device, applet or app absent.
    NotFound,
    /// Uniqueness conflict (duplicate channel name).
    Conflict,
    /// Position beyond the current applet count.
    OutOfRange,
    /// Malformed request.
    Invalid,
    /// Storage or transport failure.
    Io,
    /// Programming error or stopped actor.
    Internal,
}

impl Error {
    /// Classify this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ChannelNotFound(_)
            | Self::DeviceNotFound(_)
            | Self::AppletNotFound { .. }
            | Self::UnknownApp(_) => ErrorKind::NotFound,
            Self::ChannelExists { .. } => ErrorKind::Conflict,
            Self::IndexOutOfRange { .. } => ErrorKind::OutOfRange,
            Self::InvalidRequest(_) => ErrorKind::Invalid,
            Self::Storage(_) | Self::Io(_) | Self::Transport(_) => ErrorKind::Io,
            Self::AlreadyOwned | Self::ActorGone(_) => ErrorKind::Internal,
        }
    }

    /// Stable numeric code for API responses.
    #[must_use]
    pub fn code(&self) -> i32 {
        match self {
            Self::ChannelExists { .. } => 1001,
            Self::ChannelNotFound(_) => 1002,
            Self::DeviceNotFound(_) => 1003,
            Self::AppletNotFound { .. } => 1004,
            Self::UnknownApp(_) => 1005,
            Self::IndexOutOfRange { .. } => 1011,
            _ => 1000,
        }
    }
}
