//! Application-wide constants for pixelcast.
//!
//! Defaults for values that [`crate::config::Config`] can override, plus
//! fixed identifiers the store seeds on first start.
//!
//! # Categories
//!
//! - **Rendering**: render period and image size limit
//! - **Keepalive**: WebSocket deadlines and frame limits
//! - **Actors**: mailbox sizing
//! - **Store**: seeded identifiers

use std::time::Duration;

use uuid::Uuid;

// ============================================================================
// Rendering
// ============================================================================

/// Period between render ticks of a channel.
///
/// Applets carry their own time-to-live, but the render loop always rearms
/// with this fixed period.
pub const DEFAULT_RENDER_PERIOD: Duration = Duration::from_secs(15);

/// Upper bound, in bytes, handed to the encoder for one frame.
pub const DEFAULT_IMAGE_SIZE_LIMIT: usize = 15_000;

/// Delay used to force a near-immediate render after the applet list changes.
pub const RENDER_NOW_DELAY: Duration = Duration::from_nanos(1);

// ============================================================================
// Keepalive
// ============================================================================

/// Time allowed to write one frame to a device.
pub const DEFAULT_WRITE_WAIT: Duration = Duration::from_secs(10);

/// Time allowed between frames received from a device.
pub const DEFAULT_PONG_WAIT: Duration = Duration::from_secs(60);

/// Largest message accepted from a device.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024;

// ============================================================================
// Actors
// ============================================================================

/// Mailbox capacity for hub and channel actors.
///
/// Submitters wait for completion anyway, so the queue only absorbs bursts.
pub const ACTOR_MAILBOX_CAPACITY: usize = 32;

// ============================================================================
// Store
// ============================================================================

/// UUID of the channel new devices are provisioned into.
pub const DEFAULT_CHANNEL_UUID: Uuid = Uuid::from_u128(0x76ff_cb18_d3c7_40d5_abea_3fe8_6d02_a4ba);

/// Name of the seeded default channel.
pub const DEFAULT_CHANNEL_NAME: &str = "default";

/// How long a statement waits on another process's write lock.
///
/// The offline CLI and `serve` can share one database file.
pub const STORE_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Ping interval derived from the read deadline (9/10 of it).
#[must_use]
pub fn ping_period(pong_wait: Duration) -> Duration {
    pong_wait * 9 / 10
}
