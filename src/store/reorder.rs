//! Applet position maintenance under `UNIQUE (channel_uuid, idx)`.
//!
//! Positions inside a channel are the contiguous set `0..count` whenever a
//! reader can observe them. Moving a row from `cur` to `new` shifts every
//! row strictly between the two by one toward the vacated slot. Updating
//! those rows one at a time in place would transiently put two rows on the
//! same position, so the displaced rows are first staged into a disjoint
//! negative range and then rewritten to their final positions:
//!
//! ```text
//! move 3 -> 1, positions 0 1 2 3 4
//!
//!   stage moved row:      idx 3      -> -(1 + 100)        = -101
//!   stage shifted rows:   idx 1, 2   -> -(idx + 1 + 100)  = -102, -103
//!   restore staged rows:  -idx - 100                     ->  1, 2, 3
//! ```
//!
//! Inserting at `p` is a move of the (not yet existing) row at `count` to
//! `p`; closing the gap left by a delete at `p` is a move from `p` to the
//! new `count`. Both therefore touch only the rows that actually shift.
//!
//! Every function here runs inside the caller's transaction.

use rusqlite::Connection;
use uuid::Uuid;

use crate::error::Result;

/// Offset that keeps staged positions strictly negative and clear of one
/// another.
const STAGING_BASE: i64 = 100;

/// Number of applets attached to a channel.
pub(crate) fn applet_count(conn: &Connection, channel: Uuid) -> Result<i64> {
    let count = conn.query_row(
        "SELECT count(*) FROM channel_applets WHERE channel_uuid = ?1",
        [channel.to_string()],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Move the applet at `cur_idx` to `new_idx`, shifting the rows in between.
///
/// A missing row at `cur_idx` is allowed (insert and delete use it to open
/// or close a slot).
pub(crate) fn reorder(conn: &Connection, channel: Uuid, cur_idx: i64, new_idx: i64) -> Result<()> {
    log::debug!("[Store] Reorder {} {} -> {}", channel, cur_idx, new_idx);
    if cur_idx == new_idx {
        return Ok(());
    }
    let channel = channel.to_string();

    conn.execute(
        "UPDATE channel_applets SET idx = ?1 WHERE channel_uuid = ?2 AND idx = ?3",
        (-(new_idx + STAGING_BASE), &channel, cur_idx),
    )?;

    // Forward moves pull (cur, new] down by one; backward moves push
    // [new, cur) up by one. The staged value encodes the final position.
    let (offset, lo, hi) = if cur_idx < new_idx {
        (STAGING_BASE - 1, cur_idx + 1, new_idx)
    } else {
        (STAGING_BASE + 1, new_idx, cur_idx - 1)
    };
    conn.execute(
        "UPDATE channel_applets SET idx = -(idx + ?1)
          WHERE channel_uuid = ?2 AND idx >= ?3 AND idx <= ?4",
        (offset, &channel, lo, hi),
    )?;

    conn.execute(
        "UPDATE channel_applets SET idx = -idx - ?1 WHERE channel_uuid = ?2 AND idx < 0",
        (STAGING_BASE, &channel),
    )?;
    Ok(())
}
