//! Shared D-Bus session connection and player discovery for MPRIS.

use dbus::nonblock::stdintf::org_freedesktop_dbus::Properties;
use dbus::nonblock::{Proxy, SyncConnection};
use std::sync::Arc;
use std::time::Duration;

pub const TIMEOUT: Duration = Duration::from_millis(5000);
pub const MPRIS_PATH: &str = "/org/mpris/MediaPlayer2";
pub const PLAYERCTLD_SERVICE: &str = "org.mpris.MediaPlayer2.playerctld";
pub const PLAYERCTLD_INTERFACE: &str = "com.github.altdesktop.playerctld";

#[derive(thiserror::Error, Debug)]
pub enum MprisError {
    #[error("DBus error: {0}")]
    DBus(#[from] dbus::Error),
    #[error("No connection to D-Bus")]
    NoConnection,
    #[error("Metadata consumer went away")]
    Closed,
}

pub async fn get_dbus_conn() -> Result<Arc<SyncConnection>, MprisError> {
    static ONCE: once_cell::sync::OnceCell<Arc<SyncConnection>> = once_cell::sync::OnceCell::new();
    if let Some(conn) = ONCE.get() {
        return Ok(conn.clone());
    }
    let (resource, conn) =
        dbus_tokio::connection::new_session_sync().map_err(|_| MprisError::NoConnection)?;
    tokio::spawn(async move {
        let err = resource.await;
        tracing::error!("Lost connection to D-Bus: {}", err);
    });
    let _ = ONCE.set(conn.clone());
    Ok(conn)
}

/// Player bus names in the order `playerctld` ranks them (most recently active first).
pub async fn get_active_player_names() -> Result<Vec<String>, MprisError> {
    let conn = get_dbus_conn().await?;
    let proxy = Proxy::new(PLAYERCTLD_SERVICE, MPRIS_PATH, TIMEOUT, conn);
    let result = Properties::get(&proxy, PLAYERCTLD_INTERFACE, "PlayerNames").await;
    Ok(result.unwrap_or_default())
}

pub fn is_blocked(service: &str, block_list: &[String]) -> bool {
    let service = service.to_lowercase();
    block_list.iter().any(|b| service.contains(b.as_str()))
}

/// First player that is not on the block list.
pub fn first_allowed<'a>(names: &'a [String], block_list: &[String]) -> Option<&'a String> {
    names.iter().find(|s| !is_blocked(s, block_list))
}
