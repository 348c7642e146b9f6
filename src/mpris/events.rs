//! Native D-Bus source: watches MPRIS signals and renders a metadata line on each change.

use dbus::channel::MatchingReceiver;
use dbus::message::MatchRule;
use dbus::nonblock::stdintf::org_freedesktop_dbus::Properties;
use dbus::nonblock::{Proxy, SyncConnection};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{LINE_BUFFER, MetadataSource, SourceError};
use crate::mpris::connection::{
    MPRIS_PATH, MprisError, PLAYERCTLD_INTERFACE, TIMEOUT, first_allowed,
    get_active_player_names, get_dbus_conn,
};
use crate::mpris::metadata::{TrackMetadata, extract_metadata};
use crate::utils::format_metadata;

const MPRIS_PLAYER_INTERFACE: &str = "org.mpris.MediaPlayer2.Player";
const DBUS_PROPERTIES_INTERFACE: &str = "org.freedesktop.DBus.Properties";
const STOPPED: &str = "Stopped";

/// Starts watching the session bus and returns the resulting line source.
pub async fn spawn_dbus(
    format: &str,
    block_list: &[String],
) -> Result<MetadataSource, SourceError> {
    let (tx, rx) = mpsc::channel(LINE_BUFFER);
    let mut handler =
        MprisEventHandler::new(tx, format.to_string(), block_list.to_vec()).await?;
    info!("MPRIS D-Bus watcher started");

    let task = tokio::spawn(async move {
        match handler.handle_events().await {
            Ok(()) => debug!("MPRIS signal stream ended"),
            Err(MprisError::Closed) => debug!("Metadata consumer closed"),
            Err(err) => warn!("MPRIS watcher stopped: {}", err),
        }
    });
    Ok(MetadataSource::from_task(rx, task))
}

/// What was last reported for the followed player.
#[derive(Debug, Default, Clone, PartialEq)]
struct PlayerState {
    service: String,
    track: TrackMetadata,
    playback_status: String,
}

impl PlayerState {
    fn is_following(&self) -> bool {
        !self.service.is_empty()
    }

    /// Starts following `service`. Always worth a line.
    fn follow(&mut self, service: &str, track: TrackMetadata, playback_status: String) {
        self.service = service.to_string();
        self.track = track;
        self.playback_status = playback_status;
    }

    /// Drops the followed player and reports it as stopped. `false` if nothing was followed.
    fn forget(&mut self) -> bool {
        if !self.is_following() {
            return false;
        }
        *self = Self {
            playback_status: STOPPED.to_string(),
            ..Self::default()
        };
        true
    }

    /// Folds in freshly read properties; `true` if either differs from what was reported.
    fn observe(&mut self, track: Option<TrackMetadata>, playback_status: Option<String>) -> bool {
        let mut changed = false;
        if let Some(track) = track.filter(|t| *t != self.track) {
            self.track = track;
            changed = true;
        }
        if let Some(status) = playback_status.filter(|s| *s != self.playback_status) {
            self.playback_status = status;
            changed = true;
        }
        changed
    }

    fn render(&self, format: &str) -> String {
        format_metadata(format, &self.playback_status, &self.track)
    }
}

/// Follows the first non-blocked player and emits a line whenever its track or status changes.
pub struct MprisEventHandler {
    lines: mpsc::Sender<String>,
    format: String,
    block_list: Vec<String>,
    state: PlayerState,
    conn: Arc<SyncConnection>,
    msg_rx: mpsc::UnboundedReceiver<dbus::message::Message>,
}

impl MprisEventHandler {
    pub async fn new(
        lines: mpsc::Sender<String>,
        format: String,
        block_list: Vec<String>,
    ) -> Result<Self, MprisError> {
        let conn = get_dbus_conn().await?;

        // Unbounded: the handler may sit in `emit` while the presence loop publishes.
        let (tx, rx) = mpsc::unbounded_channel::<dbus::message::Message>();

        Self::add_match_rule(
            &conn,
            MatchRule::new_signal(DBUS_PROPERTIES_INTERFACE, "PropertiesChanged")
                .with_path(MPRIS_PATH)
                .static_clone(),
            tx,
        )
        .await?;

        let mut handler = Self {
            lines,
            format,
            block_list,
            state: PlayerState::default(),
            conn,
            msg_rx: rx,
        };

        // Initial player discovery
        if let Ok(names) = get_active_player_names().await {
            if let Some(service) = first_allowed(&names, &handler.block_list).cloned() {
                handler.update_current_player(&service).await?;
            }
        }

        Ok(handler)
    }

    async fn add_match_rule(
        conn: &Arc<SyncConnection>,
        rule: MatchRule<'static>,
        tx: mpsc::UnboundedSender<dbus::message::Message>,
    ) -> Result<(), MprisError> {
        conn.add_match(rule.clone()).await?;
        let conn_clone = Arc::clone(conn);
        MatchingReceiver::start_receive(
            &*conn_clone,
            rule,
            Box::new(move |msg, _| {
                if tx.send(msg).is_err() {
                    debug!("MPRIS handler gone, dropping signal");
                }
                true
            }),
        );
        Ok(())
    }

    fn player_proxy(&self, service: &str) -> Proxy<'static, Arc<SyncConnection>> {
        Proxy::new(service.to_string(), MPRIS_PATH, TIMEOUT, self.conn.clone())
    }

    async fn emit(&self) -> Result<(), MprisError> {
        let line = self.state.render(&self.format);
        debug!(service = %self.state.service, line = %line, "Player changed");
        self.lines.send(line).await.map_err(|_| MprisError::Closed)
    }

    async fn read_track(proxy: &Proxy<'static, Arc<SyncConnection>>) -> Option<TrackMetadata> {
        Properties::get::<dbus::arg::PropMap>(proxy, MPRIS_PLAYER_INTERFACE, "Metadata")
            .await
            .ok()
            .map(|map| extract_metadata(&map))
    }

    async fn read_playback_status(proxy: &Proxy<'static, Arc<SyncConnection>>) -> Option<String> {
        Properties::get::<String>(proxy, MPRIS_PLAYER_INTERFACE, "PlaybackStatus")
            .await
            .ok()
    }

    async fn update_current_player(&mut self, service: &str) -> Result<(), MprisError> {
        let proxy = self.player_proxy(service);
        let track = Self::read_track(&proxy).await.unwrap_or_default();
        let playback_status = Self::read_playback_status(&proxy)
            .await
            .unwrap_or_else(|| STOPPED.to_string());

        self.state.follow(service, track, playback_status);
        self.emit().await
    }

    pub async fn handle_events(&mut self) -> Result<(), MprisError> {
        while let Some(msg) = self.msg_rx.recv().await {
            self.handle_properties_changed(msg).await?;
        }
        Ok(())
    }

    async fn handle_properties_changed(
        &mut self,
        msg: dbus::message::Message,
    ) -> Result<(), MprisError> {
        if let Ok(interface_name) = msg.read1::<&str>() {
            match interface_name {
                "org.mpris.MediaPlayer2" | DBUS_PROPERTIES_INTERFACE | PLAYERCTLD_INTERFACE => {
                    self.handle_player_names_changed(msg).await?;
                }
                MPRIS_PLAYER_INTERFACE => {
                    self.handle_player_properties_changed(msg).await?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    async fn handle_player_names_changed(
        &mut self,
        msg: dbus::message::Message,
    ) -> Result<(), MprisError> {
        if !changed_keys(&msg, ["PlayerNames"])[0] {
            return Ok(());
        }
        let Ok(names) = get_active_player_names().await else {
            return Ok(());
        };
        match first_allowed(&names, &self.block_list).cloned() {
            Some(service) if service != self.state.service => {
                self.update_current_player(&service).await
            }
            Some(_) => Ok(()),
            None if self.state.forget() => self.emit().await,
            None => Ok(()),
        }
    }

    async fn handle_player_properties_changed(
        &mut self,
        msg: dbus::message::Message,
    ) -> Result<(), MprisError> {
        if !self.state.is_following() {
            return Ok(());
        }
        let [metadata_touched, status_touched] = changed_keys(&msg, ["Metadata", "PlaybackStatus"]);
        let proxy = self.player_proxy(&self.state.service);

        let track = if metadata_touched {
            Self::read_track(&proxy).await
        } else {
            None
        };
        let playback_status = if status_touched {
            Self::read_playback_status(&proxy).await
        } else {
            None
        };

        if self.state.observe(track, playback_status) {
            self.emit().await?;
        }
        Ok(())
    }
}

/// Which of `keys` appear in the changed-properties map of a `PropertiesChanged` signal.
fn changed_keys<const N: usize>(msg: &dbus::message::Message, keys: [&str; N]) -> [bool; N] {
    let changed: Option<dbus::arg::PropMap> =
        msg.read2().ok().map(|(_, c): (String, dbus::arg::PropMap)| c);
    keys.map(|key| changed.as_ref().is_some_and(|c| c.contains_key(key)))
}
