//! IRC session loop.
//!
//! One task owns the event router, and with it the roster, the hub user
//! bridge and the hub. It waits on inbound IRC lines, queued outbound
//! commands, hub input and the relay timer, handling each to completion
//! before looking at the next. Handlers never touch the socket: they queue
//! commands on a [`CommandSink`] which this loop flushes.

use crate::config::Config;
use crate::metrics::{self, ConnectionMetricsGuard};
use anyhow::{Context, Result};
use dcbridge_core::{BridgeStats, CommandSink, EventRouter, HubStats, MemoryHub};
use dcbridge_protocol::{Command, Event, Message};
use dcbridge_transport::{IrcConnection, TcpIrcConnection, TransportError};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, trace, warn};

/// Text from a hub peer for a synthetic user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubInput {
    /// Hub nickname of the synthetic user.
    pub to: String,
    /// Text to relay to the user's IRC nickname.
    pub text: String,
}

/// Bridge state published for the status endpoint.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusSnapshot {
    /// Connected to IRC.
    pub connected: bool,
    /// Router counters.
    pub bridge: BridgeStats,
    /// Hub counters.
    pub hub: HubStats,
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    Disconnected,
    Shutdown,
}

/// Build the router and its hub from configuration.
#[must_use]
pub fn build_router(config: &Config) -> EventRouter<MemoryHub> {
    let mut hub = MemoryHub::new(config.hub.local_nick.clone());
    for nick in &config.hub.native_users {
        hub.add_native_user(nick.clone());
    }
    EventRouter::with_relay(config.router_config(), hub, config.relay())
}

fn publish(status: &watch::Sender<StatusSnapshot>, router: &EventRouter<MemoryHub>, connected: bool) {
    status.send_replace(StatusSnapshot {
        connected,
        bridge: router.stats(),
        hub: router.bridge().hub().stats(),
    });
}

/// Log hub protocol lines as they are broadcast.
fn spawn_hub_logger(mut lines: broadcast::Receiver<String>) {
    tokio::spawn(async move {
        loop {
            match lines.recv().await {
                Ok(line) => debug!(line = %line, "Hub line"),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "Hub logger lagging");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

/// Handle one inbound line, logging instead of failing.
pub fn dispatch(router: &mut EventRouter<MemoryHub>, msg: &Message, sink: &mut CommandSink) {
    let start = Instant::now();
    let broadcasts = router.bridge().hub().oplist_broadcasts();

    match Event::from_message(msg) {
        Ok(event) => {
            metrics::record_event(event.kind().as_str());
            if let Err(e) = router.handle(event, sink) {
                warn!(command = %msg.command, error = %e, "Event skipped");
                metrics::record_error(e.kind());
            }
        }
        Err(e) => {
            warn!(command = %msg.command, error = %e, "Malformed IRC message");
            metrics::record_error("protocol");
        }
    }

    metrics::record_oplist_rebroadcasts(router.bridge().hub().oplist_broadcasts() - broadcasts);
    metrics::set_hub_users(router.bridge().len());
    metrics::record_latency(start.elapsed().as_secs_f64());
}

/// Run sessions until shutdown, reconnecting after each disconnect.
///
/// # Errors
///
/// Returns an error only if the shutdown signal source fails.
pub async fn run_bridge(
    config: Config,
    mut hub_input: mpsc::Receiver<HubInput>,
    status: watch::Sender<StatusSnapshot>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let mut router = build_router(&config);
    spawn_hub_logger(router.bridge().hub().subscribe());
    let reconnect_delay = std::time::Duration::from_millis(config.irc.reconnect_delay_ms);

    loop {
        let end = run_session(&config, &mut router, &mut hub_input, &status, &mut shutdown).await;

        let removed = router.reset();
        publish(&status, &router, false);
        metrics::set_hub_users(0);

        match end {
            Ok(SessionEnd::Shutdown) => {
                info!(removed, "Bridge stopped");
                return Ok(());
            }
            Ok(SessionEnd::Disconnected) => {
                warn!(removed, delay_ms = config.irc.reconnect_delay_ms, "Disconnected from IRC");
            }
            Err(e) => {
                error!(error = %e, removed, delay_ms = config.irc.reconnect_delay_ms, "IRC session failed");
                metrics::record_error("session");
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(reconnect_delay) => {}
            changed = shutdown.changed() => {
                changed.context("Shutdown signal dropped")?;
                info!("Bridge stopped");
                return Ok(());
            }
        }
    }
}

/// Send one queued command.
///
/// A command that cannot be encoded is logged and dropped. Only connection
/// failures end the session.
async fn send_command(conn: &mut impl IrcConnection, command: Command) -> Result<()> {
    match conn.send(command.into()).await {
        Ok(()) => Ok(()),
        Err(TransportError::Protocol(e)) => {
            warn!(error = %e, "Dropped unencodable IRC command");
            metrics::record_error("encode");
            Ok(())
        }
        Err(e) => Err(e).context("Failed to send to IRC server"),
    }
}

async fn run_session(
    config: &Config,
    router: &mut EventRouter<MemoryHub>,
    hub_input: &mut mpsc::Receiver<HubInput>,
    status: &watch::Sender<StatusSnapshot>,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<SessionEnd> {
    let mut conn = TcpIrcConnection::connect(&config.connect_config())
        .await
        .context("Failed to connect to IRC server")?;
    let _metrics_guard = ConnectionMetricsGuard::new();

    conn.register(router.own_nick(), &config.irc.username, &config.irc.realname)
        .await
        .context("Failed to register")?;
    publish(status, router, true);

    let (mut sink, mut commands) = CommandSink::channel();
    let mut relay_tick = tokio::time::interval(config.tick_interval());
    relay_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            _ = shutdown.changed() => {
                info!("Shutting down IRC session");
                if let Err(e) = conn.send(Command::Quit(Some("Bridge shutting down".into())).into()).await {
                    debug!(error = %e, "Failed to send QUIT");
                }
                if let Err(e) = conn.close().await {
                    debug!(error = %e, "Failed to close connection");
                }
                return Ok(SessionEnd::Shutdown);
            }

            // Flush queued commands before reading more input.
            Some(command) = commands.recv() => {
                trace!(command = ?command, "Sending command");
                send_command(&mut conn, command).await?;
            }

            msg = conn.recv() => {
                match msg.context("Failed to read from IRC server")? {
                    Some(msg) => {
                        dispatch(router, &msg, &mut sink);
                        publish(status, router, true);
                    }
                    None => return Ok(SessionEnd::Disconnected),
                }
            }

            Some(input) = hub_input.recv() => {
                if !router.bridge_mut().hub_mut().deliver_private(&input.to, &input.text) {
                    debug!(to = %input.to, "Hub input for unknown user");
                }
            }

            _ = relay_tick.tick() => {
                let stats = router.relay_tick(&mut sink);
                metrics::record_relay(stats);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dcbridge_core::IrcSink;

    fn config() -> Config {
        let mut config = Config::default();
        config.irc.nickname = "bridge".into();
        config.irc.chat_channel = "#dc".into();
        config.hub.local_nick = "Hub".into();
        config.hub.native_users = vec!["alice".into()];
        config
    }

    fn line(raw: &str) -> Message {
        raw.parse().unwrap()
    }

    #[tokio::test]
    async fn test_dispatch_drives_router() {
        let config = config();
        let mut router = build_router(&config);
        let (mut sink, mut commands) = CommandSink::channel();

        dispatch(&mut router, &line(":irc.example.net 001 bridge :Welcome"), &mut sink);
        assert_eq!(commands.recv().await, Some(Command::join("#dc", None)));

        dispatch(
            &mut router,
            &line(":irc.example.net 353 bridge = #dc :bridge @alice bob"),
            &mut sink,
        );
        // `alice` is taken on the hub.
        assert_eq!(router.bridge().hub_nick_of("alice"), Some("alice_"));
        assert_eq!(router.bridge().hub().operators(), vec!["alice_"]);

        dispatch(&mut router, &line("PING :irc.example.net"), &mut sink);
        assert_eq!(
            commands.recv().await,
            Some(Command::Pong("irc.example.net".into()))
        );
    }

    #[tokio::test]
    async fn test_dispatch_survives_bad_input() {
        let mut router = build_router(&config());
        let (mut sink, _commands) = CommandSink::channel();

        // Missing parameters, unknown departures, unmanaged channels.
        dispatch(&mut router, &line(":alice!a@h KICK #dc"), &mut sink);
        dispatch(&mut router, &line(":ghost!g@h PART #dc"), &mut sink);
        dispatch(&mut router, &line(":carol!c@h JOIN #other"), &mut sink);
        assert!(router.bridge().is_empty());

        dispatch(&mut router, &line(":carol!c@h JOIN #dc"), &mut sink);
        assert!(router.bridge().is_materialized("carol"));
    }

    #[tokio::test]
    async fn test_hub_input_is_relayed() {
        let mut router = build_router(&config());
        let (mut sink, mut commands) = CommandSink::channel();
        dispatch(&mut router, &line(":bob!b@h JOIN #dc"), &mut sink);

        assert!(router.bridge_mut().hub_mut().deliver_private("bob", "hi from the hub"));
        router.relay_tick(&mut sink);
        assert_eq!(
            commands.recv().await,
            Some(Command::privmsg("bob", "hi from the hub"))
        );

        sink.send_notice("bob", "done");
        assert_eq!(commands.recv().await, Some(Command::notice("bob", "done")));
    }

    #[tokio::test]
    async fn test_unencodable_command_is_dropped() {
        use dcbridge_transport::ConnectConfig;
        use tokio::io::{AsyncBufReadExt, BufReader};
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = ConnectConfig {
            port: listener.local_addr().unwrap().port(),
            ..ConnectConfig::default()
        };
        let (conn, accepted) = tokio::join!(TcpIrcConnection::connect(&config), listener.accept());
        let mut conn = conn.unwrap();
        let mut lines = BufReader::new(accepted.unwrap().0).lines();

        send_command(&mut conn, Command::privmsg("alice", "é".repeat(400)))
            .await
            .unwrap();
        send_command(&mut conn, Command::Pong("irc.example.net".into()))
            .await
            .unwrap();

        assert!(conn.is_open());
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "PONG irc.example.net");
    }

    #[test]
    fn test_publish_snapshot() {
        let mut router = build_router(&config());
        let (mut sink, _commands) = CommandSink::channel();
        dispatch(&mut router, &line(":irc 353 bridge = #dc :@bob carol"), &mut sink);

        let (tx, rx) = watch::channel(StatusSnapshot::default());
        publish(&tx, &router, true);

        let snapshot = rx.borrow().clone();
        assert!(snapshot.connected);
        assert_eq!(snapshot.bridge.hub_users, 2);
        assert_eq!(snapshot.hub.operators, 1);
        assert_eq!(snapshot.hub.oplist_broadcasts, 1);
    }
}
