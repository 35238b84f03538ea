//! End-to-end update-loop tests against an in-process fake daemon.

mod support;

use mpdpop_client::Player;
use mpdpop_core::config::Config;
use mpdpop_core::model::{PlayState, StateChange};
use std::time::Duration;
use support::FakeDaemon;
use tokio::sync::mpsc;

fn config_for(port: u16) -> Config {
    let mut config = Config::default();
    config.daemon.host = "127.0.0.1".into();
    config.daemon.port = port;
    config.player.retry_secs = 1;
    config
}

async fn next_change(rx: &mut mpsc::UnboundedReceiver<StateChange>) -> StateChange {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for a state change")
        .expect("event channel closed")
}

/// Collect everything published within the window.
async fn drain_for(rx: &mut mpsc::UnboundedReceiver<StateChange>, window: Duration) -> Vec<StateChange> {
    let mut changes = Vec::new();
    let deadline = tokio::time::Instant::now() + window;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            break;
        }
        match tokio::time::timeout(remaining, rx.recv()).await {
            Ok(Some(change)) => changes.push(change),
            _ => break,
        }
    }
    changes
}

async fn wait_for_count(daemon: &FakeDaemon, prefix: &str, n: usize) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while daemon.command_count(prefix) < n {
        if tokio::time::Instant::now() >= deadline {
            panic!(
                "never saw {n} {prefix:?} commands; log: {:?}",
                daemon.commands()
            );
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn initial_sync_publishes_state_and_idles() {
    let daemon = FakeDaemon::start().await;
    daemon.set_status("play", 12.0, false, true);
    daemon.set_song(&[
        ("file", "albums/low/monkey.flac"),
        ("Artist", "Low"),
        ("Title", "Monkey"),
        ("duration", "244.600"),
    ]);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let player = Player::new(&config_for(daemon.port()), tx);

    assert_eq!(
        next_change(&mut rx).await,
        StateChange::PlayStateChanged {
            old: PlayState::Stopped,
            new: PlayState::Playing,
        }
    );
    assert_eq!(next_change(&mut rx).await, StateChange::ElapsedTick { elapsed: 12.0 });
    assert_eq!(next_change(&mut rx).await, StateChange::RandomChanged { value: false });
    assert_eq!(next_change(&mut rx).await, StateChange::RepeatChanged { value: true });
    match next_change(&mut rx).await {
        StateChange::TrackChanged {
            uri,
            artist,
            title,
            duration,
        } => {
            assert_eq!(uri.as_deref(), Some("albums/low/monkey.flac"));
            assert_eq!(artist.as_deref(), Some("Low"));
            assert_eq!(title.as_deref(), Some("Monkey"));
            assert_eq!(duration, Some(244.6));
        }
        other => panic!("expected TrackChanged, got {other:?}"),
    }

    // After the sync pass the loop parks in the blocking idle command.
    daemon.wait_for_command("idle", Duration::from_secs(5)).await;
    assert_eq!(player.status().state, PlayState::Playing);
    player.stop().await;
}

#[tokio::test]
async fn pause_notification_fires_exactly_one_play_state_change() {
    let daemon = FakeDaemon::start().await;
    daemon.set_status("play", 12.0, false, false);
    daemon.set_song(&[("file", "a.flac"), ("Artist", "Low"), ("Title", "Monkey")]);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let player = Player::new(&config_for(daemon.port()), tx);
    daemon.wait_for_command("idle", Duration::from_secs(5)).await;
    while rx.try_recv().is_ok() {}

    daemon.set_status("pause", 12.0, false, false);
    daemon.notify("player");
    wait_for_count(&daemon, "idle", 2).await;

    let changes = drain_for(&mut rx, Duration::from_millis(300)).await;
    let play_state_changes: Vec<_> = changes
        .iter()
        .filter(|c| matches!(c, StateChange::PlayStateChanged { .. }))
        .collect();
    assert_eq!(
        play_state_changes,
        vec![&StateChange::PlayStateChanged {
            old: PlayState::Playing,
            new: PlayState::Paused,
        }],
        "full change log: {changes:?}"
    );
    assert_eq!(player.status().elapsed, Some(12.0));
    player.stop().await;
}

#[tokio::test]
async fn track_change_carries_metadata_and_fetches_artwork() {
    let daemon = FakeDaemon::start().await;
    daemon.set_status("play", 0.0, false, false);
    daemon.set_song(&[("file", "a.flac"), ("Artist", "Low"), ("Title", "Monkey")]);
    let artwork: Vec<u8> = (0..2000u32).map(|i| i as u8).collect();
    daemon.set_artwork(artwork.clone(), 512);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let player = Player::new(&config_for(daemon.port()), tx);
    daemon.wait_for_command("idle", Duration::from_secs(5)).await;
    while rx.try_recv().is_ok() {}

    daemon.set_song(&[
        ("file", "b.flac"),
        ("Artist", "Low"),
        ("Title", "Dinosaur Act"),
        ("duration", "183.000"),
    ]);
    daemon.notify("player");

    match next_change(&mut rx).await {
        StateChange::TrackChanged { uri, title, .. } => {
            assert_eq!(uri.as_deref(), Some("b.flac"));
            assert_eq!(title.as_deref(), Some("Dinosaur Act"));
        }
        other => panic!("expected TrackChanged, got {other:?}"),
    }

    // The artwork lands after the notification; wait for the loop to
    // finish the fetch and park in idle again.
    wait_for_count(&daemon, "idle", 2).await;
    assert_eq!(player.song().artwork, Some(artwork));
    player.stop().await;
}

#[tokio::test]
async fn control_commands_do_not_wait_behind_the_idle_block() {
    let daemon = FakeDaemon::start().await;
    daemon.set_status("play", 5.0, false, false);

    let (tx, _rx) = mpsc::unbounded_channel();
    let player = Player::new(&config_for(daemon.port()), tx);
    daemon.wait_for_command("idle", Duration::from_secs(5)).await;

    // The idle connection is parked; pause must still return promptly.
    let started = tokio::time::Instant::now();
    player.pause(true).await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(daemon.command_count("pause 1"), 1);

    player.seek(42.5).await.unwrap();
    assert_eq!(daemon.command_count("seekcur 42.5"), 1);
    assert_eq!(player.status().elapsed, Some(42.5));

    player.set_random(true).await.unwrap();
    assert_eq!(daemon.command_count("random 1"), 1);
    player.stop().await;
}

#[tokio::test]
async fn retries_until_the_daemon_appears() {
    // Reserve a port, then free it so the first connect attempts fail.
    let port = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };

    let (tx, _rx) = mpsc::unbounded_channel();
    let player = Player::new(&config_for(port), tx);

    // Let at least one connect attempt fail before the daemon exists.
    tokio::time::sleep(Duration::from_millis(300)).await;

    let daemon = FakeDaemon::start_on(port).await;
    daemon.set_status("play", 0.0, false, false);
    daemon.wait_for_command("idle", Duration::from_secs(10)).await;
    assert_eq!(player.status().state, PlayState::Playing);
    player.stop().await;
}

#[tokio::test]
async fn stop_cancels_an_inflight_idle_wait() {
    let daemon = FakeDaemon::start().await;
    let (tx, _rx) = mpsc::unbounded_channel();
    let player = Player::new(&config_for(daemon.port()), tx);
    daemon.wait_for_command("idle", Duration::from_secs(5)).await;

    // No notification is ever sent; stop must not wait for one.
    tokio::time::timeout(Duration::from_secs(2), player.stop())
        .await
        .expect("stop must cancel the idle wait");
}
