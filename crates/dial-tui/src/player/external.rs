//! Playback through a spawned mpv or ffplay process.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tracing::{debug, info};

use super::{Backend, PlayerError};
use dial_proto::platform::{self, PlayerKind};

/// How often the watcher checks whether the child is still alive.
const WATCH_INTERVAL: Duration = Duration::from_millis(200);

struct ExternalState {
    child: Option<Child>,
    /// Bumped on every play/stop so a stale watcher never clears the state
    /// belonging to a newer child.
    generation: u64,
    last_url: String,
}

/// Runs one player process at a time, killing the previous one before
/// starting the next.
pub struct ExternalPlayer {
    path: PathBuf,
    kind: PlayerKind,
    state: Arc<Mutex<ExternalState>>,
}

impl ExternalPlayer {
    /// Locate a player binary; bundled copies win over anything on PATH.
    pub fn detect() -> Result<Self, PlayerError> {
        let (path, kind) = platform::find_player_binary().ok_or_else(|| {
            PlayerError::NotAvailable(
                "mpv or ffplay not found (bundle one or add to PATH)".into(),
            )
        })?;
        info!("external player: {} ({})", path.display(), kind.as_str());
        Ok(Self::with_binary(path, kind))
    }

    pub fn with_binary(path: PathBuf, kind: PlayerKind) -> Self {
        Self {
            path,
            kind,
            state: Arc::new(Mutex::new(ExternalState {
                child: None,
                generation: 0,
                last_url: String::new(),
            })),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, ExternalState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn stop_locked(state: &mut ExternalState) {
        state.generation += 1;
        if let Some(mut child) = state.child.take() {
            // Kill errors mean the process already exited.
            let _ = child.start_kill();
        }
    }

    fn spawn_args(kind: PlayerKind, url: &str) -> Vec<String> {
        match kind {
            PlayerKind::Mpv => vec![
                "--no-video".to_string(),
                "--quiet".to_string(),
                url.to_string(),
            ],
            PlayerKind::Ffplay => vec![
                "-nodisp".to_string(),
                "-autoexit".to_string(),
                "-loglevel".to_string(),
                "quiet".to_string(),
                url.to_string(),
            ],
        }
    }
}

#[async_trait]
impl Backend for ExternalPlayer {
    async fn play(&self, url: &str) -> Result<(), PlayerError> {
        if url.is_empty() {
            return Err(PlayerError::InvalidInput);
        }

        let generation = {
            let mut state = self.lock_state();
            Self::stop_locked(&mut state);

            let child = Command::new(&self.path)
                .args(Self::spawn_args(self.kind, url))
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .kill_on_drop(true)
                .spawn()
                .map_err(|e| {
                    PlayerError::Transport(format!("spawn {}: {e}", self.kind.as_str()))
                })?;

            state.child = Some(child);
            state.last_url = url.to_string();
            state.generation
        };

        // Watcher: poll until the child exits, then clear the playing state
        // unless a newer play/stop already replaced it.
        let state = self.state.clone();
        let watch_url = url.to_string();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(WATCH_INTERVAL).await;
                let mut guard = state.lock().unwrap_or_else(|e| e.into_inner());
                if guard.generation != generation {
                    return;
                }
                let exited = match guard.child.as_mut() {
                    Some(child) => match child.try_wait() {
                        Ok(None) => false,
                        Ok(Some(_)) | Err(_) => true,
                    },
                    None => return,
                };
                if exited {
                    debug!("player for {} exited", watch_url);
                    guard.child = None;
                    return;
                }
            }
        });

        Ok(())
    }

    async fn stop(&self) {
        let mut state = self.lock_state();
        Self::stop_locked(&mut state);
    }

    async fn is_playing(&self) -> bool {
        let mut state = self.lock_state();
        match state.child.as_mut() {
            Some(child) => match child.try_wait() {
                Ok(None) => true,
                Ok(Some(_)) | Err(_) => {
                    state.child = None;
                    false
                }
            },
            None => false,
        }
    }

    async fn last_url(&self) -> String {
        self.lock_state().last_url.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mpv_args_suppress_video_and_noise() {
        let args = ExternalPlayer::spawn_args(PlayerKind::Mpv, "http://example.com/s");
        assert_eq!(args, vec!["--no-video", "--quiet", "http://example.com/s"]);
    }

    #[test]
    fn ffplay_args_run_headless() {
        let args = ExternalPlayer::spawn_args(PlayerKind::Ffplay, "http://example.com/s");
        assert_eq!(
            args,
            vec!["-nodisp", "-autoexit", "-loglevel", "quiet", "http://example.com/s"]
        );
    }

    #[cfg(unix)]
    mod with_fake_player {
        use super::*;

        // /bin/sh happily ignores the mpv-style flags that precede the URL,
        // exits immediately, and exists everywhere the tests run.
        fn sh_player() -> ExternalPlayer {
            ExternalPlayer::with_binary(PathBuf::from("/bin/sh"), PlayerKind::Mpv)
        }

        #[tokio::test]
        async fn empty_url_is_rejected_without_spawning() {
            let player = sh_player();
            match player.play("").await {
                Err(PlayerError::InvalidInput) => {}
                other => panic!("expected InvalidInput, got {other:?}"),
            }
            assert!(!player.is_playing().await);
        }

        #[tokio::test]
        async fn watcher_clears_state_when_child_exits() {
            let player = sh_player();
            player.play("-c").await.unwrap();
            assert_eq!(player.last_url().await, "-c");

            tokio::time::timeout(Duration::from_secs(3), async {
                while player.is_playing().await {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
            })
            .await
            .expect("child never observed as exited");
        }

        #[tokio::test]
        async fn stop_is_idempotent() {
            let player = sh_player();
            player.stop().await;
            player.play("-c").await.unwrap();
            player.stop().await;
            player.stop().await;
            assert!(!player.is_playing().await);
        }

        #[tokio::test]
        async fn missing_binary_fails_to_spawn() {
            let player = ExternalPlayer::with_binary(
                PathBuf::from("/nonexistent/dialfm-test-player"),
                PlayerKind::Mpv,
            );
            let err = player.play("http://example.com/s").await.unwrap_err();
            assert!(matches!(err, PlayerError::Transport(_)));
            assert!(!player.is_playing().await);
        }
    }
}
