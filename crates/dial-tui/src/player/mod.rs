//! Playback backends.
//!
//! Two strategies behind one capability trait:
//!
//! - [`StreamPlayer`] decodes an MP3 HTTP stream in-process and plays it on
//!   the machine's output device.  No child process, but only one format.
//! - [`ExternalPlayer`] spawns mpv/ffplay pointed at the URL.  Slower to
//!   start, handles anything the system player handles.
//!
//! [`CompositeBackend`] tries the in-process path first and falls back to the
//! external player, so AAC/OGG stations still work when a player is
//! installed.

mod external;
mod stream;

pub use external::ExternalPlayer;
pub use stream::StreamPlayer;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("stream url is required")]
    InvalidInput,
    /// HTTP failure, decode failure, or a failed spawn.
    #[error("{0}")]
    Transport(String),
    /// No usable player binary / output device.
    #[error("{0}")]
    NotAvailable(String),
    #[error("format not supported by the built-in decoder; install mpv or ffplay to listen (error: {0})")]
    Unsupported(String),
    #[error("built-in decoder: {decode}; external player: {external}")]
    AllBackendsFailed { decode: String, external: String },
    #[error("no audio backend available; install mpv or ffplay")]
    NoBackend,
}

/// The common contract for all playback backends.
///
/// `play` must stop anything the instance already owns before starting the
/// new stream; a backend never holds two overlapping playback resources.
/// `stop` is idempotent.  `is_playing` and `last_url` are reads of current
/// state, safe to call concurrently with `play`/`stop`.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn play(&self, url: &str) -> Result<(), PlayerError>;
    async fn stop(&self);
    async fn is_playing(&self) -> bool;
    async fn last_url(&self) -> String;
}

struct CompositeState {
    decode: Option<Arc<dyn Backend>>,
    external: Option<Arc<dyn Backend>>,
    active: Option<Arc<dyn Backend>>,
    last_url: String,
}

/// Orchestrates the two strategies with ordered fallback.  One mutex is held
/// across the whole stop-then-start sequence so two `play` calls can never
/// interleave.
pub struct CompositeBackend {
    state: Mutex<CompositeState>,
}

impl CompositeBackend {
    pub fn new(
        decode: Option<Arc<dyn Backend>>,
        external: Option<Arc<dyn Backend>>,
    ) -> Self {
        Self {
            state: Mutex::new(CompositeState {
                decode,
                external,
                active: None,
                last_url: String::new(),
            }),
        }
    }

    /// Assemble the default backend pair: the in-process decoder plus, when a
    /// player binary can be found, the external fallback.
    pub fn detect() -> Result<Self, PlayerError> {
        let decode: Option<Arc<dyn Backend>> = match StreamPlayer::new() {
            Ok(p) => Some(Arc::new(p)),
            Err(e) => {
                debug!("in-process decoder unavailable: {}", e);
                None
            }
        };
        let external: Option<Arc<dyn Backend>> = match ExternalPlayer::detect() {
            Ok(p) => Some(Arc::new(p)),
            Err(e) => {
                debug!("external player unavailable: {}", e);
                None
            }
        };

        if decode.is_none() && external.is_none() {
            return Err(PlayerError::NoBackend);
        }
        Ok(Self::new(decode, external))
    }
}

#[async_trait]
impl Backend for CompositeBackend {
    async fn play(&self, url: &str) -> Result<(), PlayerError> {
        let mut state = self.state.lock().await;

        // Recorded even when every attempt below fails, so status reporting
        // stays accurate.
        state.last_url = url.to_string();

        if url.is_empty() {
            return Err(PlayerError::InvalidInput);
        }

        if let Some(active) = &state.active {
            active.stop().await;
        }

        let mut decode_err = None;
        if let Some(decode) = state.decode.clone() {
            match decode.play(url).await {
                Ok(()) => {
                    state.active = Some(decode);
                    return Ok(());
                }
                Err(e) => {
                    debug!("in-process decode failed for {}: {}", url, e);
                    decode_err = Some(e);
                }
            }
        }

        // AAC/OGG streams the built-in decoder can't handle land here.
        if let Some(external) = state.external.clone() {
            match external.play(url).await {
                Ok(()) => {
                    state.active = Some(external);
                    return Ok(());
                }
                Err(e) => {
                    return Err(match decode_err {
                        Some(de) => PlayerError::AllBackendsFailed {
                            decode: de.to_string(),
                            external: e.to_string(),
                        },
                        None => e,
                    });
                }
            }
        }

        match decode_err {
            Some(de) => Err(PlayerError::Unsupported(de.to_string())),
            None => Err(PlayerError::NoBackend),
        }
    }

    async fn stop(&self) {
        let state = self.state.lock().await;
        if let Some(active) = &state.active {
            active.stop().await;
        }
    }

    async fn is_playing(&self) -> bool {
        let state = self.state.lock().await;
        match &state.active {
            Some(active) => active.is_playing().await,
            None => false,
        }
    }

    async fn last_url(&self) -> String {
        self.state.lock().await.last_url.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    /// Scripted backend that records calls into a shared journal.
    struct MockBackend {
        name: &'static str,
        fail_with: Option<String>,
        playing: StdMutex<bool>,
        last_url: StdMutex<String>,
        journal: Arc<StdMutex<Vec<String>>>,
    }

    impl MockBackend {
        fn ok(name: &'static str, journal: Arc<StdMutex<Vec<String>>>) -> Arc<Self> {
            Arc::new(Self {
                name,
                fail_with: None,
                playing: StdMutex::new(false),
                last_url: StdMutex::new(String::new()),
                journal,
            })
        }

        fn failing(
            name: &'static str,
            message: &str,
            journal: Arc<StdMutex<Vec<String>>>,
        ) -> Arc<Self> {
            Arc::new(Self {
                name,
                fail_with: Some(message.to_string()),
                playing: StdMutex::new(false),
                last_url: StdMutex::new(String::new()),
                journal,
            })
        }

        fn log(&self, event: &str) {
            self.journal
                .lock()
                .unwrap()
                .push(format!("{}.{}", self.name, event));
        }
    }

    #[async_trait]
    impl Backend for MockBackend {
        async fn play(&self, url: &str) -> Result<(), PlayerError> {
            self.log(&format!("play {url}"));
            if let Some(msg) = &self.fail_with {
                return Err(PlayerError::Transport(msg.clone()));
            }
            *self.playing.lock().unwrap() = true;
            *self.last_url.lock().unwrap() = url.to_string();
            Ok(())
        }

        async fn stop(&self) {
            self.log("stop");
            *self.playing.lock().unwrap() = false;
        }

        async fn is_playing(&self) -> bool {
            *self.playing.lock().unwrap()
        }

        async fn last_url(&self) -> String {
            self.last_url.lock().unwrap().clone()
        }
    }

    fn journal() -> Arc<StdMutex<Vec<String>>> {
        Arc::new(StdMutex::new(Vec::new()))
    }

    #[tokio::test]
    async fn stop_is_idempotent_even_when_never_played() {
        let composite = CompositeBackend::new(None, None);
        composite.stop().await;
        composite.stop().await;
        assert!(!composite.is_playing().await);
    }

    #[tokio::test]
    async fn idle_reads_return_zero_values() {
        let composite = CompositeBackend::new(None, None);
        assert!(!composite.is_playing().await);
        assert_eq!(composite.last_url().await, "");
    }

    #[tokio::test]
    async fn empty_url_is_invalid_input() {
        let j = journal();
        let composite = CompositeBackend::new(
            Some(MockBackend::ok("decode", j.clone()) as Arc<dyn Backend>),
            None,
        );
        match composite.play("").await {
            Err(PlayerError::InvalidInput) => {}
            other => panic!("expected InvalidInput, got {other:?}"),
        }
        // The backend was never consulted.
        assert!(j.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn play_with_no_backends_reports_none_available() {
        let composite = CompositeBackend::new(None, None);
        let err = composite.play("http://example.com/stream").await.unwrap_err();
        assert!(err.to_string().contains("no audio backend available"));
    }

    #[tokio::test]
    async fn decode_backend_preferred_when_it_works() {
        let j = journal();
        let decode = MockBackend::ok("decode", j.clone());
        let external = MockBackend::ok("external", j.clone());
        let composite = CompositeBackend::new(
            Some(decode.clone() as Arc<dyn Backend>),
            Some(external.clone() as Arc<dyn Backend>),
        );

        composite.play("http://example.com/a.mp3").await.unwrap();

        assert!(decode.is_playing().await);
        assert!(!external.is_playing().await);
        assert!(composite.is_playing().await);
        assert_eq!(*j.lock().unwrap(), vec!["decode.play http://example.com/a.mp3"]);
    }

    #[tokio::test]
    async fn falls_back_to_external_on_decode_failure() {
        let j = journal();
        let decode = MockBackend::failing("decode", "mp3 decode: bad header", j.clone());
        let external = MockBackend::ok("external", j.clone());
        let composite = CompositeBackend::new(
            Some(decode as Arc<dyn Backend>),
            Some(external.clone() as Arc<dyn Backend>),
        );

        composite.play("http://example.com/a.aac").await.unwrap();

        assert!(external.is_playing().await);
        assert!(composite.is_playing().await);
    }

    #[tokio::test]
    async fn combined_error_names_both_failures() {
        let j = journal();
        let decode = MockBackend::failing("decode", "mp3 decode: bad header", j.clone());
        let external = MockBackend::failing("external", "spawn mpv: not found", j.clone());
        let composite = CompositeBackend::new(
            Some(decode as Arc<dyn Backend>),
            Some(external as Arc<dyn Backend>),
        );

        let err = composite
            .play("http://example.com/a.aac")
            .await
            .unwrap_err()
            .to_string();
        assert!(err.contains("mp3 decode: bad header"), "{err}");
        assert!(err.contains("spawn mpv: not found"), "{err}");
    }

    #[tokio::test]
    async fn decode_only_failure_suggests_installing_a_player() {
        let j = journal();
        let decode = MockBackend::failing("decode", "mp3 decode: bad header", j.clone());
        let composite = CompositeBackend::new(Some(decode as Arc<dyn Backend>), None);

        let err = composite
            .play("http://example.com/a.aac")
            .await
            .unwrap_err()
            .to_string();
        assert!(err.contains("install mpv or ffplay"), "{err}");
        assert!(err.contains("mp3 decode: bad header"), "{err}");
    }

    #[tokio::test]
    async fn last_url_records_failed_attempts_too() {
        let j = journal();
        let decode = MockBackend::failing("decode", "boom", j.clone());
        let composite = CompositeBackend::new(Some(decode as Arc<dyn Backend>), None);

        let _ = composite.play("http://example.com/dead").await;
        assert_eq!(composite.last_url().await, "http://example.com/dead");
        assert!(!composite.is_playing().await);
    }

    #[tokio::test]
    async fn second_play_wins_last_url_regardless_of_outcome() {
        let j = journal();
        let decode = MockBackend::ok("decode", j.clone());
        let composite = CompositeBackend::new(Some(decode as Arc<dyn Backend>), None);

        composite.play("http://example.com/first").await.unwrap();
        let _ = composite.play("").await; // second call fails validation
        assert_eq!(composite.last_url().await, "");

        composite.play("http://example.com/third").await.unwrap();
        assert_eq!(composite.last_url().await, "http://example.com/third");
    }

    #[tokio::test]
    async fn switching_streams_stops_before_starting() {
        let j = journal();
        let decode = MockBackend::ok("decode", j.clone());
        let composite = CompositeBackend::new(Some(decode as Arc<dyn Backend>), None);

        composite.play("http://example.com/a").await.unwrap();
        composite.play("http://example.com/b").await.unwrap();

        assert_eq!(
            *j.lock().unwrap(),
            vec![
                "decode.play http://example.com/a",
                "decode.stop",
                "decode.play http://example.com/b",
            ]
        );
    }

    #[tokio::test]
    async fn fallback_switch_never_leaves_both_active() {
        // First play lands on the decode backend; the second stream is
        // undecodable and lands on the external one.
        let j = journal();
        let decode_ok = StdMutex::new(true);

        struct FlipBackend {
            inner: Arc<MockBackend>,
            ok_first: StdMutex<bool>,
        }

        #[async_trait]
        impl Backend for FlipBackend {
            async fn play(&self, url: &str) -> Result<(), PlayerError> {
                let first = {
                    let mut ok = self.ok_first.lock().unwrap();
                    let was = *ok;
                    if was {
                        *ok = false;
                    }
                    was
                };
                if first {
                    self.inner.play(url).await
                } else {
                    self.inner.log(&format!("play {url}"));
                    Err(PlayerError::Transport("unsupported format".into()))
                }
            }
            async fn stop(&self) {
                self.inner.stop().await
            }
            async fn is_playing(&self) -> bool {
                self.inner.is_playing().await
            }
            async fn last_url(&self) -> String {
                self.inner.last_url().await
            }
        }

        let decode_inner = MockBackend::ok("decode", j.clone());
        let decode = Arc::new(FlipBackend {
            inner: decode_inner.clone(),
            ok_first: decode_ok,
        });
        let external = MockBackend::ok("external", j.clone());
        let composite = CompositeBackend::new(
            Some(decode as Arc<dyn Backend>),
            Some(external.clone() as Arc<dyn Backend>),
        );

        composite.play("http://example.com/a.mp3").await.unwrap();
        assert!(decode_inner.is_playing().await);

        composite.play("http://example.com/b.aac").await.unwrap();
        assert!(!decode_inner.is_playing().await);
        assert!(external.is_playing().await);
        assert!(composite.is_playing().await);
    }
}
