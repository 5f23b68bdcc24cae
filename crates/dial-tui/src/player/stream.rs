//! In-process MP3 playback.
//!
//! The stream is fetched with reqwest, chunks are pushed over a channel to a
//! blocking reader, and rodio decodes from that reader on the blocking pool.
//! Everything is resampled to stereo 44.1kHz before it hits the sink so the
//! output format never depends on the station.

use std::io::{self, Read, Seek, SeekFrom};
use std::sync::{Arc, Mutex, OnceLock};

use async_trait::async_trait;
use futures_util::StreamExt;
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{Backend, PlayerError};
use dial_proto::USER_AGENT;

const SAMPLE_RATE: u32 = 44_100;
const CHANNELS: u16 = 2;

/// Bytes buffered between the network task and the decoder before the
/// network task blocks.  64 chunks of typical reqwest chunk size is a few
/// seconds of a 128kbps stream.
const CHUNK_QUEUE_DEPTH: usize = 64;

/// The OS output device is opened once per process.  `OutputStream` is not
/// `Send`, so the stream itself is leaked and only the handle is kept.
fn output_handle() -> Result<&'static OutputStreamHandle, PlayerError> {
    static HANDLE: OnceLock<Option<OutputStreamHandle>> = OnceLock::new();
    let handle = HANDLE.get_or_init(|| match OutputStream::try_default() {
        Ok((stream, handle)) => {
            std::mem::forget(stream);
            Some(handle)
        }
        Err(e) => {
            warn!("no audio output device: {}", e);
            None
        }
    });
    handle
        .as_ref()
        .ok_or_else(|| PlayerError::NotAvailable("no audio output device".into()))
}

/// Blocking `Read` over the chunk channel.  rodio's decoder wants `Seek` as
/// well; a live stream can't seek, so those calls fail cleanly and the mp3
/// decoder (which never seeks) is unaffected.
struct ChannelReader {
    rx: mpsc::Receiver<Vec<u8>>,
    buf: Vec<u8>,
    pos: usize,
}

impl ChannelReader {
    fn new(rx: mpsc::Receiver<Vec<u8>>) -> Self {
        Self {
            rx,
            buf: Vec::new(),
            pos: 0,
        }
    }
}

impl Read for ChannelReader {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        while self.pos >= self.buf.len() {
            match self.rx.blocking_recv() {
                Some(chunk) => {
                    self.buf = chunk;
                    self.pos = 0;
                }
                None => return Ok(0),
            }
        }
        let n = (self.buf.len() - self.pos).min(out.len());
        out[..n].copy_from_slice(&self.buf[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

impl Seek for ChannelReader {
    fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "live stream is not seekable",
        ))
    }
}

struct StreamState {
    sink: Option<Arc<Sink>>,
    last_url: String,
}

/// Plays MP3 HTTP streams with the in-process decoder.
pub struct StreamPlayer {
    http: reqwest::Client,
    state: Arc<Mutex<StreamState>>,
}

impl StreamPlayer {
    pub fn new() -> Result<Self, PlayerError> {
        // Probe the output device up front so detection can report a machine
        // with no audio hardware instead of failing on first play.
        output_handle()?;

        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| PlayerError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            state: Arc::new(Mutex::new(StreamState {
                sink: None,
                last_url: String::new(),
            })),
        })
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, StreamState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn stop_current(&self) {
        let sink = self.lock_state().sink.take();
        if let Some(sink) = sink {
            sink.stop();
        }
    }
}

#[async_trait]
impl Backend for StreamPlayer {
    async fn play(&self, url: &str) -> Result<(), PlayerError> {
        if url.is_empty() {
            return Err(PlayerError::InvalidInput);
        }

        self.stop_current();
        self.lock_state().last_url = url.to_string();

        // Some stations interleave metadata into the stream unless told not
        // to; the decoder can't cope with that.
        let response = self
            .http
            .get(url)
            .header("Icy-MetaData", "0")
            .send()
            .await
            .map_err(|e| PlayerError::Transport(format!("fetch stream: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(PlayerError::Transport(format!(
                "fetch stream: unexpected status {status}"
            )));
        }

        let (chunk_tx, chunk_rx) = mpsc::channel::<Vec<u8>>(CHUNK_QUEUE_DEPTH);

        // Feeder: network chunks into the channel until the stream ends or
        // the reader side is dropped by stop().
        let feed_url = url.to_string();
        tokio::spawn(async move {
            let mut body = response.bytes_stream();
            while let Some(chunk) = body.next().await {
                match chunk {
                    Ok(bytes) => {
                        if chunk_tx.send(bytes.to_vec()).await.is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        debug!("stream {} ended: {}", feed_url, e);
                        return;
                    }
                }
            }
        });

        // Decoder setup touches blocking IO (it reads the stream head), so it
        // runs on the blocking pool.
        let handle = output_handle()?;
        let sink = tokio::task::spawn_blocking(move || -> Result<Arc<Sink>, PlayerError> {
            let reader = ChannelReader::new(chunk_rx);
            let decoder = Decoder::new_mp3(reader)
                .map_err(|e| PlayerError::Transport(format!("mp3 decode: {e}")))?;
            let source =
                rodio::source::UniformSourceIterator::<_, i16>::new(decoder, CHANNELS, SAMPLE_RATE);
            let sink = Sink::try_new(handle)
                .map_err(|e| PlayerError::Transport(format!("open sink: {e}")))?;
            sink.append(source);
            Ok(Arc::new(sink))
        })
        .await
        .map_err(|e| PlayerError::Transport(format!("decoder task: {e}")))??;

        self.lock_state().sink = Some(sink.clone());

        // Watcher: when playback drains (stream over, network gone), clear
        // the playing state.  The identity check makes sure a watcher from an
        // earlier play never clobbers the sink of a later one.
        let state = self.state.clone();
        tokio::task::spawn_blocking(move || {
            sink.sleep_until_end();
            let mut guard = state.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(current) = &guard.sink {
                if Arc::ptr_eq(current, &sink) {
                    guard.sink = None;
                }
            }
        });

        Ok(())
    }

    async fn stop(&self) {
        self.stop_current();
    }

    async fn is_playing(&self) -> bool {
        self.lock_state().sink.is_some()
    }

    async fn last_url(&self) -> String {
        self.lock_state().last_url.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_reader_drains_chunks_in_order() {
        let (tx, rx) = mpsc::channel(4);
        tx.try_send(vec![1, 2, 3]).unwrap();
        tx.try_send(vec![4]).unwrap();
        drop(tx);

        let mut reader = ChannelReader::new(rx);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, vec![1, 2, 3, 4]);
    }

    #[test]
    fn channel_reader_handles_short_reads() {
        let (tx, rx) = mpsc::channel(4);
        tx.try_send(vec![9, 8, 7, 6]).unwrap();
        drop(tx);

        let mut reader = ChannelReader::new(rx);
        let mut buf = [0u8; 3];
        assert_eq!(reader.read(&mut buf).unwrap(), 3);
        assert_eq!(buf, [9, 8, 7]);
        assert_eq!(reader.read(&mut buf).unwrap(), 1);
        assert_eq!(buf[0], 6);
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn channel_reader_refuses_to_seek() {
        let (_tx, rx) = mpsc::channel::<Vec<u8>>(1);
        let mut reader = ChannelReader::new(rx);
        let err = reader.seek(SeekFrom::Start(0)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);
    }
}
