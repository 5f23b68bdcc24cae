//! The session event loop.
//!
//! One task owns all mutable state.  Terminal keys, control-channel requests
//! and background-task completions all arrive as messages; handlers mutate
//! the state and the loop redraws.  Playback and directory lookups run in
//! spawned tasks and report back through the same channel, so a slow stream
//! never blocks a key press or a remote command.

use std::io;
use std::sync::Arc;

use ratatui::crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tui_input::{backend::crossterm::EventHandler, Input};

use dial_proto::favorites::Favorites;
use dial_proto::ipc::PendingRequest;
use dial_proto::protocol::{status_payload, ControlCommand, ControlReply};
use dial_proto::radio::{Country, RadioClient, Station};

use crate::player::Backend;
use crate::theme::{self, Theme};
use crate::ui;

const DEFAULT_COUNTRY: &str = "US";

pub enum AppMessage {
    Terminal(Event),
    Stations(Result<Vec<Station>, String>),
    Countries(Result<Vec<Country>, String>),
    PlayDone {
        station: Station,
        result: Result<(), String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    None,
    Search,
    CountrySelect,
}

pub struct App {
    client: Option<Arc<RadioClient>>,
    player: Option<Arc<dyn Backend>>,
    favorites: Option<Favorites>,

    pub stations: Vec<Station>,
    pub filtered: Vec<Station>,
    pub selected: usize,

    pub loading: bool,
    pub err_msg: String,

    pub country: String,

    pub input_mode: InputMode,
    pub search: Input,
    pub country_search: Input,

    pub show_help: bool,
    pub show_theme: bool,
    pub theme_idx: usize,
    pub theme: Theme,

    pub playing: bool,
    pub playing_uuid: String,
    last_station: Option<Station>,

    pub countries: Vec<Country>,
    pub filtered_countries: Vec<Country>,
    pub country_index: usize,
    country_loading: bool,

    msg_tx: mpsc::Sender<AppMessage>,
    msg_rx: mpsc::Receiver<AppMessage>,
    should_quit: bool,
}

/// Restores the terminal even when the loop unwinds.
struct TerminalGuard;

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
    }
}

impl App {
    pub fn new(
        client: Option<Arc<RadioClient>>,
        player: Option<Arc<dyn Backend>>,
        favorites: Option<Favorites>,
        player_err: Option<String>,
        theme_slug: &str,
    ) -> Self {
        let theme = theme::by_slug(theme_slug);
        let theme_idx = theme::THEMES
            .iter()
            .position(|t| t.slug == theme.slug)
            .unwrap_or(0);

        let err_msg = player_err
            .map(|e| format!("Audio backend not found. Install mpv or ffplay and ensure it is in PATH. ({e})"))
            .unwrap_or_default();

        let (msg_tx, msg_rx) = mpsc::channel(256);

        Self {
            client,
            player,
            favorites,
            stations: Vec::new(),
            filtered: Vec::new(),
            selected: 0,
            loading: true,
            err_msg,
            country: DEFAULT_COUNTRY.to_string(),
            input_mode: InputMode::None,
            search: Input::default(),
            country_search: Input::default(),
            show_help: false,
            show_theme: false,
            theme_idx,
            theme,
            playing: false,
            playing_uuid: String::new(),
            last_station: None,
            countries: Vec::new(),
            filtered_countries: Vec::new(),
            country_index: 0,
            country_loading: false,
            msg_tx,
            msg_rx,
            should_quit: false,
        }
    }

    pub async fn run(
        mut self,
        mut ipc_rx: mpsc::Receiver<PendingRequest>,
    ) -> anyhow::Result<()> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let _guard = TerminalGuard;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        // Keyboard reader lives on the blocking pool; crossterm reads are
        // synchronous.
        let event_tx = self.msg_tx.clone();
        tokio::task::spawn_blocking(move || loop {
            match event::read() {
                Ok(ev) => {
                    if event_tx.blocking_send(AppMessage::Terminal(ev)).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        });

        self.load_stations();

        loop {
            terminal.draw(|f| ui::draw(f, &self))?;

            if self.should_quit {
                break;
            }

            tokio::select! {
                Some(msg) = self.msg_rx.recv() => {
                    self.handle_message(msg).await;
                }
                Some(request) = ipc_rx.recv() => {
                    self.handle_control(request).await;
                }
                else => break,
            }
        }

        if let Some(player) = &self.player {
            player.stop().await;
        }
        info!("session shut down");
        Ok(())
    }

    async fn handle_message(&mut self, msg: AppMessage) {
        match msg {
            AppMessage::Terminal(Event::Key(key)) if key.kind == KeyEventKind::Press => {
                self.handle_key(key).await;
            }
            AppMessage::Terminal(_) => {}
            AppMessage::Stations(Ok(stations)) => {
                self.loading = false;
                self.err_msg.clear();
                self.stations = stations;
                self.selected = 0;
                self.apply_filter();
                self.ensure_selection();
            }
            AppMessage::Stations(Err(e)) => {
                self.loading = false;
                self.err_msg = e;
                self.stations.clear();
                self.filtered.clear();
                self.selected = 0;
            }
            AppMessage::Countries(Ok(countries)) => {
                self.country_loading = false;
                self.err_msg.clear();
                self.countries = countries;
                self.apply_country_filter();
                self.ensure_country_selection();
            }
            AppMessage::Countries(Err(e)) => {
                self.country_loading = false;
                self.err_msg = e;
                self.countries.clear();
                self.filtered_countries.clear();
                self.country_index = 0;
            }
            AppMessage::PlayDone { station, result } => match result {
                Ok(()) => {
                    self.err_msg.clear();
                    self.playing = true;
                    self.playing_uuid = station.uuid.clone();
                    self.last_station = Some(station);
                }
                Err(e) => {
                    warn!("playback failed for {}: {}", station.name, e);
                    self.err_msg = e;
                }
            },
        }
    }

    async fn handle_key(&mut self, key: KeyEvent) {
        let ctrl_c = key.code == KeyCode::Char('c')
            && key.modifiers.contains(KeyModifiers::CONTROL);
        if ctrl_c || (self.input_mode == InputMode::None && key.code == KeyCode::Char('q')) {
            self.should_quit = true;
            return;
        }

        if self.show_help {
            if matches!(
                key.code,
                KeyCode::Char('?') | KeyCode::Esc | KeyCode::Enter
            ) {
                self.show_help = false;
            }
            return;
        }

        if self.show_theme {
            self.handle_theme_key(key);
            return;
        }

        match self.input_mode {
            InputMode::Search => {
                self.handle_search_key(key);
                return;
            }
            InputMode::CountrySelect => {
                self.handle_country_key(key);
                return;
            }
            InputMode::None => {}
        }

        match key.code {
            KeyCode::Char('?') => self.show_help = true,
            KeyCode::Up | KeyCode::Left => self.move_selection(-1),
            KeyCode::Down | KeyCode::Right => self.move_selection(1),
            KeyCode::Enter => {
                if let Some(station) = self.current_station() {
                    self.err_msg.clear();
                    self.start_play(station);
                }
            }
            KeyCode::Char(' ') => {
                if self.playing {
                    self.stop_playback().await;
                } else if let Some(station) = self.last_station.clone() {
                    self.start_play(station);
                }
            }
            KeyCode::Char('l') | KeyCode::Char('L') => {
                self.input_mode = InputMode::CountrySelect;
                self.country_search = Input::default();
                if self.countries.is_empty() && !self.country_loading {
                    self.country_loading = true;
                    self.load_countries();
                }
                self.apply_country_filter();
                self.ensure_country_selection();
            }
            KeyCode::Char('/') => {
                self.input_mode = InputMode::Search;
            }
            KeyCode::Char('t') | KeyCode::Char('T') => self.show_theme = true,
            KeyCode::Char('f') | KeyCode::Char('F') => self.toggle_favorite(),
            _ => {}
        }
    }

    fn handle_theme_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('t') | KeyCode::Char('T') | KeyCode::Esc => {
                self.show_theme = false;
            }
            KeyCode::Up | KeyCode::Char('k') => {
                if self.theme_idx > 0 {
                    self.theme_idx -= 1;
                    self.theme = theme::THEMES[self.theme_idx];
                }
            }
            KeyCode::Down | KeyCode::Char('j') => {
                if self.theme_idx + 1 < theme::THEMES.len() {
                    self.theme_idx += 1;
                    self.theme = theme::THEMES[self.theme_idx];
                }
            }
            KeyCode::Enter => {
                self.show_theme = false;
                if let Err(e) = dial_proto::config::save_theme(self.theme.slug) {
                    self.err_msg = format!("Failed to save theme: {e}");
                }
            }
            _ => {}
        }
    }

    fn handle_search_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Enter => {
                self.input_mode = InputMode::None;
            }
            KeyCode::Esc => {
                self.input_mode = InputMode::None;
                self.search = Input::default();
            }
            _ => {
                self.search.handle_event(&Event::Key(key));
            }
        }
        self.apply_filter();
        self.ensure_selection();
    }

    fn handle_country_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Up => self.move_country_selection(-1),
            KeyCode::Down => self.move_country_selection(1),
            KeyCode::Enter => {
                if let Some(country) = self.current_country() {
                    self.input_mode = InputMode::None;
                    self.country_search = Input::default();
                    self.country = country.code.trim().to_uppercase();
                    self.loading = true;
                    self.load_stations();
                    return;
                }
            }
            KeyCode::Esc => {
                self.input_mode = InputMode::None;
                self.country_search = Input::default();
            }
            _ => {
                self.country_search.handle_event(&Event::Key(key));
            }
        }
        self.apply_country_filter();
        self.ensure_country_selection();
    }

    // ── Control channel ──────────────────────────────────────────────────────

    async fn handle_control(&mut self, request: PendingRequest) {
        debug!("control command: {}", request.command.as_str());
        let reply = match &request.command {
            ControlCommand::PlayPause => self.control_play_pause().await,
            ControlCommand::Next => self.control_select_and_play(1),
            ControlCommand::Prev => self.control_select_and_play(-1),
            ControlCommand::Quit => {
                // Reply before tearing down so the remote sees the ack.
                let _ = request.reply.send(ControlReply::ok());
                self.should_quit = true;
                return;
            }
            ControlCommand::Status => {
                let name = self
                    .current_station()
                    .map(|s| s.name)
                    .unwrap_or_default();
                ControlReply::with_data(status_payload(self.playing, &name, &self.country))
            }
            ControlCommand::Ping => ControlReply::with_data("OK"),
            ControlCommand::Unknown(_) => ControlReply::err("unknown command"),
        };
        let _ = request.reply.send(reply);
    }

    async fn control_play_pause(&mut self) -> ControlReply {
        if self.playing {
            self.stop_playback().await;
            return ControlReply::ok();
        }
        match self.current_station() {
            Some(station) => {
                self.start_play(station);
                ControlReply::with_data("QUEUED")
            }
            None => ControlReply::err("no station selected"),
        }
    }

    fn control_select_and_play(&mut self, delta: isize) -> ControlReply {
        if self.visible_stations().is_empty() {
            return ControlReply::err("no stations available");
        }
        self.move_selection(delta);
        match self.current_station() {
            Some(station) => {
                self.start_play(station);
                ControlReply::with_data("QUEUED")
            }
            None => ControlReply::err("no station selected"),
        }
    }

    // ── Playback ─────────────────────────────────────────────────────────────

    /// Resolve the stream URL and hand it to the player in the background.
    /// The loop learns the outcome through a `PlayDone` message.
    fn start_play(&mut self, station: Station) {
        let Some(client) = self.client.clone() else {
            self.err_msg = "station directory not available".to_string();
            return;
        };
        let Some(player) = self.player.clone() else {
            self.err_msg =
                "Audio backend not available. Install mpv or ffplay and ensure it is in PATH."
                    .to_string();
            return;
        };

        let tx = self.msg_tx.clone();
        tokio::spawn(async move {
            let result = async {
                let url = client
                    .resolve_station_url(&station.uuid)
                    .await
                    .map_err(|e| e.to_string())?;
                player.play(&url).await.map_err(|e| e.to_string())
            }
            .await;
            let _ = tx.send(AppMessage::PlayDone { station, result }).await;
        });
    }

    async fn stop_playback(&mut self) {
        if let Some(player) = &self.player {
            player.stop().await;
        }
        self.playing = false;
        self.playing_uuid.clear();
    }

    // ── Background lookups ───────────────────────────────────────────────────

    fn load_stations(&mut self) {
        let Some(client) = self.client.clone() else {
            self.loading = false;
            self.err_msg = "station directory not available".to_string();
            return;
        };
        let country = self.country.clone();
        let query = self.search.value().trim().to_string();
        let tx = self.msg_tx.clone();
        tokio::spawn(async move {
            let result = if query.is_empty() {
                client.stations_by_country(&country).await
            } else {
                client
                    .search_stations_by_country(&country, &query, 200, 0)
                    .await
            };
            let _ = tx
                .send(AppMessage::Stations(result.map_err(|e| e.to_string())))
                .await;
        });
    }

    fn load_countries(&mut self) {
        let Some(client) = self.client.clone() else {
            self.country_loading = false;
            self.err_msg = "station directory not available".to_string();
            return;
        };
        let tx = self.msg_tx.clone();
        tokio::spawn(async move {
            let result = client.countries().await;
            let _ = tx
                .send(AppMessage::Countries(result.map_err(|e| e.to_string())))
                .await;
        });
    }

    // ── Favorites ────────────────────────────────────────────────────────────

    fn toggle_favorite(&mut self) {
        let Some(station) = self.current_station() else {
            return;
        };
        if let Some(favorites) = self.favorites.as_mut() {
            if let Err(e) = favorites.toggle(&station) {
                self.err_msg = e.to_string();
            }
        }
    }

    pub fn is_favorite(&self, uuid: &str) -> bool {
        self.favorites
            .as_ref()
            .map(|f| f.is_favorite(uuid))
            .unwrap_or(false)
    }

    // ── Selection and filtering ──────────────────────────────────────────────

    fn apply_filter(&mut self) {
        let filter = self.search.value().trim().to_lowercase();
        if filter.is_empty() {
            self.filtered.clear();
            return;
        }
        self.filtered = self
            .stations
            .iter()
            .filter(|s| {
                s.name.to_lowercase().contains(&filter)
                    || s.tags.to_lowercase().contains(&filter)
            })
            .cloned()
            .collect();
        if self.filtered.is_empty() {
            self.selected = 0;
        }
    }

    fn apply_country_filter(&mut self) {
        let filter = self.country_search.value().trim().to_lowercase();
        if filter.is_empty() {
            self.filtered_countries.clear();
            return;
        }
        self.filtered_countries = self
            .countries
            .iter()
            .filter(|c| {
                c.name.to_lowercase().contains(&filter)
                    || c.code.to_lowercase().contains(&filter)
            })
            .cloned()
            .collect();
        if self.filtered_countries.is_empty() {
            self.country_index = 0;
        }
    }

    pub fn visible_stations(&self) -> &[Station] {
        if self.search.value().trim().is_empty() {
            &self.stations
        } else {
            &self.filtered
        }
    }

    pub fn visible_countries(&self) -> &[Country] {
        if self.country_search.value().trim().is_empty() {
            &self.countries
        } else {
            &self.filtered_countries
        }
    }

    fn ensure_selection(&mut self) {
        let len = self.visible_stations().len();
        if len == 0 {
            self.selected = 0;
        } else if self.selected >= len {
            self.selected = len - 1;
        }
    }

    fn ensure_country_selection(&mut self) {
        let len = self.visible_countries().len();
        if len == 0 {
            self.country_index = 0;
        } else if self.country_index >= len {
            self.country_index = len - 1;
        }
    }

    /// Clamped move within the visible list.
    fn move_selection(&mut self, delta: isize) {
        let len = self.visible_stations().len();
        if len == 0 {
            return;
        }
        let next = self.selected as isize + delta;
        self.selected = next.clamp(0, len as isize - 1) as usize;
    }

    fn move_country_selection(&mut self, delta: isize) {
        let len = self.visible_countries().len();
        if len == 0 {
            return;
        }
        let next = self.country_index as isize + delta;
        self.country_index = next.clamp(0, len as isize - 1) as usize;
    }

    pub fn current_station(&self) -> Option<Station> {
        self.visible_stations().get(self.selected).cloned()
    }

    fn current_country(&self) -> Option<Country> {
        self.visible_countries().get(self.country_index).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    fn station(uuid: &str, name: &str, tags: &str) -> Station {
        Station {
            uuid: uuid.to_string(),
            name: name.to_string(),
            tags: tags.to_string(),
            ..Default::default()
        }
    }

    fn app_with_stations(stations: Vec<Station>) -> App {
        let mut app = App::new(None, None, None, None, "vintage");
        app.loading = false;
        app.stations = stations;
        app
    }

    async fn send(app: &mut App, command: ControlCommand) -> ControlReply {
        let (tx, rx) = oneshot::channel();
        app.handle_control(PendingRequest { command, reply: tx })
            .await;
        rx.await.unwrap()
    }

    #[tokio::test]
    async fn status_reports_selection_and_country() {
        let mut app = app_with_stations(vec![
            station("a", "Alpha FM", ""),
            station("b", "Beta FM", ""),
        ]);
        app.selected = 1;

        let reply = send(&mut app, ControlCommand::Status).await;
        assert_eq!(
            reply.encode(),
            r#"{"playing":false,"station":"Beta FM","country":"US"}"#
        );
    }

    #[tokio::test]
    async fn status_uses_dash_for_empty_selection() {
        let mut app = app_with_stations(vec![]);
        let reply = send(&mut app, ControlCommand::Status).await;
        assert_eq!(
            reply.encode(),
            r#"{"playing":false,"station":"-","country":"US"}"#
        );
    }

    #[tokio::test]
    async fn next_clamps_at_the_end_of_the_list() {
        let mut app = app_with_stations(vec![
            station("a", "Alpha FM", ""),
            station("b", "Beta FM", ""),
        ]);
        app.selected = 1;

        // No player configured: the move happens, the play attempt reports
        // through err_msg, and the reply is still QUEUED.
        let reply = send(&mut app, ControlCommand::Next).await;
        assert_eq!(reply.encode(), "QUEUED");
        assert_eq!(app.selected, 1);
    }

    #[tokio::test]
    async fn prev_clamps_at_the_start_of_the_list() {
        let mut app = app_with_stations(vec![
            station("a", "Alpha FM", ""),
            station("b", "Beta FM", ""),
        ]);

        let reply = send(&mut app, ControlCommand::Prev).await;
        assert_eq!(reply.encode(), "QUEUED");
        assert_eq!(app.selected, 0);
    }

    #[tokio::test]
    async fn next_with_no_stations_is_an_error() {
        let mut app = app_with_stations(vec![]);
        let reply = send(&mut app, ControlCommand::Next).await;
        assert_eq!(reply.encode(), "ERR no stations available");
    }

    #[tokio::test]
    async fn play_pause_without_selection_is_an_error() {
        let mut app = app_with_stations(vec![]);
        let reply = send(&mut app, ControlCommand::PlayPause).await;
        assert_eq!(reply.encode(), "ERR no station selected");
    }

    #[tokio::test]
    async fn play_pause_stops_when_playing() {
        let mut app = app_with_stations(vec![station("a", "Alpha FM", "")]);
        app.playing = true;
        app.playing_uuid = "a".to_string();

        let reply = send(&mut app, ControlCommand::PlayPause).await;
        assert_eq!(reply.encode(), "OK");
        assert!(!app.playing);
        assert!(app.playing_uuid.is_empty());
    }

    #[tokio::test]
    async fn quit_acks_before_shutdown() {
        let mut app = app_with_stations(vec![]);
        let reply = send(&mut app, ControlCommand::Quit).await;
        assert_eq!(reply.encode(), "OK");
        assert!(app.should_quit);
    }

    #[tokio::test]
    async fn unknown_command_is_reported_by_the_dispatcher() {
        let mut app = app_with_stations(vec![]);
        let reply = send(&mut app, ControlCommand::Unknown("BOGUS".into())).await;
        assert_eq!(reply.encode(), "ERR unknown command");
    }

    #[tokio::test]
    async fn ping_answers_ok_data() {
        let mut app = app_with_stations(vec![]);
        let reply = send(&mut app, ControlCommand::Ping).await;
        assert_eq!(reply.encode(), "OK");
    }

    #[test]
    fn filter_matches_name_and_tags() {
        let mut app = app_with_stations(vec![
            station("a", "Jazz 24", "jazz,smooth"),
            station("b", "Rock One", "rock"),
            station("c", "Morning Mix", "jazz,talk"),
        ]);
        app.search = Input::new("jazz".to_string());
        app.apply_filter();
        assert_eq!(app.visible_stations().len(), 2);

        app.search = Input::new("rock one".to_string());
        app.apply_filter();
        assert_eq!(app.visible_stations().len(), 1);
        assert_eq!(app.visible_stations()[0].uuid, "b");
    }

    #[test]
    fn clearing_the_filter_restores_the_full_list() {
        let mut app = app_with_stations(vec![
            station("a", "Jazz 24", ""),
            station("b", "Rock One", ""),
        ]);
        app.search = Input::new("jazz".to_string());
        app.apply_filter();
        assert_eq!(app.visible_stations().len(), 1);

        app.search = Input::default();
        app.apply_filter();
        assert_eq!(app.visible_stations().len(), 2);
    }

    #[test]
    fn selection_is_clamped_when_the_list_shrinks() {
        let mut app = app_with_stations(vec![
            station("a", "Jazz 24", ""),
            station("b", "Rock One", ""),
            station("c", "Morning Mix", ""),
        ]);
        app.selected = 2;
        app.search = Input::new("jazz".to_string());
        app.apply_filter();
        app.ensure_selection();
        assert_eq!(app.selected, 0);
    }

    #[test]
    fn country_filter_matches_name_and_code() {
        let mut app = app_with_stations(vec![]);
        app.countries = vec![
            Country {
                name: "Germany".into(),
                code: "DE".into(),
                station_count: 100,
            },
            Country {
                name: "Denmark".into(),
                code: "DK".into(),
                station_count: 50,
            },
        ];
        app.country_search = Input::new("de".to_string());
        app.apply_country_filter();
        // "de" matches the DE code and the name "Denmark".
        assert_eq!(app.visible_countries().len(), 2);

        app.country_search = Input::new("denmark".to_string());
        app.apply_country_filter();
        assert_eq!(app.visible_countries().len(), 1);
        assert_eq!(app.visible_countries()[0].code, "DK");
    }
}
