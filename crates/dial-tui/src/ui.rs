//! Rendering.  All state lives in [`App`]; this module only draws it.

use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph},
    Frame,
};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::app::{App, InputMode};
use crate::theme;

pub fn draw(frame: &mut Frame, app: &App) {
    let area = frame.area();
    frame.render_widget(
        Block::default().style(app.theme.style_default()),
        area,
    );

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // header
            Constraint::Min(3),    // station list
            Constraint::Length(1), // status / now playing
            Constraint::Length(1), // error or hints
        ])
        .split(area);

    draw_header(frame, app, rows[0]);
    draw_station_list(frame, app, rows[1]);
    draw_status(frame, app, rows[2]);
    draw_footer(frame, app, rows[3]);

    match app.input_mode {
        InputMode::CountrySelect => draw_country_overlay(frame, app, area),
        InputMode::Search | InputMode::None => {}
    }
    if app.show_theme {
        draw_theme_overlay(frame, app, area);
    }
    if app.show_help {
        draw_help_overlay(frame, app, area);
    }
}

fn draw_header(frame: &mut Frame, app: &App, area: Rect) {
    let line = Line::from(vec![
        Span::raw(" dialfm "),
        Span::styled(format!("· {} ", app.country), app.theme.style_accent()),
        Span::styled(
            format!("· {} stations ", app.visible_stations().len()),
            app.theme.style_muted(),
        ),
    ]);
    frame.render_widget(
        Paragraph::new(line).style(app.theme.style_header()),
        area,
    );
}

fn draw_station_list(frame: &mut Frame, app: &App, area: Rect) {
    let stations = app.visible_stations();

    if app.loading {
        frame.render_widget(
            Paragraph::new("Loading stations…")
                .style(app.theme.style_muted())
                .alignment(Alignment::Center),
            area,
        );
        return;
    }
    if stations.is_empty() {
        frame.render_widget(
            Paragraph::new("No stations. Press l to pick a country, / to search.")
                .style(app.theme.style_muted())
                .alignment(Alignment::Center),
            area,
        );
        return;
    }

    let name_width = area.width.saturating_sub(14) as usize;
    let items: Vec<ListItem> = stations
        .iter()
        .map(|s| {
            let playing = app.playing && s.uuid == app.playing_uuid;
            let marker = if playing { "▶" } else { " " };
            let fav = if app.is_favorite(&s.uuid) { "♥" } else { " " };
            let name = truncate(&s.name, name_width);
            let meta = if s.bitrate > 0 {
                format!(" {}kbps", s.bitrate)
            } else {
                String::new()
            };
            let style = if playing {
                app.theme.style_playing()
            } else {
                app.theme.style_default()
            };
            ListItem::new(Line::from(vec![
                Span::styled(format!(" {marker} {fav} "), app.theme.style_accent()),
                Span::styled(name, style),
                Span::styled(meta, app.theme.style_muted()),
            ]))
        })
        .collect();

    let mut state = ListState::default();
    state.select(Some(app.selected));

    let list = List::new(items)
        .highlight_style(app.theme.style_selected())
        .highlight_symbol("");
    frame.render_stateful_widget(list, area, &mut state);
}

fn draw_status(frame: &mut Frame, app: &App, area: Rect) {
    let line = if app.playing {
        let name = app
            .current_station()
            .map(|s| s.name)
            .unwrap_or_else(|| "-".to_string());
        Line::from(vec![
            Span::styled(" ● playing ", app.theme.style_playing()),
            Span::raw(truncate(&name, area.width.saturating_sub(12) as usize)),
        ])
    } else {
        Line::from(Span::styled(" ○ stopped", app.theme.style_muted()))
    };
    frame.render_widget(Paragraph::new(line), area);
}

fn draw_footer(frame: &mut Frame, app: &App, area: Rect) {
    if app.input_mode == InputMode::Search {
        let value = app.search.value();
        let scroll = app.search.visual_scroll(area.width.saturating_sub(4) as usize);
        let shown: String = value.chars().skip(scroll).collect();
        frame.render_widget(
            Paragraph::new(Line::from(vec![
                Span::styled(" / ", app.theme.style_accent()),
                Span::raw(shown),
            ])),
            area,
        );
        let cursor_x = area.x + 3 + (app.search.visual_cursor().saturating_sub(scroll)) as u16;
        frame.set_cursor_position((cursor_x.min(area.right().saturating_sub(1)), area.y));
        return;
    }

    if !app.err_msg.is_empty() {
        frame.render_widget(
            Paragraph::new(truncate(&app.err_msg, area.width as usize))
                .style(app.theme.style_error()),
            area,
        );
        return;
    }

    frame.render_widget(
        Paragraph::new(" ↑↓ select · enter play · space toggle · / search · l country · f fav · t theme · ? help · q quit")
            .style(app.theme.style_muted()),
        area,
    );
}

fn draw_country_overlay(frame: &mut Frame, app: &App, area: Rect) {
    let popup = centered_rect(46, 70, area);
    frame.render_widget(Clear, popup);

    let block = Block::default()
        .title(" Country ")
        .borders(Borders::ALL)
        .border_style(app.theme.style_border_focused())
        .style(app.theme.style_default());
    let inner = block.inner(popup);
    frame.render_widget(block, popup);

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Min(1)])
        .split(inner);

    frame.render_widget(
        Paragraph::new(Line::from(vec![
            Span::styled("Search: ", app.theme.style_accent()),
            Span::raw(app.country_search.value()),
        ])),
        rows[0],
    );

    let countries = app.visible_countries();
    if countries.is_empty() {
        frame.render_widget(
            Paragraph::new("Loading countries…").style(app.theme.style_muted()),
            rows[1],
        );
        return;
    }

    let items: Vec<ListItem> = countries
        .iter()
        .map(|c| {
            ListItem::new(Line::from(vec![
                Span::styled(format!(" {} ", c.code), app.theme.style_accent()),
                Span::raw(truncate(&c.name, rows[1].width.saturating_sub(12) as usize)),
                Span::styled(format!(" ({})", c.station_count), app.theme.style_muted()),
            ]))
        })
        .collect();

    let mut state = ListState::default();
    state.select(Some(app.country_index));
    frame.render_stateful_widget(
        List::new(items).highlight_style(app.theme.style_selected()),
        rows[1],
        &mut state,
    );
}

fn draw_theme_overlay(frame: &mut Frame, app: &App, area: Rect) {
    let popup = centered_rect(36, 60, area);
    frame.render_widget(Clear, popup);

    let block = Block::default()
        .title(" Theme ")
        .borders(Borders::ALL)
        .border_style(app.theme.style_border_focused())
        .style(app.theme.style_default());
    let inner = block.inner(popup);
    frame.render_widget(block, popup);

    let items: Vec<ListItem> = theme::THEMES
        .iter()
        .map(|t| ListItem::new(format!(" {}", t.name)))
        .collect();

    let mut state = ListState::default();
    state.select(Some(app.theme_idx));
    frame.render_stateful_widget(
        List::new(items).highlight_style(app.theme.style_selected()),
        inner,
        &mut state,
    );
}

fn draw_help_overlay(frame: &mut Frame, app: &App, area: Rect) {
    let popup = centered_rect(52, 60, area);
    frame.render_widget(Clear, popup);

    let block = Block::default()
        .title(" Keys ")
        .borders(Borders::ALL)
        .border_style(app.theme.style_border_focused())
        .style(app.theme.style_default());
    let inner = block.inner(popup);
    frame.render_widget(block, popup);

    let rows = [
        ("↑/↓ ←/→", "move the selection"),
        ("enter", "play the selected station"),
        ("space", "stop, or resume the last station"),
        ("/", "filter stations by name or tag"),
        ("l", "choose a country"),
        ("f", "toggle favorite"),
        ("t", "choose a color theme"),
        ("?", "this help"),
        ("q", "quit"),
    ];
    let lines: Vec<Line> = rows
        .iter()
        .map(|(key, what)| {
            Line::from(vec![
                Span::styled(format!(" {key:>9}  "), app.theme.style_accent()),
                Span::raw(*what),
            ])
        })
        .collect();
    frame.render_widget(Paragraph::new(lines), inner);
}

fn centered_rect(pct_x: u16, pct_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - pct_y) / 2),
            Constraint::Percentage(pct_y),
            Constraint::Percentage((100 - pct_y) / 2),
        ])
        .split(area);
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - pct_x) / 2),
            Constraint::Percentage(pct_x),
            Constraint::Percentage((100 - pct_x) / 2),
        ])
        .split(vertical[1])[1]
}

/// Truncate to a display width, appending an ellipsis when cut.
fn truncate(text: &str, max_width: usize) -> String {
    if text.width() <= max_width {
        return text.to_string();
    }
    if max_width == 0 {
        return String::new();
    }
    let mut out = String::new();
    let mut used = 0;
    for ch in text.chars() {
        let w = ch.width().unwrap_or(0);
        if used + w + 1 > max_width {
            break;
        }
        used += w;
        out.push(ch);
    }
    out.push('…');
    out
}
