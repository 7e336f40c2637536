use chrono::NaiveDate;
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, List, ListItem, ListState, Paragraph, Row, Table, Wrap},
    Frame,
};
use unicode_width::UnicodeWidthStr;

use crate::station::{Station, StatusKind};

/// Which pane the arrow keys act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    People,
    Cameras,
}

impl Focus {
    pub fn toggle(self) -> Self {
        match self {
            Focus::People => Focus::Cameras,
            Focus::Cameras => Focus::People,
        }
    }
}

const HINTS: &str =
    "s: escanear  x: detener  f: alternar cámara  r: refrescar  c: borrar histórico  Tab: foco  ↑/↓: elegir  q: salir";

pub fn render(f: &mut Frame, station: &Station, focus: Focus, today: NaiveDate) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // header with role pill
            Constraint::Length(3), // status line
            Constraint::Min(6),    // people / cameras
            Constraint::Length(5), // summary table
            Constraint::Length(3), // key hints
        ])
        .split(f.area());

    render_header(f, station, chunks[0]);
    render_status(f, station, chunks[1]);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(chunks[2]);
    render_people(f, station, focus, body[0]);
    render_cameras(f, station, focus, body[1]);

    render_summary(f, station, today, chunks[3]);

    let hints = Paragraph::new(HINTS)
        .block(Block::default().borders(Borders::ALL))
        .style(Style::default().fg(Color::Gray).add_modifier(Modifier::ITALIC))
        .alignment(Alignment::Center);
    f.render_widget(hints, chunks[4]);
}

fn render_header(f: &mut Frame, station: &Station, area: Rect) {
    let scanning = if station.is_scanning() {
        Span::styled("● escaneando", Style::default().fg(Color::Green))
    } else {
        Span::styled("○ detenido", Style::default().fg(Color::DarkGray))
    };
    let line = Line::from(vec![
        Span::styled(
            "fichaje",
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ),
        Span::raw("  "),
        Span::styled(
            format!("[{}]", station.role()),
            Style::default().fg(Color::Magenta),
        ),
        Span::raw("  "),
        scanning,
    ]);
    let header = Paragraph::new(line)
        .block(Block::default().borders(Borders::ALL))
        .alignment(Alignment::Center);
    f.render_widget(header, area);
}

fn render_status(f: &mut Frame, station: &Station, area: Rect) {
    let status = station.status();
    let (color, prefix) = match status.kind {
        StatusKind::Info => (Color::Gray, ""),
        StatusKind::Ok => (Color::Green, "✔ "),
        StatusKind::Warn => (Color::Yellow, "⚠ "),
        StatusKind::Error => (Color::Red, "✖ "),
    };
    let text = fit_to_width(
        &format!("{prefix}{}", status.text),
        area.width.saturating_sub(2) as usize,
    );
    let widget = Paragraph::new(text)
        .block(Block::default().borders(Borders::ALL).title("Resultado"))
        .style(Style::default().fg(color))
        .wrap(Wrap { trim: true });
    f.render_widget(widget, area);
}

fn render_people(f: &mut Frame, station: &Station, focus: Focus, area: Rect) {
    let block = pane_block("Personas", focus == Focus::People);

    if station.free_mode() {
        let placeholder = Paragraph::new("Sin lista (edita hoja Miembros)")
            .block(block)
            .style(Style::default().fg(Color::DarkGray).add_modifier(Modifier::DIM));
        f.render_widget(placeholder, area);
        return;
    }

    let items: Vec<ListItem> = station
        .roster()
        .iter()
        .map(|name| ListItem::new(name.clone()))
        .collect();
    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(Color::DarkGray)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("» ");

    let mut state = ListState::default();
    state.select(station.selected_index());
    f.render_stateful_widget(list, area, &mut state);
}

fn render_cameras(f: &mut Frame, station: &Station, focus: Focus, area: Rect) {
    let block = pane_block("Cámaras", focus == Focus::Cameras);

    if station.cameras().is_empty() {
        let placeholder = Paragraph::new("(sin cámaras)")
            .block(block)
            .style(Style::default().fg(Color::DarkGray).add_modifier(Modifier::DIM));
        f.render_widget(placeholder, area);
        return;
    }

    let width = area.width.saturating_sub(4) as usize;
    let items: Vec<ListItem> = station
        .cameras()
        .iter()
        .map(|cam| ListItem::new(fit_to_width(&format!("{} ({})", cam.label, cam.id), width)))
        .collect();
    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(Color::DarkGray)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("» ");

    let mut state = ListState::default();
    state.select(station.camera_index());
    f.render_stateful_widget(list, area, &mut state);
}

fn render_summary(f: &mut Frame, station: &Station, today: NaiveDate, area: Rect) {
    let row = station.summary(today);

    let header = Row::new(vec![
        Cell::from("Fecha"),
        Cell::from("Nombre"),
        Cell::from("Ingreso"),
        Cell::from("Salida"),
    ])
    .style(
        Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD),
    );

    let rows = vec![Row::new(vec![
        Cell::from(row.date),
        Cell::from(row.name),
        Cell::from(row.ingreso),
        Cell::from(row.salida),
    ])];

    let table = Table::new(
        rows,
        &[
            Constraint::Length(12),
            Constraint::Min(16),
            Constraint::Length(9),
            Constraint::Length(9),
        ],
    )
    .header(header)
    .block(Block::default().borders(Borders::ALL).title("Hoy"));

    f.render_widget(table, area);
}

fn pane_block(title: &str, focused: bool) -> Block<'_> {
    let style = if focused {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default().fg(Color::Gray)
    };
    Block::default()
        .borders(Borders::ALL)
        .title(title)
        .border_style(style)
}

/// Truncates display text to `max` columns, unicode-aware.
fn fit_to_width(text: &str, max: usize) -> String {
    use unicode_width::UnicodeWidthChar;

    if text.width() <= max {
        return text.to_string();
    }
    let mut out = String::new();
    let mut used = 0;
    for c in text.chars() {
        let w = c.width().unwrap_or(0);
        if used + w + 1 > max {
            break;
        }
        used += w;
        out.push(c);
    }
    out.push('…');
    out
}
