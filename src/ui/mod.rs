mod halfblock;

use std::sync::OnceLock;
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Row, Table, Wrap},
    Frame,
};

use crate::api::Registry;
use crate::app::{App, Popup, Section};
use crate::camera::CameraBackend;
use crate::capture::PHOTO_COUNT;
use crate::controller::{AlertKind, Controls};
use crate::theme::Theme;

use self::halfblock::{placeholder, HalfBlockImage};

static THEME: OnceLock<Theme> = OnceLock::new();

/// Install the theme before the first draw; later calls are ignored
pub fn init_theme(theme: Theme) {
    let _ = THEME.set(theme);
}

fn theme() -> &'static Theme {
    THEME.get_or_init(Theme::default)
}

// Helper functions to get theme colors
fn accent() -> Color { theme().accent }
fn inactive() -> Color { theme().inactive }
fn success() -> Color { theme().success }
fn warning() -> Color { theme().warning }
fn danger() -> Color { theme().danger }
fn text() -> Color { theme().text }
fn text_dim() -> Color { theme().text_dim }
fn bg_selected() -> Color { theme().bg_selected }
fn header() -> Color { theme().header }

pub fn draw<R: Registry, B: CameraBackend>(f: &mut Frame, app: &App<R, B>) {
    let area = f.area();

    let users_height = if area.height < 30 {
        Constraint::Length(6)
    } else {
        Constraint::Percentage(30)
    };

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // Info line
            Constraint::Min(10),   // Camera + form
            users_height,          // Users table
            Constraint::Length(1), // Footer
        ])
        .split(area);

    let middle = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(chunks[1]);

    let form = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Username
            Constraint::Min(6),    // Photos
        ])
        .split(middle[1]);

    draw_info_line(f, app, chunks[0]);
    draw_camera_box(f, app, middle[0]);
    draw_username_box(f, app, form[0]);
    draw_photos_box(f, app, form[1]);
    draw_users_box(f, app, chunks[2]);
    draw_footer(f, app, chunks[3]);

    match app.popup {
        Popup::None => {}
        Popup::Help => draw_help_popup(f),
        Popup::Alert => draw_alert_popup(f, app),
    }
}

fn section_block(title: String, active: bool) -> Block<'static> {
    let border_color = if active { accent() } else { inactive() };
    let title_style = if active {
        Style::default().fg(accent()).add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(inactive())
    };
    Block::default()
        .title(Span::styled(title, title_style))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
}

fn draw_info_line<R: Registry, B: CameraBackend>(f: &mut Frame, app: &App<R, B>, area: Rect) {
    // Priority: in-flight registration > status message > ready
    let line = if app.controller.is_submitting() {
        Line::from(vec![
            Span::styled("󰔟 ", Style::default().fg(accent())),
            Span::styled("Registering...", Style::default().fg(text())),
        ])
    } else if let Some(ref status) = app.status_message {
        Line::from(Span::styled(status.as_str(), Style::default().fg(warning())))
    } else {
        let count = app.controller.image_count();
        Line::from(vec![
            Span::styled(format!("{}/{} photos", count, PHOTO_COUNT), Style::default().fg(text_dim())),
            Span::styled(" │ ", Style::default().fg(inactive())),
            Span::styled(
                if app.controller.camera_live() { "camera on" } else { "camera off" },
                Style::default().fg(text_dim()),
            ),
        ])
    };

    f.render_widget(Paragraph::new(line).alignment(Alignment::Center), area);
}

fn draw_camera_box<R: Registry, B: CameraBackend>(f: &mut Frame, app: &App<R, B>, area: Rect) {
    let title = match app.controller.camera_label() {
        Some(label) => format!(" Camera: {} ", label),
        None => " Camera ".to_string(),
    };
    let block = section_block(title, app.section == Section::Photos);
    let inner = block.inner(area);
    f.render_widget(block, area);

    let dim = Style::default().fg(text_dim());
    match app.controller.live_frame() {
        Some(frame) => f.render_widget(HalfBlockImage::new(&frame.image), inner),
        None if app.controller.camera_live() => {
            placeholder("Waiting for camera...", dim, inner, f.buffer_mut())
        }
        None => placeholder("Camera off, press o to open", dim, inner, f.buffer_mut()),
    }
}

fn draw_username_box<R: Registry, B: CameraBackend>(f: &mut Frame, app: &App<R, B>, area: Rect) {
    let active = app.section == Section::Form;
    let block = section_block(" Username ".to_string(), active);

    let username = app.controller.username();
    let mut spans = vec![Span::styled(username.to_string(), Style::default().fg(text()))];
    if active {
        spans.push(Span::styled("█", Style::default().fg(accent())));
    } else if username.is_empty() {
        spans.push(Span::styled("press u to type a username", Style::default().fg(text_dim())));
    }

    f.render_widget(Paragraph::new(Line::from(spans)).block(block), area);
}

fn draw_photos_box<R: Registry, B: CameraBackend>(f: &mut Frame, app: &App<R, B>, area: Rect) {
    let count = app.controller.image_count();
    let count_color = if count == PHOTO_COUNT { success() } else { text_dim() };
    let block = section_block(format!(" Photos {}/{} ", count, PHOTO_COUNT), app.section == Section::Photos)
        .title_bottom(Line::from(Span::styled(
            if count == PHOTO_COUNT { " ready to register " } else { " c capture · d remove " },
            Style::default().fg(count_color),
        )));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let slots = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Ratio(1, PHOTO_COUNT as u32); PHOTO_COUNT])
        .split(inner);

    let tiles = app.controller.render_previews();
    for (slot, slot_area) in slots.iter().enumerate() {
        let selected = app.section == Section::Photos && slot == app.selected_photo && slot < tiles.len();
        let border = if selected { accent() } else { inactive() };

        let Some(tile) = tiles.get(slot) else {
            let block = Block::default()
                .title(Span::styled(format!(" {} ", slot + 1), Style::default().fg(inactive())))
                .borders(Borders::ALL)
                .border_style(Style::default().fg(inactive()));
            let inner = block.inner(*slot_area);
            f.render_widget(block, *slot_area);
            placeholder("empty", Style::default().fg(text_dim()), inner, f.buffer_mut());
            continue;
        };

        let remove_hint = if selected {
            Span::styled(" ✕ d ", Style::default().fg(danger()).add_modifier(Modifier::BOLD))
        } else {
            Span::raw("")
        };
        let block = Block::default()
            .title(Span::styled(format!(" {} ", tile.index + 1), Style::default().fg(border)))
            .title_bottom(Line::from(vec![
                Span::styled(
                    format!(" {}x{} {}K ", tile.width, tile.height, tile.size_bytes.div_ceil(1024)),
                    Style::default().fg(text_dim()),
                ),
                remove_hint,
            ]))
            .borders(Borders::ALL)
            .border_style(Style::default().fg(border));
        let inner = block.inner(*slot_area);
        f.render_widget(block, *slot_area);
        f.render_widget(HalfBlockImage::new(tile.thumbnail), inner);
    }
}

fn draw_users_box<R: Registry, B: CameraBackend>(f: &mut Frame, app: &App<R, B>, area: Rect) {
    let is_active = app.section == Section::Users;
    let title = if app.users_loading {
        " Registered users (loading) ".to_string()
    } else {
        format!(" Registered users ({}) ", app.controller.users().len())
    };
    let block = section_block(title, is_active);

    let rows_data = app.controller.user_rows();
    if rows_data.is_empty() {
        let inner = block.inner(area);
        f.render_widget(block, area);
        placeholder("No users yet", Style::default().fg(text_dim()), inner, f.buffer_mut());
        return;
    }

    let header_row = Row::new(vec![
        Span::styled("Username", Style::default().fg(header())),
        Span::styled("Images", Style::default().fg(header())),
    ]);

    let rows: Vec<Row> = rows_data
        .iter()
        .enumerate()
        .skip(app.user_scroll)
        .map(|(i, row)| {
            let style = if is_active && i == app.user_scroll {
                Style::default().fg(text()).bg(bg_selected())
            } else {
                Style::default().fg(text())
            };
            let images = if row.images.is_empty() {
                "-".to_string()
            } else {
                row.images.iter().map(|img| format!("▣ {}", img)).collect::<Vec<_>>().join("  ")
            };
            Row::new(vec![
                Span::raw(row.username.clone()),
                Span::styled(images, Style::default().fg(text_dim())),
            ])
            .style(style)
        })
        .collect();

    let table = Table::new(rows, [Constraint::Length(20), Constraint::Min(10)])
        .header(header_row)
        .block(block);

    f.render_widget(table, area);
}

fn draw_footer<R: Registry, B: CameraBackend>(f: &mut Frame, app: &App<R, B>, area: Rect) {
    let Controls {
        open_camera,
        capture,
        submit,
    } = app.controller.controls();

    // (key, action, enabled)
    let hints: Vec<(&str, &str, bool)> = match app.section {
        Section::Form => vec![
            ("Enter", "Register", submit),
            ("Esc", "Done", true),
            ("Tab", "Next", true),
        ],
        Section::Photos => vec![
            ("o", "Open camera", open_camera),
            ("c", "Capture", capture),
            ("←→", "Select", true),
            ("d", "Remove", app.controller.image_count() > 0),
            ("s", "Register", submit),
            ("?", "Help", true),
        ],
        Section::Users => vec![
            ("↑↓", "Scroll", true),
            ("r", "Refresh", !app.users_loading),
            ("Tab", "Next", true),
            ("?", "Help", true),
        ],
    };

    // Responsive: show fewer hints on narrow terminals
    let max_hints = if area.width < 60 { 3 } else if area.width < 80 { 4 } else { hints.len() };

    let hint_spans: Vec<Span> = hints
        .iter()
        .take(max_hints)
        .flat_map(|(key, action, enabled)| {
            let key_color = if *enabled { accent() } else { inactive() };
            let action_color = if *enabled { text_dim() } else { inactive() };
            vec![
                Span::styled(*key, Style::default().fg(key_color)),
                Span::styled(format!(" {} │ ", action), Style::default().fg(action_color)),
            ]
        })
        .collect();

    f.render_widget(Paragraph::new(Line::from(hint_spans)).alignment(Alignment::Center), area);
}

fn draw_alert_popup<R: Registry, B: CameraBackend>(f: &mut Frame, app: &App<R, B>) {
    let Some(alert) = app.controller.alert() else {
        return;
    };
    let popup_area = centered_rect(50, 25, f.area());
    f.render_widget(Clear, popup_area);

    let (title, color) = match alert.kind {
        AlertKind::Success => (" Done ", success()),
        AlertKind::Error => (" Error ", danger()),
    };

    let body = Paragraph::new(vec![
        Line::from(""),
        Line::from(Span::styled(alert.message.as_str(), Style::default().fg(text()))),
        Line::from(""),
        Line::from(vec![
            Span::styled("Enter", Style::default().fg(accent())),
            Span::styled(" to close", Style::default().fg(text_dim())),
        ]),
    ])
    .block(
        Block::default()
            .title(Span::styled(title, Style::default().fg(color).add_modifier(Modifier::BOLD)))
            .borders(Borders::ALL)
            .border_style(Style::default().fg(color)),
    )
    .alignment(Alignment::Center)
    .wrap(Wrap { trim: true });

    f.render_widget(body, popup_area);
}

fn draw_help_popup(f: &mut Frame) {
    let area = f.area();
    let popup_area = centered_rect(
        if area.width < 80 { 95 } else { 60 },
        if area.height < 30 { 95 } else { 70 },
        area,
    );

    f.render_widget(Clear, popup_area);

    let heading = |s: &'static str| {
        Line::from(Span::styled(s, Style::default().fg(header()).add_modifier(Modifier::BOLD)))
    };
    let key = |k: &'static str, desc: &'static str| {
        Line::from(vec![
            Span::styled(format!("  {:<10}", k), Style::default().fg(accent())),
            Span::raw(desc),
        ])
    };

    let help_text = vec![
        heading("═══ Navigation ═══"),
        key("Tab", "Switch sections (Username → Photos → Users)"),
        key("u / i", "Edit the username"),
        key("Esc", "Leave the username field"),
        Line::from(""),
        heading("═══ Camera ═══"),
        key("o", "Open the camera"),
        key("c / Space", "Capture a photo (camera turns off after 4)"),
        key("x", "Turn the camera off"),
        Line::from(""),
        heading("═══ Photos ═══"),
        key("←/→ 1-4", "Select a photo"),
        key("d / Del", "Remove the selected photo"),
        key("s / Enter", "Register the user with all 4 photos"),
        Line::from(""),
        heading("═══ Users ═══"),
        key("↑/↓ j/k", "Scroll the table"),
        key("r", "Reload registered users"),
        Line::from(""),
        key("q", "Quit (outside the username field)"),
        Line::from(""),
        Line::from(vec![
            Span::styled("  Press ", Style::default().fg(text_dim())),
            Span::styled("?", Style::default().fg(accent())),
            Span::styled("/", Style::default().fg(text_dim())),
            Span::styled("Esc", Style::default().fg(accent())),
            Span::styled(" to close", Style::default().fg(text_dim())),
        ]),
    ];

    let help = Paragraph::new(help_text)
        .block(
            Block::default()
                .title(Span::styled(" facecap Help ", Style::default().fg(accent())))
                .borders(Borders::ALL)
                .border_style(Style::default().fg(accent())),
        )
        .wrap(Wrap { trim: false });

    f.render_widget(help, popup_area);
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
