use std::collections::HashSet;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Result};
use arboard::Clipboard;
use ratatui::{
    prelude::*,
    style::Style,
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
    Frame,
};
use zeroize::Zeroizing;

use crate::filter::Row;
use crate::models::{NodeId, Secret, Tree};

const CLIPBOARD_LIFETIME_SECS: u64 = 20;
const COLOR_SAND: Color = Color::Rgb(0xEB, 0xDB, 0xB2);
const COLOR_OLIVE: Color = Color::Rgb(0x98, 0x97, 0x1A);
const COLOR_MOSS: Color = Color::Rgb(0x67, 0x67, 0x1C);

const WELCOME: [&str; 9] = [
    "passview",
    "",
    "A terminal front-end for pass, the standard Unix password manager.",
    "",
    "  /      filter the tree (regular expressions, case-insensitive)",
    "  Enter  open an entry or fold a folder",
    "  e n r d  edit, new, rename, delete",
    "  c      copy the password    o  settings    F5  reload",
    "Please report any issues you might have with this software.",
];

#[derive(Clone, Copy)]
struct OverlayTheme {
    border: Color,
    title: Color,
    text: Color,
    bg: Color,
}

fn themed_overlay(title: &str) -> OverlayTheme {
    match title {
        "Edit password" | "New password" => OverlayTheme {
            border: COLOR_OLIVE,
            title: COLOR_SAND,
            text: COLOR_SAND,
            bg: Color::Rgb(0x1D, 0x21, 0x10),
        },
        "Configuration" => OverlayTheme {
            border: COLOR_MOSS,
            title: Color::Rgb(0xD8, 0xCB, 0xA6),
            text: COLOR_SAND,
            bg: Color::Rgb(0x16, 0x19, 0x0D),
        },
        "Rename" | "New entry" => OverlayTheme {
            border: Color::Rgb(0x86, 0x86, 0x35),
            title: COLOR_SAND,
            text: Color::Rgb(0xE3, 0xD5, 0xAE),
            bg: Color::Rgb(0x1A, 0x1D, 0x12),
        },
        "Confirm delete" => OverlayTheme {
            border: Color::Rgb(0xB3, 0x88, 0x45),
            title: Color::Rgb(0xF0, 0xD8, 0xA8),
            text: COLOR_SAND,
            bg: Color::Rgb(0x2A, 0x1C, 0x11),
        },
        "Confirm quit" => OverlayTheme {
            border: Color::Rgb(0xA7, 0xA2, 0x36),
            title: Color::Rgb(0xE6, 0xD8, 0xB2),
            text: COLOR_SAND,
            bg: Color::Rgb(0x25, 0x24, 0x13),
        },
        _ => OverlayTheme {
            border: COLOR_MOSS,
            title: COLOR_SAND,
            text: COLOR_SAND,
            bg: Color::Rgb(0x1E, 0x20, 0x12),
        },
    }
}

fn centered_overlay_area(frame_size: Rect, lines: &[String]) -> Rect {
    let maxw = lines.iter().map(|s| s.chars().count()).max().unwrap_or(0) as u16 + 4;
    let maxh = lines.len() as u16 + 2;
    Rect::new(
        (frame_size.width.saturating_sub(maxw)) / 2,
        (frame_size.height.saturating_sub(maxh)) / 2,
        maxw.min(frame_size.width),
        maxh.min(frame_size.height),
    )
}

fn render_overlay(f: &mut Frame<'_>, lines: &[String], title: &str) {
    let area = centered_overlay_area(f.size(), lines);
    let theme = themed_overlay(title);
    let paragraph = Paragraph::new(
        lines
            .iter()
            .map(|l| Line::from(l.as_str()))
            .collect::<Vec<Line>>(),
    )
    .style(Style::default().fg(theme.text).bg(theme.bg))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title(Span::styled(
                title,
                Style::default()
                    .fg(theme.title)
                    .add_modifier(Modifier::BOLD),
            ))
            .border_style(
                Style::default()
                    .fg(theme.border)
                    .add_modifier(Modifier::BOLD),
            )
            .style(Style::default().bg(theme.bg)),
    );
    f.render_widget(Clear, area);
    f.render_widget(paragraph, area);
}

/// What the right-hand pane shows.
#[derive(Debug, Default)]
pub enum ContentPane {
    #[default]
    Welcome,
    Entry { path: String, secret: Secret },
}

impl ContentPane {
    pub fn path(&self) -> Option<&str> {
        match self {
            ContentPane::Welcome => None,
            ContentPane::Entry { path, .. } => Some(path),
        }
    }
}

pub struct ViewState<'a> {
    pub tree: &'a Tree,
    pub rows: &'a [Row],
    pub selected: usize,
    pub expanded: &'a HashSet<NodeId>,
    pub filter: &'a str,
    pub filter_focused: bool,
    pub match_count: usize,
    pub content: &'a ContentPane,
    pub reveal: bool,
    pub splitter: (u32, u32),
    pub overlay: Option<Vec<String>>,
    pub overlay_title: Option<String>,
    pub delete_overlay: Option<String>,
    pub quit_overlay: bool,
    pub status: String,
    pub status_strength: Option<StatusStrength>,
}

#[derive(Clone)]
pub struct StatusStrength {
    pub label: String,
    pub level: u8,
}

pub fn classify_password_strength(password: &str) -> StatusStrength {
    let len = password.chars().count();
    if len < 8 {
        return StatusStrength {
            label: "Weak".to_string(),
            level: 1,
        };
    }

    let has_lower = password.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = password.chars().any(|c| c.is_ascii_uppercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_special = password
        .chars()
        .any(|c| !c.is_ascii_alphanumeric() && !c.is_whitespace());

    let score = [has_lower, has_upper, has_digit, has_special]
        .iter()
        .filter(|b| **b)
        .count() as u8
        + [8, 12, 16, 20].iter().filter(|min| len >= **min).count() as u8;

    let (label, level) = match score {
        0..=3 => ("Weak", 1),
        4..=5 => ("Average", 2),
        6..=7 => ("Strong", 3),
        _ => ("Excellent", 4),
    };

    StatusStrength {
        label: label.to_string(),
        level,
    }
}

fn strength_color(level: u8) -> Color {
    match level.clamp(1, 4) {
        1 => Color::Red,
        2 => Color::Yellow,
        3 => Color::Green,
        _ => Color::Cyan,
    }
}

fn tree_items(state: &ViewState) -> Vec<ListItem<'static>> {
    if state.rows.is_empty() {
        let empty = if state.filter.is_empty() {
            "Password store is empty"
        } else {
            "No matches"
        };
        return vec![ListItem::new(empty)];
    }
    state
        .rows
        .iter()
        .map(|row| {
            let node = state.tree.node(row.id);
            let indent = "  ".repeat(row.depth);
            if node.is_dir() {
                let open = state.expanded.contains(&row.id) || !state.filter.is_empty();
                let marker = if open { "▾ " } else { "▸ " };
                ListItem::new(Line::from(vec![
                    Span::raw(format!("{indent}{marker}")),
                    Span::styled(
                        format!("{}/", node.name),
                        Style::default().fg(COLOR_OLIVE).add_modifier(Modifier::BOLD),
                    ),
                ]))
            } else {
                ListItem::new(format!("{indent}  {}", node.name))
            }
        })
        .collect()
}

fn content_lines(state: &ViewState) -> (String, Vec<Line<'static>>) {
    match state.content {
        ContentPane::Welcome => (
            "Welcome".to_string(),
            WELCOME
                .iter()
                .enumerate()
                .map(|(idx, l)| {
                    if idx == 0 {
                        Line::from(Span::styled(
                            l.to_string(),
                            Style::default().fg(COLOR_SAND).add_modifier(Modifier::BOLD),
                        ))
                    } else {
                        Line::from(l.to_string())
                    }
                })
                .collect(),
        ),
        ContentPane::Entry { path, secret } => {
            let strength = classify_password_strength(&secret.password);
            let shown = if state.reveal {
                secret.password.clone()
            } else {
                "•".repeat(secret.password.chars().count().min(24))
            };
            let mut lines = vec![
                Line::from(vec![
                    Span::raw("Password: "),
                    Span::styled(shown, Style::default().add_modifier(Modifier::BOLD)),
                ]),
                Line::from(vec![
                    Span::raw("Strength: "),
                    Span::styled(
                        strength.label,
                        Style::default()
                            .fg(strength_color(strength.level))
                            .add_modifier(Modifier::BOLD),
                    ),
                ]),
                Line::from(""),
            ];
            lines.extend(secret.info.lines().map(|l| Line::from(l.to_string())));
            (path.clone(), lines)
        }
    }
}

pub fn draw(f: &mut Frame<'_>, state: &ViewState) {
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(1), Constraint::Length(3)])
        .split(f.size());

    let (left, total) = state.splitter;
    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Ratio(left, total),
            Constraint::Ratio(total.saturating_sub(left), total),
        ])
        .split(layout[0]);

    let tree_pane = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(1)])
        .split(body[0]);

    let filter_title = if state.filter.is_empty() {
        "Filter".to_string()
    } else {
        format!("Filter ({} shown)", state.match_count)
    };
    let filter_text = if state.filter.is_empty() && !state.filter_focused {
        Span::styled(
            "Type / to filter passwords...",
            Style::default().fg(Color::DarkGray),
        )
    } else {
        Span::raw(format!("/{}", state.filter))
    };
    let filter_block = Block::default()
        .title(filter_title)
        .borders(Borders::ALL)
        .border_style(if state.filter_focused {
            Style::default().fg(Color::Cyan)
        } else {
            Style::default()
        });
    f.render_widget(Paragraph::new(filter_text).block(filter_block), tree_pane[0]);

    let mut list_state = ListState::default();
    if !state.rows.is_empty() {
        list_state.select(Some(state.selected.min(state.rows.len() - 1)));
    }
    let list = List::new(tree_items(state))
        .block(Block::default().title("Passwords").borders(Borders::ALL))
        .highlight_symbol("▶ ")
        .highlight_style(
            Style::default()
                .fg(Color::Cyan)
                .bg(Color::Rgb(40, 40, 40))
                .add_modifier(Modifier::BOLD),
        );
    f.render_stateful_widget(list, tree_pane[1], &mut list_state);

    let (content_title, lines) = content_lines(state);
    let detail = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(Block::default().title(content_title).borders(Borders::ALL));
    f.render_widget(detail, body[1]);

    let footer_line = if let Some(strength) = &state.status_strength {
        let level = strength.level.clamp(1, 4);
        let color = strength_color(level);
        let total = 12usize;
        let filled = ((level as usize) * 3).min(total);
        let empty = total.saturating_sub(filled);
        Line::from(vec![
            Span::raw("Strength: "),
            Span::styled(
                strength.label.clone(),
                Style::default().fg(color).add_modifier(Modifier::BOLD),
            ),
            Span::raw(" ["),
            Span::styled("=".repeat(filled), Style::default().fg(color)),
            Span::styled("-".repeat(empty), Style::default().fg(Color::DarkGray)),
            Span::raw("]"),
        ])
    } else {
        Line::from(state.status.clone())
    };
    let footer = Paragraph::new(footer_line).block(Block::default().borders(Borders::ALL));
    f.render_widget(footer, layout[1]);

    if let Some(lines) = &state.overlay {
        let title = state.overlay_title.as_deref().unwrap_or("Overlay");
        render_overlay(f, lines, title);
    }

    if let Some(msg) = &state.delete_overlay {
        let text = vec![msg.clone(), "".to_string(), "[y] Yes   [n] No".to_string()];
        render_overlay(f, &text, "Confirm delete");
    }

    if state.quit_overlay {
        let text = vec![
            "Quit?".to_string(),
            "".to_string(),
            "[y] Yes   [n] No".to_string(),
        ];
        render_overlay(f, &text, "Confirm quit");
    }
}

/// Blank screen shown while the window is "hidden".
pub fn draw_hidden(f: &mut Frame<'_>) {
    let area = f.size();
    let lines = vec![
        Line::from(Span::styled(
            "passview is hidden",
            Style::default().fg(COLOR_SAND).add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from("Press any key to restore, Ctrl+q to quit"),
    ];
    let y = area.y + area.height.saturating_sub(lines.len() as u16) / 2;
    let centered = Rect::new(area.x, y, area.width, (lines.len() as u16).min(area.height));
    f.render_widget(Clear, area);
    f.render_widget(Paragraph::new(lines).alignment(Alignment::Center), centered);
}

pub fn copy_to_clipboard(text: &str) -> Result<()> {
    let mut clipboard = Clipboard::new().map_err(|e| anyhow!("Clipboard unavailable: {e}"))?;
    clipboard
        .set_text(text.to_string())
        .map_err(|e| anyhow!("Failed to set clipboard: {e}"))?;
    let copied = Zeroizing::new(text.to_string());
    let mut clip = clipboard;
    thread::spawn(move || {
        thread::sleep(Duration::from_secs(CLIPBOARD_LIFETIME_SECS));
        let current = Zeroizing::new(clip.get_text().ok());
        if should_clear(current.as_deref(), &copied) {
            let _ = clip.set_text(String::new());
        }
    });
    Ok(())
}

/// Only wipe the clipboard if it still holds what we put there.
fn should_clear(current: Option<&str>, copied: &str) -> bool {
    current == Some(copied)
}

pub fn clipboard_lifetime_secs() -> u64 {
    CLIPBOARD_LIFETIME_SECS
}

#[cfg(test)]
mod tests {
    use ratatui::backend::TestBackend;

    use super::*;
    use crate::filter::{apply_filter, visible_rows, Filter};
    use crate::models::{build_tree, Secret};
    use crate::store::testing::temp_store;

    #[test]
    fn clipboard_is_cleared_only_if_unchanged() {
        assert!(should_clear(Some("hunter2"), "hunter2"));
        assert!(!should_clear(Some("something the user copied later"), "hunter2"));
        assert!(!should_clear(Some(""), "hunter2"));
        assert!(!should_clear(None, "hunter2"));
    }

    #[test]
    fn strength_levels() {
        assert_eq!(classify_password_strength("abc").level, 1);
        assert_eq!(classify_password_strength("abcdefgh1").level, 2);
        assert_eq!(classify_password_strength("Abcdefgh1234!").level, 3);
        assert_eq!(classify_password_strength("Abcdefgh1234!xyzUVW99").level, 4);
    }

    fn render(state: &ViewState) -> String {
        let backend = TestBackend::new(100, 24);
        let mut terminal = Terminal::new(backend).unwrap();
        terminal.draw(|f| draw(f, state)).unwrap();
        let buffer = terminal.backend().buffer().clone();
        buffer
            .content
            .iter()
            .map(|cell| cell.symbol())
            .collect::<String>()
    }

    #[test]
    fn draws_tree_and_masked_secret() {
        let (_dir, store) = temp_store(&[("Email/gmail", "hunter2\nuser: me"), ("bank", "x")]);
        let tree = build_tree(&store);
        let expanded: HashSet<NodeId> = [tree.find("Email").unwrap()].into_iter().collect();
        let visibility = apply_filter(&tree, &Filter::default());
        let rows = visible_rows(&tree, &visibility, &expanded, false);
        let content = ContentPane::Entry {
            path: "Email/gmail".into(),
            secret: Secret::parse("hunter2\nuser: me"),
        };
        let state = ViewState {
            tree: &tree,
            rows: &rows,
            selected: 1,
            expanded: &expanded,
            filter: "",
            filter_focused: false,
            match_count: visibility.count(),
            content: &content,
            reveal: false,
            splitter: (200, 600),
            overlay: None,
            overlay_title: None,
            delete_overlay: None,
            quit_overlay: false,
            status: "ready".into(),
            status_strength: None,
        };
        let screen = render(&state);
        assert!(screen.contains("Email/"));
        assert!(screen.contains("gmail"));
        assert!(screen.contains("user: me"));
        assert!(!screen.contains("hunter2"));

        let revealed = ViewState {
            reveal: true,
            ..state
        };
        assert!(render(&revealed).contains("hunter2"));
    }
}
