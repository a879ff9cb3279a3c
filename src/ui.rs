use keydrill::game::Phase;
use keydrill::srs::{level_name, mastery_percent};
use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Gauge, Paragraph, Row, Table, Widget, Wrap},
};
use unicode_width::UnicodeWidthStr;

use crate::{App, AppState};

const HORIZONTAL_MARGIN: u16 = 5;
const VERTICAL_MARGIN: u16 = 2;

fn tag_color(tag: &str) -> Color {
    match tag {
        "red" => Color::Red,
        "green" => Color::Green,
        "blue" => Color::Blue,
        "yellow" => Color::Yellow,
        "magenta" => Color::Magenta,
        "cyan" => Color::Cyan,
        _ => Color::White,
    }
}

impl Widget for &App {
    fn render(self, area: Rect, buf: &mut Buffer) {
        match self.state {
            AppState::Training => render_training(self, area, buf),
            AppState::Summary => render_summary(self, area, buf),
        }
    }
}

fn render_training(app: &App, area: Rect, buf: &mut Buffer) {
    let game = &app.game;
    let bold_style = Style::default().add_modifier(Modifier::BOLD);
    let dim_style = Style::default().add_modifier(Modifier::DIM);
    let italic_style = Style::default().add_modifier(Modifier::ITALIC);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .horizontal_margin(HORIZONTAL_MARGIN)
        .vertical_margin(VERTICAL_MARGIN)
        .constraints([
            Constraint::Length(1), // header
            Constraint::Min(1),    // padding
            Constraint::Length(3), // concept
            Constraint::Length(3), // typed keys
            Constraint::Length(1), // timer gauge
            Constraint::Min(1),    // padding
            Constraint::Length(1), // feedback
            Constraint::Length(1), // legend
        ])
        .split(area);

    let stats = game.stats();
    let header = Paragraph::new(Line::from(vec![
        Span::styled(app.pack.name.clone(), bold_style),
        Span::raw(format!(
            "   {}/{}   score {}   combo {}   due {}",
            game.answered(),
            game.commands_per_session(),
            stats.total_score,
            stats.current_combo,
            game.deck().due_count(game.now()),
        )),
    ]))
    .alignment(Alignment::Center);
    header.render(chunks[0], buf);

    match game.phase() {
        Phase::NothingDue => {
            Paragraph::new(Span::styled(
                "Nothing due right now - waiting for the next review",
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD | Modifier::ITALIC),
            ))
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true })
            .render(chunks[2], buf);
        }
        _ => {
            if let Some(cmd) = game.current_command() {
                let color = tag_color(&cmd.def.color);
                let concept = Paragraph::new(vec![
                    Line::from(Span::styled(
                        cmd.def.concept.clone(),
                        Style::default().patch(bold_style).fg(color),
                    )),
                    Line::from(Span::styled(
                        format!(
                            "{} · {} · mastery {}%",
                            cmd.group,
                            level_name(cmd.state.level.into()),
                            mastery_percent(&cmd.state)
                        ),
                        dim_style,
                    )),
                ])
                .alignment(Alignment::Center);
                concept.render(chunks[2], buf);

                let typed = game.typed().join(" ");
                let width = (typed.width() as u16 + 4).clamp(12, chunks[3].width);
                let x = chunks[3].x + (chunks[3].width.saturating_sub(width)) / 2;
                let keys_area = Rect::new(x, chunks[3].y, width, chunks[3].height);
                Paragraph::new(Span::styled(typed, bold_style))
                    .alignment(Alignment::Center)
                    .block(Block::default().borders(Borders::ALL))
                    .render(keys_area, buf);
            }

            let fraction = game.time_fraction();
            let gauge_color = if fraction > 0.5 {
                Color::Green
            } else if fraction > 0.2 {
                Color::Yellow
            } else {
                Color::Red
            };
            let label = if game.is_paused() {
                "PAUSED".to_string()
            } else {
                format!("{:.1}s", game.remaining())
            };
            Gauge::default()
                .gauge_style(Style::default().fg(gauge_color))
                .ratio(fraction)
                .label(label)
                .render(chunks[4], buf);
        }
    }

    if let Some(fb) = game.last_feedback() {
        let (text, color) = if fb.correct {
            (
                format!("✓ {} ({})  +{}  x{}", fb.keys, fb.concept, fb.score, fb.combo),
                Color::Green,
            )
        } else if fb.timed_out {
            (format!("⏱ {} ({})  too slow", fb.keys, fb.concept), Color::Red)
        } else {
            (format!("✗ {} ({})", fb.keys, fb.concept), Color::Red)
        };
        Paragraph::new(Span::styled(text, Style::default().fg(color)))
            .alignment(Alignment::Center)
            .render(chunks[6], buf);
    }

    Paragraph::new(Span::styled("(ctrl+p) pause / (ctrl+c) finish", italic_style))
        .render(chunks[7], buf);
}

fn render_summary(app: &App, area: Rect, buf: &mut Buffer) {
    let game = &app.game;
    let bold_style = Style::default().add_modifier(Modifier::BOLD);
    let italic_style = Style::default().add_modifier(Modifier::ITALIC);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .horizontal_margin(HORIZONTAL_MARGIN)
        .vertical_margin(VERTICAL_MARGIN)
        .constraints([
            Constraint::Length(3), // session stats
            Constraint::Length(2), // lifetime
            Constraint::Min(4),    // levels table
            Constraint::Length(1), // legend
        ])
        .split(area);

    let stats = game.stats();
    Paragraph::new(vec![
        Line::from(Span::styled(
            format!("{} points", stats.total_score),
            Style::default().patch(bold_style).fg(Color::Magenta),
        )),
        Line::from(Span::styled(
            format!(
                "{}% acc   {} correct   {} missed   best combo {}",
                stats.accuracy, stats.correct_count, stats.incorrect_count, stats.best_combo
            ),
            bold_style,
        )),
    ])
    .alignment(Alignment::Center)
    .render(chunks[0], buf);

    let lifetime = game.lifetime();
    Paragraph::new(Span::styled(
        format!(
            "lifetime: {} sessions   {}% acc   best score {}   best combo {}",
            lifetime.sessions_played,
            lifetime.lifetime_accuracy(),
            lifetime.best_score,
            lifetime.best_combo
        ),
        Style::default().fg(Color::Cyan).add_modifier(Modifier::ITALIC),
    ))
    .alignment(Alignment::Center)
    .render(chunks[1], buf);

    let summary = game.deck().level_summary();
    let rows = summary.iter().enumerate().map(|(level, count)| {
        Row::new(vec![
            Cell::from(level_name(level as i64)),
            Cell::from(count.to_string()),
        ])
    });
    Table::new(rows, [Constraint::Length(12), Constraint::Length(8)])
        .header(Row::new(vec!["Level", "Commands"]).style(bold_style))
        .block(Block::default().borders(Borders::ALL).title("Progress"))
        .render(chunks[2], buf);

    Paragraph::new(Span::styled("(n)ew session / (esc)ape", italic_style)).render(chunks[3], buf);
}
