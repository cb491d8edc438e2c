use esg_shared::Role;
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Paragraph, Wrap},
};

use crate::markdown;
use crate::render::{CardView, MessageView, Section, Summary};
use crate::session::ChatSession;

pub struct App {
    pub session: ChatSession,
    pub input: String,
    /// Rows scrolled up from the bottom of the transcript.
    pub scroll_back: u16,
}

pub fn draw(f: &mut Frame, app: &App) {
    let examples = if app.input.is_empty() && !app.session.is_loading() {
        app.session.remaining_examples()
    } else {
        Vec::new()
    };

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(1),
            Constraint::Length(examples.len().min(5) as u16 + 2),
            Constraint::Length(3),
        ])
        .split(f.area());

    let title = match app.session.model() {
        Some(model) => format!("ESG Assistant ({}) - {}", app.session.page().label(), model),
        None => format!("ESG Assistant ({})", app.session.page().label()),
    };

    let messages_widget = Paragraph::new(transcript(&app.session)).wrap(Wrap { trim: false });
    let rows = messages_widget.line_count(chunks[0].width.saturating_sub(2));
    let bottom = u16::try_from(rows)
        .unwrap_or(u16::MAX)
        .saturating_sub(chunks[0].height.saturating_sub(2));
    let messages_widget = messages_widget
        .block(Block::default().borders(Borders::ALL).title(title))
        .scroll((bottom.saturating_sub(app.scroll_back), 0));
    f.render_widget(messages_widget, chunks[0]);

    let example_lines: Vec<Line> = examples
        .iter()
        .take(5)
        .enumerate()
        .map(|(i, q)| Line::from(format!("F{} {}", i + 1, q)).dark_gray())
        .collect();
    let examples_widget = Paragraph::new(example_lines)
        .block(Block::default().borders(Borders::ALL).title("Try asking"));
    f.render_widget(examples_widget, chunks[1]);

    let input_title = if app.session.is_loading() {
        "Input (waiting for answer...)"
    } else {
        "Input"
    };
    let input = Paragraph::new(app.input.as_str())
        .block(Block::default().borders(Borders::ALL).title(input_title))
        .wrap(Wrap { trim: true });
    f.render_widget(input, chunks[2]);
}

fn transcript(session: &ChatSession) -> Vec<Line<'static>> {
    let streaming = session.streaming_index();
    let mut lines = Vec::new();

    for (index, message) in session.messages().iter().enumerate() {
        let stamp = message
            .timestamp
            .with_timezone(&chrono::Local)
            .format("%H:%M")
            .to_string();
        match message.role {
            Role::User => {
                lines.push(Line::from(format!("You  {}", stamp)).green().bold());
                lines.extend(message.content.lines().map(|l| Line::from(l.to_string())));
            }
            Role::Assistant | Role::System => {
                lines.push(Line::from(format!("AI   {}", stamp)).cyan().bold());
                let is_streaming = streaming == Some(index);
                match MessageView::for_content(&message.content, is_streaming) {
                    MessageView::Prose(text) if is_streaming => {
                        lines.extend(text.lines().map(|l| Line::from(l.to_string())));
                    }
                    MessageView::Prose(text) => lines.extend(markdown::to_lines(&text)),
                    MessageView::Analysis(card) => card_lines(&card, &mut lines),
                }
            }
        }
        lines.push(Line::default());
    }
    lines
}

fn card_lines(card: &CardView, lines: &mut Vec<Line<'static>>) {
    match &card.summary {
        Summary::Text(text) => lines.push(Line::from(text.clone())),
        Summary::Analyzing => lines.push(Line::from("Analyzing...").italic()),
        Summary::Omitted => {}
    }
    section_lines("Positives", '+', Color::Green, &card.positives, lines);
    section_lines("Negatives", '-', Color::Red, &card.negatives, lines);
}

fn section_lines(
    heading: &str,
    bullet: char,
    color: Color,
    section: &Section,
    lines: &mut Vec<Line<'static>>,
) {
    let plain = Style::new().fg(color);
    let bold = plain.add_modifier(Modifier::BOLD);
    match section {
        Section::Omitted => {}
        Section::Thinking => {
            lines.push(Line::from(vec![
                Span::styled(heading.to_string(), bold),
                Span::styled(" thinking...", plain.add_modifier(Modifier::ITALIC)),
            ]));
        }
        Section::Items(items) => {
            lines.push(Line::styled(heading.to_string(), bold));
            for item in items {
                lines.push(Line::styled(format!("  {} {}", bullet, item), plain));
            }
        }
    }
}
