mod client;
mod conversation_logger;
mod state;

use anyhow::Result;
use client::{BackendClient, TurnOutcome};
use conversation_logger::ConversationLogger;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use medchat_shared::{ChatMessage, DiagnosisStatus, MessageRole, RiskLevel, UrgencyCode};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame, Terminal,
};
use state::{reduce, ChatEvent, ChatState};
use std::io;
use tokio::sync::mpsc;
use tracing::{error, info};

const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:3000";
const DEFAULT_LOG_DIR: &str = "conversation_logs";
const DISCLAIMER: &str = "This is not a substitute for professional medical advice";

struct App {
    state: ChatState,
    input: String,
    /// In chars, not bytes.
    cursor_position: usize,
    scroll_offset: usize,
    logger: ConversationLogger,
}

impl App {
    fn new(logger: ConversationLogger) -> Self {
        Self {
            state: ChatState::default(),
            input: String::new(),
            cursor_position: 0,
            scroll_offset: 0,
            logger,
        }
    }

    fn apply(&mut self, event: ChatEvent) {
        let state = std::mem::take(&mut self.state);
        self.state = reduce(state, event);
    }

    /// Returns true when the input started a new turn. While a turn is pending
    /// or the input is blank, the typed text stays in the box.
    fn submit(&mut self) -> bool {
        if self.state.pending || self.input.trim().is_empty() {
            return false;
        }
        let before = self.state.messages.len();
        let input = std::mem::take(&mut self.input);
        self.cursor_position = 0;
        self.apply(ChatEvent::Submitted(input));

        if self.state.messages.len() == before {
            return false;
        }
        if let Some(message) = self.state.messages.last() {
            if let Err(e) = self.logger.log_message(message) {
                error!("Failed to log user message: {}", e);
            }
        }
        self.scroll_to_bottom();
        true
    }

    fn receive(&mut self, outcome: TurnOutcome) {
        match outcome {
            Ok(response) => {
                if let Err(e) = self.logger.log_assessment(&response) {
                    error!("Failed to log assessment: {}", e);
                }
                let before = self.state.messages.len();
                self.apply(ChatEvent::TurnCompleted(response));
                if self.state.messages.len() > before {
                    if let Some(reply) = self.state.messages.last() {
                        if let Err(e) = self.logger.log_message(reply) {
                            error!("Failed to log assistant message: {}", e);
                        }
                    }
                }
            }
            Err(e) => {
                let message = e.to_string();
                if let Err(log_err) = self.logger.log_error(&message) {
                    error!("Failed to log error message: {}", log_err);
                }
                self.apply(ChatEvent::TurnFailed(message));
            }
        }
        self.scroll_to_bottom();
    }

    fn byte_index(&self) -> usize {
        self.input
            .char_indices()
            .nth(self.cursor_position)
            .map(|(i, _)| i)
            .unwrap_or(self.input.len())
    }

    fn move_cursor_left(&mut self) {
        self.cursor_position = self.cursor_position.saturating_sub(1);
    }

    fn move_cursor_right(&mut self) {
        if self.cursor_position < self.input.chars().count() {
            self.cursor_position += 1;
        }
    }

    fn insert_char(&mut self, c: char) {
        let index = self.byte_index();
        self.input.insert(index, c);
        self.cursor_position += 1;
    }

    fn delete_char(&mut self) {
        if self.cursor_position > 0 {
            self.cursor_position -= 1;
            let index = self.byte_index();
            self.input.remove(index);
        }
    }

    fn scroll_up(&mut self, amount: usize) {
        self.scroll_offset = self.scroll_offset.saturating_add(amount);
    }

    fn scroll_down(&mut self, amount: usize) {
        self.scroll_offset = self.scroll_offset.saturating_sub(amount);
    }

    fn scroll_to_bottom(&mut self) {
        self.scroll_offset = 0;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    // Log to a file so tracing output does not corrupt the TUI.
    if let Ok(file) = std::fs::File::create("medchat-cli.log") {
        tracing_subscriber::fmt()
            .with_writer(file)
            .with_ansi(false)
            .init();
    }

    let server_url = std::env::var("MEDCHAT_SERVER_URL").unwrap_or_else(|_| DEFAULT_SERVER_URL.to_string());
    let log_dir = std::env::var("MEDCHAT_LOG_DIR").unwrap_or_else(|_| DEFAULT_LOG_DIR.to_string());

    let logger = ConversationLogger::new(&log_dir).unwrap_or_else(|e| {
        error!("Failed to create conversation logger: {}", e);
        ConversationLogger::disabled()
    });
    if let Some(path) = logger.current_log_path() {
        info!("Logging conversation to: {:?}", path);
    }

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(logger);
    info!("Talking to {}", server_url);
    let (client, mut turn_rx) = BackendClient::new(&server_url);

    let (ui_tx, mut ui_rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        while let Ok(event) = event::read() {
            if ui_tx.send(event).is_err() {
                break;
            }
        }
    });

    let res = run_app(&mut terminal, &mut app, client, &mut turn_rx, &mut ui_rx).await;

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("{err:?}");
    }

    Ok(())
}

async fn run_app<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    client: BackendClient,
    turn_rx: &mut mpsc::UnboundedReceiver<TurnOutcome>,
    ui_rx: &mut mpsc::UnboundedReceiver<Event>,
) -> Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        tokio::select! {
            Some(outcome) = turn_rx.recv() => {
                app.receive(outcome);
            }
            Some(event) = ui_rx.recv() => {
                match event {
                    Event::Key(key) if key.kind == KeyEventKind::Press => {
                        match key.code {
                            KeyCode::Char('q') | KeyCode::Char('c')
                                if key.modifiers.contains(event::KeyModifiers::CONTROL) =>
                            {
                                return Ok(())
                            }
                            KeyCode::Char(c) => app.insert_char(c),
                            KeyCode::Backspace => app.delete_char(),
                            KeyCode::Left => app.move_cursor_left(),
                            KeyCode::Right => app.move_cursor_right(),
                            KeyCode::Home => app.cursor_position = 0,
                            KeyCode::End => app.cursor_position = app.input.chars().count(),
                            KeyCode::Esc => app.apply(ChatEvent::DismissError),
                            KeyCode::Enter => {
                                if app.submit() {
                                    client.send_turn(app.state.next_request());
                                }
                            }
                            KeyCode::Up => app.scroll_up(1),
                            KeyCode::Down => app.scroll_down(1),
                            KeyCode::PageUp => app.scroll_up(10),
                            KeyCode::PageDown => app.scroll_down(10),
                            _ => {}
                        }
                    }
                    Event::Mouse(mouse) => match mouse.kind {
                        event::MouseEventKind::ScrollUp => app.scroll_up(3),
                        event::MouseEventKind::ScrollDown => app.scroll_down(3),
                        _ => {}
                    },
                    _ => {}
                }
            }
        }
    }
}

fn ui(f: &mut Frame, app: &App) {
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(40), Constraint::Length(42)])
        .split(f.area());

    let chat_column = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(2),
            Constraint::Min(1),
            Constraint::Length(3),
            Constraint::Length(1),
        ])
        .split(columns[0]);

    render_header(f, chat_column[0]);
    render_chat(f, app, chat_column[1]);
    render_input(f, app, chat_column[2]);
    f.render_widget(
        Paragraph::new(DISCLAIMER).style(Style::default().fg(Color::DarkGray)),
        chat_column[3],
    );
    render_sidebar(f, app, columns[1]);
}

fn render_header(f: &mut Frame, area: Rect) {
    let header = vec![
        Line::from(Span::styled(
            "MedChat Assistant",
            Style::default().fg(Color::Blue).add_modifier(Modifier::BOLD),
        )),
        Line::from(Span::styled(
            "AI-powered symptom assessment",
            Style::default().fg(Color::Gray),
        )),
    ];
    f.render_widget(Paragraph::new(header), area);
}

fn render_chat(f: &mut Frame, app: &App, area: Rect) {
    let mut all_lines: Vec<Line> = Vec::new();

    for msg in &app.state.messages {
        let (prefix, style) = role_style(msg);
        all_lines.push(Line::from(Span::styled(
            format!("{}:", prefix),
            style.add_modifier(Modifier::BOLD),
        )));
        for line in msg.content.lines() {
            all_lines.push(Line::from(Span::styled(line, style)));
        }
        all_lines.push(Line::from(""));
    }

    if app.state.pending {
        all_lines.push(Line::from(Span::styled("●●●", Style::default().fg(Color::Gray))));
    }
    if let Some(notice) = &app.state.notice {
        all_lines.push(Line::from(Span::styled(notice.as_str(), Style::default().fg(Color::Yellow))));
    }
    if let Some(err) = &app.state.error {
        all_lines.push(Line::from(Span::styled(
            format!("Error: {} (Esc to dismiss)", err),
            Style::default().fg(Color::White).bg(Color::Red),
        )));
    }

    let total_lines = all_lines.len();
    let visible_height = area.height as usize;
    let start_line = if total_lines > visible_height {
        let max_scroll = total_lines - visible_height;
        max_scroll - app.scroll_offset.min(max_scroll)
    } else {
        0
    };
    let end_line = (start_line + visible_height).min(total_lines);
    let visible_lines: Vec<Line> = all_lines[start_line..end_line].to_vec();

    let chat = Paragraph::new(visible_lines)
        .block(Block::default().borders(Borders::NONE))
        .wrap(Wrap { trim: false });

    f.render_widget(chat, area);
}

fn role_style(msg: &ChatMessage) -> (&'static str, Style) {
    match msg.role {
        MessageRole::User => ("You", Style::default().fg(Color::Cyan)),
        MessageRole::Assistant => ("Assistant", Style::default().fg(Color::Green)),
        MessageRole::System => ("System", Style::default().fg(Color::Yellow)),
    }
}

fn render_input(f: &mut Frame, app: &App, area: Rect) {
    let (input_text, style) = if app.input.is_empty() {
        ("Describe your symptoms...", Style::default().fg(Color::DarkGray))
    } else {
        (app.input.as_str(), Style::default())
    };

    let title = if app.state.pending {
        "Waiting for assessment..."
    } else {
        "Input (Enter to send, Ctrl-Q to quit, ↑↓ to scroll)"
    };

    let input = Paragraph::new(input_text)
        .style(style)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(title)
                .border_style(Style::default().fg(Color::White)),
        )
        .wrap(Wrap { trim: true });

    f.render_widget(input, area);

    if !app.input.is_empty() {
        let cursor_x = area.x + app.cursor_position as u16 + 1;
        let cursor_y = area.y + 1;
        f.set_cursor_position((cursor_x.min(area.x + area.width.saturating_sub(2)), cursor_y));
    }
}

fn render_sidebar(f: &mut Frame, app: &App, area: Rect) {
    let sidebar = &app.state.sidebar;
    let heading = Style::default().fg(Color::Gray).add_modifier(Modifier::BOLD);
    let mut lines: Vec<Line> = Vec::new();

    if let Some(urgency) = &sidebar.urgency {
        lines.push(Line::from(Span::styled("Urgency", heading)));
        lines.push(Line::from(Span::styled(
            urgency.text.clone(),
            Style::default().fg(Color::Black).bg(urgency_color(urgency.level())),
        )));
        lines.push(Line::from(""));
    }

    if !sidebar.diagnosis.is_empty() {
        lines.push(Line::from(Span::styled("Diagnoses", heading)));
        for entry in &sidebar.diagnosis {
            lines.push(Line::from(vec![
                Span::raw(format!("{} ", entry.name.replace('_', " "))),
                Span::styled(
                    format!("[{}]", entry.status),
                    Style::default().fg(diagnosis_color(entry.classify())),
                ),
            ]));
        }
        lines.push(Line::from(""));
    }

    if !sidebar.risks.is_empty() {
        lines.push(Line::from(Span::styled("Risk Factors", heading)));
        for risk in &sidebar.risks {
            lines.push(Line::from(vec![
                Span::raw(format!("{} ", risk.condition)),
                Span::styled(risk.risk_level.as_tag(), Style::default().fg(risk_color(risk.risk_level))),
            ]));
        }
    }

    let panel = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title("Assessment Summary"))
        .wrap(Wrap { trim: false });
    f.render_widget(panel, area);
}

fn urgency_color(level: Option<UrgencyCode>) -> Color {
    match level {
        Some(UrgencyCode::Emergency) => Color::Red,
        Some(UrgencyCode::UrgentCare) => Color::LightRed,
        Some(UrgencyCode::PrimaryCare) => Color::Yellow,
        Some(UrgencyCode::Monitor) => Color::LightBlue,
        Some(UrgencyCode::Safe) => Color::Green,
        None => Color::Gray,
    }
}

fn diagnosis_color(status: Option<DiagnosisStatus>) -> Color {
    match status {
        Some(DiagnosisStatus::Confirmed) => Color::Red,
        Some(DiagnosisStatus::AlsoPossible) => Color::Yellow,
        Some(DiagnosisStatus::MoreInfo) | None => Color::Blue,
    }
}

fn risk_color(level: RiskLevel) -> Color {
    match level {
        RiskLevel::High => Color::Red,
        RiskLevel::Medium => Color::Yellow,
        RiskLevel::Low => Color::Green,
        RiskLevel::MoreInfo => Color::Blue,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use medchat_shared::ChatTurnResponse;

    fn app() -> App {
        App::new(ConversationLogger::disabled())
    }

    #[test]
    fn editing_handles_multibyte_input() {
        let mut app = app();
        for c in "fièvre".chars() {
            app.insert_char(c);
        }
        app.move_cursor_left();
        app.delete_char();
        assert_eq!(app.input, "fiève");
        assert_eq!(app.cursor_position, 4);
    }

    #[test]
    fn submit_starts_turn_once() {
        let mut app = app();
        app.input = "I have a rash".to_string();
        assert!(app.submit());
        assert!(app.input.is_empty());

        app.input = "and it itches".to_string();
        app.cursor_position = 5;
        assert!(!app.submit());
        assert_eq!(app.state.messages.len(), 1);
        assert_eq!(app.input, "and it itches");
        assert_eq!(app.cursor_position, 5);
    }

    #[test]
    fn blank_submit_keeps_whitespace_input() {
        let mut app = app();
        app.input = "   ".to_string();
        app.cursor_position = 3;
        assert!(!app.submit());
        assert!(app.state.messages.is_empty());
        assert_eq!(app.cursor_position, 3);
    }

    #[test]
    fn receive_appends_reply() {
        let mut app = app();
        app.input = "I have a rash".to_string();
        app.submit();
        app.receive(Ok(ChatTurnResponse {
            text: Some("Where is the rash?".to_string()),
            ..Default::default()
        }));

        assert!(!app.state.pending);
        assert_eq!(app.state.messages[1], ChatMessage::assistant("Where is the rash?"));
    }
}
