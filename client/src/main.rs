mod api;
mod classifier;
mod error;
mod markdown;
mod render;
mod session;
mod sse;
mod ui;

use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use esg_shared::{ChatRequest, PageType};
use ratatui::prelude::*;
use tokio::sync::mpsc;

use api::ChatClient;
use session::{ChatSession, StreamEvent};
use ui::App;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Page {
    Dashboard,
    Report,
}

impl From<Page> for PageType {
    fn from(page: Page) -> Self {
        match page {
            Page::Dashboard => PageType::Dashboard,
            Page::Report => PageType::Report,
        }
    }
}

/// Terminal chat sidebar for the ESG dashboard relay.
#[derive(Debug, Parser)]
#[command(version)]
struct Args {
    /// Chat endpoint of the relay server.
    #[arg(long, default_value = "http://127.0.0.1:3001/chat")]
    server: String,

    /// Which page the questions are about.
    #[arg(long, value_enum, default_value_t = Page::Dashboard)]
    page: Page,

    /// File holding the data snapshot sent along with every question.
    #[arg(long)]
    context: Option<PathBuf>,

    /// Write logs here; the terminal itself is taken by the UI.
    #[arg(long)]
    log_file: Option<PathBuf>,
}

struct Sidebar {
    client: Arc<ChatClient>,
    context_data: Option<String>,
    tx: mpsc::UnboundedSender<StreamEvent>,
}

impl Sidebar {
    fn submit(&self, app: &mut App, question: Option<String>) {
        let Some(question) = question else {
            return;
        };
        app.scroll_back = 0;
        let request = ChatRequest {
            question,
            context_data: self.context_data.clone(),
            page_type: Some(app.session.page()),
        };
        let client = self.client.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            client.ask(&request, tx).await;
        });
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if let Some(path) = &args.log_file {
        let file = std::fs::File::create(path)
            .with_context(|| format!("Failed to create log file {}", path.display()))?;
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "esg_client=debug".into()),
            )
            .with_writer(Mutex::new(file))
            .with_ansi(false)
            .init();
    }

    let context_data = match &args.context {
        Some(path) => Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read context file {}", path.display()))?,
        ),
        None => None,
    };

    let (tx, rx) = mpsc::unbounded_channel::<StreamEvent>();
    let sidebar = Sidebar {
        client: Arc::new(ChatClient::new(&args.server)),
        context_data,
        tx,
    };
    let mut app = App {
        session: ChatSession::new(args.page.into()),
        input: String::new(),
        scroll_back: 0,
    };

    // Setup Terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run(&mut terminal, &mut app, &sidebar, rx).await;

    // Restore Terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

async fn run<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    sidebar: &Sidebar,
    mut rx: mpsc::UnboundedReceiver<StreamEvent>,
) -> Result<()> {
    loop {
        terminal.draw(|f| ui::draw(f, app))?;

        tokio::select! {
            Some(event) = rx.recv() => app.session.apply(event),
            _ = tokio::time::sleep(Duration::from_millis(16)) => {
                while event::poll(Duration::ZERO)? {
                    let Event::Key(key) = event::read()? else {
                        continue;
                    };
                    if key.kind != KeyEventKind::Press {
                        continue;
                    }
                    match key.code {
                        KeyCode::Esc => return Ok(()),
                        KeyCode::Char(c) => app.input.push(c),
                        KeyCode::Backspace => {
                            app.input.pop();
                        }
                        KeyCode::Enter => {
                            let question = app.session.begin(&app.input);
                            if question.is_some() {
                                app.input.clear();
                            }
                            sidebar.submit(app, question);
                        }
                        KeyCode::PageUp => app.scroll_back = app.scroll_back.saturating_add(5),
                        KeyCode::PageDown => app.scroll_back = app.scroll_back.saturating_sub(5),
                        KeyCode::F(n) if app.input.is_empty() => {
                            let example = app
                                .session
                                .remaining_examples()
                                .get(usize::from(n).saturating_sub(1))
                                .copied();
                            if let Some(example) = example {
                                let question = app.session.begin_example(example);
                                sidebar.submit(app, question);
                            }
                        }
                        _ => {}
                    }
                }
            }
        }
    }
}
