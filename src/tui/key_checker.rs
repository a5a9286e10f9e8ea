//! TUI for the key checker with progress display

use crate::key::{rank, FeedParser, KeyChecker, Verdict, VerifierConfig};
use crate::Result;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, Gauge, List, ListItem, ListState, Paragraph, Wrap},
    Frame, Terminal,
};
use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::PathBuf;
use tokio::time::Duration;

/// Maximum number of recent verdicts to keep for display
const MAX_RECENT_KEYS: usize = 100;

/// Key checker TUI application state
pub struct KeyCheckerApp {
    /// Keys to check
    keys: Vec<String>,
    /// Checker configuration
    config: VerifierConfig,
    /// Output file for working keys
    output: Option<PathBuf>,
    /// Total number of keys
    total: usize,
    /// Number of checked keys
    checked: usize,
    /// Number of working keys found
    working_count: usize,
    /// Number of failed keys
    failed_count: usize,
    /// Recent working verdicts (for display, stored as VecDeque for O(1) operations)
    recent_working: VecDeque<Verdict>,
    /// Recent failed verdicts (for display, stored as VecDeque for O(1) operations)
    recent_failed: VecDeque<Verdict>,
    /// Selected list (0 = working, 1 = failed)
    selected_list: usize,
    /// Selected item in current list
    list_state: ListState,
    /// Status message
    status_message: String,
    /// Whether checking is complete
    is_complete: bool,
    /// Whether the user wants to quit
    should_quit: bool,
}

impl KeyCheckerApp {
    /// Create a new key checker TUI application
    pub fn new(keys: Vec<String>, config: VerifierConfig, output: Option<PathBuf>) -> Self {
        let total = keys.len();
        let mut list_state = ListState::default();
        list_state.select(Some(0));

        Self {
            keys,
            config,
            output,
            total,
            checked: 0,
            working_count: 0,
            failed_count: 0,
            recent_working: VecDeque::new(),
            recent_failed: VecDeque::new(),
            selected_list: 0,
            list_state,
            status_message: "Starting key check... Press 'q' to quit.".to_string(),
            is_complete: false,
            should_quit: false,
        }
    }

    /// Run the TUI application
    pub async fn run(&mut self) -> Result<()> {
        // Setup terminal
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        let result = self.run_app(&mut terminal).await;

        // Restore terminal
        disable_raw_mode()?;
        execute!(
            terminal.backend_mut(),
            LeaveAlternateScreen,
            DisableMouseCapture
        )?;
        terminal.show_cursor()?;

        result
    }

    async fn run_app<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> Result<()> {
        // Create the output file if specified
        let mut output_file = self
            .output
            .as_ref()
            .map(|p| {
                OpenOptions::new()
                    .create(true)
                    .write(true)
                    .truncate(true)
                    .open(p)
            })
            .transpose()?;

        // Start the key checker
        let checker = KeyChecker::with_config(self.config.clone());
        let mut rx = checker.check_keys_stream(self.keys.clone());

        loop {
            // Draw UI
            terminal.draw(|f| self.ui(f))?;

            // Handle key events with a short timeout
            if event::poll(Duration::from_millis(50))? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        self.handle_input(key.code);
                        if self.should_quit {
                            break;
                        }
                    }
                }
            }

            // Try to receive results without blocking
            match rx.try_recv() {
                Ok(verdict) => {
                    self.checked += 1;

                    if verdict.is_working() {
                        self.working_count += 1;

                        // Write to file immediately
                        if let Some(ref mut file) = output_file {
                            writeln!(file, "{}", verdict.key)?;
                            file.flush()?;
                        }

                        self.recent_working.push_back(verdict);
                        if self.recent_working.len() > MAX_RECENT_KEYS {
                            self.recent_working.pop_front();
                        }
                    } else {
                        self.failed_count += 1;

                        self.recent_failed.push_back(verdict);
                        if self.recent_failed.len() > MAX_RECENT_KEYS {
                            self.recent_failed.pop_front();
                        }
                    }

                    // Update status message
                    let percentage = (self.checked as f64 / self.total as f64 * 100.0) as u32;
                    self.status_message = format!(
                        "Checking... {}% ({}/{}) | Working: {} | Failed: {}",
                        percentage, self.checked, self.total, self.working_count, self.failed_count
                    );
                }
                Err(tokio::sync::mpsc::error::TryRecvError::Empty) => {
                    // No result available, continue
                }
                Err(tokio::sync::mpsc::error::TryRecvError::Disconnected) => {
                    // Channel closed, checking complete
                    self.is_complete = true;
                    self.status_message = format!(
                        "Complete! Checked: {} | Working: {} | Failed: {} | Press 'q' to quit",
                        self.total, self.working_count, self.failed_count
                    );
                }
            }
        }

        Ok(())
    }

    fn handle_input(&mut self, key: KeyCode) {
        match key {
            KeyCode::Char('q') | KeyCode::Esc => {
                self.should_quit = true;
            }
            KeyCode::Tab => {
                // Switch between working and failed lists
                self.selected_list = (self.selected_list + 1) % 2;
                self.list_state.select(Some(0));
            }
            KeyCode::Down => {
                let list = if self.selected_list == 0 {
                    &self.recent_working
                } else {
                    &self.recent_failed
                };
                let i = match self.list_state.selected() {
                    Some(i) => {
                        if i >= list.len().saturating_sub(1) {
                            0
                        } else {
                            i + 1
                        }
                    }
                    None => 0,
                };
                self.list_state.select(Some(i));
            }
            KeyCode::Up => {
                let list = if self.selected_list == 0 {
                    &self.recent_working
                } else {
                    &self.recent_failed
                };
                let i = match self.list_state.selected() {
                    Some(i) => {
                        if i == 0 {
                            list.len().saturating_sub(1)
                        } else {
                            i - 1
                        }
                    }
                    None => 0,
                };
                self.list_state.select(Some(i));
            }
            _ => {}
        }
    }

    fn ui(&mut self, f: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .margin(1)
            .constraints([
                Constraint::Length(3), // Title
                Constraint::Length(3), // Progress bar
                Constraint::Min(0),    // Key lists
                Constraint::Length(3), // Status bar
            ])
            .split(f.size());

        // Title
        let title = Paragraph::new("🔑 Key Checker")
            .style(Style::default().fg(Color::Cyan))
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::ALL));
        f.render_widget(title, chunks[0]);

        // Progress bar
        let progress = if self.total > 0 {
            (self.checked as f64 / self.total as f64 * 100.0) as u16
        } else {
            0
        };
        let progress_label = format!("{}/{} ({}%)", self.checked, self.total, progress);
        let gauge = Gauge::default()
            .block(Block::default().borders(Borders::ALL).title("Progress"))
            .gauge_style(Style::default().fg(Color::Green).bg(Color::Black))
            .percent(progress)
            .label(progress_label);
        f.render_widget(gauge, chunks[1]);

        // Split the main area into two columns for working and failed keys
        let key_chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(chunks[2]);

        // Render working keys list
        Self::render_key_list_static(
            f,
            key_chunks[0],
            "✓ Working Keys",
            &self.recent_working,
            self.working_count,
            self.selected_list == 0,
            Color::Green,
            if self.selected_list == 0 {
                Some(&mut self.list_state)
            } else {
                None
            },
        );

        // Render failed keys list
        Self::render_key_list_static(
            f,
            key_chunks[1],
            "✗ Failed Keys",
            &self.recent_failed,
            self.failed_count,
            self.selected_list == 1,
            Color::Red,
            if self.selected_list == 1 {
                Some(&mut self.list_state)
            } else {
                None
            },
        );

        // Status bar
        let status = Paragraph::new(self.status_message.clone())
            .style(if self.is_complete {
                Style::default().fg(Color::Green)
            } else {
                Style::default().fg(Color::Yellow)
            })
            .wrap(Wrap { trim: true })
            .block(Block::default().borders(Borders::ALL).title("Status"));
        f.render_widget(status, chunks[3]);
    }

    #[allow(clippy::too_many_arguments)]
    fn render_key_list_static(
        f: &mut Frame,
        area: Rect,
        title: &str,
        verdicts: &VecDeque<Verdict>,
        total_count: usize,
        is_selected: bool,
        color: Color,
        list_state: Option<&mut ListState>,
    ) {
        let items: Vec<ListItem> = verdicts
            .iter()
            .rev() // Show newest first
            .map(|verdict| {
                let name = FeedParser::key_name(&verdict.key);
                let content = if verdict.working {
                    format!(
                        "{} {} ({}ms) {}",
                        rank::country_flag(&verdict.country_code),
                        verdict.isp,
                        verdict.latency_ms,
                        name
                    )
                } else {
                    match &verdict.error {
                        Some(error) => format!("{} ({})", name, error),
                        None => name,
                    }
                };
                ListItem::new(content).style(Style::default().fg(color))
            })
            .collect();

        let block_title = format!("{} ({})", title, total_count);
        let border_style = if is_selected {
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        };

        let list = List::new(items)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(block_title)
                    .border_style(border_style),
            )
            .highlight_style(Style::default().bg(Color::DarkGray))
            .highlight_symbol(">> ");

        if let Some(state) = list_state {
            f.render_stateful_widget(list, area, state);
        } else {
            f.render_widget(list, area);
        }
    }
}
