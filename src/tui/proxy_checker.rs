//! Live dashboard for a running proxy check

use crate::proxy::{HttpProbeExecutor, ProbeExecutor, ProbeOutcome, ProxyChecker, ResultAggregator};
use crate::Result;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::{Alignment, Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, Gauge, List, ListItem, ListState, Paragraph, Wrap},
    Frame, Terminal,
};
use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::time::Duration;

/// Maximum number of recent proxies to keep for display
const MAX_RECENT_PROXIES: usize = 100;

/// Dashboard state. Outcomes are recorded into the shared aggregator by the
/// checker; the dashboard only keeps counters and a window of recent entries.
pub struct ProxyCheckerApp<E = HttpProbeExecutor> {
    checker: Arc<ProxyChecker<E>>,
    /// Proxies still to hand to the checker
    proxies: Vec<String>,
    aggregator: ResultAggregator,
    total: usize,
    checked: usize,
    good_count: usize,
    bad_count: usize,
    recent_good: VecDeque<ProbeOutcome>,
    recent_bad: VecDeque<ProbeOutcome>,
    /// 0 = working list, 1 = failed list
    selected_list: usize,
    list_state: ListState,
    status_message: String,
    is_complete: bool,
    should_quit: bool,
}

impl<E: ProbeExecutor + 'static> ProxyCheckerApp<E> {
    pub fn new(checker: ProxyChecker<E>, proxies: Vec<String>, aggregator: ResultAggregator) -> Self {
        let total = proxies.len();
        let mut list_state = ListState::default();
        list_state.select(Some(0));

        Self {
            checker: Arc::new(checker),
            proxies,
            aggregator,
            total,
            checked: 0,
            good_count: 0,
            bad_count: 0,
            recent_good: VecDeque::new(),
            recent_bad: VecDeque::new(),
            selected_list: 0,
            list_state,
            status_message: "Starting proxy check... Press 'q' to quit.".to_string(),
            is_complete: false,
            should_quit: false,
        }
    }

    /// Whether every proxy was checked before the user left
    pub fn is_complete(&self) -> bool {
        self.is_complete
    }

    /// Run the check with the dashboard on screen
    pub async fn run(&mut self) -> Result<()> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        let result = self.run_app(&mut terminal).await;

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
        let (tx, mut rx) = mpsc::unbounded_channel();
        let checker = Arc::clone(&self.checker);
        let aggregator = self.aggregator.clone();
        let proxies = std::mem::take(&mut self.proxies);

        let run = tokio::spawn(async move {
            checker
                .run_all(proxies, &aggregator, |update| {
                    let _ = tx.send(update.outcome.clone());
                })
                .await;
        });

        loop {
            terminal.draw(|f| self.ui(f))?;

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

            loop {
                match rx.try_recv() {
                    Ok(outcome) => self.record(outcome),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        if !self.is_complete {
                            self.finish();
                        }
                        break;
                    }
                }
            }
        }

        if !self.is_complete {
            // Abandons in-flight probes; recorded outcomes stay in the aggregator.
            run.abort();
        }

        Ok(())
    }

    fn record(&mut self, outcome: ProbeOutcome) {
        self.checked += 1;

        let recent = if outcome.is_working() {
            self.good_count += 1;
            &mut self.recent_good
        } else {
            self.bad_count += 1;
            &mut self.recent_bad
        };
        recent.push_back(outcome);
        if recent.len() > MAX_RECENT_PROXIES {
            recent.pop_front();
        }

        self.status_message = format!(
            "Checking... {}% ({}/{}) | Working: {} | Failed: {}",
            self.percent(),
            self.checked,
            self.total,
            self.good_count,
            self.bad_count
        );
    }

    fn finish(&mut self) {
        self.is_complete = true;
        self.status_message = format!(
            "Complete! Checked: {} | Working: {} | Failed: {} | Press 'q' to quit",
            self.checked, self.good_count, self.bad_count
        );
    }

    fn percent(&self) -> u16 {
        if self.total == 0 {
            return 100;
        }
        (self.checked * 100 / self.total).min(100) as u16
    }

    fn handle_input(&mut self, key: KeyCode) {
        match key {
            KeyCode::Char('q') | KeyCode::Esc => {
                self.should_quit = true;
            }
            KeyCode::Tab => {
                self.selected_list = (self.selected_list + 1) % 2;
                self.list_state.select(Some(0));
            }
            KeyCode::Down => {
                let len = self.selected_len();
                let i = match self.list_state.selected() {
                    Some(i) if i + 1 < len => i + 1,
                    _ => 0,
                };
                self.list_state.select(Some(i));
            }
            KeyCode::Up => {
                let len = self.selected_len();
                let i = match self.list_state.selected() {
                    Some(0) | None => len.saturating_sub(1),
                    Some(i) => i - 1,
                };
                self.list_state.select(Some(i));
            }
            _ => {}
        }
    }

    fn selected_len(&self) -> usize {
        if self.selected_list == 0 {
            self.recent_good.len()
        } else {
            self.recent_bad.len()
        }
    }

    fn ui(&mut self, f: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .margin(1)
            .constraints([
                Constraint::Length(3), // Title
                Constraint::Length(3), // Progress bar
                Constraint::Min(0),    // Proxy lists
                Constraint::Length(3), // Status bar
            ])
            .split(f.size());

        let title = Paragraph::new("Proxy Probe")
            .style(Style::default().fg(Color::Cyan))
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::ALL));
        f.render_widget(title, chunks[0]);

        let progress = self.percent();
        let progress_label = format!("{}/{} ({}%)", self.checked, self.total, progress);
        let gauge = Gauge::default()
            .block(Block::default().borders(Borders::ALL).title("Progress"))
            .gauge_style(Style::default().fg(Color::Green).bg(Color::Black))
            .percent(progress)
            .label(progress_label);
        f.render_widget(gauge, chunks[1]);

        let proxy_chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(chunks[2]);

        let focus_working = self.selected_list == 0;
        let working = outcome_list("Working", &self.recent_good, self.good_count, Color::Green, focus_working);
        let failed = outcome_list("Failed", &self.recent_bad, self.bad_count, Color::Red, !focus_working);
        if focus_working {
            f.render_stateful_widget(working, proxy_chunks[0], &mut self.list_state);
            f.render_widget(failed, proxy_chunks[1]);
        } else {
            f.render_widget(working, proxy_chunks[0]);
            f.render_stateful_widget(failed, proxy_chunks[1], &mut self.list_state);
        }

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
}

/// Bordered list of recent outcomes, newest first; `focused` gets the
/// highlighted border and receives the selection
fn outcome_list<'a>(
    title: &str,
    outcomes: &VecDeque<ProbeOutcome>,
    total: usize,
    color: Color,
    focused: bool,
) -> List<'a> {
    let items: Vec<ListItem> = list_rows(outcomes)
        .into_iter()
        .map(|row| ListItem::new(row).style(Style::default().fg(color)))
        .collect();

    let border_style = if focused {
        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
    } else {
        Style::default()
    };

    List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("{title} ({total})"))
                .border_style(border_style),
        )
        .highlight_style(Style::default().bg(Color::DarkGray))
        .highlight_symbol(">> ")
}

fn list_rows(outcomes: &VecDeque<ProbeOutcome>) -> Vec<String> {
    outcomes.iter().rev().map(list_line).collect()
}

/// One list row: proxy plus latency and country, or the failure reason
fn list_line(outcome: &ProbeOutcome) -> String {
    match (outcome.latency_ms, &outcome.country) {
        (Some(ms), Some(country)) => format!("{} ({}ms, {})", outcome.raw_proxy, ms, country),
        (Some(ms), None) => format!("{} ({}ms)", outcome.raw_proxy, ms),
        _ => format!(
            "{} [{}]",
            outcome.raw_proxy,
            outcome.error_summary.as_deref().unwrap_or("failed")
        ),
    }
}
