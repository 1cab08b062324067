// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

use anyhow::Result;
use chrono::Local;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, Wrap},
    Frame, Terminal,
};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::error::FetchError;
use crate::export::{self, export_with};
use crate::models::{CurrencyRate, RateTable};
use crate::rates::{FailureKind, RateSync, SyncStatus};

const TICK: Duration = Duration::from_millis(200);

/// Display cells for one currency: name, rate, change, date of the last update
pub fn format_row(rate: &CurrencyRate) -> [String; 4] {
    let change = rate
        .change()
        .map(|c| format!("{:+.2}", c))
        .unwrap_or_default();
    let date = rate
        .last_updated
        .map(|t| t.format("%d.%m.%Y").to_string())
        .unwrap_or_else(|| "—".to_string());

    [
        rate.display_name.clone(),
        export::format_rate(rate.value),
        change,
        date,
    ]
}

#[derive(Debug, Clone, PartialEq)]
pub enum Mode {
    Browse,
    SavePrompt { input: String },
    Message { title: String, body: String },
}

pub struct App {
    sync: Arc<RateSync>,
    status_rx: watch::Receiver<SyncStatus>,
    table: RateTable,
    needs_reload: bool,
    output_dir: PathBuf,
    pub status_line: String,
    pub mode: Mode,
}

impl App {
    pub fn new(sync: Arc<RateSync>, table: RateTable, output_dir: PathBuf) -> App {
        let status_rx = sync.subscribe();
        let current = sync.status();
        let mut app = App {
            sync,
            status_rx,
            table,
            needs_reload: false,
            output_dir,
            status_line: String::new(),
            mode: Mode::Browse,
        };
        app.on_status(current);
        app
    }

    pub fn table(&self) -> &RateTable {
        &self.table
    }

    pub fn refresh(&mut self) {
        match self.sync.spawn_refresh() {
            Ok(_) => {}
            Err(FetchError::InFlight) => {
                self.status_line = "Загрузка уже выполняется...".to_string();
            }
            Err(e) => self.show_error("Ошибка", format!("Не удалось запустить загрузку:\n{}", e)),
        }
    }

    /// Pick up status transitions published by the refresh task
    pub fn poll_status(&mut self) {
        if self.status_rx.has_changed().unwrap_or(false) {
            let status = self.status_rx.borrow_and_update().clone();
            self.on_status(status);
        }

        if self.needs_reload {
            if let Some(table) = self.sync.try_snapshot() {
                self.table = table;
                self.needs_reload = false;
            }
        }
    }

    pub fn on_status(&mut self, status: SyncStatus) {
        match status {
            SyncStatus::Idle => {}
            SyncStatus::Fetching { .. } => {
                self.status_line = "Загрузка данных...".to_string();
            }
            SyncStatus::Updated(summary) => {
                self.status_line = format!(
                    "Данные обновлены: {}",
                    summary.updated_at.format("%d.%m.%Y %H:%M")
                );
                self.needs_reload = true;
            }
            SyncStatus::Failed { kind, message } => {
                let (title, line) = match kind {
                    FailureKind::Network => ("Ошибка соединения", "Ошибка загрузки данных"),
                    FailureKind::Parse => ("Ошибка данных", "Ошибка разбора данных"),
                };
                self.status_line = line.to_string();
                self.show_error(title, format!("Не удалось получить данные:\n{}", message));
            }
        }
    }

    pub fn open_save_prompt(&mut self) {
        let suggested = self
            .output_dir
            .join(export::default_file_name(Local::now().date_naive()));
        self.mode = Mode::SavePrompt {
            input: suggested.display().to_string(),
        };
    }

    /// Finish the save prompt. `confirmed == false` is the cancel path and writes nothing.
    pub fn finish_save(&mut self, confirmed: bool) {
        let input = match std::mem::replace(&mut self.mode, Mode::Browse) {
            Mode::SavePrompt { input } => input,
            other => {
                self.mode = other;
                return;
            }
        };

        let selected = (confirmed && !input.trim().is_empty()).then(|| PathBuf::from(input.trim()));
        match export_with(&self.table, Local::now().date_naive(), |_| selected) {
            Ok(Some(summary)) => {
                self.status_line = format!("Сохранено: {}", summary.path.display());
                self.mode = Mode::Message {
                    title: "Сохранено".to_string(),
                    body: format!(
                        "Курсы валют успешно сохранены в файл:\n{}",
                        summary.path.display()
                    ),
                };
            }
            Ok(None) => {
                self.status_line = "Сохранение отменено".to_string();
            }
            Err(e) => self.show_error("Ошибка сохранения", format!("Не удалось сохранить файл:\n{}", e)),
        }
    }

    fn show_error(&mut self, title: &str, body: String) {
        self.mode = Mode::Message {
            title: title.to_string(),
            body,
        };
    }

    /// Returns `false` when the user asked to quit
    pub fn handle_key(&mut self, code: KeyCode) -> bool {
        match &mut self.mode {
            Mode::Message { .. } => self.mode = Mode::Browse,
            Mode::SavePrompt { input } => match code {
                KeyCode::Char(c) => input.push(c),
                KeyCode::Backspace => {
                    input.pop();
                }
                KeyCode::Enter => self.finish_save(true),
                KeyCode::Esc => self.finish_save(false),
                _ => {}
            },
            Mode::Browse => match code {
                KeyCode::Char('q') | KeyCode::Esc => return false,
                KeyCode::Char('r') => self.refresh(),
                KeyCode::Char('s') => self.open_save_prompt(),
                _ => {}
            },
        }
        true
    }
}

pub fn run_app<B: Backend>(terminal: &mut Terminal<B>, mut app: App) -> Result<()> {
    loop {
        app.poll_status();
        terminal.draw(|f| draw_ui(f, &app))?;

        if event::poll(TICK)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press && !app.handle_key(key.code) {
                    return Ok(());
                }
            }
        }
    }
}

fn draw_ui(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(6),
            Constraint::Length(3),
        ])
        .split(f.size());

    let title = Paragraph::new("Актуальные курсы валют")
        .style(Style::default().fg(Color::Cyan))
        .block(Block::default().borders(Borders::ALL));
    f.render_widget(title, chunks[0]);

    let header = Row::new(["Валюта", "Курс (руб)", "Изменение", "Дата"])
        .style(Style::default().add_modifier(Modifier::BOLD));
    let rows: Vec<Row> = app
        .table()
        .iter()
        .map(|rate| Row::new(format_row(rate).map(Cell::from)))
        .collect();
    let table = Table::new(
        rows,
        [
            Constraint::Percentage(40),
            Constraint::Percentage(20),
            Constraint::Percentage(20),
            Constraint::Percentage(20),
        ],
    )
    .header(header)
    .block(Block::default().title("Курсы ЦБ РФ").borders(Borders::ALL));
    f.render_widget(table, chunks[1]);

    let status_style = if app.sync.is_refreshing() {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    };
    let status = Paragraph::new(format!(
        "{}   [r] обновить  [s] сохранить  [q] выход",
        app.status_line
    ))
    .style(status_style)
    .block(Block::default().borders(Borders::ALL));
    f.render_widget(status, chunks[2]);

    match &app.mode {
        Mode::Browse => {}
        Mode::SavePrompt { input } => {
            let area = centered_rect(70, 5, f.size());
            let prompt = Paragraph::new(format!("{}\n[Enter] сохранить  [Esc] отмена", input))
                .block(
                    Block::default()
                        .title("Сохранить курсы валют")
                        .borders(Borders::ALL),
                );
            f.render_widget(Clear, area);
            f.render_widget(prompt, area);
        }
        Mode::Message { title, body } => {
            let area = centered_rect(60, 7, f.size());
            let message = Paragraph::new(body.as_str())
                .wrap(Wrap { trim: true })
                .block(
                    Block::default()
                        .title(title.as_str())
                        .borders(Borders::ALL)
                        .style(Style::default().fg(Color::Yellow)),
                );
            f.render_widget(Clear, area);
            f.render_widget(message, area);
        }
    }
}

fn centered_rect(percent_x: u16, height: u16, area: Rect) -> Rect {
    let width = (u32::from(area.width) * u32::from(percent_x) / 100) as u16;
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}

/// Run the interactive table until the user quits. Blocks the calling thread.
pub fn start_tui(sync: Arc<RateSync>, output_dir: PathBuf) -> Result<()> {
    let table = sync
        .try_snapshot()
        .ok_or_else(|| anyhow::anyhow!("rate table is locked"))?;
    let mut app = App::new(sync, table, output_dir);
    app.refresh();

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, app);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    res
}
