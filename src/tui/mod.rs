mod help;
mod state;

use crate::backend::{ItemCatalog, RunBackend, StatusCatalog};
use crate::cli::Cli;
use crate::model::{DraftField, LifecyclePhase, RunItem};
use crate::orchestrator::{self, LifecycleController, PanelEvent, UiCommand};
use crate::storage::FileStore;
use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap},
    Terminal,
};
use state::{fmt_timestamp, key_value_line, UiState};
use std::sync::Arc;
use std::{io, time::Duration, time::Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

pub async fn run(args: Cli, store: Arc<FileStore>) -> Result<()> {
    // Unbounded channels avoid backpressure between the UI thread and the controller.
    let (event_tx, event_rx) = mpsc::unbounded_channel::<PanelEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();

    let items = store.items().await?;
    let statuses = store.statuses().await?;

    let mut ui = UiState {
        items,
        ..Default::default()
    };
    ui.set_statuses(statuses);
    if let Some(item_id) = args.item.as_deref() {
        let item = crate::cli::find_item(&store, item_id).await?;
        ui.selected = ui.items.iter().position(|i| i.id == item.id).unwrap_or(0);
        let _ = cmd_tx.send(UiCommand::Open(item));
    }

    let backend: Arc<dyn RunBackend> = store.clone();
    let ctl = LifecycleController::new(backend);

    // TUI runs in a dedicated thread to keep all blocking I/O out of the Tokio runtime.
    let redraw = Duration::from(args.redraw_interval);
    let rt = tokio::runtime::Handle::current();
    let ui_handle =
        std::thread::spawn(move || run_threaded(ui, redraw, store, rt, event_rx, cmd_tx));

    let res = orchestrator::run_controller(ctl, event_tx, cmd_rx).await;

    let join_res = tokio::task::spawn_blocking(move || ui_handle.join()).await;
    if let Ok(joined) = join_res {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(anyhow::anyhow!("TUI thread panicked")),
        }
    }

    res
}

/// Run the TUI loop on a dedicated thread.
fn run_threaded(
    mut state: UiState,
    redraw: Duration,
    store: Arc<FileStore>,
    rt: tokio::runtime::Handle,
    mut event_rx: UnboundedReceiver<PanelEvent>,
    cmd_tx: UnboundedSender<UiCommand>,
) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).ok();

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;
    terminal.clear().ok();

    let mut last_draw: Option<Instant> = None;

    let res = loop {
        // Drain events without blocking to keep the UI responsive.
        while let Ok(ev) = event_rx.try_recv() {
            state.apply_event(ev);
        }

        if last_draw.map_or(true, |t| t.elapsed() >= redraw) {
            terminal.draw(|f| draw(f.area(), f, &state)).ok();
            last_draw = Some(Instant::now());
        }

        // Poll input with a short timeout to avoid blocking the render loop.
        if !event::poll(Duration::from_millis(10)).unwrap_or(false) {
            continue;
        }
        let Ok(Event::Key(k)) = event::read() else {
            continue;
        };
        if k.kind != KeyEventKind::Press {
            continue;
        }

        if (k.modifiers, k.code) == (KeyModifiers::CONTROL, KeyCode::Char('c')) {
            let _ = cmd_tx.send(UiCommand::Quit);
            break Ok(());
        }

        if let Some(field) = state.editing {
            match k.code {
                KeyCode::Enter | KeyCode::Esc => {
                    let value = state.edit_buffer.clone();
                    let _ = cmd_tx.send(UiCommand::SetDraft(field, value.clone()));
                    // Keep the local copy current so an immediate start/stop sends this text.
                    state.view.drafts.set(field, value);
                    state.editing = None;
                }
                KeyCode::Backspace => {
                    state.edit_buffer.pop();
                    let _ = cmd_tx.send(UiCommand::SetDraft(field, state.edit_buffer.clone()));
                }
                KeyCode::Char(c) => {
                    state.edit_buffer.push(c);
                    let _ = cmd_tx.send(UiCommand::SetDraft(field, state.edit_buffer.clone()));
                }
                _ => {}
            }
            continue;
        }

        match (k.modifiers, k.code) {
            (_, KeyCode::Char('q')) => {
                let _ = cmd_tx.send(UiCommand::Quit);
                break Ok(());
            }
            (_, KeyCode::Char('?')) => {
                state.show_help = !state.show_help;
            }
            (_, KeyCode::Up) | (_, KeyCode::Char('k')) => {
                select_item(&mut state, &cmd_tx, -1);
            }
            (_, KeyCode::Down) | (_, KeyCode::Char('j')) => {
                select_item(&mut state, &cmd_tx, 1);
            }
            (_, KeyCode::Enter) => {
                if let Some(item) = state.selected_item().cloned() {
                    state.show_help = false;
                    let _ = cmd_tx.send(UiCommand::Open(item));
                }
            }
            (_, KeyCode::Esc) => {
                if state.show_help {
                    state.show_help = false;
                } else if state.view.open {
                    let _ = cmd_tx.send(UiCommand::Close);
                }
            }
            (_, KeyCode::Left) => state.cycle_status(-1),
            (_, KeyCode::Right) => state.cycle_status(1),
            (_, KeyCode::Char('n')) => {
                if state.view.open {
                    if let Some(field) = state.note_field() {
                        state.begin_edit(field);
                    }
                }
            }
            (_, KeyCode::Char('c')) => {
                if state.view.open && state.view.phase == LifecyclePhase::CycleOpenSession {
                    state.begin_edit(DraftField::EndScore);
                }
            }
            (_, KeyCode::Char('s')) => {
                if state.can_start() {
                    if let Some(status) = state.selected_status() {
                        let status_id = status.id.clone();
                        state.loading = true;
                        state.msg = "Starting…".into();
                        let _ = cmd_tx.send(UiCommand::Start {
                            status_id,
                            note: state.view.drafts.start_note.clone(),
                        });
                    }
                } else if state.view.open && state.selected_status().is_none() {
                    state.msg = "Pick a status first (press d to create defaults)".into();
                }
            }
            (_, KeyCode::Char('x')) => {
                if state.can_stop() {
                    state.loading = true;
                    state.msg = "Stopping…".into();
                    let _ = cmd_tx.send(UiCommand::Stop {
                        score: state.end_score(),
                        note: state.view.drafts.end_note.clone(),
                    });
                }
            }
            (_, KeyCode::Char('r')) => {
                if state.view.open {
                    let _ = cmd_tx.send(UiCommand::Reload);
                } else {
                    match rt.block_on(store.items()) {
                        Ok(items) => {
                            state.items = items;
                            state.selected =
                                state.selected.min(state.items.len().saturating_sub(1));
                            state.msg = "Refreshed".into();
                        }
                        Err(e) => state.msg = format!("Refresh failed: {e:#}"),
                    }
                }
            }
            (_, KeyCode::Char('d')) => {
                if state.statuses.is_empty() {
                    match rt.block_on(store.ensure_default_statuses()) {
                        Ok(statuses) => {
                            state.set_statuses(statuses);
                            state.msg = "Default statuses created".into();
                        }
                        Err(e) => state.msg = format!("Creating statuses failed: {e:#}"),
                    }
                }
            }
            _ => {}
        }
    };

    disable_raw_mode().ok();
    let mut stdout = io::stdout();
    execute!(stdout, LeaveAlternateScreen).ok();
    res
}

/// Move the selection; an open panel follows the selected item.
fn select_item(state: &mut UiState, cmd_tx: &UnboundedSender<UiCommand>, delta: isize) {
    if state.move_selection(delta) && state.view.open {
        if let Some(item) = state.selected_item().cloned() {
            let _ = cmd_tx.send(UiCommand::Open(item));
        }
    }
}

fn draw(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(3)].as_ref())
        .split(area);
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)].as_ref())
        .split(rows[0]);

    draw_items(cols[0], f, state);
    if state.show_help {
        help::draw_help(cols[1], f);
    } else if state.view.open {
        draw_panel(cols[1], f, state);
    } else {
        let hint =
            Paragraph::new("Select an item and press Enter to open its run panel. ? for help.")
                .wrap(Wrap { trim: true })
                .block(Block::default().borders(Borders::ALL).title("Run"));
        f.render_widget(hint, cols[1]);
    }
    draw_status_bar(rows[1], f, state);
}

fn draw_items(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let items: Vec<ListItem> = if state.items.is_empty() {
        vec![ListItem::new("No items yet (add one with --add-item)")]
    } else {
        state
            .items
            .iter()
            .map(|i: &RunItem| {
                let is_open = state.view.open
                    && state.view.item.as_ref().is_some_and(|cur| cur.id == i.id);
                let marker = if is_open { "▶ " } else { "  " };
                ListItem::new(format!("{marker}{}", i.title))
            })
            .collect()
    };
    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title("Items"))
        .highlight_style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD));
    let mut list_state = ListState::default();
    if !state.items.is_empty() {
        list_state.select(Some(state.selected));
    }
    f.render_stateful_widget(list, area, &mut list_state);
}

fn draft_line(state: &UiState, label: &str, field: DraftField) -> Line<'static> {
    let text = state.draft_text(field);
    let mut spans = vec![
        Span::styled(format!("{label}: "), Style::default().fg(Color::Gray)),
        Span::raw(text.to_string()),
    ];
    if state.editing == Some(field) {
        spans.push(Span::styled("▏", Style::default().fg(Color::Yellow)));
    }
    Line::from(spans)
}

fn action_line(key: &'static str, label: &'static str, enabled: bool) -> Line<'static> {
    let style = if enabled {
        Style::default().fg(Color::Green)
    } else {
        Style::default().fg(Color::DarkGray)
    };
    Line::from(vec![
        Span::styled(format!("[{key}] "), style),
        Span::styled(label, style),
    ])
}

fn draw_panel(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let view = &state.view;
    let title = view
        .item
        .as_ref()
        .map(|i| i.title.clone())
        .unwrap_or_else(|| "Run".into());
    let mut lines: Vec<Line<'static>> = Vec::new();

    match view.phase {
        LifecyclePhase::NoCycle => {
            lines.push(Line::from("No cycle yet."));
            lines.push(Line::from(""));
            let status = match state.selected_status() {
                Some(s) => format!("◀ {} ▶", s.name),
                None => "none (press d)".into(),
            };
            lines.push(key_value_line("Starting status", &status));
            lines.push(draft_line(state, "Note", DraftField::StartNote));
            lines.push(Line::from(""));
            lines.push(action_line("s", "Start", state.can_start()));
        }
        LifecyclePhase::CycleOpenSession => {
            lines.push(Line::from(Span::styled(
                view.elapsed.clone(),
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            )));
            lines.push(key_value_line(
                "Started",
                &fmt_timestamp(view.run.session_started_at),
            ));
            lines.push(Line::from(""));
            lines.push(draft_line(state, "Score", DraftField::EndScore));
            lines.push(draft_line(state, "Note", DraftField::EndNote));
            lines.push(Line::from(""));
            lines.push(action_line("x", "Stop", state.can_stop()));
        }
        LifecyclePhase::CycleClosedSession => {
            lines.push(Line::from(Span::styled(
                "Session already ended.",
                Style::default().fg(Color::Yellow),
            )));
            lines.push(key_value_line(
                "Started",
                &fmt_timestamp(view.run.session_started_at),
            ));
            lines.push(key_value_line(
                "Ended",
                &fmt_timestamp(view.run.session_ended_at),
            ));
        }
    }

    if let Some(cycle_id) = view.run.cycle_id.as_deref() {
        lines.push(Line::from(""));
        lines.push(key_value_line("Cycle", cycle_id));
    }

    let p = Paragraph::new(lines)
        .alignment(Alignment::Left)
        .wrap(Wrap { trim: false })
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("{title} · {}", view.phase.label())),
        );
    f.render_widget(p, area);
}

fn draw_status_bar(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let mut spans = Vec::new();
    if state.loading {
        spans.push(Span::styled("● ", Style::default().fg(Color::Yellow)));
    }
    spans.push(Span::raw(state.msg.clone()));
    let p = Paragraph::new(Line::from(spans)).block(
        Block::default()
            .borders(Borders::ALL)
            .title("playrun (? help, q quit)"),
    );
    f.render_widget(p, area);
}
