mod export;
mod help;
mod state;

use crate::bridge::ExecutionBridge;
use crate::capability::{preprocess, Capabilities};
use crate::cli::{build_config, Cli, SAMPLE_TEXT};
use crate::model::{AppEvent, Prediction, TaskKind};
use crate::orchestrator::{AppContext, RunStatus, TaskOrchestrator, MAX_TEXT_CHARS};
use crate::storage::{self, Settings};
use anyhow::{Context, Result};
use crossterm::{
    event::{
        self, DisableBracketedPaste, EnableBracketedPaste, Event, KeyCode, KeyEventKind,
        KeyModifiers,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Tabs, Wrap},
    Terminal,
};
use state::{label_color, Tab, UiState, LANGUAGES};
use std::{
    io,
    path::{Path, PathBuf},
    time::Duration,
    time::Instant,
};
use tokio::sync::mpsc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

const SPINNER: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

pub async fn run(args: Cli) -> Result<()> {
    // Worker outcomes reach the UI thread through this channel; unbounded so workers never block.
    let (event_tx, event_rx) = mpsc::unbounded_channel::<AppEvent>();

    // TUI runs in a dedicated thread to keep all blocking I/O out of the Tokio runtime.
    let ui_handle = std::thread::Builder::new()
        .name("ui".into())
        .spawn(move || run_threaded(args, event_tx, event_rx))
        .context("spawn ui thread")?;

    match tokio::task::spawn_blocking(move || ui_handle.join()).await {
        Ok(Ok(res)) => res,
        Ok(Err(_)) => Err(anyhow::anyhow!("TUI thread panicked")),
        Err(e) => Err(anyhow::anyhow!("TUI join failed: {e}")),
    }
}

fn build_state(args: &Cli, event_tx: UnboundedSender<AppEvent>) -> UiState {
    let settings = Settings::load();
    let cfg = build_config(args, &settings);
    let capabilities = Capabilities::from_config(&cfg);
    let caption = TaskOrchestrator::new(
        TaskKind::ImageCaption,
        capabilities.get(TaskKind::ImageCaption),
        event_tx.clone(),
    );
    let sentiment = TaskOrchestrator::new(
        TaskKind::Sentiment,
        capabilities.get(TaskKind::Sentiment),
        event_tx.clone(),
    );

    let mut state = UiState::new(
        AppContext::new(cfg.save_history),
        caption,
        sentiment,
        event_tx,
    );
    state.settings = settings;
    state.settings_path = storage::settings_path();
    state.set_cache_dir(cfg.cache_dir.clone());
    if let Some(lang) = cfg.language.as_deref() {
        match LANGUAGES.iter().position(|l| l.eq_ignore_ascii_case(lang)) {
            Some(i) => state.language_idx = i,
            None if lang.eq_ignore_ascii_case("auto") => {}
            None => {
                let line = state
                    .ctx
                    .log(&format!("Unknown language '{lang}', using auto-detect"));
                state.info = line;
            }
        }
    }
    let lang = state.language();
    state.sentiment.orchestrator.set_language(lang);
    if state.info.is_empty() {
        state.info = state.ctx.log("Ready");
    }
    state
}

/// Run the TUI loop on a dedicated thread.
///
/// All UI state lives here. Worker threads never touch it; they post `AppEvent`s that are
/// drained at the top of every loop iteration.
pub fn run_threaded(
    args: Cli,
    event_tx: UnboundedSender<AppEvent>,
    mut event_rx: UnboundedReceiver<AppEvent>,
) -> Result<()> {
    let bridge = ExecutionBridge::new();
    let mut state = build_state(&args, event_tx);
    spawn_cache_scan(&state);

    // Worker panics would otherwise be printed over the alternate screen.
    let panic_guard = crate::logging::PanicLogGuard::install();
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableBracketedPaste).ok();

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;
    terminal.clear().ok();

    let tick_rate = Duration::from_millis(100);
    let mut last_tick = Instant::now();

    let res = loop {
        // Drain outcomes without blocking to keep the UI responsive.
        while let Ok(ev) = event_rx.try_recv() {
            apply_event(&mut state, ev);
        }

        if last_tick.elapsed() >= tick_rate {
            state.spinner = state.spinner.wrapping_add(1);
            terminal.draw(|f| draw(f.area(), f, &state)).ok();
            last_tick = Instant::now();
        }

        // Poll input with a short timeout to avoid blocking the render loop.
        if event::poll(Duration::from_millis(10)).unwrap_or(false) {
            match event::read() {
                Ok(Event::Key(k)) if k.kind == KeyEventKind::Press => {
                    if handle_key(&mut state, &bridge, k.modifiers, k.code) == Flow::Quit {
                        break Ok(());
                    }
                }
                Ok(Event::Paste(text)) => handle_paste(&mut state, &text),
                _ => {}
            }
        }
    };

    tracing::info!(workers = bridge.spawned(), "ui loop finished");
    disable_raw_mode().ok();
    let mut stdout = io::stdout();
    execute!(stdout, DisableBracketedPaste, LeaveAlternateScreen).ok();
    drop(panic_guard);
    res
}

fn apply_event(state: &mut UiState, ev: AppEvent) {
    match ev {
        AppEvent::Finished { task, id, outcome } => {
            let ok = outcome.is_success();
            let UiState {
                ctx,
                caption,
                sentiment,
                info,
                ..
            } = state;
            let page = match task {
                TaskKind::ImageCaption => caption,
                TaskKind::Sentiment => sentiment,
            };
            let delivered = page.orchestrator.deliver(id, outcome, ctx, &mut page.view);
            if delivered {
                *info = if ok {
                    format!("{} done", task.title())
                } else {
                    format!("{} failed", task.title())
                };
            }
            // Caption results are persisted under the cache folder.
            if delivered && ok && task == TaskKind::ImageCaption {
                spawn_cache_scan(state);
            }
        }
        AppEvent::Info(msg) => state.info = msg,
        AppEvent::CacheSize { root, bytes } => {
            // Scans of a folder that is no longer selected are stale.
            if root == state.cache_dir {
                state.cache_bytes = Some(bytes);
            }
        }
    }
}

/// Measure the cache folder off the UI thread; the total arrives as `AppEvent::CacheSize`.
fn spawn_cache_scan(state: &UiState) {
    let root = state.cache_dir.clone();
    let events = state.events.clone();
    let spawned = std::thread::Builder::new()
        .name("cache-scan".into())
        .spawn(move || {
            let bytes = storage::cache_size(&root);
            let _ = events.send(AppEvent::CacheSize { root, bytes });
        });
    if let Err(e) = spawned {
        tracing::warn!(error = %e, "could not start cache scan");
    }
}

fn spawn_cache_clear(state: &mut UiState) {
    let root = state.cache_dir.clone();
    let events = state.events.clone();
    let spawned = std::thread::Builder::new()
        .name("cache-clear".into())
        .spawn(move || {
            let msg = match storage::clear_cache(&root) {
                Ok(0) => "Cache already empty".to_string(),
                Ok(n) => format!("Cleared {n} cache entries from {}", root.display()),
                Err(e) => format!("Error: Clear cache failed: {e:#}"),
            };
            let _ = events.send(AppEvent::Info(msg));
            let bytes = storage::cache_size(&root);
            let _ = events.send(AppEvent::CacheSize { root, bytes });
        });
    state.info = match spawned {
        Ok(_) => format!("Clearing {}…", state.cache_dir.display()),
        Err(e) => format!("Error: could not start cache clear: {e}"),
    };
}

fn handle_key(
    state: &mut UiState,
    bridge: &ExecutionBridge,
    mods: KeyModifiers,
    code: KeyCode,
) -> Flow {
    let ctrl = mods.contains(KeyModifiers::CONTROL);
    match (ctrl, code) {
        (_, KeyCode::Esc) | (true, KeyCode::Char('c')) => return Flow::Quit,
        (_, KeyCode::Tab) => state.tab = state.tab.next(),
        (_, KeyCode::BackTab) => state.tab = state.tab.prev(),
        (_, KeyCode::F(1)) => state.tab = Tab::Help,
        (true, KeyCode::Char('t')) => {
            state.ctx.save_history = !state.ctx.save_history;
            state.info = if state.ctx.save_history {
                "Saving to history".into()
            } else {
                "Not saving to history".into()
            };
        }
        _ => match (state.tab, state.tab.task()) {
            (_, Some(task)) => handle_task_key(state, bridge, task, ctrl, code),
            (Tab::History, None) => handle_history_key(state, code),
            (Tab::Log, None) => handle_log_key(state, code),
            (Tab::Settings, None) => handle_settings_key(state, ctrl, code),
            _ => {}
        },
    }
    Flow::Continue
}

fn handle_task_key(
    state: &mut UiState,
    bridge: &ExecutionBridge,
    task: TaskKind,
    ctrl: bool,
    code: KeyCode,
) {
    match (ctrl, code) {
        (false, KeyCode::Enter) => trigger_run(state, bridge, task),
        (true, KeyCode::Char('u')) => use_sample(state, task),
        (true, KeyCode::Char('l')) if task == TaskKind::Sentiment => {
            state.cycle_language();
            state.info = format!("Language: {}", LANGUAGES[state.language_idx]);
        }
        (true, KeyCode::Char('x')) => {
            match task {
                TaskKind::ImageCaption => {
                    state.image_path.clear();
                    state.sample_image = None;
                }
                TaskKind::Sentiment => state.text.clear(),
            }
            state.page_mut(task).view.clear();
            state.info = "Cleared".into();
        }
        (true, KeyCode::Char('y')) => copy_result(state, task),
        (false, KeyCode::Backspace) => match task {
            TaskKind::ImageCaption => {
                state.sample_image = None;
                state.image_path.pop();
            }
            TaskKind::Sentiment => {
                state.text.pop();
            }
        },
        (false, KeyCode::Char(c)) => match task {
            TaskKind::ImageCaption => state.push_path(c.encode_utf8(&mut [0; 4])),
            TaskKind::Sentiment => state.push_text(c.encode_utf8(&mut [0; 4])),
        },
        _ => {}
    }
}

fn handle_paste(state: &mut UiState, text: &str) {
    match state.tab.task() {
        Some(TaskKind::ImageCaption) => state.push_path(text.trim()),
        Some(TaskKind::Sentiment) => {
            let before = state.text.chars().count();
            state.push_text(text);
            let added = state.text.chars().count() - before;
            if added < text.chars().count() {
                state.info = format!("Input truncated to {MAX_TEXT_CHARS} characters");
            }
        }
        None if state.tab == Tab::Settings => state.cache_input.push_str(text.trim()),
        None => {}
    }
}

fn trigger_run(state: &mut UiState, bridge: &ExecutionBridge, task: TaskKind) {
    let input = state.current_input(task);
    let label = state.input_label(task);
    let UiState {
        ctx,
        caption,
        sentiment,
        info,
        ..
    } = state;
    let page = match task {
        TaskKind::ImageCaption => caption,
        TaskKind::Sentiment => sentiment,
    };
    if !page.orchestrator.is_running() {
        page.view.pending_input = label;
    }
    *info = match page.orchestrator.run(input, bridge, ctx, &mut page.view) {
        RunStatus::Submitted(id) => format!("{} running ({id})…", task.title()),
        RunStatus::Busy => format!("{} is already running", task.title()),
        RunStatus::Rejected(e) => format!("Error: {e}"),
    };
}

fn use_sample(state: &mut UiState, task: TaskKind) {
    match task {
        TaskKind::ImageCaption => {
            let asset = Path::new("assets").join("sample.jpg");
            if asset.is_file() {
                state.sample_image = None;
                state.image_path = asset.display().to_string();
                state.info = format!("Using sample image {}", asset.display());
                return;
            }
            match preprocess::sample_image() {
                Ok(png) => {
                    state.sample_image = Some(png);
                    state.image_path.clear();
                    state.info = format!(
                        "Using generated sample image ({}×{})",
                        preprocess::SAMPLE_WIDTH,
                        preprocess::SAMPLE_HEIGHT
                    );
                }
                Err(e) => state.info = format!("Sample image failed: {e:#}"),
            }
        }
        TaskKind::Sentiment => {
            state.text = SAMPLE_TEXT.to_string();
            state.info = "Sample text loaded".into();
        }
    }
}

fn copy_result(state: &mut UiState, task: TaskKind) {
    let view = &state.page(task).view;
    let Some(result) = view.result.as_ref() else {
        state.info = "No result to copy yet".into();
        return;
    };
    let text = crate::text_summary::clipboard_text(&view.result_input, result);
    state.info = match export::copy_to_clipboard(&text) {
        Ok(()) => "✓ Copied result to clipboard".into(),
        Err(e) => format!("Clipboard copy failed: {e:#}"),
    };
}

/// History is shown newest first; map the selected row to a history index.
fn selected_history_index(state: &UiState) -> Option<usize> {
    let len = state.ctx.history.len();
    (state.history_selected < len).then(|| len - 1 - state.history_selected)
}

fn handle_history_key(state: &mut UiState, code: KeyCode) {
    match code {
        KeyCode::Up | KeyCode::Char('k') => {
            state.history_selected = state.history_selected.saturating_sub(1);
        }
        KeyCode::Down | KeyCode::Char('j') => {
            if state.history_selected + 1 < state.ctx.history.len() {
                state.history_selected += 1;
            }
        }
        KeyCode::Enter => {
            let Some(idx) = selected_history_index(state) else {
                return;
            };
            let entry = state.ctx.history[idx].clone();
            let page = state.page_mut(entry.task);
            if page.orchestrator.is_running() {
                state.info = format!("{} is running; try again when it finishes", entry.task.title());
                return;
            }
            page.view.clear();
            page.view.result = Some(entry.prediction);
            page.view.result_input = entry.input;
            state.tab = match entry.task {
                TaskKind::ImageCaption => Tab::Caption,
                TaskKind::Sentiment => Tab::Sentiment,
            };
        }
        KeyCode::Char('e') => {
            let Some(idx) = selected_history_index(state) else {
                return;
            };
            match export::export_entry_json(&state.ctx.history[idx]) {
                Ok(p) => {
                    state.last_exported_path = Some(p.to_string_lossy().to_string());
                    state.info = format!("Exported JSON: {} (press 'y' to copy path)", p.display());
                }
                Err(e) => state.info = format!("JSON export failed: {e:#}"),
            }
        }
        KeyCode::Char('y') => {
            if let Some(ref path) = state.last_exported_path {
                state.info = match export::copy_to_clipboard(path) {
                    Ok(()) => format!("✓ Copied to clipboard: {path}"),
                    Err(e) => format!("Clipboard copy failed: {e:#}"),
                };
            } else {
                state.info = "No exported file path to copy. Export a file first (e)".into();
            }
        }
        KeyCode::Char('d') => {
            if let Some(idx) = selected_history_index(state) {
                state.ctx.history.remove(idx);
                state.history_clamp();
                state.info = "Deleted".into();
            }
        }
        _ => {}
    }
}

fn handle_log_key(state: &mut UiState, code: KeyCode) {
    match code {
        KeyCode::Up | KeyCode::Char('k') => {
            if state.log_scroll + 1 < state.ctx.log.len() {
                state.log_scroll += 1;
            }
        }
        KeyCode::Down | KeyCode::Char('j') => {
            state.log_scroll = state.log_scroll.saturating_sub(1);
        }
        KeyCode::Char('c') => {
            state.ctx.log.clear();
            state.log_scroll = 0;
            state.info = "Log cleared".into();
        }
        _ => {}
    }
}

fn handle_settings_key(state: &mut UiState, ctrl: bool, code: KeyCode) {
    match (ctrl, code) {
        (false, KeyCode::Enter) | (true, KeyCode::Char('s')) => save_cache_dir(state),
        (true, KeyCode::Char('r')) => {
            state.cache_input = state.cache_dir.display().to_string();
            state.info = "Reverted".into();
        }
        (true, KeyCode::Char('d')) => {
            state.cache_input = storage::default_cache_dir().display().to_string();
            state.info = "Default cache folder; press Enter to save".into();
        }
        (true, KeyCode::Char('k')) => spawn_cache_clear(state),
        (false, KeyCode::Backspace) => {
            state.cache_input.pop();
        }
        (false, KeyCode::Char(c)) if !c.is_control() => state.cache_input.push(c),
        _ => {}
    }
}

fn save_cache_dir(state: &mut UiState) {
    let input = state.cache_input.trim();
    if input.is_empty() {
        state.info = "Error: Cache folder cannot be empty".into();
        return;
    }
    let dir = PathBuf::from(input);
    let mut settings = state.settings.clone();
    settings.cache_dir = Some(dir.clone());
    let Some(path) = state.settings_path.clone() else {
        state.info = "Error: no config directory to save settings in".into();
        return;
    };
    match settings.save_to(&path) {
        Ok(()) => {
            tracing::info!(cache_dir = %dir.display(), settings = %path.display(), "settings saved");
            state.settings = settings;
            state.info = format!(
                "Saved cache folder {}; persisted results move there on restart",
                dir.display()
            );
            state.set_cache_dir(dir);
            spawn_cache_scan(state);
        }
        Err(e) => state.info = format!("Error: {e:#}"),
    }
}

fn draw(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(5),
            Constraint::Length(3),
        ])
        .split(area);

    let titles: Vec<Line> = Tab::ALL.iter().map(|t| Line::from(t.title())).collect();
    let tabs = Tabs::new(titles)
        .select(state.tab.index())
        .block(Block::default().borders(Borders::ALL).title("inference-studio"))
        .highlight_style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        );
    f.render_widget(tabs, chunks[0]);

    match state.tab {
        Tab::Caption => draw_task(chunks[1], f, state, TaskKind::ImageCaption),
        Tab::Sentiment => draw_task(chunks[1], f, state, TaskKind::Sentiment),
        Tab::History => draw_history(chunks[1], f, state),
        Tab::Log => draw_log(chunks[1], f, state),
        Tab::Settings => draw_settings(chunks[1], f, state),
        Tab::Help => {
            let models = [
                (
                    TaskKind::ImageCaption,
                    state.caption.orchestrator.capability_info(),
                ),
                (
                    TaskKind::Sentiment,
                    state.sentiment.orchestrator.capability_info(),
                ),
            ];
            help::draw_help(chunks[1], f, &models, state.ctx.last_error.as_deref());
        }
    }

    draw_status(chunks[2], f, state);
}

fn draw_status(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let mut spans = Vec::new();
    for task in [TaskKind::ImageCaption, TaskKind::Sentiment] {
        if state.page(task).view.running {
            spans.push(Span::styled(
                format!("{} {}  ", SPINNER[state.spinner % SPINNER.len()], task.title()),
                Style::default().fg(Color::Cyan),
            ));
        }
    }
    let info_style = if state.info.starts_with("Error") {
        Style::default().fg(Color::Red)
    } else {
        Style::default()
    };
    spans.push(Span::styled(state.info.clone(), info_style));
    let cache = state
        .cache_bytes
        .map(storage::format_bytes)
        .unwrap_or_else(|| "…".into());
    let title = format!(
        "Status · history {} · cache {cache}",
        if state.ctx.save_history { "on" } else { "off" }
    );
    let p = Paragraph::new(Line::from(spans))
        .block(Block::default().borders(Borders::ALL).title(title));
    f.render_widget(p, area);
}

fn draw_task(area: Rect, f: &mut ratatui::Frame, state: &UiState, task: TaskKind) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
        .split(area);

    let dim = Style::default().fg(Color::Gray);
    let (title, lines) = match task {
        TaskKind::ImageCaption => {
            let source = if state.sample_image.is_some() {
                Span::styled(
                    format!(
                        "<generated sample {}×{}>",
                        preprocess::SAMPLE_WIDTH,
                        preprocess::SAMPLE_HEIGHT
                    ),
                    Style::default().fg(Color::Cyan),
                )
            } else if state.image_path.is_empty() {
                Span::styled("type or paste an image path, Ctrl-U for a sample", dim)
            } else {
                Span::raw(state.image_path.clone())
            };
            (
                "Image".to_string(),
                vec![
                    Line::from(vec![Span::styled("Path: ", dim), source]),
                    Line::from(""),
                    Line::from(Span::styled("PNG, JPG, JPEG or BMP, up to 25 MB", dim)),
                ],
            )
        }
        TaskKind::Sentiment => {
            let body = if state.text.is_empty() {
                Line::from(Span::styled(
                    format!("Type or paste text here, up to {MAX_TEXT_CHARS} characters"),
                    dim,
                ))
            } else {
                Line::from(state.text.clone())
            };
            (
                format!(
                    "Text {}/{} · {}",
                    state.text.chars().count(),
                    MAX_TEXT_CHARS,
                    LANGUAGES[state.language_idx]
                ),
                vec![body],
            )
        }
    };
    let input = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title(title));
    f.render_widget(input, cols[0]);

    let page = state.page(task);
    let view = &page.view;
    let mut out: Vec<Line> = Vec::new();
    if view.running {
        let secs = view
            .running_since
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        out.push(Line::from(Span::styled(
            format!("{} Processing… {:.1}s", SPINNER[state.spinner % SPINNER.len()], secs),
            Style::default().fg(Color::Cyan),
        )));
    } else if let Some(err) = view.error.as_deref() {
        out.push(Line::from(Span::styled(
            format!("Error: {err}"),
            Style::default().fg(Color::Red),
        )));
    } else if let Some(result) = view.result.as_ref() {
        out.extend(result_lines(result, &view.result_input, view.show_check()));
    } else {
        out.push(Line::from(Span::styled("Press Enter to run", dim)));
    }

    let info = page.orchestrator.capability_info();
    out.push(Line::from(""));
    out.push(Line::from(Span::styled(view.status.clone(), dim)));
    out.push(Line::from(Span::styled(
        format!(
            "Model: {} ({})",
            info.model_name,
            if info.loaded { "loaded" } else { "loads on first run" }
        ),
        dim,
    )));

    let output = Paragraph::new(out)
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title(task.title()));
    f.render_widget(output, cols[1]);
}

fn score_bar(score: f64, width: usize) -> String {
    let filled = ((score.clamp(0.0, 1.0) * width as f64).round() as usize).min(width);
    format!("{}{}", "█".repeat(filled), "░".repeat(width - filled))
}

fn result_lines(result: &Prediction, input: &str, check: bool) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    let tick = if check {
        Span::styled("  ✔", Style::default().fg(Color::Green))
    } else {
        Span::raw("")
    };
    match result {
        Prediction::Captions(captions) => {
            lines.push(Line::from(vec![
                Span::styled("Caption:", Style::default().add_modifier(Modifier::BOLD)),
                tick,
            ]));
            if let Some(c) = captions.first() {
                lines.push(Line::from(c.generated_text.clone()));
            }
            if !input.is_empty() {
                lines.push(Line::from(Span::styled(
                    format!("Image: {input}"),
                    Style::default().fg(Color::Gray),
                )));
            }
        }
        Prediction::Labels(labels) => {
            if let Some(top) = labels.first() {
                lines.push(Line::from(vec![
                    Span::styled(
                        format!(" {} ", top.label),
                        Style::default()
                            .fg(Color::Black)
                            .bg(label_color(&top.label))
                            .add_modifier(Modifier::BOLD),
                    ),
                    tick,
                ]));
                lines.push(Line::from(format!(
                    "Score: {:.2}  {}",
                    top.score,
                    score_bar(top.score, 20)
                )));
            }
            for l in labels.iter().skip(1) {
                lines.push(Line::from(Span::styled(
                    format!("  {:<16} {:.3}", l.label, l.score),
                    Style::default().fg(Color::Gray),
                )));
            }
            if !input.is_empty() {
                lines.push(Line::from(""));
                lines.push(Line::from(input.to_string()));
            }
        }
    }
    lines
}

fn draw_history(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(area);

    let items: Vec<ListItem> = state
        .ctx
        .history
        .iter()
        .rev()
        .map(|h| {
            let time = h
                .timestamp_utc
                .split('T')
                .nth(1)
                .map(|t| t.trim_end_matches('Z').chars().take(8).collect::<String>())
                .unwrap_or_else(|| h.timestamp_utc.clone());
            ListItem::new(format!("{time}  {}", h.task.title()))
        })
        .collect();
    let title = format!("History ({})", state.ctx.history.len());
    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(title))
        .highlight_style(Style::default().fg(Color::Black).bg(Color::Yellow));
    let mut list_state =
        ListState::default().with_selected((!state.ctx.history.is_empty()).then_some(state.history_selected));
    f.render_stateful_widget(list, cols[0], &mut list_state);

    let detail = selected_history_index(state)
        .and_then(|i| serde_json::to_string_pretty(&state.ctx.history[i]).ok())
        .unwrap_or_else(|| "No runs yet. Completed runs show up here.".into());
    let p = Paragraph::new(detail)
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title("Details"));
    f.render_widget(p, cols[1]);
}

fn draw_log(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let height = area.height.saturating_sub(2) as usize;
    let total = state.ctx.log.len();
    let end = total.saturating_sub(state.log_scroll);
    let start = end.saturating_sub(height);
    let lines: Vec<Line> = state
        .ctx
        .log
        .lines()
        .skip(start)
        .take(end - start)
        .map(|l| {
            let style = if l.contains("] Error: ") {
                Style::default().fg(Color::Red)
            } else {
                Style::default()
            };
            Line::from(Span::styled(l.to_string(), style))
        })
        .collect();
    let title = format!("Log ({total}/{})", crate::orchestrator::LOG_CAPACITY);
    let p = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(title));
    f.render_widget(p, area);
}

fn draw_settings(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let dim = Style::default().fg(Color::Gray);
    let size = state
        .cache_bytes
        .map(storage::format_bytes)
        .unwrap_or_else(|| "measuring…".into());
    let saved = state
        .settings
        .cache_dir
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "not saved, using default".into());
    let lines = vec![
        Line::from(vec![
            Span::styled("Cache folder: ", dim),
            Span::raw(state.cache_input.clone()),
            Span::styled("▏", Style::default().fg(Color::Yellow)),
        ]),
        Line::from(vec![
            Span::styled("In use:       ", dim),
            Span::raw(state.cache_dir.display().to_string()),
        ]),
        Line::from(vec![Span::styled("Saved:        ", dim), Span::raw(saved)]),
        Line::from(vec![Span::styled("Model files:  ", dim), Span::raw(size)]),
        Line::from(""),
        Line::from(Span::styled(
            "Enter/Ctrl-S save · Ctrl-R revert · Ctrl-D default · Ctrl-K clear cache",
            dim,
        )),
    ];
    let p = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title("Settings"));
    f.render_widget(p, area);
}
