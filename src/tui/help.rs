use crate::model::{CapabilityInfo, TaskKind};
use ratatui::{
    layout::Rect,
    style::Color,
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};

fn key(k: &'static str, pad: usize, what: &'static str) -> Line<'static> {
    Line::from(vec![
        Span::raw("  "),
        Span::styled(k, Style::default().fg(Color::Magenta)),
        Span::raw(" ".repeat(pad)),
        Span::raw(what),
    ])
}

pub fn draw_help(
    area: Rect,
    f: &mut Frame,
    models: &[(TaskKind, CapabilityInfo)],
    last_error: Option<&str>,
) {
    let mut lines = vec![
        Line::from("Keybinds:"),
        key("Esc", 9, "/ Ctrl-C  Quit"),
        key("Tab", 9, "Next tab (Shift-Tab: previous)"),
        key("Enter", 7, "Run the current task"),
        key("Ctrl-U", 6, "Use sample input"),
        key("Ctrl-L", 6, "Cycle language hint (sentiment)"),
        key("Ctrl-X", 6, "Clear input and output"),
        key("Ctrl-Y", 6, "Copy result to clipboard"),
        key("Ctrl-T", 6, "Toggle saving to history"),
        key("F1", 10, "Show this help"),
        Line::from(""),
        Line::from("History tab:"),
        key("↑/↓", 9, "Navigate"),
        key("Enter", 7, "Open selected result"),
        key("e", 11, "Export selected as JSON"),
        key("y", 11, "Copy exported path to clipboard"),
        key("d", 11, "Delete selected"),
        Line::from(""),
        Line::from("Log tab:"),
        key("↑/↓", 9, "Scroll"),
        key("c", 11, "Clear log"),
        Line::from(""),
        Line::from("Settings tab:"),
        key("Enter", 7, "/ Ctrl-S  Save cache folder"),
        key("Ctrl-R", 6, "Revert unsaved edit"),
        key("Ctrl-D", 6, "Fill in the default folder"),
        key("Ctrl-K", 6, "Clear model cache"),
        Line::from(""),
        Line::from("Models:"),
    ];

    for (task, info) in models {
        let timing = info
            .last_time
            .map(|d| format!("last run {} ms", d.as_millis()))
            .unwrap_or_else(|| "not run yet".into());
        lines.push(Line::from(vec![
            Span::raw("  "),
            Span::styled(task.title(), Style::default().fg(Color::Cyan)),
            Span::raw(format!(
                "  {}  ({}, {})",
                info.model_name,
                if info.loaded { "loaded" } else { "not loaded" },
                timing
            )),
        ]));
    }

    if let Some(err) = last_error {
        lines.push(Line::from(""));
        lines.push(Line::from("Last error:"));
        lines.push(Line::from(Span::styled(
            format!("  {err}"),
            Style::default().fg(Color::Red),
        )));
    }

    let p = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(p, area);
}
