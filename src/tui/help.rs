use ratatui::{
    layout::Rect,
    style::Color,
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

fn keybind(key: &'static str, pad: usize, what: &'static str) -> Line<'static> {
    Line::from(vec![
        Span::raw("  "),
        Span::styled(key, Style::default().fg(Color::Magenta)),
        Span::raw(format!("{:pad$}{what}", "")),
    ])
}

pub fn draw_help(area: Rect, f: &mut Frame) {
    let p = Paragraph::new(vec![
        Line::from("Keybinds:"),
        Line::from(vec![
            Span::raw("  "),
            Span::styled("q", Style::default().fg(Color::Magenta)),
            Span::raw(" / "),
            Span::styled("Ctrl-C", Style::default().fg(Color::Magenta)),
            Span::raw("  Quit"),
        ]),
        Line::from(vec![
            Span::raw("  "),
            Span::styled("↑/↓", Style::default().fg(Color::Magenta)),
            Span::raw(" or "),
            Span::styled("j/k", Style::default().fg(Color::Magenta)),
            Span::raw("  Select item"),
        ]),
        keybind("Enter", 7, "Open panel"),
        keybind("Esc", 9, "Close panel / finish editing"),
        keybind("?", 11, "Toggle this help"),
        Line::from(""),
        Line::from("Panel:"),
        keybind("←/→", 9, "Change starting status"),
        keybind("n", 11, "Edit note"),
        keybind("c", 11, "Edit score (running session)"),
        keybind("s", 11, "Start cycle and session"),
        keybind("x", 11, "Stop session"),
        keybind("r", 11, "Reload state (refresh items when closed)"),
        keybind("d", 11, "Create default statuses (when none exist)"),
    ])
    .block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(p, area);
}
