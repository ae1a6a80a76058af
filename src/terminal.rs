use {
    crate::{
        screen::LAUNCH_TITLE,
        top::{Renderer, Stimulus, StimulusSource},
    },
    crossterm::{
        event::{self, Event},
        execute,
        terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
    },
    ratatui::{
        Terminal,
        backend::CrosstermBackend,
        style::{Color, Modifier, Style},
        text::Line,
        widgets::Paragraph,
    },
    std::{
        io::{self, IsTerminal, Stdout},
        time::{Duration, Instant},
    },
    tracing::warn,
};

/// `(rows, columns)` to use when the terminal won't say.
pub const DEFAULT_SIZE: (usize, usize) = (24, 80);

/// the `(rows, columns)` of the terminal on stdout, or `None` if stdout is not a terminal.
pub fn window_size() -> Option<(usize, usize)> {
    if !io::stdout().is_terminal() {
        return None;
    }
    crossterm::terminal::size()
        .ok()
        .map(|(columns, rows)| (usize::from(rows), usize::from(columns)))
}

// === impl TerminalEvents ===

/// key presses and resizes from the terminal, polled without blocking the tick.
pub struct TerminalEvents {
    poll_interval: Duration,
}

impl TerminalEvents {
    pub fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }
}

impl StimulusSource for TerminalEvents {
    fn next(&mut self, deadline: Instant) -> io::Result<Stimulus> {
        loop {
            let now = Instant::now();
            if now >= deadline {
                return Ok(Stimulus::Tick);
            }

            let timeout = (deadline - now).min(self.poll_interval);
            if !event::poll(timeout)? {
                continue;
            }

            match event::read()? {
                Event::Key(key) => return Ok(Stimulus::Key(key)),
                Event::Resize(columns, rows) => return Ok(Stimulus::Resize { columns, rows }),
                _ => {}
            }
        }
    }
}

// === impl TerminalRenderer ===

/// draws frames on the alternate screen, in raw mode.
pub struct TerminalRenderer {
    terminal: Terminal<CrosstermBackend<Stdout>>,
    raw: bool,
    alternate: bool,
    restored: bool,
}

impl TerminalRenderer {
    /// takes over the terminal. it is given back by [`Renderer::restore`], or on drop.
    ///
    /// without raw mode or the alternate screen this still draws, just less nicely. if no
    /// renderer can be made, whatever was changed is changed back before returning.
    pub fn enter() -> io::Result<Self> {
        // without raw mode keys arrive a line at a time.
        let raw = match enable_raw_mode() {
            Ok(()) => true,
            Err(error) => {
                warn!(%error, "could not enable raw mode");
                false
            }
        };

        let mut stdout = io::stdout();
        let alternate = match execute!(stdout, EnterAlternateScreen) {
            Ok(()) => true,
            Err(error) => {
                warn!(%error, "could not switch to the alternate screen");
                false
            }
        };

        let terminal = or_undo(Terminal::new(CrosstermBackend::new(stdout)), || {
            leave(raw, alternate)
        })?;

        Ok(Self {
            terminal,
            raw,
            alternate,
            restored: false,
        })
    }

    fn style(index: usize, line: &str) -> Style {
        if index == 0 {
            return Style::default()
                .fg(Color::Black)
                .bg(Color::Gray)
                .add_modifier(Modifier::BOLD);
        }
        if line == LAUNCH_TITLE || line.trim_start().starts_with("PID COMMAND") {
            return Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD);
        }
        if line.starts_with("  ") && line.contains(" -> ") {
            return Style::default().fg(Color::Cyan);
        }
        Style::default()
    }
}

impl Renderer for TerminalRenderer {
    fn size(&mut self) -> io::Result<(usize, usize)> {
        let (columns, rows) = crossterm::terminal::size()?;
        Ok((usize::from(rows), usize::from(columns)))
    }

    fn draw(&mut self, lines: &[String], _columns: usize) -> io::Result<()> {
        let text = lines
            .iter()
            .enumerate()
            .map(|(i, line)| Line::styled(line.as_str(), Self::style(i, line)))
            .collect::<Vec<_>>();

        self.terminal.draw(|f| {
            f.render_widget(Paragraph::new(text), f.area());
        })?;

        Ok(())
    }

    fn restore(&mut self) -> io::Result<()> {
        if std::mem::replace(&mut self.restored, true) {
            return Ok(());
        }

        if self.raw {
            disable_raw_mode()?;
        }
        if self.alternate {
            execute!(self.terminal.backend_mut(), LeaveAlternateScreen)?;
        }
        self.terminal.show_cursor()?;

        Ok(())
    }
}

impl Drop for TerminalRenderer {
    fn drop(&mut self) {
        let _ = self.restore();
    }
}

/// undoes what [`TerminalRenderer::enter`] managed before it failed.
fn leave(raw: bool, alternate: bool) {
    if alternate {
        if let Err(error) = execute!(io::stdout(), LeaveAlternateScreen) {
            warn!(%error, "could not leave the alternate screen");
        }
    }
    if raw {
        if let Err(error) = disable_raw_mode() {
            warn!(%error, "could not disable raw mode");
        }
    }
}

/// runs `undo` if `result` is an error, then hands the result on.
fn or_undo<T>(result: io::Result<T>, undo: impl FnOnce()) -> io::Result<T> {
    if result.is_err() {
        undo();
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_setup_is_undone() {
        let mut undone = false;
        let result = or_undo::<()>(Err(io::Error::other("no tty")), || undone = true);
        assert!(result.is_err());
        assert!(undone);
    }

    #[test]
    fn successful_setup_is_kept() {
        let mut undone = false;
        assert_eq!(or_undo(Ok(7), || undone = true).unwrap(), 7);
        assert!(!undone);
    }

    #[test]
    fn header_and_headings_stand_out() {
        let plain = Style::default();
        assert_ne!(TerminalRenderer::style(0, "sysload: n/a"), plain);
        assert_ne!(TerminalRenderer::style(3, LAUNCH_TITLE), plain);
        assert_ne!(TerminalRenderer::style(9, "PID COMMAND USERNAME CPU RAM COMMANDLINE"), plain);
        assert_eq!(TerminalRenderer::style(9, "  12 bash root 0.1s 1% -bash"), plain);
    }
}
