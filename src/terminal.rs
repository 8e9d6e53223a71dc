use anyhow::Context;
use crossterm::{
    ExecutableCommand, QueueableCommand, cursor,
    style::Print,
    terminal::{self, ClearType},
};
use std::io::{Stdout, Write, stdout};

/// Raw mode plus alternate screen for as long as the guard lives.
pub struct TerminalGuard {
    _private: (),
}

impl TerminalGuard {
    pub fn new() -> anyhow::Result<Self> {
        terminal::enable_raw_mode().context("enable raw mode")?;
        // Guard first, so Drop restores the terminal if a later step fails.
        let guard = Self { _private: () };

        let mut out = stdout();
        out.execute(terminal::EnterAlternateScreen)
            .context("enter alternate screen")?;
        out.execute(terminal::Clear(ClearType::All))
            .context("clear screen")?;
        out.execute(cursor::Hide).context("hide cursor")?;

        Ok(guard)
    }

    pub fn stdout() -> Stdout {
        stdout()
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
        let mut out = stdout();
        let _ = out.write_all(b"\x1b[0m");
        let _ = out.flush();
        let _ = out.execute(cursor::Show);
        let _ = out.execute(terminal::LeaveAlternateScreen);
    }
}

/// Redraws the whole screen from `lines`, clipped to the terminal size.
pub fn draw_lines<W: Write>(out: &mut W, lines: &[String], size: (u16, u16)) -> anyhow::Result<()> {
    let (cols, rows) = (usize::from(size.0), usize::from(size.1));
    for row in 0..rows {
        out.queue(cursor::MoveTo(0, row as u16))?;
        out.queue(terminal::Clear(ClearType::CurrentLine))?;
        if let Some(line) = lines.get(row) {
            out.queue(Print(truncate_for_width(line, cols)))?;
        }
    }
    out.flush().context("flush terminal")?;
    Ok(())
}

pub fn truncate_for_width(s: &str, width: usize) -> String {
    if width == 0 {
        return String::new();
    }
    let count = s.chars().count();
    if count <= width {
        return s.to_string();
    }
    let mut out: String = s.chars().take(width.saturating_sub(1)).collect();
    out.push('~');
    out
}
