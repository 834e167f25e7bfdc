use crate::canvas::GridPos;
use crossterm::cursor::{Hide, MoveTo, Show};
use crossterm::style::Print;
use crossterm::terminal::{
    self, disable_raw_mode, enable_raw_mode, Clear, ClearType, EnterAlternateScreen,
    LeaveAlternateScreen,
};
use crossterm::{execute, queue};
use std::io::{self, Write};

pub const WRITER_GLYPH: char = 'O';
pub const MIRROR_GLYPH: char = '0';

/// The terminal side of a worker's local rendering: one glyph per marker cell plus a status
/// line underneath the grid.
pub struct TerminalView<W: Write> {
    output: W,
    glyph: char,
    status_row: u16,
    status: Option<String>,
}

impl<W: Write> TerminalView<W> {
    pub fn new(output: W, glyph: char, status_row: u16) -> Self {
        Self {
            output,
            glyph,
            status_row,
            status: None,
        }
    }

    /// Redraws the whole view with the marker at `pos`, or without one.
    pub fn render(&mut self, pos: Option<GridPos>) -> io::Result<()> {
        queue!(self.output, Clear(ClearType::All))?;
        if let Some(pos) = pos {
            queue!(
                self.output,
                MoveTo(pos.x as u16, pos.y as u16),
                Print(self.glyph)
            )?;
        }
        if let Some(status) = &self.status {
            queue!(self.output, MoveTo(0, self.status_row), Print(status))?;
        }
        self.output.flush()
    }

    /// Text shown under the grid until replaced.
    pub fn set_status(&mut self, status: impl Into<String>) -> &mut Self {
        self.status = Some(status.into());
        self
    }

    pub fn clear_status(&mut self) -> &mut Self {
        self.status = None;
        self
    }

    pub fn clear(&mut self) -> io::Result<()> {
        queue!(self.output, Clear(ClearType::All), MoveTo(0, 0))?;
        self.output.flush()
    }

    pub fn output(&self) -> &W {
        &self.output
    }
}

/// Raw mode on an alternate screen for as long as it lives.
pub struct TerminalSession;

impl TerminalSession {
    pub fn start() -> io::Result<Self> {
        enable_raw_mode()?;
        if let Err(e) = execute!(io::stdout(), EnterAlternateScreen, Hide) {
            let _ = disable_raw_mode();
            return Err(e);
        }
        Ok(Self)
    }

    /// Current terminal height, used to place the status line.
    pub fn rows() -> u16 {
        terminal::size().map(|(_, rows)| rows).unwrap_or(24)
    }
}

impl Drop for TerminalSession {
    fn drop(&mut self) {
        let _ = execute!(io::stdout(), Show, LeaveAlternateScreen);
        let _ = disable_raw_mode();
    }
}
