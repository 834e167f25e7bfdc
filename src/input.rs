use crate::canvas::Direction;
use log::{debug, trace};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use vte::{Params, Parser, Perform};

/// What a key press (or a peer event) asks the writer to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Move(Direction),
    Save,
    Quit,
}

/// Turns raw terminal bytes into [Command]s. Sequences split across reads are handled since
/// the parser keeps its state between calls.
pub struct InputDecoder {
    parser: Parser,
    // An ESC O prefix was seen, the next printable byte picks the arrow.
    pending_ss3: bool,
}

impl InputDecoder {
    pub fn new() -> Self {
        Self {
            parser: Parser::new(),
            pending_ss3: false,
        }
    }

    pub fn decode(&mut self, bytes: &[u8]) -> Vec<Command> {
        let mut performer = Performer::new(self.pending_ss3);
        for byte in bytes {
            self.parser.advance(&mut performer, *byte)
        }
        self.pending_ss3 = performer.pending_ss3;
        performer.commands
    }
}

impl Default for InputDecoder {
    fn default() -> Self {
        Self::new()
    }
}

// Private struct to hide this implementation detail
struct Performer {
    commands: Vec<Command>,
    pending_ss3: bool,
}

impl Performer {
    fn new(pending_ss3: bool) -> Self {
        Self {
            commands: Vec::new(),
            pending_ss3,
        }
    }
}

fn arrow(c: char) -> Option<Direction> {
    match c {
        'A' => Some(Direction::Up),
        'B' => Some(Direction::Down),
        'C' => Some(Direction::Right),
        'D' => Some(Direction::Left),
        _ => None,
    }
}

impl Perform for Performer {
    fn print(&mut self, c: char) {
        if std::mem::take(&mut self.pending_ss3) {
            if let Some(direction) = arrow(c) {
                self.commands.push(Command::Move(direction));
            }
            return;
        }
        let command = match c {
            's' | 'S' | 'p' | 'P' => Command::Save,
            'q' | 'Q' => Command::Quit,
            _ => return,
        };
        self.commands.push(command);
    }

    fn execute(&mut self, byte: u8) {
        // Ctrl-C and Ctrl-D arrive as plain bytes in raw mode.
        if byte == 0x03 || byte == 0x04 {
            self.commands.push(Command::Quit);
        }
    }

    fn csi_dispatch(&mut self, _params: &Params, intermediates: &[u8], _ignore: bool, c: char) {
        if intermediates.is_empty() {
            if let Some(direction) = arrow(c) {
                self.commands.push(Command::Move(direction));
            }
        }
    }

    fn esc_dispatch(&mut self, intermediates: &[u8], _ignore: bool, byte: u8) {
        self.pending_ss3 = intermediates.is_empty() && byte == b'O';
    }
}

/// Reads key bytes until EOF and forwards the decoded commands. Returns when the reader is
/// exhausted or nobody listens anymore.
pub async fn forward_keys<R>(mut reader: R, commands: mpsc::Sender<Command>) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut decoder = InputDecoder::new();
    let mut buf = [0u8; 64];
    loop {
        let read = reader.read(&mut buf).await?;
        if read == 0 {
            debug!("local input closed");
            return Ok(());
        }
        for command in decoder.decode(&buf[..read]) {
            trace!("key {command:?}");
            if commands.send(command).await.is_err() {
                return Ok(());
            }
        }
    }
}
