use crate::canvas::Direction;
use crate::input::Command;

/// Every event on the link is exactly this many bytes.
pub const FRAME_LEN: usize = 4;

pub const CODE_DOWN: i32 = 258;
pub const CODE_UP: i32 = 259;
pub const CODE_LEFT: i32 = 260;
pub const CODE_RIGHT: i32 = 261;
pub const CODE_SAVE: i32 = 115;

/// An integer event code as carried on the link: ASCII decimal, NUL padded to four bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventCode(pub i32);

impl EventCode {
    /// Code for a command that may cross the link. Quitting is local only.
    pub fn for_command(command: Command) -> Option<EventCode> {
        let code = match command {
            Command::Move(Direction::Down) => CODE_DOWN,
            Command::Move(Direction::Up) => CODE_UP,
            Command::Move(Direction::Left) => CODE_LEFT,
            Command::Move(Direction::Right) => CODE_RIGHT,
            Command::Save => CODE_SAVE,
            Command::Quit => return None,
        };
        Some(EventCode(code))
    }

    /// The command this code stands for, if it is one we know.
    pub fn command(&self) -> Option<Command> {
        match self.0 {
            CODE_DOWN => Some(Command::Move(Direction::Down)),
            CODE_UP => Some(Command::Move(Direction::Up)),
            CODE_LEFT => Some(Command::Move(Direction::Left)),
            CODE_RIGHT => Some(Command::Move(Direction::Right)),
            CODE_SAVE => Some(Command::Save),
            _ => None,
        }
    }

    /// Text that does not fit is truncated, which never happens for the known codes.
    pub fn encode(&self) -> [u8; FRAME_LEN] {
        let mut frame = [0u8; FRAME_LEN];
        let text = self.0.to_string();
        let len = text.len().min(FRAME_LEN);
        frame[..len].copy_from_slice(&text.as_bytes()[..len]);
        frame
    }

    /// Parses like C `atoi`: optional whitespace and sign, then leading digits. Anything else
    /// decodes to 0.
    pub fn decode(frame: &[u8; FRAME_LEN]) -> EventCode {
        let mut bytes = frame.iter().copied().skip_while(u8::is_ascii_whitespace).peekable();
        let negative = match bytes.peek() {
            Some(b'-') => {
                bytes.next();
                true
            }
            Some(b'+') => {
                bytes.next();
                false
            }
            _ => false,
        };
        let value = bytes
            .take_while(u8::is_ascii_digit)
            .fold(0i32, |acc, digit| acc * 10 + i32::from(digit - b'0'));
        EventCode(if negative { -value } else { value })
    }
}

#[cfg(test)]
mod test {
    use crate::canvas::Direction;
    use crate::input::Command;
    use crate::protocol::EventCode;

    #[test]
    fn encodes_as_nul_padded_text() {
        let up = EventCode::for_command(Command::Move(Direction::Up)).unwrap();
        insta::assert_snapshot!(format!("{:?}", up.encode()), @"[50, 53, 57, 0]");
        let save = EventCode::for_command(Command::Save).unwrap();
        assert_eq!(&save.encode(), b"115\0");
    }

    #[test]
    fn decodes_known_codes() {
        assert_eq!(
            EventCode::decode(b"261\0").command(),
            Some(Command::Move(Direction::Right))
        );
        assert_eq!(
            EventCode::decode(b"258\0").command(),
            Some(Command::Move(Direction::Down))
        );
        assert_eq!(EventCode::decode(b"115\0").command(), Some(Command::Save));
    }

    #[test]
    fn every_link_command_survives_the_wire() {
        for command in [
            Command::Move(Direction::Up),
            Command::Move(Direction::Down),
            Command::Move(Direction::Left),
            Command::Move(Direction::Right),
            Command::Save,
        ] {
            let code = EventCode::for_command(command).unwrap();
            assert_eq!(EventCode::decode(&code.encode()).command(), Some(command));
        }
    }

    #[test]
    fn quit_never_crosses_the_link() {
        assert_eq!(EventCode::for_command(Command::Quit), None);
    }

    #[test]
    fn garbage_decodes_like_atoi() {
        assert_eq!(EventCode::decode(b"abcd"), EventCode(0));
        assert_eq!(EventCode::decode(b"12xy"), EventCode(12));
        assert_eq!(EventCode::decode(b" -42"), EventCode(-42));
        assert_eq!(EventCode::decode(b"9999"), EventCode(9999));
        assert_eq!(EventCode::decode(b"abcd").command(), None);
        assert_eq!(EventCode::decode(b"262\0").command(), None);
    }
}
