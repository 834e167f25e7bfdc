use nix::errno::Errno;
use std::io;
use std::process::ExitStatus;
use thiserror::Error;

/// Exit code reserved for a failure to create the drawing surface.
pub const SURFACE_EXIT_CODE: i32 = 1;

/// Errors a worker can hit. Every variant maps onto one of the exit-status bands the
/// supervisor understands, see [Error::exit_code].
#[derive(Error, Debug)]
pub enum Error {
    #[error("drawing surface error: {0}")]
    Surface(String),
    #[error("{context}: {source}")]
    Sys {
        context: &'static str,
        #[source]
        source: Errno,
    },
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn sys(context: &'static str, source: Errno) -> Self {
        Error::Sys { context, source }
    }

    pub fn last_os(context: &'static str) -> Self {
        Error::Sys {
            context,
            source: Errno::last(),
        }
    }

    pub fn io(context: &'static str, source: io::Error) -> Self {
        Error::Io { context, source }
    }

    /// Process exit code carrying this error. Surface failures get their own code, system
    /// failures carry the errno.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Surface(_) => SURFACE_EXIT_CODE,
            Error::Sys { source, .. } => system_code(*source as i32),
            Error::Io { source, .. } => system_code(source.raw_os_error().unwrap_or(0)),
        }
    }
}

// Codes 0 and 1 are taken by the clean and surface bands.
fn system_code(errno: i32) -> i32 {
    if errno > SURFACE_EXIT_CODE && errno < 256 {
        errno
    } else {
        Errno::EIO as i32
    }
}

/// How a worker process ended, as seen by the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitClass {
    Clean,
    SurfaceError,
    /// Errno carried in the exit code.
    SystemError(i32),
    /// Killed by this signal. Counts as a system error with code `128 + signal`.
    Signaled(i32),
}

impl ExitClass {
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => ExitClass::Clean,
            SURFACE_EXIT_CODE => ExitClass::SurfaceError,
            code => ExitClass::SystemError(code),
        }
    }

    pub fn from_status(status: ExitStatus) -> Self {
        use std::os::unix::process::ExitStatusExt;

        match (status.code(), status.signal()) {
            (Some(code), _) => Self::from_code(code),
            (None, Some(signal)) => ExitClass::Signaled(signal),
            (None, None) => ExitClass::SystemError(Errno::EIO as i32),
        }
    }

    /// Exit code that puts a process into this class.
    pub fn code(&self) -> i32 {
        match self {
            ExitClass::Clean => 0,
            ExitClass::SurfaceError => SURFACE_EXIT_CODE,
            ExitClass::SystemError(code) => *code,
            ExitClass::Signaled(signal) => 128 + signal,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            ExitClass::Clean => "exited cleanly".to_string(),
            ExitClass::SurfaceError => "exited for drawing surface error".to_string(),
            ExitClass::Signaled(signal) => format!("was terminated by signal {signal}"),
            ExitClass::SystemError(code) => format!(
                "exited for system call error: {}",
                Errno::from_raw(*code).desc()
            ),
        }
    }
}

#[cfg(test)]
mod test {
    use crate::error::{Error, ExitClass};
    use nix::errno::Errno;
    use std::io;

    #[test]
    fn surface_errors_use_the_reserved_code() {
        let err = Error::Surface("no memory".to_string());
        assert_eq!(err.exit_code(), 1);
        assert_eq!(ExitClass::from_code(err.exit_code()), ExitClass::SurfaceError);
    }

    #[test]
    fn system_errors_carry_errno() {
        let err = Error::sys("mapping canvas", Errno::ENOMEM);
        assert_eq!(err.exit_code(), Errno::ENOMEM as i32);
        assert_eq!(
            ExitClass::from_code(err.exit_code()),
            ExitClass::SystemError(Errno::ENOMEM as i32)
        );
    }

    #[test]
    fn eperm_does_not_collide_with_surface_band() {
        let err = Error::sys("opening mutex", Errno::EPERM);
        assert_eq!(err.exit_code(), Errno::EIO as i32);
    }

    #[test]
    fn io_errors_without_errno_fall_back_to_eio() {
        let err = Error::io("reading peer", io::Error::new(io::ErrorKind::Other, "boom"));
        assert_eq!(err.exit_code(), Errno::EIO as i32);

        let err = Error::io("connecting", io::Error::from_raw_os_error(libc::ECONNREFUSED));
        assert_eq!(err.exit_code(), libc::ECONNREFUSED);
    }

    #[test]
    fn clean_exit_is_zero() {
        assert_eq!(ExitClass::from_code(0), ExitClass::Clean);
        assert_eq!(ExitClass::Clean.describe(), "exited cleanly");
    }

    #[test]
    fn signals_are_reported_as_system_errors() {
        let killed = ExitClass::Signaled(9);
        assert_eq!(killed.describe(), "was terminated by signal 9");
        assert_eq!(killed.code(), 128 + 9);
    }

    #[test]
    fn high_errno_is_not_mistaken_for_a_signal() {
        let class = ExitClass::from_code(Errno::EOWNERDEAD as i32);
        assert_eq!(class, ExitClass::SystemError(Errno::EOWNERDEAD as i32));
        assert_eq!(
            class.describe(),
            format!("exited for system call error: {}", Errno::EOWNERDEAD.desc())
        );
    }
}
