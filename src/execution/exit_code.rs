//! Well-known exit codes.

/// Exit code of a successful command.
pub const EX_OK: i32 = 0;

/// Offset shells add to a signal number when a child is killed by it.
pub const SIGNAL_OFFSET: i32 = 128;

/// Symbolic name for a well-known exit code.
///
/// Covers the generic shell codes, `sysexits.h` and `128 + signal` codes.
pub fn exit_code_name(code: i32) -> Option<&'static str> {
    let name = match code {
        0 => "EX_OK",
        1 => "EX_ERROR",
        2 => "EX_BUILTIN",
        64 => "EX_USAGE",
        65 => "EX_DATAERR",
        66 => "EX_NOINPUT",
        67 => "EX_NOUSER",
        68 => "EX_NOHOST",
        69 => "EX_UNAVAILABLE",
        70 => "EX_SOFTWARE",
        71 => "EX_OSERR",
        72 => "EX_OSFILE",
        73 => "EX_CANTCREAT",
        74 => "EX_IOERR",
        75 => "EX_TEMPFAIL",
        76 => "EX_PROTOCOL",
        77 => "EX_NOPERM",
        78 => "EX_CONFIG",
        126 => "EX_NOEXEC",
        127 => "EX_NOCMD",
        c if c > SIGNAL_OFFSET => return signal_name(c - SIGNAL_OFFSET),
        _ => return None,
    };
    Some(name)
}

/// Name of a POSIX signal by number.
pub fn signal_name(signal: i32) -> Option<&'static str> {
    let name = match signal {
        1 => "SIGHUP",
        2 => "SIGINT",
        3 => "SIGQUIT",
        4 => "SIGILL",
        5 => "SIGTRAP",
        6 => "SIGABRT",
        7 => "SIGBUS",
        8 => "SIGFPE",
        9 => "SIGKILL",
        10 => "SIGUSR1",
        11 => "SIGSEGV",
        12 => "SIGUSR2",
        13 => "SIGPIPE",
        14 => "SIGALRM",
        15 => "SIGTERM",
        _ => return None,
    };
    Some(name)
}

/// Exit code a shell reports for a child killed by `signal`.
pub fn from_signal(signal: i32) -> i32 {
    SIGNAL_OFFSET + signal
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generic_codes() {
        assert_eq!(exit_code_name(EX_OK), Some("EX_OK"));
        assert_eq!(exit_code_name(127), Some("EX_NOCMD"));
        assert_eq!(exit_code_name(78), Some("EX_CONFIG"));
    }

    #[test]
    fn test_signal_codes() {
        assert_eq!(exit_code_name(from_signal(9)), Some("SIGKILL"));
        assert_eq!(exit_code_name(143), Some("SIGTERM"));
        assert_eq!(exit_code_name(128 + 40), None);
    }

    #[test]
    fn test_unknown_codes() {
        assert_eq!(exit_code_name(3), None);
        assert_eq!(exit_code_name(-1), None);
        assert_eq!(exit_code_name(SIGNAL_OFFSET), None);
    }
}
