// src/exec/signal.rs

//! Process-group signalling.
//!
//! Scripts are spawned as process-group leaders, so one signal to the group
//! reaches every descendant the script started.

use std::io;

/// Termination signal strength.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermSignal {
    /// SIGTERM.
    Graceful,
    /// SIGKILL.
    Forceful,
}

/// Look up the process group of `pid`.
#[cfg(unix)]
pub fn process_group_of(pid: u32) -> Option<i32> {
    // SAFETY: getpgid has no memory-safety preconditions.
    let pgid = unsafe { libc::getpgid(pid as libc::pid_t) };
    (pgid > 0).then_some(pgid)
}

#[cfg(not(unix))]
pub fn process_group_of(_pid: u32) -> Option<i32> {
    None
}

/// Send `signal` to every process in group `pgid`.
#[cfg(unix)]
pub fn signal_group(pgid: i32, signal: TermSignal) -> io::Result<()> {
    // SAFETY: killpg has no memory-safety preconditions.
    let rc = unsafe { libc::killpg(pgid as libc::pid_t, raw_signal(signal)) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

/// Send `signal` to the single process `pid`; used when its group is unknown
/// or cannot be signalled.
#[cfg(unix)]
pub fn signal_process(pid: u32, signal: TermSignal) -> io::Result<()> {
    // SAFETY: kill has no memory-safety preconditions.
    let rc = unsafe { libc::kill(pid as libc::pid_t, raw_signal(signal)) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(unix)]
fn raw_signal(signal: TermSignal) -> libc::c_int {
    match signal {
        TermSignal::Graceful => libc::SIGTERM,
        TermSignal::Forceful => libc::SIGKILL,
    }
}

#[cfg(not(unix))]
pub fn signal_process(_pid: u32, _signal: TermSignal) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "signals are not supported on this platform",
    ))
}

#[cfg(not(unix))]
pub fn signal_group(_pgid: i32, _signal: TermSignal) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "process groups are not supported on this platform",
    ))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn own_process_has_a_group() {
        assert!(process_group_of(std::process::id()).is_some());
    }

    #[test]
    fn signalling_a_missing_group_fails() {
        // Group ids are never this large on Linux or macOS.
        let err = signal_group(i32::MAX - 1, TermSignal::Graceful).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::ESRCH));
    }

    #[test]
    fn graceful_process_signal_is_sigterm() {
        use std::os::unix::process::ExitStatusExt;

        let mut child = std::process::Command::new("sleep").arg("60").spawn().unwrap();
        signal_process(child.id(), TermSignal::Graceful).unwrap();

        let status = child.wait().unwrap();
        assert_eq!(status.signal(), Some(libc::SIGTERM));
    }
}
