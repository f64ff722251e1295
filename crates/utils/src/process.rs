//! Process liveness probing

/// Check whether a process with the given PID is running
///
/// Sends signal 0, which performs the permission and existence checks
/// without delivering anything. Only "no such process" counts as dead; a
/// permission error means somebody else's process holds that PID, which is
/// still a live holder.
pub fn is_process_running(pid: u32) -> bool {
    if pid == std::process::id() {
        return true;
    }

    #[cfg(unix)]
    {
        // 0 and negative values address process groups, never a single holder
        let Ok(raw) = libc::pid_t::try_from(pid) else {
            return false;
        };
        if raw <= 0 {
            return false;
        }

        let rc = unsafe { libc::kill(raw, 0) };
        if rc == 0 {
            return true;
        }
        std::io::Error::last_os_error().raw_os_error() != Some(libc::ESRCH)
    }

    #[cfg(not(unix))]
    {
        // No portable probe; never steal a lock we cannot judge
        true
    }
}

/// Deliver `signal` to the process `pid`
#[cfg(unix)]
pub fn send_signal(pid: u32, signal: i32) -> std::io::Result<()> {
    let raw = libc::pid_t::try_from(pid)
        .ok()
        .filter(|raw| *raw > 0)
        .ok_or_else(|| std::io::Error::from(std::io::ErrorKind::InvalidInput))?;

    if unsafe { libc::kill(raw, signal) } == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn test_send_signal_terminates_child() {
        let mut child = std::process::Command::new("sleep").arg("5").spawn().unwrap();
        send_signal(child.id(), libc::SIGTERM).unwrap();

        use std::os::unix::process::ExitStatusExt;
        assert_eq!(child.wait().unwrap().signal(), Some(libc::SIGTERM));
        assert!(send_signal(0, libc::SIGTERM).is_err());
    }

    #[test]
    fn test_current_process_is_running() {
        assert!(is_process_running(std::process::id()));
    }

    #[cfg(unix)]
    #[test]
    fn test_reaped_child_is_not_running() {
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();

        assert!(!is_process_running(pid));
    }

    #[cfg(unix)]
    #[test]
    fn test_group_addresses_are_rejected() {
        assert!(!is_process_running(0));
        assert!(!is_process_running(u32::MAX));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_init_counts_as_live_even_without_permission() {
        // PID 1 belongs to root; unprivileged probes get EPERM
        assert!(is_process_running(1));
    }
}
