use std::process::{Child, Command};

use anyhow::Result;

/// Platform capability for group-wide signalling. On Unix the child is
/// placed in its own process group so a stop reaches the whole tree,
/// including anything the child forked.
pub(crate) trait GroupSignal {
    fn assign_group(&self, command: &mut Command);
    fn terminate_group(&self, child: &mut Child) -> Result<()>;
}

pub(crate) struct PlatformSignal;

#[cfg(unix)]
impl GroupSignal for PlatformSignal {
    fn assign_group(&self, command: &mut Command) {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }

    fn terminate_group(&self, child: &mut Child) -> Result<()> {
        // With process_group(0) the group id equals the child pid.
        let pgid = child.id() as libc::pid_t;
        let rc = unsafe { libc::kill(-pgid, libc::SIGTERM) };
        if rc != 0 {
            let err = std::io::Error::last_os_error();
            // ESRCH means the group is already gone.
            if err.raw_os_error() != Some(libc::ESRCH) {
                return Err(err.into());
            }
        }
        Ok(())
    }
}

#[cfg(not(unix))]
impl GroupSignal for PlatformSignal {
    fn assign_group(&self, _command: &mut Command) {}

    fn terminate_group(&self, child: &mut Child) -> Result<()> {
        match child.kill() {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::InvalidInput => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
