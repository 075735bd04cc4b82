//! Child process launching. Every `exec` is double-forked so the child is
//! reparented to init and never becomes our zombie, and gets its own
//! session so it survives a manager restart.

use std::ffi::CString;

use nix::sys::wait::waitpid;
use nix::unistd::{execv, fork, setsid, ForkResult};
use tracing::{error, warn};

/// Hand `command_line` to `sh -c` in a detached grandchild.
pub fn spawn(command_line: &str) {
    let Ok(shell) = CString::new("/bin/sh") else { return };
    let Ok(flag) = CString::new("-c") else { return };
    let Ok(command) = CString::new(command_line) else {
        warn!(command_line, "command contains a NUL byte, not spawning");
        return;
    };

    match unsafe { fork() } {
        Ok(ForkResult::Parent { child }) => {
            // reap the intermediate child; the grandchild belongs to init
            if let Err(e) = waitpid(child, None) {
                warn!(error = %e, "failed to reap intermediate child");
            }
        }
        Ok(ForkResult::Child) => {
            match unsafe { fork() } {
                Ok(ForkResult::Parent { .. }) => std::process::exit(0),
                Ok(ForkResult::Child) => {
                    let _ = setsid();
                    let _ = execv(&shell, &[shell.clone(), flag, command]);
                    std::process::exit(127);
                }
                Err(_) => std::process::exit(1),
            }
        }
        Err(e) => {
            error!(command_line, error = %e, "fork failed");
        }
    }
}
