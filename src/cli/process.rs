use std::{
    env,
    path::{Path, PathBuf},
};

use anyhow::Result;
use sysinfo::{get_current_pid, Signal, System};

/// The host binary lives next to the cli binary.
pub fn host_executable_path() -> Result<PathBuf> {
    let mut path = env::current_exe()?;
    path.set_file_name("webtime-host");
    #[cfg(windows)]
    {
        path.set_extension("exe");
    }
    Ok(path)
}

/// Terminates every running host process. Browsers restart their native
/// hosts on demand, so this is safe to run at any time.
pub fn kill_previous_hosts(name: &Path) {
    let system = System::new_all();
    let current_id = get_current_pid().unwrap();
    for (pid, process) in system.processes().iter() {
        if *pid == current_id {
            continue;
        }
        if matches!(process.parent(), Some(p) if p == current_id) {
            continue;
        }

        if process
            .exe()
            .filter(|v| v.exists())
            .filter(|v| name == *v)
            .is_some()
        {
            // This will forcefully terminate the process on Windows. Anything better will require a
            // lot more work.
            if process.kill_with(Signal::Term).is_none() {
                process.kill();
            }
            process.wait();
        }
    }
}
