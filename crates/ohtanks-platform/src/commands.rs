#[cfg(windows)]
use std::os::windows::process::CommandExt;

#[cfg(unix)]
use std::os::unix::process::CommandExt;

#[cfg(windows)]
const DETACHED_PROCESS: u32 = 0x0000_0008;
#[cfg(windows)]
const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;

/// Extension trait that configures a command so the spawned child outlives
/// the launcher and does not share its console or process group.
pub trait DetachCommand {
    fn detach(&mut self) -> &mut Self;
}

impl DetachCommand for std::process::Command {
    #[cfg(windows)]
    fn detach(&mut self) -> &mut Self {
        self.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP)
    }

    #[cfg(unix)]
    fn detach(&mut self) -> &mut Self {
        self.process_group(0)
    }

    #[cfg(not(any(unix, windows)))]
    fn detach(&mut self) -> &mut Self {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::DetachCommand;

    #[test]
    fn std_command_detach_is_chainable() {
        let mut cmd = std::process::Command::new("echo");
        let before = &mut cmd as *mut std::process::Command;
        let after = cmd.detach() as *mut std::process::Command;
        assert_eq!(before, after);
    }
}
