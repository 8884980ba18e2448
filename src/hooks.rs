//! Pre and post generation commands.
//!
//! Each command is an expression; once evaluated it is handed to the
//! configured shell (`bash -c <command>` by default) running in the output
//! directory.

use std::path::Path;
use std::process::{Command, Stdio};

use crate::error::{Error, Result};
use crate::logger::LogSink;

/// Runs one already-evaluated hook command.
pub trait CommandExecutor {
    fn run(
        &self,
        block: &str,
        command: &str,
        envs: &[(String, String)],
        workdir: &Path,
        sink: &mut dyn LogSink,
    ) -> Result<()>;
}

/// Runs commands through a shell invocation prefix such as `bash -c`.
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    shell: Vec<String>,
}

impl ShellExecutor {
    pub fn new(shell: &str) -> Self {
        Self { shell: shell.split_whitespace().map(str::to_string).collect() }
    }
}

impl CommandExecutor for ShellExecutor {
    fn run(
        &self,
        block: &str,
        command: &str,
        envs: &[(String, String)],
        workdir: &Path,
        sink: &mut dyn LogSink,
    ) -> Result<()> {
        let Some((program, args)) = self.shell.split_first() else {
            return Err(Error::HookError("no shell configured".to_string()));
        };

        sink.log(block, &format!("exec: {command}"));
        let output = Command::new(program)
            .args(args)
            .arg(command)
            .current_dir(workdir)
            .envs(envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .output()
            .map_err(|e| Error::HookError(format!("failed to start '{program}': {e}")))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            sink.log(block, &stdout);
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            sink.log(block, &stderr);
        }

        if !output.status.success() {
            return Err(Error::HookError(format!(
                "command '{command}' failed with status: {}",
                output.status
            )));
        }
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::logger::MemorySink;

    #[test]
    fn test_runs_in_workdir_with_envs() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = MemorySink::new();
        ShellExecutor::new("sh -c")
            .run(
                "executes-pre",
                "echo \"$GREETING\" > hello.txt",
                &[("GREETING".to_string(), "hi".to_string())],
                dir.path(),
                &mut sink,
            )
            .unwrap();
        assert_eq!(std::fs::read_to_string(dir.path().join("hello.txt")).unwrap(), "hi\n");
    }

    #[test]
    fn test_failure_is_a_hook_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ShellExecutor::new("sh -c")
            .run("executes-post", "exit 3", &[], dir.path(), &mut MemorySink::new())
            .unwrap_err();
        assert!(matches!(err, Error::HookError(_)));
    }
}
