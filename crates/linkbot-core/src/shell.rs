//! Launching the bridge program through the user's shell.
//!
//! Bridge programs are usually scripts (`node bridge.js`, `npx ...`) that
//! depend on PATH entries set up in the login shell, so on Unix the command is
//! wrapped as `<prefix> '<quoted command>'` where the prefix defaults to
//! `$SHELL -l -c`.

use serde::Serialize;
use std::path::Path;
use tokio::process::Command;

/// How a child process ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessExit {
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

impl ProcessExit {
    pub fn from_status(status: std::process::ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = std::os::unix::process::ExitStatusExt::signal(&status);
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
        }
    }
}

impl std::fmt::Display for ProcessExit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exit code {code}"),
            (None, Some(signal)) => write!(f, "signal {signal}"),
            (None, None) => f.write_str("unknown exit status"),
        }
    }
}

/// Prepend the program's directory to PATH so sibling tools (node) resolve.
fn prepend_program_dir(cmd: &mut Command, program: &str) {
    if !program.contains('/') {
        return;
    }
    let Some(dir) = Path::new(program).parent().and_then(|d| d.to_str()) else {
        return;
    };
    let path = match std::env::var("PATH") {
        Ok(existing) if !existing.is_empty() => format!("{dir}:{existing}"),
        _ => dir.to_string(),
    };
    cmd.env("PATH", path);
}

/// Build a command that runs `program args...` in a login shell.
#[cfg(unix)]
pub fn build_shell_command(
    program: &str,
    args: &[String],
    shell_prefix: Option<&str>,
) -> Result<Command, String> {
    let prefix = shell_prefix_or_default(shell_prefix);
    let mut prefix_parts = prefix.split_whitespace();
    let shell = prefix_parts
        .next()
        .ok_or_else(|| "Empty shell prefix".to_string())?;

    let quoted = std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .map(|part| {
            shlex::try_quote(part)
                .map(|q| q.into_owned())
                .map_err(|_| format!("Cannot quote argument: {part}"))
        })
        .collect::<Result<Vec<_>, _>>()?
        .join(" ");

    let mut cmd = Command::new(shell);
    cmd.args(prefix_parts).arg(quoted);
    prepend_program_dir(&mut cmd, program);
    Ok(cmd)
}

/// No login shell on Windows: run the program directly.
#[cfg(windows)]
pub fn build_shell_command(
    program: &str,
    args: &[String],
    _shell_prefix: Option<&str>,
) -> Result<Command, String> {
    let mut cmd = Command::new(program);
    cmd.args(args);
    prepend_program_dir(&mut cmd, program);
    Ok(cmd)
}

/// Custom prefix as-is, else `$SHELL -l -c` (bash/sh for non-POSIX shells).
#[cfg(unix)]
fn shell_prefix_or_default(custom: Option<&str>) -> String {
    if let Some(prefix) = custom.filter(|p| !p.trim().is_empty()) {
        return prefix.to_string();
    }

    let shell = std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string());
    let name = Path::new(&shell)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");

    let shell = if ["fish", "nu", "nushell", "elvish", "xonsh", "ion"].contains(&name) {
        if Path::new("/bin/bash").exists() {
            "/bin/bash".to_string()
        } else {
            "/bin/sh".to_string()
        }
    } else {
        shell
    };

    format!("{shell} -l -c")
}
