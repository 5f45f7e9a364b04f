use anyhow::{anyhow, bail, Result};
use std::{io::ErrorKind, process::Command};

/// Runs a tool to completion and returns its trimmed stdout. Blocks with no
/// timeout.
pub fn run_tool(program: &str, args: &[&str]) -> Result<String> {
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|err| launch_error(program, err))?;

    if !output.status.success() {
        let code = output
            .status
            .code()
            .map(|c| c.to_string())
            .unwrap_or_else(|| "signal".into());
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "Command '{} {}' returned non-zero exit status {code}. {}",
            program,
            args.join(" "),
            stderr.trim()
        );
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

pub fn launch_error(program: &str, err: std::io::Error) -> anyhow::Error {
    if err.kind() == ErrorKind::NotFound {
        anyhow!("{program} command not found.")
    } else {
        anyhow!("failed to launch {program}: {err}")
    }
}
