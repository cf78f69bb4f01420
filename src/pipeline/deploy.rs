//! Publish the project by committing and pushing it with git.

use chrono::{DateTime, Local};
use std::error::Error;
use std::path::Path;
use tokio::process::Command;
use tracing::{error, info, instrument, warn};

/// Commit message for an automated publish at `at`.
pub fn commit_message(at: DateTime<Local>) -> String {
    format!(
        "Automated content update: {}",
        at.format("%Y-%m-%d %H:%M:%S")
    )
}

/// Non-blank lines of captured process output.
pub fn output_lines(bytes: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(bytes)
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty())
        .map(str::to_string)
        .collect()
}

/// Run `program args..` in `dir`, logging its output line by line.
///
/// Returns the logged lines, stdout before stderr. git reports progress on
/// stderr, so it is logged on success too. A non-zero exit status is an
/// error carrying the program's stderr.
#[instrument(level = "info", skip(dir), fields(dir = %dir.display()))]
pub async fn run_command(
    dir: &Path,
    program: &str,
    args: &[&str],
) -> Result<Vec<String>, Box<dyn Error>> {
    info!(command = %format!("{} {}", program, args.join(" ")), "Running command");
    let output = Command::new(program)
        .args(args)
        .current_dir(dir)
        .output()
        .await
        .map_err(|e| format!("failed to spawn {}: {}", program, e))?;

    let mut lines = output_lines(&output.stdout);
    for line in &lines {
        info!("   {}", line);
    }

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        error!(code = ?output.status.code(), stderr = %stderr, "Command failed");
        return Err(format!(
            "{} exited with status {}: {}",
            program,
            output.status.code().unwrap_or(-1),
            stderr
        )
        .into());
    }

    let stderr = output_lines(&output.stderr);
    for line in &stderr {
        info!("   {}", line);
    }
    lines.extend(stderr);
    Ok(lines)
}

/// Stage, commit and push everything under `root`.
///
/// A failed commit (usually "nothing to commit") is only a warning.
#[instrument(level = "info", skip_all, fields(root = %root.display()))]
pub async fn run(root: &Path) -> Result<(), Box<dyn Error>> {
    if !root.join(".git").is_dir() {
        error!("Not a git repository; run `git init` and set up a remote first");
        return Err(format!("{} is not a git repository", root.display()).into());
    }

    run_command(root, "git", &["add", "."]).await?;

    let message = commit_message(Local::now());
    if let Err(e) = run_command(root, "git", &["commit", "-m", &message]).await {
        warn!(error = %e, "Commit failed; there may be no new changes to publish");
    }

    info!("Pushing changes to the live website");
    run_command(root, "git", &["push"]).await?;
    info!("Deployment successful");
    Ok(())
}
