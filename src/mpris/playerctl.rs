//! Subprocess source: follows `playerctl` and forwards its output line by line.

use std::ffi::OsStr;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{LINE_BUFFER, MetadataSource, SourceError};

const PLAYERCTL: &str = "playerctl";

/// Arguments for following metadata of all players in the given format.
pub fn playerctl_args(format: &str, blocked: &[String]) -> Vec<String> {
    let mut args = vec!["-a".to_string(), "-F".to_string()];
    if !blocked.is_empty() {
        args.push(format!("--ignore-player={}", blocked.join(",")));
    }
    args.extend(["metadata".to_string(), "-f".to_string(), format.to_string()]);
    args
}

/// Starts `playerctl` following every player except the blocked ones.
pub fn spawn_playerctl(format: &str, blocked: &[String]) -> Result<MetadataSource, SourceError> {
    let source = spawn_command(PLAYERCTL, playerctl_args(format, blocked))?;
    info!(pid = ?source.pid(), "MPRIS playerctl started");
    Ok(source)
}

/// Runs `program` and turns each line of its stdout into a metadata line.
pub fn spawn_command<I, S>(program: &str, args: I) -> Result<MetadataSource, SourceError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| SourceError::Spawn {
            program: program.to_string(),
            source,
        })?;

    let stdout = match child.stdout.take() {
        Some(stdout) => stdout,
        None => {
            let _ = child.start_kill();
            return Err(SourceError::NoStdout(program.to_string()));
        }
    };

    let (tx, rx) = mpsc::channel(LINE_BUFFER);
    let reader = tokio::spawn(forward_lines(stdout, tx));
    Ok(MetadataSource::from_process(rx, child, reader))
}

/// Forwards lines until the output ends or nobody is listening.
async fn forward_lines<R>(output: R, tx: mpsc::Sender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(output);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => {
                debug!("Metadata output closed");
                break;
            }
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\n', '\r']).to_string();
                if tx.send(line).await.is_err() {
                    break;
                }
            }
            Err(err) => {
                warn!("Failed to read metadata output: {}", err);
                break;
            }
        }
    }
}
