//! Formatter adapter: pipes a file through an external formatter.
//!
//! The child's stdin is fed from one thread while two more drain stdout
//! and stderr, so neither side can stall on a full pipe buffer. The exit
//! status is polled with a deadline and a child that outlives it is killed.

use serde::{Deserialize, Serialize};
use std::io::{self, Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

/// Shortest output accepted from the formatter: an empty one-letter package.
pub const MIN_OUTPUT_LEN: usize = "package a\n".len();

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How to run the external formatter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatterConfig {
    /// Program to run, looked up on `PATH`
    pub program: String,
    /// Arguments passed before any input
    pub args: Vec<String>,
    /// Deadline for one file
    pub timeout: Duration,
    /// Output shorter than this is rejected
    pub min_output_len: usize,
}

impl Default for FormatterConfig {
    fn default() -> Self {
        Self {
            program: "gofmt".to_string(),
            args: Vec::new(),
            timeout: Duration::from_secs(30),
            min_output_len: MIN_OUTPUT_LEN,
        }
    }
}

impl FormatterConfig {
    /// Run `program` with `args` and default limits.
    pub fn command(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
            ..Self::default()
        }
    }
}

#[derive(Error, Debug)]
pub enum FormatError {
    #[error("failed to start formatter `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("formatter pipe error on {file}: {source}")]
    Io {
        file: String,
        #[source]
        source: io::Error,
    },

    #[error("formatter failed on {file} ({status}): {stderr}")]
    NonZeroExit {
        file: String,
        status: String,
        stderr: String,
    },

    #[error("formatter output for {file} is {len} bytes, below the {min} byte minimum")]
    TooShort { file: String, len: usize, min: usize },

    #[error("formatter timed out on {file} after {timeout:?}")]
    Timeout { file: String, timeout: Duration },
}

/// Format one file's bytes.
///
/// Returns `Ok(None)` when the output equals the input.
pub fn format_source(
    config: &FormatterConfig,
    file: &str,
    input: &[u8],
) -> Result<Option<Vec<u8>>, FormatError> {
    debug!(program = %config.program, file, bytes = input.len(), "running formatter");

    let mut child = Command::new(&config.program)
        .args(&config.args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| FormatError::Spawn {
            program: config.program.clone(),
            source,
        })?;

    let pipe_err = |what: &str| FormatError::Io {
        file: file.to_string(),
        source: io::Error::other(format!("failed to capture {what}")),
    };
    let stdin = child.stdin.take().ok_or_else(|| pipe_err("stdin"))?;
    let stdout = child.stdout.take().ok_or_else(|| pipe_err("stdout"))?;
    let stderr = child.stderr.take().ok_or_else(|| pipe_err("stderr"))?;

    let writer = feed(stdin, input.to_vec());
    let out_reader = drain(stdout);
    let err_reader = drain(stderr);

    let status = wait_with_deadline(&mut child, file, config.timeout)?;

    let output = join(out_reader, file)?;
    let diagnostics = join(err_reader, file)?;
    match writer.join() {
        Ok(Ok(())) => {}
        // the formatter may exit without reading all of its input
        Ok(Err(e)) if e.kind() == io::ErrorKind::BrokenPipe => {}
        Ok(Err(source)) => {
            return Err(FormatError::Io {
                file: file.to_string(),
                source,
            })
        }
        Err(_) => return Err(pipe_err("stdin (writer panicked)")),
    }

    if !status.success() {
        return Err(FormatError::NonZeroExit {
            file: file.to_string(),
            status: status.to_string(),
            stderr: String::from_utf8_lossy(&diagnostics).trim().to_string(),
        });
    }

    if output.len() < config.min_output_len {
        return Err(FormatError::TooShort {
            file: file.to_string(),
            len: output.len(),
            min: config.min_output_len,
        });
    }

    if output == input {
        return Ok(None);
    }
    Ok(Some(output))
}

fn feed(mut stdin: impl Write + Send + 'static, data: Vec<u8>) -> JoinHandle<io::Result<()>> {
    thread::spawn(move || {
        stdin.write_all(&data)?;
        stdin.flush()
        // stdin dropped here, closing the pipe
    })
}

fn drain(mut pipe: impl Read + Send + 'static) -> JoinHandle<io::Result<Vec<u8>>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        pipe.read_to_end(&mut buf)?;
        Ok(buf)
    })
}

fn join(handle: JoinHandle<io::Result<Vec<u8>>>, file: &str) -> Result<Vec<u8>, FormatError> {
    match handle.join() {
        Ok(result) => result.map_err(|source| FormatError::Io {
            file: file.to_string(),
            source,
        }),
        Err(_) => Err(FormatError::Io {
            file: file.to_string(),
            source: io::Error::other("pipe reader panicked"),
        }),
    }
}

fn wait_with_deadline(
    child: &mut Child,
    file: &str,
    timeout: Duration,
) -> Result<ExitStatus, FormatError> {
    let start = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) => {
                if start.elapsed() > timeout {
                    warn!(file, ?timeout, "formatter timed out, killing process");
                    drop(child.kill());
                    drop(child.wait());
                    return Err(FormatError::Timeout {
                        file: file.to_string(),
                        timeout,
                    });
                }
                thread::sleep(POLL_INTERVAL);
            }
            Err(source) => {
                return Err(FormatError::Io {
                    file: file.to_string(),
                    source,
                })
            }
        }
    }
}
