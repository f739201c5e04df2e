use crate::context::{ContextError, FetchContext};
use starbase_styles::{Style, Stylize, color};
use std::io;
use std::process::{ExitStatus, Stdio};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tracing::trace;

#[derive(Error, Debug, miette::Diagnostic)]
pub enum ProcessError {
    #[diagnostic(transparent)]
    #[error(transparent)]
    Context(#[from] ContextError),

    #[diagnostic(code(fetchgate::process::launch_failed))]
    #[error(
        "Error running {}: {}",
        .command.style(Style::Shell),
        .output.style(Style::MutedLight),
    )]
    FailedLaunch {
        command: String,
        output: String,
        #[source]
        error: Box<io::Error>,
    },

    #[diagnostic(code(fetchgate::process::non_zero_exit))]
    #[error(
        "{} exited with {status}: {}",
        .command.style(Style::Shell),
        .output.style(Style::MutedLight),
    )]
    FailedNonZeroExit {
        command: String,
        status: ExitStatus,
        output: String,
    },
}

impl ProcessError {
    /// Combined stdout and stderr captured before the failure.
    pub fn output(&self) -> &str {
        match self {
            Self::Context(_) => "",
            Self::FailedLaunch { output, .. } | Self::FailedNonZeroExit { output, .. } => output,
        }
    }
}

/// Run the command with stdout and stderr merged into a single buffer.
/// On success the buffer is discarded, otherwise it's attached to the error
/// together with the program and exit status. Every backend that shells out
/// should go through this, so that failures look the same.
///
/// The program is reported as configured on the command (`git`), not the
/// executable it resolves to on `PATH`.
pub async fn run_captured(ctx: &FetchContext, command: &mut Command) -> Result<(), ProcessError> {
    let program = command
        .as_std()
        .get_program()
        .to_string_lossy()
        .to_string();
    let command_line = format_command_line(command);

    trace!(
        cwd = ?command.as_std().get_current_dir(),
        "Running command {}",
        color::shell(&command_line)
    );

    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|error| ProcessError::FailedLaunch {
            command: program.clone(),
            output: String::new(),
            error: Box::new(error),
        })?;

    let mut buffer = vec![];

    let status = ctx
        .run(async {
            wait_with_merged_output(&mut child, &mut buffer)
                .await
                .map_err(|error| ProcessError::FailedLaunch {
                    command: program.clone(),
                    output: String::from_utf8_lossy(&buffer).to_string(),
                    error: Box::new(error),
                })
        })
        .await?;

    let output = String::from_utf8_lossy(&buffer).to_string();

    trace!(
        status = %status,
        output = if output.len() > 250 {
            "<truncated>"
        } else {
            &output
        },
        "Ran command {}",
        color::shell(&command_line)
    );

    if status.success() {
        return Ok(());
    }

    Err(ProcessError::FailedNonZeroExit {
        command: program,
        status,
        output,
    })
}

fn format_command_line(command: &Command) -> String {
    let inner = command.as_std();

    format!(
        "{} {}",
        inner.get_program().to_string_lossy(),
        shell_words::join(
            inner
                .get_args()
                .map(|arg| arg.to_string_lossy())
                .collect::<Vec<_>>()
        )
    )
    .trim_end()
    .to_owned()
}

// Interleaves both streams in the order chunks arrive, which is as
// close to a shared pipe as we can get with separate handles.
async fn wait_with_merged_output(
    child: &mut Child,
    buffer: &mut Vec<u8>,
) -> io::Result<ExitStatus> {
    let mut stdout = child.stdout.take();
    let mut stderr = child.stderr.take();
    let mut out_chunk = [0u8; 8192];
    let mut err_chunk = [0u8; 8192];

    while stdout.is_some() || stderr.is_some() {
        tokio::select! {
            read = read_chunk(&mut stdout, &mut out_chunk) => match read? {
                0 => stdout = None,
                size => buffer.extend_from_slice(&out_chunk[..size]),
            },
            read = read_chunk(&mut stderr, &mut err_chunk) => match read? {
                0 => stderr = None,
                size => buffer.extend_from_slice(&err_chunk[..size]),
            },
        }
    }

    child.wait().await
}

async fn read_chunk<R: AsyncRead + Unpin>(
    reader: &mut Option<R>,
    chunk: &mut [u8],
) -> io::Result<usize> {
    match reader {
        Some(reader) => reader.read(chunk).await,
        None => std::future::pending().await,
    }
}
