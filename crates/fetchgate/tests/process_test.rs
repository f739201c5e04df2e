use fetchgate::{ContextError, FetchContext, ProcessError, run_captured};
use std::time::{Duration, Instant};
use tokio::process::Command;

fn sh(script: &str) -> Command {
    let mut cmd = Command::new("/bin/sh");
    cmd.arg("-c").arg(script);
    cmd
}

mod captured_output {
    use super::*;

    #[tokio::test]
    async fn succeeds_for_zero_exit() {
        run_captured(&FetchContext::new(), &mut sh("echo hidden"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn reports_non_zero_exit_with_output() {
        let error = run_captured(
            &FetchContext::new(),
            &mut sh("echo out; echo err 1>&2; exit 2"),
        )
        .await
        .unwrap_err();

        match &error {
            ProcessError::FailedNonZeroExit {
                command,
                status,
                output,
            } => {
                assert_eq!(command, "/bin/sh");
                assert_eq!(status.code(), Some(2));
                assert!(output.contains("out"));
                assert!(output.contains("err"));
            }
            other => panic!("unexpected error {other:?}"),
        }

        let message = error.to_string();

        assert!(message.contains("/bin/sh"));
        assert!(message.contains("out"));
        assert!(message.contains("err"));
    }

    #[tokio::test]
    async fn reports_launch_failure() {
        let mut cmd = Command::new("/nonexistent/fetchgate-binary");

        let error = run_captured(&FetchContext::new(), &mut cmd)
            .await
            .unwrap_err();

        assert!(matches!(
            &error,
            ProcessError::FailedLaunch { command, output, .. }
                if command == "/nonexistent/fetchgate-binary" && output.is_empty()
        ));
        assert!(error.to_string().contains("/nonexistent/fetchgate-binary"));
    }

    #[tokio::test]
    async fn names_program_as_configured() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("exit 1");

        let error = run_captured(&FetchContext::new(), &mut cmd)
            .await
            .unwrap_err();

        assert!(matches!(
            &error,
            ProcessError::FailedNonZeroExit { command, .. } if command == "sh"
        ));
    }

    #[tokio::test]
    async fn aborts_when_cancelled() {
        let ctx = FetchContext::new();
        let cancel = ctx.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            cancel.cancel();
        });

        let started = Instant::now();
        let error = run_captured(&ctx, &mut sh("sleep 30")).await.unwrap_err();

        assert!(matches!(error, ProcessError::Context(ContextError::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn aborts_on_deadline() {
        let ctx = FetchContext::new().with_timeout(Duration::from_millis(100));

        let error = run_captured(&ctx, &mut sh("sleep 30")).await.unwrap_err();

        assert!(matches!(
            error,
            ProcessError::Context(ContextError::DeadlineExceeded)
        ));
    }
}
