use fetchgate::{
    Backend, BackendError, Client, ClientError, ClientOwner, ContextError, FetchContext,
    GitBackend, ProcessError, Url,
};
use starbase_sandbox::create_empty_sandbox;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

fn has_git() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .is_ok_and(|output| output.status.success())
}

fn git(dir: &Path, args: &[&str]) {
    let status = Command::new("git")
        .args([
            "-c",
            "user.name=Fetch Test",
            "-c",
            "user.email=fetch@example.com",
            "-c",
            "commit.gpgsign=false",
        ])
        .args(args)
        .current_dir(dir)
        .status()
        .unwrap();

    assert!(status.success(), "git {args:?} failed");
}

fn commit_file(repo: &Path, name: &str, content: &str) {
    fs::write(repo.join(name), content).unwrap();
    git(repo, &["add", "."]);
    git(repo, &["commit", "-q", "-m", name]);
}

fn create_repo(root: &Path) -> std::path::PathBuf {
    let repo = root.join("origin");
    fs::create_dir_all(&repo).unwrap();

    git(&repo, &["init", "-q"]);
    commit_file(&repo, "README.md", "v1");
    git(&repo, &["tag", "v1"]);

    repo
}

// A fake `git` that runs `symbolic_ref` for that subcommand, records
// whether `pull` ran, and succeeds for everything else
fn create_stub_git(root: &Path, symbolic_ref: &str) -> PathBuf {
    let program = root.join("bin/git");
    let marker = root.join("pulled");

    fs::create_dir_all(root.join("bin")).unwrap();
    fs::write(
        &program,
        format!(
            "#!/bin/sh\ncase \"$1\" in\n  symbolic-ref) {symbolic_ref} ;;\n  pull) touch '{}' ;;\nesac\nexit 0\n",
            marker.display()
        ),
    )
    .unwrap();
    fs::set_permissions(&program, fs::Permissions::from_mode(0o755)).unwrap();

    program
}

fn source_for(repo: &Path, suffix: &str) -> String {
    format!("git::{}{suffix}", Url::from_file_path(repo).unwrap())
}

mod git_source {
    use super::*;
    use fetchgate::GitSource;

    #[test]
    fn keeps_url_without_params() {
        let url = Url::parse("https://example.com/repo.git").unwrap();

        assert_eq!(
            GitSource::from_url(&url).unwrap(),
            GitSource {
                url: "https://example.com/repo.git".into(),
                reference: None,
                depth: None,
            }
        );
    }

    #[tokio::test]
    async fn always_resolves_directories() {
        let backend = GitBackend::new();
        backend.bind_owner(std::sync::Arc::new(fetchgate::ClientOwner::default()));

        let mode = backend
            .resolve_mode(
                &FetchContext::new(),
                &Url::parse("https://example.com/repo.git").unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(mode, fetchgate::FetchMode::Directory);
    }
}

mod git_backend {
    use super::*;

    #[tokio::test]
    async fn clones_into_missing_destination() {
        if !has_git() {
            return;
        }

        let sandbox = create_empty_sandbox();
        let repo = create_repo(sandbox.path());
        let dest = sandbox.path().join("clone");

        Client::new()
            .get_dir(&FetchContext::new(), &dest, source_for(&repo, ""))
            .await
            .unwrap();

        assert!(dest.join(".git").exists());
        assert_eq!(fs::read_to_string(dest.join("README.md")).unwrap(), "v1");
    }

    #[tokio::test]
    async fn updates_existing_clone() {
        if !has_git() {
            return;
        }

        let sandbox = create_empty_sandbox();
        let repo = create_repo(sandbox.path());
        let dest = sandbox.path().join("clone");
        let client = Client::new();
        let ctx = FetchContext::new();

        client
            .get_dir(&ctx, &dest, source_for(&repo, ""))
            .await
            .unwrap();

        commit_file(&repo, "CHANGELOG.md", "v2");

        client
            .get_dir(&ctx, &dest, source_for(&repo, ""))
            .await
            .unwrap();

        assert_eq!(fs::read_to_string(dest.join("CHANGELOG.md")).unwrap(), "v2");
    }

    #[tokio::test]
    async fn checks_out_reference() {
        if !has_git() {
            return;
        }

        let sandbox = create_empty_sandbox();
        let repo = create_repo(sandbox.path());
        let dest = sandbox.path().join("clone");

        commit_file(&repo, "README.md", "v2");

        Client::new()
            .get_dir(&FetchContext::new(), &dest, source_for(&repo, "?ref=v1"))
            .await
            .unwrap();

        assert_eq!(fs::read_to_string(dest.join("README.md")).unwrap(), "v1");
    }

    #[tokio::test]
    async fn refuses_non_repository_destination() {
        if !has_git() {
            return;
        }

        let sandbox = create_empty_sandbox();
        let repo = create_repo(sandbox.path());

        sandbox.create_file("clone/keep.txt", "precious");

        let error = Client::new()
            .get_dir(
                &FetchContext::new(),
                sandbox.path().join("clone"),
                source_for(&repo, ""),
            )
            .await
            .unwrap_err();

        assert!(matches!(
            error.as_backend_error(),
            Some(BackendError::DestinationConflict { .. })
        ));
        assert_eq!(
            fs::read_to_string(sandbox.path().join("clone/keep.txt")).unwrap(),
            "precious"
        );
    }

    #[tokio::test]
    async fn extracts_single_file() {
        if !has_git() {
            return;
        }

        let sandbox = create_empty_sandbox();
        let repo = create_repo(sandbox.path());
        let dest = sandbox.path().join("out/README.md");

        Client::new()
            .get_file(&FetchContext::new(), &dest, source_for(&repo, "/README.md"))
            .await
            .unwrap();

        let meta = fs::symlink_metadata(&dest).unwrap();

        assert!(meta.is_file());
        assert_eq!(fs::read_to_string(&dest).unwrap(), "v1");
    }

    #[tokio::test]
    async fn surfaces_command_output_on_failure() {
        if !has_git() {
            return;
        }

        let sandbox = create_empty_sandbox();

        let error = Client::new()
            .get_dir(
                &FetchContext::new(),
                sandbox.path().join("clone"),
                source_for(&sandbox.path().join("does-not-exist"), ""),
            )
            .await
            .unwrap_err();

        match error {
            ClientError::Backend(error) => match *error {
                BackendError::Process(error) => {
                    assert!(error.to_string().contains("git"));
                    assert!(!error.output().is_empty());
                }
                other => panic!("unexpected error {other:?}"),
            },
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn errors_when_deadline_passes_during_update() {
        let sandbox = create_empty_sandbox();
        let backend = GitBackend::with_program(create_stub_git(sandbox.path(), "exec sleep 5"));

        backend.bind_owner(Arc::new(ClientOwner::default()));
        fs::create_dir_all(sandbox.path().join("clone/.git")).unwrap();

        let error = backend
            .get(
                &FetchContext::new().with_timeout(Duration::from_millis(300)),
                &sandbox.path().join("clone"),
                &Url::parse("https://example.com/repo.git").unwrap(),
            )
            .await
            .unwrap_err();

        assert!(error.is_cancellation());
        assert!(matches!(
            &error,
            BackendError::Process(error)
                if matches!(**error, ProcessError::Context(ContextError::DeadlineExceeded))
        ));
        assert!(!sandbox.path().join("pulled").exists());
    }

    #[tokio::test]
    async fn skips_pull_when_detached() {
        let sandbox = create_empty_sandbox();
        let backend = GitBackend::with_program(create_stub_git(sandbox.path(), "exit 1"));

        backend.bind_owner(Arc::new(ClientOwner::default()));
        fs::create_dir_all(sandbox.path().join("clone/.git")).unwrap();

        backend
            .get(
                &FetchContext::new(),
                &sandbox.path().join("clone"),
                &Url::parse("https://example.com/repo.git").unwrap(),
            )
            .await
            .unwrap();

        assert!(!sandbox.path().join("pulled").exists());
    }

    #[tokio::test]
    async fn pulls_when_on_a_branch() {
        let sandbox = create_empty_sandbox();
        let backend = GitBackend::with_program(create_stub_git(sandbox.path(), "exit 0"));

        backend.bind_owner(Arc::new(ClientOwner::default()));
        fs::create_dir_all(sandbox.path().join("clone/.git")).unwrap();

        backend
            .get(
                &FetchContext::new(),
                &sandbox.path().join("clone"),
                &Url::parse("https://example.com/repo.git").unwrap(),
            )
            .await
            .unwrap();

        assert!(sandbox.path().join("pulled").exists());
    }
}
