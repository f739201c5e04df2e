use crate::backend_error::BackendError;
use crate::context::FetchContext;
use crate::owner::ClientOwner;
use std::fs::Permissions;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::trace;

/// Copy the source file's contents into `dest`, reading in chunks so the
/// context is observed throughout, then apply `mode` minus the umask.
/// Contents are staged in a hidden `.part` sibling and renamed into place,
/// so a failed or cancelled copy leaves `dest` untouched.
/// Returns the amount of bytes copied.
pub async fn copy_file(
    ctx: &FetchContext,
    owner: &ClientOwner,
    dest: &Path,
    src: &Path,
    mode: u32,
) -> Result<u64, BackendError> {
    let map_copy_error = |error: std::io::Error| BackendError::FailedCopy {
        from: src.to_path_buf(),
        to: dest.to_path_buf(),
        error: Box::new(error),
    };

    if owner.disable_symlinks() {
        let metadata = std::fs::symlink_metadata(src).map_err(|error| BackendError::FailedStat {
            path: src.to_path_buf(),
            error: Box::new(error),
        })?;

        if metadata.file_type().is_symlink() {
            return Err(BackendError::SymlinksDisabled {
                path: src.to_path_buf(),
            });
        }
    }

    trace!(from = ?src, to = ?dest, "Copying file");

    let mut input = tokio::fs::File::open(src).await.map_err(map_copy_error)?;
    let total = input.metadata().await.map(|meta| meta.len()).ok();
    let part_file = part_path(dest);

    // Nothing lands at the destination until every byte is written
    let result = async {
        let mut output = tokio::fs::File::create(&part_file)
            .await
            .map_err(map_copy_error)?;
        let mut chunk = vec![0u8; 64 * 1024];
        let mut copied = 0u64;

        loop {
            let size = ctx
                .run(async { input.read(&mut chunk).await.map_err(map_copy_error) })
                .await?;

            if size == 0 {
                break;
            }

            ctx.run(async { output.write_all(&chunk[..size]).await.map_err(map_copy_error) })
                .await?;

            copied += size as u64;
            owner.report_progress(copied, total);
        }

        output.flush().await.map_err(map_copy_error)?;

        tokio::fs::set_permissions(&part_file, Permissions::from_mode(mode & !owner.umask()))
            .await
            .map_err(map_copy_error)?;

        Ok::<_, BackendError>(copied)
    }
    .await;

    let copied = match result {
        Ok(copied) => copied,
        Err(error) => {
            let _ = std::fs::remove_file(&part_file);

            return Err(error);
        }
    };

    std::fs::rename(&part_file, dest).map_err(|error| BackendError::FailedWrite {
        path: dest.to_path_buf(),
        error: Box::new(error),
    })?;

    trace!(from = ?src, to = ?dest, bytes = copied, "Copied file");

    Ok(copied)
}

/// Hidden sibling a file is staged in before being renamed over `dest`.
pub(crate) fn part_path(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();

    dest.with_file_name(format!(".{name}.part"))
}
