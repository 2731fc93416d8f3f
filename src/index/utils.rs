use crate::error::Result;
use std::fs::File;
use std::path::Path;

/// Recursively copies a generation directory and fsyncs every file and
/// directory it creates, so the copy is durable before it is renamed into
/// view. The tantivy writer lock file is not copied.
pub fn copy_dir_durable(src: &Path, dst: &Path) -> Result<()> {
    std::fs::create_dir_all(dst)?;

    let entries: Vec<_> = std::fs::read_dir(src)?.collect::<std::result::Result<Vec<_>, _>>()?;

    for entry in entries {
        let path = entry.path();
        let file_name = entry.file_name();
        let file_name_str = file_name.to_string_lossy();

        if file_name_str == ".tantivy-writer.lock" || file_name_str.starts_with(".tmp") {
            continue;
        }

        let dest_path = dst.join(&file_name);

        if entry.file_type()?.is_dir() {
            copy_dir_durable(&path, &dest_path)?;
        } else {
            std::fs::copy(&path, &dest_path)?;
            File::open(&dest_path)?.sync_all()?;
        }
    }

    sync_dir(dst)
}

/// Flushes a directory entry table. Needed after create/rename for the new
/// name to survive a crash.
pub fn sync_dir(dir: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        File::open(dir)?.sync_all()?;
    }
    #[cfg(not(unix))]
    {
        let _ = dir;
    }
    Ok(())
}
