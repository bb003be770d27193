use std::io;
use std::path::Path;

use uuid::Uuid;

/// Writes `contents` to `path` via a temp file in the same directory
/// followed by a rename, so a reader never observes a torn file (§4.B.1).
/// Shared by the Plan Store and Memory, both of which persist documents that
/// must never appear half-written after a crash mid-write.
pub fn atomic_write(path: &Path, contents: &[u8]) -> io::Result<()> {
    let dir = path.parent().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "path has no parent directory")
    })?;
    std::fs::create_dir_all(dir)?;
    let tmp_name = format!(".{}.tmp-{}", file_name_or_empty(path), Uuid::new_v4());
    let tmp_path = dir.join(tmp_name);
    std::fs::write(&tmp_path, contents)?;
    std::fs::rename(&tmp_path, path)
}

fn file_name_or_empty(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("file")
        .to_string()
}
