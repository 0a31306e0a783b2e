use std::fs;
use std::io::{self, ErrorKind};
use std::path::Path;

/// Make sure the destination directory is there before anything is written into it.
///
/// An existing directory is left alone. A missing one is created together with any
/// missing parents, using the platform's default permissions. Something other than a
/// directory at `dest_dir` is reported as `ErrorKind::AlreadyExists`.
///
/// The pipeline calls this exactly once, before any worker starts.
pub fn ensure_output_dir<P: AsRef<Path>>(dest_dir: P) -> io::Result<()> {
    let dest_dir = dest_dir.as_ref();
    match fs::metadata(dest_dir) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(io::Error::new(
            ErrorKind::AlreadyExists,
            format!("{} exists but is not a directory", dest_dir.display()),
        )),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            log::debug!("creating destination directory {}", dest_dir.display());
            fs::create_dir_all(dest_dir)
        }
        Err(e) => Err(e),
    }
}
