use filetime::FileTime;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};

/// Copy `src` into `out_dir` under its own file name, keeping permissions and
/// timestamps. Creates `out_dir` if needed and overwrites an existing copy.
/// Picking a file that already lives in `out_dir` leaves it untouched.
pub fn copy_into(src: &Path, out_dir: &Path) -> io::Result<PathBuf> {
    let name = src.file_name().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} has no file name", src.display()),
        )
    })?;
    fs::create_dir_all(out_dir)?;
    let dst = out_dir.join(name);
    if dst.exists() && fs::canonicalize(src)? == fs::canonicalize(&dst)? {
        log::info!("{} is already in {}", src.display(), out_dir.display());
        return Ok(dst);
    }
    fs::copy(src, &dst)?;

    let meta = fs::metadata(src)?;
    let atime = FileTime::from_last_access_time(&meta);
    let mtime = FileTime::from_last_modification_time(&meta);
    if let Err(e) = filetime::set_file_times(&dst, atime, mtime) {
        log::warn!("Could not preserve timestamps on {}: {}", dst.display(), e);
    }
    Ok(dst)
}

/// Fire-and-forget copy on its own thread. Failures are logged only.
pub fn spawn_copy(src: PathBuf, out_dir: PathBuf) -> JoinHandle<()> {
    thread::spawn(move || match copy_into(&src, &out_dir) {
        Ok(dst) => log::info!("Picked {} -> {}", src.display(), dst.display()),
        Err(e) => log::error!("Failed to pick {}: {}", src.display(), e),
    })
}
