//! File helpers
//!
//! Temp-file-then-rename writes and pooled whole-file reads, in blocking and
//! async flavours.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::buffer::RentedBuffer;
use crate::error::Result;

/// Spare room requested per read call
pub(super) const READ_SLACK: usize = 8 * 1024;

/// `<path>.tmp`, next to the backing file so the rename stays on one
/// filesystem
pub(super) fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Write `tmp` with `write`, then rename it over `path`.
///
/// On any failure the temp file is removed and `path` is untouched.
pub(super) fn replace_file<F>(path: &Path, tmp: &Path, sync: bool, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<()>,
{
    let written = (|| -> Result<()> {
        let raw = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(tmp)?;
        let mut file = BufWriter::new(raw);
        write(&mut file)?;
        file.flush()?;

        let raw = file.into_inner().map_err(|e| e.into_error())?;
        if sync {
            raw.sync_all()?;
        }
        Ok(())
    })();

    if let Err(e) = written {
        let _ = fs::remove_file(tmp);
        return Err(e);
    }

    fs::rename(tmp, path)?;
    if sync {
        sync_parent(path);
    }
    Ok(())
}

/// Fsync the parent directory so the rename survives a crash
pub(super) fn sync_parent(path: &Path) {
    if let Some(parent) = path.parent() {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }
}

/// Read all of `reader` into `out`
pub(super) fn read_into<R: Read>(mut reader: R, out: &mut RentedBuffer<'_>) -> Result<()> {
    loop {
        let region = out.writable(READ_SLACK);
        match reader.read(region) {
            Ok(0) => return Ok(()),
            Ok(n) => out.advance(n),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
}

/// Async twin of [`read_into`]
pub(super) async fn read_into_async<R>(reader: &mut R, out: &mut RentedBuffer<'_>) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    loop {
        let region = out.writable(READ_SLACK);
        match reader.read(region).await {
            Ok(0) => return Ok(()),
            Ok(n) => out.advance(n),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
}
