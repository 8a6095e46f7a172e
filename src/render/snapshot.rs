//! Writing rendered frames to disk as binary PPM.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use super::ImageBuffer;
use crate::{Result, SonarError};

/// Write `frame` to `path` as a binary (P6) PPM image.
pub fn write_ppm<P: AsRef<Path>>(frame: &ImageBuffer, path: P) -> Result<()> {
    let path = path.as_ref();
    let snapshot_error = |e: std::io::Error| SonarError::snapshot_error(path.to_path_buf(), e);

    let file = File::create(path).map_err(snapshot_error)?;
    let mut out = BufWriter::new(file);
    let size = frame.size();
    write!(out, "P6\n{} {}\n255\n", size.width, size.height).map_err(snapshot_error)?;
    out.write_all(frame.as_bytes()).map_err(snapshot_error)?;
    out.flush().map_err(snapshot_error)?;
    Ok(())
}
