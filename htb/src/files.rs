use std::{
    fs::{self, File},
    io::{self, BufReader, BufWriter},
    path::{Path, PathBuf},
};

use anyhow::Context;
use htb_patch::{entropy::OsEntropy, patch_stream};
use tracing::{debug, info};

/// Appended to a file's name to get the path its padded copy is written to.
pub const PADDED_SUFFIX: &str = ".htb";

pub fn padded_path(path: &Path) -> PathBuf {
    let mut padded = path.as_os_str().to_owned();
    padded.push(PADDED_SUFFIX);
    PathBuf::from(padded)
}

pub fn patch_stdio(max_padding: u32) -> anyhow::Result<()> {
    let input = io::stdin().lock();
    let output = BufWriter::new(io::stdout().lock());
    patch_stream(input, output, max_padding, &mut OsEntropy)
        .context("could not process standard input")?;
    Ok(())
}

/// Writes a padded copy of `path` next to it, then moves the copy over the original unless
/// `keep` is set.
pub fn patch_file(path: &Path, max_padding: u32, keep: bool) -> anyhow::Result<()> {
    info!(?path, "Padding file");
    let input = BufReader::new(File::open(path).context("cannot open file for reading")?);

    let padded = padded_path(path);
    match fs::remove_file(&padded) {
        Ok(()) => debug!(?padded, "Removed stale padded copy"),
        Err(error) if error.kind() == io::ErrorKind::NotFound => (),
        Err(error) => {
            return Err(error).with_context(|| format!("cannot remove {}", padded.display()))
        }
    }
    let output = BufWriter::new(
        File::create(&padded)
            .with_context(|| format!("cannot open {} for writing", padded.display()))?,
    );

    let format = patch_stream(input, output, max_padding, &mut OsEntropy)?;
    debug!(%format, ?padded, "Wrote padded copy");

    if keep {
        info!(?padded, "Keeping padded copy alongside the original");
    } else {
        fs::rename(&padded, path).with_context(|| {
            format!(
                "cannot replace {} with {}",
                path.display(),
                padded.display()
            )
        })?;
    }

    Ok(())
}
