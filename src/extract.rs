use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use flate2::read::GzDecoder;

use crate::utils::part_path;

/// Decompress the gzipped artifact at `src` into `dest`, fully replacing any
/// prior content. The output streams into a temporary sibling that is renamed
/// over `dest` only once the whole stream decoded cleanly, so the grid
/// decoder never observes a half-written file.
pub fn extract(src: &Path, dest: &Path) -> Result<()> {
    let input = File::open(src).with_context(|| format!("Failed to open {}", src.display()))?;
    let mut decoder = GzDecoder::new(BufReader::new(input));

    let tmp = part_path(dest);
    let result = decompress_into(&mut decoder, &tmp);
    if let Err(error) = result {
        fs::remove_file(&tmp).ok();
        return Err(error);
    }

    fs::rename(&tmp, dest)
        .with_context(|| format!("Failed to move extracted artifact into {}", dest.display()))?;
    Ok(())
}

fn decompress_into(decoder: &mut GzDecoder<BufReader<File>>, tmp: &Path) -> Result<()> {
    let mut output =
        File::create(tmp).with_context(|| format!("Failed to create {}", tmp.display()))?;
    io::copy(decoder, &mut output).context("Failed to decompress artifact")?;
    output.sync_all().context("Failed to sync extracted artifact")?;
    Ok(())
}
