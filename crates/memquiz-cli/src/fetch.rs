//! Raw corpus download.

use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use sha2::{Digest, Sha256};
use tracing::info;

use memquiz_core::DatasetVariant;

use crate::config::DataConfig;

#[derive(Debug)]
pub enum FetchOutcome {
    Downloaded { path: PathBuf, bytes: u64, sha256: String },
    KeptExisting(PathBuf),
}

/// Hosted builds only fetch when explicitly allowed.
pub fn fetch_permitted(hosted: bool, allow_fetch: bool) -> bool {
    !hosted || allow_fetch
}

pub fn source_url(base_url: &str, variant: DatasetVariant) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), variant.raw_file())
}

/// Download every variant's raw corpus concurrently. Any failure fails the
/// whole fetch.
pub fn fetch_all(config: &DataConfig) -> Result<Vec<FetchOutcome>> {
    fs::create_dir_all(&config.raw_dir)
        .with_context(|| format!("cannot create {}", config.raw_dir.display()))?;

    std::thread::scope(|scope| {
        let handles: Vec<_> = DatasetVariant::ALL
            .iter()
            .map(|&variant| {
                let url = source_url(&config.base_url, variant);
                let dest = config.raw_dir.join(variant.raw_file());
                scope.spawn(move || download(&url, &dest, config.overwrite))
            })
            .collect();

        handles
            .into_iter()
            .map(|h| match h.join() {
                Ok(result) => result,
                Err(_) => bail!("download thread panicked"),
            })
            .collect()
    })
}

fn download(url: &str, dest: &Path, overwrite: bool) -> Result<FetchOutcome> {
    if dest.exists() && !overwrite {
        info!("{} exists, keeping it", dest.display());
        return Ok(FetchOutcome::KeptExisting(dest.to_path_buf()));
    }

    eprintln!("Downloading {url}");
    let response = match ureq::get(url).call() {
        Ok(r) => r,
        Err(ureq::Error::Status(code, _)) => bail!("Failed with status {code}: {url}"),
        Err(e) => return Err(e).with_context(|| format!("request to {url} failed")),
    };

    let tmp = dest.with_extension("json.download");
    match stream_to(&mut response.into_reader(), &tmp) {
        Ok((bytes, sha256)) => {
            fs::rename(&tmp, dest)
                .with_context(|| format!("cannot move {} into place", tmp.display()))?;
            Ok(FetchOutcome::Downloaded {
                path: dest.to_path_buf(),
                bytes,
                sha256,
            })
        }
        Err(e) => {
            let _ = fs::remove_file(&tmp);
            Err(e.context(format!("downloading {url}")))
        }
    }
}

/// Copy `reader` into `path`, returning byte count and SHA-256.
fn stream_to(reader: &mut dyn Read, path: &Path) -> Result<(u64, String)> {
    let file = File::create(path).with_context(|| format!("cannot create {}", path.display()))?;
    let mut out = BufWriter::new(file);
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    let mut total = 0u64;

    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        out.write_all(&buf[..n])?;
        total += n as u64;
    }
    out.flush()?;
    out.get_ref().sync_all()?;

    Ok((total, format!("{:x}", hasher.finalize())))
}
