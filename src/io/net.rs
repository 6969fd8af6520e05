use crate::{error::Result, io::progress::emit_download_progress};
use reqwest::blocking::Client;
use std::{
    fs::{self, File},
    io::{Read, Write},
    path::Path,
    time::Duration,
};
use tempfile::NamedTempFile;
use tracing::debug;

pub fn http_client() -> Result<Client> {
    Ok(Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(60 * 60))
        .build()?)
}

/// Streams `url` into `dest`. Bytes land in `<dest>.part` first and are
/// renamed over `dest` only once the transfer completed; a failed transfer
/// leaves `dest` untouched and removes the partial file.
pub fn download_with_progress(client: &Client, url: &str, dest: &Path) -> Result<u64> {
    let tmp = dest.with_extension("part");

    let result = stream_into(client, url, &tmp);
    let downloaded = match result {
        Ok(n) => n,
        Err(e) => {
            fs::remove_file(&tmp).ok();
            return Err(e);
        }
    };

    if dest.exists() {
        fs::remove_file(dest).ok();
    }
    fs::rename(&tmp, dest)?;

    emit_download_progress(downloaded, downloaded);
    debug!(url, bytes = downloaded, dest = %dest.display(), "download complete");

    Ok(downloaded)
}

fn stream_into(client: &Client, url: &str, path: &Path) -> Result<u64> {
    let mut resp = client.get(url).send()?.error_for_status()?;
    let total = resp.content_length().unwrap_or(0);

    emit_download_progress(0, total);

    let mut file = File::create(path)?;
    let mut downloaded: u64 = 0;
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = resp.read(&mut buf)?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n])?;
        downloaded += n as u64;
        emit_download_progress(downloaded, total);
    }
    file.flush()?;
    file.sync_all()?;

    Ok(downloaded)
}

/// Downloads `url` into a fresh named temporary file inside `dir`. The file
/// is deleted when the returned handle drops.
pub fn fetch_to_tempfile(client: &Client, url: &str, dir: &Path) -> Result<NamedTempFile> {
    fs::create_dir_all(dir)?;

    let suffix = url_extension(url)
        .map(|ext| format!(".{ext}"))
        .unwrap_or_default();
    let mut tmp = tempfile::Builder::new()
        .prefix("d3net-input-")
        .suffix(&suffix)
        .tempfile_in(dir)?;

    let mut resp = client.get(url).send()?.error_for_status()?;
    let n = resp.copy_to(tmp.as_file_mut())?;
    tmp.as_file_mut().flush()?;
    debug!(url, bytes = n, path = %tmp.path().display(), "fetched remote input");

    Ok(tmp)
}

/// Extension of the last path segment of a URL, ignoring query and fragment.
pub fn url_extension(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let rest = path.split_once("://").map(|(_, r)| r).unwrap_or(path);
    let (_, path) = rest.split_once('/')?;
    let last = path.rsplit('/').next()?;
    let (stem, ext) = last.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext)
}
