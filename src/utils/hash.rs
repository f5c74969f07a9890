use sha2::{Digest, Sha256};
use std::path::Path;

pub async fn calculate_hash_from_reader<R: tokio::io::AsyncRead + Unpin>(
    mut reader: R,
) -> anyhow::Result<String> {
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    loop {
        let n = tokio::io::AsyncReadExt::read(&mut reader, &mut buffer).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    let result = hasher.finalize();
    Ok(hex::encode(result))
}

/// SHA-256 of the file at `path`, hex encoded
pub async fn calculate_file_hash(path: &Path) -> anyhow::Result<String> {
    let file = tokio::fs::File::open(path).await?;
    calculate_hash_from_reader(file).await
}

/// Join key for a scan: `MALICE_SCANID` when set, else the file's SHA-256
pub async fn correlation_id(path: &Path) -> anyhow::Result<String> {
    match crate::config::getopt("MALICE_SCANID") {
        Some(id) => Ok(id),
        None => calculate_file_hash(path).await,
    }
}
