use std::io;

use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};
use tracing::debug;

/// Number of bytes hashed per read.
pub const TAG_CHUNK_SIZE: usize = 4096;

/// Computes a strong identity tag for the content of `source`.
///
/// The whole source is hashed with SHA-256 from its first byte, and it is
/// rewound to the start again before returning. The tag is quoted so it can be
/// used as an `ETag` as is, e.g. `"sha256:ba7816bf..."`.
pub async fn compute_tag<R>(source: &mut R) -> io::Result<String>
where
    R: AsyncRead + AsyncSeek + Unpin,
{
    source.rewind().await?;

    let mut hasher = Sha256::new();
    let mut buffer = vec![0; TAG_CHUNK_SIZE];
    let mut hashed = 0u64;
    loop {
        match source.read(&mut buffer).await? {
            0 => break,
            n => {
                hasher.update(&buffer[..n]);
                hashed += n as u64;
            }
        }
    }

    source.rewind().await?;

    let tag = format!("\"sha256:{:x}\"", hasher.finalize());
    debug!(hashed, %tag, "computed identity tag");
    Ok(tag)
}
