use adler32::RollingAdler32;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::Error;

/// Appends one member's tar header and content onto `writer`, reading
/// `reader` in `chunk_size`-sized pieces and folding each chunk into
/// `checksum` (the running ADLER32 over the whole aggregate, spec §4.7).
pub async fn append_member(
    writer: &mut (impl AsyncWrite + Unpin),
    mut reader: impl AsyncRead + Unpin,
    path: &str,
    size: u64,
    mode: u32,
    chunk_size: usize,
    checksum: &mut RollingAdler32,
) -> Result<(), Error> {
    let mut header = tar::Header::new_gnu();
    header.set_path(path)?;
    header.set_size(size);
    header.set_mode(mode);
    header.set_mtime(0);
    header.set_cksum();
    writer.write_all(header.as_bytes()).await?;

    let mut buf = vec![0u8; chunk_size.max(1)];
    let mut written: u64 = 0;
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        checksum.update_buffer(&buf[..n]);
        writer.write_all(&buf[..n]).await?;
        written += n as u64;
    }

    let padding = (512 - (written % 512)) % 512;
    if padding > 0 {
        writer.write_all(&vec![0u8; padding as usize]).await?;
    }
    Ok(())
}

/// Writes the two 512-byte zero blocks that terminate a tar stream.
pub async fn write_end_marker(writer: &mut (impl AsyncWrite + Unpin)) -> Result<(), Error> {
    writer.write_all(&[0u8; 1024]).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn appends_a_header_padded_content_and_updates_the_checksum() {
        let mut out = Vec::new();
        let mut checksum = RollingAdler32::new();
        append_member(&mut out, &b"hello"[..], "a/b.txt", 5, 0o644, 3, &mut checksum)
            .await
            .unwrap();

        // 512-byte header + 512-byte padded content block.
        assert_eq!(out.len(), 1024);

        let mut expected = RollingAdler32::new();
        expected.update_buffer(b"hel");
        expected.update_buffer(b"lo");
        assert_eq!(checksum.hash(), expected.hash());
    }

    #[tokio::test]
    async fn end_marker_is_two_zero_blocks() {
        let mut out = Vec::new();
        write_end_marker(&mut out).await.unwrap();
        assert_eq!(out.len(), 1024);
        assert!(out.iter().all(|&b| b == 0));
    }
}
