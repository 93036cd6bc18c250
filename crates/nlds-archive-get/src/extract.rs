use tokio::io::{AsyncRead, AsyncReadExt, Take};

use crate::error::Error;

/// One entry read off a tape archive's tar stream: the in-tar member
/// path (its `object_name`) and declared size. The content itself is
/// consumed by the caller via `bounded_reader`/`skip_member` before the
/// next call to `next_header`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberHeader {
    pub path: String,
    pub size: u64,
}

/// Reads the next 512-byte tar header off `reader`. Returns `None` once
/// the archive's two-zero-block end marker is reached.
pub async fn next_header(reader: &mut (impl AsyncRead + Unpin)) -> Result<Option<MemberHeader>, Error> {
    let mut header = tar::Header::new_gnu();
    reader.read_exact(header.as_mut_bytes()).await?;

    if header.as_bytes().iter().all(|&b| b == 0) {
        return Ok(None);
    }

    let path = header.path()?.into_owned();
    let size = header.size()?;
    Ok(Some(MemberHeader { path, size }))
}

/// Bounds `reader` to this member's exact content length, so it can be
/// handed straight to `ObjectStoreClient::put_stream` without reading the
/// next member's bytes. Call `skip_padding` afterward to land on the next
/// header's boundary.
pub fn bounded_reader<R: AsyncRead + Unpin>(reader: &mut R, size: u64) -> Take<&mut R> {
    reader.take(size)
}

/// Discards `size` content bytes plus the tar padding, used when a
/// member isn't one of the paths this request wants, or to skip past
/// the padding after reading a wanted member's content.
pub async fn skip_member(reader: &mut (impl AsyncRead + Unpin), size: u64) -> Result<(), Error> {
    let mut limited = bounded_reader(reader, size);
    tokio::io::copy(&mut limited, &mut tokio::io::sink()).await?;
    skip_padding(reader, size).await
}

/// Advances past the zero padding following a `size`-byte tar content
/// block, landing the reader on the next 512-byte boundary.
pub async fn skip_padding(reader: &mut (impl AsyncRead + Unpin), content_size: u64) -> Result<(), Error> {
    let padding = (512 - (content_size % 512)) % 512;
    if padding > 0 {
        let mut buf = vec![0u8; padding as usize];
        reader.read_exact(&mut buf).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tar_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut out = Vec::new();
        for (path, content) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_path(path).unwrap();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_mtime(0);
            header.set_cksum();
            out.extend_from_slice(header.as_bytes());
            out.extend_from_slice(content);
            let padding = (512 - (content.len() % 512)) % 512;
            out.extend(std::iter::repeat(0u8).take(padding));
        }
        out.extend_from_slice(&[0u8; 1024]);
        out
    }

    #[tokio::test]
    async fn reads_headers_and_content_for_two_members() {
        let bytes = tar_bytes(&[("a.txt", b"hello"), ("b.txt", b"world!")]);
        let mut reader = &bytes[..];

        let first = next_header(&mut reader).await.unwrap().unwrap();
        assert_eq!(first, MemberHeader { path: "a.txt".to_string(), size: 5 });
        let mut out = Vec::new();
        {
            let mut limited = bounded_reader(&mut reader, first.size);
            tokio::io::copy(&mut limited, &mut out).await.unwrap();
        }
        skip_padding(&mut reader, first.size).await.unwrap();
        assert_eq!(out, b"hello");

        let second = next_header(&mut reader).await.unwrap().unwrap();
        assert_eq!(second, MemberHeader { path: "b.txt".to_string(), size: 6 });
        skip_member(&mut reader, second.size).await.unwrap();

        assert!(next_header(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn skip_member_advances_past_padded_content() {
        let bytes = tar_bytes(&[("skip.bin", b"xyz"), ("keep.bin", b"keepme")]);
        let mut reader = &bytes[..];

        let first = next_header(&mut reader).await.unwrap().unwrap();
        skip_member(&mut reader, first.size).await.unwrap();

        let second = next_header(&mut reader).await.unwrap().unwrap();
        assert_eq!(second.path, "keep.bin");
        let mut out = Vec::new();
        {
            let mut limited = bounded_reader(&mut reader, second.size);
            tokio::io::copy(&mut limited, &mut out).await.unwrap();
        }
        assert_eq!(out, b"keepme");
    }
}
