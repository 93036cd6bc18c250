use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::oneshot;
use tokio_util::io::ReaderStream;

use crate::error::Error;

/// An `AsyncWrite` that drives a PUT request to a tape aggregate's URL.
///
/// `reqwest` wants a `Body` stream constructed up front rather than a
/// writable handle (see `nlds_tape::TapeClient::open_write`'s doc
/// comment), so this pairs a `tokio::io::duplex` with a background
/// task that streams the read half into the request body. Writing into
/// this type, then calling `finish`, is the write-side equivalent of
/// `reqwest::Response::bytes_stream()` on the read side.
pub struct AggregateWriter {
    write_half: tokio::io::DuplexStream,
    done: oneshot::Receiver<Result<(), Error>>,
}

impl AggregateWriter {
    pub fn open(http: reqwest::Client, url: reqwest::Url) -> Self {
        let (write_half, read_half) = tokio::io::duplex(256 * 1024);
        let (done_tx, done_rx) = oneshot::channel();

        let body = reqwest::Body::wrap_stream(ReaderStream::new(read_half));
        tokio::spawn(async move {
            let result = http
                .put(url)
                .body(body)
                .send()
                .await
                .and_then(|resp| resp.error_for_status())
                .map(|_| ())
                .map_err(Error::from);
            let _ = done_tx.send(result);
        });

        Self { write_half, done: done_rx }
    }

    /// Closes the write side and awaits the PUT request's outcome. Must
    /// be called exactly once after the whole tar stream has been
    /// written; dropping the writer early aborts the upload.
    pub async fn finish(mut self) -> Result<(), Error> {
        self.write_half.shutdown().await?;
        self.done.await.map_err(|_| Error::WriterTaskLost)?
    }
}

impl AsyncWrite for AggregateWriter {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.get_mut().write_half).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().write_half).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().write_half).poll_shutdown(cx)
    }
}
