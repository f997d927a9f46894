use crate::backward::BackwardLineReader;
use crate::error::Result;
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Lines};

/// Async pull seam over anything that yields whole lines.
///
/// Implemented by [`BackwardLineReader`] for tail-first file reads and by
/// [`ForwardLines`] for forward byte streams (subprocess stdout, received
/// partial streams).
#[async_trait]
pub trait LineSource: Send {
    async fn next_line(&mut self) -> Result<Option<String>>;
}

#[async_trait]
impl LineSource for BackwardLineReader {
    async fn next_line(&mut self) -> Result<Option<String>> {
        BackwardLineReader::next_line(self).await
    }
}

/// Forward line source over any async byte stream.
pub struct ForwardLines<R> {
    inner: Lines<BufReader<R>>,
}

impl<R: AsyncRead + Unpin + Send> ForwardLines<R> {
    pub fn new(reader: R) -> Self {
        Self {
            inner: BufReader::new(reader).lines(),
        }
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> LineSource for ForwardLines<R> {
    async fn next_line(&mut self) -> Result<Option<String>> {
        Ok(self.inner.next_line().await?)
    }
}
