use std::io::ErrorKind;
use std::path::PathBuf;
use tailsearch_protocol::{AgentId, ErrorCode, FileRequest};
use tailsearch_reader::{
    BackwardLineReader, FilterStage, LineFilter, ReaderError, DEFAULT_BUFFER_SIZE,
};
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Agent-side request handler: resolves a file in the local shard and
/// produces a filtered, capped, tail-first partial result.
pub struct SearchAgent {
    id: AgentId,
    read_dir: PathBuf,
    buffer_size: usize,
}

impl SearchAgent {
    pub fn new(id: AgentId, read_dir: impl Into<PathBuf>) -> Self {
        Self {
            id,
            read_dir: read_dir.into(),
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    pub fn id(&self) -> &AgentId {
        &self.id
    }

    /// Resolve the requested file and set up the read pipeline, pushing
    /// keyword and cap down so only relevant lines ever leave this node.
    ///
    /// An absent or unreadable file yields an explicit [`ErrorCode`]; the
    /// transport must deliver it in place of a stream, never a silent
    /// close, because the primary's response counting depends on hearing
    /// back either way.
    pub async fn open_stream(&self, request: &FileRequest) -> Result<AgentStream, ErrorCode> {
        let path = self.read_dir.join(&request.filename);
        log::info!(
            "agent {}: request {} for {}",
            self.id,
            request.request_id,
            path.display()
        );

        let reader = BackwardLineReader::with_buffer_size(&path, self.buffer_size)
            .await
            .map_err(|err| {
                let ReaderError::Io(io) = &err;
                let code = match io.kind() {
                    ErrorKind::NotFound => ErrorCode::NotFound,
                    ErrorKind::PermissionDenied => ErrorCode::Unreadable,
                    _ => ErrorCode::Internal,
                };
                log::warn!("agent {}: cannot open {}: {err}", self.id, path.display());
                code
            })?;

        let agent = self.id.clone();
        let request_id = request.request_id.clone();
        let stage = FilterStage::new(
            reader,
            LineFilter::new(request.keyword.clone(), request.last.map(|n| n as usize)),
        )
        .with_cancel(Box::new(move || {
            log::debug!("agent {agent}: cap reached for request {request_id}, stopping file read");
        }));

        Ok(AgentStream { stage })
    }
}

/// One agent's in-flight partial result, pulled lazily from the file.
pub struct AgentStream {
    stage: FilterStage<BackwardLineReader>,
}

impl AgentStream {
    /// Stream every retained line into `sink`, newline-terminated. The
    /// caller signals end-of-stream (shutdown/close) once this returns.
    pub async fn write_to<W: AsyncWrite + Unpin + Send>(
        &mut self,
        sink: &mut W,
    ) -> std::io::Result<()> {
        while let Some(line) = self
            .stage
            .next_line()
            .await
            .map_err(|ReaderError::Io(io)| io)?
        {
            sink.write_all(line.as_bytes()).await?;
            sink.write_all(b"\n").await?;
        }
        sink.flush().await
    }
}
