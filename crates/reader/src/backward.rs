use crate::error::Result;
use std::collections::VecDeque;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, SeekFrom};

pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Lazy, finite, non-restartable reader yielding a file's lines last-first.
///
/// The file is scanned backward in fixed-size chunks. A trailing-fragment
/// buffer carries the bytes of a line that straddles a chunk boundary: the
/// fragment is always file-forward-adjacent to the end of the chunk read
/// next, so stitching is `chunk ++ fragment` before splitting on `\n`.
/// Fragments are stitched at the byte level, so multi-byte UTF-8 sequences
/// split by a chunk boundary reassemble correctly; invalid UTF-8 anywhere in
/// a line is replaced during decoding.
pub struct BackwardLineReader {
    file: File,
    /// Byte offset one past the next chunk to read; 0 means the whole file
    /// has been consumed.
    cursor: u64,
    buffer_size: usize,
    /// Bytes of the (still incomplete) line whose start lies before `cursor`.
    fragment: Vec<u8>,
    /// Decoded lines ready for emission, newest first.
    pending: VecDeque<String>,
    started: bool,
    finished: bool,
}

impl BackwardLineReader {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::with_buffer_size(path, DEFAULT_BUFFER_SIZE).await
    }

    pub async fn with_buffer_size(path: impl AsRef<Path>, buffer_size: usize) -> Result<Self> {
        let file = File::open(&path).await?;
        let len = file.metadata().await?.len();
        log::debug!(
            "reading {} backward ({len} bytes, {buffer_size} byte chunks)",
            path.as_ref().display()
        );
        Ok(Self {
            file,
            cursor: len,
            buffer_size: buffer_size.max(1),
            fragment: Vec::new(),
            pending: VecDeque::new(),
            started: false,
            finished: false,
        })
    }

    /// Pull the next line, or `None` once the file's first line has been
    /// emitted. A file ending in a newline does not yield a trailing empty
    /// line, matching a forward newline-delimited read.
    pub async fn next_line(&mut self) -> Result<Option<String>> {
        loop {
            if let Some(line) = self.pending.pop_front() {
                return Ok(Some(line));
            }
            if self.finished {
                return Ok(None);
            }
            if self.cursor == 0 {
                self.finished = true;
                if self.started {
                    let first = String::from_utf8_lossy(&self.fragment).into_owned();
                    self.fragment.clear();
                    return Ok(Some(first));
                }
                return Ok(None);
            }
            self.fill().await?;
        }
    }

    /// Read the chunk ending at `cursor` and queue its complete lines.
    async fn fill(&mut self) -> Result<()> {
        let len = (self.buffer_size as u64).min(self.cursor);
        let start = self.cursor - len;
        self.file.seek(SeekFrom::Start(start)).await?;
        let mut combined = vec![0u8; len as usize];
        self.file.read_exact(&mut combined).await?;
        let first_chunk = !self.started;
        self.started = true;
        self.cursor = start;

        // The held fragment is the continuation of this chunk's last line.
        combined.append(&mut self.fragment);

        let ends_with_newline = combined.last() == Some(&b'\n');
        let mut segments: Vec<&[u8]> = combined.split(|&b| b == b'\n').collect();
        if first_chunk && ends_with_newline {
            // A trailing newline terminates the last line; it does not open
            // an empty one.
            segments.pop();
        }

        let mut iter = segments.into_iter();
        let Some(head) = iter.next() else {
            return Ok(());
        };
        let complete: Vec<&[u8]> = iter.collect();
        for segment in complete.iter().rev() {
            self.pending
                .push_back(String::from_utf8_lossy(segment).into_owned());
        }
        // The head segment's start may lie before this chunk.
        self.fragment = head.to_vec();
        Ok(())
    }
}
