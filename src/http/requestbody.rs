//! Request bodies for POST/PUT operations.
//!
//! Bodies are pulled by the send pipeline: it hands the source a buffer and
//! the source fills as much of it as it can. A source must know its total
//! size up front since it becomes the `Content-Length` header.

use crate::base::neterror::NetError;
use bytes::Bytes;
use std::fmt;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

/// A pull-style provider of request body bytes.
pub trait BodySource: Send {
    /// Total number of bytes this source will deliver.
    fn size(&self) -> u64;

    /// Fill `buf` with the next bytes of the body and return how many were
    /// written. Must never report more than `buf.len()`. Returns 0 once the
    /// whole body has been delivered.
    fn fill(&mut self, buf: &mut [u8]) -> Result<usize, NetError>;

    /// Restart delivery from the first byte. Called before every
    /// (re)transmission of the owning request.
    fn rewind(&mut self) -> Result<(), NetError> {
        Err(NetError::UploadStreamRewindNotSupported)
    }
}

/// An in-memory body.
#[derive(Debug, Clone, Default)]
pub struct BytesBody {
    data: Bytes,
    written: usize,
}

impl BytesBody {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            written: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }
}

impl From<String> for BytesBody {
    fn from(s: String) -> Self {
        BytesBody::new(s)
    }
}

impl From<Vec<u8>> for BytesBody {
    fn from(v: Vec<u8>) -> Self {
        BytesBody::new(v)
    }
}

impl From<&str> for BytesBody {
    fn from(s: &str) -> Self {
        BytesBody::new(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<Bytes> for BytesBody {
    fn from(b: Bytes) -> Self {
        BytesBody::new(b)
    }
}

impl BodySource for BytesBody {
    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn fill(&mut self, buf: &mut [u8]) -> Result<usize, NetError> {
        let n = buf.len().min(self.data.len() - self.written);
        buf[..n].copy_from_slice(&self.data[self.written..self.written + n]);
        self.written += n;
        Ok(n)
    }

    fn rewind(&mut self) -> Result<(), NetError> {
        self.written = 0;
        Ok(())
    }
}

/// Progress callback for uploads. Receives the number of bytes just read,
/// or a negative count when a rewind takes back bytes already reported.
pub type ProgressCallback = Box<dyn FnMut(i64) + Send>;

/// A byte range of a local file.
pub struct FileBody {
    file: File,
    start: u64,
    size: u64,
    written: u64,
    progress: Option<ProgressCallback>,
}

impl FileBody {
    /// Upload `size` bytes of `file` starting at offset `start`.
    pub fn new(file: File, start: u64, size: u64) -> Self {
        Self {
            file,
            start,
            size,
            written: 0,
            progress: None,
        }
    }

    /// Upload the whole file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, NetError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            tracing::error!(path = %path.display(), error = %e, "Could not open upload file");
            NetError::Failed
        })?;
        let size = file.metadata().map(|m| m.len()).map_err(|e| {
            tracing::error!(path = %path.display(), error = %e, "Could not stat upload file");
            NetError::Failed
        })?;
        Ok(Self::new(file, 0, size))
    }

    pub fn with_progress(mut self, callback: impl FnMut(i64) + Send + 'static) -> Self {
        self.progress = Some(Box::new(callback));
        self
    }
}

impl fmt::Debug for FileBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileBody")
            .field("start", &self.start)
            .field("size", &self.size)
            .field("written", &self.written)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

impl BodySource for FileBody {
    fn size(&self) -> u64 {
        self.size
    }

    fn fill(&mut self, buf: &mut [u8]) -> Result<usize, NetError> {
        let want = (buf.len() as u64).min(self.size - self.written) as usize;
        if want == 0 {
            return Ok(0);
        }
        if self.written == 0 {
            self.seek_start()?;
        }
        let read = self.file.read(&mut buf[..want]).map_err(|e| {
            tracing::error!(error = %e, "Reading from local file failed");
            NetError::Failed
        })?;
        if read == 0 {
            tracing::error!(
                offset = self.start + self.written,
                "Upload file ended before its expected size"
            );
            return Err(NetError::UploadFileChanged);
        }
        if let Some(progress) = self.progress.as_mut() {
            progress(read as i64);
        }
        self.written += read as u64;
        Ok(read)
    }

    fn rewind(&mut self) -> Result<(), NetError> {
        if let Some(progress) = self.progress.as_mut() {
            if self.written > 0 {
                progress(-(self.written as i64));
            }
        }
        self.written = 0;
        self.seek_start()
    }
}

impl FileBody {
    fn seek_start(&mut self) -> Result<(), NetError> {
        match self.file.seek(SeekFrom::Start(self.start)) {
            Ok(pos) if pos == self.start => Ok(()),
            _ => {
                tracing::error!(offset = self.start, "Could not seek within upload file");
                Err(NetError::Failed)
            }
        }
    }
}
