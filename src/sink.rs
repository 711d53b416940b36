//! Destinations for the finished byte streams.
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use std::str::FromStr;

use log::info;

/// Used to handle sink write errors. Both variants are fatal to the writing role.
#[derive(thiserror::Error, Debug)]
pub enum SinkError {
    #[error("Partial write: {written}/{expected} bytes")]
    PartialWrite { written: usize, expected: usize },
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Accepts whole buffers. A write either stores every byte or fails.
pub trait Sink: Send {
    fn write(&mut self, data: &[u8]) -> Result<(), SinkError>;

    /// Pushes buffered bytes to the destination.
    fn flush(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

impl<S: Sink + ?Sized> Sink for Box<S> {
    #[inline]
    fn write(&mut self, data: &[u8]) -> Result<(), SinkError> {
        (**self).write(data)
    }

    #[inline]
    fn flush(&mut self) -> Result<(), SinkError> {
        (**self).flush()
    }
}

/// Adapts any [`Write`] into a [`Sink`] that reports short writes.
#[derive(Debug)]
pub struct WriteSink<W> {
    writer: W,
}

impl<W: Write + Send> WriteSink<W> {
    #[must_use]
    #[inline]
    pub const fn new(writer: W) -> Self {
        Self { writer }
    }

    #[must_use]
    #[inline]
    pub fn into_inner(self) -> W {
        self.writer
    }

    #[must_use]
    #[inline]
    pub const fn get_ref(&self) -> &W {
        &self.writer
    }
}

impl<W: Write + Send> Sink for WriteSink<W> {
    fn write(&mut self, data: &[u8]) -> Result<(), SinkError> {
        let mut written = 0;
        while written < data.len() {
            match self.writer.write(&data[written..]) {
                Ok(0) => {
                    return Err(SinkError::PartialWrite { written, expected: data.len() });
                }
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }

        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Raw bytes written straight to a file.
pub type FileSink = WriteSink<File>;

impl FileSink {
    /// Creates or truncates the file at `path`.
    #[inline]
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, SinkError> {
        let path = path.as_ref();
        let file = File::create(path)?;
        info!("file sink opened: {}", path.display());

        Ok(Self::new(file))
    }
}

/// Discards everything it is given.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl Sink for NullSink {
    #[inline]
    fn write(&mut self, _data: &[u8]) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Where a stream ends up.
#[derive(Eq, PartialEq, Clone, Copy, Debug, Default)]
pub enum SinkKind {
    #[default]
    File,
    Null,
}

impl SinkKind {
    /// Opens a sink of this kind targeting `path`. `Null` ignores the path.
    #[inline]
    pub fn open<P: AsRef<Path>>(self, path: P) -> Result<Box<dyn Sink>, SinkError> {
        match self {
            Self::File => Ok(Box::new(FileSink::create(path)?)),
            Self::Null => Ok(Box::new(NullSink)),
        }
    }
}

impl FromStr for SinkKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "file" => Ok(Self::File),
            "null" | "none" => Ok(Self::Null),
            _ => Err(format!("unknown sink type: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Accepts at most `limit` bytes in total, then reports zero-length writes.
    struct LimitedWriter {
        accepted: Vec<u8>,
        limit: usize,
    }

    impl Write for LimitedWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let room = self.limit - self.accepted.len();
            let n = room.min(buf.len()).min(3);
            self.accepted.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn full_write_succeeds_across_short_chunks() {
        let mut sink = WriteSink::new(LimitedWriter { accepted: Vec::new(), limit: 64 });
        sink.write(b"0123456789").unwrap();
        assert_eq!(sink.get_ref().accepted, b"0123456789");
    }

    #[test]
    fn short_write_is_reported() {
        let mut sink = WriteSink::new(LimitedWriter { accepted: Vec::new(), limit: 4 });
        match sink.write(b"0123456789") {
            Err(SinkError::PartialWrite { written, expected }) => {
                assert_eq!(written, 4);
                assert_eq!(expected, 10);
            }
            other => panic!("expected partial write, got {other:?}"),
        }
    }

    #[test]
    fn sink_kind_parses() {
        assert_eq!("file".parse::<SinkKind>().unwrap(), SinkKind::File);
        assert_eq!("NULL".parse::<SinkKind>().unwrap(), SinkKind::Null);
        assert!("pipe".parse::<SinkKind>().is_err());
    }

    #[test]
    fn file_sink_writes_bytes() {
        let path = std::env::temp_dir().join(format!("av-recorder-sink-{}.bin", std::process::id()));
        {
            let mut sink = FileSink::create(&path).unwrap();
            sink.write(&[1, 2, 3]).unwrap();
            sink.flush().unwrap();
        }
        assert_eq!(std::fs::read(&path).unwrap(), vec![1, 2, 3]);
        let _ = std::fs::remove_file(&path);
    }
}
