//! slog-based logger construction.
//!
//! Library components take an optional `Logger` and stay silent by default;
//! this module builds the loggers an application hands them.

use std::error;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io as std_io;
use std::path::{Path, PathBuf};

use chrono::prelude::*;
pub use slog::FilterLevel as Level;
use slog::{Discard, Drain, Fuse, Level as LogLevel, LevelFilter, Logger};
use slog_async::Async;
use slog_term::{CompactFormat, Decorator, FullFormat, PlainDecorator, TermDecorator};

#[derive(Debug)]
pub enum Stream {
    StdOut,
    StdErr,
    File(PathBuf),
    Null,
}

#[derive(Debug, Clone, Copy)]
pub enum Format {
    Full,
    Compact,
}

#[derive(Debug)]
pub struct LoggerBuilder {
    stream: Stream,
    level: Level,
    format: Format,
}

impl LoggerBuilder {
    pub fn new(stream: Stream) -> Self {
        LoggerBuilder {
            stream: stream,
            level: Level::Debug,
            format: Format::Full,
        }
    }

    pub fn level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    pub fn build(self) -> Result<Logger, Error> {
        match self.build_drain()? {
            Some(drain) => Ok(Logger::root(drain.fuse(), o!())),
            None => Ok(Logger::root(Discard, o!())),
        }
    }

    fn build_drain(&self) -> Result<Option<LevelFilter<Fuse<Async>>>, Error> {
        if let Level::Off = self.level {
            return Ok(None);
        }
        let drain = match self.stream {
            Stream::StdOut => self.drain_from_decorator(TermDecorator::new().stdout().build()),
            Stream::StdErr => self.drain_from_decorator(TermDecorator::new().stderr().build()),
            Stream::File(ref path) => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(Error::Io)?;
                self.drain_from_decorator(PlainDecorator::new(file))
            }
            Stream::Null => return Ok(None),
        };
        Ok(Some(drain))
    }

    fn drain_from_decorator<D: Decorator + Send + 'static>(
        &self,
        decorator: D,
    ) -> LevelFilter<Fuse<Async>> {
        let drain = match self.format {
            Format::Compact => {
                let drain = CompactFormat::new(decorator).use_local_timestamp().build();
                Async::new(drain.fuse()).build()
            }
            Format::Full => {
                let drain = FullFormat::new(decorator).use_local_timestamp().build();
                Async::new(drain.fuse()).build()
            }
        };
        LevelFilter::new(
            drain.fuse(),
            LogLevel::from_usize(self.level.as_usize()).unwrap_or(LogLevel::Debug),
        )
    }
}

/// Builds a logger appending to a date-named file (`YYYYMMDD.log`) under
/// `dir`, creating the directory when necessary.
pub fn create_file_logger<P: AsRef<Path>>(
    dir: P,
    level: Level,
) -> Result<(Logger, PathBuf), Error> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        fs::create_dir_all(dir).map_err(Error::Io)?;
    }
    let filename = Local::now().format("%Y%m%d.log").to_string();
    let path = dir.join(filename);
    let logger = LoggerBuilder::new(Stream::File(path.clone()))
        .level(level)
        .build()?;
    Ok((logger, path))
}

#[derive(Debug)]
pub enum Error {
    Io(std_io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::Io(ref err) => err.fmt(f),
        }
    }
}

impl error::Error for Error {}
