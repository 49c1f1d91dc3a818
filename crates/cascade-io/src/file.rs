//! Chunked file endpoints.

use std::cell::{Cell, RefCell};
use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};

use cascade_core::completion::StreamCompletion;
use cascade_core::error::{Result, StreamError};
use cascade_core::eventloop::EventLoopRef;
use cascade_core::status::StreamStatus;
use cascade_core::stream::{ConsumerCore, ProducerCore, StreamConsumer, StreamProducer};
use cascade_mem::{BufferPool, ByteBuf};
use tracing::debug;

use crate::error::IoError;

/// Writes every chunk to a file; completes once the file is flushed.
pub struct StreamFileWriter {
    core: ConsumerCore<ByteBuf>,
    path: PathBuf,
    file: RefCell<Option<BufWriter<File>>>,
    bytes_written: Cell<u64>,
    completion: StreamCompletion,
}

impl StreamFileWriter {
    /// Create or truncate `path`, creating parent directories as needed.
    pub fn create(path: impl AsRef<Path>) -> Result<Rc<Self>> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(IoError::file("mkparent", parent))?;
        }
        let file = File::create(&path).map_err(IoError::file("create", &path))?;
        Ok(Rc::new(Self {
            core: ConsumerCore::new(),
            path,
            file: RefCell::new(Some(BufWriter::new(file))),
            bytes_written: Cell::new(0),
            completion: StreamCompletion::new(),
        }))
    }

    pub fn completion(&self) -> StreamCompletion {
        self.completion.clone()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.get()
    }

    fn write_chunk(&self, buf: &ByteBuf) -> Result<()> {
        let mut file = self.file.borrow_mut();
        let Some(file) = file.as_mut() else {
            return Ok(());
        };
        file.write_all(buf.read_slice())
            .map_err(IoError::file("write", &self.path))?;
        self.bytes_written
            .set(self.bytes_written.get() + buf.read_remaining() as u64);
        Ok(())
    }

    fn finish(&self) -> Result<()> {
        let file = self.file.borrow_mut().take();
        if let Some(mut file) = file {
            file.flush().map_err(IoError::file("flush", &self.path))?;
        }
        Ok(())
    }

    fn fail(&self, err: StreamError) {
        let file = self.file.borrow_mut().take();
        drop(file);
        if self.core.close_with_error(err.clone()) {
            debug!(path = %self.path.display(), error = %err, "file writer closed with error");
            self.completion.fail(err);
        }
    }
}

impl StreamConsumer<ByteBuf> for StreamFileWriter {
    fn consumer_status(&self) -> StreamStatus {
        self.core.status()
    }

    fn bind_producer(&self, producer: Rc<dyn StreamProducer<ByteBuf>>) {
        self.core.bind(producer);
    }

    fn on_data(&self, buf: ByteBuf) {
        if !self.core.accept_data() {
            return;
        }
        let result = self.write_chunk(&buf);
        drop(buf);
        if let Err(err) = result {
            self.fail(err);
        }
    }

    fn on_end_of_stream(&self) {
        if !self.core.end_of_stream() {
            return;
        }
        match self.finish() {
            Ok(()) => {
                self.core.close();
                debug!(path = %self.path.display(), bytes = self.bytes_written(), "file written");
                self.completion.succeed();
            }
            Err(err) => self.fail(err),
        }
    }

    fn on_error(&self, err: StreamError) {
        self.fail(err);
    }
}

/// Emits a file as fixed-size chunks, one chunk per event loop turn.
pub struct StreamFileReader {
    core: ProducerCore<ByteBuf>,
    pool: BufferPool,
    path: PathBuf,
    file: RefCell<Option<File>>,
    block_size: usize,
    bytes_read: Cell<u64>,
}

impl StreamFileReader {
    pub fn open(
        eventloop: &EventLoopRef,
        pool: &BufferPool,
        path: impl AsRef<Path>,
        block_size: usize,
    ) -> Result<Rc<Self>> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(IoError::file("open", &path))?;
        Ok(Rc::new_cyclic(|this: &Weak<Self>| Self {
            core: ProducerCore::new(eventloop, this.clone()),
            pool: pool.clone(),
            path,
            file: RefCell::new(Some(file)),
            block_size: block_size.max(1),
            bytes_read: Cell::new(0),
        }))
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read.get()
    }

    /// Next chunk, or `None` at end of file.
    fn read_chunk(&self) -> Result<Option<ByteBuf>> {
        let mut file = self.file.borrow_mut();
        let Some(f) = file.as_mut() else {
            return Ok(None);
        };
        let mut buf = self.pool.allocate(self.block_size);
        let n = loop {
            let window = &mut buf.write_slice_mut()[..self.block_size];
            match f.read(window) {
                Ok(n) => break n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(IoError::file("read", &self.path)(e).into()),
            }
        };
        if n == 0 {
            file.take();
            return Ok(None);
        }
        buf.advance_write(n);
        self.bytes_read.set(self.bytes_read.get() + n as u64);
        Ok(Some(buf))
    }
}

impl StreamProducer<ByteBuf> for StreamFileReader {
    fn producer_status(&self) -> StreamStatus {
        self.core.status()
    }

    fn bind_consumer(&self, consumer: Rc<dyn StreamConsumer<ByteBuf>>) {
        self.core.bind(consumer);
    }

    fn produce(&self) {
        if !self.core.is_ready() {
            return;
        }
        match self.read_chunk() {
            Ok(Some(buf)) => {
                self.core.send(buf);
                if self.core.is_ready() {
                    self.core.schedule_produce();
                }
            }
            Ok(None) => {
                debug!(path = %self.path.display(), bytes = self.bytes_read(), "file read");
                self.core.send_end_of_stream();
            }
            Err(err) => {
                self.file.borrow_mut().take();
                self.core.close_with_error(err);
            }
        }
    }

    fn suspend(&self) {
        self.core.suspend();
    }

    fn resume(&self) {
        self.core.resume();
    }

    fn close_with_error(&self, err: StreamError) {
        self.file.borrow_mut().take();
        self.core.close_with_error(err);
    }
}
