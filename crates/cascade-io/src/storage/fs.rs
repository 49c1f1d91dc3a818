use std::cell::Cell;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use cascade_codec::ByteCodec;
use cascade_core::config::StreamConfig;
use cascade_core::error::Result;
use cascade_core::eventloop::EventLoopRef;
use cascade_core::stream::StreamProducer;
use cascade_mem::BufferPool;
use cascade_operators::sort::{RunWriter, SortedRunStorage};
use tracing::debug;
use uuid::Uuid;

use super::RunCodec;
use crate::error::IoError;
use crate::file::{StreamFileReader, StreamFileWriter};

/// One `<run>.part` file per run inside a directory.
pub struct FsRunStorage<T> {
    codec: RunCodec<T>,
    dir: PathBuf,
    read_block_size: usize,
    next_run: Cell<usize>,
}

impl<T: 'static> FsRunStorage<T> {
    pub fn new(
        eventloop: &EventLoopRef,
        pool: &BufferPool,
        codec: Rc<dyn ByteCodec<T>>,
        dir: impl Into<PathBuf>,
        config: &StreamConfig,
    ) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(IoError::file("mkdir", &dir))?;
        Ok(Self {
            codec: RunCodec {
                eventloop: eventloop.clone(),
                pool: pool.clone(),
                codec,
                framing: config.framing.clone(),
                compress: config.compression.enabled,
            },
            dir,
            read_block_size: config.compression.read_block_size,
            next_run: Cell::new(0),
        })
    }

    /// Storage in a fresh uniquely named directory under the system temp dir.
    pub fn in_temp_dir(
        eventloop: &EventLoopRef,
        pool: &BufferPool,
        codec: Rc<dyn ByteCodec<T>>,
        config: &StreamConfig,
    ) -> Result<Self> {
        let dir = std::env::temp_dir().join(format!("cascade-runs-{}", Uuid::new_v4()));
        Self::new(eventloop, pool, codec, dir, config)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn run_path(&self, run: usize) -> PathBuf {
        self.dir.join(format!("{}.part", run))
    }

    /// Delete the directory and everything left in it.
    pub fn remove_dir(&self) -> Result<()> {
        match fs::remove_dir_all(&self.dir) {
            Err(e) if e.kind() != ErrorKind::NotFound => {
                Err(IoError::file("rmdir", &self.dir)(e).into())
            }
            _ => Ok(()),
        }
    }
}

impl<T: 'static> SortedRunStorage<T> for FsRunStorage<T> {
    fn next_run_index(&self) -> usize {
        let run = self.next_run.get();
        self.next_run.set(run + 1);
        run
    }

    fn writer(&self, run: usize) -> Result<RunWriter<T>> {
        let file = StreamFileWriter::create(self.run_path(run))?;
        Ok(RunWriter {
            completion: file.completion(),
            consumer: self.codec.encoder(&file),
        })
    }

    fn reader(&self, run: usize) -> Result<Rc<dyn StreamProducer<T>>> {
        let path = self.run_path(run);
        if !path.exists() {
            return Err(IoError::MissingRun(run).into());
        }
        let file = StreamFileReader::open(
            &self.codec.eventloop,
            &self.codec.pool,
            path,
            self.read_block_size,
        )?;
        Ok(self.codec.decoder(&file))
    }

    fn cleanup(&self, runs: &[usize]) -> Result<()> {
        let mut first_err = None;
        for &run in runs {
            let path = self.run_path(run);
            match fs::remove_file(&path) {
                Ok(()) => debug!(path = %path.display(), "run file deleted"),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    first_err.get_or_insert(IoError::file("delete", &path)(e));
                }
            }
        }
        match first_err {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_codec::StringCodec;
    use cascade_core::consumers;
    use cascade_core::eventloop::LocalEventLoop;
    use cascade_core::producers;
    use cascade_core::stream::connect;

    #[test]
    fn writes_and_reads_run_files() {
        let el = LocalEventLoop::new();
        let pool = BufferPool::default();
        let mut config = StreamConfig::default();
        config.compression.read_block_size = 100;
        let storage: FsRunStorage<String> =
            FsRunStorage::in_temp_dir(&el.handle(), &pool, Rc::new(StringCodec), &config).unwrap();

        let items: Vec<String> = (0..300).map(|i| format!("item-{i:04}")).collect();
        let run = storage.next_run_index();
        let writer = storage.writer(run).unwrap();
        connect(producers::of_iter(&el.handle(), items.clone()), writer.consumer);
        el.run();
        assert_eq!(writer.completion.result(), Some(Ok(())));
        assert!(storage.run_path(run).exists());

        let sink = consumers::to_list();
        connect(storage.reader(run).unwrap(), sink.clone());
        el.run();
        assert_eq!(sink.items(), items);

        storage.cleanup(&[run, run + 1]).unwrap();
        assert!(!storage.run_path(run).exists());
        storage.remove_dir().unwrap();
        assert!(!storage.dir().exists());
        assert_eq!(pool.stats().outstanding(), 0);
    }
}
