use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::config::READ_BUFFER_SIZE;
use crate::error::{EngineError, Result};
use crate::types::VertexId;
use crate::util::remove_if_exists;

/// Scatter/gather messages of one pass, bucketed by destination segment.
///
/// Buckets stay in memory until more than `cap` messages are held; then every bucket is
/// appended to its spill file (`<prefix>.seg<n>.msg`) and emptied. [`take`](Self::take)
/// hands back one segment's messages, spilled ones first, and deletes its spill file.
pub struct MessageBuffers<U> {
    buckets: Vec<Vec<(VertexId, U)>>,
    spilled: Vec<usize>,
    in_memory: usize,
    cap: usize,
    prefix: PathBuf,
}

impl<U> MessageBuffers<U> {
    fn spill_path(&self, segment: usize) -> PathBuf {
        let mut name = self.prefix.as_os_str().to_owned();
        name.push(format!(".seg{}.msg", segment));
        PathBuf::from(name)
    }
}

impl<U: Serialize + DeserializeOwned> MessageBuffers<U> {
    pub fn new(segments: usize, cap: usize, prefix: &Path) -> Self {
        Self {
            buckets: (0..segments).map(|_| Vec::new()).collect(),
            spilled: vec![0; segments],
            in_memory: 0,
            cap,
            prefix: prefix.to_path_buf(),
        }
    }

    /// Adds one batch of per-segment buckets, spilling when the in-memory cap is exceeded.
    pub fn absorb(&mut self, batch: Vec<Vec<(VertexId, U)>>) -> Result<()> {
        assert_eq!(batch.len(), self.buckets.len(), "message batch has the wrong segment count");
        for (bucket, mut messages) in self.buckets.iter_mut().zip(batch) {
            self.in_memory += messages.len();
            bucket.append(&mut messages);
        }
        if self.in_memory > self.cap {
            self.spill()?;
        }
        Ok(())
    }

    fn spill(&mut self) -> Result<()> {
        for segment in 0..self.buckets.len() {
            if self.buckets[segment].is_empty() {
                continue;
            }
            let path = self.spill_path(segment);
            // The first spill of a pass truncates whatever an aborted pass left behind.
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .append(self.spilled[segment] > 0)
                .truncate(self.spilled[segment] == 0)
                .open(&path)
                .map_err(|e| EngineError::io(&path, e))?;
            let mut writer = BufWriter::with_capacity(READ_BUFFER_SIZE, file);
            let messages = std::mem::take(&mut self.buckets[segment]);
            for message in &messages {
                bincode::serialize_into(&mut writer, message).map_err(|e| serde_error(&path, e))?;
            }
            writer.flush().map_err(|e| EngineError::io(&path, e))?;
            self.spilled[segment] += messages.len();
        }
        debug!(messages = self.in_memory, prefix = %self.prefix.display(), "messages spilled");
        self.in_memory = 0;
        Ok(())
    }

    /// Every message destined to `segment`, in no particular order.
    pub fn take(&mut self, segment: usize) -> Result<Vec<(VertexId, U)>> {
        let in_memory = std::mem::take(&mut self.buckets[segment]);
        self.in_memory -= in_memory.len();
        let count = std::mem::take(&mut self.spilled[segment]);
        if count == 0 {
            return Ok(in_memory);
        }

        let path = self.spill_path(segment);
        let file = File::open(&path).map_err(|e| EngineError::io(&path, e))?;
        let mut reader = BufReader::with_capacity(READ_BUFFER_SIZE, file);
        let mut messages = Vec::with_capacity(count + in_memory.len());
        for _ in 0..count {
            messages.push(bincode::deserialize_from(&mut reader).map_err(|e| serde_error(&path, e))?);
        }
        remove_if_exists(&path)?;
        messages.extend(in_memory);
        Ok(messages)
    }

    /// Messages written to spill files so far and not taken yet.
    pub fn spilled(&self) -> usize {
        self.spilled.iter().sum()
    }
}

impl<U> Drop for MessageBuffers<U> {
    fn drop(&mut self) {
        // Leftovers exist only when a pass failed or unwound.
        for segment in 0..self.spilled.len() {
            if self.spilled[segment] > 0 {
                let _ = std::fs::remove_file(self.spill_path(segment));
            }
        }
    }
}

fn serde_error(path: &Path, e: bincode::Error) -> EngineError {
    EngineError::Serde { path: path.to_path_buf(), reason: e.to_string() }
}

#[cfg(test)]
mod test_messages {
    use super::*;

    #[test]
    fn test_spilled_and_buffered_messages_are_merged() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("task.attr");
        let mut buffers = MessageBuffers::<u32>::new(2, 3, &prefix);

        buffers.absorb(vec![vec![(0, 10), (1, 11)], vec![(4, 40)]]).unwrap();
        assert_eq!(buffers.spilled(), 0);
        buffers.absorb(vec![vec![(1, 12)], vec![]]).unwrap();
        assert_eq!(buffers.spilled(), 4);
        assert!(dir.path().join("task.attr.seg0.msg").exists());
        buffers.absorb(vec![vec![(0, 13)], vec![(5, 50)]]).unwrap();

        let mut first = buffers.take(0).unwrap();
        first.sort_unstable();
        assert_eq!(first, vec![(0, 10), (0, 13), (1, 11), (1, 12)]);
        assert!(!dir.path().join("task.attr.seg0.msg").exists());
        assert_eq!(buffers.take(1).unwrap(), vec![(4, 40), (5, 50)]);
        assert!(buffers.take(1).unwrap().is_empty());
    }

    #[test]
    fn test_leftover_spill_files_are_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("drop.attr");
        {
            let mut buffers = MessageBuffers::<()>::new(1, 0, &prefix);
            buffers.absorb(vec![vec![(3, ())]]).unwrap();
            assert_eq!(buffers.spilled(), 1);
        }
        assert!(!dir.path().join("drop.attr.seg0.msg").exists());
    }
}
