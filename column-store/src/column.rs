// Copyright (c) James Kassemi, SC, US. All rights reserved.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::{
    codec::ValueCodec,
    error::FormatError,
    format::{decode_chunk, ChunkMeta},
    storage::MappedStore,
    table::{DAY_COLUMN, ID_COLUMN},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnKind {
    Field,
    Day,
    Id,
}

impl ColumnKind {
    pub fn of(name: &str) -> Self {
        match name {
            DAY_COLUMN => ColumnKind::Day,
            ID_COLUMN => ColumnKind::Id,
            _ => ColumnKind::Field,
        }
    }
}

/// Borrowed view of one stored column.
#[derive(Clone, Copy)]
pub(crate) struct ColumnHandle<'a> {
    pub name: &'a str,
    pub kind: ColumnKind,
    chunks: &'a [ChunkMeta],
    chunk_rows: usize,
    store: &'a MappedStore,
    codec: ValueCodec,
}

impl<'a> ColumnHandle<'a> {
    pub fn new(
        name: &'a str,
        chunks: &'a [ChunkMeta],
        chunk_rows: usize,
        store: &'a MappedStore,
        codec: ValueCodec,
    ) -> Self {
        Self {
            name,
            kind: ColumnKind::of(name),
            chunks,
            chunk_rows,
            store,
            codec,
        }
    }

    pub fn decode(&self, word: u64) -> f64 {
        match self.kind {
            ColumnKind::Field => self.codec.decode(word),
            ColumnKind::Day | ColumnKind::Id => self.codec.decode_plain(word),
        }
    }

    pub fn read_chunk(&self, idx: usize) -> Result<Vec<u64>, FormatError> {
        let meta = self.chunks.get(idx).ok_or_else(|| FormatError::Truncated {
            detail: format!("column {} has no chunk {idx}", self.name),
        })?;
        decode_chunk(self.name, idx, meta, self.store.chunk_bytes(meta)?)
    }

    /// Decompresses the whole column.
    pub fn read_all(&self) -> Result<Vec<u64>, FormatError> {
        let total: usize = self.chunks.iter().map(|c| c.rows as usize).sum();
        let mut words = Vec::with_capacity(total);
        for idx in 0..self.chunks.len() {
            words.extend(self.read_chunk(idx)?);
        }
        Ok(words)
    }

    /// Reads one word, reusing the chunk `cache` holds when the row falls inside it.
    pub fn read_word(&self, row: u64, cache: &PointCache) -> Result<u64, FormatError> {
        let row = row as usize;
        let idx = row / self.chunk_rows;
        let hit = cache
            .slot
            .lock()
            .as_ref()
            .filter(|c| c.chunk == idx && c.column == self.name)
            .map(|c| Arc::clone(&c.words));
        let words = match hit {
            Some(words) => words,
            None => {
                let words = Arc::new(self.read_chunk(idx)?);
                *cache.slot.lock() = Some(CachedChunk {
                    column: self.name.to_string(),
                    chunk: idx,
                    words: Arc::clone(&words),
                });
                words
            }
        };
        words
            .get(row % self.chunk_rows)
            .copied()
            .ok_or_else(|| FormatError::Truncated {
                detail: format!("column {} has no row {row}", self.name),
            })
    }

    pub fn cursor(&self) -> ChunkCursor<'_, 'a> {
        ChunkCursor {
            column: self,
            cached: None,
        }
    }
}

/// Last chunk decompressed by a point lookup.
#[derive(Default)]
pub(crate) struct PointCache {
    slot: Mutex<Option<CachedChunk>>,
}

struct CachedChunk {
    column: String,
    chunk: usize,
    words: Arc<Vec<u64>>,
}

impl PointCache {
    #[cfg(test)]
    pub fn cached(&self) -> Option<(String, usize)> {
        self.slot
            .lock()
            .as_ref()
            .map(|c| (c.column.clone(), c.chunk))
    }
}

/// Walks a column range by range, decompressing each chunk at most once while consecutive
/// ranges stay inside it.
pub(crate) struct ChunkCursor<'c, 'a> {
    column: &'c ColumnHandle<'a>,
    cached: Option<(usize, Vec<u64>)>,
}

impl ChunkCursor<'_, '_> {
    /// Feeds rows `first..=last` to `sink` as `(position within range, word)`.
    pub fn for_each_in(
        &mut self,
        first: u64,
        last: u64,
        mut sink: impl FnMut(usize, u64),
    ) -> Result<(), FormatError> {
        let chunk_rows = self.column.chunk_rows;
        let name = self.column.name;
        let (first, last) = (first as usize, last as usize);
        let mut row = first;
        while row <= last {
            let idx = row / chunk_rows;
            let base = idx * chunk_rows;
            let words = self.chunk(idx)?;
            let end = (last - base + 1).min(words.len());
            let start = row - base;
            if start >= end {
                return Err(FormatError::Truncated {
                    detail: format!("column {name} has no row {row}"),
                });
            }
            for (i, word) in words[start..end].iter().enumerate() {
                sink(row - first + i, *word);
            }
            row = base + end;
        }
        Ok(())
    }

    fn chunk(&mut self, idx: usize) -> Result<&[u64], FormatError> {
        let hit = matches!(&self.cached, Some((cached, _)) if *cached == idx);
        if !hit {
            self.cached = Some((idx, self.column.read_chunk(idx)?));
        }
        Ok(self
            .cached
            .as_ref()
            .map(|(_, words)| words.as_slice())
            .unwrap_or(&[]))
    }
}
