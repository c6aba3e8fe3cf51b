// Copyright (c) James Kassemi, SC, US. All rights reserved.

use std::{
    fs::{self, File, OpenOptions},
    io::{self, BufWriter, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use memmap2::Mmap;
use time::OffsetDateTime;

use crate::{
    error::{FormatError, IngestError},
    format::{checksum, ChunkMeta, StoreHeader, FORMAT_VERSION, HEADER_SIZE},
};

const STAGING_SUFFIX: &str = ".ingesting";

/// Store file being written. Lives under a hidden staging name until [`StagedStore::seal`]
/// renames it over the destination; dropping it unsealed deletes the staging file and any
/// directories `create` made for it.
pub struct StagedStore {
    destination: PathBuf,
    staging: PathBuf,
    /// Directories created for the destination, deepest first.
    created_dirs: Vec<PathBuf>,
    writer: Option<BufWriter<File>>,
    offset: u64,
    sealed: bool,
}

impl StagedStore {
    pub fn create(destination: &Path) -> Result<Self, IngestError> {
        if destination.exists() {
            return Err(IngestError::DestinationExists {
                path: destination.to_path_buf(),
            });
        }
        let staging = staging_path(destination)?;
        let created_dirs: Vec<PathBuf> = staging
            .ancestors()
            .skip(1)
            .filter(|dir| !dir.as_os_str().is_empty())
            .take_while(|dir| !dir.exists())
            .map(Path::to_path_buf)
            .collect();
        if let Some(parent) = staging.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut staged = Self {
            destination: destination.to_path_buf(),
            staging,
            created_dirs,
            writer: None,
            offset: HEADER_SIZE as u64,
            sealed: false,
        };
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&staged.staging)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(&[0u8; HEADER_SIZE])?;
        staged.writer = Some(writer);
        Ok(staged)
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    pub fn staging(&self) -> &Path {
        &self.staging
    }

    /// Appends one compressed chunk and returns where it landed.
    pub fn append_chunk(&mut self, bytes: &[u8], rows: u32, crc32: u32) -> Result<ChunkMeta, FormatError> {
        let offset = self.offset;
        self.write_all(bytes)?;
        Ok(ChunkMeta {
            offset,
            len: bytes.len() as u32,
            rows,
            crc32,
        })
    }

    /// Writes the attribute block and header, syncs, and renames into place.
    pub fn seal(mut self, attributes: &[u8], created_at: OffsetDateTime) -> Result<PathBuf, FormatError> {
        let attrs_offset = self.offset;
        self.write_all(attributes)?;
        let header = StoreHeader {
            format_version: FORMAT_VERSION,
            attrs_offset,
            attrs_len: attributes.len() as u64,
            attrs_crc: checksum(attributes),
            created_at_s: created_at.unix_timestamp(),
        };
        let writer = self
            .writer
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "staged store already sealed"))?;
        let mut file = writer.into_inner().map_err(|e| e.into_error())?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&header.to_bytes())?;
        file.sync_all()?;
        drop(file);

        if self.destination.exists() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} appeared while staging", self.destination.display()),
            )
            .into());
        }
        fs::rename(&self.staging, &self.destination)?;
        self.sealed = true;
        if let Some(parent) = self.destination.parent() {
            if let Err(err) = File::open(parent).and_then(|dir| dir.sync_all()) {
                log::debug!("could not sync directory {:?}: {}", parent, err);
            }
        }
        Ok(self.destination.clone())
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), FormatError> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "staged store already sealed"))?;
        writer.write_all(bytes)?;
        self.offset += bytes.len() as u64;
        Ok(())
    }
}

impl Drop for StagedStore {
    fn drop(&mut self) {
        if self.sealed {
            return;
        }
        self.writer.take();
        if let Err(err) = fs::remove_file(&self.staging) {
            if err.kind() != io::ErrorKind::NotFound {
                log::error!("failed to remove staging file {:?}: {}", self.staging, err);
            }
        }
        for dir in &self.created_dirs {
            if let Err(err) = fs::remove_dir(dir) {
                if err.kind() != io::ErrorKind::NotFound {
                    log::error!("failed to remove ingest directory {:?}: {}", dir, err);
                    break;
                }
            }
        }
    }
}

fn staging_path(destination: &Path) -> io::Result<PathBuf> {
    let name = destination.file_name().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("destination {} has no file name", destination.display()),
        )
    })?;
    let mut staged = std::ffi::OsString::from(".");
    staged.push(name);
    staged.push(STAGING_SUFFIX);
    Ok(destination.with_file_name(staged))
}

/// Read-only view of a sealed store.
pub struct MappedStore {
    path: PathBuf,
    mmap: Mmap,
    header: StoreHeader,
}

impl MappedStore {
    pub fn open(path: &Path) -> Result<Self, FormatError> {
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();
        if file_len < HEADER_SIZE as u64 {
            return Err(FormatError::Truncated {
                detail: format!("file is {file_len} bytes"),
            });
        }
        let mmap = unsafe { Mmap::map(&file)? };
        let header = StoreHeader::parse(&mmap)?;
        let attrs_end = header.attrs_offset.checked_add(header.attrs_len);
        if header.attrs_offset < HEADER_SIZE as u64 || attrs_end.map_or(true, |end| end > file_len) {
            return Err(FormatError::Truncated {
                detail: format!(
                    "attribute block at {}+{} exceeds file length {file_len}",
                    header.attrs_offset, header.attrs_len
                ),
            });
        }
        Ok(Self {
            path: path.to_path_buf(),
            mmap,
            header,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> &StoreHeader {
        &self.header
    }

    pub fn attributes_bytes(&self) -> Result<&[u8], FormatError> {
        let start = self.header.attrs_offset as usize;
        let bytes = &self.mmap[start..start + self.header.attrs_len as usize];
        if checksum(bytes) != self.header.attrs_crc {
            return Err(FormatError::AttributeChecksum);
        }
        Ok(bytes)
    }

    pub fn chunk_bytes(&self, meta: &ChunkMeta) -> Result<&[u8], FormatError> {
        let start = meta.offset as usize;
        let end = start.checked_add(meta.len as usize);
        match end {
            Some(end) if start >= HEADER_SIZE && end <= self.header.attrs_offset as usize => {
                Ok(&self.mmap[start..end])
            }
            _ => Err(FormatError::Truncated {
                detail: format!("chunk at {}+{} outside data region", meta.offset, meta.len),
            }),
        }
    }
}
