//! Multipart form parsing
//!
//! The body is parsed with `multer`. Plain value parts and small file parts
//! are held in memory; once `max_memory` bytes are buffered, any further
//! file data spills to a temp file that lives as long as its [`FileHeader`].
//! Value parts never spill. They may run past the budget by a fixed 10 MiB
//! slack; a value part beyond that is an error.

use std::fs::File;
use std::io::{self, Cursor, Read, Write};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use futures::executor::block_on;
use futures::stream;
use rustc_hash::FxHashMap;
use tempfile::{NamedTempFile, TempPath};
use tracing::{debug, warn};

use crate::config::BinderConfig;
use crate::error::{BindError, Result};
use crate::source::Values;

/// Value parts may exceed the memory budget by this much before failing
const VALUE_SLACK: u64 = 10 << 20;

#[derive(Debug, Clone)]
enum Payload {
    Memory(Bytes),
    Spilled(Arc<TempPath>),
}

impl Default for Payload {
    fn default() -> Self {
        Payload::Memory(Bytes::new())
    }
}

/// One uploaded file part
#[derive(Debug, Clone, Default)]
pub struct FileHeader {
    pub filename: String,
    pub content_type: Option<String>,
    pub headers: http::HeaderMap,
    pub size: u64,
    payload: Payload,
}

impl FileHeader {
    pub fn in_memory(filename: impl Into<String>, content_type: Option<String>, data: Bytes) -> Self {
        Self {
            filename: filename.into(),
            content_type,
            headers: http::HeaderMap::new(),
            size: data.len() as u64,
            payload: Payload::Memory(data),
        }
    }

    /// True when the content was written to a temp file
    pub fn is_spilled(&self) -> bool {
        matches!(self.payload, Payload::Spilled(_))
    }

    /// Open the file content for reading
    pub fn open(&self) -> io::Result<Box<dyn Read + Send>> {
        match &self.payload {
            Payload::Memory(data) => Ok(Box::new(Cursor::new(data.clone()))),
            Payload::Spilled(path) => Ok(Box::new(File::open(path.as_ref())?)),
        }
    }

    /// Read the whole content
    pub fn bytes(&self) -> io::Result<Bytes> {
        match &self.payload {
            Payload::Memory(data) => Ok(data.clone()),
            Payload::Spilled(path) => Ok(Bytes::from(std::fs::read(path.as_ref())?)),
        }
    }
}

/// Parsed multipart body: plain values and uploaded files by part name
#[derive(Debug, Clone, Default)]
pub struct MultipartForm {
    pub values: Values,
    pub files: FxHashMap<String, Vec<FileHeader>>,
}

fn multipart_err(e: impl std::fmt::Display) -> BindError {
    BindError::Multipart {
        reason: e.to_string(),
    }
}

/// Parse a `multipart/form-data` body.
///
/// `content_type` is the full header value including the boundary.
pub fn parse(body: Bytes, content_type: &str, config: &BinderConfig) -> Result<MultipartForm> {
    let boundary = multer::parse_boundary(content_type).map_err(multipart_err)?;
    let body_stream = stream::once(async move { Ok::<Bytes, io::Error>(body) });
    let multipart = multer::Multipart::new(body_stream, boundary);

    block_on(read_form(multipart, config))
}

async fn read_form(mut multipart: multer::Multipart<'_>, config: &BinderConfig) -> Result<MultipartForm> {
    let mut form = MultipartForm::default();
    let mut budget = config.max_memory;

    while let Some(mut field) = multipart.next_field().await.map_err(multipart_err)? {
        let name = field.name().unwrap_or_default().to_string();

        let Some(filename) = field.file_name().map(str::to_string) else {
            let mut buf = BytesMut::new();
            while let Some(chunk) = field.chunk().await.map_err(multipart_err)? {
                buf.extend_from_slice(&chunk);
                if buf.len() as u64 > budget.saturating_add(VALUE_SLACK) {
                    return Err(multipart_err("message too large"));
                }
            }
            budget = budget.saturating_sub(buf.len() as u64);
            let value = String::from_utf8(buf.to_vec()).map_err(multipart_err)?;
            form.values.add(name, value);
            continue;
        };

        let content_type = field.content_type().map(|m| m.to_string());
        let headers = field.headers().clone();

        let mut buf = BytesMut::new();
        let mut spill: Option<NamedTempFile> = None;
        let mut size = 0u64;

        while let Some(chunk) = field.chunk().await.map_err(multipart_err)? {
            size += chunk.len() as u64;
            if let Some(file) = spill.as_mut() {
                file.write_all(&chunk)?;
                continue;
            }
            buf.extend_from_slice(&chunk);
            if size > budget {
                warn!(part = %name, filename = %filename, size, "multipart file exceeds memory budget, spilling to disk");
                let mut file = spill_file(config)?;
                file.write_all(&buf)?;
                buf.clear();
                spill = Some(file);
            }
        }

        let payload = match spill {
            Some(mut file) => {
                file.flush()?;
                Payload::Spilled(Arc::new(file.into_temp_path()))
            }
            None => {
                budget -= size;
                Payload::Memory(buf.freeze())
            }
        };

        debug!(part = %name, filename = %filename, size, "multipart file received");
        form.files.entry(name).or_default().push(FileHeader {
            filename,
            content_type,
            headers,
            size,
            payload,
        });
    }

    Ok(form)
}

fn spill_file(config: &BinderConfig) -> Result<NamedTempFile> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("reqbind-");
    let file = match &config.spill_dir {
        Some(dir) => builder.tempfile_in(dir)?,
        None => builder.tempfile()?,
    };
    Ok(file)
}
