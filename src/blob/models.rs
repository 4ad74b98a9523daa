//! Data models for blob storage operations
//!
//! This module defines the listing items, segments, page ranges and
//! delete options shared by every blob store.

use crate::error::{BlobTourError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Page blobs are allocated and written in units of this many bytes
pub const PAGE_SIZE: u64 = 512;

/// Kind of blob stored under a name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlobKind {
    Block,
    Page,
    Append,
}

impl fmt::Display for BlobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Block => "BlockBlob",
            Self::Page => "PageBlob",
            Self::Append => "AppendBlob",
        };
        f.write_str(label)
    }
}

/// Information about a listed blob
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobInfo {
    pub name: String,
    pub uri: String,
    pub size: u64,
    pub content_type: String,
}

/// One entry of a container listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlobListItem {
    BlockBlob(BlobInfo),
    PageBlob(BlobInfo),
    AppendBlob(BlobInfo),
    /// Virtual directory returned when listing with a delimiter
    Directory { prefix: String, uri: String },
}

impl BlobListItem {
    pub fn from_kind(kind: BlobKind, info: BlobInfo) -> Self {
        match kind {
            BlobKind::Block => Self::BlockBlob(info),
            BlobKind::Page => Self::PageBlob(info),
            BlobKind::Append => Self::AppendBlob(info),
        }
    }

    /// Blob name, or the prefix for directories
    pub fn name(&self) -> &str {
        match self {
            Self::BlockBlob(info) | Self::PageBlob(info) | Self::AppendBlob(info) => &info.name,
            Self::Directory { prefix, .. } => prefix,
        }
    }

    pub fn uri(&self) -> &str {
        match self {
            Self::BlockBlob(info) | Self::PageBlob(info) | Self::AppendBlob(info) => &info.uri,
            Self::Directory { uri, .. } => uri,
        }
    }

    pub fn kind_label(&self) -> &'static str {
        match self {
            Self::BlockBlob(_) => "BlockBlob",
            Self::PageBlob(_) => "PageBlob",
            Self::AppendBlob(_) => "AppendBlob",
            Self::Directory { .. } => "BlobDirectory",
        }
    }
}

/// Opaque cursor returned by a listing call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContinuationToken(String);

impl ContinuationToken {
    pub fn new<S: Into<String>>(marker: S) -> Self {
        Self(marker.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One page of listing results
#[derive(Debug, Clone, Default)]
pub struct ListSegment {
    pub items: Vec<BlobListItem>,
    pub continuation: Option<ContinuationToken>,
}

/// What happens to snapshots when their base blob is deleted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteSnapshots {
    /// Fail if the blob has snapshots
    None,
    /// Delete the blob and all of its snapshots
    Include,
    /// Delete only the snapshots, keep the blob
    Only,
}

/// A 512-aligned range of a page blob
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRange {
    offset: u64,
    length: u64,
}

impl PageRange {
    pub fn new(offset: u64, length: u64) -> Result<Self> {
        if offset % PAGE_SIZE != 0 {
            return Err(BlobTourError::page_range(format!(
                "offset {offset} is not a multiple of {PAGE_SIZE}"
            )));
        }
        if length == 0 || length % PAGE_SIZE != 0 {
            return Err(BlobTourError::page_range(format!(
                "length {length} is not a positive multiple of {PAGE_SIZE}"
            )));
        }
        offset
            .checked_add(length)
            .ok_or_else(|| BlobTourError::page_range("range overflows"))?;

        Ok(Self { offset, length })
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn length(&self) -> u64 {
        self.length
    }

    /// Exclusive end offset
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }

    /// Inclusive last byte, as the service's range headers expect
    pub fn last_byte(&self) -> u64 {
        self.end() - 1
    }
}

/// Page blob sizes must be a positive multiple of the page size
pub fn validate_page_blob_size(size: u64) -> Result<()> {
    if size == 0 || size % PAGE_SIZE != 0 {
        return Err(BlobTourError::page_range(format!(
            "page blob size {size} is not a positive multiple of {PAGE_SIZE}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_range_alignment() {
        let range = PageRange::new(512, 1024).unwrap();
        assert_eq!(range.end(), 1536);
        assert_eq!(range.last_byte(), 1535);

        assert!(PageRange::new(1, 512).is_err());
        assert!(PageRange::new(0, 0).is_err());
        assert!(PageRange::new(0, 100).is_err());
        assert!(PageRange::new(u64::MAX - 511, 512).is_err());
    }

    #[test]
    fn test_validate_page_blob_size() {
        assert!(validate_page_blob_size(512).is_ok());
        assert!(validate_page_blob_size(1024).is_ok());
        assert!(validate_page_blob_size(0).is_err());
        assert!(validate_page_blob_size(1000).is_err());
    }

    #[test]
    fn test_list_item_accessors() {
        let info = BlobInfo {
            name: "samplepageblob".to_string(),
            uri: "http://127.0.0.1:10000/devstoreaccount1/c/samplepageblob".to_string(),
            size: 1024,
            content_type: "application/octet-stream".to_string(),
        };
        let item = BlobListItem::from_kind(BlobKind::Page, info);
        assert_eq!(item.name(), "samplepageblob");
        assert_eq!(item.kind_label(), "PageBlob");

        let dir = BlobListItem::Directory {
            prefix: "photos/".to_string(),
            uri: "http://127.0.0.1:10000/devstoreaccount1/c/photos/".to_string(),
        };
        assert_eq!(dir.name(), "photos/");
        assert_eq!(dir.kind_label(), "BlobDirectory");
    }
}
