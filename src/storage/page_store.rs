use std::{path::Path, sync::Arc};

use crate::{
    storage::header::{JetFormat, JetHeader, JetVersion},
    types::{
        PageId,
        error::{DatabaseError, Result},
        page::{DataPage, Page, PageType, RowPointer},
    },
};

/// Random access to the fixed-size pages of a database image.
///
/// The image is held in an `Arc<[u8]>`; clones share it and every read is
/// `&self`, so one store can serve several decoders at once.
#[derive(Debug, Clone)]
pub struct PageStore {
    bytes: Arc<[u8]>,
    header: JetHeader,
    format: JetFormat,
    page_count: u32,
}

impl PageStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        log::info!("Opening database at path: {}", path.display());
        let bytes = std::fs::read(path)?;
        Self::open_from(bytes)
    }

    pub fn open_from(bytes: impl Into<Arc<[u8]>>) -> Result<Self> {
        let bytes: Arc<[u8]> = bytes.into();
        let header = JetHeader::from_bytes(&bytes)?;
        let format = JetFormat::for_version(header.version);

        if bytes.len() < format.page_size {
            return Err(DatabaseError::Format {
                reason: format!(
                    "file is {} bytes, shorter than one {} byte page",
                    bytes.len(),
                    format.page_size
                ),
            });
        }
        if bytes.len() % format.page_size != 0 {
            log::warn!(
                "File length {} is not a multiple of page size {}, ignoring the trailing partial page",
                bytes.len(),
                format.page_size
            );
        }

        let page_count = u32::try_from(bytes.len() / format.page_size).map_err(|_| {
            DatabaseError::Format {
                reason: "file holds more pages than a page index can address".to_string(),
            }
        })?;

        log::debug!(
            "Detected {:?} ({}), {} pages of {} bytes",
            header.version,
            header.engine,
            page_count,
            format.page_size
        );

        Ok(Self {
            bytes,
            header,
            format,
            page_count,
        })
    }

    pub fn header(&self) -> &JetHeader {
        &self.header
    }

    pub fn version(&self) -> JetVersion {
        self.header.version
    }

    pub fn format(&self) -> &JetFormat {
        &self.format
    }

    pub fn page_size(&self) -> usize {
        self.format.page_size
    }

    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    pub fn read_page(&self, page_id: PageId) -> Result<Page<'_>> {
        if page_id >= self.page_count {
            return Err(DatabaseError::OutOfRange {
                page: page_id,
                page_count: self.page_count,
            });
        }
        let start = page_id as usize * self.format.page_size;
        let end = start + self.format.page_size;
        Ok(Page::new(page_id, &self.bytes[start..end]))
    }

    pub fn page_type(&self, page_id: PageId) -> Result<PageType> {
        Ok(self.read_page(page_id)?.page_type)
    }

    pub fn read_data_page(&self, page_id: PageId) -> Result<DataPage<'_>> {
        DataPage::from_page(self.read_page(page_id)?, &self.format)
    }

    /// Bytes of the record a row pointer designates, flags ignored.
    pub fn read_record(&self, pointer: RowPointer) -> Result<&[u8]> {
        let page = self.read_data_page(pointer.page)?;
        page.record(pointer.record as u16).ok_or_else(|| {
            DatabaseError::corrupted_page(
                pointer.page,
                format!("record {} is missing or out of bounds", pointer.record),
            )
        })
    }

    /// Every data page whose owner field names `definition_page`, in page order.
    pub fn data_pages_owned_by(&self, definition_page: PageId) -> Vec<PageId> {
        (0..self.page_count)
            .filter(|&page_id| {
                self.read_data_page(page_id)
                    .map(|page| page.owner == definition_page)
                    .unwrap_or(false)
            })
            .collect()
    }
}
