//! OLE Compound File Binary (CFB) reader
//! Legacy `.xls` workbooks live in a `Workbook` stream of a compound file, and encrypted
//! `.xlsx` packages are wrapped in one as well.

use crate::error::StashError;
use crate::helpers::bytes::to_u16;
use crate::helpers::bytes::to_u64;
use crate::helpers::bytes::to_usize;
use crate::helpers::bytes::to_usize_iter;
use encoding_rs::UTF_16LE;
use std::collections::HashMap;
use thiserror::Error;

/// Leading bytes of every compound file.
pub(crate) const SIGNATURE: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

const MAX_REG_SECT: usize = 0xFFFFFFFB;
const HEADER_SIZE: usize = 512;
const DIRECTORY_ENTRY_SIZE: usize = 128;
const MINI_SECTOR_SIZE: usize = 64;
const MINI_STREAM_CUTOFF: usize = 4096;

/// Errors specific to Compound File Binary format parsing
#[derive(Error, Debug)]
pub enum CfbError {
    #[error("The file is corrupted or has an invalid CFB structure")]
    FileFormatError,

    #[error("Invalid OLE signature (not an office document?)")]
    OleSignatureError,

    #[error("Invalid Sector size '2 ^ {1}' for major version '{0}'")]
    SectorSizeError(u16, u16),

    #[error("The number of double indirect file allocation table error: expect '{0}', actual '{1}'")]
    DoubleIndirectFileAllocationTableError(usize, usize),

    #[error("The number of file allocation table error: expect '{0}', actual '{1}'")]
    FileAllocationTableError(usize, usize),

    #[error("Sector chain starting at {0} is broken or cyclic")]
    SectorChainError(usize),

    #[error("Empty Root directory")]
    RootDirectoryError,
}

/// Compound file loaded fully into memory
pub(crate) struct Cfb {
    directories: HashMap<String, Directory>,
    file_allocation_table: Vec<usize>,
    sectors: Sectors,
    mini_file_allocation_table: Vec<usize>,
    mini_sectors: Sectors,
}

impl Cfb {
    /// Parses a compound file from its raw bytes
    pub(crate) fn from_bytes(data: Vec<u8>) -> Result<Cfb, StashError> {
        if data.len() < HEADER_SIZE {
            Err(CfbError::FileFormatError)?;
        }
        let header = Header::new(&data[..HEADER_SIZE])?;
        let sectors = Sectors { data, size: header.sector_size()? };
        let file_allocation_table = Self::load_file_allocation_table(&sectors, &header)?;
        let directories = Self::load_directories(&file_allocation_table, &sectors, header.directory_shift)?;
        let mini_file_allocation_table = Self::load_mini_file_allocation_table(&file_allocation_table, &sectors, &header)?;
        let mini_sectors = match directories.get("Root Entry") {
            Some(root) => Self::load_mini_sectors(&file_allocation_table, &sectors, root)?,
            None => Sectors { data: Vec::new(), size: MINI_SECTOR_SIZE },
        };

        Ok(Cfb {
            directories,
            file_allocation_table,
            sectors,
            mini_file_allocation_table,
            mini_sectors,
        })
    }

    /// Checks if a stream exists
    pub(crate) fn exists(&self, name: &str) -> bool {
        self.directories.contains_key(name)
    }

    /// Reads the whole contents of a stream, `None` when it does not exist
    pub(crate) fn read(&self, name: &str) -> Result<Option<Vec<u8>>, StashError> {
        if let Some(directory) = self.directories.get(name) {
            let mut bytes = if directory.count < MINI_STREAM_CUTOFF {
                Self::read_bytes(&self.mini_file_allocation_table, &self.mini_sectors, directory.index)?
            } else {
                Self::read_bytes(&self.file_allocation_table, &self.sectors, directory.index)?
            };
            bytes.truncate(directory.count);
            Ok(Some(bytes))
        } else {
            Ok(None)
        }
    }

    fn load_file_allocation_table(sectors: &Sectors, header: &Header) -> Result<Vec<usize>, StashError> {
        let mut double_indirect_file_allocation_table: Vec<usize> = to_usize_iter(sectors.slice(76, HEADER_SIZE)).collect();

        let mut count = 0usize;
        let mut index = header.double_indirect_file_allocation_table_shift;
        while index < MAX_REG_SECT {
            if count >= header.double_indirect_file_allocation_table_count {
                Err(CfbError::SectorChainError(header.double_indirect_file_allocation_table_shift))?;
            }
            double_indirect_file_allocation_table.extend(to_usize_iter(sectors.get(index)));
            // The last entry of each DIFAT sector links to the next one
            index = double_indirect_file_allocation_table.pop().ok_or(CfbError::FileFormatError)?;
            count += 1;
        }
        if count != header.double_indirect_file_allocation_table_count {
            Err(CfbError::DoubleIndirectFileAllocationTableError(header.double_indirect_file_allocation_table_count, count))?
        }

        let mut file_allocation_table: Vec<usize> = Vec::new();
        let mut count = 0usize;
        for index in double_indirect_file_allocation_table {
            if index < MAX_REG_SECT {
                file_allocation_table.extend(to_usize_iter(sectors.get(index)));
                count += 1;
            }
        }
        if count != header.file_allocation_table_count {
            Err(CfbError::FileAllocationTableError(header.file_allocation_table_count, count))?
        }

        Ok(file_allocation_table)
    }

    fn load_directories(file_allocation_table: &[usize], sectors: &Sectors, index: usize) -> Result<HashMap<String, Directory>, StashError> {
        let bytes = Self::read_bytes(file_allocation_table, sectors, index)?;
        let directories: HashMap<String, Directory> = bytes
            .chunks_exact(DIRECTORY_ENTRY_SIZE)
            .map(Directory::new)
            .filter(|(name, _)| !name.is_empty())
            .collect();
        if directories.is_empty() {
            Err(CfbError::RootDirectoryError)?
        }
        Ok(directories)
    }

    fn load_mini_file_allocation_table(file_allocation_table: &[usize], sectors: &Sectors, header: &Header) -> Result<Vec<usize>, StashError> {
        Ok(if header.mini_file_allocation_table_sector_count > 0 {
            let bytes = Self::read_bytes(file_allocation_table, sectors, header.mini_file_allocation_table_sector_shift)?;
            to_usize_iter(&bytes).collect()
        } else {
            Vec::new()
        })
    }

    /// The root entry's stream holds every mini sector back to back
    fn load_mini_sectors(file_allocation_table: &[usize], sectors: &Sectors, root: &Directory) -> Result<Sectors, StashError> {
        let mut data = Self::read_bytes(file_allocation_table, sectors, root.index)?;
        data.truncate(root.count);
        Ok(Sectors { data, size: MINI_SECTOR_SIZE })
    }

    /// Follows a sector chain through the allocation table
    fn read_bytes(file_allocation_table: &[usize], sectors: &Sectors, start: usize) -> Result<Vec<u8>, StashError> {
        let mut content: Vec<u8> = Vec::new();
        let mut index = start;
        let mut steps = 0usize;
        while index < MAX_REG_SECT {
            steps += 1;
            if steps > file_allocation_table.len() {
                Err(CfbError::SectorChainError(start))?;
            }
            content.extend_from_slice(sectors.get(index));
            index = *file_allocation_table.get(index).ok_or(CfbError::SectorChainError(start))?;
        }
        Ok(content)
    }
}

#[derive(Debug)]
struct Sectors {
    data: Vec<u8>,
    size: usize,
}

impl Sectors {
    /// Regular sector `index` sits behind the header sector; mini sectors start at offset 0
    fn get(&self, index: usize) -> &[u8] {
        if self.size == MINI_SECTOR_SIZE {
            let source = index.saturating_mul(self.size);
            self.slice(source, source.saturating_add(self.size))
        } else {
            let source = index.saturating_add(1).saturating_mul(self.size);
            self.slice(source, source.saturating_add(self.size))
        }
    }

    /// Clamped view of `data[source..target]`
    fn slice(&self, source: usize, target: usize) -> &[u8] {
        let target = target.min(self.data.len());
        let source = source.min(target);
        &self.data[source..target]
    }
}

#[derive(Debug)]
struct Header {
    major_version: u16,
    sector_shift: u16,
    file_allocation_table_count: usize,
    directory_shift: usize,
    mini_file_allocation_table_sector_shift: usize,
    mini_file_allocation_table_sector_count: usize,
    double_indirect_file_allocation_table_shift: usize,
    double_indirect_file_allocation_table_count: usize,
}

impl Header {
    fn new(data: &[u8]) -> Result<Self, StashError> {
        if to_u64(&data[0..8]) != u64::from_le_bytes(SIGNATURE) {
            Err(CfbError::OleSignatureError)?;
        }

        Ok(Header {
            major_version: to_u16(&data[26..28]),
            sector_shift: to_u16(&data[30..32]),
            file_allocation_table_count: to_usize(&data[44..48]),
            directory_shift: to_usize(&data[48..52]),
            mini_file_allocation_table_sector_shift: to_usize(&data[60..64]),
            mini_file_allocation_table_sector_count: to_usize(&data[64..68]),
            double_indirect_file_allocation_table_shift: to_usize(&data[68..72]),
            double_indirect_file_allocation_table_count: to_usize(&data[72..76]),
        })
    }

    fn sector_size(&self) -> Result<usize, StashError> {
        match (self.major_version, self.sector_shift) {
            (3, 0x0009) => Ok(512),
            // Version 4 pads the 512 byte header to a full 4096 byte sector
            (4, 0x000C) => Ok(4096),
            (version, shift) => Err(CfbError::SectorSizeError(version, shift))?,
        }
    }
}

#[derive(Debug)]
struct Directory {
    index: usize,
    count: usize,
}

impl Directory {
    fn new(bytes: &[u8]) -> (String, Directory) {
        let size = (to_u16(&bytes[64..66]) as usize).min(64);
        let (name, _, _) = UTF_16LE.decode(&bytes[..size]);
        let name = match name.find('\0') {
            Some(position) => name[..position].to_owned(),
            None => name.to_string(),
        };

        let index = to_usize(&bytes[116..120]);
        let count = to_u64(&bytes[120..128]) as usize;
        (name, Directory { index, count })
    }
}
