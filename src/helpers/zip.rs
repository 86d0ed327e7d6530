//! ZIP archive helpers for the parts of an Office Open XML package

use crate::error::StashError;
use crate::helpers::xml::XmlReader;
use std::io::BufReader;
use std::io::Read;
use std::io::Seek;
use zip::read::ZipFile;
use zip::result::ZipError;
use zip::ZipArchive;

/// Leading bytes of a ZIP local file header.
pub(crate) const SIGNATURE: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];

pub(crate) trait ZipHelper<RS: Read + Seek> {
    /// Gets a part by name, ignoring ASCII case and treating `\` as `/`
    fn file(&'_ mut self, name: &str) -> Result<Option<ZipFile<'_, RS>>, StashError>;

    /// Opens an XML reader over a part
    fn xml_reader(&'_ mut self, name: &str) -> Result<Option<XmlReader<BufReader<ZipFile<'_, RS>>>>, StashError>;
}

impl<RS: Read + Seek> ZipHelper<RS> for ZipArchive<RS> {
    fn file(&'_ mut self, name: &str) -> Result<Option<ZipFile<'_, RS>>, StashError> {
        let pattern = name.replace('\\', "/");
        let path = self.file_names()
            .find(|file_name| pattern.eq_ignore_ascii_case(file_name))
            .map(|file_name| file_name.to_owned());
        match path.map(|file_name| self.by_name(&file_name)).transpose() {
            Ok(file) => Ok(file),
            Err(ZipError::FileNotFound) => Ok(None),
            Err(error) => Err(error)?,
        }
    }

    fn xml_reader(&'_ mut self, name: &str) -> Result<Option<XmlReader<BufReader<ZipFile<'_, RS>>>>, StashError> {
        Ok(self.file(name)?.map(|file| XmlReader::new(BufReader::new(file))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    #[test]
    fn finds_parts_ignoring_case_and_separator() -> Result<(), StashError> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer.start_file("xl/Workbook.xml", SimpleFileOptions::default())?;
        writer.write_all(b"<workbook/>")?;
        let bytes = writer.finish()?.into_inner();
        assert_eq!(bytes[..4], SIGNATURE);

        let mut zip = ZipArchive::new(Cursor::new(bytes))?;
        assert!(zip.file("XL\\workbook.xml")?.is_some());
        assert!(zip.file("xl/styles.xml")?.is_none());
        Ok(())
    }
}
