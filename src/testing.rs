//! Builders for small in-memory workbooks used by the unit tests.

use crate::helpers::cfb::SIGNATURE;
use std::io::Cursor;
use std::io::Write;
use zip::write::SimpleFileOptions;
use zip::CompressionMethod;
use zip::ZipWriter;

const MAIN_NAMESPACE: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const RELATIONSHIP_NAMESPACE: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const PACKAGE_RELATIONSHIP_NAMESPACE: &str = "http://schemas.openxmlformats.org/package/2006/relationships";

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn column_label(col: usize) -> String {
    crate::spreadsheet::reference::index_to_reference(0, col).trim_end_matches('1').to_owned()
}

/// Builds an `.xlsx` package. Cells that parse as numbers are written as numbers,
/// everything else as inline strings; empty strings leave the cell out.
#[derive(Default)]
pub(crate) struct WorkbookBuilder {
    sheets: Vec<(String, String)>,
    styles: Option<Vec<String>>,
    shared_strings: Option<String>,
}

impl WorkbookBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn sheet(self, name: &str, rows: &[&[&str]]) -> Self {
        let mut xml = String::new();
        for (row, cells) in rows.iter().enumerate() {
            xml.push_str(&format!(r#"<row r="{}">"#, row + 1));
            for (col, text) in cells.iter().enumerate() {
                let reference = format!("{}{}", column_label(col), row + 1);
                if text.is_empty() {
                    continue;
                } else if text.parse::<f64>().is_ok() {
                    xml.push_str(&format!(r#"<c r="{reference}"><v>{text}</v></c>"#));
                } else if *text == "TRUE" || *text == "FALSE" {
                    let value = if *text == "TRUE" { 1 } else { 0 };
                    xml.push_str(&format!(r#"<c r="{reference}" t="b"><v>{value}</v></c>"#));
                } else {
                    xml.push_str(&format!(r#"<c r="{reference}" t="inlineStr"><is><t>{}</t></is></c>"#, escape(text)));
                }
            }
            xml.push_str("</row>");
        }
        self.raw_sheet(name, &xml)
    }

    /// Adds a sheet whose `<sheetData>` content is given verbatim.
    pub(crate) fn raw_sheet(mut self, name: &str, sheet_data: &str) -> Self {
        self.sheets.push((name.to_owned(), sheet_data.to_owned()));
        self
    }

    /// Writes `xl/styles.xml` with one `cellXfs` entry per number format id.
    pub(crate) fn styles(mut self, number_format_ids: &[&str]) -> Self {
        self.styles = Some(number_format_ids.iter().map(|id| id.to_string()).collect());
        self
    }

    /// Writes `xl/sharedStrings.xml` around the given `<si>` items.
    pub(crate) fn shared_strings(mut self, items: &str) -> Self {
        self.shared_strings = Some(items.to_owned());
        self
    }

    pub(crate) fn build(self) -> Vec<u8> {
        let mut parts = Vec::<(String, String)>::new();

        let mut sheets = String::new();
        let mut relationships = String::new();
        for (index, (name, sheet_data)) in self.sheets.iter().enumerate() {
            let id = index + 1;
            sheets.push_str(&format!(r#"<sheet name="{}" sheetId="{id}" r:id="rId{id}"/>"#, escape(name)));
            relationships.push_str(&format!(
                r#"<Relationship Id="rId{id}" Type="{RELATIONSHIP_NAMESPACE}/worksheet" Target="worksheets/sheet{id}.xml"/>"#
            ));
            parts.push((
                format!("xl/worksheets/sheet{id}.xml"),
                format!(r#"<?xml version="1.0" encoding="UTF-8"?><worksheet xmlns="{MAIN_NAMESPACE}"><sheetData>{sheet_data}</sheetData></worksheet>"#),
            ));
        }
        parts.push((
            "xl/workbook.xml".to_owned(),
            format!(r#"<?xml version="1.0" encoding="UTF-8"?><workbook xmlns="{MAIN_NAMESPACE}" xmlns:r="{RELATIONSHIP_NAMESPACE}"><sheets>{sheets}</sheets></workbook>"#),
        ));
        parts.push((
            "xl/_rels/workbook.xml.rels".to_owned(),
            format!(r#"<?xml version="1.0" encoding="UTF-8"?><Relationships xmlns="{PACKAGE_RELATIONSHIP_NAMESPACE}">{relationships}</Relationships>"#),
        ));
        if let Some(styles) = &self.styles {
            let formats: String = styles.iter().map(|id| format!(r#"<xf numFmtId="{id}"/>"#)).collect();
            parts.push((
                "xl/styles.xml".to_owned(),
                format!(r#"<styleSheet xmlns="{MAIN_NAMESPACE}"><cellXfs count="{}">{formats}</cellXfs></styleSheet>"#, styles.len()),
            ));
        }
        if let Some(items) = &self.shared_strings {
            parts.push((
                "xl/sharedStrings.xml".to_owned(),
                format!(r#"<sst xmlns="{MAIN_NAMESPACE}">{items}</sst>"#),
            ));
        }

        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (path, content) in parts {
            writer.start_file(path, options).expect("start zip entry");
            writer.write_all(content.as_bytes()).expect("write zip entry");
        }
        writer.finish().expect("finish zip").into_inner()
    }
}

fn biff_record(kind: u16, payload: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(payload.len() + 4);
    bytes.extend_from_slice(&kind.to_le_bytes());
    bytes.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    bytes.extend_from_slice(payload);
    bytes
}

fn biff_bof(substream: u16) -> Vec<u8> {
    let mut payload = vec![0u8; 16];
    payload[..2].copy_from_slice(&0x0600u16.to_le_bytes());
    payload[2..4].copy_from_slice(&substream.to_le_bytes());
    biff_record(2057, &payload)
}

/// Cell records of one `.xls` worksheet.
#[derive(Default)]
pub(crate) struct BiffSheet {
    records: Vec<u8>,
}

impl BiffSheet {
    fn cell(mut self, kind: u16, row: u16, col: u16, value: &[u8]) -> Self {
        let mut payload = Vec::new();
        payload.extend_from_slice(&row.to_le_bytes());
        payload.extend_from_slice(&col.to_le_bytes());
        payload.extend_from_slice(&0u16.to_le_bytes());
        payload.extend_from_slice(value);
        self.records.extend(biff_record(kind, &payload));
        self
    }

    pub(crate) fn label(self, row: u16, col: u16, text: &str) -> Self {
        let units: Vec<u16> = text.encode_utf16().collect();
        let mut value = Vec::new();
        value.extend_from_slice(&(units.len() as u16).to_le_bytes());
        if text.is_ascii() {
            value.push(0);
            value.extend_from_slice(text.as_bytes());
        } else {
            value.push(1);
            units.iter().for_each(|unit| value.extend_from_slice(&unit.to_le_bytes()));
        }
        self.cell(516, row, col, &value)
    }

    pub(crate) fn number(self, row: u16, col: u16, number: f64) -> Self {
        self.cell(515, row, col, &number.to_le_bytes())
    }

    pub(crate) fn boolean(self, row: u16, col: u16, value: bool) -> Self {
        self.cell(517, row, col, &[value as u8, 0])
    }

    pub(crate) fn error(self, row: u16, col: u16, code: u8) -> Self {
        self.cell(517, row, col, &[code, 1])
    }
}

/// Builds an `.xls` compound file with a `Workbook` stream.
#[derive(Default)]
pub(crate) struct BiffBuilder {
    sheets: Vec<(String, Vec<u8>)>,
}

impl BiffBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn sheet<F>(mut self, name: &str, cells: F) -> Self
    where
        F: FnOnce(BiffSheet) -> BiffSheet,
    {
        self.sheets.push((name.to_owned(), cells(BiffSheet::default()).records));
        self
    }

    pub(crate) fn build(self) -> Vec<u8> {
        let bound_sheet_size = |name: &str| 4 + 4 + 2 + 2 + name.len();
        let mut offset = 20 + 6 + self.sheets.iter().map(|(name, _)| bound_sheet_size(name)).sum::<usize>() + 4;

        let mut globals = biff_bof(0x0005);
        globals.extend(biff_record(66, &1200u16.to_le_bytes()));
        let mut substreams = Vec::new();
        for (name, records) in &self.sheets {
            let mut payload = Vec::new();
            payload.extend_from_slice(&(offset as u32).to_le_bytes());
            payload.extend_from_slice(&[0, 0, name.len() as u8, 0]);
            payload.extend_from_slice(name.as_bytes());
            globals.extend(biff_record(133, &payload));

            let mut substream = biff_bof(0x0010);
            substream.extend_from_slice(records);
            substream.extend(biff_record(10, &[]));
            offset += substream.len();
            substreams.extend(substream);
        }
        globals.extend(biff_record(10, &[]));
        globals.extend(substreams);
        compound_file(&[("Workbook", globals.as_slice())])
    }
}

/// Lays out a version 3 compound file: the FAT in sector 0, the directory in sector 1 and
/// the streams after it. Streams are padded to at least 4096 bytes so that none of them
/// lives in the mini stream.
pub(crate) fn compound_file(streams: &[(&str, &[u8])]) -> Vec<u8> {
    const SECTOR: usize = 512;
    const FREE: u32 = 0xFFFF_FFFF;
    const END_OF_CHAIN: u32 = 0xFFFF_FFFE;
    const FAT_SECTOR: u32 = 0xFFFF_FFFD;
    assert!(streams.len() <= 3, "one directory sector holds four entries");

    let mut header = vec![0u8; SECTOR];
    header[..8].copy_from_slice(&SIGNATURE);
    header[24..26].copy_from_slice(&0x003Eu16.to_le_bytes());
    header[26..28].copy_from_slice(&3u16.to_le_bytes());
    header[28..30].copy_from_slice(&0xFFFEu16.to_le_bytes());
    header[30..32].copy_from_slice(&9u16.to_le_bytes());
    header[32..34].copy_from_slice(&6u16.to_le_bytes());
    header[44..48].copy_from_slice(&1u32.to_le_bytes());
    header[48..52].copy_from_slice(&1u32.to_le_bytes());
    header[56..60].copy_from_slice(&4096u32.to_le_bytes());
    header[60..64].copy_from_slice(&END_OF_CHAIN.to_le_bytes());
    header[68..72].copy_from_slice(&END_OF_CHAIN.to_le_bytes());
    header[76..80].copy_from_slice(&0u32.to_le_bytes());
    for chunk in header[80..].chunks_exact_mut(4) {
        chunk.copy_from_slice(&FREE.to_le_bytes());
    }

    let mut fat = vec![FREE; SECTOR / 4];
    fat[0] = FAT_SECTOR;
    fat[1] = END_OF_CHAIN;
    let mut directory = vec![0u8; SECTOR];
    let mut data = Vec::<u8>::new();
    let mut next_sector = 2usize;

    let entry = |directory: &mut Vec<u8>, index: usize, name: &str, kind: u8, start: u32, size: u64| {
        let bytes = &mut directory[index * 128..(index + 1) * 128];
        let units: Vec<u16> = name.encode_utf16().collect();
        for (position, unit) in units.iter().enumerate() {
            bytes[position * 2..position * 2 + 2].copy_from_slice(&unit.to_le_bytes());
        }
        bytes[64..66].copy_from_slice(&(((units.len() + 1) * 2) as u16).to_le_bytes());
        bytes[66] = kind;
        bytes[67] = 1;
        bytes[68..80].copy_from_slice(&[0xFF; 12]);
        bytes[116..120].copy_from_slice(&start.to_le_bytes());
        bytes[120..128].copy_from_slice(&size.to_le_bytes());
    };
    entry(&mut directory, 0, "Root Entry", 5, END_OF_CHAIN, 0);

    for (index, (name, content)) in streams.iter().enumerate() {
        let size = content.len().max(4096).div_ceil(SECTOR) * SECTOR;
        let count = size / SECTOR;
        let start = next_sector;
        for sector in start..start + count {
            fat[sector] = if sector + 1 < start + count { (sector + 1) as u32 } else { END_OF_CHAIN };
        }
        next_sector += count;
        let mut padded = content.to_vec();
        padded.resize(size, 0);
        data.extend(padded);
        entry(&mut directory, index + 1, name, 2, start as u32, size as u64);
    }

    let mut bytes = header;
    fat.iter().for_each(|value| bytes.extend_from_slice(&value.to_le_bytes()));
    bytes.extend(directory);
    bytes.extend(data);
    bytes
}
