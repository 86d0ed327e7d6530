//! Pieces shared by the Excel readers
use crate::error::StashError;
use crate::helpers::xml::XmlNodeHelper;
use crate::helpers::zip::ZipHelper;
use crate::match_xml_events;
use crate::spreadsheet::cell::CellType;
use crate::spreadsheet::SpreadsheetError;
use quick_xml::events::Event;
use std::borrow::Cow;
use std::collections::HashMap;
use std::io::Cursor;
use zip::ZipArchive;

/// In-memory package of an Office Open XML workbook.
pub(super) type Package = ZipArchive<Cursor<Vec<u8>>>;

const TAG_RELATIONSHIP: &[u8] = b"Relationship";

/// Opens a workbook package and loads its sheet list and number formats.
///
/// Returns the archive, the cell type of every style index, and the
/// `(sheet name, part path)` pairs in workbook order.
pub(super) fn open<W, F>(bytes: Vec<u8>, load_workbook: W, load_number_formats: F) -> Result<(
    Package,
    Vec<CellType>,
    Vec<(String, String)>
), StashError>
where
    W: Fn(&mut Package) -> Result<(Vec<(String, String)>, bool), StashError>,
    F: Fn(&mut Package, bool) -> Result<Vec<CellType>, StashError>,
{
    let mut zip = ZipArchive::new(Cursor::new(bytes))?;
    let (sheets, is_1904) = load_workbook(&mut zip)?;
    if sheets.is_empty() {
        Err(SpreadsheetError::EmptyWorkbook)?
    }

    let number_formats = load_number_formats(&mut zip, is_1904)?;
    Ok((zip, number_formats, sheets))
}

/// Maps worksheet relationship ids to part paths.
pub(super) fn load_relationships(zip: &mut Package, path: &str) -> Result<HashMap<String, String>, StashError> {
    let mut reader = zip.xml_reader(path)?
        .ok_or_else(|| SpreadsheetError::MissingPart(path.to_string()))?;
    let mut relationships: HashMap<String, String> = HashMap::new();
    match_xml_events!(reader => {
        Event::Start(event) if event.local_name().as_ref() == TAG_RELATIONSHIP => {
            let id = event.get_attribute_value("Id")?;
            let kind = event.get_attribute_value("Type")?;
            let target = event.get_attribute_value("Target")?;
            if kind.map(|it| it.ends_with("/worksheet")).unwrap_or(true) {
                if let Some((id, target)) = id.zip(target) {
                    relationships.insert(id.to_string(), to_zip_path(target));
                }
            }
        }
    });
    Ok(relationships)
}

/// Resolves every style's number format to a cell type, preferring custom formats over
/// built-in ids.
pub(super) fn load_number_formats(format_indexes: Vec<String>, custom_formats: HashMap<String, CellType>, is_1904: bool) -> Vec<CellType> {
    format_indexes
        .iter()
        .map(|id| {
            custom_formats
                .get(id)
                .copied()
                .or_else(|| CellType::parse_builtin_number_format_id(id, is_1904))
                .unwrap_or(CellType::Number)
        })
        .collect()
}

/// Relationship targets are relative to `xl/` unless absolute.
pub(super) fn to_zip_path(path: Cow<'_, str>) -> String {
    if let Some(stripped) = path.strip_prefix('/') {
        stripped.to_string()
    } else if path.starts_with("xl/") {
        path.to_string()
    } else {
        format!("xl/{path}")
    }
}
