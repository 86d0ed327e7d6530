use crate::error::ResultOptionChain;
use crate::error::StashError;
use crate::helpers::biff8::Biff8Reader;
use crate::helpers::cfb::Cfb;
use crate::match_biff8_record;
use crate::spreadsheet::cell::to_error_value;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::CellType;
use crate::spreadsheet::criteria::Criteria;
use crate::spreadsheet::excel::load_number_formats;
use crate::spreadsheet::reference::index_to_reference;
use crate::spreadsheet::sheet::Sheet;
use crate::spreadsheet::SpreadsheetError;
use crate::spreadsheet::Workbook;
use either::Either;
use std::collections::HashMap;
use thiserror::Error;

// BIFF8 record types
const FORMULA: u16 = 6;
const EOF: u16 = 10;
const DATE1904: u16 = 34;
const FILE_PASS: u16 = 47;
const CODE_PAGE: u16 = 66;
const BOUND_SHEET8: u16 = 133;
const MUL_RK: u16 = 189;
const XF: u16 = 224;
const SST: u16 = 252;
const LABEL_SST: u16 = 253;
const NUMBER: u16 = 515;
const LABEL: u16 = 516;
const BOOL_ERR: u16 = 517;
const STRING: u16 = 519;
const RK: u16 = 638;
const FORMAT: u16 = 1054;
const BOF: u16 = 2057;

/// Error types specific to XLS file parsing
#[derive(Error, Debug)]
pub enum XlsError {
    #[error("Invalid Code page '{0}'")]
    CodePageError(u16),

    #[error("Invalid Formula value '{0}'")]
    FormulaValueError(u64),
}

/// Cell type of a record, or the XF index that decides it.
type CellKind = Either<CellType, usize>;

/// An Excel 97-2003 workbook (`.xls`) read from the `Workbook` stream of a compound file
pub(crate) struct XlsWorkbook {
    reader: Biff8Reader,
    shared_strings: Vec<String>,
    number_formats: Vec<CellType>,
    /// `(sheet name, stream offset of its BOF record)`
    sheets: Vec<(String, usize)>,
}

impl XlsWorkbook {
    /// Reads the workbook globals substream: date system, code page, formats, shared
    /// strings and the sheet directory.
    pub(crate) fn open(cfb: &Cfb) -> Result<XlsWorkbook, StashError> {
        let mut reader = cfb.read("Workbook")
            .ok_none_else(|| cfb.read("Book"))?
            .map(Biff8Reader::new)
            .ok_or(SpreadsheetError::MissingPart("Workbook".to_owned()))?;
        let mut is_1904 = false;
        let mut shared_strings = Vec::new();
        let mut custom_formats: HashMap<String, CellType> = HashMap::new();
        let mut format_indexes: Vec<String> = Vec::new();
        let mut sheets: Vec<(String, usize)> = Vec::new();
        match_biff8_record!(reader => {
            EOF => break,
            FILE_PASS => Err(SpreadsheetError::PasswordProtected)?,
            DATE1904 if reader.read_u16()? == 1 => is_1904 = true,
            CODE_PAGE => {
                let code_page = reader.read_u16()?;
                reader.encoding = codepage::to_encoding(code_page).ok_or(XlsError::CodePageError(code_page))?;
            }
            FORMAT => {
                let id = reader.read_u16()?;
                let format = reader.read_xl_unicode_string()?;
                custom_formats.insert(id.to_string(), CellType::parse_custom_number_format(&format, is_1904));
            }
            XF => {
                reader.skip(2)?;
                format_indexes.push(reader.read_u16()?.to_string());
            }
            SST => shared_strings = load_shared_strings(&mut reader)?,
            BOUND_SHEET8 => {
                let pointer = reader.read_usize()?;
                reader.skip(2)?;
                let sheet_name = reader.read_short_xl_unicode_string()?;
                sheets.push((sheet_name, pointer));
            }
        });
        if sheets.is_empty() {
            Err(SpreadsheetError::EmptyWorkbook)?
        }

        Ok(XlsWorkbook {
            reader,
            shared_strings,
            number_formats: load_number_formats(format_indexes, custom_formats, is_1904),
            sheets,
        })
    }

    fn kind_of(&self, kind: CellKind) -> CellType {
        match kind {
            Either::Left(kind) => kind,
            Either::Right(index) => self.number_formats.get(index).copied().unwrap_or(CellType::Number),
        }
    }
}

impl Workbook for XlsWorkbook {
    /// The SST record is part of the globals substream and already loaded by `open`
    fn load_shared_strings(&mut self) -> Result<Vec<String>, StashError> {
        Ok(std::mem::take(&mut self.shared_strings))
    }

    fn read_sheets(&mut self, criteria: &Criteria) -> Result<Vec<Sheet>, StashError> {
        let mut sheets = Vec::<Sheet>::new();
        let directory = self.sheets.clone();
        for (sheet_name, pointer) in directory {
            if !criteria.accept(&sheet_name) {
                continue;
            }

            self.reader.goto(pointer);
            self.reader.next()?;
            let mut sheet = Sheet::new(&sheet_name);
            while let Some(tag) = self.reader.next()? {
                match tag {
                    BOF | EOF => break,
                    MUL_RK => {
                        let row = self.reader.read_u16()? as usize;
                        let col_lower_bound = self.reader.read_u16()? as usize;
                        let col_upper_bound = self.reader.get_u16_back(2)? as usize;
                        for col in col_lower_bound..=col_upper_bound {
                            let index = self.reader.read_u16()? as usize;
                            let value = self.reader.read_rk_number()?;
                            sheet.push(Cell {
                                row,
                                col,
                                kind: self.kind_of(Either::Right(index)),
                                value: value.to_string(),
                            });
                        }
                    }
                    BOOL_ERR | NUMBER | RK | LABEL_SST | LABEL | FORMULA => {
                        let row = self.reader.read_u16()? as usize;
                        let col = self.reader.read_u16()? as usize;
                        let (kind, value) = match tag {
                            BOOL_ERR => read_bool_or_error_cell(&mut self.reader)?,
                            NUMBER => read_number_cell(&mut self.reader)?,
                            RK => read_rk_cell(&mut self.reader)?,
                            LABEL_SST => read_label_sst_cell(&mut self.reader)?,
                            LABEL => read_label_cell(&mut self.reader)?,
                            _ => read_formula_cell(&mut self.reader)?,
                        };
                        let kind = self.kind_of(kind);
                        if kind != CellType::Error {
                            if !value.is_empty() {
                                sheet.push(Cell { row, col, kind, value });
                            }
                        } else if !criteria.error_as_null {
                            Err(SpreadsheetError::CellValueError(
                                sheet_name.to_owned(),
                                index_to_reference(row, col),
                                value,
                            ))?
                        }
                    }
                    _ => (),
                }
            }
            sheets.push(sheet);
        }

        Ok(sheets)
    }
}

fn load_shared_strings(reader: &mut Biff8Reader) -> Result<Vec<String>, StashError> {
    reader.skip(4)?;
    let count = reader.read_usize()?;
    let mut shared_strings: Vec<String> = Vec::with_capacity(count.min(65_536));
    for _ in 0..count {
        shared_strings.push(reader.read_xl_unicode_rich_extended_string()?);
    }
    Ok(shared_strings)
}

fn read_bool_or_error_cell(reader: &mut Biff8Reader) -> Result<(CellKind, String), StashError> {
    reader.skip(2)?;
    let value = reader.read_u8()?;
    let is_error = reader.read_u8()? != 0;
    Ok(if is_error {
        (Either::Left(CellType::Error), to_error_value(value).to_owned())
    } else {
        (Either::Left(CellType::Boolean), value.to_string())
    })
}

fn read_number_cell(reader: &mut Biff8Reader) -> Result<(CellKind, String), StashError> {
    let index = reader.read_u16()? as usize;
    let value = reader.read_f64()?;
    Ok((Either::Right(index), value.to_string()))
}

fn read_rk_cell(reader: &mut Biff8Reader) -> Result<(CellKind, String), StashError> {
    let index = reader.read_u16()? as usize;
    let value = reader.read_rk_number()?;
    Ok((Either::Right(index), value.to_string()))
}

fn read_label_sst_cell(reader: &mut Biff8Reader) -> Result<(CellKind, String), StashError> {
    reader.skip(2)?;
    let value = reader.read_usize()?;
    Ok((Either::Left(CellType::SharedString), value.to_string()))
}

fn read_label_cell(reader: &mut Biff8Reader) -> Result<(CellKind, String), StashError> {
    reader.skip(2)?;
    let value = reader.read_xl_unicode_string()?;
    Ok((Either::Left(CellType::InlineString), value))
}

/// A cached formula result: a number, or a marker for a string (in the STRING record that
/// follows), a boolean, an error or an empty string.
fn read_formula_cell(reader: &mut Biff8Reader) -> Result<(CellKind, String), StashError> {
    let index = reader.read_u16()? as usize;
    let formula = reader.read_u64()?;
    let is_number = (formula & 0xFFFF000000000000) != 0xFFFF000000000000;
    let flag = formula & 0xFF;
    if is_number {
        Ok((Either::Right(index), f64::from_bits(formula).to_string()))
    } else if flag == 0 {
        match reader.next()? {
            Some(STRING) => Ok((Either::Left(CellType::InlineString), reader.read_xl_unicode_string()?)),
            _ => Err(XlsError::FormulaValueError(formula))?,
        }
    } else if flag == 1 {
        let value = if (formula & 0xFF0000) > 0 { "1" } else { "0" };
        Ok((Either::Left(CellType::Boolean), value.to_owned()))
    } else if flag == 2 {
        let code = ((formula >> 16) & 0xFF) as u8;
        Ok((Either::Left(CellType::Error), to_error_value(code).to_owned()))
    } else if flag == 3 {
        Ok((Either::Left(CellType::InlineString), String::new()))
    } else {
        Err(XlsError::FormulaValueError(formula))?
    }
}
