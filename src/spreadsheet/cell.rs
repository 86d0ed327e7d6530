use crate::record::Value;
use crate::spreadsheet::reference::index_to_reference;
use chrono::Duration;
use chrono::NaiveDate;
use chrono::NaiveDateTime;

const MILLISECONDS_PER_DAY: f64 = 86_400_000f64;

/// Types of cell data in spreadsheet files.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub(crate) enum CellType {
    #[default]
    Empty,
    /// Boolean values stored as "1" / "0"
    Boolean,
    Number,
    /// Date/time values stored as serial numbers from the 1900 epoch
    NumberDateTime1900,
    NumberDate1900,
    NumberTime1900,
    /// Date/time values stored as serial numbers from the 1904 epoch
    NumberDateTime1904,
    NumberDate1904,
    NumberTime1904,
    /// ISO 8601 date/time strings
    IsoDateTime,
    InlineString,
    /// Index into the workbook's shared string table
    SharedString,
    Error,
}

impl CellType {
    /// Maps built-in Excel number format IDs to date and time cell types.
    pub(crate) fn parse_builtin_number_format_id(id: &str, is_1904: bool) -> Option<Self> {
        match id {
            "22" => Some(if is_1904 { Self::NumberDateTime1904 } else { Self::NumberDateTime1900 }),
            "14" | "15" | "16" | "17" => Some(if is_1904 { Self::NumberDate1904 } else { Self::NumberDate1900 }),
            "18" | "19" | "20" | "21" | "45" | "46" | "47" => Some(if is_1904 { Self::NumberTime1904 } else { Self::NumberTime1900 }),
            _ => None,
        }
    }

    /// Detects date and time tokens in a custom number format code,
    /// skipping literals, escapes and bracketed sections such as colors.
    pub(crate) fn parse_custom_number_format(format: &str, is_1904: bool) -> Self {
        let mut is_escaped = false;
        let mut is_literal = false;
        let mut is_bracket = false;
        let mut is_date = false;
        let mut is_time = false;
        for character in format.chars() {
            match character {
                _ if is_escaped => is_escaped = false,
                '_' | '\\' => is_escaped = true,

                '"' if is_literal => is_literal = false,
                '"' if !is_bracket => is_literal = true,

                ']' if is_bracket => is_bracket = false,
                '[' if !is_literal => is_bracket = true,
                _ if is_literal || is_bracket => (),

                'Y' | 'y' | 'D' | 'd' => is_date = true,
                'H' | 'h' | 'S' | 's' => is_time = true,
                _ => (),
            }
        }

        match (is_date, is_time, is_1904) {
            (true, true, false) => Self::NumberDateTime1900,
            (true, true, true) => Self::NumberDateTime1904,
            (true, false, false) => Self::NumberDate1900,
            (true, false, true) => Self::NumberDate1904,
            (false, true, false) => Self::NumberTime1900,
            (false, true, true) => Self::NumberTime1904,
            (false, false, _) => Self::Number,
        }
    }
}

/// Converts Excel error codes to their display text.
pub(crate) fn to_error_value(value: u8) -> &'static str {
    match value {
        0x00 => "#NULL!",
        0x07 => "#DIV/0!",
        0x0F => "#VALUE!",
        0x17 => "#REF!",
        0x1D => "#NAME?",
        0x24 => "#NUM!",
        0x2A => "#N/A",
        0x2B => "#GETTING_DATA",
        _ => "#ERROR!",
    }
}

/// A single non-empty cell with its raw text as read from the file.
#[derive(Clone, Debug)]
pub(crate) struct Cell {
    /// Row index (0-based)
    pub(crate) row: usize,
    /// Column index (0-based)
    pub(crate) col: usize,
    pub(crate) kind: CellType,
    pub(crate) value: String,
}

impl Cell {
    /// Returns the Excel-style cell reference (e.g., "A1", "B2").
    pub(crate) fn reference(&self) -> String {
        index_to_reference(self.row, self.col)
    }

    fn to_double(&self) -> Result<f64, String> {
        self.value.trim().parse::<f64>().map_err(|_| format!("parse '{}' to double failed", self.value))
    }

    /// Converts the raw text to a record value.
    /// Dates and times become ISO-like strings, error cells become null.
    pub(crate) fn to_value(&self, shared_strings: &[String]) -> Result<Value, String> {
        Ok(match self.kind {
            CellType::Empty | CellType::Error => Value::Null,
            CellType::Boolean => Value::Bool(self.value == "1" || self.value.eq_ignore_ascii_case("true")),
            CellType::Number => Value::Number(self.to_double()?),
            CellType::NumberDate1900 => Value::String(to_date_string(self.to_double()?, false)?),
            CellType::NumberDate1904 => Value::String(to_date_string(self.to_double()?, true)?),
            CellType::NumberDateTime1900 => Value::String(to_datetime_string(self.to_double()?, false)?),
            CellType::NumberDateTime1904 => Value::String(to_datetime_string(self.to_double()?, true)?),
            CellType::NumberTime1900 | CellType::NumberTime1904 => Value::String(to_time_string(self.to_double()?)),
            CellType::IsoDateTime => Value::String(self.value.replace('T', " ")),
            CellType::InlineString => Value::String(self.value.to_owned()),
            CellType::SharedString => {
                let index = self.value.parse::<usize>()
                    .map_err(|_| format!("parse '{}' to shared string index failed", self.value))?;
                let string = shared_strings.get(index)
                    .ok_or_else(|| format!("shared string {index} does not exist"))?;
                Value::String(string.to_owned())
            }
        })
    }
}

/// Converts a serial number to a date-time, shifting the 1900 system by one day before
/// 1900-03-01 to account for the Lotus 1-2-3 leap year bug.
fn to_naive_datetime(serial: f64, is_1904: bool) -> Result<NaiveDateTime, String> {
    let days = serial.trunc() as i64;
    let milliseconds = ((serial - serial.trunc()) * MILLISECONDS_PER_DAY).round() as i64;
    let offset = if is_1904 {
        1462
    } else if days < 60 {
        1
    } else {
        0
    };
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .ok_or_else(|| "invalid epoch".to_owned())?;
    Duration::try_days(days + offset)
        .zip(Duration::try_milliseconds(milliseconds))
        .and_then(|(days, milliseconds)| epoch.checked_add_signed(days)?.checked_add_signed(milliseconds))
        .ok_or_else(|| format!("serial date '{serial}' is out of range"))
}

fn to_date_string(serial: f64, is_1904: bool) -> Result<String, String> {
    to_naive_datetime(serial.trunc(), is_1904).map(|datetime| datetime.format("%Y-%m-%d").to_string())
}

fn to_datetime_string(serial: f64, is_1904: bool) -> Result<String, String> {
    let datetime = to_naive_datetime(serial, is_1904)?;
    Ok(if datetime.and_utc().timestamp_subsec_millis() > 0 {
        datetime.format("%Y-%m-%d %H:%M:%S%.3f").to_string()
    } else {
        datetime.format("%Y-%m-%d %H:%M:%S").to_string()
    })
}

/// Formats a time value; durations past 24 hours keep counting hours.
fn to_time_string(serial: f64) -> String {
    let mut hours = (serial * MILLISECONDS_PER_DAY).round() as i64;
    let milliseconds = hours % 1_000; hours /= 1_000;
    let seconds = hours % 60; hours /= 60;
    let minutes = hours % 60; hours /= 60;
    if milliseconds > 0 {
        format!("{hours:02}:{minutes:02}:{seconds:02}.{milliseconds:03}")
    } else {
        format!("{hours:02}:{minutes:02}:{seconds:02}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(kind: CellType, value: &str) -> Cell {
        Cell { row: 0, col: 0, kind, value: value.to_owned() }
    }

    #[test]
    fn custom_number_formats() {
        assert_eq!(CellType::parse_custom_number_format("yyyy-mm-dd", false), CellType::NumberDate1900);
        assert_eq!(CellType::parse_custom_number_format("yyyy-mm-dd hh:mm", true), CellType::NumberDateTime1904);
        assert_eq!(CellType::parse_custom_number_format("[h]:mm:ss", false), CellType::NumberTime1900);
        assert_eq!(CellType::parse_custom_number_format("[Red]0.00", false), CellType::Number);
        assert_eq!(CellType::parse_custom_number_format("0.0\" days\"", false), CellType::Number);
        assert_eq!(CellType::parse_builtin_number_format_id("14", false), Some(CellType::NumberDate1900));
        assert_eq!(CellType::parse_builtin_number_format_id("2", false), None);
    }

    #[test]
    fn dates_and_times() {
        assert_eq!(cell(CellType::NumberDate1900, "45292").to_value(&[]), Ok(Value::from("2024-01-01")));
        assert_eq!(cell(CellType::NumberDate1900, "1").to_value(&[]), Ok(Value::from("1900-01-01")));
        assert_eq!(cell(CellType::NumberDate1900, "61").to_value(&[]), Ok(Value::from("1900-03-01")));
        assert_eq!(cell(CellType::NumberDate1904, "0").to_value(&[]), Ok(Value::from("1904-01-01")));
        assert_eq!(cell(CellType::NumberDateTime1900, "45292.75").to_value(&[]), Ok(Value::from("2024-01-01 18:00:00")));
        assert_eq!(cell(CellType::NumberTime1900, "0.5").to_value(&[]), Ok(Value::from("12:00:00")));
        assert_eq!(cell(CellType::NumberTime1900, "1.25").to_value(&[]), Ok(Value::from("30:00:00")));
        assert_eq!(cell(CellType::IsoDateTime, "2024-01-01T08:30:00").to_value(&[]), Ok(Value::from("2024-01-01 08:30:00")));
    }

    #[test]
    fn scalars() {
        let shared = vec!["Ann".to_owned()];
        assert_eq!(cell(CellType::Boolean, "1").to_value(&shared), Ok(Value::Bool(true)));
        assert_eq!(cell(CellType::Number, "42").to_value(&shared), Ok(Value::Number(42.0)));
        assert_eq!(cell(CellType::SharedString, "0").to_value(&shared), Ok(Value::from("Ann")));
        assert_eq!(cell(CellType::Error, "#N/A").to_value(&shared), Ok(Value::Null));
        assert!(cell(CellType::SharedString, "3").to_value(&shared).is_err());
        assert!(cell(CellType::Number, "abc").to_value(&shared).is_err());
    }
}
