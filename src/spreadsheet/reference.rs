//! A1-style cell references and their 0-based (row, col) indexes

/// Converts a column label ("A", "AB") to a 0-based index.
pub(crate) fn col_to_index(label: &str) -> Option<usize> {
    if label.is_empty() {
        return None;
    }
    label.chars().try_fold(0usize, |index, character| {
        if character.is_ascii_alphabetic() {
            let digit = (character.to_ascii_uppercase() as u8 - b'A') as usize + 1;
            index.checked_mul(26)?.checked_add(digit)
        } else {
            None
        }
    }).map(|index| index - 1)
}

/// Converts a 1-based row label to a 0-based index.
pub(crate) fn row_to_index(label: &str) -> Option<usize> {
    label.parse::<usize>().ok().and_then(|row| row.checked_sub(1))
}

/// Parses a reference such as "C7" into `(row, col)`.
pub(crate) fn reference_to_index(reference: &str) -> Option<(usize, usize)> {
    let split = reference.find(|character: char| character.is_ascii_digit())?;
    let (col, row) = reference.split_at(split);
    Some((row_to_index(row)?, col_to_index(col)?))
}

/// Formats `(row, col)` as an A1-style reference.
pub(crate) fn index_to_reference(row: usize, col: usize) -> String {
    let mut label = Vec::<u8>::new();
    let mut col = col + 1;
    while col > 0 {
        col -= 1;
        label.push(b'A' + (col % 26) as u8);
        col /= 26;
    }
    label.reverse();
    format!("{}{}", String::from_utf8_lossy(&label), row + 1)
}
