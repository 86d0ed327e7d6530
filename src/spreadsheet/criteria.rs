use crate::error::StashError;
use glob::Pattern;

/// Decoder options: which sheets to read and how to treat error cells.
#[derive(Clone, Debug)]
pub struct Criteria {
    /// Glob patterns on the original sheet name; `None` reads every sheet.
    pub sheet_name_patterns: Option<Vec<Pattern>>,

    /// Convert error cells (`#N/A`, `#DIV/0!`, ...) to null instead of failing.
    pub error_as_null: bool,
}

impl Default for Criteria {
    fn default() -> Self {
        Criteria {
            sheet_name_patterns: None,
            error_as_null: true,
        }
    }
}

impl Criteria {
    /// Restricts decoding to sheets matching any of the glob patterns.
    pub fn with_sheet_patterns<I, S>(mut self, patterns: I) -> Result<Self, StashError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|pattern| Pattern::new(pattern.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        self.sheet_name_patterns = Some(patterns);
        Ok(self)
    }

    pub fn with_error_as_null(mut self, error_as_null: bool) -> Self {
        self.error_as_null = error_as_null;
        self
    }

    /// Checks if a sheet name matches the criteria patterns.
    pub(crate) fn accept(&self, sheet_name: &str) -> bool {
        match &self.sheet_name_patterns {
            Some(patterns) => patterns.iter().any(|pattern| pattern.matches(sheet_name)),
            None => true,
        }
    }
}
