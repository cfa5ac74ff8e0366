use crate::errors::{CmbsError, CmbsResult};
use std::io::{BufRead, Lines};

/// Line source that remembers where it is, for error messages.
pub(crate) struct LineReader<R> {
    lines: Lines<R>,
    line: usize,
    source_name: String,
}

impl<R: BufRead> LineReader<R> {
    pub(crate) fn new(reader: R, source_name: &str) -> Self {
        Self {
            lines: reader.lines(),
            line: 0,
            source_name: source_name.to_string(),
        }
    }

    /// Number of the line returned last (1-based).
    #[cfg(test)]
    pub(crate) fn line(&self) -> usize {
        self.line
    }

    pub(crate) fn error(&self, message: impl Into<String>) -> CmbsError {
        CmbsError::parse(&self.source_name, self.line, message)
    }

    /// Next physical line without its line terminator.
    pub(crate) fn next_raw(&mut self) -> CmbsResult<Option<String>> {
        match self.lines.next() {
            Some(line) => {
                self.line += 1;
                Ok(Some(line?.trim_end_matches('\r').to_string()))
            }
            None => Ok(None),
        }
    }

    /// Next line that is neither blank nor a comment, left-trimmed.
    pub(crate) fn next_content(&mut self) -> CmbsResult<Option<String>> {
        while let Some(line) = self.next_raw()? {
            let line = line.trim_start();
            if line.is_empty() || is_comment(line) {
                continue;
            }
            return Ok(Some(line.to_string()));
        }
        Ok(None)
    }
}

pub(crate) fn is_comment(line: &str) -> bool {
    line.trim_start().starts_with('#')
}
