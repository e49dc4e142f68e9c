use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Tickers are short; anything longer is a caller bug, not a real symbol.
const MAX_LEN: usize = 10;

/// An uppercase-normalized stock ticker.
///
/// Construction goes through [`Symbol::parse`], which trims, uppercases, and
/// validates in one pass: the first character must be an ASCII letter, the
/// rest ASCII letters, digits, `.` or `-` (class shares and unit-style
/// tickers). Two symbols that differ only in case or surrounding whitespace
/// compare equal after parsing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptySymbol);
        }
        if trimmed.len() > MAX_LEN {
            return Err(ValidationError::SymbolTooLong {
                len: trimmed.len(),
                max: MAX_LEN,
            });
        }

        let mut normalized = String::with_capacity(trimmed.len());
        for (index, ch) in trimmed.chars().enumerate() {
            let upper = ch.to_ascii_uppercase();
            match upper {
                'A'..='Z' => {}
                '0'..='9' | '.' | '-' if index > 0 => {}
                _ if index == 0 => return Err(ValidationError::SymbolInvalidStart { ch }),
                _ => return Err(ValidationError::SymbolInvalidChar { ch, index }),
            }
            normalized.push(upper);
        }

        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Symbol {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Symbol {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl TryFrom<String> for Symbol {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Symbol> for String {
    fn from(value: Symbol) -> Self {
        value.0
    }
}
