use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::ValidationError;

const MAX_SYMBOL_LEN: usize = 15;

/// Upper-cased ticker symbol as the provider and the store know it.
///
/// Share-class suffixes (`BRK-B`, `BF.B`) and index symbols (`^GSPC`) are
/// accepted; whitespace and anything else outside `[A-Z0-9.^=-]` is not.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let normalized = input.trim().to_ascii_uppercase();
        let Some(first) = normalized.chars().next() else {
            return Err(ValidationError::EmptySymbol);
        };

        let len = normalized.chars().count();
        if len > MAX_SYMBOL_LEN {
            return Err(ValidationError::SymbolTooLong {
                len,
                max: MAX_SYMBOL_LEN,
            });
        }

        if !(first.is_ascii_alphabetic() || first == '^') {
            return Err(ValidationError::SymbolInvalidStart { ch: first });
        }

        if let Some((index, ch)) = normalized
            .chars()
            .enumerate()
            .skip(1)
            .find(|(_, ch)| !(ch.is_ascii_alphanumeric() || matches!(ch, '.' | '-' | '=')))
        {
            return Err(ValidationError::SymbolInvalidChar { ch, index });
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
