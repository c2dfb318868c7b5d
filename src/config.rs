use std::env;

const DEFAULT_DELIMITER: u8 = b',';
const DEFAULT_DETAIL_ROWS: usize = 20;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub delimiter: u8,
    pub detail_rows: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            delimiter: DEFAULT_DELIMITER,
            detail_rows: DEFAULT_DETAIL_ROWS,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        Self::from_vars(
            env::var("MIRA_CSV_DELIMITER").ok(),
            env::var("MIRA_DETAIL_ROWS").ok(),
        )
    }

    /// Unset or unusable values fall back to the defaults.
    pub fn from_vars(delimiter: Option<String>, detail_rows: Option<String>) -> Self {
        Config {
            delimiter: delimiter
                .as_deref()
                .and_then(parse_delimiter)
                .unwrap_or(DEFAULT_DELIMITER),
            detail_rows: detail_rows
                .and_then(|raw| raw.trim().parse().ok())
                .unwrap_or(DEFAULT_DETAIL_ROWS),
        }
    }

    pub fn with_overrides(mut self, delimiter: Option<u8>, detail_rows: Option<usize>) -> Self {
        if let Some(delimiter) = delimiter {
            self.delimiter = delimiter;
        }
        if let Some(detail_rows) = detail_rows {
            self.detail_rows = detail_rows;
        }
        self
    }
}

/// A single ASCII character, or `tab`.
pub fn parse_delimiter(raw: &str) -> Option<u8> {
    match raw {
        "tab" | "\\t" | "\t" => Some(b'\t'),
        _ => match raw.trim().as_bytes() {
            [byte] if byte.is_ascii() => Some(*byte),
            _ => None,
        },
    }
}
