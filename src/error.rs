use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyticsError {
    #[error("Missing columns: {}", .missing.join(", "))]
    MissingColumns { missing: Vec<String> },

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Invalid date: {0}")]
    InvalidDate(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AnalyticsError {
    pub fn missing_columns<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        AnalyticsError::MissingColumns {
            missing: names.into_iter().map(Into::into).collect(),
        }
    }
}
