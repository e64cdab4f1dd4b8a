use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Failed to read table: {0}")]
    Csv(#[from] csv::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed table {path}: {reason}")]
    MalformedTable { path: String, reason: String },
    #[error("Reference group '{0}' not found in per-track table")]
    MissingReference(String),
    #[error("Not enough groups with data to compare: {usable} usable (need at least 2)")]
    InsufficientGroups { usable: usize },
}

/// Non-fatal condition surfaced to the user instead of aborting the batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoticeKind {
    MissingInput,
    MissingTrack,
    InsufficientSample,
    MissingCapability,
    UndefinedStatistic,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

impl Notice {
    pub fn new(kind: NoticeKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self.kind {
            NoticeKind::MissingInput => "missing input",
            NoticeKind::MissingTrack => "missing track",
            NoticeKind::InsufficientSample => "insufficient sample size",
            NoticeKind::MissingCapability => "missing capability",
            NoticeKind::UndefinedStatistic => "undefined statistic",
        };
        write!(f, "[{}] {}", tag, self.message)
    }
}
