use crate::model::FailureKind;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, TimekeepError>;

#[derive(Error, Debug)]
pub enum TimekeepError {
    #[error("Repository error: {0}")]
    Repository(String),
    #[error("No author identity configured for project '{0}'")]
    AuthorUnresolved(String),
    #[error("Estimation error: {0}")]
    Estimation(String),
    #[error("Export error: {0}")]
    Export(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Git repository error: {0}")]
    GitRepo(String),
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("Cache error: {0}")]
    Cache(String),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Invalid date: {0}")]
    InvalidDate(String),
    #[error("Git open error: {0}")]
    Open(#[from] Box<gix::open::Error>),
    #[error("Object find error: {0}")]
    ObjectFind(#[from] Box<gix::object::find::existing::Error>),
    #[error("Commit error: {0}")]
    Commit(#[from] Box<gix::object::commit::Error>),
    #[error("Object find with conversion error: {0}")]
    ObjectFindConv(#[from] Box<gix::object::find::existing::with_conversion::Error>),
    #[error("Object decode error: {0}")]
    ObjectDecode(#[from] Box<gix::objs::decode::Error>),
    #[error("Diff tree to tree error: {0}")]
    DiffTreeToTree(#[from] Box<gix::repository::diff_tree_to_tree::Error>),
}

impl TimekeepError {
    /// Which per-project failure this error represents in a run report.
    pub fn kind(&self) -> FailureKind {
        match self {
            TimekeepError::AuthorUnresolved(_) => FailureKind::AuthorUnresolved,
            TimekeepError::Estimation(_) | TimekeepError::Http(_) => FailureKind::Estimation,
            TimekeepError::Export(_)
            | TimekeepError::Config(_)
            | TimekeepError::Database(_)
            | TimekeepError::Cache(_)
            | TimekeepError::Serde(_)
            | TimekeepError::Io(_)
            | TimekeepError::InvalidDate(_) => FailureKind::Other,
            _ => FailureKind::Repository,
        }
    }
}

// Manual From implementations for unboxed to boxed conversions
impl From<gix::open::Error> for TimekeepError {
    fn from(err: gix::open::Error) -> Self {
        TimekeepError::Open(Box::new(err))
    }
}

impl From<gix::object::find::existing::Error> for TimekeepError {
    fn from(err: gix::object::find::existing::Error) -> Self {
        TimekeepError::ObjectFind(Box::new(err))
    }
}

impl From<gix::object::commit::Error> for TimekeepError {
    fn from(err: gix::object::commit::Error) -> Self {
        TimekeepError::Commit(Box::new(err))
    }
}

impl From<gix::object::find::existing::with_conversion::Error> for TimekeepError {
    fn from(err: gix::object::find::existing::with_conversion::Error) -> Self {
        TimekeepError::ObjectFindConv(Box::new(err))
    }
}

impl From<gix::objs::decode::Error> for TimekeepError {
    fn from(err: gix::objs::decode::Error) -> Self {
        TimekeepError::ObjectDecode(Box::new(err))
    }
}

impl From<gix::repository::diff_tree_to_tree::Error> for TimekeepError {
    fn from(err: gix::repository::diff_tree_to_tree::Error) -> Self {
        TimekeepError::DiffTreeToTree(Box::new(err))
    }
}
