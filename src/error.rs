use thiserror::Error;

/// Failures that abort extraction for a whole document.
#[derive(Debug, Error)]
pub enum LineageError {
    #[error("schema document has no `model.tables` list")]
    MissingRoot,

    #[error("malformed schema document: {0}")]
    MalformedSchema(#[from] serde_json::Error),

    #[error(transparent)]
    Archive(#[from] ArchiveError),
}

/// Failures reading the schema entry out of a template archive.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("invalid template archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("`{0}` entry not found in the template archive")]
    MissingSchemaEntry(String),

    #[error("failed to read the schema entry: {0}")]
    Io(#[from] std::io::Error),

    #[error("schema entry is not valid UTF-16 text: {0}")]
    Decode(String),
}

/// Failures for a single partition. These never abort extraction: the
/// partition is dropped and its siblings are still processed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("unparsable source expression: {0}")]
    Unparsable(String),

    #[error("unrecognized source type `{0}`")]
    UnrecognizedSourceType(String),
}
