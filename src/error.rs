use thiserror::Error;

/// Error type returned by user-supplied computed field transformations.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub type TransformResult<T> = Result<T, TransformError>;

#[derive(Error, Debug)]
pub enum TransformError {
    #[error("Type not found in schema: {0}")]
    TypeNotFound(String),
    #[error("Field `{field}` not found on type `{type_name}`")]
    FieldNotFound { type_name: String, field: String },
    #[error("`{0}` is not a where input type name")]
    NotAWhereInput(String),
    #[error("Field `{field}` on `{type_name}` does not resolve to a named type")]
    UnnamedType { type_name: String, field: String },
    #[error("Computed field `{field}` transformation failed: {source}")]
    Transformation {
        field: String,
        #[source]
        source: BoxError,
    },
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl TransformError {
    /// True when the filter tree referenced something the schema does not declare.
    pub fn is_schema_lookup(&self) -> bool {
        matches!(
            self,
            Self::TypeNotFound(_)
                | Self::FieldNotFound { .. }
                | Self::NotAWhereInput(_)
                | Self::UnnamedType { .. }
        )
    }

    pub fn is_transformation(&self) -> bool {
        matches!(self, Self::Transformation { .. })
    }
}
