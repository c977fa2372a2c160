use std::path::{Path, PathBuf};

use crate::error::{TransformError, TransformResult};
use crate::introspection::IntrospectionIndex;

pub const SCHEMA_VAR: &str = "COMPUTED_WHERE_SCHEMA";
pub const SCHEMA_FORMAT_VAR: &str = "COMPUTED_WHERE_SCHEMA_FORMAT";
pub const LOG_VAR: &str = "COMPUTED_WHERE_LOG";
pub const LOG_FORMAT_VAR: &str = "COMPUTED_WHERE_LOG_FORMAT";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaFormat {
    Introspection,
    Sdl,
}

impl SchemaFormat {
    fn parse(value: &str) -> TransformResult<Self> {
        match value.trim().to_lowercase().as_str() {
            "introspection" | "json" => Ok(Self::Introspection),
            "sdl" | "graphql" => Ok(Self::Sdl),
            other => Err(TransformError::Config(format!(
                "unknown schema format `{}`, expected `introspection` or `sdl`",
                other
            ))),
        }
    }

    fn infer(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("graphql") | Some("gql") => Self::Sdl,
            _ => Self::Introspection,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Full,
    Compact,
    Pretty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: LogFormat::Full,
        }
    }
}

// COMPUTED_WHERE_SCHEMA (required), COMPUTED_WHERE_SCHEMA_FORMAT, COMPUTED_WHERE_LOG
// and COMPUTED_WHERE_LOG_FORMAT; a .env file is loaded first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformerConfig {
    pub schema_path: PathBuf,
    pub schema_format: SchemaFormat,
    pub log: LogConfig,
}

impl TransformerConfig {
    pub fn from_env() -> TransformResult<Self> {
        dotenv::dotenv().ok();
        Self::from_vars(|name| std::env::var(name).ok())
    }

    pub fn from_vars<F>(lookup: F) -> TransformResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let schema_path = var(SCHEMA_VAR)
            .map(PathBuf::from)
            .ok_or_else(|| TransformError::Config(format!("{} must be set", SCHEMA_VAR)))?;
        let schema_format = match var(SCHEMA_FORMAT_VAR) {
            Some(format) => SchemaFormat::parse(&format)?,
            None => SchemaFormat::infer(&schema_path),
        };

        let mut log = LogConfig::default();
        if let Some(level) = var(LOG_VAR) {
            log.level = level.trim().to_lowercase();
        }
        if let Some(format) = var(LOG_FORMAT_VAR) {
            log.format = match format.trim().to_lowercase().as_str() {
                "compact" => LogFormat::Compact,
                "pretty" => LogFormat::Pretty,
                _ => LogFormat::Full,
            };
        }

        Ok(Self {
            schema_path,
            schema_format,
            log,
        })
    }

    pub async fn load_index(&self) -> TransformResult<IntrospectionIndex> {
        let source = tokio::fs::read_to_string(&self.schema_path).await?;
        tracing::info!(
            path = %self.schema_path.display(),
            format = ?self.schema_format,
            "Loading schema"
        );
        match self.schema_format {
            SchemaFormat::Introspection => IntrospectionIndex::from_introspection_json(&source),
            SchemaFormat::Sdl => IntrospectionIndex::from_sdl(&source),
        }
    }
}
