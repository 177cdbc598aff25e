//! Typed errors and their structured failure codes.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("no settings configured for table '{0}'")]
    NotFound(String),
    #[error("settings load: {0}")]
    Load(String),
    #[error("invalid settings for table '{table}': {reason}")]
    Invalid { table: String, reason: String },
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(ConfigError),
    #[error("table not configured: {0}")]
    ConfigNotFound(String),
    #[error("validation: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("store: {0}")]
    Store(#[from] sqlx::Error),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<ConfigError> for AppError {
    fn from(e: ConfigError) -> Self {
        match e {
            ConfigError::NotFound(table) => AppError::ConfigNotFound(table),
            other => AppError::Config(other),
        }
    }
}

impl AppError {
    /// Stable machine-readable code reported alongside the message.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Config(_) => "config_error",
            AppError::ConfigNotFound(_) => "config_not_found",
            AppError::Validation(_) => "validation_error",
            AppError::NotFound(_) => "not_found",
            AppError::Store(sqlx::Error::RowNotFound) => "not_found",
            AppError::Store(_) => "store_error",
            AppError::BadRequest(_) => "bad_request",
            AppError::Json(_) => "encode_error",
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        AppError::BadRequest(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_not_found_maps_to_its_own_variant() {
        let err: AppError = ConfigError::NotFound("service".into()).into();
        assert!(matches!(err, AppError::ConfigNotFound(ref t) if t == "service"));
        assert_eq!(err.code(), "config_not_found");
    }

    #[test]
    fn test_row_not_found_reports_not_found_code() {
        let err = AppError::Store(sqlx::Error::RowNotFound);
        assert_eq!(err.code(), "not_found");
    }

    #[test]
    fn test_invalid_settings_stay_config_errors() {
        let err: AppError = ConfigError::Invalid {
            table: "service".into(),
            reason: "duplicate column 'id'".into(),
        }
        .into();
        assert_eq!(err.code(), "config_error");
        assert!(err.to_string().contains("duplicate column"));
    }
}
