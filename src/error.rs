use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthzError {
    #[error("no relation config for ({0}, {1})")]
    RelationConfigNotFound(String, String),

    #[error("subject type '{0}' is not directly assignable on relation '{1}'")]
    InvalidSubjectType(String, String),

    #[error("relation '{0}' does not allow userset subjects")]
    UsersetNotAllowed(String),

    #[error("condition '{0}' is not defined")]
    ConditionNotFound(String),

    #[error("condition '{name}' failed to evaluate: {source}")]
    ConditionEvaluationError {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("stored data failed validation: {0}")]
    InvalidStoredData(String),

    #[error("check was cancelled")]
    Cancelled,

    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, AuthzError>;
