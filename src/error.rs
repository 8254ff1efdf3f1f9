use thiserror::Error;

/// Failures that abort an evaluation run
#[derive(Debug, Error)]
pub enum EvalError {
    /// The input dataset could not be read or decoded
    #[error("invalid input dataset: {0}")]
    Input(String),

    /// The required credential variable is unset or empty
    #[error("{0} is not set")]
    MissingCredential(String),

    /// The configuration holds a value the run cannot use
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The evaluation engine failed
    #[error("evaluation failed: {0:#}")]
    Delegate(anyhow::Error),

    /// The evaluation result does not have the expected shape
    #[error("malformed evaluation result: {0}")]
    ResultShape(String),

    /// The payload could not be written out
    #[error("failed to write results: {0:#}")]
    Output(anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_credential_message() {
        let err = EvalError::MissingCredential("GITHUB_MODELS_TOKEN".to_string());
        assert_eq!(err.to_string(), "GITHUB_MODELS_TOKEN is not set");
    }

    #[test]
    fn test_delegate_message_includes_chain() {
        let inner = anyhow::anyhow!("connection refused").context("Failed to generate judgement");
        let err = EvalError::Delegate(inner);
        let message = err.to_string();
        assert!(message.starts_with("evaluation failed: Failed to generate judgement"));
        assert!(message.contains("connection refused"));
    }
}
