use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;

/// Why a run stopped in the `Failed` state.
///
/// Errors are cheap to clone so the same value can live in the runner's
/// terminal state and be handed back to the caller.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StepError {
    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("Script function {function} failed: {reason}")]
    Script { function: String, reason: String },

    #[error("Condition {assertion} was not met within {timeout:?}")]
    ConditionTimeout { assertion: String, timeout: Duration },

    #[error("Unexpected result shape: {0}")]
    DomainParse(String),

    /// Raised deliberately by a step handler.
    #[error(transparent)]
    User(Arc<dyn StdError + Send + Sync>),

    #[error("{operation} did not finish within {timeout:?}")]
    BridgeTimeout { operation: String, timeout: Duration },

    #[error("Async process at step {index} dropped its completion without resuming")]
    AsyncProcessAbandoned { index: usize },

    #[error("Run exceeded the limit of {limit} executed steps")]
    StepLimitExceeded { limit: usize },
}

impl StepError {
    /// Wrap a domain error returned from a step handler.
    pub fn user(err: impl StdError + Send + Sync + 'static) -> Self {
        Self::User(Arc::new(err))
    }

    pub fn script(function: impl Into<String>, reason: impl ToString) -> Self {
        Self::Script {
            function: function.into(),
            reason: reason.to_string(),
        }
    }

    pub fn navigation(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::Navigation {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// Returns the wrapped handler error if it is a `T`.
    pub fn user_error<T: StdError + 'static>(&self) -> Option<&T> {
        match self {
            Self::User(inner) => inner.downcast_ref::<T>(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error, PartialEq)]
    #[error("bad payload")]
    struct BadPayload;

    #[test]
    fn test_user_error_downcasts_to_concrete_type() {
        let err = StepError::user(BadPayload);
        assert_eq!(err.user_error::<BadPayload>(), Some(&BadPayload));
        assert_eq!(err.to_string(), "bad payload");
    }

    #[test]
    fn test_user_error_is_none_for_engine_errors() {
        let err = StepError::DomainParse("missing accounts".to_string());
        assert!(err.user_error::<BadPayload>().is_none());
        assert_eq!(err.to_string(), "Unexpected result shape: missing accounts");
    }

    #[test]
    fn test_condition_timeout_message_names_assertion() {
        let err = StepError::ConditionTimeout {
            assertion: "assertTitle".to_string(),
            timeout: Duration::from_secs(5),
        };
        assert_eq!(err.to_string(), "Condition assertTitle was not met within 5s");
    }
}
