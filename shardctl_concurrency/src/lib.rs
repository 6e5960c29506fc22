//! Error collection for work that reports many independent failures.
//!
//! Algorithms that find several problems in a single pass (for example a permission diff between
//! two database instances) should not stop at the first one. They instead hand every problem to
//! an [`ErrorRecorder`] sink that the caller owns and inspects afterwards.
//!
//! Two recorders are provided:
//!
//! * [`AllErrorRecorder`] keeps every error in the order it was recorded.
//! * [`FirstErrorRecorder`] keeps only the first error and drops the rest.
//!
//! Both use interior mutability so a single recorder can be shared by concurrent producers.
use parking_lot::Mutex;

/// The error type accepted by an [`ErrorRecorder`]
pub type BoxedError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A sink for errors
pub trait ErrorRecorder: std::fmt::Debug + Send + Sync {
    /// Record a single error
    fn record_error(&self, error: BoxedError);
}

/// Records every error it is given, in order
#[derive(Debug, Default)]
pub struct AllErrorRecorder {
    errors: Mutex<Vec<BoxedError>>,
}

impl AllErrorRecorder {
    /// Create an empty [`AllErrorRecorder`]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether any error was recorded
    pub fn has_errors(&self) -> bool {
        !self.errors.lock().is_empty()
    }

    /// The number of recorded errors
    pub fn len(&self) -> usize {
        self.errors.lock().len()
    }

    /// Whether nothing was recorded
    pub fn is_empty(&self) -> bool {
        !self.has_errors()
    }

    /// The display strings of every recorded error, in recording order
    pub fn error_strings(&self) -> Vec<String> {
        self.errors.lock().iter().map(|e| e.to_string()).collect()
    }

    /// A single error summarizing everything that was recorded, or `None` if nothing was
    pub fn error(&self) -> Option<AggregateError> {
        let messages = self.error_strings();
        (!messages.is_empty()).then_some(AggregateError { messages })
    }

    /// Consume the recorder, returning the recorded errors
    pub fn into_errors(self) -> Vec<BoxedError> {
        self.errors.into_inner()
    }
}

impl ErrorRecorder for AllErrorRecorder {
    fn record_error(&self, error: BoxedError) {
        self.errors.lock().push(error);
    }
}

/// The combination of all errors held by an [`AllErrorRecorder`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{}", .messages.join("; "))]
pub struct AggregateError {
    messages: Vec<String>,
}

impl AggregateError {
    /// The individual messages, in recording order
    pub fn messages(&self) -> &[String] {
        &self.messages
    }
}

/// Records only the first error it is given
#[derive(Debug, Default)]
pub struct FirstErrorRecorder {
    first: Mutex<Option<BoxedError>>,
}

impl FirstErrorRecorder {
    /// Create an empty [`FirstErrorRecorder`]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether an error was recorded
    pub fn has_errors(&self) -> bool {
        self.first.lock().is_some()
    }

    /// The display string of the first recorded error
    pub fn error_string(&self) -> Option<String> {
        self.first.lock().as_ref().map(|e| e.to_string())
    }

    /// Consume the recorder, returning the first recorded error
    pub fn into_error(self) -> Option<BoxedError> {
        self.first.into_inner()
    }
}

impl ErrorRecorder for FirstErrorRecorder {
    fn record_error(&self, error: BoxedError) {
        let mut first = self.first.lock();
        if first.is_none() {
            *first = Some(error);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("problem {0}")]
    struct Problem(usize);

    #[test]
    fn all_recorder_keeps_order() {
        let recorder = AllErrorRecorder::new();
        assert!(!recorder.has_errors());
        assert!(recorder.error().is_none());

        for i in 0..3 {
            recorder.record_error(Box::new(Problem(i)));
        }

        assert!(recorder.has_errors());
        assert_eq!(recorder.len(), 3);
        assert_eq!(
            recorder.error_strings(),
            vec!["problem 0", "problem 1", "problem 2"]
        );
        let aggregate = recorder.error().unwrap();
        assert_eq!(aggregate.to_string(), "problem 0; problem 1; problem 2");
        assert_eq!(aggregate.messages().len(), 3);
        assert_eq!(recorder.into_errors().len(), 3);
    }

    #[test]
    fn first_recorder_drops_the_rest() {
        let recorder = FirstErrorRecorder::new();
        assert!(recorder.error_string().is_none());

        recorder.record_error(Box::new(Problem(7)));
        recorder.record_error(Box::new(Problem(8)));

        assert!(recorder.has_errors());
        assert_eq!(recorder.error_string().as_deref(), Some("problem 7"));
        assert_eq!(recorder.into_error().unwrap().to_string(), "problem 7");
    }

    #[tokio::test]
    async fn shared_between_tasks() {
        let recorder = Arc::new(AllErrorRecorder::new());
        let handles = (0..8)
            .map(|i| {
                let recorder = Arc::clone(&recorder);
                tokio::spawn(async move { recorder.record_error(Box::new(Problem(i))) })
            })
            .collect::<Vec<_>>();
        for h in handles {
            h.await.unwrap();
        }

        let mut strings = recorder.error_strings();
        strings.sort();
        assert_eq!(strings.len(), 8);
        assert_eq!(strings[0], "problem 0");
    }
}
