use crate::transport::Rank;

/// The fatal error kinds of the coordination engine. They travel inside `anyhow::Error` and can be
///  recovered with `downcast_ref::<DsparError>()`.
///
/// None of them is recoverable: a node that hits one stops, and the pipeline runner aborts the
///  whole process group.
#[derive(Debug, thiserror::Error)]
pub enum DsparError {
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("payload size mismatch on transfer from rank {from}: expected {expected} bytes, received {actual}")]
    ProtocolSizeMismatch {
        from: Rank,
        expected: usize,
        actual: usize,
    },

    #[error("invalid capability use: {0}")]
    InvalidCapabilityUse(&'static str),

    #[error("process group was aborted: {0}")]
    GroupAborted(String),
}

impl DsparError {
    pub fn configuration(msg: impl Into<String>) -> anyhow::Error {
        DsparError::Configuration(msg.into()).into()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_downcast_through_anyhow() {
        let err: anyhow::Error = DsparError::InvalidCapabilityUse("emit without output").into();
        match err.downcast_ref::<DsparError>() {
            Some(DsparError::InvalidCapabilityUse(msg)) => assert_eq!(*msg, "emit without output"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_size_mismatch_message() {
        let err = DsparError::ProtocolSizeMismatch { from: 3, expected: 8, actual: 4 };
        assert_eq!(err.to_string(), "payload size mismatch on transfer from rank 3: expected 8 bytes, received 4");
    }
}
