//! The retry/DLQ protocol (4.B): a pure function of outcome, retry count and
//! policy, kept free of any broker I/O so it is unit-testable on its own.

pub const RETRY_COUNT_HEADER: &str = "x-retry-count";
pub const DEFAULT_MAX_RETRIES: i64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    DecodeFailure,
    ProcessingFailure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Ack,
    NackRequeue { next_retry_count: i64 },
    RejectToDlq,
}

/// Decides how a delivery should be resolved given its outcome and the
/// retry counter read from its headers (0 if absent).
pub fn decide(outcome: Outcome, retry_count: i64, max_retries: i64) -> Disposition {
    match outcome {
        Outcome::Success => Disposition::Ack,
        Outcome::DecodeFailure => Disposition::RejectToDlq,
        Outcome::ProcessingFailure => {
            let next = retry_count + 1;
            if next <= max_retries {
                Disposition::NackRequeue {
                    next_retry_count: next,
                }
            } else {
                Disposition::RejectToDlq
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_always_acks_regardless_of_retry_count() {
        assert_eq!(decide(Outcome::Success, 0, 3), Disposition::Ack);
        assert_eq!(decide(Outcome::Success, 99, 3), Disposition::Ack);
    }

    #[test]
    fn decode_failure_always_rejects_to_dlq() {
        assert_eq!(decide(Outcome::DecodeFailure, 0, 3), Disposition::RejectToDlq);
    }

    #[test]
    fn processing_failure_requeues_while_under_budget() {
        assert_eq!(
            decide(Outcome::ProcessingFailure, 0, 3),
            Disposition::NackRequeue { next_retry_count: 1 }
        );
        assert_eq!(
            decide(Outcome::ProcessingFailure, 2, 3),
            Disposition::NackRequeue { next_retry_count: 3 }
        );
    }

    #[test]
    fn processing_failure_rejects_to_dlq_once_budget_exhausted() {
        assert_eq!(
            decide(Outcome::ProcessingFailure, 3, 3),
            Disposition::RejectToDlq
        );
        assert_eq!(
            decide(Outcome::ProcessingFailure, 50, 3),
            Disposition::RejectToDlq
        );
    }

    // Property 3: bounded retries. No matter how many times a processing
    // failure recurs, the message resolves to ack or reject-to-dlq within
    // max_retries + 1 deliveries.
    #[test]
    fn bounded_retries_property() {
        let max_retries = 3;
        let mut retry_count = 0;
        let mut attempts = 0;
        loop {
            attempts += 1;
            match decide(Outcome::ProcessingFailure, retry_count, max_retries) {
                Disposition::NackRequeue { next_retry_count } => {
                    retry_count = next_retry_count;
                    assert!(attempts <= max_retries + 1, "did not terminate in time");
                }
                Disposition::RejectToDlq => break,
                Disposition::Ack => unreachable!(),
            }
        }
        assert!(attempts <= max_retries + 1);
    }
}
