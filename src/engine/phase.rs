//! Transaction inspection phases.

/// The five inspection phases of an HTTP transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Phase {
    /// Phase 1: request line and request headers available.
    RequestHeaders = 1,
    /// Phase 2: request body available.
    RequestBody = 2,
    /// Phase 3: response headers available.
    ResponseHeaders = 3,
    /// Phase 4: response body available.
    ResponseBody = 4,
    /// Phase 5: logging. Always executed, even after an interruption.
    Logging = 5,
}

impl Phase {
    /// Numeric phase (1-5).
    pub fn number(&self) -> u8 {
        *self as u8
    }

    /// Phase name for logs and audit output.
    pub fn name(&self) -> &'static str {
        match self {
            Phase::RequestHeaders => "REQUEST_HEADERS",
            Phase::RequestBody => "REQUEST_BODY",
            Phase::ResponseHeaders => "RESPONSE_HEADERS",
            Phase::ResponseBody => "RESPONSE_BODY",
            Phase::Logging => "LOGGING",
        }
    }

    /// Create from a phase number.
    pub fn from_number(n: u8) -> Option<Self> {
        match n {
            1 => Some(Phase::RequestHeaders),
            2 => Some(Phase::RequestBody),
            3 => Some(Phase::ResponseHeaders),
            4 => Some(Phase::ResponseBody),
            5 => Some(Phase::Logging),
            _ => None,
        }
    }

    /// All phases in execution order.
    pub fn all() -> &'static [Phase] {
        &[
            Phase::RequestHeaders,
            Phase::RequestBody,
            Phase::ResponseHeaders,
            Phase::ResponseBody,
            Phase::Logging,
        ]
    }

    /// Zero-based index for phase-keyed tables.
    pub(crate) fn index(&self) -> usize {
        (*self as usize) - 1
    }

    /// Whether this phase inspects the request side.
    pub fn is_request_phase(&self) -> bool {
        matches!(self, Phase::RequestHeaders | Phase::RequestBody)
    }

    /// Whether this phase inspects the response side.
    pub fn is_response_phase(&self) -> bool {
        matches!(self, Phase::ResponseHeaders | Phase::ResponseBody)
    }
}

impl Default for Phase {
    fn default() -> Self {
        // SecDefaultAction semantics: rules land in phase 2 unless told otherwise.
        Phase::RequestBody
    }
}

impl TryFrom<u8> for Phase {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Phase::from_number(value).ok_or(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_numbers_roundtrip() {
        for n in 1..=5 {
            assert_eq!(Phase::from_number(n).map(|p| p.number()), Some(n));
        }
        assert_eq!(Phase::from_number(0), None);
        assert_eq!(Phase::from_number(6), None);
    }

    #[test]
    fn test_default_phase_is_request_body() {
        assert_eq!(Phase::default(), Phase::RequestBody);
    }

    #[test]
    fn test_request_response_split() {
        assert!(Phase::RequestHeaders.is_request_phase());
        assert!(Phase::RequestBody.is_request_phase());
        assert!(Phase::ResponseHeaders.is_response_phase());
        assert!(Phase::ResponseBody.is_response_phase());
        assert!(!Phase::Logging.is_request_phase());
        assert!(!Phase::Logging.is_response_phase());
    }
}
