use thiserror::Error;

/// Every error kind named in the core's error-handling design.
///
/// These are error *kinds*, not a one-to-one mapping onto every narrower
/// per-module error type, component-local errors (e.g. `VadError`,
/// `GatekeeperError`) convert into this enum at the boundary where they
/// cross into a caller that has to report a user-visible failure.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("state transition {from} -> {to} is not allowed")]
    StateTransition { from: String, to: String },

    #[error("audio capture failure: {0}")]
    CaptureFailure(String),

    #[error("vad timeout")]
    VadTimeout,

    #[error("processing timeout")]
    ProcessingTimeout,

    #[error("skill not allowed: {0}")]
    SkillNotAllowed(String),

    #[error("skill not found: {0}")]
    SkillNotFound(String),

    #[error("{0}")]
    SkillRuntime(String),

    #[error("sandbox unavailable: {0}")]
    SandboxUnavailable(String),

    #[error("sandbox timeout ({0}s)")]
    SandboxTimeout(f64),

    #[error("bridge protocol error: {0}")]
    BridgeProtocol(String),

    #[error("device '{0}' is not currently connected")]
    DeviceNotConnected(String),

    #[error("request timed out")]
    RequestTimeout,

    #[error("remote runtime error: {0}")]
    RemoteRuntime(String),

    #[error("agent is busy processing another message")]
    AgentBusy,

    #[error("agent iteration limit exceeded")]
    AgentIterationExceeded,
}

impl CoreError {
    /// The stable kind name used in logs and error events, matching the
    /// kebab-case vocabulary in the error-handling design.
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::StateTransition { .. } => "state-transition",
            CoreError::CaptureFailure(_) => "capture-failure",
            CoreError::VadTimeout => "vad-timeout",
            CoreError::ProcessingTimeout => "processing-timeout",
            CoreError::SkillNotAllowed(_) => "skill-not-allowed",
            CoreError::SkillNotFound(_) => "skill-not-found",
            CoreError::SkillRuntime(_) => "skill-runtime",
            CoreError::SandboxUnavailable(_) => "sandbox-unavailable",
            CoreError::SandboxTimeout(_) => "sandbox-timeout",
            CoreError::BridgeProtocol(_) => "bridge-protocol",
            CoreError::DeviceNotConnected(_) => "device-not-connected",
            CoreError::RequestTimeout => "request-timeout",
            CoreError::RemoteRuntime(_) => "remote-runtime",
            CoreError::AgentBusy => "agent-busy",
            CoreError::AgentIterationExceeded => "agent-iteration-exceeded",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_error_vocabulary() {
        assert_eq!(CoreError::VadTimeout.kind(), "vad-timeout");
        assert_eq!(
            CoreError::SkillNotAllowed("Foo.bar".into()).kind(),
            "skill-not-allowed"
        );
        assert_eq!(CoreError::AgentBusy.kind(), "agent-busy");
    }
}
