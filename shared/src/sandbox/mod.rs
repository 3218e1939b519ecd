pub mod bridge;
pub mod executor;
pub mod process;

pub use bridge::{BridgeClient, BridgeError, CallHandler};
pub use executor::{DirectExecutor, ExecutionResult, SandboxConfig, SandboxExecutor};
pub use process::{ProcessError, SandboxProcessConfig, SandboxProcessManager};
