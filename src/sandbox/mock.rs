//! Scripted sandbox for testing.
//!
//! Each provisioned session consumes the next [`Script`] (cycling when
//! exhausted) and every trait call is recorded, so tests can assert that
//! teardown happened exactly once per session on every path.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use super::{ExecutionOutput, Sandbox, SandboxError, SessionHandle};

/// What one session does.
#[derive(Debug, Clone)]
pub(crate) enum Script {
    /// Program runs and exits with the given code and output.
    Exit(i64, String),
    /// Provisioning fails.
    ProvisionError(String),
    /// Execution returns an error.
    ExecuteError(String),
    /// Execution panics mid-flight.
    Panic(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SandboxCall {
    Provision,
    Execute(String),
    Teardown,
}

#[derive(Debug, Clone)]
pub(crate) struct MockSandbox {
    scripts: Arc<Vec<Script>>,
    calls: Arc<Mutex<Vec<SandboxCall>>>,
    sessions: Arc<Mutex<usize>>,
    teardown_fails: bool,
}

impl MockSandbox {
    pub fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Arc::new(scripts),
            calls: Arc::new(Mutex::new(Vec::new())),
            sessions: Arc::new(Mutex::new(0)),
            teardown_fails: false,
        }
    }

    pub fn always_exit(code: i64, output: &str) -> Self {
        Self::new(vec![Script::Exit(code, output.to_string())])
    }

    /// Makes every teardown return an error.
    pub fn failing_teardown(mut self) -> Self {
        self.teardown_fails = true;
        self
    }

    pub fn calls(&self) -> Vec<SandboxCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn provision_count(&self) -> usize {
        self.count(&SandboxCall::Provision)
    }

    pub fn teardown_count(&self) -> usize {
        self.count(&SandboxCall::Teardown)
    }

    /// Programs that were executed, in order.
    pub fn executed(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                SandboxCall::Execute(code) => Some(code),
                _ => None,
            })
            .collect()
    }

    fn count(&self, call: &SandboxCall) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }

    fn record(&self, call: SandboxCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn script_for(&self, handle: &SessionHandle) -> Script {
        let index: usize = handle
            .container_id()
            .trim_start_matches("mock-")
            .parse()
            .unwrap();
        self.scripts[index % self.scripts.len()].clone()
    }
}

#[async_trait]
impl Sandbox for MockSandbox {
    async fn provision(&self) -> Result<SessionHandle, SandboxError> {
        self.record(SandboxCall::Provision);

        let index = {
            let mut sessions = self.sessions.lock().unwrap();
            *sessions += 1;
            *sessions - 1
        };

        match &self.scripts[index % self.scripts.len()] {
            Script::ProvisionError(msg) => Err(SandboxError::launch(msg.clone())),
            _ => Ok(SessionHandle::new(format!("mock-{index}"), "mock:latest")),
        }
    }

    async fn execute(
        &self,
        handle: &SessionHandle,
        code: &str,
    ) -> Result<ExecutionOutput, SandboxError> {
        self.record(SandboxCall::Execute(code.to_string()));

        match self.script_for(handle) {
            Script::Exit(exit_code, output) => Ok(ExecutionOutput { exit_code, output }),
            Script::ExecuteError(msg) => Err(SandboxError::execution(msg)),
            Script::Panic(msg) => panic!("{msg}"),
            Script::ProvisionError(_) => unreachable!("session was never provisioned"),
        }
    }

    async fn teardown(&self, _handle: SessionHandle) -> Result<(), SandboxError> {
        self.record(SandboxCall::Teardown);
        if self.teardown_fails {
            return Err(SandboxError::teardown("container already gone"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_sandbox_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<MockSandbox>();
    }

    #[tokio::test]
    async fn test_mock_sandbox_scripts_per_session() {
        let sandbox = MockSandbox::new(vec![
            Script::Exit(1, "first".to_string()),
            Script::Exit(0, "second".to_string()),
        ]);

        let h1 = sandbox.provision().await.unwrap();
        let o1 = sandbox.execute(&h1, "a").await.unwrap();
        sandbox.teardown(h1).await.unwrap();

        let h2 = sandbox.provision().await.unwrap();
        let o2 = sandbox.execute(&h2, "b").await.unwrap();
        sandbox.teardown(h2).await.unwrap();

        assert_eq!(o1.output, "first");
        assert_eq!(o2.exit_code, 0);
        assert_eq!(sandbox.executed(), ["a", "b"]);
        assert_eq!(sandbox.provision_count(), 2);
        assert_eq!(sandbox.teardown_count(), 2);
    }
}
