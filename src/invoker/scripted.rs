//! In-process mount helper for tests and dry runs.
//!
//! Nothing is mounted. Every call is recorded, failures can be queued up
//! ahead of time, and an artificial delay widens race windows.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{InvokerError, MountInvoker};
use crate::volume::ConnectionParams;

/// One recorded invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvokerCall {
    Establish { mountpoint: PathBuf, connection: String },
    Teardown { mountpoint: PathBuf },
}

#[derive(Default)]
pub struct ScriptedInvoker {
    calls: Mutex<Vec<InvokerCall>>,
    establish_failures: Mutex<VecDeque<String>>,
    teardown_failures: Mutex<VecDeque<String>>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside every call
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    /// Make the next establish call fail with `message`
    pub fn fail_next_establish(&self, message: impl Into<String>) {
        self.establish_failures.lock().push_back(message.into());
    }

    /// Make the next teardown call fail with `message`
    pub fn fail_next_teardown(&self, message: impl Into<String>) {
        self.teardown_failures.lock().push_back(message.into());
    }

    pub fn calls(&self) -> Vec<InvokerCall> {
        self.calls.lock().clone()
    }

    pub fn establish_count(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| matches!(c, InvokerCall::Establish { .. }))
            .count()
    }

    pub fn teardown_count(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| matches!(c, InvokerCall::Teardown { .. }))
            .count()
    }

    /// Highest number of calls that were running at the same moment
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn invoke(
        &self,
        call: InvokerCall,
        failures: &Mutex<VecDeque<String>>,
    ) -> Result<(), InvokerError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        self.calls.lock().push(call);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let failure = failures.lock().pop_front();

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        match failure {
            Some(message) => Err(InvokerError::Other(message)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl MountInvoker for ScriptedInvoker {
    async fn establish(
        &self,
        mountpoint: &Path,
        params: &ConnectionParams,
    ) -> Result<(), InvokerError> {
        let call = InvokerCall::Establish {
            mountpoint: mountpoint.to_path_buf(),
            connection: params.connection.clone(),
        };
        self.invoke(call, &self.establish_failures).await
    }

    async fn teardown(&self, mountpoint: &Path) -> Result<(), InvokerError> {
        let call = InvokerCall::Teardown {
            mountpoint: mountpoint.to_path_buf(),
        };
        self.invoke(call, &self.teardown_failures).await
    }
}
