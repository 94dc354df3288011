//! Finite State Machine for a single deployment run

/// Deployment state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployState {
    /// Initial state, nothing fetched yet
    Idle,

    /// Snapshot download in progress
    Fetching,

    /// Snapshot extracted to the scratch area
    Extracted,

    /// Files moving into the deploy path
    Syncing,

    /// Setup script running
    SettingUp,

    /// Run finished, deploy path reflects the target commit
    Done,

    /// Run aborted, deploy path unchanged or partially updated
    Failed,
}

/// Deployment event
#[derive(Debug, Clone)]
pub enum DeployEvent {
    /// Start fetching the snapshot
    Fetch,

    /// Snapshot downloaded and extracted
    Extracted,

    /// Start moving files into place
    Sync,

    /// Sync finished, setup script requested
    Setup,

    /// Sync finished, no setup requested
    Finish,

    /// Setup script finished (any exit code)
    SetupDone,

    /// Unrecoverable error at any stage
    Error(String),
}

/// Tracks where a deployment run is in its lifecycle.
///
/// The engine drives this linearly; the FSM exists to reject
/// out-of-order stage calls and to carry the failure message.
#[derive(Debug, Clone)]
pub struct DeployFsm {
    state: DeployState,
    error: Option<String>,
}

impl DeployFsm {
    /// Create a new FSM in idle state
    pub fn new() -> Self {
        Self {
            state: DeployState::Idle,
            error: None,
        }
    }

    /// Get current state
    pub fn state(&self) -> &DeployState {
        &self.state
    }

    /// Get error message if any
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: DeployEvent) -> Result<(), String> {
        let new_state = match (&self.state, &event) {
            (DeployState::Idle, DeployEvent::Fetch) => DeployState::Fetching,

            (DeployState::Fetching, DeployEvent::Extracted) => DeployState::Extracted,

            (DeployState::Extracted, DeployEvent::Sync) => DeployState::Syncing,

            (DeployState::Syncing, DeployEvent::Setup) => DeployState::SettingUp,
            (DeployState::Syncing, DeployEvent::Finish) => DeployState::Done,

            (DeployState::SettingUp, DeployEvent::SetupDone) => DeployState::Done,

            // Errors are terminal from any active state
            (
                DeployState::Fetching
                | DeployState::Extracted
                | DeployState::Syncing
                | DeployState::SettingUp,
                DeployEvent::Error(err),
            ) => {
                self.error = Some(err.clone());
                DeployState::Failed
            }

            (state, event) => {
                return Err(format!("Invalid transition: {:?} -> {:?}", state, event));
            }
        };

        self.state = new_state;
        Ok(())
    }
}

impl Default for DeployFsm {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fsm_full_run_with_setup() {
        let mut fsm = DeployFsm::new();
        assert_eq!(fsm.state(), &DeployState::Idle);

        fsm.process(DeployEvent::Fetch).unwrap();
        fsm.process(DeployEvent::Extracted).unwrap();
        fsm.process(DeployEvent::Sync).unwrap();
        fsm.process(DeployEvent::Setup).unwrap();
        assert_eq!(fsm.state(), &DeployState::SettingUp);

        fsm.process(DeployEvent::SetupDone).unwrap();
        assert_eq!(fsm.state(), &DeployState::Done);
    }

    #[test]
    fn test_fsm_run_without_setup() {
        let mut fsm = DeployFsm::new();

        fsm.process(DeployEvent::Fetch).unwrap();
        fsm.process(DeployEvent::Extracted).unwrap();
        fsm.process(DeployEvent::Sync).unwrap();
        fsm.process(DeployEvent::Finish).unwrap();
        assert_eq!(fsm.state(), &DeployState::Done);
    }

    #[test]
    fn test_fsm_error_is_terminal() {
        let mut fsm = DeployFsm::new();

        fsm.process(DeployEvent::Fetch).unwrap();
        fsm.process(DeployEvent::Error("download failed".to_string()))
            .unwrap();

        assert_eq!(fsm.state(), &DeployState::Failed);
        assert_eq!(fsm.error(), Some("download failed"));
        assert!(fsm.process(DeployEvent::Sync).is_err());
    }

    #[test]
    fn test_fsm_rejects_out_of_order() {
        let mut fsm = DeployFsm::new();
        assert!(fsm.process(DeployEvent::Sync).is_err());
        assert_eq!(fsm.state(), &DeployState::Idle);
    }
}
