//! State-machine violation errors

use thiserror::Error;
use uuid::Uuid;

use crate::{StepStatus, WorkflowStatus};

/// Errors raised by the workflow/step transition guards
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StateError {
    /// Step already reached a terminal status
    #[error("step {step} is already terminal as {status:?}")]
    StepAlreadyTerminal { step: Uuid, status: StepStatus },

    /// Transition not allowed by the step state machine
    #[error("illegal step transition {from:?} -> {to:?} on step {step}")]
    IllegalStepTransition {
        step: Uuid,
        from: StepStatus,
        to: StepStatus,
    },

    /// Workflow already reached a terminal status
    #[error("workflow {workflow} is already terminal as {status:?}")]
    WorkflowAlreadyTerminal {
        workflow: Uuid,
        status: WorkflowStatus,
    },

    /// Transition not allowed by the workflow state machine
    #[error("illegal workflow transition {from:?} -> {to:?} on workflow {workflow}")]
    IllegalWorkflowTransition {
        workflow: Uuid,
        from: WorkflowStatus,
        to: WorkflowStatus,
    },

    /// Step cannot activate without at least one assigned approver
    #[error("step {step} has no assigned approvers and cannot activate")]
    NoApprovers { step: Uuid },
}
