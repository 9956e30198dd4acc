//! Failure policy.
//!
//! Classifies each host's outcome and decides whether the run keeps going,
//! and turns a finished (possibly nested) result mapping into an exit code.

use crate::config::Settings;
use crate::error::{AdminError, Result};
use crate::executor::result::{HostResult, ResultMap, TaskValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Success,
    NetworkUnreachable,
    ExplicitAbort,
    ArgumentMismatch,
    OtherException,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Store the result and move on.
    Continue,
    /// Print a host warning, store the result, and move on.
    Warn,
    /// Fatal for the run.
    Abort,
    /// Hand the error straight back to the command line.
    Raise,
}

pub fn classify_error(err: &AdminError) -> Classification {
    match err {
        AdminError::Network { .. } => Classification::NetworkUnreachable,
        AdminError::Aborted(abort) if abort.is_argument_mismatch() => {
            Classification::ArgumentMismatch
        }
        AdminError::Abort(_) | AdminError::Aborted(_) => Classification::ExplicitAbort,
        AdminError::ArgumentMismatch { .. } => Classification::ArgumentMismatch,
        _ => Classification::OtherException,
    }
}

pub fn classify(outcome: &Result<TaskValue>) -> Classification {
    match outcome {
        Ok(_) => Classification::Success,
        Err(err) => classify_error(err),
    }
}

pub fn classify_result(result: &HostResult) -> Classification {
    match result {
        HostResult::Success(_) => Classification::Success,
        HostResult::Failed(err) => classify_error(err),
        HostResult::Terminated(_) => Classification::OtherException,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FailurePolicy {
    pub skip_bad_hosts: bool,
    pub warn_only: bool,
}

impl From<&Settings> for FailurePolicy {
    fn from(settings: &Settings) -> Self {
        Self {
            skip_bad_hosts: settings.skip_bad_hosts,
            warn_only: settings.warn_only,
        }
    }
}

impl FailurePolicy {
    pub fn dispose(&self, classification: Classification) -> Disposition {
        match classification {
            Classification::Success => Disposition::Continue,
            Classification::NetworkUnreachable if self.skip_bad_hosts || self.warn_only => {
                Disposition::Warn
            }
            Classification::NetworkUnreachable => Disposition::Abort,
            Classification::ExplicitAbort => Disposition::Abort,
            Classification::ArgumentMismatch => Disposition::Raise,
            Classification::OtherException if self.warn_only => Disposition::Warn,
            Classification::OtherException => Disposition::Abort,
        }
    }
}

/// 0 when every leaf of `results` is a success, 1 otherwise.
pub fn exit_code(results: &ResultMap) -> i32 {
    if results.values().all(succeeded) {
        0
    } else {
        1
    }
}

fn succeeded(result: &HostResult) -> bool {
    match result {
        HostResult::Success(TaskValue::Nested(nested)) => nested.values().all(succeeded),
        HostResult::Success(_) => true,
        HostResult::Failed(_) | HostResult::Terminated(_) => false,
    }
}
