//! Observable streaming job state.

use serde::Serialize;

use super::nightdriver::NightDriverResponse;
use super::pi::PiResponse;
use crate::client::ClientKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// No strips bound to the client yet
    SetupIncomplete,
    WaitingForConnection,
    /// Last connection attempt failed; retrying after a delay
    Offline,
    ConnectedIdle,
    RenderingEffect,
}

impl JobStatus {
    pub fn is_connected(self) -> bool {
        matches!(self, JobStatus::ConnectedIdle | JobStatus::RenderingEffect)
    }
}

/// Latest client status report, by protocol.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientResponse {
    Pi(PiResponse),
    NightDriver(NightDriverResponse),
}

/// Job status plus the most recent response, tagged by client type.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamingJobState {
    Pi {
        status: JobStatus,
        last_response: Option<PiResponse>,
    },
    NightDriver {
        status: JobStatus,
        last_response: Option<NightDriverResponse>,
    },
}

impl StreamingJobState {
    /// Initial state for a client type, or `None` for unsupported kinds.
    pub fn for_kind(kind: ClientKind, status: JobStatus) -> Option<Self> {
        match kind {
            ClientKind::Pi => Some(StreamingJobState::Pi {
                status,
                last_response: None,
            }),
            ClientKind::NightDriver => Some(StreamingJobState::NightDriver {
                status,
                last_response: None,
            }),
            ClientKind::Unknown => None,
        }
    }

    pub fn status(&self) -> JobStatus {
        match self {
            StreamingJobState::Pi { status, .. } | StreamingJobState::NightDriver { status, .. } => {
                *status
            }
        }
    }

    pub fn kind(&self) -> ClientKind {
        match self {
            StreamingJobState::Pi { .. } => ClientKind::Pi,
            StreamingJobState::NightDriver { .. } => ClientKind::NightDriver,
        }
    }

    /// Same variant and response, new status.
    pub fn with_status(&self, status: JobStatus) -> Self {
        match self {
            StreamingJobState::Pi { last_response, .. } => StreamingJobState::Pi {
                status,
                last_response: last_response.clone(),
            },
            StreamingJobState::NightDriver { last_response, .. } => StreamingJobState::NightDriver {
                status,
                last_response: last_response.clone(),
            },
        }
    }

    /// Same status, new response. Responses from the other protocol are ignored.
    pub fn with_response(&self, response: ClientResponse) -> Self {
        match (self, response) {
            (StreamingJobState::Pi { status, .. }, ClientResponse::Pi(r)) => StreamingJobState::Pi {
                status: *status,
                last_response: Some(r),
            },
            (StreamingJobState::NightDriver { status, .. }, ClientResponse::NightDriver(r)) => {
                StreamingJobState::NightDriver {
                    status: *status,
                    last_response: Some(r),
                }
            }
            (state, _) => state.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_kind_has_no_state() {
        assert!(StreamingJobState::for_kind(ClientKind::Unknown, JobStatus::Offline).is_none());
    }

    #[test]
    fn test_transitions_keep_response() {
        let state = StreamingJobState::for_kind(ClientKind::Pi, JobStatus::ConnectedIdle)
            .unwrap()
            .with_response(ClientResponse::Pi(PiResponse { fps: 30.0, queued: 2 }));
        let next = state.with_status(JobStatus::RenderingEffect);
        assert_eq!(next.status(), JobStatus::RenderingEffect);
        assert_eq!(
            next,
            StreamingJobState::Pi {
                status: JobStatus::RenderingEffect,
                last_response: Some(PiResponse { fps: 30.0, queued: 2 }),
            }
        );
    }

    #[test]
    fn test_mismatched_response_ignored() {
        let state = StreamingJobState::for_kind(ClientKind::NightDriver, JobStatus::ConnectedIdle)
            .unwrap();
        let same = state.with_response(ClientResponse::Pi(PiResponse { fps: 1.0, queued: 0 }));
        assert_eq!(same, state);
    }
}
