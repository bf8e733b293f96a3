//! Delegation records
//!
//! A delegation is one request from a loop to one or more recipient agents.
//! Each recipient answers at most once; the record is resolved when every
//! recipient has a terminal response (error responses count).

use serde::{Deserialize, Serialize};

use super::loop_state::LoopKey;
use crate::error::{ConvoyError, Result};
use crate::id::generate_delegation_id;

/// Terminal status of a recipient's response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Completed,
    Error,
}

/// One recipient's answer to a delegation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegationResponse {
    /// Responding agent, always one of the record's recipients
    pub from_agent: String,
    pub content: String,
    /// Event that carried the response
    pub event_id: String,
    pub status: ResponseStatus,
}

impl DelegationResponse {
    pub fn completed(from_agent: impl Into<String>, content: impl Into<String>, event_id: impl Into<String>) -> Self {
        Self {
            from_agent: from_agent.into(),
            content: content.into(),
            event_id: event_id.into(),
            status: ResponseStatus::Completed,
        }
    }

    pub fn error(from_agent: impl Into<String>, content: impl Into<String>, event_id: impl Into<String>) -> Self {
        Self {
            from_agent: from_agent.into(),
            content: content.into(),
            event_id: event_id.into(),
            status: ResponseStatus::Error,
        }
    }

    pub fn is_error(&self) -> bool {
        self.status == ResponseStatus::Error
    }
}

/// Where a delegation stands after a response was recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseProgress {
    /// Some recipients have not answered yet
    Pending { remaining: usize },
    /// Every recipient has answered
    Resolved,
}

/// An outstanding or resolved request from one agent to others
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegationRecord {
    pub id: String,
    /// Agent that issued the request
    pub from_agent: String,
    /// Recipients in request order, no duplicates
    pub recipients: Vec<String>,
    /// Optional workflow phase label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    pub request_message: String,
    /// Event id of the published request, set once the transport accepted it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_event_id: Option<String>,
    /// Responses in arrival order, at most one per recipient
    #[serde(default)]
    pub responses: Vec<DelegationResponse>,
}

impl DelegationRecord {
    /// Create a delegation with a fresh id
    ///
    /// Fails if `recipients` is empty or names the same agent twice.
    pub fn new(
        from_agent: impl Into<String>,
        recipients: Vec<String>,
        request_message: impl Into<String>,
    ) -> Result<Self> {
        if recipients.is_empty() {
            return Err(ConvoyError::InvalidDelegation("no recipients".to_string()));
        }
        for (i, recipient) in recipients.iter().enumerate() {
            if recipients[..i].contains(recipient) {
                return Err(ConvoyError::InvalidDelegation(format!(
                    "duplicate recipient: {}",
                    recipient
                )));
            }
        }

        Ok(Self {
            id: generate_delegation_id(),
            from_agent: from_agent.into(),
            recipients,
            phase: None,
            request_message: request_message.into(),
            request_event_id: None,
            responses: Vec::new(),
        })
    }

    /// Set the phase label
    pub fn with_phase(mut self, phase: impl Into<String>) -> Self {
        self.phase = Some(phase.into());
        self
    }

    /// Set the published request's event id
    pub fn with_request_event_id(mut self, event_id: impl Into<String>) -> Self {
        self.request_event_id = Some(event_id.into());
        self
    }

    /// The response recorded for `agent`, if any
    pub fn response_for(&self, agent: &str) -> Option<&DelegationResponse> {
        self.responses.iter().find(|r| r.from_agent == agent)
    }

    /// Recipients that have not answered yet, in request order
    pub fn pending_recipients(&self) -> Vec<&str> {
        self.recipients
            .iter()
            .filter(|r| self.response_for(r).is_none())
            .map(String::as_str)
            .collect()
    }

    /// True once every recipient has a terminal response
    pub fn is_resolved(&self) -> bool {
        self.recipients.iter().all(|r| self.response_for(r).is_some())
    }

    /// Record a recipient's terminal response
    ///
    /// A second response from the same recipient is a protocol error and is
    /// rejected rather than overwriting the first one.
    pub fn record_response(&mut self, response: DelegationResponse) -> Result<ResponseProgress> {
        if !self.recipients.contains(&response.from_agent) {
            return Err(ConvoyError::UnknownRecipient {
                delegation_id: self.id.clone(),
                agent: response.from_agent,
            });
        }
        if self.response_for(&response.from_agent).is_some() {
            return Err(ConvoyError::DuplicateResponse {
                delegation_id: self.id.clone(),
                agent: response.from_agent,
            });
        }

        self.responses.push(response);

        let remaining = self.pending_recipients().len();
        if remaining == 0 {
            Ok(ResponseProgress::Resolved)
        } else {
            Ok(ResponseProgress::Pending { remaining })
        }
    }
}

/// A delegation together with the loop that issued it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegationEntry {
    pub owner: LoopKey,
    pub record: DelegationRecord,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recipients(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_new_delegation() {
        let record = DelegationRecord::new("alice", recipients(&["reviewer", "tester"]), "review this").unwrap();
        assert_eq!(record.id.len(), 64);
        assert_eq!(record.from_agent, "alice");
        assert!(record.responses.is_empty());
        assert!(record.phase.is_none());
        assert!(!record.is_resolved());
    }

    #[test]
    fn test_new_rejects_empty_recipients() {
        let err = DelegationRecord::new("alice", vec![], "hello").unwrap_err();
        assert!(matches!(err, ConvoyError::InvalidDelegation(_)));
    }

    #[test]
    fn test_new_rejects_duplicate_recipients() {
        let err = DelegationRecord::new("alice", recipients(&["bob", "carol", "bob"]), "hello").unwrap_err();
        assert!(err.to_string().contains("duplicate recipient: bob"));
    }

    #[test]
    fn test_record_response_progress() {
        let mut record = DelegationRecord::new("alice", recipients(&["reviewer", "tester"]), "go").unwrap();

        let progress = record
            .record_response(DelegationResponse::completed("reviewer", "lgtm", "ev1"))
            .unwrap();
        assert_eq!(progress, ResponseProgress::Pending { remaining: 1 });
        assert_eq!(record.pending_recipients(), vec!["tester"]);

        let progress = record
            .record_response(DelegationResponse::error("tester", "tests crashed", "ev2"))
            .unwrap();
        assert_eq!(progress, ResponseProgress::Resolved);
        assert!(record.is_resolved());
    }

    #[test]
    fn test_record_response_unknown_recipient() {
        let mut record = DelegationRecord::new("alice", recipients(&["bob"]), "go").unwrap();
        let err = record
            .record_response(DelegationResponse::completed("mallory", "hi", "ev"))
            .unwrap_err();
        assert!(matches!(err, ConvoyError::UnknownRecipient { .. }));
        assert!(record.responses.is_empty());
    }

    #[test]
    fn test_record_response_duplicate_is_rejected() {
        let mut record = DelegationRecord::new("alice", recipients(&["bob", "carol"]), "go").unwrap();
        record
            .record_response(DelegationResponse::completed("bob", "first", "ev1"))
            .unwrap();
        let err = record
            .record_response(DelegationResponse::error("bob", "second", "ev2"))
            .unwrap_err();
        assert!(matches!(err, ConvoyError::DuplicateResponse { .. }));
        assert_eq!(record.response_for("bob").unwrap().content, "first");
        assert_eq!(record.responses.len(), 1);
    }

    #[test]
    fn test_builders() {
        let record = DelegationRecord::new("alice", recipients(&["bob"]), "go")
            .unwrap()
            .with_phase("review")
            .with_request_event_id("abc");
        assert_eq!(record.phase.as_deref(), Some("review"));
        assert_eq!(record.request_event_id.as_deref(), Some("abc"));
    }

    #[test]
    fn test_deserialize_without_optional_fields() {
        let json = r#"{"id":"d1","from_agent":"a","recipients":["b"],"request_message":"x"}"#;
        let record: DelegationRecord = serde_json::from_str(json).unwrap();
        assert!(record.responses.is_empty());
        assert!(record.phase.is_none());
    }
}
