//! Server identity verification and credential negotiation
//!
//! Two independent flows driven by session events. Fingerprint verification
//! moves idle → awaiting approval → approved/rejected; credential
//! negotiation moves idle → collecting → submitted. The gate holds no
//! session handle: it tells the controller what to do and the controller
//! does it.

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use sha2::Sha256;
use tracing::{debug, warn};

use crate::config::{FingerprintConfig, ViewCapabilities};
use crate::errors::{DeskviewError, Result};
use crate::session::{CredentialKind, CredentialKinds, Credentials};

/// Number of digest bytes shown to the user
pub const FINGERPRINT_BYTES: usize = 8;

// ----------------------------------------------------------------------------
// Fingerprints
// ----------------------------------------------------------------------------

/// Digest applied to a server public key before display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FingerprintDigest {
    #[default]
    Sha1,
    Sha256,
}

/// Render the first eight digest bytes as lowercase hex octets joined by `-`
///
/// Shorter digests render every byte they have.
pub fn format_fingerprint(digest: &[u8]) -> String {
    digest
        .iter()
        .take(FINGERPRINT_BYTES)
        .map(|byte| hex::encode([*byte]))
        .collect::<Vec<_>>()
        .join("-")
}

/// Digest a public key and format it for display
pub fn compute_fingerprint(public_key: &[u8], digest: FingerprintDigest) -> String {
    match digest {
        FingerprintDigest::Sha1 => format_fingerprint(&Sha1::digest(public_key)),
        FingerprintDigest::Sha256 => format_fingerprint(&Sha256::digest(public_key)),
    }
}

// ----------------------------------------------------------------------------
// Prompts
// ----------------------------------------------------------------------------

/// Server identity awaiting the user's decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FingerprintPrompt {
    pub key_type: String,
    pub fingerprint: String,
}

/// Credential fields the user is asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CredentialPrompt {
    pub kinds: CredentialKinds,
    /// Field that receives input focus
    pub focus: Option<CredentialKind>,
}

/// What the controller should do with a server identity request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationAction {
    Prompt(FingerprintPrompt),
    Reject { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum FingerprintState {
    Idle,
    AwaitingApproval(FingerprintPrompt),
    Approved,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum CredentialState {
    Idle,
    Collecting {
        prompt: CredentialPrompt,
        username: String,
        password: String,
    },
    Submitted,
}

// ----------------------------------------------------------------------------
// Security Gate
// ----------------------------------------------------------------------------

#[derive(Debug)]
pub struct SecurityGate {
    digest: FingerprintDigest,
    view: ViewCapabilities,
    fingerprint: FingerprintState,
    credentials: CredentialState,
}

impl SecurityGate {
    pub fn new(fingerprint: &FingerprintConfig, view: ViewCapabilities) -> Self {
        Self {
            digest: fingerprint.digest,
            view,
            fingerprint: FingerprintState::Idle,
            credentials: CredentialState::Idle,
        }
    }

    // ------------------------------------------------------------------------
    // Fingerprint Verification
    // ------------------------------------------------------------------------

    /// Handle a server identity request
    ///
    /// Without a fingerprint prompt in the view, or without key material to
    /// show, the request is rejected rather than silently approved.
    pub fn on_server_verification(
        &mut self,
        key_type: &str,
        public_key: &[u8],
    ) -> VerificationAction {
        if !self.view.fingerprint_prompt {
            warn!(key_type, "Server identity cannot be shown, rejecting");
            self.fingerprint = FingerprintState::Rejected;
            return VerificationAction::Reject {
                reason: "server identity prompt unavailable".to_string(),
            };
        }
        if public_key.is_empty() {
            warn!(key_type, "Server identity request without key material, rejecting");
            self.fingerprint = FingerprintState::Rejected;
            return VerificationAction::Reject {
                reason: "server sent no public key".to_string(),
            };
        }

        let prompt = FingerprintPrompt {
            key_type: key_type.to_string(),
            fingerprint: compute_fingerprint(public_key, self.digest),
        };
        debug!(key_type, fingerprint = %prompt.fingerprint, "Awaiting server identity approval");
        self.fingerprint = FingerprintState::AwaitingApproval(prompt.clone());
        VerificationAction::Prompt(prompt)
    }

    pub fn approve_server(&mut self) -> Result<()> {
        match self.fingerprint {
            FingerprintState::AwaitingApproval(_) => {
                self.fingerprint = FingerprintState::Approved;
                Ok(())
            }
            _ => Err(DeskviewError::invalid_state(
                self.fingerprint_state_name(),
                "approve_server",
            )),
        }
    }

    pub fn reject_server(&mut self) -> Result<()> {
        match self.fingerprint {
            FingerprintState::AwaitingApproval(_) => {
                self.fingerprint = FingerprintState::Rejected;
                Ok(())
            }
            _ => Err(DeskviewError::invalid_state(
                self.fingerprint_state_name(),
                "reject_server",
            )),
        }
    }

    pub fn pending_fingerprint(&self) -> Option<&FingerprintPrompt> {
        match &self.fingerprint {
            FingerprintState::AwaitingApproval(prompt) => Some(prompt),
            _ => None,
        }
    }

    pub fn fingerprint_state_name(&self) -> &'static str {
        match self.fingerprint {
            FingerprintState::Idle => "idle",
            FingerprintState::AwaitingApproval(_) => "awaiting-approval",
            FingerprintState::Approved => "approved",
            FingerprintState::Rejected => "rejected",
        }
    }

    // ------------------------------------------------------------------------
    // Credential Negotiation
    // ------------------------------------------------------------------------

    /// Open the credential prompt for the requested kinds
    ///
    /// Returns `None` when nothing was requested or the view cannot collect
    /// credentials.
    pub fn on_credentials_required(
        &mut self,
        kinds: CredentialKinds,
    ) -> Option<CredentialPrompt> {
        if kinds.is_empty() {
            warn!("Credentials requested without any kind");
            return None;
        }
        if !self.view.credential_prompt {
            warn!("Credentials requested but cannot be collected");
            return None;
        }

        let prompt = CredentialPrompt {
            kinds,
            focus: kinds.first(),
        };
        self.credentials = CredentialState::Collecting {
            prompt,
            username: String::new(),
            password: String::new(),
        };
        Some(prompt)
    }

    /// Record user input for a requested field
    pub fn set_field(&mut self, kind: CredentialKind, value: &str) -> Result<()> {
        let state = self.credential_state_name();
        match &mut self.credentials {
            CredentialState::Collecting {
                prompt,
                username,
                password,
            } if prompt.kinds.contains(kind) => {
                let field = match kind {
                    CredentialKind::Username => username,
                    CredentialKind::Password => password,
                };
                field.clear();
                field.push_str(value);
                Ok(())
            }
            _ => Err(DeskviewError::invalid_state(state, format!("set_field({})", kind))),
        }
    }

    /// Collect exactly the requested fields for delivery to the session
    ///
    /// The password field is emptied as it is read.
    pub fn submit(&mut self) -> Result<Credentials> {
        let state = core::mem::replace(&mut self.credentials, CredentialState::Submitted);
        match state {
            CredentialState::Collecting {
                prompt,
                username,
                mut password,
            } => Ok(Credentials {
                username: prompt.kinds.username.then_some(username),
                password: prompt
                    .kinds
                    .password
                    .then(|| core::mem::take(&mut password)),
            }),
            other => {
                self.credentials = other;
                Err(DeskviewError::invalid_state(
                    self.credential_state_name(),
                    "submit_credentials",
                ))
            }
        }
    }

    pub fn pending_credentials(&self) -> Option<&CredentialPrompt> {
        match &self.credentials {
            CredentialState::Collecting { prompt, .. } => Some(prompt),
            _ => None,
        }
    }

    /// Current input for a field while the prompt is open
    pub fn field_value(&self, kind: CredentialKind) -> Option<&str> {
        match &self.credentials {
            CredentialState::Collecting {
                prompt,
                username,
                password,
            } if prompt.kinds.contains(kind) => Some(match kind {
                CredentialKind::Username => username.as_str(),
                CredentialKind::Password => password.as_str(),
            }),
            _ => None,
        }
    }

    pub fn credential_state_name(&self) -> &'static str {
        match self.credentials {
            CredentialState::Idle => "idle",
            CredentialState::Collecting { .. } => "collecting",
            CredentialState::Submitted => "submitted",
        }
    }

    // ------------------------------------------------------------------------
    // Teardown
    // ------------------------------------------------------------------------

    /// Drop all negotiation state; returns which prompts were open
    pub fn reset(&mut self) -> (bool, bool) {
        let had_fingerprint = matches!(self.fingerprint, FingerprintState::AwaitingApproval(_));
        let had_credentials = matches!(self.credentials, CredentialState::Collecting { .. });
        self.fingerprint = FingerprintState::Idle;
        self.credentials = CredentialState::Idle;
        (had_fingerprint, had_credentials)
    }
}

/// Status text for a peer-reported security failure
pub fn security_failure_message(reason: Option<&str>) -> String {
    match reason.map(str::trim).filter(|r| !r.is_empty()) {
        Some(reason) => format!("New connection has been rejected with reason: {}", reason),
        None => "New connection has been rejected".to_string(),
    }
}
