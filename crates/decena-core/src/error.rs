use thiserror::Error;

/// Settlement engine errors.
#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("malformed period '{input}': {reason}")]
    MalformedPeriod { input: String, reason: String },

    #[error("transition denied: {0}")]
    Forbidden(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("production '{0}' is not approved")]
    NotApproved(String),

    #[error("production '{0}' already has a registered liquidation")]
    DuplicatePayment(String),

    #[error("production '{0}' not found")]
    ProductionNotFound(String),

    #[error("zone configuration error: {0}")]
    ZoneConfig(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl SettlementError {
    pub fn malformed_period(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedPeriod {
            input: input.into(),
            reason: reason.into(),
        }
    }

    pub fn forbidden_for_role(role: &str, current_state: &str) -> Self {
        Self::Forbidden(format!(
            "role '{}' may not transition a production out of '{}'",
            role, current_state
        ))
    }
}
