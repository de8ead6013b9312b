//! Inbound request model
//!
//! A neutral, transport-free view of one trigger command. The transport
//! layer parses its own frames (code parameters, in the DSF case) into this
//! type; the dispatcher infers intent from what is present.

/// One inbound trigger request
///
/// A request without an index is a list request; a request with an index
/// creates or updates that trigger.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TriggerRequest {
    /// Trigger index (the `T` parameter)
    pub index: Option<u32>,

    /// State expression (the `P` parameter)
    pub expression: Option<String>,

    /// Action command (the `A` parameter)
    pub action: Option<String>,

    /// Initial latch value at creation (the `S` parameter)
    pub initially_triggered: Option<bool>,

    /// Run condition wire code (the `R` parameter), not yet validated
    pub run_condition: Option<i32>,
}

impl TriggerRequest {
    /// A bare list request
    pub fn list() -> Self {
        Self::default()
    }

    /// Whether this request only asks for the trigger listing
    ///
    /// Only a request carrying nothing at all lists; any field without an
    /// index signals a create/update intent that is missing its `T`
    /// parameter and must be rejected, not silently answered with the
    /// listing.
    pub fn is_list(&self) -> bool {
        self.index.is_none()
            && self.expression.is_none()
            && self.action.is_none()
            && self.initially_triggered.is_none()
            && self.run_condition.is_none()
    }
}
