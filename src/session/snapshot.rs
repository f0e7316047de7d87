use serde::Serialize;
use uuid::Uuid;

use super::event::ActionKind;

/// How the previous cycle ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Outcome {
    Done,
    Error { message: String },
}

/// What the presentation layer sees: the only outbound contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub state: &'static str,
    pub valid_actions: Vec<ActionKind>,
    pub session: Option<Uuid>,
    pub last_outcome: Option<Outcome>,
}

impl Snapshot {
    pub fn can(&self, action: ActionKind) -> bool {
        self.valid_actions.contains(&action)
    }

    pub fn is_inactive(&self) -> bool {
        self.state == "inactive"
    }
}
