//! Conversation Transcript: the ordered, append-only turn sequence driving
//! one completion.

use serde::{Deserialize, Serialize};

/// Who authored a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One turn in the transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// The append-only sequence of turns for one completion.
///
/// Created per completion, appended only, discarded on completion exit
/// (optionally serialized to `log_dir` first; see [`crate::rlm::telemetry`]).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Render the full transcript as vendor-agnostic `(role, content)` pairs,
    /// the shape the Model Adapter's `chat` contract expects.
    pub fn as_messages(&self) -> Vec<(Role, &str)> {
        self.turns
            .iter()
            .map(|t| (t.role, t.content.as_str()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turns_preserve_append_order() {
        let mut t = Transcript::new();
        t.push(Turn::system("sys"));
        t.push(Turn::user("usr"));
        t.push(Turn::assistant("asst"));
        let roles: Vec<Role> = t.turns().iter().map(|x| x.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant]);
    }

    #[test]
    fn serializes_round_trip() {
        let mut t = Transcript::new();
        t.push(Turn::user("hello"));
        let json = serde_json::to_string(&t).unwrap();
        let back: Transcript = serde_json::from_str(&json).unwrap();
        assert_eq!(back.turns(), t.turns());
    }
}
