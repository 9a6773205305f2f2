// src/message.rs
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// One text segment of a turn.
///
/// Accepted on input either as a bare string or as `{"text": "..."}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Part {
    pub text: String,
}

impl Part {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl<'de> Deserialize<'de> for Part {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawPart {
            Bare(String),
            Object { text: String },
        }

        match RawPart::deserialize(deserializer)? {
            RawPart::Bare(text) | RawPart::Object { text } => Ok(Part { text }),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl ChatTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self { role: Role::User, parts: vec![Part::new(text)] }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self { role: Role::Model, parts: vec![Part::new(text)] }
    }
}

/// Body accepted by both `/chat` and `/stream`.
///
/// Missing fields default: `chat` to `""`, `history` to `[]`. An explicit
/// `"history": null` also counts as `[]`.
#[derive(Debug, Default, Deserialize)]
pub struct ChatRequest {
    #[serde(rename = "chat", default)]
    pub message: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub history: Vec<ChatTurn>,
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_default() {
        let req: ChatRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(req.message, "");
        assert!(req.history.is_empty());
    }

    #[test]
    fn null_history_is_empty() {
        let req: ChatRequest = serde_json::from_str(r#"{"chat": "hi", "history": null}"#).unwrap();
        assert_eq!(req.message, "hi");
        assert!(req.history.is_empty());
    }

    #[test]
    fn parts_accept_both_shapes() {
        let req: ChatRequest = serde_json::from_str(
            r#"{"chat": "next", "history": [
                {"role": "user", "parts": ["hi"]},
                {"role": "model", "parts": [{"text": "hello"}]}
            ]}"#,
        )
        .unwrap();

        assert_eq!(req.history, vec![ChatTurn::user("hi"), ChatTurn::model("hello")]);
    }

    #[test]
    fn unknown_role_is_rejected() {
        let res = serde_json::from_str::<ChatRequest>(
            r#"{"chat": "x", "history": [{"role": "system", "parts": ["hi"]}]}"#,
        );
        assert!(res.is_err());
    }

    #[test]
    fn wrong_typed_chat_is_rejected() {
        assert!(serde_json::from_str::<ChatRequest>(r#"{"chat": 42}"#).is_err());
    }
}
