//! Command encoder: typed step commands and their canonical request
//! payloads.
//!
//! One parameterized encoder per command kind. Dialog and mouse commands
//! have no independently addressable remote identity; the API echoes a
//! sentinel identifier for them, which [`addressable`](StepCommand::addressable)
//! lets callers anticipate.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::model::ResourceId;

/// How a step locates its target element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Selector {
    Css(String),
    Xpath(String),
    /// Visible-text clue, resolved remotely.
    Text(String),
}

impl Selector {
    fn to_wire(&self) -> Value {
        let (kind, value) = match self {
            Selector::Css(v) => ("CSS", v),
            Selector::Xpath(v) => ("XPATH", v),
            Selector::Text(v) => ("GUESS", v),
        };
        json!({ "type": kind, "value": value })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MouseAction {
    Over,
    Down,
    Up,
    DoubleClick,
    RightClick,
}

impl MouseAction {
    fn wire_name(self) -> &'static str {
        match self {
            MouseAction::Over => "MOUSE_OVER",
            MouseAction::Down => "MOUSE_DOWN",
            MouseAction::Up => "MOUSE_UP",
            MouseAction::DoubleClick => "MOUSE_DOUBLE_CLICK",
            MouseAction::RightClick => "MOUSE_RIGHT_CLICK",
        }
    }
}

/// A typed step command, encoded to the canonical payload the remote
/// step-creation endpoint expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum StepCommand {
    Navigate { url: String },
    Click { selector: Selector },
    Write { selector: Selector, value: String },
    Select { selector: Selector, option: String },
    AssertExists { selector: Selector },
    AssertNotExists { selector: Selector },
    AssertEquals { selector: Selector, expected: String },
    Wait { millis: u64 },
    DismissAlert,
    DismissConfirm { accept: bool },
    DismissPrompt { reply: String },
    Mouse { action: MouseAction, selector: Selector },
}

impl StepCommand {
    /// Wire-level action name.
    pub fn action(&self) -> &'static str {
        match self {
            StepCommand::Navigate { .. } => "NAVIGATE",
            StepCommand::Click { .. } => "CLICK",
            StepCommand::Write { .. } => "WRITE",
            StepCommand::Select { .. } => "SELECT",
            StepCommand::AssertExists { .. } => "ASSERT_EXISTS",
            StepCommand::AssertNotExists { .. } => "ASSERT_NOT_EXISTS",
            StepCommand::AssertEquals { .. } => "ASSERT_EQUALS",
            StepCommand::Wait { .. } => "WAIT",
            StepCommand::DismissAlert => "DISMISS_ALERT",
            StepCommand::DismissConfirm { .. } => "DISMISS_CONFIRM",
            StepCommand::DismissPrompt { .. } => "DISMISS_PROMPT",
            StepCommand::Mouse { action, .. } => action.wire_name(),
        }
    }

    /// Whether the created step gets a real identifier. Dialog and mouse
    /// commands always echo a sentinel.
    pub fn addressable(&self) -> bool {
        !matches!(
            self,
            StepCommand::DismissAlert
                | StepCommand::DismissConfirm { .. }
                | StepCommand::DismissPrompt { .. }
                | StepCommand::Mouse { .. }
        )
    }

    /// Canonical creation payload for this command, attached to
    /// `checkpoint` at 1-based `position`.
    pub fn payload(&self, checkpoint: &ResourceId, position: u32) -> Value {
        let mut parsed = json!({
            "action": self.action(),
            "meta": { "kind": self.action() },
        });

        match self {
            StepCommand::Navigate { url } => {
                parsed["value"] = json!(url);
                parsed["meta"]["url"] = json!(url);
            }
            StepCommand::Click { selector }
            | StepCommand::AssertExists { selector }
            | StepCommand::AssertNotExists { selector } => {
                parsed["target"] = selector.to_wire();
            }
            StepCommand::Write { selector, value } => {
                parsed["target"] = selector.to_wire();
                parsed["value"] = json!(value);
            }
            StepCommand::Select { selector, option } => {
                parsed["target"] = selector.to_wire();
                parsed["value"] = json!(option);
            }
            StepCommand::AssertEquals { selector, expected } => {
                parsed["target"] = selector.to_wire();
                parsed["value"] = json!(expected);
            }
            StepCommand::Wait { millis } => {
                parsed["value"] = json!(millis.to_string());
                parsed["meta"]["duration"] = json!(millis);
            }
            StepCommand::DismissConfirm { accept } => {
                parsed["meta"]["answer"] = json!(accept);
            }
            StepCommand::DismissPrompt { reply } => {
                parsed["value"] = json!(reply);
            }
            StepCommand::DismissAlert => {}
            StepCommand::Mouse { selector, .. } => {
                parsed["target"] = selector.to_wire();
            }
        }

        json!({
            "checkpointId": checkpoint,
            "position": position,
            "parsedStep": parsed,
        })
    }
}

/// Payload for updating a navigation step's target URL in place.
pub fn navigation_update_payload(url: &str) -> Value {
    json!({
        "parsedStep": {
            "action": "NAVIGATE",
            "value": url,
            "meta": { "kind": "NAVIGATE", "url": url },
        }
    })
}

/// Payload attaching `checkpoint` to `journey` at 1-based `position`.
pub fn attach_payload(checkpoint: &ResourceId, position: u32) -> Value {
    json!({
        "checkpointId": checkpoint,
        "position": position,
    })
}
