//! Outbound viewer protocol: one JSON object per WebSocket text frame.
//!
//! ```text
//! {"type":"init","steps":[...]}      exactly once, first
//! {"type":"update","step":{...}}     per upsert
//! {"type":"remove","taskId":"01-02"} per removal
//! ```

use std::sync::Arc;

use serde::Serialize;

use nwwatch_core::{Step, StepId, Transition};

use crate::error::DaemonError;

/// An encoded frame, shared by every client of one broadcast.
pub type Frame = Arc<str>;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage<'a> {
    Init {
        steps: &'a [Step],
    },
    Update {
        step: &'a Step,
    },
    Remove {
        #[serde(rename = "taskId")]
        task_id: &'a StepId,
    },
}

impl<'a> ServerMessage<'a> {
    pub fn init(steps: &'a [Step]) -> Self {
        ServerMessage::Init { steps }
    }

    pub fn transition(transition: &'a Transition) -> Self {
        match transition {
            Transition::Upsert(step) => ServerMessage::Update { step },
            Transition::Remove(task_id) => ServerMessage::Remove { task_id },
        }
    }

    pub fn encode(&self) -> Result<Frame, DaemonError> {
        Ok(Arc::from(serde_json::to_string(self)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nwwatch_core::StepStatus;
    use serde_json::{json, Value};

    fn step(id: &str) -> Step {
        Step::new(
            StepId::parse(id).expect("id"),
            "nwave",
            "test",
            "Run smoke tests",
            StepStatus::Completed,
        )
    }

    fn decode(frame: &Frame) -> Value {
        serde_json::from_str(frame).expect("valid JSON frame")
    }

    #[test]
    fn init_frame_lists_steps() {
        let steps = vec![step("01-01"), step("01-02")];
        let frame = ServerMessage::init(&steps).encode().expect("encode");
        let value = decode(&frame);
        assert_eq!(value["type"], json!("init"));
        assert_eq!(value["steps"].as_array().map(Vec::len), Some(2));
        assert_eq!(value["steps"][0]["taskId"], json!("01-01"));
    }

    #[test]
    fn upsert_encodes_as_update() {
        let transition = Transition::Upsert(step("04-02"));
        let value = decode(&ServerMessage::transition(&transition).encode().expect("encode"));
        assert_eq!(value["type"], json!("update"));
        assert_eq!(value["step"]["status"], json!("completed"));
        assert_eq!(value["step"]["majorVersion"], json!(4));
    }

    #[test]
    fn remove_carries_only_task_id() {
        let transition = Transition::Remove(StepId::parse("01-01").expect("id"));
        let value = decode(&ServerMessage::transition(&transition).encode().expect("encode"));
        assert_eq!(value, json!({"type": "remove", "taskId": "01-01"}));
    }
}
