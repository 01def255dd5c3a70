//! Events emitted by a DAP server
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::types::{BreakpointId, Source, Thread, ThreadId, VariablesReference};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "body", rename_all = "camelCase")]
#[non_exhaustive]
pub enum Event {
    Initialized,
    Output(OutputEventBody),
    Stopped(StoppedEventBody),
    Continued(ContinuedEventBody),
    Thread(ThreadEventBody),
    Terminated,
    // Catch-all for unknown event types - not part of serde tag/content
    #[serde(skip)]
    Unknown,
}

impl<'de> Deserialize<'de> for Event {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;

        match serde_json::from_value::<EventHelper>(value.clone()) {
            Ok(helper) => Ok(helper.into()),
            Err(_) => {
                if let Some(event_name) = value.get("event").and_then(|v| v.as_str()) {
                    tracing::debug!(event = event_name, "received unknown event, ignoring");
                }
                Ok(Event::Unknown)
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "body", rename_all = "camelCase")]
enum EventHelper {
    Initialized,
    Output(OutputEventBody),
    Stopped(StoppedEventBody),
    Continued(ContinuedEventBody),
    Thread(ThreadEventBody),
    Terminated,
}

impl From<EventHelper> for Event {
    fn from(helper: EventHelper) -> Self {
        match helper {
            EventHelper::Initialized => Event::Initialized,
            EventHelper::Output(body) => Event::Output(body),
            EventHelper::Stopped(body) => Event::Stopped(body),
            EventHelper::Continued(body) => Event::Continued(body),
            EventHelper::Thread(body) => Event::Thread(body),
            EventHelper::Terminated => Event::Terminated,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputEventBody {
    pub category: Option<String>,
    pub output: String,
    pub variables_reference: Option<VariablesReference>,
    pub source: Option<Source>,
    pub line: Option<i64>,
    pub column: Option<i64>,
    pub data: Option<Value>,
}

/// Why a thread stopped. Reasons the model does not single out are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StoppedReason {
    Step,
    FunctionBreakpoint,
    Other(String),
}

impl StoppedReason {
    pub fn as_str(&self) -> &str {
        match self {
            StoppedReason::Step => "step",
            StoppedReason::FunctionBreakpoint => "function breakpoint",
            StoppedReason::Other(reason) => reason,
        }
    }
}

impl From<String> for StoppedReason {
    fn from(reason: String) -> Self {
        match reason.as_str() {
            "step" => StoppedReason::Step,
            "function breakpoint" => StoppedReason::FunctionBreakpoint,
            _ => StoppedReason::Other(reason),
        }
    }
}

impl From<StoppedReason> for String {
    fn from(reason: StoppedReason) -> Self {
        match reason {
            StoppedReason::Other(reason) => reason,
            known => known.as_str().to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoppedEventBody {
    pub reason: StoppedReason,
    pub thread_id: Option<ThreadId>,
    pub hit_breakpoint_ids: Option<Vec<BreakpointId>>,
    pub description: Option<String>,
    pub text: Option<String>,
    pub all_threads_stopped: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadEventBody {
    pub reason: String,
    pub thread_id: ThreadId,
}

impl ThreadEventBody {
    /// The thread the event refers to, named the way adapters name unnamed threads
    pub fn thread(&self) -> Thread {
        Thread {
            id: self.thread_id,
            name: format!("Thread {}", self.thread_id),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinuedEventBody {
    pub thread_id: ThreadId,
    pub all_threads_continued: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_events_are_tolerated() {
        let event: Event = serde_json::from_str(
            r#"{"event": "loadedSource", "body": {"reason": "new", "source": {"name": "lib.py"}}}"#,
        )
        .unwrap();
        assert!(matches!(event, Event::Unknown), "got {event:?}");
    }

    #[test]
    fn stopped_reasons_round_trip() {
        for (reason, wire) in [
            (StoppedReason::Step, "step"),
            (StoppedReason::FunctionBreakpoint, "function breakpoint"),
            (StoppedReason::Other("exception".to_string()), "exception"),
        ] {
            assert_eq!(serde_json::to_value(&reason).unwrap(), serde_json::json!(wire));
            let parsed: StoppedReason = serde_json::from_value(serde_json::json!(wire)).unwrap();
            assert_eq!(parsed, reason);
        }
    }

    #[test]
    fn continued_and_thread_events() {
        let event: Event = serde_json::from_str(
            r#"{"event": "continued", "body": {"threadId": 3, "allThreadsContinued": false}}"#,
        )
        .unwrap();
        assert!(matches!(
            event,
            Event::Continued(ContinuedEventBody {
                thread_id: 3,
                all_threads_continued: Some(false)
            })
        ));

        let event: Event =
            serde_json::from_str(r#"{"event": "thread", "body": {"reason": "started", "threadId": 5}}"#)
                .unwrap();
        let Event::Thread(body) = event else {
            panic!("Expected Event::Thread, got {event:?}");
        };
        assert_eq!(body.thread().name, "Thread 5");
    }

    #[test]
    fn test_stopped_event_deserialization() {
        let stopped_event_json = r#"{"event": "stopped", "body": {"reason": "breakpoint", "threadId": 1, "allThreadsStopped": true}}"#;

        let event: Event = serde_json::from_str(stopped_event_json).unwrap();
        let Event::Stopped(body) = event else {
            panic!("Expected Event::Stopped, got {:?}", event);
        };
        assert_eq!(body.thread_id, Some(1));
        assert_eq!(body.reason, StoppedReason::Other("breakpoint".to_string()));
        assert_eq!(body.all_threads_stopped, Some(true));
    }

    #[test]
    fn test_output_event_deserialization() {
        let output_event_json =
            r#"{"event": "output", "body": {"category": "stderr", "output": "boom\n"}}"#;

        let event: Event = serde_json::from_str(output_event_json).unwrap();
        let Event::Output(body) = event else {
            panic!("Expected Event::Output, got {:?}", event);
        };
        assert_eq!(body.category.as_deref(), Some("stderr"));
        assert_eq!(body.output, "boom\n");
    }
}
