//! Response router and the feature-handler registration contract.
//!
//! Feature handlers own the per-feature protocol sub-dialects (call
//! status, directory, standby, do-not-disturb, ...). They register with
//! the router and receive:
//!
//! - every completed `Response` payload (JSON block), plus the sub-trees
//!   resolved by their advertised JSON Pointer paths;
//! - every completed `FeedbackResponse` payload (feedback-list block);
//! - single status lines matched by their `handles_line` predicate.
//!
//! Delivery is synchronous at the flush point: a publish call does not
//! return until every handler has been invoked, so no two flushes
//! interleave from a handler's point of view. A failing handler is
//! logged and never prevents delivery to the remaining handlers.

use serde_json::Value;
use tracing::{debug, warn};

use roomlink_protocol::{Channel, RoutedMessage};

use crate::error::HandlerError;

/// A downstream consumer of routed codec traffic.
///
/// All methods except [`name`](Self::name) have defaults, so a handler
/// implements only the parts of the contract its dialect needs.
pub trait FeatureHandler: Send {
    /// Stable identifier used in logs.
    fn name(&self) -> &'static str;

    /// Commands to issue once the handshake completes.
    fn poll_commands(&self) -> Vec<String> {
        Vec::new()
    }

    /// Feedback topics to register for event notifications once the
    /// handshake completes.
    fn feedback_topics(&self) -> Vec<String> {
        Vec::new()
    }

    /// Predicate for single status lines this handler owns.
    fn handles_line(&self, _line: &str) -> bool {
        false
    }

    /// Consumes a single status line previously claimed by
    /// [`handles_line`](Self::handles_line).
    fn handle_line(&mut self, _line: &str) -> Result<(), HandlerError> {
        Ok(())
    }

    /// JSON Pointer paths this handler wants resolved against `Response`
    /// payloads (e.g. `/Status/Standby`).
    fn json_paths(&self) -> Vec<String> {
        Vec::new()
    }

    /// Consumes a resolved JSON sub-tree.
    fn on_json(&mut self, _path: &str, _value: &Value) -> Result<(), HandlerError> {
        Ok(())
    }

    /// Consumes a raw `Response` payload.
    fn on_response(&mut self, _payload: &str) -> Result<(), HandlerError> {
        Ok(())
    }

    /// Consumes a raw `FeedbackResponse` payload.
    fn on_feedback_response(&mut self, _payload: &str) -> Result<(), HandlerError> {
        Ok(())
    }
}

/// Fans completed messages out to the registered feature handlers.
#[derive(Default)]
pub struct Router {
    handlers: Vec<Box<dyn FeatureHandler>>,
}

impl Router {
    /// Creates an empty router.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a feature handler.
    pub fn register(&mut self, handler: Box<dyn FeatureHandler>) {
        debug!(handler = handler.name(), "Registered feature handler");
        self.handlers.push(handler);
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// True if no handlers are registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Delivers a completed message to every handler.
    pub fn publish(&mut self, message: &RoutedMessage) {
        match message.channel {
            Channel::Response => self.publish_response(message),
            Channel::FeedbackResponse => {
                for handler in &mut self.handlers {
                    if let Err(e) = handler.on_feedback_response(&message.payload) {
                        warn!(
                            handler = handler.name(),
                            error = %e,
                            "Handler failed on feedback payload"
                        );
                    }
                }
            }
        }
    }

    /// Offers a single passthrough line to every handler whose predicate
    /// claims it. Returns true if any handler did.
    pub fn dispatch_line(&mut self, line: &str) -> bool {
        let mut claimed = false;
        for handler in &mut self.handlers {
            if handler.handles_line(line) {
                claimed = true;
                if let Err(e) = handler.handle_line(line) {
                    warn!(handler = handler.name(), error = %e, "Handler failed on status line");
                }
            }
        }
        claimed
    }

    /// Feedback-topic registrations followed by poll commands, per
    /// handler, to enqueue when the handshake completes.
    pub fn registration_commands(&self) -> Vec<String> {
        let mut commands = Vec::new();
        for handler in &self.handlers {
            for topic in handler.feedback_topics() {
                commands.push(format!("xFeedback Register {topic}"));
            }
            commands.extend(handler.poll_commands());
        }
        commands
    }

    fn publish_response(&mut self, message: &RoutedMessage) {
        let parsed = match message.parse_json() {
            Ok(value) => Some(value),
            Err(e) => {
                debug!(error = %e, "Response payload is not valid JSON; raw delivery only");
                None
            }
        };

        for handler in &mut self.handlers {
            if let Err(e) = handler.on_response(&message.payload) {
                warn!(handler = handler.name(), error = %e, "Handler failed on response payload");
            }
            let Some(root) = parsed.as_ref() else {
                continue;
            };
            for path in handler.json_paths() {
                if let Some(value) = root.pointer(&path) {
                    if let Err(e) = handler.on_json(&path, value) {
                        warn!(
                            handler = handler.name(),
                            path = %path,
                            error = %e,
                            "Handler failed on JSON sub-tree"
                        );
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Recorder {
        responses: Arc<Mutex<Vec<String>>>,
        feedback: Arc<Mutex<Vec<String>>>,
        json: Arc<Mutex<Vec<(String, Value)>>>,
        lines: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    impl FeatureHandler for Recorder {
        fn name(&self) -> &'static str {
            "recorder"
        }

        fn poll_commands(&self) -> Vec<String> {
            vec!["xStatus Audio Volume".to_string()]
        }

        fn feedback_topics(&self) -> Vec<String> {
            vec!["/Status/Audio".to_string()]
        }

        fn handles_line(&self, line: &str) -> bool {
            line.starts_with("*s")
        }

        fn handle_line(&mut self, line: &str) -> Result<(), HandlerError> {
            self.lines.lock().unwrap().push(line.to_string());
            Ok(())
        }

        fn json_paths(&self) -> Vec<String> {
            vec!["/Status/Audio/Volume".to_string()]
        }

        fn on_json(&mut self, path: &str, value: &Value) -> Result<(), HandlerError> {
            self.json.lock().unwrap().push((path.to_string(), value.clone()));
            Ok(())
        }

        fn on_response(&mut self, payload: &str) -> Result<(), HandlerError> {
            if self.fail {
                return Err(HandlerError::parse("forced failure"));
            }
            self.responses.lock().unwrap().push(payload.to_string());
            Ok(())
        }

        fn on_feedback_response(&mut self, payload: &str) -> Result<(), HandlerError> {
            if self.fail {
                return Err(HandlerError::parse("forced failure"));
            }
            self.feedback.lock().unwrap().push(payload.to_string());
            Ok(())
        }
    }

    #[test]
    fn response_fans_out_to_all_handlers() {
        let first = Recorder::default();
        let second = Recorder::default();
        let mut router = Router::new();
        router.register(Box::new(first.clone()));
        router.register(Box::new(second.clone()));

        router.publish(&RoutedMessage::response("{\n\"a\":1\n}\n"));

        assert_eq!(first.responses.lock().unwrap().len(), 1);
        assert_eq!(second.responses.lock().unwrap().len(), 1);
    }

    #[test]
    fn failing_handler_does_not_block_others() {
        let failing = Recorder {
            fail: true,
            ..Recorder::default()
        };
        let healthy = Recorder::default();
        let mut router = Router::new();
        router.register(Box::new(failing));
        router.register(Box::new(healthy.clone()));

        router.publish(&RoutedMessage::feedback_response("/a\n/b\n"));

        assert_eq!(healthy.feedback.lock().unwrap().as_slice(), ["/a\n/b\n"]);
    }

    #[test]
    fn json_pointer_subtrees_delivered() {
        let recorder = Recorder::default();
        let mut router = Router::new();
        router.register(Box::new(recorder.clone()));

        router.publish(&RoutedMessage::response(
            "{\n\"Status\":{\"Audio\":{\"Volume\":42}}\n}\n",
        ));

        let json = recorder.json.lock().unwrap();
        assert_eq!(json.len(), 1);
        assert_eq!(json[0].0, "/Status/Audio/Volume");
        assert_eq!(json[0].1, Value::from(42));
    }

    #[test]
    fn unresolved_pointer_is_skipped() {
        let recorder = Recorder::default();
        let mut router = Router::new();
        router.register(Box::new(recorder.clone()));

        router.publish(&RoutedMessage::response("{\n\"Status\":{}\n}\n"));

        assert!(recorder.json.lock().unwrap().is_empty());
        assert_eq!(recorder.responses.lock().unwrap().len(), 1);
    }

    #[test]
    fn non_json_response_still_delivered_raw() {
        let recorder = Recorder::default();
        let mut router = Router::new();
        router.register(Box::new(recorder.clone()));

        router.publish(&RoutedMessage::response("not json\n"));

        assert_eq!(recorder.responses.lock().unwrap().as_slice(), ["not json\n"]);
        assert!(recorder.json.lock().unwrap().is_empty());
    }

    #[test]
    fn dispatch_line_honors_predicate() {
        let recorder = Recorder::default();
        let mut router = Router::new();
        router.register(Box::new(recorder.clone()));

        assert!(router.dispatch_line("*s Standby State: Standby"));
        assert!(!router.dispatch_line("unrelated noise"));
        assert_eq!(
            recorder.lines.lock().unwrap().as_slice(),
            ["*s Standby State: Standby"]
        );
    }

    #[test]
    fn registration_commands_order_topics_before_polls() {
        let mut router = Router::new();
        router.register(Box::new(Recorder::default()));
        assert_eq!(
            router.registration_commands(),
            vec![
                "xFeedback Register /Status/Audio".to_string(),
                "xStatus Audio Volume".to_string(),
            ]
        );
    }
}
