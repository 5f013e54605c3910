//! Strictly serialized event pipeline.
//!
//! One mpsc channel funnels push frames and user actions alike into a
//! single consumer: decode → dispatch → commit → intent delivery. Frame
//! N+1 is never dispatched before frame N's commit has completed, which
//! preserves the monotonic-stage invariant under arbitrary network
//! interleavings and keeps user actions from racing push events.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, mpsc};

use qsync_core::decode::{DecodedFrame, decode_frame};
use qsync_core::dispatch::{InboundEvent, UserAction, dispatch};
use qsync_core::registry::LiveQuestionRegistry;

use crate::sink::{NotificationSink, deliver};

/// Everything that can enter the serialized path.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineInput {
    /// Raw text frame from the connection manager.
    Frame(String),
    /// User-initiated mutation (mark-all-read, rating).
    Action(UserAction),
}

/// The pipeline has shut down and accepts no further inputs.
#[derive(Debug, thiserror::Error)]
#[error("event pipeline is closed")]
pub struct PipelineClosed;

/// Cloneable sender half for producers (connection manager, UI glue).
#[derive(Debug, Clone)]
pub struct PipelineHandle {
    tx: mpsc::Sender<PipelineInput>,
}

impl PipelineHandle {
    pub async fn push_frame(&self, raw: String) -> Result<(), PipelineClosed> {
        self.tx
            .send(PipelineInput::Frame(raw))
            .await
            .map_err(|_| PipelineClosed)
    }

    pub async fn mark_all_read(&self) -> Result<(), PipelineClosed> {
        self.tx
            .send(PipelineInput::Action(UserAction::MarkAllRead))
            .await
            .map_err(|_| PipelineClosed)
    }

    pub async fn rate_answer(&self, question_id: String, rating: u8) -> Result<(), PipelineClosed> {
        self.tx
            .send(PipelineInput::Action(UserAction::RateAnswer {
                question_id,
                rating,
            }))
            .await
            .map_err(|_| PipelineClosed)
    }
}

/// Single-consumer pipeline over a shared registry.
pub struct EventPipeline {
    registry: Arc<Mutex<LiveQuestionRegistry>>,
    sink: Arc<dyn NotificationSink>,
    rx: mpsc::Receiver<PipelineInput>,
    handle: PipelineHandle,
}

impl EventPipeline {
    /// Build a pipeline with the given input channel capacity.
    pub fn new(
        registry: Arc<Mutex<LiveQuestionRegistry>>,
        sink: Arc<dyn NotificationSink>,
        capacity: usize,
    ) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            registry,
            sink,
            rx,
            handle: PipelineHandle { tx },
        }
    }

    pub fn handle(&self) -> PipelineHandle {
        self.handle.clone()
    }

    /// Consume inputs until every sender is dropped. Strictly sequential:
    /// each input's commit completes before the next is dispatched.
    pub async fn run(self) {
        let Self {
            registry,
            sink,
            mut rx,
            handle,
        } = self;
        // Drop our own handle so run() terminates once external senders go.
        drop(handle);
        while let Some(input) = rx.recv().await {
            process_input(&registry, sink.as_ref(), input).await;
        }
        tracing::debug!("event pipeline drained, stopping");
    }
}

/// Apply one input: decode (frames), dispatch, commit, deliver intents.
/// Decode failures are dropped with a diagnostic log — they never affect
/// connection or registry state.
async fn process_input(
    registry: &Mutex<LiveQuestionRegistry>,
    sink: &dyn NotificationSink,
    input: PipelineInput,
) {
    let event = match input {
        PipelineInput::Frame(raw) => match decode_frame(&raw) {
            Ok(DecodedFrame::Event(event)) => InboundEvent::Push(event),
            Ok(DecodedFrame::Unknown { event_type }) => InboundEvent::Unknown { event_type },
            Err(e) => {
                tracing::warn!("dropping undecodable frame: {e}");
                return;
            }
        },
        PipelineInput::Action(action) => InboundEvent::Action(action),
    };

    let intents = {
        let mut registry = registry.lock().await;
        let outcome = dispatch(&registry.snapshot(), &event, Utc::now());
        registry.commit(outcome.next);
        outcome.intents
    };

    deliver(sink, &intents);
}

// ─── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::RecordingSink;
    use qsync_core::dispatch::NotifyKind;
    use qsync_core::types::Stage;

    fn setup() -> (
        Arc<Mutex<LiveQuestionRegistry>>,
        Arc<RecordingSink>,
        EventPipeline,
    ) {
        let registry = Arc::new(Mutex::new(LiveQuestionRegistry::new()));
        let sink = Arc::new(RecordingSink::default());
        let pipeline = EventPipeline::new(
            Arc::clone(&registry),
            Arc::clone(&sink) as Arc<dyn NotificationSink>,
            32,
        );
        (registry, sink, pipeline)
    }

    #[tokio::test]
    async fn frames_flow_through_to_registry_and_sink() {
        let (registry, sink, pipeline) = setup();
        let handle = pipeline.handle();
        let worker = tokio::spawn(pipeline.run());

        handle
            .push_frame(
                r#"{"type":"expert_assignment","questionId":"q1","subject":"Calculus","expertName":"A. Lee"}"#.into(),
            )
            .await
            .expect("push");
        handle
            .push_frame(r#"{"type":"status_update","questionId":"q1","stage":"typing"}"#.into())
            .await
            .expect("push");
        handle
            .push_frame(
                r#"{"type":"answer_delivered","questionId":"q1","questionText":"Q","answerText":"A","expertName":"A. Lee","subject":"Calculus"}"#.into(),
            )
            .await
            .expect("push");

        drop(handle);
        worker.await.expect("pipeline task");

        let registry = registry.lock().await;
        assert_eq!(registry.live_count(), 0);
        assert_eq!(registry.unread_notifications(), 2);
        let snap = registry.snapshot();
        assert_eq!(snap.history.front().map(|a| a.id.as_str()), Some("q1"));

        let notifications = sink.notifications.lock().expect("lock");
        assert_eq!(
            notifications.as_slice(),
            &[
                (NotifyKind::Assignment, "Calculus".to_owned()),
                (NotifyKind::Success, "Calculus".to_owned()),
            ]
        );
    }

    #[tokio::test]
    async fn inputs_are_processed_in_submission_order() {
        let (registry, _sink, pipeline) = setup();
        let handle = pipeline.handle();
        let worker = tokio::spawn(pipeline.run());

        // A regression frame queued after the later stage must lose even
        // though everything arrives in one burst.
        for frame in [
            r#"{"type":"status_update","questionId":"q1","stage":"typing"}"#,
            r#"{"type":"status_update","questionId":"q1","stage":"processing"}"#,
        ] {
            handle.push_frame(frame.into()).await.expect("push");
        }
        drop(handle);
        worker.await.expect("pipeline task");

        let registry = registry.lock().await;
        assert_eq!(registry.snapshot().live["q1"].stage, Stage::Typing);
    }

    #[tokio::test]
    async fn user_actions_share_the_serialized_path() {
        let (registry, _sink, pipeline) = setup();
        let handle = pipeline.handle();
        let worker = tokio::spawn(pipeline.run());

        handle
            .push_frame(r#"{"type":"notification","message":"hi"}"#.into())
            .await
            .expect("push");
        handle.mark_all_read().await.expect("action");
        handle
            .push_frame(
                r#"{"type":"answer_delivered","questionId":"q1","questionText":"Q","answerText":"A","expertName":"E","subject":"S"}"#.into(),
            )
            .await
            .expect("push");
        handle.rate_answer("q1".into(), 5).await.expect("action");

        drop(handle);
        worker.await.expect("pipeline task");

        let registry = registry.lock().await;
        let snap = registry.snapshot();
        // notification was read before the delivery arrived
        assert_eq!(snap.counters.notifications, 1);
        assert_eq!(snap.history.front().and_then(|a| a.rating), Some(5));
    }

    #[tokio::test]
    async fn undecodable_frames_are_dropped_silently() {
        let (registry, sink, pipeline) = setup();
        let handle = pipeline.handle();
        let worker = tokio::spawn(pipeline.run());

        handle.push_frame("garbage {{{".into()).await.expect("push");
        handle
            .push_frame(r#"{"noType":true}"#.into())
            .await
            .expect("push");
        handle
            .push_frame(r#"{"type":"credits_update","credits":7}"#.into())
            .await
            .expect("push");

        drop(handle);
        worker.await.expect("pipeline task");

        let registry = registry.lock().await;
        assert_eq!(registry.credits(), 7);
        assert!(sink.notifications.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn closed_pipeline_rejects_inputs() {
        let (_registry, _sink, pipeline) = setup();
        let handle = pipeline.handle();
        drop(pipeline);
        assert!(handle.mark_all_read().await.is_err());
    }
}
