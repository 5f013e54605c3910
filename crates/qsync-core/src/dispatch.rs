//! Pure event dispatcher.
//!
//! [`dispatch`] interprets one inbound event against the current registry
//! snapshot and returns the next snapshot plus side-effect intents for the
//! notification sink. No IO, no clock: `now` is injected by the caller.
//!
//! User actions (mark-all-read, rating) flow through the same transform as
//! push events so they cannot race them — the pipeline serializes both.

use chrono::{DateTime, Utc};

use crate::decode::PushEvent;
use crate::registry::{RECENT_ANSWER_CAP, RegistrySnapshot};
use crate::types::{ExpertRef, LiveQuestion, RecentAnswer, Stage};

// ─── Intents ──────────────────────────────────────────────────────

/// Notification category understood by the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotifyKind {
    Success,
    Info,
    Assignment,
}

/// Side effect requested by the dispatcher. The core only emits these;
/// rendering and audio live in the consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Notify { kind: NotifyKind, text: String },
    PlaySound { kind: NotifyKind },
    /// Log-only outcome: discarded regression, duplicate delivery,
    /// unrecognized event type. Never surfaced to the user.
    Diagnostic { detail: String },
}

// ─── Inbound Events ───────────────────────────────────────────────

/// User-initiated mutation, funneled through the serialized pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserAction {
    MarkAllRead,
    RateAnswer { question_id: String, rating: u8 },
}

/// Everything the serialized pipeline can feed the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    Push(PushEvent),
    /// Structurally valid frame with an unrecognized `type`.
    Unknown { event_type: String },
    Action(UserAction),
}

/// Result of dispatching one event.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchOutcome {
    pub next: RegistrySnapshot,
    pub intents: Vec<Intent>,
}

// ─── Dispatch ─────────────────────────────────────────────────────

/// Apply one inbound event to `current`, producing the next snapshot and
/// zero or more intents. Invariant violations (stage regression, duplicate
/// terminal delivery, re-rating) are defensive no-ops with a diagnostic,
/// never errors — the server is trusted but the network is not ordered.
pub fn dispatch(
    current: &RegistrySnapshot,
    event: &InboundEvent,
    now: DateTime<Utc>,
) -> DispatchOutcome {
    let mut next = current.clone();
    let mut intents = Vec::new();

    match event {
        InboundEvent::Push(push) => apply_push(&mut next, push, now, &mut intents),
        InboundEvent::Unknown { event_type } => {
            intents.push(Intent::Diagnostic {
                detail: format!("unrecognized event type: {event_type}"),
            });
        }
        InboundEvent::Action(action) => apply_action(&mut next, action, &mut intents),
    }

    DispatchOutcome { next, intents }
}

fn apply_push(
    next: &mut RegistrySnapshot,
    event: &PushEvent,
    now: DateTime<Utc>,
    intents: &mut Vec<Intent>,
) {
    match event {
        PushEvent::ExpertAssignment {
            question_id,
            subject,
            expert_name,
            expert_avatar,
        } => {
            if next.history_contains(question_id) {
                // Already delivered; a late assignment must not resurrect it.
                intents.push(Intent::Diagnostic {
                    detail: format!("assignment for delivered question {question_id}"),
                });
                return;
            }

            let expert = ExpertRef {
                name: expert_name.clone(),
                avatar: expert_avatar.clone(),
            };
            match next.live.get_mut(question_id) {
                Some(existing) => {
                    // Assignment never regresses stage; fill in identity only.
                    existing.expert = Some(expert);
                    existing.subject = subject.clone();
                    existing.last_updated = now;
                }
                None => {
                    next.live.insert(
                        question_id.clone(),
                        LiveQuestion {
                            id: question_id.clone(),
                            subject: subject.clone(),
                            stage: Stage::Processing,
                            expert: Some(expert),
                            last_updated: now,
                            preview: None,
                        },
                    );
                }
            }
            next.counters.notifications += 1;
            intents.push(Intent::Notify {
                kind: NotifyKind::Assignment,
                text: subject.clone(),
            });
            intents.push(Intent::PlaySound {
                kind: NotifyKind::Assignment,
            });
        }

        PushEvent::StatusUpdate {
            question_id,
            stage,
            preview,
        } => {
            if next.history_contains(question_id) {
                intents.push(Intent::Diagnostic {
                    detail: format!("status update for delivered question {question_id}"),
                });
                return;
            }

            // A terminal status_update is held at typing: promotion to
            // history is reserved for answer_delivered, which carries the
            // answer payload.
            let effective = (*stage).min(Stage::Typing);

            match next.live.get_mut(question_id) {
                Some(existing) if effective < existing.stage => {
                    intents.push(Intent::Diagnostic {
                        detail: format!(
                            "discarded stage regression for {question_id}: {} -> {}",
                            existing.stage, effective
                        ),
                    });
                }
                Some(existing) => {
                    existing.stage = effective;
                    if preview.is_some() {
                        existing.preview = preview.clone();
                    }
                    existing.last_updated = now;
                }
                None => {
                    // Progress can outrun its assignment frame on an
                    // unordered network; track it and let the assignment
                    // fill in expert/subject later.
                    next.live.insert(
                        question_id.clone(),
                        LiveQuestion {
                            id: question_id.clone(),
                            subject: String::new(),
                            stage: effective,
                            expert: None,
                            last_updated: now,
                            preview: preview.clone(),
                        },
                    );
                }
            }
        }

        PushEvent::AnswerDelivered {
            question_id,
            question_text,
            answer_text,
            expert_name,
            subject,
            image_ref,
        } => {
            if next.history_contains(question_id) {
                // Exactly-once terminal transition: a replay is a no-op.
                intents.push(Intent::Diagnostic {
                    detail: format!("duplicate delivery for question {question_id}"),
                });
                return;
            }

            // Atomic move: never present in both collections.
            next.live.remove(question_id);
            next.history.push_front(RecentAnswer {
                id: question_id.clone(),
                question_text: question_text.clone(),
                answer_text: answer_text.clone(),
                expert_name: expert_name.clone(),
                subject: subject.clone(),
                rating: None,
                delivered_at: now,
                image: image_ref.clone(),
            });
            while next.history.len() > RECENT_ANSWER_CAP {
                next.history.pop_back();
            }

            next.counters.notifications += 1;
            intents.push(Intent::Notify {
                kind: NotifyKind::Success,
                text: subject.clone(),
            });
            intents.push(Intent::PlaySound {
                kind: NotifyKind::Success,
            });
        }

        PushEvent::CreditsUpdate { credits } => {
            // Authoritative snapshot: last write wins, no ordering check.
            next.counters.credits = *credits;
        }

        PushEvent::Notification { message } => {
            next.counters.notifications += 1;
            intents.push(Intent::Notify {
                kind: NotifyKind::Info,
                text: message.clone(),
            });
            intents.push(Intent::PlaySound {
                kind: NotifyKind::Info,
            });
        }
    }
}

fn apply_action(next: &mut RegistrySnapshot, action: &UserAction, intents: &mut Vec<Intent>) {
    match action {
        UserAction::MarkAllRead => {
            next.counters.notifications = 0;
        }
        UserAction::RateAnswer {
            question_id,
            rating,
        } => {
            if !(1..=5).contains(rating) {
                intents.push(Intent::Diagnostic {
                    detail: format!("rating {rating} out of range for {question_id}"),
                });
                return;
            }
            match next.history.iter_mut().find(|a| a.id == *question_id) {
                Some(answer) if answer.rating.is_none() => {
                    answer.rating = Some(*rating);
                }
                Some(_) => {
                    intents.push(Intent::Diagnostic {
                        detail: format!("question {question_id} already rated"),
                    });
                }
                None => {
                    intents.push(Intent::Diagnostic {
                        detail: format!("rating for unknown question {question_id}"),
                    });
                }
            }
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;

    fn assignment(id: &str, subject: &str) -> InboundEvent {
        InboundEvent::Push(PushEvent::ExpertAssignment {
            question_id: id.to_owned(),
            subject: subject.to_owned(),
            expert_name: "A. Lee".to_owned(),
            expert_avatar: None,
        })
    }

    fn status(id: &str, stage: Stage) -> InboundEvent {
        InboundEvent::Push(PushEvent::StatusUpdate {
            question_id: id.to_owned(),
            stage,
            preview: None,
        })
    }

    fn delivery(id: &str, subject: &str) -> InboundEvent {
        InboundEvent::Push(PushEvent::AnswerDelivered {
            question_id: id.to_owned(),
            question_text: "Q?".to_owned(),
            answer_text: "A.".to_owned(),
            expert_name: "A. Lee".to_owned(),
            subject: subject.to_owned(),
            image_ref: None,
        })
    }

    fn run(events: &[InboundEvent]) -> RegistrySnapshot {
        let mut snap = RegistrySnapshot::default();
        for event in events {
            snap = dispatch(&snap, event, Utc::now()).next;
        }
        snap
    }

    // ── Assignment ──────────────────────────────────────────────

    #[test]
    fn assignment_creates_question_at_processing() {
        let snap = run(&[assignment("q1", "Calculus")]);
        let q = snap.live.get("q1").expect("q1 present");
        assert_eq!(q.stage, Stage::Processing);
        assert_eq!(q.subject, "Calculus");
        assert_eq!(q.expert.as_ref().map(|e| e.name.as_str()), Some("A. Lee"));
        assert_eq!(snap.counters.notifications, 1);
    }

    #[test]
    fn assignment_emits_notify_with_subject() {
        let outcome = dispatch(
            &RegistrySnapshot::default(),
            &assignment("q1", "Calculus"),
            Utc::now(),
        );
        assert!(outcome.intents.contains(&Intent::Notify {
            kind: NotifyKind::Assignment,
            text: "Calculus".into(),
        }));
        assert!(outcome.intents.contains(&Intent::PlaySound {
            kind: NotifyKind::Assignment,
        }));
    }

    #[test]
    fn assignment_never_regresses_stage() {
        let snap = run(&[
            status("q1", Stage::Typing),
            assignment("q1", "Calculus"),
        ]);
        let q = snap.live.get("q1").expect("q1 present");
        assert_eq!(q.stage, Stage::Typing, "assignment must not regress stage");
        assert_eq!(q.subject, "Calculus", "assignment fills in subject");
        assert!(q.expert.is_some(), "assignment fills in expert");
    }

    #[test]
    fn assignment_after_delivery_is_noop() {
        let snap = run(&[delivery("q1", "Math"), assignment("q1", "Math")]);
        assert!(!snap.contains_live("q1"));
        assert!(snap.history_contains("q1"));
        // Delivery counted once; late assignment adds nothing.
        assert_eq!(snap.counters.notifications, 1);
    }

    // ── Status updates / monotonicity ───────────────────────────

    #[test]
    fn status_update_advances_stage() {
        let snap = run(&[assignment("q1", "Math"), status("q1", Stage::Reviewing)]);
        assert_eq!(snap.live["q1"].stage, Stage::Reviewing);
    }

    #[test]
    fn stage_regression_is_discarded() {
        let snap = run(&[
            assignment("q1", "Math"),
            status("q1", Stage::Typing),
            status("q1", Stage::Processing),
        ]);
        assert_eq!(snap.live["q1"].stage, Stage::Typing);
    }

    #[test]
    fn regression_produces_diagnostic_not_error() {
        let snap = run(&[assignment("q1", "Math"), status("q1", Stage::Typing)]);
        let outcome = dispatch(&snap, &status("q1", Stage::Reviewing), Utc::now());
        assert_eq!(outcome.next, snap, "state must be unchanged");
        assert!(
            matches!(outcome.intents.as_slice(), [Intent::Diagnostic { .. }]),
            "expected a single diagnostic, got {:?}",
            outcome.intents
        );
    }

    #[test]
    fn same_stage_refreshes_preview() {
        let first = InboundEvent::Push(PushEvent::StatusUpdate {
            question_id: "q1".into(),
            stage: Stage::Typing,
            preview: Some("draft one".into()),
        });
        let second = InboundEvent::Push(PushEvent::StatusUpdate {
            question_id: "q1".into(),
            stage: Stage::Typing,
            preview: Some("draft two".into()),
        });
        let snap = run(&[first, second]);
        assert_eq!(snap.live["q1"].preview.as_deref(), Some("draft two"));
    }

    #[test]
    fn preview_kept_when_update_has_none() {
        let with_preview = InboundEvent::Push(PushEvent::StatusUpdate {
            question_id: "q1".into(),
            stage: Stage::Reviewing,
            preview: Some("keep me".into()),
        });
        let snap = run(&[with_preview, status("q1", Stage::Typing)]);
        assert_eq!(snap.live["q1"].preview.as_deref(), Some("keep me"));
    }

    #[test]
    fn terminal_status_update_held_at_typing() {
        // delivered via status_update alone is insufficient to promote;
        // the richer answer_delivered event is authoritative.
        let snap = run(&[assignment("q1", "Math"), status("q1", Stage::Delivered)]);
        assert_eq!(snap.live["q1"].stage, Stage::Typing);
        assert!(!snap.history_contains("q1"));
    }

    #[test]
    fn status_update_before_assignment_is_tracked() {
        let snap = run(&[status("q1", Stage::Reviewing)]);
        assert_eq!(snap.live["q1"].stage, Stage::Reviewing);
        assert!(snap.live["q1"].expert.is_none());
    }

    #[test]
    fn status_update_after_delivery_is_noop() {
        let snap = run(&[delivery("q1", "Math"), status("q1", Stage::Typing)]);
        assert!(!snap.contains_live("q1"));
        assert!(snap.history_contains("q1"));
    }

    #[test]
    fn monotonicity_all_permutations() {
        // Final recorded stage equals the maximum seen, in every order.
        let stages = [Stage::Processing, Stage::Reviewing, Stage::Typing];
        let perms: &[[usize; 3]] = &[
            [0, 1, 2],
            [0, 2, 1],
            [1, 0, 2],
            [1, 2, 0],
            [2, 0, 1],
            [2, 1, 0],
        ];
        for perm in perms {
            let events: Vec<_> = perm.iter().map(|&i| status("q1", stages[i])).collect();
            let snap = run(&events);
            assert_eq!(
                snap.live["q1"].stage,
                Stage::Typing,
                "permutation {perm:?} must end at the maximum stage"
            );
        }
    }

    proptest! {
        #[test]
        fn monotonicity_holds_for_arbitrary_sequences(
            seq in proptest::collection::vec(0u8..3, 1..12)
        ) {
            let stages = [Stage::Processing, Stage::Reviewing, Stage::Typing];
            let events: Vec<_> = seq.iter().map(|&i| status("q1", stages[i as usize])).collect();
            let snap = run(&events);
            let max = seq.iter().map(|&i| stages[i as usize]).max().unwrap();
            prop_assert_eq!(snap.live["q1"].stage, max);
        }

        #[test]
        fn stage_never_decreases_between_events(
            seq in proptest::collection::vec(0u8..3, 1..12)
        ) {
            let stages = [Stage::Processing, Stage::Reviewing, Stage::Typing];
            let mut snap = RegistrySnapshot::default();
            let mut prev = None;
            for &i in &seq {
                snap = dispatch(&snap, &status("q1", stages[i as usize]), Utc::now()).next;
                let current = snap.live["q1"].stage;
                if let Some(p) = prev {
                    prop_assert!(current >= p, "stage regressed from {p:?} to {current:?}");
                }
                prev = Some(current);
            }
        }
    }

    // ── Delivery ────────────────────────────────────────────────

    #[test]
    fn delivery_moves_question_to_history() {
        let snap = run(&[assignment("q1", "Math"), delivery("q1", "Math")]);
        assert!(!snap.contains_live("q1"));
        assert_eq!(snap.history.front().map(|a| a.id.as_str()), Some("q1"));
    }

    #[test]
    fn delivery_is_exactly_once() {
        let snap = run(&[
            assignment("q1", "Math"),
            delivery("q1", "Math"),
            delivery("q1", "Math"),
        ]);
        let entries = snap.history.iter().filter(|a| a.id == "q1").count();
        assert_eq!(entries, 1, "replay must not duplicate the history entry");
        // assignment + first delivery only
        assert_eq!(snap.counters.notifications, 2);
    }

    #[test]
    fn duplicate_delivery_yields_diagnostic_only() {
        let snap = run(&[delivery("q1", "Math")]);
        let outcome = dispatch(&snap, &delivery("q1", "Math"), Utc::now());
        assert_eq!(outcome.next, snap);
        assert!(matches!(
            outcome.intents.as_slice(),
            [Intent::Diagnostic { .. }]
        ));
    }

    #[test]
    fn delivery_without_prior_live_entry_still_records() {
        // The live entry may have been lost (fresh process, missed frames);
        // the delivery payload is self-sufficient.
        let snap = run(&[delivery("q9", "History")]);
        assert!(snap.history_contains("q9"));
        assert_eq!(snap.counters.notifications, 1);
    }

    #[test]
    fn history_bounded_newest_first() {
        let events: Vec<_> = (0..10).map(|i| delivery(&format!("q{i}"), "S")).collect();
        let snap = run(&events);
        assert_eq!(snap.history.len(), RECENT_ANSWER_CAP);
        assert_eq!(snap.history.front().map(|a| a.id.as_str()), Some("q9"));
        assert_eq!(snap.history.back().map(|a| a.id.as_str()), Some("q2"));
        assert!(!snap.history_contains("q0"), "oldest evicted");
        assert!(!snap.history_contains("q1"), "oldest evicted");
    }

    // ── Credits ─────────────────────────────────────────────────

    #[test]
    fn credits_last_write_wins_in_delivery_order() {
        let five = InboundEvent::Push(PushEvent::CreditsUpdate { credits: 5 });
        let twelve = InboundEvent::Push(PushEvent::CreditsUpdate { credits: 12 });

        // 5 then 12 → 12; reversed → 5. No ordering guarantee is expected
        // for this event type: it is a periodic authoritative snapshot.
        assert_eq!(run(&[five.clone(), twelve.clone()]).counters.credits, 12);
        assert_eq!(run(&[twelve, five]).counters.credits, 5);
    }

    #[test]
    fn credits_update_is_not_notification_worthy() {
        let snap = run(&[InboundEvent::Push(PushEvent::CreditsUpdate { credits: 3 })]);
        assert_eq!(snap.counters.notifications, 0);
    }

    // ── Notifications ───────────────────────────────────────────

    #[test]
    fn notification_increments_and_displays_message() {
        let outcome = dispatch(
            &RegistrySnapshot::default(),
            &InboundEvent::Push(PushEvent::Notification {
                message: "Maintenance at 02:00".into(),
            }),
            Utc::now(),
        );
        assert_eq!(outcome.next.counters.notifications, 1);
        assert!(outcome.intents.contains(&Intent::Notify {
            kind: NotifyKind::Info,
            text: "Maintenance at 02:00".into(),
        }));
    }

    #[test]
    fn mark_all_read_resets_counter() {
        let snap = run(&[
            assignment("q1", "Math"),
            InboundEvent::Push(PushEvent::Notification {
                message: "hi".into(),
            }),
            InboundEvent::Action(UserAction::MarkAllRead),
        ]);
        assert_eq!(snap.counters.notifications, 0);
    }

    // ── Unknown events ──────────────────────────────────────────

    #[test]
    fn unknown_event_is_diagnostic_noop() {
        let snap = run(&[assignment("q1", "Math")]);
        let outcome = dispatch(
            &snap,
            &InboundEvent::Unknown {
                event_type: "server_maintenance".into(),
            },
            Utc::now(),
        );
        assert_eq!(outcome.next, snap);
        assert!(matches!(
            outcome.intents.as_slice(),
            [Intent::Diagnostic { .. }]
        ));
    }

    // ── Rating ──────────────────────────────────────────────────

    #[test]
    fn rating_set_once() {
        let rate =
            |n: u8| InboundEvent::Action(UserAction::RateAnswer {
                question_id: "q1".into(),
                rating: n,
            });
        let snap = run(&[delivery("q1", "Math"), rate(4)]);
        assert_eq!(snap.history.front().and_then(|a| a.rating), Some(4));

        // Second rating is a diagnostic no-op.
        let outcome = dispatch(&snap, &rate(2), Utc::now());
        assert_eq!(
            outcome.next.history.front().and_then(|a| a.rating),
            Some(4)
        );
        assert!(matches!(
            outcome.intents.as_slice(),
            [Intent::Diagnostic { .. }]
        ));
    }

    #[test]
    fn rating_out_of_range_rejected() {
        let snap = run(&[
            delivery("q1", "Math"),
            InboundEvent::Action(UserAction::RateAnswer {
                question_id: "q1".into(),
                rating: 6,
            }),
        ]);
        assert_eq!(snap.history.front().and_then(|a| a.rating), None);
    }

    #[test]
    fn rating_unknown_question_is_diagnostic() {
        let outcome = dispatch(
            &RegistrySnapshot::default(),
            &InboundEvent::Action(UserAction::RateAnswer {
                question_id: "nope".into(),
                rating: 5,
            }),
            Utc::now(),
        );
        assert_eq!(outcome.next, RegistrySnapshot::default());
        assert!(matches!(
            outcome.intents.as_slice(),
            [Intent::Diagnostic { .. }]
        ));
    }

    // ── Full lifecycle scenario ─────────────────────────────────

    #[test]
    fn assignment_typing_delivery_scenario() {
        let snap = run(&[
            assignment("q1", "Calculus"),
            status("q1", Stage::Typing),
            delivery("q1", "Calculus"),
        ]);
        assert_eq!(snap.live_count(), 0, "live set empty after delivery");
        assert_eq!(snap.history.front().map(|a| a.id.as_str()), Some("q1"));
        assert_eq!(
            snap.counters.notifications, 2,
            "assignment + delivery are notification-worthy"
        );
    }
}
