//! Human-vs-AI authorship heuristic for text edits.
//!
//! AI insertions arrive as large bursty blocks; human typing arrives one
//! keystroke at a time. The classifier keeps a single "AI is generating"
//! flag and flips it with hysteresis:
//!
//! ```text
//! chat surface edit                      → ON  (counter = 0)
//! >3 large inserts within 500ms          → ON  (counter = 0, AI-capable hosts only)
//! human keystroke while ON               → counter += 1, restart 1000ms timer
//! timer fires with counter > 1           → OFF
//! any other edit while ON                → counter = 0, timer cancelled
//! ```

use chrono::{DateTime, Duration, Utc};
use pulse_protocol::{ContentChange, DocumentRef};

use super::surfaces::is_ai_chat_surface;

pub const AI_RECENT_PASTES_MS: i64 = 500;
pub const AI_DEBOUNCE_MS: i64 = 1000;

/// Pastes beyond this many inside the recency window switch AI state on.
const AI_PASTE_BURST: usize = 3;
/// Trimmed inserts longer than this are treated as possible AI inserts.
const POSSIBLE_AI_INSERT_CHARS: usize = 2;

/// Shape of a text-change notification, in rule evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeShape {
    ChatSurface,
    PossibleAiInsert,
    HumanTyping,
    Other,
}

pub fn classify_change(document: &DocumentRef, changes: &[ContentChange]) -> ChangeShape {
    if is_ai_chat_surface(&document.scheme) {
        return ChangeShape::ChatSurface;
    }

    let [change] = changes else {
        return ChangeShape::Other;
    };

    if change.text.trim().chars().count() > POSSIBLE_AI_INSERT_CHARS {
        return ChangeShape::PossibleAiInsert;
    }

    let is_keystroke =
        change.text.chars().count() == 1 && change.text != "\n" && change.text != "\r";
    let is_deletion = change.text.is_empty() && change.range_length > 0;
    if is_keystroke || is_deletion {
        return ChangeShape::HumanTyping;
    }

    ChangeShape::Other
}

#[derive(Debug)]
pub struct AuthorshipClassifier {
    ai_capable: bool,
    generating: bool,
    debounce_count: u32,
    debounce_deadline: Option<DateTime<Utc>>,
    recent_pastes: Vec<DateTime<Utc>>,
}

impl AuthorshipClassifier {
    pub fn new(ai_capable: bool) -> Self {
        Self {
            ai_capable,
            generating: false,
            debounce_count: 0,
            debounce_deadline: None,
            recent_pastes: Vec::new(),
        }
    }

    pub fn set_ai_capable(&mut self, ai_capable: bool) {
        self.ai_capable = ai_capable;
    }

    pub fn is_generating(&self) -> bool {
        self.generating
    }

    /// Pending debounce timer, if any.
    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.debounce_deadline
    }

    /// Applies one text-change notification and returns how it was read.
    pub fn on_text_change(
        &mut self,
        document: &DocumentRef,
        changes: &[ContentChange],
        now: DateTime<Utc>,
    ) -> ChangeShape {
        let shape = classify_change(document, changes);
        match shape {
            ChangeShape::ChatSurface => self.force_on(),
            ChangeShape::PossibleAiInsert => {
                self.recent_pastes.push(now);
                if self.recently_pasted(now) && self.ai_capable {
                    self.force_on();
                }
            }
            ChangeShape::HumanTyping => {
                self.recent_pastes.clear();
                if self.generating {
                    self.debounce_count += 1;
                    self.debounce_deadline = Some(now + Duration::milliseconds(AI_DEBOUNCE_MS));
                }
            }
            ChangeShape::Other => {
                if self.generating {
                    self.debounce_count = 0;
                    self.debounce_deadline = None;
                }
            }
        }
        shape
    }

    /// Fires the debounce timer once its deadline has passed.
    pub fn poll(&mut self, now: DateTime<Utc>) {
        match self.debounce_deadline {
            Some(deadline) if deadline <= now => {
                self.debounce_deadline = None;
                if self.debounce_count > 1 {
                    tracing::debug!(count = self.debounce_count, "AI generation ended");
                    self.generating = false;
                }
            }
            _ => {}
        }
    }

    /// Switches AI state on from a signal outside text edits (chat panel focus).
    pub fn mark_generating(&mut self) {
        self.generating = true;
    }

    /// Switches AI state off (debug session or build started).
    pub fn clear(&mut self) {
        self.generating = false;
        self.debounce_count = 0;
        self.debounce_deadline = None;
    }

    fn force_on(&mut self) {
        if !self.generating {
            tracing::debug!("AI generation detected");
        }
        self.generating = true;
        self.debounce_count = 0;
        self.debounce_deadline = None;
    }

    fn recently_pasted(&mut self, now: DateTime<Utc>) -> bool {
        let window = Duration::milliseconds(AI_RECENT_PASTES_MS);
        self.recent_pastes.retain(|at| *at + window >= now);
        self.recent_pastes.len() > AI_PASTE_BURST
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_doc() -> DocumentRef {
        DocumentRef {
            uri: "file:///a.ts".to_string(),
            scheme: "file".to_string(),
        }
    }

    fn chat_doc() -> DocumentRef {
        DocumentRef {
            uri: "vscode-chat-code-block://1".to_string(),
            scheme: "vscode-chat-code-block".to_string(),
        }
    }

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn ms(n: i64) -> Duration {
        Duration::milliseconds(n)
    }

    fn paste() -> Vec<ContentChange> {
        vec![ContentChange::insert("fn main() {}")]
    }

    fn key() -> Vec<ContentChange> {
        vec![ContentChange::insert("x")]
    }

    #[test]
    fn test_classify_shapes() {
        let doc = file_doc();
        assert_eq!(classify_change(&chat_doc(), &key()), ChangeShape::ChatSurface);
        assert_eq!(classify_change(&doc, &paste()), ChangeShape::PossibleAiInsert);
        assert_eq!(classify_change(&doc, &key()), ChangeShape::HumanTyping);
        assert_eq!(
            classify_change(&doc, &[ContentChange::delete(1)]),
            ChangeShape::HumanTyping
        );
        assert_eq!(
            classify_change(&doc, &[ContentChange::insert("\n")]),
            ChangeShape::Other
        );
        assert_eq!(
            classify_change(&doc, &[ContentChange::insert("  ab  ")]),
            ChangeShape::Other
        );
        assert_eq!(
            classify_change(&doc, &[ContentChange::insert("a"), ContentChange::insert("b")]),
            ChangeShape::Other
        );
        assert_eq!(classify_change(&doc, &[]), ChangeShape::Other);
    }

    #[test]
    fn test_chat_surface_forces_on() {
        let mut classifier = AuthorshipClassifier::new(false);
        classifier.on_text_change(&chat_doc(), &key(), t0());
        assert!(classifier.is_generating());
    }

    #[test]
    fn test_four_pastes_within_window_turn_on() {
        let mut classifier = AuthorshipClassifier::new(true);
        for i in 0..3 {
            classifier.on_text_change(&file_doc(), &paste(), t0() + ms(i * 100));
            assert!(!classifier.is_generating());
        }
        classifier.on_text_change(&file_doc(), &paste(), t0() + ms(300));
        assert!(classifier.is_generating());
    }

    #[test]
    fn test_spread_out_pastes_stay_off() {
        let mut classifier = AuthorshipClassifier::new(true);
        for i in 0..6 {
            classifier.on_text_change(&file_doc(), &paste(), t0() + ms(i * 300));
        }
        assert!(!classifier.is_generating());
    }

    #[test]
    fn test_pastes_need_ai_capable_host() {
        let mut classifier = AuthorshipClassifier::new(false);
        for i in 0..6 {
            classifier.on_text_change(&file_doc(), &paste(), t0() + ms(i * 10));
        }
        assert!(!classifier.is_generating());
    }

    #[test]
    fn test_human_keystroke_clears_paste_ring() {
        let mut classifier = AuthorshipClassifier::new(true);
        for i in 0..3 {
            classifier.on_text_change(&file_doc(), &paste(), t0() + ms(i * 10));
        }
        classifier.on_text_change(&file_doc(), &key(), t0() + ms(40));
        classifier.on_text_change(&file_doc(), &paste(), t0() + ms(50));
        assert!(!classifier.is_generating());
    }

    #[test]
    fn test_single_keystroke_does_not_clear() {
        let mut classifier = AuthorshipClassifier::new(false);
        classifier.on_text_change(&chat_doc(), &key(), t0());
        classifier.on_text_change(&file_doc(), &key(), t0() + ms(10));
        assert_eq!(classifier.deadline(), Some(t0() + ms(1010)));

        classifier.poll(t0() + ms(1010));
        assert!(classifier.is_generating());
        assert!(classifier.deadline().is_none());
    }

    #[test]
    fn test_two_keystrokes_clear_after_timer() {
        let mut classifier = AuthorshipClassifier::new(false);
        classifier.on_text_change(&chat_doc(), &key(), t0());
        classifier.on_text_change(&file_doc(), &key(), t0() + ms(10));
        classifier.on_text_change(&file_doc(), &key(), t0() + ms(20));

        classifier.poll(t0() + ms(1019));
        assert!(classifier.is_generating(), "timer restarted by second keystroke");

        classifier.poll(t0() + ms(1020));
        assert!(!classifier.is_generating());
    }

    #[test]
    fn test_other_change_resets_counter_and_cancels_timer() {
        let mut classifier = AuthorshipClassifier::new(false);
        classifier.on_text_change(&chat_doc(), &key(), t0());
        classifier.on_text_change(&file_doc(), &key(), t0() + ms(10));
        classifier.on_text_change(&file_doc(), &[ContentChange::insert("\n")], t0() + ms(20));
        assert!(classifier.deadline().is_none());

        classifier.on_text_change(&file_doc(), &key(), t0() + ms(30));
        classifier.poll(t0() + ms(2000));
        assert!(classifier.is_generating(), "counter was reset to 0, one keystroke is not enough");
    }

    #[test]
    fn test_keystrokes_while_off_schedule_nothing() {
        let mut classifier = AuthorshipClassifier::new(true);
        classifier.on_text_change(&file_doc(), &key(), t0());
        assert!(classifier.deadline().is_none());
    }
}
