// src/assignment.rs

//! Resolution of a teacher's subject/topic write on a group.

use crate::error::AppError;

/// A topic together with the subject it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopicRef {
    pub id: i64,
    pub subject_id: i64,
}

/// Subject/topic pair of an assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Target {
    pub subject: Option<i64>,
    pub topic: Option<TopicRef>,
}

impl Target {
    pub fn is_empty(&self) -> bool {
        self.subject.is_none() && self.topic.is_none()
    }
}

/// Merges a write into the current assignment.
///
/// For `subject` and `topic`: `None` = not sent, `Some(None)` = sent as null.
/// * Nulling the subject without sending a topic also clears the topic.
/// * A topic needs a subject, and must belong to it.
/// * Changing only the subject drops a current topic from another subject.
pub fn resolve(
    current: Target,
    subject: Option<Option<i64>>,
    topic: Option<Option<TopicRef>>,
) -> Result<Target, AppError> {
    let subject_provided = subject.is_some();
    let topic_provided = topic.is_some();

    let new_subject = subject.unwrap_or(current.subject);
    let mut new_topic = topic.unwrap_or(current.topic);

    if subject_provided && new_subject.is_none() && !topic_provided {
        new_topic = None;
    }

    if new_subject.is_none() && new_topic.is_some() {
        return Err(AppError::field(
            "subject",
            "Subject is required when topic is set.",
        ));
    }

    if let (Some(subject_id), Some(t)) = (new_subject, new_topic) {
        if t.subject_id != subject_id {
            if topic_provided {
                return Err(AppError::field(
                    "topic",
                    "Topic must belong to the selected subject.",
                ));
            }
            // Only the subject moved: the old topic no longer fits.
            new_topic = None;
        }
    }

    Ok(Target {
        subject: new_subject,
        topic: new_topic,
    })
}
