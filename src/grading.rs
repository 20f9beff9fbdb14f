// src/grading.rs

//! Question authoring rules and answer grading.

use std::collections::BTreeSet;

use crate::{
    error::AppError,
    models::question::{ChoiceInput, QuestionType},
};

/// Checks a full replacement set of choices for a question of the given type.
///
/// Every failure is reported on the `choices` field.
pub fn validate_choices(question_type: QuestionType, choices: &[ChoiceInput]) -> Result<(), AppError> {
    if choices.is_empty() {
        return Err(AppError::field("choices", "At least one answer choice is required."));
    }

    for (idx, choice) in choices.iter().enumerate() {
        let text = choice.text.as_deref().unwrap_or("").trim();
        if text.is_empty() {
            return Err(AppError::field(
                "choices",
                format!("Choice #{} must have non-empty text.", idx + 1),
            ));
        }
    }

    if choices.len() < 2 {
        return Err(AppError::field("choices", "At least two answer choices are required."));
    }

    let correct_count = choices.iter().filter(|c| c.is_correct).count();
    match question_type {
        QuestionType::SingleChoice if correct_count != 1 => Err(AppError::field(
            "choices",
            "Single choice question must have exactly one correct choice.",
        )),
        QuestionType::MultipleChoice if correct_count < 1 => Err(AppError::field(
            "choices",
            "Multiple choice question must have at least one correct choice.",
        )),
        _ => Ok(()),
    }
}

/// Checks that a student's selection is admissible for the question.
///
/// `available` holds the ids of the question's own choices.
pub fn validate_selection(
    question_type: QuestionType,
    selected: &[i64],
    available: &[i64],
) -> Result<(), AppError> {
    if let Some(foreign) = selected.iter().find(|id| !available.contains(id)) {
        return Err(AppError::field(
            "selected_choices",
            format!("Choice {} does not belong to this question.", foreign),
        ));
    }

    let distinct: BTreeSet<i64> = selected.iter().copied().collect();
    if question_type == QuestionType::SingleChoice && distinct.len() > 1 {
        return Err(AppError::field(
            "selected_choices",
            "Single choice question accepts only one selected choice.",
        ));
    }

    Ok(())
}

/// An answer is correct when the selected set equals the correct set.
/// Order and duplicates in either list are irrelevant.
pub fn is_answer_correct(selected: &[i64], correct: &[i64]) -> bool {
    let selected: BTreeSet<i64> = selected.iter().copied().collect();
    let correct: BTreeSet<i64> = correct.iter().copied().collect();
    !correct.is_empty() && selected == correct
}
