//! Interactive prompts.
//!
//! The lifecycle asks questions through [`Prompter`]; the CLI answers them with
//! `inquire`, tests with [`ScriptedPrompter`].

use std::collections::VecDeque;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("prompt cancelled")]
    Cancelled,
    #[error("prompt failed: {0}")]
    Failed(String),
    #[error("no options to choose from: {0}")]
    NoOptions(String),
}

/// One entry of a single-select prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectOption {
    pub label: String,
    pub value: String,
}

impl SelectOption {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }
}

impl std::fmt::Display for SelectOption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.label)
    }
}

pub trait Prompter: Send + Sync {
    /// Pick one option; returns its `value`. `default` is a value to preselect.
    fn select(
        &self,
        message: &str,
        options: &[SelectOption],
        default: Option<&str>,
    ) -> Result<String, PromptError>;

    /// Free text; empty input yields `default` when given
    fn input(&self, message: &str, default: Option<&str>) -> Result<String, PromptError>;

    fn confirm(&self, message: &str, default: bool) -> Result<bool, PromptError>;
}

/// Terminal prompts
#[derive(Debug, Default, Clone, Copy)]
pub struct InquirePrompter;

fn map_inquire(err: inquire::InquireError) -> PromptError {
    match err {
        inquire::InquireError::OperationCanceled | inquire::InquireError::OperationInterrupted => {
            PromptError::Cancelled
        }
        other => PromptError::Failed(other.to_string()),
    }
}

impl Prompter for InquirePrompter {
    fn select(
        &self,
        message: &str,
        options: &[SelectOption],
        default: Option<&str>,
    ) -> Result<String, PromptError> {
        if options.is_empty() {
            return Err(PromptError::NoOptions(message.to_string()));
        }

        let start = default
            .and_then(|d| options.iter().position(|o| o.value == d))
            .unwrap_or(0);

        inquire::Select::new(message, options.to_vec())
            .with_starting_cursor(start)
            .prompt()
            .map(|choice| choice.value)
            .map_err(map_inquire)
    }

    fn input(&self, message: &str, default: Option<&str>) -> Result<String, PromptError> {
        let mut prompt = inquire::Text::new(message);
        if let Some(default) = default {
            prompt = prompt.with_default(default);
        }
        prompt.prompt().map_err(map_inquire)
    }

    fn confirm(&self, message: &str, default: bool) -> Result<bool, PromptError> {
        inquire::Confirm::new(message)
            .with_default(default)
            .prompt()
            .map_err(map_inquire)
    }
}

/// Answers prompts from a fixed queue, in order.
///
/// When the queue runs dry every prompt takes its default (or the first option).
/// Select answers may name either an option's value or its label.
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    answers: Mutex<VecDeque<String>>,
    asked: Mutex<Vec<String>>,
}

impl ScriptedPrompter {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: Mutex::new(answers.into_iter().map(Into::into).collect()),
            asked: Mutex::new(Vec::new()),
        }
    }

    /// Messages of every prompt shown so far
    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().map(|a| a.clone()).unwrap_or_default()
    }

    fn next(&self, message: &str) -> Result<Option<String>, PromptError> {
        self.asked
            .lock()
            .map_err(|_| PromptError::Failed("lock poisoned".to_string()))?
            .push(message.to_string());
        Ok(self
            .answers
            .lock()
            .map_err(|_| PromptError::Failed("lock poisoned".to_string()))?
            .pop_front())
    }
}

impl Prompter for ScriptedPrompter {
    fn select(
        &self,
        message: &str,
        options: &[SelectOption],
        default: Option<&str>,
    ) -> Result<String, PromptError> {
        if options.is_empty() {
            return Err(PromptError::NoOptions(message.to_string()));
        }

        match self.next(message)? {
            Some(answer) => options
                .iter()
                .find(|o| o.value == answer || o.label == answer)
                .map(|o| o.value.clone())
                .ok_or_else(|| {
                    PromptError::Failed(format!("'{}' is not an option of '{}'", answer, message))
                }),
            None => Ok(default
                .and_then(|d| options.iter().find(|o| o.value == d))
                .unwrap_or(&options[0])
                .value
                .clone()),
        }
    }

    fn input(&self, message: &str, default: Option<&str>) -> Result<String, PromptError> {
        let answer = self.next(message)?.unwrap_or_default();
        if answer.is_empty() {
            Ok(default.unwrap_or_default().to_string())
        } else {
            Ok(answer)
        }
    }

    fn confirm(&self, message: &str, default: bool) -> Result<bool, PromptError> {
        match self.next(message)?.as_deref().map(str::trim) {
            Some("y" | "yes" | "true") => Ok(true),
            Some("n" | "no" | "false") => Ok(false),
            Some("") | None => Ok(default),
            Some(other) => Err(PromptError::Failed(format!(
                "'{}' is not a yes/no answer",
                other
            ))),
        }
    }
}
