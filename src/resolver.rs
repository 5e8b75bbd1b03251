//! Dual-path stage resolution.
//!
//! Every pipeline stage resolves its output the same way:
//!
//! 1. **Model path**: if a [`Model`] is configured, build the stage prompt,
//!    call the model, and parse the reply into the stage's typed output.
//! 2. **Heuristic path**: otherwise, or when the call fails or the reply
//!    does not parse into anything useful, run the stage's deterministic
//!    heuristic, which always yields a well-formed value.
//!
//! The reason for every fallback is kept as a typed [`StageError`] on the
//! [`Resolved`] value and logged.

use serde::de::DeserializeOwned;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use thiserror::Error;

use crate::model::{extract_json, CallOptions, Model, ModelError};
use crate::models::{ResolutionPath, StageReport};

/// Why a stage did not use its model path.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StageError {
    #[error("no model configured")]
    NoModel,
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("model panicked: {0}")]
    ModelPanicked(String),
    #[error("unparseable model output: {0}")]
    Parse(String),
    #[error("model output was empty")]
    Empty,
}

/// A stage output plus how it was obtained.
#[derive(Debug, Clone)]
pub struct Resolved<T> {
    pub value: T,
    pub path: ResolutionPath,
    /// Set whenever `path` is [`ResolutionPath::Heuristic`].
    pub fallback: Option<StageError>,
}

impl<T> Resolved<T> {
    pub fn from_model(value: T) -> Self {
        Self {
            value,
            path: ResolutionPath::Model,
            fallback: None,
        }
    }

    pub fn from_heuristic(value: T, reason: StageError) -> Self {
        Self {
            value,
            path: ResolutionPath::Heuristic,
            fallback: Some(reason),
        }
    }

    pub fn report(&self, stage: &str) -> StageReport {
        StageReport {
            stage: stage.to_string(),
            path: self.path,
            fallback_reason: self.fallback.as_ref().map(|e| e.to_string()),
        }
    }
}

/// Runs the model path of one stage and falls back to its heuristic.
#[derive(Clone, Copy)]
pub struct Resolver<'a> {
    stage: &'static str,
    model: Option<&'a dyn Model>,
}

impl<'a> Resolver<'a> {
    pub fn new(stage: &'static str, model: Option<&'a dyn Model>) -> Self {
        Self { stage, model }
    }

    /// Resolve a value, preferring the model and guaranteeing a result.
    ///
    /// `prompt` is only evaluated when a model is present.
    pub fn resolve<T>(
        &self,
        opts: &CallOptions,
        prompt: impl FnOnce() -> String,
        parse: impl FnOnce(&str) -> Result<T, StageError>,
        heuristic: impl FnOnce() -> T,
    ) -> Resolved<T> {
        match self.attempt(opts, prompt, parse) {
            Ok(value) => Resolved::from_model(value),
            Err(reason) => Resolved::from_heuristic(heuristic(), reason),
        }
    }

    /// Model path only. Failures are logged and returned; a panic inside the
    /// model call is caught and reported as [`StageError::ModelPanicked`].
    pub fn attempt<T>(
        &self,
        opts: &CallOptions,
        prompt: impl FnOnce() -> String,
        parse: impl FnOnce(&str) -> Result<T, StageError>,
    ) -> Result<T, StageError> {
        let outcome = match self.model {
            None => Err(StageError::NoModel),
            Some(model) => {
                let prompt = prompt();
                match catch_unwind(AssertUnwindSafe(|| model.complete(&prompt, opts))) {
                    Ok(reply) => reply.map_err(StageError::from).and_then(|reply| parse(&reply)),
                    Err(payload) => Err(StageError::ModelPanicked(panic_message(payload.as_ref()))),
                }
            }
        };

        match &outcome {
            Err(StageError::NoModel) => {}
            Err(e) => {
                tracing::warn!(stage = self.stage, error = %e, "model path failed; using heuristic");
            }
            Ok(_) => {
                tracing::debug!(stage = self.stage, "resolved by model");
            }
        }
        outcome
    }
}

/// Text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unexpected failure".to_string()
    }
}

/// Parse a model reply as JSON of type `T`.
///
/// Code fences and surrounding prose are stripped first; anything that does
/// not deserialize exactly into `T` is a [`StageError::Parse`].
pub fn parse_payload<T: DeserializeOwned>(reply: &str) -> Result<T, StageError> {
    let payload = extract_json(reply);
    if payload.is_empty() {
        return Err(StageError::Empty);
    }
    serde_json::from_str(&payload).map_err(|e| StageError::Parse(e.to_string()))
}
