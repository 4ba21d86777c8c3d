//! The capture-to-delivery flow as one explicit state object.
//!
//! ```text
//! start ─▶ capture ─▶ document type ─▶ variations ─▶ delivery ─▶ done
//! ```
//!
//! A [`FlowCoordinator`] owns the [`FlowState`] and writes it to a
//! [`FlowStore`] at each transition, so an interrupted session resumes at
//! the step it left.

use crate::capture::CapturedImage;
use crate::job::VariationResult;
use crate::postprocess::DocumentType;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FlowError {
    #[error("flow state I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("flow state is not valid JSON: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("no variation has been selected")]
    NoSelection,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowStep {
    #[default]
    Start,
    Capture,
    DocumentType,
    Variations,
    Delivery,
    Done,
}

impl FlowStep {
    /// The step a "back" action leads to.
    pub fn previous(&self) -> Self {
        match self {
            Self::Start | Self::Capture => Self::Start,
            Self::DocumentType => Self::Capture,
            Self::Variations => Self::DocumentType,
            Self::Delivery | Self::Done => Self::Variations,
        }
    }
}

/// Everything the flow carries between steps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowState {
    pub step: FlowStep,
    pub document_type: Option<DocumentType>,
    pub captured_photo: Option<CapturedImage>,
    pub selected_variation: Option<u32>,
    pub selected_result: Option<VariationResult>,
    pub wants_print: bool,
    pub delivery_address: String,
    pub demo_mode: bool,
}

/// Outcome of entering a step that needs earlier steps' data.
#[derive(Debug, Clone, PartialEq)]
pub enum StepEntry<T> {
    Ready(T),
    /// Required data is missing; go to this step instead.
    Redirect(FlowStep),
}

/// What the variations step needs.
#[derive(Debug, Clone, PartialEq)]
pub struct VariationsInput {
    pub document_type: DocumentType,
    pub photo: CapturedImage,
    pub demo_mode: bool,
}

/// The order handed to the order store on confirmation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryOrder {
    pub photo_type: String,
    pub variation_id: u32,
    pub filename: String,
    pub mime_type: String,
    #[serde(with = "crate::data_url::serde_base64")]
    pub image: Vec<u8>,
    pub wants_print: bool,
    pub delivery_address: Option<String>,
}

/// Durable key-value home of the flow state.
pub trait FlowStore: Send {
    fn load(&self) -> Result<Option<FlowState>, FlowError>;
    fn save(&mut self, state: &FlowState) -> Result<(), FlowError>;
    fn clear(&mut self) -> Result<(), FlowError>;
}

/// Stores the state as a JSON file, replaced atomically on each save.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FlowStore for JsonFileStore {
    fn load(&self) -> Result<Option<FlowState>, FlowError> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => Ok(Some(serde_json::from_str(&text)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&mut self, state: &FlowState) -> Result<(), FlowError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, serde_json::to_vec(state)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn clear(&mut self) -> Result<(), FlowError> {
        match std::fs::remove_file(&self.path) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

/// In-process store, for tests and one-shot runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Option<FlowState>,
    saves: usize,
}

impl MemoryStore {
    pub fn saves(&self) -> usize {
        self.saves
    }
}

impl FlowStore for MemoryStore {
    fn load(&self) -> Result<Option<FlowState>, FlowError> {
        Ok(self.state.clone())
    }

    fn save(&mut self, state: &FlowState) -> Result<(), FlowError> {
        self.state = Some(state.clone());
        self.saves += 1;
        Ok(())
    }

    fn clear(&mut self) -> Result<(), FlowError> {
        self.state = None;
        Ok(())
    }
}

/// Single owner of the flow state.
pub struct FlowCoordinator<S: FlowStore> {
    state: FlowState,
    store: S,
}

impl<S: FlowStore> FlowCoordinator<S> {
    /// Resumes from the store, or starts fresh if it holds nothing.
    pub fn resume(store: S) -> Result<Self, FlowError> {
        let state = store.load()?.unwrap_or_default();
        tracing::debug!(step = ?state.step, "Flow resumed");
        Ok(Self { state, store })
    }

    pub fn state(&self) -> &FlowState {
        &self.state
    }

    pub fn step(&self) -> FlowStep {
        self.state.step
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn transition(&mut self, step: FlowStep) -> Result<(), FlowError> {
        tracing::info!(from = ?self.state.step, to = ?step, "Flow step");
        self.state.step = step;
        self.store.save(&self.state)
    }

    pub fn start(&mut self, demo_mode: bool) -> Result<(), FlowError> {
        self.state.demo_mode = demo_mode;
        self.transition(FlowStep::Capture)
    }

    pub fn photo_captured(&mut self, photo: CapturedImage) -> Result<(), FlowError> {
        self.state.captured_photo = Some(photo);
        self.state.selected_variation = None;
        self.state.selected_result = None;
        self.transition(FlowStep::DocumentType)
    }

    pub fn choose_document(&mut self, document_type: DocumentType) -> Result<(), FlowError> {
        self.state.document_type = Some(document_type);
        self.transition(FlowStep::Variations)
    }

    /// Checks the variations step has a document type and a photo.
    pub fn enter_variations(&mut self) -> Result<StepEntry<VariationsInput>, FlowError> {
        match (&self.state.document_type, &self.state.captured_photo) {
            (Some(document_type), Some(photo)) => Ok(StepEntry::Ready(VariationsInput {
                document_type: *document_type,
                photo: photo.clone(),
                demo_mode: self.state.demo_mode,
            })),
            _ => {
                tracing::warn!("Variations step entered without document type or photo");
                self.transition(FlowStep::Capture)?;
                Ok(StepEntry::Redirect(FlowStep::Capture))
            }
        }
    }

    pub fn select_variation(&mut self, result: VariationResult) -> Result<(), FlowError> {
        self.state.selected_variation = Some(result.variation_id);
        self.state.selected_result = Some(result);
        self.transition(FlowStep::Delivery)
    }

    /// Checks a variation has been selected before delivery.
    pub fn enter_delivery(&mut self) -> Result<StepEntry<u32>, FlowError> {
        match self.state.selected_variation {
            Some(id) => Ok(StepEntry::Ready(id)),
            None => {
                self.transition(FlowStep::Variations)?;
                Ok(StepEntry::Redirect(FlowStep::Variations))
            }
        }
    }

    /// Delivery form edits. Persisted with the next transition.
    pub fn set_delivery(&mut self, wants_print: bool, address: impl Into<String>) {
        self.state.wants_print = wants_print;
        self.state.delivery_address = address.into();
    }

    pub fn back(&mut self) -> Result<FlowStep, FlowError> {
        let previous = self.state.step.previous();
        self.transition(previous)?;
        Ok(previous)
    }

    /// Finishes the flow and returns the order to record.
    pub fn confirm(&mut self) -> Result<DeliveryOrder, FlowError> {
        let result = self.state.selected_result.as_ref().ok_or(FlowError::NoSelection)?;
        let photo_type = if result.photo_type.is_empty() {
            self.state
                .document_type
                .map(|d| d.photo_type().to_string())
                .unwrap_or_else(|| "unknown".to_string())
        } else {
            result.photo_type.clone()
        };
        let address = self.state.delivery_address.trim();

        let order = DeliveryOrder {
            photo_type,
            variation_id: result.variation_id,
            filename: result.filename.clone(),
            mime_type: result.mime_type.clone(),
            image: result.image.clone(),
            wants_print: self.state.wants_print,
            delivery_address: (!address.is_empty()).then(|| address.to_string()),
        };
        self.transition(FlowStep::Done)?;
        Ok(order)
    }

    /// Drops all state, in memory and in the store.
    pub fn reset(&mut self) -> Result<(), FlowError> {
        self.state = FlowState::default();
        self.store.clear()
    }
}
