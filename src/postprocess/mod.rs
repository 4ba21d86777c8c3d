//! Print preparation for generated variations.
//!
//! Each variation is center-cropped to the document's aspect ratio,
//! resampled to its size at 300 DPI and re-encoded as PNG with a `pHYs`
//! chunk so print software renders it at the correct physical size.
//!
//! ```text
//! generated image ──▶ crop + upscale ──▶ PNG encode ──▶ pHYs splice ──▶ print-ready
//! ```

mod aspect;
mod png;
mod queue;
mod spec;

pub use aspect::{AspectPostProcessor, CropPlan, PostProcessError, Processed, PNG_MIME};
pub use png::{
    build_chunk, crc32, read_density, set_density, Chunk, ChunkError, ChunkReader,
    PhysicalDensity,
};
pub use queue::{PostProcessQueue, PostProcessedResult};
pub use spec::{spec_for, DocumentType, PhotoSpec, UnknownDocumentType, TARGET_DPI};
