//! Feature Registry and leak-free feature extraction.
//!
//! - [`registry`]: loads and validates the declarative feature catalog
//! - [`window`]: lookback window grammar, resolved against each subject's cutoff
//! - [`aggregation`]: aggregation grammar and evaluation over windowed events
//! - [`extractor`]: the parallel, registry-driven extractor producing one row per subject

pub mod aggregation;
pub mod extractor;
pub mod registry;
pub mod window;

pub use self::{
    aggregation::Aggregation,
    extractor::{ExtractError, extract, extract_with_workers},
    registry::{
        Dtype, FeatureSpec, NullPolicy, Registry, RegistryError, SourceInfo, load_registry,
    },
    window::{ResolvedWindow, Window, WindowError},
};
