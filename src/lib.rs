// src/lib.rs - Library interface for the object verification engine

pub mod attributes;
pub mod boundary;
pub mod cluster;
pub mod config;
pub mod errors;
pub mod field;
pub mod hull;
pub mod image_io;
pub mod intensity;
pub mod interest;
pub mod interest_fn;
pub mod labeling;
pub mod matching;
pub mod merge;
pub mod output;
pub mod pipeline;
pub mod polyline;
pub mod preprocess;
pub mod union_find;

// Re-export commonly used types and functions
pub use errors::{ModeError, Result};
pub use config::{FuzzyConfig, IntensityStat, MatchFlag, MergeFlag, ThreshOp, Threshold};
pub use field::{FieldTag, LabeledField, Mask, RawField, DEFAULT_BAD_DATA};
pub use pipeline::{run_mode, FieldObjects, ModeResult, ModeSummary};
pub use image_io::{load_field, save_label_image};

pub use attributes::{compute, compute_all, ObjectKind, SimpleObject};
pub use interest::{interest, ComparisonKind, InterestEngine, ObjectPair};
pub use labeling::label;
pub use preprocess::preprocess;
pub use merge::{merge_field, MergePartition};
pub use matching::{match_objects, MatchGraph};
pub use cluster::{build_clusters, Cluster, ClusterPair, ClusterSet};
