pub mod artifact;
pub mod cache;
pub mod chain;
pub mod config;
pub mod error;
pub mod landmarks;
pub mod output;
pub mod pipeline;
pub mod plan;
pub mod progress;
pub mod template;
pub mod toolbox;
pub mod validation;
pub mod workspace;

pub use cache::{CacheKey, FingerprintCache, NoCache, SiblingCache, StraighteningCache};
pub use chain::{ChainBuilder, ComposedChains, StepTransform, TransformChain, Warp, WarpKind, WarpRef};
pub use config::{CachePolicy, Contrast, PipelineConfig, Reference};
pub use error::{RegistrationError, Result};
pub use landmarks::{estimate_landmark_affine, register_landmarks, LandmarkOutcome};
pub use output::PipelineOutputs;
pub use pipeline::Pipeline;
pub use plan::{RegistrationPlan, RegistrationStep, StepOverride, StepType};
pub use progress::{LoggingObserver, PipelineObserver, PipelineStage, StageHistory};
pub use toolbox::{CommandToolbox, NativeToolbox, Toolbox};
