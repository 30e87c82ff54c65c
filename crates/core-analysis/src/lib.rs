//! `AnalysisState`: the top-level owner of a `TreeState` plus everything a
//! saved session carries alongside it — cameras, stashed subtrees, effects,
//! background, plot visibility, animation — and the state-file XML format
//! that round-trips all of it.

mod animation;
mod camera;
mod effect;
mod error;
mod modify_level;
mod state;
mod xml;

pub use animation::{AnimationKeyframe, AnimationRecord};
pub use camera::Camera;
pub use effect::Effect;
pub use error::{StateLoadError, StateSaveError};
pub use modify_level::ModifyLevel;
pub use state::{AnalysisError, AnalysisState};
pub use xml::{load_state, save_state, FilterRegistry};
