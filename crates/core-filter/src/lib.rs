//! The abstract processing node of the filter graph: parameters,
//! capability masks, refresh, and serialization.

mod abort;
mod error;
mod filter;
mod progress;
mod property;
mod selection;

pub use abort::AbortFlag;
pub use error::{FilterError, InvalidParameter};
pub use filter::{Filter, FilterKind, PropertySetOutcome};
pub use progress::ProgressData;
pub use property::{parse_colour, FilterPropGroup, FilterProperty, PropertyType};
pub use selection::{InteractionMode, ModifierMask, MouseButtonMask, SelectionBinding, SelectionDevice};
