pub mod advisor;
pub mod backend;
mod busy;
pub mod composer;
pub mod config;
pub mod error;
pub mod generation;
pub mod history;
pub mod imaging;
pub mod session;
pub mod studio;
#[cfg(test)]
mod testing;
pub mod toast;
pub mod video;

pub use advisor::{Chip, Resolution, SuggestionContext};
pub use backend::{build_backend, GenerativeBackend, ProgressSink};
pub use config::{BackendKind, StudioConfig};
pub use error::{InputError, StudioError, StudioResult};
pub use generation::{GenerationOutcome, GenerationStatus};
pub use session::{Mode, PromptSlot, Session, VideoFrame};
pub use studio::{CustomKind, ReuseTarget, Studio};
pub use toast::{Severity, ToastCenter};
