pub mod index;
pub mod projector;
pub mod proximity;
pub mod recorder;
pub mod resolver;
pub mod store;
pub mod types;

pub use projector::RouteProjector;
pub use recorder::RouteRecorder;
pub use store::{load_recording, RouteFileError};
pub use types::{Coordinate, MarkerKind, RouteRecording};
