//! vidlayer Timeline Model
//!
//! Defines the data contracts a render request is made of:
//! - **Overlays:** Typed text, image, and video overlay descriptors
//! - **Timeline:** The JSON wire format and its validation into descriptors
//! - **Assets:** The registry mapping uploaded asset keys to local files
//!
//! Positions are output pixel coordinates; times are seconds on the output
//! timeline.

pub mod assets;
pub mod overlay;
pub mod timeline;

pub use assets::*;
pub use overlay::*;
pub use timeline::*;
