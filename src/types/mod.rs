// ABOUTME: Type-safe identifiers and validated domain types.
// ABOUTME: Uses phantom types to prevent handle confusion at compile time.

mod id;
mod image_ref;
pub mod quantity;
mod resource_name;

pub use id::{ContainerId, Id, ReleaseName};
pub use image_ref::{ImageRef, ParseImageRefError};
pub use quantity::QuantityError;
pub use resource_name::{ResourceName, ResourceNameError};
