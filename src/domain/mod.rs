pub mod error;
pub mod registry;
pub mod shortcut;
pub mod value;

pub use error::*;
pub use registry::*;
pub use shortcut::*;
pub use value::{RawValue, RegistryValue};
