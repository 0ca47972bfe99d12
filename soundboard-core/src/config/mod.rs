//! Settings boundary: types, validation, and loading.

mod loader;
mod types;
mod validator;

pub use loader::SettingsLoader;
pub use types::*;
pub use validator::SettingsValidator;
