mod credentials;
mod sessions;
mod traits;
mod types;

pub use credentials::*;
pub use sessions::*;
pub use traits::*;
pub use types::*;
