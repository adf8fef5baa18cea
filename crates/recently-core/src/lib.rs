mod address;
mod model;

pub use address::{extract_address, normalize_sender};
pub use model::*;
