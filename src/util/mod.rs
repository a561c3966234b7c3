mod offset;
mod ref_id;

pub use offset::*;
pub use ref_id::*;
