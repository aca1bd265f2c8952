pub mod helpers;
pub mod local_link;

pub use helpers::*;
pub use local_link::{Direction, LinkConditions, LocalLink, LocalWire};
