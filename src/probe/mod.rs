pub mod interface;
pub mod socket;

pub use interface::*;
pub use socket::*;
