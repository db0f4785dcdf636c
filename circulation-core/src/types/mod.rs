mod loan;
mod primitives;
mod reservation;

pub use loan::*;
pub use primitives::*;
pub use reservation::*;
