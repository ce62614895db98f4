pub use area::*;
pub use coordinate::*;
pub use poi::*;
pub use position::*;
pub use route::*;

mod area;
mod coordinate;
mod poi;
mod position;
mod route;
