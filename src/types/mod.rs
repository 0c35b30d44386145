pub mod decision;
pub mod features;
pub mod market_data;
pub mod plan;
pub mod trade;

pub use decision::*;
pub use features::*;
pub use market_data::*;
pub use plan::*;
pub use trade::*;
