pub mod resolution;
pub mod rule;
pub mod value;

pub use resolution::*;
pub use rule::*;
pub use value::*;
