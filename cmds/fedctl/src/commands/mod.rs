pub mod get;

pub mod util;
