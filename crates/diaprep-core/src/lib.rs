pub mod consts;
pub mod engine;
pub mod error;
pub mod io;
pub mod pipeline;
pub mod runlog;
pub mod select;
pub mod trim;
pub mod wcs;
