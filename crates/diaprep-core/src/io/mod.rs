pub mod fits;
pub mod fits_writer;
pub mod header;

pub use fits::{read_fits, read_fits_header, FitsImage};
pub use fits_writer::{update_header_in_place, write_fits};
pub use header::{Card, CardValue, FitsHeader};
