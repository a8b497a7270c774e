mod discover;
mod reference;

pub use discover::{discover_input_images, list_matching, matches_pattern};
pub use reference::{
    read_reference_list, resolve_reference_set, rewrite_reference_list, select_references,
    select_wcs_reference, write_reference_list, ListRewrite, ReferenceSelection, ReferenceSet,
};
