mod model;
mod propagate;

pub use model::Wcs;
pub use propagate::{propagate_wcs, resolve_wcs_source, PropagationReport, WcsSourceCandidates};
