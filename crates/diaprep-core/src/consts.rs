/// Minimum pixel count (h*w) to use row-level Rayon parallelism when reprojecting.
pub const PARALLEL_PIXEL_THRESHOLD: usize = 65_536;

/// Default fraction of each axis trimmed off after reprojection.
pub const DEFAULT_TRIM_FRACTION: f64 = 0.4;

/// Default file-name pattern for input discovery.
pub const DEFAULT_NAME_PATTERN: &str = "*.fits";

/// Case-insensitive file-name marker for images with survey-grade astrometry.
pub const DEFAULT_ASTROMETRIC_MARKER: &str = "sdss";

/// Default input, trim and output directories (LCOGT layout).
pub const DEFAULT_INPUT_DIR: &str = "DIA_IN";
pub const DEFAULT_TRIM_DIR: &str = "DIA_TRIM";
pub const DEFAULT_OUTPUT_DIR: &str = "DIA_OUT";

/// Extension replaced when naming trimmed images.
pub const FITS_EXTENSION: &str = ".fits";

/// Suffix of registered-and-trimmed images.
pub const TRIM_SUFFIX: &str = "_trim.fits";

/// Subdirectory of the input directory holding the photometric reference set.
pub const REF_SUBDIR: &str = "REF";

/// Reference list file name used when none is configured.
pub const DEFAULT_REF_LIST_NAME: &str = "ref_image_list.txt";

/// Run log file name inside the output directory.
pub const RUN_LOG_FILE_NAME: &str = "pydia_run_log.log";

/// Name prefix of difference images written by the subtraction engine.
pub const DIFF_IMAGE_PREFIX: &str = "d_";

/// Number of trailing stderr lines kept when the engine fails.
pub const ENGINE_STDERR_TAIL_LINES: usize = 20;

/// Smallest CD-matrix determinant accepted as non-singular.
pub const WCS_SINGULAR_EPSILON: f64 = 1e-30;
