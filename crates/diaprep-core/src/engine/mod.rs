//! Boundary to the external difference-imaging engine.

mod external;
pub mod params;

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use external::ExternalEngine;
pub use params::{EngineParams, FlagValue};

/// Which build of the engine to run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineVariant {
    Cpu,
    Gpu,
}

impl EngineVariant {
    pub fn from_gpu_flag(use_gpu: bool) -> Self {
        if use_gpu {
            Self::Gpu
        } else {
            Self::Cpu
        }
    }
}

impl fmt::Display for EngineVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => write!(f, "CPU"),
            Self::Gpu => write!(f, "GPU"),
        }
    }
}

/// A program plus its leading arguments.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// Python running the pyDIA bootstrap against `module`.
    pub fn pydia(module: &str) -> Self {
        Self::new("python3", &["-c", PYDIA_BOOTSTRAP, module])
    }
}

impl fmt::Display for CommandSpec {
    /// Inline `-c` scripts are shown as `<script>`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        let mut inline_script = false;
        for arg in &self.args {
            if inline_script {
                write!(f, " <script>")?;
            } else {
                write!(f, " {arg}")?;
            }
            inline_script = arg == "-c";
        }
        Ok(())
    }
}

/// Builds pyDIA parameters from `--key=value` flags and calls
/// `imsub_all_fits` of the module named by the first argument.
/// Values are typed like the engine's own command line: int, True/False,
/// float, None, then string.
pub const PYDIA_BOOTSTRAP: &str = r#"import sys, importlib
from pydia import data_structures as DS

def typed(raw):
    if '.' not in raw:
        try:
            return int(raw)
        except ValueError:
            pass
    if raw in ('True', 'False'):
        return raw == 'True'
    try:
        return float(raw)
    except ValueError:
        pass
    return None if raw == 'None' else raw

params = DS.Parameters()
for flag in sys.argv[2:]:
    key, _, raw = flag.lstrip('-').partition('=')
    setattr(params, key, typed(raw))
importlib.import_module(sys.argv[1]).imsub_all_fits(params)
"#;

/// Command used for each engine variant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineCommands {
    pub cpu: CommandSpec,
    pub gpu: CommandSpec,
}

impl Default for EngineCommands {
    fn default() -> Self {
        Self {
            cpu: CommandSpec::pydia("pydia.DIA_CPU"),
            gpu: CommandSpec::pydia("pydia.DIA_GPU"),
        }
    }
}

impl EngineCommands {
    pub fn for_variant(&self, variant: EngineVariant) -> &CommandSpec {
        match variant {
            EngineVariant::Cpu => &self.cpu,
            EngineVariant::Gpu => &self.gpu,
        }
    }
}

/// Everything the engine needs for one subtraction pass.
#[derive(Clone, Debug)]
pub struct EngineRequest {
    /// Directory of (normally trimmed) images to subtract.
    pub loc_data: PathBuf,
    pub loc_output: PathBuf,
    pub name_pattern: String,
    pub ref_image_list: Option<PathBuf>,
    pub min_ref_images: u32,
    pub params: EngineParams,
}

impl EngineRequest {
    /// Flags in the engine's own vocabulary.
    pub fn to_args(&self) -> Result<Vec<String>> {
        let mut args = vec![
            format!("--loc_data={}", self.loc_data.display()),
            format!("--loc_output={}", self.loc_output.display()),
            format!("--name_pattern={}", self.name_pattern),
            format!("--min_ref_images={}", self.min_ref_images),
        ];
        if let Some(ref list) = self.ref_image_list {
            args.push(format!("--ref_image_list={}", list.display()));
        }
        args.extend(self.params.to_flags()?);
        Ok(args)
    }
}

/// A difference-imaging engine.
///
/// Implementations write `d_*` difference images into `request.loc_output`.
pub trait DiffEngine: Send + Sync {
    fn name(&self) -> &str;

    fn variant(&self) -> EngineVariant;

    fn subtract(&self, request: &EngineRequest) -> Result<()>;
}

/// Engine for the variant chosen by `use_gpu`.
pub fn create_engine(commands: &EngineCommands, use_gpu: bool) -> Box<dyn DiffEngine> {
    let variant = EngineVariant::from_gpu_flag(use_gpu);
    Box::new(ExternalEngine::new(variant, commands.for_variant(variant).clone()))
}
