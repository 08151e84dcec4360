use clap::parser::ValueSource;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

use crate::viewer::CrossSection;

/// Default output suffix appended to the file prefix
pub const STORE_SUFFIX: &str = "_hlevs.zarr";
/// Upper bound on the number of target levels
pub const MAX_LEVELS: usize = 100_000;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid level specification '{expr}': {reason}")]
    InvalidLevels { expr: String, reason: String },

    #[error("Unknown interpolation variable '{0}' (expected geopotential_height or air_pressure)")]
    UnknownInterpVar(String),

    #[error("Missing required setting: {0}")]
    MissingSetting(&'static str),

    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },

    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Variables present as both 2-D and 3-D fields: {}", .0.join(", "))]
    NameCollision(Vec<String>),
}

/// Physical constants used by the diagnostics
#[derive(Clone, Debug, PartialEq)]
pub struct Constants {
    /// Gravitational acceleration (m s-2)
    pub g: f64,
    /// Gas constant for dry air (J kg-1 K-1)
    pub r_dry: f64,
    /// Specific heat of dry air at constant pressure (J kg-1 K-1)
    pub cp: f64,
    /// Ratio of the molecular weights of water and dry air
    pub epsilon: f64,
    /// Sphere radius of the WRF map projections (m)
    pub earth_radius: f64,
}

impl Default for Constants {
    fn default() -> Self {
        Self {
            g: 9.81,
            r_dry: 287.04749,
            cp: 1004.6662,
            epsilon: 0.62196,
            earth_radius: 6_370_000.0,
        }
    }
}

/// Vertical coordinate that the output levels refer to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum InterpVar {
    /// Height above sea level (m)
    #[default]
    GeopotentialHeight,
    /// Pressure (hPa)
    AirPressure,
}

impl InterpVar {
    pub fn as_str(&self) -> &'static str {
        match self {
            InterpVar::GeopotentialHeight => "geopotential_height",
            InterpVar::AirPressure => "air_pressure",
        }
    }

    /// Units the target levels are expressed in
    pub fn units(&self) -> &'static str {
        match self {
            InterpVar::GeopotentialHeight => "m",
            InterpVar::AirPressure => "hPa",
        }
    }
}

impl fmt::Display for InterpVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InterpVar {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "geopotential_height" => Ok(InterpVar::GeopotentialHeight),
            "air_pressure" => Ok(InterpVar::AirPressure),
            other => Err(ConfigError::UnknownInterpVar(other.to_string())),
        }
    }
}

/// Regularly spaced target levels with `arange` semantics:
/// `start + i * step` for every `i` whose value lies strictly before `stop`
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LevelSpec {
    pub start: f64,
    pub stop: f64,
    pub step: f64,
}

impl LevelSpec {
    pub fn new(start: f64, stop: f64, step: f64) -> Result<Self, String> {
        if !(start.is_finite() && stop.is_finite() && step.is_finite()) {
            return Err("bounds and step must be finite".to_string());
        }
        if step == 0.0 {
            return Err("step must not be zero".to_string());
        }
        let spec = Self { start, stop, step };
        match spec.len() {
            0 => Err("the range contains no levels".to_string()),
            n if n > MAX_LEVELS => Err(format!("{} levels exceed the limit of {}", n, MAX_LEVELS)),
            _ => Ok(spec),
        }
    }

    /// Parse `start:stop:step`, `start,stop,step` or the literal
    /// `np.arange(start, stop, step)`. Like `arange`, one value is a stop
    /// (start 0) and two values default the step to 1.
    pub fn parse(expr: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidLevels {
            expr: expr.to_string(),
            reason,
        };

        let trimmed = expr.trim();
        let inner = ["np.arange", "numpy.arange", "arange"]
            .iter()
            .find_map(|prefix| trimmed.strip_prefix(prefix))
            .map(|rest| {
                rest.trim()
                    .strip_prefix('(')
                    .and_then(|r| r.strip_suffix(')'))
                    .ok_or_else(|| invalid("expected arange(start, stop, step)".to_string()))
            })
            .transpose()?;

        let (body, separator) = match inner {
            Some(args) => (args, ','),
            None if trimmed.contains(':') => (trimmed, ':'),
            None => (trimmed, ','),
        };

        let numbers = body
            .split(separator)
            .map(|part| {
                let part = part.trim();
                part.parse::<f64>()
                    .map_err(|_| invalid(format!("'{}' is not a number", part)))
            })
            .collect::<Result<Vec<f64>, _>>()?;

        let (start, stop, step) = match numbers.as_slice() {
            [stop] => (0.0, *stop, 1.0),
            [start, stop] => (*start, *stop, 1.0),
            [start, stop, step] => (*start, *stop, *step),
            _ => return Err(invalid(format!("expected 1 to 3 values, got {}", numbers.len()))),
        };
        Self::new(start, stop, step).map_err(invalid)
    }

    pub fn len(&self) -> usize {
        let n = ((self.stop - self.start) / self.step).ceil();
        if n.is_finite() && n > 0.0 {
            n as usize
        } else {
            0
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn values(&self) -> Vec<f64> {
        (0..self.len())
            .map(|i| self.start + i as f64 * self.step)
            .collect()
    }
}

impl fmt::Display for LevelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.start, self.stop, self.step)
    }
}

/// Settings accepted in the optional YAML configuration file. Every key is
/// optional; command-line flags take precedence.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub wrf_run: Option<PathBuf>,
    pub case_name: Option<String>,
    pub file_prefix: Option<String>,
    pub proc_dir: Option<PathBuf>,
    pub levs: Option<String>,
    #[serde(alias = "interp-var")]
    pub interp_var: Option<String>,
    pub logfile: Option<PathBuf>,
    pub num_threads: Option<usize>,
}

impl FileConfig {
    pub fn from_yaml_str(text: &str, origin: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(text).map_err(|source| ConfigError::Yaml {
            path: origin.to_string(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&text, &path.display().to_string())
    }
}

/// Fully resolved settings of a preprocessing run
#[derive(Clone, Debug, PartialEq)]
pub struct PreprocessConfig {
    pub wrf_run: PathBuf,
    pub case_name: String,
    pub file_prefix: String,
    pub proc_dir: PathBuf,
    pub levels: LevelSpec,
    /// Level expression as the user wrote it (recorded in the output)
    pub levs_expr: String,
    pub interp_var: InterpVar,
    pub logfile: PathBuf,
    pub num_threads: usize,
    pub constants: Constants,
}

impl PreprocessConfig {
    /// Directory holding the run's `wrfout` files
    pub fn case_dir(&self) -> PathBuf {
        self.wrf_run.join(&self.case_name)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.proc_dir.join(&self.case_name)
    }

    pub fn store_path(&self) -> PathBuf {
        self.output_dir()
            .join(format!("{}{}", self.file_prefix, STORE_SUFFIX))
    }

    /// Merge the YAML file (if `--config` was given) with the command line
    pub fn from_matches(matches: &ArgMatches) -> Result<Self, ConfigError> {
        let file = match matches.get_one::<PathBuf>("config") {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Self::resolve(matches, file)
    }

    fn resolve(matches: &ArgMatches, file: FileConfig) -> Result<Self, ConfigError> {
        let wrf_run = pick(matches, "wrf-run", file.wrf_run)
            .ok_or(ConfigError::MissingSetting("wrf_run"))?;
        let case_name = pick(matches, "case-name", file.case_name)
            .ok_or(ConfigError::MissingSetting("case_name"))?;
        let file_prefix = pick(matches, "file-prefix", file.file_prefix)
            .ok_or(ConfigError::MissingSetting("file_prefix"))?;
        let proc_dir = pick(matches, "proc-dir", file.proc_dir)
            .ok_or(ConfigError::MissingSetting("proc_dir"))?;
        let levs_expr = pick(matches, "levs", file.levs).ok_or(ConfigError::MissingSetting("levs"))?;
        let interp_var: InterpVar = pick(matches, "interp-var", file.interp_var)
            .ok_or(ConfigError::MissingSetting("interp_var"))?
            .parse()?;
        let logfile = pick(matches, "logfile", file.logfile)
            .ok_or(ConfigError::MissingSetting("logfile"))?;
        let num_threads = pick(matches, "num-threads", file.num_threads).unwrap_or(1);

        if case_name.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "case_name",
                value: case_name,
            });
        }
        if num_threads == 0 {
            return Err(ConfigError::InvalidValue {
                name: "num_threads",
                value: "0".to_string(),
            });
        }

        Ok(Self {
            wrf_run,
            case_name,
            file_prefix,
            proc_dir,
            levels: LevelSpec::parse(&levs_expr)?,
            levs_expr,
            interp_var,
            logfile,
            num_threads,
            constants: Constants::default(),
        })
    }
}

/// Value given on the command line, else from the config file, else the
/// flag's default
fn pick<T>(matches: &ArgMatches, id: &str, from_file: Option<T>) -> Option<T>
where
    T: Clone + Send + Sync + 'static,
{
    let cli = matches.get_one::<T>(id).cloned();
    if matches.value_source(id) == Some(ValueSource::CommandLine) {
        cli
    } else {
        from_file.or(cli)
    }
}

/// Arguments of the `inspect` subcommand
#[derive(Clone, Debug, PartialEq)]
pub struct InspectConfig {
    pub store: PathBuf,
    pub variable: Option<String>,
    pub time: usize,
    pub level: usize,
    pub point: Option<(usize, usize)>,
    pub cross_section: Option<CrossSection>,
    pub compare: Option<(usize, usize)>,
    pub csv: bool,
}

impl InspectConfig {
    pub fn from_matches(matches: &ArgMatches) -> Result<Self, ConfigError> {
        let store = matches
            .get_one::<PathBuf>("store")
            .cloned()
            .ok_or(ConfigError::MissingSetting("store"))?;

        let point = matches
            .get_one::<String>("point")
            .map(|s| parse_pair(s, "point"))
            .transpose()?;
        let compare = matches
            .get_one::<String>("compare")
            .map(|s| parse_pair(s, "compare"))
            .transpose()?;
        let cross_section = matches
            .get_one::<String>("cross-section")
            .map(|s| {
                s.parse::<CrossSection>().map_err(|_| ConfigError::InvalidValue {
                    name: "cross-section",
                    value: s.clone(),
                })
            })
            .transpose()?;

        Ok(Self {
            store,
            variable: matches.get_one::<String>("var").cloned(),
            time: matches.get_one::<usize>("time").copied().unwrap_or(0),
            level: matches.get_one::<usize>("level").copied().unwrap_or(0),
            point,
            cross_section,
            compare,
            csv: matches.get_flag("csv"),
        })
    }
}

/// Parse `A,B` into two indices
fn parse_pair(s: &str, name: &'static str) -> Result<(usize, usize), ConfigError> {
    let invalid = || ConfigError::InvalidValue {
        name,
        value: s.to_string(),
    };
    let (a, b) = s.split_once(',').ok_or_else(invalid)?;
    let a = a.trim().parse().map_err(|_| invalid())?;
    let b = b.trim().parse().map_err(|_| invalid())?;
    Ok((a, b))
}

/// Command-line interface definition
pub fn build_cli() -> Command {
    Command::new("wrf-levels")
        .version(clap::crate_version!())
        .about("Regrid WRF output onto fixed height or pressure levels and store it as Zarr")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(preprocess_command())
        .subcommand(inspect_command())
}

fn preprocess_command() -> Command {
    Command::new("preprocess")
        .about("Read wrfout files, derive variables, regrid vertically and write a Zarr store")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .value_parser(value_parser!(PathBuf))
                .help("YAML file with default settings (command-line flags override it)"),
        )
        .arg(
            Arg::new("wrf-run")
                .long("wrf-run")
                .value_name("DIR")
                .value_parser(value_parser!(PathBuf))
                .help("Path to the WRF run directory"),
        )
        .arg(
            Arg::new("case-name")
                .long("case-name")
                .value_name("NAME")
                .help("Name of the WRF case (sub-directory of the run directory)"),
        )
        .arg(
            Arg::new("file-prefix")
                .long("file-prefix")
                .value_name("PREFIX")
                .default_value("wrfout_d01")
                .help("Prefix of the wrfout files"),
        )
        .arg(
            Arg::new("proc-dir")
                .long("proc-dir")
                .value_name("DIR")
                .value_parser(value_parser!(PathBuf))
                .default_value("./data")
                .help("Processing output directory"),
        )
        .arg(
            Arg::new("levs")
                .long("levs")
                .value_name("SPEC")
                .default_value("np.arange(100, 2000, 100)")
                .help("Target levels as start:stop:step, start,stop,step or np.arange(start, stop, step)"),
        )
        .arg(
            Arg::new("interp-var")
                .long("interp-var")
                .alias("interp_var")
                .value_name("VAR")
                .value_parser(["geopotential_height", "air_pressure"])
                .default_value("geopotential_height")
                .help("Variable used for vertical level interpolation"),
        )
        .arg(
            Arg::new("logfile")
                .long("logfile")
                .value_name("PATH")
                .value_parser(value_parser!(PathBuf))
                .default_value("./app.log")
                .help("Name or full path of the log file (truncated each run)"),
        )
        .arg(
            Arg::new("num-threads")
                .short('j')
                .long("num-threads")
                .value_name("N")
                .value_parser(value_parser!(usize))
                .default_value("1")
                .help("Number of worker threads for regridding (1 = synchronous)"),
        )
}

fn inspect_command() -> Command {
    Command::new("inspect")
        .about("Summarise a processed store and extract map, profile, section or comparison data")
        .arg(
            Arg::new("store")
                .value_name("STORE")
                .value_parser(value_parser!(PathBuf))
                .required(true)
                .help("Path to a *_hlevs.zarr store"),
        )
        .arg(Arg::new("var").long("var").value_name("NAME").help("Variable to extract"))
        .arg(
            Arg::new("time")
                .long("time")
                .value_name("IDX")
                .value_parser(value_parser!(usize))
                .default_value("0")
                .help("Time index"),
        )
        .arg(
            Arg::new("level")
                .long("level")
                .value_name("IDX")
                .value_parser(value_parser!(usize))
                .default_value("0")
                .help("Vertical level index for 3-D variables"),
        )
        .arg(
            Arg::new("point")
                .long("point")
                .value_name("J,I")
                .help("Grid point (south_north, west_east) for time series and profiles"),
        )
        .arg(
            Arg::new("cross-section")
                .long("cross-section")
                .value_name("row|col:INDEX")
                .help("Vertical cross-section along a grid row or column"),
        )
        .arg(
            Arg::new("compare")
                .long("compare")
                .value_name("T0,T1")
                .help("Difference between two time steps (T1 minus T0)"),
        )
        .arg(
            Arg::new("csv")
                .long("csv")
                .action(ArgAction::SetTrue)
                .help("Print extracted values as CSV instead of a summary"),
        )
}
