use log::warn;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::errors::{ModeError, Result};
use crate::field::FieldTag;
use crate::interest_fn::PiecewiseLinear;

/// Comparison operator of a threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreshOp {
    Lt,
    Le,
    Eq,
    Ne,
    Gt,
    Ge,
}

impl ThreshOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            ThreshOp::Lt => "<",
            ThreshOp::Le => "<=",
            ThreshOp::Eq => "==",
            ThreshOp::Ne => "!=",
            ThreshOp::Gt => ">",
            ThreshOp::Ge => ">=",
        }
    }
}

/// A comparison against a constant, written as `>=5.0`, `gt0`, `<10` ...
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Threshold {
    pub op: ThreshOp,
    pub value: f64,
}

const THRESH_EPS: f64 = 1e-9;

// Longest prefixes first so ">=" is not read as ">"
const THRESH_PREFIXES: [(&str, ThreshOp); 12] = [
    (">=", ThreshOp::Ge),
    ("<=", ThreshOp::Le),
    ("==", ThreshOp::Eq),
    ("!=", ThreshOp::Ne),
    (">", ThreshOp::Gt),
    ("<", ThreshOp::Lt),
    ("ge", ThreshOp::Ge),
    ("le", ThreshOp::Le),
    ("eq", ThreshOp::Eq),
    ("ne", ThreshOp::Ne),
    ("gt", ThreshOp::Gt),
    ("lt", ThreshOp::Lt),
];

impl Threshold {
    pub fn new(op: ThreshOp, value: f64) -> Self {
        Self { op, value }
    }

    /// True when `v` satisfies the comparison
    #[inline]
    pub fn check(&self, v: f64) -> bool {
        match self.op {
            ThreshOp::Lt => v < self.value,
            ThreshOp::Le => v <= self.value,
            ThreshOp::Eq => (v - self.value).abs() < THRESH_EPS,
            ThreshOp::Ne => (v - self.value).abs() >= THRESH_EPS,
            ThreshOp::Gt => v > self.value,
            ThreshOp::Ge => v >= self.value,
        }
    }
}

impl FromStr for Threshold {
    type Err = ModeError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let lower = s.to_ascii_lowercase();

        let (op, rest) = THRESH_PREFIXES
            .iter()
            .find(|(prefix, _)| lower.starts_with(prefix))
            .map(|(prefix, op)| (*op, &s[prefix.len()..]))
            .ok_or_else(|| {
                ModeError::Config(format!(
                    "threshold '{}' must start with a comparison (>=, >, <=, <, ==, !=, ge, gt, le, lt, eq, ne)",
                    s
                ))
            })?;

        let value: f64 = rest.trim().parse().map_err(|_| {
            ModeError::Config(format!("threshold '{}' has no numeric value", s))
        })?;

        if !value.is_finite() {
            return Err(ModeError::Config(format!(
                "threshold '{}' must be finite",
                s
            )));
        }

        Ok(Self { op, value })
    }
}

impl TryFrom<String> for Threshold {
    type Error = ModeError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Threshold> for String {
    fn from(t: Threshold) -> Self {
        t.to_string()
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.op.symbol(), self.value)
    }
}

/// Flags may be written either by name or by their integer code
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum FlagRepr {
    Code(i64),
    Name(String),
}

/// How the simple objects of one field are merged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "FlagRepr", into = "String")]
pub enum MergeFlag {
    /// 0
    None,
    /// 1, re-threshold at the merge threshold
    Thresh,
    /// 2, self-comparison with the interest engine
    Engine,
    /// 3, thresh and engine combined
    Both,
}

impl MergeFlag {
    pub fn uses_thresh(&self) -> bool {
        matches!(self, MergeFlag::Thresh | MergeFlag::Both)
    }

    pub fn uses_engine(&self) -> bool {
        matches!(self, MergeFlag::Engine | MergeFlag::Both)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MergeFlag::None => "none",
            MergeFlag::Thresh => "thresh",
            MergeFlag::Engine => "engine",
            MergeFlag::Both => "both",
        }
    }
}

impl TryFrom<FlagRepr> for MergeFlag {
    type Error = ModeError;

    fn try_from(repr: FlagRepr) -> Result<Self> {
        match repr {
            FlagRepr::Code(0) => Ok(MergeFlag::None),
            FlagRepr::Code(1) => Ok(MergeFlag::Thresh),
            FlagRepr::Code(2) => Ok(MergeFlag::Engine),
            FlagRepr::Code(3) => Ok(MergeFlag::Both),
            FlagRepr::Code(n) => Err(ModeError::Config(format!(
                "merge_flag ({}) must be 0, 1, 2 or 3",
                n
            ))),
            FlagRepr::Name(name) => match name.to_ascii_lowercase().as_str() {
                "none" => Ok(MergeFlag::None),
                "thresh" | "threshold" => Ok(MergeFlag::Thresh),
                "engine" => Ok(MergeFlag::Engine),
                "both" | "thresh+engine" => Ok(MergeFlag::Both),
                _ => Err(ModeError::Config(format!(
                    "unknown merge_flag '{}' (expected none, thresh, engine or both)",
                    name
                ))),
            },
        }
    }
}

impl From<MergeFlag> for String {
    fn from(flag: MergeFlag) -> Self {
        flag.as_str().to_string()
    }
}

/// How forecast and observation objects are matched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "FlagRepr", into = "String")]
pub enum MatchFlag {
    /// 0, no matching at all
    None,
    /// 1, match with merging in both fields
    MergeBoth,
    /// 2, match with forecast merging only
    MergeFcst,
    /// 3, match without any merging
    NoMerge,
}

impl MatchFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchFlag::None => "none",
            MatchFlag::MergeBoth => "merge_both",
            MatchFlag::MergeFcst => "merge_fcst",
            MatchFlag::NoMerge => "no_merge",
        }
    }
}

impl TryFrom<FlagRepr> for MatchFlag {
    type Error = ModeError;

    fn try_from(repr: FlagRepr) -> Result<Self> {
        match repr {
            FlagRepr::Code(0) => Ok(MatchFlag::None),
            FlagRepr::Code(1) => Ok(MatchFlag::MergeBoth),
            FlagRepr::Code(2) => Ok(MatchFlag::MergeFcst),
            FlagRepr::Code(3) => Ok(MatchFlag::NoMerge),
            FlagRepr::Code(n) => Err(ModeError::Config(format!(
                "match_flag ({}) must be 0, 1, 2 or 3",
                n
            ))),
            FlagRepr::Name(name) => match name.to_ascii_lowercase().as_str() {
                "none" => Ok(MatchFlag::None),
                "merge_both" => Ok(MatchFlag::MergeBoth),
                "merge_fcst" => Ok(MatchFlag::MergeFcst),
                "no_merge" => Ok(MatchFlag::NoMerge),
                _ => Err(ModeError::Config(format!(
                    "unknown match_flag '{}' (expected none, merge_both, merge_fcst or no_merge)",
                    name
                ))),
            },
        }
    }
}

impl From<MatchFlag> for String {
    fn from(flag: MatchFlag) -> Self {
        flag.as_str().to_string()
    }
}

/// Statistic of the intensity distribution compared by the intensity ratio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "FlagRepr", into = "i64")]
pub enum IntensityStat {
    Percentile(u8),
    /// Pseudo-percentile 101
    Mean,
    /// Pseudo-percentile 102
    Sum,
}

impl IntensityStat {
    pub fn code(&self) -> i64 {
        match self {
            IntensityStat::Percentile(p) => *p as i64,
            IntensityStat::Mean => 101,
            IntensityStat::Sum => 102,
        }
    }

    pub fn from_code(code: i64) -> Result<Self> {
        match code {
            0..=100 => Ok(IntensityStat::Percentile(code as u8)),
            101 => Ok(IntensityStat::Mean),
            102 => Ok(IntensityStat::Sum),
            _ => Err(ModeError::Config(format!(
                "intensity_percentile ({}) must be in [0, 100], 101 (mean) or 102 (sum)",
                code
            ))),
        }
    }
}

impl TryFrom<FlagRepr> for IntensityStat {
    type Error = ModeError;

    fn try_from(repr: FlagRepr) -> Result<Self> {
        match repr {
            FlagRepr::Code(code) => IntensityStat::from_code(code),
            FlagRepr::Name(name) => match name.to_ascii_lowercase().as_str() {
                "mean" => Ok(IntensityStat::Mean),
                "sum" => Ok(IntensityStat::Sum),
                "median" => Ok(IntensityStat::Percentile(50)),
                other => other
                    .parse::<i64>()
                    .map_err(|_| {
                        ModeError::Config(format!(
                            "unknown intensity_percentile '{}'",
                            name
                        ))
                    })
                    .and_then(IntensityStat::from_code),
            },
        }
    }
}

impl From<IntensityStat> for i64 {
    fn from(stat: IntensityStat) -> Self {
        stat.code()
    }
}

impl fmt::Display for IntensityStat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntensityStat::Percentile(p) => write!(f, "p{}", p),
            IntensityStat::Mean => f.write_str("mean"),
            IntensityStat::Sum => f.write_str("sum"),
        }
    }
}

/// Per-field object definition and merging options
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct FieldConfig {
    #[serde(default = "default_conv_radius")]
    pub conv_radius: i32,

    #[serde(default = "default_conv_thresh")]
    pub conv_thresh: Threshold,

    /// Minimum ratio of valid to total kernel pixels for a convolved value
    #[serde(default = "default_vld_thresh")]
    pub vld_thresh: f64,

    /// Objects whose area fails this threshold are discarded before labeling
    #[serde(default)]
    pub area_thresh: Option<Threshold>,

    #[serde(default = "default_merge_thresh")]
    pub merge_thresh: Threshold,

    #[serde(default = "default_merge_flag")]
    pub merge_flag: MergeFlag,

    /// Engine-merge cutoff; falls back to `total_interest_thresh`
    #[serde(default)]
    pub merge_interest_thresh: Option<f64>,
}

impl Default for FieldConfig {
    fn default() -> Self {
        Self {
            conv_radius: default_conv_radius(),
            conv_thresh: default_conv_thresh(),
            vld_thresh: default_vld_thresh(),
            area_thresh: None,
            merge_thresh: default_merge_thresh(),
            merge_flag: default_merge_flag(),
            merge_interest_thresh: None,
        }
    }
}

/// Relative weights of the eight interest components
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct WeightConfig {
    pub centroid_dist: f64,
    pub boundary_dist: f64,
    pub convex_hull_dist: f64,
    pub angle_diff: f64,
    pub area_ratio: f64,
    pub int_area_ratio: f64,
    pub complexity_ratio: f64,
    pub inten_perc_ratio: f64,
}

impl Default for WeightConfig {
    fn default() -> Self {
        Self {
            centroid_dist: 2.0,
            boundary_dist: 4.0,
            convex_hull_dist: 0.0,
            angle_diff: 1.0,
            area_ratio: 1.0,
            int_area_ratio: 2.0,
            complexity_ratio: 0.0,
            inten_perc_ratio: 0.0,
        }
    }
}

impl WeightConfig {
    /// Weights in component order
    pub fn as_array(&self) -> [f64; 8] {
        [
            self.centroid_dist,
            self.boundary_dist,
            self.convex_hull_dist,
            self.angle_diff,
            self.area_ratio,
            self.int_area_ratio,
            self.complexity_ratio,
            self.inten_perc_ratio,
        ]
    }

    pub fn sum(&self) -> f64 {
        self.as_array().iter().sum()
    }
}

/// Membership functions for the eight interest components
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct InterestFunctions {
    pub centroid_dist: PiecewiseLinear,
    pub boundary_dist: PiecewiseLinear,
    pub convex_hull_dist: PiecewiseLinear,
    pub angle_diff: PiecewiseLinear,
    pub area_ratio: PiecewiseLinear,
    pub int_area_ratio: PiecewiseLinear,
    pub complexity_ratio: PiecewiseLinear,
    pub inten_perc_ratio: PiecewiseLinear,
}

impl Default for InterestFunctions {
    fn default() -> Self {
        let ratio = PiecewiseLinear::from_points(&[(0.0, 0.0), (0.8, 1.0), (1.0, 1.0)]);
        Self {
            centroid_dist: PiecewiseLinear::from_points(&[(0.0, 1.0), (15.0, 1.0), (150.0, 0.0)]),
            boundary_dist: PiecewiseLinear::from_points(&[(0.0, 1.0), (100.0, 0.0)]),
            convex_hull_dist: PiecewiseLinear::from_points(&[(0.0, 1.0), (100.0, 0.0)]),
            angle_diff: PiecewiseLinear::from_points(&[(0.0, 1.0), (30.0, 1.0), (90.0, 0.0)]),
            area_ratio: ratio.clone(),
            int_area_ratio: PiecewiseLinear::from_points(&[
                (0.0, 0.0),
                (0.1, 0.5),
                (0.25, 1.0),
                (1.0, 1.0),
            ]),
            complexity_ratio: ratio.clone(),
            inten_perc_ratio: ratio,
        }
    }
}

impl InterestFunctions {
    fn named(&self) -> [(&'static str, &PiecewiseLinear); 8] {
        [
            ("centroid_dist", &self.centroid_dist),
            ("boundary_dist", &self.boundary_dist),
            ("convex_hull_dist", &self.convex_hull_dist),
            ("angle_diff", &self.angle_diff),
            ("area_ratio", &self.area_ratio),
            ("int_area_ratio", &self.int_area_ratio),
            ("complexity_ratio", &self.complexity_ratio),
            ("inten_perc_ratio", &self.inten_perc_ratio),
        ]
    }
}

/// Fuzzy-engine configuration shared read-only by every stage of a run
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct FuzzyConfig {
    #[serde(default = "default_match_flag")]
    pub match_flag: MatchFlag,

    #[serde(default = "default_intensity_percentile")]
    pub intensity_percentile: IntensityStat,

    #[serde(default = "default_total_interest_thresh")]
    pub total_interest_thresh: f64,

    #[serde(default = "default_print_interest_thresh")]
    pub print_interest_thresh: f64,

    /// Simple cross-field pairs farther apart than this are not scored
    #[serde(default = "default_max_centroid_dist")]
    pub max_centroid_dist: f64,

    #[serde(default = "default_zero_border_size")]
    pub zero_border_size: i32,

    #[serde(default = "default_parallel")]
    pub use_parallel: bool,

    #[serde(default)]
    pub fcst: FieldConfig,

    #[serde(default)]
    pub obs: FieldConfig,

    #[serde(default)]
    pub weight: WeightConfig,

    #[serde(default)]
    pub interest_function: InterestFunctions,
}

fn default_conv_radius() -> i32 {
    5
}

fn default_conv_thresh() -> Threshold {
    Threshold::new(ThreshOp::Ge, 5.0)
}

fn default_vld_thresh() -> f64 {
    0.5
}

fn default_merge_thresh() -> Threshold {
    Threshold::new(ThreshOp::Ge, 1.25)
}

fn default_merge_flag() -> MergeFlag {
    MergeFlag::Thresh
}

fn default_match_flag() -> MatchFlag {
    MatchFlag::MergeBoth
}

fn default_intensity_percentile() -> IntensityStat {
    IntensityStat::Percentile(50)
}

fn default_total_interest_thresh() -> f64 {
    0.7
}

fn default_print_interest_thresh() -> f64 {
    0.0
}

fn default_max_centroid_dist() -> f64 {
    200.0 // 800 km at 4 km grid spacing
}

fn default_zero_border_size() -> i32 {
    1
}

fn default_parallel() -> bool {
    true
}

impl Default for FuzzyConfig {
    fn default() -> Self {
        Self {
            fcst: FieldConfig::default(),
            obs: FieldConfig::default(),
            match_flag: default_match_flag(),
            weight: WeightConfig::default(),
            interest_function: InterestFunctions::default(),
            intensity_percentile: default_intensity_percentile(),
            total_interest_thresh: default_total_interest_thresh(),
            print_interest_thresh: default_print_interest_thresh(),
            max_centroid_dist: default_max_centroid_dist(),
            zero_border_size: default_zero_border_size(),
            use_parallel: default_parallel(),
        }
    }
}

impl FuzzyConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            ModeError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;

        toml::from_str(&content).map_err(|source| ModeError::ConfigLoad {
            source,
            path: path.to_path_buf(),
        })
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ModeError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, content)?;

        Ok(())
    }

    pub fn field(&self, tag: FieldTag) -> &FieldConfig {
        match tag {
            FieldTag::Fcst => &self.fcst,
            FieldTag::Obs => &self.obs,
        }
    }

    /// Merge flag actually applied to a field once the match flag is taken into account
    pub fn effective_merge_flag(&self, tag: FieldTag) -> MergeFlag {
        match (self.match_flag, tag) {
            (MatchFlag::MergeBoth, _) => self.field(tag).merge_flag,
            (MatchFlag::MergeFcst, FieldTag::Fcst) => self.fcst.merge_flag,
            _ => MergeFlag::None,
        }
    }

    /// Interest cutoff for engine merging in one field
    pub fn merge_interest_thresh(&self, tag: FieldTag) -> f64 {
        self.field(tag)
            .merge_interest_thresh
            .unwrap_or(self.total_interest_thresh)
    }

    /// Validate configuration. Fatal problems are returned as errors, questionable
    /// choices are logged and processing continues.
    pub fn validate(&self) -> Result<()> {
        for tag in [FieldTag::Fcst, FieldTag::Obs] {
            let field = self.field(tag);

            if field.conv_radius < 0 {
                return Err(ModeError::Config(format!(
                    "{} conv_radius ({}) must be >= 0",
                    tag, field.conv_radius
                )));
            }

            if !(0.0..=1.0).contains(&field.vld_thresh) {
                return Err(ModeError::Config(format!(
                    "{} vld_thresh ({}) must be between 0 and 1",
                    tag, field.vld_thresh
                )));
            }

            if let Some(t) = field.merge_interest_thresh {
                if !(0.0..=1.0).contains(&t) {
                    return Err(ModeError::Config(format!(
                        "{} merge_interest_thresh ({}) must be between 0 and 1",
                        tag, t
                    )));
                }
            }
        }

        if self.zero_border_size < 1 {
            return Err(ModeError::Config(format!(
                "zero_border_size ({}) must be >= 1",
                self.zero_border_size
            )));
        }

        if let IntensityStat::Percentile(p) = self.intensity_percentile {
            if p > 100 {
                return Err(ModeError::Config(format!(
                    "intensity_percentile ({}) must be in [0, 100]",
                    p
                )));
            }
        }

        if !(0.0..=1.0).contains(&self.total_interest_thresh) {
            return Err(ModeError::Config(format!(
                "total_interest_thresh ({}) must be between 0 and 1",
                self.total_interest_thresh
            )));
        }

        if !(0.0..=1.0).contains(&self.print_interest_thresh) {
            return Err(ModeError::Config(format!(
                "print_interest_thresh ({}) must be between 0 and 1",
                self.print_interest_thresh
            )));
        }

        if self.weight.as_array().iter().any(|w| *w < 0.0 || !w.is_finite()) {
            return Err(ModeError::Config(
                "fuzzy engine weights must be finite and >= 0".to_string(),
            ));
        }

        if self.weight.sum() <= 0.0 && self.requires_interest() {
            return Err(ModeError::Config(
                "the sum of the fuzzy engine weights must be > 0 when matching or engine merging is requested"
                    .to_string(),
            ));
        }

        for (name, f) in self.interest_function.named() {
            f.validate(name)?;
        }

        for warning in self.warnings() {
            warn!("{}", warning);
        }

        Ok(())
    }

    /// Non-fatal configuration concerns
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        for tag in [FieldTag::Fcst, FieldTag::Obs] {
            let field = self.field(tag);

            if let Some(area) = field.area_thresh {
                let passes_everything = matches!(area.op, ThreshOp::Ge | ThreshOp::Gt) && area.value <= 0.0;
                if passes_everything {
                    warnings.push(format!(
                        "{} area_thresh ({}) is non-positive and removes no objects",
                        tag, area
                    ));
                }
            }

            if self.match_flag == MatchFlag::None && field.merge_flag != MergeFlag::None {
                warnings.push(format!(
                    "{} merge_flag is '{}' but match_flag is 'none', so no merging is performed",
                    tag,
                    field.merge_flag.as_str()
                ));
            }
        }

        if self.max_centroid_dist <= 0.0 {
            warnings.push(format!(
                "max_centroid_dist ({}) is non-positive, so no simple object pairs are scored",
                self.max_centroid_dist
            ));
        }

        warnings
    }

    /// Whether any stage needs the interest engine
    fn requires_interest(&self) -> bool {
        self.match_flag != MatchFlag::None
            || [FieldTag::Fcst, FieldTag::Obs]
                .iter()
                .any(|&tag| self.effective_merge_flag(tag).uses_engine())
    }
}
