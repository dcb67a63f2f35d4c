//! Calibration tables
//!
//! Q-curves per input variable, decile thresholds, the ecoregion code
//! table and biomass-to-cover coefficients. All of it is immutable once
//! loaded and is passed explicitly to every stage that needs it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use sei_core::{Error, Result};

/// Quality floor applied before the multiplicative composite
pub const DEFAULT_QUALITY_FLOOR: f64 = 0.001;

/// Input variables that get a quality band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variable {
    Sagebrush,
    PerennialGrass,
    AnnualGrass,
    HumanModification,
    Tree,
}

impl Variable {
    /// Composite order: sage, perennial, annual, human, tree
    pub const ALL: [Variable; 5] = [
        Variable::Sagebrush,
        Variable::PerennialGrass,
        Variable::AnnualGrass,
        Variable::HumanModification,
        Variable::Tree,
    ];

    /// Name of the quality band in pipeline outputs
    pub fn quality_band(self) -> &'static str {
        match self {
            Variable::Sagebrush => "q_sage",
            Variable::PerennialGrass => "q_perennial",
            Variable::AnnualGrass => "q_annual",
            Variable::HumanModification => "q_human",
            Variable::Tree => "q_tree",
        }
    }

    /// Short name used for input files and log fields
    pub fn key(self) -> &'static str {
        match self {
            Variable::Sagebrush => "sagebrush",
            Variable::PerennialGrass => "perennial_grass",
            Variable::AnnualGrass => "annual_grass",
            Variable::HumanModification => "human_modification",
            Variable::Tree => "tree",
        }
    }

    /// Cover in percent (divided by 100 after smoothing) rather than a
    /// unitless index
    pub fn is_percent_cover(self) -> bool {
        !matches!(self, Variable::HumanModification)
    }

    /// Variables with a per-year cover product
    pub fn is_annual(self) -> bool {
        !matches!(self, Variable::HumanModification)
    }

    /// Variables that future-scenario drivers modify
    pub fn is_projected(self) -> bool {
        matches!(
            self,
            Variable::Sagebrush | Variable::PerennialGrass | Variable::AnnualGrass
        )
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// The three ecoregions that select a Q-curve column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ecoregion {
    GreatBasin,
    Intermountain,
    Plains,
}

impl Ecoregion {
    pub const ALL: [Ecoregion; 3] = [Ecoregion::GreatBasin, Ecoregion::Intermountain, Ecoregion::Plains];

    /// Column of this ecoregion in a Q-curve row
    pub fn column(self) -> usize {
        match self {
            Ecoregion::GreatBasin => 0,
            Ecoregion::Intermountain => 1,
            Ecoregion::Plains => 2,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Ecoregion::GreatBasin => "Great Basin",
            Ecoregion::Intermountain => "Intermountain",
            Ecoregion::Plains => "Great Plains",
        }
    }
}

/// Integer code each ecoregion carries in the ecoregion polygon layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EcoregionCodes {
    /// Feature attribute holding the code
    pub attribute: String,
    pub great_basin: i64,
    pub intermountain: i64,
    pub plains: i64,
}

impl Default for EcoregionCodes {
    fn default() -> Self {
        Self {
            attribute: "ecoregion".into(),
            great_basin: 1,
            intermountain: 2,
            plains: 3,
        }
    }
}

impl EcoregionCodes {
    pub fn code(&self, eco: Ecoregion) -> i64 {
        match eco {
            Ecoregion::GreatBasin => self.great_basin,
            Ecoregion::Intermountain => self.intermountain,
            Ecoregion::Plains => self.plains,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let codes = [self.great_basin, self.intermountain, self.plains];
        if codes[0] == codes[1] || codes[0] == codes[2] || codes[1] == codes[2] {
            return Err(Error::Calibration(format!(
                "ecoregion codes must be distinct, got {:?}",
                codes
            )));
        }
        Ok(())
    }
}

/// One breakpoint: input value and the quality per ecoregion column
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QCurveRow {
    pub x: f64,
    /// Great Basin, Intermountain, Plains
    pub q: [f64; 3],
}

impl QCurveRow {
    pub const fn new(x: f64, great_basin: f64, intermountain: f64, plains: f64) -> Self {
        Self {
            x,
            q: [great_basin, intermountain, plains],
        }
    }
}

/// Piecewise-linear habitat-suitability curve
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<QCurveRow>", into = "Vec<QCurveRow>")]
pub struct QCurve {
    rows: Vec<QCurveRow>,
}

impl QCurve {
    /// Build a curve; breakpoints must be finite and strictly increasing,
    /// qualities finite and within [0, 1]
    pub fn new(rows: Vec<QCurveRow>) -> Result<Self> {
        if rows.len() < 2 {
            return Err(Error::Calibration(format!(
                "a Q-curve needs at least 2 rows, got {}",
                rows.len()
            )));
        }
        for (i, row) in rows.iter().enumerate() {
            if !row.x.is_finite() {
                return Err(Error::Calibration(format!("row {} has a non-finite breakpoint", i)));
            }
            if let Some(q) = row.q.iter().find(|q| !(q.is_finite() && (0.0..=1.0).contains(*q))) {
                return Err(Error::Calibration(format!(
                    "row {} has quality {} outside [0, 1]",
                    i, q
                )));
            }
        }
        if let Some(w) = rows.windows(2).find(|w| w[1].x <= w[0].x) {
            return Err(Error::Calibration(format!(
                "breakpoints must be strictly increasing ({} then {})",
                w[0].x, w[1].x
            )));
        }
        Ok(Self { rows })
    }

    pub fn rows(&self) -> &[QCurveRow] {
        &self.rows
    }

    /// First and last breakpoint
    pub fn domain(&self) -> (f64, f64) {
        (self.rows[0].x, self.rows[self.rows.len() - 1].x)
    }

    fn from_table(table: &[(f64, f64, f64, f64)]) -> Self {
        Self {
            rows: table
                .iter()
                .map(|&(x, gb, im, pl)| QCurveRow::new(x, gb, im, pl))
                .collect(),
        }
    }
}

impl TryFrom<Vec<QCurveRow>> for QCurve {
    type Error = Error;

    fn try_from(rows: Vec<QCurveRow>) -> Result<Self> {
        QCurve::new(rows)
    }
}

impl From<QCurve> for Vec<QCurveRow> {
    fn from(curve: QCurve) -> Self {
        curve.rows
    }
}

/// Ascending decile thresholds and, per threshold, whether the test is
/// inclusive (`>=`) rather than strict (`>`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecileThresholds {
    pub values: Vec<f64>,
    pub inclusive: Vec<bool>,
}

impl Default for DecileThresholds {
    /// Reference thresholds; the 0.009 test is `>=`, all others strict
    fn default() -> Self {
        Self {
            values: vec![0.002, 0.009, 0.068, 0.115, 0.173, 0.244, 0.326, 0.431, 0.565],
            inclusive: vec![false, true, false, false, false, false, false, false, false],
        }
    }
}

impl DecileThresholds {
    pub fn validate(&self) -> Result<()> {
        if self.values.len() != 9 || self.inclusive.len() != 9 {
            return Err(Error::Calibration(format!(
                "expected 9 decile thresholds and 9 inclusivity flags, got {} and {}",
                self.values.len(),
                self.inclusive.len()
            )));
        }
        if self.values.windows(2).any(|w| !(w[0] < w[1])) {
            return Err(Error::Calibration("decile thresholds must be strictly ascending".into()));
        }
        Ok(())
    }

    /// Decile class 1..=10 of a finite value
    pub fn class_of(&self, value: f64) -> u8 {
        let passed = self
            .values
            .iter()
            .zip(&self.inclusive)
            .filter(|&(&t, &inclusive)| if inclusive { value >= t } else { value > t })
            .count();
        1 + passed as u8
    }
}

/// `cover = b0 + b1 * biomass`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearCoefficients {
    pub b0: f64,
    pub b1: f64,
}

impl LinearCoefficients {
    pub fn apply(&self, biomass: f64) -> f64 {
        self.b0 + self.b1 * biomass
    }
}

/// Biomass-to-cover conversion per projected variable
pub type BiomassCoefficients = BTreeMap<Variable, LinearCoefficients>;

/// Everything the habitat stages read but never modify
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Calibration {
    pub curves: BTreeMap<Variable, QCurve>,
    pub thresholds: DecileThresholds,
    pub quality_floor: f64,
    pub biomass: BiomassCoefficients,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            curves: default_curves(),
            thresholds: DecileThresholds::default(),
            quality_floor: DEFAULT_QUALITY_FLOOR,
            biomass: BiomassCoefficients::new(),
        }
    }
}

impl Calibration {
    /// Curve for `variable`, or a calibration error naming it
    pub fn curve(&self, variable: Variable) -> Result<&QCurve> {
        self.curves
            .get(&variable)
            .ok_or_else(|| Error::Calibration(format!("no Q-curve for {}", variable)))
    }

    /// Biomass coefficients for `variable`, or a calibration error naming it
    pub fn biomass_coefficients(&self, variable: Variable) -> Result<LinearCoefficients> {
        self.biomass
            .get(&variable)
            .copied()
            .ok_or_else(|| Error::Calibration(format!("no biomass coefficients for {}", variable)))
    }

    pub fn validate(&self) -> Result<()> {
        for variable in Variable::ALL {
            self.curve(variable)?;
        }
        self.thresholds.validate()?;
        if !(self.quality_floor >= 0.0 && self.quality_floor < 1.0) {
            return Err(Error::Calibration(format!(
                "quality floor {} outside [0, 1)",
                self.quality_floor
            )));
        }
        Ok(())
    }
}

/// Built-in curves, used when a run names no curve table.
///
/// Inputs are proportions (cover / 100) except human modification, which
/// is its own 0-1 index. Columns are Great Basin, Intermountain, Plains.
pub fn default_curves() -> BTreeMap<Variable, QCurve> {
    let sagebrush = QCurve::from_table(&[
        (0.00, 0.00, 0.00, 0.00),
        (0.02, 0.10, 0.08, 0.15),
        (0.05, 0.35, 0.30, 0.45),
        (0.10, 0.70, 0.65, 0.80),
        (0.15, 0.90, 0.88, 0.95),
        (0.20, 1.00, 1.00, 1.00),
        (1.00, 1.00, 1.00, 1.00),
    ]);
    let perennial = QCurve::from_table(&[
        (0.00, 0.05, 0.02, 0.00),
        (0.05, 0.30, 0.25, 0.10),
        (0.10, 0.60, 0.50, 0.30),
        (0.20, 0.90, 0.85, 0.60),
        (0.30, 1.00, 1.00, 0.85),
        (0.40, 1.00, 1.00, 1.00),
        (1.00, 1.00, 1.00, 1.00),
    ]);
    let annual = QCurve::from_table(&[
        (0.00, 1.00, 1.00, 1.00),
        (0.02, 0.95, 0.95, 1.00),
        (0.05, 0.80, 0.85, 0.90),
        (0.10, 0.50, 0.60, 0.70),
        (0.20, 0.15, 0.25, 0.35),
        (0.30, 0.02, 0.05, 0.10),
        (1.00, 0.00, 0.00, 0.00),
    ]);
    let human = QCurve::from_table(&[
        (0.00, 1.00, 1.00, 1.00),
        (0.01, 0.98, 0.98, 0.99),
        (0.05, 0.80, 0.82, 0.85),
        (0.10, 0.55, 0.58, 0.62),
        (0.20, 0.25, 0.28, 0.32),
        (0.40, 0.05, 0.06, 0.08),
        (1.00, 0.00, 0.00, 0.00),
    ]);
    let tree = QCurve::from_table(&[
        (0.00, 1.00, 1.00, 1.00),
        (0.01, 0.90, 0.92, 0.95),
        (0.02, 0.75, 0.80, 0.85),
        (0.05, 0.40, 0.45, 0.55),
        (0.10, 0.10, 0.15, 0.20),
        (0.20, 0.00, 0.00, 0.02),
        (1.00, 0.00, 0.00, 0.00),
    ]);

    BTreeMap::from([
        (Variable::Sagebrush, sagebrush),
        (Variable::PerennialGrass, perennial),
        (Variable::AnnualGrass, annual),
        (Variable::HumanModification, human),
        (Variable::Tree, tree),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_calibration_is_valid() {
        let cal = Calibration::default();
        cal.validate().unwrap();
        for curve in cal.curves.values() {
            QCurve::new(curve.rows().to_vec()).unwrap();
        }
    }

    #[test]
    fn test_curve_rejects_unsorted_and_short_tables() {
        let rows = vec![QCurveRow::new(0.0, 0.0, 0.0, 0.0), QCurveRow::new(0.0, 1.0, 1.0, 1.0)];
        assert!(matches!(QCurve::new(rows), Err(Error::Calibration(_))));
        assert!(QCurve::new(vec![QCurveRow::new(0.0, 0.0, 0.0, 0.0)]).is_err());
        let rows = vec![QCurveRow::new(0.0, 0.0, 0.0, 1.5), QCurveRow::new(1.0, 1.0, 1.0, 1.0)];
        assert!(QCurve::new(rows).is_err());
    }

    #[test]
    fn test_curve_deserialization_validates() {
        let json = r#"[{"x": 0.0, "q": [0.0, 0.0, 0.0]}, {"x": 1.0, "q": [1.0, 0.5, 0.2]}]"#;
        let curve: QCurve = serde_json::from_str(json).unwrap();
        assert_eq!(curve.domain(), (0.0, 1.0));

        let bad = r#"[{"x": 1.0, "q": [0.0, 0.0, 0.0]}, {"x": 0.5, "q": [1.0, 0.5, 0.2]}]"#;
        assert!(serde_json::from_str::<QCurve>(bad).is_err());
    }

    #[test]
    fn test_decile_boundaries() {
        let t = DecileThresholds::default();
        assert_eq!(t.class_of(0.0), 1);
        assert_eq!(t.class_of(0.002), 1);
        assert_eq!(t.class_of(0.0021), 2);
        // the 0.009 test is inclusive
        assert_eq!(t.class_of(0.009), 3);
        assert_eq!(t.class_of(0.0089), 2);
        assert_eq!(t.class_of(0.068), 3);
        assert_eq!(t.class_of(0.565), 9);
        assert_eq!(t.class_of(0.9), 10);
    }

    #[test]
    fn test_missing_curve_is_a_calibration_error() {
        let mut cal = Calibration::default();
        cal.curves.remove(&Variable::Tree);
        let err = cal.validate().unwrap_err();
        assert!(err.to_string().contains("tree"));
        assert!(cal.biomass_coefficients(Variable::Sagebrush).is_err());
    }

    #[test]
    fn test_ecoregion_codes() {
        let codes = EcoregionCodes::default();
        assert_eq!(codes.code(Ecoregion::Plains), 3);
        codes.validate().unwrap();
        let dup = EcoregionCodes {
            plains: 1,
            ..EcoregionCodes::default()
        };
        assert!(dup.validate().is_err());
    }
}
