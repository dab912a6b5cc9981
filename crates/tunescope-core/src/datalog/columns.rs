//! Column resolution
//!
//! Maps logical signals onto whatever column names a logging tool produced.
//! Resolution order is deterministic:
//! 1. explicit override
//! 2. exact alias match
//! 3. case-insensitive alias match
//! 4. keyword overlap (every alias word present in the header)

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;

use super::LogData;
use crate::error::AnalysisError;

/// Logical signals the analyzers understand
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Signal {
    /// Sample timestamp
    Time,
    /// Engine speed
    Rpm,
    /// Throttle position
    Throttle,
    /// Engine load (g/rev)
    Load,
    /// Knock retard applied by the ECU
    KnockRetard,
    /// Wideband lambda
    LambdaActual,
    /// Commanded lambda
    LambdaTarget,
    /// Manifold absolute pressure
    BoostActual,
    /// Commanded boost
    BoostTarget,
    /// Wastegate duty cycle
    WastegateDuty,
    /// Short-term fuel trim
    ShortTermTrim,
    /// Long-term fuel trim
    LongTermTrim,
    /// Ignition advance multiplier
    Iam,
    /// Coolant temperature
    CoolantTemp,
    /// Intake air temperature
    IntakeTemp,
    /// MAF sensor voltage
    MafVoltage,
    /// Injector pulse width
    InjectorPulseWidth,
    /// Radiator fan state
    FanStatus,
}

impl Signal {
    /// Every logical signal
    pub const ALL: [Signal; 18] = [
        Signal::Time,
        Signal::Rpm,
        Signal::Throttle,
        Signal::Load,
        Signal::KnockRetard,
        Signal::LambdaActual,
        Signal::LambdaTarget,
        Signal::BoostActual,
        Signal::BoostTarget,
        Signal::WastegateDuty,
        Signal::ShortTermTrim,
        Signal::LongTermTrim,
        Signal::Iam,
        Signal::CoolantTemp,
        Signal::IntakeTemp,
        Signal::MafVoltage,
        Signal::InjectorPulseWidth,
        Signal::FanStatus,
    ];

    /// Whether a header is a known alias of a different signal, either
    /// verbatim or once unit suffixes are stripped
    fn belongs_to_other(&self, header: &str, header_words: &[String]) -> bool {
        self.others().any(|other| {
            other
                .aliases()
                .iter()
                .any(|a| a.eq_ignore_ascii_case(header) || keywords(a) == header_words)
        })
    }

    /// Whether another signal has an alias with more than `alias_len` words
    /// that all appear in the header
    fn claimed_by_other(&self, header_words: &[String], alias_len: usize) -> bool {
        self.others().any(|other| {
            other.aliases().iter().any(|a| {
                let words = keywords(a);
                words.len() > alias_len && words.iter().all(|w| header_words.contains(w))
            })
        })
    }

    fn others(&self) -> impl Iterator<Item = Signal> + '_ {
        Signal::ALL.into_iter().filter(move |other| other != self)
    }

    /// Stable key used in reports and settings
    pub fn key(&self) -> &'static str {
        match self {
            Signal::Time => "time",
            Signal::Rpm => "rpm",
            Signal::Throttle => "throttle",
            Signal::Load => "load",
            Signal::KnockRetard => "knockRetard",
            Signal::LambdaActual => "lambdaActual",
            Signal::LambdaTarget => "lambdaTarget",
            Signal::BoostActual => "actualBoost",
            Signal::BoostTarget => "boostTarget",
            Signal::WastegateDuty => "wastegateDuty",
            Signal::ShortTermTrim => "shortTermTrim",
            Signal::LongTermTrim => "longTermTrim",
            Signal::Iam => "iam",
            Signal::CoolantTemp => "coolantTemp",
            Signal::IntakeTemp => "intakeTemp",
            Signal::MafVoltage => "mafVoltage",
            Signal::InjectorPulseWidth => "injectorPulseWidth",
            Signal::FanStatus => "fanStatus",
        }
    }

    /// Known column names, most specific first
    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            Signal::Time => &["Time (s)", "Time", "Timestamp"],
            Signal::Rpm => &["Engine Speed (rpm)", "RPM", "Engine RPM"],
            Signal::Throttle => &[
                "Throttle Position (%)",
                "Accelerator Pedal Position (%)",
                "TPS",
                "Throttle",
            ],
            Signal::Load => &["Engine Load (g/rev)", "Calculated Load (g/rev)", "Load"],
            Signal::KnockRetard => &["Knock Retard (°)", "Feedback Knock (°)", "Knock Retard"],
            Signal::LambdaActual => &[
                "Air/Fuel Sensor #1 (λ)",
                "Measured Lambda",
                "Wideband Lambda",
                "Wideband O2",
                "Lambda",
            ],
            Signal::LambdaTarget => &[
                "Power Mode - Fuel Ratio Target (λ)",
                "Target Lambda",
                "Commanded Lambda",
                "Lambda Target",
            ],
            Signal::BoostActual => &[
                "Manifold Absolute Pressure (kPa)",
                "Boost Pressure (kPa)",
                "MAP",
                "Manifold Pressure",
            ],
            Signal::BoostTarget => &["Boost Target (kPa)", "Target Boost", "Boost Target"],
            Signal::WastegateDuty => &["Wastegate Duty Cycle (%)", "WGDC", "Wastegate Duty"],
            Signal::ShortTermTrim => &["Fuel Trim - Short Term (%)", "STFT", "Short Term Trim"],
            Signal::LongTermTrim => &["Fuel Trim - Long Term (%)", "LTFT", "Long Term Trim"],
            Signal::Iam => &[
                "Ignition Advance Multiplier",
                "Dynamic Advance Multiplier",
                "IAM",
                "DAM",
            ],
            Signal::CoolantTemp => &["Coolant Temperature (°C)", "ECT", "CLT", "Coolant Temp"],
            Signal::IntakeTemp => &["Intake Air Temperature (°C)", "IAT", "Intake Temp"],
            Signal::MafVoltage => &["Mass Airflow Sensor Voltage (V)", "MAF Voltage", "MAF V"],
            Signal::InjectorPulseWidth => &[
                "Injector Pulse Width (ms)",
                "IPW",
                "Injector Pulse Width",
            ],
            Signal::FanStatus => &["Radiator Fan Status", "Fan Status", "Fan"],
        }
    }
}

fn word_regex() -> &'static Regex {
    static WORDS: OnceLock<Regex> = OnceLock::new();
    WORDS.get_or_init(|| Regex::new(r"[A-Za-z0-9]+").expect("static regex"))
}

fn unit_regex() -> &'static Regex {
    static UNITS: OnceLock<Regex> = OnceLock::new();
    UNITS.get_or_init(|| Regex::new(r"\([^)]*\)").expect("static regex"))
}

/// Lowercase words outside parenthesized unit suffixes
fn keywords(text: &str) -> Vec<String> {
    let stripped = unit_regex().replace_all(text, " ");
    word_regex()
        .find_iter(&stripped)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

/// Resolves logical signals to column indices
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnResolver {
    /// Explicit signal -> column name mappings, checked first
    pub overrides: BTreeMap<Signal, String>,
}

impl ColumnResolver {
    /// Create a resolver using only the built-in aliases
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a resolver with explicit overrides
    pub fn with_overrides(overrides: BTreeMap<Signal, String>) -> Self {
        Self { overrides }
    }

    /// Force a signal to a specific column name
    pub fn set_override(&mut self, signal: Signal, column: impl Into<String>) {
        self.overrides.insert(signal, column.into());
    }

    /// Resolve a signal against a header list
    pub fn resolve(&self, signal: Signal, headers: &[String]) -> Option<usize> {
        if let Some(name) = self.overrides.get(&signal) {
            if let Some(idx) = headers
                .iter()
                .position(|h| h == name)
                .or_else(|| headers.iter().position(|h| h.eq_ignore_ascii_case(name)))
            {
                return Some(idx);
            }
            tracing::debug!(
                "Column override '{}' for {} not present in log",
                name,
                signal.key()
            );
        }

        let aliases = signal.aliases();

        for alias in aliases {
            if let Some(idx) = headers.iter().position(|h| h == alias) {
                return Some(idx);
            }
        }

        for alias in aliases {
            if let Some(idx) = headers.iter().position(|h| h.eq_ignore_ascii_case(alias)) {
                return Some(idx);
            }
        }

        let header_words: Vec<Vec<String>> = headers.iter().map(|h| keywords(h)).collect();
        for alias in aliases {
            let alias_words = keywords(alias);
            if alias_words.is_empty() {
                continue;
            }

            let best = header_words
                .iter()
                .enumerate()
                .filter(|(_, words)| alias_words.iter().all(|w| words.contains(w)))
                .filter(|(idx, words)| !signal.belongs_to_other(&headers[*idx], words))
                .filter(|(_, words)| !signal.claimed_by_other(words, alias_words.len()))
                .min_by_key(|(idx, words)| {
                    (words.len().saturating_sub(alias_words.len()), *idx)
                });

            if let Some((idx, _)) = best {
                return Some(idx);
            }
        }

        None
    }
}

/// Column indices resolved for one analyzer run
#[derive(Debug, Clone, Default)]
pub struct ResolvedColumns {
    indices: BTreeMap<Signal, usize>,
    names: BTreeMap<String, String>,
}

impl ResolvedColumns {
    /// Resolve a set of signals against a log's channels
    pub fn resolve(resolver: &ColumnResolver, log: &LogData, signals: &[Signal]) -> Self {
        let mut resolved = Self::default();
        for &signal in signals {
            if let Some(idx) = resolver.resolve(signal, log.channels()) {
                resolved.indices.insert(signal, idx);
                resolved
                    .names
                    .insert(signal.key().to_string(), log.channels()[idx].clone());
            }
        }
        resolved
    }

    /// Index of a resolved signal
    pub fn index(&self, signal: Signal) -> Option<usize> {
        self.indices.get(&signal).copied()
    }

    /// Index of a signal the analysis cannot run without
    pub fn require(&self, signal: Signal, role: &str) -> Result<usize, AnalysisError> {
        self.index(signal)
            .ok_or_else(|| AnalysisError::missing_column(role, signal))
    }

    /// Role -> resolved column name, for display
    pub fn names(&self) -> &BTreeMap<String, String> {
        &self.names
    }
}
