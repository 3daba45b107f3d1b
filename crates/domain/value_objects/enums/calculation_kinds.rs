use std::fmt::Display;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CalculationKind {
    Differentiate,
    Integrate,
    Arithmetic,
}

impl CalculationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CalculationKind::Differentiate => "differentiate",
            CalculationKind::Integrate => "integrate",
            CalculationKind::Arithmetic => "arithmetic",
        }
    }

    /// Classifies a query by its leading verb, e.g. `differentiate x^2`.
    pub fn classify(input: &str) -> Self {
        let verb = input
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();

        match verb.as_str() {
            "differentiate" | "derivative" => CalculationKind::Differentiate,
            "integrate" | "integral" => CalculationKind::Integrate,
            _ => CalculationKind::Arithmetic,
        }
    }
}

impl Display for CalculationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
