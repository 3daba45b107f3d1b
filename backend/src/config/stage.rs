use std::fmt::Display;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Stage {
    Development,
    #[default]
    Production,
}

impl Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stage = match self {
            Stage::Development => "development",
            Stage::Production => "production",
        };
        write!(f, "{}", stage)
    }
}

impl TryFrom<&String> for Stage {
    type Error = anyhow::Error;

    fn try_from(value: &String) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" | "local" => Ok(Stage::Development),
            "production" | "prod" => Ok(Stage::Production),
            other => Err(anyhow::anyhow!("unknown stage: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_stages() {
        assert_eq!(
            Stage::try_from(&"Development".to_string()).unwrap(),
            Stage::Development
        );
        assert_eq!(Stage::try_from(&"prod".to_string()).unwrap(), Stage::Production);
    }

    #[test]
    fn unknown_stage_is_an_error_and_defaults_to_production() {
        let parsed = Stage::try_from(&"staging".to_string());
        assert!(parsed.is_err());
        assert_eq!(parsed.unwrap_or_default(), Stage::Production);
    }
}
