use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// Upload transport backends
///
/// Defined in core because it's used by configuration and by the transport factory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportBackend {
    Local,
    Http,
}

impl FromStr for TransportBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "local" => Ok(TransportBackend::Local),
            "http" | "https" => Ok(TransportBackend::Http),
            _ => Err(anyhow::anyhow!("Invalid transport backend: {}", s)),
        }
    }
}

impl Display for TransportBackend {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            TransportBackend::Local => write!(f, "local"),
            TransportBackend::Http => write!(f, "http"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_backends() {
        assert_eq!(
            "local".parse::<TransportBackend>().unwrap(),
            TransportBackend::Local
        );
        assert_eq!(
            " HTTP ".parse::<TransportBackend>().unwrap(),
            TransportBackend::Http
        );
        assert!("s3".parse::<TransportBackend>().is_err());
    }

    #[test]
    fn display_matches_parse() {
        for backend in [TransportBackend::Local, TransportBackend::Http] {
            assert_eq!(
                backend.to_string().parse::<TransportBackend>().unwrap(),
                backend
            );
        }
    }
}
