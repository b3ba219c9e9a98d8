//! Mapping from source partition paths to table partition paths

use std::sync::Arc;

pub trait PartitionPathTranslator: Send + Sync {
    fn translate(&self, source_partition_path: &str) -> String;
}

/// Table partitions mirror the source layout
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityTranslator;

impl PartitionPathTranslator for IdentityTranslator {
    fn translate(&self, source_partition_path: &str) -> String {
        source_partition_path.to_string()
    }
}

/// Nests every table partition under a fixed prefix
#[derive(Debug, Clone)]
pub struct PrefixTranslator {
    prefix: String,
}

impl PrefixTranslator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into().trim_matches('/').to_string(),
        }
    }
}

impl PartitionPathTranslator for PrefixTranslator {
    fn translate(&self, source_partition_path: &str) -> String {
        match (self.prefix.is_empty(), source_partition_path.is_empty()) {
            (true, _) => source_partition_path.to_string(),
            (false, true) => self.prefix.clone(),
            (false, false) => format!("{}/{}", self.prefix, source_partition_path),
        }
    }
}

/// Translator choice as written in configuration: `identity` or `prefix:<p>`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TranslatorSpec {
    #[default]
    Identity,
    Prefix(String),
}

impl TranslatorSpec {
    pub fn build(&self) -> Arc<dyn PartitionPathTranslator> {
        match self {
            TranslatorSpec::Identity => Arc::new(IdentityTranslator),
            TranslatorSpec::Prefix(prefix) => Arc::new(PrefixTranslator::new(prefix.clone())),
        }
    }
}

impl std::str::FromStr for TranslatorSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("identity") {
            return Ok(TranslatorSpec::Identity);
        }
        match s.split_once(':') {
            Some((kind, prefix)) if kind.eq_ignore_ascii_case("prefix") && !prefix.is_empty() => {
                Ok(TranslatorSpec::Prefix(prefix.to_string()))
            },
            _ => Err(format!(
                "invalid partition translator '{}', expected 'identity' or 'prefix:<path>'",
                s
            )),
        }
    }
}

impl std::fmt::Display for TranslatorSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TranslatorSpec::Identity => f.write_str("identity"),
            TranslatorSpec::Prefix(prefix) => write!(f, "prefix:{}", prefix),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_translation() {
        let translator = PrefixTranslator::new("/bootstrapped/");
        assert_eq!(translator.translate("2024/01"), "bootstrapped/2024/01");
        assert_eq!(translator.translate(""), "bootstrapped");
        assert_eq!(IdentityTranslator.translate("2024/01"), "2024/01");
    }

    #[test]
    fn test_spec_parse() {
        assert_eq!("identity".parse::<TranslatorSpec>().unwrap(), TranslatorSpec::Identity);
        assert_eq!(
            "prefix:legacy".parse::<TranslatorSpec>().unwrap(),
            TranslatorSpec::Prefix("legacy".into())
        );
        assert!("prefix:".parse::<TranslatorSpec>().is_err());
        assert!("rename".parse::<TranslatorSpec>().is_err());
        let spec = TranslatorSpec::Prefix("legacy".into());
        assert_eq!(spec.build().translate("p1"), "legacy/p1");
    }
}
