//! Agent configuration.

use serde::{Deserialize, Serialize};

use crate::{collector, exporter};

/// Main agent configuration.
///
/// Ties one collector, one flow cache and one exporter together. The
/// cache section may be omitted, in which case its defaults apply.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// The collector that receives export packets
    pub collector: collector::Config,
    /// The flow cache that aggregates received and observed flows
    #[serde(default)]
    pub cache: netflow_cache::Config,
    /// The exporter that publishes expired flows downstream
    pub exporter: exporter::Config,
}

#[cfg(test)]
mod test {
    use super::*;

    const FULL: &str = r#"
{
  "collector": {
    "udp": {
      "binding_addr": "0.0.0.0:9995",
      "skip_empty": false
    }
  },
  "cache": {
    "buffer_size": 500,
    "expire_seconds": 30
  },
  "exporter": {
    "udp": {
      "addrs": ["10.0.0.1:2055", "10.0.0.2:2055"]
    }
  }
}
"#;

    #[test]
    fn full_document_parses() {
        let config: Config = serde_json::from_str(FULL).unwrap();
        let collector::Config::Udp(collector) = config.collector;
        assert_eq!(collector.binding_addr, "0.0.0.0:9995".parse().unwrap());
        assert!(!collector.skip_empty);
        assert_eq!(config.cache.buffer_size, 500);
        assert_eq!(config.cache.expire_seconds, 30);
        let exporter::Config::Udp(exporter) = config.exporter;
        assert_eq!(exporter.addrs.len(), 2);
    }

    #[test]
    fn cache_section_is_optional() {
        let config: Config = serde_json::from_str(
            r#"
{
  "collector": {"udp": {"binding_addr": "0.0.0.0:9995"}},
  "exporter": {"udp": {"addrs": ["10.0.0.1:2055"]}}
}
"#,
        )
        .unwrap();
        assert_eq!(config.cache, netflow_cache::Config::default());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = serde_json::from_str::<Config>(
            r#"
{
  "collector": {"udp": {"binding_addr": "0.0.0.0:9995"}},
  "exporter": {"udp": {"addrs": ["10.0.0.1:2055"]}},
  "flushing": true
}
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("flushing"));
    }
}
