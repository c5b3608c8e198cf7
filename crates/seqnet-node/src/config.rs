use seqnet_common::{account_of, Crypto, SeqnetError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;

/// Node configuration as represented in the YAML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Address to listen on (e.g., "127.0.0.1:7000")
    pub listen_address: String,
    /// Address peers should dial, when it differs from the bound one.
    pub advertise_address: Option<String>,
    /// Peers to connect to on start.
    pub bootstrap: Vec<String>,
    /// Initial balances.
    pub accounts: Vec<AccountEntry>,
    /// Present when this node is the sequencer.
    pub sequencer: Option<SequencerConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountEntry {
    pub account: String, // hex encoded public key
    pub balance: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequencerConfig {
    pub secret_key: String, // hex encoded
    #[serde(default = "default_block_size")]
    pub block_size: usize,
}

fn default_block_size() -> usize {
    10
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            listen_address: "127.0.0.1:0".to_string(),
            advertise_address: None,
            bootstrap: Vec::new(),
            accounts: Vec::new(),
            sequencer: None,
        }
    }
}

impl NodeConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SeqnetError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| SeqnetError::ConfigError(format!("{}: {}", path.display(), e)))?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, SeqnetError> {
        let config: NodeConfig =
            serde_yaml::from_str(content).map_err(|e| SeqnetError::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every field that is parsed later, so a bad file fails up front.
    pub fn validate(&self) -> Result<(), SeqnetError> {
        self.advertise_addr()?;
        self.bootstrap_addrs()?;
        self.initial_balances()?;
        self.sequencer_keys()?;
        Ok(())
    }

    pub fn advertise_addr(&self) -> Result<Option<SocketAddr>, SeqnetError> {
        self.advertise_address
            .as_deref()
            .map(parse_addr)
            .transpose()
    }

    pub fn bootstrap_addrs(&self) -> Result<Vec<SocketAddr>, SeqnetError> {
        self.bootstrap.iter().map(|a| parse_addr(a)).collect()
    }

    pub fn initial_balances(&self) -> Result<HashMap<String, f64>, SeqnetError> {
        let mut balances = HashMap::new();
        for entry in &self.accounts {
            // Stored under the canonical lowercase form transactions carry.
            let account = account_of(&Crypto::public_key_from_str(&entry.account)?);
            if !entry.balance.is_finite() || entry.balance < 0.0 {
                return Err(SeqnetError::ConfigError(format!(
                    "invalid balance {} for {}",
                    entry.balance, entry.account
                )));
            }
            balances.insert(account, entry.balance);
        }
        Ok(balances)
    }

    pub fn sequencer_keys(&self) -> Result<Option<(Crypto, usize)>, SeqnetError> {
        let Some(sequencer) = &self.sequencer else {
            return Ok(None);
        };
        if sequencer.block_size == 0 {
            return Err(SeqnetError::ConfigError(
                "sequencer block_size must be at least 1".to_string(),
            ));
        }
        let keys = Crypto::from_secret_hex(&sequencer.secret_key)?;
        Ok(Some((keys, sequencer.block_size)))
    }
}

fn parse_addr(addr: &str) -> Result<SocketAddr, SeqnetError> {
    addr.trim()
        .parse()
        .map_err(|e| SeqnetError::ConfigError(format!("invalid address {addr:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = NodeConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config.listen_address, "127.0.0.1:0");
        assert!(config.bootstrap.is_empty());
        assert!(config.sequencer_keys().unwrap().is_none());
    }

    #[test]
    fn full_document_parses() {
        let keys = Crypto::generate();
        let yaml = format!(
            r#"
listen_address: "127.0.0.1:7100"
bootstrap: ["127.0.0.1:7101", "127.0.0.1:7102"]
accounts:
  - account: "{account}"
    balance: 100.0
sequencer:
  secret_key: "{secret}"
"#,
            account = keys.account(),
            secret = keys.secret_hex()
        );
        let config = NodeConfig::from_yaml_str(&yaml).unwrap();
        assert_eq!(config.bootstrap_addrs().unwrap().len(), 2);
        assert_eq!(
            config.initial_balances().unwrap().get(&keys.account()),
            Some(&100.0)
        );
        let (sequencer, block_size) = config.sequencer_keys().unwrap().unwrap();
        assert_eq!(sequencer.account(), keys.account());
        assert_eq!(block_size, 10);
    }

    #[test]
    fn bad_values_are_config_errors() {
        assert!(NodeConfig::from_yaml_str("bootstrap: [\"nowhere\"]").is_err());
        assert!(NodeConfig::from_yaml_str("accounts: [{account: zz, balance: 1.0}]").is_err());
        assert!(
            NodeConfig::from_yaml_str("sequencer: {secret_key: \"00\", block_size: 1}").is_err()
        );
        assert!(NodeConfig::from_yaml_str("listen_address: [1, 2]").is_err());
    }

    #[test]
    fn account_case_is_normalised() {
        let keys = Crypto::generate();
        let yaml = format!(
            "accounts: [{{account: \"  {}\", balance: 5.0}}]",
            keys.account().to_uppercase()
        );
        let balances = NodeConfig::from_yaml_str(&yaml)
            .unwrap()
            .initial_balances()
            .unwrap();
        assert_eq!(balances.get(&keys.account()), Some(&5.0));
        assert_eq!(balances.len(), 1);
    }

    #[test]
    fn zero_block_size_is_rejected() {
        let keys = Crypto::generate();
        let yaml = format!(
            "sequencer: {{secret_key: \"{}\", block_size: 0}}",
            keys.secret_hex()
        );
        assert!(matches!(
            NodeConfig::from_yaml_str(&yaml),
            Err(SeqnetError::ConfigError(_))
        ));
    }
}
