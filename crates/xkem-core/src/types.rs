use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// ML-KEM parameter set used to wrap the content key of a container
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KemVariant {
    /// ML-KEM-768 (NIST category 3)
    #[default]
    #[serde(rename = "ml-kem-768")]
    MlKem768,
    /// ML-KEM-1024 (NIST category 5)
    #[serde(rename = "ml-kem-1024")]
    MlKem1024,
}

impl KemVariant {
    pub const ALL: [KemVariant; 2] = [KemVariant::MlKem768, KemVariant::MlKem1024];

    pub const fn public_key_len(self) -> usize {
        match self {
            KemVariant::MlKem768 => 1184,
            KemVariant::MlKem1024 => 1568,
        }
    }

    pub const fn private_key_len(self) -> usize {
        match self {
            KemVariant::MlKem768 => 2400,
            KemVariant::MlKem1024 => 3168,
        }
    }

    pub const fn ciphertext_len(self) -> usize {
        match self {
            KemVariant::MlKem768 => 1088,
            KemVariant::MlKem1024 => 1568,
        }
    }

    pub fn from_public_key_len(len: usize) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.public_key_len() == len)
    }

    pub fn from_private_key_len(len: usize) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.private_key_len() == len)
    }

    pub fn from_ciphertext_len(len: usize) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.ciphertext_len() == len)
    }

    pub const fn name(self) -> &'static str {
        match self {
            KemVariant::MlKem768 => "ml-kem-768",
            KemVariant::MlKem1024 => "ml-kem-1024",
        }
    }
}

impl fmt::Display for KemVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for KemVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ml-kem-768" | "mlkem768" | "768" => Ok(KemVariant::MlKem768),
            "ml-kem-1024" | "mlkem1024" | "1024" => Ok(KemVariant::MlKem1024),
            other => Err(format!(
                "unknown KEM variant '{other}' (expected ml-kem-768 or ml-kem-1024)"
            )),
        }
    }
}
