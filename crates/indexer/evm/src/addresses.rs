use std::str::FromStr;

use alloy::primitives::Address;
use common::config::ContractsConfig;
use eyre::WrapErr;

/// Fixed contract addresses the decoder classifies logs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContractAddresses {
    pub token: Address,
    pub community_admin: Address,
    pub governance: Address,
    pub treasury: Address,
    /// Transfers into this contract never count as beneficiary activity.
    pub attestation: Address,
}

impl TryFrom<&ContractsConfig> for ContractAddresses {
    type Error = eyre::Report;

    fn try_from(config: &ContractsConfig) -> Result<Self, Self::Error> {
        let parse = |name: &str, value: &str| {
            Address::from_str(value).wrap_err_with(|| format!("Invalid {name} address: {value}"))
        };

        Ok(Self {
            token: parse("token", &config.token)?,
            community_admin: parse("community_admin", &config.community_admin)?,
            governance: parse("governance", &config.governance)?,
            treasury: parse("treasury", &config.treasury)?,
            attestation: parse("attestation", &config.attestation)?,
        })
    }
}
