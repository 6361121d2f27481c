use std::collections::BTreeSet;
use std::fmt;

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};

/// Per-pathway configuration. A `None` field is "don't care": it is neither
/// compared nor written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathwaySettings {
    /// Executor gas enforced for `lzReceive` on the remote side.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enforced_gas: Option<u128>,
    /// Block confirmations required on outbound messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmations: Option<u64>,
    /// Required verifier set, compared without regard to order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_dvns: Option<Vec<Address>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SettingField {
    EnforcedGas,
    Confirmations,
    RequiredDvns,
}

impl fmt::Display for SettingField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SettingField::EnforcedGas => "enforcedGas",
            SettingField::Confirmations => "confirmations",
            SettingField::RequiredDvns => "requiredDvns",
        })
    }
}

impl PathwaySettings {
    /// Fields declared here whose value differs from `observed`.
    pub fn drift(&self, observed: &PathwaySettings) -> Vec<SettingField> {
        let mut fields = Vec::new();
        if self.enforced_gas.is_some() && self.enforced_gas != observed.enforced_gas {
            fields.push(SettingField::EnforcedGas);
        }
        if self.confirmations.is_some() && self.confirmations != observed.confirmations {
            fields.push(SettingField::Confirmations);
        }
        if let Some(desired) = &self.required_dvns {
            let matches = observed
                .required_dvns
                .as_ref()
                .is_some_and(|seen| as_set(seen) == as_set(desired));
            if !matches {
                fields.push(SettingField::RequiredDvns);
            }
        }
        fields
    }

    /// Copy of `base` with every field declared here laid over it.
    pub fn overlay(&self, base: &PathwaySettings) -> PathwaySettings {
        PathwaySettings {
            enforced_gas: self.enforced_gas.or(base.enforced_gas),
            confirmations: self.confirmations.or(base.confirmations),
            required_dvns: self
                .required_dvns
                .clone()
                .or_else(|| base.required_dvns.clone()),
        }
    }
}

fn as_set(addrs: &[Address]) -> BTreeSet<Address> {
    addrs.iter().copied().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unspecified_fields_never_drift() {
        let desired = PathwaySettings::default();
        let observed = PathwaySettings {
            enforced_gas: Some(200_000),
            confirmations: Some(15),
            required_dvns: Some(vec![Address::repeat_byte(1)]),
        };
        assert!(desired.drift(&observed).is_empty());
    }

    #[test]
    fn reports_each_differing_field() {
        let desired = PathwaySettings {
            enforced_gas: Some(200_000),
            confirmations: Some(15),
            required_dvns: None,
        };
        let observed = PathwaySettings {
            enforced_gas: Some(100_000),
            confirmations: None,
            required_dvns: None,
        };
        assert_eq!(
            desired.drift(&observed),
            vec![SettingField::EnforcedGas, SettingField::Confirmations]
        );
    }

    #[test]
    fn dvn_order_is_ignored() {
        let (x, y) = (Address::repeat_byte(1), Address::repeat_byte(2));
        let desired = PathwaySettings {
            required_dvns: Some(vec![x, y]),
            ..Default::default()
        };
        let observed = PathwaySettings {
            required_dvns: Some(vec![y, x]),
            ..Default::default()
        };
        assert!(desired.drift(&observed).is_empty());

        let missing = PathwaySettings::default();
        assert_eq!(desired.drift(&missing), vec![SettingField::RequiredDvns]);
    }

    #[test]
    fn overlay_keeps_undeclared_fields() {
        let base = PathwaySettings {
            enforced_gas: Some(1),
            confirmations: Some(2),
            required_dvns: None,
        };
        let desired = PathwaySettings {
            confirmations: Some(20),
            ..Default::default()
        };
        let merged = desired.overlay(&base);
        assert_eq!(merged.enforced_gas, Some(1));
        assert_eq!(merged.confirmations, Some(20));
    }
}
