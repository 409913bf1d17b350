//! Platform fault domains per Azure region
//!
//! Azure does not expose the number of fault domains a region offers, so the
//! values are fixed here. See
//! <https://docs.microsoft.com/en-us/azure/virtual-machines/windows/manage-availability>.

use crate::error::{AzureError, Result};
use std::collections::HashMap;

const AZURE_FAULT_DOMAINS: &[(&str, u32)] = &[
    ("eastasia", 2),
    ("southeastasia", 2),
    ("centralus", 3),
    ("eastus", 3),
    ("eastus2", 3),
    ("westus", 3),
    ("northcentralus", 3),
    ("southcentralus", 3),
    ("northeurope", 3),
    ("westeurope", 3),
    ("japanwest", 2),
    ("japaneast", 2),
    ("brazilsouth", 2),
    ("australiaeast", 2),
    ("australiasoutheast", 2),
    ("southindia", 2),
    ("centralindia", 2),
    ("westindia", 2),
    ("canadacentral", 3),
    ("canadaeast", 2),
    ("uksouth", 2),
    ("ukwest", 2),
    ("westcentralus", 2),
    ("westus2", 2),
    ("koreacentral", 2),
    ("koreasouth", 2),
];

/// Immutable region code to fault-domain count mapping
#[derive(Debug, Clone)]
pub struct FaultDomainTable {
    regions: HashMap<String, u32>,
}

impl FaultDomainTable {
    /// The table of public Azure regions
    pub fn azure() -> Self {
        Self::from_entries(AZURE_FAULT_DOMAINS.iter().copied())
    }

    pub fn from_entries<'a>(entries: impl IntoIterator<Item = (&'a str, u32)>) -> Self {
        Self {
            regions: entries
                .into_iter()
                .map(|(region, count)| (region.to_string(), count))
                .collect(),
        }
    }

    /// Fault-domain count for `region`; unknown regions are an error
    pub fn lookup(&self, region: &str) -> Result<u32> {
        self.regions
            .get(region)
            .copied()
            .ok_or_else(|| AzureError::UnknownRegion(region.to_string()))
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

impl Default for FaultDomainTable {
    fn default() -> Self {
        Self::azure()
    }
}
