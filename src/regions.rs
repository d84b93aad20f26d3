//! Azure region labels as found in the `Location` app setting, mapped to their short codes

use super::Error;

pub const UNKNOWN: &str = "Unknown";

pub const REGIONS: [(&str, &str); 26] = [
    ("East US 2", "eastus2"),
    ("West US 2", "westus2"),
    ("South Central US", "southcentralus"),
    ("West Central US", "westcentralus"),
    ("East US", "eastus"),
    ("North Central US", "northcentralus"),
    ("North Europe", "northeurope"),
    ("Canada East", "canadaeast"),
    ("Central US", "centralus"),
    ("West US", "westus"),
    ("West Europe", "westeurope"),
    ("Central India", "centralindia"),
    ("Southeast Asia", "southeastasia"),
    ("Canada Central", "canadacentral"),
    ("Korea Central", "koreacentral"),
    ("France Central", "francecentral"),
    ("South India", "southindia"),
    ("Australia East", "australiaeast"),
    ("Australia Southeast", "australiasoutheast"),
    ("Japan West", "japanwest"),
    ("UK West", "ukwest"),
    ("UK South", "uksouth"),
    ("Japan East", "japaneast"),
    ("East Asia", "eastasia"),
    ("Brazil South", "brazilsouth"),
    (UNKNOWN, UNKNOWN),
];

/// Translate a human readable region label, labels missing from [REGIONS] are an error
pub fn region_code(label: &str) -> Result<&'static str, Error> {
    REGIONS
        .iter()
        .find(|(name, _)| *name == label)
        .map(|(_, code)| *code)
        .ok_or_else(|| Error::UnknownRegion(label.to_string()))
}
