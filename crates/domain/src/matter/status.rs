//! Matter lifecycle status and case classification.

use serde::{Deserialize, Serialize};

/// The status of a matter.
///
/// Transitions are permissive: any status may follow any other through an
/// explicit status change, and assigning an attorney moves `New` to `Active`.
/// No status is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub enum MatterStatus {
    #[default]
    New,
    Active,
    Discovery,
    Settled,
    Closed,
}

impl MatterStatus {
    pub const ALL: [MatterStatus; 5] = [
        MatterStatus::New,
        MatterStatus::Active,
        MatterStatus::Discovery,
        MatterStatus::Settled,
        MatterStatus::Closed,
    ];

    /// Returns true if the matter counts as an open case.
    pub fn is_open(&self) -> bool {
        !matches!(self, MatterStatus::Closed)
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            MatterStatus::New => "New",
            MatterStatus::Active => "Active",
            MatterStatus::Discovery => "Discovery",
            MatterStatus::Settled => "Settled",
            MatterStatus::Closed => "Closed",
        }
    }
}

impl std::fmt::Display for MatterStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MatterStatus {
    type Err = String;

    /// Parses a status name, ignoring ASCII case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MatterStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown matter status: {s}"))
    }
}

/// The area of law a matter belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CaseType {
    PersonalInjury,
    Employment,
    Commercial,
    RealEstate,
}

impl CaseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaseType::PersonalInjury => "PersonalInjury",
            CaseType::Employment => "Employment",
            CaseType::Commercial => "Commercial",
            CaseType::RealEstate => "RealEstate",
        }
    }
}

impl std::fmt::Display for CaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!("discovery".parse::<MatterStatus>(), Ok(MatterStatus::Discovery));
        assert_eq!(" Closed ".parse::<MatterStatus>(), Ok(MatterStatus::Closed));
        assert!("Archived".parse::<MatterStatus>().is_err());
    }

    #[test]
    fn only_closed_is_not_open() {
        let open: Vec<_> = MatterStatus::ALL.into_iter().filter(|s| s.is_open()).collect();
        assert_eq!(open.len(), 4);
        assert!(!MatterStatus::Closed.is_open());
    }

    #[test]
    fn serializes_as_variant_name() {
        assert_eq!(
            serde_json::to_value(MatterStatus::Discovery).unwrap(),
            serde_json::json!("Discovery")
        );
        assert_eq!(
            serde_json::to_value(CaseType::RealEstate).unwrap(),
            serde_json::json!("RealEstate")
        );
    }
}
