//! Set-membership filtering over the categorical columns.
//!
//! An empty set for a dimension places no restriction on it, so a fresh
//! [`FilterSet::default`] passes every record through.

use crate::schema::RawRecord;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Donor,
    CampaignType,
    Region,
}

impl Dimension {
    pub const ALL: [Dimension; 3] = [Dimension::Donor, Dimension::CampaignType, Dimension::Region];

    pub fn value_of<'a>(&self, record: &'a RawRecord) -> &'a str {
        match self {
            Dimension::Donor => &record.donor,
            Dimension::CampaignType => &record.campaign_type,
            Dimension::Region => &record.region,
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Dimension::Donor => "Donor",
            Dimension::CampaignType => "Campaign Type",
            Dimension::Region => "Region",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSet {
    #[serde(default)]
    pub donors: BTreeSet<String>,
    #[serde(default)]
    pub campaign_types: BTreeSet<String>,
    #[serde(default)]
    pub regions: BTreeSet<String>,
}

impl FilterSet {
    /// A filter that matches everything.
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_donors<I, S>(mut self, donors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.donors.extend(donors.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn with_campaign_types<I, S>(mut self, campaign_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.campaign_types
            .extend(campaign_types.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn with_regions<I, S>(mut self, regions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.regions.extend(regions.into_iter().map(Into::into));
        self
    }

    pub fn selection(&self, dimension: Dimension) -> &BTreeSet<String> {
        match dimension {
            Dimension::Donor => &self.donors,
            Dimension::CampaignType => &self.campaign_types,
            Dimension::Region => &self.regions,
        }
    }

    pub fn is_unrestricted(&self) -> bool {
        self.donors.is_empty() && self.campaign_types.is_empty() && self.regions.is_empty()
    }

    pub fn matches(&self, record: &RawRecord) -> bool {
        Dimension::ALL.iter().all(|dimension| {
            let allowed = self.selection(*dimension);
            allowed.is_empty() || allowed.contains(dimension.value_of(record))
        })
    }
}

/// Records satisfying every non-empty selection in `filters`, in input order.
///
/// Each restricted dimension is evaluated as one membership mask over its whole column and
/// the masks are combined before any record is copied.
pub fn apply(records: &[RawRecord], filters: &FilterSet) -> Vec<RawRecord> {
    if filters.is_unrestricted() {
        return records.to_vec();
    }

    let mut keep = vec![true; records.len()];
    for dimension in Dimension::ALL {
        let allowed = filters.selection(dimension);
        if allowed.is_empty() {
            continue;
        }
        let column = membership_mask(records, dimension, allowed);
        keep.iter_mut().zip(column).for_each(|(k, m)| *k &= m);
    }

    records
        .iter()
        .zip(keep)
        .filter_map(|(record, kept)| kept.then(|| record.clone()))
        .collect()
}

fn membership_mask(records: &[RawRecord], dimension: Dimension, allowed: &BTreeSet<String>) -> Vec<bool> {
    records
        .iter()
        .map(|record| allowed.contains(dimension.value_of(record)))
        .collect()
}

/// Distinct values available for each dimension, the choices offered to a user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterOptions {
    pub donors: BTreeSet<String>,
    pub campaign_types: BTreeSet<String>,
    pub regions: BTreeSet<String>,
}

impl FilterOptions {
    pub fn from_records(records: &[RawRecord]) -> Self {
        let mut options = Self::default();
        for record in records {
            if !options.donors.contains(&record.donor) {
                options.donors.insert(record.donor.clone());
            }
            if !options.campaign_types.contains(&record.campaign_type) {
                options.campaign_types.insert(record.campaign_type.clone());
            }
            if !options.regions.contains(&record.region) {
                options.regions.insert(record.region.clone());
            }
        }
        options
    }

    /// Explicitly selects every available value, equivalent in effect to an empty filter.
    pub fn select_all(&self) -> FilterSet {
        FilterSet {
            donors: self.donors.clone(),
            campaign_types: self.campaign_types.clone(),
            regions: self.regions.clone(),
        }
    }
}
