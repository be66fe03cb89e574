//! Plan tiers and their capability table.
//!
//! The backend is the authority on quotas; these values drive display and the
//! advisory checks the client runs before a request.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanTier {
    Free,
    Professional,
    /// The backend also issues `enterprise` accounts; they get the top tier's
    /// table here.
    #[serde(alias = "enterprise")]
    Business,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanCapabilities {
    pub layer_limit: u32,
    pub monthly_query_limit: u32,
    /// `None` means unlimited.
    pub workspace_limit: Option<u32>,
    pub monthly_price_usd: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanOffer {
    pub tier: PlanTier,
    pub description: &'static str,
    pub features: &'static [&'static str],
    pub limitations: &'static [&'static str],
    pub highlighted: bool,
}

const FREE: PlanCapabilities = PlanCapabilities {
    layer_limit: 5,
    monthly_query_limit: 100,
    workspace_limit: Some(1),
    monthly_price_usd: 0,
};

const PROFESSIONAL: PlanCapabilities = PlanCapabilities {
    layer_limit: 50,
    monthly_query_limit: 10_000,
    workspace_limit: Some(10),
    monthly_price_usd: 99,
};

const BUSINESS: PlanCapabilities = PlanCapabilities {
    layer_limit: 200,
    monthly_query_limit: 100_000,
    workspace_limit: None,
    monthly_price_usd: 499,
};

impl PlanTier {
    pub const ALL: [PlanTier; 3] = [PlanTier::Free, PlanTier::Professional, PlanTier::Business];

    pub fn capabilities(self) -> PlanCapabilities {
        match self {
            PlanTier::Free => FREE,
            PlanTier::Professional => PROFESSIONAL,
            PlanTier::Business => BUSINESS,
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            PlanTier::Free => "Free",
            PlanTier::Professional => "Professional",
            PlanTier::Business => "Business",
        }
    }

    pub fn can_create_layer(self, existing_layers: u32) -> bool {
        existing_layers < self.capabilities().layer_limit
    }

    /// Next tier up, if any. Drives the upgrade prompt.
    pub fn upgrade(self) -> Option<PlanTier> {
        match self {
            PlanTier::Free => Some(PlanTier::Professional),
            PlanTier::Professional => Some(PlanTier::Business),
            PlanTier::Business => None,
        }
    }

    pub fn offer(self) -> PlanOffer {
        match self {
            PlanTier::Free => PlanOffer {
                tier: self,
                description: "Perfect for trying out GeoQB",
                features: &[
                    "5 spatial layers",
                    "100 queries per month",
                    "1 workspace",
                    "Community support",
                    "API access",
                ],
                limitations: &["No advanced features", "Limited data retention"],
                highlighted: false,
            },
            PlanTier::Professional => PlanOffer {
                tier: self,
                description: "For professionals and small teams",
                features: &[
                    "50 spatial layers",
                    "10,000 queries per month",
                    "10 workspaces",
                    "Priority email support",
                    "Custom data integrations",
                    "Team collaboration",
                ],
                limitations: &[],
                highlighted: true,
            },
            PlanTier::Business => PlanOffer {
                tier: self,
                description: "For growing businesses",
                features: &[
                    "200 spatial layers",
                    "100,000 queries per month",
                    "Unlimited workspaces",
                    "Priority support",
                    "Team collaboration",
                    "SSO / SAML",
                ],
                limitations: &[],
                highlighted: false,
            },
        }
    }
}

impl fmt::Display for PlanTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}
