// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Callsign-based operator classification for marker colors.
//!
//! [`Classifier::classify`] walks a fixed priority cascade; the first rule
//! that matches decides the bucket:
//!
//! 1. no callsign: home-country or international default
//! 2. military/government callsign prefixes
//! 3. home-country `AF` + 3-4 digit callsigns (military)
//! 4. known three-letter operator code
//! 5. cargo operator markers anywhere in the callsign
//! 6. general-aviation tail numbers (`N12345`, `N123AB`)
//! 7. regional operator prefixes
//! 8. home-country or international default

use lazy_static::lazy_static;
use regex::Regex;

use crate::protocol::UNKNOWN_LABEL;

/// Origin-country marker for the home-country rules.
pub const DEFAULT_HOME_COUNTRY: &str = "United States";

const MILITARY_PREFIXES: [&str; 8] = ["RCH", "SAM", "SPAR", "VEN", "TANK", "BULL", "EAG", "NATO"];
const REGIONAL_CODES: [&str; 5] = ["SKW", "RPA", "ENY", "AWI", "CPZ"];

lazy_static! {
    static ref HOME_MILITARY: Regex = Regex::new(r"^AF\d{3,4}").expect("valid military regex");
    static ref TAIL_NUMBER: Regex = Regex::new(r"^N\d{1,5}[A-Z]{0,2}$").expect("valid tail number regex");
}

/// Color bucket for a marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorBucket {
    United,
    American,
    Delta,
    Southwest,
    JetBlue,
    Alaska,
    Frontier,
    Spirit,
    FedEx,
    Ups,
    Atlas,
    SkyWest,
    Republic,
    Envoy,
    AirWisconsin,
    Compass,
    Military,
    Government,
    GeneralAviation,
    DefaultDomestic,
    DefaultInternational,
}

impl ColorBucket {
    /// Bucket for a three-letter operator code.
    #[must_use]
    pub fn from_code(code: &str) -> Option<Self> {
        let bucket = match code {
            "UAL" => Self::United,
            "AAL" => Self::American,
            "DAL" => Self::Delta,
            "SWA" => Self::Southwest,
            "JBU" => Self::JetBlue,
            "ASA" => Self::Alaska,
            "FFT" => Self::Frontier,
            "NKS" => Self::Spirit,
            "FDX" => Self::FedEx,
            "UPS" => Self::Ups,
            "GTI" => Self::Atlas,
            "SKW" => Self::SkyWest,
            "RPA" => Self::Republic,
            "ENY" => Self::Envoy,
            "AWI" => Self::AirWisconsin,
            "CPZ" => Self::Compass,
            "MIL" => Self::Military,
            "GOV" => Self::Government,
            "BIZ" => Self::GeneralAviation,
            _ => return None,
        };
        Some(bucket)
    }

    /// Marker fill color as a CSS hex string.
    #[must_use]
    pub fn hex(self) -> &'static str {
        match self {
            Self::United => "#ec4899",
            Self::American => "#dc2626",
            Self::Delta => "#9333ea",
            Self::Southwest => "#f97316",
            Self::JetBlue => "#10b981",
            Self::Alaska => "#f59e0b",
            Self::Frontier => "#14b8a6",
            Self::Spirit => "#eab308",
            Self::FedEx | Self::DefaultInternational => "#7c2d12",
            Self::Ups => "#b91c1c",
            Self::Atlas => "#92400e",
            Self::SkyWest => "#06b6d4",
            Self::Republic => "#059669",
            Self::Envoy => "#0891b2",
            Self::AirWisconsin => "#84cc16",
            Self::Compass => "#3b82f6",
            Self::Military => "#991b1b",
            Self::Government => "#d97706",
            Self::GeneralAviation => "#4b5563",
            Self::DefaultDomestic => "#c2410c",
        }
    }

    #[must_use]
    pub fn display_name(self) -> &'static str {
        match self {
            Self::United => "United",
            Self::American => "American",
            Self::Delta => "Delta",
            Self::Southwest => "Southwest",
            Self::JetBlue => "JetBlue",
            Self::Alaska => "Alaska",
            Self::Frontier => "Frontier",
            Self::Spirit => "Spirit",
            Self::FedEx => "FedEx",
            Self::Ups => "UPS",
            Self::Atlas => "Atlas Air",
            Self::SkyWest => "SkyWest",
            Self::Republic => "Republic",
            Self::Envoy => "Envoy",
            Self::AirWisconsin => "Air Wisconsin",
            Self::Compass => "Compass",
            Self::Military => "Military",
            Self::Government => "Government",
            Self::GeneralAviation => "Business / GA",
            Self::DefaultDomestic => "Domestic",
            Self::DefaultInternational => "International",
        }
    }
}

/// Maps callsigns to color buckets.
#[derive(Debug, Clone)]
pub struct Classifier {
    home_country: String,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(DEFAULT_HOME_COUNTRY)
    }
}

impl Classifier {
    /// `home_country` is matched as a substring of the origin country.
    #[must_use]
    pub fn new(home_country: impl Into<String>) -> Self {
        Self {
            home_country: home_country.into(),
        }
    }

    fn is_home(&self, origin_region: &str) -> bool {
        origin_region.contains(self.home_country.as_str())
    }

    fn country_default(&self, origin_region: &str) -> ColorBucket {
        if self.is_home(origin_region) {
            ColorBucket::DefaultDomestic
        } else {
            ColorBucket::DefaultInternational
        }
    }

    #[must_use]
    pub fn classify(&self, label: Option<&str>, origin_region: &str) -> ColorBucket {
        let label = match label {
            Some(l) if l != UNKNOWN_LABEL && !l.trim().is_empty() => l,
            _ => return self.country_default(origin_region),
        };

        let callsign = label.trim().to_uppercase();
        let code = callsign.get(..3).unwrap_or(&callsign);

        if MILITARY_PREFIXES.iter().any(|p| callsign.starts_with(p)) {
            return ColorBucket::Military;
        }
        if self.is_home(origin_region) && HOME_MILITARY.is_match(&callsign) {
            return ColorBucket::Military;
        }

        if let Some(bucket) = ColorBucket::from_code(code) {
            return bucket;
        }

        if callsign.contains("FDX") || callsign.contains("FX") {
            return ColorBucket::FedEx;
        }
        if callsign.contains("UPS") {
            return ColorBucket::Ups;
        }
        if callsign.contains("GTI") {
            return ColorBucket::Atlas;
        }

        if TAIL_NUMBER.is_match(&callsign) {
            return ColorBucket::GeneralAviation;
        }

        if REGIONAL_CODES.iter().any(|p| callsign.starts_with(p)) {
            return ColorBucket::from_code(code).unwrap_or(ColorBucket::DefaultDomestic);
        }

        self.country_default(origin_region)
    }
}

/// Classify with the default home country.
#[must_use]
pub fn classify(label: Option<&str>, origin_region: &str) -> ColorBucket {
    Classifier::default().classify(label, origin_region)
}
