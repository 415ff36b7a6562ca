//! Route identity derived from fixed-width LRS route identifiers.
//!
//! A route identifier such as `10000495092` packs five fields:
//!
//! | chars  | field           | example |
//! |--------|-----------------|---------|
//! | 0      | route class     | `1`     |
//! | 1      | qualifier       | `0`     |
//! | 2      | inventory flag  | `0`     |
//! | 3..8   | route number    | `00495` |
//! | 8..11  | county code     | `092`   |

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{PipelineError, Result};

const ROUTE_ID_LEN: usize = 11;

/// Functional class of a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RouteClass {
    Interstate = 1,
    Us = 2,
    State = 3,
    Secondary = 4,
}

impl RouteClass {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(RouteClass::Interstate),
            2 => Some(RouteClass::Us),
            3 => Some(RouteClass::State),
            4 => Some(RouteClass::Secondary),
            _ => None,
        }
    }

    /// Sign abbreviation used by the seasonal and strategic corridor tables.
    pub fn from_sign(sign: &str) -> Option<Self> {
        match sign.trim().to_ascii_uppercase().as_str() {
            "I" => Some(RouteClass::Interstate),
            "US" => Some(RouteClass::Us),
            "NC" => Some(RouteClass::State),
            _ => None,
        }
    }

    /// Label written to the scored output.
    pub fn label(self) -> &'static str {
        match self {
            RouteClass::Interstate => "Interstate",
            RouteClass::Us => "US Route",
            RouteClass::State => "NC Route",
            RouteClass::Secondary => "Secondary Routes",
        }
    }
}

impl fmt::Display for RouteClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Fields decoded from a route identifier before class filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteIdParts {
    pub route_id: String,
    pub class_code: u8,
    pub qualifier: u8,
    pub inventory: u8,
    pub number: u32,
    pub county: u32,
}

impl RouteIdParts {
    /// Decodes a raw identifier. A fractional suffix left behind by numeric
    /// exports (`"10000495092.0"`) is dropped first.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let route_id = trimmed.split('.').next().unwrap_or_default();

        let invalid = |reason: &str| PipelineError::InvalidRouteId {
            route_id: trimmed.to_string(),
            reason: reason.to_string(),
        };

        if route_id.len() != ROUTE_ID_LEN {
            return Err(invalid(&format!(
                "expected {ROUTE_ID_LEN} digits, found {}",
                route_id.len()
            )));
        }
        if !route_id.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid("contains non-digit characters"));
        }

        let digit = |i: usize| route_id.as_bytes()[i] - b'0';
        let number = route_id[3..8]
            .parse::<u32>()
            .map_err(|_| invalid("route number is not numeric"))?;
        let county = route_id[8..11]
            .parse::<u32>()
            .map_err(|_| invalid("county code is not numeric"))?;

        Ok(Self {
            route_id: route_id.to_string(),
            class_code: digit(0),
            qualifier: digit(1),
            inventory: digit(2),
            number,
            county,
        })
    }

    pub fn into_key(self) -> Result<RouteKey> {
        let class = RouteClass::from_code(self.class_code).ok_or_else(|| {
            PipelineError::InvalidRouteId {
                route_id: self.route_id.clone(),
                reason: format!("unknown route class {}", self.class_code),
            }
        })?;
        Ok(RouteKey {
            route_id: self.route_id,
            class,
            qualifier: self.qualifier,
            inventory: self.inventory,
            number: self.number,
            county: self.county,
        })
    }
}

/// Composite route identity shared by every dataset after loading.
///
/// Ordering follows `route_id`, which determines every other field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RouteKey {
    pub route_id: String,
    pub class: RouteClass,
    pub qualifier: u8,
    pub inventory: u8,
    pub number: u32,
    pub county: u32,
}

impl RouteKey {
    pub fn parse(raw: &str) -> Result<Self> {
        RouteIdParts::parse(raw)?.into_key()
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.route_id)
    }
}
