//! National-importance classification of routes.
//!
//! A route is `nhs` when the HPMS dataset flags it as part of the National
//! Highway System, `stc_but_not_nhs` when it is one of the state's strategic
//! transportation corridors without being on the NHS, and `other` otherwise.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, info, warn};

use crate::diagnostics::StageReport;
use crate::error::Result;
use crate::reader::Table;
use crate::route::{RouteClass, RouteKey};

pub const STAGE: &str = "route_classifier";

/// Designated strategic transportation corridors, as (class, route number).
pub const STRATEGIC_CORRIDORS: [(RouteClass, u32); 30] = [
    (RouteClass::Us, 74),
    (RouteClass::Us, 441),
    (RouteClass::Interstate, 26),
    (RouteClass::Us, 23),
    (RouteClass::Us, 321),
    (RouteClass::Us, 421),
    (RouteClass::Interstate, 73),
    (RouteClass::Interstate, 77),
    (RouteClass::Interstate, 74),
    (RouteClass::Interstate, 85),
    (RouteClass::Interstate, 285),
    (RouteClass::Us, 29),
    (RouteClass::State, 87),
    (RouteClass::Us, 1),
    (RouteClass::Interstate, 495),
    (RouteClass::Us, 64),
    (RouteClass::Us, 13),
    (RouteClass::Us, 17),
    (RouteClass::Us, 70),
    (RouteClass::Interstate, 40),
    (RouteClass::State, 49),
    (RouteClass::Interstate, 795),
    (RouteClass::Us, 117),
    (RouteClass::Interstate, 95),
    (RouteClass::Us, 264),
    (RouteClass::Us, 401),
    (RouteClass::State, 24),
    (RouteClass::Us, 258),
    (RouteClass::State, 11),
    (RouteClass::Us, 158),
];

pub fn is_strategic_corridor(class: RouteClass, number: u32) -> bool {
    STRATEGIC_CORRIDORS.contains(&(class, number))
}

/// Three-way national-importance category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportanceCategory {
    Nhs,
    StcButNotNhs,
    Other,
}

impl ImportanceCategory {
    pub fn classify(nhs: bool, stc: bool) -> Self {
        match (nhs, stc) {
            (true, _) => ImportanceCategory::Nhs,
            (false, true) => ImportanceCategory::StcButNotNhs,
            (false, false) => ImportanceCategory::Other,
        }
    }

    pub fn factor(self) -> f64 {
        match self {
            ImportanceCategory::Nhs => 1.0,
            ImportanceCategory::StcButNotNhs => 0.5,
            ImportanceCategory::Other => 0.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ImportanceCategory::Nhs => "nhs",
            ImportanceCategory::StcButNotNhs => "stc_but_not_nhs",
            ImportanceCategory::Other => "other",
        }
    }
}

/// One HPMS route record after sign filtering.
#[derive(Debug, Clone, PartialEq)]
pub struct HpmsRecord {
    pub route_id: String,
    pub class: RouteClass,
    pub number: u32,
    pub nhs: bool,
}

/// HPMS route signs: 2 Interstate, 3 US, 4 State. Other signs are dropped.
fn class_from_hpms_sign(sign: u32) -> Option<RouteClass> {
    match sign {
        2 => Some(RouteClass::Interstate),
        3 => Some(RouteClass::Us),
        4 => Some(RouteClass::State),
        _ => None,
    }
}

/// Loads HPMS records keyed by route id; the first record of a route wins.
#[tracing::instrument(skip_all, fields(dataset = table.dataset(), rows = table.len()))]
pub fn load_national_highways(table: &Table) -> Result<(HashMap<String, HpmsRecord>, StageReport)> {
    let route_col = table.column("route_id")?;
    let sign_col = table.column("route_sign")?;
    let number_col = table.column("route_numb")?;
    let nhs_col = table.column("nhs")?;

    let mut records = HashMap::new();
    let mut other_signs = 0;
    let mut duplicates = 0;

    for row in table.rows() {
        let raw = row.required_str(&route_col)?;
        let route_id = raw.split('.').next().unwrap_or(raw).to_string();
        let sign = row.required_u32(&sign_col)?;
        let Some(class) = class_from_hpms_sign(sign) else {
            other_signs += 1;
            continue;
        };
        let number = row.required_u32(&number_col)?;
        let nhs = row.optional_f64(Some(&nhs_col))?.is_some_and(|v| v != 0.0);

        if records.contains_key(&route_id) {
            duplicates += 1;
            continue;
        }
        records.insert(
            route_id.clone(),
            HpmsRecord {
                route_id,
                class,
                number,
                nhs,
            },
        );
    }

    let mut report = StageReport::new("national_highways").with_rows(table.len(), records.len());
    report.count("other_route_signs", other_signs);
    report.count("duplicate_route_ids", duplicates);
    debug!(kept = records.len(), other_signs, duplicates, "HPMS records loaded");
    Ok((records, report))
}

/// National-importance attributes of one route.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouteImportance {
    pub stc: bool,
    pub nhs_net: bool,
    pub category: ImportanceCategory,
}

impl RouteImportance {
    pub fn factor(&self) -> f64 {
        self.category.factor()
    }
}

/// Classifies every distinct route of the volume grid.
///
/// Strategic corridor membership comes from the route's own (class, number);
/// NHS membership from the HPMS record with the same route id, defaulting to
/// off when HPMS has no record for the route.
#[tracing::instrument(skip_all, fields(routes = routes.len(), hpms = hpms.len()))]
pub fn classify_routes(
    routes: &BTreeSet<RouteKey>,
    hpms: &HashMap<String, HpmsRecord>,
) -> (BTreeMap<String, RouteImportance>, StageReport) {
    let mut classified = BTreeMap::new();
    let mut missing_from_hpms = 0;

    for route in routes {
        let stc = is_strategic_corridor(route.class, route.number);
        let nhs_net = match hpms.get(&route.route_id) {
            Some(record) => record.nhs,
            None => {
                missing_from_hpms += 1;
                debug!(route = %route, "Route not found in HPMS");
                false
            }
        };
        classified.insert(
            route.route_id.clone(),
            RouteImportance {
                stc,
                nhs_net,
                category: ImportanceCategory::classify(nhs_net, stc),
            },
        );
    }

    let covered: BTreeSet<(RouteClass, u32)> = routes.iter().map(|r| (r.class, r.number)).collect();
    let missing_corridors: Vec<String> = STRATEGIC_CORRIDORS
        .iter()
        .filter(|c| !covered.contains(c))
        .map(|(class, number)| format!("{class} {number}"))
        .collect();
    if !missing_corridors.is_empty() {
        warn!(corridors = ?missing_corridors, "Strategic corridors without volume data");
    }

    let mut report = StageReport::new(STAGE).with_rows(routes.len(), classified.len());
    report.count("routes_missing_from_hpms", missing_from_hpms);
    report.count("corridors_without_volume", missing_corridors.len());
    for category in [
        ImportanceCategory::Nhs,
        ImportanceCategory::StcButNotNhs,
        ImportanceCategory::Other,
    ] {
        let n = classified.values().filter(|c| c.category == category).count();
        report.count(category.as_str(), n);
    }

    info!(
        routes = classified.len(),
        missing_from_hpms,
        "Routes classified"
    );
    (classified, report)
}
