//! Census tract traffic growth factor.
//!
//! Each tract reports a total 24-hour growth rate between a base and a
//! horizon year. The rate is converted to a compound yearly rate, attached to
//! every intersecting grid interval, filled along the route where the tract
//! has no rate, averaged per interval and min-max scaled.

use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

use super::spatial::{CrosswalkMatch, grid_keys, strip_fraction};
use crate::config::Parameters;
use crate::diagnostics::StageReport;
use crate::error::{PipelineError, Result};
use crate::reader::Table;
use crate::reconcile::{GridKey, ReconciledSegment};
use crate::scaling::{mean, min_max_scale};

pub const STAGE: &str = "growth_factor";

const RTOL: f64 = 1e-5;
const ATOL: f64 = 1e-8;

fn is_close(a: f64, b: f64) -> bool {
    (a - b).abs() <= ATOL + RTOL * b.abs()
}

/// Compound yearly rate, in percent, equivalent to `total_pct` over `years`.
pub fn yearly_growth(total_pct: f64, years: u32) -> f64 {
    ((1.0 + total_pct / 100.0).powf(1.0 / years as f64) - 1.0) * 100.0
}

/// Growth figures of one census tract.
#[derive(Debug, Clone, PartialEq)]
pub struct TractGrowth {
    pub geoid: String,
    pub flow_base: Option<f64>,
    pub flow_horizon: Option<f64>,
    /// Total growth in percent between the base and horizon years.
    pub growth_rate: Option<f64>,
}

impl TractGrowth {
    pub fn yearly_growth(&self, years: u32) -> Option<f64> {
        self.growth_rate.map(|gr| yearly_growth(gr, years))
    }

    /// Yearly rate implied by the two flows, when both are usable.
    pub fn flow_yearly_growth(&self, years: u32) -> Option<f64> {
        match (self.flow_base, self.flow_horizon) {
            (Some(base), Some(horizon)) if base > 0.0 => {
                Some(((horizon / base).powf(1.0 / years as f64) - 1.0) * 100.0)
            }
            _ => None,
        }
    }
}

/// Loads tract growth keyed by GEOID.
///
/// # Errors
///
/// [`PipelineError::GrowthRateMismatch`] when a tract's reported rate and the
/// rate implied by its flows disagree.
#[tracing::instrument(skip_all, fields(dataset = table.dataset(), rows = table.len()))]
pub fn load_census_growth(table: &Table, params: &Parameters) -> Result<(HashMap<String, TractGrowth>, StageReport)> {
    let years = params.growth_horizon_year - params.growth_base_year;
    let geoid_col = table.column("geoid10")?;
    let base_col = table.column(&format!("{}_tot_flow_24h", params.growth_base_year))?;
    let horizon_col = table.column(&format!("{}_tot_flow_24h", params.growth_horizon_year))?;
    let rate_col = table.column("24h_tot_gr")?;

    let mut tracts = HashMap::new();
    let mut checked = 0;

    for row in table.rows() {
        let tract = TractGrowth {
            geoid: strip_fraction(row.required_str(&geoid_col)?).to_string(),
            flow_base: row.optional_f64(Some(&base_col))?,
            flow_horizon: row.optional_f64(Some(&horizon_col))?,
            growth_rate: row.optional_f64(Some(&rate_col))?,
        };

        if let (Some(from_rate), Some(from_flows)) = (tract.yearly_growth(years), tract.flow_yearly_growth(years)) {
            if !is_close(from_rate, from_flows) {
                return Err(PipelineError::GrowthRateMismatch {
                    geoid: tract.geoid,
                    from_rate,
                    from_flows,
                });
            }
            checked += 1;
        }
        tracts.insert(tract.geoid.clone(), tract);
    }

    let mut report = StageReport::new("census_growth").with_rows(table.len(), tracts.len());
    report.count("rates_checked_against_flows", checked);
    report.count("tracts_without_rate", tracts.values().filter(|t| t.growth_rate.is_none()).count());
    Ok((tracts, report))
}

/// Growth attributes of one grid interval.
#[derive(Debug, Clone, PartialEq)]
pub struct GrowthFactor {
    pub geoid10: String,
    pub tot_flow_base: Option<f64>,
    pub tot_flow_horizon: Option<f64>,
    pub tot_grw_rt: Option<f64>,
    /// Mean yearly growth over the intersecting tracts.
    pub tot_gr_yearly: Option<f64>,
    pub growth_fac: Option<f64>,
}

/// One interval/tract pair before grouping.
struct GrowthMatch<'a> {
    key: GridKey,
    geoid: &'a str,
    tract: Option<&'a TractGrowth>,
    yearly: Option<f64>,
}

/// Joins tract growth onto the grid. Only intervals with at least one
/// intersecting tract appear in the result.
#[tracing::instrument(skip_all, fields(intervals = segments.len(), crosswalk = crosswalk.len()))]
pub fn join_growth(
    segments: &[ReconciledSegment],
    tracts: &HashMap<String, TractGrowth>,
    crosswalk: &[CrosswalkMatch],
    params: &Parameters,
) -> (BTreeMap<GridKey, GrowthFactor>, StageReport) {
    let years = params.growth_horizon_year - params.growth_base_year;
    let keys = grid_keys(segments);

    let mut unknown_interval = 0;
    let mut unknown_tract = 0;
    let mut matches: Vec<GrowthMatch<'_>> = Vec::new();
    for m in crosswalk {
        if !keys.contains(&m.key) {
            unknown_interval += 1;
            continue;
        }
        let tract = tracts.get(&m.feature_id);
        if tract.is_none() {
            unknown_tract += 1;
        }
        matches.push(GrowthMatch {
            key: m.key.clone(),
            geoid: &m.feature_id,
            tract,
            yearly: tract.and_then(|t| t.yearly_growth(years)),
        });
    }

    // Stable: crosswalk order is kept within an interval.
    matches.sort_by(|a, b| a.key.cmp(&b.key));
    let filled = fill_within_routes(&mut matches);

    let mut groups: BTreeMap<GridKey, Vec<&GrowthMatch<'_>>> = BTreeMap::new();
    for m in &matches {
        groups.entry(m.key.clone()).or_default().push(m);
    }

    let mut grouped: Vec<(GridKey, GrowthFactor)> = groups
        .into_iter()
        .map(|(key, members)| {
            let rates: Vec<f64> = members.iter().filter_map(|m| m.yearly).collect();
            let first = |f: fn(&TractGrowth) -> Option<f64>| members.iter().find_map(|m| m.tract.and_then(f));
            let factor = GrowthFactor {
                geoid10: members.first().map(|m| m.geoid.to_string()).unwrap_or_default(),
                tot_flow_base: first(|t| t.flow_base),
                tot_flow_horizon: first(|t| t.flow_horizon),
                tot_grw_rt: first(|t| t.growth_rate),
                tot_gr_yearly: mean(&rates),
                growth_fac: None,
            };
            (key, factor)
        })
        .collect();

    let yearly: Vec<Option<f64>> = grouped.iter().map(|(_, g)| g.tot_gr_yearly).collect();
    for ((_, g), fac) in grouped.iter_mut().zip(min_max_scale(&yearly)) {
        g.growth_fac = fac;
    }
    let factors: BTreeMap<GridKey, GrowthFactor> = grouped.into_iter().collect();

    let mut report = StageReport::new(STAGE).with_rows(crosswalk.len(), factors.len());
    report.count("crosswalk_unknown_interval", unknown_interval);
    report.count("crosswalk_unknown_tract", unknown_tract);
    report.count("rates_filled_along_route", filled);
    report.count("intervals_without_growth", keys.len() - factors.len());
    report.count(
        "intervals_without_rate",
        factors.values().filter(|g| g.tot_gr_yearly.is_none()).count(),
    );

    debug!(unknown_interval, unknown_tract, filled, "Growth crosswalk filtered");
    info!(
        matched = factors.len(),
        intervals = keys.len(),
        "Growth factor joined"
    );
    (factors, report)
}

/// Forward- then back-fills missing yearly rates within each route of the
/// sorted matches. Returns the number of filled rows.
fn fill_within_routes(matches: &mut [GrowthMatch<'_>]) -> usize {
    let mut filled = 0;
    for route in matches.chunk_by_mut(|a, b| a.key.route_id == b.key.route_id) {
        let mut last = None;
        for m in route.iter_mut() {
            match m.yearly {
                Some(v) => last = Some(v),
                None if last.is_some() => {
                    m.yearly = last;
                    filled += 1;
                }
                None => {}
            }
        }
        let mut next = None;
        for m in route.iter_mut().rev() {
            match m.yearly {
                Some(v) => next = Some(v),
                None if next.is_some() => {
                    m.yearly = next;
                    filled += 1;
                }
                None => {}
            }
        }
    }
    filled
}
