//! Seasonal (peak average daily traffic) factor.

use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

use super::spatial::{CrosswalkMatch, grid_keys, strip_fraction};
use crate::diagnostics::StageReport;
use crate::error::Result;
use crate::reader::Table;
use crate::reconcile::{GridKey, ReconciledSegment};
use crate::route::{RouteClass, RouteKey};
use crate::scaling::min_max_scale;

pub const STAGE: &str = "seasonal_factor";

/// One seasonal count segment.
#[derive(Debug, Clone, PartialEq)]
pub struct SeasonalRecord {
    pub feature_id: String,
    pub class: RouteClass,
    pub number: u32,
    pub padt_rec: Option<f64>,
}

impl SeasonalRecord {
    fn same_route(&self, route: &RouteKey) -> bool {
        self.class == route.class && self.number == route.number
    }
}

/// Loads seasonal records keyed by feature id. Records whose route class is
/// not I, US or NC are dropped.
#[tracing::instrument(skip_all, fields(dataset = table.dataset(), rows = table.len()))]
pub fn load_seasonal_volumes(table: &Table) -> Result<(HashMap<String, SeasonalRecord>, StageReport)> {
    let feature_col = table.column("feature_id")?;
    let class_col = table.column("rte_1_clss")?;
    let number_col = table.column("rte_1_nbr")?;
    let padt_col = table.column("padt_rec")?;

    let mut records = HashMap::new();
    let mut other_classes = 0;

    for row in table.rows() {
        let feature_id = strip_fraction(row.required_str(&feature_col)?).to_string();
        let Some(class) = row.get(&class_col).and_then(RouteClass::from_sign) else {
            other_classes += 1;
            continue;
        };
        let number = row.required_u32(&number_col)?;
        let padt_rec = row.optional_f64(Some(&padt_col))?;
        records.insert(
            feature_id.clone(),
            SeasonalRecord {
                feature_id,
                class,
                number,
                padt_rec,
            },
        );
    }

    let mut report = StageReport::new("seasonal_volumes").with_rows(table.len(), records.len());
    report.count("other_route_classes", other_classes);
    Ok((records, report))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeasonalFactor {
    /// Largest seasonal count among the matched features.
    pub padt_rec: f64,
    pub seasonal_fac: f64,
}

/// Attaches the seasonal count to each grid interval and scales it.
///
/// A crosswalk match counts only when the seasonal record carries the same
/// route class and number as the interval's route; line segments of
/// crossing routes intersect too. Intervals without a usable match are left
/// out of the result.
#[tracing::instrument(skip_all, fields(intervals = segments.len(), crosswalk = crosswalk.len()))]
pub fn join_seasonal(
    segments: &[ReconciledSegment],
    records: &HashMap<String, SeasonalRecord>,
    crosswalk: &[CrosswalkMatch],
) -> (BTreeMap<GridKey, SeasonalFactor>, StageReport) {
    let routes: HashMap<GridKey, &RouteKey> = segments.iter().map(|s| (s.grid_key(), s.route())).collect();
    let keys = grid_keys(segments);

    let mut padt: BTreeMap<GridKey, Option<f64>> = BTreeMap::new();
    let mut unknown_interval = 0;
    let mut unknown_feature = 0;
    let mut other_route = 0;

    for m in crosswalk {
        if !keys.contains(&m.key) {
            unknown_interval += 1;
            continue;
        }
        let Some(record) = records.get(&m.feature_id) else {
            unknown_feature += 1;
            continue;
        };
        let Some(route) = routes.get(&m.key) else {
            continue;
        };
        if !record.same_route(route) {
            other_route += 1;
            continue;
        }
        let slot = padt.entry(m.key.clone()).or_insert(None);
        if let Some(v) = record.padt_rec {
            *slot = Some(slot.map_or(v, |cur| cur.max(v)));
        }
    }

    let (matched_keys, values): (Vec<GridKey>, Vec<Option<f64>>) = padt.into_iter().unzip();
    let scaled = min_max_scale(&values);

    let factors: BTreeMap<GridKey, SeasonalFactor> = matched_keys
        .into_iter()
        .zip(values.into_iter().zip(scaled))
        .filter_map(|(key, (padt_rec, fac))| {
            Some((
                key,
                SeasonalFactor {
                    padt_rec: padt_rec?,
                    seasonal_fac: fac?,
                },
            ))
        })
        .collect();

    let mut report = StageReport::new(STAGE).with_rows(crosswalk.len(), factors.len());
    report.count("crosswalk_unknown_interval", unknown_interval);
    report.count("crosswalk_unknown_feature", unknown_feature);
    report.count("crosswalk_other_route", other_route);
    report.count("intervals_without_seasonal", keys.len() - factors.len());

    debug!(unknown_interval, unknown_feature, other_route, "Seasonal crosswalk filtered");
    info!(
        matched = factors.len(),
        intervals = keys.len(),
        "Seasonal factor joined"
    );
    (factors, report)
}
