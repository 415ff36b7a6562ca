//! Final merge of every factor onto the reconciled grid.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::{info, warn};

use crate::classify::{ImportanceCategory, RouteImportance};
use crate::config::Parameters;
use crate::diagnostics::{RunDiagnostics, StageReport};
use crate::error::Result;
use crate::factors::{GrowthFactor, SeasonalFactor, SeverityScaling};
use crate::reader::Table;
use crate::reconcile::{GridKey, ReconciledSegment};
use crate::route::{RouteClass, RouteIdParts};

pub const STAGE: &str = "final_merge";

pub const DISPLAY_SHOW: i8 = 1;
pub const DISPLAY_HIDE: i8 = 0;
/// The row could not be placed by the display rule.
pub const DISPLAY_UNPLACED: i8 = -99;

/// Detour scores of one interval.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DetourScore {
    pub scr_det: Option<f64>,
    pub scr_d90: Option<f64>,
    pub scr_nd90: Option<f64>,
}

/// Loads detour scores keyed by (route id, begin milepost). Rows above the
/// configured route class are dropped; for repeated keys the first row wins.
#[tracing::instrument(skip_all, fields(dataset = table.dataset(), rows = table.len()))]
pub fn load_detour_scores(table: &Table, params: &Parameters) -> Result<(HashMap<GridKey, DetourScore>, StageReport)> {
    let route_col = table.column("route_id")?;
    let begin_col = table.column("begin_mp")?;
    let class_col = table.column("class")?;
    let det_col = table.column("scr_det")?;
    let d90_col = table.column("scr_d90")?;
    let nd90_col = table.column("scr_nd90")?;

    let mut scores = HashMap::new();
    let mut filtered_class = 0;
    let mut duplicates = 0;

    for row in table.rows() {
        if row.required_u32(&class_col)? > u32::from(params.max_route_class) {
            filtered_class += 1;
            continue;
        }
        let raw = row.required_str(&route_col)?;
        let route = RouteIdParts::parse(raw).map_err(|e| row.invalid(&route_col, e.to_string()))?;
        let key = GridKey::new(route.route_id, row.required_f64(&begin_col)?);
        let score = DetourScore {
            scr_det: row.optional_f64(Some(&det_col))?,
            scr_d90: row.optional_f64(Some(&d90_col))?,
            scr_nd90: row.optional_f64(Some(&nd90_col))?,
        };
        if scores.contains_key(&key) {
            duplicates += 1;
            continue;
        }
        scores.insert(key, score);
    }

    let mut report = StageReport::new("detour_scores").with_rows(table.len(), scores.len());
    report.count("filtered_route_class", filtered_class);
    report.count("duplicate_keys", duplicates);
    Ok((scores, report))
}

/// Display rule for the mapping tool: Interstates and US routes are shown,
/// as are routes on the NHS or a strategic corridor.
pub fn display_in_imap_tool(class: RouteClass, category: Option<ImportanceCategory>) -> i8 {
    if matches!(class, RouteClass::Interstate | RouteClass::Us) {
        return DISPLAY_SHOW;
    }
    match category {
        Some(ImportanceCategory::Nhs | ImportanceCategory::StcButNotNhs) => DISPLAY_SHOW,
        Some(ImportanceCategory::Other) => DISPLAY_HIDE,
        // Not reached from `pipeline::run`, which classifies every grid route.
        // The -99 sentinel is kept as a suspect marker; an unclassified row
        // would otherwise read as hidden (0).
        None => DISPLAY_UNPLACED,
    }
}

/// One row of the scored dataset. Field order is the output column order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredSegment {
    pub route_id: String,
    pub route_class: &'static str,
    pub route_qual: u8,
    pub route_inventory: u8,
    pub route_county: u32,
    pub route_no: u32,
    pub st_mp_pt_crash: Option<f64>,
    pub end_mp_pt_crash: Option<f64>,
    pub st_end_diff_crash: Option<f64>,
    pub aadt_interval_left: f64,
    pub aadt_interval_right: f64,
    pub st_end_diff_aadt: f64,
    pub seg_len_in_interval: Option<f64>,
    pub aadt_val: f64,
    pub aadtt_val: Option<f64>,
    pub source: Option<String>,
    pub ka_cnt: Option<f64>,
    pub bc_cnt: Option<f64>,
    pub pdo_cnt: Option<f64>,
    pub total_cnt: Option<f64>,
    pub crash_rate_per_mile_per_year: Option<f64>,
    pub inc_fac: Option<f64>,
    pub si_fac: f64,
    pub detour_fac: Option<f64>,
    pub nat_imp_fac: Option<f64>,
    pub growth_fac: Option<f64>,
    pub seasonal_fac: Option<f64>,
    pub severity_index: f64,
    pub severity_index_q90: Option<f64>,
    pub scr_det: Option<f64>,
    pub scr_d90: Option<f64>,
    pub stc: Option<bool>,
    pub nhs_net: Option<bool>,
    pub nat_imp_cat: Option<ImportanceCategory>,
    pub padt_rec: Option<f64>,
    pub geoid10: Option<String>,
    pub tot_flow_2040_24: Option<f64>,
    pub tot_flow_2015_24: Option<f64>,
    pub tot_gr_24_yearly: Option<f64>,
    pub tot_grw_rt_24: Option<f64>,
    pub display_in_imap_tool: i8,
    pub geometry: String,
}

impl ScoredSegment {
    pub fn has_crash_data(&self) -> bool {
        self.total_cnt.is_some()
    }
}

/// Everything the final merge joins onto the grid.
pub struct MergeInputs<'a> {
    pub segments: &'a [ReconciledSegment],
    pub severity: &'a SeverityScaling,
    pub importance: &'a BTreeMap<String, RouteImportance>,
    pub seasonal: &'a BTreeMap<GridKey, SeasonalFactor>,
    pub growth: &'a BTreeMap<GridKey, GrowthFactor>,
    pub detour: &'a HashMap<GridKey, DetourScore>,
}

/// Left-joins every factor onto the grid, one scored row per interval.
#[tracing::instrument(skip_all, fields(intervals = inputs.segments.len()))]
pub fn merge(inputs: &MergeInputs<'_>) -> (Vec<ScoredSegment>, StageReport) {
    let mut missing_detour = 0;
    let mut missing_importance = 0;
    let mut missing_seasonal = 0;
    let mut missing_growth = 0;

    let rows: Vec<ScoredSegment> = inputs
        .segments
        .iter()
        .zip(&inputs.severity.scores)
        .map(|(seg, severity)| {
            let key = seg.grid_key();
            let route = seg.route();
            let volume = &seg.interval.segment;
            let crash = seg.crash.as_ref();

            let detour = inputs.detour.get(&key);
            let importance = inputs.importance.get(&route.route_id);
            let seasonal = inputs.seasonal.get(&key);
            let growth = inputs.growth.get(&key);
            missing_detour += usize::from(detour.is_none());
            missing_importance += usize::from(importance.is_none());
            missing_seasonal += usize::from(seasonal.is_none());
            missing_growth += usize::from(growth.is_none());

            let detour = detour.copied().unwrap_or_default();
            let category = importance.map(|i| i.category);

            ScoredSegment {
                route_id: route.route_id.clone(),
                route_class: route.class.label(),
                route_qual: route.qualifier,
                route_inventory: route.inventory,
                route_county: route.county,
                route_no: route.number,
                st_mp_pt_crash: crash.map(|c| c.crash_start),
                end_mp_pt_crash: crash.map(|c| c.crash_end),
                st_end_diff_crash: crash.map(|c| c.crash_length),
                aadt_interval_left: seg.left(),
                aadt_interval_right: seg.right(),
                st_end_diff_aadt: volume.length(),
                seg_len_in_interval: crash.map(|c| c.apportioned_length),
                aadt_val: volume.aadt,
                aadtt_val: volume.aadtt,
                source: volume.source.clone(),
                ka_cnt: crash.map(|c| c.counts.ka),
                bc_cnt: crash.map(|c| c.counts.bc),
                pdo_cnt: crash.map(|c| c.counts.pdo),
                total_cnt: crash.map(|c| c.counts.total),
                crash_rate_per_mile_per_year: crash.map(|c| c.crash_rate),
                inc_fac: seg.incident_factor,
                si_fac: severity.si_fac,
                detour_fac: detour.scr_nd90,
                nat_imp_fac: importance.map(RouteImportance::factor),
                growth_fac: growth.and_then(|g| g.growth_fac),
                seasonal_fac: seasonal.map(|s| s.seasonal_fac),
                severity_index: severity.severity_index,
                severity_index_q90: inputs.severity.cut,
                scr_det: detour.scr_det,
                scr_d90: detour.scr_d90,
                stc: importance.map(|i| i.stc),
                nhs_net: importance.map(|i| i.nhs_net),
                nat_imp_cat: category,
                padt_rec: seasonal.map(|s| s.padt_rec),
                geoid10: growth.map(|g| g.geoid10.clone()),
                tot_flow_2040_24: growth.and_then(|g| g.tot_flow_horizon),
                tot_flow_2015_24: growth.and_then(|g| g.tot_flow_base),
                tot_gr_24_yearly: growth.and_then(|g| g.tot_gr_yearly),
                tot_grw_rt_24: growth.and_then(|g| g.tot_grw_rt),
                display_in_imap_tool: display_in_imap_tool(route.class, category),
                geometry: volume.geometry.clone(),
            }
        })
        .collect();

    let unplaced = rows
        .iter()
        .filter(|r| r.display_in_imap_tool == DISPLAY_UNPLACED)
        .count();
    let shown = rows
        .iter()
        .filter(|r| r.display_in_imap_tool == DISPLAY_SHOW)
        .count();
    if unplaced > 0 {
        warn!(unplaced, "Rows could not be placed by the display rule");
    }

    let mut report = StageReport::new(STAGE).with_rows(inputs.segments.len(), rows.len());
    report.count("missing_detour", missing_detour);
    report.count("missing_importance", missing_importance);
    report.count("missing_seasonal", missing_seasonal);
    report.count("missing_growth", missing_growth);
    report.count("display_shown", shown);
    report.count("display_unplaced", unplaced);

    info!(
        rows = rows.len(),
        shown,
        shown_pct = RunDiagnostics::pct(shown, rows.len()),
        unplaced,
        "Scored dataset assembled"
    );
    (rows, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factors::SeverityScore;
    use crate::loaders::VolumeSegment;
    use crate::reconcile::{CrashAggregate, VolumeInterval};
    use crate::route::RouteKey;
    use crate::severity::CrashCounts;

    fn segment(route: &str, start: f64, end: f64, crash: bool) -> ReconciledSegment {
        ReconciledSegment {
            interval: VolumeInterval::new(
                VolumeSegment {
                    route: RouteKey::parse(route).unwrap(),
                    start,
                    end,
                    aadt: 20_000.0,
                    aadtt: Some(1_500.0),
                    source: Some("counted".into()),
                    geometry: "LINESTRING (0 0, 1 1)".into(),
                },
                end,
            ),
            crash: crash.then(|| CrashAggregate {
                counts: CrashCounts {
                    ka: 1.0,
                    bc: 2.0,
                    pdo: 7.0,
                    total: 10.0,
                },
                crash_start: start,
                crash_end: end,
                crash_length: end - start,
                apportioned_length: end - start,
                severity_index: 9.5,
                crash_rate: 2.0,
            }),
            incident_factor: crash.then_some(0.4),
        }
    }

    fn score(si: f64) -> SeverityScore {
        SeverityScore {
            severity_index: si,
            si_fac: 0.5,
            above_cut: false,
        }
    }

    #[test]
    fn test_display_rule() {
        assert_eq!(display_in_imap_tool(RouteClass::Interstate, None), DISPLAY_SHOW);
        assert_eq!(display_in_imap_tool(RouteClass::Us, Some(ImportanceCategory::Other)), DISPLAY_SHOW);
        assert_eq!(
            display_in_imap_tool(RouteClass::State, Some(ImportanceCategory::StcButNotNhs)),
            DISPLAY_SHOW
        );
        assert_eq!(display_in_imap_tool(RouteClass::State, Some(ImportanceCategory::Other)), DISPLAY_HIDE);
        assert_eq!(display_in_imap_tool(RouteClass::State, None), DISPLAY_UNPLACED);
    }

    #[test]
    fn test_load_detour_filters_class() {
        let csv = "RouteID,BeginMp,class,scr_det,scr_d90,scr_nd90\n\
                   10000040001,0,1,0.2,0.3,0.4\n\
                   10000040001,0,1,0.9,0.9,0.9\n\
                   40001234001,0,4,0.1,0.1,0.1\n";
        let table = Table::from_reader("detour", csv.as_bytes()).unwrap();
        let (scores, report) = load_detour_scores(&table, &Parameters::default()).unwrap();
        assert_eq!(scores.len(), 1);
        assert_eq!(scores[&GridKey::new("10000040001", 0.0)].scr_nd90, Some(0.4));
        assert_eq!(report.get("filtered_route_class"), 1);
        assert_eq!(report.get("duplicate_keys"), 1);
    }

    #[test]
    fn test_merge_joins_and_leaves_gaps_null() {
        let segments = vec![
            segment("30000087001", 0.0, 2.0, true),
            segment("30000087001", 2.0, 3.0, false),
        ];
        let severity = SeverityScaling {
            cut: Some(12.0),
            scores: vec![score(9.5), score(1.0)],
        };
        let importance: BTreeMap<String, RouteImportance> = [(
            "30000087001".to_string(),
            RouteImportance {
                stc: true,
                nhs_net: false,
                category: ImportanceCategory::StcButNotNhs,
            },
        )]
        .into_iter()
        .collect();
        let seasonal: BTreeMap<GridKey, SeasonalFactor> = [(
            GridKey::new("30000087001", 0.0),
            SeasonalFactor {
                padt_rec: 9000.0,
                seasonal_fac: 0.25,
            },
        )]
        .into_iter()
        .collect();
        let growth = BTreeMap::new();
        let detour: HashMap<GridKey, DetourScore> = [(
            GridKey::new("30000087001", 2.0),
            DetourScore {
                scr_det: Some(0.1),
                scr_d90: Some(0.2),
                scr_nd90: Some(0.3),
            },
        )]
        .into_iter()
        .collect();

        let (rows, report) = merge(&MergeInputs {
            segments: &segments,
            severity: &severity,
            importance: &importance,
            seasonal: &seasonal,
            growth: &growth,
            detour: &detour,
        });

        assert_eq!(rows.len(), 2);
        let first = &rows[0];
        assert_eq!(first.route_class, "NC Route");
        assert_eq!(first.route_no, 87);
        assert_eq!(first.total_cnt, Some(10.0));
        assert_eq!(first.inc_fac, Some(0.4));
        assert_eq!(first.seasonal_fac, Some(0.25));
        assert_eq!(first.detour_fac, None);
        assert_eq!(first.nat_imp_fac, Some(0.5));
        assert_eq!(first.severity_index_q90, Some(12.0));
        assert_eq!(first.display_in_imap_tool, DISPLAY_SHOW);
        assert!(first.has_crash_data());

        let second = &rows[1];
        assert!(!second.has_crash_data());
        assert_eq!(second.severity_index, 1.0);
        assert_eq!(second.detour_fac, Some(0.3));
        assert_eq!(second.scr_det, Some(0.1));
        assert_eq!(second.padt_rec, None);
        assert_eq!(second.st_end_diff_aadt, 1.0);

        assert_eq!(report.get("missing_detour"), 1);
        assert_eq!(report.get("missing_seasonal"), 1);
        assert_eq!(report.get("missing_growth"), 2);
        assert_eq!(report.get("display_unplaced"), 0);
    }
}
