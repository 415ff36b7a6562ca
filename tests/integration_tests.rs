use flate2::read::GzDecoder;
use roadway_rater::PipelineError;
use roadway_rater::config::{InputPaths, PipelineConfig};
use roadway_rater::output;
use roadway_rater::pipeline;
use std::collections::HashMap;
use std::fs;
use std::io::Read;
use std::path::Path;

const VOLUME: &str = "\
RouteID,BeginMp,EndMp,AADT_2018,AADTT2018,County,Source,geometry
10000040092,0,2,40000,4000,92,counted,\"LINESTRING (0 0, 2 0)\"
10000040092,1.5,4,30000,,92,counted,\"LINESTRING (1.5 0, 4 0)\"
20000070092,0,3,10000,800,92,estimated,\"LINESTRING (0 1, 3 1)\"
30000999092,0,1,5000,,92,estimated,\"LINESTRING (0 2, 1 2)\"
40001234092,0,1,900,,92,estimated,\"LINESTRING (0 3, 1 3)\"
";

const CRASH: &str = "\
route_gis,st_mp_pt,end_mp_pt,county,ka_cnt,bc_cnt,pdo_cnt,total_cnt
10000040092,0,2,92,1,2,7,10
10000040092,2,4,92,0,0,5,5
20000070092,0,3,92,0,1,2,3
40001234092,0,1,92,0,0,1,1
";

const HPMS: &str = "\
route_id,route_sign,route_numb,nhs
10000040092,2,40,1
20000070092,3,70,0
";

const SEASONAL: &str = "\
FEATURE_ID,RTE_1_CLSS,RTE_1_NBR,PADT_REC
1,I,40,50000
2,US,70,12000
";

const SEASONAL_CROSSWALK: &str = "\
route_id,aadt_interval_left,feature_id
10000040092,0,1
10000040092,1.5,1
20000070092,0,2
20000070092,0,1
";

const CENSUS: &str = "\
GEOID10,2015_Tot_Flow_24h,2040_Tot_Flow_24h,24h_Tot_GR
37001,1000,2000,100
37002,,,
";

const CENSUS_CROSSWALK: &str = "\
route_id,aadt_interval_left,GEOID10
10000040092,0,37001
10000040092,1.5,37002
30000999092,0,37001
";

const DETOUR: &str = "\
RouteID,BeginMp,class,scr_det,scr_d90,scr_nd90
10000040092,0,1,0.5,0.6,0.7
";

fn write_inputs(dir: &Path, volume: &str, crash: &str) -> PipelineConfig {
    let raw = dir.join("raw");
    fs::create_dir_all(&raw).unwrap();
    let put = |name: &str, content: &str| {
        let path = raw.join(name);
        fs::write(&path, content).unwrap();
        path
    };

    let mut config = PipelineConfig {
        inputs: InputPaths {
            volume_segments: put("aadt.csv", volume),
            crash_segments: put("crash.csv", crash),
            national_highways: put("hpms.csv", HPMS),
            seasonal_volumes: put("padt.csv", SEASONAL),
            seasonal_crosswalk: put("padt_xw.csv", SEASONAL_CROSSWALK),
            census_growth: put("census.csv", CENSUS),
            census_crosswalk: put("census_xw.csv", CENSUS_CROSSWALK),
            detour_scores: put("detour.csv", DETOUR),
        },
        output_dir: dir.join("out"),
        ..PipelineConfig::default()
    };
    config.parameters.parallel = true;
    config
}

fn read_rows(content: &str) -> (Vec<String>, Vec<HashMap<String, String>>) {
    let mut rdr = csv::Reader::from_reader(content.as_bytes());
    let headers: Vec<String> = rdr.headers().unwrap().iter().map(str::to_string).collect();
    let rows = rdr
        .records()
        .map(|r| {
            let r = r.unwrap();
            headers.iter().cloned().zip(r.iter().map(str::to_string)).collect()
        })
        .collect();
    (headers, rows)
}

fn find<'a>(rows: &'a [HashMap<String, String>], route: &str, left: &str) -> &'a HashMap<String, String> {
    rows.iter()
        .find(|r| r["route_id"] == route && r["aadt_interval_left"] == left)
        .unwrap()
}

fn num(row: &HashMap<String, String>, column: &str) -> f64 {
    row[column].parse().unwrap()
}

#[test]
fn test_full_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_inputs(dir.path(), VOLUME, CRASH);
    let summary = pipeline::run(&config).expect("pipeline run failed");
    assert_eq!(summary.rows, 4);

    let content = fs::read_to_string(config.output_path(output::SCORED_SEGMENTS)).unwrap();
    let (headers, rows) = read_rows(&content);
    assert_eq!(
        headers,
        [
            "route_id", "route_class", "route_qual", "route_inventory", "route_county", "route_no",
            "st_mp_pt_crash", "end_mp_pt_crash", "st_end_diff_crash", "aadt_interval_left",
            "aadt_interval_right", "st_end_diff_aadt", "seg_len_in_interval", "aadt_val", "aadtt_val",
            "source", "ka_cnt", "bc_cnt", "pdo_cnt", "total_cnt", "crash_rate_per_mile_per_year",
            "inc_fac", "si_fac", "detour_fac", "nat_imp_fac", "growth_fac", "seasonal_fac",
            "severity_index", "severity_index_q90", "scr_det", "scr_d90", "stc", "nhs_net",
            "nat_imp_cat", "padt_rec", "geoid10", "tot_flow_2040_24", "tot_flow_2015_24",
            "tot_gr_24_yearly", "tot_grw_rt_24", "display_in_imap_tool", "geometry",
        ]
    );
    assert_eq!(rows.len(), 4);

    // I-40 first interval was clamped to the next start and takes 3/4 of the
    // first crash segment.
    let i40 = find(&rows, "10000040092", "0.0");
    assert_eq!(i40["route_class"], "Interstate");
    assert_eq!(num(i40, "aadt_interval_right"), 1.5);
    assert_eq!(num(i40, "st_end_diff_aadt"), 2.0);
    assert!((num(i40, "total_cnt") - 7.5).abs() < 1e-9);
    assert!((num(i40, "severity_index") - 10.06).abs() < 1e-9);
    assert_eq!(num(i40, "si_fac"), 1.0);
    assert_eq!(num(i40, "detour_fac"), 0.7);
    assert_eq!(i40["nat_imp_cat"], "nhs");
    assert_eq!(num(i40, "nat_imp_fac"), 1.0);
    assert_eq!(num(i40, "padt_rec"), 50000.0);
    assert_eq!(num(i40, "seasonal_fac"), 1.0);
    assert_eq!(i40["geoid10"], "37001");
    assert_eq!(i40["display_in_imap_tool"], "1");
    assert_eq!(i40["geometry"], "LINESTRING (0 0, 2 0)");

    // Counts of the route survive apportionment.
    let i40_second = find(&rows, "10000040092", "1.5");
    assert!((num(i40, "total_cnt") + num(i40_second, "total_cnt") - 15.0).abs() < 1e-9);
    assert_eq!(i40_second["detour_fac"], "");
    // filled forward from the first tract on the route
    assert_eq!(i40_second["tot_gr_24_yearly"], i40["tot_gr_24_yearly"]);
    assert_eq!(i40_second["tot_grw_rt_24"], "");

    let us70 = find(&rows, "20000070092", "0.0");
    assert_eq!(us70["nat_imp_cat"], "stc_but_not_nhs");
    assert_eq!(num(us70, "nat_imp_fac"), 0.5);
    assert_eq!(num(us70, "padt_rec"), 12000.0);
    assert_eq!(num(us70, "seasonal_fac"), 0.0);
    // 3 crashes / 3 miles / 5 years; 0.2 * 10000 / 100000
    assert!((num(us70, "crash_rate_per_mile_per_year") - 0.2).abs() < 1e-12);
    assert!((num(us70, "inc_fac") - 0.02).abs() < 1e-12);

    let nc999 = find(&rows, "30000999092", "0.0");
    assert_eq!(nc999["total_cnt"], "");
    assert_eq!(nc999["inc_fac"], "");
    assert_eq!(num(nc999, "severity_index"), 1.0);
    assert_eq!(num(nc999, "si_fac"), 0.0);
    assert_eq!(nc999["nat_imp_cat"], "other");
    assert_eq!(nc999["display_in_imap_tool"], "0");
    assert_eq!(nc999["padt_rec"], "");

    // Side artifacts.
    let missing = fs::read_to_string(config.output_path(output::MISSING_CRASH_ROUTES)).unwrap();
    assert_eq!(missing.lines().collect::<Vec<_>>(), vec!["route_id", "30000999092"]);

    let (_, missing_rows) = read_rows(&fs::read_to_string(config.output_path(output::MISSING_CRASH_ROWS)).unwrap());
    assert_eq!(missing_rows.len(), 1);
    assert_eq!(missing_rows[0]["route_id"], "30000999092");

    let (_, repairs) = read_rows(&fs::read_to_string(config.output_path(output::OVERLAP_REPAIRS)).unwrap());
    assert_eq!(repairs.len(), 1);
    assert_eq!(num(&repairs[0], "end_mp_pt"), 2.0);
    assert_eq!(num(&repairs[0], "end_mp_pt_cor"), 1.5);

    let diagnostics: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(config.output_path(output::RUN_DIAGNOSTICS)).unwrap()).unwrap();
    let stages: Vec<&str> = diagnostics["stages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["stage"].as_str().unwrap())
        .collect();
    assert_eq!(stages.first(), Some(&"volume_segments"));
    assert_eq!(stages.last(), Some(&"final_merge"));
    let volume = &diagnostics["stages"][0];
    assert_eq!(volume["conditions"]["filtered_route_class"], 1);
}

#[test]
fn test_reconcile_only_writes_grid() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_inputs(dir.path(), VOLUME, CRASH);
    let summary = pipeline::run_reconcile(&config).unwrap();
    assert_eq!(summary.rows, 4);
    assert!(!config.output_path(output::SCORED_SEGMENTS).exists());

    let (headers, rows) = read_rows(&fs::read_to_string(config.output_path(output::RECONCILED_SEGMENTS)).unwrap());
    assert!(headers.contains(&"inc_fac".to_string()));
    assert_eq!(rows.len(), 4);
    assert!(config.output_path(output::RUN_DIAGNOSTICS).exists());
}

#[test]
fn test_gzip_output() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = write_inputs(dir.path(), VOLUME, CRASH);
    config.gzip = true;
    let summary = pipeline::run(&config).unwrap();
    assert!(summary.output.to_string_lossy().ends_with(".csv.gz"));

    let mut content = String::new();
    GzDecoder::new(fs::File::open(&summary.output).unwrap())
        .read_to_string(&mut content)
        .unwrap();
    let (_, rows) = read_rows(&content);
    assert_eq!(rows.len(), 4);
}

#[test]
fn test_sequential_and_parallel_runs_agree() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_inputs(dir.path(), VOLUME, CRASH);
    pipeline::run(&config).unwrap();
    let parallel = fs::read_to_string(config.output_path(output::SCORED_SEGMENTS)).unwrap();

    let mut sequential_config = config.clone();
    sequential_config.parameters.parallel = false;
    sequential_config.output_dir = dir.path().join("seq");
    pipeline::run(&sequential_config).unwrap();
    let sequential = fs::read_to_string(sequential_config.output_path(output::SCORED_SEGMENTS)).unwrap();

    assert_eq!(parallel, sequential);
}

#[test]
fn test_county_mismatch_stops_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let crash = CRASH.replace("20000070092,0,3,92", "20000070092,0,3,93");
    let config = write_inputs(dir.path(), VOLUME, &crash);
    let err = pipeline::run(&config).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<PipelineError>(),
        Some(PipelineError::CountyMismatch { reported: 93, .. })
    ));
}

#[test]
fn test_missing_required_column_stops_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let volume = VOLUME.replace("AADT_2018", "AADT_2020");
    let config = write_inputs(dir.path(), &volume, CRASH);
    let err = pipeline::run(&config).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<PipelineError>(),
        Some(PipelineError::MissingColumn { .. })
    ));
}
