use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dredge::bins::get_plot_bins;
use dredge::display::{display_list, load_selection, DisplayFilters, SelectionTracker, SortOrder, SortPath};
use dredge::error::{DredgeError, Result};
use dredge::fetch::{Fetcher, FsFetcher, MemoryFetcher, Response};
use dredge::histogram::PValueHistogram;
use dredge::project::Project;
use dredge::scale::LinearScale;
use dredge::singlecell::expression::{encode_expression_blob, SparseRecord};
use dredge::status::{LoadStatus, RecordingSink};

const CONFIG: &str = r#"{
    "label": "Heat shock time course",
    "readme": "README.md",
    "treatments": "treatments.json",
    "abundanceMeasures": "abundances.tsv",
    "pairwiseName": "pairwise/%A_%B.tsv",
    "transcriptAliases": "aliases.txt",
    "transcriptHyperlink": [{"label": "WormBase", "url": "https://wormbase.org/species/c_elegans/gene/%name"}],
    "singleCell": {
        "expressionData": "sc/expression.bin",
        "transcripts": "sc/transcripts.txt",
        "cells": "sc/cells.tsv",
        "clusters": "sc/clusters.json"
    }
}"#;

const TREATMENTS: &str = r#"{
    "ctrl": {"label": "Control", "replicates": ["c1", "c2"]},
    "heat": {"label": "Heat shock", "replicates": ["h1", "h2"]},
    "cold": {"label": "Cold", "replicates": ["k1"]}
}"#;

const ABUNDANCES: &str = "\
transcript\tc1\tc2\th1\th2\tk1
WBGene01\t1\t3\t10\t20\t5
WBGene02\t4\tNA\t2\t2\t1
WBGene03\t7\t7\t8\t8\t0
WBGene04\t0\t0\t0\t0\t0
";

const ALIASES: &str = "WBGene01,unc-1,ZK1\nWBGene02\tdaf-2\n";

const CTRL_HEAT: &str = "\
id\tlogFC\tlogATA\tpValue
WBGene01\t2.0\t5.0\t0.001
WBGene02\t-1.5\t3.0\t0.02
WBGene03\t0.3\t8.0\t0.6
WBGene04\tNA\tNA\tNA
";

fn write_project(dir: &Path) {
    fs::create_dir_all(dir.join("pairwise")).unwrap();
    fs::create_dir_all(dir.join("sc")).unwrap();
    fs::write(dir.join("project.json"), CONFIG).unwrap();
    fs::write(dir.join("README.md"), "# Heat shock\n").unwrap();
    fs::write(dir.join("treatments.json"), TREATMENTS).unwrap();
    fs::write(dir.join("abundances.tsv"), ABUNDANCES).unwrap();
    fs::write(dir.join("aliases.txt"), ALIASES).unwrap();
    fs::write(dir.join("pairwise/ctrl_heat.tsv"), CTRL_HEAT).unwrap();

    // 5 cells; WBGene01 in cells 0, 1, 4; WBGene03 in cell 2
    let records = vec![
        SparseRecord { transcript: 0, cell: 0, value_index: 0 },
        SparseRecord { transcript: 0, cell: 1, value_index: 1 },
        SparseRecord { transcript: 0, cell: 4, value_index: 1 },
        SparseRecord { transcript: 2, cell: 2, value_index: 2 },
    ];
    let blob = encode_expression_blob(&[1.0, 3.0, 0.5], &records).unwrap();
    fs::write(dir.join("sc/expression.bin"), blob).unwrap();
    fs::write(dir.join("sc/transcripts.txt"), "WBGene01\nWBGene02\nWBGene03\n").unwrap();
    fs::write(
        dir.join("sc/cells.tsv"),
        "cell\tcluster\tumap1\tumap2\nAAAC\t1\t0.1\t0.2\nAAAG\t1\t0.3\t0.1\nAACT\t2\t-1.0\t2.0\nAAGT\t2\t-1.2\t2.5\nACGT\t3\t4.0\t0.0\n",
    )
    .unwrap();
    fs::write(
        dir.join("sc/clusters.json"),
        r##"{"1": {"label": "Neurons", "color": "#ff0000"}, "2": {"label": "Muscle"}}"##,
    )
    .unwrap();
}

fn load(dir: &Path) -> Project {
    Project::load(Arc::new(FsFetcher::new(dir)), "project.json").unwrap()
}

#[test]
fn test_load_project_from_directory() {
    let dir = tempfile::tempdir().unwrap();
    write_project(dir.path());
    let sink = Arc::new(RecordingSink::new());
    let project = Project::load_with_sink(Arc::new(FsFetcher::new(dir.path())), sink.clone(), "project.json").unwrap();

    assert_eq!(project.config().label, "Heat shock time course");
    assert_eq!(project.treatments().len(), 3);
    assert_eq!(project.readme(), Some("# Heat shock\n"));
    assert_eq!(project.corpus().canonical("unc-1"), Some("WBGene01"));
    assert_eq!(project.corpus().canonical("daf-2"), Some("WBGene02"));
    assert_eq!(project.corpus().canonical("WBGene04"), Some("WBGene04"));
    assert_eq!(project.abundances_for("ctrl", "WBGene02").unwrap(), vec![4.0]);
    assert_eq!(
        project.hyperlinks("unc-1"),
        vec![("WormBase".to_string(), "https://wormbase.org/species/c_elegans/gene/WBGene01".to_string())]
    );

    for label in ["Project configuration", "Treatments", "Abundance measures", "Transcript aliases", "Readme"] {
        assert_eq!(sink.last_status(label), Some(LoadStatus::Ok), "{label}");
    }
    assert_eq!(sink.last_status("Single-cell expression"), Some(LoadStatus::Ok));
}

#[test]
fn test_comparison_both_directions() {
    let dir = tempfile::tempdir().unwrap();
    write_project(dir.path());
    let project = load(dir.path());

    let forward = project.pairwise_comparison("ctrl", "heat").unwrap();
    // only ctrl_heat.tsv exists
    let backward = project.pairwise_comparison("heat", "ctrl").unwrap();
    assert_eq!(project.comparisons().len(), 2);

    for record in forward.records() {
        let other = backward.get(&record.name).unwrap();
        assert_eq!(other.log_fc, record.log_fc.map(|fc| -fc));
        assert_eq!(other.log_ata, record.log_ata);
        assert_eq!(other.p_value, record.p_value);
        assert_eq!(other.treatment_a_mean, record.treatment_b_mean);
    }

    let g1 = forward.get("WBGene01").unwrap();
    assert_eq!(g1.treatment_a_mean, Some(2.0));
    assert_eq!(g1.treatment_b_mean, Some(15.0));
    assert_eq!(forward.min_p_value(), 0.001);

    let fc: Vec<&str> = backward.fc_sorted().map(|r| r.name.as_str()).collect();
    assert_eq!(fc, vec!["WBGene01", "WBGene03", "WBGene02", "WBGene04"]);

    // the same Arc comes back from the cache
    assert!(Arc::ptr_eq(&backward, &project.pairwise_comparison("heat", "ctrl").unwrap()));
    assert!(forward.get_by_alias("unc-1", project.corpus()).is_some());
}

#[test]
fn test_comparison_loaded_from_reverse_file_first() {
    let dir = tempfile::tempdir().unwrap();
    write_project(dir.path());
    let project = load(dir.path());

    let backward = project.pairwise_comparison("heat", "ctrl").unwrap();
    assert_eq!(backward.get("WBGene01").unwrap().log_fc, Some(-2.0));
    assert_eq!(backward.get("WBGene01").unwrap().treatment_a_mean, Some(15.0));
}

#[test]
fn test_comparison_not_found() {
    let dir = tempfile::tempdir().unwrap();
    write_project(dir.path());
    let project = load(dir.path());

    match project.pairwise_comparison("ctrl", "cold") {
        Err(DredgeError::ComparisonNotFound { tried, .. }) => {
            assert_eq!(tried, vec!["pairwise/ctrl_cold.tsv".to_string(), "pairwise/cold_ctrl.tsv".to_string()]);
        }
        other => panic!("expected ComparisonNotFound, got {:?}", other),
    }
    assert!(project.comparisons().is_empty());

    assert!(matches!(
        project.pairwise_comparison("ctrl", "drought"),
        Err(DredgeError::UnknownTreatment(t)) if t == "drought"
    ));
}

#[test]
fn test_malformed_pairwise_file_fails_whole_load() {
    let dir = tempfile::tempdir().unwrap();
    write_project(dir.path());
    fs::write(
        dir.path().join("pairwise/ctrl_cold.tsv"),
        "id\tlogFC\tlogATA\tpValue\nWBGene01\t1\t2\t0.1\nWBGene02\t1\t2\n",
    )
    .unwrap();
    let sink = Arc::new(RecordingSink::new());
    let project = Project::load_with_sink(Arc::new(FsFetcher::new(dir.path())), sink.clone(), "project.json").unwrap();

    match project.pairwise_comparison("ctrl", "cold") {
        Err(DredgeError::MalformedFile { line, .. }) => assert_eq!(line, 3),
        other => panic!("expected MalformedFile, got {:?}", other),
    }
    assert_eq!(sink.last_status("Pairwise comparison ctrl vs cold"), Some(LoadStatus::Failed));
    assert!(project.comparisons().get("ctrl", "cold").is_none());

    // failures are not cached: fixing the file and asking again works
    fs::write(
        dir.path().join("pairwise/ctrl_cold.tsv"),
        "id\tlogFC\tlogATA\tpValue\nWBGene01\t1\t2\t0.1\n",
    )
    .unwrap();
    assert_eq!(project.pairwise_comparison("ctrl", "cold").unwrap().len(), 1);
}

/// counts fetches of pairwise files
struct CountingFetcher {
    inner: MemoryFetcher,
    pairwise_fetches: AtomicUsize,
}

impl Fetcher for CountingFetcher {
    fn fetch(&self, url: &str) -> Result<Response> {
        if url.starts_with("pairwise/") {
            self.pairwise_fetches.fetch_add(1, Ordering::SeqCst);
        }
        self.inner.fetch(url)
    }
}

#[test]
fn test_concurrent_requests_load_once() {
    let config = r#"{
        "label": "x",
        "treatments": "treatments.json",
        "abundanceMeasures": "abundances.tsv",
        "pairwiseName": "pairwise/%A_%B.tsv"
    }"#;
    let fetcher = Arc::new(CountingFetcher {
        inner: MemoryFetcher::new()
            .with("project.json", config)
            .with("treatments.json", TREATMENTS)
            .with("abundances.tsv", ABUNDANCES)
            .with("pairwise/ctrl_heat.tsv", CTRL_HEAT),
        pairwise_fetches: AtomicUsize::new(0),
    });
    let project = Project::load(fetcher.clone(), "project.json").unwrap();

    std::thread::scope(|s| {
        for i in 0..8 {
            let project = &project;
            s.spawn(move || {
                let c = if i % 2 == 0 {
                    project.pairwise_comparison("ctrl", "heat").unwrap()
                } else {
                    project.pairwise_comparison("heat", "ctrl").unwrap()
                };
                assert_eq!(c.len(), 4);
            });
        }
    });
    // one hit for ctrl_heat, or a miss on heat_ctrl first and then the hit
    let n = fetcher.pairwise_fetches.load(Ordering::SeqCst);
    assert!(n == 1 || n == 2, "{n} fetches");
}

#[test]
fn test_binning_covers_comparison() {
    let dir = tempfile::tempdir().unwrap();
    write_project(dir.path());
    let project = load(dir.path());
    let c = project.pairwise_comparison("ctrl", "heat").unwrap();

    let x = LinearScale::new((0.0, 10.0), (0.0, 200.0)).unwrap();
    let y = LinearScale::new((-3.0, 3.0), (120.0, 0.0)).unwrap();
    let bins = get_plot_bins(&c, |_| true, &x, &y, 20.0).unwrap();
    assert_eq!(bins.len(), 6 * 10);

    let mut names: Vec<&str> = bins.iter().flat_map(|b| b.names()).collect();
    names.sort();
    // WBGene04 has no coordinates
    assert_eq!(names, vec!["WBGene01", "WBGene02", "WBGene03"]);

    let significant = get_plot_bins(&c, |r| r.passes_p_value(0.05), &x, &y, 20.0).unwrap();
    assert_eq!(significant.iter().map(|b| b.len()).sum::<usize>(), 2);

    assert!(matches!(get_plot_bins(&c, |_| true, &x, &y, 0.0), Err(DredgeError::InvalidScale { .. })));
}

#[test]
fn test_display_order() {
    let dir = tempfile::tempdir().unwrap();
    write_project(dir.path());
    let project = load(dir.path());
    let c = project.pairwise_comparison("heat", "ctrl").unwrap();

    let watched: BTreeSet<String> = ["WBGene03", "WBGene02", "ghost"].iter().map(|s| s.to_string()).collect();
    let filters = DisplayFilters { watched: Some(watched), ..Default::default() };
    let names: Vec<String> = display_list(&c, &filters, SortPath::LogFc, SortOrder::Asc)
        .iter()
        .map(|r| r.name.clone())
        .collect();
    insta::assert_yaml_snapshot!("display_order", names);

    let filters = DisplayFilters { p_value_threshold: 0.05, ..Default::default() };
    let names: Vec<String> = display_list(&c, &filters, SortPath::PValue, SortOrder::Desc)
        .iter()
        .map(|r| r.name.clone())
        .collect();
    assert_eq!(names, vec!["WBGene02", "WBGene01"]);
}

#[test]
fn test_stale_selection_is_dropped() {
    let dir = tempfile::tempdir().unwrap();
    write_project(dir.path());
    let project = load(dir.path());
    let tracker = SelectionTracker::new();

    let first = tracker.select("ctrl", "heat");
    let loaded = load_selection(&project, &tracker, "heat", "ctrl").unwrap();
    assert!(loaded.is_some());
    assert_eq!(tracker.apply(&first, ()), None);
}

#[test]
fn test_histogram() {
    let dir = tempfile::tempdir().unwrap();
    write_project(dir.path());
    let project = load(dir.path());
    let c = project.pairwise_comparison("ctrl", "heat").unwrap();

    let h = PValueHistogram::new(&c, 3).unwrap();
    assert_eq!(h.log_floor(), -3.0);
    assert_eq!(h.total(), 3);
    assert_eq!(h.excluded(), 1);
}

#[test]
fn test_single_cell() {
    let dir = tempfile::tempdir().unwrap();
    write_project(dir.path());
    let project = load(dir.path());
    let sc = project.single_cell().unwrap();

    assert_eq!(sc.cells().len(), 5);
    assert_eq!(sc.expression().n_expressed_transcripts(), 2);

    let all = sc.expression().expressions_for_transcript("WBGene01", true).unwrap();
    assert_eq!(all.len(), 5);
    let expressed = sc.expression().expressions_for_transcript("WBGene01", false).unwrap();
    assert_eq!(expressed.len(), 3);
    assert!(expressed.iter().all(|(cell, v)| all.get(cell) == Some(v)));

    // listed, never expressed
    assert_eq!(sc.expression().expressions_for_transcript("WBGene02", false).unwrap().len(), 0);
    assert!(sc.expression().expressions_for_transcript("WBGene99", true).is_err());

    let summaries = sc.cluster_summaries("WBGene01").unwrap();
    let labels: Vec<&str> = summaries.iter().map(|s| s.label.as_str()).collect();
    assert_eq!(labels, vec!["Neurons", "Muscle", "3"]);
    assert_eq!(summaries[0].mean_expression, 2.0);
    assert_eq!(summaries[1].n_expressing, 0);
    assert_eq!(summaries[2].fraction_expressing, 1.0);
}

#[test]
fn test_broken_single_cell_blob_is_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    write_project(dir.path());
    // version 3
    fs::write(dir.path().join("sc/expression.bin"), [3u8, 0, 0, 0]).unwrap();
    let sink = Arc::new(RecordingSink::new());
    let project = Project::load_with_sink(Arc::new(FsFetcher::new(dir.path())), sink.clone(), "project.json").unwrap();

    assert!(project.single_cell().is_none());
    assert_eq!(sink.last_status("Single-cell expression"), Some(LoadStatus::Failed));
}
