use clap::{self, Args, Parser, Subcommand};
use dredge::bins::get_plot_bins;
use dredge::display::{display_list, DisplayFilters, SortOrder, SortPath};
use dredge::error::{DredgeError, Result};
use dredge::fetch::FsFetcher;
use dredge::histogram::PValueHistogram;
use dredge::pairwise::{DiffExpRecord, PairwiseComparison};
use dredge::project::Project;
use dredge::scale::LinearScale;
use dredge::singlecell::cells::parse_transcript_list;
use itertools::Itertools;
use log::{error, info};
use std::collections::BTreeSet;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::sync::Arc;

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    /// Project directory
    #[clap(short = 'p', long = "project")]
    project: String,

    /// Project configuration, relative to the project directory
    #[clap(long = "config", default_value = "project.json")]
    config: String,

    #[clap(subcommand)]
    command: MyCommand,
}

#[allow(non_camel_case_types)]
#[derive(Subcommand)]
enum MyCommand {
    info,
    search(SearchArgs),
    compare(CompareArgs),
    bins(BinsArgs),
    histogram(HistogramArgs),
    expression(ExpressionArgs),
}

/// Treatment pair of a comparison
#[derive(Args)]
struct PairArgs {
    /// first treatment
    #[clap(short = 'a', long = "treatment-a")]
    treatment_a: String,
    /// second treatment
    #[clap(short = 'b', long = "treatment-b")]
    treatment_b: String,
}

/// look up transcripts by name prefix, or resolve a list of names
#[derive(Args)]
struct SearchArgs {
    /// name prefix
    #[clap(default_value = "")]
    prefix: String,

    #[clap(long = "limit", default_value_t = 20)]
    limit: usize,

    /// file with one transcript name per line to resolve instead
    #[clap(long = "import")]
    import: Option<String>,
}

/// print the transcript table of a comparison as TSV
#[derive(Args)]
struct CompareArgs {
    #[clap(flatten)]
    pair: PairArgs,

    /// p-value threshold
    #[clap(long = "pvalue", default_value_t = 1.0)]
    pvalue: f64,

    /// label, pvalue, logfc, logata, mean_a, median_a, mean_b, median_b
    #[clap(long = "sort", default_value = "pvalue")]
    sort: SortPath,

    #[clap(long = "desc")]
    desc: bool,

    /// only show transcripts listed in this file (one per line)
    #[clap(long = "watched")]
    watched: Option<String>,

    #[clap(long = "limit")]
    limit: Option<usize>,
}

/// MA plot bins of a comparison
#[derive(Args)]
struct BinsArgs {
    #[clap(flatten)]
    pair: PairArgs,

    #[clap(long = "pvalue", default_value_t = 1.0)]
    pvalue: f64,

    /// plot width in pixels
    #[clap(long = "width", default_value_t = 600.0)]
    width: f64,

    /// plot height in pixels
    #[clap(long = "height", default_value_t = 400.0)]
    height: f64,

    /// bin size in pixels
    #[clap(long = "unit", default_value_t = 10.0)]
    unit: f64,
}

/// p-value histogram of a comparison
#[derive(Args)]
struct HistogramArgs {
    #[clap(flatten)]
    pair: PairArgs,

    #[clap(long = "bins", default_value_t = 20)]
    n_bins: usize,
}

/// single-cell expression of a transcript
#[derive(Args)]
struct ExpressionArgs {
    #[clap(long = "transcript", short = 't')]
    transcript: String,

    /// print one value per cell instead of cluster summaries
    #[clap(long = "cells")]
    cells: bool,

    /// with --cells, include cells without expression
    #[clap(long = "zeros")]
    zeros: bool,
}

fn fmt_opt(x: Option<f64>) -> String {
    x.map(|v| format!("{v}")).unwrap_or_else(|| "NA".to_string())
}

fn record_row(r: &DiffExpRecord) -> String {
    [
        r.name.clone(),
        r.label.clone(),
        fmt_opt(r.log_fc),
        fmt_opt(r.log_ata),
        fmt_opt(r.p_value),
        fmt_opt(r.treatment_a_mean),
        fmt_opt(r.treatment_a_median),
        fmt_opt(r.treatment_b_mean),
        fmt_opt(r.treatment_b_median),
    ]
    .iter()
    .join("\t")
}

/// (min, max) of the present values, widened if all are equal
fn extent(values: impl Iterator<Item = Option<f64>>) -> (f64, f64) {
    let (lo, hi) = match values.flatten().minmax() {
        itertools::MinMaxResult::NoElements => (0.0, 1.0),
        itertools::MinMaxResult::OneElement(x) => (x, x),
        itertools::MinMaxResult::MinMax(a, b) => (a, b),
    };
    if lo == hi {
        (lo - 1.0, hi + 1.0)
    } else {
        (lo, hi)
    }
}

fn read_name_list(path: &str) -> Result<Vec<String>> {
    Ok(parse_transcript_list(&fs::read_to_string(path)?)
        .into_iter()
        .filter(|n| !n.is_empty())
        .collect())
}

fn comparison(project: &Project, pair: &PairArgs) -> Result<Arc<PairwiseComparison>> {
    project.pairwise_comparison(&pair.treatment_a, &pair.treatment_b)
}

fn run(cli: Cli) -> Result<()> {
    let project = Project::load(Arc::new(FsFetcher::new(&cli.project)), &cli.config)?;
    let stdout = io::stdout();
    let mut writer = BufWriter::new(stdout.lock());

    match cli.command {
        MyCommand::info => {
            let config = project.config();
            writeln!(writer, "{}", config.label)?;
            for (key, t) in project.treatments() {
                writeln!(writer, "treatment\t{key}\t{}\t{}", t.label, t.replicates.iter().join(","))?;
            }
            writeln!(writer, "transcripts\t{}", project.abundances().transcripts().len())?;
            writeln!(writer, "replicates\t{}", project.abundances().replicates().len())?;
            writeln!(writer, "names\t{}", project.corpus().len())?;
            if let Some(sc) = project.single_cell() {
                writeln!(
                    writer,
                    "single-cell\t{} cells\t{} clusters\t{} expressed transcripts",
                    sc.cells().len(),
                    sc.clusters().len(),
                    sc.expression().n_expressed_transcripts()
                )?;
            }
            if let Some(readme) = project.readme() {
                writeln!(writer, "\n{readme}")?;
            }
        }
        MyCommand::search(args) => match args.import {
            Some(path) => {
                let names = read_name_list(&path)?;
                let result = project.corpus().resolve_imports(&names);
                info!("{} found, {} not found", result.found.len(), result.not_found.len());
                for name in result.found.iter() {
                    writeln!(writer, "found\t{name}")?;
                }
                for name in result.not_found.iter() {
                    writeln!(writer, "missing\t{name}")?;
                }
            }
            None => {
                for (alias, canonical) in project.corpus().search_by_prefix(&args.prefix, args.limit) {
                    let links = project.hyperlinks(canonical).into_iter().map(|(_, url)| url).join(" ");
                    writeln!(writer, "{alias}\t{canonical}\t{links}")?;
                }
            }
        },
        MyCommand::compare(args) => {
            let c = comparison(&project, &args.pair)?;
            let watched = match &args.watched {
                Some(path) => {
                    let names = read_name_list(path)?;
                    let resolved = project.corpus().resolve_imports(&names);
                    Some(resolved.found.into_iter().chain(resolved.not_found).collect::<BTreeSet<String>>())
                }
                None => None,
            };
            let filters = DisplayFilters { p_value_threshold: args.pvalue, watched, ..Default::default() };
            let order = if args.desc { SortOrder::Desc } else { SortOrder::Asc };
            let list = display_list(&c, &filters, args.sort, order);

            writeln!(writer, "name\tlabel\tlogFC\tlogATA\tpValue\tmeanA\tmedianA\tmeanB\tmedianB")?;
            for r in list.iter().take(args.limit.unwrap_or(usize::MAX)) {
                writeln!(writer, "{}", record_row(r))?;
            }
        }
        MyCommand::bins(args) => {
            let c = comparison(&project, &args.pair)?;
            let (ata_lo, ata_hi) = extent(c.records().iter().map(|r| r.log_ata));
            let (fc_lo, fc_hi) = extent(c.records().iter().map(|r| r.log_fc));
            let fc_max = fc_lo.abs().max(fc_hi.abs());

            let x = LinearScale::new((ata_lo, ata_hi), (0.0, args.width))?;
            let y = LinearScale::new((-fc_max, fc_max), (args.height, 0.0))?;
            let bins = get_plot_bins(&c, |r| r.passes_p_value(args.pvalue), &x, &y, args.unit)?;

            writeln!(writer, "minFC\tmaxFC\tminATA\tmaxATA\tx0\ty0\tcount")?;
            for b in bins.iter().filter(|b| !b.is_empty()) {
                writeln!(
                    writer,
                    "{}\t{}\t{}\t{}\t{}\t{}\t{}",
                    b.min_fc, b.max_fc, b.min_ata, b.max_ata, b.x0, b.y0, b.len()
                )?;
            }
        }
        MyCommand::histogram(args) => {
            let c = comparison(&project, &args.pair)?;
            let h = PValueHistogram::new(&c, args.n_bins)?;
            writeln!(writer, "lower\tupper\tcount")?;
            for b in h.bins() {
                writeln!(writer, "{:e}\t{:e}\t{}", b.lower, b.upper, b.count)?;
            }
            info!("{} records without a usable p-value", h.excluded());
        }
        MyCommand::expression(args) => {
            let sc = match project.single_cell() {
                Some(sc) => sc,
                None => return Err(DredgeError::not_found("single-cell data for this project")),
            };
            if args.cells {
                let values = sc.expression().expressions_for_transcript(args.transcript.as_str(), args.zeros)?;
                writeln!(writer, "cell\tcluster\texpression")?;
                for (idx, value) in values {
                    let cell = &sc.cells()[idx.0 as usize];
                    writeln!(writer, "{}\t{}\t{}", cell.id, cell.cluster, value)?;
                }
            } else {
                writeln!(writer, "cluster\tlabel\tcells\texpressing\tfraction\tmean")?;
                for s in sc.cluster_summaries(args.transcript.as_str())? {
                    writeln!(
                        writer,
                        "{}\t{}\t{}\t{}\t{:.3}\t{:.3}",
                        s.cluster, s.label, s.n_cells, s.n_expressing, s.fraction_expressing, s.mean_expression
                    )?;
                }
            }
        }
    }
    writer.flush()?;
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        error!("{e}");
        std::process::exit(1);
    }
}
