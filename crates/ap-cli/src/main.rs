//! ap-cli entrypoint: runs a small filter pipeline over an ion/range file
//! pair without a GUI, for scripted batch analysis and smoke-testing the
//! filter stack end to end.
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use core_analysis::AnalysisState;
use core_filter::{AbortFlag, Filter};
use core_ranges::RangeFile;
use core_refresh::RefreshEngine;
use core_stream::{decode_ion_buffer, Cached, FilterId, FilterStream, IonsStream, RangeStream};
use core_tree::NodeId;
use filters_stock::{construct_stock_filter, StockFilterRegistry};
use std::sync::Arc;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;

/// Run a pipeline of stock filters over an ion file, optionally ranged, and
/// print the resulting stream sizes.
#[derive(Parser, Debug)]
#[command(name = "ap-cli", version, about = "Atom-probe filter pipeline runner")]
struct Args {
    /// Path to a raw little-endian (x,y,z,value) float32 ion file.
    ion_file: PathBuf,

    /// Optional range file (RNG/RRNG/ENV dialect auto-detected).
    #[arg(long)]
    range_file: Option<PathBuf>,

    /// Semicolon-separated filter chain, e.g.
    /// "IonDownsample:Max count=1000;Range:Enabled ions=H,O".
    /// Each filter becomes the child of the previous one.
    #[arg(long, default_value = "")]
    script: String,

    /// Load a saved analysis-state XML file instead of building the chain
    /// from `--script`; the first root's subtree is used as the pipeline.
    #[arg(long)]
    state_file: Option<PathBuf>,
}

fn configure_logging() -> Option<WorkerGuard> {
    let file_appender = tracing_appender::rolling::never(".", "ap-cli.log");
    let (nb_writer, guard) = tracing_appender::non_blocking(file_appender);
    match tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(nb_writer)
        .try_init()
    {
        Ok(_) => Some(guard),
        Err(_) => None,
    }
}

/// Parses one `Type:Prop=val,Prop=val` clause and returns a constructed
/// filter with every named property applied. Property names are matched
/// case-insensitively against `FilterProperty::name`.
fn build_filter(clause: &str) -> Result<Box<dyn Filter>> {
    let (type_name, prop_str) = match clause.split_once(':') {
        Some((t, p)) => (t.trim(), p),
        None => (clause.trim(), ""),
    };
    let mut filter = construct_stock_filter(type_name).with_context(|| format!("unknown filter type {type_name:?}"))?;

    for assignment in prop_str.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let (prop_name, value) = assignment.split_once('=').with_context(|| format!("malformed property assignment {assignment:?}"))?;
        let key = filter
            .properties()
            .properties
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(prop_name.trim()))
            .map(|p| p.key)
            .with_context(|| format!("{type_name} has no property named {prop_name:?}"))?;
        let outcome = filter.set_property(key, value.trim());
        if !outcome.ok {
            bail!("{type_name}.{prop_name} rejected value {value:?}");
        }
    }
    Ok(filter)
}

fn build_chain_from_script(script: &str) -> Result<Vec<Box<dyn Filter>>> {
    script.split(';').map(str::trim).filter(|s| !s.is_empty()).map(build_filter).collect()
}

fn load_ions(path: &PathBuf) -> Result<FilterStream> {
    let bytes = std::fs::read(path).with_context(|| format!("reading ion file {}", path.display()))?;
    let hits = decode_ion_buffer(&bytes).with_context(|| format!("decoding ion file {}", path.display()))?;
    info!(target: "ap_cli.load", path = %path.display(), count = hits.len(), "ions_loaded");
    Ok(FilterStream::Ions { parent: FilterId::fresh(), cached: Cached::Transferred, data: IonsStream::new(hits) })
}

fn load_ranges(path: &PathBuf) -> Result<FilterStream> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading range file {}", path.display()))?;
    let rf = RangeFile::read(&text).with_context(|| format!("parsing range file {}", path.display()))?;
    info!(target: "ap_cli.load", path = %path.display(), ions = rf.ions().len(), ranges = rf.ranges().len(), "ranges_loaded");
    Ok(FilterStream::Range { parent: FilterId::fresh(), cached: Cached::Owned, data: RangeStream::new(Arc::new(rf)) })
}

fn describe_stream(stream: &FilterStream) -> String {
    match stream {
        FilterStream::Ions { data, .. } => format!("Ions({} hits)", data.len()),
        FilterStream::Plot1D { data, .. } => format!("Plot1D({:?}, {} points)", data.title, data.len()),
        FilterStream::Plot2D { .. } => "Plot2D".to_string(),
        FilterStream::Draw { data, .. } => format!("Draw({} primitives)", data.items.len()),
        FilterStream::Range { data, .. } => format!("Range({} ions)", data.file.ions().len()),
        FilterStream::VoxelDense { data, .. } => format!("VoxelDense({:?})", data.grid.size()),
        FilterStream::VoxelSparse { data, .. } => format!("VoxelSparse({} active cells)", data.field.len()),
    }
}

fn main() -> Result<()> {
    let _log_guard = configure_logging();
    let args = Args::parse();

    let mut roots_input = vec![load_ions(&args.ion_file)?];
    if let Some(range_path) = &args.range_file {
        roots_input.push(load_ranges(range_path)?);
    }

    let registry = StockFilterRegistry;
    let mut state = AnalysisState::new();
    let mut last_node: Option<NodeId> = None;

    if let Some(state_path) = &args.state_file {
        let xml = std::fs::read_to_string(state_path).with_context(|| format!("reading state file {}", state_path.display()))?;
        state = core_analysis::load_state(&xml, &registry, false).with_context(|| format!("loading state file {}", state_path.display()))?;
        let roots = state.tree().tree().roots().to_vec();
        last_node = roots.last().copied();
    } else {
        let chain = build_chain_from_script(&args.script)?;
        let mut parent_handle = None;
        for filter in chain {
            let handle = state.tree_mut().add_filter(filter, parent_handle).map_err(|e| anyhow::anyhow!("adding filter to tree: {e:?}"))?;
            parent_handle = Some(handle);
            last_node = state.tree().node_of(handle);
        }
    }

    let mut engine = RefreshEngine::new();
    let abort = AbortFlag::new();
    let outputs = match engine.run(state.tree_mut(), &roots_input, &abort) {
        Ok(out) => out,
        Err(e) => {
            error!(target: "ap_cli.refresh", error = %e, "refresh_failed");
            bail!("refresh failed: {e}");
        }
    };

    let Some(node) = last_node else {
        println!("empty pipeline; nothing to report");
        return Ok(());
    };
    let Some(streams) = outputs.per_node.get(&node) else {
        println!("no output recorded for the terminal filter");
        return Ok(());
    };

    println!("pipeline output ({} stream(s)):", streams.len());
    for stream in streams {
        println!("  {}", describe_stream(stream));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_filter_applies_named_properties() {
        let filter = build_filter("IonDownsample:Max count=500,Fixed count=1").unwrap();
        assert_eq!(filter.type_string(), "IonDownsample");
    }

    #[test]
    fn build_filter_rejects_unknown_type() {
        assert!(build_filter("NotAFilter").is_err());
    }

    #[test]
    fn build_filter_rejects_unknown_property() {
        assert!(build_filter("IonDownsample:Bogus=1").is_err());
    }

    #[test]
    fn build_chain_from_script_parses_a_multi_stage_pipeline() {
        let chain = build_chain_from_script("IonDownsample:Max count=1000;Range").unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].type_string(), "IonDownsample");
        assert_eq!(chain[1].type_string(), "Range");
    }

    #[test]
    fn empty_script_yields_an_empty_chain() {
        assert!(build_chain_from_script("").unwrap().is_empty());
    }
}
