/// pathsgd - 1-D path-guided SGD sort for GFA graphs
///
/// Reads a GFA file, learns a 1-D layout from the embedded paths, sorts
/// the nodes by the learned coordinate (refined by weakly-connected
/// components), and writes the renumbered graph back out.
use clap::Parser;
use pathsgd::{load_gfa, path_linear_sgd_order, write_gfa, PathIndex, PathSgdParams};
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(name = "pathsgd")]
#[command(about = "Sort a GFA file by a path-guided SGD 1-D layout")]
#[command(long_about = "Sort a GFA file by a path-guided SGD 1-D layout.\n\n\
The engine samples pairs of positions along the embedded paths, with the\n\
pair distance drawn from a Zipfian distribution, and nudges the 1-D\n\
coordinates of the touched nodes toward their path distance. Nodes are\n\
then emitted in coordinate order, grouped by weakly-connected component.")]
struct Args {
    /// Input GFA file
    #[arg(short = 'i', long)]
    input: PathBuf,

    /// Output GFA file
    #[arg(short = 'o', long)]
    output: PathBuf,

    /// Maximum number of iterations
    #[arg(long, default_value = "100")]
    iter_max: u64,

    /// Iteration at which the learning rate peaks
    #[arg(long, default_value = "0")]
    iter_with_max_learning_rate: u64,

    /// Term updates per iteration; defaults to 10 x node count
    #[arg(long)]
    min_term_updates: Option<u64>,

    /// Convergence threshold on the largest per-update move
    #[arg(long, default_value = "0.0")]
    delta: f64,

    /// Relative final learning rate
    #[arg(long, default_value = "0.01")]
    eps: f64,

    /// Maximum learning rate
    #[arg(long, default_value = "100.0")]
    eta_max: f64,

    /// Zipfian exponent for term distances
    #[arg(long, default_value = "0.99")]
    theta: f64,

    /// Largest term distance; defaults to the longest path length
    #[arg(long)]
    space: Option<u64>,

    /// Number of worker threads
    #[arg(short = 't', long, default_value = "1")]
    threads: usize,

    /// Sample uniformly over path steps instead of path nucleotides
    #[arg(long)]
    sample_from_steps: bool,

    /// Sample uniformly over nodes, then over each node's path visits
    #[arg(long)]
    sample_from_nodes: bool,

    /// Run the single-threaded seeded driver
    #[arg(long)]
    deterministic: bool,

    /// Seed string for deterministic mode
    #[arg(long, default_value = "pathsgd")]
    seed: String,

    /// Report per-iteration progress on stderr
    #[arg(long)]
    progress: bool,
}

fn main() {
    let args = Args::parse();

    if args.progress {
        eprintln!("[pathsgd] reading {}", args.input.display());
    }
    let graph = match load_gfa(&args.input) {
        Ok(graph) => graph,
        Err(e) => {
            eprintln!("[pathsgd] error reading {}: {}", args.input.display(), e);
            process::exit(1);
        }
    };
    if args.progress {
        eprintln!(
            "[pathsgd] loaded {} nodes, {} edges, {} paths",
            graph.node_count(),
            graph.edges.len(),
            graph.paths.len()
        );
    }
    if graph.paths.is_empty() {
        eprintln!("[pathsgd] input has no paths to guide the layout");
        process::exit(1);
    }

    let index = PathIndex::from_graph(&graph);
    let use_paths: Vec<usize> = (0..index.path_count()).collect();
    let longest_path = use_paths
        .iter()
        .map(|&p| index.path_length(p) as u64)
        .max()
        .unwrap_or(1)
        .max(1);

    let params = PathSgdParams {
        iter_max: args.iter_max,
        iter_with_max_learning_rate: args.iter_with_max_learning_rate,
        min_term_updates: args
            .min_term_updates
            .unwrap_or(10 * graph.node_count() as u64),
        delta: args.delta,
        eps: args.eps,
        eta_max: args.eta_max,
        theta: args.theta,
        space: args.space.unwrap_or(longest_path),
        nthreads: args.threads,
        progress: args.progress,
        snapshot: false,
        sample_from_paths: !args.sample_from_steps,
        sample_from_nodes: args.sample_from_nodes,
        deterministic: args.deterministic,
        seed: args.seed.clone(),
    };

    let result = match path_linear_sgd_order(&graph, &index, &use_paths, &params) {
        Ok(result) => result,
        Err(e) => {
            eprintln!("[pathsgd] layout failed: {e}");
            process::exit(1);
        }
    };

    let sorted = match graph.apply_ordering(&result.order) {
        Ok(sorted) => sorted,
        Err(e) => {
            eprintln!("[pathsgd] could not apply ordering: {e}");
            process::exit(1);
        }
    };

    if args.progress {
        eprintln!("[pathsgd] writing {}", args.output.display());
    }
    let file = match File::create(&args.output) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("[pathsgd] error creating {}: {}", args.output.display(), e);
            process::exit(1);
        }
    };
    let mut writer = BufWriter::new(file);
    if let Err(e) = write_gfa(&sorted, &mut writer) {
        eprintln!("[pathsgd] error writing {}: {}", args.output.display(), e);
        process::exit(1);
    }
    if args.progress {
        eprintln!("[pathsgd] done");
    }
}
