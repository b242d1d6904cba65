/// Path-guided stochastic gradient descent over a 1-D layout.
///
/// Nodes get a real-valued coordinate such that node pairs close along
/// embedded paths end up close in the coordinate, weighted inversely by
/// their path distance. The concurrent driver runs lock-free Hogwild
/// updates from worker threads while a controller thread advances the
/// learning-rate schedule; the deterministic driver is a single-threaded,
/// seeded equivalent with identical sampling and update rules.
use crate::graph::BidirectedGraph;
use crate::pathindex::PathIndex;
use crate::zipf::ZipfianInt;
use crate::{Error, Result};
use rand::distr::{Distribution, Uniform};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Hyperparameters for a layout run.
#[derive(Debug, Clone)]
pub struct PathSgdParams {
    pub iter_max: u64,
    pub iter_with_max_learning_rate: u64,
    /// Term updates per iteration tick. In deterministic mode, sampling
    /// attempts per outer iteration.
    pub min_term_updates: u64,
    /// Convergence threshold on the largest per-update move.
    pub delta: f64,
    /// Final learning rate, relative to w_max.
    pub eps: f64,
    pub eta_max: f64,
    /// Zipfian exponent for term distances.
    pub theta: f64,
    /// Largest term distance the Zipfian can draw.
    pub space: u64,
    pub nthreads: usize,
    pub progress: bool,
    /// Record a copy of the layout at each iteration.
    pub snapshot: bool,
    /// Sample the first term end uniformly over path nucleotides.
    pub sample_from_paths: bool,
    /// Sample the first term end uniformly over nodes, then pick one of the
    /// node's path visits. Takes precedence over `sample_from_paths`.
    pub sample_from_nodes: bool,
    /// Use the single-threaded seeded driver.
    pub deterministic: bool,
    /// Seed string for deterministic mode.
    pub seed: String,
}

impl Default for PathSgdParams {
    fn default() -> Self {
        PathSgdParams {
            iter_max: 100,
            iter_with_max_learning_rate: 0,
            min_term_updates: 1000,
            delta: 0.0,
            eps: 0.01,
            eta_max: 100.0,
            theta: 0.99,
            space: 100,
            nthreads: 1,
            progress: false,
            snapshot: false,
            sample_from_paths: true,
            sample_from_nodes: false,
            deterministic: false,
            seed: String::from("pathsgd"),
        }
    }
}

impl PathSgdParams {
    pub fn validate(&self) -> Result<()> {
        if self.iter_max == 0 {
            return Err(Error::InvalidParameter("iter_max must be at least 1".into()));
        }
        if self.space < 1 {
            return Err(Error::InvalidParameter("space must be at least 1".into()));
        }
        if !(self.theta > 0.0) {
            return Err(Error::InvalidParameter("theta must be positive".into()));
        }
        if self.theta == 1.0 {
            return Err(Error::InvalidParameter(
                "theta must not equal 1 (harmonic singularity)".into(),
            ));
        }
        if !(self.eta_max > 0.0) {
            return Err(Error::InvalidParameter("eta_max must be positive".into()));
        }
        if !(self.eps > 0.0) {
            return Err(Error::InvalidParameter("eps must be positive".into()));
        }
        if self.nthreads == 0 {
            return Err(Error::InvalidParameter("nthreads must be at least 1".into()));
        }
        Ok(())
    }
}

/// The learned coordinates, indexed by node rank, plus any per-iteration
/// snapshots that were recorded.
#[derive(Debug, Clone, Default)]
pub struct SgdLayout {
    pub x: Vec<f64>,
    pub snapshots: Vec<Vec<f64>>,
}

#[inline]
fn f64_to_u64(f: f64) -> u64 {
    f.to_bits()
}

#[inline]
fn u64_to_f64(u: u64) -> f64 {
    f64::from_bits(u)
}

/// Learning-rate schedule: a tent in log space peaking at
/// `iter_with_max_learning_rate`, decaying symmetrically at rate lambda
/// from eta_max = 1/w_min down towards eta_min = eps/w_max.
pub fn path_linear_sgd_schedule(
    w_min: f64,
    w_max: f64,
    iter_max: u64,
    iter_with_max_learning_rate: u64,
    eps: f64,
) -> Vec<f64> {
    let eta_max = 1.0 / w_min;
    let eta_min = eps / w_max;
    let denom = if iter_max > 1 { (iter_max - 1) as f64 } else { 1.0 };
    let lambda = (eta_max / eta_min).ln() / denom;
    let mut etas = Vec::with_capacity(iter_max as usize);
    for t in 0..iter_max as i64 {
        let dist = (t - iter_with_max_learning_rate as i64).abs() as f64;
        etas.push(eta_max * (-lambda * dist).exp());
    }
    etas
}

/// Maps a pangenomic nucleotide position onto (path, start offset): the
/// selected paths are laid out back to back, path `use_paths[k]` covering
/// the half-open range starting at the running total of earlier lengths.
pub(crate) struct PathIntervals {
    starts: Vec<u64>,
    lengths: Vec<u64>,
    paths: Vec<usize>,
    total: u64,
}

impl PathIntervals {
    pub(crate) fn build(path_index: &PathIndex, use_paths: &[usize]) -> Self {
        let mut starts = Vec::with_capacity(use_paths.len());
        let mut lengths = Vec::with_capacity(use_paths.len());
        let mut paths = Vec::with_capacity(use_paths.len());
        let mut total = 0u64;
        for &path in use_paths {
            let len = path_index.path_length(path) as u64;
            starts.push(total);
            lengths.push(len);
            paths.push(path);
            total += len;
        }
        PathIntervals {
            starts,
            lengths,
            paths,
            total,
        }
    }

    pub(crate) fn total(&self) -> u64 {
        self.total
    }

    /// The unique interval covering `pos`, as (path, interval start).
    pub(crate) fn find(&self, pos: u64) -> Result<(usize, u64)> {
        if pos >= self.total {
            return Err(Error::IntervalNotFound(pos));
        }
        let idx = self.starts.partition_point(|&start| start <= pos) - 1;
        let start = self.starts[idx];
        if pos - start >= self.lengths[idx] {
            return Err(Error::IntervalNotFound(pos));
        }
        Ok((self.paths[idx], start))
    }
}

/// One SGD training example: two node ranks and their path distance.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Term {
    pub i: usize,
    pub j: usize,
    pub d_ij: f64,
}

fn uniform_range(low: u64, high_exclusive: u64) -> Result<Uniform<u64>> {
    Uniform::new(low, high_exclusive)
        .map_err(|e| Error::InvalidParameter(format!("empty sampling range: {e}")))
}

fn uniform_inclusive(low: u64, high: u64) -> Result<Uniform<u64>> {
    Uniform::new_inclusive(low, high)
        .map_err(|e| Error::InvalidParameter(format!("empty sampling range: {e}")))
}

/// Draws SGD terms. One of three first-end sampling modes feeds a shared
/// tail: a Zipfian distance and a direction pick the second end on the
/// same path, positions snap to node starts (or node ends for reverse
/// steps), and degenerate draws are skipped.
pub(crate) struct TermSampler<'a> {
    graph: &'a BidirectedGraph,
    path_index: &'a PathIndex,
    intervals: &'a PathIntervals,
    zipf: ZipfianInt,
    pos_dist: Uniform<u64>,
    flip_dist: Uniform<u64>,
    num_nodes: u64,
    sample_from_paths: bool,
    sample_from_nodes: bool,
}

impl<'a> TermSampler<'a> {
    pub(crate) fn new(
        graph: &'a BidirectedGraph,
        path_index: &'a PathIndex,
        intervals: &'a PathIntervals,
        params: &PathSgdParams,
    ) -> Result<Self> {
        let num_nodes = graph.node_count() as u64;
        let pos_dist = if params.sample_from_nodes {
            uniform_inclusive(1, num_nodes)?
        } else if params.sample_from_paths {
            if intervals.total() == 0 {
                return Err(Error::InvalidParameter(
                    "selected paths have zero total length".into(),
                ));
            }
            uniform_range(0, intervals.total())?
        } else {
            uniform_range(0, path_index.np_bv().len() as u64)?
        };
        Ok(TermSampler {
            graph,
            path_index,
            intervals,
            zipf: ZipfianInt::new(1, params.space, params.theta),
            pos_dist,
            flip_dist: uniform_range(0, 2)?,
            num_nodes,
            sample_from_paths: params.sample_from_paths,
            sample_from_nodes: params.sample_from_nodes,
        })
    }

    /// Draw one term. `Ok(None)` means the draw hit a skip condition and
    /// the caller should simply sample again.
    pub(crate) fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Option<Term>> {
        let pos = self.pos_dist.sample(rng);
        let (path, pos_in_path_a, path_len) = if self.sample_from_nodes {
            // uniform over nodes, then uniform over the node's path visits
            let node_index = self.path_index.np_bv_select(pos as usize);
            let next_node_index = if pos == self.num_nodes {
                self.path_index.np_bv().len()
            } else {
                self.path_index.np_bv_select(pos as usize + 1)
            };
            let hit_num_paths = next_node_index - node_index - 1;
            if hit_num_paths == 0 {
                return Ok(None);
            }
            let np_idx = node_index + rng.random_range(1..=hit_num_paths);
            let path = self.path_index.npi_iv()[np_idx] as usize;
            let rank = self.path_index.nr_iv()[np_idx] as usize - 1;
            let step = self.path_index.step_at(path, rank);
            (
                path,
                self.path_index.get_position_of_step(step),
                self.path_index.path_length(path) - 1,
            )
        } else if self.sample_from_paths {
            // uniform over pangenomic nucleotide positions
            let (path, start) = self.intervals.find(pos)?;
            (
                path,
                (pos - start) as usize,
                self.path_index.path_length(path) - 1,
            )
        } else {
            // uniform over np slots; node-boundary bits are skipped
            let pos = pos as usize;
            if self.path_index.np_bv().get(pos) {
                return Ok(None);
            }
            let path = self.path_index.npi_iv()[pos] as usize;
            let rank = self.path_index.nr_iv()[pos] as usize - 1;
            let step = self.path_index.step_at(path, rank);
            (
                path,
                self.path_index.get_position_of_step(step),
                self.path_index.path_length(path) - 1,
            )
        };

        let mut zipf_int = self.zipf.sample(rng);
        let mut pos_in_path_b = pos_in_path_a;
        if self.flip_dist.sample(rng) == 1 {
            // walk backward along the path
            if zipf_int > pos_in_path_a as u64 {
                if pos_in_path_a == 0 {
                    return Ok(None);
                }
                zipf_int %= pos_in_path_a as u64;
            }
            pos_in_path_b -= zipf_int as usize;
        } else {
            // walk forward
            let room = (path_len - pos_in_path_a) as u64;
            if zipf_int > room {
                if room == 0 {
                    return Ok(None);
                }
                zipf_int %= room;
            }
            pos_in_path_b += zipf_int as usize;
        }

        let step_a = self.path_index.get_step_at_position(path, pos_in_path_a);
        let step_b = self.path_index.get_step_at_position(path, pos_in_path_b);
        let term_i = self.path_index.get_handle_of_step(step_a);
        let term_j = self.path_index.get_handle_of_step(step_b);

        // snap to node starts, then to node ends for reverse traversals so
        // the distance is measured between the pinned ends
        let mut pos_a = self.path_index.get_position_of_step(step_a);
        let mut pos_b = self.path_index.get_position_of_step(step_b);
        if term_i.is_reverse() {
            pos_a += self.graph.length(term_i);
        }
        if term_j.is_reverse() {
            pos_b += self.graph.length(term_j);
        }

        let d_ij = (pos_a as f64 - pos_b as f64).abs();
        if d_ij == 0.0 {
            return Ok(None);
        }
        Ok(Some(Term {
            i: term_i.index(),
            j: term_j.index(),
            d_ij,
        }))
    }
}

/// One Hogwild update of the shared coordinates. Returns |Delta| for
/// convergence tracking. The load/store pairs are deliberately not
/// read-modify-write: colliding updates may lose a write, which the
/// stochastic approximation tolerates.
fn apply_term_update(x: &[AtomicU64], term: &Term, eta: f64) -> f64 {
    let w_ij = 1.0 / term.d_ij;
    let mut mu = eta * w_ij;
    if mu > 1.0 {
        mu = 1.0;
    }
    let x_i = u64_to_f64(x[term.i].load(Ordering::Relaxed));
    let x_j = u64_to_f64(x[term.j].load(Ordering::Relaxed));
    let mut dx = x_i - x_j;
    if dx == 0.0 {
        dx = 1e-9;
    }
    let mag = dx.abs();
    let delta = mu * (mag - term.d_ij) / 2.0;
    let r = delta / mag;
    let r_x = r * dx;
    x[term.i].store(
        f64_to_u64(u64_to_f64(x[term.i].load(Ordering::Relaxed)) - r_x),
        Ordering::Relaxed,
    );
    x[term.j].store(
        f64_to_u64(u64_to_f64(x[term.j].load(Ordering::Relaxed)) + r_x),
        Ordering::Relaxed,
    );
    delta.abs()
}

/// Seed the coordinates with prefix sums of node lengths in handle
/// iteration order, so the initial layout is monotone along that order.
fn initialize_layout(graph: &BidirectedGraph) -> Vec<AtomicU64> {
    let x: Vec<AtomicU64> = (0..graph.node_count()).map(|_| AtomicU64::new(0)).collect();
    let mut len = 0u64;
    graph.for_each_handle(|handle| {
        x[handle.index()].store(f64_to_u64(len as f64), Ordering::Relaxed);
        len += graph.length(handle) as u64;
    });
    x
}

fn collect_layout(x: &[AtomicU64]) -> Vec<f64> {
    x.iter()
        .map(|v| u64_to_f64(v.load(Ordering::Relaxed)))
        .collect()
}

/// True when at least one sampleable path can yield a term with two
/// distinct steps; otherwise every draw would be skipped and the workers
/// would spin without ever ticking the controller.
fn can_produce_terms(path_index: &PathIndex, use_paths: &[usize], params: &PathSgdParams) -> bool {
    if !params.sample_from_nodes && params.sample_from_paths {
        use_paths
            .iter()
            .any(|&p| path_index.path_step_count(p) > 1)
    } else {
        (0..path_index.path_count()).any(|p| path_index.path_step_count(p) > 1)
    }
}

fn fold_seed(bytes: &[u8]) -> u64 {
    // FNV-1a
    let mut hash = 0xcbf2_9ce4_8422_2325u64;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

/// Concurrent layout run: `nthreads` Hogwild workers, a controller thread
/// driving the schedule and termination, and (when snapshots are on) a
/// snapshot thread copying the layout once per iteration.
pub fn path_linear_sgd(
    graph: &BidirectedGraph,
    path_index: &PathIndex,
    use_paths: &[usize],
    params: &PathSgdParams,
) -> Result<SgdLayout> {
    params.validate()?;
    let num_nodes = graph.node_count();
    if num_nodes == 0 {
        return Ok(SgdLayout::default());
    }
    let x = initialize_layout(graph);
    if !can_produce_terms(path_index, use_paths, params) {
        return Ok(SgdLayout {
            x: collect_layout(&x),
            snapshots: Vec::new(),
        });
    }
    let intervals = PathIntervals::build(path_index, use_paths);
    let sampler = TermSampler::new(graph, path_index, &intervals, params)?;
    let etas = path_linear_sgd_schedule(
        1.0 / params.eta_max,
        1.0,
        params.iter_max,
        params.iter_with_max_learning_rate,
        params.eps,
    );

    if params.progress {
        eprintln!(
            "[pathsgd] {} iterations, {} term updates per iteration, {} threads",
            params.iter_max, params.min_term_updates, params.nthreads
        );
    }

    let term_updates = AtomicU64::new(0);
    let iteration = AtomicU64::new(0);
    let eta = AtomicU64::new(f64_to_u64(etas[0]));
    let delta_max = AtomicU64::new(f64_to_u64(0.0));
    let work_todo = AtomicBool::new(true);
    let failure: Mutex<Option<Error>> = Mutex::new(None);

    let clock_seed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);

    let mut snapshots: Vec<Vec<f64>> = Vec::new();

    thread::scope(|scope| {
        let x = &x;
        let sampler = &sampler;
        let etas = &etas;
        let term_updates = &term_updates;
        let iteration = &iteration;
        let eta = &eta;
        let delta_max = &delta_max;
        let work_todo = &work_todo;
        let failure = &failure;

        let controller = scope.spawn(move || {
            while work_todo.load(Ordering::Relaxed) {
                if term_updates.load(Ordering::Relaxed) >= params.min_term_updates {
                    let iter = iteration.fetch_add(1, Ordering::Relaxed) + 1;
                    if iter > params.iter_max {
                        work_todo.store(false, Ordering::Relaxed);
                    } else if u64_to_f64(delta_max.load(Ordering::Relaxed)) <= params.delta {
                        if params.progress {
                            eprintln!(
                                "[pathsgd] delta_max: {} <= delta: {}. Threshold reached, ending iterations.",
                                u64_to_f64(delta_max.load(Ordering::Relaxed)),
                                params.delta
                            );
                        }
                        work_todo.store(false, Ordering::Relaxed);
                    } else {
                        if params.progress {
                            let percent = iter as f64 / params.iter_max as f64 * 100.0;
                            eprintln!(
                                "[pathsgd] {:.2}% progress: iteration: {}, eta: {}, delta_max: {}, number of updates: {}",
                                percent,
                                iter,
                                u64_to_f64(eta.load(Ordering::Relaxed)),
                                u64_to_f64(delta_max.load(Ordering::Relaxed)),
                                term_updates.load(Ordering::Relaxed)
                            );
                        }
                        if (iter as usize) < etas.len() {
                            eta.store(f64_to_u64(etas[iter as usize]), Ordering::Relaxed);
                        }
                        // reset to the threshold so genuine later maxima can
                        // still end the run
                        delta_max.store(f64_to_u64(params.delta), Ordering::Relaxed);
                    }
                    term_updates.store(0, Ordering::Relaxed);
                }
                thread::sleep(Duration::from_millis(1));
            }
        });

        let snapshot_thread = if params.snapshot {
            Some(scope.spawn(move || {
                let mut taken = 0u64;
                let mut snaps: Vec<Vec<f64>> = Vec::new();
                while work_todo.load(Ordering::Relaxed) {
                    let iter = iteration.load(Ordering::Relaxed);
                    if taken < iter && iter != params.iter_max {
                        // not a consistent snapshot; workers keep writing
                        snaps.push(collect_layout(x));
                        taken = iter;
                    }
                    thread::sleep(Duration::from_millis(1));
                }
                snaps
            }))
        } else {
            None
        };

        let mut workers = Vec::with_capacity(params.nthreads);
        for tid in 0..params.nthreads {
            workers.push(scope.spawn(move || {
                let mut rng = Xoshiro256Plus::seed_from_u64(clock_seed.wrapping_add(tid as u64));
                while work_todo.load(Ordering::Relaxed) {
                    match sampler.sample(&mut rng) {
                        Ok(Some(term)) => {
                            let delta_abs = apply_term_update(
                                x,
                                &term,
                                u64_to_f64(eta.load(Ordering::Relaxed)),
                            );
                            let mut seen = delta_max.load(Ordering::Relaxed);
                            while delta_abs > u64_to_f64(seen) {
                                match delta_max.compare_exchange_weak(
                                    seen,
                                    f64_to_u64(delta_abs),
                                    Ordering::Relaxed,
                                    Ordering::Relaxed,
                                ) {
                                    Ok(_) => break,
                                    Err(now) => seen = now,
                                }
                            }
                            term_updates.fetch_add(1, Ordering::Relaxed);
                        }
                        Ok(None) => {}
                        Err(err) => {
                            if let Ok(mut slot) = failure.lock() {
                                slot.get_or_insert(err);
                            }
                            work_todo.store(false, Ordering::Relaxed);
                            break;
                        }
                    }
                }
            }));
        }

        for worker in workers {
            let _ = worker.join();
        }
        if let Some(handle) = snapshot_thread {
            if let Ok(snaps) = handle.join() {
                snapshots = snaps;
            }
        }
        let _ = controller.join();
    });

    if let Ok(mut slot) = failure.lock() {
        if let Some(err) = slot.take() {
            return Err(err);
        }
    }

    Ok(SgdLayout {
        x: collect_layout(&x),
        snapshots,
    })
}

/// Single-threaded layout run seeded from `params.seed`. Sampling rules,
/// update math, and skip conditions match the concurrent driver exactly,
/// so two runs with the same seed produce bit-identical coordinates.
pub fn deterministic_path_linear_sgd(
    graph: &BidirectedGraph,
    path_index: &PathIndex,
    use_paths: &[usize],
    params: &PathSgdParams,
) -> Result<SgdLayout> {
    params.validate()?;
    let num_nodes = graph.node_count();
    if num_nodes == 0 {
        return Ok(SgdLayout::default());
    }
    let x = initialize_layout(graph);
    if !can_produce_terms(path_index, use_paths, params) {
        return Ok(SgdLayout {
            x: collect_layout(&x),
            snapshots: Vec::new(),
        });
    }
    let intervals = PathIntervals::build(path_index, use_paths);
    let sampler = TermSampler::new(graph, path_index, &intervals, params)?;
    let etas = path_linear_sgd_schedule(
        1.0 / params.eta_max,
        1.0,
        params.iter_max,
        params.iter_with_max_learning_rate,
        params.eps,
    );

    let mut rng = Xoshiro256Plus::seed_from_u64(fold_seed(params.seed.as_bytes()));
    let mut eta = etas[0];
    let mut delta_max = 0.0f64;
    let mut term_updates = 0u64;
    let mut snapshots: Vec<Vec<f64>> = Vec::new();

    for iteration in 0..params.iter_max {
        if params.snapshot && iteration + 1 < params.iter_max {
            snapshots.push(collect_layout(&x));
        }
        for _term_update in 0..params.min_term_updates {
            match sampler.sample(&mut rng)? {
                Some(term) => {
                    let delta_abs = apply_term_update(&x, &term, eta);
                    if delta_abs > delta_max {
                        delta_max = delta_abs;
                    }
                    term_updates += 1;
                }
                None => continue,
            }
        }
        if delta_max <= params.delta {
            if params.progress {
                eprintln!(
                    "[pathsgd] delta_max: {} <= delta: {}. Threshold reached, ending iterations.",
                    delta_max, params.delta
                );
            }
            break;
        }
        if params.progress {
            let percent = (iteration + 1) as f64 / params.iter_max as f64 * 100.0;
            eprintln!(
                "[pathsgd] {:.2}% progress: iteration: {}, eta: {}, delta_max: {}, number of updates: {}",
                percent,
                iteration + 1,
                eta,
                delta_max,
                term_updates
            );
        }
        if iteration + 1 < params.iter_max {
            eta = etas[(iteration + 1) as usize];
            delta_max = params.delta;
        }
        term_updates = 0;
    }

    Ok(SgdLayout {
        x: collect_layout(&x),
        snapshots,
    })
}
