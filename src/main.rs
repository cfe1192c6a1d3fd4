//! Command-line driver: parses the options, loads the dataset, picks the
//! index width, spins up the requested ranks, and prints the results from
//! rank 0.

use anyhow::Context;
use blanket::comm::{channel_group, Communicator, SoloComm};
use blanket::counter::CtCounter;
use blanket::data::DiscreteData;
use blanket::discovery::{Algorithm, Discovery};
use blanket::network::Network;
use blanket::reader::{self, Layout, TabularInput};
use blanket::{Error, VariableId};
use std::env;
use std::fs::File;
use std::process::ExitCode;
use std::str::FromStr;
use std::thread;
use tracing_subscriber::EnvFilter;

struct Options {
    algo: String,
    counter: String,
    file: String,
    n: usize,
    m: usize,
    separator: u8,
    col_obs: bool,
    var_names: bool,
    obs_indices: bool,
    target: String,
    discover_mb: bool,
    alpha: f64,
    max_conditioning: usize,
    learn_network: bool,
    output_file: String,
    direct_edges: bool,
    imbalance_threshold: f64,
    force_parallel: bool,
    ranks: usize,
    log_level: String,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            algo: "gs".to_owned(),
            counter: "ct".to_owned(),
            file: String::new(),
            n: 0,
            m: 0,
            separator: b'\t',
            col_obs: false,
            var_names: false,
            obs_indices: false,
            target: String::new(),
            discover_mb: true,
            alpha: 0.05,
            max_conditioning: usize::MAX,
            learn_network: false,
            output_file: String::new(),
            direct_edges: false,
            imbalance_threshold: 2.0,
            force_parallel: false,
            ranks: 1,
            log_level: "warn".to_owned(),
        }
    }
}

fn need(
    name: &str,
    inline: Option<String>,
    args: &mut impl Iterator<Item = String>,
) -> Result<String, Error> {
    inline
        .or_else(|| args.next())
        .ok_or_else(|| Error::Options(format!("option {} needs a value", name)))
}

fn numeric<T: FromStr>(name: &str, text: &str) -> Result<T, Error> {
    text.parse()
        .map_err(|_| Error::Options(format!("option {} got an unusable value {:?}", name, text)))
}

fn flag(name: &str, inline: Option<String>) -> Result<bool, Error> {
    match inline.as_deref() {
        None | Some("true") | Some("1") => Ok(true),
        Some("false") | Some("0") => Ok(false),
        Some(other) => Err(Error::Options(format!(
            "option {} expects true or false, got {:?}",
            name, other
        ))),
    }
}

fn separator(text: &str) -> Result<u8, Error> {
    match text {
        "\\t" | "tab" => Ok(b'\t'),
        _ => text
            .bytes()
            .next()
            .ok_or_else(|| Error::Options("option --separator needs a character".to_owned())),
    }
}

impl Options {
    fn parse(mut args: impl Iterator<Item = String>) -> Result<Options, Error> {
        let mut options = Options::default();
        while let Some(arg) = args.next() {
            let (name, inline) = match arg.split_once('=') {
                Some((name, value)) => (name.to_owned(), Some(value.to_owned())),
                None => (arg, None),
            };
            match name.as_str() {
                "--algo" => options.algo = need(&name, inline, &mut args)?,
                "--counter" => options.counter = need(&name, inline, &mut args)?,
                "--file" => options.file = need(&name, inline, &mut args)?,
                "--n" => options.n = numeric(&name, &need(&name, inline, &mut args)?)?,
                "--m" => options.m = numeric(&name, &need(&name, inline, &mut args)?)?,
                "--separator" => options.separator = separator(&need(&name, inline, &mut args)?)?,
                "--col-obs" => options.col_obs = flag(&name, inline)?,
                "--var-names" => options.var_names = flag(&name, inline)?,
                "--obs-indices" => options.obs_indices = flag(&name, inline)?,
                "--target" => options.target = need(&name, inline, &mut args)?,
                "--discover-mb" => options.discover_mb = flag(&name, inline)?,
                "--alpha" => options.alpha = numeric(&name, &need(&name, inline, &mut args)?)?,
                "--max-conditioning" => {
                    options.max_conditioning = numeric(&name, &need(&name, inline, &mut args)?)?
                }
                "--learn-network" => options.learn_network = flag(&name, inline)?,
                "--output-file" => options.output_file = need(&name, inline, &mut args)?,
                "--direct-edges" => options.direct_edges = flag(&name, inline)?,
                "--imbalance-threshold" => {
                    options.imbalance_threshold = numeric(&name, &need(&name, inline, &mut args)?)?
                }
                "--force-parallel" => options.force_parallel = flag(&name, inline)?,
                "--ranks" => options.ranks = numeric(&name, &need(&name, inline, &mut args)?)?,
                "--log-level" => options.log_level = need(&name, inline, &mut args)?,
                _ => {
                    return Err(Error::Options(format!("unrecognised option {:?}", name)));
                }
            }
        }
        if options.file.is_empty() {
            return Err(Error::Options("option --file is required".to_owned()));
        }
        if options.n == 0 || options.m == 0 {
            return Err(Error::Options(
                "options --n and --m must both be positive".to_owned(),
            ));
        }
        if !(0.0..1.0).contains(&options.alpha) || options.alpha <= 0.0 {
            return Err(Error::Options(
                "option --alpha must lie strictly between 0 and 1".to_owned(),
            ));
        }
        Ok(options)
    }
}

/// Everything rank 0 has to show the user.
struct RankOutput<V: VariableId> {
    neighborhood: Option<Vec<String>>,
    network: Option<Network<V>>,
}

fn execute<V: VariableId, C: Communicator>(
    data: &DiscreteData<'_>,
    comm: &C,
    algo: Algorithm,
    max_conditioning: usize,
    options: &Options,
) -> anyhow::Result<RankOutput<V>> {
    let discovery = Discovery::<V, C>::new(data, comm, algo, max_conditioning);

    let neighborhood = if options.target.is_empty() {
        None
    } else {
        let target: V = data
            .var_index(&options.target)
            .ok_or_else(|| Error::TargetNotFound(options.target.clone()))?;
        let vars = if options.discover_mb {
            discovery.mb(target)
        } else {
            discovery.pc(target)
        };
        Some(data.var_names(&vars))
    };

    let network = if options.learn_network || !options.output_file.is_empty() {
        Some(discovery.network(options.direct_edges, options.imbalance_threshold))
    } else {
        None
    };

    Ok(RankOutput {
        neighborhood,
        network,
    })
}

fn emit<V: VariableId>(out: RankOutput<V>, options: &Options) -> anyhow::Result<()> {
    if let Some(vars) = out.neighborhood {
        let mut line = String::new();
        for name in &vars {
            line.push_str(name);
            line.push(',');
        }
        println!("{}", line);
    }
    if let Some(network) = out.network {
        if !options.output_file.is_empty() {
            let mut file = File::create(&options.output_file)
                .with_context(|| format!("creating {:?}", options.output_file))?;
            network.write_graphviz(&mut file)?;
        }
    }
    Ok(())
}

fn run_width<V: VariableId + Send>(
    algo: Algorithm,
    input: TabularInput,
    options: &Options,
) -> anyhow::Result<()> {
    let counter = CtCounter::create(options.n, options.m, input.data)?;
    let data = DiscreteData::with_names(&counter, input.names.iter(), options.alpha)?;
    let max_conditioning = options.max_conditioning.min(options.n);
    let ranks = options.ranks.max(1);

    if ranks == 1 && !options.force_parallel {
        let out = execute::<V, _>(&data, &SoloComm, algo, max_conditioning, options)?;
        return emit(out, options);
    }

    // Every rank runs the same code over its own fork of the oracle; they
    // meet inside the collectives. Rank 0's results are the job's results.
    let outputs = thread::scope(|scope| {
        let handles: Vec<_> = channel_group(ranks)
            .into_iter()
            .map(|comm| {
                let data = data.fork();
                scope.spawn(move || -> anyhow::Result<Option<RankOutput<V>>> {
                    let out = execute::<V, _>(&data, &comm, algo, max_conditioning, options)?;
                    Ok(comm.is_first().then_some(out))
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("rank thread panicked"))
            .collect::<anyhow::Result<Vec<_>>>()
    })?;

    let first = outputs
        .into_iter()
        .flatten()
        .next()
        .expect("rank 0 produced no output");
    emit(first, options)
}

fn run(options: &Options) -> anyhow::Result<()> {
    let algo: Algorithm = options.algo.parse()?;
    if options.counter != "ct" {
        return Err(Error::UnknownCounter("ct").into());
    }

    if (options.m as f64) >= (u32::MAX as f64).sqrt() {
        // Pairwise products of observation counts have to fit 32 bits.
        eprintln!("warning: the given number of observations may be too big for 32-bit counts");
        eprintln!("         overflow can silently corrupt the statistics");
    }

    let layout = Layout {
        n: options.n,
        m: options.m,
        separator: options.separator,
        col_obs: options.col_obs,
        var_names: options.var_names,
        obs_indices: options.obs_indices,
    };
    let input = reader::load_path(&options.file, &layout)
        .with_context(|| format!("reading {:?}", options.file))?;

    if options.n <= 256 {
        run_width::<u8>(algo, input, options)
    } else if options.n <= 65536 {
        run_width::<u16>(algo, input, options)
    } else {
        Err(Error::UnsupportedVarCount(options.n).into())
    }
}

fn main() -> ExitCode {
    let options = match Options::parse(env::args().skip(1)) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::from(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&options.log_level).unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(&options) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("encountered an error during execution:");
            eprintln!("{:#}", e);
            eprintln!("aborting");
            ExitCode::from(1)
        }
    }
}
