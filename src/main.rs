use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use patchgen::config::{self, PatchgenConfig};
use patchgen::localize::{FailureTrace, Localizer, SuspiciousLocation};
use patchgen::oracle::AcceptAll;
use patchgen::project::SourceTree;
use patchgen::schema::TrainingExample;
use patchgen::search::{corpus, GenerationResult, SearchSpace};
use patchgen::site::Site;
use patchgen::templates::TemplateBundle;
use patchgen::transform::{CodeTransform, TransformAbstractor};
use patchgen::tree::{render_fragment, Fragment};
use patchgen::util::display_path;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod cli;

use cli::{
    Command, GenerateArgs, InitArgs, InspectArgs, LearnArgs, LocalizeArgs, RootArgs, SourceArgs,
};

const LOG_ENV: &str = "PATCHGEN_LOG";

fn main() -> Result<()> {
    init_tracing();
    let args = RootArgs::parse();
    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => config::default_config_path()?,
    };

    let load = || config::load_or_default(&config_path);

    match args.command {
        Command::Init(init) => cmd_init(&config_path, init),
        Command::Learn(learn) => cmd_learn(&load()?, learn),
        Command::Inspect(inspect) => cmd_inspect(&load()?, inspect),
        Command::Generate(generate) => cmd_generate(&load()?, generate),
        Command::Localize(localize) => cmd_localize(&load()?, localize),
    }
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn cmd_init(config_path: &Path, args: InitArgs) -> Result<()> {
    if config_path.exists() && !args.force {
        bail!(
            "{} already exists (use --force to overwrite)",
            config_path.display()
        );
    }
    config::write_config(config_path, &config::default_config())?;
    println!("wrote {}", config_path.display());
    Ok(())
}

fn cmd_learn(config: &PatchgenConfig, args: LearnArgs) -> Result<()> {
    let pairs: Vec<TrainingExample> = read_json(&args.pairs)?;
    if pairs.is_empty() {
        bail!("{} holds no training pairs", args.pairs.display());
    }
    let provenance = args.provenance.clone().unwrap_or_else(|| {
        args.pairs
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "learned".to_string())
    });

    let mut abstractor = TransformAbstractor::new(config.generator_limits());
    let count = pairs.len();
    for pair in pairs {
        abstractor.add_mapping(pair.site, pair.after);
    }
    if !abstractor.generalize() {
        bail!("the {count} training pairs do not generalize into one transform");
    }
    let transforms: Vec<CodeTransform> = abstractor.generators().collect();
    let names: Vec<String> = (0..transforms.len())
        .map(|idx| format!("{provenance}#{idx}"))
        .collect();
    let written = corpus::write_corpus(
        &args.out,
        names.iter().map(String::as_str).zip(transforms.iter()),
    )?;
    tracing::info!(pairs = count, transforms = written, "learned corpus");
    println!(
        "wrote {written} transform(s) to {}",
        display_path(&args.out, std::env::current_dir().ok().as_deref())
    );
    Ok(())
}

fn load_space(config: &PatchgenConfig, source: &SourceArgs) -> Result<SearchSpace> {
    let options = config.search_options();
    match (&source.corpus, &source.bundle) {
        (Some(dir), None) => Ok(SearchSpace::from_corpus_dir(dir, options)?),
        (None, Some(name)) => {
            let bundle: TemplateBundle = name.parse()?;
            let transforms = bundle.transforms_with(config.generator_limits())?;
            Ok(SearchSpace::new(transforms, options))
        }
        _ => Err(anyhow!("pass exactly one of --corpus or --bundle")),
    }
}

#[derive(Debug, Serialize)]
struct TransformSummary {
    provenance: String,
    shape: String,
    slots: usize,
    generators: Vec<String>,
    rule: String,
}

fn cmd_inspect(config: &PatchgenConfig, args: InspectArgs) -> Result<()> {
    let space = load_space(config, &args.source)?;
    let summaries: Vec<TransformSummary> = space
        .entries()
        .iter()
        .map(|entry| {
            let schema = entry.transform.schema();
            TransformSummary {
                provenance: entry.provenance.clone(),
                shape: format!("{:?}", schema.shape),
                slots: schema.slots.len(),
                generators: entry
                    .transform
                    .generators()
                    .values()
                    .map(|generator| generator.kind().to_string())
                    .collect(),
                rule: entry.transform.describe(),
            }
        })
        .collect();
    if args.json {
        print_json(&summaries)?;
        return Ok(());
    }
    println!("{} transform(s)", summaries.len());
    for summary in &summaries {
        println!("{}  [{}]", summary.provenance, summary.shape);
        println!("    {}", summary.rule);
    }
    Ok(())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SiteInput {
    Many(Vec<Site>),
    One(Box<Site>),
}

#[derive(Debug, Serialize)]
struct CandidateReport {
    site: usize,
    provenance: String,
    rendered: String,
    candidate: Fragment,
}

#[derive(Debug, Serialize)]
struct GenerateReport {
    candidates: Vec<CandidateReport>,
    failed_check_cnt: u64,
}

fn cmd_generate(config: &PatchgenConfig, args: GenerateArgs) -> Result<()> {
    let space = load_space(config, &args.source)?;
    let sites = match read_json::<SiteInput>(&args.site)? {
        SiteInput::Many(sites) => sites,
        SiteInput::One(site) => vec![*site],
    };
    let batches: Vec<Vec<GenerationResult>> = if sites.len() == 1 {
        vec![space.apply_to(&sites[0], &AcceptAll)]
    } else {
        space.apply_to_sites(&sites, &AcceptAll)?
    };
    let candidates: Vec<CandidateReport> = batches
        .into_iter()
        .enumerate()
        .flat_map(|(site, batch)| {
            batch.into_iter().map(move |result| CandidateReport {
                site,
                provenance: result.provenance,
                rendered: render_fragment(&result.candidate),
                candidate: result.candidate,
            })
        })
        .collect();
    let report = GenerateReport {
        candidates,
        failed_check_cnt: space.failed_check_cnt(),
    };
    if args.json {
        print_json(&report)?;
        return Ok(());
    }
    for candidate in &report.candidates {
        println!(
            "site {}  {:<32} {}",
            candidate.site, candidate.provenance, candidate.rendered
        );
    }
    println!("{} candidate(s)", report.candidates.len());
    Ok(())
}

fn cmd_localize(config: &PatchgenConfig, args: LocalizeArgs) -> Result<()> {
    let mut failures: Vec<FailureTrace> = match &args.failures {
        Some(path) => read_json(path)?,
        None => Vec::new(),
    };
    let mut project = SourceTree::new(&args.project);
    if !config.source_roots.is_empty() {
        project =
            project.with_source_roots(config.source_roots.iter().map(PathBuf::from).collect());
    }
    let localizer = Localizer::new(config.localizer(), &project)?;

    let mut ranked = if args.rerun.is_empty() {
        localizer.rank_failures(&failures)?
    } else {
        let scratch = config.scratch_builder(&args.project)?;
        let runner = config.test_runner()?;
        for test in &args.rerun {
            if !failures.iter().any(|failure| &failure.test == test) {
                failures.push(FailureTrace {
                    test: test.clone(),
                    text: String::new(),
                });
            }
        }
        failures.retain(|failure| args.rerun.contains(&failure.test));
        localizer.localize(&failures, &runner, &scratch)?
    };
    if let Some(limit) = args.limit {
        ranked.truncate(limit);
    }

    if args.json {
        print_json(&ranked)?;
        return Ok(());
    }
    print_locations(&ranked, &args.project);
    Ok(())
}

fn print_locations(ranked: &[SuspiciousLocation], project: &Path) {
    for location in ranked {
        println!(
            "{:>8.4}  {}:{}",
            location.score,
            display_path(&location.path, Some(project)),
            location.line
        );
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("serialize output")?;
    println!("{text}");
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parse {}", path.display()))
}
