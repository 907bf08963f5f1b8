use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use burn_ndarray::NdArray;
use clap::{Parser, ValueEnum};
use cordreg_registration::{
    CachePolicy, CommandToolbox, Contrast, NativeToolbox, Pipeline, PipelineConfig, PipelineOutputs, Reference,
    StepOverride, Toolbox,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Which implementation runs the image operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// Spinal Cord Toolbox programs found on the PATH.
    Command,
    /// In-process implementations (center-of-mass step algorithms only).
    Native,
}

#[derive(Parser, Debug)]
#[command(name = "cordreg-register")]
#[command(about = "Register an anatomical spinal cord image to the template")]
struct Cli {
    /// Anatomical image.
    #[arg(short = 'i')]
    anatomical: PathBuf,

    /// Spinal cord segmentation of the anatomical image.
    #[arg(short = 's')]
    segmentation: PathBuf,

    /// Two labels at the centre of the cord, value = vertebral level.
    #[arg(short = 'l')]
    labels: PathBuf,

    /// Output folder.
    #[arg(short = 'o', long = "ofolder", default_value = ".")]
    output: PathBuf,

    /// Template folder. Defaults to $SCT_DIR/data/PAM50.
    #[arg(short = 't', long = "template")]
    template: Option<PathBuf>,

    /// Contrast of the anatomical image (t1, t2, t2s).
    #[arg(short = 'c', default_value = "t2")]
    contrast: Contrast,

    /// Space the registration is anchored in (template, subject).
    #[arg(long = "ref", default_value = "template")]
    reference: Reference,

    /// Registration steps, e.g. "step=1,type=seg,algo=slicereg:step=2,type=im,algo=syn".
    #[arg(long = "param")]
    param: Option<String>,

    /// Parameters forwarded to the straightener.
    #[arg(long = "param-straighten")]
    param_straighten: Option<String>,

    /// Remove temporary files (0 keeps them).
    #[arg(short = 'r', default_value_t = 1, value_parser = clap::value_parser!(u8).range(0..=1))]
    remove_temp: u8,

    /// Verbosity: 0 = warnings, 1 = progress, 2 = debug.
    #[arg(short = 'v', default_value_t = 1, value_parser = clap::value_parser!(u8).range(0..=2))]
    verbose: u8,

    #[arg(long, value_enum, default_value_t = Backend::Command)]
    backend: Backend,

    /// Keep straightening results in this folder, keyed by input content.
    #[arg(long = "straightening-cache", conflicts_with = "no_reuse")]
    straightening_cache: Option<PathBuf>,

    /// Always straighten, never reuse earlier results.
    #[arg(long = "no-reuse")]
    no_reuse: bool,
}

impl Cli {
    fn template_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.template {
            return Ok(dir.clone());
        }
        let sct_dir = std::env::var_os("SCT_DIR").context("no template folder given (-t) and SCT_DIR is not set")?;
        Ok(PathBuf::from(sct_dir).join("data").join("PAM50"))
    }

    fn config(&self) -> Result<PipelineConfig> {
        let mut config = PipelineConfig::new(&self.anatomical, &self.segmentation, &self.labels, self.template_dir()?)
            .with_contrast(self.contrast)
            .with_reference(self.reference)
            .keep_temporary(self.remove_temp == 0)
            .with_verbosity(self.verbose)
            .with_output_dir(&self.output);
        if let Some(param) = &self.param {
            config = config.with_step_overrides(StepOverride::parse_list(param)?);
        }
        if let Some(params) = &self.param_straighten {
            config = config.with_straighten_params(params);
        }
        if self.no_reuse {
            config = config.with_cache(CachePolicy::Disabled);
        } else if let Some(dir) = &self.straightening_cache {
            config = config.with_cache(CachePolicy::Fingerprint(dir.clone()));
        }
        Ok(config)
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

fn run_with(config: &PipelineConfig, toolbox: &dyn Toolbox) -> Result<PipelineOutputs> {
    Ok(Pipeline::new(config, toolbox).run()?)
}

fn run(cli: &Cli) -> Result<()> {
    let config = cli.config()?;
    let outputs = match cli.backend {
        Backend::Command => run_with(&config, &CommandToolbox::new())?,
        Backend::Native => run_with(&config, &NativeToolbox::<NdArray<f32>>::default())?,
    };

    info!("Results:");
    for file in outputs.files() {
        info!("  {}", file.display());
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("ERROR: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
