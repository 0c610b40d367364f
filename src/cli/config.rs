//! Configuration assembly from CLI arguments

use crate::backends::video::VideoCodec;
use crate::cli::main_impl::{Cli, CliLayout, CompositionArgs};
use crate::config::{ClassifierConfig, CompositionConfig, TranslatorConfig};
use crate::phrases::{DatasetLayout, MatchStrategy, DEFAULT_MAX_WINDOW};
use crate::utils::ExecutionProviderManager;
use anyhow::{Context, Result};
use std::path::Path;

/// Merges the optional config file with command line overrides
///
/// Flags win over the file, and the file wins over built-in defaults.
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Config file (or defaults) with the global flags applied
    pub(crate) fn base(cli: &Cli) -> Result<TranslatorConfig> {
        let mut config = match &cli.config {
            Some(path) => TranslatorConfig::from_file(path)
                .with_context(|| format!("Failed to load config file {}", path.display()))?,
            None => TranslatorConfig::default(),
        };

        if let Some(provider) = &cli.execution_provider {
            let (backend_type, execution_provider) =
                ExecutionProviderManager::parse_provider_string(provider)
                    .context("Invalid execution provider format")?;
            config.classifier.backend_type = backend_type;
            config.classifier.execution_provider = execution_provider;
        }

        if let Some(threads) = cli.threads {
            config.classifier.intra_threads = threads;
            config.classifier.inter_threads = threads;
        }

        Ok(config)
    }

    pub(crate) fn classifier(
        cli: &Cli,
        bundle: Option<&Path>,
        top_k: Option<usize>,
    ) -> Result<ClassifierConfig> {
        let mut config = Self::base(cli)?.classifier;
        if let Some(bundle) = bundle {
            config.bundle_dir = bundle.to_path_buf();
        }
        if let Some(top_k) = top_k {
            config.top_k = top_k;
        }
        config.validate().context("Invalid classifier configuration")?;
        Ok(config)
    }

    pub(crate) fn composition(
        cli: &Cli,
        args: &CompositionArgs,
        codec: Option<&str>,
    ) -> Result<CompositionConfig> {
        let mut config = Self::base(cli)?.composition;
        if let Some(strategy) = &args.strategy {
            let window = args.max_window.unwrap_or(DEFAULT_MAX_WINDOW);
            config.strategy =
                MatchStrategy::parse(strategy, window).context("Invalid match strategy")?;
        } else if let (MatchStrategy::Greedy { max_window }, Some(window)) =
            (&mut config.strategy, args.max_window)
        {
            *max_window = window;
        }
        if let Some(layout) = args.layout {
            config.layout = layout.into();
        }
        if let Some(codec) = codec {
            config.encoding.codec = VideoCodec::parse(codec).context("Invalid video codec")?;
        }
        config.validate().context("Invalid composition configuration")?;
        Ok(config)
    }
}

impl From<CliLayout> for DatasetLayout {
    fn from(layout: CliLayout) -> Self {
        match layout {
            CliLayout::Flat => Self::Flat,
            CliLayout::Nested => Self::Nested,
            CliLayout::Auto => Self::Auto,
        }
    }
}
