//! Text-to-sign: sentence → phrase clips → one output video

use crate::backends::video::VideoBackend;
use crate::compositor::{CompositionReport, VideoCompositor};
use crate::config::CompositionConfig;
use crate::error::{Result, TranslateError};
use crate::phrases::{DatasetLayout, MatchSegment, PhraseLibrary, PhraseMatcher};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Result of a successful generation
#[derive(Debug, Clone, Serialize)]
pub struct GenerationReport {
    /// Decomposition used, in sentence order
    pub segments: Vec<MatchSegment>,
    pub composition: CompositionReport,
}

/// Indexes the dataset, decomposes the sentence and concatenates the clips
///
/// The phrase library is rebuilt on every call so edits to the dataset
/// directory are picked up without restarting.
#[derive(Debug)]
pub struct TextToSignPipeline {
    matcher: PhraseMatcher,
    layout: DatasetLayout,
    compositor: VideoCompositor,
}

impl TextToSignPipeline {
    /// Pipeline writing through the FFmpeg video backend
    ///
    /// # Errors
    /// - Invalid configuration
    /// - FFmpeg initialization failure
    #[cfg(feature = "video-support")]
    pub fn new(config: &CompositionConfig) -> Result<Self> {
        let video = Arc::new(crate::backends::video::FFmpegBackend::new()?);
        Self::with_video_backend(config, video)
    }

    /// # Errors
    /// - Invalid configuration
    pub fn with_video_backend(
        config: &CompositionConfig,
        video: Arc<dyn VideoBackend>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            matcher: PhraseMatcher::new(config.strategy),
            layout: config.layout,
            compositor: VideoCompositor::new(video, config),
        })
    }

    #[must_use]
    pub fn matcher(&self) -> &PhraseMatcher {
        &self.matcher
    }

    /// Decompose `sentence` against the clips in `dataset_dir` without writing video
    ///
    /// # Errors
    /// - Unreadable dataset directory
    /// - `NoPhraseMatch` when nothing in the sentence is covered
    pub fn plan(&self, sentence: &str, dataset_dir: &Path) -> Result<Vec<MatchSegment>> {
        let library = PhraseLibrary::build(dataset_dir, self.layout)?;
        let segments = self.matcher.match_sentence(sentence, &library)?;
        if segments.is_empty() {
            return Err(TranslateError::no_phrase_match(format!(
                "no known phrase in '{}'",
                sentence.trim()
            )));
        }
        Ok(segments)
    }

    /// Write the sign video for `sentence` to `output_path`
    ///
    /// # Errors
    /// - Any failure from [`TextToSignPipeline::plan`]; no output is written
    /// - `NoValidClips` when none of the matched clips can be opened
    /// - Encoder or output directory failures
    #[tracing::instrument(skip(self, dataset_dir, output_path), fields(output = %output_path.display()))]
    pub fn generate(
        &self,
        sentence: &str,
        dataset_dir: &Path,
        output_path: &Path,
    ) -> Result<GenerationReport> {
        let segments = self.plan(sentence, dataset_dir)?;
        log::info!(
            "Matched {} phrases: {}",
            segments.len(),
            segments
                .iter()
                .map(|s| s.phrase.as_str())
                .collect::<Vec<_>>()
                .join(" | ")
        );

        let clips: Vec<PathBuf> = segments.iter().map(|s| s.clip_path.clone()).collect();
        let composition = self.compositor.compose(&clips, output_path)?;
        Ok(GenerationReport {
            segments,
            composition,
        })
    }
}
