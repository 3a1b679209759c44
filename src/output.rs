use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

use crate::error::{Result, VidshrinkError};

/// Folder created under the working directory when no output root is given
pub const DEFAULT_OUTPUT_DIR: &str = "converted";

/// Marker placed between stem and suffix when the output replaces its input
const STAGING_TOKEN: &str = ".";

/// Where and how outputs are placed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputOptions {
    pub output_root: Option<PathBuf>,
    pub suffix: String,
    pub same_dir: bool,
    pub ignore_suffix: Option<String>,
}

impl OutputOptions {
    /// An empty suffix in the input's own folder means replacing the input
    pub fn overwriting(&self) -> bool {
        self.suffix.is_empty() && self.same_dir
    }
}

/// Resolved destination for one input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPlacement {
    pub path: PathBuf,
    /// `path` is a staging file to be renamed onto the input afterwards
    pub overwriting: bool,
}

#[derive(Debug, Clone)]
pub struct OutputResolver {
    input_root: PathBuf,
    default_root: PathBuf,
    options: OutputOptions,
}

impl OutputResolver {
    /// Default outputs go to `./converted`, fixed at construction.
    pub fn new(input_root: impl Into<PathBuf>, options: OutputOptions) -> Result<Self> {
        let default_root = std::env::current_dir()?.join(DEFAULT_OUTPUT_DIR);
        Ok(Self::with_default_root(input_root, default_root, options))
    }

    pub fn with_default_root(
        input_root: impl Into<PathBuf>,
        default_root: impl Into<PathBuf>,
        options: OutputOptions,
    ) -> Self {
        Self {
            input_root: input_root.into(),
            default_root: default_root.into(),
            options,
        }
    }

    pub fn default_root(&self) -> &Path {
        &self.default_root
    }

    pub fn options(&self) -> &OutputOptions {
        &self.options
    }

    /// Compute the destination of `file` and create its parent directory.
    pub fn resolve(&self, file: &Path) -> Result<OutputPlacement> {
        let rel = pathdiff::diff_paths(file, &self.input_root)
            .filter(|rel| !rel.components().any(|c| matches!(c, Component::ParentDir)))
            .ok_or_else(|| {
                VidshrinkError::Path(format!(
                    "{} is not inside {}",
                    file.display(),
                    self.input_root.display()
                ))
            })?;

        let stem = rel
            .file_stem()
            .and_then(OsStr::to_str)
            .ok_or_else(|| {
                VidshrinkError::Path(format!("{} has no usable file name", file.display()))
            })?;
        let ext = rel.extension().and_then(OsStr::to_str).unwrap_or("");
        let rel_parent = rel.parent().unwrap_or_else(|| Path::new(""));

        let overwriting = self.options.overwriting();

        let path = if self.options.same_dir {
            let token = if overwriting { STAGING_TOKEN } else { "" };
            self.input_root
                .join(rel_parent)
                .join(file_name(stem, token, &self.options.suffix, ext))
        } else if let Some(output_root) = &self.options.output_root {
            output_root.join(&rel)
        } else {
            self.default_root
                .join(rel_parent)
                .join(file_name(stem, "", &self.options.suffix, ext))
        };

        let same_file = path == file
            || matches!((path.canonicalize(), file.canonicalize()), (Ok(a), Ok(b)) if a == b);
        if same_file {
            return Err(VidshrinkError::Path(format!(
                "Output for {} would overwrite its input",
                file.display()
            )));
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        Ok(OutputPlacement { path, overwriting })
    }

    /// Recover the input stem from a resolved path
    #[cfg(test)]
    fn strip_placement_suffix(&self, placement: &OutputPlacement) -> Option<String> {
        let stem = placement.path.file_stem()?.to_str()?;

        if !self.options.same_dir && self.options.output_root.is_some() {
            return Some(stem.to_string());
        }

        let stem = stem.strip_suffix(self.options.suffix.as_str())?;
        if placement.overwriting {
            stem.strip_suffix(STAGING_TOKEN).map(str::to_string)
        } else {
            Some(stem.to_string())
        }
    }
}

fn file_name(stem: &str, token: &str, suffix: &str, ext: &str) -> String {
    if ext.is_empty() {
        format!("{}{}{}", stem, token, suffix)
    } else {
        format!("{}{}{}.{}", stem, token, suffix, ext)
    }
}
