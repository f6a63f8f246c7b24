//! Loading the request corpus and splitting it into per-worker slices.

use crate::error::LoadError;
use crate::model::{Mode, RequestTemplate};
use std::ops::Range;
use std::path::Path;

pub const HEADER_FILE: &str = "header.txt";
pub const BODIES_FILE: &str = "bodies.txt";
pub const FOOTER_FILE: &str = "footer.txt";

/// The request template plus the ordered body fragments, read once at startup.
#[derive(Clone, Debug, Default)]
pub struct Corpus {
    pub template: RequestTemplate,
    pub bodies: Vec<String>,
}

fn read(path: &Path) -> Result<String, LoadError> {
    std::fs::read_to_string(path).map_err(|source| LoadError::CorpusIo {
        path: path.to_path_buf(),
        source,
    })
}

impl Corpus {
    pub fn new(template: RequestTemplate, bodies: Vec<String>) -> Self {
        Self { template, bodies }
    }

    /// Reads the header and footer whole and splits the bodies file into
    /// lines. Each fragment keeps its line terminator.
    ///
    /// All three files must be UTF-8. Anything else (Latin-1 MARC exports,
    /// for instance) fails with [`LoadError::CorpusIo`] of kind
    /// `InvalidData`; convert such files before loading them.
    pub fn load(header: &Path, bodies: &Path, footer: &Path) -> Result<Self, LoadError> {
        let template = RequestTemplate::new(read(header)?, read(footer)?);
        let bodies = read(bodies)?
            .split_inclusive('\n')
            .map(str::to_string)
            .collect();
        Ok(Self { template, bodies })
    }

    /// Loads `header.txt`, `bodies.txt` and `footer.txt` from `dir`.
    pub fn from_dir(dir: &Path) -> Result<Self, LoadError> {
        Self::load(
            &dir.join(HEADER_FILE),
            &dir.join(BODIES_FILE),
            &dir.join(FOOTER_FILE),
        )
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    /// Body fragments for `range`, as produced by [`partition`].
    pub fn slice(&self, range: Range<usize>) -> &[String] {
        &self.bodies[range]
    }
}

/// Splits `len` items into `workers` contiguous index ranges of
/// `len / workers` items each.
///
/// In finite mode every range also loses its last index. The `len % workers`
/// tail is never assigned in either mode. Ranges are clamped so they stay
/// empty rather than wrapping when the slice size is zero.
pub fn partition(len: usize, workers: usize, mode: Mode) -> Vec<Range<usize>> {
    if workers == 0 {
        return Vec::new();
    }
    let size = len / workers;
    (0..workers)
        .map(|t| {
            let start = t * size;
            let end = match mode {
                Mode::Finite => ((t + 1) * size).saturating_sub(1).max(start),
                Mode::Infinite => (t + 1) * size,
            };
            start..end
        })
        .collect()
}
