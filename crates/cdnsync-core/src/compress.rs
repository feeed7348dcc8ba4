//! Pre-compression of published files into `.br` and `.gz` siblings.

use std::{
    collections::{BTreeMap, BTreeSet},
    ffi::OsString,
    fs,
    io::{self, Read as _, Write as _},
    path::{Path, PathBuf},
};

use brotli::CompressorWriter as BrotliEncoder;
use cdnsync_kv::strip_compression_suffix;
use cdnsync_utils::{
    fs::safe_remove,
    hash::{calculate_sri, is_hashable},
};
use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use rayon::{
    iter::{IntoParallelRefIterator as _, ParallelIterator as _},
    ThreadPoolBuilder,
};
use tracing::{debug, info, warn};

use crate::{
    error::{CoreError, CoreResult},
    sandbox::relative_files,
};

const BROTLI_QUALITY: u32 = 11;
const BROTLI_BUFFER_SIZE: usize = 4096;
const BROTLI_LG_WINDOW_SIZE: u32 = 22;

/// Extensions published as-is: fonts, images and files that are already
/// compressed.
pub const DO_NOT_COMPRESS: [&str; 12] = [
    "woff", "woff2", "eot", "ttf", "otf", "png", "jpg", "jpeg", "gif", "webp", "gz", "br",
];

pub fn should_compress(name: &str) -> bool {
    let ext = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext {
        Some(ext) => !DO_NOT_COMPRESS.contains(&ext.as_str()),
        None => true,
    }
}

pub fn brotli_bytes(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut output = Vec::new();
    {
        let mut encoder = BrotliEncoder::new(
            &mut output,
            BROTLI_BUFFER_SIZE,
            BROTLI_QUALITY,
            BROTLI_LG_WINDOW_SIZE,
        );
        encoder.write_all(data)?;
        encoder.flush()?;
    }
    Ok(output)
}

pub fn gzip_bytes(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(data)?;
    encoder.finish()
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

#[derive(Debug)]
enum Outcome {
    Compressed,
    AlreadyCompressed,
    Skipped,
    Failed(String),
}

/// Result of compressing one version's output directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompressionSummary {
    /// Logical names now published as `.br` + `.gz` pairs.
    pub compressed: Vec<String>,
    /// Logical names published uncompressed.
    pub skipped: Vec<String>,
    /// Files left uncompressed after an error, with the reason.
    pub failed: Vec<(String, String)>,
    /// Integrity hash of every hashable logical file, keyed by logical name.
    pub sri: BTreeMap<String, String>,
}

/// Compresses files on a bounded worker pool.
pub struct Compressor {
    workers: usize,
}

impl Compressor {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    /// Replaces every compressible file below `dir` with `.br` and `.gz`
    /// siblings and records integrity hashes of hashable files.
    ///
    /// An original is only removed once both siblings exist. Files whose
    /// siblings are already present are not compressed again, so a rerun
    /// over the same directory changes nothing.
    pub fn compress_dir(&self, dir: &Path) -> CoreResult<CompressionSummary> {
        let jobs = logical_files(&relative_files(dir)?);
        let pool = ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .build()
            .map_err(|err| CoreError::WorkerPool(err.to_string()))?;

        let results: Vec<(String, Outcome, Option<String>)> = pool.install(|| {
            jobs.par_iter()
                .map(|name| {
                    let (outcome, sri) = compress_one(dir, name);
                    (name.clone(), outcome, sri)
                })
                .collect()
        });

        let mut summary = CompressionSummary::default();
        let mut reused = 0;
        for (name, outcome, sri) in results {
            if let Some(sri) = sri {
                summary.sri.insert(name.clone(), sri);
            }
            match outcome {
                Outcome::Compressed => summary.compressed.push(name),
                Outcome::AlreadyCompressed => {
                    reused += 1;
                    summary.compressed.push(name);
                }
                Outcome::Skipped => summary.skipped.push(name),
                Outcome::Failed(reason) => {
                    warn!("failed to compress {name}: {reason}");
                    summary.failed.push((name, reason));
                }
            }
        }

        info!(
            "compressed {} file(s) ({} already done), {} skipped, {} failed",
            summary.compressed.len(),
            reused,
            summary.skipped.len(),
            summary.failed.len()
        );
        Ok(summary)
    }
}

/// Collapses `.br`/`.gz` siblings onto their logical name. A suffixed file
/// counts as a sibling only when its original or its counterpart exists.
fn logical_files(files: &[String]) -> Vec<String> {
    let present: BTreeSet<&str> = files.iter().map(String::as_str).collect();
    let mut logical = BTreeSet::new();

    for file in files {
        let stripped = strip_compression_suffix(file);
        if stripped == file.as_str() {
            logical.insert(file.clone());
            continue;
        }
        let br = format!("{stripped}.br");
        let gz = format!("{stripped}.gz");
        if present.contains(stripped)
            || (present.contains(br.as_str()) && present.contains(gz.as_str()))
        {
            logical.insert(stripped.to_string());
        } else {
            logical.insert(file.clone());
        }
    }

    logical.into_iter().collect()
}

fn compress_one(dir: &Path, name: &str) -> (Outcome, Option<String>) {
    let path = dir.join(name);
    let br = sibling(&path, ".br");
    let gz = sibling(&path, ".gz");
    let hashable = is_hashable(name);

    if !should_compress(name) {
        let sri = hashable
            .then(|| fs::read(&path).ok().map(|data| calculate_sri(&data)))
            .flatten();
        return (Outcome::Skipped, sri);
    }

    if br.is_file() && gz.is_file() {
        let sri = if hashable {
            read_original(&path, &gz).ok().map(|data| calculate_sri(&data))
        } else {
            None
        };
        if let Err(err) = safe_remove(&path) {
            return (Outcome::Failed(err.to_string()), sri);
        }
        debug!("{name} already compressed");
        return (Outcome::AlreadyCompressed, sri);
    }

    let data = match fs::read(&path) {
        Ok(data) => data,
        Err(err) => return (Outcome::Failed(err.to_string()), None),
    };
    let sri = hashable.then(|| calculate_sri(&data));

    let written = brotli_bytes(&data)
        .and_then(|bytes| fs::write(&br, bytes))
        .and_then(|_| gzip_bytes(&data))
        .and_then(|bytes| fs::write(&gz, bytes));
    if let Err(err) = written {
        let _ = safe_remove(&br);
        let _ = safe_remove(&gz);
        return (Outcome::Failed(err.to_string()), sri);
    }

    if let Err(err) = safe_remove(&path) {
        let _ = safe_remove(&br);
        let _ = safe_remove(&gz);
        return (Outcome::Failed(err.to_string()), sri);
    }

    (Outcome::Compressed, sri)
}

/// Uncompressed content, from the original if still present or else from the
/// gzip sibling.
fn read_original(path: &Path, gz: &Path) -> io::Result<Vec<u8>> {
    if path.is_file() {
        return fs::read(path);
    }
    let mut data = Vec::new();
    GzDecoder::new(fs::File::open(gz)?).read_to_end(&mut data)?;
    Ok(data)
}
