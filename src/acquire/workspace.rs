use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Suffixes the engine leaves on incomplete or intermediate files
const PARTIAL_SUFFIXES: &[&str] = &[".part", ".ytdl", ".tmp", ".temp"];

/// A finished file the engine left in a workspace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFile {
    pub path: PathBuf,
    pub size: u64,
}

impl OutputFile {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Whether a workspace entry is engine output rather than bookkeeping or a partial
pub fn is_output_name(name: &str) -> bool {
    if name.is_empty() || name.starts_with('.') {
        return false;
    }
    let lower = name.to_ascii_lowercase();
    if PARTIAL_SUFFIXES.iter().any(|s| lower.ends_with(s)) {
        return false;
    }
    // fragment files, e.g. `clip.mp4.part-Frag12`
    !lower.contains(".part-frag")
}

/// Finished output files in `workspace`, sorted by name
pub async fn collect_outputs(workspace: &Path) -> io::Result<Vec<OutputFile>> {
    let mut entries = fs::read_dir(workspace).await?;
    let mut outputs = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if !is_output_name(&name) {
            continue;
        }
        let meta = entry.metadata().await?;
        if !meta.is_file() {
            continue;
        }
        if meta.len() == 0 {
            debug!(file = %name, "Skipping empty engine output");
            continue;
        }
        outputs.push(OutputFile {
            path: entry.path(),
            size: meta.len(),
        });
    }

    outputs.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(outputs)
}

/// One downloaded item: its media file plus same-stem sidecars
/// (`Ep01 [x].mp4` with `Ep01 [x].en.vtt` and `Ep01 [x].info.json`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputItem {
    /// Largest file of the group
    pub primary: OutputFile,
    pub sidecars: Vec<OutputFile>,
}

impl OutputItem {
    pub fn files(&self) -> impl Iterator<Item = &OutputFile> {
        std::iter::once(&self.primary).chain(self.sidecars.iter())
    }
}

fn stem_of(name: &str) -> &str {
    name.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(name)
}

/// Group outputs into items, ordered by item name.
///
/// A file belongs to the item with the shortest stem that prefixes its name up to a
/// dot, so every sidecar lands next to its media file.
pub fn group_items(outputs: Vec<OutputFile>) -> Vec<OutputItem> {
    let names: Vec<String> = outputs.iter().map(OutputFile::file_name).collect();
    let stems: Vec<&str> = names.iter().map(|n| stem_of(n)).collect();

    let mut groups: BTreeMap<String, Vec<OutputFile>> = BTreeMap::new();
    for (output, name) in outputs.iter().zip(&names) {
        let key = stems
            .iter()
            .filter(|stem| {
                name.as_str() == **stem
                    || (name.starts_with(**stem) && name[stem.len()..].starts_with('.'))
            })
            .min_by_key(|stem| stem.len())
            .copied()
            .unwrap_or(name.as_str());
        groups.entry(key.to_string()).or_default().push(output.clone());
    }

    groups
        .into_values()
        .filter_map(|mut files| {
            let primary = files
                .iter()
                .enumerate()
                .max_by(|(ia, a), (ib, b)| a.size.cmp(&b.size).then(ib.cmp(ia)))
                .map(|(i, _)| i)?;
            let primary = files.remove(primary);
            Some(OutputItem {
                primary,
                sidecars: files,
            })
        })
        .collect()
}

/// Final name for `output`: the requested stem (keeping the output's extension when
/// the request has none) or the engine's own name, sanitized either way
pub fn final_name(output: &OutputFile, requested: Option<&str>) -> String {
    let name = match requested {
        Some(requested) if Path::new(requested).extension().is_some() => requested.to_string(),
        Some(requested) => match output.path.extension() {
            Some(ext) => format!("{}.{}", requested, ext.to_string_lossy()),
            None => requested.to_string(),
        },
        None => output.file_name(),
    };
    crate::sanitize::sanitize(&name)
}
