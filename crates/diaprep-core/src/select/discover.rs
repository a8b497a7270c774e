use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{DiaError, Result};

/// Shell-style wildcard match supporting `*` and `?`.
pub fn matches_pattern(name: &str, pattern: &str) -> bool {
    let name: Vec<char> = name.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();

    let (mut n, mut p) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;
    while n < name.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, n));
                p += 1;
            }
            Some(&c) if c == '?' || c == name[n] => {
                n += 1;
                p += 1;
            }
            _ => match backtrack {
                Some((star_p, star_n)) => {
                    p = star_p + 1;
                    n = star_n + 1;
                    backtrack = Some((star_p, star_n + 1));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|&c| c == '*')
}

/// Regular files directly inside `dir` whose name matches `pattern`, sorted by name.
///
/// A missing directory yields an empty list.
pub fn list_matching(dir: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| {
            DiaError::Io(
                e.into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("directory walk failed")),
            )
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if matches_pattern(&name, pattern) {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Discover the input images of a run. An empty result is an error.
pub fn discover_input_images(dir: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let images = list_matching(dir, pattern)?;
    if images.is_empty() {
        return Err(DiaError::NoInputImages {
            dir: dir.to_path_buf(),
            pattern: pattern.to_string(),
        });
    }
    Ok(images)
}
