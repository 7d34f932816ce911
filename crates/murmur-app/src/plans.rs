//! Saves the output of finished plan turns as markdown files.

use std::path::{Path, PathBuf};

/// Folder that receives one `<name>.md` file per finished plan.
pub struct PlanArchive {
    folder: PathBuf,
}

impl PlanArchive {
    /// A relative `folder` is taken relative to `working_directory`.
    pub fn new(folder: &Path, working_directory: &Path) -> Self {
        Self {
            folder: working_directory.join(folder),
        }
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    /// Write `output` to the archive. Empty output writes nothing.
    ///
    /// A plan with the same name replaces the earlier file.
    pub fn save(&self, output: &str) -> std::io::Result<Option<PathBuf>> {
        if output.trim().is_empty() {
            return Ok(None);
        }
        std::fs::create_dir_all(&self.folder)?;
        let path = self.folder.join(format!("{}.md", plan_file_name(output)));
        std::fs::write(&path, output)?;
        Ok(Some(path))
    }
}

/// File stem for a plan: its first line without the `# Plan: ` heading,
/// lowercased, with spaces as underscores.
fn plan_file_name(output: &str) -> String {
    let first_line = output.trim().lines().next().unwrap_or_default();
    let title = first_line.strip_prefix("# Plan: ").unwrap_or(first_line);
    let name: String = title
        .trim()
        .chars()
        .map(|c| match c {
            ' ' | '/' | '\\' => '_',
            c => c,
        })
        .collect::<String>()
        .to_lowercase();

    // Path components of their own.
    match name.as_str() {
        "" | "." | ".." => "plan".to_string(),
        _ => name,
    }
}
